use std::{ffi::CStr, rc::Rc};

use ash::vk;
use itertools::Itertools;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::{
    commands::{command_pool::GfxCommandPool, command_queue::GfxCommandQueue},
    error::{GfxResult, VkResultExt},
    foundation::{
        debug_messenger::GfxDebugMsger, device::GfxDevice, instance::GfxInstance, mem_allocator::GfxAllocator,
        physical_device::GfxPhysicalDevice,
    },
    swapchain::surface::GfxSurface,
};

/// 创建 [`GfxCore`] 需要的参数
#[derive(Debug, Clone, Copy)]
pub struct GfxCoreCreateInfo<'a> {
    pub app_name: &'a str,
    pub enable_validation: bool,
    pub ray_tracing: bool,
    pub display_handle: RawDisplayHandle,
    pub window_handle: RawWindowHandle,
}

/// 一个窗口所需的全部 vulkan 基础对象
///
/// 字段按照销毁顺序声明：依赖者在前，被依赖者在后
pub struct GfxCore {
    pub command_pool: GfxCommandPool,
    pub allocator: Rc<GfxAllocator>,

    pub gfx_queue: GfxCommandQueue,
    pub present_queue: GfxCommandQueue,

    pub device: Rc<GfxDevice>,
    pub physical_device: GfxPhysicalDevice,
    pub surface: Rc<GfxSurface>,

    _debug_msger: Option<GfxDebugMsger>,
    pub instance: Rc<GfxInstance>,
}

impl GfxCore {
    pub fn new(ci: &GfxCoreCreateInfo) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxCore::new");

        let window_exts = unsafe {
            ash_window::enumerate_required_extensions(ci.display_handle)
                .vk_context("enumerate_required_extensions")?
                .iter()
                .map(|ext| CStr::from_ptr(*ext))
                .collect_vec()
        };

        let instance = Rc::new(GfxInstance::new(ci.app_name, &window_exts, ci.enable_validation)?);
        let debug_msger =
            if instance.debug_utils_enabled() { Some(GfxDebugMsger::new(instance.clone())?) } else { None };

        let surface = Rc::new(GfxSurface::new(instance.clone(), ci.display_handle, ci.window_handle)?);
        let physical_device = GfxPhysicalDevice::select(&instance, &surface, ci.ray_tracing)?;
        log::info!("selected gpu: {}, discrete: {}", physical_device.device_name(), physical_device.is_descrete_gpu());

        // graphics 和 present 可以是同一个 queue family
        let queue_priorities = [1.0];
        let queue_create_infos = [
            physical_device.gfx_queue_family().queue_family_index,
            physical_device.present_queue_family().queue_family_index,
        ]
        .into_iter()
        .unique()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default().queue_family_index(family).queue_priorities(&queue_priorities)
        })
        .collect_vec();

        let device = Rc::new(GfxDevice::new(instance.clone(), &physical_device, &queue_create_infos)?);
        device.set_object_debug_name(physical_device.vk_handle(), "GfxPhysicalDevice");
        device.set_debug_name(device.as_ref(), "main");

        let gfx_queue = GfxCommandQueue::new(device.clone(), physical_device.gfx_queue_family().clone(), "gfx");
        let present_queue =
            GfxCommandQueue::new(device.clone(), physical_device.present_queue_family().clone(), "present");
        log::info!("gfx queue family:\n{:#?}", gfx_queue.queue_family());
        log::info!("present queue family:\n{:#?}", present_queue.queue_family());

        let allocator = Rc::new(GfxAllocator::new(instance.ash_instance(), &physical_device, device.clone())?);

        // 每个 image 的命令只录制一次，不需要 reset
        let command_pool = GfxCommandPool::new(
            device.clone(),
            physical_device.gfx_queue_family().clone(),
            vk::CommandPoolCreateFlags::empty(),
            "main",
        )?;

        Ok(Self {
            command_pool,
            allocator,
            gfx_queue,
            present_queue,
            device,
            physical_device,
            surface,
            _debug_msger: debug_msger,
            instance,
        })
    }
}
