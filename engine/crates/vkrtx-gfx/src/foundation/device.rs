use std::{
    ffi::{CStr, CString},
    ops::Deref,
    rc::Rc,
};

use ash::vk;
use itertools::Itertools;

use crate::{
    error::{GfxError, GfxResult, VkResultExt},
    foundation::{debug_messenger::DebugType, instance::GfxInstance, physical_device::GfxPhysicalDevice},
};

/// ray tracing 相关的扩展函数指针，只有开启 ray tracing 时才会加载
pub struct GfxRtFunctions {
    /// 加速结构扩展 API
    pub acceleration_structure: ash::khr::acceleration_structure::Device,
    /// 光线追踪管线扩展 API
    pub ray_tracing_pipeline: ash::khr::ray_tracing_pipeline::Device,
}

/// Vulkan 逻辑设备封装
///
/// 包含核心设备 API 以及扩展的函数指针。所有 GPU 对象都持有 `Rc<GfxDevice>`，
/// 因此 device 会在最后一个对象销毁之后才销毁。
///
/// # 扩展支持
/// - Swapchain (KHR)
/// - Acceleration Structure (KHR)，可选
/// - Ray Tracing Pipeline (KHR)，可选
/// - Debug Utils (EXT)，instance 支持时加载
pub struct GfxDevice {
    /// 核心 Vulkan 设备 API
    device: ash::Device,
    /// 交换链扩展 API
    swapchain: ash::khr::swapchain::Device,
    rt: Option<GfxRtFunctions>,
    /// 调试工具扩展 API
    debug_utils: Option<ash::ext::debug_utils::Device>,

    _instance: Rc<GfxInstance>,
}

// new & init
impl GfxDevice {
    pub fn new(
        instance: Rc<GfxInstance>,
        pdevice: &GfxPhysicalDevice,
        queue_create_infos: &[vk::DeviceQueueCreateInfo],
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxDevice::new");
        let ray_tracing = pdevice.ray_tracing();

        // device 所需的所有 extension
        let device_exts = GfxPhysicalDevice::required_device_exts(ray_tracing);
        log::info!("device exts: {}", device_exts.iter().map(|e| format!("\n\t{:?}", e)).join(""));
        let device_ext_ptrs = device_exts.iter().map(|e| e.as_ptr()).collect_vec();

        // device 所需的所有 features
        let mut vk12_features = vk::PhysicalDeviceVulkan12Features::default().buffer_device_address(true);
        let mut vk13_features =
            vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true).synchronization2(true);
        let mut acc_features =
            vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default().acceleration_structure(true);
        let mut rt_features = vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default().ray_tracing_pipeline(true);

        let mut all_features =
            vk::PhysicalDeviceFeatures2::default().push_next(&mut vk12_features).push_next(&mut vk13_features);
        if ray_tracing {
            all_features = all_features.push_next(&mut acc_features).push_next(&mut rt_features);
        }

        let device_ci = vk::DeviceCreateInfo::default()
            .queue_create_infos(queue_create_infos)
            .enabled_extension_names(&device_ext_ptrs)
            .push_next(&mut all_features);

        let ash_instance = instance.ash_instance();
        let device = unsafe { ash_instance.create_device(pdevice.vk_handle(), &device_ci, None) }
            .vk_context("vkCreateDevice")?;

        let swapchain = ash::khr::swapchain::Device::new(ash_instance, &device);
        let rt = ray_tracing.then(|| GfxRtFunctions {
            acceleration_structure: ash::khr::acceleration_structure::Device::new(ash_instance, &device),
            ray_tracing_pipeline: ash::khr::ray_tracing_pipeline::Device::new(ash_instance, &device),
        });
        let debug_utils =
            instance.debug_utils_enabled().then(|| ash::ext::debug_utils::Device::new(ash_instance, &device));

        Ok(Self {
            device,
            swapchain,
            rt,
            debug_utils,
            _instance: instance,
        })
    }
}

impl Drop for GfxDevice {
    fn drop(&mut self) {
        log::info!("destroying device");
        unsafe {
            self.device.destroy_device(None);
        }
    }
}

// getters
impl GfxDevice {
    #[inline]
    pub fn ash_device(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn swapchain(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain
    }

    /// ray tracing 扩展函数，未开启 ray tracing 时返回错误
    #[inline]
    pub fn rt(&self) -> GfxResult<&GfxRtFunctions> {
        self.rt.as_ref().ok_or(GfxError::RayTracingDisabled)
    }
}

// tools
impl GfxDevice {
    /// debug name 的格式为 `{type}::{name}`，不支持 debug utils 时忽略
    pub fn set_debug_name<T: DebugType>(&self, handle: &T, name: impl AsRef<str>) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(debug_name) = CString::new(format!("{}::{}", T::debug_type_name(), name.as_ref())) else {
            return;
        };
        Self::set_name(debug_utils, handle.vk_handle(), &debug_name);
    }

    pub fn set_object_debug_name<T: vk::Handle + Copy>(&self, handle: T, name: impl AsRef<str>) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(debug_name) = CString::new(name.as_ref()) else {
            return;
        };
        Self::set_name(debug_utils, handle, &debug_name);
    }

    fn set_name(debug_utils: &ash::ext::debug_utils::Device, handle: impl vk::Handle, name: &CStr) {
        let info = vk::DebugUtilsObjectNameInfoEXT::default().object_name(name).object_handle(handle);
        if let Err(e) = unsafe { debug_utils.set_debug_utils_object_name(&info) } {
            log::warn!("failed to set debug name {:?}: {:?}", name, e);
        }
    }

    #[inline]
    pub fn wait_idle(&self) -> GfxResult<()> {
        unsafe { self.device.device_wait_idle() }.vk_context("vkDeviceWaitIdle")
    }
}

impl Deref for GfxDevice {
    type Target = ash::Device;
    fn deref(&self) -> &Self::Target {
        &self.device
    }
}

impl DebugType for GfxDevice {
    fn debug_type_name() -> &'static str {
        "GfxDevice"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.device.handle()
    }
}
