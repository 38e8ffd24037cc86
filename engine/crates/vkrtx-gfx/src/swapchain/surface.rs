use std::rc::Rc;

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::{
    error::{GfxResult, VkResultExt},
    foundation::{debug_messenger::DebugType, instance::GfxInstance},
};

/// 窗口对应的 vulkan surface
///
/// swapchain 持有 `Rc<GfxSurface>`，因此 surface 一定在 swapchain 之后销毁
pub struct GfxSurface {
    handle: vk::SurfaceKHR,
    pf: ash::khr::surface::Instance,
    _instance: Rc<GfxInstance>,
}

impl GfxSurface {
    pub fn new(
        instance: Rc<GfxInstance>,
        raw_display_handle: RawDisplayHandle,
        raw_window_handle: RawWindowHandle,
    ) -> GfxResult<Self> {
        let pf = ash::khr::surface::Instance::new(instance.entry(), instance.ash_instance());

        let handle = unsafe {
            ash_window::create_surface(
                instance.entry(),
                instance.ash_instance(),
                raw_display_handle,
                raw_window_handle,
                None,
            )
        }
        .vk_context("vkCreateSurfaceKHR")?;

        Ok(Self {
            handle,
            pf,
            _instance: instance,
        })
    }
}

// getters
impl GfxSurface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    pub fn capabilities(&self, pdevice: vk::PhysicalDevice) -> GfxResult<vk::SurfaceCapabilitiesKHR> {
        unsafe { self.pf.get_physical_device_surface_capabilities(pdevice, self.handle) }
            .vk_context("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")
    }

    pub fn formats(&self, pdevice: vk::PhysicalDevice) -> GfxResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe { self.pf.get_physical_device_surface_formats(pdevice, self.handle) }
            .vk_context("vkGetPhysicalDeviceSurfaceFormatsKHR")
    }

    pub fn present_modes(&self, pdevice: vk::PhysicalDevice) -> GfxResult<Vec<vk::PresentModeKHR>> {
        unsafe { self.pf.get_physical_device_surface_present_modes(pdevice, self.handle) }
            .vk_context("vkGetPhysicalDeviceSurfacePresentModesKHR")
    }

    /// 某个 queue family 能否向当前 surface 呈现
    pub fn supports_present(&self, pdevice: vk::PhysicalDevice, queue_family_index: u32) -> GfxResult<bool> {
        unsafe { self.pf.get_physical_device_surface_support(pdevice, queue_family_index, self.handle) }
            .vk_context("vkGetPhysicalDeviceSurfaceSupportKHR")
    }
}

impl Drop for GfxSurface {
    fn drop(&mut self) {
        log::info!("destroying surface");
        unsafe { self.pf.destroy_surface(self.handle, None) }
    }
}

impl DebugType for GfxSurface {
    fn debug_type_name() -> &'static str {
        "GfxSurface"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
