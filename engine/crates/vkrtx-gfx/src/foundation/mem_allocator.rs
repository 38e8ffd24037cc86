use std::{ops::Deref, rc::Rc};

use ash::vk;

use crate::{
    error::{GfxResult, VkResultExt},
    foundation::{device::GfxDevice, physical_device::GfxPhysicalDevice},
};

/// vma 分配器
///
/// vma 需要 instance 和 device 在其生命周期内有效，因此持有 `Rc<GfxDevice>`；
/// `inner` 声明在前，保证先于 device 销毁
pub struct GfxAllocator {
    inner: vk_mem::Allocator,
    device: Rc<GfxDevice>,
}

impl GfxAllocator {
    pub fn new(instance: &ash::Instance, pdevice: &GfxPhysicalDevice, device: Rc<GfxDevice>) -> GfxResult<Self> {
        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(instance, device.ash_device(), pdevice.vk_handle());
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;
        vma_ci.flags = vk_mem::AllocatorCreateFlags::BUFFER_DEVICE_ADDRESS;

        let inner = unsafe { vk_mem::Allocator::new(vma_ci) }.vk_context("vmaCreateAllocator")?;

        Ok(Self { inner, device })
    }

    #[inline]
    pub fn device(&self) -> &Rc<GfxDevice> {
        &self.device
    }
}

impl Deref for GfxAllocator {
    type Target = vk_mem::Allocator;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
