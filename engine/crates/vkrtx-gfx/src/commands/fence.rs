use ash::vk;

use crate::{
    error::{GfxError, GfxResult, VkResultExt},
    foundation::{debug_messenger::DebugType, device::GfxDevice},
};

/// # Destroy
/// 不实现 Drop，因为可以 Clone，需要在 device idle 之后手动 destroy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxFence {
    fence: vk::Fence,
}

impl DebugType for GfxFence {
    fn debug_type_name() -> &'static str {
        "GfxFence"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.fence
    }
}

// 创建与销毁
impl GfxFence {
    /// # param
    /// * signaled - 是否创建时就 signaled
    pub fn new(device: &GfxDevice, signaled: bool, debug_name: &str) -> GfxResult<Self> {
        let fence_flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default().flags(fence_flags), None) }
            .vk_context("vkCreateFence")?;

        let fence = Self { fence };
        device.set_debug_name(&fence, debug_name);
        Ok(fence)
    }

    #[inline]
    pub fn destroy(self, device: &GfxDevice) {
        unsafe {
            device.destroy_fence(self.fence, None);
        }
    }
}

// getters
impl GfxFence {
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

// tools
impl GfxFence {
    /// 阻塞等待 fence
    ///
    /// # return
    /// false 表示超时
    #[inline]
    pub fn wait(&self, device: &GfxDevice, timeout_ns: u64) -> GfxResult<bool> {
        match unsafe { device.wait_for_fences(std::slice::from_ref(&self.fence), true, timeout_ns) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(result) => Err(GfxError::Driver {
                call: "vkWaitForFences",
                result,
            }),
        }
    }

    #[inline]
    pub fn reset(&self, device: &GfxDevice) -> GfxResult<()> {
        unsafe { device.reset_fences(std::slice::from_ref(&self.fence)) }.vk_context("vkResetFences")
    }
}
