use std::rc::Rc;

use ash::vk;

use crate::{
    commands::command_queue::GfxQueueFamily,
    error::{GfxResult, VkResultExt},
    foundation::{debug_messenger::DebugType, device::GfxDevice},
};

/// command pool 是和 queue family 绑定的，而不是和 queue 绑定的
///
/// drop 时销毁，pool 中分配的 command buffer 也随之释放
pub struct GfxCommandPool {
    handle: vk::CommandPool,
    queue_family: GfxQueueFamily,
    device: Rc<GfxDevice>,
}

// new & init
impl GfxCommandPool {
    pub fn new(
        device: Rc<GfxDevice>,
        queue_family: GfxQueueFamily,
        flags: vk::CommandPoolCreateFlags,
        debug_name: &str,
    ) -> GfxResult<Self> {
        let handle = unsafe {
            device.create_command_pool(
                &vk::CommandPoolCreateInfo::default().queue_family_index(queue_family.queue_family_index).flags(flags),
                None,
            )
        }
        .vk_context("vkCreateCommandPool")?;

        let command_pool = Self {
            handle,
            queue_family,
            device,
        };
        command_pool.device.set_debug_name(&command_pool, debug_name);
        Ok(command_pool)
    }
}

// getters
impl GfxCommandPool {
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    #[inline]
    pub fn queue_family(&self) -> &GfxQueueFamily {
        &self.queue_family
    }

    #[inline]
    pub fn device(&self) -> &Rc<GfxDevice> {
        &self.device
    }
}

impl DebugType for GfxCommandPool {
    fn debug_type_name() -> &'static str {
        "GfxCommandPool"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

impl Drop for GfxCommandPool {
    fn drop(&mut self) {
        log::info!("destroying command pool for queue family {}", self.queue_family.name);
        unsafe {
            self.device.destroy_command_pool(self.handle, None);
        }
    }
}
