use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::{
    commands::{
        command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool, fence::GfxFence, submit_info::GfxSubmitInfo,
    },
    error::{GfxError, GfxResult, VkResultExt},
    foundation::{debug_messenger::DebugType, device::GfxDevice},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GfxQueueFamily {
    pub name: String,
    pub queue_family_index: u32,
    pub queue_flags: vk::QueueFlags,
    pub queue_count: u32,
}

/// queue 随 device 一起销毁，因此可以随意 clone
#[derive(Clone)]
pub struct GfxCommandQueue {
    handle: vk::Queue,
    queue_family: GfxQueueFamily,
    device: Rc<GfxDevice>,
}

// new & init
impl GfxCommandQueue {
    /// 获取 family 中的第 0 个 queue
    pub fn new(device: Rc<GfxDevice>, queue_family: GfxQueueFamily, debug_name: &str) -> Self {
        let handle = unsafe { device.get_device_queue(queue_family.queue_family_index, 0) };
        let queue = Self {
            handle,
            queue_family,
            device,
        };
        queue.device.set_debug_name(&queue, debug_name);
        queue
    }
}

// getters
impl GfxCommandQueue {
    #[inline]
    pub fn handle(&self) -> vk::Queue {
        self.handle
    }

    #[inline]
    pub fn queue_family(&self) -> &GfxQueueFamily {
        &self.queue_family
    }
}

// tools
impl GfxCommandQueue {
    pub fn submit(&self, batches: &[GfxSubmitInfo], fence: Option<&GfxFence>) -> GfxResult<()> {
        let submit_infos = batches.iter().map(|b| b.submit_info()).collect_vec();
        unsafe {
            self.device.queue_submit2(
                self.handle,
                &submit_infos,
                fence.map_or(vk::Fence::null(), |f| f.handle()),
            )
        }
        .vk_context("vkQueueSubmit2")
    }

    /// 录制并提交一段命令，使用 fence 同步等待其完成
    ///
    /// 只用于初始化阶段，例如构建加速结构、layout 转换
    pub fn one_time_exec<R>(
        &self,
        command_pool: &GfxCommandPool,
        name: &str,
        record: impl FnOnce(&GfxCommandBuffer) -> R,
    ) -> GfxResult<R> {
        let _span = tracy_client::span!("one_time_exec");

        let command_buffer = GfxCommandBuffer::new(command_pool, name)?;
        command_buffer.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        let result = record(&command_buffer);
        command_buffer.end()?;

        let fence = GfxFence::new(&self.device, false, name)?;
        let waited = self
            .submit(&[GfxSubmitInfo::new(std::slice::from_ref(&command_buffer))], Some(&fence))
            .and_then(|_| fence.wait(&self.device, u64::MAX));
        fence.destroy(&self.device);
        command_buffer.free(command_pool);

        if !waited? {
            return Err(GfxError::Invariant(format!("unbounded fence wait of {} timed out", name)));
        }
        Ok(result)
    }
}

impl DebugType for GfxCommandQueue {
    fn debug_type_name() -> &'static str {
        "GfxCommandQueue"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
