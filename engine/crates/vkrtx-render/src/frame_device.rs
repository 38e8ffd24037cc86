use std::rc::Rc;

use ash::vk;
use vkrtx_frame::{
    AcquireStatus, FrameSyncDevice, IdleToken, PresentStatus, WaitStatus,
    teardown::{TeardownError, TeardownTracker},
};
use vkrtx_gfx::{
    GfxError, GfxResult,
    commands::{
        command_buffer::GfxCommandBuffer, command_queue::GfxCommandQueue, fence::GfxFence, semaphore::GfxSemaphore,
        submit_info::GfxSubmitInfo,
    },
    foundation::device::GfxDevice,
    swapchain::render_swapchain::{GfxAcquireResult, GfxRenderSwapchain},
};

use crate::passes::RenderPass;

/// 帧同步协议在 vulkan 上的实现
///
/// 持有 swapchain，以及每个 swapchain image 预先录制好的 command buffer
pub struct VulkanPresenter {
    swapchain: GfxRenderSwapchain,

    /// 下标就是 swapchain image 的下标
    commands: Vec<GfxCommandBuffer>,
    /// command buffer 中第一次访问 swapchain image 的阶段，需要在此之前等待 acquire
    wait_stage: vk::PipelineStageFlags2,

    gfx_queue: GfxCommandQueue,
    present_queue: GfxCommandQueue,
    device: Rc<GfxDevice>,

    teardown: TeardownTracker,
}

impl VulkanPresenter {
    pub fn new(
        swapchain: GfxRenderSwapchain,
        pass: &dyn RenderPass,
        gfx_queue: GfxCommandQueue,
        present_queue: GfxCommandQueue,
        device: Rc<GfxDevice>,
    ) -> GfxResult<Self> {
        if pass.command_buffers().len() != swapchain.image_count() {
            return Err(GfxError::Invariant(format!(
                "{} command buffers recorded for {} swapchain images",
                pass.command_buffers().len(),
                swapchain.image_count()
            )));
        }

        Ok(Self {
            swapchain,
            commands: pass.command_buffers().to_vec(),
            wait_stage: pass.wait_stage(),
            gfx_queue,
            present_queue,
            device,
            teardown: TeardownTracker::new(),
        })
    }

    #[inline]
    pub fn swapchain(&self) -> &GfxRenderSwapchain {
        &self.swapchain
    }

    /// 不经过帧同步协议，直接等待 device idle
    pub fn wait_device_idle(&mut self) -> GfxResult<()> {
        self.device.wait_idle()?;
        self.teardown.note_idle();
        Ok(())
    }

    fn check_destroy(&self, resource: &str) -> GfxResult<()> {
        self.teardown.check_destroy(resource).map_err(teardown_error)
    }
}

fn teardown_error(e: TeardownError) -> GfxError {
    GfxError::Invariant(e.to_string())
}

impl FrameSyncDevice for VulkanPresenter {
    type Fence = GfxFence;
    type Semaphore = GfxSemaphore;
    type Error = GfxError;

    #[inline]
    fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    fn create_fence(&mut self, signaled: bool, debug_name: &str) -> GfxResult<GfxFence> {
        GfxFence::new(&self.device, signaled, debug_name)
    }

    fn create_semaphore(&mut self, debug_name: &str) -> GfxResult<GfxSemaphore> {
        GfxSemaphore::new(&self.device, debug_name)
    }

    fn wait_fence(&mut self, fence: &GfxFence, timeout_ns: u64) -> GfxResult<WaitStatus> {
        let signaled = fence.wait(&self.device, timeout_ns)?;
        Ok(if signaled { WaitStatus::Signaled } else { WaitStatus::TimedOut })
    }

    fn reset_fence(&mut self, fence: &GfxFence) -> GfxResult<()> {
        fence.reset(&self.device)
    }

    fn acquire_next_image(&mut self, signal: &GfxSemaphore, timeout_ns: u64) -> GfxResult<AcquireStatus> {
        Ok(match self.swapchain.acquire_next_image(signal, timeout_ns)? {
            GfxAcquireResult::Acquired {
                image_index,
                suboptimal,
            } => AcquireStatus::Acquired {
                image_index,
                suboptimal,
            },
            GfxAcquireResult::TimedOut => AcquireStatus::TimedOut,
        })
    }

    fn submit(
        &mut self,
        image_index: u32,
        wait: &GfxSemaphore,
        signal: &GfxSemaphore,
        fence: &GfxFence,
    ) -> GfxResult<()> {
        let command_buffer = self.commands.get(image_index as usize).ok_or_else(|| {
            GfxError::Invariant(format!("no command buffer recorded for swapchain image {}", image_index))
        })?;

        let submit_info = GfxSubmitInfo::new(std::slice::from_ref(command_buffer))
            .wait(wait, self.wait_stage)
            .signal(signal, vk::PipelineStageFlags2::ALL_COMMANDS);
        self.gfx_queue.submit(&[submit_info], Some(fence))?;
        self.teardown.note_submit();
        Ok(())
    }

    fn present(&mut self, image_index: u32, wait: &GfxSemaphore) -> GfxResult<PresentStatus> {
        let suboptimal = self.swapchain.present_image(&self.present_queue, image_index, wait)?;
        Ok(if suboptimal { PresentStatus::Suboptimal } else { PresentStatus::Presented })
    }

    fn wait_idle(&mut self) -> GfxResult<IdleToken> {
        self.wait_device_idle()?;
        Ok(IdleToken::new())
    }

    fn destroy_fence(&mut self, fence: GfxFence, _idle: &IdleToken) -> GfxResult<()> {
        self.check_destroy("fence")?;
        fence.destroy(&self.device);
        Ok(())
    }

    fn destroy_semaphore(&mut self, semaphore: GfxSemaphore, _idle: &IdleToken) -> GfxResult<()> {
        self.check_destroy("semaphore")?;
        semaphore.destroy(&self.device);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teardown_error_is_internal() {
        let err = teardown_error(TeardownError::DestroyBeforeIdle {
            resource: "fence".to_string(),
        });
        assert_eq!(err.kind(), vkrtx_gfx::ErrorKind::Internal);
        assert!(err.to_string().contains("fence"));
    }
}
