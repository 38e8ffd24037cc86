//! 帧同步协议
//!
//! [`FramePipeliner`] 持有 N 个 frame slot，每个 slot 有一个 acquire semaphore、
//! 一个 render complete semaphore 和一个 CPU 可等待的 fence。每一帧的流程：
//!
//! 1. 等待当前 slot 的 fence
//! 2. acquire swapchain image
//! 3. 如果这个 image 仍被其他 slot 的 fence 占用，先等待那个 fence
//! 4. 记录 image 的新归属
//! 5. reset fence，提交预录制的命令
//! 6. present
//! 7. 切换到下一个 slot
//!
//! 具体的设备通过 [`FrameSyncDevice`] 抽象，Vulkan 的实现在 `vkrtx-render` 里。

pub mod error;
pub mod frame_counter;
pub mod frame_slot;
pub mod image_owners;
pub mod pipeliner;
pub mod sync_device;
pub mod teardown;

#[cfg(test)]
mod mock_device;

pub use error::FrameError;
pub use pipeliner::{FramePipeliner, FrameReport, FrameStats};
pub use sync_device::{AcquireStatus, FrameSyncDevice, IdleToken, PresentStatus, WaitStatus};
