use std::fmt;

use thiserror::Error;

/// 阻塞点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStage {
    /// 等待当前 slot 的 fence
    SlotFree,
    /// 等待 swapchain 交出 image
    AcquireImage,
    /// 等待占用 image 的旧 slot 的 fence
    ImageFree,
}
impl fmt::Display for WaitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WaitStage::SlotFree => "slot-free",
            WaitStage::AcquireImage => "acquire-image",
            WaitStage::ImageFree => "image-free",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum FrameError<E: std::error::Error + 'static> {
    #[error("invalid frame config: {0}")]
    InvalidConfig(&'static str),

    /// slot 是被等待的 fence 所属的 slot
    #[error("{stage} wait timed out (slot {slot})")]
    Timeout { stage: WaitStage, slot: usize },

    #[error("acquired image index {image_index} is out of range (image count {image_count})")]
    ImageOutOfRange { image_index: u32, image_count: usize },

    #[error("device error: {0}")]
    Device(#[source] E),
}

impl<E: std::error::Error + 'static> FrameError<E> {
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, FrameError::Timeout { .. })
    }
}
