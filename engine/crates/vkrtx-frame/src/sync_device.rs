use std::time::Duration;

/// 等待 fence 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Signaled,
    TimedOut,
}

/// acquire swapchain image 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStatus {
    Acquired { image_index: u32, suboptimal: bool },
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    Suboptimal,
}

/// device 已经 idle 的凭证
///
/// 销毁同步对象时必须出示，只应该由 [`FrameSyncDevice::wait_idle`] 的实现创建
#[derive(Debug, Default)]
pub struct IdleToken {
    _private: (),
}
impl IdleToken {
    #[inline]
    pub fn new() -> Self {
        Self { _private: () }
    }
}

/// 帧同步所需的设备能力
///
/// 所有调用都发生在同一个 CPU 线程上。fence 表示 CPU 可等待的完成标记，semaphore 表示 GPU 侧的信号。
/// `submit` 提交的是该 image 预先录制好的命令：等待 `wait` 之后才写 color attachment，
/// 完成后 signal `signal` 和 `fence`。
pub trait FrameSyncDevice {
    type Fence;
    type Semaphore;
    type Error: std::error::Error + 'static;

    /// swapchain image 的数量，由驱动决定
    fn image_count(&self) -> usize;

    fn create_fence(&mut self, signaled: bool, debug_name: &str) -> Result<Self::Fence, Self::Error>;
    fn create_semaphore(&mut self, debug_name: &str) -> Result<Self::Semaphore, Self::Error>;

    /// timeout_ns 为 `u64::MAX` 时无限等待
    fn wait_fence(&mut self, fence: &Self::Fence, timeout_ns: u64) -> Result<WaitStatus, Self::Error>;
    fn reset_fence(&mut self, fence: &Self::Fence) -> Result<(), Self::Error>;

    fn acquire_next_image(&mut self, signal: &Self::Semaphore, timeout_ns: u64) -> Result<AcquireStatus, Self::Error>;
    fn submit(
        &mut self,
        image_index: u32,
        wait: &Self::Semaphore,
        signal: &Self::Semaphore,
        fence: &Self::Fence,
    ) -> Result<(), Self::Error>;
    fn present(&mut self, image_index: u32, wait: &Self::Semaphore) -> Result<PresentStatus, Self::Error>;

    fn wait_idle(&mut self) -> Result<IdleToken, Self::Error>;
    fn destroy_fence(&mut self, fence: Self::Fence, idle: &IdleToken) -> Result<(), Self::Error>;
    fn destroy_semaphore(&mut self, semaphore: Self::Semaphore, idle: &IdleToken) -> Result<(), Self::Error>;
}

/// None 表示不限时
#[inline]
pub fn timeout_ns(timeout: Option<Duration>) -> u64 {
    timeout.map_or(u64::MAX, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_ns() {
        assert_eq!(timeout_ns(None), u64::MAX);
        assert_eq!(timeout_ns(Some(Duration::from_millis(16))), 16_000_000);
        assert_eq!(timeout_ns(Some(Duration::MAX)), u64::MAX);
    }
}
