//! 用于测试的确定性设备
//!
//! 提交进入一个 FIFO 队列，CPU 等待某个 fence 时，队列中直到该 fence 最近一次提交为止的所有提交依次完成。
//! 违反同步协议的调用不会 panic，而是记录到 `violations` 中，由测试断言。
//! 可以让某一类调用的第 n 次返回错误，也可以指定 acquire 返回 image 的顺序。

use std::collections::{HashMap, VecDeque};

use thiserror::Error;

use crate::sync_device::{AcquireStatus, FrameSyncDevice, IdleToken, PresentStatus, WaitStatus};
use crate::teardown::{TeardownError, TeardownStep, TeardownTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockFence(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockSemaphore(usize);

#[derive(Debug, Error)]
pub enum MockError {
    #[error(transparent)]
    Teardown(#[from] TeardownError),
    #[error("{0:?} was already destroyed")]
    FenceDestroyed(MockFence),
    #[error("injected failure on {op:?} call #{call}")]
    Injected { op: MockOp, call: usize },
}

/// 可以注入错误的调用类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    /// fence 和 semaphore 的创建共用一个计数
    Create,
    WaitFence,
    ResetFence,
    Acquire,
    Submit,
    Present,
    WaitIdle,
    /// fence 和 semaphore 的销毁共用一个计数
    Destroy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    CreateFence(MockFence),
    CreateSemaphore(MockSemaphore),
    WaitFence(MockFence),
    ResetFence(MockFence),
    Acquire(u32),
    Submit { id: u64, image_index: u32, fence: MockFence },
    Present(u32),
    WaitIdle,
    DestroyFence(MockFence),
    DestroySemaphore(MockSemaphore),
}

#[derive(Debug)]
struct Submission {
    id: u64,
    image_index: u32,
    fence: MockFence,
}

#[derive(Debug, Default)]
struct FenceState {
    signaled: bool,
    destroyed: bool,
}

pub struct MockDevice {
    image_count: usize,
    /// 下一次 acquire 返回的 image，按轮转顺序递增
    pub next_image: u32,
    /// GPU 卡住：未完成的提交永远不会完成
    pub stalled: bool,
    /// acquire 总是超时
    pub acquire_times_out: bool,
    /// 非空时 acquire 依次返回其中的 image，取代轮转顺序
    pub image_sequence: VecDeque<u32>,
    /// (op, n)：第 n 次 op 调用返回 `MockError::Injected`，n 从 1 开始
    pub fail_on: Option<(MockOp, usize)>,
    attempts: HashMap<MockOp, usize>,

    fences: Vec<FenceState>,
    semaphores: Vec<bool>,

    pending: VecDeque<Submission>,
    next_submission_id: u64,
    max_outstanding: usize,

    /// 每个 fence 上提交的顺序
    issued: HashMap<MockFence, Vec<u64>>,
    /// 每个 fence 上完成的顺序
    completions: HashMap<MockFence, Vec<u64>>,

    violations: Vec<String>,
    calls: Vec<MockCall>,
    teardown: TeardownTracker,
}
// new & init
impl MockDevice {
    pub fn new(image_count: usize) -> Self {
        Self {
            image_count,
            next_image: 0,
            stalled: false,
            acquire_times_out: false,
            image_sequence: VecDeque::new(),
            fail_on: None,
            attempts: HashMap::new(),
            fences: vec![],
            semaphores: vec![],
            pending: VecDeque::new(),
            next_submission_id: 0,
            max_outstanding: 0,
            issued: HashMap::new(),
            completions: HashMap::new(),
            violations: vec![],
            calls: vec![],
            teardown: TeardownTracker::new(),
        }
    }
}
// getters
impl MockDevice {
    pub fn submission_count(&self) -> u64 {
        self.next_submission_id
    }
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }
    pub fn max_outstanding(&self) -> usize {
        self.max_outstanding
    }
    pub fn violations(&self) -> &[String] {
        &self.violations
    }
    pub fn calls(&self) -> &[MockCall] {
        &self.calls
    }
    pub fn issued(&self) -> &HashMap<MockFence, Vec<u64>> {
        &self.issued
    }
    pub fn completions(&self) -> &HashMap<MockFence, Vec<u64>> {
        &self.completions
    }
    pub fn live_fences(&self) -> usize {
        self.fences.iter().filter(|f| !f.destroyed).count()
    }
    pub fn live_semaphores(&self) -> usize {
        self.semaphores.iter().filter(|alive| **alive).count()
    }
    /// op 被调用的次数，包括返回错误的调用
    pub fn attempts(&self, op: MockOp) -> usize {
        self.attempts.get(&op).copied().unwrap_or(0)
    }

    /// 下一次 op 调用返回错误
    pub fn fail_next(&mut self, op: MockOp) {
        self.fail_on = Some((op, self.attempts(op) + 1));
    }

    /// 把调用记录转换成 teardown 序列
    pub fn teardown_steps(&self) -> Vec<TeardownStep> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                MockCall::Submit { .. } => Some(TeardownStep::Submit),
                MockCall::WaitIdle => Some(TeardownStep::WaitIdle),
                MockCall::DestroyFence(f) => Some(TeardownStep::Destroy(format!("{f:?}"))),
                MockCall::DestroySemaphore(s) => Some(TeardownStep::Destroy(format!("{s:?}"))),
                _ => None,
            })
            .collect()
    }
}
// gpu 模拟
impl MockDevice {
    /// 按 FIFO 顺序完成提交，直到 id 为止
    fn complete_through(&mut self, id: u64) {
        while self.pending.front().is_some_and(|s| s.id <= id) {
            let Some(submission) = self.pending.pop_front() else {
                break;
            };
            self.fences[submission.fence.0].signaled = true;
            self.completions.entry(submission.fence).or_default().push(submission.id);
        }
    }

    fn complete_all(&mut self) {
        if let Some(last) = self.pending.back().map(|s| s.id) {
            self.complete_through(last);
        }
    }

    fn attempt(&mut self, op: MockOp) -> Result<(), MockError> {
        let call = self.attempts.entry(op).or_default();
        *call += 1;
        match self.fail_on {
            Some((fail_op, n)) if fail_op == op && n == *call => Err(MockError::Injected { op, call: n }),
            _ => Ok(()),
        }
    }

    fn violation(&mut self, msg: String) {
        self.violations.push(msg);
    }
}

impl FrameSyncDevice for MockDevice {
    type Fence = MockFence;
    type Semaphore = MockSemaphore;
    type Error = MockError;

    fn image_count(&self) -> usize {
        self.image_count
    }

    fn create_fence(&mut self, signaled: bool, _debug_name: &str) -> Result<MockFence, MockError> {
        self.attempt(MockOp::Create)?;
        let fence = MockFence(self.fences.len());
        self.fences.push(FenceState {
            signaled,
            destroyed: false,
        });
        self.calls.push(MockCall::CreateFence(fence));
        Ok(fence)
    }

    fn create_semaphore(&mut self, _debug_name: &str) -> Result<MockSemaphore, MockError> {
        self.attempt(MockOp::Create)?;
        let semaphore = MockSemaphore(self.semaphores.len());
        self.semaphores.push(true);
        self.calls.push(MockCall::CreateSemaphore(semaphore));
        Ok(semaphore)
    }

    fn wait_fence(&mut self, fence: &MockFence, _timeout_ns: u64) -> Result<WaitStatus, MockError> {
        self.attempt(MockOp::WaitFence)?;
        self.calls.push(MockCall::WaitFence(*fence));
        let state = &self.fences[fence.0];
        if state.destroyed {
            return Err(MockError::FenceDestroyed(*fence));
        }
        if state.signaled {
            return Ok(WaitStatus::Signaled);
        }

        let last_use = self.pending.iter().rev().find(|s| s.fence == *fence).map(|s| s.id);
        match last_use {
            Some(id) if !self.stalled => {
                self.complete_through(id);
                Ok(WaitStatus::Signaled)
            }
            // 卡住的 GPU，或者没有任何提交会 signal 这个 fence
            _ => Ok(WaitStatus::TimedOut),
        }
    }

    fn reset_fence(&mut self, fence: &MockFence) -> Result<(), MockError> {
        self.attempt(MockOp::ResetFence)?;
        self.calls.push(MockCall::ResetFence(*fence));
        if self.pending.iter().any(|s| s.fence == *fence) {
            self.violation(format!("{fence:?} reset while a submission still uses it"));
        }
        self.fences[fence.0].signaled = false;
        Ok(())
    }

    fn acquire_next_image(&mut self, _signal: &MockSemaphore, _timeout_ns: u64) -> Result<AcquireStatus, MockError> {
        self.attempt(MockOp::Acquire)?;
        if self.acquire_times_out {
            return Ok(AcquireStatus::TimedOut);
        }
        let image_index = match self.image_sequence.pop_front() {
            Some(image_index) => image_index,
            None => {
                let image_index = self.next_image;
                self.next_image = (self.next_image + 1) % self.image_count.max(1) as u32;
                image_index
            }
        };
        self.calls.push(MockCall::Acquire(image_index));
        Ok(AcquireStatus::Acquired {
            image_index,
            suboptimal: false,
        })
    }

    fn submit(
        &mut self,
        image_index: u32,
        _wait: &MockSemaphore,
        _signal: &MockSemaphore,
        fence: &MockFence,
    ) -> Result<(), MockError> {
        self.attempt(MockOp::Submit)?;
        if self.fences[fence.0].signaled {
            self.violation(format!("{fence:?} submitted without reset"));
        }
        if self.pending.iter().any(|s| s.fence == *fence) {
            self.violation(format!("{fence:?} referenced by two in-flight submissions"));
        }
        if let Some(other) = self.pending.iter().find(|s| s.image_index == image_index) {
            let msg = format!("image {image_index} bound to {:?} and {fence:?} at the same time", other.fence);
            self.violation(msg);
        }

        let id = self.next_submission_id;
        self.next_submission_id += 1;
        self.pending.push_back(Submission {
            id,
            image_index,
            fence: *fence,
        });
        self.issued.entry(*fence).or_default().push(id);
        self.max_outstanding = self.max_outstanding.max(self.pending.len());
        self.teardown.note_submit();
        self.calls.push(MockCall::Submit {
            id,
            image_index,
            fence: *fence,
        });
        Ok(())
    }

    fn present(&mut self, image_index: u32, _wait: &MockSemaphore) -> Result<PresentStatus, MockError> {
        self.attempt(MockOp::Present)?;
        self.calls.push(MockCall::Present(image_index));
        Ok(PresentStatus::Presented)
    }

    fn wait_idle(&mut self) -> Result<IdleToken, MockError> {
        self.attempt(MockOp::WaitIdle)?;
        self.calls.push(MockCall::WaitIdle);
        self.complete_all();
        self.teardown.note_idle();
        Ok(IdleToken::new())
    }

    fn destroy_fence(&mut self, fence: MockFence, _idle: &IdleToken) -> Result<(), MockError> {
        self.attempt(MockOp::Destroy)?;
        self.calls.push(MockCall::DestroyFence(fence));
        if let Err(e) = self.teardown.check_destroy(&format!("{fence:?}")) {
            self.violation(e.to_string());
            return Err(e.into());
        }
        self.fences[fence.0].destroyed = true;
        Ok(())
    }

    fn destroy_semaphore(&mut self, semaphore: MockSemaphore, _idle: &IdleToken) -> Result<(), MockError> {
        self.attempt(MockOp::Destroy)?;
        self.calls.push(MockCall::DestroySemaphore(semaphore));
        if let Err(e) = self.teardown.check_destroy(&format!("{semaphore:?}")) {
            self.violation(e.to_string());
            return Err(e.into());
        }
        self.semaphores[semaphore.0] = false;
        Ok(())
    }
}
