use std::time::Duration;

use crate::error::{FrameError, WaitStage};
use crate::frame_counter::FrameCounter;
use crate::frame_slot::FrameSlot;
use crate::image_owners::ImageOwners;
use crate::sync_device::{AcquireStatus, FrameSyncDevice, PresentStatus, WaitStatus, timeout_ns};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// 已经提交的帧数
    pub submissions: u64,
    /// 因为 image 仍被旧 slot 占用而阻塞的次数
    pub image_reuse_waits: u64,
}

/// 一帧的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub frame_id: u64,
    pub slot: usize,
    pub image_index: u32,
    /// 复用 image 之前等待过的旧 slot
    pub waited_for_slot: Option<usize>,
    /// acquire 或 present 报告 swapchain 不再匹配 surface
    pub suboptimal: bool,
}

/// 已经 acquire、还没有提交的 image
#[derive(Debug, Clone, Copy)]
struct PendingImage {
    image_index: u32,
    suboptimal: bool,
}

/// 帧同步的调度者
///
/// 限制未完成的提交数量不超过 slot 数量，并保证同一个 image 不会同时被两个未完成的提交使用。
/// 超时不会破坏内部状态：再次调用 [`FramePipeliner::draw_frame`] 会从阻塞的位置继续。
pub struct FramePipeliner<D: FrameSyncDevice> {
    slots: Vec<FrameSlot<D>>,
    image_owners: ImageOwners,
    frame_counter: FrameCounter,

    /// 当前 slot 已经 acquire 的 image，超时后重试时不能重新 acquire
    pending_image: Option<PendingImage>,

    timeout_ns: u64,
    stats: FrameStats,
}
// new & init
impl<D: FrameSyncDevice> FramePipeliner<D> {
    /// # param
    /// * slot_count - frame in flight 的数量，至少为 1
    /// * timeout - 每个阻塞点的最长等待时间，None 表示无限等待
    pub fn new(device: &mut D, slot_count: usize, timeout: Option<Duration>) -> Result<Self, FrameError<D::Error>> {
        if slot_count == 0 {
            return Err(FrameError::InvalidConfig("slot count must be at least 1"));
        }
        let image_count = device.image_count();
        if image_count == 0 {
            return Err(FrameError::InvalidConfig("swapchain reported no images"));
        }

        let mut slots = Vec::with_capacity(slot_count);
        for slot in 0..slot_count {
            match FrameSlot::new(device, slot) {
                Ok(frame_slot) => slots.push(frame_slot),
                Err(e) => {
                    log::error!("failed to create frame slot {}: {}", slot, e);
                    if let Err(cleanup) = destroy_slots(device, slots) {
                        log::error!("failed to release frame slots: {}", cleanup);
                    }
                    return Err(FrameError::Device(e));
                }
            }
        }

        log::info!("frame pipeliner: {} slots, {} swapchain images, timeout: {:?}", slot_count, image_count, timeout);

        Ok(Self {
            slots,
            image_owners: ImageOwners::new(image_count),
            frame_counter: FrameCounter::new(0, slot_count),
            pending_image: None,
            timeout_ns: timeout_ns(timeout),
            stats: FrameStats::default(),
        })
    }
}
// getters
impl<D: FrameSyncDevice> FramePipeliner<D> {
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
    #[inline]
    pub fn current_slot(&self) -> usize {
        self.frame_counter.slot_index()
    }
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_counter.frame_id()
    }
    #[inline]
    pub fn stats(&self) -> FrameStats {
        self.stats
    }
    #[inline]
    pub fn image_owners(&self) -> &ImageOwners {
        &self.image_owners
    }
}
// update
impl<D: FrameSyncDevice> FramePipeliner<D> {
    pub fn draw_frame(&mut self, device: &mut D) -> Result<FrameReport, FrameError<D::Error>> {
        let slot = self.frame_counter.slot_index();
        let frame_name = self.frame_counter.frame_name();

        let PendingImage {
            image_index,
            suboptimal: acquire_suboptimal,
        } = match self.pending_image {
            Some(pending) => pending,
            None => {
                // 1. 等待 slot 空闲
                self.wait_slot_fence(device, slot, WaitStage::SlotFree)?;

                // 2. acquire image
                let pending = self.acquire_image(device, slot)?;
                self.pending_image = Some(pending);
                pending
            }
        };
        log::trace!("{} acquired image {}", frame_name, image_index);

        // 3. image 仍被其他 slot 占用时，等待那个 slot 完成
        let waited_for_slot = self.image_owners.conflicting_owner(image_index, slot);
        if let Some(prev_slot) = waited_for_slot {
            log::trace!("{} image {} is still owned by slot {}, waiting", frame_name, image_index, prev_slot);
            self.wait_slot_fence(device, prev_slot, WaitStage::ImageFree)?;
            self.stats.image_reuse_waits += 1;
        }

        // 4. 记录 image 的新归属
        self.image_owners.bind(image_index, slot);
        self.pending_image = None;

        // 5. 提交
        let frame_slot = &self.slots[slot];
        device.reset_fence(&frame_slot.in_flight).map_err(FrameError::Device)?;
        device
            .submit(image_index, &frame_slot.image_acquired, &frame_slot.render_complete, &frame_slot.in_flight)
            .map_err(FrameError::Device)?;
        self.stats.submissions += 1;

        // 6. present
        let present_status = device.present(image_index, &frame_slot.render_complete).map_err(FrameError::Device)?;
        let suboptimal = acquire_suboptimal || present_status == PresentStatus::Suboptimal;
        if suboptimal {
            log::warn!("{} swapchain image {} is suboptimal", frame_name, image_index);
        }

        let report = FrameReport {
            frame_id: self.frame_counter.frame_id(),
            slot,
            image_index,
            waited_for_slot,
            suboptimal,
        };

        // 7. 下一个 slot
        self.frame_counter.next_frame();

        Ok(report)
    }

    fn wait_slot_fence(&mut self, device: &mut D, slot: usize, stage: WaitStage) -> Result<(), FrameError<D::Error>> {
        match device.wait_fence(&self.slots[slot].in_flight, self.timeout_ns).map_err(FrameError::Device)? {
            WaitStatus::Signaled => {
                // slot 最近一次提交已经完成，它占用的 image 都释放了
                self.image_owners.release_slot(slot);
                Ok(())
            }
            WaitStatus::TimedOut => Err(FrameError::Timeout { stage, slot }),
        }
    }

    fn acquire_image(&self, device: &mut D, slot: usize) -> Result<PendingImage, FrameError<D::Error>> {
        match device
            .acquire_next_image(&self.slots[slot].image_acquired, self.timeout_ns)
            .map_err(FrameError::Device)?
        {
            AcquireStatus::Acquired {
                image_index,
                suboptimal,
            } => {
                if image_index as usize >= self.image_owners.len() {
                    return Err(FrameError::ImageOutOfRange {
                        image_index,
                        image_count: self.image_owners.len(),
                    });
                }
                Ok(PendingImage {
                    image_index,
                    suboptimal,
                })
            }
            AcquireStatus::TimedOut => Err(FrameError::Timeout {
                stage: WaitStage::AcquireImage,
                slot,
            }),
        }
    }
}
// destroy
impl<D: FrameSyncDevice> FramePipeliner<D> {
    /// 先等待 device idle，再销毁所有同步对象
    ///
    /// 某个对象销毁失败时仍然会继续销毁其余对象，最后返回第一个错误
    pub fn shutdown(self, device: &mut D) -> Result<(), FrameError<D::Error>> {
        log::info!("frame pipeliner shutdown after {} submissions", self.stats.submissions);
        destroy_slots(device, self.slots).map_err(FrameError::Device)
    }
}

fn destroy_slots<D: FrameSyncDevice>(device: &mut D, slots: Vec<FrameSlot<D>>) -> Result<(), D::Error> {
    if slots.is_empty() {
        return Ok(());
    }
    let idle = device.wait_idle()?;

    let mut first_err = None;
    for (slot, frame_slot) in slots.into_iter().enumerate() {
        if let Err(e) = frame_slot.destroy(device, &idle) {
            log::error!("failed to destroy frame slot {}: {}", slot, e);
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_device::{MockCall, MockDevice, MockError, MockOp};
    use crate::sync_device::IdleToken;
    use crate::teardown::{TeardownError, TeardownStep, validate_teardown};

    fn run_frames(slots: usize, images: usize, frames: usize) -> (FramePipeliner<MockDevice>, MockDevice, Vec<FrameReport>) {
        let mut device = MockDevice::new(images);
        let mut pipeliner = FramePipeliner::new(&mut device, slots, None).unwrap();
        let reports = (0..frames).map(|_| pipeliner.draw_frame(&mut device).unwrap()).collect();
        (pipeliner, device, reports)
    }

    #[test]
    fn test_five_slots_three_images_twelve_frames() {
        let (pipeliner, device, reports) = run_frames(5, 3, 12);

        assert_eq!(device.submission_count(), 12);
        assert_eq!(pipeliner.stats().submissions, 12);
        assert!(device.max_outstanding() <= 5);
        assert!(pipeliner.stats().image_reuse_waits >= 1);

        // slot 3 拿到 image 0 时，image 0 仍属于 slot 0
        assert_eq!(reports[3].slot, 3);
        assert_eq!(reports[3].image_index, 0);
        assert_eq!(reports[3].waited_for_slot, Some(0));
        assert!(device.violations().is_empty(), "{:?}", device.violations());
    }

    #[test]
    fn test_slots_equal_images_never_wait_for_image() {
        let (pipeliner, device, reports) = run_frames(3, 3, 12);

        assert_eq!(pipeliner.stats().image_reuse_waits, 0);
        assert!(reports.iter().all(|r| r.waited_for_slot.is_none()));
        assert!(reports.iter().all(|r| r.slot as u32 == r.image_index));
        assert!(device.violations().is_empty(), "{:?}", device.violations());
    }

    #[test]
    fn test_protocol_invariants_hold_for_mixed_counts() {
        for slots in 1..=6 {
            for images in 1..=4 {
                let (_, device, _) = run_frames(slots, images, 25);

                assert!(device.violations().is_empty(), "slots {slots}, images {images}: {:?}", device.violations());
                assert!(device.max_outstanding() <= slots, "slots {slots}, images {images}");
                assert_eq!(device.submission_count(), 25);

                // 同一个 fence 的完成顺序与提交顺序一致
                for (fence, completed) in device.completions() {
                    let issued = &device.issued()[fence];
                    assert!(completed.windows(2).all(|w| w[0] < w[1]));
                    assert_eq!(completed.as_slice(), &issued[..completed.len()]);
                }
            }
        }
    }

    #[test]
    fn test_more_images_than_slots_bounded_by_slots() {
        let (pipeliner, device, _) = run_frames(2, 4, 16);
        assert_eq!(pipeliner.stats().image_reuse_waits, 0);
        assert!(device.max_outstanding() <= 2);
    }

    #[test]
    fn test_first_frames_do_not_block_on_fresh_fences() {
        let mut device = MockDevice::new(3);
        device.stalled = true;
        let mut pipeliner = FramePipeliner::new(&mut device, 3, Some(Duration::from_millis(1))).unwrap();

        for _ in 0..3 {
            pipeliner.draw_frame(&mut device).unwrap();
        }
        assert_eq!(device.outstanding(), 3);
    }

    #[test]
    fn test_slot_wait_timeout_is_resumable() {
        let mut device = MockDevice::new(2);
        device.stalled = true;
        let mut pipeliner = FramePipeliner::new(&mut device, 2, Some(Duration::from_millis(1))).unwrap();
        pipeliner.draw_frame(&mut device).unwrap();
        pipeliner.draw_frame(&mut device).unwrap();

        let err = pipeliner.draw_frame(&mut device).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Timeout {
                stage: WaitStage::SlotFree,
                slot: 0
            }
        ));
        assert_eq!(pipeliner.frame_id(), 2);
        assert_eq!(device.submission_count(), 2);

        device.stalled = false;
        let report = pipeliner.draw_frame(&mut device).unwrap();
        assert_eq!(report.frame_id, 2);
        assert_eq!(device.submission_count(), 3);
        assert!(device.violations().is_empty(), "{:?}", device.violations());
    }

    #[test]
    fn test_image_wait_timeout_keeps_acquired_image() {
        let mut device = MockDevice::new(2);
        device.stalled = true;
        let mut pipeliner = FramePipeliner::new(&mut device, 3, Some(Duration::from_millis(1))).unwrap();
        pipeliner.draw_frame(&mut device).unwrap();
        pipeliner.draw_frame(&mut device).unwrap();

        // slot 2 拿到 image 0，需要等待 slot 0
        let err = pipeliner.draw_frame(&mut device).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Timeout {
                stage: WaitStage::ImageFree,
                slot: 0
            }
        ));

        device.stalled = false;
        let report = pipeliner.draw_frame(&mut device).unwrap();
        assert_eq!(report.image_index, 0);
        assert_eq!(report.waited_for_slot, Some(0));

        // 重试时不会再次 acquire
        let acquires = device.calls().iter().filter(|c| matches!(c, MockCall::Acquire(_))).count();
        assert_eq!(acquires, 3);
        assert!(device.violations().is_empty(), "{:?}", device.violations());
    }

    #[test]
    fn test_acquire_timeout() {
        let mut device = MockDevice::new(3);
        let mut pipeliner = FramePipeliner::new(&mut device, 2, Some(Duration::from_millis(1))).unwrap();
        device.acquire_times_out = true;

        let err = pipeliner.draw_frame(&mut device).unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(
            err,
            FrameError::Timeout {
                stage: WaitStage::AcquireImage,
                slot: 0
            }
        ));

        device.acquire_times_out = false;
        assert!(pipeliner.draw_frame(&mut device).is_ok());
    }

    #[test]
    fn test_invalid_configuration() {
        let mut device = MockDevice::new(3);
        assert!(matches!(FramePipeliner::new(&mut device, 0, None), Err(FrameError::InvalidConfig(_))));

        let mut device = MockDevice::new(0);
        assert!(matches!(FramePipeliner::new(&mut device, 2, None), Err(FrameError::InvalidConfig(_))));
    }

    #[test]
    fn test_out_of_range_image_index() {
        let mut device = MockDevice::new(3);
        let mut pipeliner = FramePipeliner::new(&mut device, 2, None).unwrap();
        device.next_image = 7;

        let err = pipeliner.draw_frame(&mut device).unwrap_err();
        assert!(matches!(
            err,
            FrameError::ImageOutOfRange {
                image_index: 7,
                image_count: 3
            }
        ));
    }

    #[test]
    fn test_shutdown_waits_idle_before_destroy() {
        let (pipeliner, mut device, _) = run_frames(5, 3, 7);
        pipeliner.shutdown(&mut device).unwrap();

        let calls = device.calls();
        let idle_at = calls.iter().position(|c| *c == MockCall::WaitIdle).unwrap();
        let first_destroy = calls
            .iter()
            .position(|c| matches!(c, MockCall::DestroyFence(_) | MockCall::DestroySemaphore(_)))
            .unwrap();
        assert!(idle_at < first_destroy);
        assert_eq!(device.outstanding(), 0);
        assert_eq!(device.live_fences(), 0);
        assert_eq!(device.live_semaphores(), 0);
        assert!(validate_teardown(&device.teardown_steps()).is_ok());
        assert!(device.violations().is_empty(), "{:?}", device.violations());
    }

    #[test]
    fn test_out_of_order_images() {
        let mut device = MockDevice::new(3);
        device.image_sequence = [0, 2, 1, 1, 0, 2, 2, 1, 0, 0, 1, 2].into();
        let mut pipeliner = FramePipeliner::new(&mut device, 4, None).unwrap();
        let reports: Vec<_> = (0..12).map(|_| pipeliner.draw_frame(&mut device).unwrap()).collect();

        // slot 3 拿到的 image 1 仍属于 slot 2
        assert_eq!(reports[3].image_index, 1);
        assert_eq!(reports[3].waited_for_slot, Some(2));
        assert!(device.image_sequence.is_empty());
        assert_eq!(device.submission_count(), 12);
        assert!(device.max_outstanding() <= 4);
        assert!(device.violations().is_empty(), "{:?}", device.violations());
    }

    #[test]
    fn test_pseudo_random_image_order() {
        let mut seed = 0x2545_f491_u32;
        for slots in 1..=5 {
            for images in 1..=4u32 {
                let mut device = MockDevice::new(images as usize);
                device.image_sequence = (0..40)
                    .map(|_| {
                        seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                        (seed >> 16) % images
                    })
                    .collect();
                let mut pipeliner = FramePipeliner::new(&mut device, slots, None).unwrap();
                for _ in 0..40 {
                    pipeliner.draw_frame(&mut device).unwrap();
                }

                assert!(device.violations().is_empty(), "slots {slots}, images {images}: {:?}", device.violations());
                assert!(device.max_outstanding() <= slots, "slots {slots}, images {images}");
            }
        }
    }

    #[test]
    fn test_device_errors_are_not_retried() {
        for op in [MockOp::WaitFence, MockOp::Acquire, MockOp::ResetFence, MockOp::Submit, MockOp::Present] {
            let mut device = MockDevice::new(3);
            let mut pipeliner = FramePipeliner::new(&mut device, 2, None).unwrap();
            for _ in 0..3 {
                pipeliner.draw_frame(&mut device).unwrap();
            }

            device.fail_next(op);
            let attempts = device.attempts(op);
            let submissions = device.submission_count();
            let err = pipeliner.draw_frame(&mut device).unwrap_err();

            assert!(!err.is_timeout());
            assert!(
                matches!(err, FrameError::Device(MockError::Injected { op: failed, .. }) if failed == op),
                "{op:?}: {err:?}"
            );
            assert_eq!(device.attempts(op), attempts + 1, "{op:?} was retried");
            let expected = if op == MockOp::Present { submissions + 1 } else { submissions };
            assert_eq!(device.submission_count(), expected, "{op:?}");
        }
    }

    #[test]
    fn test_partial_creation_releases_created_objects() {
        // 5 个 slot，每个 slot 3 个对象
        for n in 1..=15 {
            let mut device = MockDevice::new(3);
            device.fail_on = Some((MockOp::Create, n));

            let result = FramePipeliner::new(&mut device, 5, None);
            assert!(
                matches!(result, Err(FrameError::Device(MockError::Injected { op: MockOp::Create, call })) if call == n),
                "create #{n}"
            );
            assert_eq!(device.live_fences(), 0, "create #{n}");
            assert_eq!(device.live_semaphores(), 0, "create #{n}");
            assert!(validate_teardown(&device.teardown_steps()).is_ok());
            assert!(device.violations().is_empty(), "{:?}", device.violations());
        }
    }

    #[test]
    fn test_shutdown_destroys_remaining_objects_after_error() {
        let (pipeliner, mut device, _) = run_frames(3, 3, 5);
        device.fail_next(MockOp::Destroy);

        let err = pipeliner.shutdown(&mut device).unwrap_err();
        assert!(matches!(err, FrameError::Device(MockError::Injected { op: MockOp::Destroy, call: 1 })));
        assert_eq!(device.attempts(MockOp::Destroy), 9);
        // 只有第一个 fence 没有被销毁
        assert_eq!(device.live_fences(), 1);
        assert_eq!(device.live_semaphores(), 0);
    }

    #[test]
    fn test_destroy_without_idle_is_flagged() {
        let mut device = MockDevice::new(3);
        let fence = device.create_fence(true, "fence").unwrap();
        let semaphore = device.create_semaphore("semaphore").unwrap();
        device.reset_fence(&fence).unwrap();
        device.submit(0, &semaphore, &semaphore, &fence).unwrap();

        // 没有 wait idle 就销毁
        let forged = IdleToken::new();
        let err = device.destroy_fence(fence, &forged).unwrap_err();
        assert!(matches!(err, MockError::Teardown(TeardownError::DestroyBeforeIdle { .. })));
        assert!(!device.violations().is_empty());

        let steps = device.teardown_steps();
        assert!(matches!(steps.last(), Some(TeardownStep::Destroy(_))));
        assert!(validate_teardown(&steps).is_err());
    }
}
