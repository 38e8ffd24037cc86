/// 帧计数器
///
/// frame id 一直累加，slot 下标由 frame id 对 slot 数量取模得到
#[derive(Debug, Clone)]
pub struct FrameCounter {
    /// 当前的帧序号
    frame_id: u64,
    slot_count: usize,
}
// new & init
impl FrameCounter {
    pub fn new(init_frame_id: u64, slot_count: usize) -> Self {
        debug_assert!(slot_count > 0);
        Self {
            frame_id: init_frame_id,
            slot_count,
        }
    }
}
// update
impl FrameCounter {
    #[inline]
    pub fn next_frame(&mut self) {
        self.frame_id = self.frame_id.wrapping_add(1);
    }
}
// getters
impl FrameCounter {
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }
    #[inline]
    pub fn slot_index(&self) -> usize {
        (self.frame_id % self.slot_count as u64) as usize
    }
    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}{}]", self.frame_id, slot_label(self.slot_index()))
    }
}

/// slot 的可读名字：A, B, C...，超过 26 个之后用数字
pub fn slot_label(slot: usize) -> String {
    if slot < 26 {
        char::from(b'A' + slot as u8).to_string()
    } else {
        format!("#{slot}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_cycles() {
        let mut counter = FrameCounter::new(0, 5);
        let slots: Vec<_> = (0..7)
            .map(|_| {
                let slot = counter.slot_index();
                counter.next_frame();
                slot
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 2, 3, 4, 0, 1]);
        assert_eq!(counter.frame_id(), 7);
    }

    #[test]
    fn test_frame_name() {
        let counter = FrameCounter::new(12, 5);
        assert_eq!(counter.frame_name(), "[F12C]");
        assert_eq!(slot_label(30), "#30");
    }
}
