/// 记录每个 swapchain image 当前被哪个 slot 的 fence 占用
///
/// None 表示 image 没有被任何未确认完成的提交占用
#[derive(Debug, Clone)]
pub struct ImageOwners {
    owners: Vec<Option<usize>>,
}
impl ImageOwners {
    pub fn new(image_count: usize) -> Self {
        Self {
            owners: vec![None; image_count],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    #[inline]
    pub fn owner(&self, image_index: u32) -> Option<usize> {
        self.owners.get(image_index as usize).copied().flatten()
    }

    /// image 被 `slot` 以外的 slot 占用时，返回那个 slot
    #[inline]
    pub fn conflicting_owner(&self, image_index: u32, slot: usize) -> Option<usize> {
        self.owner(image_index).filter(|&owner| owner != slot)
    }

    /// 返回之前的 owner
    pub fn bind(&mut self, image_index: u32, slot: usize) -> Option<usize> {
        self.owners[image_index as usize].replace(slot)
    }

    /// slot 的 fence 已经确认 signaled，它占用的 image 都可以复用
    pub fn release_slot(&mut self, slot: usize) {
        self.owners.iter_mut().filter(|owner| **owner == Some(slot)).for_each(|owner| *owner = None);
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<usize>> + '_ {
        self.owners.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_only_for_other_slot() {
        let mut owners = ImageOwners::new(3);
        assert_eq!(owners.bind(0, 0), None);
        assert_eq!(owners.conflicting_owner(0, 0), None);
        assert_eq!(owners.conflicting_owner(0, 3), Some(0));
        assert_eq!(owners.conflicting_owner(1, 3), None);
    }

    #[test]
    fn test_release_slot_frees_its_images() {
        let mut owners = ImageOwners::new(3);
        owners.bind(0, 1);
        owners.bind(2, 1);
        owners.bind(1, 0);
        owners.release_slot(1);
        assert_eq!(owners.iter().collect::<Vec<_>>(), vec![None, Some(0), None]);
    }

    #[test]
    fn test_rebind_returns_previous_owner() {
        let mut owners = ImageOwners::new(2);
        owners.bind(1, 4);
        assert_eq!(owners.bind(1, 2), Some(4));
        assert_eq!(owners.owner(1), Some(2));
        assert_eq!(owners.owner(7), None);
    }
}
