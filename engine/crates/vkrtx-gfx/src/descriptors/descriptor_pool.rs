use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::{
    error::{GfxResult, VkResultExt},
    foundation::{debug_messenger::DebugType, device::GfxDevice},
};

/// 描述符池
///
/// 描述符池用于分配描述符集，drop 时一起释放所有分配的描述符集
pub struct GfxDescriptorPool {
    handle: vk::DescriptorPool,
    name: String,
    device: Rc<GfxDevice>,
}

impl GfxDescriptorPool {
    pub fn new(
        device: Rc<GfxDevice>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
        name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let ci = vk::DescriptorPoolCreateInfo::default().max_sets(max_sets).pool_sizes(pool_sizes);
        let handle = unsafe { device.create_descriptor_pool(&ci, None) }.vk_context("vkCreateDescriptorPool")?;
        let pool = Self {
            handle,
            name: name.as_ref().to_string(),
            device,
        };
        pool.device.set_debug_name(&pool, name);
        Ok(pool)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.handle
    }
}

impl Drop for GfxDescriptorPool {
    fn drop(&mut self) {
        log::info!("destroying descriptor pool: {}", self.name);
        unsafe { self.device.destroy_descriptor_pool(self.handle, None) };
    }
}

impl DebugType for GfxDescriptorPool {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorPool"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

/// 根据 layout bindings 计算每种描述符需要的数量，乘以 set 的数量
pub fn pool_sizes_for(bindings: &[vk::DescriptorSetLayoutBinding], set_count: u32) -> Vec<vk::DescriptorPoolSize> {
    bindings
        .iter()
        .map(|b| (b.descriptor_type, b.descriptor_count))
        .into_group_map()
        .into_iter()
        .map(|(ty, counts)| vk::DescriptorPoolSize {
            ty,
            descriptor_count: counts.iter().sum::<u32>() * set_count,
        })
        .sorted_by_key(|size| size.ty.as_raw())
        .collect_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::descriptor::layout_binding;

    #[test]
    fn test_pool_sizes_for() {
        let stage = vk::ShaderStageFlags::RAYGEN_KHR;
        let bindings = [
            layout_binding(0, vk::DescriptorType::ACCELERATION_STRUCTURE_KHR, stage),
            layout_binding(1, vk::DescriptorType::STORAGE_IMAGE, stage),
            layout_binding(2, vk::DescriptorType::UNIFORM_BUFFER, stage),
            layout_binding(3, vk::DescriptorType::UNIFORM_BUFFER, stage),
        ];
        let sizes = pool_sizes_for(&bindings, 2);
        assert_eq!(sizes.len(), 3);

        let count_of = |ty| sizes.iter().find(|s| s.ty == ty).map(|s| s.descriptor_count);
        assert_eq!(count_of(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR), Some(2));
        assert_eq!(count_of(vk::DescriptorType::STORAGE_IMAGE), Some(2));
        assert_eq!(count_of(vk::DescriptorType::UNIFORM_BUFFER), Some(4));
    }
}
