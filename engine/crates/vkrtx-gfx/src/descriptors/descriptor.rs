use std::rc::Rc;

use ash::vk;

use crate::{
    descriptors::descriptor_pool::GfxDescriptorPool,
    error::{GfxError, GfxResult, VkResultExt},
    foundation::{debug_messenger::DebugType, device::GfxDevice},
};

/// 描述符集布局
///
/// 描述符集布局定义了描述符集的结构，包括：
/// - 绑定的数量
/// - 每个绑定的类型
/// - 每个绑定的着色器阶段
pub struct GfxDescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
    device: Rc<GfxDevice>,
}

impl GfxDescriptorSetLayout {
    pub fn new(
        device: Rc<GfxDevice>,
        bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
        debug_name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe { device.create_descriptor_set_layout(&create_info, None) }
            .vk_context("vkCreateDescriptorSetLayout")?;
        let layout = Self {
            layout,
            bindings,
            device,
        };
        layout.device.set_debug_name(&layout, debug_name);
        Ok(layout)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    #[inline]
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'static>] {
        &self.bindings
    }
}

impl Drop for GfxDescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

impl DebugType for GfxDescriptorSetLayout {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorSetLayout"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.layout
    }
}

/// 描述符集
///
/// # Destroy
///
/// 跟随 descriptor pool 一起销毁
pub struct GfxDescriptorSet {
    handle: vk::DescriptorSet,
    device: Rc<GfxDevice>,
}

impl GfxDescriptorSet {
    pub fn new(
        descriptor_pool: &GfxDescriptorPool,
        layout: &GfxDescriptorSetLayout,
        debug_name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(descriptor_pool.handle())
            .set_layouts(std::slice::from_ref(&layout.layout));
        let device = layout.device.clone();
        let handle = unsafe { device.allocate_descriptor_sets(&alloc_info) }
            .vk_context("vkAllocateDescriptorSets")?
            .into_iter()
            .next()
            .ok_or_else(|| GfxError::Invariant("vkAllocateDescriptorSets returned no set".to_string()))?;

        let set = Self { handle, device };
        set.device.set_debug_name(&set, debug_name);
        Ok(set)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSet {
        self.handle
    }
}

// 描述符更新
impl GfxDescriptorSet {
    pub fn write_acceleration_structure(&self, binding: u32, acceleration: vk::AccelerationStructureKHR) {
        let structures = [acceleration];
        let mut as_write =
            vk::WriteDescriptorSetAccelerationStructureKHR::default().acceleration_structures(&structures);
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.handle)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
            // acceleration structure 的数量不是由 image/buffer info 推导的，需要手动指定
            .descriptor_count(1)
            .push_next(&mut as_write);
        unsafe { self.device.update_descriptor_sets(std::slice::from_ref(&write), &[]) };
    }

    pub fn write_storage_image(&self, binding: u32, view: vk::ImageView, layout: vk::ImageLayout) {
        let image_info = vk::DescriptorImageInfo::default().image_view(view).image_layout(layout);
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.handle)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
            .image_info(std::slice::from_ref(&image_info));
        unsafe { self.device.update_descriptor_sets(std::slice::from_ref(&write), &[]) };
    }

    pub fn write_uniform_buffer(&self, binding: u32, buffer: vk::Buffer, range: vk::DeviceSize) {
        let buffer_info = vk::DescriptorBufferInfo::default().buffer(buffer).offset(0).range(range);
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.handle)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(std::slice::from_ref(&buffer_info));
        unsafe { self.device.update_descriptor_sets(std::slice::from_ref(&write), &[]) };
    }
}

impl DebugType for GfxDescriptorSet {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorSet"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

/// 单个 descriptor 的 binding
pub fn layout_binding(
    binding: u32,
    descriptor_type: vk::DescriptorType,
    stage_flags: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(descriptor_type)
        .descriptor_count(1)
        .stage_flags(stage_flags)
}
