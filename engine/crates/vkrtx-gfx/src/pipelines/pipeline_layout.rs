use std::rc::Rc;

use ash::vk;

use crate::{
    error::{GfxResult, VkResultExt},
    foundation::{debug_messenger::DebugType, device::GfxDevice},
};

pub struct GfxPipelineLayout {
    handle: vk::PipelineLayout,
    device: Rc<GfxDevice>,
}

impl GfxPipelineLayout {
    pub fn new(
        device: Rc<GfxDevice>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
        debug_name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let pipeline_layout_create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);
        let handle = unsafe { device.create_pipeline_layout(&pipeline_layout_create_info, None) }
            .vk_context("vkCreatePipelineLayout")?;
        let layout = Self { handle, device };
        layout.device.set_debug_name(&layout, debug_name);
        Ok(layout)
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }
}

impl Drop for GfxPipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.handle, None);
        }
    }
}

impl DebugType for GfxPipelineLayout {
    fn debug_type_name() -> &'static str {
        "GfxPipelineLayout"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
