use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::{
    error::{GfxError, GfxResult},
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    pipelines::{
        pipeline_layout::GfxPipelineLayout,
        shader::{GfxShaderModule, ShaderStageInfo},
    },
};

pub struct GfxGraphicsPipeline {
    pipeline: vk::Pipeline,

    /// 因为多个 pipeline 可以使用同一个 pipeline layout，所以这里使用 Rc
    pipeline_layout: Rc<GfxPipelineLayout>,
    device: Rc<GfxDevice>,
}

impl GfxGraphicsPipeline {
    pub fn new(
        device: Rc<GfxDevice>,
        create_info: &GfxGraphicsPipelineCreateInfo,
        pipeline_layout: Rc<GfxPipelineLayout>,
        debug_name: &str,
    ) -> GfxResult<Self> {
        // dynamic rendering 需要的 framebuffer 信息
        let mut attach_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&create_info.color_attach_formats)
            .depth_attachment_format(create_info.depth_attach_format);

        // shader module 只需要在创建 pipeline 期间存活
        let shader_modules = create_info
            .shader_stages
            .iter()
            .map(|stage| GfxShaderModule::new(device.clone(), &stage.path))
            .collect::<GfxResult<Vec<_>>>()?;
        let shader_stages_info = create_info
            .shader_stages
            .iter()
            .zip(&shader_modules)
            .map(|(stage, module)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage.stage)
                    .module(module.handle())
                    .name(stage.entry_point)
            })
            .collect_vec();

        let vertex_input_state_info = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&create_info.vertex_binding_desc)
            .vertex_attribute_descriptions(&create_info.vertex_attribute_desc);

        let input_assembly_info = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // viewport 和 scissor 具体值由 dynamic 决定，但是数量由该 create info 决定
        let viewport_info = vk::PipelineViewportStateCreateInfo {
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };

        // MSAA 配置
        let msaa_info = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(create_info.msaa_sample);

        // 混合设置：需要为每个 color attachment 分别指定
        let color_blend_states = create_info
            .color_attach_formats
            .iter()
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(false)
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
            })
            .collect_vec();
        let color_blend_info = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_states);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state_info = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages_info)
            .vertex_input_state(&vertex_input_state_info)
            .input_assembly_state(&input_assembly_info)
            .viewport_state(&viewport_info)
            .rasterization_state(&create_info.rasterize_state_info)
            .multisample_state(&msaa_info)
            .color_blend_state(&color_blend_info)
            .depth_stencil_state(&create_info.depth_stencil_info)
            .layout(pipeline_layout.handle())
            .dynamic_state(&dynamic_state_info)
            .push_next(&mut attach_info);

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None)
        }
        .map_err(|(_, result)| GfxError::Driver {
            call: "vkCreateGraphicsPipelines",
            result,
        })?;
        let pipeline = pipelines
            .into_iter()
            .next()
            .ok_or_else(|| GfxError::Invariant("vkCreateGraphicsPipelines returned no pipeline".to_string()))?;

        let pipeline = Self {
            pipeline,
            pipeline_layout,
            device,
        };
        pipeline.device.set_debug_name(&pipeline, debug_name);

        Ok(pipeline)
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout.handle()
    }
}

impl Drop for GfxGraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

impl DebugType for GfxGraphicsPipeline {
    fn debug_type_name() -> &'static str {
        "GfxGraphicsPipeline"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.pipeline
    }
}

pub struct GfxGraphicsPipelineCreateInfo {
    /// dynamic render 需要的 framebuffer 信息
    color_attach_formats: Vec<vk::Format>,
    /// dynamic render 需要的 framebuffer 信息，undefined 表示不使用
    depth_attach_format: vk::Format,

    shader_stages: Vec<ShaderStageInfo>,

    vertex_binding_desc: Vec<vk::VertexInputBindingDescription>,
    vertex_attribute_desc: Vec<vk::VertexInputAttributeDescription>,

    rasterize_state_info: vk::PipelineRasterizationStateCreateInfo<'static>,

    msaa_sample: vk::SampleCountFlags,

    depth_stencil_info: vk::PipelineDepthStencilStateCreateInfo<'static>,
}

impl Default for GfxGraphicsPipelineCreateInfo {
    fn default() -> Self {
        Self {
            color_attach_formats: vec![],
            depth_attach_format: vk::Format::UNDEFINED,

            shader_stages: vec![],

            vertex_binding_desc: vec![],
            vertex_attribute_desc: vec![],

            rasterize_state_info: vk::PipelineRasterizationStateCreateInfo::default()
                .depth_clamp_enable(false)
                .rasterizer_discard_enable(false)
                .polygon_mode(vk::PolygonMode::FILL)
                .line_width(1.0)
                .cull_mode(vk::CullModeFlags::NONE)
                .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
                .depth_bias_enable(false),
            msaa_sample: vk::SampleCountFlags::TYPE_1,

            depth_stencil_info: vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(false)
                .depth_write_enable(false)
                .depth_compare_op(vk::CompareOp::NEVER)
                .depth_bounds_test_enable(false)
                .stencil_test_enable(false),
        }
    }
}

// builder
impl GfxGraphicsPipelineCreateInfo {
    #[inline]
    pub fn attach_info(&mut self, color_attach_formats: Vec<vk::Format>, depth_format: Option<vk::Format>) -> &mut Self {
        self.color_attach_formats = color_attach_formats;
        self.depth_attach_format = depth_format.unwrap_or(vk::Format::UNDEFINED);
        self
    }

    #[inline]
    pub fn shader_stages(&mut self, stages: Vec<ShaderStageInfo>) -> &mut Self {
        self.shader_stages = stages;
        self
    }

    /// 一个 binding，每个顶点只有一个紧密排列的 vec3 位置
    #[inline]
    pub fn vertex_position_vec3(&mut self) -> &mut Self {
        self.vertex_binding_desc = vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: (3 * size_of::<f32>()) as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        self.vertex_attribute_desc = vec![vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 0,
        }];
        self
    }

    #[inline]
    pub fn depth_test(&mut self, depth_test_op: Option<vk::CompareOp>, depth_write: bool) -> &mut Self {
        self.depth_stencil_info.depth_test_enable = depth_test_op.map_or(vk::FALSE, |_| vk::TRUE);
        self.depth_stencil_info.depth_compare_op = depth_test_op.unwrap_or(vk::CompareOp::NEVER);
        self.depth_stencil_info.depth_write_enable = if depth_write { vk::TRUE } else { vk::FALSE };
        self
    }

    #[inline]
    pub fn msaa_sample(&mut self, samples: vk::SampleCountFlags) -> &mut Self {
        self.msaa_sample = samples;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_info_builder() {
        let mut info = GfxGraphicsPipelineCreateInfo::default();
        info.attach_info(vec![vk::Format::B8G8R8A8_UNORM], Some(vk::Format::D32_SFLOAT))
            .vertex_position_vec3()
            .depth_test(Some(vk::CompareOp::LESS), true)
            .msaa_sample(vk::SampleCountFlags::TYPE_4);

        assert_eq!(info.depth_attach_format, vk::Format::D32_SFLOAT);
        assert_eq!(info.vertex_binding_desc[0].stride, 12);
        assert_eq!(info.vertex_attribute_desc[0].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(info.depth_stencil_info.depth_test_enable, vk::TRUE);
        assert_eq!(info.depth_stencil_info.depth_compare_op, vk::CompareOp::LESS);
        assert_eq!(info.msaa_sample, vk::SampleCountFlags::TYPE_4);
    }

    #[test]
    fn test_default_has_no_depth() {
        let info = GfxGraphicsPipelineCreateInfo::default();
        assert_eq!(info.depth_attach_format, vk::Format::UNDEFINED);
        assert_eq!(info.depth_stencil_info.depth_test_enable, vk::FALSE);
        assert_eq!(info.msaa_sample, vk::SampleCountFlags::TYPE_1);
    }
}
