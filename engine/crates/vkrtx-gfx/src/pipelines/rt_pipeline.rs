use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::{
    error::{GfxError, GfxResult, VkResultExt},
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    pipelines::{
        pipeline_layout::GfxPipelineLayout,
        shader::{GfxShaderModule, ShaderGroupInfo, ShaderStageInfo},
    },
};

/// ray tracing pipeline
///
/// stages 和 groups 的顺序决定了 group index，也决定了 sbt 中 record 的顺序
pub struct GfxRtPipeline {
    pipeline: vk::Pipeline,
    group_count: u32,

    pipeline_layout: Rc<GfxPipelineLayout>,
    device: Rc<GfxDevice>,
}

impl GfxRtPipeline {
    pub fn new(
        device: Rc<GfxDevice>,
        stages: &[ShaderStageInfo],
        groups: &[ShaderGroupInfo],
        pipeline_layout: Rc<GfxPipelineLayout>,
        max_recursion_depth: u32,
        debug_name: &str,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxRtPipeline::new");

        let shader_modules = stages
            .iter()
            .map(|stage| GfxShaderModule::new(device.clone(), &stage.path))
            .collect::<GfxResult<Vec<_>>>()?;
        let stage_infos = stages
            .iter()
            .zip(&shader_modules)
            .map(|(stage, module)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage.stage)
                    .module(module.handle())
                    .name(stage.entry_point)
            })
            .collect_vec();
        let group_infos = groups.iter().map(|g| g.to_vk()).collect_vec();

        let pipeline_ci = vk::RayTracingPipelineCreateInfoKHR::default()
            .stages(&stage_infos)
            .groups(&group_infos)
            .max_pipeline_ray_recursion_depth(max_recursion_depth)
            .layout(pipeline_layout.handle());

        let pipelines = unsafe {
            device.rt()?.ray_tracing_pipeline.create_ray_tracing_pipelines(
                vk::DeferredOperationKHR::null(),
                vk::PipelineCache::null(),
                std::slice::from_ref(&pipeline_ci),
                None,
            )
        }
        .map_err(|(_, result)| GfxError::Driver {
            call: "vkCreateRayTracingPipelinesKHR",
            result,
        })?;
        let pipeline = pipelines
            .into_iter()
            .next()
            .ok_or_else(|| GfxError::Invariant("vkCreateRayTracingPipelinesKHR returned no pipeline".to_string()))?;

        let pipeline = Self {
            pipeline,
            group_count: groups.len() as u32,
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

    #[inline]
    pub fn group_count(&self) -> u32 {
        self.group_count
    }

    /// 所有 group 的 handle，按照 group index 紧密排列，每个 handle_size 字节
    pub fn group_handles(&self, handle_size: u32) -> GfxResult<Vec<u8>> {
        let data_size = (self.group_count * handle_size) as usize;
        unsafe {
            self.device.rt()?.ray_tracing_pipeline.get_ray_tracing_shader_group_handles(
                self.pipeline,
                0,
                self.group_count,
                data_size,
            )
        }
        .vk_context("vkGetRayTracingShaderGroupHandlesKHR")
    }
}

impl Drop for GfxRtPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

impl DebugType for GfxRtPipeline {
    fn debug_type_name() -> &'static str {
        "GfxRtPipeline"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.pipeline
    }
}
