use std::rc::Rc;

use ash::vk;
use itertools::Itertools;
use vkrtx_crate_tools::{enumed_map, resource::VkrtxPath};
use vkrtx_gfx::{
    GfxResult,
    commands::{barrier::GfxImageBarrier, command_buffer::GfxCommandBuffer},
    gfx_core::GfxCore,
    pipelines::{
        graphics_pipeline::{GfxGraphicsPipeline, GfxGraphicsPipelineCreateInfo},
        pipeline_layout::GfxPipelineLayout,
        shader::ShaderStageInfo,
    },
    resources::{
        buffer::GfxBuffer,
        image::{GfxImage2D, GfxImageView, depth_aspect},
    },
    swapchain::render_swapchain::GfxRenderSwapchain,
};

use crate::{
    camera::Camera,
    passes::{RenderPass, flipped_viewport, full_rect, record_per_image},
};

enumed_map!(RasterStage<ShaderStageInfo>: {
    Vertex: ShaderStageInfo::new(vk::ShaderStageFlags::VERTEX, VkrtxPath::shader_build_path("cube.vert")),
    Fragment: ShaderStageInfo::new(vk::ShaderStageFlags::FRAGMENT, VkrtxPath::shader_build_path("cube.frag")),
});

/// 多重采样的 color target，渲染结束后 resolve 到 swapchain image
struct MsaaTarget {
    view: GfxImageView,
    image: GfxImage2D,
}

/// 光栅化的立方体，可选 MSAA
pub struct RasterPass {
    commands: Vec<GfxCommandBuffer>,

    pipeline: GfxGraphicsPipeline,
    vertex_buffer: GfxBuffer,
    vertex_count: u32,

    msaa_target: Option<MsaaTarget>,
    depth_view: GfxImageView,
    depth_image: GfxImage2D,

    samples: vk::SampleCountFlags,
}

impl RasterPass {
    /// samples 为 `TYPE_1` 时不使用 MSAA
    pub fn new(
        core: &GfxCore,
        swapchain: &GfxRenderSwapchain,
        vertices: &[[f32; 3]],
        camera: &Camera,
        samples: vk::SampleCountFlags,
        clear_color: [f32; 4],
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("RasterPass::new");
        let device = core.device.clone();
        let extent = swapchain.extent();
        let color_format = swapchain.color_format();
        let depth_format = core.physical_device.depth_format();
        log::info!("raster pass: depth format {:?}, samples {:?}", depth_format, samples);

        let vertex_buffer =
            GfxBuffer::new_with_data(core.allocator.clone(), vk::BufferUsageFlags::VERTEX_BUFFER, vertices, "cube-vertices")?;

        let depth_image = GfxImage2D::new(
            core.allocator.clone(),
            extent,
            depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            samples,
            "depth",
        )?;
        let depth_view =
            GfxImageView::new_2d(device.clone(), depth_image.handle(), depth_format, depth_aspect(depth_format), "depth")?;

        let msaa_target = if samples != vk::SampleCountFlags::TYPE_1 {
            let image = GfxImage2D::new(
                core.allocator.clone(),
                extent,
                color_format,
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
                samples,
                "msaa-color",
            )?;
            let view =
                GfxImageView::new_2d(device.clone(), image.handle(), color_format, vk::ImageAspectFlags::COLOR, "msaa-color")?;
            Some(MsaaTarget { view, image })
        } else {
            None
        };

        let push_constant_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(size_of::<glam::Mat4>() as u32);
        let pipeline_layout =
            Rc::new(GfxPipelineLayout::new(device.clone(), &[], std::slice::from_ref(&push_constant_range), "raster")?);

        let mut pipeline_ci = GfxGraphicsPipelineCreateInfo::default();
        pipeline_ci
            .shader_stages(RasterStage::iter().map(|stage| stage.value().clone()).collect_vec())
            .attach_info(vec![color_format], Some(depth_format))
            .vertex_position_vec3()
            .depth_test(Some(vk::CompareOp::LESS), true)
            .msaa_sample(samples);
        let pipeline = GfxGraphicsPipeline::new(device, &pipeline_ci, pipeline_layout, "raster")?;

        let mut pass = Self {
            commands: vec![],
            pipeline,
            vertex_count: vertices.len() as u32,
            vertex_buffer,
            msaa_target,
            depth_view,
            depth_image,
            samples,
        };

        let mvp = camera.mvp(extent);
        pass.commands = record_per_image(&core.command_pool, swapchain.image_count(), "raster", |cmd, image_index| {
            pass.record(cmd, swapchain, image_index, extent, &mvp, clear_color);
            Ok(())
        })?;
        Ok(pass)
    }

    fn record(
        &self,
        cmd: &GfxCommandBuffer,
        swapchain: &GfxRenderSwapchain,
        image_index: usize,
        extent: vk::Extent2D,
        mvp: &glam::Mat4,
        clear_color: [f32; 4],
    ) {
        let swapchain_image = swapchain.images()[image_index];
        let swapchain_view = swapchain.image_views()[image_index].handle();
        let depth_format = self.depth_image.format();

        let mut barriers = vec![
            GfxImageBarrier::new()
                .image(swapchain_image)
                .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .src_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags2::empty())
                .dst_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE),
            GfxImageBarrier::new()
                .image(self.depth_image.handle())
                .image_aspect_flag(depth_aspect(depth_format))
                .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
                .src_mask(
                    vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
                    vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
                )
                .dst_mask(
                    vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
                    vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
                ),
        ];
        if let Some(msaa) = &self.msaa_target {
            barriers.push(
                GfxImageBarrier::new()
                    .image(msaa.image.handle())
                    .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .src_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
                    .dst_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE),
            );
        }
        cmd.image_memory_barrier(vk::DependencyFlags::empty(), &barriers);

        let clear_value = vk::ClearValue {
            color: vk::ClearColorValue { float32: clear_color },
        };
        let color_attachment = match &self.msaa_target {
            Some(msaa) => vk::RenderingAttachmentInfo::default()
                .image_view(msaa.view.handle())
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .resolve_mode(vk::ResolveModeFlags::AVERAGE)
                .resolve_image_view(swapchain_view)
                .resolve_image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .clear_value(clear_value),
            None => vk::RenderingAttachmentInfo::default()
                .image_view(swapchain_view)
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(clear_value),
        };
        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.depth_view.handle())
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            });
        let rendering_info = vk::RenderingInfo::default()
            .render_area(full_rect(extent))
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment))
            .depth_attachment(&depth_attachment);

        cmd.cmd_begin_rendering(&rendering_info);
        {
            cmd.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());
            cmd.cmd_set_viewport(0, &[flipped_viewport(extent)]);
            cmd.cmd_set_scissor(0, &[full_rect(extent)]);
            cmd.cmd_push_constants(self.pipeline.layout(), vk::ShaderStageFlags::VERTEX, 0, bytemuck::bytes_of(mvp));
            cmd.cmd_bind_vertex_buffers(0, &[self.vertex_buffer.vk_buffer()], &[0]);
            cmd.cmd_draw(self.vertex_count, 1, 0, 0);
        }
        cmd.cmd_end_rendering();

        cmd.image_memory_barrier(
            vk::DependencyFlags::empty(),
            &[GfxImageBarrier::new()
                .image(swapchain_image)
                .layout_transfer(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR)
                .src_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
                .dst_mask(vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::empty())],
        );
    }

    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }
}

impl RenderPass for RasterPass {
    #[inline]
    fn command_buffers(&self) -> &[GfxCommandBuffer] {
        &self.commands
    }

    #[inline]
    fn wait_stage(&self) -> vk::PipelineStageFlags2 {
        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_stages() {
        assert_eq!(RasterStage::COUNT, 2);
        assert_eq!(RasterStage::Vertex.value().stage, vk::ShaderStageFlags::VERTEX);
        assert!(RasterStage::Fragment.value().path.ends_with("engine/shader/.build/cube.frag.spv"));
        assert_eq!(RasterStage::Fragment.value().entry_point, c"main");
    }
}
