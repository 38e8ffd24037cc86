use std::rc::Rc;

use ash::vk;
use itertools::Itertools;
use vkrtx_crate_tools::{enumed_map, resource::VkrtxPath};
use vkrtx_gfx::{
    GfxResult,
    commands::{barrier::GfxImageBarrier, command_buffer::GfxCommandBuffer},
    descriptors::{
        descriptor::{GfxDescriptorSet, GfxDescriptorSetLayout, layout_binding},
        descriptor_pool::{GfxDescriptorPool, pool_sizes_for},
    },
    gfx_core::GfxCore,
    pipelines::{
        pipeline_layout::GfxPipelineLayout,
        rt_pipeline::GfxRtPipeline,
        shader::{ShaderGroupInfo, ShaderStageInfo},
    },
    raytracing::{
        acceleration::{GfxSceneAcceleration, InstanceTransform},
        sbt::{GfxShaderBindingTable, SbtGroups},
    },
    resources::{
        buffer::GfxBuffer,
        image::{GfxImage2D, GfxImageView},
    },
    swapchain::render_swapchain::GfxRenderSwapchain,
};

use crate::{
    camera::{Camera, RtCameraUniform},
    passes::{RenderPass, record_per_image},
};

enumed_map!(RtStage<ShaderStageInfo>: {
    RayGen: ShaderStageInfo::new(vk::ShaderStageFlags::RAYGEN_KHR, VkrtxPath::shader_build_path("main.rgen")),
    ClosestHit: ShaderStageInfo::new(vk::ShaderStageFlags::CLOSEST_HIT_KHR, VkrtxPath::shader_build_path("main.rchit")),
    Miss: ShaderStageInfo::new(vk::ShaderStageFlags::MISS_KHR, VkrtxPath::shader_build_path("main.rmiss")),
});

// group 的下标就是 sbt 中 record 的下标
enumed_map!(RtGroup<ShaderGroupInfo>: {
    RayGen: ShaderGroupInfo::general(RtStage::RayGen.index() as u32),
    ClosestHit: ShaderGroupInfo::triangles_hit(RtStage::ClosestHit.index() as u32),
    Miss: ShaderGroupInfo::general(RtStage::Miss.index() as u32),
});

/// descriptor set 0 的 binding
mod binding {
    pub const TLAS: u32 = 0;
    pub const STORAGE_IMAGE: u32 = 1;
    pub const CAMERA: u32 = 2;
}

fn sbt_groups() -> SbtGroups {
    SbtGroups {
        raygen: RtGroup::RayGen.index() as u32,
        miss: RtGroup::Miss.index() as u32,
        hit: RtGroup::ClosestHit.index() as u32,
    }
}

/// 光线追踪的立方体：trace rays 写入 storage image，然后拷贝到 swapchain image
pub struct RtPass {
    commands: Vec<GfxCommandBuffer>,

    sbt: GfxShaderBindingTable,
    pipeline: GfxRtPipeline,

    descriptor_set: GfxDescriptorSet,
    _descriptor_pool: GfxDescriptorPool,
    _descriptor_set_layout: GfxDescriptorSetLayout,

    _camera_buffer: GfxBuffer,
    _storage_view: GfxImageView,
    storage_image: GfxImage2D,

    _acceleration: GfxSceneAcceleration,
}

impl RtPass {
    pub fn new(core: &GfxCore, swapchain: &GfxRenderSwapchain, vertices: &[[f32; 3]], camera: &Camera) -> GfxResult<Self> {
        let _span = tracy_client::span!("RtPass::new");
        let device = core.device.clone();
        let extent = swapchain.extent();
        let color_format = swapchain.color_format();

        let acceleration = GfxSceneAcceleration::build(
            &core.allocator,
            &core.gfx_queue,
            &core.command_pool,
            core.physical_device.acc_struct_props(),
            vertices,
            InstanceTransform::IDENTITY,
        )?;

        // storage image 只需要转换一次 layout，之后一直处于 GENERAL
        let storage_image = GfxImage2D::new(
            core.allocator.clone(),
            extent,
            color_format,
            vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_SRC,
            vk::SampleCountFlags::TYPE_1,
            "rt-output",
        )?;
        let storage_view =
            GfxImageView::new_2d(device.clone(), storage_image.handle(), color_format, vk::ImageAspectFlags::COLOR, "rt-output")?;
        core.gfx_queue.one_time_exec(&core.command_pool, "rt-output-layout", |cmd| {
            cmd.image_memory_barrier(
                vk::DependencyFlags::empty(),
                &[GfxImageBarrier::new()
                    .image(storage_image.handle())
                    .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL)
                    .src_mask(vk::PipelineStageFlags2::ALL_COMMANDS, vk::AccessFlags2::empty())
                    .dst_mask(vk::PipelineStageFlags2::ALL_COMMANDS, vk::AccessFlags2::SHADER_STORAGE_WRITE)],
            );
        })?;

        let camera_buffer = GfxBuffer::new_with_data(
            core.allocator.clone(),
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            &[camera.rt_uniform(extent)],
            "rt-camera",
        )?;

        let descriptor_set_layout = GfxDescriptorSetLayout::new(
            device.clone(),
            vec![
                layout_binding(
                    binding::TLAS,
                    vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
                    vk::ShaderStageFlags::RAYGEN_KHR,
                ),
                layout_binding(binding::STORAGE_IMAGE, vk::DescriptorType::STORAGE_IMAGE, vk::ShaderStageFlags::RAYGEN_KHR),
                layout_binding(binding::CAMERA, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::RAYGEN_KHR),
            ],
            "rt",
        )?;
        let descriptor_pool = GfxDescriptorPool::new(
            device.clone(),
            1,
            &pool_sizes_for(descriptor_set_layout.bindings(), 1),
            "rt",
        )?;
        let descriptor_set = GfxDescriptorSet::new(&descriptor_pool, &descriptor_set_layout, "rt")?;
        descriptor_set.write_acceleration_structure(binding::TLAS, acceleration.tlas().handle());
        descriptor_set.write_storage_image(binding::STORAGE_IMAGE, storage_view.handle(), vk::ImageLayout::GENERAL);
        descriptor_set.write_uniform_buffer(
            binding::CAMERA,
            camera_buffer.vk_buffer(),
            size_of::<RtCameraUniform>() as vk::DeviceSize,
        );

        let pipeline_layout =
            Rc::new(GfxPipelineLayout::new(device.clone(), &[descriptor_set_layout.handle()], &[], "rt")?);
        let stages = RtStage::iter().map(|stage| stage.value().clone()).collect_vec();
        let groups = RtGroup::iter().map(|group| *group.value()).collect_vec();
        let pipeline = GfxRtPipeline::new(device, &stages, &groups, pipeline_layout, 1, "rt")?;

        let sbt = GfxShaderBindingTable::new(
            core.allocator.clone(),
            &pipeline,
            sbt_groups(),
            core.physical_device.rt_pipeline_props(),
        )?;

        let mut pass = Self {
            commands: vec![],
            sbt,
            pipeline,
            descriptor_set,
            _descriptor_pool: descriptor_pool,
            _descriptor_set_layout: descriptor_set_layout,
            _camera_buffer: camera_buffer,
            _storage_view: storage_view,
            storage_image,
            _acceleration: acceleration,
        };
        pass.commands = record_per_image(&core.command_pool, swapchain.image_count(), "rt", |cmd, image_index| {
            pass.record(cmd, swapchain.images()[image_index], extent)
        })?;
        Ok(pass)
    }

    fn record(&self, cmd: &GfxCommandBuffer, swapchain_image: vk::Image, extent: vk::Extent2D) -> GfxResult<()> {
        cmd.cmd_bind_pipeline(vk::PipelineBindPoint::RAY_TRACING_KHR, self.pipeline.handle());
        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::RAY_TRACING_KHR,
            self.pipeline.layout(),
            0,
            &[self.descriptor_set.handle()],
        );
        cmd.trace_rays(
            self.sbt.raygen_region(),
            self.sbt.miss_region(),
            self.sbt.hit_region(),
            self.sbt.callable_region(),
            [extent.width, extent.height, 1],
        )?;

        // storage image -> swapchain image
        cmd.image_memory_barrier(
            vk::DependencyFlags::empty(),
            &[
                GfxImageBarrier::new()
                    .image(self.storage_image.handle())
                    .layout_transfer(vk::ImageLayout::GENERAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                    .src_mask(vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR, vk::AccessFlags2::SHADER_STORAGE_WRITE)
                    .dst_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ),
                GfxImageBarrier::new()
                    .image(swapchain_image)
                    .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .src_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::empty())
                    .dst_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE),
            ],
        );

        let subresource = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let copy_region = vk::ImageCopy {
            src_subresource: subresource,
            src_offset: vk::Offset3D::default(),
            dst_subresource: subresource,
            dst_offset: vk::Offset3D::default(),
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
        };
        cmd.cmd_copy_image(
            self.storage_image.handle(),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            swapchain_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[copy_region],
        );

        cmd.image_memory_barrier(
            vk::DependencyFlags::empty(),
            &[
                GfxImageBarrier::new()
                    .image(swapchain_image)
                    .layout_transfer(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR)
                    .src_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
                    .dst_mask(vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::empty()),
                GfxImageBarrier::new()
                    .image(self.storage_image.handle())
                    .layout_transfer(vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::GENERAL)
                    .src_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ)
                    .dst_mask(vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR, vk::AccessFlags2::SHADER_STORAGE_WRITE),
            ],
        );
        Ok(())
    }
}

impl RenderPass for RtPass {
    #[inline]
    fn command_buffers(&self) -> &[GfxCommandBuffer] {
        &self.commands
    }

    #[inline]
    fn wait_stage(&self) -> vk::PipelineStageFlags2 {
        vk::PipelineStageFlags2::TRANSFER
    }
}
