use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::{
    commands::{barrier::GfxImageBarrier, command_pool::GfxCommandPool},
    error::{GfxError, GfxResult, VkResultExt},
    foundation::{debug_messenger::DebugType, device::GfxDevice},
};

/// 命令缓冲封装
///
/// 封装 Vulkan CommandBuffer，提供命令录制接口。
/// 生命周期跟随 command pool，pool 销毁时一起释放。
///
/// # 使用示例
/// ```ignore
/// let cmd = GfxCommandBuffer::new(&pool, "my-pass")?;
/// cmd.begin(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)?;
/// cmd.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, pipeline);
/// // 绘制命令...
/// cmd.end()?;
/// ```
#[derive(Clone)]
pub struct GfxCommandBuffer {
    vk_handle: vk::CommandBuffer,
    device: Rc<GfxDevice>,
}

// new & init
impl GfxCommandBuffer {
    pub fn new(command_pool: &GfxCommandPool, debug_name: &str) -> GfxResult<Self> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool.handle())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let device = command_pool.device().clone();
        let vk_handle = unsafe { device.allocate_command_buffers(&info) }
            .vk_context("vkAllocateCommandBuffers")?
            .into_iter()
            .next()
            .ok_or_else(|| GfxError::Invariant("vkAllocateCommandBuffers returned no command buffer".to_string()))?;

        let cmd_buffer = Self { vk_handle, device };
        cmd_buffer.device.set_debug_name(&cmd_buffer, debug_name);
        Ok(cmd_buffer)
    }

    /// 释放之后，command buffer 不能再被使用
    pub fn free(self, command_pool: &GfxCommandPool) {
        unsafe {
            self.device.free_command_buffers(command_pool.handle(), std::slice::from_ref(&self.vk_handle));
        }
    }
}

// Basic 命令
impl GfxCommandBuffer {
    #[inline]
    pub fn begin(&self, usage_flag: vk::CommandBufferUsageFlags) -> GfxResult<()> {
        unsafe {
            self.device.begin_command_buffer(self.vk_handle, &vk::CommandBufferBeginInfo::default().flags(usage_flag))
        }
        .vk_context("vkBeginCommandBuffer")
    }

    #[inline]
    pub fn end(&self) -> GfxResult<()> {
        unsafe { self.device.end_command_buffer(self.vk_handle) }.vk_context("vkEndCommandBuffer")
    }
}

// getters
impl GfxCommandBuffer {
    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }
}

// 数据传输类型
impl GfxCommandBuffer {
    /// - command type: action
    /// - 支持的 queue：transfer，graphics，compute
    #[inline]
    pub fn cmd_copy_image(
        &self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    ) {
        unsafe {
            self.device.cmd_copy_image(self.vk_handle, src, src_layout, dst, dst_layout, regions);
        }
    }

    /// - command type: state
    /// - 支持的 queue: graphics, compute
    #[inline]
    pub fn cmd_push_constants(
        &self,
        pipeline_layout: vk::PipelineLayout,
        stage: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.device.cmd_push_constants(self.vk_handle, pipeline_layout, stage, offset, data);
        }
    }
}

// 绘制类型的命令
impl GfxCommandBuffer {
    /// - command type: action, state
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_begin_rendering(&self, render_info: &vk::RenderingInfo) {
        unsafe {
            self.device.cmd_begin_rendering(self.vk_handle, render_info);
        }
    }

    /// - command type: action, state
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_end_rendering(&self) {
        unsafe {
            self.device.cmd_end_rendering(self.vk_handle);
        }
    }

    /// - command type: action
    /// - supported queue types: graphics
    ///
    /// 不使用 index buffer 的绘制
    #[inline]
    pub fn cmd_draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device.cmd_draw(self.vk_handle, vertex_count, instance_count, first_vertex, first_instance);
        }
    }

    /// - command type: state
    /// - supported queue types: graphics, compute
    #[inline]
    pub fn bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        pipeline_layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.vk_handle,
                bind_point,
                pipeline_layout,
                first_set,
                descriptor_sets,
                &[],
            );
        }
    }

    /// - command type: state
    /// - supported queue types: graphics, compute
    #[inline]
    pub fn cmd_bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe {
            self.device.cmd_bind_pipeline(self.vk_handle, bind_point, pipeline);
        }
    }

    /// buffers 每个 vertex buffer 以及 offset
    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_bind_vertex_buffers(&self, first_bind: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]) {
        unsafe {
            self.device.cmd_bind_vertex_buffers(self.vk_handle, first_bind, buffers, offsets);
        }
    }

    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_set_viewport(&self, first_viewport: u32, viewports: &[vk::Viewport]) {
        unsafe {
            self.device.cmd_set_viewport(self.vk_handle, first_viewport, viewports);
        }
    }

    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_set_scissor(&self, first_scissor: u32, scissors: &[vk::Rect2D]) {
        unsafe {
            self.device.cmd_set_scissor(self.vk_handle, first_scissor, scissors);
        }
    }
}

// 光追相关
impl GfxCommandBuffer {
    /// - command type: action
    /// - supported queue types: compute
    #[inline]
    pub fn build_acceleration_structure(
        &self,
        geometry: &vk::AccelerationStructureBuildGeometryInfoKHR,
        ranges: &[vk::AccelerationStructureBuildRangeInfoKHR],
    ) -> GfxResult<()> {
        let rt = self.device.rt()?;
        unsafe {
            // 该函数可以一次构建多个 AccelerationStructure，这里只构建了 1 个
            rt.acceleration_structure.cmd_build_acceleration_structures(
                self.vk_handle,
                std::slice::from_ref(geometry),
                &[ranges],
            )
        }
        Ok(())
    }

    /// 光追的入口
    /// - command type: action
    /// - supported queue types: compute
    #[inline]
    pub fn trace_rays(
        &self,
        raygen_table: &vk::StridedDeviceAddressRegionKHR,
        miss_table: &vk::StridedDeviceAddressRegionKHR,
        hit_table: &vk::StridedDeviceAddressRegionKHR,
        callable_table: &vk::StridedDeviceAddressRegionKHR,
        thread_size: [u32; 3],
    ) -> GfxResult<()> {
        let rt = self.device.rt()?;
        unsafe {
            rt.ray_tracing_pipeline.cmd_trace_rays(
                self.vk_handle,
                raygen_table,
                miss_table,
                hit_table,
                callable_table,
                thread_size[0],
                thread_size[1],
                thread_size[2],
            );
        }
        Ok(())
    }
}

// 同步相关命令
impl GfxCommandBuffer {
    /// - command type: synchronize
    /// - supported queue types: graphics, compute, transfer
    #[inline]
    pub fn memory_barrier(&self, barriers: &[vk::MemoryBarrier2]) {
        let dependency_info = vk::DependencyInfo::default().memory_barriers(barriers);
        unsafe {
            self.device.cmd_pipeline_barrier2(self.vk_handle, &dependency_info);
        }
    }

    /// - command type: synchronize
    /// - supported queue types: graphics, compute, transfer
    #[inline]
    pub fn image_memory_barrier(&self, dependency_flags: vk::DependencyFlags, barriers: &[GfxImageBarrier]) {
        let barriers = barriers.iter().map(|b| *b.inner()).collect_vec();
        let dependency_info =
            vk::DependencyInfo::default().image_memory_barriers(&barriers).dependency_flags(dependency_flags);
        unsafe {
            self.device.cmd_pipeline_barrier2(self.vk_handle, &dependency_info);
        }
    }
}

impl DebugType for GfxCommandBuffer {
    fn debug_type_name() -> &'static str {
        "GfxCommandBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}
