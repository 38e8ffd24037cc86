use ash::vk;
use vkrtx_gfx::{
    GfxResult,
    commands::{command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool},
};

pub mod raster_pass;
pub mod rt_pass;

/// 把场景画到 swapchain image 上的 pass
///
/// 每个 swapchain image 有一个只录制一次的 command buffer，结束时 image 处于 `PRESENT_SRC_KHR`
pub trait RenderPass {
    /// 下标就是 swapchain image 的下标
    fn command_buffers(&self) -> &[GfxCommandBuffer];

    /// 命令中第一次写 swapchain image 的阶段，submit 需要在这个阶段之前等待 acquire
    fn wait_stage(&self) -> vk::PipelineStageFlags2;
}

/// 为每个 swapchain image 分配并录制一个 command buffer
fn record_per_image(
    command_pool: &GfxCommandPool,
    image_count: usize,
    name: &str,
    mut record: impl FnMut(&GfxCommandBuffer, usize) -> GfxResult<()>,
) -> GfxResult<Vec<GfxCommandBuffer>> {
    (0..image_count)
        .map(|image_index| {
            let cmd = GfxCommandBuffer::new(command_pool, &format!("{}-{}", name, image_index))?;
            cmd.begin(vk::CommandBufferUsageFlags::empty())?;
            record(&cmd, image_index)?;
            cmd.end()?;
            Ok(cmd)
        })
        .collect()
}

/// 整个 extent 的 viewport，y 轴翻转，使得 +y 朝上
fn flipped_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: extent.height as f32,
        width: extent.width as f32,
        height: -(extent.height as f32),
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

#[inline]
fn full_rect(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D::default(),
        extent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flipped_viewport() {
        let viewport = flipped_viewport(vk::Extent2D {
            width: 800,
            height: 600,
        });
        assert_eq!(viewport.y, 600.0);
        assert_eq!(viewport.height, -600.0);
        assert_eq!(viewport.width, 800.0);
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }
}
