use ash::vk;

/// barrier 使用的 src 和 dst 访问 mask
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxBarrierMask {
    pub src_stage: vk::PipelineStageFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_access: vk::AccessFlags2,
}

impl GfxBarrierMask {
    /// 两次加速结构构建之间的依赖：后一次构建需要读取前一次的结果，并且共用 scratch
    pub const AS_BUILD_TO_AS_BUILD: Self = Self {
        src_stage: vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
        dst_stage: vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
        src_access: vk::AccessFlags2::from_raw(
            vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR.as_raw()
                | vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR.as_raw(),
        ),
        dst_access: vk::AccessFlags2::from_raw(
            vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR.as_raw()
                | vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR.as_raw(),
        ),
    };

    pub fn memory_barrier(&self) -> vk::MemoryBarrier2<'static> {
        vk::MemoryBarrier2::default()
            .src_stage_mask(self.src_stage)
            .src_access_mask(self.src_access)
            .dst_stage_mask(self.dst_stage)
            .dst_access_mask(self.dst_access)
    }
}

/// 便捷创建 image memory barrier 的结构体
pub struct GfxImageBarrier {
    inner: vk::ImageMemoryBarrier2<'static>,
}

impl Default for GfxImageBarrier {
    fn default() -> Self {
        Self {
            inner: vk::ImageMemoryBarrier2 {
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::UNDEFINED,
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_array_layer: 0,
                    layer_count: 1,
                    base_mip_level: 0,
                    level_count: 1,
                },
                ..Default::default()
            },
        }
    }
}

impl GfxImageBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inner(&self) -> &vk::ImageMemoryBarrier2<'static> {
        &self.inner
    }

    /// builder
    #[inline]
    pub fn layout_transfer(mut self, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        self.inner.old_layout = old_layout;
        self.inner.new_layout = new_layout;
        self
    }

    /// builder
    #[inline]
    pub fn src_mask(mut self, src_stage_mask: vk::PipelineStageFlags2, src_access_mask: vk::AccessFlags2) -> Self {
        self.inner.src_stage_mask = src_stage_mask;
        self.inner.src_access_mask = src_access_mask;
        self
    }

    /// builder
    #[inline]
    pub fn dst_mask(mut self, dst_stage_mask: vk::PipelineStageFlags2, dst_access_mask: vk::AccessFlags2) -> Self {
        self.inner.dst_stage_mask = dst_stage_mask;
        self.inner.dst_access_mask = dst_access_mask;
        self
    }

    /// builder
    /// layer 和 miplevel 都使用默认值
    #[inline]
    pub fn image_aspect_flag(mut self, aspect_mask: vk::ImageAspectFlags) -> Self {
        self.inner.subresource_range.aspect_mask = aspect_mask;
        self
    }

    /// builder
    #[inline]
    pub fn image(mut self, image: vk::Image) -> Self {
        self.inner.image = image;
        self
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    #[test]
    fn test_image_barrier_builder() {
        let image = vk::Image::from_raw(0x42);
        let barrier = GfxImageBarrier::new()
            .image(image)
            .layout_transfer(vk::ImageLayout::GENERAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .src_mask(vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR, vk::AccessFlags2::SHADER_STORAGE_WRITE)
            .dst_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ);

        let inner = barrier.inner();
        assert_eq!(inner.image, image);
        assert_eq!(inner.old_layout, vk::ImageLayout::GENERAL);
        assert_eq!(inner.new_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        assert_eq!(inner.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(inner.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
        assert_eq!(inner.dst_access_mask, vk::AccessFlags2::TRANSFER_READ);
    }

    #[test]
    fn test_as_build_barrier_covers_read_and_write() {
        let barrier = GfxBarrierMask::AS_BUILD_TO_AS_BUILD.memory_barrier();
        let rw = vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR | vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR;
        assert_eq!(barrier.src_access_mask, rw);
        assert_eq!(barrier.dst_access_mask, rw);
        assert_eq!(barrier.src_stage_mask, vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR);
    }
}
