use std::rc::Rc;

use ash::vk;

use crate::{
    error::{GfxError, GfxResult},
    foundation::mem_allocator::GfxAllocator,
    pipelines::rt_pipeline::GfxRtPipeline,
    raytracing::align_up,
    resources::buffer::GfxBuffer,
};

/// 各个 shader group 在 pipeline 中的下标，sbt 的 record 顺序与之一致
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbtGroups {
    pub raygen: u32,
    pub miss: u32,
    pub hit: u32,
}

/// SBT 的内存布局：每个 group 一个 record，record 之间的 stride 对齐到 base alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbtLayout {
    handle_size: u32,
    stride: vk::DeviceSize,
    group_count: u32,
}

impl SbtLayout {
    pub fn new(handle_size: u32, base_alignment: u32, group_count: u32) -> Self {
        Self {
            handle_size,
            stride: align_up(handle_size as u64, base_alignment as u64),
            group_count,
        }
    }

    #[inline]
    pub fn stride(&self) -> vk::DeviceSize {
        self.stride
    }

    #[inline]
    pub fn buffer_size(&self) -> vk::DeviceSize {
        self.stride * self.group_count as vk::DeviceSize
    }

    #[inline]
    pub fn record_offset(&self, group: u32) -> vk::DeviceSize {
        self.stride * group as vk::DeviceSize
    }

    /// 将紧密排列的 group handles 拷贝到各自的 record 中
    pub fn pack_records(&self, handles: &[u8]) -> GfxResult<Vec<u8>> {
        let handle_size = self.handle_size as usize;
        let expected = handle_size * self.group_count as usize;
        if handles.len() != expected {
            return Err(GfxError::Invariant(format!(
                "expect {} bytes of group handles, got {}",
                expected,
                handles.len()
            )));
        }

        let mut records = vec![0u8; self.buffer_size() as usize];
        for (group, handle) in handles.chunks_exact(handle_size).enumerate() {
            let offset = self.record_offset(group as u32) as usize;
            records[offset..offset + handle_size].copy_from_slice(handle);
        }
        Ok(records)
    }

    /// 某一个 group 的 region，只包含一个 record
    pub fn region(&self, base_address: vk::DeviceAddress, group: u32) -> vk::StridedDeviceAddressRegionKHR {
        vk::StridedDeviceAddressRegionKHR {
            device_address: base_address + self.record_offset(group),
            stride: self.stride,
            size: self.stride,
        }
    }
}

pub struct GfxShaderBindingTable {
    _buffer: GfxBuffer,

    raygen_region: vk::StridedDeviceAddressRegionKHR,
    miss_region: vk::StridedDeviceAddressRegionKHR,
    hit_region: vk::StridedDeviceAddressRegionKHR,
    callable_region: vk::StridedDeviceAddressRegionKHR,
}

impl GfxShaderBindingTable {
    pub fn new(
        allocator: Rc<GfxAllocator>,
        pipeline: &GfxRtPipeline,
        groups: SbtGroups,
        rt_props: &vk::PhysicalDeviceRayTracingPipelinePropertiesKHR,
    ) -> GfxResult<Self> {
        let group_count = pipeline.group_count();
        if let Some(bad) = [groups.raygen, groups.miss, groups.hit].into_iter().find(|g| *g >= group_count) {
            return Err(GfxError::Invariant(format!(
                "shader group {} is out of range, pipeline has {} groups",
                bad, group_count
            )));
        }

        let layout = SbtLayout::new(
            rt_props.shader_group_handle_size,
            rt_props.shader_group_base_alignment,
            group_count,
        );
        let handles = pipeline.group_handles(rt_props.shader_group_handle_size)?;
        let records = layout.pack_records(&handles)?;
        log::info!(
            "sbt: handle size {}, base alignment {}, stride {}, size {}",
            rt_props.shader_group_handle_size,
            rt_props.shader_group_base_alignment,
            layout.stride(),
            layout.buffer_size()
        );

        let mut buffer = GfxBuffer::new(
            allocator,
            layout.buffer_size(),
            vk::BufferUsageFlags::SHADER_BINDING_TABLE_KHR
                | vk::BufferUsageFlags::TRANSFER_SRC
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            Some(rt_props.shader_group_base_alignment as vk::DeviceSize),
            true,
            "sbt",
        )?;
        buffer.write_bytes(0, &records)?;

        let base_address = buffer.device_address();
        Ok(Self {
            raygen_region: layout.region(base_address, groups.raygen),
            miss_region: layout.region(base_address, groups.miss),
            hit_region: layout.region(base_address, groups.hit),
            callable_region: vk::StridedDeviceAddressRegionKHR::default(),
            _buffer: buffer,
        })
    }
}

// getters
impl GfxShaderBindingTable {
    #[inline]
    pub fn raygen_region(&self) -> &vk::StridedDeviceAddressRegionKHR {
        &self.raygen_region
    }

    #[inline]
    pub fn miss_region(&self) -> &vk::StridedDeviceAddressRegionKHR {
        &self.miss_region
    }

    #[inline]
    pub fn hit_region(&self) -> &vk::StridedDeviceAddressRegionKHR {
        &self.hit_region
    }

    #[inline]
    pub fn callable_region(&self) -> &vk::StridedDeviceAddressRegionKHR {
        &self.callable_region
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let layout = SbtLayout::new(32, 64, 3);
        assert_eq!(layout.stride(), 64);
        assert_eq!(layout.buffer_size(), 192);
        assert_eq!(layout.record_offset(0), 0);
        assert_eq!(layout.record_offset(2), 128);

        // handle 比 alignment 大
        let layout = SbtLayout::new(48, 32, 3);
        assert_eq!(layout.stride(), 64);
        assert_eq!(layout.buffer_size(), 192);
    }

    #[test]
    fn test_pack_records() {
        let layout = SbtLayout::new(4, 8, 3);
        let handles = [1u8, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3];
        let records = layout.pack_records(&handles).unwrap();
        assert_eq!(records, vec![1, 1, 1, 1, 0, 0, 0, 0, 2, 2, 2, 2, 0, 0, 0, 0, 3, 3, 3, 3, 0, 0, 0, 0]);

        assert!(matches!(layout.pack_records(&handles[..8]), Err(GfxError::Invariant(_))));
    }

    #[test]
    fn test_region() {
        // raygen = 0, closest hit = 1, miss = 2
        let layout = SbtLayout::new(32, 64, 3);
        let base = 0x10000;

        let raygen = layout.region(base, 0);
        assert_eq!(raygen.device_address, base);
        assert_eq!(raygen.stride, raygen.size);

        let hit = layout.region(base, 1);
        assert_eq!(hit.device_address, base + 64);
        assert_eq!(hit.size, 64);

        let miss = layout.region(base, 2);
        assert_eq!(miss.device_address, base + 128);
    }
}
