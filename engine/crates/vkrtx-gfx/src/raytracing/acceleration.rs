use std::rc::Rc;

use ash::vk;

use crate::{
    commands::{barrier::GfxBarrierMask, command_pool::GfxCommandPool, command_queue::GfxCommandQueue},
    error::{GfxError, GfxResult, VkResultExt},
    foundation::{debug_messenger::DebugType, device::GfxDevice, mem_allocator::GfxAllocator},
    raytracing::align_up,
    resources::buffer::GfxBuffer,
};

/// 加速结构，以及其背后的 buffer
pub struct GfxAcceleration {
    handle: vk::AccelerationStructureKHR,
    device_address: vk::DeviceAddress,
    _buffer: GfxBuffer,
    device: Rc<GfxDevice>,
}

impl GfxAcceleration {
    /// 创建空的加速结构，尚未 build
    fn new(
        allocator: &Rc<GfxAllocator>,
        ty: vk::AccelerationStructureTypeKHR,
        size: vk::DeviceSize,
        name: &str,
    ) -> GfxResult<Self> {
        let device = allocator.device().clone();
        let buffer = GfxBuffer::new(
            allocator.clone(),
            size,
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            None,
            false,
            format!("{}-buffer", name),
        )?;

        let create_info = vk::AccelerationStructureCreateInfoKHR::default().ty(ty).size(size).buffer(buffer.vk_buffer());

        let rt = device.rt()?;
        let handle = unsafe { rt.acceleration_structure.create_acceleration_structure(&create_info, None) }
            .vk_context("vkCreateAccelerationStructureKHR")?;
        let device_address = unsafe {
            rt.acceleration_structure.get_acceleration_structure_device_address(
                &vk::AccelerationStructureDeviceAddressInfoKHR::default().acceleration_structure(handle),
            )
        };

        let acceleration = Self {
            handle,
            device_address,
            _buffer: buffer,
            device,
        };
        acceleration.device.set_debug_name(&acceleration, name);
        Ok(acceleration)
    }

    #[inline]
    pub fn handle(&self) -> vk::AccelerationStructureKHR {
        self.handle
    }

    #[inline]
    pub fn device_address(&self) -> vk::DeviceAddress {
        self.device_address
    }
}

impl Drop for GfxAcceleration {
    fn drop(&mut self) {
        // 能创建出加速结构，说明 rt 扩展一定存在
        if let Ok(rt) = self.device.rt() {
            unsafe { rt.acceleration_structure.destroy_acceleration_structure(self.handle, None) }
        }
    }
}

impl DebugType for GfxAcceleration {
    fn debug_type_name() -> &'static str {
        "GfxAcceleration"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

/// instance 的变换矩阵，3x4，行主序
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceTransform([f32; 12]);

impl InstanceTransform {
    pub const IDENTITY: Self = Self([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
    ]);

    /// 丢弃 4x4 矩阵的最后一行
    pub fn from_rows(rows: [[f32; 4]; 4]) -> Self {
        let mut matrix = [0.0; 12];
        for (r, row) in rows.iter().take(3).enumerate() {
            matrix[r * 4..r * 4 + 4].copy_from_slice(row);
        }
        Self(matrix)
    }

    #[inline]
    pub fn to_vk(self) -> vk::TransformMatrixKHR {
        vk::TransformMatrixKHR { matrix: self.0 }
    }
}

impl Default for InstanceTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// TLAS 中唯一的 instance：custom index 0，mask 0xff，sbt offset 0，关闭背面剔除
pub fn single_instance(transform: InstanceTransform, blas_address: vk::DeviceAddress) -> vk::AccelerationStructureInstanceKHR {
    vk::AccelerationStructureInstanceKHR {
        transform: transform.to_vk(),
        instance_custom_index_and_mask: vk::Packed24_8::new(0, 0xff),
        instance_shader_binding_table_record_offset_and_flags: vk::Packed24_8::new(
            0,
            vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE.as_raw() as u8,
        ),
        acceleration_structure_reference: vk::AccelerationStructureReferenceKHR {
            device_handle: blas_address,
        },
    }
}

/// BLAS 和 TLAS 共用的 scratch 大小
pub fn shared_scratch_size(blas_scratch: vk::DeviceSize, tlas_scratch: vk::DeviceSize, alignment: u32) -> vk::DeviceSize {
    align_up(blas_scratch.max(tlas_scratch), alignment as u64)
}

/// 非索引的三角形列表，顶点数量必须是 3 的非零倍数
pub fn triangle_count(vertex_count: usize) -> GfxResult<u32> {
    if vertex_count == 0 || vertex_count % 3 != 0 {
        return Err(GfxError::InvalidGeometry(format!(
            "vertex count {} is not a non-zero multiple of 3",
            vertex_count
        )));
    }
    u32::try_from(vertex_count / 3)
        .map_err(|_| GfxError::InvalidGeometry(format!("vertex count {} is too large", vertex_count)))
}

/// 单个 mesh 的 BLAS，以及引用它的 TLAS
pub struct GfxSceneAcceleration {
    // tlas 引用了 blas，先销毁 tlas
    tlas: GfxAcceleration,
    blas: GfxAcceleration,
}

impl GfxSceneAcceleration {
    /// 同步构建 BLAS 和 TLAS
    ///
    /// 两次 build 共用一个 scratch buffer，中间插入 AS 读写的 memory barrier
    pub fn build(
        allocator: &Rc<GfxAllocator>,
        queue: &GfxCommandQueue,
        command_pool: &GfxCommandPool,
        acc_props: &vk::PhysicalDeviceAccelerationStructurePropertiesKHR,
        vertices: &[[f32; 3]],
        transform: InstanceTransform,
    ) -> GfxResult<Self> {
        let primitive_count = triangle_count(vertices.len())?;
        let device = allocator.device().clone();
        let rt = device.rt()?;

        // blas
        let vertex_buffer = GfxBuffer::new_with_data(
            allocator.clone(),
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR,
            vertices,
            "blas-vertices",
        )?;
        let triangles = vk::AccelerationStructureGeometryTrianglesDataKHR::default()
            .vertex_format(vk::Format::R32G32B32_SFLOAT)
            .vertex_data(vk::DeviceOrHostAddressConstKHR {
                device_address: vertex_buffer.device_address(),
            })
            .vertex_stride(size_of::<[f32; 3]>() as vk::DeviceSize)
            .max_vertex(vertices.len() as u32 - 1)
            .index_type(vk::IndexType::NONE_KHR);
        let blas_geometry = vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
            .geometry(vk::AccelerationStructureGeometryDataKHR { triangles })
            .flags(vk::GeometryFlagsKHR::OPAQUE);
        let mut blas_build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(std::slice::from_ref(&blas_geometry));

        let mut blas_sizes = vk::AccelerationStructureBuildSizesInfoKHR::default();
        unsafe {
            rt.acceleration_structure.get_acceleration_structure_build_sizes(
                vk::AccelerationStructureBuildTypeKHR::DEVICE,
                &blas_build_info,
                &[primitive_count],
                &mut blas_sizes,
            );
        }
        let blas = GfxAcceleration::new(
            allocator,
            vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
            blas_sizes.acceleration_structure_size,
            "blas",
        )?;

        // tlas
        let instance = single_instance(transform, blas.device_address());
        // instance 数据需要 16 字节对齐
        let mut instance_buffer = GfxBuffer::new(
            allocator.clone(),
            size_of::<vk::AccelerationStructureInstanceKHR>() as vk::DeviceSize,
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            Some(16),
            true,
            "tlas-instances",
        )?;
        let instance_bytes = unsafe {
            std::slice::from_raw_parts(
                (&instance as *const vk::AccelerationStructureInstanceKHR).cast::<u8>(),
                size_of::<vk::AccelerationStructureInstanceKHR>(),
            )
        };
        instance_buffer.write_bytes(0, instance_bytes)?;

        let instances = vk::AccelerationStructureGeometryInstancesDataKHR::default()
            .array_of_pointers(false)
            .data(vk::DeviceOrHostAddressConstKHR {
                device_address: instance_buffer.device_address(),
            });
        let tlas_geometry = vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(vk::GeometryTypeKHR::INSTANCES)
            .geometry(vk::AccelerationStructureGeometryDataKHR { instances })
            .flags(vk::GeometryFlagsKHR::OPAQUE);
        let mut tlas_build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(std::slice::from_ref(&tlas_geometry));

        let mut tlas_sizes = vk::AccelerationStructureBuildSizesInfoKHR::default();
        unsafe {
            rt.acceleration_structure.get_acceleration_structure_build_sizes(
                vk::AccelerationStructureBuildTypeKHR::DEVICE,
                &tlas_build_info,
                &[1],
                &mut tlas_sizes,
            );
        }
        let tlas = GfxAcceleration::new(
            allocator,
            vk::AccelerationStructureTypeKHR::TOP_LEVEL,
            tlas_sizes.acceleration_structure_size,
            "tlas",
        )?;

        // 共用的 scratch buffer
        let scratch_alignment = acc_props.min_acceleration_structure_scratch_offset_alignment;
        let scratch_size = shared_scratch_size(
            blas_sizes.build_scratch_size,
            tlas_sizes.build_scratch_size,
            scratch_alignment,
        );
        log::info!(
            "acceleration sizes: blas {}, tlas {}, shared scratch {}",
            blas_sizes.acceleration_structure_size,
            tlas_sizes.acceleration_structure_size,
            scratch_size
        );
        let scratch_buffer = GfxBuffer::new(
            allocator.clone(),
            scratch_size,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            Some(scratch_alignment as vk::DeviceSize),
            false,
            "acceleration-scratch",
        )?;
        let scratch_data = vk::DeviceOrHostAddressKHR {
            device_address: scratch_buffer.device_address(),
        };

        blas_build_info = blas_build_info.dst_acceleration_structure(blas.handle()).scratch_data(scratch_data);
        tlas_build_info = tlas_build_info.dst_acceleration_structure(tlas.handle()).scratch_data(scratch_data);

        let blas_range = vk::AccelerationStructureBuildRangeInfoKHR::default().primitive_count(primitive_count);
        let tlas_range = vk::AccelerationStructureBuildRangeInfoKHR::default().primitive_count(1);

        queue.one_time_exec(command_pool, "build-acceleration", |cmd| -> GfxResult<()> {
            cmd.build_acceleration_structure(&blas_build_info, std::slice::from_ref(&blas_range))?;
            // 两次 build 共用 scratch，不能重叠
            cmd.memory_barrier(&[GfxBarrierMask::AS_BUILD_TO_AS_BUILD.memory_barrier()]);
            cmd.build_acceleration_structure(&tlas_build_info, std::slice::from_ref(&tlas_range))
        })??;

        // 等待 fence 之后，vertex、instance、scratch buffer 都可以释放
        drop(scratch_buffer);
        drop(instance_buffer);
        drop(vertex_buffer);

        Ok(Self { tlas, blas })
    }

    #[inline]
    pub fn tlas(&self) -> &GfxAcceleration {
        &self.tlas
    }

    #[inline]
    pub fn blas(&self) -> &GfxAcceleration {
        &self.blas
    }
}
