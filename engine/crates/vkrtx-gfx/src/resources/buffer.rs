use std::rc::Rc;

use ash::vk;
use vk_mem::Alloc;

use crate::{
    error::{GfxError, GfxResult, VkResultExt},
    foundation::{debug_messenger::DebugType, mem_allocator::GfxAllocator},
};

/// vma 分配的 buffer，drop 时释放
pub struct GfxBuffer {
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,

    map_ptr: Option<*mut u8>,
    size: vk::DeviceSize,
    device_addr: Option<vk::DeviceAddress>,

    name: String,
    allocator: Rc<GfxAllocator>,
}

impl DebugType for GfxBuffer {
    fn debug_type_name() -> &'static str {
        "GfxBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

impl Drop for GfxBuffer {
    fn drop(&mut self) {
        log::debug!("destroying buffer: {}", self.name);
        unsafe {
            if self.map_ptr.is_some() {
                self.allocator.unmap_memory(&mut self.allocation);
            }
            self.allocator.destroy_buffer(self.handle, &mut self.allocation);
        }
    }
}

// new & init
impl GfxBuffer {
    /// - align: buffer 起始地址的对齐，默认对齐到 8 字节
    /// - mem_map: 是否需要 host 可见并持久映射
    /// - 优先使用 device memory
    pub fn new(
        allocator: Rc<GfxAllocator>,
        buffer_size: vk::DeviceSize,
        buffer_usage: vk::BufferUsageFlags,
        align: Option<vk::DeviceSize>,
        mem_map: bool,
        name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let buffer_ci = vk::BufferCreateInfo::default().size(buffer_size).usage(buffer_usage);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            flags: if mem_map {
                vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM
            } else {
                vk_mem::AllocationCreateFlags::empty()
            },
            ..Default::default()
        };

        let align = align.unwrap_or(8);
        let (handle, mut allocation) = unsafe { allocator.create_buffer_with_alignment(&buffer_ci, &alloc_ci, align) }
            .vk_context("vmaCreateBuffer")?;

        let mut map_ptr = None;
        if mem_map {
            match unsafe { allocator.map_memory(&mut allocation) } {
                Ok(ptr) => map_ptr = Some(ptr),
                Err(result) => {
                    unsafe { allocator.destroy_buffer(handle, &mut allocation) };
                    return Err(GfxError::Driver {
                        call: "vmaMapMemory",
                        result,
                    });
                }
            }
        }

        let device = allocator.device();
        let device_addr = buffer_usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS).then(|| unsafe {
            device.get_buffer_device_address(&vk::BufferDeviceAddressInfo::default().buffer(handle))
        });

        let buffer = Self {
            handle,
            allocation,
            map_ptr,
            size: buffer_size,
            device_addr,
            name: name.as_ref().to_string(),
            allocator,
        };
        buffer.allocator.device().set_debug_name(&buffer, name);
        Ok(buffer)
    }

    /// host 可见，并且可以获取 device address 的 buffer，用于顶点、实例、uniform 等数据的上传
    #[inline]
    pub fn new_host_visible(
        allocator: Rc<GfxAllocator>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        Self::new(allocator, size, usage | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS, None, true, name)
    }

    /// 创建 buffer 并写入数据
    pub fn new_with_data<T: bytemuck::Pod>(
        allocator: Rc<GfxAllocator>,
        usage: vk::BufferUsageFlags,
        data: &[T],
        name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let mut buffer = Self::new_host_visible(allocator, bytes.len() as vk::DeviceSize, usage, name)?;
        buffer.transfer_data_by_mmap(data)?;
        Ok(buffer)
    }
}

// getter
impl GfxBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn device_address(&self) -> vk::DeviceAddress {
        self.device_addr.unwrap_or_else(|| unsafe {
            self.allocator
                .device()
                .get_buffer_device_address(&vk::BufferDeviceAddressInfo::default().buffer(self.handle))
        })
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

// tools
impl GfxBuffer {
    /// 通过 mem map 的方式将 data 传入到 buffer 的起始位置
    pub fn transfer_data_by_mmap<T: bytemuck::Pod>(&mut self, data: &[T]) -> GfxResult<()> {
        self.write_bytes(0, bytemuck::cast_slice(data))
    }

    /// 通过 mem map 的方式写入 buffer 的 offset 处，并 flush
    pub fn write_bytes(&mut self, offset: vk::DeviceSize, bytes: &[u8]) -> GfxResult<()> {
        let Some(map_ptr) = self.map_ptr else {
            return Err(GfxError::Invariant(format!("buffer {} is not mapped", self.name)));
        };
        let end = offset + bytes.len() as vk::DeviceSize;
        if end > self.size {
            return Err(GfxError::Invariant(format!(
                "write of {} bytes at {} overflows buffer {} of size {}",
                bytes.len(),
                offset,
                self.name,
                self.size
            )));
        }

        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), map_ptr.add(offset as usize), bytes.len());
        }
        self.allocator
            .flush_allocation(&self.allocation, offset, bytes.len() as vk::DeviceSize)
            .vk_context("vmaFlushAllocation")
    }
}
