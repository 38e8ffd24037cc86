use std::rc::Rc;

use ash::vk;
use vk_mem::Alloc;

use crate::{
    error::{GfxResult, VkResultExt},
    foundation::{debug_messenger::DebugType, device::GfxDevice, mem_allocator::GfxAllocator},
};

/// vma 分配的 2D image，drop 时释放
pub struct GfxImage2D {
    handle: vk::Image,
    allocation: vk_mem::Allocation,

    extent: vk::Extent2D,
    format: vk::Format,

    name: String,
    allocator: Rc<GfxAllocator>,
}

// new & init
impl GfxImage2D {
    pub fn new(
        allocator: Rc<GfxAllocator>,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        samples: vk::SampleCountFlags,
        debug_name: &str,
    ) -> GfxResult<Self> {
        let image_ci = Self::image_2d_info(extent, format, usage, samples);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };
        let (handle, allocation) =
            unsafe { allocator.create_image(&image_ci, &alloc_ci) }.vk_context("vmaCreateImage")?;

        let image = Self {
            handle,
            allocation,
            extent,
            format,
            name: debug_name.to_string(),
            allocator,
        };
        image.allocator.device().set_debug_name(&image, debug_name);
        Ok(image)
    }

    pub fn image_2d_info(
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        samples: vk::SampleCountFlags,
    ) -> vk::ImageCreateInfo<'static> {
        vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
    }
}

// getter
impl GfxImage2D {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl DebugType for GfxImage2D {
    fn debug_type_name() -> &'static str {
        "GfxImage2D"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

impl Drop for GfxImage2D {
    fn drop(&mut self) {
        log::debug!("destroying image: {}", self.name);
        unsafe { self.allocator.destroy_image(self.handle, &mut self.allocation) }
    }
}

/// 2D image view，既可以指向 vma 分配的 image，也可以指向 swapchain image
pub struct GfxImageView {
    handle: vk::ImageView,
    device: Rc<GfxDevice>,
}

// new & init
impl GfxImageView {
    pub fn new_2d(
        device: Rc<GfxDevice>,
        image: vk::Image,
        format: vk::Format,
        aspect_mask: vk::ImageAspectFlags,
        name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let info = vk::ImageViewCreateInfo {
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };

        let handle = unsafe { device.create_image_view(&info, None) }.vk_context("vkCreateImageView")?;
        let image_view = Self { handle, device };
        image_view.device.set_debug_name(&image_view, name);
        Ok(image_view)
    }
}

// getters
impl GfxImageView {
    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.handle
    }
}

impl DebugType for GfxImageView {
    fn debug_type_name() -> &'static str {
        "GfxImage2DView"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

impl Drop for GfxImageView {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.handle, None);
        }
    }
}

/// 深度格式对应的 aspect
pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D16_UNORM_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_aspect() {
        assert_eq!(depth_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            depth_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn test_image_2d_info() {
        let info = GfxImage2D::image_2d_info(
            vk::Extent2D {
                width: 800,
                height: 600,
            },
            vk::Format::B8G8R8A8_UNORM,
            vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_SRC,
            vk::SampleCountFlags::TYPE_1,
        );
        assert_eq!(info.extent.depth, 1);
        assert_eq!(info.extent.width, 800);
        assert_eq!(info.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(info.mip_levels, 1);
    }
}
