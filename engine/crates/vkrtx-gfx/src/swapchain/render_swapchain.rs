use std::rc::Rc;

use ash::vk;

use crate::{
    commands::{command_queue::GfxCommandQueue, semaphore::GfxSemaphore},
    error::{GfxError, GfxResult, VkResultExt},
    foundation::{device::GfxDevice, physical_device::GfxPhysicalDevice},
    resources::image::GfxImageView,
    swapchain::surface::GfxSurface,
};

/// acquire 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GfxAcquireResult {
    Acquired { image_index: u32, suboptimal: bool },
    TimedOut,
}

pub struct GfxRenderSwapchain {
    handle: vk::SwapchainKHR,

    images: Vec<vk::Image>,
    image_views: Vec<GfxImageView>,

    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,

    device: Rc<GfxDevice>,
    _surface: Rc<GfxSurface>,
}

// new & init
impl GfxRenderSwapchain {
    pub fn new(
        device: Rc<GfxDevice>,
        pdevice: &GfxPhysicalDevice,
        surface: Rc<GfxSurface>,
        window_physical_extent: vk::Extent2D,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxRenderSwapchain::new");

        let capabilities = surface.capabilities(pdevice.vk_handle())?;
        let surface_format = choose_surface_format(&surface.formats(pdevice.vk_handle())?)
            .ok_or_else(|| GfxError::Invariant("surface reports no formats".to_string()))?;
        let present_mode = choose_present_mode(&surface.present_modes(pdevice.vk_handle())?);
        let extent = calculate_swapchain_extent(&capabilities, window_physical_extent);
        let image_count = choose_image_count(&capabilities);
        log::info!(
            "create swapchain:
            surface current extent: {}x{}, min extent: {}x{}, max extent: {}x{}
            window physical extent: {}x{}
            final swapchain extent: {}x{}, format: {:?}, present mode: {:?}, min image count: {}",
            capabilities.current_extent.width,
            capabilities.current_extent.height,
            capabilities.min_image_extent.width,
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.width,
            capabilities.max_image_extent.height,
            window_physical_extent.width,
            window_physical_extent.height,
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            image_count
        );

        let queue_family_indices = [
            pdevice.gfx_queue_family().queue_family_index,
            pdevice.present_queue_family().queue_family_index,
        ];
        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            // TRANSFER_DST 用于 ray tracing 的结果拷贝
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);
        create_info = if queue_family_indices[0] != queue_family_indices[1] {
            create_info.image_sharing_mode(vk::SharingMode::CONCURRENT).queue_family_indices(&queue_family_indices)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let handle = unsafe { device.swapchain().create_swapchain(&create_info, None) }
            .vk_context("vkCreateSwapchainKHR")?;
        device.set_object_debug_name(handle, "GfxSwapchain::main");

        let images = unsafe { device.swapchain().get_swapchain_images(handle) }.vk_context("vkGetSwapchainImagesKHR");
        let images = match images {
            Ok(images) => images,
            Err(e) => {
                unsafe { device.swapchain().destroy_swapchain(handle, None) };
                return Err(e);
            }
        };
        log::info!("swapchain image count: {}", images.len());

        let mut swapchain = Self {
            handle,
            images,
            image_views: vec![],
            surface_format,
            present_mode,
            extent,
            device,
            _surface: surface,
        };
        swapchain.image_views = swapchain
            .images
            .iter()
            .enumerate()
            .map(|(i, image)| {
                GfxImageView::new_2d(
                    swapchain.device.clone(),
                    *image,
                    surface_format.format,
                    vk::ImageAspectFlags::COLOR,
                    format!("swapchain-{}", i),
                )
            })
            .collect::<GfxResult<Vec<_>>>()?;

        Ok(swapchain)
    }
}

// getters
impl GfxRenderSwapchain {
    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    #[inline]
    pub fn image_views(&self) -> &[GfxImageView] {
        &self.image_views
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.surface_format.format
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }
}

// update
impl GfxRenderSwapchain {
    /// timeout: nano seconds
    ///
    /// out of date 视为驱动错误，不会重建 swapchain
    pub fn acquire_next_image(&self, semaphore: &GfxSemaphore, timeout: u64) -> GfxResult<GfxAcquireResult> {
        let result = unsafe {
            self.device.swapchain().acquire_next_image(self.handle, timeout, semaphore.handle(), vk::Fence::null())
        };

        match result {
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    log::warn!("swapchain acquire image index {} is not optimal", image_index);
                }
                Ok(GfxAcquireResult::Acquired {
                    image_index,
                    suboptimal,
                })
            }
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Ok(GfxAcquireResult::TimedOut),
            Err(result) => Err(GfxError::Driver {
                call: "vkAcquireNextImageKHR",
                result,
            }),
        }
    }

    /// # return
    /// 是否 suboptimal
    pub fn present_image(&self, queue: &GfxCommandQueue, image_index: u32, wait: &GfxSemaphore) -> GfxResult<bool> {
        let wait_semaphores = [wait.handle()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .image_indices(&image_indices)
            .swapchains(std::slice::from_ref(&self.handle));

        let suboptimal = unsafe { self.device.swapchain().queue_present(queue.handle(), &present_info) }
            .vk_context("vkQueuePresentKHR")?;
        if suboptimal {
            log::warn!("swapchain present image index {} is not optimal", image_index);
        }
        Ok(suboptimal)
    }
}

impl Drop for GfxRenderSwapchain {
    fn drop(&mut self) {
        log::info!("destroying swapchain");
        // image view 需要先于 swapchain 销毁
        self.image_views.clear();
        unsafe {
            self.device.swapchain().destroy_swapchain(self.handle, None);
        }
    }
}

/// 优先 `B8G8R8A8_UNORM` + `SRGB_NONLINEAR`，否则使用第一个
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| f.format == vk::Format::B8G8R8A8_UNORM && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or(formats.first())
        .copied()
}

/// 优先 MAILBOX，其次 FIFO（所有实现都必须支持 FIFO）
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// max_image_count == 0，表示不限制 image 数量
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    if capabilities.max_image_count == 0 {
        capabilities.min_image_count + 1
    } else {
        u32::min(capabilities.max_image_count, capabilities.min_image_count + 1)
    }
}

/// 确定 window 的 extent 尺寸
///
/// 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
pub fn calculate_swapchain_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_physical_extent: vk::Extent2D,
) -> vk::Extent2D {
    let surface_extent = capabilities.current_extent;
    if surface_extent.width == u32::MAX || surface_extent.height == u32::MAX {
        let width = window_physical_extent
            .width
            .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width);
        let height = window_physical_extent
            .height
            .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height);
        vk::Extent2D { width, height }
    } else {
        surface_extent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_choose_surface_format() {
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let bgra = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(choose_surface_format(&[srgb, bgra]), Some(bgra));
        assert_eq!(choose_surface_format(&[srgb]), Some(srgb));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn test_choose_present_mode() {
        use vk::PresentModeKHR as M;
        assert_eq!(choose_present_mode(&[M::FIFO, M::MAILBOX, M::IMMEDIATE]), M::MAILBOX);
        assert_eq!(choose_present_mode(&[M::IMMEDIATE, M::FIFO]), M::FIFO);
        assert_eq!(choose_present_mode(&[M::FIFO_RELAXED]), M::FIFO);
    }

    #[test]
    fn test_choose_image_count() {
        assert_eq!(choose_image_count(&caps((800, 800), 2, 0)), 3);
        assert_eq!(choose_image_count(&caps((800, 800), 2, 8)), 3);
        assert_eq!(choose_image_count(&caps((800, 800), 3, 3)), 3);
    }

    #[test]
    fn test_swapchain_extent() {
        // surface 决定尺寸
        assert_eq!(calculate_swapchain_extent(&caps((1024, 768), 2, 0), extent(800, 800)), extent(1024, 768));
        // 由窗口决定尺寸，并被 clamp
        assert_eq!(calculate_swapchain_extent(&caps((u32::MAX, u32::MAX), 2, 0), extent(800, 800)), extent(800, 800));
        assert_eq!(
            calculate_swapchain_extent(&caps((u32::MAX, u32::MAX), 2, 0), extent(10000, 0)),
            extent(4096, 1)
        );
    }
}
