use std::{ffi::CStr, ptr::null_mut};

use ash::vk;
use itertools::Itertools;

use crate::{
    commands::command_queue::GfxQueueFamily,
    error::{GfxError, GfxResult, VkResultExt},
    foundation::{debug_messenger::DebugType, instance::GfxInstance},
    swapchain::surface::GfxSurface,
};

/// 深度格式的候选，按优先级排列
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] =
    [vk::Format::D32_SFLOAT, vk::Format::D32_SFLOAT_S8_UINT, vk::Format::D24_UNORM_S8_UINT];

/// 表示一张被选中的物理显卡
pub struct GfxPhysicalDevice {
    vk_handle: vk::PhysicalDevice,
    device_name: String,

    /// 当前 gpu 的基础属性
    basic_props: vk::PhysicalDeviceProperties,

    /// 当前 gpu 的 ray tracing 属性，未开启 ray tracing 时为默认值
    rt_pipeline_props: vk::PhysicalDeviceRayTracingPipelinePropertiesKHR<'static>,

    /// 当前 gpu 的加速结构属性，未开启 ray tracing 时为默认值
    acc_struct_props: vk::PhysicalDeviceAccelerationStructurePropertiesKHR<'static>,

    gfx_queue_family: GfxQueueFamily,
    present_queue_family: GfxQueueFamily,
    depth_format: vk::Format,
    ray_tracing: bool,
}

/// 选择 gpu 时收集到的信息，用来判断是否满足要求
#[derive(Debug, Clone)]
struct DeviceCandidate {
    name: String,
    device_type: vk::PhysicalDeviceType,
    api_version: u32,
    missing_exts: Vec<String>,
    gfx_family: Option<u32>,
    present_family: Option<u32>,
    surface_format_count: usize,
    present_mode_count: usize,
    depth_format: Option<vk::Format>,
}

impl DeviceCandidate {
    /// 不满足要求的原因，None 表示可用
    fn rejection_reason(&self) -> Option<String> {
        if self.api_version < vk::API_VERSION_1_3 {
            return Some("vulkan 1.3 is not supported".to_string());
        }
        if !self.missing_exts.is_empty() {
            return Some(format!("missing device extensions: {}", self.missing_exts.join(", ")));
        }
        if self.gfx_family.is_none() {
            return Some("no graphics queue family".to_string());
        }
        if self.present_family.is_none() {
            return Some("no queue family can present to the surface".to_string());
        }
        if self.surface_format_count == 0 {
            return Some("surface reports no formats".to_string());
        }
        if self.present_mode_count == 0 {
            return Some("surface reports no present modes".to_string());
        }
        if self.depth_format.is_none() {
            return Some("no supported depth attachment format".to_string());
        }
        None
    }
}

// new & init
impl GfxPhysicalDevice {
    /// 选择一张满足要求的 gpu，优先选择独立显卡
    ///
    /// 所有 gpu 都不满足要求时，返回 `NoSuitableDevice`，其中列出每张 gpu 被拒绝的原因
    pub fn select(instance: &GfxInstance, surface: &GfxSurface, ray_tracing: bool) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxPhysicalDevice::select");

        let ash_instance = instance.ash_instance();
        let pdevices = unsafe { ash_instance.enumerate_physical_devices() }.vk_context("vkEnumeratePhysicalDevices")?;
        let required_exts = Self::required_device_exts(ray_tracing);

        let mut suitable = Vec::new();
        let mut reasons = Vec::new();
        for pdevice in pdevices {
            let candidate = Self::inspect(ash_instance, surface, pdevice, &required_exts)?;
            match candidate.rejection_reason() {
                None => {
                    log::info!("gpu {} is suitable", candidate.name);
                    suitable.push((pdevice, candidate));
                }
                Some(reason) => {
                    log::info!("gpu {} is rejected: {}", candidate.name, reason);
                    reasons.push(format!("\n\t{}: {}", candidate.name, reason));
                }
            }
        }

        let device_types = suitable.iter().map(|(_, c)| c.device_type).collect_vec();
        let Some(index) = prefer_discrete(&device_types) else {
            let reasons = if reasons.is_empty() { "\n\tno vulkan device found".to_string() } else { reasons.concat() };
            return Err(GfxError::NoSuitableDevice(reasons));
        };
        let (pdevice, candidate) = suitable.swap_remove(index);

        Ok(Self::new(ash_instance, pdevice, candidate, ray_tracing))
    }

    fn new(
        instance: &ash::Instance,
        pdevice: vk::PhysicalDevice,
        candidate: DeviceCandidate,
        ray_tracing: bool,
    ) -> Self {
        let mut rt_props = vk::PhysicalDeviceRayTracingPipelinePropertiesKHR::default();
        let mut acc_props = vk::PhysicalDeviceAccelerationStructurePropertiesKHR::default();
        let basic_props;
        unsafe {
            if ray_tracing {
                let mut props2 =
                    vk::PhysicalDeviceProperties2::default().push_next(&mut rt_props).push_next(&mut acc_props);
                instance.get_physical_device_properties2(pdevice, &mut props2);
                basic_props = props2.properties;
            } else {
                basic_props = instance.get_physical_device_properties(pdevice);
            }
        }
        rt_props.p_next = null_mut();
        acc_props.p_next = null_mut();
        if ray_tracing {
            log::info!("physical device ray tracing props:\n{:#?}", rt_props);
            log::info!("physical device acceleration structure props:\n{:#?}", acc_props);
        }

        let queue_family_props = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
        let to_family = |name: &str, index: u32| {
            let props = queue_family_props[index as usize];
            GfxQueueFamily {
                name: name.to_string(),
                queue_family_index: index,
                queue_flags: props.queue_flags,
                queue_count: props.queue_count,
            }
        };
        // rejection_reason 已经保证两个 family 都存在
        let gfx_queue_family = to_family("gfx", candidate.gfx_family.unwrap_or_default());
        let present_queue_family = to_family("present", candidate.present_family.unwrap_or_default());
        log::info!("selected gpu: {}, gfx queue: {:?}, present queue: {:?}", candidate.name, gfx_queue_family, present_queue_family);

        Self {
            vk_handle: pdevice,
            device_name: candidate.name,
            basic_props,
            rt_pipeline_props: rt_props,
            acc_struct_props: acc_props,
            gfx_queue_family,
            present_queue_family,
            depth_format: candidate.depth_format.unwrap_or(DEPTH_FORMAT_CANDIDATES[0]),
            ray_tracing,
        }
    }

    /// 收集某张 gpu 的信息
    fn inspect(
        instance: &ash::Instance,
        surface: &GfxSurface,
        pdevice: vk::PhysicalDevice,
        required_exts: &[&'static CStr],
    ) -> GfxResult<DeviceCandidate> {
        let props = unsafe { instance.get_physical_device_properties(pdevice) };
        let name = props.device_name_as_c_str().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();

        let ext_props = unsafe { instance.enumerate_device_extension_properties(pdevice) }
            .vk_context("vkEnumerateDeviceExtensionProperties")?;
        let available = ext_props.iter().filter_map(|e| e.extension_name_as_c_str().ok()).collect_vec();
        let missing_exts = required_exts
            .iter()
            .filter(|ext| !available.contains(ext))
            .map(|ext| ext.to_string_lossy().into_owned())
            .collect_vec();

        let queue_family_props = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
        let present_support = (0..queue_family_props.len() as u32)
            .map(|index| surface.supports_present(pdevice, index))
            .collect::<GfxResult<Vec<_>>>()?;
        let (gfx_family, present_family) = choose_queue_families(&queue_family_props, &present_support);

        let surface_format_count = surface.formats(pdevice)?.len();
        let present_mode_count = surface.present_modes(pdevice)?.len();

        let depth_format = choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| unsafe {
            instance.get_physical_device_format_properties(pdevice, format).optimal_tiling_features
        });

        Ok(DeviceCandidate {
            name,
            device_type: props.device_type,
            api_version: props.api_version,
            missing_exts,
            gfx_family,
            present_family,
            surface_format_count,
            present_mode_count,
            depth_format,
        })
    }

    /// 必要的 device extensions
    pub fn required_device_exts(ray_tracing: bool) -> Vec<&'static CStr> {
        let mut exts = vec![ash::khr::swapchain::NAME];
        if ray_tracing {
            exts.extend([
                ash::khr::acceleration_structure::NAME,
                ash::khr::ray_tracing_pipeline::NAME,
                ash::khr::deferred_host_operations::NAME,
            ]);
        }
        exts
    }
}

// getters
impl GfxPhysicalDevice {
    #[inline]
    pub fn vk_handle(&self) -> vk::PhysicalDevice {
        self.vk_handle
    }

    #[inline]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    #[inline]
    pub fn basic_props(&self) -> &vk::PhysicalDeviceProperties {
        &self.basic_props
    }

    #[inline]
    pub fn rt_pipeline_props(&self) -> &vk::PhysicalDeviceRayTracingPipelinePropertiesKHR<'static> {
        &self.rt_pipeline_props
    }

    #[inline]
    pub fn acc_struct_props(&self) -> &vk::PhysicalDeviceAccelerationStructurePropertiesKHR<'static> {
        &self.acc_struct_props
    }

    #[inline]
    pub fn gfx_queue_family(&self) -> &GfxQueueFamily {
        &self.gfx_queue_family
    }

    #[inline]
    pub fn present_queue_family(&self) -> &GfxQueueFamily {
        &self.present_queue_family
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    #[inline]
    pub fn ray_tracing(&self) -> bool {
        self.ray_tracing
    }

    #[inline]
    /// 当前 gpu 是否是独立显卡
    pub fn is_descrete_gpu(&self) -> bool {
        self.basic_props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }

    /// color 和 depth 都支持的、不超过 requested 的最大采样数
    pub fn msaa_sample_count(&self, requested: u32) -> vk::SampleCountFlags {
        let limits = &self.basic_props.limits;
        clamp_sample_count(
            requested,
            limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts,
        )
    }
}

impl DebugType for GfxPhysicalDevice {
    fn debug_type_name() -> &'static str {
        "GfxPhysicalDevice"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}

/// 优先返回独立显卡的下标，没有则返回第一个
fn prefer_discrete(device_types: &[vk::PhysicalDeviceType]) -> Option<usize> {
    device_types
        .iter()
        .position(|ty| *ty == vk::PhysicalDeviceType::DISCRETE_GPU)
        .or(if device_types.is_empty() { None } else { Some(0) })
}

/// 返回 (graphics family, present family)
///
/// present family 优先和 graphics family 相同
fn choose_queue_families(
    props: &[vk::QueueFamilyProperties],
    present_support: &[bool],
) -> (Option<u32>, Option<u32>) {
    let gfx = props
        .iter()
        .position(|p| p.queue_count > 0 && p.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|i| i as u32);

    let present = match gfx {
        Some(g) if present_support.get(g as usize).copied().unwrap_or(false) => Some(g),
        _ => present_support.iter().position(|s| *s).map(|i| i as u32),
    };

    (gfx, present)
}

fn choose_depth_format(
    candidates: &[vk::Format],
    optimal_tiling_features: impl Fn(vk::Format) -> vk::FormatFeatureFlags,
) -> Option<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|format| optimal_tiling_features(*format).contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT))
}

fn clamp_sample_count(requested: u32, supported: vk::SampleCountFlags) -> vk::SampleCountFlags {
    const COUNTS: [(u32, vk::SampleCountFlags); 6] = [
        (64, vk::SampleCountFlags::TYPE_64),
        (32, vk::SampleCountFlags::TYPE_32),
        (16, vk::SampleCountFlags::TYPE_16),
        (8, vk::SampleCountFlags::TYPE_8),
        (4, vk::SampleCountFlags::TYPE_4),
        (2, vk::SampleCountFlags::TYPE_2),
    ];
    COUNTS
        .iter()
        .find(|(count, flag)| *count <= requested && supported.contains(*flag))
        .map(|(_, flag)| *flag)
        .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn good_candidate() -> DeviceCandidate {
        DeviceCandidate {
            name: "GPU0".to_string(),
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            api_version: vk::make_api_version(0, 1, 3, 250),
            missing_exts: vec![],
            gfx_family: Some(0),
            present_family: Some(0),
            surface_format_count: 2,
            present_mode_count: 3,
            depth_format: Some(vk::Format::D32_SFLOAT),
        }
    }

    #[test]
    fn test_candidate_rejection() {
        assert_eq!(good_candidate().rejection_reason(), None);

        let mut c = good_candidate();
        c.missing_exts = vec!["VK_KHR_ray_tracing_pipeline".to_string()];
        assert!(c.rejection_reason().unwrap().contains("VK_KHR_ray_tracing_pipeline"));

        let mut c = good_candidate();
        c.present_family = None;
        assert!(c.rejection_reason().unwrap().contains("present"));

        let mut c = good_candidate();
        c.depth_format = None;
        assert!(c.rejection_reason().unwrap().contains("depth"));

        let mut c = good_candidate();
        c.api_version = vk::API_VERSION_1_2;
        assert!(c.rejection_reason().is_some());
    }

    #[test]
    fn test_prefer_discrete() {
        use vk::PhysicalDeviceType as Ty;
        assert_eq!(prefer_discrete(&[Ty::INTEGRATED_GPU, Ty::DISCRETE_GPU]), Some(1));
        assert_eq!(prefer_discrete(&[Ty::INTEGRATED_GPU, Ty::CPU]), Some(0));
        assert_eq!(prefer_discrete(&[]), None);
    }

    #[test]
    fn test_queue_families_prefer_shared() {
        let props = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::COMPUTE),
        ];
        assert_eq!(choose_queue_families(&props, &[true, true, false]), (Some(1), Some(1)));
        // graphics family 不能 present 时，选择第一个能 present 的
        assert_eq!(choose_queue_families(&props, &[false, false, true]), (Some(1), Some(2)));
        assert_eq!(choose_queue_families(&props, &[false, false, false]), (Some(1), None));
        assert_eq!(choose_queue_families(&props[..1], &[true]), (None, Some(0)));
    }

    #[test]
    fn test_choose_depth_format() {
        let only_d24 = |f: vk::Format| {
            if f == vk::Format::D24_UNORM_S8_UINT {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            } else {
                vk::FormatFeatureFlags::empty()
            }
        };
        assert_eq!(choose_depth_format(&DEPTH_FORMAT_CANDIDATES, only_d24), Some(vk::Format::D24_UNORM_S8_UINT));
        assert_eq!(
            choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT),
            Some(vk::Format::D32_SFLOAT)
        );
        assert_eq!(choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| vk::FormatFeatureFlags::empty()), None);
    }

    #[test]
    fn test_clamp_sample_count() {
        let supported = vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_2 | vk::SampleCountFlags::TYPE_4;
        assert_eq!(clamp_sample_count(4, supported), vk::SampleCountFlags::TYPE_4);
        assert_eq!(clamp_sample_count(8, supported), vk::SampleCountFlags::TYPE_4);
        assert_eq!(clamp_sample_count(3, supported), vk::SampleCountFlags::TYPE_2);
        assert_eq!(clamp_sample_count(1, supported), vk::SampleCountFlags::TYPE_1);
        assert_eq!(clamp_sample_count(0, supported), vk::SampleCountFlags::TYPE_1);
    }
}
