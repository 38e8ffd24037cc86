use std::ffi::{CStr, CString, c_char};

use ash::vk;
use itertools::Itertools;

use crate::{
    error::{GfxError, GfxResult, VkResultExt},
    foundation::debug_messenger::GfxDebugMsger,
};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// vulkan instance 以及 loader
///
/// 通过 `Rc<GfxInstance>` 共享，最后一个持有者 drop 时销毁 instance
pub struct GfxInstance {
    entry: ash::Entry,
    ash_instance: ash::Instance,
    debug_utils_enabled: bool,
}

// new & init
impl GfxInstance {
    /// 设置所需的 layers 和 extensions，创建 vk instance
    ///
    /// # param
    /// * window_exts - 窗口系统要求的 extension，缺失时返回错误
    /// * enable_validation - 是否开启 validation layer，开启但缺失时返回错误
    pub fn new(app_name: &str, window_exts: &[&CStr], enable_validation: bool) -> GfxResult<Self> {
        let entry = unsafe { ash::Entry::load()? };

        let app_name = CString::new(app_name).unwrap_or_default();
        let engine_name = c"vkrtx";
        let app_info = vk::ApplicationInfo::default()
            .api_version(vk::API_VERSION_1_3) // 版本过低时，有些函数无法正确加载
            .application_name(app_name.as_c_str())
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0));

        let ext_props =
            unsafe { entry.enumerate_instance_extension_properties(None) }.vk_context("vkEnumerateInstanceExtensionProperties")?;
        let available_exts =
            ext_props.iter().filter_map(|p| p.extension_name_as_c_str().ok()).collect_vec();

        if let Some(missing) = first_missing(window_exts, &available_exts) {
            return Err(GfxError::MissingInstanceExtension(missing));
        }

        // debug utils 是可选的：用于 debug messenger 以及 debug name
        let debug_utils_enabled = available_exts.contains(&ash::ext::debug_utils::NAME);
        let mut enabled_exts = window_exts.to_vec();
        if debug_utils_enabled {
            enabled_exts.push(ash::ext::debug_utils::NAME);
        } else {
            log::warn!("{:?} is not supported, debug names are disabled", ash::ext::debug_utils::NAME);
        }
        let enabled_exts = enabled_exts.into_iter().unique().collect_vec();
        log::info!("instance extensions: {}", join_names(&enabled_exts));

        let mut enabled_layers: Vec<&CStr> = Vec::new();
        if enable_validation {
            let layer_props =
                unsafe { entry.enumerate_instance_layer_properties() }.vk_context("vkEnumerateInstanceLayerProperties")?;
            let available_layers = layer_props.iter().filter_map(|p| p.layer_name_as_c_str().ok()).collect_vec();
            if let Some(missing) = first_missing(&[VALIDATION_LAYER], &available_layers) {
                return Err(GfxError::MissingLayer(missing));
            }
            enabled_layers.push(VALIDATION_LAYER);
        }
        log::info!("instance layers: {}", join_names(&enabled_layers));

        let ext_ptrs: Vec<*const c_char> = enabled_exts.iter().map(|e| e.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> = enabled_layers.iter().map(|l| l.as_ptr()).collect();

        let mut instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&ext_ptrs)
            .enabled_layer_names(&layer_ptrs);

        // 为 instance info 添加 debug messenger
        let mut debug_utils_messenger_ci = GfxDebugMsger::debug_utils_messenger_ci();
        if debug_utils_enabled {
            instance_ci = instance_ci.push_next(&mut debug_utils_messenger_ci);
        }

        let ash_instance = unsafe { entry.create_instance(&instance_ci, None) }.vk_context("vkCreateInstance")?;

        Ok(Self {
            entry,
            ash_instance,
            debug_utils_enabled,
        })
    }
}

impl Drop for GfxInstance {
    fn drop(&mut self) {
        log::info!("destroying instance");
        unsafe {
            self.ash_instance.destroy_instance(None);
        }
    }
}

// getters
impl GfxInstance {
    #[inline]
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    #[inline]
    pub fn ash_instance(&self) -> &ash::Instance {
        &self.ash_instance
    }

    #[inline]
    pub fn debug_utils_enabled(&self) -> bool {
        self.debug_utils_enabled
    }
}

/// 在 available 中找到第一个缺失的 required
fn first_missing(required: &[&CStr], available: &[&CStr]) -> Option<String> {
    required.iter().find(|name| !available.contains(name)).map(|name| name.to_string_lossy().into_owned())
}

fn join_names(names: &[&CStr]) -> String {
    names.iter().map(|n| format!("\n\t{:?}", n)).join("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_missing() {
        let available = [c"VK_KHR_surface", c"VK_KHR_xcb_surface", c"VK_EXT_debug_utils"];
        assert_eq!(first_missing(&[c"VK_KHR_surface", c"VK_KHR_xcb_surface"], &available), None);
        assert_eq!(
            first_missing(&[c"VK_KHR_surface", c"VK_KHR_win32_surface"], &available),
            Some("VK_KHR_win32_surface".to_string())
        );
        assert_eq!(first_missing(&[], &available), None);
    }

    #[test]
    fn test_join_names() {
        assert_eq!(join_names(&[]), "");
        assert_eq!(join_names(&[c"A", c"B"]), "\n\t\"A\"\n\t\"B\"");
    }
}
