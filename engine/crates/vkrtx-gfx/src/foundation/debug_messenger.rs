use std::{ffi::CStr, rc::Rc};

use ash::vk;

use crate::{
    error::{GfxResult, VkResultExt},
    foundation::instance::GfxInstance,
};

/// 把 validation layer 的消息转发到 log
///
/// 持有 instance，保证在 instance 之前销毁
pub struct GfxDebugMsger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
    _instance: Rc<GfxInstance>,
}

// new & init
impl GfxDebugMsger {
    pub fn new(instance: Rc<GfxInstance>) -> GfxResult<Self> {
        let loader = ash::ext::debug_utils::Instance::new(instance.entry(), instance.ash_instance());

        let create_info = Self::debug_utils_messenger_ci();
        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None) }
            .vk_context("vkCreateDebugUtilsMessengerEXT")?;

        Ok(Self {
            loader,
            messenger,
            _instance: instance,
        })
    }
}

impl Drop for GfxDebugMsger {
    fn drop(&mut self) {
        log::info!("destroying debug messenger");
        unsafe {
            self.loader.destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

/// debug messenger 的回调函数
/// # Safety
unsafe extern "system" fn vk_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = unsafe { *p_callback_data };

    let msg = if callback_data.p_message.is_null() {
        std::borrow::Cow::from("")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let format_msg = format_validation_message(message_type, msg.as_ref());

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("{}", format_msg),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("{}", format_msg),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::info!("{}", format_msg),
        _ => log::debug!("{}", format_msg),
    };

    // 只有 layer developer 才需要返回 True
    vk::FALSE
}

/// validation layer 的消息有时是 json，把 MainMessage 字段单独拿出来输出，因为它里面有换行
fn format_validation_message(message_type: vk::DebugUtilsMessageTypeFlagsEXT, msg: &str) -> String {
    let mut json_value = serde_json::from_str::<serde_json::Value>(msg).ok();
    let json_obj = json_value.as_mut().and_then(|v| v.as_object_mut());

    match json_obj {
        Some(obj) => {
            let main_msg = obj.remove("MainMessage");
            let main_msg_str = main_msg.as_ref().and_then(|v| v.as_str()).unwrap_or_default();
            let rest = serde_json::to_string_pretty(obj).unwrap_or_default();
            format!("[{:?}]\n{}\n{}\n", message_type, rest, main_msg_str)
        }
        None => format!("[{:?}] {}", message_type, msg),
    }
}

// 构造过程辅助函数
impl GfxDebugMsger {
    /// 用于创建 debug messenger 的结构体
    ///
    /// 创建 instance 时也会挂在 InstanceCreateInfo 上，用来捕获 instance 创建与销毁时的消息
    pub fn debug_utils_messenger_ci() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vk_debug_callback))
    }
}

/// 可以设置 debug name 的 vulkan 对象
pub trait DebugType {
    fn debug_type_name() -> &'static str;
    fn vk_handle(&self) -> impl vk::Handle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_message() {
        let msg = format_validation_message(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION, "image layout mismatch");
        assert!(msg.ends_with("image layout mismatch"));
        assert!(msg.starts_with("[VALIDATION]"));
    }

    #[test]
    fn test_json_message_extracts_main_message() {
        let raw = r#"{"MainMessage":"line1\nline2","MessageID":42}"#;
        let msg = format_validation_message(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL, raw);
        assert!(msg.contains("\"MessageID\": 42"));
        assert!(msg.contains("line1\nline2"));
        assert!(!msg.contains("MainMessage"));
    }
}
