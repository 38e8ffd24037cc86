use std::time::Duration;

use ash::vk;

/// 渲染器默认配置
pub struct DefaultRenderSettings;
impl DefaultRenderSettings {
    pub const APP_NAME: &'static str = "VKExampleRTX";
    pub const WINDOW_EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 800,
    };
    /// frame slot 的数量，与 swapchain image 的数量无关
    pub const FRAMES_IN_FLIGHT: usize = 5;
    /// None 表示无限等待
    pub const WAIT_TIMEOUT: Option<Duration> = None;
    /// 会被 clamp 到设备支持的最大值
    pub const MSAA_SAMPLES: u32 = 4;
    pub const ENABLE_VALIDATION: bool = false;
    pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
}

/// 可以由 app 调整的渲染配置
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub app_name: String,
    pub window_extent: vk::Extent2D,
    pub frames_in_flight: usize,
    pub wait_timeout: Option<Duration>,
    pub msaa_samples: u32,
    pub enable_validation: bool,
    pub clear_color: [f32; 4],
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            app_name: DefaultRenderSettings::APP_NAME.to_string(),
            window_extent: DefaultRenderSettings::WINDOW_EXTENT,
            frames_in_flight: DefaultRenderSettings::FRAMES_IN_FLIGHT,
            wait_timeout: DefaultRenderSettings::WAIT_TIMEOUT,
            msaa_samples: DefaultRenderSettings::MSAA_SAMPLES,
            enable_validation: DefaultRenderSettings::ENABLE_VALIDATION,
            clear_color: DefaultRenderSettings::CLEAR_COLOR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = RenderSettings::default();
        assert_eq!(settings.app_name, "VKExampleRTX");
        assert_eq!(settings.window_extent, vk::Extent2D { width: 800, height: 800 });
        assert_eq!(settings.frames_in_flight, 5);
        assert_eq!(settings.wait_timeout, None);
        assert_eq!(settings.msaa_samples, 4);
        assert!(!settings.enable_validation);
    }
}
