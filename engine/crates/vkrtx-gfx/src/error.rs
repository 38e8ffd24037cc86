use std::path::PathBuf;

use ash::vk;

/// 错误的大类
///
/// - `Environment`：当前机器 / 驱动 / 文件系统不满足运行条件，不是程序本身的问题
/// - `Internal`：程序内部的不变量被破坏，或者驱动返回了意料之外的错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Environment,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    #[error("failed to load vulkan loader: {0}")]
    LoaderUnavailable(#[from] ash::LoadingError),

    #[error("required instance extension {0} is not supported")]
    MissingInstanceExtension(String),

    #[error("required instance layer {0} is not available")]
    MissingLayer(String),

    #[error("no suitable physical device:{0}")]
    NoSuitableDevice(String),

    #[error("failed to read shader {}: {source}", path.display())]
    ShaderNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("shader {} is not valid spir-v: {source}", path.display())]
    InvalidShader {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to query window handle: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),

    #[error("{call} failed: {result:?}")]
    Driver { call: &'static str, result: vk::Result },

    #[error("ray tracing is not enabled on this device")]
    RayTracingDisabled,

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl GfxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LoaderUnavailable(_)
            | Self::MissingInstanceExtension(_)
            | Self::MissingLayer(_)
            | Self::NoSuitableDevice(_)
            | Self::ShaderNotFound { .. }
            | Self::WindowHandle(_) => ErrorKind::Environment,
            Self::Driver { result, .. } => match *result {
                vk::Result::ERROR_INCOMPATIBLE_DRIVER
                | vk::Result::ERROR_EXTENSION_NOT_PRESENT
                | vk::Result::ERROR_LAYER_NOT_PRESENT
                | vk::Result::ERROR_FEATURE_NOT_PRESENT
                | vk::Result::ERROR_INITIALIZATION_FAILED => ErrorKind::Environment,
                _ => ErrorKind::Internal,
            },
            Self::InvalidShader { .. }
            | Self::RayTracingDisabled
            | Self::InvalidGeometry(_)
            | Self::Invariant(_) => ErrorKind::Internal,
        }
    }
}

pub type GfxResult<T> = Result<T, GfxError>;

/// 为 `VkResult` 附加调用名称，转换为 [`GfxError::Driver`]
pub trait VkResultExt<T> {
    fn vk_context(self, call: &'static str) -> GfxResult<T>;
}

impl<T> VkResultExt<T> for ash::prelude::VkResult<T> {
    #[inline]
    fn vk_context(self, call: &'static str) -> GfxResult<T> {
        self.map_err(|result| GfxError::Driver { call, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_errors() {
        let err = GfxError::NoSuitableDevice("\n\tGPU0: no ray tracing".to_string());
        assert_eq!(err.kind(), ErrorKind::Environment);

        let err = GfxError::ShaderNotFound {
            path: PathBuf::from("main.rgen.spv"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(err.kind(), ErrorKind::Environment);
        assert!(err.to_string().contains("main.rgen.spv"));

        let err: GfxResult<()> = Err(vk::Result::ERROR_INCOMPATIBLE_DRIVER).vk_context("vkCreateInstance");
        assert_eq!(err.unwrap_err().kind(), ErrorKind::Environment);
    }

    #[test]
    fn test_internal_errors() {
        let err: GfxResult<u32> = Err(vk::Result::ERROR_DEVICE_LOST).vk_context("vkQueueSubmit2");
        let err = err.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().starts_with("vkQueueSubmit2 failed"));

        assert_eq!(GfxError::Invariant("destroy before idle".into()).kind(), ErrorKind::Internal);
        assert_eq!(GfxError::RayTracingDisabled.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_vk_context_keeps_ok() {
        let ok: ash::prelude::VkResult<u32> = Ok(7);
        assert_eq!(ok.vk_context("vkAcquireNextImageKHR").unwrap(), 7);
    }
}
