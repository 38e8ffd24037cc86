use std::{
    ffi::CStr,
    path::{Path, PathBuf},
    rc::Rc,
};

use ash::vk;

use crate::{
    error::{GfxError, GfxResult, VkResultExt},
    foundation::{debug_messenger::DebugType, device::GfxDevice},
};

/// 读取 spv 文件
///
/// 只有文件不存在时返回 `ShaderNotFound`，文件存在但无法读取或者内容不是合法的 spv 时返回 `InvalidShader`
pub fn load_spv(path: &Path) -> GfxResult<Vec<u32>> {
    let classify = |source: std::io::Error| {
        let path = path.to_path_buf();
        if source.kind() == std::io::ErrorKind::NotFound {
            GfxError::ShaderNotFound { path, source }
        } else {
            GfxError::InvalidShader { path, source }
        }
    };
    let mut file = std::fs::File::open(path).map_err(classify)?;
    ash::util::read_spv(&mut file).map_err(classify)
}

/// drop 时销毁，只需要在 pipeline 创建期间存活
pub struct GfxShaderModule {
    handle: vk::ShaderModule,
    device: Rc<GfxDevice>,
}

impl GfxShaderModule {
    /// # param
    /// * path - spv shader 文件路径
    pub fn new(device: Rc<GfxDevice>, path: &Path) -> GfxResult<Self> {
        let shader_code = load_spv(path)?;
        let shader_module_info = vk::ShaderModuleCreateInfo::default().code(&shader_code);

        let handle =
            unsafe { device.create_shader_module(&shader_module_info, None) }.vk_context("vkCreateShaderModule")?;
        let shader_module = Self { handle, device };
        shader_module.device.set_debug_name(&shader_module, path.to_string_lossy());
        Ok(shader_module)
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }
}

impl Drop for GfxShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.handle, None);
        }
    }
}

impl DebugType for GfxShaderModule {
    fn debug_type_name() -> &'static str {
        "GfxShaderModule"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

#[derive(Clone, Debug)]
pub struct ShaderStageInfo {
    pub stage: vk::ShaderStageFlags,
    pub entry_point: &'static CStr,
    pub path: PathBuf,
}

impl ShaderStageInfo {
    pub fn new(stage: vk::ShaderStageFlags, path: PathBuf) -> Self {
        Self {
            stage,
            entry_point: c"main",
            path,
        }
    }
}

/// 用于 RayTracing Pipeline 的创建
///
/// 在 pipeline create info 的 groups 中，每个 shader group 的 index
///
/// 每个 shader group 可以由多个 shader 组成，每个 shader group 都是独一无二的
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShaderGroupInfo {
    pub ty: vk::RayTracingShaderGroupTypeKHR,
    pub general: u32,
    pub closest_hit: u32,
    pub any_hit: u32,
    pub intersection: u32,
}

impl ShaderGroupInfo {
    pub const fn unused() -> Self {
        Self {
            ty: vk::RayTracingShaderGroupTypeKHR::GENERAL,
            general: vk::SHADER_UNUSED_KHR,
            closest_hit: vk::SHADER_UNUSED_KHR,
            any_hit: vk::SHADER_UNUSED_KHR,
            intersection: vk::SHADER_UNUSED_KHR,
        }
    }

    /// raygen 或者 miss
    pub const fn general(stage_index: u32) -> Self {
        Self {
            general: stage_index,
            ..Self::unused()
        }
    }

    /// 只有 closest hit 的三角形 hit group
    pub const fn triangles_hit(closest_hit_index: u32) -> Self {
        Self {
            ty: vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP,
            closest_hit: closest_hit_index,
            ..Self::unused()
        }
    }

    pub fn to_vk(self) -> vk::RayTracingShaderGroupCreateInfoKHR<'static> {
        vk::RayTracingShaderGroupCreateInfoKHR::default()
            .ty(self.ty)
            .general_shader(self.general)
            .closest_hit_shader(self.closest_hit)
            .any_hit_shader(self.any_hit)
            .intersection_shader(self.intersection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_shader_is_environment_error() {
        let path = std::env::temp_dir().join("vkrtx-missing-shader.spv");
        let err = load_spv(&path).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Environment);
        assert!(matches!(err, GfxError::ShaderNotFound { path: p, .. } if p == path));
    }

    #[test]
    fn test_load_spv() {
        let path = std::env::temp_dir().join(format!("vkrtx-shader-{}.spv", std::process::id()));
        // magic number + version
        let words: [u32; 2] = [0x0723_0203, 0x0001_0000];
        std::fs::write(&path, bytemuck::cast_slice(&words)).unwrap();
        let loaded = load_spv(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.unwrap(), words.to_vec());
    }

    #[test]
    fn test_malformed_shader_is_internal_error() {
        let path = std::env::temp_dir().join(format!("vkrtx-malformed-shader-{}.spv", std::process::id()));
        // 长度不是 4 的倍数
        std::fs::write(&path, [0x03u8, 0x02, 0x23]).unwrap();
        let err = load_spv(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(err.kind(), crate::ErrorKind::Internal);
        assert!(matches!(err, GfxError::InvalidShader { path: p, .. } if p == path));
    }

    #[test]
    fn test_shader_groups() {
        let raygen = ShaderGroupInfo::general(0);
        assert_eq!(raygen.ty, vk::RayTracingShaderGroupTypeKHR::GENERAL);
        assert_eq!(raygen.closest_hit, vk::SHADER_UNUSED_KHR);

        let hit = ShaderGroupInfo::triangles_hit(1);
        assert_eq!(hit.ty, vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP);
        assert_eq!(hit.general, vk::SHADER_UNUSED_KHR);
        assert_eq!(hit.to_vk().closest_hit_shader, 1);
    }
}
