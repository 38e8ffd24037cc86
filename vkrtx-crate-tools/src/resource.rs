use std::path::{Path, PathBuf};

/// 统一资源路径管理
///
/// 所有路径基于工作区根目录（通过 `CARGO_MANIFEST_DIR` 推导）。
///
/// # 使用示例
/// ```ignore
/// let rgen = VkrtxPath::shader_build_path("main.rgen"); // engine/shader/.build/main.rgen.spv
/// ```
pub struct VkrtxPath {}
// 核心路径
impl VkrtxPath {
    /// 获取工作区根目录
    pub fn workspace_path() -> PathBuf {
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        manifest_dir.parent().unwrap_or(manifest_dir).to_path_buf()
    }

    pub fn engine_path() -> PathBuf {
        Self::workspace_path().join("engine")
    }
}
// engine 目录下
impl VkrtxPath {
    /// GLSL 源文件所在的目录
    pub fn shader_root_path() -> PathBuf {
        Self::engine_path().join("shader")
    }

    /// 获取 `shader/.build/` 目录下的着色器路径（离线编译得到的 SPIR-V）
    pub fn shader_build_path(filename: &str) -> PathBuf {
        Self::shader_root_path().join(".build").join(format!("{filename}.spv"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_build_path() {
        let path = VkrtxPath::shader_build_path("main.rgen");
        assert!(path.ends_with("engine/shader/.build/main.rgen.spv"));
        assert!(path.starts_with(VkrtxPath::workspace_path()));
    }
}
