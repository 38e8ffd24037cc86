use glam::Vec3;
use vkrtx_gfx::{GfxResult, raytracing::acceleration::triangle_count};

/// 场景中唯一 mesh 的来源：非索引的三角形列表
#[derive(Debug, Clone, PartialEq, Default)]
pub enum GeometrySource {
    /// 边长为 1、中心在原点的立方体
    #[default]
    Cube,
    /// 每 3 个顶点构成一个三角形
    Triangles(Vec<Vec3>),
}

impl GeometrySource {
    /// 顶点数量必须是 3 的非零倍数
    pub fn vertices(&self) -> GfxResult<Vec<[f32; 3]>> {
        let vertices = match self {
            GeometrySource::Cube => cube_vertices().to_vec(),
            GeometrySource::Triangles(vertices) => vertices.iter().map(|v| v.to_array()).collect(),
        };
        triangle_count(vertices.len())?;
        Ok(vertices)
    }
}

/// 36 个顶点，每个面 2 个三角形，没有 index buffer，因此存在重复的顶点
#[rustfmt::skip]
pub const fn cube_vertices() -> [[f32; 3]; 36] {
    const L: f32 = -0.5;
    const H: f32 = 0.5;
    [
        // -z
        [L, L, L], [L, H, L], [H, L, L],
        [H, H, L], [H, L, L], [L, H, L],
        // -x
        [L, L, L], [L, L, H], [L, H, L],
        [L, H, H], [L, H, L], [L, L, H],
        // +x
        [H, L, H], [H, L, L], [H, H, H],
        [H, H, L], [H, H, H], [H, L, L],
        // +z
        [L, H, H], [L, L, H], [H, H, H],
        [H, L, H], [H, H, H], [L, L, H],
        // +y
        [H, H, L], [L, H, L], [H, H, H],
        [L, H, H], [H, H, H], [L, H, L],
        // -y
        [L, L, H], [L, L, L], [H, L, L],
        [L, L, H], [H, L, L], [H, L, H],
    ]
}

#[cfg(test)]
mod tests {
    use vkrtx_gfx::GfxError;

    use super::*;

    #[test]
    fn test_cube() {
        let vertices = GeometrySource::Cube.vertices().unwrap();
        assert_eq!(vertices.len(), 36);
        assert!(vertices.iter().flatten().all(|c| c.abs() == 0.5));

        // 每个面的 6 个顶点都在同一个平面上
        for face in vertices.chunks(6) {
            let on_same_plane = (0..3).any(|axis| face.iter().all(|v| v[axis] == face[0][axis]));
            assert!(on_same_plane);
        }
    }

    #[test]
    fn test_triangles() {
        let triangle = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        let vertices = GeometrySource::Triangles(triangle).vertices().unwrap();
        assert_eq!(vertices, vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
    }

    #[test]
    fn test_invalid_vertex_count() {
        let empty = GeometrySource::Triangles(vec![]);
        assert!(matches!(empty.vertices(), Err(GfxError::InvalidGeometry(_))));

        let partial = GeometrySource::Triangles(vec![Vec3::ZERO, Vec3::X]);
        let err = partial.vertices().unwrap_err();
        assert_eq!(err.kind(), vkrtx_gfx::ErrorKind::Internal);
    }
}
