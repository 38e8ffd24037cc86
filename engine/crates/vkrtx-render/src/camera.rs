use ash::vk;
use glam::{Mat4, Vec3};

/// 固定的观察相机
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// 垂直方向的视角，单位是角度
    pub fov_y_deg: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(2.0, 2.0, -2.0),
            target: Vec3::ZERO,
            up: Vec3::Z,
            fov_y_deg: 45.0,
            near: 0.1,
            far: 10.0,
        }
    }
}

impl Camera {
    #[inline]
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// 深度范围是 [0, 1]
    #[inline]
    pub fn projection(&self, extent: vk::Extent2D) -> Mat4 {
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        Mat4::perspective_rh(self.fov_y_deg.to_radians(), aspect, self.near, self.far)
    }

    /// 光栅化使用的 push constant，model 为单位矩阵
    #[inline]
    pub fn mvp(&self, extent: vk::Extent2D) -> Mat4 {
        self.projection(extent) * self.view()
    }

    pub fn rt_uniform(&self, extent: vk::Extent2D) -> RtCameraUniform {
        RtCameraUniform {
            view_inverse: self.view().inverse(),
            proj_inverse: self.projection(extent).inverse(),
        }
    }
}

/// ray gen shader 的 uniform buffer，与 `main.rgen` 中的布局一致
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RtCameraUniform {
    pub view_inverse: Mat4,
    pub proj_inverse: Mat4,
}

#[cfg(test)]
mod tests {
    use glam::Vec4;

    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 800,
    };

    #[test]
    fn test_origin_is_in_front_of_camera() {
        let camera = Camera::default();
        let clip = camera.mvp(EXTENT) * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip / clip.w;

        assert!(clip.w > 0.0);
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_rt_uniform_inverts_camera() {
        let camera = Camera::default();
        let uniform = camera.rt_uniform(EXTENT);

        // view inverse 把相机空间的原点变换回 eye
        let eye = uniform.view_inverse.transform_point3(Vec3::ZERO);
        assert!(eye.abs_diff_eq(camera.eye, 1e-5));

        let identity = uniform.proj_inverse * camera.projection(EXTENT);
        assert!(identity.abs_diff_eq(Mat4::IDENTITY, 1e-4));
    }

    #[test]
    fn test_uniform_layout() {
        assert_eq!(size_of::<RtCameraUniform>(), 128);
    }
}
