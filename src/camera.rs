use glam::{Mat4, Vec3};
use parking_lot::RwLock;

use crate::config::CameraConfig;

/// Pixel rectangle a view is drawn into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Camera parameters consumed by the renderers.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraParams {
    pub view_proj: Mat4,
    pub position: Vec3,
    /// `None` draws into the whole target.
    pub viewport: Option<Viewport>,
}

impl CameraParams {
    /// Builds the parameters for one XR view from its projection matrix and
    /// the view's pose in the reference space.
    pub fn from_view(projection: Mat4, view_pose: Mat4, viewport: Option<Viewport>) -> Self {
        let view = view_pose.inverse();
        Self {
            view_proj: projection * view,
            position: view_pose.w_axis.truncate(),
            viewport,
        }
    }
}

/// Fixed perspective camera at the origin looking down -Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveCamera {
    pub fov_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
}

impl PerspectiveCamera {
    pub fn new(config: &CameraConfig, aspect: f32) -> Self {
        Self {
            fov_degrees: config.fov_degrees,
            aspect,
            near: config.near,
            far: config.far,
            position: Vec3::ZERO,
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    pub fn params(&self) -> CameraParams {
        let view = Mat4::look_at_rh(self.position, self.position - Vec3::Z, Vec3::Y);
        let projection = Mat4::perspective_rh_gl(
            self.fov_degrees.to_radians(),
            self.aspect.max(0.01),
            self.near,
            self.far,
        );
        CameraParams {
            view_proj: projection * view,
            position: self.position,
            viewport: None,
        }
    }
}

/// Size of the surface the renderer draws into, updated on resize.
#[derive(Debug)]
pub struct ViewportSize {
    size: RwLock<(u32, u32)>,
}

impl ViewportSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: RwLock::new((width.max(1), height.max(1))),
        }
    }

    pub fn update(&self, width: u32, height: u32) {
        *self.size.write() = (width.max(1), height.max(1));
    }

    pub fn get(&self) -> (u32, u32) {
        *self.size.read()
    }

    pub fn aspect(&self) -> f32 {
        let (width, height) = self.get();
        width as f32 / height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec4};

    #[test]
    fn camera_projects_forward_point_to_center() {
        let camera = PerspectiveCamera::new(&CameraConfig::default(), 16.0 / 9.0);
        let clip = camera.params().view_proj * Vec4::new(0.0, 0.0, -2.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-6);
        assert!(ndc.y.abs() < 1e-6);
        assert!(ndc.z > -1.0 && ndc.z < 1.0);
    }

    #[test]
    fn view_params_use_inverse_pose() {
        let pose = Mat4::from_rotation_translation(Quat::IDENTITY, Vec3::new(0.0, 1.5, 0.0));
        let params = CameraParams::from_view(Mat4::IDENTITY, pose, None);
        assert_eq!(params.position, Vec3::new(0.0, 1.5, 0.0));
        let eye_space = params.view_proj * Vec4::new(0.0, 1.5, -1.0, 1.0);
        assert_eq!(eye_space, Vec4::new(0.0, 0.0, -1.0, 1.0));
    }

    #[test]
    fn viewport_size_never_reaches_zero() {
        let size = ViewportSize::new(0, 0);
        assert_eq!(size.get(), (1, 1));
        size.update(1280, 720);
        assert!((size.aspect() - 16.0 / 9.0).abs() < 1e-6);
    }
}
