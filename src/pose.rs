use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Tracked position and orientation reported by the XR host for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Builds a pose from the `{x, y, z}` / `{x, y, z, w}` pairs WebXR hands out.
    pub fn from_components(position: [f32; 3], orientation: [f32; 4]) -> Self {
        Self {
            position: Vec3::from_array(position),
            orientation: Quat::from_xyzw(
                orientation[0],
                orientation[1],
                orientation[2],
                orientation[3],
            ),
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_applies_rotation_then_translation() {
        let pose = Pose::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
        );
        let moved = pose.matrix().transform_point3(Vec3::X);
        assert!((moved - Vec3::new(1.0, 2.0, 2.0)).length() < 1e-5);
        assert_eq!(Pose::default(), Pose::IDENTITY);
    }
}
