use glam::{Mat4, Vec3};

use crate::scene::SceneState;

pub const MODEL_SCALE: f32 = 0.5;
/// Radians per second about the Y axis.
pub const ROTATION_SPEED: f32 = 1.0;

pub const EYE: Vec3 = Vec3::new(0.0, 0.0, -5.0);
pub const TARGET: Vec3 = Vec3::ZERO;
// Not unit length. look_at only uses its direction.
pub const UP: Vec3 = Vec3::new(0.0, 2.0, 0.0);

/// Model, view and projection for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTransforms {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

impl FrameTransforms {
    /// Pure function of the scene and the elapsed time in seconds.
    pub fn compute(scene: &SceneState, elapsed: f32) -> Self {
        let model = Mat4::from_scale(Vec3::splat(MODEL_SCALE))
            * Mat4::from_rotation_y(elapsed * ROTATION_SPEED);
        let projection = Mat4::perspective_rh_gl(
            scene.fov().to_radians(),
            scene.aspect(),
            scene.near(),
            scene.far(),
        );
        let view = Mat4::look_at_rh(EYE, TARGET, UP);
        Self {
            model,
            view,
            projection,
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}
