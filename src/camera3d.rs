use glam::{Mat4, Vec2, Vec3};
use winit::dpi::PhysicalSize;

use crate::config::CameraConfig;

const DEFAULT_UP: Vec3 = Vec3::Y;
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// Perspective camera with a `[0, 1]` depth range.
#[derive(Debug, Clone)]
pub struct Camera3D {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera3D {
    pub fn new(position: Vec3, target: Vec3, fov_y_radians: f32, near: f32, far: f32) -> Self {
        Self { position, target, up: DEFAULT_UP, fov_y_radians, near, far }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_radians, aspect.max(0.0001), self.near, self.far)
    }

    pub fn view_projection(&self, viewport: PhysicalSize<u32>) -> Mat4 {
        self.projection_matrix(aspect_of(viewport)) * self.view_matrix()
    }

    /// View-projection with the translation removed, for geometry pinned at infinity.
    pub fn rotation_view_projection(&self, viewport: PhysicalSize<u32>) -> Mat4 {
        let mut view = self.view_matrix();
        view.w_axis = glam::Vec4::W;
        self.projection_matrix(aspect_of(viewport)) * view
    }
}

fn aspect_of(viewport: PhysicalSize<u32>) -> f32 {
    if viewport.height > 0 {
        viewport.width as f32 / viewport.height as f32
    } else {
        1.0
    }
}

/// Per-frame fly-through input, already resolved from key and mouse state.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreeflyInput {
    /// `x` strafe right, `y` rise, `z` forward; each in `[-1, 1]`.
    pub movement: Vec3,
    /// Mouse delta in pixels while looking.
    pub look: Vec2,
    pub boost: bool,
}

/// First-person controller storing yaw/pitch and writing them into a [`Camera3D`].
#[derive(Debug, Clone)]
pub struct FreeflyController {
    pub yaw_radians: f32,
    pub pitch_radians: f32,
    pub move_speed: f32,
    /// Radians per pixel of mouse motion.
    pub look_sensitivity: f32,
}

impl FreeflyController {
    pub fn from_config(config: &CameraConfig) -> (Self, Camera3D) {
        let controller = Self {
            yaw_radians: config.yaw_degrees.to_radians(),
            pitch_radians: config.pitch_degrees.to_radians().clamp(-PITCH_LIMIT, PITCH_LIMIT),
            move_speed: config.move_speed.max(0.0),
            look_sensitivity: config.look_sensitivity.to_radians(),
        };
        let position = Vec3::from_array(config.position);
        let mut camera = Camera3D::new(
            position,
            position + controller.forward(),
            config.fov_degrees.clamp(1.0, 170.0).to_radians(),
            config.near.max(1e-4),
            config.far.max(config.near + 1e-3),
        );
        controller.apply(&mut camera);
        (controller, camera)
    }

    pub fn forward(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw_radians.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch_radians.sin_cos();
        Vec3::new(cos_yaw * cos_pitch, sin_pitch, sin_yaw * cos_pitch).normalize()
    }

    pub fn update(&mut self, camera: &mut Camera3D, input: &FreeflyInput, dt: f32) {
        self.yaw_radians += input.look.x * self.look_sensitivity;
        self.pitch_radians =
            (self.pitch_radians - input.look.y * self.look_sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);

        let forward = self.forward();
        let right = forward.cross(DEFAULT_UP).normalize_or_zero();
        let direction = right * input.movement.x + DEFAULT_UP * input.movement.y + forward * input.movement.z;
        if direction.length_squared() > 0.0 {
            let speed = if input.boost { self.move_speed * 4.0 } else { self.move_speed };
            camera.position += direction.normalize() * speed * dt;
        }
        self.apply(camera);
    }

    fn apply(&self, camera: &mut Camera3D) {
        camera.target = camera.position + self.forward();
        camera.up = DEFAULT_UP;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera3d_view_projection_is_finite() {
        let camera = Camera3D::new(Vec3::new(0.0, 1.0, 5.0), Vec3::ZERO, 60.0_f32.to_radians(), 0.1, 1000.0);
        let vp = camera.view_projection(PhysicalSize::new(1280, 720));
        assert!(!vp.to_cols_array().iter().any(|v| v.is_nan() || v.is_infinite()));
    }

    #[test]
    fn rotation_view_projection_ignores_position() {
        let size = PhysicalSize::new(800, 600);
        let near = Camera3D::new(Vec3::ZERO, Vec3::NEG_Z, 1.0, 0.1, 100.0);
        let far = Camera3D::new(Vec3::new(50.0, -3.0, 7.0), Vec3::new(50.0, -3.0, 6.0), 1.0, 0.1, 100.0);
        let a = near.rotation_view_projection(size);
        let b = far.rotation_view_projection(size);
        assert!(a.abs_diff_eq(b, 1e-5));
    }

    #[test]
    fn default_config_looks_down_negative_z() {
        let (controller, camera) = FreeflyController::from_config(&CameraConfig::default());
        assert!((controller.forward() - Vec3::NEG_Z).length() < 1e-5);
        assert!((camera.target - camera.position - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn moving_forward_follows_view_direction() {
        let (mut controller, mut camera) = FreeflyController::from_config(&CameraConfig::default());
        let start = camera.position;
        let input = FreeflyInput { movement: Vec3::Z, ..Default::default() };
        controller.update(&mut camera, &input, 0.5);
        let travelled = camera.position - start;
        assert!((travelled - Vec3::NEG_Z * 3.0).length() < 1e-4);
    }

    #[test]
    fn pitch_is_clamped_short_of_vertical() {
        let (mut controller, mut camera) = FreeflyController::from_config(&CameraConfig::default());
        let input = FreeflyInput { look: Vec2::new(0.0, -1.0e6), ..Default::default() };
        controller.update(&mut camera, &input, 0.016);
        assert!(controller.pitch_radians <= PITCH_LIMIT);
        assert!(camera.view_matrix().to_cols_array().iter().all(|v| v.is_finite()));
    }
}
