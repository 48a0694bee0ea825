use glam::{Mat4, Vec2, Vec3};

use crate::rendering::common::bounds::{Frustum, Ray};

/// A perspective camera in world space (Z up). Yaw rotates around Z starting at +X, pitch tilts
/// towards +Z.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    /// Height above the ground, scales the dungeon streaming radius.
    pub altitude: f32,
    /// For top down cameras: the world space rectangle that is currently on screen.
    pub viewport: Option<(Vec2, Vec2)>,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            fov_y: 60f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.5,
            far: 1500.0,
            altitude: 0.0,
            viewport: None,
        }
    }
}

impl Camera {
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let direction = (target - position).normalize_or_zero();
        Self {
            position,
            yaw: direction.y.atan2(direction.x),
            pitch: direction.z.clamp(-1.0, 1.0).asin(),
            ..Default::default()
        }
    }

    pub fn forward(&self) -> Vec3 {
        Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.yaw.sin() * self.pitch.cos(),
            self.pitch.sin(),
        )
    }

    pub fn view_projection(&self) -> Mat4 {
        let proj = Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far);
        let view = Mat4::look_to_rh(self.position, self.forward(), Vec3::Z);
        proj * view
    }

    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection())
    }

    /// The picking ray through the screen center.
    pub fn center_ray(&self) -> Ray {
        Ray::new(self.position, self.forward())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looking_at_sees_the_target() {
        let camera = Camera::looking_at(Vec3::new(0.0, 0.0, 10.0), Vec3::new(50.0, 20.0, 0.0));
        let frustum = camera.frustum();
        assert!(frustum.contains_point(Vec3::new(50.0, 20.0, 0.0)));
        assert!(!frustum.contains_point(Vec3::new(-50.0, -20.0, 0.0)));
        assert!(camera.forward().abs_diff_eq((Vec3::new(50.0, 20.0, -10.0)).normalize(), 1e-5));
    }
}
