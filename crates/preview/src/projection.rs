//! CPU mirror of the camera helpers injected into every wrapped shader.
//!
//! The GLSL in [`crate::transform`] and these functions must stay in lock
//! step: the ordering of the radius clamp and the tilt subtraction in the
//! dome mapping is observable in rendered output.

use std::f32::consts::{FRAC_PI_2, PI};

use glam::{Mat3, Vec2, Vec3};

use crate::types::CameraMode;

/// Full camera description carried by the uniform contract.
///
/// Only `tilt_deg` is driven interactively; the remaining fields exist for
/// the offline renderer and stay at their defaults in the preview.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraRig {
    pub position: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fov: f32,
    pub tilt_deg: f32,
    /// Interpupillary distance in metres for stereo renders.
    pub ipd: f32,
}

impl Default for CameraRig {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::Z,
            up: Vec3::Y,
            fov: 90f32.to_radians(),
            tilt_deg: 0.0,
            ipd: 0.064,
        }
    }
}

impl CameraRig {
    pub fn basis(&self) -> Mat3 {
        camera_basis(self.direction, self.up)
    }
}

/// Builds the `[right, up, forward]` basis from a view direction and up hint.
pub fn camera_basis(direction: Vec3, up: Vec3) -> Mat3 {
    let f = direction.normalize();
    let r = up.cross(f).normalize();
    let u = f.cross(r);
    Mat3::from_cols(r, u, f)
}

fn spherical_to_cartesian(lat: f32, lon: f32) -> Vec3 {
    Vec3::new(lat.cos() * lon.sin(), lat.sin(), lat.cos() * lon.cos())
}

/// Full-sphere longitude/latitude mapping, rotated into the camera basis.
pub fn equirect_direction(uv: Vec2, basis: &Mat3) -> Vec3 {
    let lon = (uv.x * 2.0 - 1.0) * PI;
    let lat = (uv.y * 2.0 - 1.0) * FRAC_PI_2;
    (*basis * spherical_to_cartesian(lat, lon)).normalize()
}

/// Hemispherical "LL180" dome mapping with a horizon tilt.
///
/// Computed directly in world space: the camera basis is not applied, so a
/// tilt of zero always centres the view on the horizon.
pub fn dome_direction(uv: Vec2, tilt_deg: f32) -> Vec3 {
    let centered = uv * 2.0 - Vec2::ONE;
    let r = centered.length().min(1.0);
    let azimuth = centered.y.atan2(centered.x);
    let theta = r * FRAC_PI_2;
    let lat = (tilt_deg.to_radians() - theta).clamp(-FRAC_PI_2, FRAC_PI_2);
    spherical_to_cartesian(lat, azimuth).normalize()
}

/// Unit ray for a normalized viewport coordinate, or `None` in 2D mode where
/// the shader works in screen space.
pub fn ray_direction(mode: CameraMode, uv: Vec2, rig: &CameraRig) -> Option<Vec3> {
    match mode {
        CameraMode::Standard2d => None,
        CameraMode::Equirectangular => Some(equirect_direction(uv, &rig.basis())),
        CameraMode::TiltedDome => Some(dome_direction(uv, rig.tilt_deg)),
    }
}
