use nalgebra::{Unit, UnitQuaternion, Vector3};

use super::constants::physics::EPSILON;

/// Snaps a direction to the signed principal axis it is closest to.
/// Ties resolve toward Z.
pub fn snapped_to_nearest_axis(direction: Vector3<f32>) -> Vector3<f32> {
    let x = direction.x.abs();
    let y = direction.y.abs();
    let z = direction.z.abs();
    if x > y && x > z {
        Vector3::new(direction.x.signum(), 0.0, 0.0)
    } else if y > x && y > z {
        Vector3::new(0.0, direction.y.signum(), 0.0)
    } else {
        Vector3::new(0.0, 0.0, direction.z.signum())
    }
}

/// Rotation whose local +Z points along `forward` with local +Y as close to `up` as possible.
/// Degenerate inputs fall back to a rotation that only aligns `forward`.
pub fn look_rotation(forward: Vector3<f32>, up: Vector3<f32>) -> UnitQuaternion<f32> {
    if forward.norm_squared() < EPSILON * EPSILON {
        return UnitQuaternion::identity();
    }
    if forward.cross(&up).norm_squared() < EPSILON * EPSILON {
        return UnitQuaternion::rotation_between(&Vector3::z(), &forward)
            .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f32::consts::PI));
    }
    UnitQuaternion::face_towards(&forward, &up)
}

/// Caps the length of `v` at `max`.
pub fn clamp_magnitude(v: Vector3<f32>, max: f32) -> Vector3<f32> {
    let len = v.norm();
    if len > max && len > EPSILON {
        v * (max / len)
    } else {
        v
    }
}

/// Removes the component of `v` along `normal`.
pub fn project_on_plane(v: Vector3<f32>, normal: Vector3<f32>) -> Vector3<f32> {
    match Unit::try_new(normal, EPSILON) {
        Some(n) => v - n.into_inner() * v.dot(&n),
        None => v,
    }
}

/// Linear interpolation with `t` clamped to [0, 1].
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t.clamp(0.0, 1.0)
}

pub fn lerp_vector(a: Vector3<f32>, b: Vector3<f32>, t: f32) -> Vector3<f32> {
    a + (b - a) * t.clamp(0.0, 1.0)
}

/// Normalized copy of `v`, or zero when `v` is too short to normalize.
pub fn normalize_or_zero(v: Vector3<f32>) -> Vector3<f32> {
    v.try_normalize(EPSILON).unwrap_or_else(Vector3::zeros)
}
