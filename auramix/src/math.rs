//! Math types for Auramix

pub use glam::{Mat3, Vec3};

/// Normalizes `v`, returning `None` for zero-length or non-finite vectors.
pub fn try_normalize(v: Vec3) -> Option<Vec3> {
    let len = v.length();
    if len.is_finite() && len > f32::EPSILON {
        Some(v / len)
    } else {
        None
    }
}

/// Snaps a fractional frame cursor onto the nearest integer when it is within
/// floating point noise of it, so unit-step playback stays sample exact.
pub fn snap_frame(cursor: f64) -> f64 {
    let rounded = cursor.round();
    if (cursor - rounded).abs() < 1e-6 {
        rounded
    } else {
        cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_normalize() {
        assert!(try_normalize(Vec3::ZERO).is_none());
        assert!(try_normalize(Vec3::new(f32::NAN, 0.0, 0.0)).is_none());
        let n = try_normalize(Vec3::new(3.0, 0.0, 4.0)).unwrap();
        assert!((n.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_snap_frame() {
        assert_eq!(snap_frame(47999.9999999), 48000.0);
        assert_eq!(snap_frame(10.5), 10.5);
    }
}
