//! Vertex attribute packing utilities
//!
//! Converts between f32 vertex data and the fixed-point fields of a
//! [`VertexRecord`]:
//! - position f32x3 → i16x3 (1024 units per `scale`)
//! - normal f32x3 → azimuth/elevation angles in 1/256ths of a turn
//!
//! The skin bytes are handled by the encoder and decoder, not here.

use std::f32::consts::PI;

use glam::Vec3;

use crate::record::VertexRecord;

/// Fixed-point units per unit of mesh scale.
pub const POSITION_UNITS: f32 = 1024.0;

/// Elevation of a normal that points straight up.
const ELEVATION_UP: u8 = 0x40;

// ============================================================================
// Position Packing
// ============================================================================

/// Quantise a position to the record's i16 coordinates.
#[inline]
pub fn pack_position(position: Vec3, scale: f32) -> [i16; 3] {
    let inverse_scale = POSITION_UNITS / scale;
    [
        (position.x * inverse_scale).round() as i16,
        (position.y * inverse_scale).round() as i16,
        (position.z * inverse_scale).round() as i16,
    ]
}

#[inline]
pub fn unpack_position(coords: [i16; 3], scale: f32) -> Vec3 {
    Vec3::new(coords[0] as f32, coords[1] as f32, coords[2] as f32) * (scale / POSITION_UNITS)
}

// ============================================================================
// Normal Packing
// ============================================================================

/// Encode a normal as (azimuth, elevation).
///
/// A straight-up normal has no meaningful azimuth. Its azimuth is rotated by
/// half a turn, which is what the game's own assets contain.
pub fn pack_normal(normal: Vec3) -> (u8, u8) {
    let normal = normal.normalize_or_zero();
    let azimuth = normal.x.atan2(normal.y);
    let elevation = normal.z.clamp(-1.0, 1.0).asin();
    let mut azimuth = (azimuth * (128.0 / PI)).round() as i32 as u8;
    let elevation = (elevation * (128.0 / PI)).round() as i32 as u8;
    if elevation == ELEVATION_UP {
        azimuth = azimuth.wrapping_add(0x80);
    }
    (azimuth, elevation)
}

/// Decode (azimuth, elevation) back into a unit normal.
pub fn unpack_normal(azimuth: u8, elevation: u8) -> Vec3 {
    let azimuth = azimuth as f32 * (PI / 128.0);
    let elevation = elevation as f32 * (PI / 128.0);
    let (sin_azimuth, cos_azimuth) = azimuth.sin_cos();
    let (sin_elevation, cos_elevation) = elevation.sin_cos();
    Vec3::new(
        sin_azimuth * cos_elevation,
        cos_azimuth * cos_elevation,
        sin_elevation,
    )
}

// ============================================================================
// Record Attributes
// ============================================================================

/// Pack everything except the skin bytes into `dest`.
pub fn pack_common_attributes(dest: &mut VertexRecord, position: Vec3, normal: Vec3, scale: f32) {
    let [x, y, z] = pack_position(position, scale);
    dest.x = x;
    dest.y = y;
    dest.z = z;
    let (azimuth, elevation) = pack_normal(normal);
    dest.normal_azimuth = azimuth;
    dest.normal_elevation = elevation;
}

/// Inverse of [`pack_common_attributes`]: (position, normal).
pub fn unpack_common_attributes(src: &VertexRecord, scale: f32) -> (Vec3, Vec3) {
    (
        unpack_position([src.x, src.y, src.z], scale),
        unpack_normal(src.normal_azimuth, src.normal_elevation),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_position_rounds() {
        assert_eq!(pack_position(Vec3::new(1.0, -0.5, 0.0), 1.0), [1024, -512, 0]);
        assert_eq!(pack_position(Vec3::new(2.0, 0.0, 0.0), 4.0), [512, 0, 0]);
        assert_eq!(pack_position(Vec3::new(0.00049, 0.0, 0.0), 1.0), [1, 0, 0]);
    }

    #[test]
    fn test_position_roundtrip() {
        let p = Vec3::new(3.25, -1.5, 0.125);
        let decoded = unpack_position(pack_position(p, 8.0), 8.0);
        assert!((decoded - p).length() < 0.01);
    }

    #[test]
    fn test_normal_up_rotates_azimuth() {
        let (azimuth, elevation) = pack_normal(Vec3::Z);
        assert_eq!(elevation, 0x40);
        assert_eq!(azimuth, 0x80);
    }

    #[test]
    fn test_normal_roundtrip() {
        let test_dirs = [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(0.577, 0.577, 0.577),
            Vec3::new(-0.3, 0.2, -0.9),
        ];

        for dir in test_dirs {
            let normalized = dir.normalize();
            let (azimuth, elevation) = pack_normal(normalized);
            let decoded = unpack_normal(azimuth, elevation);
            let error = (decoded - normalized).length();
            assert!(error < 0.05, "Roundtrip failed for {:?}", normalized);
        }
    }
}
