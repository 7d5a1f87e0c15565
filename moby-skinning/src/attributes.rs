//! Per-vertex skinning attributes
//!
//! A vertex is skinned by up to three joint matrices blended with 8-bit
//! weights. The derived ordering (count, then joints, then weights) is what
//! the allocator keys on and what liveness analysis sorts by, so the field
//! order of [`SkinAttributes`] must not change.

/// Weight carried by a single-joint attribute.
pub const FULL_WEIGHT: u8 = 255;

/// Up to three (joint, weight) pairs.
///
/// `count == 0` only appears on the decode side: it is the bind (identity)
/// matrix that non-animated meshes load in place of joint 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SkinAttributes {
    pub count: u8,
    pub joints: [i8; 3],
    pub weights: [u8; 3],
}

impl SkinAttributes {
    /// Unblended matrix for one joint.
    #[inline]
    pub const fn single(joint: i8) -> Self {
        Self {
            count: 1,
            joints: [joint, 0, 0],
            weights: [FULL_WEIGHT, 0, 0],
        }
    }

    #[inline]
    pub const fn two_way(joints: [i8; 2], weights: [u8; 2]) -> Self {
        Self {
            count: 2,
            joints: [joints[0], joints[1], 0],
            weights: [weights[0], weights[1], 0],
        }
    }

    #[inline]
    pub const fn three_way(joints: [i8; 3], weights: [u8; 3]) -> Self {
        Self {
            count: 3,
            joints,
            weights,
        }
    }

    /// Bind pose matrix used by meshes without animation.
    #[inline]
    pub const fn identity() -> Self {
        Self {
            count: 0,
            joints: [0; 3],
            weights: [0; 3],
        }
    }

    /// True if this matrix has to be produced by a blend operation.
    #[inline]
    pub const fn is_blend(&self) -> bool {
        self.count > 1
    }

    /// The joints actually referenced (the first `count` entries).
    pub fn used_joints(&self) -> &[i8] {
        &self.joints[..(self.count as usize).min(3)]
    }
}
