//! Error type for skinning matrix management.
//!
//! Every variant is fatal for the mesh class being converted. The tool is a
//! deterministic batch converter so nothing is retried.

use crate::attributes::SkinAttributes;

/// Errors raised while allocating, scheduling or decoding skin matrices.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkinningError {
    #[error(
        "Failed to allocate transfer matrices in VU0 memory ({max_joints} joints per packet). Try simplifying your joint weights."
    )]
    TooManyJoints { max_joints: usize },

    #[error(
        "Failed to get address for matrix with joint weights {attribs:?}. Generations are {allocation} and {slot}."
    )]
    StaleAllocation {
        attribs: SkinAttributes,
        allocation: i32,
        slot: i32,
    },

    #[error("Bad liveness analysis (current packet is {current_packet}, max is {liveness}).")]
    BadLiveness { current_packet: i32, liveness: i32 },

    #[error("No VU0 allocation exists for matrix {attribs:?} in packet {packet}.")]
    MissingAllocation {
        attribs: SkinAttributes,
        packet: usize,
    },

    #[error("Joint {joint} in packet {packet} doesn't fit in a vertex record (0 to 127).")]
    JointOutOfRange { joint: i8, packet: usize },

    #[error("Unaligned VU0 matrix address 0x{0:02x}.")]
    UnalignedAddress(u8),

    #[error("Matrix load from uninitialised VU0 address 0x{0:02x}.")]
    UninitialisedLoad(u8),

    #[error(
        "Loading from and storing to the same VU0 address (0x{0:02x}) in the same loop iteration."
    )]
    SelfReferencingLoad(u8),

    #[error("Input to {0}-way matrix blend operation has already been blended.")]
    BlendOfBlend(u8),

    #[error("No VU0 slot could be evicted for blended matrix {attribs:?} in packet {packet}.")]
    BlendSlotsExhausted { attribs: SkinAttributes, packet: i32 },

    #[error("Scheduled {transfers} transfers into {available} available records.")]
    ScheduleOverflow { transfers: usize, available: usize },
}

/// Result alias used throughout the crate.
pub type Result<T, E = SkinningError> = std::result::Result<T, E>;
