//! VU0 skinning matrix management for moby meshes
//!
//! Skinned vertices are transformed on VU0, which only has 64 matrix slots.
//! This crate decides which joint and blended matrices live in which slot for
//! each packet, when joint matrices are copied in, and how that is encoded
//! into the 16-byte vertex records. It can also replay those records to
//! recover the per-vertex skinning attributes.
//!
//! # Modules
//!
//! - [`allocator`] - VU0 slot allocation with generation-based staleness
//! - [`liveness`] - Cross-packet sharing of identical blends
//! - [`schedule`] - Placement of matrix transfers
//! - [`encode`] / [`decode`] - Logical vertices ↔ vertex records
//! - [`record`] - On-disk record layout
//! - [`packing`] - Position and normal quantisation
//! - [`config`] - Per-mesh-class settings

pub mod allocator;
pub mod attributes;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod liveness;
pub mod packing;
pub mod record;
pub mod schedule;
pub mod vertex;

pub use allocator::{BlendAllocation, MatrixAllocation, MatrixSlot, Vu0MatrixAllocator};
pub use attributes::SkinAttributes;
pub use config::SkinningConfig;
pub use decode::{
    BlendCache, decode_packets, prepare_skin_matrices, read_skin_attributes, unpack_vertices,
};
pub use encode::{apply_schedule, encode_packets, pack_vertices};
pub use error::{Result, SkinningError};
pub use liveness::{
    MatrixLivenessInfo, VertexLocation, compute_matrix_liveness,
    max_num_joints_referenced_per_packet,
};
pub use record::{DISCARD_ADDR, MatrixTransfer, PacketRecords, VU0_SLOT_COUNT, VertexRecord};
pub use schedule::{MatrixTransferSchedule, schedule_matrix_transfers};
pub use vertex::{Packet, Vertex};
