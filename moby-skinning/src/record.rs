//! Hardware vertex records and matrix transfers
//!
//! POD formats as consumed by the VU0 skinning loop. No magic bytes and no
//! tag: a record's meaning is decided by its position inside the packet
//! (two-way blends first, then three-way blends, then regular loads).
//!
//! # Record layout
//! ```text
//! 0x00: low_halfword u16   [0..8] vertex index, [9..15] joint or load address 3 / 2
//! 0x02: skin [u8; 6]       two-way:   load_1, load_2, weight_1, weight_2, transfer_store, blend_store
//!                          three-way: load_1, load_2, weight_1, weight_2, weight_3, blend_store
//!                          regular:   load, transfer_store, (unused × 4)
//! 0x08: normal_azimuth u8
//! 0x09: normal_elevation u8
//! 0x0A: x i16
//! 0x0C: y i16
//! 0x0E: z i16
//! ```

use bytemuck::{Pod, Zeroable};

/// Number of matrix slots in VU0 memory.
pub const VU0_SLOT_COUNT: usize = 0x40;

/// Stores to this address are never read back.
pub const DISCARD_ADDR: u8 = 0xf4;

/// Size of one vertex record in bytes.
pub const VERTEX_RECORD_SIZE: usize = 0x10;

const VERTEX_INDEX_MASK: u16 = 0x1ff;
const HIGH_BITS_SHIFT: u16 = 9;

/// Copy of one joint matrix from scratchpad into a VU0 slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct MatrixTransfer {
    pub joint: u8,
    pub dest_addr: u8,
}

impl MatrixTransfer {
    pub const fn new(joint: u8, dest_addr: u8) -> Self {
        Self { joint, dest_addr }
    }
}

/// One 16-byte vertex as laid out for the skinning loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct VertexRecord {
    pub low_halfword: u16,
    pub skin: [u8; 6],
    pub normal_azimuth: u8,
    pub normal_elevation: u8,
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

/// Two-way blend view of a record's skin bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwoWayBlend {
    pub load_addr_1: u8,
    pub load_addr_2: u8,
    pub weight_1: u8,
    pub weight_2: u8,
    pub transfer_store_addr: u8,
    pub blend_store_addr: u8,
}

/// Three-way blend view. The third load address lives in the high bits of
/// the low halfword, halved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreeWayBlend {
    pub load_addr_1: u8,
    pub load_addr_2: u8,
    pub load_addr_3: u8,
    pub weights: [u8; 3],
    pub blend_store_addr: u8,
}

/// Regular view: one load, executed after the optional transfer store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegularLoad {
    pub load_addr: u8,
    pub transfer_store_addr: u8,
}

impl VertexRecord {
    pub const SIZE: usize = VERTEX_RECORD_SIZE;

    #[inline]
    pub fn vertex_index(&self) -> u16 {
        self.low_halfword & VERTEX_INDEX_MASK
    }

    #[inline]
    pub fn set_vertex_index(&mut self, index: u16) {
        self.low_halfword = (self.low_halfword & !VERTEX_INDEX_MASK) | (index & VERTEX_INDEX_MASK);
    }

    /// Bits [9..15] of the low halfword.
    #[inline]
    pub fn high_bits(&self) -> u8 {
        (self.low_halfword >> HIGH_BITS_SHIFT) as u8
    }

    #[inline]
    pub fn set_high_bits(&mut self, bits: u8) {
        self.low_halfword =
            (self.low_halfword & VERTEX_INDEX_MASK) | (((bits & 0x7f) as u16) << HIGH_BITS_SHIFT);
    }

    /// Joint carried by a two-way or regular record's transfer.
    #[inline]
    pub fn transferred_joint(&self) -> i8 {
        self.high_bits() as i8
    }

    pub fn two_way(&self) -> TwoWayBlend {
        let s = self.skin;
        TwoWayBlend {
            load_addr_1: s[0],
            load_addr_2: s[1],
            weight_1: s[2],
            weight_2: s[3],
            transfer_store_addr: s[4],
            blend_store_addr: s[5],
        }
    }

    pub fn set_two_way(&mut self, blend: &TwoWayBlend) {
        self.skin = [
            blend.load_addr_1,
            blend.load_addr_2,
            blend.weight_1,
            blend.weight_2,
            blend.transfer_store_addr,
            blend.blend_store_addr,
        ];
    }

    pub fn three_way(&self) -> ThreeWayBlend {
        let s = self.skin;
        ThreeWayBlend {
            load_addr_1: s[0],
            load_addr_2: s[1],
            load_addr_3: self.high_bits() * 2,
            weights: [s[2], s[3], s[4]],
            blend_store_addr: s[5],
        }
    }

    pub fn set_three_way(&mut self, blend: &ThreeWayBlend) {
        self.skin = [
            blend.load_addr_1,
            blend.load_addr_2,
            blend.weights[0],
            blend.weights[1],
            blend.weights[2],
            blend.blend_store_addr,
        ];
        self.set_high_bits(blend.load_addr_3 / 2);
    }

    pub fn regular(&self) -> RegularLoad {
        RegularLoad {
            load_addr: self.skin[0],
            transfer_store_addr: self.skin[1],
        }
    }

    pub fn set_regular(&mut self, load: &RegularLoad) {
        self.skin[0] = load.load_addr;
        self.skin[1] = load.transfer_store_addr;
    }

    /// Attach a transfer to a regular record.
    pub fn attach_regular_transfer(&mut self, transfer: MatrixTransfer) {
        self.set_high_bits(transfer.joint);
        self.skin[1] = transfer.dest_addr;
    }

    /// Attach a transfer to a two-way blend record.
    pub fn attach_two_way_transfer(&mut self, transfer: MatrixTransfer) {
        self.set_high_bits(transfer.joint);
        self.skin[4] = transfer.dest_addr;
    }

    /// Write record to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..2].copy_from_slice(&self.low_halfword.to_le_bytes());
        bytes[2..8].copy_from_slice(&self.skin);
        bytes[8] = self.normal_azimuth;
        bytes[9] = self.normal_elevation;
        bytes[10..12].copy_from_slice(&self.x.to_le_bytes());
        bytes[12..14].copy_from_slice(&self.y.to_le_bytes());
        bytes[14..16].copy_from_slice(&self.z.to_le_bytes());
        bytes
    }

    /// Read record from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        let mut skin = [0u8; 6];
        skin.copy_from_slice(&bytes[2..8]);
        Some(Self {
            low_halfword: u16::from_le_bytes([bytes[0], bytes[1]]),
            skin,
            normal_azimuth: bytes[8],
            normal_elevation: bytes[9],
            x: i16::from_le_bytes([bytes[10], bytes[11]]),
            y: i16::from_le_bytes([bytes[12], bytes[13]]),
            z: i16::from_le_bytes([bytes[14], bytes[15]]),
        })
    }
}

/// Low-level form of one packet: its records plus the transfers that must
/// run before the first record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketRecords {
    pub preloop_transfers: Vec<MatrixTransfer>,
    pub two_way_blend_count: usize,
    pub three_way_blend_count: usize,
    pub main_count: usize,
    pub records: Vec<VertexRecord>,
    /// `index_mapping[i]` is the record emitted for input vertex `i`.
    pub index_mapping: Vec<usize>,
}

impl PacketRecords {
    /// First record that uses the regular view.
    #[inline]
    pub fn regular_begin(&self) -> usize {
        self.two_way_blend_count + self.three_way_blend_count
    }

    /// Records that use the regular view.
    pub fn regular_records(&self) -> &[VertexRecord] {
        &self.records[self.regular_begin().min(self.records.len())..]
    }
}
