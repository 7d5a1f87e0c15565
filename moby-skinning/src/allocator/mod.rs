//! VU0 matrix slot allocator
//!
//! VU0 memory has 64 matrix slots addressed in steps of 4. The bottom of the
//! address space holds matrices transferred straight from the scratchpad
//! (one per joint referenced by the packet), the rest holds blended
//! matrices which may stay resident across packets.
//!
//! ```text
//! 0x00 ............ first_blend_store_addr ............ 0xf4
//! |   transferred   |            blended                |
//! ```
//!
//! Slots are never cleared. Each slot carries a generation that is bumped
//! whenever its contents are replaced, and each allocation remembers the
//! generation it was made with, so a stale allocation is simply one whose
//! generation no longer matches its slot.

use hashbrown::HashMap;

use crate::attributes::SkinAttributes;
use crate::error::{Result, SkinningError};
use crate::record::{DISCARD_ADDR, VU0_SLOT_COUNT};
use crate::vertex::Vertex;


/// Caller-side handle to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixAllocation {
    pub address: u8,
    /// Cleared by [`Vu0MatrixAllocator::get_allocation`].
    pub first_use: bool,
    /// Cleared by [`Vu0MatrixAllocator::get_allocation_pre`].
    pub first_use_pre: bool,
    pub generation: i32,
}

impl Default for MatrixAllocation {
    fn default() -> Self {
        Self {
            address: 0,
            first_use: true,
            first_use_pre: true,
            generation: -1,
        }
    }
}

/// One hardware slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixSlot {
    pub generation: i32,
    /// Last packet that needs the contents, -1 if none.
    pub liveness: i32,
    pub current_contents: SkinAttributes,
}

impl Default for MatrixSlot {
    fn default() -> Self {
        Self {
            generation: 0,
            liveness: -1,
            current_contents: SkinAttributes::default(),
        }
    }
}

/// Outcome of [`Vu0MatrixAllocator::allocate_blended`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendAllocation {
    /// The blend is still resident from an earlier allocation.
    Resident,
    /// A slot was claimed at this address.
    Allocated(u8),
    /// Every blend slot is needed by this packet. No allocation exists for
    /// the key afterwards, so each vertex using it blends inline.
    Abandoned,
}

#[inline]
fn slot_index(address: u8) -> usize {
    address as usize / 4
}

/// Allocates VU0 slots for one mesh class. Feed it packets in order.
#[derive(Debug, Clone)]
pub struct Vu0MatrixAllocator {
    allocations: HashMap<SkinAttributes, MatrixAllocation>,
    slots: [MatrixSlot; VU0_SLOT_COUNT],
    next_transfer_store_addr: u8,
    first_blend_store_addr: u8,
    next_blend_store_addr: u8,
    transfer_allocations_this_packet: usize,
    blend_allocations_this_packet: usize,
    strict_blend_allocation: bool,
}

impl Vu0MatrixAllocator {
    /// Reserve `max_joints_per_packet` transferred slots.
    pub fn new(max_joints_per_packet: usize) -> Result<Self> {
        let first_blend_store_addr = max_joints_per_packet.saturating_mul(4);
        if first_blend_store_addr >= DISCARD_ADDR as usize {
            return Err(SkinningError::TooManyJoints {
                max_joints: max_joints_per_packet,
            });
        }
        let first_blend_store_addr = first_blend_store_addr as u8;
        Ok(Self {
            allocations: HashMap::new(),
            slots: [MatrixSlot::default(); VU0_SLOT_COUNT],
            next_transfer_store_addr: 0,
            first_blend_store_addr,
            next_blend_store_addr: first_blend_store_addr,
            transfer_allocations_this_packet: 0,
            blend_allocations_this_packet: 0,
            strict_blend_allocation: false,
        })
    }

    /// Turn abandoned blend allocations into [`SkinningError::BlendSlotsExhausted`].
    pub fn with_strict_blend_allocation(mut self, strict: bool) -> Self {
        self.strict_blend_allocation = strict;
        self
    }

    pub fn first_blend_store_addr(&self) -> u8 {
        self.first_blend_store_addr
    }

    pub fn transfer_allocations_this_packet(&self) -> usize {
        self.transfer_allocations_this_packet
    }

    pub fn blend_allocations_this_packet(&self) -> usize {
        self.blend_allocations_this_packet
    }

    pub fn slot(&self, address: u8) -> &MatrixSlot {
        &self.slots[slot_index(address)]
    }

    /// Start a new packet.
    ///
    /// Transferred matrices are reloaded by every packet so all of them go
    /// stale here. Blended matrices are kept and expire through liveness.
    pub fn new_packet(&mut self) {
        self.next_blend_store_addr = self.first_blend_store_addr;
        self.transfer_allocations_this_packet = 0;
        self.blend_allocations_this_packet = 0;
        let transferred = slot_index(self.first_blend_store_addr);
        for slot in &mut self.slots[..transferred] {
            slot.generation += 1;
        }
    }

    fn is_valid(&self, allocation: &MatrixAllocation) -> bool {
        allocation.generation == self.slots[slot_index(allocation.address)].generation
    }

    /// Claim a transferred slot for `joint`.
    ///
    /// Returns `None` if the joint is already resident this packet.
    pub fn allocate_transferred(&mut self, joint: u8) -> Option<u8> {
        let attribs = SkinAttributes::single(joint as i8);
        let allocation = self.allocations.entry(attribs).or_default();
        if allocation.generation == self.slots[slot_index(allocation.address)].generation {
            return None;
        }

        let address = self.next_transfer_store_addr;
        let slot = &mut self.slots[slot_index(address)];
        slot.generation += 1;
        *allocation = MatrixAllocation {
            address,
            first_use: true,
            first_use_pre: true,
            generation: slot.generation,
        };
        tracing::trace!(joint, address, "alloc transferred matrix");

        self.transfer_allocations_this_packet += 1;
        self.next_transfer_store_addr += 4;
        if self.next_transfer_store_addr >= self.first_blend_store_addr {
            self.next_transfer_store_addr = 0;
        }
        Some(address)
    }

    /// Claim a blend slot for `attribs`, keeping it live until `last_packet`.
    ///
    /// Slots that are no longer live are taken round-robin. If every slot is
    /// live, the one that stays live the longest and is not needed by
    /// `packet_vertices` is evicted.
    pub fn allocate_blended(
        &mut self,
        attribs: SkinAttributes,
        current_packet: i32,
        last_packet: i32,
        packet_vertices: &[Vertex],
    ) -> Result<BlendAllocation> {
        if let Some(allocation) = self.allocations.get(&attribs) {
            if self.is_valid(allocation) {
                return Ok(BlendAllocation::Resident);
            }
        }

        let first_addr = self.next_blend_store_addr;
        while self.slots[slot_index(self.next_blend_store_addr)].liveness >= current_packet {
            self.next_blend_store_addr += 4;
            if self.next_blend_store_addr >= DISCARD_ADDR {
                self.next_blend_store_addr = self.first_blend_store_addr;
            }
            if self.next_blend_store_addr == first_addr {
                match self.eviction_candidate(packet_vertices) {
                    Some(address) => {
                        self.next_blend_store_addr = address;
                        break;
                    }
                    None => return self.abandon(attribs, current_packet),
                }
            }
        }

        let address = self.next_blend_store_addr;
        let slot = &mut self.slots[slot_index(address)];
        slot.generation += 1;
        slot.liveness = last_packet;
        slot.current_contents = attribs;
        self.allocations.insert(
            attribs,
            MatrixAllocation {
                address,
                first_use: true,
                first_use_pre: true,
                generation: slot.generation,
            },
        );
        tracing::trace!(?attribs, address, last_packet, "alloc blended matrix");

        self.blend_allocations_this_packet += 1;
        self.next_blend_store_addr += 4;
        if self.next_blend_store_addr >= DISCARD_ADDR {
            self.next_blend_store_addr = self.first_blend_store_addr;
        }
        Ok(BlendAllocation::Allocated(address))
    }

    /// Blend slot with the highest liveness whose contents this packet
    /// doesn't use.
    fn eviction_candidate(&self, packet_vertices: &[Vertex]) -> Option<u8> {
        let mut best: Option<(u8, i32)> = None;
        for address in (self.first_blend_store_addr..DISCARD_ADDR).step_by(4) {
            let slot = &self.slots[slot_index(address)];
            let used_by_this_packet = packet_vertices
                .iter()
                .any(|vertex| vertex.skin == slot.current_contents);
            let best_liveness = best.map_or(-1, |(_, liveness)| liveness);
            if slot.liveness > best_liveness && !used_by_this_packet {
                best = Some((address, slot.liveness));
            }
        }
        best.map(|(address, _)| address)
    }

    fn abandon(&mut self, attribs: SkinAttributes, current_packet: i32) -> Result<BlendAllocation> {
        self.allocations.remove(&attribs);
        if self.strict_blend_allocation {
            return Err(SkinningError::BlendSlotsExhausted {
                attribs,
                packet: current_packet,
            });
        }
        tracing::warn!(
            ?attribs,
            packet = current_packet,
            "no VU0 slot free for blended matrix, blending inline"
        );
        Ok(BlendAllocation::Abandoned)
    }

    /// Look up the allocation for `attribs`, clearing its `first_use` flag.
    ///
    /// The returned copy still has the flag as it was before the call. A
    /// stale allocation, or a blend whose slot already expired, means the
    /// schedule is broken.
    pub fn get_allocation(
        &mut self,
        attribs: SkinAttributes,
        current_packet: i32,
    ) -> Result<Option<MatrixAllocation>> {
        let Some(allocation) = self.allocations.get_mut(&attribs) else {
            return Ok(None);
        };
        let slot = &self.slots[slot_index(allocation.address)];
        if allocation.generation != slot.generation {
            return Err(SkinningError::StaleAllocation {
                attribs,
                allocation: allocation.generation,
                slot: slot.generation,
            });
        }
        if attribs.count != 1 && slot.liveness < current_packet {
            return Err(SkinningError::BadLiveness {
                current_packet,
                liveness: slot.liveness,
            });
        }
        let copy = *allocation;
        allocation.first_use = false;
        Ok(Some(copy))
    }

    /// Like [`get_allocation`](Self::get_allocation) but only clears
    /// `first_use_pre` and doesn't check validity. The scheduler uses it to
    /// count blends before the encoder consumes `first_use`.
    pub fn get_allocation_pre(&mut self, attribs: SkinAttributes) -> Option<MatrixAllocation> {
        let allocation = self.allocations.get_mut(&attribs)?;
        let copy = *allocation;
        allocation.first_use_pre = false;
        Some(copy)
    }
}
