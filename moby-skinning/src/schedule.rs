//! Matrix transfer scheduling
//!
//! Every joint a packet references has to be transferred into VU0 before a
//! record loads it. A transfer can run:
//! - before the packet's loop (preloop), which costs time,
//! - piggybacked on one of the previous packet's trailing regular records,
//!   as long as nothing from that record onward still loads the address,
//! - piggybacked on one of this packet's two-way blend records, as long as
//!   no two-way blend loads the joint.

use std::collections::BTreeSet;

use crate::allocator::Vu0MatrixAllocator;
use crate::error::Result;
use crate::liveness::MatrixLivenessInfo;
use crate::record::{MatrixTransfer, PacketRecords, VU0_SLOT_COUNT, VertexRecord};
use crate::vertex::Vertex;

/// Where each of a packet's transfers has been placed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixTransferSchedule {
    /// Run before the packet's first record.
    pub preloop_transfers: Vec<MatrixTransfer>,
    /// `last_packet_transfers[i]` rides on the previous packet's record
    /// `len - 1 - i`.
    pub last_packet_transfers: Vec<MatrixTransfer>,
    /// `two_way_transfers[i]` rides on this packet's record `i`.
    pub two_way_transfers: Vec<MatrixTransfer>,
}

/// True if any record from `begin` onward loads `address`.
fn loaded_from(records: &[VertexRecord], begin: usize, address: u8) -> bool {
    records[begin..]
        .iter()
        .any(|record| record.regular().load_addr == address)
}

/// Allocate VU0 slots for a packet and decide where its transfers go.
///
/// Must be called after [`Vu0MatrixAllocator::new_packet`] and before the
/// packet's records are packed, since it also warms the allocator's blend
/// state.
pub fn schedule_matrix_transfers(
    packet_index: usize,
    vertices: &[Vertex],
    previous: Option<&PacketRecords>,
    allocator: &mut Vu0MatrixAllocator,
    liveness: &[MatrixLivenessInfo],
) -> Result<MatrixTransferSchedule> {
    let current_packet = packet_index as i32;

    // Addresses the previous packet's regular records load while we may be
    // transferring into VU0 on its behalf.
    let mut slots_in_use = [false; VU0_SLOT_COUNT];
    if let Some(previous) = previous {
        for record in previous.regular_records() {
            slots_in_use[record.regular().load_addr as usize / 4] = true;
        }
    }

    let mut used_joints = BTreeSet::new();
    let mut used_by_two_way_blends = BTreeSet::new();
    for vertex in vertices {
        for &joint in vertex.skin.used_joints() {
            let joint = joint as u8;
            if vertex.skin.count == 2 {
                used_by_two_way_blends.insert(joint);
            }
            used_joints.insert(joint);
        }
    }
    let (other_joints, two_way_joints): (Vec<u8>, Vec<u8>) = used_joints
        .iter()
        .copied()
        .partition(|joint| used_by_two_way_blends.contains(joint));

    let mut conflicting = Vec::new();
    let mut independent = Vec::new();
    for &joint in &other_joints {
        if let Some(address) = allocator.allocate_transferred(joint) {
            let transfer = MatrixTransfer::new(joint, address);
            if slots_in_use[address as usize / 4] {
                conflicting.push(transfer);
            } else {
                independent.push(transfer);
            }
        }
    }

    // Conflicting transfers first, so they get the latest records.
    conflicting.reverse();
    let mut matrix_transfers = conflicting;
    matrix_transfers.extend(independent);

    let allocated_two_way_transfers: Vec<MatrixTransfer> = two_way_joints
        .iter()
        .filter_map(|&joint| {
            allocator
                .allocate_transferred(joint)
                .map(|address| MatrixTransfer::new(joint, address))
        })
        .collect();

    for (vertex, info) in vertices.iter().zip(liveness) {
        if vertex.skin.is_blend() {
            allocator.allocate_blended(vertex.skin, current_packet, info.last_packet, vertices)?;
        }
    }

    // Two-way blends that will actually be issued this packet.
    let two_way_count = vertices
        .iter()
        .zip(liveness)
        .filter(|(vertex, info)| {
            vertex.skin.count == 2
                && (info.population_count == 1
                    || allocator
                        .get_allocation_pre(vertex.skin)
                        .is_none_or(|allocation| allocation.first_use_pre))
        })
        .count();

    let mut schedule = MatrixTransferSchedule::default();

    match previous {
        Some(previous) => {
            let records = &previous.records;
            let regular_begin = previous.regular_begin() as i64;
            let mut insert_index = records.len() as i64 - 1;
            for transfer in matrix_transfers {
                if insert_index >= regular_begin
                    && !loaded_from(records, insert_index as usize, transfer.dest_addr)
                {
                    schedule.last_packet_transfers.push(transfer);
                    insert_index -= 1;
                } else {
                    schedule.preloop_transfers.push(transfer);
                }
            }
        }
        None => schedule.preloop_transfers.extend(matrix_transfers),
    }

    for (i, transfer) in allocated_two_way_transfers.into_iter().enumerate() {
        if i < two_way_count {
            schedule.two_way_transfers.push(transfer);
            continue;
        }
        let last_packet_has_space = previous
            .is_some_and(|previous| schedule.last_packet_transfers.len() < previous.main_count);
        if last_packet_has_space && !slots_in_use[transfer.dest_addr as usize / 4] {
            schedule.last_packet_transfers.push(transfer);
        } else {
            schedule.preloop_transfers.push(transfer);
        }
    }

    tracing::trace!(
        packet = packet_index,
        preloop = schedule.preloop_transfers.len(),
        last_packet = schedule.last_packet_transfers.len(),
        two_way = schedule.two_way_transfers.len(),
        "scheduled matrix transfers"
    );

    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use bytemuck::Zeroable;
    use glam::Vec3;

    use super::*;
    use crate::attributes::SkinAttributes;
    use crate::liveness::compute_matrix_liveness;
    use crate::record::RegularLoad;

    fn packet(skins: &[SkinAttributes]) -> Vec<Vertex> {
        skins
            .iter()
            .map(|&skin| Vertex::new(Vec3::ZERO, Vec3::Z, skin))
            .collect()
    }

    fn regular_packet(loads: &[u8]) -> PacketRecords {
        let records = loads
            .iter()
            .map(|&load_addr| {
                let mut record = VertexRecord::zeroed();
                record.set_regular(&RegularLoad {
                    load_addr,
                    transfer_store_addr: 0xf4,
                });
                record
            })
            .collect::<Vec<_>>();
        PacketRecords {
            main_count: records.len(),
            records,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_packet_uses_preloop_and_two_way() {
        let packets = vec![packet(&[
            SkinAttributes::two_way([1, 2], [100, 155]),
            SkinAttributes::single(3),
            SkinAttributes::single(4),
        ])];
        let liveness = compute_matrix_liveness(&packets);
        let mut allocator = Vu0MatrixAllocator::new(4).unwrap();
        allocator.new_packet();

        let schedule =
            schedule_matrix_transfers(0, &packets[0], None, &mut allocator, &liveness[0]).unwrap();

        // Joints 1 and 2 are loaded by the two-way blend so they can't ride on it.
        assert_eq!(
            schedule.preloop_transfers,
            vec![
                MatrixTransfer::new(1, 0x0),
                MatrixTransfer::new(2, 0x4),
                MatrixTransfer::new(4, 0xc),
            ]
        );
        assert_eq!(schedule.two_way_transfers, vec![MatrixTransfer::new(3, 0x8)]);
        assert!(schedule.last_packet_transfers.is_empty());
    }

    #[test]
    fn test_transfers_ride_on_previous_packet() {
        let mut allocator = Vu0MatrixAllocator::new(4).unwrap();
        allocator.new_packet();
        for joint in 0..3 {
            allocator.allocate_transferred(joint);
        }
        let previous = regular_packet(&[0x4, 0x8, 0x0]);

        allocator.new_packet();
        let packets = vec![packet(&[SkinAttributes::two_way([5, 6], [128, 127])])];
        let liveness = compute_matrix_liveness(&packets);
        let schedule =
            schedule_matrix_transfers(1, &packets[0], Some(&previous), &mut allocator, &liveness[0])
                .unwrap();

        // Joint 6 wraps around to 0x0, which the last record still loads.
        // Both joints feed the two-way blend so neither can ride on it.
        assert_eq!(schedule.preloop_transfers, vec![MatrixTransfer::new(6, 0x0)]);
        assert_eq!(
            schedule.last_packet_transfers,
            vec![MatrixTransfer::new(5, 0xc)]
        );
        assert!(schedule.two_way_transfers.is_empty());
    }

    #[test]
    fn test_two_way_overflow_goes_to_previous_packet() {
        let mut allocator = Vu0MatrixAllocator::new(4).unwrap();
        allocator.new_packet();
        let previous = regular_packet(&[0xc, 0xc]);

        allocator.new_packet();
        let packets = vec![packet(&[
            SkinAttributes::single(7),
            SkinAttributes::single(8),
            SkinAttributes::single(9),
        ])];
        let liveness = compute_matrix_liveness(&packets);
        let schedule =
            schedule_matrix_transfers(1, &packets[0], Some(&previous), &mut allocator, &liveness[0])
                .unwrap();

        // No two-way blends: every joint is eligible but nothing can carry it.
        assert!(schedule.two_way_transfers.is_empty());
        assert_eq!(
            schedule.last_packet_transfers,
            vec![MatrixTransfer::new(7, 0x0), MatrixTransfer::new(8, 0x4)]
        );
        assert_eq!(schedule.preloop_transfers, vec![MatrixTransfer::new(9, 0x8)]);
    }

    #[test]
    fn test_resident_blend_is_not_counted_as_two_way() {
        let shared = SkinAttributes::two_way([0, 1], [128, 127]);
        let packets = vec![
            packet(&[shared, shared, SkinAttributes::single(2)]),
            packet(&[shared, SkinAttributes::single(2)]),
        ];
        let liveness = compute_matrix_liveness(&packets);
        let mut allocator = Vu0MatrixAllocator::new(3).unwrap();

        allocator.new_packet();
        let schedule =
            schedule_matrix_transfers(0, &packets[0], None, &mut allocator, &liveness[0]).unwrap();
        // Only the first of the two identical blends is issued.
        assert_eq!(schedule.two_way_transfers, vec![MatrixTransfer::new(2, 0x8)]);

        allocator.new_packet();
        let previous = regular_packet(&[0x8, 0x0c]);
        let schedule =
            schedule_matrix_transfers(1, &packets[1], Some(&previous), &mut allocator, &liveness[1])
                .unwrap();
        assert!(schedule.two_way_transfers.is_empty());
        assert_eq!(allocator.blend_allocations_this_packet(), 0);
    }
}
