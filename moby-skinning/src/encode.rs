//! Skin encoder
//!
//! Turns packets of logical vertices into VU0 records. Per packet the records
//! are emitted as:
//! 1. two-way blends seen for the first time,
//! 2. three-way blends seen for the first time,
//! 3. single-joint vertices,
//! 4. blends that are already resident in a blend slot.
//!
//! The transfer schedule is then threaded through the records with
//! [`apply_schedule`].

use bytemuck::Zeroable;

use crate::allocator::Vu0MatrixAllocator;
use crate::attributes::SkinAttributes;
use crate::config::SkinningConfig;
use crate::error::{Result, SkinningError};
use crate::liveness::{
    MatrixLivenessInfo, compute_matrix_liveness, max_num_joints_referenced_per_packet,
};
use crate::packing::pack_common_attributes;
use crate::record::{
    DISCARD_ADDR, PacketRecords, RegularLoad, ThreeWayBlend, TwoWayBlend, VertexRecord,
};
use crate::schedule::{MatrixTransferSchedule, schedule_matrix_transfers};
use crate::vertex::{Packet, Vertex};

/// VU0 address of the transferred matrix for `joint`.
fn joint_address(allocator: &mut Vu0MatrixAllocator, joint: i8, packet: usize) -> Result<u8> {
    let attribs = SkinAttributes::single(joint);
    allocator
        .get_allocation(attribs, packet as i32)?
        .map(|allocation| allocation.address)
        .ok_or(SkinningError::MissingAllocation { attribs, packet })
}

/// Unbound joints (-1) skin to the root.
fn bind_unbound_joints(mut vertex: Vertex) -> Vertex {
    for joint in &mut vertex.skin.joints {
        if *joint == -1 {
            *joint = 0;
        }
    }
    vertex
}

/// Carried transfers only have 7 bits for the joint.
fn check_joint_range(packet_index: usize, vertices: &[Vertex]) -> Result<()> {
    for vertex in vertices {
        if let Some(&joint) = vertex.skin.used_joints().iter().find(|&&joint| joint < 0) {
            return Err(SkinningError::JointOutOfRange {
                joint,
                packet: packet_index,
            });
        }
    }
    Ok(())
}

/// Pack one packet's vertices into records.
///
/// [`schedule_matrix_transfers`] must already have run for this packet so
/// every joint and blend has its slot.
pub fn pack_vertices(
    packet_index: usize,
    vertices: &[Vertex],
    allocator: &mut Vu0MatrixAllocator,
    liveness: &[MatrixLivenessInfo],
    scale: f32,
) -> Result<PacketRecords> {
    let current_packet = packet_index as i32;

    let mut two_way = Vec::new();
    let mut three_way = Vec::new();
    let mut singles = Vec::new();
    let mut resident = Vec::new();

    for (index, (vertex, info)) in vertices.iter().zip(liveness).enumerate() {
        let mut record = VertexRecord::zeroed();
        record.set_vertex_index(vertex.vertex_index);
        pack_common_attributes(&mut record, vertex.position, vertex.normal, scale);

        let skin = vertex.skin;
        if !skin.is_blend() {
            record.set_regular(&RegularLoad {
                load_addr: joint_address(allocator, skin.joints[0], packet_index)?,
                transfer_store_addr: DISCARD_ADDR,
            });
            singles.push((index, record));
            continue;
        }

        // Only shared blends are worth keeping around. Everything else is
        // blended into the discard slot.
        let blend_store_addr = match allocator.get_allocation(skin, current_packet)? {
            Some(allocation) if info.population_count > 1 => {
                if !allocation.first_use {
                    record.set_regular(&RegularLoad {
                        load_addr: allocation.address,
                        transfer_store_addr: DISCARD_ADDR,
                    });
                    resident.push((index, record));
                    continue;
                }
                allocation.address
            }
            _ => DISCARD_ADDR,
        };

        if skin.count == 2 {
            record.set_two_way(&TwoWayBlend {
                load_addr_1: joint_address(allocator, skin.joints[0], packet_index)?,
                load_addr_2: joint_address(allocator, skin.joints[1], packet_index)?,
                weight_1: skin.weights[0],
                weight_2: skin.weights[1],
                transfer_store_addr: DISCARD_ADDR,
                blend_store_addr,
            });
            two_way.push((index, record));
        } else {
            record.set_three_way(&ThreeWayBlend {
                load_addr_1: joint_address(allocator, skin.joints[0], packet_index)?,
                load_addr_2: joint_address(allocator, skin.joints[1], packet_index)?,
                load_addr_3: joint_address(allocator, skin.joints[2], packet_index)?,
                weights: skin.weights,
                blend_store_addr,
            });
            three_way.push((index, record));
        }
    }

    let mut packet = PacketRecords {
        two_way_blend_count: two_way.len(),
        three_way_blend_count: three_way.len(),
        main_count: singles.len() + resident.len(),
        index_mapping: vec![0; vertices.len()],
        ..Default::default()
    };
    for (index, record) in two_way.into_iter().chain(three_way).chain(singles).chain(resident) {
        packet.index_mapping[index] = packet.records.len();
        packet.records.push(record);
    }

    Ok(packet)
}

/// Thread a packet's transfers through the records that carry them.
pub fn apply_schedule(
    schedule: &MatrixTransferSchedule,
    previous: Option<&mut PacketRecords>,
    current: &mut PacketRecords,
) -> Result<()> {
    if !schedule.last_packet_transfers.is_empty() {
        let transfers = schedule.last_packet_transfers.len();
        let Some(previous) = previous else {
            return Err(SkinningError::ScheduleOverflow {
                transfers,
                available: 0,
            });
        };
        let available = previous.regular_records().len();
        if transfers > available {
            return Err(SkinningError::ScheduleOverflow {
                transfers,
                available,
            });
        }
        let last = previous.records.len() - 1;
        for (i, transfer) in schedule.last_packet_transfers.iter().enumerate() {
            previous.records[last - i].attach_regular_transfer(*transfer);
        }
    }

    if schedule.two_way_transfers.len() > current.two_way_blend_count {
        return Err(SkinningError::ScheduleOverflow {
            transfers: schedule.two_way_transfers.len(),
            available: current.two_way_blend_count,
        });
    }
    for (record, transfer) in current.records.iter_mut().zip(&schedule.two_way_transfers) {
        record.attach_two_way_transfer(*transfer);
    }

    current
        .preloop_transfers
        .extend_from_slice(&schedule.preloop_transfers);
    Ok(())
}

/// Encode every packet of a mesh class.
pub fn encode_packets(packets: &[Packet], config: &SkinningConfig) -> Result<Vec<PacketRecords>> {
    let packets: Vec<Packet> = packets
        .iter()
        .map(|packet| packet.iter().copied().map(bind_unbound_joints).collect())
        .collect();
    for (packet_index, vertices) in packets.iter().enumerate() {
        check_joint_range(packet_index, vertices)?;
    }

    let max_joints = max_num_joints_referenced_per_packet(&packets);
    let liveness = compute_matrix_liveness(&packets);
    let mut allocator = Vu0MatrixAllocator::new(max_joints)?
        .with_strict_blend_allocation(config.strict_blend_allocation);

    let mut output: Vec<PacketRecords> = Vec::with_capacity(packets.len());
    for (packet_index, (vertices, liveness)) in packets.iter().zip(&liveness).enumerate() {
        allocator.new_packet();
        let schedule = schedule_matrix_transfers(
            packet_index,
            vertices,
            output.last(),
            &mut allocator,
            liveness,
        )?;
        let mut records =
            pack_vertices(packet_index, vertices, &mut allocator, liveness, config.scale)?;
        apply_schedule(&schedule, output.last_mut(), &mut records)?;

        tracing::debug!(
            packet = packet_index,
            vertices = vertices.len(),
            two_way = records.two_way_blend_count,
            three_way = records.three_way_blend_count,
            main = records.main_count,
            preloop = records.preloop_transfers.len(),
            transferred = allocator.transfer_allocations_this_packet(),
            blended = allocator.blend_allocations_this_packet(),
            "encoded packet"
        );
        output.push(records);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::decode::decode_packets;
    use crate::record::MatrixTransfer;

    fn packet(skins: &[SkinAttributes]) -> Packet {
        skins
            .iter()
            .enumerate()
            .map(|(i, &skin)| {
                Vertex::new(Vec3::new(i as f32, 0.0, 0.0), Vec3::Y, skin)
                    .with_vertex_index(i as u16)
            })
            .collect()
    }

    fn regular_records(count: usize) -> PacketRecords {
        let records = (0..count)
            .map(|i| {
                let mut record = VertexRecord::zeroed();
                record.set_regular(&RegularLoad {
                    load_addr: (i * 4) as u8,
                    transfer_store_addr: DISCARD_ADDR,
                });
                record
            })
            .collect();
        PacketRecords {
            main_count: count,
            records,
            ..Default::default()
        }
    }

    const SHARED: SkinAttributes = SkinAttributes::two_way([4, 5], [128, 127]);
    const TRIPLE: SkinAttributes = SkinAttributes::three_way([4, 5, 6], [85, 85, 85]);

    // ========================================================================
    // Packing
    // ========================================================================

    #[test]
    fn test_pack_vertices_orders_records() {
        let packets = vec![packet(&[SkinAttributes::single(4), SHARED, TRIPLE, SHARED])];
        let liveness = compute_matrix_liveness(&packets);
        let mut allocator = Vu0MatrixAllocator::new(3).unwrap();
        allocator.new_packet();
        schedule_matrix_transfers(0, &packets[0], None, &mut allocator, &liveness[0]).unwrap();

        let records = pack_vertices(0, &packets[0], &mut allocator, &liveness[0], 1.0).unwrap();
        assert_eq!(records.two_way_blend_count, 1);
        assert_eq!(records.three_way_blend_count, 1);
        assert_eq!(records.main_count, 2);
        assert_eq!(records.index_mapping, vec![2, 0, 1, 3]);

        // The shared blend is stored once, then loaded back.
        let blend = records.records[0].two_way();
        assert_eq!((blend.load_addr_1, blend.load_addr_2), (0x0, 0x4));
        assert_eq!(blend.blend_store_addr, 0xc);
        assert_eq!(records.records[3].regular().load_addr, 0xc);

        // The three-way blend is unique so its result is thrown away.
        let triple = records.records[1].three_way();
        assert_eq!(triple.load_addr_3, 0x8);
        assert_eq!(triple.blend_store_addr, DISCARD_ADDR);

        assert_eq!(records.records[2].regular().load_addr, 0x0);
        assert_eq!(records.records[2].vertex_index(), 0);
        assert_eq!(records.records[1].vertex_index(), 2);
    }

    #[test]
    fn test_pack_vertices_missing_joint() {
        let packets = vec![packet(&[SkinAttributes::single(9)])];
        let liveness = compute_matrix_liveness(&packets);
        let mut allocator = Vu0MatrixAllocator::new(1).unwrap();
        allocator.new_packet();

        let err = pack_vertices(0, &packets[0], &mut allocator, &liveness[0], 1.0).unwrap_err();
        assert_eq!(
            err,
            SkinningError::MissingAllocation {
                attribs: SkinAttributes::single(9),
                packet: 0
            }
        );
    }

    // ========================================================================
    // Schedule Application
    // ========================================================================

    #[test]
    fn test_apply_schedule_fills_records_from_the_back() {
        let mut previous = regular_records(3);
        let mut current = regular_records(1);
        let schedule = MatrixTransferSchedule {
            preloop_transfers: vec![MatrixTransfer::new(1, 0x10)],
            last_packet_transfers: vec![MatrixTransfer::new(2, 0x14), MatrixTransfer::new(3, 0x18)],
            two_way_transfers: vec![],
        };

        apply_schedule(&schedule, Some(&mut previous), &mut current).unwrap();
        assert_eq!(previous.records[2].regular().transfer_store_addr, 0x14);
        assert_eq!(previous.records[2].transferred_joint(), 2);
        assert_eq!(previous.records[1].regular().transfer_store_addr, 0x18);
        assert_eq!(previous.records[0].regular().transfer_store_addr, DISCARD_ADDR);
        assert_eq!(current.preloop_transfers, vec![MatrixTransfer::new(1, 0x10)]);
    }

    #[test]
    fn test_apply_schedule_overflow() {
        let mut current = regular_records(2);
        let schedule = MatrixTransferSchedule {
            two_way_transfers: vec![MatrixTransfer::new(1, 0x0)],
            ..Default::default()
        };
        assert_eq!(
            apply_schedule(&schedule, None, &mut current).unwrap_err(),
            SkinningError::ScheduleOverflow {
                transfers: 1,
                available: 0
            }
        );

        let schedule = MatrixTransferSchedule {
            last_packet_transfers: vec![MatrixTransfer::new(1, 0x0)],
            ..Default::default()
        };
        assert!(apply_schedule(&schedule, None, &mut current).is_err());
    }

    // ========================================================================
    // Driver
    // ========================================================================

    #[test]
    fn test_encode_packets_carries_transfer_on_two_way_record() {
        let packets = vec![packet(&[SkinAttributes::single(4), SHARED, TRIPLE, SHARED])];
        let encoded = encode_packets(&packets, &SkinningConfig::default()).unwrap();
        assert_eq!(encoded.len(), 1);

        let records = &encoded[0];
        assert_eq!(
            records.preloop_transfers,
            vec![MatrixTransfer::new(4, 0x0), MatrixTransfer::new(5, 0x4)]
        );
        assert_eq!(records.records[0].two_way().transfer_store_addr, 0x8);
        assert_eq!(records.records[0].transferred_joint(), 6);

        let decoded = decode_packets(&encoded, &SkinningConfig::default()).unwrap();
        for (i, vertex) in packets[0].iter().enumerate() {
            assert_eq!(decoded[0][records.index_mapping[i]].skin, vertex.skin);
        }
    }

    #[test]
    fn test_encode_packets_binds_unbound_joints() {
        let packets = vec![packet(&[SkinAttributes::single(-1), SkinAttributes::single(2)])];
        let encoded = encode_packets(&packets, &SkinningConfig::default()).unwrap();
        let decoded = decode_packets(&encoded, &SkinningConfig::default()).unwrap();
        assert_eq!(
            decoded[0][encoded[0].index_mapping[0]].skin,
            SkinAttributes::single(0)
        );
    }

    #[test]
    fn test_encode_packets_rejects_negative_joint() {
        let packets = vec![
            packet(&[SkinAttributes::single(1)]),
            packet(&[SkinAttributes::two_way([-2, 5], [100, 155])]),
        ];
        assert_eq!(
            encode_packets(&packets, &SkinningConfig::default()).unwrap_err(),
            SkinningError::JointOutOfRange {
                joint: -2,
                packet: 1
            }
        );
    }

    #[test]
    fn test_encode_empty_mesh() {
        assert!(encode_packets(&[], &SkinningConfig::default()).unwrap().is_empty());
    }
}
