//! Skin decoder
//!
//! Replays the transfer/blend micro-operations of a packet's records against
//! a simulated VU0 matrix cache to recover which joints and weights each
//! vertex is skinned with. One cache is shared by every packet of a mesh
//! class since matrices stay resident from packet to packet.

use crate::attributes::SkinAttributes;
use crate::config::SkinningConfig;
use crate::error::{Result, SkinningError};
use crate::packing::unpack_common_attributes;
use crate::record::{MatrixTransfer, PacketRecords, VU0_SLOT_COUNT, VertexRecord};
use crate::vertex::{Packet, Vertex};


/// Simulated VU0 matrix memory, indexed by `address / 4`.
pub type BlendCache = [Option<SkinAttributes>; VU0_SLOT_COUNT];

/// An empty cache.
pub fn new_blend_cache() -> BlendCache {
    [None; VU0_SLOT_COUNT]
}

fn slot(address: u8) -> Result<usize> {
    if address % 4 != 0 {
        return Err(SkinningError::UnalignedAddress(address));
    }
    Ok(address as usize / 4)
}

fn load(cache: &BlendCache, address: u8) -> Result<SkinAttributes> {
    cache[slot(address)?].ok_or(SkinningError::UninitialisedLoad(address))
}

fn store(cache: &mut BlendCache, address: u8, attribs: SkinAttributes) -> Result<()> {
    cache[slot(address)?] = Some(attribs);
    Ok(())
}

/// Load the operands of an n-way blend, none of which may be a blend itself.
fn load_operands<const N: usize>(
    cache: &BlendCache,
    addresses: [u8; N],
) -> Result<[SkinAttributes; N]> {
    let mut operands = [SkinAttributes::default(); N];
    for (operand, address) in operands.iter_mut().zip(addresses) {
        *operand = load(cache, address)?;
        if operand.is_blend() {
            return Err(SkinningError::BlendOfBlend(N as u8));
        }
    }
    Ok(operands)
}

/// Run the transfers that precede a packet's loop.
///
/// Meshes without animation use the bind pose in place of joint 0.
pub fn prepare_skin_matrices(
    preloop_transfers: &[MatrixTransfer],
    cache: &mut BlendCache,
    animated: bool,
) -> Result<()> {
    for transfer in preloop_transfers {
        let attribs = if !animated && transfer.joint == 0 {
            SkinAttributes::identity()
        } else {
            SkinAttributes::single(transfer.joint as i8)
        };
        store(cache, transfer.dest_addr, attribs)?;
        tracing::trace!(joint = transfer.joint, address = transfer.dest_addr, "preloop upload");
    }
    Ok(())
}

/// Execute record `index` of a packet and return the matrix it ends up with.
///
/// The record's kind comes from its position alone: the first
/// `two_way_count` records blend two matrices, the next `three_way_count`
/// blend three, the rest load one.
pub fn read_skin_attributes(
    cache: &mut BlendCache,
    record: &VertexRecord,
    index: usize,
    two_way_count: usize,
    three_way_count: usize,
) -> Result<SkinAttributes> {
    if index < two_way_count {
        let blend = record.two_way();
        let transfer_addr = blend.transfer_store_addr;
        store(cache, transfer_addr, SkinAttributes::single(record.transferred_joint()))?;
        if blend.load_addr_1 == transfer_addr || blend.load_addr_2 == transfer_addr {
            return Err(SkinningError::SelfReferencingLoad(transfer_addr));
        }

        let [src_1, src_2] = load_operands(cache, [blend.load_addr_1, blend.load_addr_2])?;
        let attribs = SkinAttributes::two_way(
            [src_1.joints[0], src_2.joints[0]],
            [blend.weight_1, blend.weight_2],
        );
        store(cache, blend.blend_store_addr, attribs)?;
        tracing::trace!(
            transfer_addr,
            load_1 = blend.load_addr_1,
            load_2 = blend.load_addr_2,
            blend_addr = blend.blend_store_addr,
            "two-way blend"
        );
        Ok(attribs)
    } else if index < two_way_count + three_way_count {
        let blend = record.three_way();
        let [src_1, src_2, src_3] = load_operands(
            cache,
            [blend.load_addr_1, blend.load_addr_2, blend.load_addr_3],
        )?;
        let attribs = SkinAttributes::three_way(
            [src_1.joints[0], src_2.joints[0], src_3.joints[0]],
            blend.weights,
        );
        store(cache, blend.blend_store_addr, attribs)?;
        tracing::trace!(
            load_1 = blend.load_addr_1,
            load_2 = blend.load_addr_2,
            load_3 = blend.load_addr_3,
            blend_addr = blend.blend_store_addr,
            "three-way blend"
        );
        Ok(attribs)
    } else {
        // The store happens before the load.
        let regular = record.regular();
        let transfer_addr = regular.transfer_store_addr;
        store(cache, transfer_addr, SkinAttributes::single(record.transferred_joint()))?;
        if regular.load_addr == transfer_addr {
            return Err(SkinningError::SelfReferencingLoad(transfer_addr));
        }
        let attribs = load(cache, regular.load_addr)?;
        tracing::trace!(transfer_addr, load = regular.load_addr, "regular load");
        Ok(attribs)
    }
}

/// Decode one packet's records into logical vertices.
///
/// The preloop transfers must already have been applied with
/// [`prepare_skin_matrices`].
pub fn unpack_vertices(
    packet: &PacketRecords,
    cache: &mut BlendCache,
    scale: f32,
) -> Result<Packet> {
    packet
        .records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let skin = read_skin_attributes(
                cache,
                record,
                index,
                packet.two_way_blend_count,
                packet.three_way_blend_count,
            )?;
            let (position, normal) = unpack_common_attributes(record, scale);
            Ok(Vertex::new(position, normal, skin).with_vertex_index(record.vertex_index()))
        })
        .collect()
}

/// Decode every packet of a mesh class in order.
pub fn decode_packets(packets: &[PacketRecords], config: &SkinningConfig) -> Result<Vec<Packet>> {
    let mut cache = new_blend_cache();
    packets
        .iter()
        .enumerate()
        .map(|(packet_index, packet)| {
            tracing::debug!(
                packet = packet_index,
                records = packet.records.len(),
                "decoding packet"
            );
            prepare_skin_matrices(&packet.preloop_transfers, &mut cache, config.animated)?;
            unpack_vertices(packet, &mut cache, config.scale)
        })
        .collect()
}
