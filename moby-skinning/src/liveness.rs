//! Cross-packet liveness of skinning matrices
//!
//! Vertices anywhere in the mesh that share an identical blend can share one
//! blend slot, kept resident until the furthest packet that still needs it.

use std::collections::BTreeSet;

use crate::vertex::{Packet, Vertex};

/// Position of a vertex inside the packet list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexLocation {
    pub packet: usize,
    pub vertex: usize,
}

impl VertexLocation {
    pub fn find_vertex_in<'a>(&self, packets: &'a [Packet]) -> &'a Vertex {
        &packets[self.packet][self.vertex]
    }
}

/// Liveness of the matrix a vertex uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixLivenessInfo {
    /// Number of vertices in the mesh with identical attributes.
    pub population_count: usize,
    /// Last packet that uses the matrix, -1 if unknown.
    pub last_packet: i32,
    /// First vertex in the mesh with identical attributes.
    pub first_vertex: VertexLocation,
}

impl Default for MatrixLivenessInfo {
    fn default() -> Self {
        Self {
            population_count: 0,
            last_packet: -1,
            first_vertex: VertexLocation::default(),
        }
    }
}

/// Group identical skin attributes across all packets.
///
/// The result has the same shape as `packets`.
pub fn compute_matrix_liveness(packets: &[Packet]) -> Vec<Vec<MatrixLivenessInfo>> {
    let mut mapping: Vec<VertexLocation> = packets
        .iter()
        .enumerate()
        .flat_map(|(packet, vertices)| {
            (0..vertices.len()).map(move |vertex| VertexLocation { packet, vertex })
        })
        .collect();

    // Stable, so each run stays in mesh order.
    mapping.sort_by_key(|location| location.find_vertex_in(packets).skin);

    let mut liveness: Vec<Vec<MatrixLivenessInfo>> = packets
        .iter()
        .map(|packet| vec![MatrixLivenessInfo::default(); packet.len()])
        .collect();

    let same_skin = |l: &VertexLocation, r: &VertexLocation| {
        l.find_vertex_in(packets).skin == r.find_vertex_in(packets).skin
    };
    for run in mapping.chunk_by(same_skin) {
        let Some(first_vertex) = run.iter().min().copied() else {
            continue;
        };
        let last_packet = run.iter().map(|location| location.packet).max().unwrap_or(0) as i32;
        let info = MatrixLivenessInfo {
            population_count: run.len(),
            last_packet,
            first_vertex,
        };
        for location in run {
            liveness[location.packet][location.vertex] = info;
        }
    }

    liveness
}

/// Width of the transferred region: the most distinct joints any single
/// packet references.
pub fn max_num_joints_referenced_per_packet(packets: &[Packet]) -> usize {
    packets
        .iter()
        .map(|packet| {
            packet
                .iter()
                .flat_map(|vertex| vertex.skin.used_joints().iter().map(|&joint| joint as u8))
                .collect::<BTreeSet<u8>>()
                .len()
        })
        .max()
        .unwrap_or(0)
}
