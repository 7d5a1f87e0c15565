//! Logical (editable) vertex representation

use glam::Vec3;

use crate::attributes::SkinAttributes;

/// A vertex as produced by the packet splitter and consumed by the encoder.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub skin: SkinAttributes,
    /// Index into the packet's index buffer (9 bits on disk).
    pub vertex_index: u16,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, skin: SkinAttributes) -> Self {
        Self {
            position,
            normal,
            skin,
            vertex_index: 0,
        }
    }

    pub fn with_vertex_index(mut self, vertex_index: u16) -> Self {
        self.vertex_index = vertex_index;
        self
    }
}

/// A batch of vertices skinned together.
pub type Packet = Vec<Vertex>;
