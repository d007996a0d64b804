//! The shared vertex/index accumulation buffer.

use crate::types::{PrimitiveTopology, Vertex};

/// Quads held by one batch.
pub const BATCH_QUADS: usize = 2048;

/// Vertex capacity of the batch buffer.
pub const BATCH_VERTICES: usize = 4 * BATCH_QUADS;

/// Index capacity of the batch buffer.
pub const BATCH_INDICES: usize = 6 * BATCH_QUADS;

/// Index pattern of one quad whose vertices are ordered
/// bottom-left, top-left, bottom-right, top-right.
const QUAD_PATTERN: [u16; 6] = [0, 1, 2, 3, 2, 1];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Indices {
    /// The precomputed quad pattern.
    Quads,
    /// Caller-supplied indices.
    Custom,
    /// Plain vertex array.
    None,
}

/// Fixed-capacity vertex buffer plus its index source.
#[derive(Clone, Debug)]
pub(crate) struct Batch {
    vertices: Vec<Vertex>,
    quad_indices: Vec<u16>,
    custom_indices: Vec<u16>,
    indices: Indices,
    topology: PrimitiveTopology,
    element_count: usize,
    used_units: u32,
}

impl Batch {
    pub(crate) fn new() -> Self {
        let quad_indices = (0..BATCH_QUADS)
            .flat_map(|quad| {
                let base = u16::try_from(quad * 4).unwrap_or(u16::MAX);
                QUAD_PATTERN.map(|i| base + i)
            })
            .collect();

        Self {
            vertices: Vec::with_capacity(BATCH_VERTICES),
            quad_indices,
            custom_indices: Vec::new(),
            indices: Indices::Quads,
            topology: PrimitiveTopology::Triangles,
            element_count: 0,
            used_units: 0,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Whether `count` more vertices fit without a flush.
    pub(crate) fn has_room(&self, count: usize) -> bool {
        self.vertices.len() + count <= BATCH_VERTICES
    }

    /// Texture units referenced by queued geometry, as a bit mask.
    pub(crate) fn used_units(&self) -> u32 {
        self.used_units
    }

    pub(crate) fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub(crate) fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    pub(crate) fn indices(&self) -> Option<&[u16]> {
        match self.indices {
            Indices::Quads => Some(&self.quad_indices[..self.element_count]),
            Indices::Custom => Some(&self.custom_indices),
            Indices::None => None,
        }
    }

    /// Elements to draw: indices when indexed, vertices otherwise.
    pub(crate) fn element_count(&self) -> usize {
        self.element_count
    }

    /// Append one quad sampling `unit`. The caller checks
    /// [`has_room`](Self::has_room) first.
    pub(crate) fn push_quad(&mut self, quad: [Vertex; 4], unit: u32) {
        debug_assert!(self.has_room(4), "batch overflow");
        debug_assert_eq!(self.indices, Indices::Quads);
        self.vertices.extend_from_slice(&quad);
        self.element_count += 6;
        self.used_units |= 1 << unit;
    }

    /// Replace the contents with caller-built geometry drawn as-is.
    pub(crate) fn load_direct(
        &mut self,
        vertices: impl IntoIterator<Item = Vertex>,
        indices: Option<&[u16]>,
        topology: PrimitiveTopology,
        units: u32,
    ) {
        self.vertices.clear();
        self.vertices.extend(vertices);
        self.topology = topology;
        self.used_units = units;
        self.custom_indices.clear();
        if let Some(indices) = indices {
            self.custom_indices.extend_from_slice(indices);
            self.indices = Indices::Custom;
            self.element_count = indices.len();
        } else {
            self.indices = Indices::None;
            self.element_count = self.vertices.len();
        }
    }

    /// Return to indexed quads after direct drawing.
    pub(crate) fn restore_quads(&mut self) {
        self.reset();
        self.custom_indices.clear();
        self.indices = Indices::Quads;
        self.topology = PrimitiveTopology::Triangles;
    }

    /// Drop queued geometry, keeping the index source.
    pub(crate) fn reset(&mut self) {
        self.vertices.clear();
        self.element_count = 0;
        self.used_units = 0;
    }
}
