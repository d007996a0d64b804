//! Cached GPU state: texture-unit residency, blend/buffer modes, viewport,
//! scissor and projection.

use crate::bitmap::BitmapHandle;
use crate::device::{DeviceRect, ProgramId, TextureId};
use crate::types::{BlendMode, BufferMode};

/// Upper bound on texture units used by the batcher.
pub const MAX_TEXTURE_UNITS: u32 = 8;

/// Upper bound on simultaneous render targets.
pub const MAX_DRAW_BUFFERS: u32 = 8;

#[derive(Copy, Clone, Debug, Default)]
struct UnitSlot {
    bitmap: Option<BitmapHandle>,
    texture: Option<TextureId>,
    last_use: u64,
}

/// Result of a residency request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Residency {
    /// Already bound; nothing to send to the device.
    Resident(u32),
    /// Newly placed in a unit; the device must bind it.
    Bound(u32),
}

impl Residency {
    pub(crate) fn unit(self) -> u32 {
        match self {
            Self::Resident(unit) | Self::Bound(unit) => unit,
        }
    }
}

/// LRU assignment of bitmaps to a bounded set of texture units.
#[derive(Clone, Debug)]
pub(crate) struct TextureUnits {
    slots: Vec<UnitSlot>,
    clock: u64,
    requests: u64,
}

impl TextureUnits {
    pub(crate) fn new(count: u32) -> Self {
        Self {
            slots: vec![UnitSlot::default(); count.clamp(1, MAX_TEXTURE_UNITS) as usize],
            clock: 0,
            requests: 0,
        }
    }

    pub(crate) fn count(&self) -> u32 {
        u32::try_from(self.slots.len()).unwrap_or(MAX_TEXTURE_UNITS)
    }

    /// Total residency requests seen so far.
    pub(crate) fn requests(&self) -> u64 {
        self.requests
    }

    /// Unit currently holding `bitmap`.
    pub(crate) fn find(&self, bitmap: BitmapHandle) -> Option<u32> {
        self.slots
            .iter()
            .position(|slot| slot.bitmap == Some(bitmap))
            .and_then(|unit| u32::try_from(unit).ok())
    }

    /// Bitmap bound to `unit`.
    pub(crate) fn occupant(&self, unit: u32) -> Option<BitmapHandle> {
        self.slots.get(unit as usize).and_then(|slot| slot.bitmap)
    }

    /// Make `bitmap` resident. A resident bitmap keeps its unit and is
    /// touched; otherwise an empty unit is preferred, then the least recently
    /// used one. Units set in the `pinned` mask are never evicted; `None`
    /// means every candidate is pinned.
    pub(crate) fn bind(
        &mut self,
        bitmap: BitmapHandle,
        texture: TextureId,
        pinned: u32,
    ) -> Option<Residency> {
        self.requests += 1;
        self.clock += 1;

        if let Some(unit) = self.find(bitmap) {
            let slot = &mut self.slots[unit as usize];
            if slot.texture == Some(texture) {
                slot.last_use = self.clock;
                return Some(Residency::Resident(unit));
            }
            slot.texture = Some(texture);
            slot.last_use = self.clock;
            return Some(Residency::Bound(unit));
        }

        let is_free = |unit: usize| pinned & (1 << unit) == 0;
        let victim = self
            .slots
            .iter()
            .enumerate()
            .filter(|&(unit, _)| is_free(unit))
            .min_by_key(|(_, slot)| (slot.bitmap.is_some(), slot.last_use))
            .map(|(unit, _)| unit)?;

        self.slots[victim] = UnitSlot {
            bitmap: Some(bitmap),
            texture: Some(texture),
            last_use: self.clock,
        };
        u32::try_from(victim).ok().map(Residency::Bound)
    }

    /// Record that `unit` was bound outside the LRU policy.
    pub(crate) fn assign(&mut self, unit: u32, bitmap: BitmapHandle, texture: TextureId) {
        self.clock += 1;
        if let Some(slot) = self.slots.get_mut(unit as usize) {
            *slot = UnitSlot {
                bitmap: Some(bitmap),
                texture: Some(texture),
                last_use: self.clock,
            };
        }
    }

    /// Forget `bitmap` wherever it is bound.
    pub(crate) fn purge(&mut self, bitmap: BitmapHandle) {
        for slot in &mut self.slots {
            if slot.bitmap == Some(bitmap) {
                *slot = UnitSlot::default();
            }
        }
    }

    /// Forget every binding.
    pub(crate) fn clear(&mut self) {
        self.slots.fill(UnitSlot::default());
    }
}

/// Key of the cached projection: destination size and orientation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) struct ProjectionKey {
    pub(crate) width: f32,
    pub(crate) height: f32,
    pub(crate) screen: bool,
}

/// Everything the display remembers about device state to skip redundant
/// calls.
#[derive(Clone, Debug)]
pub(crate) struct RenderState {
    pub(crate) units: TextureUnits,
    pub(crate) blend: Option<BlendMode>,
    pub(crate) buffer_mode: BufferMode,
    pub(crate) viewport: Option<DeviceRect>,
    pub(crate) scissor: Option<Option<DeviceRect>>,
    pub(crate) projection_key: Option<ProjectionKey>,
    pub(crate) projection: [[f32; 4]; 4],
    /// Bumped whenever `projection` changes; shaders compare it with the
    /// generation they last received.
    pub(crate) projection_generation: u64,
    pub(crate) program: Option<ProgramId>,
    pub(crate) last_bitmap: Option<BitmapHandle>,
}

impl RenderState {
    pub(crate) fn new(texture_units: u32) -> Self {
        Self {
            units: TextureUnits::new(texture_units),
            blend: None,
            buffer_mode: BufferMode::Indirect,
            viewport: None,
            scissor: None,
            projection_key: None,
            projection: ortho(0.0, 1.0, 1.0, 0.0, -1.0, 1.0),
            projection_generation: 0,
            program: None,
            last_bitmap: None,
        }
    }

    /// Switch to the projection of `key`. Returns whether it changed.
    pub(crate) fn set_projection(&mut self, key: ProjectionKey) -> bool {
        if self.projection_key == Some(key) {
            return false;
        }
        self.projection_key = Some(key);
        self.projection = destination_projection(key);
        self.projection_generation += 1;
        true
    }

    /// Forget everything so the next use re-issues every state call.
    pub(crate) fn invalidate(&mut self) {
        self.units.clear();
        self.blend = None;
        self.viewport = None;
        self.scissor = None;
        self.projection_key = None;
        self.program = None;
        self.last_bitmap = None;
    }
}

/// Column-major orthographic projection.
pub(crate) fn ortho(
    left: f32,
    right: f32,
    bottom: f32,
    top: f32,
    near: f32,
    far: f32,
) -> [[f32; 4]; 4] {
    let dx = right - left;
    let dy = top - bottom;
    let dz = far - near;

    let mut m = [[0.0; 4]; 4];
    m[0][0] = 2.0 / dx;
    m[1][1] = 2.0 / dy;
    m[2][2] = -2.0 / dz;
    m[3][0] = -(right + left) / dx;
    m[3][1] = -(top + bottom) / dy;
    m[3][2] = -(far + near) / dz;
    m[3][3] = 1.0;
    m
}

/// Projection for a destination: top-down for the screen, bottom-up for
/// offscreen bitmaps so their rows match texture sampling.
pub(crate) fn destination_projection(key: ProjectionKey) -> [[f32; 4]; 4] {
    if key.screen {
        ortho(0.0, key.width, key.height, 0.0, -1.0, 1.0)
    } else {
        ortho(0.0, key.width, 0.0, key.height, -1.0, 1.0)
    }
}
