//! Batched 2D display backend for the Orx engine, rendering through OpenGL
//! via [glow].
//!
//! [`Display`] owns a [`GraphicsDevice`] and turns bitmap, text and mesh
//! draws into as few GPU submissions as possible. Textures are kept resident
//! in an LRU cache of texture units so that quads sampling different bitmaps
//! can share one draw call, and the batch is flushed only when the render
//! state actually changes.
//!
//! # Features
//!
//! - **Bitmaps**: create, load (PNG, JPEG, QOI, BMP, TGA, uncompressed and
//!   compressed KTX), save, read back and update sub-rectangles.
//! - **Asynchronous decoding**: while a placeholder is set with
//!   [`Display::set_temp_bitmap`], loads return immediately showing it and
//!   are finished by a [`TaskRunner`] off the owning thread.
//! - **Custom shaders**: fragment code with float, vector and texture
//!   parameters, stacked and removed at the next flush.
//! - **Render to texture** on up to [`MAX_DRAW_BUFFERS`] bitmaps at once.
//! - **Fonts** rasterized from TrueType data into character maps.
//!
//! # Safety
//!
//! The `glow` feature provides [`GlowDevice`]. Creating it requires a current
//! OpenGL context, and that context must stay current on the owning thread.
//!
//! [glow]: https://docs.rs/glow

mod batch;
mod bitmap;
mod config;
mod decode;
mod device;
mod display;
mod draw;
mod error;
mod events;
mod font;
#[cfg(feature = "glow")]
mod glow_device;
mod ktx;
mod program;
mod resource;
mod shaders;
mod state;
mod task;
#[cfg(test)]
mod testing;
mod types;
mod video;

pub use batch::BATCH_QUADS;
pub use bitmap::{BitmapFlags, BitmapHandle, BITMAP_DEPTH, BORDER_FIX};
pub use config::{ConfigStore, DisplayConfig, MapConfig, DISPLAY_SECTION};
pub use decode::{DecodeJob, DecodeOutput};
pub use device::{
    DeviceCaps, DeviceRect, GraphicsDevice, ProgramId, ShaderStage, ShaderStageId, TextureId,
    UniformId,
};
pub use display::{Collaborators, Display};
pub use draw::{OBox, CIRCLE_SEGMENTS};
pub use error::{DisplayError, Result};
pub use events::{
    location_id, DisplayEvent, EventBus, EventKind, LifecycleEvent, QueuedEventBus, SurfaceEvent,
};
pub use font::FontRequest;
#[cfg(feature = "glow")]
pub use glow_device::GlowDevice;
pub use ktx::{KtxHeader, KtxImage};
pub use program::{ParamId, ParamKind, ShaderHandle, ShaderParam};
pub use resource::{DirectoryLocator, MemoryLocator, ResourceLocator, FONT_GROUP, TEXTURE_GROUP};
pub use shaders::{
    ATTRIBUTE_COLOR, ATTRIBUTE_POSITION, ATTRIBUTE_TEX_COORD, ATTRIBUTE_UNIT, EDGE_SUFFIXES,
    UNIFORM_PROJECTION, UNIFORM_TEXTURE,
};
pub use state::{MAX_DRAW_BUFFERS, MAX_TEXTURE_UNITS};
pub use task::{InlineRunner, TaskRunner, ThreadPoolRunner};
pub use types::{
    Affine, BlendMode, BufferMode, CharacterMap, ClipRect, DisplayTransform, Glyph, MeshVertex,
    PrimitiveTopology, Rgba, Smoothing, Vertex,
};
pub use video::{Scheduler, VideoMode, WindowSurface, POLL_INPUT_CLOCK, POLL_INPUT_PERIOD};
