//! Error type shared by every display operation.

use crate::device::ShaderStage;

/// Errors reported by the display backend.
///
/// Decode and I/O failures are mostly absorbed by the loaders (the bitmap
/// degrades to a 1×1 placeholder) and only surface here when the caller asked
/// for something that could not even be started.
#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    /// The resource locator could not resolve a name.
    #[error("resource `{0}` not found")]
    ResourceNotFound(String),

    /// Reading a located resource failed.
    #[error("failed to read `{location}`: {source}")]
    Io {
        /// Location that failed to read.
        location: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Image bytes could not be decoded.
    #[error("image decode failed: {0}")]
    ImageDecode(String),

    /// Font bytes could not be parsed.
    #[error("font decode failed: {0}")]
    FontDecode(String),

    /// A `.ktx` container had a malformed or unsupported header.
    #[error("invalid KTX container: {0}")]
    InvalidKtx(String),

    /// A shader stage failed to compile.
    #[error("{stage:?} shader compile error: {log}")]
    ShaderCompile {
        /// Stage that failed.
        stage: ShaderStage,
        /// Compiler diagnostic text.
        log: String,
    },

    /// A shader program failed to link.
    #[error("shader link error: {0}")]
    ShaderLink(String),

    /// Every texture unit is already taken.
    #[error("no free texture unit left")]
    TextureUnitsExhausted,

    /// The graphics device rejected an operation.
    #[error("graphics device error: {0}")]
    Device(String),

    /// Neither the requested video mode nor the fallback mode could be set.
    #[error("video mode {width}x{height} could not be set: {reason}")]
    VideoMode {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Platform diagnostic.
        reason: String,
    },

    /// The operation is not available on this platform.
    #[error("{0} is not available on this platform")]
    Unsupported(&'static str),

    /// A mesh does not fit into the vertex buffer.
    #[error("mesh has {vertices} vertices, the buffer holds {capacity}")]
    MeshTooLarge {
        /// Vertices in the mesh.
        vertices: usize,
        /// Vertex buffer capacity.
        capacity: usize,
    },

    /// A bitmap or shader handle no longer refers to a live object.
    #[error("stale or invalid handle")]
    InvalidHandle,

    /// Bitmap data does not match the bitmap dimensions.
    #[error("expected {expected} bytes of pixel data, got {actual}")]
    DataSize {
        /// Expected byte count.
        expected: usize,
        /// Provided byte count.
        actual: usize,
    },

    /// The screen bitmap was used where only a texture-backed bitmap fits.
    #[error("the screen bitmap cannot be used as a draw source")]
    ScreenSource,

    /// A parameter id was used with the wrong kind of setter, or belongs to
    /// another shader.
    #[error("invalid shader parameter")]
    InvalidParameter,

    /// The shader is not in the active stack.
    #[error("shader is not active")]
    ShaderNotActive,

    /// Pixel data could not be encoded for saving.
    #[error("image encode failed: {0}")]
    ImageEncode(String),

    /// The display was shut down.
    #[error("display is shut down")]
    NotReady,

    /// The destination bitmaps do not share the same dimensions.
    #[error("destination bitmaps must share the same size and fit the draw buffers")]
    DestinationMismatch,
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = DisplayError> = std::result::Result<T, E>;
