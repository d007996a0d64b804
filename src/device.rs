//! The capability surface the display needs from the GPU.
//!
//! [`Display`](crate::Display) never talks to OpenGL directly; every texture,
//! blend, shader and draw operation goes through [`GraphicsDevice`]. The
//! `glow` feature provides [`GlowDevice`](crate::GlowDevice).

use crate::error::Result;
use crate::types::{BlendMode, PrimitiveTopology, Rgba, Vertex};

/// Opaque GPU texture name.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Opaque compiled shader stage.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShaderStageId(pub u32);

/// Opaque linked program.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Opaque uniform location within a program.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct UniformId(pub u32);

/// Shader pipeline stage.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    /// Vertex stage.
    Vertex,
    /// Fragment stage.
    Fragment,
}

/// Pixel rectangle in device coordinates (origin bottom-left).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceRect {
    /// Left edge.
    pub x: i32,
    /// Bottom edge.
    pub y: i32,
    /// Width.
    pub width: i32,
    /// Height.
    pub height: i32,
}

/// Limits queried once at startup.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DeviceCaps {
    /// Texture units usable from a fragment shader.
    pub max_texture_units: u32,
    /// Simultaneous color attachments.
    pub max_draw_buffers: u32,
    /// Largest texture dimension.
    pub max_texture_size: u32,
    /// Non-power-of-two textures are supported.
    pub npot: bool,
}

/// Everything the display does to the GPU.
///
/// Implementations are driven from a single owning thread. Failures that the
/// display can recover from are returned as errors; everything else is
/// fire-and-forget, matching how GL reports errors lazily.
pub trait GraphicsDevice {
    /// Device limits.
    fn capabilities(&self) -> DeviceCaps;

    /// Allocate an RGBA8 texture, optionally filled from `data`
    /// (`width * height * 4` bytes, top row first).
    ///
    /// # Errors
    ///
    /// Fails when the device cannot allocate the texture.
    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        smoothing: bool,
        data: Option<&[u8]>,
    ) -> Result<TextureId>;

    /// Allocate a texture from pre-compressed data in a device-native
    /// `internal_format`.
    ///
    /// # Errors
    ///
    /// Fails when the device cannot allocate the texture or does not know the
    /// format.
    fn create_compressed_texture(
        &mut self,
        width: u32,
        height: u32,
        internal_format: u32,
        data: &[u8],
    ) -> Result<TextureId>;

    /// Overwrite an RGBA8 sub-rectangle of a texture.
    ///
    /// # Errors
    ///
    /// Fails when the texture is unknown to the device.
    fn upload_sub_texture(
        &mut self,
        texture: TextureId,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<()>;

    /// Read back a whole `width`×`height` RGBA8 texture, top row first.
    ///
    /// # Errors
    ///
    /// Fails when readback is unavailable.
    fn read_texture(&mut self, texture: TextureId, width: u32, height: u32) -> Result<Vec<u8>>;

    /// Release a texture.
    fn delete_texture(&mut self, texture: TextureId);

    /// Bind `texture` (or nothing) to a texture unit.
    fn bind_texture_unit(&mut self, unit: u32, texture: Option<TextureId>);

    /// Switch a texture between linear and nearest filtering.
    fn set_texture_smoothing(&mut self, texture: TextureId, smoothing: bool);

    /// Set the blend equation.
    fn set_blend_mode(&mut self, mode: BlendMode);

    /// Set the viewport.
    fn set_viewport(&mut self, rect: DeviceRect);

    /// Enable the scissor test with `rect`, or disable it with `None`.
    fn set_scissor(&mut self, rect: Option<DeviceRect>);

    /// Render into `targets` as color attachments `0..n`, or into the
    /// default framebuffer when `targets` is empty.
    ///
    /// # Errors
    ///
    /// Fails when the attachment set is incomplete.
    fn bind_render_targets(&mut self, targets: &[TextureId]) -> Result<()>;

    /// Copy the lower-left `width`×`height` pixels of the default
    /// framebuffer into `texture`. Rows land bottom-up.
    fn capture_screen(&mut self, texture: TextureId, width: u32, height: u32);

    /// Clear the bound render targets (honoring the scissor).
    fn clear(&mut self, color: Rgba);

    /// Compile one shader stage, returning the compiler log on failure.
    ///
    /// # Errors
    ///
    /// Returns the compiler diagnostic text.
    fn compile_shader(&mut self, stage: ShaderStage, source: &str)
        -> Result<ShaderStageId, String>;

    /// Link a program from two compiled stages. The stages are consumed
    /// whether linking succeeds or not.
    ///
    /// # Errors
    ///
    /// Returns the linker diagnostic text.
    fn link_program(
        &mut self,
        vertex: ShaderStageId,
        fragment: ShaderStageId,
    ) -> Result<ProgramId, String>;

    /// Release a compiled stage that will not be linked.
    fn delete_shader(&mut self, stage: ShaderStageId);

    /// Release a program.
    fn delete_program(&mut self, program: ProgramId);

    /// Make `program` current.
    fn use_program(&mut self, program: ProgramId);

    /// Look up a uniform by name.
    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformId>;

    /// Set an `int`/`sampler2D` uniform.
    fn set_uniform_i32(&mut self, program: ProgramId, location: UniformId, value: i32);

    /// Set a `float` uniform.
    fn set_uniform_f32(&mut self, program: ProgramId, location: UniformId, value: f32);

    /// Set a `vec3` uniform.
    fn set_uniform_vec3(&mut self, program: ProgramId, location: UniformId, value: [f32; 3]);

    /// Set a column-major `mat4` uniform.
    fn set_uniform_mat4(&mut self, program: ProgramId, location: UniformId, value: &[[f32; 4]; 4]);

    /// Upload `vertices` (and `indices` if any) and draw `count` elements
    /// with the current program.
    fn submit_draw(
        &mut self,
        topology: PrimitiveTopology,
        vertices: &[Vertex],
        indices: Option<&[u16]>,
        count: usize,
    );

    /// Present the default framebuffer.
    fn swap_buffers(&mut self);

    /// Re-establish capability state (blending on, scissor off, unit 0
    /// active) after a surface was (re)created.
    fn reset_state(&mut self);
}

/// Convert a pixel size or coordinate to the signed integers device rects
/// use, saturating far beyond any real surface size.
pub(crate) fn device_int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
