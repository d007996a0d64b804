//! [`GraphicsDevice`] over an OpenGL (ES) context through `glow`.

use glow::{HasContext, PixelPackData, PixelUnpackData};
use std::collections::HashMap;
use std::sync::Arc;

use crate::device::{
    DeviceCaps, DeviceRect, GraphicsDevice, ProgramId, ShaderStage, ShaderStageId, TextureId,
    UniformId,
};
use crate::error::{DisplayError, Result};
use crate::shaders::{ATTRIBUTE_COLOR, ATTRIBUTE_POSITION, ATTRIBUTE_TEX_COORD, ATTRIBUTE_UNIT};
use crate::types::{BlendMode, PrimitiveTopology, Rgba, Vertex};

/// GL internal format for RGBA8 textures, pre-cast to the `i32` that
/// `tex_image_2d` expects.
#[expect(clippy::cast_possible_wrap)]
const RGBA8_INTERNAL_FORMAT: i32 = glow::RGBA8 as i32;

/// Attribute locations bound before linking, in [`Vertex`] field order.
const ATTRIBUTES: [&str; 4] = [
    ATTRIBUTE_POSITION,
    ATTRIBUTE_TEX_COORD,
    ATTRIBUTE_COLOR,
    ATTRIBUTE_UNIT,
];

/// Convert a `u32` to `i32` for GL API calls, saturating.
fn gl_size(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn gl_count(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// GL enum for a filter mode, as the `i32` `tex_parameter_i32` expects.
#[expect(clippy::cast_possible_wrap)]
fn filter(smoothing: bool) -> i32 {
    if smoothing {
        glow::LINEAR as i32
    } else {
        glow::NEAREST as i32
    }
}

fn gl_topology(topology: PrimitiveTopology) -> u32 {
    match topology {
        PrimitiveTopology::Triangles => glow::TRIANGLES,
        PrimitiveTopology::TriangleStrip => glow::TRIANGLE_STRIP,
        PrimitiveTopology::TriangleFan => glow::TRIANGLE_FAN,
        PrimitiveTopology::Lines => glow::LINES,
        PrimitiveTopology::LineStrip => glow::LINE_STRIP,
        PrimitiveTopology::LineLoop => glow::LINE_LOOP,
    }
}

/// A live texture and its dimensions.
struct GlTexture {
    texture: glow::Texture,
    width: u32,
    height: u32,
}

/// A linked program and the uniforms looked up in it so far.
struct GlProgram {
    program: glow::Program,
    locations: Vec<glow::UniformLocation>,
    names: HashMap<String, UniformId>,
}

/// Renders through a shared `glow` context.
///
/// Every GPU object is created lazily and referenced by the opaque ids of
/// [`crate::device`]; the device keeps the mapping to GL names. One vertex
/// array, vertex buffer and index buffer are reused for every draw, and a
/// private framebuffer serves render-to-texture and readback.
///
/// # Example
///
/// ```no_run
/// # use orx_display::GlowDevice;
/// # use std::sync::Arc;
/// # fn example(gl: Arc<glow::Context>) {
/// // With the window's GL context current:
/// let mut device = unsafe { GlowDevice::new(gl) }.unwrap();
/// // ... hand `device` to the display, then on shutdown:
/// unsafe { device.destroy() };
/// # }
/// ```
pub struct GlowDevice {
    gl: Arc<glow::Context>,
    vao: glow::VertexArray,
    vbo: glow::Buffer,
    ebo: glow::Buffer,
    fbo: glow::Framebuffer,
    caps: DeviceCaps,
    next_id: u32,
    textures: HashMap<TextureId, GlTexture>,
    stages: HashMap<ShaderStageId, glow::Shader>,
    programs: HashMap<ProgramId, GlProgram>,
    current_program: Option<ProgramId>,
    /// Texture bound to each unit, as last set through the trait.
    bound: Vec<Option<TextureId>>,
    active_unit: u32,
}

impl GlowDevice {
    /// Create the shared vertex state and query device limits.
    ///
    /// # Safety
    ///
    /// Requires a current GL context, and that context must stay current on
    /// the calling thread whenever the device is used afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if a vertex array, buffer or framebuffer could not be
    /// created.
    pub unsafe fn new(gl: Arc<glow::Context>) -> Result<Self, String> {
        let (vao, vbo, ebo, fbo) = unsafe {
            let vao = gl.create_vertex_array()?;
            let vbo = gl.create_buffer()?;
            let ebo = gl.create_buffer()?;
            let fbo = gl.create_framebuffer()?;

            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(ebo));

            // Vertex is 24 bytes, well within i32 range.
            #[expect(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let stride = std::mem::size_of::<Vertex>() as i32;
            gl.enable_vertex_attrib_array(0);
            gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, stride, 0);
            gl.enable_vertex_attrib_array(1);
            gl.vertex_attrib_pointer_f32(1, 2, glow::FLOAT, false, stride, 8);
            gl.enable_vertex_attrib_array(2);
            gl.vertex_attrib_pointer_f32(2, 4, glow::UNSIGNED_BYTE, true, stride, 16);
            gl.enable_vertex_attrib_array(3);
            gl.vertex_attrib_pointer_f32(3, 1, glow::FLOAT, false, stride, 20);

            (vao, vbo, ebo, fbo)
        };

        let caps = unsafe {
            let units = gl.get_parameter_i32(glow::MAX_TEXTURE_IMAGE_UNITS);
            let draw_buffers = gl.get_parameter_i32(glow::MAX_DRAW_BUFFERS);
            let size = gl.get_parameter_i32(glow::MAX_TEXTURE_SIZE);
            let extensions = gl.supported_extensions();
            DeviceCaps {
                max_texture_units: u32::try_from(units).unwrap_or(1).max(1),
                max_draw_buffers: u32::try_from(draw_buffers).unwrap_or(1).max(1),
                max_texture_size: u32::try_from(size).unwrap_or(0),
                npot: gl.version().major >= 3
                    || extensions.contains("GL_ARB_texture_non_power_of_two")
                    || extensions.contains("GL_OES_texture_npot"),
            }
        };
        log::debug!("GL device limits: {caps:?}");

        Ok(Self {
            gl,
            vao,
            vbo,
            ebo,
            fbo,
            caps,
            next_id: 1,
            textures: HashMap::new(),
            stages: HashMap::new(),
            programs: HashMap::new(),
            current_program: None,
            bound: vec![None; caps.max_texture_units as usize],
            active_unit: 0,
        })
    }

    /// Delete every GL object this device still owns.
    ///
    /// # Safety
    ///
    /// Requires the GL context passed to [`new`](Self::new) to be current.
    pub unsafe fn destroy(&mut self) {
        let gl = &self.gl;
        unsafe {
            for (_, texture) in self.textures.drain() {
                gl.delete_texture(texture.texture);
            }
            for (_, stage) in self.stages.drain() {
                gl.delete_shader(stage);
            }
            for (_, program) in self.programs.drain() {
                gl.delete_program(program.program);
            }
            gl.delete_framebuffer(self.fbo);
            gl.delete_buffer(self.ebo);
            gl.delete_buffer(self.vbo);
            gl.delete_vertex_array(self.vao);
        }
        self.current_program = None;
        self.bound.iter_mut().for_each(|slot| *slot = None);
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    fn texture(&self, texture: TextureId) -> Result<&GlTexture> {
        self.textures
            .get(&texture)
            .ok_or_else(|| DisplayError::Device(format!("unknown texture {}", texture.0)))
    }

    /// Run `f` with `texture` bound on the active unit, then put back
    /// whatever the unit held.
    fn with_bound<T>(&self, texture: glow::Texture, f: impl FnOnce(&glow::Context) -> T) -> T {
        let gl = &self.gl;
        let previous = self
            .bound
            .get(self.active_unit as usize)
            .copied()
            .flatten()
            .and_then(|id| self.textures.get(&id))
            .map(|t| t.texture);
        unsafe { gl.bind_texture(glow::TEXTURE_2D, Some(texture)) };
        let result = f(gl);
        unsafe { gl.bind_texture(glow::TEXTURE_2D, previous) };
        result
    }

    /// Run `f` with `program` current, then restore the current program.
    fn with_program(&self, program: ProgramId, f: impl FnOnce(&glow::Context, &GlProgram)) {
        let Some(entry) = self.programs.get(&program) else {
            log::warn!("uniform set on unknown program {}", program.0);
            return;
        };
        let gl = &self.gl;
        let switch = self.current_program != Some(program);
        if switch {
            unsafe { gl.use_program(Some(entry.program)) };
        }
        f(gl, entry);
        if switch {
            let previous = self
                .current_program
                .and_then(|id| self.programs.get(&id))
                .map(|p| p.program);
            unsafe { gl.use_program(previous) };
        }
    }

    fn location(program: &GlProgram, location: UniformId) -> Option<&glow::UniformLocation> {
        program.locations.get(location.0 as usize)
    }

    fn allocate_texture(&mut self, texture: glow::Texture, width: u32, height: u32) -> TextureId {
        let id = TextureId(self.allocate_id());
        self.textures.insert(
            id,
            GlTexture {
                texture,
                width,
                height,
            },
        );
        id
    }

    /// Attach `texture` to the private framebuffer, read it back and
    /// detach it again.
    fn read_attached(&self, texture: glow::Texture, width: u32, height: u32) -> Result<Vec<u8>> {
        let gl = &self.gl;
        let mut pixels = vec![0u8; width as usize * height as usize * 4];
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(self.fbo));
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(texture),
                0,
            );
            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            if status == glow::FRAMEBUFFER_COMPLETE {
                gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
                gl.read_pixels(
                    0,
                    0,
                    gl_size(width),
                    gl_size(height),
                    glow::RGBA,
                    glow::UNSIGNED_BYTE,
                    PixelPackData::Slice(Some(pixels.as_mut_slice())),
                );
            }
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                None,
                0,
            );
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            if status != glow::FRAMEBUFFER_COMPLETE {
                return Err(DisplayError::Device(format!(
                    "readback framebuffer incomplete (0x{status:x})"
                )));
            }
        }
        Ok(pixels)
    }
}

impl GraphicsDevice for GlowDevice {
    fn capabilities(&self) -> DeviceCaps {
        self.caps
    }

    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        smoothing: bool,
        data: Option<&[u8]>,
    ) -> Result<TextureId> {
        let texture = unsafe { self.gl.create_texture() }.map_err(DisplayError::Device)?;
        self.with_bound(texture, |gl| unsafe {
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, filter(smoothing));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, filter(smoothing));
            #[expect(clippy::cast_possible_wrap)]
            {
                gl.tex_parameter_i32(
                    glow::TEXTURE_2D,
                    glow::TEXTURE_WRAP_S,
                    glow::CLAMP_TO_EDGE as i32,
                );
                gl.tex_parameter_i32(
                    glow::TEXTURE_2D,
                    glow::TEXTURE_WRAP_T,
                    glow::CLAMP_TO_EDGE as i32,
                );
            }
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                RGBA8_INTERNAL_FORMAT,
                gl_size(width),
                gl_size(height),
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelUnpackData::Slice(data),
            );
        });
        Ok(self.allocate_texture(texture, width, height))
    }

    fn create_compressed_texture(
        &mut self,
        width: u32,
        height: u32,
        internal_format: u32,
        data: &[u8],
    ) -> Result<TextureId> {
        let format = i32::try_from(internal_format).map_err(|_| {
            DisplayError::Device(format!("invalid compressed format 0x{internal_format:x}"))
        })?;
        let texture = unsafe { self.gl.create_texture() }.map_err(DisplayError::Device)?;
        let error = self.with_bound(texture, |gl| unsafe {
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, filter(true));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, filter(true));
            gl.compressed_tex_image_2d(
                glow::TEXTURE_2D,
                0,
                format,
                gl_size(width),
                gl_size(height),
                0,
                gl_count(data.len()),
                data,
            );
            gl.get_error()
        });
        if error != glow::NO_ERROR {
            unsafe { self.gl.delete_texture(texture) };
            return Err(DisplayError::Device(format!(
                "compressed format 0x{internal_format:x} rejected (0x{error:x})"
            )));
        }
        Ok(self.allocate_texture(texture, width, height))
    }

    fn upload_sub_texture(
        &mut self,
        texture: TextureId,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<()> {
        let texture = self.texture(texture)?.texture;
        self.with_bound(texture, |gl| unsafe {
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.tex_sub_image_2d(
                glow::TEXTURE_2D,
                0,
                gl_size(x),
                gl_size(y),
                gl_size(width),
                gl_size(height),
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelUnpackData::Slice(Some(data)),
            );
        });
        Ok(())
    }

    fn read_texture(&mut self, texture: TextureId, width: u32, height: u32) -> Result<Vec<u8>> {
        let entry = self.texture(texture)?;
        let (width, height) = (width.min(entry.width), height.min(entry.height));
        self.read_attached(entry.texture, width, height)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if let Some(entry) = self.textures.remove(&texture) {
            for slot in &mut self.bound {
                if *slot == Some(texture) {
                    *slot = None;
                }
            }
            unsafe { self.gl.delete_texture(entry.texture) };
        }
    }

    fn bind_texture_unit(&mut self, unit: u32, texture: Option<TextureId>) {
        let Some(slot) = self.bound.get_mut(unit as usize) else {
            log::warn!("texture unit {unit} out of range");
            return;
        };
        *slot = texture;
        let name = texture.and_then(|t| self.textures.get(&t)).map(|t| t.texture);
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(glow::TEXTURE_2D, name);
        }
        self.active_unit = unit;
    }

    fn set_texture_smoothing(&mut self, texture: TextureId, smoothing: bool) {
        let Some(entry) = self.textures.get(&texture) else {
            return;
        };
        self.with_bound(entry.texture, |gl| unsafe {
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, filter(smoothing));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, filter(smoothing));
        });
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        let gl = &self.gl;
        unsafe {
            if mode == BlendMode::None {
                gl.disable(glow::BLEND);
                return;
            }
            gl.enable(glow::BLEND);
            match mode {
                BlendMode::Alpha => gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA),
                BlendMode::Multiply => gl.blend_func(glow::DST_COLOR, glow::ZERO),
                BlendMode::Add => gl.blend_func(glow::SRC_ALPHA, glow::ONE),
                BlendMode::Premultiplied => gl.blend_func(glow::ONE, glow::ONE_MINUS_SRC_ALPHA),
                BlendMode::None => {}
            }
        }
    }

    fn set_viewport(&mut self, rect: DeviceRect) {
        unsafe { self.gl.viewport(rect.x, rect.y, rect.width, rect.height) };
    }

    fn set_scissor(&mut self, rect: Option<DeviceRect>) {
        let gl = &self.gl;
        unsafe {
            match rect {
                Some(rect) => {
                    gl.enable(glow::SCISSOR_TEST);
                    gl.scissor(rect.x, rect.y, rect.width, rect.height);
                }
                None => gl.disable(glow::SCISSOR_TEST),
            }
        }
    }

    fn bind_render_targets(&mut self, targets: &[TextureId]) -> Result<()> {
        let gl = &self.gl;
        if targets.is_empty() {
            unsafe { gl.bind_framebuffer(glow::FRAMEBUFFER, None) };
            return Ok(());
        }
        if targets.len() > self.caps.max_draw_buffers as usize {
            return Err(DisplayError::DestinationMismatch);
        }
        let names = targets
            .iter()
            .map(|&t| self.texture(t).map(|entry| entry.texture))
            .collect::<Result<Vec<_>>>()?;
        let mut attachments = Vec::with_capacity(names.len());
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(self.fbo));
            for slot in 0..self.caps.max_draw_buffers {
                let name = names.get(slot as usize).copied();
                gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    glow::COLOR_ATTACHMENT0 + slot,
                    glow::TEXTURE_2D,
                    name,
                    0,
                );
                if name.is_some() {
                    attachments.push(glow::COLOR_ATTACHMENT0 + slot);
                }
            }
            if self.caps.max_draw_buffers > 1 {
                gl.draw_buffers(&attachments);
            }
            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            if status != glow::FRAMEBUFFER_COMPLETE {
                gl.bind_framebuffer(glow::FRAMEBUFFER, None);
                return Err(DisplayError::Device(format!(
                    "render target framebuffer incomplete (0x{status:x})"
                )));
            }
        }
        Ok(())
    }

    fn capture_screen(&mut self, texture: TextureId, width: u32, height: u32) {
        let Some(entry) = self.textures.get(&texture) else {
            return;
        };
        self.with_bound(entry.texture, |gl| unsafe {
            gl.copy_tex_sub_image_2d(
                glow::TEXTURE_2D,
                0,
                0,
                0,
                0,
                0,
                gl_size(width),
                gl_size(height),
            );
        });
    }

    fn clear(&mut self, color: Rgba) {
        let [r, g, b, a] = color.to_f32();
        unsafe {
            self.gl.clear_color(r, g, b, a);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderStageId, String> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        let gl = &self.gl;
        let shader = unsafe {
            let shader = gl.create_shader(kind)?;
            gl.shader_source(shader, source);
            gl.compile_shader(shader);
            if !gl.get_shader_compile_status(shader) {
                let log = gl.get_shader_info_log(shader);
                gl.delete_shader(shader);
                return Err(log);
            }
            shader
        };
        let id = ShaderStageId(self.allocate_id());
        self.stages.insert(id, shader);
        Ok(id)
    }

    fn link_program(
        &mut self,
        vertex: ShaderStageId,
        fragment: ShaderStageId,
    ) -> Result<ProgramId, String> {
        let vs = self.stages.remove(&vertex);
        let fs = self.stages.remove(&fragment);
        let gl = &self.gl;
        let (Some(vs), Some(fs)) = (vs, fs) else {
            unsafe {
                vs.into_iter().chain(fs).for_each(|s| gl.delete_shader(s));
            }
            return Err("unknown shader stage".to_owned());
        };
        let program = unsafe {
            let program = match gl.create_program() {
                Ok(program) => program,
                Err(e) => {
                    gl.delete_shader(vs);
                    gl.delete_shader(fs);
                    return Err(e);
                }
            };
            gl.attach_shader(program, vs);
            gl.attach_shader(program, fs);
            for (index, name) in (0u32..).zip(ATTRIBUTES) {
                gl.bind_attrib_location(program, index, name);
            }
            gl.link_program(program);
            let linked = gl.get_program_link_status(program);
            let log = (!linked).then(|| gl.get_program_info_log(program));
            gl.detach_shader(program, vs);
            gl.detach_shader(program, fs);
            gl.delete_shader(vs);
            gl.delete_shader(fs);
            if let Some(log) = log {
                gl.delete_program(program);
                return Err(log);
            }
            program
        };
        let id = ProgramId(self.allocate_id());
        self.programs.insert(
            id,
            GlProgram {
                program,
                locations: Vec::new(),
                names: HashMap::new(),
            },
        );
        Ok(id)
    }

    fn delete_shader(&mut self, stage: ShaderStageId) {
        if let Some(shader) = self.stages.remove(&stage) {
            unsafe { self.gl.delete_shader(shader) };
        }
    }

    fn delete_program(&mut self, program: ProgramId) {
        if let Some(entry) = self.programs.remove(&program) {
            if self.current_program == Some(program) {
                self.current_program = None;
                unsafe { self.gl.use_program(None) };
            }
            unsafe { self.gl.delete_program(entry.program) };
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        if let Some(entry) = self.programs.get(&program) {
            unsafe { self.gl.use_program(Some(entry.program)) };
            self.current_program = Some(program);
        }
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformId> {
        let entry = self.programs.get_mut(&program)?;
        if let Some(&id) = entry.names.get(name) {
            return Some(id);
        }
        let location = unsafe { self.gl.get_uniform_location(entry.program, name) }?;
        let id = UniformId(u32::try_from(entry.locations.len()).ok()?);
        entry.locations.push(location);
        entry.names.insert(name.to_owned(), id);
        Some(id)
    }

    fn set_uniform_i32(&mut self, program: ProgramId, location: UniformId, value: i32) {
        self.with_program(program, |gl, entry| unsafe {
            gl.uniform_1_i32(Self::location(entry, location), value);
        });
    }

    fn set_uniform_f32(&mut self, program: ProgramId, location: UniformId, value: f32) {
        self.with_program(program, |gl, entry| unsafe {
            gl.uniform_1_f32(Self::location(entry, location), value);
        });
    }

    fn set_uniform_vec3(&mut self, program: ProgramId, location: UniformId, value: [f32; 3]) {
        self.with_program(program, |gl, entry| unsafe {
            gl.uniform_3_f32(Self::location(entry, location), value[0], value[1], value[2]);
        });
    }

    fn set_uniform_mat4(&mut self, program: ProgramId, location: UniformId, value: &[[f32; 4]; 4]) {
        self.with_program(program, |gl, entry| unsafe {
            gl.uniform_matrix_4_f32_slice(
                Self::location(entry, location),
                false,
                bytemuck::cast_slice(value),
            );
        });
    }

    fn submit_draw(
        &mut self,
        topology: PrimitiveTopology,
        vertices: &[Vertex],
        indices: Option<&[u16]>,
        count: usize,
    ) {
        if count == 0 || vertices.is_empty() {
            return;
        }
        let gl = &self.gl;
        let mode = gl_topology(topology);
        unsafe {
            gl.bind_vertex_array(Some(self.vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(vertices),
                glow::STREAM_DRAW,
            );
            match indices {
                Some(indices) => {
                    gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(self.ebo));
                    gl.buffer_data_u8_slice(
                        glow::ELEMENT_ARRAY_BUFFER,
                        bytemuck::cast_slice(indices),
                        glow::STREAM_DRAW,
                    );
                    gl.draw_elements(
                        mode,
                        gl_count(count.min(indices.len())),
                        glow::UNSIGNED_SHORT,
                        0,
                    );
                }
                None => gl.draw_arrays(mode, 0, gl_count(count.min(vertices.len()))),
            }
        }
    }

    fn swap_buffers(&mut self) {
        // The window surface owns presentation; flushing hands the frame
        // over to it.
        unsafe { self.gl.flush() };
    }

    fn reset_state(&mut self) {
        let gl = &self.gl;
        unsafe {
            gl.disable(glow::DEPTH_TEST);
            gl.disable(glow::CULL_FACE);
            gl.disable(glow::SCISSOR_TEST);
            gl.enable(glow::BLEND);
            gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            for unit in (0u32..).take(self.bound.len()) {
                gl.active_texture(glow::TEXTURE0 + unit);
                gl.bind_texture(glow::TEXTURE_2D, None);
            }
            gl.active_texture(glow::TEXTURE0);
            gl.use_program(None);
            gl.bind_vertex_array(Some(self.vao));
        }
        self.active_unit = 0;
        self.bound.iter_mut().for_each(|slot| *slot = None);
        self.current_program = None;
    }
}
