//! User shaders: compilation, parameters, and the active shader stack with
//! deferred removal.

use log::{debug, warn};

use crate::bitmap::BitmapHandle;
use crate::device::{GraphicsDevice, ProgramId, UniformId};
use crate::display::Display;
use crate::error::{DisplayError, Result};
use crate::shaders::{self, EDGE_SUFFIXES, UNIFORM_PROJECTION};

slotmap::new_key_type! {
    /// Handle to a shader owned by a [`Display`].
    pub struct ShaderHandle;
}

/// Type of a declared shader parameter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParamKind {
    /// `float`.
    Float,
    /// `sampler2D` plus four edge floats.
    Texture,
    /// `vec3`.
    Vector,
    /// `float` holding a time value.
    Time,
}

/// A parameter declared by a user shader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderParam {
    /// Uniform name.
    pub name: String,
    /// Uniform type.
    pub kind: ParamKind,
    /// Array length; `1` declares a plain uniform.
    pub array_size: u32,
}

impl ShaderParam {
    fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            array_size: 1,
        }
    }

    /// A texture parameter.
    #[must_use]
    pub fn texture(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Texture)
    }

    /// A float parameter.
    #[must_use]
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Float)
    }

    /// A `vec3` parameter.
    #[must_use]
    pub fn vector(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Vector)
    }

    /// A time parameter.
    #[must_use]
    pub fn time(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Time)
    }

    /// Declare the parameter as an array of `size` elements.
    #[must_use]
    pub fn with_array_size(mut self, size: u32) -> Self {
        self.array_size = size.max(1);
        self
    }
}

/// Identifies a parameter of one shader, as returned by
/// [`Display::parameter_id`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParamId {
    /// A float or vector uniform.
    Uniform(UniformId),
    /// Index into the shader's texture parameter table.
    Texture(usize),
    /// The uniform does not exist in the linked program (it may have been
    /// optimized out). Setting it does nothing.
    Inactive,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ShaderState {
    Idle,
    Active,
    /// Stopped while geometry was queued; removed by the next flush.
    PendingRemoval,
}

#[derive(Copy, Clone, Debug)]
struct TextureParam {
    sampler: Option<UniformId>,
    /// `[top, left, bottom, right]`.
    edges: [Option<UniformId>; 4],
}

#[derive(Copy, Clone, Debug)]
struct TextureBinding {
    param: usize,
    bitmap: BitmapHandle,
}

/// A linked program and its parameter bindings.
#[derive(Clone, Debug)]
pub(crate) struct Shader {
    pub(crate) program: ProgramId,
    projection: Option<UniformId>,
    /// Projection generation last uploaded to the program.
    pub(crate) uploaded_generation: Option<u64>,
    use_custom_param: bool,
    pub(crate) state: ShaderState,
    texture_params: Vec<TextureParam>,
    bound: Vec<TextureBinding>,
}

impl Shader {
    pub(crate) fn new<D: GraphicsDevice>(
        device: &mut D,
        program: ProgramId,
        use_custom_param: bool,
    ) -> Self {
        Self {
            program,
            projection: device.uniform_location(program, UNIFORM_PROJECTION),
            uploaded_generation: None,
            use_custom_param,
            state: ShaderState::Idle,
            texture_params: Vec::new(),
            bound: Vec::new(),
        }
    }
}

fn indexed_name(name: &str, index: Option<u32>) -> String {
    match index {
        Some(index) => format!("{name}[{index}]"),
        None => name.to_owned(),
    }
}

impl<D: GraphicsDevice> Display<D> {
    fn shader(&self, handle: ShaderHandle) -> Result<&Shader> {
        self.shaders.get(handle).ok_or(DisplayError::InvalidHandle)
    }

    fn shader_mut(&mut self, handle: ShaderHandle) -> Result<&mut Shader> {
        self.shaders.get_mut(handle).ok_or(DisplayError::InvalidHandle)
    }

    /// Compile a fragment shader from `code` with uniform declarations
    /// generated for `params`. `use_custom_param` marks shaders whose
    /// parameters change per draw; stopping them always flushes.
    ///
    /// # Errors
    ///
    /// Fails with the compiler or linker diagnostic. Nothing is registered
    /// in that case.
    pub fn create_shader(
        &mut self,
        code: &[&str],
        params: &[ShaderParam],
        use_custom_param: bool,
    ) -> Result<ShaderHandle> {
        self.ensure_ready()?;
        let source = shaders::build_fragment_source(code, params);
        let program = shaders::compile_program(&mut self.device, shaders::VERTEX_SRC, &source)?;
        let shader = Shader::new(&mut self.device, program, use_custom_param);
        let handle = self.shaders.insert(shader);
        debug!("created shader {handle:?} with {} parameters", params.len());
        Ok(handle)
    }

    /// Delete a shader, stopping it first if needed.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle.
    pub fn delete_shader(&mut self, handle: ShaderHandle) -> Result<()> {
        if self.shader(handle)?.state != ShaderState::Idle {
            self.flush();
            self.remove_shader(handle);
        }
        let shader = self.shaders.remove(handle).ok_or(DisplayError::InvalidHandle)?;
        if self.state.program == Some(shader.program) {
            self.state.program = None;
        }
        self.device.delete_program(shader.program);
        self.restore_program();
        Ok(())
    }

    /// Push a shader on the active stack, so the following geometry is drawn
    /// with it. Restarting a shader whose stop is still pending simply
    /// cancels the stop.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle or after shutdown.
    pub fn start_shader(&mut self, handle: ShaderHandle) -> Result<()> {
        self.ensure_ready()?;
        let shader = self.shader(handle)?;
        match (shader.state, shader.use_custom_param) {
            (ShaderState::PendingRemoval, false) => {
                self.shader_mut(handle)?.state = ShaderState::Active;
                self.pending_removals -= 1;
            }
            (ShaderState::Active, _) => {}
            (ShaderState::PendingRemoval | ShaderState::Idle, _) => {
                // Sweeps a pending removal of this very shader, too.
                self.flush();
                self.active_shaders.push(handle);
                self.shader_mut(handle)?.state = ShaderState::Active;
            }
        }

        self.shader_mut(handle)?.uploaded_generation = None;
        self.use_shader(handle);
        Ok(())
    }

    /// Take a shader off the active stack. With geometry queued, the removal
    /// waits for the next flush unless the shader uses per-draw parameters.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle or a shader that is not active.
    pub fn stop_shader(&mut self, handle: ShaderHandle) -> Result<()> {
        self.stop_shader_inner(handle, false)
    }

    /// `suppress_flush` removes the shader immediately even with geometry
    /// queued, for callers that just drew it themselves.
    pub(crate) fn stop_shader_inner(
        &mut self,
        handle: ShaderHandle,
        suppress_flush: bool,
    ) -> Result<()> {
        let shader = self.shader(handle)?;
        if shader.state != ShaderState::Active {
            debug!("shader {handle:?} is not active");
            return Err(DisplayError::ShaderNotActive);
        }
        let use_custom_param = shader.use_custom_param;

        if self.batch.is_empty() || suppress_flush {
            self.remove_shader(handle);
            self.restore_program();
        } else if use_custom_param {
            self.flush();
            self.remove_shader(handle);
            self.restore_program();
        } else {
            self.shader_mut(handle)?.state = ShaderState::PendingRemoval;
            self.pending_removals += 1;
        }
        Ok(())
    }

    fn remove_shader(&mut self, handle: ShaderHandle) {
        self.active_shaders.retain(|&active| active != handle);
        if let Some(shader) = self.shaders.get_mut(handle) {
            if shader.state == ShaderState::PendingRemoval {
                self.pending_removals = self.pending_removals.saturating_sub(1);
            }
            shader.state = ShaderState::Idle;
            shader.bound.clear();
        }
    }

    pub(crate) fn sweep_pending_shaders(&mut self) {
        let pending = self
            .active_shaders
            .iter()
            .copied()
            .filter(|&h| {
                self.shaders
                    .get(h)
                    .is_some_and(|s| s.state == ShaderState::PendingRemoval)
            })
            .collect::<Vec<_>>();
        for handle in pending {
            self.remove_shader(handle);
        }
        self.pending_removals = 0;
    }

    /// Bind the program of the topmost active shader, or the default one.
    pub(crate) fn restore_program(&mut self) {
        let top = self
            .active_shaders
            .last()
            .copied()
            .unwrap_or(self.default_shader);
        self.use_shader(top);
    }

    /// Make a shader's program current and bring its projection up to date.
    pub(crate) fn use_shader(&mut self, handle: ShaderHandle) {
        let generation = self.state.projection_generation;
        let Some(shader) = self.shaders.get_mut(handle) else {
            return;
        };
        if self.state.program != Some(shader.program) {
            self.device.use_program(shader.program);
            self.state.program = Some(shader.program);
        }
        if shader.uploaded_generation != Some(generation) {
            if let Some(location) = shader.projection {
                self.device
                    .set_uniform_mat4(shader.program, location, &self.state.projection);
            }
            shader.uploaded_generation = Some(generation);
        }
    }

    /// Bind a shader's texture parameters to units `0..n` for its draw.
    pub(crate) fn bind_shader_textures(&mut self, handle: ShaderHandle) {
        let Some(shader) = self.shaders.get(handle) else {
            return;
        };
        let program = shader.program;
        let bindings = shader
            .bound
            .iter()
            .map(|binding| {
                (
                    binding.bitmap,
                    shader.texture_params[binding.param].sampler,
                )
            })
            .collect::<Vec<_>>();

        let mut captured = false;
        for (unit, (bitmap, sampler)) in (0u32..).zip(bindings) {
            let Some(texture) = self.bitmaps.get(bitmap).and_then(|b| b.texture) else {
                warn!("shader {handle:?} samples a deleted bitmap");
                continue;
            };
            if bitmap == self.screen && !captured {
                let (width, height) = self.screen_size();
                self.device.capture_screen(texture, width, height);
                captured = true;
            }
            self.device.bind_texture_unit(unit, Some(texture));
            self.state.units.assign(unit, bitmap, texture);
            if let Some(sampler) = sampler {
                self.device
                    .set_uniform_i32(program, sampler, i32::try_from(unit).unwrap_or_default());
            }
        }
    }

    /// Resolve a parameter name. Texture parameters get a slot in the
    /// shader's texture table; `index` selects an array element.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle.
    pub fn parameter_id(
        &mut self,
        handle: ShaderHandle,
        name: &str,
        index: Option<u32>,
        is_texture: bool,
    ) -> Result<ParamId> {
        let shader = self.shaders.get_mut(handle).ok_or(DisplayError::InvalidHandle)?;
        let program = shader.program;

        if !is_texture {
            return Ok(self
                .device
                .uniform_location(program, &indexed_name(name, index))
                .map_or_else(
                    || {
                        debug!("shader {handle:?} has no active uniform `{name}`");
                        ParamId::Inactive
                    },
                    ParamId::Uniform,
                ));
        }

        let sampler = self.device.uniform_location(program, &indexed_name(name, index));
        if let Some(existing) = sampler.and_then(|sampler| {
            shader
                .texture_params
                .iter()
                .position(|param| param.sampler == Some(sampler))
        }) {
            return Ok(ParamId::Texture(existing));
        }

        let edges = EDGE_SUFFIXES.map(|suffix| {
            self.device
                .uniform_location(program, &indexed_name(&format!("{name}{suffix}"), index))
        });
        shader.texture_params.push(TextureParam { sampler, edges });
        Ok(ParamId::Texture(shader.texture_params.len() - 1))
    }

    /// Bind a bitmap to a texture parameter, or the screen contents with
    /// `None`. Binding a parameter again replaces its bitmap; the edge
    /// uniforms receive the bitmap's clip in texture coordinates.
    ///
    /// # Errors
    ///
    /// Fails on stale handles, a non-texture parameter, or when the shader
    /// already binds as many textures as there are units.
    #[expect(clippy::cast_precision_loss)]
    pub fn set_shader_bitmap(
        &mut self,
        handle: ShaderHandle,
        param: ParamId,
        bitmap: Option<BitmapHandle>,
    ) -> Result<()> {
        let ParamId::Texture(param) = param else {
            return Err(DisplayError::InvalidParameter);
        };
        let bitmap = bitmap.unwrap_or(self.screen);
        let source = self.bitmap(bitmap)?;
        let clip = source.clip;
        let [recip_w, recip_h] = source.recip_real;
        let rows = |y: u32| {
            if bitmap == self.screen {
                // Captured rows are bottom-up.
                (source.height as f32 - y as f32) * recip_h
            } else {
                y as f32 * recip_h
            }
        };
        let edges = [
            rows(clip.tl_y),
            clip.tl_x as f32 * recip_w,
            rows(clip.br_y),
            clip.br_x as f32 * recip_w,
        ];

        let units = self.caps.max_texture_units as usize;
        let shader = self.shaders.get_mut(handle).ok_or(DisplayError::InvalidHandle)?;
        let Some(texture_param) = shader.texture_params.get(param).copied() else {
            return Err(DisplayError::InvalidParameter);
        };

        if let Some(binding) = shader.bound.iter_mut().find(|b| b.param == param) {
            binding.bitmap = bitmap;
        } else if shader.bound.len() >= units {
            warn!("shader {handle:?}: all {units} texture units are bound");
            return Err(DisplayError::TextureUnitsExhausted);
        } else {
            shader.bound.push(TextureBinding { param, bitmap });
        }

        for (location, value) in texture_param.edges.into_iter().zip(edges) {
            if let Some(location) = location {
                self.device.set_uniform_f32(shader.program, location, value);
            }
        }
        Ok(())
    }

    /// Set a float (or time) parameter.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle or a texture parameter id.
    pub fn set_shader_float(&mut self, handle: ShaderHandle, param: ParamId, value: f32) -> Result<()> {
        let program = self.shader(handle)?.program;
        match param {
            ParamId::Uniform(location) => {
                self.device.set_uniform_f32(program, location, value);
                Ok(())
            }
            ParamId::Inactive => Ok(()),
            ParamId::Texture(_) => Err(DisplayError::InvalidParameter),
        }
    }

    /// Set a `vec3` parameter.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle or a texture parameter id.
    pub fn set_shader_vector(
        &mut self,
        handle: ShaderHandle,
        param: ParamId,
        value: [f32; 3],
    ) -> Result<()> {
        let program = self.shader(handle)?.program;
        match param {
            ParamId::Uniform(location) => {
                self.device.set_uniform_vec3(program, location, value);
                Ok(())
            }
            ParamId::Inactive => Ok(()),
            ParamId::Texture(_) => Err(DisplayError::InvalidParameter),
        }
    }

    /// Whether a shader is on the active stack (including a pending stop).
    #[must_use]
    pub fn is_shader_active(&self, handle: ShaderHandle) -> bool {
        self.active_shaders.contains(&handle)
    }

    /// Drop every shader binding of a bitmap about to be deleted.
    pub(crate) fn unbind_from_shaders(&mut self, bitmap: BitmapHandle) {
        for shader in self.shaders.values_mut() {
            shader.bound.retain(|binding| binding.bitmap != bitmap);
        }
    }
}
