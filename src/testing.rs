//! Test doubles: a device that records every call, a scripted window
//! surface and scheduler, and a display wired to them.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use crate::config::DisplayConfig;
use crate::device::{
    DeviceCaps, DeviceRect, GraphicsDevice, ProgramId, ShaderStage, ShaderStageId, TextureId,
    UniformId,
};
use crate::display::{Collaborators, Display};
use crate::error::{DisplayError, Result};
use crate::events::QueuedEventBus;
use crate::resource::MemoryLocator;
use crate::task::InlineRunner;
use crate::types::{BlendMode, PrimitiveTopology, Rgba, Vertex};
use crate::video::{Scheduler, VideoMode, WindowSurface};

/// One recorded device call.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum DeviceCall {
    CreateTexture(TextureId),
    DeleteTexture(TextureId),
    BindTexture {
        unit: u32,
        texture: Option<TextureId>,
    },
    Smoothing {
        texture: TextureId,
        smoothing: bool,
    },
    Blend(BlendMode),
    Viewport(DeviceRect),
    Scissor(Option<DeviceRect>),
    RenderTargets(Vec<TextureId>),
    CaptureScreen(TextureId),
    Clear(Rgba),
    UseProgram(ProgramId),
    DeleteProgram(ProgramId),
    UniformI32 { name: String, value: i32 },
    UniformF32 { name: String, value: f32 },
    UniformVec3 { name: String, value: [f32; 3] },
    UniformMat4 { name: String },
    Draw(PrimitiveTopology),
    Swap,
    ResetState,
}

/// A submitted draw with a copy of its geometry.
#[derive(Clone, Debug)]
pub(crate) struct DrawRecord {
    pub(crate) topology: PrimitiveTopology,
    pub(crate) vertices: Vec<Vertex>,
    pub(crate) indices: Option<Vec<u16>>,
    pub(crate) count: usize,
    pub(crate) program: Option<ProgramId>,
}

#[derive(Clone, Debug)]
struct StoredTexture {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// Identifiers appearing in a GLSL source.
fn identifiers(source: &str) -> impl Iterator<Item = &str> {
    source
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
}

/// In-memory [`GraphicsDevice`] keeping textures as byte buffers.
#[derive(Debug, Default)]
pub(crate) struct RecordingDevice {
    pub(crate) calls: Vec<DeviceCall>,
    draws: Vec<DrawRecord>,
    next_id: u32,
    textures: HashMap<TextureId, StoredTexture>,
    stages: HashMap<ShaderStageId, String>,
    /// Identifiers declared by each live program.
    programs: HashMap<ProgramId, HashSet<String>>,
    uniforms: HashMap<(ProgramId, String), UniformId>,
    uniform_names: HashMap<UniformId, String>,
    current_program: Option<ProgramId>,
}

impl RecordingDevice {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub(crate) fn clear_calls(&mut self) {
        self.calls.clear();
        self.draws.clear();
    }

    pub(crate) fn deleted_textures(&self) -> Vec<TextureId> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                DeviceCall::DeleteTexture(texture) => Some(*texture),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub(crate) fn program_count(&self) -> usize {
        self.programs.len()
    }

    pub(crate) fn live_stages(&self) -> usize {
        self.stages.len()
    }

    pub(crate) fn last_uniform_f32(&self, name: &str) -> Option<f32> {
        self.calls.iter().rev().find_map(|call| match call {
            DeviceCall::UniformF32 { name: n, value } if n == name => Some(*value),
            _ => None,
        })
    }

    pub(crate) fn last_uniform_i32(&self, name: &str) -> Option<i32> {
        self.calls.iter().rev().find_map(|call| match call {
            DeviceCall::UniformI32 { name: n, value } if n == name => Some(*value),
            _ => None,
        })
    }

    fn uniform_name(&self, location: UniformId) -> String {
        self.uniform_names
            .get(&location)
            .cloned()
            .unwrap_or_default()
    }

    fn texture_mut(&mut self, texture: TextureId) -> Result<&mut StoredTexture> {
        self.textures
            .get_mut(&texture)
            .ok_or_else(|| DisplayError::Device(format!("unknown texture {texture:?}")))
    }
}

impl GraphicsDevice for RecordingDevice {
    fn capabilities(&self) -> DeviceCaps {
        DeviceCaps {
            max_texture_units: 8,
            max_draw_buffers: 4,
            max_texture_size: 4096,
            npot: false,
        }
    }

    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        _smoothing: bool,
        data: Option<&[u8]>,
    ) -> Result<TextureId> {
        let size = width as usize * height as usize * 4;
        let pixels = match data {
            Some(data) if data.len() != size => {
                return Err(DisplayError::DataSize {
                    expected: size,
                    actual: data.len(),
                })
            }
            Some(data) => data.to_vec(),
            None => vec![0; size],
        };
        let texture = TextureId(self.next_id());
        self.textures.insert(
            texture,
            StoredTexture {
                width,
                height,
                pixels,
            },
        );
        self.calls.push(DeviceCall::CreateTexture(texture));
        Ok(texture)
    }

    fn create_compressed_texture(
        &mut self,
        width: u32,
        height: u32,
        _internal_format: u32,
        _data: &[u8],
    ) -> Result<TextureId> {
        self.create_texture(width, height, false, None)
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
        let stored = self.texture_mut(texture)?;
        if x + width > stored.width || y + height > stored.height {
            return Err(DisplayError::Device("sub-texture out of bounds".into()));
        }
        let stride = stored.width as usize * 4;
        let row_bytes = width as usize * 4;
        for (row, src) in data.chunks_exact(row_bytes).take(height as usize).enumerate() {
            let start = (y as usize + row) * stride + x as usize * 4;
            stored.pixels[start..start + row_bytes].copy_from_slice(src);
        }
        Ok(())
    }

    fn read_texture(&mut self, texture: TextureId, width: u32, height: u32) -> Result<Vec<u8>> {
        let stored = self.texture_mut(texture)?;
        if (stored.width, stored.height) != (width, height) {
            return Err(DisplayError::Device("readback size mismatch".into()));
        }
        Ok(stored.pixels.clone())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.calls.push(DeviceCall::DeleteTexture(texture));
    }

    fn bind_texture_unit(&mut self, unit: u32, texture: Option<TextureId>) {
        self.calls.push(DeviceCall::BindTexture { unit, texture });
    }

    fn set_texture_smoothing(&mut self, texture: TextureId, smoothing: bool) {
        self.calls.push(DeviceCall::Smoothing { texture, smoothing });
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.calls.push(DeviceCall::Blend(mode));
    }

    fn set_viewport(&mut self, rect: DeviceRect) {
        self.calls.push(DeviceCall::Viewport(rect));
    }

    fn set_scissor(&mut self, rect: Option<DeviceRect>) {
        self.calls.push(DeviceCall::Scissor(rect));
    }

    fn bind_render_targets(&mut self, targets: &[TextureId]) -> Result<()> {
        if let Some(missing) = targets.iter().find(|t| !self.textures.contains_key(t)) {
            return Err(DisplayError::Device(format!(
                "incomplete framebuffer: {missing:?}"
            )));
        }
        self.calls.push(DeviceCall::RenderTargets(targets.to_vec()));
        Ok(())
    }

    fn capture_screen(&mut self, texture: TextureId, _width: u32, _height: u32) {
        self.calls.push(DeviceCall::CaptureScreen(texture));
    }

    fn clear(&mut self, color: Rgba) {
        self.calls.push(DeviceCall::Clear(color));
    }

    fn compile_shader(
        &mut self,
        _stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderStageId, String> {
        if source.contains("#error") {
            return Err("0:1: #error directive".into());
        }
        let stage = ShaderStageId(self.next_id());
        self.stages.insert(stage, source.to_owned());
        Ok(stage)
    }

    fn link_program(
        &mut self,
        vertex: ShaderStageId,
        fragment: ShaderStageId,
    ) -> Result<ProgramId, String> {
        let sources = [vertex, fragment].map(|stage| self.stages.remove(&stage));
        let [Some(vertex), Some(fragment)] = sources else {
            return Err("unknown shader stage".into());
        };
        let declared = identifiers(&vertex)
            .chain(identifiers(&fragment))
            .map(str::to_owned)
            .collect();
        let program = ProgramId(self.next_id());
        self.programs.insert(program, declared);
        Ok(program)
    }

    fn delete_shader(&mut self, stage: ShaderStageId) {
        self.stages.remove(&stage);
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.calls.push(DeviceCall::DeleteProgram(program));
    }

    fn use_program(&mut self, program: ProgramId) {
        self.current_program = Some(program);
        self.calls.push(DeviceCall::UseProgram(program));
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformId> {
        let base = name.split('[').next().unwrap_or(name);
        if !self.programs.get(&program)?.contains(base) {
            return None;
        }
        if let Some(&location) = self.uniforms.get(&(program, name.to_owned())) {
            return Some(location);
        }
        let location = UniformId(self.next_id());
        self.uniforms.insert((program, name.to_owned()), location);
        self.uniform_names.insert(location, name.to_owned());
        Some(location)
    }

    fn set_uniform_i32(&mut self, _program: ProgramId, location: UniformId, value: i32) {
        let name = self.uniform_name(location);
        self.calls.push(DeviceCall::UniformI32 { name, value });
    }

    fn set_uniform_f32(&mut self, _program: ProgramId, location: UniformId, value: f32) {
        let name = self.uniform_name(location);
        self.calls.push(DeviceCall::UniformF32 { name, value });
    }

    fn set_uniform_vec3(&mut self, _program: ProgramId, location: UniformId, value: [f32; 3]) {
        let name = self.uniform_name(location);
        self.calls.push(DeviceCall::UniformVec3 { name, value });
    }

    fn set_uniform_mat4(
        &mut self,
        _program: ProgramId,
        location: UniformId,
        _value: &[[f32; 4]; 4],
    ) {
        let name = self.uniform_name(location);
        self.calls.push(DeviceCall::UniformMat4 { name });
    }

    fn submit_draw(
        &mut self,
        topology: PrimitiveTopology,
        vertices: &[Vertex],
        indices: Option<&[u16]>,
        count: usize,
    ) {
        self.draws.push(DrawRecord {
            topology,
            vertices: vertices.to_vec(),
            indices: indices.map(<[u16]>::to_vec),
            count,
            program: self.current_program,
        });
        self.calls.push(DeviceCall::Draw(topology));
    }

    fn swap_buffers(&mut self) {
        self.calls.push(DeviceCall::Swap);
    }

    fn reset_state(&mut self) {
        self.calls.push(DeviceCall::ResetState);
    }
}

/// What the scripted surface has been asked to do.
#[derive(Debug)]
pub(crate) struct SurfaceState {
    pub(crate) created: Vec<VideoMode>,
    pub(crate) destroyed: usize,
    pub(crate) pumps: usize,
    /// Number of upcoming `create` calls that fail.
    pub(crate) failing: usize,
    pub(crate) open: bool,
    pub(crate) size: (u32, u32),
    pub(crate) physical_rate: Option<u32>,
    pub(crate) divisors: Vec<u32>,
    pub(crate) modes: Vec<VideoMode>,
    pub(crate) vsync_supported: bool,
    pub(crate) vsync: bool,
}

impl Default for SurfaceState {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            destroyed: 0,
            pumps: 0,
            failing: 0,
            open: false,
            size: (0, 0),
            physical_rate: None,
            divisors: vec![1],
            modes: Vec::new(),
            vsync_supported: false,
            vsync: false,
        }
    }
}

/// A window surface scripted through shared state.
#[derive(Clone, Debug, Default)]
pub(crate) struct FakeSurface(Rc<RefCell<SurfaceState>>);

impl FakeSurface {
    pub(crate) fn state(&self) -> Ref<'_, SurfaceState> {
        self.0.borrow()
    }

    pub(crate) fn state_mut(&self) -> RefMut<'_, SurfaceState> {
        self.0.borrow_mut()
    }
}

impl WindowSurface for FakeSurface {
    fn create(&mut self, mode: &VideoMode, _decorated: bool, vsync: bool) -> Result<(), String> {
        let mut state = self.state_mut();
        if state.failing > 0 {
            state.failing -= 1;
            return Err(format!("{}x{} rejected", mode.width, mode.height));
        }
        state.created.push(*mode);
        state.open = true;
        state.size = (mode.width, mode.height);
        state.vsync = vsync;
        Ok(())
    }

    fn destroy(&mut self) {
        let mut state = self.state_mut();
        state.destroyed += 1;
        state.open = false;
    }

    fn pump_events(&mut self) {
        self.state_mut().pumps += 1;
    }

    fn size(&self) -> (u32, u32) {
        self.state().size
    }

    fn physical_refresh_rate(&self) -> Option<u32> {
        self.state().physical_rate
    }

    fn refresh_divisors(&self) -> Vec<u32> {
        self.state().divisors.clone()
    }

    fn video_modes(&self) -> Vec<VideoMode> {
        self.state().modes.clone()
    }

    fn set_vsync(&mut self, enable: bool) -> Result<()> {
        let mut state = self.state_mut();
        if !state.vsync_supported {
            return Err(DisplayError::Unsupported("vsync"));
        }
        state.vsync = enable;
        Ok(())
    }
}

/// A scheduler remembering registered clocks.
#[derive(Clone, Debug, Default)]
pub(crate) struct FakeScheduler(Rc<RefCell<Vec<(String, Duration)>>>);

impl FakeScheduler {
    pub(crate) fn registered(&self) -> Vec<(String, Duration)> {
        self.0.borrow().clone()
    }
}

impl Scheduler for FakeScheduler {
    fn register_periodic(&mut self, name: &str, period: Duration) {
        let mut clocks = self.0.borrow_mut();
        clocks.retain(|(registered, _)| registered != name);
        clocks.push((name.to_owned(), period));
    }

    fn unregister(&mut self, name: &str) {
        self.0.borrow_mut().retain(|(registered, _)| registered != name);
    }
}

/// A display on a [`RecordingDevice`], with handles on its collaborators.
pub(crate) struct TestDisplay {
    pub(crate) display: Display<RecordingDevice>,
    pub(crate) events: QueuedEventBus,
    pub(crate) surface: FakeSurface,
    pub(crate) scheduler: FakeScheduler,
}

impl TestDisplay {
    pub(crate) fn new() -> Self {
        Self::with_config(DisplayConfig::default(), &[])
    }

    pub(crate) fn with_files(files: &[(&str, Vec<u8>)]) -> Self {
        Self::with_config(DisplayConfig::default(), files)
    }

    #[allow(clippy::unwrap_used)]
    pub(crate) fn with_config(config: DisplayConfig, files: &[(&str, Vec<u8>)]) -> Self {
        Self::build(config, files, FakeSurface::default()).unwrap()
    }

    pub(crate) fn try_with_surface(config: DisplayConfig, surface: FakeSurface) -> Result<Self> {
        Self::build(config, &[], surface)
    }

    fn build(
        config: DisplayConfig,
        files: &[(&str, Vec<u8>)],
        surface: FakeSurface,
    ) -> Result<Self> {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut resources = MemoryLocator::new();
        for (name, bytes) in files {
            resources.insert(*name, bytes.clone());
        }
        let events = QueuedEventBus::new();
        let scheduler = FakeScheduler::default();
        let display = Display::new(
            RecordingDevice::default(),
            config,
            Collaborators {
                resources: Arc::new(resources),
                runner: Box::new(InlineRunner::new()),
                events: Box::new(events.clone()),
                surface: Box::new(surface.clone()),
                scheduler: Box::new(scheduler.clone()),
            },
        )?;
        // Start every test from an empty event queue.
        let _ = events.drain();

        Ok(Self {
            display,
            events,
            surface,
            scheduler,
        })
    }

    pub(crate) fn device(&self) -> &RecordingDevice {
        self.display.device()
    }
}

/// A `width`×`height` PNG of a single color.
#[allow(clippy::unwrap_used)]
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbaImage::from_pixel(width, height, image::Rgba([200, 100, 50, 255]))
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}
