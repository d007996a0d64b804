//! The display context: owns the device, the bitmap and shader pools, the
//! render state cache and the batch, and decides when queued geometry has to
//! be drawn.

use std::sync::Arc;

use log::{debug, error, info};
use slotmap::SlotMap;

use crate::batch::Batch;
use crate::bitmap::{real_size, Bitmap, BitmapFlags, BitmapHandle};
use crate::config::DisplayConfig;
use crate::device::{device_int, DeviceCaps, DeviceRect, GraphicsDevice, TextureId};
use crate::error::{DisplayError, Result};
use crate::events::{EventBus, EventKind};
use crate::program::{Shader, ShaderHandle};
use crate::resource::ResourceLocator;
use crate::shaders::{self, UNIFORM_TEXTURE};
use crate::state::{
    ProjectionKey, RenderState, Residency, MAX_DRAW_BUFFERS, MAX_TEXTURE_UNITS,
};
use crate::task::TaskRunner;
use crate::types::{BlendMode, BufferMode, ClipRect, Smoothing};
use crate::video::{Scheduler, VideoMode, VideoState, WindowSurface, POLL_INPUT_CLOCK};

/// Everything a [`Display`] talks to besides the GPU.
pub struct Collaborators {
    /// Resolves and reads bitmap and font resources.
    pub resources: Arc<dyn ResourceLocator>,
    /// Runs decode jobs off the owning thread.
    pub runner: Box<dyn TaskRunner>,
    /// Receives published [`DisplayEvent`](crate::DisplayEvent)s.
    pub events: Box<dyn EventBus>,
    /// The OS window and its GL surface.
    pub surface: Box<dyn WindowSurface>,
    /// Periodic callbacks, used for input polling.
    pub scheduler: Box<dyn Scheduler>,
}

/// A batched 2D display on top of a [`GraphicsDevice`].
///
/// All methods must be called from the thread owning the device. Decoding
/// happens elsewhere through the [`TaskRunner`]; its results are only applied
/// in [`update`](Self::update).
///
/// # Example
///
/// ```no_run
/// # use orx_display::{Display, DisplayConfig, Collaborators, DisplayTransform, Rgba,
/// #     Smoothing, BlendMode, GraphicsDevice};
/// # fn example<D: GraphicsDevice>(device: D, parts: Collaborators) -> orx_display::Result<()> {
/// let mut display = Display::new(device, DisplayConfig::default(), parts)?;
/// let hero = display.load_bitmap("hero.png")?;
///
/// // Each frame:
/// display.update();
/// display.draw_bitmap(
///     hero,
///     &DisplayTransform::at(100.0, 50.0),
///     Rgba::WHITE,
///     Smoothing::Default,
///     BlendMode::Alpha,
/// )?;
/// display.swap();
/// # Ok(())
/// # }
/// ```
pub struct Display<D: GraphicsDevice> {
    pub(crate) device: D,
    pub(crate) config: DisplayConfig,
    /// Device limits after configuration overrides.
    pub(crate) caps: DeviceCaps,

    pub(crate) resources: Arc<dyn ResourceLocator>,
    pub(crate) runner: Box<dyn TaskRunner>,
    pub(crate) events: Box<dyn EventBus>,
    pub(crate) surface: Box<dyn WindowSurface>,
    pub(crate) scheduler: Box<dyn Scheduler>,

    pub(crate) bitmaps: SlotMap<BitmapHandle, Bitmap>,
    pub(crate) screen: BitmapHandle,
    pub(crate) temp_bitmap: Option<BitmapHandle>,
    /// Current render targets; the first one drives viewport and scissor.
    pub(crate) destinations: Vec<BitmapHandle>,

    pub(crate) state: RenderState,
    pub(crate) batch: Batch,

    pub(crate) shaders: SlotMap<ShaderHandle, Shader>,
    /// Started shaders in start order. Each one redraws the batch on flush.
    pub(crate) active_shaders: Vec<ShaderHandle>,
    /// Active shaders waiting for the next flush to be removed.
    pub(crate) pending_removals: usize,
    /// Textures of deleted bitmaps that loading bitmaps still display.
    pub(crate) orphaned_textures: Vec<TextureId>,
    pub(crate) default_shader: ShaderHandle,
    pub(crate) no_texture_shader: ShaderHandle,

    pub(crate) video: VideoState,
    pub(crate) has_surface: bool,
    /// Cleared by [`shutdown`](Self::shutdown). Late decode completions check
    /// it before touching the device.
    pub(crate) ready: bool,
}

/// Device limits narrowed by configuration overrides and the fixed maxima.
fn effective_caps(device: DeviceCaps, config: &DisplayConfig) -> DeviceCaps {
    let limit = |requested: Option<u32>, available: u32, max: u32| {
        requested
            .map_or(available, |requested| requested.min(available))
            .clamp(1, max)
    };
    DeviceCaps {
        max_texture_units: limit(
            config.texture_units,
            device.max_texture_units,
            MAX_TEXTURE_UNITS,
        ),
        max_draw_buffers: limit(
            config.draw_buffers,
            device.max_draw_buffers,
            MAX_DRAW_BUFFERS,
        ),
        max_texture_size: config
            .max_texture_size
            .map_or(device.max_texture_size, |max| max.min(device.max_texture_size))
            .max(1),
        npot: device.npot && config.npot.unwrap_or(true),
    }
}

impl<D: GraphicsDevice> Display<D> {
    /// Compile the built-in programs, create the screen bitmap and open the
    /// configured video mode.
    ///
    /// # Errors
    ///
    /// Fails when a built-in program does not compile, or when neither the
    /// configured nor the fallback video mode can be set.
    pub fn new(mut device: D, config: DisplayConfig, parts: Collaborators) -> Result<Self> {
        let caps = effective_caps(device.capabilities(), &config);
        info!(
            "display: {} texture units, {} draw buffers, max texture size {}, npot {}",
            caps.max_texture_units, caps.max_draw_buffers, caps.max_texture_size, caps.npot
        );

        let default_program = shaders::compile_program(
            &mut device,
            shaders::VERTEX_SRC,
            &shaders::default_fragment_source(caps.max_texture_units),
        )?;
        let no_texture_program = match shaders::compile_program(
            &mut device,
            shaders::VERTEX_SRC,
            shaders::NO_TEXTURE_FRAGMENT_SRC,
        ) {
            Ok(program) => program,
            Err(e) => {
                device.delete_program(default_program);
                return Err(e);
            }
        };

        let mut shaders = SlotMap::with_key();
        let default_shader = shaders.insert(Shader::new(&mut device, default_program, false));
        let no_texture_shader =
            shaders.insert(Shader::new(&mut device, no_texture_program, false));

        let mut bitmaps = SlotMap::with_key();
        let size = [config.width, config.height];
        let screen = bitmaps.insert(Bitmap::new(
            None,
            size,
            real_size(size[0], size[1], caps.npot),
            config.smoothing,
        ));

        let mode = VideoMode::from_config(&config);
        let Collaborators {
            resources,
            runner,
            mut events,
            surface,
            scheduler,
        } = parts;
        events.subscribe(EventKind::Surface);

        let mut display = Self {
            state: RenderState::new(caps.max_texture_units),
            video: VideoState::new(mode, config.vsync),
            device,
            config,
            caps,
            resources,
            runner,
            events,
            surface,
            scheduler,
            bitmaps,
            screen,
            temp_bitmap: None,
            destinations: vec![screen],
            batch: Batch::new(),
            shaders,
            active_shaders: Vec::new(),
            pending_removals: 0,
            orphaned_textures: Vec::new(),
            default_shader,
            no_texture_shader,
            has_surface: false,
            ready: true,
        };

        if let Err(e) = display.set_video_mode(&mode) {
            display.shutdown();
            return Err(e);
        }
        Ok(display)
    }

    /// The graphics device.
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Effective device limits, after configuration overrides.
    #[must_use]
    pub fn capabilities(&self) -> DeviceCaps {
        self.caps
    }

    /// Configuration the display was created with.
    #[must_use]
    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    pub(crate) fn ensure_ready(&self) -> Result<()> {
        if self.ready {
            Ok(())
        } else {
            Err(DisplayError::NotReady)
        }
    }

    /// Release every texture and program, close the surface and stop
    /// accepting work. Decode results arriving later are dropped.
    pub fn shutdown(&mut self) {
        if !self.ready {
            return;
        }
        self.flush();

        for (_, shader) in self.shaders.drain() {
            self.device.delete_program(shader.program);
        }
        self.active_shaders.clear();
        self.pending_removals = 0;

        for (_, bitmap) in self.bitmaps.drain() {
            // Loading bitmaps share their texture with the temp bitmap.
            if let Some(texture) = bitmap.texture.filter(|_| !bitmap.is_loading()) {
                self.device.delete_texture(texture);
            }
        }
        for texture in self.orphaned_textures.drain(..) {
            self.device.delete_texture(texture);
        }
        self.temp_bitmap = None;
        self.destinations.clear();
        self.state.invalidate();
        self.batch.reset();

        self.scheduler.unregister(POLL_INPUT_CLOCK);
        if self.has_surface {
            self.surface.destroy();
            self.has_surface = false;
        }
        self.ready = false;
        info!("display shut down");
    }

    /// Draw everything queued, once per active shader (or once with the
    /// default program), then empty the batch. Shaders whose stop was
    /// deferred are removed afterwards.
    pub fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        if !self.has_surface {
            debug!("no surface, dropping {} queued vertices", self.batch.vertices().len());
            self.discard_batch();
            return;
        }

        if self.active_shaders.is_empty() {
            self.use_shader(self.default_shader);
            self.submit_batch();
        } else {
            for handle in self.active_shaders.clone() {
                self.use_shader(handle);
                self.bind_shader_textures(handle);
                self.submit_batch();
            }
            if self.pending_removals > 0 {
                self.sweep_pending_shaders();
            }
            self.restore_program();
        }

        self.batch.reset();
    }

    /// Drop queued geometry without drawing it. Deferred shader stops still
    /// take effect.
    pub(crate) fn discard_batch(&mut self) {
        self.batch.reset();
        if self.pending_removals > 0 {
            self.sweep_pending_shaders();
        }
    }

    fn submit_batch(&mut self) {
        self.device.submit_draw(
            self.batch.topology(),
            self.batch.vertices(),
            self.batch.indices(),
            self.batch.element_count(),
        );
    }

    /// Present the screen, flushing first.
    pub fn swap(&mut self) {
        self.flush();
        if self.has_surface {
            self.device.swap_buffers();
        }
    }

    /// Change the blend equation, flushing when it differs.
    pub(crate) fn set_blend_mode(&mut self, mode: BlendMode) {
        if self.state.blend == Some(mode) {
            return;
        }
        self.flush();
        self.device.set_blend_mode(mode);
        self.state.blend = Some(mode);
    }

    /// Switch between batched and caller-built geometry, flushing when it
    /// differs.
    pub(crate) fn set_buffer_mode(&mut self, mode: BufferMode) {
        if self.state.buffer_mode == mode {
            return;
        }
        self.flush();
        if mode == BufferMode::Indirect {
            self.batch.restore_quads();
        }
        self.state.buffer_mode = mode;
    }

    /// Make `handle` resident in a texture unit and return the unit. Units
    /// referenced by queued geometry are kept; when all of them are, the
    /// batch is drawn first.
    pub(crate) fn bind_bitmap(&mut self, handle: BitmapHandle, texture: TextureId) -> u32 {
        // User shaders sample one texture for the whole batch.
        if !self.active_shaders.is_empty() && self.state.last_bitmap.is_some_and(|b| b != handle)
        {
            self.flush();
        }

        let residency = match self.state.units.bind(handle, texture, self.batch.used_units()) {
            Some(residency) => residency,
            None => {
                self.flush();
                self.state
                    .units
                    .bind(handle, texture, 0)
                    .unwrap_or(Residency::Bound(0))
            }
        };
        if let Residency::Bound(unit) = residency {
            self.device.bind_texture_unit(unit, Some(texture));
        }
        self.state.last_bitmap = Some(handle);
        residency.unit()
    }

    /// Flush when queued geometry may sample `handle`.
    pub(crate) fn flush_if_queued(&mut self, handle: BitmapHandle) {
        if self.batch.is_empty() {
            return;
        }
        let queued = self
            .state
            .units
            .find(handle)
            .is_some_and(|unit| self.batch.used_units() & (1 << unit) != 0);
        if queued || self.state.last_bitmap == Some(handle) {
            self.flush();
        }
    }

    /// Resolve a draw's smoothing request and update the texture filter when
    /// it changes.
    pub(crate) fn apply_smoothing(
        &mut self,
        handle: BitmapHandle,
        smoothing: Smoothing,
    ) -> Result<()> {
        let wanted = match smoothing {
            Smoothing::Default => self.config.smoothing,
            Smoothing::On => true,
            Smoothing::Off => false,
        };
        let bitmap = self.bitmap(handle)?;
        if bitmap.smoothing() == wanted {
            return Ok(());
        }
        let texture = bitmap.texture;

        self.flush_if_queued(handle);
        if let Some(texture) = texture {
            self.device.set_texture_smoothing(texture, wanted);
        }
        self.bitmap_mut(handle)?
            .flags
            .set(BitmapFlags::SMOOTHING, wanted);
        Ok(())
    }

    /// Render into `handles` from now on. A lone screen bitmap selects the
    /// window; otherwise every bitmap becomes a color attachment and all
    /// must share the same size.
    ///
    /// # Errors
    ///
    /// Fails on stale handles, an empty or oversized set, a set mixing the
    /// screen with bitmaps, bitmaps of different sizes, or when the device
    /// rejects the attachments.
    pub fn set_destination_bitmaps(&mut self, handles: &[BitmapHandle]) -> Result<()> {
        self.ensure_ready()?;
        let Some((&first, rest)) = handles.split_first() else {
            error!("empty destination set");
            return Err(DisplayError::DestinationMismatch);
        };
        if handles.len() > self.caps.max_draw_buffers as usize
            || (handles.len() > 1 && handles.contains(&self.screen))
        {
            error!(
                "{} destinations requested, {} draw buffers available",
                handles.len(),
                self.caps.max_draw_buffers
            );
            return Err(DisplayError::DestinationMismatch);
        }
        let size = {
            let first = self.bitmap(first)?;
            (first.width, first.height)
        };
        for &handle in rest {
            let bitmap = self.bitmap(handle)?;
            if (bitmap.width, bitmap.height) != size {
                error!(
                    "destination {}x{} does not match {}x{}",
                    bitmap.width, bitmap.height, size.0, size.1
                );
                return Err(DisplayError::DestinationMismatch);
            }
        }

        if self.destinations == handles {
            return Ok(());
        }
        self.flush();

        if first == self.screen {
            self.device.bind_render_targets(&[])?;
        } else {
            let textures = handles
                .iter()
                .filter_map(|&handle| self.bitmaps.get(handle).and_then(|b| b.texture))
                .collect::<Vec<_>>();
            self.device.bind_render_targets(&textures)?;
        }
        self.destinations = handles.to_vec();
        self.apply_destination();
        Ok(())
    }

    /// Current render targets.
    #[must_use]
    pub fn destination_bitmaps(&self) -> &[BitmapHandle] {
        &self.destinations
    }

    /// Bring viewport, projection and scissor in line with the primary
    /// destination.
    #[expect(clippy::cast_precision_loss)]
    pub(crate) fn apply_destination(&mut self) {
        let Some(&primary) = self.destinations.first() else {
            return;
        };
        let Some(bitmap) = self.bitmaps.get(primary) else {
            return;
        };
        let (width, height) = (bitmap.width, bitmap.height);

        let viewport = DeviceRect {
            x: 0,
            y: 0,
            width: device_int(width),
            height: device_int(height),
        };
        if self.state.viewport != Some(viewport) {
            self.device.set_viewport(viewport);
            self.state.viewport = Some(viewport);
        }

        let key = ProjectionKey {
            width: width as f32,
            height: height as f32,
            screen: primary == self.screen,
        };
        if self.state.set_projection(key) {
            self.restore_program();
        }
        self.apply_scissor();
    }

    /// Scissor to the primary destination's clip, disabling the test when
    /// the clip covers it entirely. The screen's rectangle is flipped into
    /// bottom-up device rows.
    pub(crate) fn apply_scissor(&mut self) {
        let Some(&primary) = self.destinations.first() else {
            return;
        };
        let Some(bitmap) = self.bitmaps.get(primary) else {
            return;
        };
        let clip = bitmap.clip;

        let rect = if clip == ClipRect::full(bitmap.width, bitmap.height) {
            None
        } else {
            let y = if primary == self.screen {
                device_int(bitmap.height) - device_int(clip.br_y)
            } else {
                device_int(clip.tl_y)
            };
            Some(DeviceRect {
                x: device_int(clip.tl_x),
                y,
                width: device_int(clip.width()),
                height: device_int(clip.height()),
            })
        };

        if self.state.scissor != Some(rect) {
            self.device.set_scissor(rect);
            self.state.scissor = Some(rect);
        }
    }

    /// Point the default program's samplers at their units. Needed again
    /// whenever the surface (and possibly the context) is recreated.
    pub(crate) fn set_builtin_uniforms(&mut self) {
        let Some(shader) = self.shaders.get_mut(self.default_shader) else {
            return;
        };
        for unit in 0..self.caps.max_texture_units {
            let name = format!("{UNIFORM_TEXTURE}[{unit}]");
            if let Some(location) = self.device.uniform_location(shader.program, &name) {
                self.device.set_uniform_i32(
                    shader.program,
                    location,
                    i32::try_from(unit).unwrap_or_default(),
                );
            }
        }
        for shader in self.shaders.values_mut() {
            shader.uploaded_generation = None;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{DeviceCall, TestDisplay};
    use crate::types::{DisplayTransform, Rgba};

    fn draw(t: &mut TestDisplay, bitmap: BitmapHandle, blend: BlendMode) {
        t.display
            .draw_bitmap(
                bitmap,
                &DisplayTransform::at(0.0, 0.0),
                Rgba::WHITE,
                Smoothing::Default,
                blend,
            )
            .unwrap();
    }

    #[test]
    fn overrides_narrow_the_device_limits() {
        let device = DeviceCaps {
            max_texture_units: 16,
            max_draw_buffers: 4,
            max_texture_size: 8192,
            npot: true,
        };
        let config = DisplayConfig {
            texture_units: Some(2),
            draw_buffers: Some(12),
            max_texture_size: Some(1024),
            npot: Some(false),
            ..DisplayConfig::default()
        };
        assert_eq!(
            effective_caps(device, &config),
            DeviceCaps {
                max_texture_units: 2,
                max_draw_buffers: 4,
                max_texture_size: 1024,
                npot: false,
            }
        );

        let clamped = effective_caps(device, &DisplayConfig::default());
        assert_eq!(clamped.max_texture_units, MAX_TEXTURE_UNITS);
        assert!(clamped.npot);
    }

    #[test]
    fn alternating_bitmaps_share_one_draw() {
        let mut t = TestDisplay::new();
        let a = t.display.create_bitmap(16, 16).unwrap();
        let b = t.display.create_bitmap(16, 16).unwrap();
        let requests = t.display.state.units.requests();

        draw(&mut t, a, BlendMode::Alpha);
        draw(&mut t, b, BlendMode::Alpha);
        draw(&mut t, a, BlendMode::Alpha);
        t.display.flush();

        assert_eq!(t.display.state.units.requests() - requests, 3);
        let draws = t.device().draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].vertices.len(), 12);
        assert_eq!(draws[0].count, 18);
    }

    #[test]
    fn blend_changes_split_the_batch() {
        let mut t = TestDisplay::new();
        let a = t.display.create_bitmap(16, 16).unwrap();

        draw(&mut t, a, BlendMode::Alpha);
        draw(&mut t, a, BlendMode::Add);
        draw(&mut t, a, BlendMode::Add);
        t.display.flush();

        let draws = t.device().draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].vertices.len(), 4);
        assert_eq!(draws[1].vertices.len(), 8);
    }

    #[test]
    fn exhausted_units_force_a_flush() {
        let mut t = TestDisplay::with_config(
            DisplayConfig {
                texture_units: Some(2),
                ..DisplayConfig::default()
            },
            &[],
        );
        let bitmaps = (0..3)
            .map(|_| t.display.create_bitmap(4, 4).unwrap())
            .collect::<Vec<_>>();
        for &bitmap in &bitmaps {
            draw(&mut t, bitmap, BlendMode::Alpha);
        }
        t.display.flush();

        let draws = t.device().draws();
        assert_eq!(draws.len(), 2);
        let total: usize = draws.iter().map(|d| d.vertices.len()).sum();
        assert_eq!(total, 12);
    }

    #[test]
    fn repeated_state_is_not_reissued() {
        let mut t = TestDisplay::new();
        let a = t.display.create_bitmap(16, 16).unwrap();
        t.display.device.clear_calls();

        draw(&mut t, a, BlendMode::Alpha);
        draw(&mut t, a, BlendMode::Alpha);
        t.display.flush();

        let calls = &t.device().calls;
        let blends = calls
            .iter()
            .filter(|c| matches!(c, DeviceCall::Blend(_)))
            .count();
        let binds = calls
            .iter()
            .filter(|c| matches!(c, DeviceCall::BindTexture { .. }))
            .count();
        assert_eq!((blends, binds), (1, 1));
    }

    #[test]
    fn screen_scissor_is_flipped() {
        let mut t = TestDisplay::new();
        let screen = t.display.screen_bitmap();
        t.display.set_bitmap_clipping(screen, 10, 20, 110, 220).unwrap();

        assert_eq!(
            t.display.state.scissor,
            Some(Some(DeviceRect {
                x: 10,
                y: 380,
                width: 100,
                height: 200,
            }))
        );
        assert_eq!(
            t.display.bitmap_clipping(screen).unwrap(),
            ClipRect {
                tl_x: 10,
                tl_y: 20,
                br_x: 110,
                br_y: 220
            }
        );

        t.display.set_bitmap_clipping(screen, 0, 0, 800, 600).unwrap();
        assert_eq!(t.display.state.scissor, Some(None));
    }

    #[test]
    fn offscreen_scissor_keeps_its_rows() {
        let mut t = TestDisplay::new();
        let target = t.display.create_bitmap(64, 64).unwrap();
        t.display.set_destination_bitmaps(&[target]).unwrap();
        t.display.set_bitmap_clipping(target, 4, 8, 20, 40).unwrap();

        assert_eq!(
            t.display.state.scissor,
            Some(Some(DeviceRect {
                x: 4,
                y: 8,
                width: 16,
                height: 32,
            }))
        );
    }

    #[test]
    fn destination_changes_flush_and_reproject() {
        let mut t = TestDisplay::new();
        let a = t.display.create_bitmap(16, 16).unwrap();
        let target = t.display.create_bitmap(64, 32).unwrap();
        let generation = t.display.state.projection_generation;

        draw(&mut t, a, BlendMode::Alpha);
        t.display.set_destination_bitmaps(&[target]).unwrap();
        assert_eq!(t.device().draws().len(), 1);
        assert_eq!(t.display.state.projection_generation, generation + 1);
        assert_eq!(
            t.display.state.viewport,
            Some(DeviceRect {
                x: 0,
                y: 0,
                width: 64,
                height: 32
            })
        );

        let texture = t.display.bitmap_texture(target).unwrap().unwrap();
        assert!(t
            .device()
            .calls
            .contains(&DeviceCall::RenderTargets(vec![texture])));

        t.display.set_destination_bitmaps(&[target]).unwrap();
        assert_eq!(t.display.state.projection_generation, generation + 1);
    }

    #[test]
    fn mismatched_destinations_are_rejected() {
        let mut t = TestDisplay::new();
        let a = t.display.create_bitmap(16, 16).unwrap();
        let b = t.display.create_bitmap(32, 16).unwrap();
        let screen = t.display.screen_bitmap();

        for set in [&[][..], &[a, b][..], &[screen, a][..]] {
            assert!(matches!(
                t.display.set_destination_bitmaps(set),
                Err(DisplayError::DestinationMismatch)
            ));
        }
        assert_eq!(t.display.destination_bitmaps(), [screen]);
    }

    #[test]
    fn flush_without_surface_discards() {
        let mut t = TestDisplay::new();
        let a = t.display.create_bitmap(16, 16).unwrap();
        t.display.has_surface = false;
        draw(&mut t, a, BlendMode::Alpha);
        t.display.flush();
        assert!(t.device().draws().is_empty());
        assert!(t.display.batch.is_empty());
    }

    #[test]
    fn smoothing_changes_update_the_texture() {
        let mut t = TestDisplay::new();
        let a = t.display.create_bitmap(16, 16).unwrap();
        let texture = t.display.bitmap_texture(a).unwrap().unwrap();

        t.display
            .draw_bitmap(
                a,
                &DisplayTransform::default(),
                Rgba::WHITE,
                Smoothing::On,
                BlendMode::Alpha,
            )
            .unwrap();
        assert!(t.device().calls.contains(&DeviceCall::Smoothing {
            texture,
            smoothing: true
        }));
        assert!(t
            .display
            .bitmap_flags(a)
            .unwrap()
            .contains(BitmapFlags::SMOOTHING));
    }

    #[test]
    fn shutdown_releases_everything() {
        let mut t = TestDisplay::new();
        t.display.create_bitmap(16, 16).unwrap();
        t.display.shutdown();

        assert_eq!(t.device().texture_count(), 0);
        assert_eq!(t.device().program_count(), 0);
        assert!(matches!(
            t.display.create_bitmap(4, 4),
            Err(DisplayError::NotReady)
        ));
        assert!(t.scheduler.registered().is_empty());
    }
}
