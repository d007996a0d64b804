//! Window surface and video mode lifecycle.
//!
//! On desktop the display owns the surface and recreates it on every mode
//! change. On mobile the platform creates and destroys the surface under a
//! fixed logical mode and reports it through [`LifecycleEvent`]s.

use std::time::Duration;

use log::{debug, error, info, warn};

use crate::bitmap::real_size;
use crate::config::DisplayConfig;
use crate::device::GraphicsDevice;
use crate::display::Display;
use crate::error::{DisplayError, Result};
use crate::events::{DisplayEvent, EventKind, LifecycleEvent, SurfaceEvent};

/// Name of the periodic clock that pumps window input.
pub const POLL_INPUT_CLOCK: &str = "display.poll_input";

/// Period of [`POLL_INPUT_CLOCK`].
pub const POLL_INPUT_PERIOD: Duration = Duration::from_nanos(1_000_000_000 / 60);

/// A screen configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VideoMode {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Color depth in bits.
    pub depth: u32,
    /// Refresh rate in Hz; `0` means any.
    pub refresh_rate: u32,
    /// Fullscreen or windowed.
    pub fullscreen: bool,
}

impl VideoMode {
    /// Used when the requested mode cannot be set.
    pub const SAFE: Self = Self {
        width: 800,
        height: 600,
        depth: 32,
        refresh_rate: 60,
        fullscreen: false,
    };

    /// The mode requested by a configuration.
    #[must_use]
    pub fn from_config(config: &DisplayConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            depth: config.depth,
            refresh_rate: config.refresh_rate,
            fullscreen: config.fullscreen,
        }
    }
}

impl Default for VideoMode {
    fn default() -> Self {
        Self::SAFE
    }
}

/// The OS window and its drawing surface.
pub trait WindowSurface {
    /// Open a window (or go fullscreen) in `mode`.
    ///
    /// # Errors
    ///
    /// Returns the platform's reason when the mode cannot be set.
    fn create(&mut self, mode: &VideoMode, decorated: bool, vsync: bool) -> Result<(), String>;

    /// Close the window.
    fn destroy(&mut self);

    /// Process pending OS events.
    fn pump_events(&mut self);

    /// Drawable size in pixels.
    fn size(&self) -> (u32, u32);

    /// Refresh rate of the physical display, if known.
    fn physical_refresh_rate(&self) -> Option<u32>;

    /// Divisors of the physical refresh rate the swap chain supports.
    fn refresh_divisors(&self) -> Vec<u32> {
        vec![1]
    }

    /// Modes the display hardware offers.
    fn video_modes(&self) -> Vec<VideoMode>;

    /// Turn vertical sync on or off.
    ///
    /// # Errors
    ///
    /// Fails when the platform cannot change it.
    fn set_vsync(&mut self, _enable: bool) -> Result<()> {
        Err(DisplayError::Unsupported("vsync"))
    }
}

/// Registers periodic callbacks with the engine clock.
pub trait Scheduler {
    /// Call `name` every `period` until unregistered. Registering an existing
    /// name replaces it.
    fn register_periodic(&mut self, name: &str, period: Duration);

    /// Stop calling `name`.
    fn unregister(&mut self, name: &str);
}

#[derive(Clone, Debug)]
pub(crate) struct VideoState {
    pub(crate) mode: VideoMode,
    pub(crate) vsync: bool,
    /// Negotiated refresh rate.
    pub(crate) refresh_rate: u32,
}

impl VideoState {
    pub(crate) fn new(mode: VideoMode, vsync: bool) -> Self {
        Self {
            refresh_rate: mode.refresh_rate,
            mode,
            vsync,
        }
    }
}

/// Pick the highest achievable rate `physical / n` not above `target`, or the
/// lowest achievable one when all exceed it.
pub(crate) fn negotiate_refresh_rate(physical: u32, divisors: &[u32], target: u32) -> u32 {
    let candidates = divisors
        .iter()
        .filter(|&&n| n > 0)
        .map(|&n| physical / n);
    candidates
        .clone()
        .filter(|&rate| rate <= target)
        .max()
        .or_else(|| candidates.min())
        .unwrap_or(physical)
}

impl<D: GraphicsDevice> Display<D> {
    /// Recreate the window in `mode`. If that fails, the safe 800×600
    /// windowed mode is tried once before giving up.
    ///
    /// All cached device state is rebuilt and the screen becomes the
    /// destination again.
    ///
    /// # Errors
    ///
    /// Fails when neither mode can be set, or after shutdown.
    pub fn set_video_mode(&mut self, mode: &VideoMode) -> Result<()> {
        self.ensure_ready()?;
        self.flush();
        if self.has_surface {
            self.surface.destroy();
            self.has_surface = false;
        }

        let decorated = self.config.decoration;
        let vsync = self.video.vsync;
        let mode = match self.surface.create(mode, decorated, vsync) {
            Ok(()) => *mode,
            Err(reason) => {
                warn!(
                    "can't set video mode {}x{}x{} ({reason}), trying {}x{}",
                    mode.width,
                    mode.height,
                    mode.depth,
                    VideoMode::SAFE.width,
                    VideoMode::SAFE.height
                );
                if let Err(reason) = self.surface.create(&VideoMode::SAFE, decorated, vsync) {
                    error!("can't set the fallback video mode: {reason}");
                    return Err(DisplayError::VideoMode {
                        width: mode.width,
                        height: mode.height,
                        reason,
                    });
                }
                VideoMode::SAFE
            }
        };
        self.has_surface = true;
        self.device.reset_state();

        let (width, height) = self.surface.size();
        self.resize_screen(width, height)?;
        self.rebuild_render_state()?;

        self.scheduler.unregister(POLL_INPUT_CLOCK);
        self.scheduler
            .register_periodic(POLL_INPUT_CLOCK, POLL_INPUT_PERIOD);

        let physical = self
            .surface
            .physical_refresh_rate()
            .unwrap_or(mode.refresh_rate);
        let target = if mode.refresh_rate == 0 {
            self.config.refresh_rate
        } else {
            mode.refresh_rate
        };
        self.video.refresh_rate =
            negotiate_refresh_rate(physical, &self.surface.refresh_divisors(), target);
        self.video.mode = VideoMode {
            width,
            height,
            ..mode
        };

        self.events
            .publish(DisplayEvent::VideoModeChanged { width, height });
        info!(
            "video mode {width}x{height}x{} {} at {} Hz",
            mode.depth,
            if mode.fullscreen { "fullscreen" } else { "windowed" },
            self.video.refresh_rate
        );
        Ok(())
    }

    /// React to an engine or platform lifecycle event.
    ///
    /// # Errors
    ///
    /// Fails when the recreated surface cannot be set up for drawing.
    pub fn handle_lifecycle(&mut self, event: LifecycleEvent) -> Result<()> {
        self.ensure_ready()?;
        match event {
            LifecycleEvent::RenderStop => {
                if !self.has_surface {
                    self.surface.pump_events();
                }
            }
            LifecycleEvent::Surface(SurfaceEvent::Created { width, height }) => {
                info!("surface created ({width}x{height})");
                self.has_surface = true;
                self.events.unsubscribe(EventKind::RenderStop);
                self.device.reset_state();
                self.resize_screen(width, height)?;
                self.rebuild_render_state()?;
            }
            LifecycleEvent::Surface(SurfaceEvent::Destroyed) => {
                info!("surface destroyed");
                self.discard_batch();
                self.has_surface = false;
                self.events.subscribe(EventKind::RenderStop);
            }
            LifecycleEvent::Surface(SurfaceEvent::Resized { width, height }) => {
                info!("surface resized to {width}x{height}");
                self.flush();
                self.resize_screen(width, height)?;
                self.rebuild_render_state()?;
                self.video.mode.width = width;
                self.video.mode.height = height;
                self.events
                    .publish(DisplayEvent::VideoModeChanged { width, height });
            }
        }
        Ok(())
    }

    /// Give the screen bitmap a new size and a matching capture texture.
    fn resize_screen(&mut self, width: u32, height: u32) -> Result<()> {
        let screen = self.screen;
        let real = real_size(width, height, self.caps.npot);
        if let Some(old) = self.bitmap(screen)?.texture {
            self.state.units.purge(screen);
            self.device.delete_texture(old);
        }

        let smoothing = self.bitmap(screen)?.smoothing();
        let texture = match self.device.create_texture(real[0], real[1], smoothing, None) {
            Ok(texture) => Some(texture),
            Err(e) => {
                warn!("no capture texture for the {width}x{height} screen: {e}");
                None
            }
        };
        let bitmap = self.bitmap_mut(screen)?;
        bitmap.texture = texture;
        bitmap.resize([width, height], real);
        debug!("screen is {width}x{height} ({}x{} stored)", real[0], real[1]);
        Ok(())
    }

    /// Forget cached device state and target the screen again.
    fn rebuild_render_state(&mut self) -> Result<()> {
        self.state.invalidate();
        self.destinations = vec![self.screen];
        self.device.bind_render_targets(&[])?;
        self.apply_destination();
        self.set_builtin_uniforms();
        Ok(())
    }

    /// Process window events. Called by the engine through
    /// [`POLL_INPUT_CLOCK`].
    pub fn poll_input(&mut self) {
        if self.has_surface {
            self.surface.pump_events();
        }
    }

    /// Turn vertical sync on or off.
    ///
    /// # Errors
    ///
    /// Fails when the platform cannot change it, or after shutdown.
    pub fn enable_vsync(&mut self, enable: bool) -> Result<()> {
        self.ensure_ready()?;
        if let Err(e) = self.surface.set_vsync(enable) {
            warn!("vsync is not available on this platform: {e}");
            return Err(e);
        }
        self.video.vsync = enable;
        Ok(())
    }

    /// Whether vertical sync is on.
    #[must_use]
    pub fn is_vsync_enabled(&self) -> bool {
        self.video.vsync
    }

    /// Switch between fullscreen and windowed, keeping the current size.
    ///
    /// # Errors
    ///
    /// See [`set_video_mode`](Self::set_video_mode).
    pub fn set_fullscreen(&mut self, fullscreen: bool) -> Result<()> {
        if self.video.mode.fullscreen == fullscreen {
            return Ok(());
        }
        let mode = VideoMode {
            fullscreen,
            ..self.video.mode
        };
        self.set_video_mode(&mode)
    }

    /// Whether the window is fullscreen.
    #[must_use]
    pub fn is_fullscreen(&self) -> bool {
        self.video.mode.fullscreen
    }

    /// The mode in use, with the actual surface size.
    #[must_use]
    pub fn current_video_mode(&self) -> VideoMode {
        self.video.mode
    }

    /// Negotiated refresh rate in Hz.
    #[must_use]
    pub fn refresh_rate(&self) -> u32 {
        self.video.refresh_rate
    }

    /// Number of modes the hardware offers.
    #[must_use]
    pub fn video_mode_count(&self) -> usize {
        self.surface.video_modes().len()
    }

    /// Hardware mode by index.
    #[must_use]
    pub fn video_mode(&self, index: usize) -> Option<VideoMode> {
        self.surface.video_modes().get(index).copied()
    }

    /// Whether the hardware offers `mode`. A zero refresh rate matches any
    /// rate; the fullscreen flag is ignored.
    #[must_use]
    pub fn is_video_mode_available(&self, mode: &VideoMode) -> bool {
        self.surface.video_modes().iter().any(|available| {
            available.width == mode.width
                && available.height == mode.height
                && available.depth == mode.depth
                && (mode.refresh_rate == 0 || available.refresh_rate == mode.refresh_rate)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::testing::{FakeSurface, TestDisplay};
    use crate::types::{BlendMode, DisplayTransform, Rgba, Smoothing};

    fn mode(width: u32, height: u32) -> VideoMode {
        VideoMode {
            width,
            height,
            ..VideoMode::SAFE
        }
    }

    #[test]
    fn refresh_negotiation() {
        assert_eq!(negotiate_refresh_rate(120, &[1, 2, 4], 60), 60);
        assert_eq!(negotiate_refresh_rate(120, &[1, 2, 4], 90), 60);
        assert_eq!(negotiate_refresh_rate(120, &[1, 2, 4], 200), 120);
        assert_eq!(negotiate_refresh_rate(120, &[1, 2], 20), 60);
        assert_eq!(negotiate_refresh_rate(90, &[], 60), 90);
        assert_eq!(negotiate_refresh_rate(90, &[0, 3], 60), 30);
    }

    #[test]
    fn startup_opens_the_configured_mode() {
        let t = TestDisplay::new();
        assert_eq!(t.display.screen_size(), (800, 600));
        assert_eq!(t.surface.state().created, [VideoMode::from_config(t.display.config())]);
        assert_eq!(
            t.scheduler.registered(),
            [(POLL_INPUT_CLOCK.to_owned(), POLL_INPUT_PERIOD)]
        );
        assert!(t.display.bitmap_texture(t.display.screen_bitmap()).unwrap().is_some());
    }

    #[test]
    fn mode_change_recreates_the_surface() {
        let mut t = TestDisplay::new();
        let bitmap = t.display.create_bitmap(8, 8).unwrap();
        t.display
            .draw_bitmap(
                bitmap,
                &DisplayTransform::default(),
                Rgba::WHITE,
                Smoothing::Default,
                BlendMode::Alpha,
            )
            .unwrap();
        let generation = t.display.state.projection_generation;

        t.display.set_video_mode(&mode(1024, 768)).unwrap();
        assert_eq!(t.device().draws().len(), 1);
        assert_eq!(t.surface.state().destroyed, 1);
        assert_eq!(t.display.screen_size(), (1024, 768));
        assert_eq!(t.display.current_video_mode().width, 1024);
        assert!(t.display.state.projection_generation > generation);
        assert_eq!(t.display.destination_bitmaps(), [t.display.screen_bitmap()]);
        assert_eq!(t.scheduler.registered().len(), 1);
        assert_eq!(
            t.events.drain(),
            [DisplayEvent::VideoModeChanged {
                width: 1024,
                height: 768
            }]
        );
    }

    #[test]
    fn failed_mode_falls_back_to_safe() {
        let mut t = TestDisplay::new();
        t.surface.state_mut().failing = 1;
        t.display.set_video_mode(&mode(4000, 3000)).unwrap();
        assert_eq!(t.display.current_video_mode(), VideoMode::SAFE);
        assert_eq!(t.display.screen_size(), (800, 600));
    }

    #[test]
    fn failed_fallback_is_an_error() {
        let mut t = TestDisplay::new();
        t.surface.state_mut().failing = 2;
        let result = t.display.set_video_mode(&mode(4000, 3000));
        assert!(matches!(
            result,
            Err(DisplayError::VideoMode {
                width: 4000,
                height: 3000,
                ..
            })
        ));
        assert!(!t.display.has_surface);
    }

    #[test]
    fn startup_fails_when_no_mode_works() {
        let surface = FakeSurface::default();
        surface.state_mut().failing = 2;
        assert!(TestDisplay::try_with_surface(DisplayConfig::default(), surface.clone()).is_err());
        assert!(!surface.state().open);
    }

    #[test]
    fn refresh_rate_follows_the_physical_display() {
        let surface = FakeSurface::default();
        {
            let mut state = surface.state_mut();
            state.physical_rate = Some(120);
            state.divisors = vec![1, 2];
        }
        let t = TestDisplay::try_with_surface(
            DisplayConfig {
                refresh_rate: 90,
                ..DisplayConfig::default()
            },
            surface,
        )
        .unwrap();
        assert_eq!(t.display.refresh_rate(), 60);
    }

    #[test]
    fn lost_surface_pumps_events_on_render_stop() {
        let mut t = TestDisplay::new();
        t.display
            .handle_lifecycle(LifecycleEvent::RenderStop)
            .unwrap();
        assert_eq!(t.surface.state().pumps, 0);

        t.display
            .handle_lifecycle(LifecycleEvent::Surface(SurfaceEvent::Destroyed))
            .unwrap();
        assert!(t.events.is_subscribed(EventKind::RenderStop));
        t.display
            .handle_lifecycle(LifecycleEvent::RenderStop)
            .unwrap();
        assert_eq!(t.surface.state().pumps, 1);

        t.display
            .handle_lifecycle(LifecycleEvent::Surface(SurfaceEvent::Created {
                width: 640,
                height: 480,
            }))
            .unwrap();
        assert!(!t.events.is_subscribed(EventKind::RenderStop));
        assert!(t.display.has_surface);
        assert_eq!(t.display.screen_size(), (640, 480));
        assert_eq!(t.display.state.units.occupant(0), None);
    }

    #[test]
    fn resize_reprojects_and_announces() {
        let mut t = TestDisplay::new();
        t.display
            .handle_lifecycle(LifecycleEvent::Surface(SurfaceEvent::Resized {
                width: 400,
                height: 300,
            }))
            .unwrap();
        assert_eq!(t.display.screen_size(), (400, 300));
        assert_eq!(
            t.events.drain(),
            [DisplayEvent::VideoModeChanged {
                width: 400,
                height: 300
            }]
        );
        assert_eq!(t.display.current_video_mode().width, 400);
    }

    #[test]
    fn vsync_unsupported_is_reported() {
        let mut t = TestDisplay::new();
        assert!(t.display.is_vsync_enabled());
        assert!(matches!(
            t.display.enable_vsync(false),
            Err(DisplayError::Unsupported(_))
        ));
        assert!(t.display.is_vsync_enabled());

        t.surface.state_mut().vsync_supported = true;
        t.display.enable_vsync(false).unwrap();
        assert!(!t.display.is_vsync_enabled());
    }

    #[test]
    fn fullscreen_toggle_sets_a_new_mode() {
        let mut t = TestDisplay::new();
        assert!(!t.display.is_fullscreen());
        t.display.set_fullscreen(true).unwrap();
        assert!(t.display.is_fullscreen());
        assert!(t.surface.state().created.last().unwrap().fullscreen);
        t.display.set_fullscreen(true).unwrap();
        assert_eq!(t.surface.state().created.len(), 2);
    }

    #[test]
    fn available_modes_come_from_the_surface() {
        let t = TestDisplay::new();
        t.surface.state_mut().modes = vec![
            mode(640, 480),
            VideoMode {
                refresh_rate: 75,
                ..mode(1024, 768)
            },
        ];
        assert_eq!(t.display.video_mode_count(), 2);
        assert_eq!(t.display.video_mode(0), Some(mode(640, 480)));
        assert_eq!(t.display.video_mode(2), None);
        assert!(t.display.is_video_mode_available(&VideoMode {
            refresh_rate: 0,
            ..mode(1024, 768)
        }));
        assert!(!t.display.is_video_mode_available(&mode(1024, 768)));
    }

    #[test]
    fn input_is_polled_only_with_a_surface() {
        let mut t = TestDisplay::new();
        t.display.poll_input();
        assert_eq!(t.surface.state().pumps, 1);
    }
}
