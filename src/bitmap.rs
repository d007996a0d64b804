//! Bitmap pool: creation, loading, deletion and per-bitmap state.

use std::path::Path;
use std::sync::Arc;

use bitflags::bitflags;
use log::{debug, info, warn};

use crate::decode::{decode_image_or_placeholder, DecodeJob, Pixels};
use crate::device::{GraphicsDevice, TextureId};
use crate::display::Display;
use crate::error::{DisplayError, Result};
use crate::ktx::KtxImage;
use crate::resource::TEXTURE_GROUP;
use crate::types::{CharacterMap, ClipRect, Rgba};

slotmap::new_key_type! {
    /// Handle to a bitmap owned by a [`Display`].
    pub struct BitmapHandle;
}

bitflags! {
    /// Independent per-bitmap state bits.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BitmapFlags: u8 {
        /// An asynchronous decode is in flight; the bitmap shows placeholder
        /// pixels.
        const LOADING = 1;
        /// Deletion was requested while loading.
        const DELETE_PENDING = 1 << 1;
        /// The texture uses linear filtering.
        const SMOOTHING = 1 << 2;
    }
}

/// Inset, in texels, applied to texture coordinates of padded bitmaps so
/// linear filtering never samples the padding.
pub const BORDER_FIX: f32 = 0.1;

/// Bit depth of every bitmap.
pub const BITMAP_DEPTH: u32 = 32;

/// A GPU texture plus its logical view.
#[derive(Clone, Debug)]
pub(crate) struct Bitmap {
    pub(crate) texture: Option<TextureId>,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) real_width: u32,
    pub(crate) real_height: u32,
    pub(crate) recip_real: [f32; 2],
    pub(crate) border_fix: f32,
    pub(crate) flags: BitmapFlags,
    pub(crate) color: Rgba,
    pub(crate) clip: ClipRect,
    pub(crate) characters: Option<Arc<CharacterMap>>,
}

impl Bitmap {
    pub(crate) fn new(
        texture: Option<TextureId>,
        [width, height]: [u32; 2],
        [real_width, real_height]: [u32; 2],
        smoothing: bool,
    ) -> Self {
        let mut bitmap = Self {
            texture,
            width: 0,
            height: 0,
            real_width: 0,
            real_height: 0,
            recip_real: [1.0, 1.0],
            border_fix: 0.0,
            flags: BitmapFlags::empty(),
            color: Rgba::WHITE,
            clip: ClipRect::default(),
            characters: None,
        };
        bitmap.flags.set(BitmapFlags::SMOOTHING, smoothing);
        bitmap.resize([width, height], [real_width, real_height]);
        bitmap
    }

    /// Update dimensions and everything derived from them. The clip is reset
    /// to the whole bitmap.
    #[expect(clippy::cast_precision_loss)]
    pub(crate) fn resize(&mut self, [width, height]: [u32; 2], [real_width, real_height]: [u32; 2]) {
        self.width = width;
        self.height = height;
        self.real_width = real_width.max(1);
        self.real_height = real_height.max(1);
        self.recip_real = [
            1.0 / self.real_width as f32,
            1.0 / self.real_height as f32,
        ];
        self.border_fix = if [width, height] == [real_width, real_height] {
            0.0
        } else {
            BORDER_FIX
        };
        self.clip = ClipRect::full(width, height);
    }

    /// A stand-in sharing `self`'s texture and metrics while the real pixels
    /// decode.
    fn placeholder(&self) -> Self {
        Self {
            flags: (self.flags & BitmapFlags::SMOOTHING) | BitmapFlags::LOADING,
            color: Rgba::WHITE,
            characters: None,
            ..self.clone()
        }
    }

    pub(crate) fn is_loading(&self) -> bool {
        self.flags.contains(BitmapFlags::LOADING)
    }

    pub(crate) fn smoothing(&self) -> bool {
        self.flags.contains(BitmapFlags::SMOOTHING)
    }
}

/// Storage size for a `width`×`height` bitmap: next powers of two unless the
/// device handles other sizes.
pub(crate) fn real_size(width: u32, height: u32, npot: bool) -> [u32; 2] {
    if npot {
        [width, height]
    } else {
        [width.next_power_of_two(), height.next_power_of_two()]
    }
}

fn is_ktx(location: &str) -> bool {
    Path::new(location)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("ktx"))
}

impl<D: GraphicsDevice> Display<D> {
    pub(crate) fn bitmap(&self, handle: BitmapHandle) -> Result<&Bitmap> {
        self.bitmaps.get(handle).ok_or(DisplayError::InvalidHandle)
    }

    pub(crate) fn bitmap_mut(&mut self, handle: BitmapHandle) -> Result<&mut Bitmap> {
        self.bitmaps.get_mut(handle).ok_or(DisplayError::InvalidHandle)
    }

    /// Allocate a blank `width`×`height` bitmap.
    ///
    /// # Errors
    ///
    /// Fails on an empty or oversized request, or when the device cannot
    /// allocate the texture.
    pub fn create_bitmap(&mut self, width: u32, height: u32) -> Result<BitmapHandle> {
        self.ensure_ready()?;
        let real = self.checked_real_size(width, height)?;
        let smoothing = self.config.smoothing;
        let texture = self.device.create_texture(real[0], real[1], smoothing, None)?;
        Ok(self
            .bitmaps
            .insert(Bitmap::new(Some(texture), [width, height], real, smoothing)))
    }

    fn checked_real_size(&self, width: u32, height: u32) -> Result<[u32; 2]> {
        if width == 0 || height == 0 {
            return Err(DisplayError::Device(format!("cannot create a {width}x{height} bitmap")));
        }
        let real = real_size(width, height, self.caps.npot);
        let max = self.caps.max_texture_size;
        if real[0] > max || real[1] > max {
            warn!("bitmap {width}x{height} exceeds the maximum texture size {max}");
            return Err(DisplayError::Device(format!(
                "{width}x{height} exceeds the {max} texture size limit"
            )));
        }
        Ok(real)
    }

    /// Upload decoded pixels into a new texture, padding to the real size.
    pub(crate) fn upload_pixels(&mut self, pixels: &Pixels, smoothing: bool) -> Result<Bitmap> {
        let real = self.checked_real_size(pixels.width, pixels.height)?;
        let texture = if real == [pixels.width, pixels.height] {
            self.device
                .create_texture(real[0], real[1], smoothing, Some(&pixels.data))?
        } else {
            let texture = self.device.create_texture(real[0], real[1], smoothing, None)?;
            if let Err(e) = self.device.upload_sub_texture(
                texture,
                0,
                0,
                pixels.width,
                pixels.height,
                &pixels.data,
            ) {
                self.device.delete_texture(texture);
                return Err(e);
            }
            texture
        };
        Ok(Bitmap::new(
            Some(texture),
            [pixels.width, pixels.height],
            real,
            smoothing,
        ))
    }

    pub(crate) fn read_resource(&self, location: &str) -> Result<Vec<u8>> {
        self.resources.read(location).map_err(|source| {
            warn!("failed to read `{location}`: {source}");
            DisplayError::Io {
                location: location.to_owned(),
                source,
            }
        })
    }

    /// Load an image by resource name.
    ///
    /// `.ktx` files are always uploaded synchronously. Other images decode
    /// synchronously when no temp bitmap is set; otherwise the returned
    /// bitmap borrows the temp bitmap's texture and size until
    /// [`update`](Self::update) delivers the decoded pixels and publishes
    /// [`DisplayEvent::BitmapLoaded`](crate::DisplayEvent::BitmapLoaded).
    ///
    /// # Errors
    ///
    /// Fails when the name cannot be located or read, or when the texture
    /// cannot be created. Undecodable images become 1×1 transparent bitmaps
    /// instead of failing.
    pub fn load_bitmap(&mut self, name: &str) -> Result<BitmapHandle> {
        self.ensure_ready()?;
        let Some(location) = self.resources.locate(TEXTURE_GROUP, name) else {
            warn!("can't locate bitmap `{name}`");
            return Err(DisplayError::ResourceNotFound(name.to_owned()));
        };

        if is_ktx(&location) {
            return self.load_ktx(&location);
        }

        if let Some(temp) = self.temp_bitmap {
            let handle = self.create_placeholder(temp)?;
            debug!("decoding `{location}` asynchronously");
            self.runner
                .submit(DecodeJob::image(handle, location, Arc::clone(&self.resources)));
            return Ok(handle);
        }

        let bytes = self.read_resource(&location)?;
        let (pixels, _) = decode_image_or_placeholder(&location, &bytes);
        let bitmap = self.upload_pixels(&pixels, self.config.smoothing)?;
        Ok(self.bitmaps.insert(bitmap))
    }

    /// Allocate a loading bitmap that borrows `temp`'s texture and metrics.
    pub(crate) fn create_placeholder(&mut self, temp: BitmapHandle) -> Result<BitmapHandle> {
        let placeholder = self.bitmap(temp)?.placeholder();
        Ok(self.bitmaps.insert(placeholder))
    }

    fn load_ktx(&mut self, location: &str) -> Result<BitmapHandle> {
        let bytes = self.read_resource(location)?;
        let image = KtxImage::parse(&bytes).inspect_err(|e| warn!("`{location}`: {e}"))?;
        let header = image.header;
        let size = [header.pixel_width, header.pixel_height];
        let smoothing = self.config.smoothing;

        let texture = if header.is_compressed() {
            let texture = self.device.create_compressed_texture(
                size[0],
                size[1],
                header.gl_internal_format,
                image.data,
            )?;
            self.device.set_texture_smoothing(texture, smoothing);
            texture
        } else {
            let expected = size[0] as usize * size[1] as usize * 4;
            if image.data.len() != expected {
                return Err(DisplayError::InvalidKtx(format!(
                    "expected {expected} bytes of RGBA data, got {}",
                    image.data.len()
                )));
            }
            self.device
                .create_texture(size[0], size[1], smoothing, Some(image.data))?
        };

        debug!(
            "loaded `{location}` ({}x{}, internal format {:#x})",
            size[0], size[1], header.gl_internal_format
        );
        Ok(self
            .bitmaps
            .insert(Bitmap::new(Some(texture), size, size, smoothing)))
    }

    /// Delete a bitmap. A loading bitmap is only flagged and gets freed once
    /// its decode completes. Deleting the temp bitmap keeps its texture alive
    /// until every load still showing it has completed. The screen bitmap is
    /// never deleted.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle.
    pub fn delete_bitmap(&mut self, handle: BitmapHandle) -> Result<()> {
        if handle == self.screen {
            debug!("ignoring deletion of the screen bitmap");
            return Ok(());
        }
        let bitmap = self.bitmap_mut(handle)?;
        if bitmap.is_loading() {
            bitmap.flags.insert(BitmapFlags::DELETE_PENDING);
            return Ok(());
        }

        self.flush_if_queued(handle);
        if self.temp_bitmap == Some(handle) {
            self.temp_bitmap = None;
        }
        if self.state.last_bitmap == Some(handle) {
            self.state.last_bitmap = None;
        }
        self.state.units.purge(handle);
        self.unbind_from_shaders(handle);

        if let Some(bitmap) = self.bitmaps.remove(handle) {
            if let Some(texture) = bitmap.texture {
                if self.texture_in_use(texture) {
                    debug!("keeping texture {} until its loading bitmaps finish", texture.0);
                    self.orphaned_textures.push(texture);
                } else {
                    self.device.delete_texture(texture);
                }
            }
        }
        Ok(())
    }

    fn texture_in_use(&self, texture: TextureId) -> bool {
        self.bitmaps.values().any(|b| b.texture == Some(texture))
    }

    /// Delete textures of removed bitmaps once no loading bitmap shows them
    /// anymore.
    pub(crate) fn release_orphaned_textures(&mut self) {
        let bitmaps = &self.bitmaps;
        let device = &mut self.device;
        self.orphaned_textures.retain(|&texture| {
            let in_use = bitmaps.values().any(|b| b.texture == Some(texture));
            if !in_use {
                device.delete_texture(texture);
            }
            in_use
        });
    }

    /// Set the sub-rectangle drawn from a bitmap. When the bitmap is the
    /// primary destination the scissor follows, after flushing.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle.
    pub fn set_bitmap_clipping(
        &mut self,
        handle: BitmapHandle,
        tl_x: u32,
        tl_y: u32,
        br_x: u32,
        br_y: u32,
    ) -> Result<()> {
        let clip = ClipRect {
            tl_x,
            tl_y,
            br_x,
            br_y,
        };
        if self.bitmap(handle)?.clip == clip {
            return Ok(());
        }
        let is_destination = self.destinations.first() == Some(&handle);
        if is_destination {
            self.flush();
        }
        self.bitmap_mut(handle)?.clip = clip;
        if is_destination {
            self.apply_scissor();
        }
        Ok(())
    }

    /// Clip rectangle exactly as last set.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle.
    pub fn bitmap_clipping(&self, handle: BitmapHandle) -> Result<ClipRect> {
        Ok(self.bitmap(handle)?.clip)
    }

    /// Install (or with `None`, remove) the placeholder used while bitmaps
    /// decode asynchronously.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle or the screen bitmap.
    pub fn set_temp_bitmap(&mut self, handle: Option<BitmapHandle>) -> Result<()> {
        if let Some(handle) = handle {
            if handle == self.screen {
                return Err(DisplayError::ScreenSource);
            }
            self.bitmap(handle)?;
        }
        self.temp_bitmap = handle;
        Ok(())
    }

    /// The placeholder used for asynchronous loads, if any.
    #[must_use]
    pub fn temp_bitmap(&self) -> Option<BitmapHandle> {
        self.temp_bitmap
    }

    /// Logical size. A loading bitmap reports the placeholder's size.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle.
    pub fn bitmap_size(&self, handle: BitmapHandle) -> Result<(u32, u32)> {
        let bitmap = self.bitmap(handle)?;
        Ok((bitmap.width, bitmap.height))
    }

    /// Storage size (including padding).
    ///
    /// # Errors
    ///
    /// Fails on a stale handle.
    pub fn bitmap_real_size(&self, handle: BitmapHandle) -> Result<(u32, u32)> {
        let bitmap = self.bitmap(handle)?;
        Ok((bitmap.real_width, bitmap.real_height))
    }

    /// Device texture backing a bitmap.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle.
    pub fn bitmap_texture(&self, handle: BitmapHandle) -> Result<Option<TextureId>> {
        Ok(self.bitmap(handle)?.texture)
    }

    /// Flags of a bitmap.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle.
    pub fn bitmap_flags(&self, handle: BitmapHandle) -> Result<BitmapFlags> {
        Ok(self.bitmap(handle)?.flags)
    }

    /// Whether an asynchronous decode is still pending for the bitmap.
    #[must_use]
    pub fn is_loading(&self, handle: BitmapHandle) -> bool {
        self.bitmaps.get(handle).is_some_and(Bitmap::is_loading)
    }

    /// Set the tint multiplied into every draw of the bitmap.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle.
    pub fn set_bitmap_color(&mut self, handle: BitmapHandle, color: Rgba) -> Result<()> {
        self.bitmap_mut(handle)?.color = color;
        Ok(())
    }

    /// The bitmap tint.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle.
    pub fn bitmap_color(&self, handle: BitmapHandle) -> Result<Rgba> {
        Ok(self.bitmap(handle)?.color)
    }

    /// Replace the pixels of a bitmap with `width * height * 4` bytes of
    /// RGBA, top row first.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle, the screen bitmap, or a size mismatch.
    pub fn set_bitmap_data(&mut self, handle: BitmapHandle, data: &[u8]) -> Result<()> {
        if handle == self.screen {
            warn!("the screen bitmap cannot be written directly");
            return Err(DisplayError::ScreenSource);
        }
        let bitmap = self.bitmap(handle)?;
        let expected = bitmap.width as usize * bitmap.height as usize * 4;
        if data.len() != expected {
            return Err(DisplayError::DataSize {
                expected,
                actual: data.len(),
            });
        }
        let (width, height) = (bitmap.width, bitmap.height);
        let Some(texture) = bitmap.texture else {
            return Err(DisplayError::InvalidHandle);
        };

        self.flush_if_queued(handle);
        self.device
            .upload_sub_texture(texture, 0, 0, width, height, data)
    }

    /// Read back the logical pixels of a bitmap as RGBA, top row first.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle, the screen bitmap, or when the device cannot
    /// read textures back.
    pub fn bitmap_data(&mut self, handle: BitmapHandle) -> Result<Vec<u8>> {
        if handle == self.screen {
            warn!("the screen bitmap cannot be read back");
            return Err(DisplayError::ScreenSource);
        }
        let bitmap = self.bitmap(handle)?;
        let (width, height) = (bitmap.width as usize, bitmap.height as usize);
        let (real_width, real_height) = (bitmap.real_width, bitmap.real_height);
        let Some(texture) = bitmap.texture else {
            return Err(DisplayError::InvalidHandle);
        };

        self.flush();
        let full = self.device.read_texture(texture, real_width, real_height)?;
        let stride = real_width as usize * 4;
        Ok(full
            .chunks_exact(stride)
            .take(height)
            .flat_map(|row| &row[..width * 4])
            .copied()
            .collect())
    }

    /// Write a bitmap to an image file, the format following the extension.
    ///
    /// # Errors
    ///
    /// Fails when the pixels cannot be read back or encoded.
    pub fn save_bitmap(&mut self, handle: BitmapHandle, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let (width, height) = self.bitmap_size(handle)?;
        let data = self.bitmap_data(handle)?;
        let image = image::RgbaImage::from_raw(width, height, data)
            .ok_or_else(|| DisplayError::ImageEncode("pixel buffer size mismatch".into()))?;
        image.save(path).map_err(|e| {
            warn!("can't save bitmap to `{}`: {e}", path.display());
            DisplayError::ImageEncode(e.to_string())
        })?;
        info!("saved {width}x{height} bitmap to `{}`", path.display());
        Ok(())
    }

    /// Color keying is not available on this backend.
    ///
    /// # Errors
    ///
    /// Always fails with [`DisplayError::Unsupported`].
    pub fn set_bitmap_color_key(
        &mut self,
        _handle: BitmapHandle,
        _color: Rgba,
        _enable: bool,
    ) -> Result<()> {
        warn!("color keys are not available on this platform");
        Err(DisplayError::Unsupported("bitmap color keys"))
    }

    /// Clear a bitmap (or the screen) to `color`, respecting its clip.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle or when the bitmap cannot be made a render
    /// target.
    pub fn clear_bitmap(&mut self, handle: BitmapHandle, color: Rgba) -> Result<()> {
        self.bitmap(handle)?;
        if self.destinations.as_slice() == [handle] {
            self.flush();
            self.device.clear(color);
            return Ok(());
        }

        let previous = self.destinations.clone();
        self.set_destination_bitmaps(&[handle])?;
        self.device.clear(color);
        self.set_destination_bitmaps(&previous)
    }

    /// The bitmap standing for the window surface.
    #[must_use]
    pub fn screen_bitmap(&self) -> BitmapHandle {
        self.screen
    }

    /// Current surface size.
    #[must_use]
    pub fn screen_size(&self) -> (u32, u32) {
        self.bitmaps
            .get(self.screen)
            .map_or((0, 0), |screen| (screen.width, screen.height))
    }

    /// Glyph map baked with a font bitmap, once it has finished loading.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle.
    pub fn character_map(&self, font: BitmapHandle) -> Result<Option<Arc<CharacterMap>>> {
        Ok(self.bitmap(font)?.characters.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{png_bytes, TestDisplay};
    use crate::DisplayEvent;

    #[test]
    fn real_size_pads_to_powers_of_two() {
        assert_eq!(real_size(100, 64, false), [128, 64]);
        assert_eq!(real_size(100, 64, true), [100, 64]);
        assert_eq!(real_size(1, 1, false), [1, 1]);
    }

    #[test]
    fn padded_bitmaps_get_a_border_fix() {
        let padded = Bitmap::new(None, [100, 64], [128, 64], false);
        assert!((padded.border_fix - BORDER_FIX).abs() < f32::EPSILON);
        assert!((padded.recip_real[0] - 1.0 / 128.0).abs() < f32::EPSILON);

        let exact = Bitmap::new(None, [64, 64], [64, 64], true);
        assert!(exact.border_fix.abs() < f32::EPSILON);
        assert!(exact.smoothing());
        assert_eq!(exact.clip, ClipRect::full(64, 64));
        assert_eq!(exact.color, Rgba::WHITE);
    }

    #[test]
    fn ktx_extension_is_case_insensitive() {
        assert!(is_ktx("textures/atlas.KTX"));
        assert!(is_ktx("a.ktx"));
        assert!(!is_ktx("a.ktx.png"));
    }

    #[test]
    fn created_bitmaps_have_defaults() {
        let mut t = TestDisplay::new();
        let b = t.display.create_bitmap(100, 50).unwrap();

        assert_eq!(t.display.bitmap_size(b).unwrap(), (100, 50));
        assert_eq!(t.display.bitmap_real_size(b).unwrap(), (128, 64));
        assert_eq!(t.display.bitmap_clipping(b).unwrap(), ClipRect::full(100, 50));
        assert_eq!(t.display.bitmap_color(b).unwrap(), Rgba::WHITE);
        assert!(!t.display.is_loading(b));
    }

    #[test]
    fn clipping_round_trips_unmodified() {
        let mut t = TestDisplay::new();
        let b = t.display.create_bitmap(64, 64).unwrap();
        t.display.set_bitmap_clipping(b, 3, 70, 1, 2).unwrap();
        assert_eq!(
            t.display.bitmap_clipping(b).unwrap(),
            ClipRect {
                tl_x: 3,
                tl_y: 70,
                br_x: 1,
                br_y: 2
            }
        );
    }

    #[test]
    fn deleting_frees_texture_and_handle() {
        let mut t = TestDisplay::new();
        let b = t.display.create_bitmap(8, 8).unwrap();
        let texture = t.display.bitmap_texture(b).unwrap().unwrap();
        t.display.delete_bitmap(b).unwrap();

        assert!(t.device().deleted_textures().contains(&texture));
        assert!(matches!(
            t.display.bitmap_size(b),
            Err(DisplayError::InvalidHandle)
        ));
        assert!(t.display.delete_bitmap(b).is_err());
    }

    #[test]
    fn screen_is_never_deleted() {
        let mut t = TestDisplay::new();
        let screen = t.display.screen_bitmap();
        t.display.delete_bitmap(screen).unwrap();
        assert_eq!(t.display.bitmap_size(screen).unwrap(), (800, 600));
    }

    #[test]
    fn missing_resources_fail_to_load() {
        let mut t = TestDisplay::new();
        assert!(matches!(
            t.display.load_bitmap("nowhere.png"),
            Err(DisplayError::ResourceNotFound(_))
        ));
    }

    #[test]
    fn synchronous_load_decodes_immediately() {
        let mut t = TestDisplay::with_files(&[("hero.png", png_bytes(5, 3))]);
        let b = t.display.load_bitmap("hero.png").unwrap();
        assert!(!t.display.is_loading(b));
        assert_eq!(t.display.bitmap_size(b).unwrap(), (5, 3));
        assert_eq!(t.display.bitmap_real_size(b).unwrap(), (8, 4));
        assert!(t.events.drain().is_empty());
    }

    #[test]
    fn undecodable_images_fall_back_to_one_pixel() {
        let mut t = TestDisplay::with_files(&[("broken.png", b"not an image".to_vec())]);
        let b = t.display.load_bitmap("broken.png").unwrap();
        assert_eq!(t.display.bitmap_size(b).unwrap(), (1, 1));
    }

    #[test]
    fn data_round_trips_through_the_device() {
        let mut t = TestDisplay::new();
        let b = t.display.create_bitmap(3, 2).unwrap();
        let data: Vec<u8> = (0..24).collect();
        t.display.set_bitmap_data(b, &data).unwrap();
        assert_eq!(t.display.bitmap_data(b).unwrap(), data);

        assert!(matches!(
            t.display.set_bitmap_data(b, &data[..4]),
            Err(DisplayError::DataSize {
                expected: 24,
                actual: 4
            })
        ));
    }

    #[test]
    fn color_key_is_unsupported() {
        let mut t = TestDisplay::new();
        let b = t.display.create_bitmap(4, 4).unwrap();
        assert!(matches!(
            t.display.set_bitmap_color_key(b, Rgba::BLACK, true),
            Err(DisplayError::Unsupported(_))
        ));
    }

    #[test]
    fn async_load_reports_placeholder_size_until_loaded() {
        let mut t = TestDisplay::with_files(&[("big.png", png_bytes(40, 20))]);
        let temp = t.display.create_bitmap(2, 2).unwrap();
        t.display.set_temp_bitmap(Some(temp)).unwrap();

        let b = t.display.load_bitmap("big.png").unwrap();
        assert!(t.display.is_loading(b));
        assert_eq!(t.display.bitmap_size(b).unwrap(), (2, 2));
        assert_eq!(
            t.display.bitmap_texture(b).unwrap(),
            t.display.bitmap_texture(temp).unwrap()
        );

        assert_eq!(t.display.update(), 1);
        assert!(!t.display.is_loading(b));
        assert_eq!(t.display.bitmap_size(b).unwrap(), (40, 20));

        let events = t.events.drain();
        assert_eq!(events.len(), 1);
        let DisplayEvent::BitmapLoaded {
            bitmap, texture, ..
        } = &events[0]
        else {
            panic!("unexpected event {:?}", events[0]);
        };
        assert_eq!(*bitmap, b);
        assert_eq!(*texture, t.display.bitmap_texture(b).unwrap());
    }

    #[test]
    fn delete_while_loading_frees_after_the_event() {
        let mut t = TestDisplay::with_files(&[("late.png", png_bytes(4, 4))]);
        let temp = t.display.create_bitmap(2, 2).unwrap();
        t.display.set_temp_bitmap(Some(temp)).unwrap();
        let temp_texture = t.display.bitmap_texture(temp).unwrap().unwrap();

        let b = t.display.load_bitmap("late.png").unwrap();
        t.display.delete_bitmap(b).unwrap();
        assert!(t.display.bitmap_size(b).is_ok());
        assert!(t
            .display
            .bitmap_flags(b)
            .unwrap()
            .contains(BitmapFlags::DELETE_PENDING));
        assert!(t.device().deleted_textures().is_empty());

        t.display.update();
        assert_eq!(t.events.drain().len(), 1);
        assert!(t.display.bitmap_size(b).is_err());
        let deleted = t.device().deleted_textures();
        assert_eq!(deleted.len(), 1);
        assert_ne!(deleted[0], temp_texture);
    }

    #[test]
    fn oversized_async_load_gets_its_own_fallback_texture() {
        let mut t = TestDisplay::with_config(
            crate::DisplayConfig {
                max_texture_size: Some(16),
                ..crate::DisplayConfig::default()
            },
            &[("huge.png", png_bytes(64, 64))],
        );
        let temp = t.display.create_bitmap(2, 2).unwrap();
        t.display.set_temp_bitmap(Some(temp)).unwrap();
        let temp_texture = t.display.bitmap_texture(temp).unwrap().unwrap();

        let b = t.display.load_bitmap("huge.png").unwrap();
        assert_eq!(t.display.update(), 1);
        assert!(!t.display.is_loading(b));
        assert_eq!(t.display.bitmap_size(b).unwrap(), (1, 1));
        let texture = t.display.bitmap_texture(b).unwrap().unwrap();
        assert_ne!(texture, temp_texture);
        assert!(matches!(
            t.events.drain()[..],
            [DisplayEvent::BitmapLoaded { texture: None, .. }]
        ));

        t.display.delete_bitmap(b).unwrap();
        assert_eq!(t.device().deleted_textures(), [texture]);
        assert_eq!(t.display.bitmap_texture(temp).unwrap(), Some(temp_texture));
    }

    #[test]
    fn deleting_the_temp_bitmap_waits_for_pending_loads() {
        let mut t = TestDisplay::with_files(&[("slow.png", png_bytes(4, 4))]);
        let temp = t.display.create_bitmap(2, 2).unwrap();
        t.display.set_temp_bitmap(Some(temp)).unwrap();
        let temp_texture = t.display.bitmap_texture(temp).unwrap().unwrap();

        let b = t.display.load_bitmap("slow.png").unwrap();
        t.display.delete_bitmap(temp).unwrap();
        assert_eq!(t.display.temp_bitmap(), None);
        assert!(t.device().deleted_textures().is_empty());
        assert_eq!(t.display.bitmap_texture(b).unwrap(), Some(temp_texture));

        t.display.update();
        assert_eq!(t.device().deleted_textures(), [temp_texture]);
        assert_ne!(t.display.bitmap_texture(b).unwrap(), Some(temp_texture));
    }

    #[test]
    fn shutdown_frees_a_shared_temp_texture_once() {
        let mut t = TestDisplay::with_files(&[("slow.png", png_bytes(4, 4))]);
        let temp = t.display.create_bitmap(2, 2).unwrap();
        t.display.set_temp_bitmap(Some(temp)).unwrap();
        let temp_texture = t.display.bitmap_texture(temp).unwrap().unwrap();

        t.display.load_bitmap("slow.png").unwrap();
        t.display.delete_bitmap(temp).unwrap();
        t.display.shutdown();

        let deleted = t.device().deleted_textures();
        assert_eq!(deleted.iter().filter(|&&d| d == temp_texture).count(), 1);
    }
}
