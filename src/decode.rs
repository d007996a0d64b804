//! Off-thread decoding of images and fonts, and the completion step that
//! turns decoded pixels into textures on the owning thread.

use std::collections::HashMap;
use std::sync::Arc;

use image::ImageFormat;
use log::{debug, error, warn};

use crate::bitmap::{BitmapFlags, BitmapHandle};
use crate::device::GraphicsDevice;
use crate::display::Display;
use crate::error::{DisplayError, Result};
use crate::events::{location_id, DisplayEvent};
use crate::font::{rasterize_font, FontAtlas, FontRequest};
use crate::resource::{ResourceLocator, FONT_GROUP};
use crate::types::CharacterMap;

const QOI_MAGIC: &[u8; 4] = b"qoif";

/// Decoded RGBA8 pixels, top row first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Pixels {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) data: Vec<u8>,
}

impl Pixels {
    /// A single transparent pixel standing in for an undecodable image.
    pub(crate) fn placeholder() -> Self {
        Self {
            width: 1,
            height: 1,
            data: vec![0; 4],
        }
    }
}

/// Decode an image, preferring the QOI decoder when the magic matches.
pub(crate) fn decode_image(bytes: &[u8]) -> Result<Pixels> {
    let image = if bytes.starts_with(QOI_MAGIC) {
        image::load_from_memory_with_format(bytes, ImageFormat::Qoi)
    } else {
        image::load_from_memory(bytes)
    }
    .map_err(|e| DisplayError::ImageDecode(e.to_string()))?;

    let rgba = image.into_rgba8();
    Ok(Pixels {
        width: rgba.width(),
        height: rgba.height(),
        data: rgba.into_raw(),
    })
}

/// Decode, degrading to a 1×1 placeholder. The flag tells whether decoding
/// failed.
pub(crate) fn decode_image_or_placeholder(location: &str, bytes: &[u8]) -> (Pixels, bool) {
    match decode_image(bytes) {
        Ok(pixels) => (pixels, false),
        Err(e) => {
            warn!("`{location}`: {e}, using a 1x1 placeholder");
            (Pixels::placeholder(), true)
        }
    }
}

fn font_or_placeholder(location: &str, bytes: &[u8], request: &FontRequest) -> (FontAtlas, bool) {
    match rasterize_font(bytes, request) {
        Ok(atlas) => (atlas, false),
        Err(e) => {
            warn!("`{location}`: {e}, using a 1x1 placeholder");
            (empty_atlas(request), true)
        }
    }
}

fn empty_atlas(request: &FontRequest) -> FontAtlas {
    let pixels = Pixels::placeholder();
    FontAtlas {
        width: pixels.width,
        height: pixels.height,
        pixels: pixels.data,
        map: CharacterMap {
            character_height: request.character_height,
            glyphs: HashMap::new(),
            sdf: request.sdf,
        },
    }
}

#[derive(Clone, Debug)]
enum JobKind {
    Image,
    Font(FontRequest),
}

/// A decode request: which bitmap, where its bytes live, and what to make
/// of them. Running it touches no GPU state.
pub struct DecodeJob {
    bitmap: BitmapHandle,
    location: String,
    resources: Arc<dyn ResourceLocator>,
    kind: JobKind,
}

impl DecodeJob {
    pub(crate) fn image(
        bitmap: BitmapHandle,
        location: String,
        resources: Arc<dyn ResourceLocator>,
    ) -> Self {
        Self {
            bitmap,
            location,
            resources,
            kind: JobKind::Image,
        }
    }

    pub(crate) fn font(
        bitmap: BitmapHandle,
        location: String,
        resources: Arc<dyn ResourceLocator>,
        request: FontRequest,
    ) -> Self {
        Self {
            bitmap,
            location,
            resources,
            kind: JobKind::Font(request),
        }
    }

    /// Read and decode. Failures produce a 1×1 placeholder, never a panic.
    #[must_use]
    pub fn run(self) -> DecodeOutput {
        let bytes = self.resources.read(&self.location).unwrap_or_else(|e| {
            warn!("failed to read `{}`: {e}", self.location);
            Vec::new()
        });

        let (decoded, failed) = match &self.kind {
            JobKind::Image => {
                let (pixels, failed) = decode_image_or_placeholder(&self.location, &bytes);
                (Decoded::Image(pixels), failed)
            }
            JobKind::Font(request) => {
                let (atlas, failed) = font_or_placeholder(&self.location, &bytes, request);
                (Decoded::Font(atlas), failed)
            }
        };

        DecodeOutput {
            bitmap: self.bitmap,
            location: self.location,
            decoded,
            failed,
        }
    }
}

#[derive(Debug)]
enum Decoded {
    Image(Pixels),
    Font(FontAtlas),
}

/// A finished [`DecodeJob`], waiting to be uploaded by
/// [`Display::update`].
#[derive(Debug)]
pub struct DecodeOutput {
    bitmap: BitmapHandle,
    location: String,
    decoded: Decoded,
    failed: bool,
}

impl DecodeOutput {
    /// Location the bytes were read from.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Whether decoding fell back to a placeholder.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.failed
    }
}

impl<D: GraphicsDevice> Display<D> {
    /// Upload every finished decode, publishing one
    /// [`DisplayEvent::BitmapLoaded`] per bitmap. Returns how many completions
    /// were processed.
    pub fn update(&mut self) -> usize {
        let mut done = 0;
        while let Some(output) = self.runner.poll() {
            self.complete_decode(output);
            done += 1;
        }
        done
    }

    fn complete_decode(&mut self, output: DecodeOutput) {
        let DecodeOutput {
            bitmap: handle,
            location,
            decoded,
            failed,
        } = output;

        if !self.ready {
            debug!("discarding decoded `{location}` after shutdown");
            return;
        }
        let Some(smoothing) = self.bitmaps.get(handle).map(|b| b.smoothing()) else {
            warn!("decoded `{location}` for a bitmap that no longer exists");
            return;
        };

        let (pixels, characters) = match decoded {
            Decoded::Image(pixels) => (pixels, None),
            Decoded::Font(atlas) => (
                Pixels {
                    width: atlas.width,
                    height: atlas.height,
                    data: atlas.pixels,
                },
                Some(Arc::new(atlas.map)),
            ),
        };

        let mut failed = failed;
        let uploaded = self.upload_pixels(&pixels, smoothing).or_else(|e| {
            warn!("can't upload `{location}`, using a 1x1 fallback: {e}");
            failed = true;
            self.upload_pixels(&Pixels::placeholder(), smoothing)
        });

        // Queued quads still sample the placeholder through this bitmap's unit.
        self.flush_if_queued(handle);
        self.state.units.purge(handle);
        if self.state.last_bitmap == Some(handle) {
            self.state.last_bitmap = None;
        }

        let Some(bitmap) = self.bitmaps.get_mut(handle) else {
            return;
        };
        let texture = match uploaded {
            Ok(uploaded) => {
                let color = bitmap.color;
                let flags = bitmap.flags;
                *bitmap = uploaded;
                bitmap.color = color;
                bitmap.flags = flags;
                bitmap.characters = characters;
                bitmap.texture
            }
            Err(e) => {
                // Never keep the temp bitmap's texture past the loading state.
                error!("can't create a fallback texture for `{location}`: {e}");
                bitmap.texture = None;
                None
            }
        };
        bitmap.flags.remove(BitmapFlags::LOADING);
        let delete = bitmap.flags.contains(BitmapFlags::DELETE_PENDING);
        self.release_orphaned_textures();

        debug!("`{location}` loaded");
        self.events.publish(DisplayEvent::BitmapLoaded {
            bitmap: handle,
            id: location_id(&location),
            location,
            texture: if failed { None } else { texture },
        });

        if delete {
            if let Err(e) = self.delete_bitmap(handle) {
                warn!("deferred deletion failed: {e}");
            }
        }
    }

    /// Bake a font by resource name into a bitmap and glyph map.
    ///
    /// Like [`load_bitmap`](Self::load_bitmap), this decodes asynchronously
    /// when a temp bitmap is set; [`character_map`](Self::character_map)
    /// returns `None` until then.
    ///
    /// # Errors
    ///
    /// Fails when the font cannot be located or read, or when the atlas
    /// texture cannot be created. Unparseable fonts become empty 1×1 atlases.
    pub fn load_font(&mut self, name: &str, request: FontRequest) -> Result<BitmapHandle> {
        self.ensure_ready()?;
        let Some(location) = self.resources.locate(FONT_GROUP, name) else {
            warn!("can't locate font `{name}`");
            return Err(DisplayError::ResourceNotFound(name.to_owned()));
        };

        if let Some(temp) = self.temp_bitmap {
            let handle = self.create_placeholder(temp)?;
            debug!("baking `{location}` asynchronously");
            self.runner.submit(DecodeJob::font(
                handle,
                location,
                Arc::clone(&self.resources),
                request,
            ));
            return Ok(handle);
        }

        let bytes = self.read_resource(&location)?;
        let (atlas, _) = font_or_placeholder(&location, &bytes, &request);
        let pixels = Pixels {
            width: atlas.width,
            height: atlas.height,
            data: atlas.pixels,
        };
        let mut bitmap = self.upload_pixels(&pixels, self.config.smoothing)?;
        bitmap.characters = Some(Arc::new(atlas.map));
        Ok(self.bitmaps.insert(bitmap))
    }
}
