//! Draw entry points: bitmaps, text and meshes through the batch, and
//! untextured primitives drawn immediately.

use std::f32::consts::TAU;

use log::{debug, error, warn};

use crate::batch::BATCH_VERTICES;
use crate::bitmap::BitmapHandle;
use crate::device::{GraphicsDevice, TextureId};
use crate::display::Display;
use crate::error::{DisplayError, Result};
use crate::types::{
    Affine, BlendMode, BufferMode, DisplayTransform, MeshVertex, PrimitiveTopology, Rgba,
    Smoothing, Vertex,
};

/// Segments used to approximate circles.
pub const CIRCLE_SEGMENTS: usize = 32;

/// An oriented box: an origin with two axes.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct OBox {
    /// Origin before the pivot is applied.
    pub position: [f32; 2],
    /// Offset subtracted from `position` to get the first corner.
    pub pivot: [f32; 2],
    /// First edge.
    pub x: [f32; 2],
    /// Second edge.
    pub y: [f32; 2],
}

impl OBox {
    /// Corners in drawing order.
    #[must_use]
    pub fn corners(&self) -> [[f32; 2]; 4] {
        let origin = [
            self.position[0] - self.pivot[0],
            self.position[1] - self.pivot[1],
        ];
        [
            origin,
            [origin[0] + self.x[0], origin[1] + self.x[1]],
            [
                origin[0] + self.x[0] + self.y[0],
                origin[1] + self.x[1] + self.y[1],
            ],
            [origin[0] + self.y[0], origin[1] + self.y[1]],
        ]
    }
}

/// Local rectangle and texture rectangle of one quad.
#[derive(Copy, Clone, Debug, PartialEq)]
struct QuadSource {
    /// `[x0, y0, x1, y1]` in local pixels.
    rect: [f32; 4],
    /// `[u0, v0, u1, v1]`.
    uv: [f32; 4],
}

#[expect(clippy::cast_precision_loss)]
fn unit_attribute(unit: u32) -> f32 {
    unit as f32
}

/// Channel-wise product of two colors.
fn modulate(a: Rgba, b: Rgba) -> Rgba {
    let mul = |x: u8, y: u8| {
        u8::try_from((u16::from(x) * u16::from(y) + 127) / 255).unwrap_or(u8::MAX)
    };
    Rgba::new(mul(a.r, b.r), mul(a.g, b.g), mul(a.b, b.b), mul(a.a, b.a))
}

/// Vertices ordered bottom-left, top-left, bottom-right, top-right.
fn quad_vertices(matrix: &Affine, source: &QuadSource, color: Rgba, unit: u32) -> [Vertex; 4] {
    let [x0, y0, x1, y1] = source.rect;
    let [u0, v0, u1, v1] = source.uv;
    let unit = unit_attribute(unit);
    [
        ([x0, y1], [u0, v1]),
        ([x0, y0], [u0, v0]),
        ([x1, y1], [u1, v1]),
        ([x1, y0], [u1, v0]),
    ]
    .map(|(position, tex_coord)| Vertex {
        position: matrix.apply(position),
        tex_coord,
        color,
        unit,
    })
}

/// Upper bound on tiles per axis for a single draw.
const MAX_TILES: f32 = 4096.0;

/// Split `extent` into `repeat` tiles; the last tile is partial for
/// fractional repeats. Yields `(start, end, fraction)`. Non-finite or
/// non-positive input yields nothing.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn tiles(extent: f32, repeat: f32) -> impl Iterator<Item = (f32, f32, f32)> {
    let valid = extent.is_finite() && repeat.is_finite() && repeat > 0.0;
    let repeat = if valid { repeat.min(MAX_TILES) } else { 0.0 };
    let size = if valid { extent / repeat } else { 0.0 };
    let count = repeat.ceil() as usize;
    (0..count)
        .map(move |i| {
            let start = i as f32 * size;
            let fraction = (repeat - i as f32).min(1.0);
            (start, start + size * fraction, fraction)
        })
        .take_while(|&(_, _, fraction)| fraction > f32::EPSILON)
}

/// Line-drawing topology for `count` points.
fn primitive_topology(count: usize, fill: bool, open: bool) -> PrimitiveTopology {
    if count == 2 {
        PrimitiveTopology::Lines
    } else if fill {
        PrimitiveTopology::TriangleFan
    } else if open {
        PrimitiveTopology::LineStrip
    } else {
        PrimitiveTopology::LineLoop
    }
}

impl<D: GraphicsDevice> Display<D> {
    /// Common preamble of textured draws: state changes, then residency.
    /// Returns the texture and its unit.
    fn prepare_textured(
        &mut self,
        handle: BitmapHandle,
        smoothing: Smoothing,
        blend: BlendMode,
        buffer_mode: BufferMode,
    ) -> Result<(TextureId, u32)> {
        self.ensure_ready()?;
        if handle == self.screen {
            error!("the screen bitmap cannot be drawn");
            return Err(DisplayError::ScreenSource);
        }
        let texture = self.bitmap(handle)?.texture.ok_or(DisplayError::InvalidHandle)?;

        self.set_blend_mode(blend);
        self.set_buffer_mode(buffer_mode);
        self.apply_smoothing(handle, smoothing)?;
        let unit = self.bind_bitmap(handle, texture);
        Ok((texture, unit))
    }

    /// Append quads for `handle`, flushing (and re-binding) whenever the
    /// batch is full.
    fn push_quads(
        &mut self,
        handle: BitmapHandle,
        texture: TextureId,
        mut unit: u32,
        matrix: &Affine,
        color: Rgba,
        quads: &[QuadSource],
    ) {
        for quad in quads {
            if !self.batch.has_room(4) {
                self.flush();
                unit = self.bind_bitmap(handle, texture);
            }
            self.batch
                .push_quad(quad_vertices(matrix, quad, color, unit), unit);
        }
    }

    /// Draw a bitmap's clip rectangle placed by `transform`, tiled
    /// `transform.repeat` times, tinted by `color` and the bitmap color.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle, the screen bitmap, or after shutdown.
    #[expect(clippy::cast_precision_loss)]
    pub fn draw_bitmap(
        &mut self,
        handle: BitmapHandle,
        transform: &DisplayTransform,
        color: Rgba,
        smoothing: Smoothing,
        blend: BlendMode,
    ) -> Result<()> {
        let (texture, unit) =
            self.prepare_textured(handle, smoothing, blend, BufferMode::Indirect)?;

        let bitmap = self.bitmap(handle)?;
        let clip = bitmap.clip;
        let [recip_w, recip_h] = bitmap.recip_real;
        let border = bitmap.border_fix;
        let tint = modulate(color, bitmap.color);

        let [repeat_x, repeat_y] = transform.repeat;
        if repeat_x <= 0.0 || repeat_y <= 0.0 {
            debug!("nothing to draw for repeat {:?}", transform.repeat);
            return Ok(());
        }

        let u0 = (clip.tl_x as f32 + border) * recip_w;
        let v0 = (clip.tl_y as f32 + border) * recip_h;
        let u1 = (clip.br_x as f32 - border) * recip_w;
        let v1 = (clip.br_y as f32 - border) * recip_h;

        let mut quads = Vec::new();
        for (y0, y1, fy) in tiles(clip.height() as f32, repeat_y) {
            for (x0, x1, fx) in tiles(clip.width() as f32, repeat_x) {
                quads.push(QuadSource {
                    rect: [x0, y0, x1, y1],
                    uv: [u0, v0, u0 + (u1 - u0) * fx, v0 + (v1 - v0) * fy],
                });
            }
        }

        let matrix = Affine::from_transform(transform);
        self.push_quads(handle, texture, unit, &matrix, tint, &quads);
        Ok(())
    }

    /// Draw a bitmap at `(x, y)`, unscaled and unrotated.
    ///
    /// # Errors
    ///
    /// See [`draw_bitmap`](Self::draw_bitmap).
    pub fn blit_bitmap(&mut self, handle: BitmapHandle, x: f32, y: f32) -> Result<()> {
        self.draw_bitmap(
            handle,
            &DisplayTransform::at(x, y),
            Rgba::WHITE,
            Smoothing::Default,
            BlendMode::Alpha,
        )
    }

    /// Draw a string with a font bitmap, one quad per glyph. `\r`, `\n`
    /// and `\r\n` start a new line.
    ///
    /// A font still loading has no glyph map yet and draws nothing.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle, the screen bitmap, or after shutdown.
    pub fn draw_text(
        &mut self,
        font: BitmapHandle,
        text: &str,
        transform: &DisplayTransform,
        color: Rgba,
        smoothing: Smoothing,
        blend: BlendMode,
    ) -> Result<()> {
        self.ensure_ready()?;
        let Some(map) = self.bitmap(font)?.characters.clone() else {
            debug!("font {font:?} has no glyph map yet");
            return Ok(());
        };
        let (texture, unit) = self.prepare_textured(font, smoothing, blend, BufferMode::Indirect)?;

        let bitmap = self.bitmap(font)?;
        let [recip_w, recip_h] = bitmap.recip_real;
        let tint = modulate(color, bitmap.color);
        let height = map.character_height;

        let mut quads = Vec::with_capacity(text.len());
        let (mut x, mut y) = (0.0, 0.0);
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\r' | '\n' => {
                    if c == '\r' {
                        chars.next_if_eq(&'\n');
                    }
                    x = 0.0;
                    y += height;
                }
                _ => match map.glyphs.get(&c) {
                    Some(glyph) => {
                        quads.push(QuadSource {
                            rect: [x, y, x + glyph.width, y + height],
                            uv: [
                                glyph.x * recip_w,
                                glyph.y * recip_h,
                                (glyph.x + glyph.width) * recip_w,
                                (glyph.y + height) * recip_h,
                            ],
                        });
                        x += glyph.width;
                    }
                    None => x += height,
                },
            }
        }

        let matrix = Affine::from_transform(transform);
        self.push_quads(font, texture, unit, &matrix, tint, &quads);
        Ok(())
    }

    /// Draw caller-built geometry textured with a bitmap in one immediate
    /// draw call. Mesh UVs are relative to the bitmap's clip. Without
    /// `indices` the vertices form a triangle strip.
    ///
    /// # Errors
    ///
    /// Fails on a stale handle, the screen bitmap, after shutdown, or when
    /// the mesh exceeds the vertex buffer.
    #[expect(clippy::cast_precision_loss)]
    pub fn draw_mesh(
        &mut self,
        handle: BitmapHandle,
        vertices: &[MeshVertex],
        indices: Option<&[u16]>,
        smoothing: Smoothing,
        blend: BlendMode,
    ) -> Result<()> {
        if vertices.len() > BATCH_VERTICES {
            warn!(
                "mesh with {} vertices exceeds the {BATCH_VERTICES} vertex buffer",
                vertices.len()
            );
            return Err(DisplayError::MeshTooLarge {
                vertices: vertices.len(),
                capacity: BATCH_VERTICES,
            });
        }
        let (_, unit) = self.prepare_textured(handle, smoothing, blend, BufferMode::Direct)?;

        let bitmap = self.bitmap(handle)?;
        let clip = bitmap.clip;
        let [recip_w, recip_h] = bitmap.recip_real;
        let tint = bitmap.color;
        let (clip_w, clip_h) = (clip.width() as f32, clip.height() as f32);
        let unit_attr = unit_attribute(unit);

        let mesh = vertices.iter().map(|v| Vertex {
            position: v.position,
            tex_coord: [
                (clip.tl_x as f32 + v.uv[0] * clip_w) * recip_w,
                (clip.tl_y as f32 + v.uv[1] * clip_h) * recip_h,
            ],
            color: modulate(v.color, tint),
            unit: unit_attr,
        });
        let topology = if indices.is_some() {
            PrimitiveTopology::Triangles
        } else {
            PrimitiveTopology::TriangleStrip
        };

        self.batch.load_direct(mesh, indices, topology, 1 << unit);
        self.flush();
        Ok(())
    }

    /// Draw an untextured primitive right away with the no-texture program.
    fn draw_primitive(&mut self, points: &[[f32; 2]], color: Rgba, fill: bool, open: bool) -> Result<()> {
        self.ensure_ready()?;
        if points.len() < 2 {
            debug!("primitive with {} points skipped", points.len());
            return Ok(());
        }

        self.set_buffer_mode(BufferMode::Indirect);
        self.flush();
        let shader = self.no_texture_shader;
        self.start_shader(shader)?;

        self.device.set_blend_mode(if color.is_opaque() {
            BlendMode::None
        } else {
            BlendMode::Alpha
        });

        let vertices = points
            .iter()
            .map(|&position| Vertex {
                position,
                tex_coord: [0.0, 0.0],
                color,
                unit: 0.0,
            })
            .collect::<Vec<_>>();
        if self.has_surface {
            self.device.submit_draw(
                primitive_topology(vertices.len(), fill, open),
                &vertices,
                None,
                vertices.len(),
            );
        }

        self.stop_shader_inner(shader, true)?;
        // The blend mode was set behind the cache's back.
        self.state.blend = None;
        Ok(())
    }

    /// Draw a line segment.
    ///
    /// # Errors
    ///
    /// Fails after shutdown.
    pub fn draw_line(&mut self, start: [f32; 2], end: [f32; 2], color: Rgba) -> Result<()> {
        self.draw_primitive(&[start, end], color, false, true)
    }

    /// Draw connected line segments, open at the ends.
    ///
    /// # Errors
    ///
    /// Fails after shutdown.
    pub fn draw_polyline(&mut self, points: &[[f32; 2]], color: Rgba) -> Result<()> {
        self.draw_primitive(points, color, false, true)
    }

    /// Draw a closed polygon, outlined or filled.
    ///
    /// # Errors
    ///
    /// Fails after shutdown.
    pub fn draw_polygon(&mut self, points: &[[f32; 2]], color: Rgba, fill: bool) -> Result<()> {
        self.draw_primitive(points, color, fill, false)
    }

    /// Draw a circle approximated by [`CIRCLE_SEGMENTS`] segments.
    ///
    /// # Errors
    ///
    /// Fails after shutdown.
    #[expect(clippy::cast_precision_loss)]
    pub fn draw_circle(&mut self, center: [f32; 2], radius: f32, color: Rgba, fill: bool) -> Result<()> {
        let points = (0..CIRCLE_SEGMENTS)
            .map(|i| {
                let (sin, cos) = (TAU * i as f32 / CIRCLE_SEGMENTS as f32).sin_cos();
                [center[0] + radius * cos, center[1] + radius * sin]
            })
            .collect::<Vec<_>>();
        self.draw_primitive(&points, color, fill, false)
    }

    /// Draw an oriented box.
    ///
    /// # Errors
    ///
    /// Fails after shutdown.
    pub fn draw_obox(&mut self, obox: &OBox, color: Rgba, fill: bool) -> Result<()> {
        self.draw_primitive(&obox.corners(), color, fill, false)
    }
}
