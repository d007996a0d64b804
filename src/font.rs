//! Font atlas generation: glyph layout plus coverage or distance-field
//! rasterization.
//!
//! Outlines come from [`ttf_parser`], are rebuilt as [lyon] paths and then
//! flattened into polygons. Everything here is a pure function of the font
//! bytes, so it runs on decode workers.
//!
//! [lyon]: https://docs.rs/lyon

use std::collections::{HashMap, HashSet};

use lyon::math::{point, Point};
use lyon::path::iterator::PathIterator;
use lyon::path::{Path as LyonPath, PathEvent};
use ttf_parser::{Face, GlyphId, OutlineBuilder};

use crate::error::{DisplayError, Result};
use crate::types::{CharacterMap, Glyph};

/// Flattening tolerance in atlas pixels.
const FLATTEN_TOLERANCE: f32 = 0.05;

/// Samples per axis for coverage rasterization.
const COVERAGE_SAMPLES: u32 = 4;

/// Distance (in pixels) mapped to the full `[0, 255]` channel range.
const SDF_RANGE: f32 = 4.0;

/// Minimum turn between two consecutive segments for their joint to count
/// as a corner (cosine of the angle between directions).
const CORNER_COS: f32 = 0.5;

const RED: u8 = 0b001;
const GREEN: u8 = 0b010;
const BLUE: u8 = 0b100;
const CYAN: u8 = GREEN | BLUE;
const MAGENTA: u8 = RED | BLUE;
const YELLOW: u8 = RED | GREEN;
const WHITE: u8 = RED | GREEN | BLUE;

/// What to bake into a font bitmap.
#[derive(Clone, Debug, PartialEq)]
pub struct FontRequest {
    /// Glyph cell height in pixels.
    pub character_height: f32,
    /// Characters to include, in atlas order. Duplicates are ignored.
    pub characters: String,
    /// Rows wrap before exceeding this width.
    pub max_width: u32,
    /// Gap between cells, in pixels.
    pub spacing: u32,
    /// Rasterize multi-channel signed distance fields instead of coverage.
    pub sdf: bool,
}

impl Default for FontRequest {
    fn default() -> Self {
        Self {
            character_height: 32.0,
            characters: (' '..='~').collect(),
            max_width: 1024,
            spacing: 2,
            sdf: false,
        }
    }
}

/// A baked font: RGBA8 atlas pixels and the glyph map.
#[derive(Clone, Debug)]
pub(crate) struct FontAtlas {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) pixels: Vec<u8>,
    pub(crate) map: CharacterMap,
}

/// A glyph cell placed in the atlas.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Cell {
    x: u32,
    y: u32,
    width: u32,
}

/// Place cells left to right, wrapping to a new row when the next cell would
/// cross `max_width`. Returns the cells and the atlas size.
fn layout_cells(
    widths: &[u32],
    row_height: u32,
    spacing: u32,
    max_width: u32,
) -> (Vec<Cell>, u32, u32) {
    let mut cells = Vec::with_capacity(widths.len());
    let (mut x, mut y) = (0, 0);
    let mut atlas_width = 0;

    for &width in widths {
        if x > 0 && x + width > max_width {
            x = 0;
            y += row_height + spacing;
        }
        cells.push(Cell { x, y, width });
        atlas_width = atlas_width.max(x + width);
        x += width + spacing;
    }

    let atlas_height = if cells.is_empty() { 0 } else { y + row_height };
    (cells, atlas_width.max(1), atlas_height.max(1))
}

/// Collects a glyph outline into a lyon path, already scaled to pixels with
/// Y pointing down from the cell top.
struct OutlineCollector {
    builder: lyon::path::path::Builder,
    scale: f32,
    ascender: f32,
    open: bool,
}

impl OutlineCollector {
    fn new(scale: f32, ascender: f32) -> Self {
        Self {
            builder: LyonPath::builder(),
            scale,
            ascender,
            open: false,
        }
    }

    fn map(&self, x: f32, y: f32) -> Point {
        point(x * self.scale, (self.ascender - y) * self.scale)
    }

    fn finish(mut self) -> LyonPath {
        if self.open {
            self.builder.end(true);
        }
        self.builder.build()
    }
}

impl OutlineBuilder for OutlineCollector {
    fn move_to(&mut self, x: f32, y: f32) {
        if self.open {
            self.builder.end(true);
        }
        let at = self.map(x, y);
        self.builder.begin(at);
        self.open = true;
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let to = self.map(x, y);
        self.builder.line_to(to);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (ctrl, to) = (self.map(x1, y1), self.map(x, y));
        self.builder.quadratic_bezier_to(ctrl, to);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (c1, c2, to) = (self.map(x1, y1), self.map(x2, y2), self.map(x, y));
        self.builder.cubic_bezier_to(c1, c2, to);
    }

    fn close(&mut self) {
        if self.open {
            self.builder.close();
            self.open = false;
        }
    }
}

/// Flatten a path into closed polygons.
fn flatten_contours(path: &LyonPath) -> Vec<Vec<[f32; 2]>> {
    let mut contours = Vec::new();
    let mut current: Vec<[f32; 2]> = Vec::new();

    for event in path.iter().flattened(FLATTEN_TOLERANCE) {
        match event {
            PathEvent::Begin { at } => {
                current = vec![at.to_array()];
            }
            PathEvent::Line { to, .. } => current.push(to.to_array()),
            PathEvent::End { .. } => {
                if current.last() == current.first() {
                    current.pop();
                }
                if current.len() >= 2 {
                    contours.push(std::mem::take(&mut current));
                }
            }
            _ => {}
        }
    }

    contours
}

/// Segments of a closed polygon.
fn segments(contour: &[[f32; 2]]) -> impl Iterator<Item = ([f32; 2], [f32; 2])> + '_ {
    (0..contour.len()).map(move |i| (contour[i], contour[(i + 1) % contour.len()]))
}

/// Non-zero winding number of `p` against every contour.
fn winding(contours: &[Vec<[f32; 2]>], p: [f32; 2]) -> i32 {
    let mut winding = 0;
    for contour in contours {
        for (a, b) in segments(contour) {
            let side = (b[0] - a[0]) * (p[1] - a[1]) - (p[0] - a[0]) * (b[1] - a[1]);
            if a[1] <= p[1] {
                if b[1] > p[1] && side > 0.0 {
                    winding += 1;
                }
            } else if b[1] <= p[1] && side < 0.0 {
                winding -= 1;
            }
        }
    }
    winding
}

fn segment_distance(p: [f32; 2], a: [f32; 2], b: [f32; 2]) -> f32 {
    let ab = [b[0] - a[0], b[1] - a[1]];
    let ap = [p[0] - a[0], p[1] - a[1]];
    let length_sq = ab[0] * ab[0] + ab[1] * ab[1];
    let t = if length_sq > 0.0 {
        ((ap[0] * ab[0] + ap[1] * ab[1]) / length_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let dx = ap[0] - ab[0] * t;
    let dy = ap[1] - ab[1] * t;
    (dx * dx + dy * dy).sqrt()
}

/// A polygon segment with its edge color channel mask.
#[derive(Copy, Clone, Debug, PartialEq)]
struct ColoredSegment {
    a: [f32; 2],
    b: [f32; 2],
    color: u8,
}

fn direction(a: [f32; 2], b: [f32; 2]) -> [f32; 2] {
    let d = [b[0] - a[0], b[1] - a[1]];
    let length = (d[0] * d[0] + d[1] * d[1]).sqrt();
    if length > 0.0 {
        [d[0] / length, d[1] / length]
    } else {
        [0.0, 0.0]
    }
}

/// Split a contour into edges at its corners and color them so that
/// adjacent edges never share a color. A contour without corners is a single
/// white edge.
fn color_edges(contour: &[[f32; 2]]) -> Vec<ColoredSegment> {
    let segs: Vec<_> = segments(contour).collect();
    let count = segs.len();

    let corners: Vec<usize> = (0..count)
        .filter(|&i| {
            let (pa, pb) = segs[(i + count - 1) % count];
            let (a, b) = segs[i];
            let (d0, d1) = (direction(pa, pb), direction(a, b));
            d0[0] * d1[0] + d0[1] * d1[1] < CORNER_COS
        })
        .collect();

    if corners.len() < 2 {
        return segs
            .into_iter()
            .map(|(a, b)| ColoredSegment { a, b, color: WHITE })
            .collect();
    }

    let edge_count = corners.len();
    let palette = [CYAN, MAGENTA, YELLOW];
    let edge_color = |edge: usize| {
        if edge == edge_count - 1 && edge % 3 == 0 {
            MAGENTA
        } else {
            palette[edge % 3]
        }
    };

    let start = corners[0];
    let mut edge = 0;
    (0..count)
        .map(|offset| {
            let index = (start + offset) % count;
            if offset > 0 && corners.contains(&index) {
                edge += 1;
            }
            let (a, b) = segs[index];
            ColoredSegment {
                a,
                b,
                color: edge_color(edge),
            }
        })
        .collect()
}

fn encode_distance(distance: f32) -> u8 {
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let value = ((0.5 + distance / (2.0 * SDF_RANGE)).clamp(0.0, 1.0) * 255.0).round() as u8;
    value
}

/// Rasterize a cell as white RGB with alpha = supersampled coverage.
fn rasterize_coverage(contours: &[Vec<[f32; 2]>], width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    #[expect(clippy::cast_precision_loss)]
    let step = 1.0 / COVERAGE_SAMPLES as f32;

    for py in 0..height {
        for px in 0..width {
            let mut inside = 0u32;
            for sy in 0..COVERAGE_SAMPLES {
                for sx in 0..COVERAGE_SAMPLES {
                    #[expect(clippy::cast_precision_loss)]
                    let sample = [
                        px as f32 + (sx as f32 + 0.5) * step,
                        py as f32 + (sy as f32 + 0.5) * step,
                    ];
                    if winding(contours, sample) != 0 {
                        inside += 1;
                    }
                }
            }
            let total = COVERAGE_SAMPLES * COVERAGE_SAMPLES;
            #[expect(clippy::cast_possible_truncation)]
            let alpha = (inside * 255 / total) as u8;
            pixels.extend_from_slice(&[255, 255, 255, alpha]);
        }
    }

    pixels
}

/// Rasterize a cell as a multi-channel distance field: RGB hold per-color
/// edge distances, alpha the true distance. Inside is above 127.
fn rasterize_mtsdf(contours: &[Vec<[f32; 2]>], width: u32, height: u32) -> Vec<u8> {
    let edges: Vec<ColoredSegment> = contours.iter().flat_map(|c| color_edges(c)).collect();
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);

    for py in 0..height {
        for px in 0..width {
            #[expect(clippy::cast_precision_loss)]
            let p = [px as f32 + 0.5, py as f32 + 0.5];
            let sign = if winding(contours, p) != 0 { 1.0 } else { -1.0 };

            let mut channel = [f32::INFINITY; 3];
            let mut nearest = f32::INFINITY;
            for edge in &edges {
                let distance = segment_distance(p, edge.a, edge.b);
                nearest = nearest.min(distance);
                for (bit, slot) in [RED, GREEN, BLUE].into_iter().zip(channel.iter_mut()) {
                    if edge.color & bit != 0 {
                        *slot = slot.min(distance);
                    }
                }
            }

            let [r, g, b] = channel.map(|d| {
                let d = if d.is_finite() { d } else { nearest };
                encode_distance(sign * d)
            });
            pixels.extend_from_slice(&[r, g, b, encode_distance(sign * nearest)]);
        }
    }

    pixels
}

/// Bake the requested characters of a TrueType/OpenType font.
///
/// Characters missing from the font are left out of the map.
pub(crate) fn rasterize_font(bytes: &[u8], request: &FontRequest) -> Result<FontAtlas> {
    let face = Face::parse(bytes, 0).map_err(|e| DisplayError::FontDecode(e.to_string()))?;

    let ascender = f32::from(face.ascender());
    let extent = ascender - f32::from(face.descender());
    if extent <= 0.0 {
        return Err(DisplayError::FontDecode("font has no vertical extent".into()));
    }
    let scale = request.character_height / extent;

    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let row_height = request.character_height.ceil().max(1.0) as u32;

    let mut seen = HashSet::new();
    let glyphs: Vec<(char, GlyphId, u32)> = request
        .characters
        .chars()
        .filter(|c| seen.insert(*c))
        .filter_map(|c| {
            let id = face.glyph_index(c)?;
            let advance = f32::from(face.glyph_hor_advance(id).unwrap_or(0)) * scale;
            #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let width = advance.ceil().max(1.0) as u32;
            Some((c, id, width))
        })
        .collect();

    let widths: Vec<u32> = glyphs.iter().map(|&(_, _, w)| w).collect();
    let (cells, width, height) =
        layout_cells(&widths, row_height, request.spacing, request.max_width);

    let mut pixels = vec![0u8; (width * height * 4) as usize];
    if !request.sdf {
        for pixel in pixels.chunks_exact_mut(4) {
            pixel[..3].fill(255);
        }
    }

    let mut map = HashMap::with_capacity(glyphs.len());
    for (&(character, id, _), cell) in glyphs.iter().zip(&cells) {
        let mut collector = OutlineCollector::new(scale, ascender);
        let contours = if face.outline_glyph(id, &mut collector).is_some() {
            flatten_contours(&collector.finish())
        } else {
            Vec::new()
        };

        if !contours.is_empty() {
            let raster = if request.sdf {
                rasterize_mtsdf(&contours, cell.width, row_height)
            } else {
                rasterize_coverage(&contours, cell.width, row_height)
            };
            blit_cell(&mut pixels, width, cell, &raster);
        }

        #[expect(clippy::cast_precision_loss)]
        map.insert(
            character,
            Glyph {
                x: cell.x as f32,
                y: cell.y as f32,
                width: cell.width as f32,
            },
        );
    }

    Ok(FontAtlas {
        width,
        height,
        pixels,
        map: CharacterMap {
            character_height: request.character_height,
            glyphs: map,
            sdf: request.sdf,
        },
    })
}

fn blit_cell(atlas: &mut [u8], atlas_width: u32, cell: &Cell, raster: &[u8]) {
    let row_bytes = (cell.width * 4) as usize;
    for (row, source) in raster.chunks_exact(row_bytes).enumerate() {
        let start = (((cell.y as usize + row) * atlas_width as usize) + cell.x as usize) * 4;
        atlas[start..start + row_bytes].copy_from_slice(source);
    }
}
