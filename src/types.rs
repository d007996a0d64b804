//! Plain value types shared by the batcher, the state cache and the device.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};

/// An 8-bit-per-channel RGBA color.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct Rgba {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
    /// Alpha.
    pub a: u8,
}

impl Rgba {
    /// Opaque white, the default bitmap tint.
    pub const WHITE: Self = Self::new(255, 255, 255, 255);
    /// Opaque black.
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    /// Build a color from its four channels.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Whether the alpha channel is fully opaque.
    #[must_use]
    pub const fn is_opaque(self) -> bool {
        self.a == u8::MAX
    }

    /// Channels normalized to `[0, 1]`.
    #[must_use]
    pub fn to_f32(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a].map(|c| f32::from(c) / 255.0)
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::WHITE
    }
}

/// A vertex as streamed to the GPU.
///
/// `unit` is the texture unit sampled by the default shader. Quads that use
/// different resident units can share one draw call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    /// Position in destination pixels.
    pub position: [f32; 2],
    /// Texture coordinate in `[0, 1]` of the real (padded) texture size.
    pub tex_coord: [f32; 2],
    /// Per-vertex tint.
    pub color: Rgba,
    /// Texture unit, stored as a float so it can be a plain attribute.
    pub unit: f32,
}

/// A vertex supplied by callers of [`Display::draw_mesh`].
///
/// `uv` is relative to the bitmap's clip rectangle.
///
/// [`Display::draw_mesh`]: crate::Display::draw_mesh
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct MeshVertex {
    /// Position in destination pixels.
    pub position: [f32; 2],
    /// Texture coordinate in `[0, 1]` relative to the clip rectangle.
    pub uv: [f32; 2],
    /// Vertex tint.
    pub color: Rgba,
}

/// Blending equation applied when compositing onto the destination.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Blending disabled.
    None,
    /// `src_alpha, one_minus_src_alpha`.
    #[default]
    Alpha,
    /// `dst_color, zero`.
    Multiply,
    /// `src_alpha, one`.
    Add,
    /// `one, one_minus_src_alpha`.
    Premultiplied,
}

/// Texture filtering requested for a draw.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Smoothing {
    /// Use the configured default.
    #[default]
    Default,
    /// Linear filtering.
    On,
    /// Nearest filtering.
    Off,
}

/// How vertices reach the GPU.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum BufferMode {
    /// Caller-built vertices drawn immediately.
    Direct,
    /// Vertices accumulated in the shared batch buffer.
    #[default]
    Indirect,
}

/// Primitive assembly for a draw call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum PrimitiveTopology {
    /// Independent triangles.
    #[default]
    Triangles,
    /// Triangle strip.
    TriangleStrip,
    /// Triangle fan.
    TriangleFan,
    /// Independent line segments.
    Lines,
    /// Open line strip.
    LineStrip,
    /// Closed line loop.
    LineLoop,
}

/// A clip rectangle in bitmap pixels, stored exactly as given.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ClipRect {
    /// Top-left X.
    pub tl_x: u32,
    /// Top-left Y.
    pub tl_y: u32,
    /// Bottom-right X (exclusive).
    pub br_x: u32,
    /// Bottom-right Y (exclusive).
    pub br_y: u32,
}

impl ClipRect {
    /// A rectangle covering a whole `width`×`height` bitmap.
    #[must_use]
    pub const fn full(width: u32, height: u32) -> Self {
        Self {
            tl_x: 0,
            tl_y: 0,
            br_x: width,
            br_y: height,
        }
    }

    /// Horizontal extent.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.br_x.saturating_sub(self.tl_x)
    }

    /// Vertical extent.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.br_y.saturating_sub(self.tl_y)
    }
}

/// Placement of a bitmap or text run on the destination.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DisplayTransform {
    /// Pivot in local (source) pixels.
    pub pivot: [f32; 2],
    /// Destination position of the pivot.
    pub position: [f32; 2],
    /// Scale along local X and Y.
    pub scale: [f32; 2],
    /// Rotation in radians, clockwise on a top-down destination.
    pub rotation: f32,
    /// How many times the clip is tiled along X and Y. Fractions draw a
    /// partial last tile.
    pub repeat: [f32; 2],
}

impl Default for DisplayTransform {
    fn default() -> Self {
        Self {
            pivot: [0.0, 0.0],
            position: [0.0, 0.0],
            scale: [1.0, 1.0],
            rotation: 0.0,
            repeat: [1.0, 1.0],
        }
    }
}

impl DisplayTransform {
    /// Unscaled, unrotated placement at `position`.
    #[must_use]
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            position: [x, y],
            ..Self::default()
        }
    }
}

/// 2×3 affine matrix mapping local pixels to destination pixels.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Affine {
    /// Row producing X.
    pub x: [f32; 3],
    /// Row producing Y.
    pub y: [f32; 3],
}

impl Affine {
    /// Build the matrix for a transform. The pivot lands on
    /// `transform.position`.
    #[must_use]
    pub fn from_transform(transform: &DisplayTransform) -> Self {
        let (sin, cos) = transform.rotation.sin_cos();
        let [sx, sy] = transform.scale;
        let [px, py] = transform.pivot;
        let [dx, dy] = transform.position;

        let scos_x = sx * cos;
        let ssin_x = sx * sin;
        let scos_y = sy * cos;
        let ssin_y = sy * sin;

        Self {
            x: [scos_x, -ssin_y, dx - px * scos_x + py * ssin_y],
            y: [ssin_x, scos_y, dy - px * ssin_x - py * scos_y],
        }
    }

    /// Map a local point.
    #[must_use]
    pub fn apply(&self, [x, y]: [f32; 2]) -> [f32; 2] {
        [
            self.x[0] * x + self.x[1] * y + self.x[2],
            self.y[0] * x + self.y[1] * y + self.y[2],
        ]
    }
}

/// One glyph cell in a font atlas.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Glyph {
    /// Left edge in atlas pixels.
    pub x: f32,
    /// Top edge in atlas pixels.
    pub y: f32,
    /// Cell width, also the pen advance.
    pub width: f32,
}

/// Glyph layout of a font bitmap.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CharacterMap {
    /// Line height and glyph cell height.
    pub character_height: f32,
    /// Cells by character.
    pub glyphs: HashMap<char, Glyph>,
    /// Whether the atlas holds multi-channel distance fields.
    pub sdf: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn assert_point_eq(actual: [f32; 2], expected: [f32; 2]) {
        assert!(
            (actual[0] - expected[0]).abs() < 1e-4 && (actual[1] - expected[1]).abs() < 1e-4,
            "expected {expected:?}, got {actual:?}",
        );
    }

    #[test]
    fn vertex_has_no_padding() {
        assert_eq!(std::mem::size_of::<Vertex>(), 24);
    }

    #[test]
    fn identity_transform_translates_only() {
        let m = Affine::from_transform(&DisplayTransform::at(10.0, 20.0));
        assert_point_eq(m.apply([0.0, 0.0]), [10.0, 20.0]);
        assert_point_eq(m.apply([5.0, 3.0]), [15.0, 23.0]);
    }

    #[test]
    fn pivot_lands_on_position() {
        let transform = DisplayTransform {
            pivot: [8.0, 4.0],
            position: [100.0, 50.0],
            scale: [2.0, 3.0],
            rotation: 0.7,
            ..DisplayTransform::default()
        };
        let m = Affine::from_transform(&transform);
        assert_point_eq(m.apply([8.0, 4.0]), [100.0, 50.0]);
    }

    #[test]
    fn quarter_turn_rotates_x_onto_y() {
        let transform = DisplayTransform {
            rotation: std::f32::consts::FRAC_PI_2,
            ..DisplayTransform::default()
        };
        let m = Affine::from_transform(&transform);
        assert_point_eq(m.apply([1.0, 0.0]), [0.0, 1.0]);
        assert_point_eq(m.apply([0.0, 1.0]), [-1.0, 0.0]);
    }

    #[test]
    fn clip_rect_extent() {
        let clip = ClipRect {
            tl_x: 4,
            tl_y: 2,
            br_x: 20,
            br_y: 10,
        };
        assert_eq!(clip.width(), 16);
        assert_eq!(clip.height(), 8);
        assert_eq!(ClipRect::full(3, 5).width(), 3);
    }

    #[test]
    fn translucency() {
        assert!(Rgba::WHITE.is_opaque());
        assert!(!Rgba::new(1, 2, 3, 4).is_opaque());
        assert_eq!(Rgba::default(), Rgba::WHITE);
    }
}
