//! GLSL sources for the built-in programs and the fragment wrapper applied
//! to user shaders.
//!
//! Everything targets GLSL 1.20 so that user fragment code written against
//! the fixed-function aliases (`gl_TexCoord[0]`, `gl_Color`, `texture2D`,
//! `gl_FragColor`) keeps compiling.

use std::fmt::Write as _;

use log::error;

use crate::device::{GraphicsDevice, ProgramId, ShaderStage, ShaderStageId};
use crate::error::{DisplayError, Result};
use crate::program::{ParamKind, ShaderParam};

/// Vertex position attribute.
pub const ATTRIBUTE_POSITION: &str = "_vPosition_";
/// Vertex texture coordinate attribute.
pub const ATTRIBUTE_TEX_COORD: &str = "_vTexCoord_";
/// Vertex color attribute.
pub const ATTRIBUTE_COLOR: &str = "_vColor_";
/// Vertex texture unit attribute.
pub const ATTRIBUTE_UNIT: &str = "_vUnit_";

/// Projection matrix uniform shared by every program.
pub const UNIFORM_PROJECTION: &str = "_mProjection_";
/// Sampler array of the default textured program.
pub const UNIFORM_TEXTURE: &str = "_Texture_";

/// Edge uniform suffixes, in `[top, left, bottom, right]` order.
pub const EDGE_SUFFIXES: [&str; 4] = ["_top", "_left", "_bottom", "_right"];

/// The single vertex shader every program is linked with.
///
/// # Attributes
///
/// | Name          | Type    | Description                            |
/// |---------------|---------|----------------------------------------|
/// | `_vPosition_` | `vec2`  | Destination pixels                     |
/// | `_vTexCoord_` | `vec2`  | Texture coordinate                     |
/// | `_vColor_`    | `vec4`  | Normalized tint                        |
/// | `_vUnit_`     | `float` | Texture unit for the default program   |
///
/// # Uniforms
///
/// | Name            | Type   | Description                           |
/// |-----------------|--------|---------------------------------------|
/// | `_mProjection_` | `mat4` | Destination orthographic projection   |
pub const VERTEX_SRC: &str = r"#version 120

attribute vec2 _vPosition_;
attribute vec2 _vTexCoord_;
attribute vec4 _vColor_;
attribute float _vUnit_;

uniform mat4 _mProjection_;

varying vec2 _gl_TexCoord0_;
varying vec4 _Color_;
varying float _Unit_;

void main() {
    _gl_TexCoord0_ = _vTexCoord_;
    _Color_ = _vColor_;
    _Unit_ = _vUnit_;
    gl_Position = _mProjection_ * vec4(_vPosition_, 0.0, 1.0);
}
";

/// Fragment shader for primitives: the interpolated color, no texture.
pub const NO_TEXTURE_FRAGMENT_SRC: &str = r"#version 120

varying vec4 _Color_;

void main() {
    gl_FragColor = _Color_;
}
";

/// Default textured fragment shader sampling one of `units` textures,
/// selected per vertex.
///
/// # Uniforms
///
/// | Name              | Type           | Description                    |
/// |-------------------|----------------|--------------------------------|
/// | `_Texture_[n]`    | `sampler2D[]`  | One sampler per texture unit   |
pub fn default_fragment_source(units: u32) -> String {
    let units = units.max(1);
    let mut src = format!(
        "#version 120\n\n\
         uniform sampler2D {UNIFORM_TEXTURE}[{units}];\n\n\
         varying vec2 _gl_TexCoord0_;\n\
         varying vec4 _Color_;\n\
         varying float _Unit_;\n\n\
         void main() {{\n    vec4 texel;\n"
    );

    for unit in 0..units {
        let branch = match unit {
            0 => "    if",
            _ if unit + 1 == units => "    else",
            _ => "    else if",
        };
        if unit + 1 == units && unit > 0 {
            let _ = writeln!(
                src,
                "{branch} {{ texel = texture2D({UNIFORM_TEXTURE}[{unit}], _gl_TexCoord0_); }}"
            );
        } else if units == 1 {
            let _ = writeln!(
                src,
                "    texel = texture2D({UNIFORM_TEXTURE}[0], _gl_TexCoord0_);"
            );
        } else {
            let _ = writeln!(
                src,
                "{branch} (_Unit_ < {unit}.5) {{ texel = texture2D({UNIFORM_TEXTURE}[{unit}], _gl_TexCoord0_); }}"
            );
        }
    }

    src.push_str("    gl_FragColor = _Color_ * texel;\n}\n");
    src
}

/// Wrap user fragment code: declare the varyings and one uniform per
/// parameter (plus four edge floats per texture parameter), then append the
/// code with the fixed-function aliases rewritten.
pub fn build_fragment_source(code: &[&str], params: &[ShaderParam]) -> String {
    let mut src = String::from(
        "#version 120\n\nvarying vec2 _gl_TexCoord0_;\nvarying vec4 _Color_;\n\n",
    );

    for param in params {
        let array = if param.array_size > 1 {
            format!("[{}]", param.array_size)
        } else {
            String::new()
        };
        let name = &param.name;
        match param.kind {
            ParamKind::Texture => {
                let _ = writeln!(src, "uniform sampler2D {name}{array};");
                for suffix in EDGE_SUFFIXES {
                    let _ = writeln!(src, "uniform float {name}{suffix}{array};");
                }
            }
            ParamKind::Float | ParamKind::Time => {
                let _ = writeln!(src, "uniform float {name}{array};");
            }
            ParamKind::Vector => {
                let _ = writeln!(src, "uniform vec3 {name}{array};");
            }
        }
    }

    src.push('\n');
    for fragment in code {
        src.push_str(
            &fragment
                .replace("gl_TexCoord[0]", "_gl_TexCoord0_")
                .replace("gl_Color", "_Color_"),
        );
    }
    src
}

/// Compile and link a program from vertex and fragment sources.
///
/// Nothing is left allocated on the device when any stage fails.
///
/// # Errors
///
/// Returns the compiler or linker diagnostic, which is also logged.
pub(crate) fn compile_program<D: GraphicsDevice>(
    device: &mut D,
    vertex_src: &str,
    fragment_src: &str,
) -> Result<ProgramId> {
    let vs = compile_stage(device, ShaderStage::Vertex, vertex_src)?;
    let fs = match compile_stage(device, ShaderStage::Fragment, fragment_src) {
        Ok(fs) => fs,
        Err(e) => {
            device.delete_shader(vs);
            return Err(e);
        }
    };

    device.link_program(vs, fs).map_err(|log| {
        error!("shader link error:\n{log}");
        DisplayError::ShaderLink(log)
    })
}

fn compile_stage<D: GraphicsDevice>(
    device: &mut D,
    stage: ShaderStage,
    source: &str,
) -> Result<ShaderStageId> {
    device.compile_shader(stage, source).map_err(|log| {
        error!("{stage:?} shader compile error:\n{log}\n{source}");
        DisplayError::ShaderCompile { stage, log }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn user_code_aliases_are_rewritten() {
        let src = build_fragment_source(
            &[
                "void main() {\n",
                "  gl_FragColor = gl_Color * texture2D(texture, gl_TexCoord[0].xy);\n}\n",
            ],
            &[],
        );
        assert!(src.contains("gl_FragColor = _Color_ * texture2D(texture, _gl_TexCoord0_.xy);"));
        assert!(!src.contains("gl_TexCoord[0]"));
        assert!(src.starts_with("#version 120"));
    }

    #[test]
    fn parameters_are_declared() {
        let params = [
            ShaderParam::texture("texture"),
            ShaderParam::float("blur"),
            ShaderParam::vector("tint"),
            ShaderParam {
                name: "weights".into(),
                kind: ParamKind::Float,
                array_size: 4,
            },
        ];
        let src = build_fragment_source(&["void main() {}"], &params);

        for line in [
            "uniform sampler2D texture;",
            "uniform float texture_top;",
            "uniform float texture_left;",
            "uniform float texture_bottom;",
            "uniform float texture_right;",
            "uniform float blur;",
            "uniform vec3 tint;",
            "uniform float weights[4];",
        ] {
            assert!(src.contains(line), "missing `{line}` in:\n{src}");
        }
    }

    #[test]
    fn default_fragment_selects_every_unit() {
        let src = default_fragment_source(3);
        assert!(src.contains("uniform sampler2D _Texture_[3];"));
        assert!(src.contains("if (_Unit_ < 0.5) { texel = texture2D(_Texture_[0]"));
        assert!(src.contains("else if (_Unit_ < 1.5) { texel = texture2D(_Texture_[1]"));
        assert!(src.contains("else { texel = texture2D(_Texture_[2]"));
    }

    #[test]
    fn single_unit_samples_directly() {
        let src = default_fragment_source(1);
        assert!(src.contains("texel = texture2D(_Texture_[0], _gl_TexCoord0_);"));
        assert!(!src.contains("_Unit_ <"));
    }
}
