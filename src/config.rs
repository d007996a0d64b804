//! Read-only configuration lookups and the typed `Display` section.

use std::collections::HashMap;

/// Section holding every display key.
pub const DISPLAY_SECTION: &str = "Display";

/// Key/value configuration source.
///
/// Values are looked up on demand; a missing or unparsable key yields `None`
/// and the caller falls back to its default.
pub trait ConfigStore {
    /// Raw string value of `key` in `section`.
    fn get(&self, section: &str, key: &str) -> Option<String>;

    /// Boolean value (`true`/`false`, `1`/`0`, case-insensitive).
    fn get_bool(&self, section: &str, key: &str) -> Option<bool> {
        let value = self.get(section, key)?;
        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        }
    }

    /// Unsigned integer value.
    fn get_u32(&self, section: &str, key: &str) -> Option<u32> {
        self.get(section, key)?.trim().parse().ok()
    }

    /// Float value.
    fn get_f32(&self, section: &str, key: &str) -> Option<f32> {
        self.get(section, key)?.trim().parse().ok()
    }
}

/// In-memory [`ConfigStore`].
#[derive(Clone, Debug, Default)]
pub struct MapConfig {
    values: HashMap<(String, String), String>,
}

impl MapConfig {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` in `section`, replacing any previous value.
    pub fn set(&mut self, section: &str, key: &str, value: impl ToString) -> &mut Self {
        self.values
            .insert((section.to_owned(), key.to_owned()), value.to_string());
        self
    }
}

impl ConfigStore for MapConfig {
    fn get(&self, section: &str, key: &str) -> Option<String> {
        self.values
            .get(&(section.to_owned(), key.to_owned()))
            .cloned()
    }
}

/// Typed view of the `Display` section.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayConfig {
    /// Default texture filtering when a draw asks for [`Smoothing::Default`].
    ///
    /// [`Smoothing::Default`]: crate::Smoothing::Default
    pub smoothing: bool,
    /// Requested screen width.
    pub width: u32,
    /// Requested screen height.
    pub height: u32,
    /// Requested color depth.
    pub depth: u32,
    /// Fullscreen window.
    pub fullscreen: bool,
    /// Window decoration.
    pub decoration: bool,
    /// Vertical sync.
    pub vsync: bool,
    /// Target refresh rate in Hz.
    pub refresh_rate: u32,
    /// Upper bound on texture dimensions, below the device limit.
    pub max_texture_size: Option<u32>,
    /// Texture unit count override.
    pub texture_units: Option<u32>,
    /// Draw buffer count override.
    pub draw_buffers: Option<u32>,
    /// Allow non-power-of-two textures, overriding the device capability.
    pub npot: Option<bool>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            smoothing: false,
            width: 800,
            height: 600,
            depth: 32,
            fullscreen: false,
            decoration: true,
            vsync: true,
            refresh_rate: 60,
            max_texture_size: None,
            texture_units: None,
            draw_buffers: None,
            npot: None,
        }
    }
}

impl DisplayConfig {
    /// Read the `Display` section, keeping defaults for missing keys.
    pub fn from_store(store: &dyn ConfigStore) -> Self {
        let defaults = Self::default();
        let s = DISPLAY_SECTION;
        Self {
            smoothing: store.get_bool(s, "Smoothing").unwrap_or(defaults.smoothing),
            width: store.get_u32(s, "ScreenWidth").unwrap_or(defaults.width),
            height: store.get_u32(s, "ScreenHeight").unwrap_or(defaults.height),
            depth: store.get_u32(s, "ScreenDepth").unwrap_or(defaults.depth),
            fullscreen: store.get_bool(s, "FullScreen").unwrap_or(defaults.fullscreen),
            decoration: store.get_bool(s, "Decoration").unwrap_or(defaults.decoration),
            vsync: store.get_bool(s, "VSync").unwrap_or(defaults.vsync),
            refresh_rate: store
                .get_u32(s, "RefreshRate")
                .unwrap_or(defaults.refresh_rate),
            max_texture_size: store.get_u32(s, "MaxTextureSize"),
            texture_units: store.get_u32(s, "TextureUnitNumber"),
            draw_buffers: store.get_u32(s, "DrawBufferNumber"),
            npot: store.get_bool(s, "NPOT"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_yields_defaults() {
        let config = DisplayConfig::from_store(&MapConfig::new());
        assert_eq!(config, DisplayConfig::default());
    }

    #[test]
    fn reads_display_section() {
        let mut store = MapConfig::new();
        store
            .set(DISPLAY_SECTION, "ScreenWidth", 1280)
            .set(DISPLAY_SECTION, "ScreenHeight", "720")
            .set(DISPLAY_SECTION, "Smoothing", "TRUE")
            .set(DISPLAY_SECTION, "TextureUnitNumber", 4)
            .set("Other", "ScreenDepth", 16);

        let config = DisplayConfig::from_store(&store);
        assert_eq!(config.width, 1280);
        assert_eq!(config.height, 720);
        assert!(config.smoothing);
        assert_eq!(config.texture_units, Some(4));
        assert_eq!(config.depth, 32);
    }

    #[test]
    fn unparsable_values_fall_back() {
        let mut store = MapConfig::new();
        store
            .set(DISPLAY_SECTION, "ScreenWidth", "wide")
            .set(DISPLAY_SECTION, "VSync", "maybe");
        let config = DisplayConfig::from_store(&store);
        assert_eq!(config.width, 800);
        assert!(config.vsync);
    }
}
