//! Configuration and theme management for frameterm.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.frameterm/config.toml`
//! - Built-in terminal themes (default, solarized-dark, nord, tokyo-night)
//!
//! # Configuration File
//!
//! ```toml
//! # Shell to run (defaults to $SHELL, then /bin/sh)
//! shell = "/bin/zsh"
//!
//! # false forces a full repaint every frame
//! hwaccel = true
//!
//! # Wrap each present in a synchronized update
//! vsync = true
//!
//! # Theme: default, solarized-dark, nord, tokyo-night
//! theme = "nord"
//!
//! # Target frame rate
//! fps = 60
//!
//! # Lines kept above the visible screen
//! scrollback = 10000
//!
//! [[fonts]]
//! name = "JetBrains Mono"
//! size = 13.0
//!
//! [font_defaults]
//! size = 12.0
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shell command
    pub shell: Option<String>,
    /// Hardware-accelerated presentation
    pub hwaccel: bool,
    /// Synchronized presentation
    pub vsync: bool,
    /// Theme name
    pub theme: String,
    /// Target frame rate
    pub fps: u32,
    /// Scrollback lines
    pub scrollback: usize,
    /// Fonts to register, in priority order
    pub fonts: Vec<FontConfig>,
    /// Fallback font settings
    pub font_defaults: FontDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: None,
            hwaccel: true,
            vsync: true,
            theme: "default".to_string(),
            fps: 60,
            scrollback: 10_000,
            fonts: Vec::new(),
            font_defaults: FontDefaults::default(),
        }
    }
}

/// A named font at a given point size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontConfig {
    pub name: String,
    pub size: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontDefaults {
    pub size: f32,
}

impl Default for FontDefaults {
    fn default() -> Self {
        Self { size: 12.0 }
    }
}

impl Config {
    /// Parse and validate the configuration at `path`
    ///
    /// A missing file is not an error; it yields the defaults.
    pub fn parse(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse `path`, falling back to defaults with a warning on failure
    pub fn load(path: &Path) -> Self {
        match Self::parse(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("while parsing config file: {}", e);
                Self::default()
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.fps == 0 {
            return Err(ConfigError::Invalid("fps must be at least 1".to_string()));
        }
        if self.font_defaults.size <= 0.0 {
            return Err(ConfigError::Invalid("font_defaults.size must be positive".to_string()));
        }
        if let Some(font) = self.fonts.iter().find(|f| f.size <= 0.0) {
            return Err(ConfigError::Invalid(format!("font `{}` has non-positive size", font.name)));
        }
        Ok(())
    }

    /// Default config file path
    pub fn default_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Shell to spawn: config value, then `$SHELL`, then `/bin/sh`
    pub fn shell(&self) -> String {
        self.shell
            .clone()
            .or_else(|| std::env::var("SHELL").ok())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "/bin/sh".to_string())
    }

    pub fn hwaccel(&self) -> bool {
        self.hwaccel
    }

    pub fn vsync(&self) -> bool {
        self.vsync
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn fonts(&self) -> &[FontConfig] {
        &self.fonts
    }

    pub fn font_defaults_size(&self) -> f32 {
        self.font_defaults.size
    }

    /// Resolved theme
    pub fn theme(&self) -> Theme {
        Theme::by_name(&self.theme)
    }
}

/// Color definition (RGB)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to crossterm Color
    pub fn to_crossterm(self) -> crossterm::style::Color {
        crossterm::style::Color::Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }
}

/// Terminal color theme
#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    pub name: &'static str,
    pub foreground: Color,
    pub background: Color,
    pub cursor: Color,
    pub selection_bg: Color,
    pub selection_fg: Color,
    /// ANSI colors 0-15
    pub palette: [Color; 16],
}

impl Default for Theme {
    fn default() -> Self {
        Self::default_theme()
    }
}

impl Theme {
    /// xterm colors on black
    pub fn default_theme() -> Self {
        Self {
            name: "default",
            foreground: Color::new(229, 229, 229),
            background: Color::new(0, 0, 0),
            cursor: Color::new(229, 229, 229),
            selection_bg: Color::new(255, 255, 255),
            selection_fg: Color::new(0, 0, 0),
            palette: [
                Color::new(0, 0, 0),
                Color::new(205, 0, 0),
                Color::new(0, 205, 0),
                Color::new(205, 205, 0),
                Color::new(0, 0, 238),
                Color::new(205, 0, 205),
                Color::new(0, 205, 205),
                Color::new(229, 229, 229),
                Color::new(127, 127, 127),
                Color::new(255, 0, 0),
                Color::new(0, 255, 0),
                Color::new(255, 255, 0),
                Color::new(92, 92, 255),
                Color::new(255, 0, 255),
                Color::new(0, 255, 255),
                Color::new(255, 255, 255),
            ],
        }
    }

    /// Solarized Dark
    pub fn solarized_dark() -> Self {
        Self {
            name: "solarized-dark",
            foreground: Color::new(131, 148, 150),
            background: Color::new(0, 43, 54),
            cursor: Color::new(147, 161, 161),
            selection_bg: Color::new(38, 139, 210),
            selection_fg: Color::new(253, 246, 227),
            palette: [
                Color::new(7, 54, 66),
                Color::new(220, 50, 47),
                Color::new(133, 153, 0),
                Color::new(181, 137, 0),
                Color::new(38, 139, 210),
                Color::new(211, 54, 130),
                Color::new(42, 161, 152),
                Color::new(238, 232, 213),
                Color::new(0, 43, 54),
                Color::new(203, 75, 22),
                Color::new(88, 110, 117),
                Color::new(101, 123, 131),
                Color::new(131, 148, 150),
                Color::new(108, 113, 196),
                Color::new(147, 161, 161),
                Color::new(253, 246, 227),
            ],
        }
    }

    /// Nord
    pub fn nord() -> Self {
        Self {
            name: "nord",
            foreground: Color::new(216, 222, 233),
            background: Color::new(46, 52, 64),
            cursor: Color::new(216, 222, 233),
            selection_bg: Color::new(76, 86, 106),
            selection_fg: Color::new(236, 239, 244),
            palette: [
                Color::new(59, 66, 82),
                Color::new(191, 97, 106),
                Color::new(163, 190, 140),
                Color::new(235, 203, 139),
                Color::new(129, 161, 193),
                Color::new(180, 142, 173),
                Color::new(136, 192, 208),
                Color::new(229, 233, 240),
                Color::new(76, 86, 106),
                Color::new(191, 97, 106),
                Color::new(163, 190, 140),
                Color::new(235, 203, 139),
                Color::new(129, 161, 193),
                Color::new(180, 142, 173),
                Color::new(143, 188, 187),
                Color::new(236, 239, 244),
            ],
        }
    }

    /// Tokyo Night
    pub fn tokyo_night() -> Self {
        Self {
            name: "tokyo-night",
            foreground: Color::new(169, 177, 214),
            background: Color::new(26, 27, 38),
            cursor: Color::new(192, 202, 245),
            selection_bg: Color::new(51, 59, 91),
            selection_fg: Color::new(192, 202, 245),
            palette: [
                Color::new(21, 22, 30),
                Color::new(247, 118, 142),
                Color::new(158, 206, 106),
                Color::new(224, 175, 104),
                Color::new(122, 162, 247),
                Color::new(187, 154, 247),
                Color::new(125, 207, 255),
                Color::new(169, 177, 214),
                Color::new(65, 72, 104),
                Color::new(247, 118, 142),
                Color::new(158, 206, 106),
                Color::new(224, 175, 104),
                Color::new(122, 162, 247),
                Color::new(187, 154, 247),
                Color::new(125, 207, 255),
                Color::new(192, 202, 245),
            ],
        }
    }

    /// Get theme by name, falling back to the default
    pub fn by_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "solarized-dark" | "solarized_dark" => Self::solarized_dark(),
            "nord" => Self::nord(),
            "tokyo-night" | "tokyo_night" | "tokyonight" => Self::tokyo_night(),
            _ => Self::default_theme(),
        }
    }

    /// List available themes
    pub fn list() -> Vec<&'static str> {
        vec!["default", "solarized-dark", "nord", "tokyo-night"]
    }

    /// Resolve an xterm 256-color index against this theme
    pub fn indexed(&self, idx: u8) -> Color {
        match idx {
            0..=15 => self.palette[idx as usize],
            16..=231 => {
                let i = idx - 16;
                let level = |v: u8| if v == 0 { 0 } else { 55 + v * 40 };
                Color::new(level(i / 36), level((i / 6) % 6), level(i % 6))
            }
            232..=255 => {
                let gray = 8 + (idx - 232) * 10;
                Color::new(gray, gray, gray)
            }
        }
    }
}

/// `~/.frameterm`, created on first use
pub fn config_dir() -> Option<PathBuf> {
    let dir = home_dir()?.join(".frameterm");
    if !dir.exists() {
        let _ = fs::create_dir_all(&dir);
    }
    Some(dir)
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_full_config() {
        let file = write_config(
            r#"
            shell = "/bin/zsh"
            hwaccel = false
            vsync = false
            theme = "nord"
            fps = 120

            [[fonts]]
            name = "Fira Code"
            size = 14.0

            [font_defaults]
            size = 11.5
            "#,
        );

        let config = Config::parse(file.path()).unwrap();
        assert_eq!(config.shell(), "/bin/zsh");
        assert!(!config.hwaccel());
        assert!(!config.vsync());
        assert_eq!(config.fps(), 120);
        assert_eq!(config.theme().name, "nord");
        assert_eq!(config.fonts(), &[FontConfig { name: "Fira Code".to_string(), size: 14.0 }]);
        assert_eq!(config.font_defaults_size(), 11.5);
        assert_eq!(config.scrollback, 10_000);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::parse(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.fps(), 60);
        assert!(config.hwaccel());
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let file = write_config("fps = = 3");
        assert!(matches!(Config::parse(file.path()), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_zero_fps_is_invalid() {
        let file = write_config("fps = 0");
        assert!(matches!(Config::parse(file.path()), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_falls_back_to_defaults() {
        let file = write_config("fps = \"fast\"");
        let config = Config::load(file.path());
        assert_eq!(config.fps(), 60);
    }

    #[test]
    fn test_theme_lookup() {
        assert_eq!(Theme::by_name("Tokyo_Night").name, "tokyo-night");
        assert_eq!(Theme::by_name("unknown").name, "default");
        for name in Theme::list() {
            assert_eq!(Theme::by_name(name).name, name);
        }
    }

    #[test]
    fn test_indexed_colors() {
        let theme = Theme::default_theme();
        assert_eq!(theme.indexed(1), theme.palette[1]);
        assert_eq!(theme.indexed(16), Color::new(0, 0, 0));
        assert_eq!(theme.indexed(231), Color::new(255, 255, 255));
        assert_eq!(theme.indexed(232), Color::new(8, 8, 8));
        assert_eq!(theme.indexed(255), Color::new(238, 238, 238));
    }
}
