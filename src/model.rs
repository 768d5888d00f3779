use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RepeatMode {
    #[default]
    Off,
    All,
    One,
}

impl RepeatMode {
    pub fn next(self) -> Self {
        match self {
            Self::Off => Self::All,
            Self::All => Self::One,
            Self::One => Self::Off,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::All => "all",
            Self::One => "one",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub duration: Option<Duration>,
}

impl TrackMetadata {
    pub fn display_title(&self, path: &Path) -> String {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| file_stem_title(path))
    }
}

pub fn file_stem_title(path: &Path) -> String {
    path.file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("unknown")
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

pub const IDLE_COLOR: Rgb = Rgb::new(30, 30, 30);

const FALLBACK_COLORS: [Rgb; 6] = [
    Rgb::new(82, 148, 226),
    Rgb::new(168, 82, 226),
    Rgb::new(226, 82, 141),
    Rgb::new(226, 141, 82),
    Rgb::new(82, 226, 168),
    Rgb::new(141, 226, 82),
];

pub fn fallback_color(index: usize) -> Rgb {
    FALLBACK_COLORS[index % FALLBACK_COLORS.len()]
}

#[derive(Debug, Clone)]
pub struct Artwork {
    pub image: Arc<RgbaImage>,
}

impl Artwork {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_volume")]
    pub volume: u8,
    #[serde(default)]
    pub crossfade_seconds: u8,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub repeat: RepeatMode,
    #[serde(default)]
    pub saved_folder: Option<PathBuf>,
}

fn default_volume() -> u8 {
    50
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            crossfade_seconds: 0,
            shuffle: false,
            repeat: RepeatMode::Off,
            saved_folder: None,
        }
    }
}
