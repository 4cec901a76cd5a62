//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. The
//! [`directive`](crate::directive) parser produces them from the vendor
//! mini-language, [`calculations`](super::calculations) turns them into
//! concrete pixel geometry, and [`operations`](super::operations) applies
//! that geometry to a buffer.
//!
//! ## Types
//!
//! - [`Quality`] — Lossy encoding quality (1–100, default 75). Clamped on construction.
//! - [`Gravity`] — One of the nine compass anchors used by crops.
//! - [`Point`] / [`BoundingBox`] — Integer geometry in source pixel space.
//! - [`GeometrySpec`] — Resolved numeric inputs for the resize modes.
//! - [`CropSpec`] / [`ResizeSpec`] — Query-style `crop,...` and `resize,...` actions.
//! - [`OutputFormat`] — Encodable formats and their `image/<name>` content types.

use image::ImageFormat;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(75)
    }
}

/// Formats the service can encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
    Bmp,
    Tiff,
    Avif,
}

impl OutputFormat {
    /// Parse a format name or file suffix. `jpg` normalizes to `jpeg`.
    pub fn parse(name: &str) -> Option<Self> {
        let format = match name.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Self::Jpeg,
            "png" => Self::Png,
            "gif" => Self::Gif,
            "webp" => Self::WebP,
            "bmp" => Self::Bmp,
            "tif" | "tiff" => Self::Tiff,
            "avif" => Self::Avif,
            _ => return None,
        };
        Some(format)
    }

    /// Format of a storage key, from its suffix.
    pub fn from_key(key: &str) -> Option<Self> {
        let (_, suffix) = key.rsplit_once('.')?;
        Self::parse(suffix)
    }

    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Gif => Some(Self::Gif),
            ImageFormat::WebP => Some(Self::WebP),
            ImageFormat::Bmp => Some(Self::Bmp),
            ImageFormat::Tiff => Some(Self::Tiff),
            ImageFormat::Avif => Some(Self::Avif),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Avif => "avif",
        }
    }

    /// `image/<name>`, with `jpg` already normalized to `jpeg`.
    pub fn content_type(self) -> String {
        format!("image/{}", self.name())
    }

    /// Whether encoded output keeps an alpha channel.
    pub fn has_alpha(self) -> bool {
        !matches!(self, Self::Jpeg | Self::Bmp)
    }
}

/// Named anchor on the source image, laid out on a 3×3 grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gravity {
    NorthWest,
    North,
    NorthEast,
    West,
    Center,
    East,
    SouthWest,
    South,
    SouthEast,
}

impl Gravity {
    /// Parse a compass name, case-insensitively.
    ///
    /// Accepts the full names (`northwest` … `southeast`) and the corner
    /// abbreviations used by the query-style surface (`nw`, `ne`, `sw`, `se`).
    pub fn parse(name: &str) -> Option<Self> {
        let gravity = match name.to_ascii_lowercase().as_str() {
            "northwest" | "nw" => Self::NorthWest,
            "north" => Self::North,
            "northeast" | "ne" => Self::NorthEast,
            "west" => Self::West,
            "center" => Self::Center,
            "east" => Self::East,
            "southwest" | "sw" => Self::SouthWest,
            "south" => Self::South,
            "southeast" | "se" => Self::SouthEast,
            _ => return None,
        };
        Some(gravity)
    }

    /// Column and row of this anchor on the 3×3 grid.
    pub fn cell(self) -> (u32, u32) {
        match self {
            Self::NorthWest => (0, 0),
            Self::North => (1, 0),
            Self::NorthEast => (2, 0),
            Self::West => (0, 1),
            Self::Center => (1, 1),
            Self::East => (2, 1),
            Self::SouthWest => (0, 2),
            Self::South => (1, 2),
            Self::SouthEast => (2, 2),
        }
    }
}

/// Integer anchor in source-image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// Crop rectangle, `left`/`top` inclusive and `right`/`bottom` exclusive.
///
/// Produced only by [`clamp_box`](super::calculations::clamp_box), which
/// guarantees `0 <= left < right <= width` and `0 <= top < bottom <= height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Resolved numeric inputs for one resize mode.
///
/// For modes 1–3 `width`/`height` are the target box; modes 4–5 read them as
/// long and short edge. `None` means the directive did not supply the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeometrySpec {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl GeometrySpec {
    pub fn new(width: Option<u32>, height: Option<u32>) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.height.is_none()
    }
}

/// Scaling policy letters of the query-style `resize` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitMode {
    /// Bound box, no crop (imageView2 mode 2).
    Lfit,
    /// Minimum box, no crop (imageView2 mode 3).
    Mfit,
    /// Scale and center-crop (imageView2 mode 1).
    Fill,
    /// Exact resize, aspect ratio ignored.
    Fixed,
}

impl FitMode {
    pub fn parse(letters: &str) -> Option<Self> {
        match letters {
            "lfit" => Some(Self::Lfit),
            "mfit" => Some(Self::Mfit),
            "fill" => Some(Self::Fill),
            "fixed" => Some(Self::Fixed),
            _ => None,
        }
    }
}

/// The `imageMogr2/crop/<geometry>` forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropGeometry {
    /// `<W>x` — full height.
    Width(u32),
    /// `x<H>` — full width.
    Height(u32),
    /// `<W>x<H>`
    Size(u32, u32),
    /// `<W>x<H>a<dx>a<dy>` — nudged right/down from the anchor.
    Offset {
        width: u32,
        height: u32,
        dx: u32,
        dy: u32,
    },
}

/// A query-style `crop,w_..,h_..,x_..,y_..,g_..` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CropSpec {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub x: u32,
    pub y: u32,
    pub gravity: Option<Gravity>,
}

/// A query-style `resize,m_..,w_..,h_..,l_..,s_..,p_..` action.
///
/// `mode` keeps the raw letters so an unknown policy can be reported to the
/// caller instead of being silently replaced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResizeSpec {
    pub mode: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub long: Option<u32>,
    pub short: Option<u32>,
    pub percent: Option<u32>,
}
