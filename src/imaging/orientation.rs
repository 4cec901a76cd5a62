//! EXIF orientation correction.
//!
//! The eight EXIF orientation codes describe how the stored pixels must be
//! transformed to display upright:
//!
//! | Code | Correction |
//! |---|---|
//! | 1 | identity |
//! | 2 | horizontal flip |
//! | 3 | 180° rotation |
//! | 4 | vertical flip |
//! | 5 | rotate 270° (counter-clockwise), then horizontal flip |
//! | 6 | rotate 270° (counter-clockwise) |
//! | 7 | rotate 90° (counter-clockwise), then horizontal flip |
//! | 8 | rotate 90° (counter-clockwise) |
//!
//! `image` rotates clockwise, so a 270° counter-clockwise turn is
//! `rotate90` and a 90° counter-clockwise turn is `rotate270`.

use image::DynamicImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Identity,
    FlipHorizontal,
    Rotate180,
    FlipVertical,
    Rotate270FlipHorizontal,
    Rotate270,
    Rotate90FlipHorizontal,
    Rotate90,
}

impl Orientation {
    /// Map an EXIF orientation code. Unknown codes fall back to identity.
    pub fn from_exif(code: u8) -> Self {
        match code {
            2 => Self::FlipHorizontal,
            3 => Self::Rotate180,
            4 => Self::FlipVertical,
            5 => Self::Rotate270FlipHorizontal,
            6 => Self::Rotate270,
            7 => Self::Rotate90FlipHorizontal,
            8 => Self::Rotate90,
            _ => Self::Identity,
        }
    }

    pub fn is_identity(self) -> bool {
        self == Self::Identity
    }

    /// Whether the correction swaps width and height.
    #[cfg(test)]
    fn swaps_axes(self) -> bool {
        matches!(
            self,
            Self::Rotate270FlipHorizontal
                | Self::Rotate270
                | Self::Rotate90FlipHorizontal
                | Self::Rotate90
        )
    }

    /// Apply the correction, returning a new buffer.
    pub fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Self::Identity => image,
            Self::FlipHorizontal => image.fliph(),
            Self::Rotate180 => image.rotate180(),
            Self::FlipVertical => image.flipv(),
            Self::Rotate270FlipHorizontal => image.rotate90().fliph(),
            Self::Rotate270 => image.rotate90(),
            Self::Rotate90FlipHorizontal => image.rotate270().fliph(),
            Self::Rotate90 => image.rotate270(),
        }
    }
}
