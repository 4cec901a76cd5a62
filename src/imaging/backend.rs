//! Image codec backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the decode/encode boundary of the pipeline:
//! bytes in, [`Decoded`] frames out, and back again. Geometry never happens
//! here; it lives in [`operations`](super::operations) and runs on the
//! buffers this trait produces.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate's pure Rust codecs.

use super::orientation::Orientation;
use super::params::{OutputFormat, Quality};
use image::{ColorType, Delay, DynamicImage, GenericImageView, ImageFormat};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Truncated image data: {0}")]
    Truncated(String),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// How often an animation plays, as stored in the GIF loop extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCount {
    Infinite,
    /// Extra plays after the first. `Finite(0)` plays once.
    Finite(u16),
}

/// Frames of an animated source sharing one display duration and loop count.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    pub frames: Vec<DynamicImage>,
    pub delay: Delay,
    pub loop_count: LoopCount,
}

/// Pixel content flowing between decode and encode.
#[derive(Debug, Clone)]
pub enum Frames {
    Still(DynamicImage),
    Animated(FrameSequence),
}

impl Frames {
    /// Dimensions of the (first) frame.
    pub fn dimensions(&self) -> (u32, u32) {
        self.first().map_or((0, 0), |f| f.dimensions())
    }

    pub fn frame_count(&self) -> usize {
        match self {
            Self::Still(_) => 1,
            Self::Animated(seq) => seq.frames.len(),
        }
    }

    pub fn first(&self) -> Option<&DynamicImage> {
        match self {
            Self::Still(image) => Some(image),
            Self::Animated(seq) => seq.frames.first(),
        }
    }

    /// Short color model name of the first frame (`RGB`, `RGBA`, `L`, ...).
    pub fn color_model(&self) -> &'static str {
        let Some(image) = self.first() else {
            return "unknown";
        };
        match image.color() {
            ColorType::L8 | ColorType::L16 => "L",
            ColorType::La8 | ColorType::La16 => "LA",
            ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Rgb32F => "RGB",
            ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => "RGBA",
            _ => "unknown",
        }
    }
}

/// A decoded source image.
#[derive(Debug, Clone)]
pub struct Decoded {
    /// Container the bytes were sniffed as.
    pub format: ImageFormat,
    /// Correction from the embedded EXIF tag; identity when absent or unreadable.
    pub orientation: Orientation,
    pub frames: Frames,
}

impl Decoded {
    /// Output format matching the source container, if it can be encoded.
    pub fn output_format(&self) -> Option<OutputFormat> {
        OutputFormat::from_image_format(self.format)
    }
}

/// Decode/encode boundary used by the pipeline.
///
/// `Sync` so one backend can serve every rayon worker.
pub trait ImageBackend: Sync {
    /// Sniff and decode `bytes`. Animated GIFs decode to [`Frames::Animated`].
    fn decode(&self, bytes: &[u8]) -> Result<Decoded, BackendError>;

    /// Encode `frames` as `format`. `quality` overrides the backend's default
    /// for lossy encoders; animated sequences stay animated only as GIF.
    fn encode(
        &self,
        frames: &Frames,
        format: OutputFormat,
        quality: Option<Quality>,
    ) -> Result<Vec<u8>, BackendError>;
}
