//! Pure Rust codec backend built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Sniff container | `image::guess_format` |
//! | Decode stills (JPEG, PNG, TIFF, WebP, BMP) | `ImageReader::into_decoder` + `DynamicImage::from_decoder` |
//! | EXIF orientation | `ImageDecoder::orientation` |
//! | Decode animation | `GifDecoder::into_frames` + custom [`gif_meta`](super::gif_meta) loop count |
//! | Encode → JPEG | `JpegEncoder` (alpha flattened onto white) |
//! | Encode → WebP | `WebPEncoder::new_lossless` |
//! | Encode → AVIF | `AvifEncoder` (rav1e, speed 6) |
//! | Encode → GIF | `GifEncoder` (quality mapped to quantizer speed) |
//! | Encode → PNG, TIFF, BMP | `DynamicImage::write_to` |
//!
//! AVIF is output-only: the `"avif"` feature compiles the encoder but no
//! decoder, so AVIF sources are reported as unsupported.

use super::backend::{BackendError, Decoded, FrameSequence, Frames, ImageBackend, LoopCount};
use super::gif_meta;
use super::orientation::Orientation;
use super::params::{OutputFormat, Quality};
use image::codecs::avif::AvifEncoder;
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::error::ImageError;
use image::{
    AnimationDecoder, DynamicImage, Frame, ImageDecoder, ImageFormat, ImageReader, Rgb, RgbImage,
};
use log::{debug, warn};
use std::io::{self, Cursor};

/// AVIF encoder speed (1 slowest … 10 fastest).
const AVIF_SPEED: u8 = 6;

/// `image` crate backend.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend {
    default_quality: Quality,
}

impl RustBackend {
    pub fn new() -> Self {
        Self::with_default_quality(Quality::default())
    }

    /// Backend whose lossy encoders use `quality` when no override is given.
    pub fn with_default_quality(quality: Quality) -> Self {
        Self {
            default_quality: quality,
        }
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Sort an `image` error into the backend taxonomy.
fn classify(err: ImageError) -> BackendError {
    match err {
        ImageError::IoError(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            BackendError::Truncated(e.to_string())
        }
        ImageError::IoError(e) => BackendError::Io(e),
        ImageError::Unsupported(e) => BackendError::UnsupportedFormat(e.to_string()),
        other => BackendError::Decode(other.to_string()),
    }
}

fn encode_error(err: ImageError) -> BackendError {
    match err {
        ImageError::Unsupported(e) => BackendError::UnsupportedFormat(e.to_string()),
        other => BackendError::Encode(other.to_string()),
    }
}

fn decode_still(bytes: &[u8], format: ImageFormat) -> Result<Decoded, BackendError> {
    let mut decoder = ImageReader::with_format(Cursor::new(bytes), format)
        .into_decoder()
        .map_err(classify)?;
    let orientation = match decoder.orientation() {
        Ok(o) => Orientation::from_exif(o.to_exif()),
        Err(e) => {
            warn!("Unreadable EXIF orientation, assuming upright: {e}");
            Orientation::Identity
        }
    };
    let image = DynamicImage::from_decoder(decoder).map_err(classify)?;
    Ok(Decoded {
        format,
        orientation,
        frames: Frames::Still(image),
    })
}

fn decode_gif(bytes: &[u8]) -> Result<Decoded, BackendError> {
    let decoder = GifDecoder::new(Cursor::new(bytes)).map_err(classify)?;
    let frames = decoder.into_frames().collect_frames().map_err(classify)?;
    let delay = frames
        .first()
        .map(Frame::delay)
        .ok_or_else(|| BackendError::Truncated("GIF contains no frames".into()))?;

    let mut images: Vec<DynamicImage> = frames
        .into_iter()
        .map(|f| DynamicImage::ImageRgba8(f.into_buffer()))
        .collect();

    let frames = if images.len() == 1 {
        Frames::Still(images.remove(0))
    } else {
        let loop_count = gif_meta::loop_count(bytes);
        debug!(
            "Decoded {}-frame GIF, delay {:?}, loop {loop_count:?}",
            images.len(),
            delay.numer_denom_ms()
        );
        Frames::Animated(FrameSequence {
            frames: images,
            delay,
            loop_count,
        })
    };
    Ok(Decoded {
        format: ImageFormat::Gif,
        orientation: Orientation::Identity,
        frames,
    })
}

/// Composite any alpha onto white and drop the channel.
fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let px = rgba.get_pixel(x, y);
        let alpha = u32::from(px[3]);
        let blend = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(px[0]), blend(px[1]), blend(px[2])])
    })
}

/// NeuQuant speed for a quality: 100 → 1 (best), 1 → 30 (fastest).
fn gif_speed(quality: Quality) -> i32 {
    1 + (100 - quality.value() as i32) * 29 / 99
}

fn repeat(loop_count: LoopCount) -> Repeat {
    match loop_count {
        LoopCount::Infinite => Repeat::Infinite,
        LoopCount::Finite(n) => Repeat::Finite(n),
    }
}

fn encode_still(
    image: &DynamicImage,
    format: OutputFormat,
    quality: Quality,
) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value() as u8);
            DynamicImage::ImageRgb8(flatten_on_white(image))
                .write_with_encoder(encoder)
                .map_err(encode_error)?;
        }
        OutputFormat::WebP => {
            let encoder = WebPEncoder::new_lossless(&mut buf);
            DynamicImage::ImageRgba8(image.to_rgba8())
                .write_with_encoder(encoder)
                .map_err(encode_error)?;
        }
        OutputFormat::Avif => {
            let encoder =
                AvifEncoder::new_with_speed_quality(&mut buf, AVIF_SPEED, quality.value() as u8);
            DynamicImage::ImageRgba8(image.to_rgba8())
                .write_with_encoder(encoder)
                .map_err(encode_error)?;
        }
        OutputFormat::Gif => {
            let mut encoder = GifEncoder::new_with_speed(&mut buf, gif_speed(quality));
            encoder
                .encode_frame(Frame::new(image.to_rgba8()))
                .map_err(encode_error)?;
        }
        OutputFormat::Bmp => {
            DynamicImage::ImageRgb8(flatten_on_white(image))
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::Bmp)
                .map_err(encode_error)?;
        }
        OutputFormat::Png => {
            image
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
                .map_err(encode_error)?;
        }
        OutputFormat::Tiff => {
            image
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::Tiff)
                .map_err(encode_error)?;
        }
    }
    Ok(buf)
}

fn encode_animation(seq: &FrameSequence, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut buf, gif_speed(quality));
        encoder
            .set_repeat(repeat(seq.loop_count))
            .map_err(encode_error)?;
        let frames = seq
            .frames
            .iter()
            .map(|f| Frame::from_parts(f.to_rgba8(), 0, 0, seq.delay));
        encoder.encode_frames(frames).map_err(encode_error)?;
    }
    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn decode(&self, bytes: &[u8]) -> Result<Decoded, BackendError> {
        if bytes.is_empty() {
            return Err(BackendError::Truncated("empty input".into()));
        }
        let format = image::guess_format(bytes).map_err(classify)?;
        match format {
            ImageFormat::Gif => decode_gif(bytes),
            ImageFormat::Avif => Err(BackendError::UnsupportedFormat(
                "AVIF decoding is not available".into(),
            )),
            other => decode_still(bytes, other),
        }
    }

    fn encode(
        &self,
        frames: &Frames,
        format: OutputFormat,
        quality: Option<Quality>,
    ) -> Result<Vec<u8>, BackendError> {
        let quality = quality.unwrap_or(self.default_quality);
        match (frames, format) {
            (Frames::Animated(seq), OutputFormat::Gif) => encode_animation(seq, quality),
            (Frames::Animated(seq), _) => {
                let first = seq
                    .frames
                    .first()
                    .ok_or_else(|| BackendError::Encode("empty frame sequence".into()))?;
                encode_still(first, format, quality)
            }
            (Frames::Still(image), _) => encode_still(image, format, quality),
        }
    }
}
