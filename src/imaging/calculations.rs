//! Pure calculation functions for crop and resize geometry.
//!
//! All functions here are pure and testable without any I/O or images. They
//! take a source size plus the resolved directive values and return a plan
//! ([`ResizePlan`], [`CirclePlan`], [`BoundingBox`]) that
//! [`operations`](super::operations) executes against a buffer.
//!
//! The engine only ever shrinks. Every mode treats a ratio `>= 1` as "already
//! satisfies the constraint" and plans no scaling for it.

use super::params::{BoundingBox, GeometrySpec, Gravity, Point};
use thiserror::Error;

/// Crops whose requested edge reaches this size are ignored outright.
pub const MAX_CROP_EDGE: u32 = 10_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("degenerate source image {width}x{height}")]
    DegenerateSource { width: u32, height: u32 },
    #[error("degenerate target {width}x{height}")]
    DegenerateTarget { width: u32, height: u32 },
}

fn ensure_source(size: (u32, u32)) -> Result<(), GeometryError> {
    if size.0 == 0 || size.1 == 0 {
        return Err(GeometryError::DegenerateSource {
            width: size.0,
            height: size.1,
        });
    }
    Ok(())
}

// =============================================================================
// Anchors and boxes
// =============================================================================

/// Resolve a gravity name to an anchor point on an image of `size`.
///
/// Width and height are divided into thirds; the anchor sits on the
/// `0`, `w/3` or `2w/3` line (same for height). `None` resolves to `(0, 0)`,
/// so callers that want a centered default must pass [`Gravity::Center`].
pub fn gravity_point(size: (u32, u32), gravity: Option<Gravity>) -> Point {
    let Some(gravity) = gravity else {
        return Point::default();
    };
    let (col, row) = gravity.cell();
    Point::new(
        i64::from(col) * i64::from(size.0) / 3,
        i64::from(row) * i64::from(size.1) / 3,
    )
}

/// Geometric center of an image, rounded down.
pub fn center_point(size: (u32, u32)) -> Point {
    Point::new(i64::from(size.0 / 2), i64::from(size.1 / 2))
}

/// Compute a crop rectangle that always stays inside the source.
///
/// In this order:
/// 1. clamp the desired width/height to the source dimensions;
/// 2. center the box on `anchor`;
/// 3. shift it right/down if it starts before the origin;
/// 4. shift it left/up if it ends past the far edge;
/// 5. nudge by `(dx, dy)`, moving only as far as the source allows.
///
/// Steps 3 and 4 never both fire on one axis because of step 1.
pub fn clamp_box(
    size: (u32, u32),
    anchor: Point,
    width: u32,
    height: u32,
    dx: i64,
    dy: i64,
) -> Result<BoundingBox, GeometryError> {
    ensure_source(size)?;
    if width == 0 || height == 0 {
        return Err(GeometryError::DegenerateTarget { width, height });
    }

    let (left, right) = clamp_axis(i64::from(size.0), anchor.x, i64::from(width), dx);
    let (top, bottom) = clamp_axis(i64::from(size.1), anchor.y, i64::from(height), dy);

    // Every coordinate is in 0..=extent after clamping.
    Ok(BoundingBox {
        left: left as u32,
        top: top as u32,
        right: right as u32,
        bottom: bottom as u32,
    })
}

/// One axis of [`clamp_box`]: returns `(start, end)` with `0 <= start < end <= extent`.
fn clamp_axis(extent: i64, anchor: i64, length: i64, offset: i64) -> (i64, i64) {
    let length = length.min(extent);

    // Half-length subtracted with truncation toward zero.
    let mut start = anchor.saturating_mul(2).saturating_sub(length) / 2;
    let mut end = start.saturating_add(length);

    if start < 0 {
        end -= start;
        start = 0;
    }
    if end > extent {
        start -= end - extent;
        end = extent;
    }

    let shift = offset.clamp(-start, extent - end);
    (start + shift, end + shift)
}

/// Box centered on the image, used by the center-cropping modes.
pub fn center_box(size: (u32, u32), width: u32, height: u32) -> Result<BoundingBox, GeometryError> {
    clamp_box(size, center_point(size), width, height, 0, 0)
}

// =============================================================================
// Resize plans
// =============================================================================

/// What a resize mode decided to do to an image.
///
/// Scaling (if any) happens first; the crop box is expressed in the scaled
/// image's coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResizePlan {
    pub scale: Option<(u32, u32)>,
    pub crop: Option<BoundingBox>,
}

impl ResizePlan {
    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn scale_to(width: u32, height: u32) -> Self {
        Self {
            scale: Some((width, height)),
            crop: None,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.scale.is_none() && self.crop.is_none()
    }

    /// Final output dimensions when applied to an image of `size`.
    pub fn output_size(&self, size: (u32, u32)) -> (u32, u32) {
        match (self.crop, self.scale) {
            (Some(b), _) => (b.width(), b.height()),
            (None, Some(s)) => s,
            (None, None) => size,
        }
    }
}

/// Scale both sides by `ratio`, truncating like the vendor does.
///
/// A tiny epsilon absorbs float error so that e.g. `600 * (200 / 600)` lands
/// on 200, not 199. Sides never drop below one pixel.
pub fn scale_dimensions(size: (u32, u32), ratio: f64) -> (u32, u32) {
    let scale = |side: u32| ((f64::from(side) * ratio + 1e-9).floor() as u32).max(1);
    (scale(size.0), scale(size.1))
}

fn ratio(target: u32, source: u32) -> f64 {
    f64::from(target) / f64::from(source)
}

/// Mode 1: scale to cover `width × height`, then center-crop to it.
///
/// A missing side turns the target into a square using the other side,
/// capped to the source's matching dimension. Scaling only happens when both
/// ratios are below one.
pub fn plan_fill(size: (u32, u32), spec: GeometrySpec) -> Result<ResizePlan, GeometryError> {
    ensure_source(size)?;
    let (w, h) = match (spec.width, spec.height) {
        (None, None) => return Ok(ResizePlan::unchanged()),
        (Some(w), None) => (w, w.min(size.1)),
        (None, Some(h)) => (h.min(size.0), h),
        (Some(w), Some(h)) => (w, h),
    };

    let ratio_w = ratio(w, size.0);
    let ratio_h = ratio(h, size.1);
    if ratio_w.min(ratio_h) >= 1.0 {
        return Ok(ResizePlan::unchanged());
    }

    let max_ratio = ratio_w.max(ratio_h);
    let (scale, current) = if max_ratio < 1.0 {
        let scaled = scale_dimensions(size, max_ratio);
        (Some(scaled), scaled)
    } else {
        (None, size)
    };

    let crop = center_box(current, w, h)?;
    let crop = ((crop.width(), crop.height()) != current).then_some(crop);
    Ok(ResizePlan { scale, crop })
}

/// Mode 2: fit inside `width × height`, no crop.
///
/// Only supplied sides count; a missing side contributes ratio 1.
pub fn plan_lfit(size: (u32, u32), spec: GeometrySpec) -> Result<ResizePlan, GeometryError> {
    ensure_source(size)?;
    if spec.is_empty() {
        return Ok(ResizePlan::unchanged());
    }
    let ratio_w = spec.width.map_or(1.0, |w| ratio(w, size.0));
    let ratio_h = spec.height.map_or(1.0, |h| ratio(h, size.1));
    let min_ratio = ratio_w.min(ratio_h);
    if min_ratio >= 1.0 {
        return Ok(ResizePlan::unchanged());
    }
    let (w, h) = scale_dimensions(size, min_ratio);
    Ok(ResizePlan::scale_to(w, h))
}

/// Mode 3: cover `width × height`, no crop. A missing side copies the other.
pub fn plan_mfit(size: (u32, u32), spec: GeometrySpec) -> Result<ResizePlan, GeometryError> {
    ensure_source(size)?;
    let Some((w, h)) = fill_square(spec) else {
        return Ok(ResizePlan::unchanged());
    };
    let max_ratio = ratio(w, size.0).max(ratio(h, size.1));
    if max_ratio >= 1.0 {
        return Ok(ResizePlan::unchanged());
    }
    let (w, h) = scale_dimensions(size, max_ratio);
    Ok(ResizePlan::scale_to(w, h))
}

/// Mode 4: long edge at least `width`, short edge at least `height`, no crop.
pub fn plan_min_edges(size: (u32, u32), spec: GeometrySpec) -> Result<ResizePlan, GeometryError> {
    ensure_source(size)?;
    let Some((long, short)) = fill_square(spec) else {
        return Ok(ResizePlan::unchanged());
    };
    let (source_long, source_short) = edges(size);
    let max_ratio = ratio(long, source_long).max(ratio(short, source_short));
    if max_ratio >= 1.0 {
        return Ok(ResizePlan::unchanged());
    }
    let (w, h) = scale_dimensions(size, max_ratio);
    Ok(ResizePlan::scale_to(w, h))
}

/// Mode 5: like mode 4, then center-crop to the long/short edge lengths.
///
/// The crop box follows the image orientation: landscape (or square) images
/// get `long × short`, portrait images `short × long`.
pub fn plan_min_edges_crop(
    size: (u32, u32),
    spec: GeometrySpec,
) -> Result<ResizePlan, GeometryError> {
    ensure_source(size)?;
    let Some((long, short)) = fill_square(spec) else {
        return Ok(ResizePlan::unchanged());
    };
    let (source_long, source_short) = edges(size);
    let long = long.min(source_long);
    let short = short.min(source_short);

    let ratio_long = ratio(long, source_long);
    let ratio_short = ratio(short, source_short);
    if ratio_long.min(ratio_short) >= 1.0 {
        return Ok(ResizePlan::unchanged());
    }

    let max_ratio = ratio_long.max(ratio_short);
    let (scale, current) = if max_ratio < 1.0 {
        let scaled = scale_dimensions(size, max_ratio);
        (Some(scaled), scaled)
    } else {
        (None, size)
    };

    let (crop_w, crop_h) = if current.0 >= current.1 {
        (long, short)
    } else {
        (short, long)
    };
    Ok(ResizePlan {
        scale,
        crop: Some(center_box(current, crop_w, crop_h)?),
    })
}

/// Exact resize to `width × height`, aspect ratio ignored.
pub fn plan_fixed(size: (u32, u32), width: u32, height: u32) -> Result<ResizePlan, GeometryError> {
    ensure_source(size)?;
    if width == 0 || height == 0 {
        return Err(GeometryError::DegenerateTarget { width, height });
    }
    if (width, height) == size {
        return Ok(ResizePlan::unchanged());
    }
    Ok(ResizePlan::scale_to(width, height))
}

/// Shrink to `percent` of the current size via the mode 2 rules.
///
/// The target box is `size * percent / 100` truncated per side, and mode 2
/// fits the image inside it, so the smaller of the two ratios wins. A side
/// that truncates to zero is left unconstrained.
pub fn plan_percent(size: (u32, u32), percent: u32) -> Result<ResizePlan, GeometryError> {
    ensure_source(size)?;
    let side = |extent: u32| {
        let target = u64::from(extent) * u64::from(percent) / 100;
        u32::try_from(target).ok().filter(|&t| t > 0)
    };
    plan_lfit(size, GeometrySpec::new(side(size.0), side(size.1)))
}

/// Fill a missing side from the other one. `None` if both are missing.
fn fill_square(spec: GeometrySpec) -> Option<(u32, u32)> {
    match (spec.width, spec.height) {
        (None, None) => None,
        (Some(w), None) => Some((w, w)),
        (None, Some(h)) => Some((h, h)),
        (Some(w), Some(h)) => Some((w, h)),
    }
}

/// `(long, short)` edges of an image.
pub fn edges(size: (u32, u32)) -> (u32, u32) {
    (size.0.max(size.1), size.0.min(size.1))
}

// =============================================================================
// Circle plans
// =============================================================================

/// Geometry of a circular crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CirclePlan {
    /// Side of the square the circle is cut from (`min(width, height)`).
    pub side: u32,
    /// Radius after clamping to `side / 2`.
    pub radius: u32,
    /// Center-crop applied first when the source is not square.
    pub square: ResizePlan,
}

impl CirclePlan {
    /// Offset of the circle's bounding square inside the `side × side` image.
    pub fn mask_offset(&self) -> u32 {
        (self.side - 2 * self.radius) / 2
    }

    /// Side of the final output.
    pub fn diameter(&self) -> u32 {
        2 * self.radius
    }
}

/// Clamp the requested radius and square the source if needed.
pub fn plan_circle(size: (u32, u32), radius: u32) -> Result<CirclePlan, GeometryError> {
    ensure_source(size)?;
    let side = size.0.min(size.1);
    let radius = radius.min(side / 2);
    if radius == 0 {
        return Err(GeometryError::DegenerateTarget {
            width: 0,
            height: 0,
        });
    }
    let square = if size.0 != size.1 {
        plan_fill(size, GeometrySpec::new(Some(side), Some(side)))?
    } else {
        ResizePlan::unchanged()
    };
    Ok(CirclePlan {
        side,
        radius,
        square,
    })
}
