//! High-level image operations.
//!
//! Each function consumes a buffer and returns a new one: geometry comes from
//! [`calculations`](super::calculations), pixels from the `image` crate.
//! Nothing here touches I/O, so the orchestrator can compose them freely and
//! run them per frame for animated sources.

use super::calculations::{
    self, CirclePlan, GeometryError, MAX_CROP_EDGE, ResizePlan, clamp_box, gravity_point,
};
use super::params::{
    BoundingBox, CropGeometry, CropSpec, FitMode, GeometrySpec, Gravity, ResizeSpec,
};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, GrayImage, Luma, Rgb, RgbImage};
use log::debug;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, GeometryError>;

/// Resampling filter for every scale step (bicubic).
pub const RESAMPLE_FILTER: FilterType = FilterType::CatmullRom;

/// The five scaling policies of `imageView2` (mode 6 is [`circle`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Fill,
    Lfit,
    Mfit,
    MinEdges,
    MinEdgesCrop,
}

impl ViewMode {
    /// Plan this mode for an image of `size`.
    pub fn plan(self, size: (u32, u32), spec: GeometrySpec) -> Result<ResizePlan> {
        match self {
            Self::Fill => calculations::plan_fill(size, spec),
            Self::Lfit => calculations::plan_lfit(size, spec),
            Self::Mfit => calculations::plan_mfit(size, spec),
            Self::MinEdges => calculations::plan_min_edges(size, spec),
            Self::MinEdgesCrop => calculations::plan_min_edges_crop(size, spec),
        }
    }
}

/// Cut `bbox` out of `image`.
pub fn crop(image: &DynamicImage, bbox: BoundingBox) -> DynamicImage {
    image.crop_imm(bbox.left, bbox.top, bbox.width(), bbox.height())
}

/// Execute a [`ResizePlan`]: scale first, then crop.
pub fn apply_plan(image: DynamicImage, plan: &ResizePlan) -> DynamicImage {
    let scaled = match plan.scale {
        Some((w, h)) => image.resize_exact(w, h, RESAMPLE_FILTER),
        None => image,
    };
    match plan.crop {
        Some(bbox) => crop(&scaled, bbox),
        None => scaled,
    }
}

/// Apply one of the `imageView2` scaling modes.
pub fn view(image: DynamicImage, mode: ViewMode, spec: GeometrySpec) -> Result<DynamicImage> {
    let plan = mode.plan(image.dimensions(), spec)?;
    debug!("{mode:?} {spec:?} on {:?} → {plan:?}", image.dimensions());
    Ok(apply_plan(image, &plan))
}

/// `imageMogr2/gravity/<g>/crop/<geometry>`.
///
/// Requests whose edge reaches [`MAX_CROP_EDGE`] leave the image unchanged.
pub fn mogr_crop(
    image: DynamicImage,
    gravity: Option<Gravity>,
    geometry: CropGeometry,
) -> Result<DynamicImage> {
    let size = image.dimensions();
    let (width, height, dx, dy, oversized) = match geometry {
        CropGeometry::Width(w) => (w, size.1, 0, 0, w >= MAX_CROP_EDGE),
        CropGeometry::Height(h) => (size.0, h, 0, 0, h >= MAX_CROP_EDGE),
        CropGeometry::Size(w, h) => (w, h, 0, 0, w.min(h) >= MAX_CROP_EDGE),
        CropGeometry::Offset {
            width,
            height,
            dx,
            dy,
        } => (width, height, dx, dy, width.min(height) >= MAX_CROP_EDGE),
    };
    if oversized {
        debug!("crop {geometry:?} exceeds {MAX_CROP_EDGE}, skipped");
        return Ok(image);
    }
    let anchor = gravity_point(size, gravity);
    let bbox = clamp_box(size, anchor, width, height, i64::from(dx), i64::from(dy))?;
    Ok(crop(&image, bbox))
}

/// Query-style `crop,w_..,h_..,x_..,y_..,g_..`.
///
/// Missing sides default to the image size; a side that would run past the
/// edge from its offset is shortened, and a crop left with no area is skipped.
pub fn crop_region(image: DynamicImage, spec: &CropSpec) -> Result<DynamicImage> {
    let (sw, sh) = image.dimensions();
    let fit = |side: Option<u32>, extent: u32, offset: u32| {
        let side = side.unwrap_or(extent);
        if u64::from(side) + u64::from(offset) > u64::from(extent) {
            extent.saturating_sub(offset)
        } else {
            side
        }
    };
    let width = fit(spec.width, sw, spec.x);
    let height = fit(spec.height, sh, spec.y);
    if width == 0 || height == 0 {
        debug!("crop {spec:?} has no area on {sw}x{sh}, skipped");
        return Ok(image);
    }
    mogr_crop(
        image,
        spec.gravity,
        CropGeometry::Offset {
            width,
            height,
            dx: spec.x,
            dy: spec.y,
        },
    )
}

/// Query-style `resize,m_..,w_..,h_..,l_..,s_..,p_..` with a validated policy.
///
/// `l` and `s` run first as square bound/minimum boxes; the policy then uses
/// `w`/`h`, which default to the size the image had on entry (before `l`/`s`);
/// `p` finally shrinks by percent.
pub fn resize(image: DynamicImage, fit: FitMode, spec: &ResizeSpec) -> Result<DynamicImage> {
    let (cw, ch) = image.dimensions();
    let (w, h) = (spec.width.unwrap_or(cw), spec.height.unwrap_or(ch));
    let mut image = image;
    if let Some(l) = spec.long {
        image = view(image, ViewMode::Lfit, GeometrySpec::new(Some(l), Some(l)))?;
    }
    if let Some(s) = spec.short {
        image = view(image, ViewMode::Mfit, GeometrySpec::new(Some(s), Some(s)))?;
    }

    let target = GeometrySpec::new(Some(w), Some(h));
    image = match fit {
        FitMode::Lfit => view(image, ViewMode::Lfit, target)?,
        FitMode::Mfit => view(image, ViewMode::Mfit, target)?,
        FitMode::Fill => view(image, ViewMode::Fill, target)?,
        FitMode::Fixed => {
            let plan = calculations::plan_fixed(image.dimensions(), w, h)?;
            apply_plan(image, &plan)
        }
    };

    if let Some(p) = spec.percent {
        let plan = calculations::plan_percent(image.dimensions(), p)?;
        image = apply_plan(image, &plan);
    }
    Ok(image)
}

/// Mode 6: circular crop of radius `radius`.
///
/// Non-square sources are center-cropped to a square first. With
/// `opaque_target` (formats without alpha) the circle is drawn on a white
/// canvas; otherwise a circular mask becomes the alpha channel. Either way the
/// result is exactly `2r × 2r` for the clamped radius `r`.
pub fn circle(image: DynamicImage, radius: u32, opaque_target: bool) -> Result<DynamicImage> {
    let plan = calculations::plan_circle(image.dimensions(), radius)?;
    debug!("circle r={radius} on {:?} → {plan:?}", image.dimensions());
    let square = apply_plan(image, &plan.square);
    if opaque_target {
        Ok(circle_on_canvas(&square, &plan))
    } else {
        circle_with_mask(&square, &plan)
    }
}

/// Copy every pixel within `r` of the center onto a white `2r` canvas.
fn circle_on_canvas(square: &DynamicImage, plan: &CirclePlan) -> DynamicImage {
    let source = square.to_rgb8();
    let diameter = plan.diameter();
    let radius = f64::from(plan.radius);
    let center = f64::from(plan.side) / 2.0;
    let origin = center - radius;

    let mut canvas = RgbImage::from_pixel(diameter, diameter, Rgb([255, 255, 255]));
    for (x, y, px) in source.enumerate_pixels() {
        let dx = f64::from(x) - center;
        let dy = f64::from(y) - center;
        if dx.hypot(dy) >= radius {
            continue;
        }
        let cx = (f64::from(x) - origin) as u32;
        let cy = (f64::from(y) - origin) as u32;
        if cx < diameter && cy < diameter {
            canvas.put_pixel(cx, cy, *px);
        }
    }
    DynamicImage::ImageRgb8(canvas)
}

/// Use a filled disk as the alpha channel, then crop to the disk's bounds.
fn circle_with_mask(square: &DynamicImage, plan: &CirclePlan) -> Result<DynamicImage> {
    let mut rgba = square.to_rgba8();
    let offset = plan.mask_offset();

    let mut alpha = GrayImage::from_pixel(plan.side, plan.side, Luma([255]));
    imageops::replace(
        &mut alpha,
        &disk_mask(plan.radius),
        i64::from(offset),
        i64::from(offset),
    );
    for (px, a) in rgba.pixels_mut().zip(alpha.pixels()) {
        px[3] = a[0];
    }

    let size = (plan.side, plan.side);
    let bbox = clamp_box(
        size,
        gravity_point(size, None),
        plan.diameter(),
        plan.diameter(),
        i64::from(offset),
        i64::from(offset),
    )?;
    Ok(crop(&DynamicImage::ImageRgba8(rgba), bbox))
}

/// `2r × 2r` single-channel mask: 255 inside the inscribed disk, 0 outside.
pub fn disk_mask(radius: u32) -> GrayImage {
    let r = f64::from(radius);
    GrayImage::from_fn(2 * radius, 2 * radius, |x, y| {
        let dx = f64::from(x) + 0.5 - r;
        let dy = f64::from(y) + 0.5 - r;
        if dx * dx + dy * dy <= r * r {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    // =========================================================================
    // view modes
    // =========================================================================

    #[test]
    fn fill_produces_exact_target() {
        let out = view(
            gradient(800, 600),
            ViewMode::Fill,
            GeometrySpec::new(Some(200), Some(200)),
        )
        .unwrap();
        assert_eq!(out.dimensions(), (200, 200));
    }

    #[test]
    fn lfit_width_only_keeps_aspect() {
        let out = view(
            gradient(1000, 500),
            ViewMode::Lfit,
            GeometrySpec::new(Some(300), None),
        )
        .unwrap();
        assert_eq!(out.dimensions(), (300, 150));
    }

    #[test]
    fn min_edges_crop_produces_edge_box() {
        let out = view(
            gradient(1000, 500),
            ViewMode::MinEdgesCrop,
            GeometrySpec::new(Some(400), Some(100)),
        )
        .unwrap();
        assert_eq!(out.dimensions(), (400, 100));
    }

    // =========================================================================
    // crops
    // =========================================================================

    #[test]
    fn mogr_crop_offset_from_origin() {
        let out = mogr_crop(
            gradient(300, 200),
            None,
            CropGeometry::Offset {
                width: 100,
                height: 50,
                dx: 10,
                dy: 20,
            },
        )
        .unwrap();
        assert_eq!(out.dimensions(), (100, 50));
        // Top-left pixel came from (10, 20).
        assert_eq!(out.get_pixel(0, 0).0[..2], [10u8, 20]);
    }

    #[test]
    fn mogr_crop_width_only_keeps_height() {
        let out = mogr_crop(gradient(300, 200), None, CropGeometry::Width(120)).unwrap();
        assert_eq!(out.dimensions(), (120, 200));
    }

    #[test]
    fn mogr_crop_oversized_is_noop() {
        let out = mogr_crop(gradient(30, 20), None, CropGeometry::Size(10_000, 10_000)).unwrap();
        assert_eq!(out.dimensions(), (30, 20));
    }

    #[test]
    fn mogr_crop_uses_gravity_anchor() {
        let out = mogr_crop(
            gradient(300, 300),
            Some(Gravity::SouthEast),
            CropGeometry::Size(100, 100),
        )
        .unwrap();
        // Anchor (200, 200): box 150..250.
        assert_eq!(out.get_pixel(0, 0).0[..2], [150u8, 150]);
    }

    #[test]
    fn crop_region_shortens_sides_past_edge() {
        let spec = CropSpec {
            width: Some(250),
            height: Some(250),
            x: 100,
            y: 50,
            gravity: None,
        };
        let out = crop_region(gradient(300, 200), &spec).unwrap();
        assert_eq!(out.dimensions(), (200, 150));
        assert_eq!(out.get_pixel(0, 0).0[..2], [100u8, 50]);
    }

    #[test]
    fn crop_region_offset_past_edge_is_noop() {
        let spec = CropSpec {
            x: 400,
            ..CropSpec::default()
        };
        let out = crop_region(gradient(300, 200), &spec).unwrap();
        assert_eq!(out.dimensions(), (300, 200));
    }

    // =========================================================================
    // resize action
    // =========================================================================

    #[test]
    fn resize_fixed_ignores_aspect() {
        let spec = ResizeSpec {
            width: Some(50),
            height: Some(80),
            ..ResizeSpec::default()
        };
        let out = resize(gradient(300, 200), FitMode::Fixed, &spec).unwrap();
        assert_eq!(out.dimensions(), (50, 80));
    }

    #[test]
    fn resize_long_then_percent() {
        let spec = ResizeSpec {
            long: Some(100),
            percent: Some(50),
            ..ResizeSpec::default()
        };
        // l_100 → 100x50, lfit to the 400x200 entry size → unchanged, p_50 → 50x25
        let out = resize(gradient(400, 200), FitMode::Lfit, &spec).unwrap();
        assert_eq!(out.dimensions(), (50, 25));
    }

    #[test]
    fn resize_fixed_defaults_to_entry_size() {
        let spec = ResizeSpec {
            long: Some(100),
            ..ResizeSpec::default()
        };
        // l_100 → 100x50, then fixed back to the 400x200 it started at
        let out = resize(gradient(400, 200), FitMode::Fixed, &spec).unwrap();
        assert_eq!(out.dimensions(), (400, 200));
    }

    #[test]
    fn resize_percent_truncates_target_box() {
        let spec = ResizeSpec {
            percent: Some(50),
            ..ResizeSpec::default()
        };
        let out = resize(gradient(333, 100), FitMode::Lfit, &spec).unwrap();
        assert_eq!(out.dimensions(), (166, 49));
    }

    #[test]
    fn resize_fill_crops_to_box() {
        let spec = ResizeSpec {
            width: Some(100),
            height: Some(100),
            ..ResizeSpec::default()
        };
        let out = resize(gradient(400, 200), FitMode::Fill, &spec).unwrap();
        assert_eq!(out.dimensions(), (100, 100));
    }

    // =========================================================================
    // circle
    // =========================================================================

    #[test]
    fn circle_opaque_is_diameter_with_white_corners() {
        let out = circle(gradient(300, 200), 40, true).unwrap();
        assert_eq!(out.dimensions(), (80, 80));
        assert!(!out.color().has_alpha());
        assert_eq!(out.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn circle_alpha_has_transparent_corners_and_opaque_center() {
        let out = circle(gradient(300, 200), 40, false).unwrap();
        assert_eq!(out.dimensions(), (80, 80));
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(out.get_pixel(40, 40)[3], 255);
    }

    #[test]
    fn circle_radius_clamped_to_short_side() {
        let out = circle(gradient(300, 200), 1000, false).unwrap();
        assert_eq!(out.dimensions(), (200, 200));
    }

    #[test]
    fn circle_keeps_center_pixel() {
        let src = DynamicImage::ImageRgba8(RgbaImage::from_fn(100, 100, |x, y| {
            Rgba([x as u8, y as u8, 0, 255])
        }));
        let out = circle(src, 10, false).unwrap();
        // Mask offset 40: output (10, 10) came from source (50, 50).
        assert_eq!(out.get_pixel(10, 10), Rgba([50, 50, 0, 255]));
    }

    #[test]
    fn disk_mask_corners_are_black() {
        let mask = disk_mask(5);
        assert_eq!(mask.dimensions(), (10, 10));
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert_eq!(mask.get_pixel(5, 5)[0], 255);
    }
}
