//! Pipeline orchestration: one directive, one source, one output.
//!
//! ```text
//! Directive ──plan──▶ Plan
//! bytes ──decode──▶ Decoded ──orient──▶ Oriented ──steps──▶ Transformed ──encode──▶ Rendered
//! ```
//!
//! Planning happens before any pixel work, so an unsupported interface or
//! resize mode is reported without decoding the source. Each stage consumes
//! its input and produces a new value; animated sources run every step on
//! every frame (in parallel with rayon) and keep their delay and loop count.

use crate::directive::{Directive, MogrDirective, ProcessAction, ViewDirective};
use crate::imaging::operations::{self, ViewMode};
use crate::imaging::{
    BackendError, CropGeometry, CropSpec, Decoded, FitMode, FrameSequence, Frames,
    GeometryError, GeometrySpec, Gravity, ImageBackend, OutputFormat, Quality,
    ResizeSpec,
};
use image::DynamicImage;
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;

/// Content type of `imageInfo` responses.
pub const INFO_CONTENT_TYPE: &str = "application/json";

/// Content type for passthrough bytes nothing could identify.
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Errors that end one request. Display strings follow the vendor's terse
/// `"<what> err"` responses where one exists.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0} err")]
    UnsupportedInterface(String),
    #[error("m err")]
    UnsupportedMode(String),
    #[error("{0} err")]
    MissingParam(&'static str),
    #[error("Degenerate geometry: {0}")]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Image info serialization failed: {0}")]
    Info(#[from] serde_json::Error),
}

/// Encoded output of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// One geometry step, applied identically to every frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    View(ViewMode, GeometrySpec),
    Circle(u32),
    MogrCrop(Option<Gravity>, CropGeometry),
    Crop(CropSpec),
    Resize(FitMode, ResizeSpec),
}

/// A validated transform: what to do to the pixels and how to encode them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub orient: bool,
    pub steps: Vec<Step>,
    /// Raw output format override, resolved at encode time.
    pub format: Option<String>,
    pub quality: Option<Quality>,
}

/// What a directive asks the pipeline for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Passthrough,
    Info,
    Transform(Plan),
}

impl Request {
    /// Validate a parsed directive. `None` (nothing parsed) is a passthrough.
    pub fn from_directive(directive: Option<&Directive>) -> Result<Self, PipelineError> {
        let request = match directive {
            None => Self::Passthrough,
            Some(Directive::Info) => Self::Info,
            Some(Directive::Unsupported(interface)) => {
                return Err(PipelineError::UnsupportedInterface(
                    interface.name().to_string(),
                ));
            }
            Some(Directive::View(view)) => Self::Transform(plan_view(view)?),
            Some(Directive::Mogr(mogr)) => Self::Transform(plan_mogr(mogr)),
            Some(Directive::Process(actions)) => Self::Transform(plan_process(actions)?),
        };
        Ok(request)
    }
}

fn plan_view(view: &ViewDirective) -> Result<Plan, PipelineError> {
    let params = &view.params;
    let spec = GeometrySpec::new(params.positive("w"), params.positive("h"));
    let step = match view.mode.as_str() {
        "1" => Step::View(ViewMode::Fill, spec),
        "2" => Step::View(ViewMode::Lfit, spec),
        "3" => Step::View(ViewMode::Mfit, spec),
        "4" => Step::View(ViewMode::MinEdges, spec),
        "5" => Step::View(ViewMode::MinEdgesCrop, spec),
        "6" => Step::Circle(params.positive("r").ok_or(PipelineError::MissingParam("r"))?),
        other => return Err(PipelineError::UnsupportedMode(other.to_string())),
    };
    Ok(Plan {
        orient: true,
        steps: vec![step],
        format: params.first("format").map(str::to_string),
        quality: params.positive("q").map(Quality::new),
    })
}

fn plan_mogr(mogr: &MogrDirective) -> Plan {
    let steps = match (&mogr.crop, mogr.crop_geometry()) {
        (_, Some(geometry)) => vec![Step::MogrCrop(mogr.gravity, geometry)],
        (Some(token), None) => {
            debug!("Unrecognised crop geometry '{token}', image left uncropped");
            Vec::new()
        }
        (None, None) => Vec::new(),
    };
    Plan {
        orient: mogr.auto_orient,
        steps,
        format: mogr.format.clone(),
        quality: None,
    }
}

fn plan_process(actions: &[ProcessAction]) -> Result<Plan, PipelineError> {
    let mut plan = Plan::default();
    for action in actions {
        match action {
            ProcessAction::AutoOrient(enabled) => plan.orient = *enabled,
            ProcessAction::Resize(spec) => {
                let letters = spec.mode.as_deref().unwrap_or("lfit");
                let fit = FitMode::parse(letters)
                    .ok_or_else(|| PipelineError::UnsupportedMode(letters.to_string()))?;
                plan.steps.push(Step::Resize(fit, spec.clone()));
            }
            ProcessAction::Crop(spec) => plan.steps.push(Step::Crop(*spec)),
            ProcessAction::Circle { radius } => {
                let radius = radius.ok_or(PipelineError::MissingParam("r"))?;
                plan.steps.push(Step::Circle(radius));
            }
            ProcessAction::Format(format) => plan.format = Some(format.clone()),
            ProcessAction::Quality(quality) => plan.quality = quality.map(Quality::new),
        }
    }
    Ok(plan)
}

/// `imageInfo` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub color_model: String,
    pub frame_number: usize,
}

impl ImageInfo {
    pub fn from_decoded(decoded: &Decoded) -> Self {
        let (width, height) = decoded.frames.dimensions();
        let format = match decoded.output_format() {
            Some(format) => format.name().to_string(),
            None => format!("{:?}", decoded.format).to_ascii_lowercase(),
        };
        Self {
            width,
            height,
            format,
            color_model: decoded.frames.color_model().to_string(),
            frame_number: decoded.frames.frame_count(),
        }
    }
}

/// Content type for bytes served unchanged: key suffix first, then sniffing.
pub fn passthrough_content_type(source_key: &str, bytes: &[u8]) -> String {
    OutputFormat::from_key(source_key)
        .or_else(|| {
            image::guess_format(bytes)
                .ok()
                .and_then(OutputFormat::from_image_format)
        })
        .map_or_else(|| FALLBACK_CONTENT_TYPE.to_string(), OutputFormat::content_type)
}

/// Output format: explicit override, else the key suffix, else the source container.
pub fn resolve_format(
    plan: &Plan,
    source_key: &str,
    decoded: &Decoded,
) -> Result<OutputFormat, BackendError> {
    if let Some(name) = &plan.format {
        return OutputFormat::parse(name)
            .ok_or_else(|| BackendError::UnsupportedFormat(name.clone()));
    }
    OutputFormat::from_key(source_key)
        .or_else(|| decoded.output_format())
        .ok_or_else(|| BackendError::UnsupportedFormat(format!("{:?}", decoded.format)))
}

/// Run `request` against the source `bytes`.
pub fn run(
    backend: &impl ImageBackend,
    source_key: &str,
    bytes: &[u8],
    request: &Request,
) -> Result<Rendered, PipelineError> {
    let plan = match request {
        Request::Passthrough => {
            return Ok(Rendered {
                bytes: bytes.to_vec(),
                content_type: passthrough_content_type(source_key, bytes),
            });
        }
        Request::Info => {
            let info = ImageInfo::from_decoded(&backend.decode(bytes)?);
            return Ok(Rendered {
                bytes: serde_json::to_vec(&info)?,
                content_type: INFO_CONTENT_TYPE.to_string(),
            });
        }
        Request::Transform(plan) => plan,
    };

    let decoded = backend.decode(bytes)?;
    let format = resolve_format(plan, source_key, &decoded)?;
    let (width, height) = decoded.frames.dimensions();
    debug!(
        "{source_key}: decoded {width}x{height}, {} frame(s), {:?}",
        decoded.frames.frame_count(),
        decoded.orientation
    );

    let oriented = orient(decoded, plan.orient);
    let transformed = transform(oriented, &plan.steps, !format.has_alpha())?;
    let bytes = backend.encode(&transformed, format, plan.quality)?;

    let (out_w, out_h) = transformed.dimensions();
    info!(
        "{source_key}: {width}x{height} → {out_w}x{out_h} {} ({} bytes)",
        format.name(),
        bytes.len()
    );
    Ok(Rendered {
        bytes,
        content_type: format.content_type(),
    })
}

/// Apply the EXIF correction when requested; a no-op for identity.
pub fn orient(decoded: Decoded, enabled: bool) -> Frames {
    let orientation = decoded.orientation;
    if !enabled || orientation.is_identity() {
        return decoded.frames;
    }
    debug!("Applying orientation {orientation:?}");
    match map_frames(decoded.frames, |image| {
        Ok::<_, Infallible>(orientation.apply(image))
    }) {
        Ok(frames) => frames,
        Err(never) => match never {},
    }
}

/// Run every step, in order, on every frame.
pub fn transform(
    frames: Frames,
    steps: &[Step],
    opaque_target: bool,
) -> Result<Frames, PipelineError> {
    if steps.is_empty() {
        return Ok(frames);
    }
    map_frames(frames, |image| {
        steps
            .iter()
            .try_fold(image, |image, step| apply_step(image, step, opaque_target))
    })
}

fn apply_step(
    image: DynamicImage,
    step: &Step,
    opaque_target: bool,
) -> Result<DynamicImage, PipelineError> {
    let image = match step {
        Step::View(mode, spec) => operations::view(image, *mode, *spec)?,
        Step::Circle(radius) => operations::circle(image, *radius, opaque_target)?,
        Step::MogrCrop(gravity, geometry) => operations::mogr_crop(image, *gravity, *geometry)?,
        Step::Crop(spec) => operations::crop_region(image, spec)?,
        Step::Resize(fit, spec) => operations::resize(image, *fit, spec)?,
    };
    Ok(image)
}

/// Apply `f` to a still, or to each frame of a sequence in parallel.
fn map_frames<F, E>(frames: Frames, f: F) -> Result<Frames, E>
where
    F: Fn(DynamicImage) -> Result<DynamicImage, E> + Sync,
    E: Send,
{
    match frames {
        Frames::Still(image) => Ok(Frames::Still(f(image)?)),
        Frames::Animated(FrameSequence {
            frames,
            delay,
            loop_count,
        }) => {
            let frames = frames
                .into_par_iter()
                .map(&f)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Frames::Animated(FrameSequence {
                frames,
                delay,
                loop_count,
            }))
        }
    }
}
