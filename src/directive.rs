//! Directive parsing.
//!
//! A directive is the mini-language a client appends to an image URL. Three
//! surface forms are recognised:
//!
//! | Form | Example |
//! |---|---|
//! | Slash path, `imageView2` | `imageView2/1/w/200/h/200/format/png` |
//! | Slash path, `imageMogr2` | `imageMogr2/auto-orient/gravity/north/crop/200x100a10a10` |
//! | Query-style process chain | `image/resize,m_fill,w_200/crop,w_100,g_nw/quality,q_80` |
//!
//! Parsing never fails: anything malformed degrades to "no directive"
//! (`None`, the source is served unchanged) or to an absent value. Rejecting
//! unsupported interfaces and modes is the pipeline's job, so the caller gets
//! the vendor's textual error rather than a silent passthrough.

use crate::imaging::{CropGeometry, CropSpec, Gravity, ResizeSpec};
use log::warn;

/// Prefix of the query-style process chain.
const PROCESS_PREFIX: &str = "image/";

/// Interface named by the first token of a slash-path directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interface {
    ImageInfo,
    ImageView2,
    Exif,
    ImageMogr2,
    Watermark,
    ImageAve,
}

impl Interface {
    pub fn parse(name: &str) -> Option<Self> {
        let interface = match name {
            "imageInfo" => Self::ImageInfo,
            "imageView2" => Self::ImageView2,
            "exif" => Self::Exif,
            "imageMogr2" => Self::ImageMogr2,
            "watermark" => Self::Watermark,
            "imageAve" => Self::ImageAve,
            _ => return None,
        };
        Some(interface)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ImageInfo => "imageInfo",
            Self::ImageView2 => "imageView2",
            Self::Exif => "exif",
            Self::ImageMogr2 => "imageMogr2",
            Self::Watermark => "watermark",
            Self::ImageAve => "imageAve",
        }
    }
}

/// Ordered multimap of `key/value` pairs.
///
/// Keys keep the order of their first occurrence; a repeated key appends its
/// value to the existing entry instead of replacing it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, Vec<String>)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some((_, values)) => values.push(value.to_string()),
            None => self.0.push((key.to_string(), vec![value.to_string()])),
        }
    }

    /// Every value given for `key`, in request order.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
            .unwrap_or_default()
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.get_all(key).first().map(String::as_str)
    }

    /// First value of `key` as a positive integer. Malformed or zero is absent.
    pub fn positive(&self, key: &str) -> Option<u32> {
        self.first(key).and_then(parse_positive)
    }

    #[cfg(test)]
    fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }
}

/// `imageView2/<mode>/<key>/<value>/...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDirective {
    /// Raw mode token; validated by the pipeline so a bad mode reports `m err`.
    pub mode: String,
    pub params: Params,
}

/// `imageMogr2/...` flags and keyed options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MogrDirective {
    pub auto_orient: bool,
    pub strip: bool,
    pub blur: bool,
    pub thumbnail: Option<String>,
    pub gravity: Option<Gravity>,
    /// Raw crop token; `None` after parsing means no crop was requested.
    pub crop: Option<String>,
    pub rotate: Option<String>,
    pub format: Option<String>,
    pub interlace: Option<String>,
}

impl MogrDirective {
    /// The crop token parsed against the `imageMogr2` crop grammar.
    pub fn crop_geometry(&self) -> Option<CropGeometry> {
        self.crop.as_deref().and_then(parse_crop_geometry)
    }
}

/// One step of the query-style chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessAction {
    AutoOrient(bool),
    Resize(ResizeSpec),
    Crop(CropSpec),
    Circle { radius: Option<u32> },
    Format(String),
    Quality(Option<u32>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Info,
    View(ViewDirective),
    Mogr(MogrDirective),
    Process(Vec<ProcessAction>),
    /// Recognised interface the pipeline does not implement.
    Unsupported(Interface),
}

impl Directive {
    /// Interface this directive was addressed to. The process chain is the
    /// query-style spelling of `imageMogr2`.
    pub fn interface(&self) -> Interface {
        match self {
            Self::Info => Interface::ImageInfo,
            Self::View(_) => Interface::ImageView2,
            Self::Mogr(_) | Self::Process(_) => Interface::ImageMogr2,
            Self::Unsupported(interface) => *interface,
        }
    }
}

/// Parse a directive string. `None` means "serve the source unchanged".
pub fn parse(directive: &str) -> Option<Directive> {
    let directive = directive.trim().trim_start_matches('?');
    if directive.is_empty() {
        return None;
    }
    if let Some(chain) = directive.strip_prefix(PROCESS_PREFIX) {
        return Some(Directive::Process(parse_process_chain(chain)));
    }

    let tokens: Vec<&str> = directive.split('/').collect();
    let Some(interface) = Interface::parse(tokens[0]) else {
        warn!("Unknown interface '{}', passing through", tokens[0]);
        return None;
    };

    match interface {
        Interface::ImageInfo => Some(Directive::Info),
        Interface::ImageView2 => {
            if tokens.len() <= 2 {
                return None;
            }
            Some(Directive::View(ViewDirective {
                mode: tokens[1].to_string(),
                params: parse_pairs(&tokens[2..]),
            }))
        }
        Interface::ImageMogr2 => Some(Directive::Mogr(parse_mogr(&tokens[1..]))),
        Interface::Watermark if tokens.len() <= 2 => None,
        other => Some(Directive::Unsupported(other)),
    }
}

/// `["w", "2", "h", "3"]` → `{w: [2], h: [3]}`. A trailing key without a value is dropped.
fn parse_pairs(tokens: &[&str]) -> Params {
    let mut params = Params::new();
    for pair in tokens.chunks_exact(2) {
        params.insert(pair[0], pair[1]);
    }
    params
}

fn parse_mogr(tokens: &[&str]) -> MogrDirective {
    let has = |flag: &str| tokens.contains(&flag);
    let option = |name: &str| {
        let index = tokens.iter().position(|t| *t == name)?;
        tokens.get(index + 1).map(|v| v.to_string())
    };

    MogrDirective {
        auto_orient: has("auto-orient"),
        strip: has("strip"),
        blur: has("blur"),
        thumbnail: option("thumbnail"),
        gravity: option("gravity").and_then(|g| Gravity::parse(&g)),
        crop: option("crop"),
        rotate: option("rotate"),
        format: option("format"),
        interlace: option("interlace"),
    }
}

fn parse_process_chain(chain: &str) -> Vec<ProcessAction> {
    chain
        .split('/')
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| {
            let action = parse_action(segment);
            if action.is_none() {
                warn!("Ignoring unknown process action '{segment}'");
            }
            action
        })
        .collect()
}

fn parse_action(segment: &str) -> Option<ProcessAction> {
    let mut parts = segment.split(',');
    let name = parts.next()?;
    let args: Vec<&str> = parts.collect();
    let kv = parse_key_values(&args);

    let action = match name {
        "auto-orient" => ProcessAction::AutoOrient(args.first().is_some_and(|v| *v != "0")),
        "format" => ProcessAction::Format(args.first()?.to_string()),
        "quality" => ProcessAction::Quality(kv.positive("q")),
        "circle" => ProcessAction::Circle {
            radius: kv.positive("r"),
        },
        "crop" => ProcessAction::Crop(CropSpec {
            width: kv.positive("w"),
            height: kv.positive("h"),
            x: kv.first("x").and_then(parse_digits).unwrap_or(0),
            y: kv.first("y").and_then(parse_digits).unwrap_or(0),
            gravity: kv.first("g").and_then(Gravity::parse),
        }),
        "resize" => ProcessAction::Resize(ResizeSpec {
            mode: kv.first("m").map(str::to_string),
            width: kv.positive("w"),
            height: kv.positive("h"),
            long: kv.positive("l"),
            short: kv.positive("s"),
            percent: kv.positive("p"),
        }),
        _ => return None,
    };
    Some(action)
}

/// `["w_200", "g_nw"]` → `{w: [200], g: [nw]}`. Arguments without `_` are skipped.
fn parse_key_values(args: &[&str]) -> Params {
    let mut params = Params::new();
    for arg in args {
        if let Some((key, value)) = arg.split_once('_') {
            params.insert(key, value);
        }
    }
    params
}

/// Parse the `imageMogr2` crop grammar: `<W>x`, `x<H>`, `<W>x<H>`, `<W>x<H>a<dx>a<dy>`.
///
/// Sizes are positive without a leading zero; offsets are any decimal.
pub fn parse_crop_geometry(token: &str) -> Option<CropGeometry> {
    let (size, offsets) = match token.split_once('a') {
        Some((size, offsets)) => (size, Some(offsets)),
        None => (token, None),
    };
    let (w, h) = size.split_once('x')?;

    if let Some(offsets) = offsets {
        let (dx, dy) = offsets.split_once('a')?;
        return Some(CropGeometry::Offset {
            width: parse_size(w)?,
            height: parse_size(h)?,
            dx: parse_digits(dx)?,
            dy: parse_digits(dy)?,
        });
    }

    match (parse_size(w), parse_size(h)) {
        (Some(w), Some(h)) => Some(CropGeometry::Size(w, h)),
        (Some(w), None) if h.is_empty() => Some(CropGeometry::Width(w)),
        (None, Some(h)) if w.is_empty() => Some(CropGeometry::Height(h)),
        _ => None,
    }
}

fn parse_size(s: &str) -> Option<u32> {
    if s.starts_with('0') {
        return None;
    }
    parse_positive(s)
}

fn parse_positive(s: &str) -> Option<u32> {
    parse_digits(s).filter(|n| *n > 0)
}

fn parse_digits(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Slash-path surface
    // =========================================================================

    #[test]
    fn empty_directive_is_passthrough() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("   "), None);
    }

    #[test]
    fn unknown_interface_is_passthrough() {
        assert_eq!(parse("imageView3/1/w/10"), None);
        assert_eq!(parse("/imageView2/1/w/10"), None);
    }

    #[test]
    fn image_view_needs_three_tokens() {
        assert_eq!(parse("imageView2"), None);
        assert_eq!(parse("imageView2/1"), None);
        assert!(parse("imageView2/1/w").is_some());
    }

    #[test]
    fn image_view_collects_pairs() {
        let Some(Directive::View(view)) = parse("imageView2/1/w/200/h/100") else {
            panic!("expected imageView2");
        };
        assert_eq!(view.mode, "1");
        assert_eq!(view.params.positive("w"), Some(200));
        assert_eq!(view.params.positive("h"), Some(100));
        assert_eq!(view.params.keys().collect::<Vec<_>>(), ["w", "h"]);
    }

    #[test]
    fn repeated_keys_accumulate_in_order() {
        let Some(Directive::View(view)) = parse("imageView2/2/w/10/h/5/w/30") else {
            panic!("expected imageView2");
        };
        assert_eq!(view.params.get_all("w"), ["10", "30"]);
        assert_eq!(view.params.first("w"), Some("10"));
        assert_eq!(view.params.keys().collect::<Vec<_>>(), ["w", "h"]);
    }

    #[test]
    fn malformed_numbers_are_absent() {
        let Some(Directive::View(view)) = parse("imageView2/2/w/abc/h/0") else {
            panic!("expected imageView2");
        };
        assert_eq!(view.params.positive("w"), None);
        assert_eq!(view.params.positive("h"), None);
    }

    #[test]
    fn dangling_key_is_dropped() {
        let Some(Directive::View(view)) = parse("imageView2/2/w/10/h") else {
            panic!("expected imageView2");
        };
        assert!(view.params.get_all("h").is_empty());
    }

    #[test]
    fn info_and_unsupported_interfaces() {
        assert_eq!(parse("imageInfo"), Some(Directive::Info));
        assert_eq!(
            parse("exif"),
            Some(Directive::Unsupported(Interface::Exif))
        );
        assert_eq!(
            parse("imageAve"),
            Some(Directive::Unsupported(Interface::ImageAve))
        );
        assert_eq!(parse("watermark/1"), None);
        assert_eq!(
            parse("watermark/1/image/abc"),
            Some(Directive::Unsupported(Interface::Watermark))
        );
    }

    #[test]
    fn mogr_flags_and_options() {
        let Some(Directive::Mogr(mogr)) =
            parse("imageMogr2/auto-orient/gravity/North/crop/200x100a10a10/format/png")
        else {
            panic!("expected imageMogr2");
        };
        assert!(mogr.auto_orient);
        assert!(!mogr.strip);
        assert_eq!(mogr.gravity, Some(Gravity::North));
        assert_eq!(mogr.format.as_deref(), Some("png"));
        assert_eq!(
            mogr.crop_geometry(),
            Some(CropGeometry::Offset {
                width: 200,
                height: 100,
                dx: 10,
                dy: 10
            })
        );
    }

    #[test]
    fn mogr_option_without_value_is_absent() {
        let Some(Directive::Mogr(mogr)) = parse("imageMogr2/strip/crop") else {
            panic!("expected imageMogr2");
        };
        assert!(mogr.strip);
        assert_eq!(mogr.crop, None);
    }

    // =========================================================================
    // Crop grammar
    // =========================================================================

    #[test]
    fn crop_grammar_forms() {
        assert_eq!(parse_crop_geometry("300x"), Some(CropGeometry::Width(300)));
        assert_eq!(parse_crop_geometry("x40"), Some(CropGeometry::Height(40)));
        assert_eq!(
            parse_crop_geometry("300x40"),
            Some(CropGeometry::Size(300, 40))
        );
        assert_eq!(
            parse_crop_geometry("100x100a0a0"),
            Some(CropGeometry::Offset {
                width: 100,
                height: 100,
                dx: 0,
                dy: 0
            })
        );
    }

    #[test]
    fn crop_grammar_rejects_malformed() {
        for token in ["x", "0x10", "010x10", "10", "10x10a5", "-5x10", "axb", "10x10a1a-1"] {
            assert_eq!(parse_crop_geometry(token), None, "{token}");
        }
    }

    // =========================================================================
    // Query-style process chain
    // =========================================================================

    #[test]
    fn process_chain_keeps_action_order() {
        let Some(Directive::Process(actions)) =
            parse("image/resize,m_fill,w_200,h_100/crop,w_50,x_5,g_se/format,jpg/quality,q_80")
        else {
            panic!("expected process chain");
        };
        assert_eq!(actions.len(), 4);
        assert_eq!(
            actions[0],
            ProcessAction::Resize(ResizeSpec {
                mode: Some("fill".into()),
                width: Some(200),
                height: Some(100),
                ..Default::default()
            })
        );
        assert_eq!(
            actions[1],
            ProcessAction::Crop(CropSpec {
                width: Some(50),
                x: 5,
                gravity: Some(Gravity::SouthEast),
                ..Default::default()
            })
        );
        assert_eq!(actions[2], ProcessAction::Format("jpg".into()));
        assert_eq!(actions[3], ProcessAction::Quality(Some(80)));
    }

    #[test]
    fn process_chain_skips_unknown_actions() {
        let Some(Directive::Process(actions)) = parse("image/sharpen,100/auto-orient,1") else {
            panic!("expected process chain");
        };
        assert_eq!(actions, [ProcessAction::AutoOrient(true)]);
    }

    #[test]
    fn auto_orient_zero_disables() {
        assert_eq!(parse_action("auto-orient,0"), Some(ProcessAction::AutoOrient(false)));
    }

    #[test]
    fn circle_without_radius_is_kept_for_error_reporting() {
        assert_eq!(
            parse_action("circle"),
            Some(ProcessAction::Circle { radius: None })
        );
    }

    #[test]
    fn directive_reports_interface() {
        assert_eq!(
            parse("imageView2/1/w/1").map(|d| d.interface()),
            Some(Interface::ImageView2)
        );
        assert_eq!(
            parse("image/circle,r_5").map(|d| d.interface()),
            Some(Interface::ImageMogr2)
        );
    }
}
