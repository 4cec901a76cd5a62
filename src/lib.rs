//! # imgview
//!
//! An image-processing endpoint in the style of cloud object storage: a
//! client appends a directive such as `imageView2/1/w/200/h/200` or
//! `imageMogr2/auto-orient/crop/200x100a10a10` to a stored image's key and
//! gets the transformed image back.
//!
//! # Architecture
//!
//! ```text
//! transform(key, directive)
//!   ├─ directive::parse      string      → Directive
//!   ├─ Request::from_directive Directive → Plan (or a "<name> err")
//!   ├─ BlobStore::fetch      key         → bytes
//!   └─ RenderCache           hit, or:
//!        pipeline::run   decode → orient → steps → encode
//! ```
//!
//! Geometry is pure: [`imaging::calculations`] turns a request into crop
//! boxes and scale targets without touching pixels, and
//! [`imaging::operations`] applies them one buffer at a time. Codecs sit
//! behind the [`imaging::ImageBackend`] trait, so the pipeline is testable
//! without encoding anything.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`directive`] | Slash-path and query-style directive parsing |
//! | [`imaging`] | Geometry, orientation, per-buffer operations, codec backend |
//! | [`pipeline`] | Plan validation and the decode → encode state machine |
//! | [`store`] | Source asset lookup ([`store::FsStore`]) |
//! | [`cache`] | Content-addressed render cache with per-key coordination |
//! | [`service`] | [`service::ImageService::transform`], the public entry point |
//! | [`config`] | `imgview.toml` loading, merging and validation |
//!
//! # Design Decisions
//!
//! ## Shrink, Never Enlarge
//!
//! Every resize mode treats a ratio of one or more as "already satisfied"
//! and returns the image unchanged. Output is never larger than its source.
//!
//! ## Errors Versus Passthrough
//!
//! A directive that cannot be parsed at all serves the source unchanged.
//! A directive that parses but names something unsupported (an interface,
//! a mode, a missing radius) fails with the vendor's short `"<what> err"`
//! message, before the source is even fetched.
//!
//! ## Content-Addressed Renders
//!
//! Cached renders are named by a hash of the source bytes and the directive,
//! never by request path, and written via temp file + rename. Concurrent
//! identical requests wait on one render instead of racing to write it.

pub mod cache;
pub mod config;
pub mod directive;
pub mod imaging;
pub mod pipeline;
pub mod service;
pub mod store;
