//! Image processing: pure geometry plus a pluggable codec backend.
//!
//! | Stage | Where |
//! |---|---|
//! | **Decode / encode** | [`ImageBackend`] trait, [`RustBackend`] on the `image` crate |
//! | **GIF loop count** | custom block walker ([`gif_meta`]) |
//! | **EXIF orientation** | [`Orientation`] |
//! | **Crop / resize / circle** | [`operations`] on `DynamicImage` |
//!
//! The module is split into:
//! - **Parameters**: Data structures describing image operations
//! - **Calculations**: Pure functions for box and ratio math (unit testable)
//! - **Operations**: Buffer → buffer transforms built on the calculations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
pub mod calculations;
pub(crate) mod gif_meta;
pub mod operations;
pub mod orientation;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Decoded, FrameSequence, Frames, ImageBackend, LoopCount};
pub use calculations::GeometryError;
pub use orientation::Orientation;
pub use params::{
    BoundingBox, CropGeometry, CropSpec, FitMode, GeometrySpec, Gravity, OutputFormat, Point,
    Quality, ResizeSpec,
};
pub use rust_backend::RustBackend;
