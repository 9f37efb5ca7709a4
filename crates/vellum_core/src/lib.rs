//! Vellum Core Types
//!
//! This crate provides the foundational value types and contracts for the
//! Vellum deferred-painting engine:
//!
//! - **Geometry**: points, rects, and 2D affine matrices
//! - **Patterns**: the closed solid/surface/gradient paint union
//! - **Backend contracts**: the traits a concrete rendering target and its
//!   reference-counted resources (surfaces, paths, fonts) must implement
//!
//! Vellum never rasterizes anything itself. A backend is an external
//! collaborator reached only through the [`Backend`] trait; everything in
//! this crate is either a plain value or a shared handle to such a
//! collaborator.

pub mod backend;
pub mod color;
pub mod error;
pub mod geometry;
pub mod pattern;

pub use backend::{
    AntialiasMode, Backend, BackendKind, CompositionOp, DrawOptions, DrawSurfaceOptions,
    ExtendMode, FillRule, FilterHandle, FilterNode, FilterNodeKind, FontHandle, GradientStops,
    GradientStopsHandle, Glyph, LineCap, LineJoin, NativeHandle, Path, PathBuilder,
    PathBuilderHandle, PathHandle, SamplingFilter, ScaledFont, StrokeOptions, Surface,
    SurfaceFormat, SurfaceHandle,
};
pub use color::Color;
pub use error::TargetError;
pub use geometry::{IntPoint, IntRect, IntSize, Matrix, Point, Rect, Size};
pub use pattern::{GradientStop, Pattern, SurfacePattern};
