//! Backend contracts
//!
//! A backend is the concrete rendering target a recorded command is
//! eventually executed against. Vellum reaches it only through the traits
//! here; the rasterization behind them is somebody else's problem.
//!
//! Resource traits (`Surface`, `Path`, `ScaledFont`, ...) are object-safe
//! and `Send + Sync` because their handles are retained inside commands and
//! cross from the producer thread to the painter thread by shared ownership.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::color::Color;
use crate::error::TargetError;
use crate::geometry::{IntPoint, IntRect, IntSize, Matrix, Point, Rect};
use crate::pattern::{GradientStop, Pattern};

// ─────────────────────────────────────────────────────────────────────────────
// Operation options
// ─────────────────────────────────────────────────────────────────────────────

/// Porter-Duff and blend composition operators
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompositionOp {
    #[default]
    Over,
    Add,
    Atop,
    Out,
    In,
    Source,
    DestIn,
    DestOut,
    DestOver,
    DestAtop,
    Xor,
    Multiply,
    Screen,
}

/// Antialiasing quality for geometry edges
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AntialiasMode {
    None,
    Gray,
    Subpixel,
    #[default]
    Default,
}

/// Sampling quality when a surface is scaled
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SamplingFilter {
    #[default]
    Good,
    Linear,
    Point,
}

/// Behavior outside a pattern's natural bounds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExtendMode {
    #[default]
    Clamp,
    Repeat,
    Reflect,
}

/// Path winding rule
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FillRule {
    #[default]
    NonZero,
    EvenOdd,
}

/// Pixel layout of a surface
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SurfaceFormat {
    #[default]
    B8G8R8A8,
    B8G8R8X8,
    R8G8B8A8,
    A8,
}

/// The concrete rasterizer family behind a backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Software,
    Skia,
    Cairo,
    Direct2D,
}

/// Joint style where stroked segments meet
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LineJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

/// End-cap style for stroked segments
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

/// General drawing options shared by every paint operation
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawOptions {
    pub alpha: f32,
    pub composition: CompositionOp,
    pub antialias: AntialiasMode,
}

impl Default for DrawOptions {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            composition: CompositionOp::Over,
            antialias: AntialiasMode::Default,
        }
    }
}

impl DrawOptions {
    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_composition(mut self, composition: CompositionOp) -> Self {
        self.composition = composition;
        self
    }
}

/// Options for drawing one surface into another
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawSurfaceOptions {
    pub filter: SamplingFilter,
    /// Restrict sampling to the source rect instead of the whole surface.
    pub sampling_bounds: bool,
}

/// Stroke geometry options.
///
/// The dash pattern is owned, never borrowed: a recorded command must stay
/// valid after the caller frees or rewrites its own dash array.
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeOptions {
    pub line_width: f32,
    pub miter_limit: f32,
    pub line_join: LineJoin,
    pub line_cap: LineCap,
    pub dash_pattern: SmallVec<[f32; 6]>,
    pub dash_offset: f32,
}

impl Default for StrokeOptions {
    fn default() -> Self {
        Self {
            line_width: 1.0,
            miter_limit: 10.0,
            line_join: LineJoin::Miter,
            line_cap: LineCap::Butt,
            dash_pattern: SmallVec::new(),
            dash_offset: 0.0,
        }
    }
}

impl StrokeOptions {
    pub fn with_width(mut self, width: f32) -> Self {
        self.line_width = width;
        self
    }

    pub fn with_dash(mut self, pattern: &[f32], offset: f32) -> Self {
        self.dash_pattern = SmallVec::from_slice(pattern);
        self.dash_offset = offset;
        self
    }
}

/// One positioned glyph
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Glyph {
    pub index: u32,
    pub position: Point,
}

impl Glyph {
    pub const fn new(index: u32, position: Point) -> Self {
        Self { index, position }
    }
}

/// Filter graph node families a backend can construct
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterNodeKind {
    GaussianBlur,
    ColorMatrix,
    Flood,
    Composite,
    Transform,
    Blend,
}

/// Opaque handle to a backend's native object (e.g. a platform texture).
///
/// The meaning of the value is private to the backend that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NativeHandle(pub usize);

// ─────────────────────────────────────────────────────────────────────────────
// Reference-counted backend resources
// ─────────────────────────────────────────────────────────────────────────────

/// A readable pixel source owned by a backend.
pub trait Surface: Send + Sync {
    fn size(&self) -> IntSize;

    fn format(&self) -> SurfaceFormat;

    /// Promise that the pixels stay valid until an unspecified future replay.
    ///
    /// Surfaces that recycle or invalidate themselves (transient snapshots)
    /// must take a private copy here. Called on the producer thread at
    /// record time, never at replay time.
    fn guarantee_persistence(&self);
}

/// An immutable path built by a backend's [`PathBuilder`].
pub trait Path: Send + Sync {
    fn fill_rule(&self) -> FillRule;

    /// Conservative bounds of the path in device space under `transform`.
    fn device_bounds(&self, transform: &Matrix) -> Rect;
}

/// A font at a fixed size, ready for glyph drawing.
pub trait ScaledFont: Send + Sync {}

/// A node in a backend filter graph.
pub trait FilterNode: Send + Sync {}

/// A baked gradient color ramp.
pub trait GradientStops: Send + Sync {}

/// Incremental path construction, finished into a [`Path`].
pub trait PathBuilder {
    fn move_to(&mut self, point: Point);
    fn line_to(&mut self, point: Point);
    fn bezier_to(&mut self, control1: Point, control2: Point, point: Point);
    fn quad_to(&mut self, control: Point, point: Point);
    fn close(&mut self);
    fn finish(self: Box<Self>) -> PathHandle;
}

pub type SurfaceHandle = Arc<dyn Surface>;
pub type PathHandle = Arc<dyn Path>;
pub type FontHandle = Arc<dyn ScaledFont>;
pub type FilterHandle = Arc<dyn FilterNode>;
pub type GradientStopsHandle = Arc<dyn GradientStops>;
pub type PathBuilderHandle = Box<dyn PathBuilder>;

// ─────────────────────────────────────────────────────────────────────────────
// The backend itself
// ─────────────────────────────────────────────────────────────────────────────

/// A concrete draw target.
///
/// One method per recordable operation, plus the query and
/// resource-construction surface the recording facade forwards verbatim.
/// Exclusive access during replay is the caller's job; the trait itself
/// assumes `&mut self` is enough.
pub trait Backend {
    // ── Drawing operations ──────────────────────────────────────────────────

    fn draw_surface(
        &mut self,
        surface: &SurfaceHandle,
        dest: Rect,
        source: Rect,
        surface_options: &DrawSurfaceOptions,
        options: &DrawOptions,
    );

    fn draw_surface_with_shadow(
        &mut self,
        surface: &SurfaceHandle,
        dest: Point,
        color: Color,
        offset: Point,
        sigma: f32,
        composition: CompositionOp,
    );

    fn clear_rect(&mut self, rect: Rect);

    /// Copy a region of this target's own pixels to another location.
    fn copy_rect(&mut self, source: IntRect, dest: IntPoint);

    fn copy_surface(&mut self, surface: &SurfaceHandle, source: IntRect, dest: IntPoint);

    fn fill_rect(&mut self, rect: Rect, pattern: &Pattern, options: &DrawOptions);

    fn stroke_rect(
        &mut self,
        rect: Rect,
        pattern: &Pattern,
        stroke: &StrokeOptions,
        options: &DrawOptions,
    );

    fn stroke_line(
        &mut self,
        start: Point,
        end: Point,
        pattern: &Pattern,
        stroke: &StrokeOptions,
        options: &DrawOptions,
    );

    fn fill(&mut self, path: &PathHandle, pattern: &Pattern, options: &DrawOptions);

    fn stroke(
        &mut self,
        path: &PathHandle,
        pattern: &Pattern,
        stroke: &StrokeOptions,
        options: &DrawOptions,
    );

    fn fill_glyphs(
        &mut self,
        font: &FontHandle,
        glyphs: &[Glyph],
        pattern: &Pattern,
        options: &DrawOptions,
    );

    fn mask(&mut self, source: &Pattern, mask: &Pattern, options: &DrawOptions);

    fn mask_surface(
        &mut self,
        source: &Pattern,
        mask: &SurfaceHandle,
        offset: Point,
        options: &DrawOptions,
    );

    fn push_clip(&mut self, path: &PathHandle);

    fn push_clip_rect(&mut self, rect: Rect);

    fn pop_clip(&mut self);

    fn push_layer(
        &mut self,
        opaque: bool,
        opacity: f32,
        mask: Option<&SurfaceHandle>,
        mask_transform: &Matrix,
        bounds: IntRect,
        copy_background: bool,
    );

    fn pop_layer(&mut self);

    fn set_transform(&mut self, transform: &Matrix);

    /// Hint: pixels inside `rect` are known fully opaque.
    fn set_opaque_rect(&mut self, rect: IntRect);

    fn set_permit_subpixel_aa(&mut self, permit: bool);

    fn flush(&mut self);

    // ── Queries ─────────────────────────────────────────────────────────────

    /// Current pixels as an immutable surface. May be called mid-frame, so
    /// every prior operation must be visible in the result.
    fn snapshot(&mut self) -> SurfaceHandle;

    fn size(&self) -> IntSize;

    fn format(&self) -> SurfaceFormat;

    fn backend_kind(&self) -> BackendKind;

    /// Whether this target multiplexes two underlying targets.
    fn is_dual(&self) -> bool {
        false
    }

    /// Whether this target is composed of tiles.
    fn is_tiled(&self) -> bool {
        false
    }

    fn supports_region_clipping(&self) -> bool {
        true
    }

    /// Backend-native object behind this target, when one exists.
    fn native_handle(&mut self) -> Option<NativeHandle> {
        None
    }

    // ── Resource construction (independent of pending pixels) ──────────────

    fn create_similar(
        &self,
        size: IntSize,
        format: SurfaceFormat,
    ) -> Result<Box<dyn Backend>, TargetError>;

    fn create_path_builder(&self, fill_rule: FillRule) -> PathBuilderHandle;

    fn create_gradient_stops(
        &self,
        stops: &[GradientStop],
        extend: ExtendMode,
    ) -> GradientStopsHandle;

    fn create_filter_node(&self, kind: FilterNodeKind) -> Option<FilterHandle>;

    fn create_surface_from_data(
        &self,
        data: &[u8],
        size: IntSize,
        stride: i32,
        format: SurfaceFormat,
    ) -> Result<SurfaceHandle, TargetError>;
}
