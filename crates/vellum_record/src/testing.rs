//! Test backends and hosts
//!
//! In-tree doubles for the external backend collaborators, used by the unit
//! and integration suites:
//!
//! - [`TraceBackend`] records the name and salient argument of every call it
//!   receives, for order/coalescing/flush assertions.
//! - [`PixelBackend`] is a minimal software framebuffer honoring solid fills
//!   and clears under the current transform, for observing end-to-end pixel
//!   outcomes of transaction ordering.
//! - [`TestHost`] owns one of the above behind the [`TargetHost`] lock
//!   contract, with a teardown switch to simulate a dead target.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use vellum_core::{
    Backend, BackendKind, Color, CompositionOp, DrawOptions, DrawSurfaceOptions, ExtendMode,
    FillRule, FilterHandle, FilterNode, FilterNodeKind, FontHandle, GradientStop, GradientStops,
    GradientStopsHandle, Glyph, IntPoint, IntRect, IntSize, Matrix, NativeHandle, Path,
    PathBuilder, PathBuilderHandle, PathHandle, Pattern, Point, Rect, ScaledFont, StrokeOptions,
    Surface, SurfaceFormat, SurfaceHandle, TargetError,
};

use crate::recording::{BackendGuard, TargetHost};

// ─────────────────────────────────────────────────────────────────────────────
// Backend resource doubles
// ─────────────────────────────────────────────────────────────────────────────

/// A surface that counts persistence pins.
pub struct TestSurface {
    size: IntSize,
    format: SurfaceFormat,
    pins: AtomicUsize,
}

impl TestSurface {
    pub fn new(size: IntSize) -> Self {
        Self {
            size,
            format: SurfaceFormat::B8G8R8A8,
            pins: AtomicUsize::new(0),
        }
    }

    /// How many times `guarantee_persistence` has been called.
    pub fn pin_count(&self) -> usize {
        self.pins.load(Ordering::SeqCst)
    }
}

impl Surface for TestSurface {
    fn size(&self) -> IntSize {
        self.size
    }

    fn format(&self) -> SurfaceFormat {
        self.format
    }

    fn guarantee_persistence(&self) {
        self.pins.fetch_add(1, Ordering::SeqCst);
    }
}

/// A path with fixed user-space bounds.
pub struct TestPath {
    bounds: Rect,
    fill_rule: FillRule,
}

impl TestPath {
    pub fn new(bounds: Rect) -> Self {
        Self {
            bounds,
            fill_rule: FillRule::NonZero,
        }
    }
}

impl Path for TestPath {
    fn fill_rule(&self) -> FillRule {
        self.fill_rule
    }

    fn device_bounds(&self, transform: &Matrix) -> Rect {
        transform.transform_rect(&self.bounds)
    }
}

/// Path builder that accumulates point bounds into a [`TestPath`].
struct TestPathBuilder {
    bounds: Option<Rect>,
}

impl TestPathBuilder {
    fn grow(&mut self, point: Point) {
        let point_rect = Rect::new(point.x, point.y, 0.0, 0.0);
        self.bounds = Some(match self.bounds {
            Some(bounds) => bounds.union(&point_rect),
            None => point_rect,
        });
    }
}

impl PathBuilder for TestPathBuilder {
    fn move_to(&mut self, point: Point) {
        self.grow(point);
    }

    fn line_to(&mut self, point: Point) {
        self.grow(point);
    }

    fn bezier_to(&mut self, control1: Point, control2: Point, point: Point) {
        self.grow(control1);
        self.grow(control2);
        self.grow(point);
    }

    fn quad_to(&mut self, control: Point, point: Point) {
        self.grow(control);
        self.grow(point);
    }

    fn close(&mut self) {}

    fn finish(self: Box<Self>) -> PathHandle {
        Arc::new(TestPath::new(self.bounds.unwrap_or(Rect::ZERO)))
    }
}

pub struct TestFont;

impl ScaledFont for TestFont {}

pub struct TestStops;

impl GradientStops for TestStops {}

pub struct TestFilter;

impl FilterNode for TestFilter {}

// ─────────────────────────────────────────────────────────────────────────────
// Trace backend
// ─────────────────────────────────────────────────────────────────────────────

/// One observed backend call, tagged with its salient argument.
#[derive(Clone, Debug, PartialEq)]
pub enum BackendCall {
    DrawSurface(Rect),
    DrawSurfaceWithShadow(Point),
    ClearRect(Rect),
    CopyRect(IntPoint),
    CopySurface(IntPoint),
    FillRect(Rect),
    StrokeRect(Rect),
    StrokeLine(Point, Point),
    Fill,
    Stroke,
    FillGlyphs(usize),
    Mask,
    MaskSurface(Point),
    PushClip,
    PushClipRect(Rect),
    PopClip,
    PushLayer,
    PopLayer,
    SetTransform(Matrix),
    SetOpaqueRect(IntRect),
    SetPermitSubpixelAa(bool),
    Flush,
    Snapshot,
    NativeHandle,
}

/// Shared call log, so a test can keep reading after the backend moves into
/// a host or onto the painter thread.
pub type CallLog = Arc<Mutex<Vec<BackendCall>>>;

/// A backend that rasterizes nothing and remembers everything.
pub struct TraceBackend {
    log: CallLog,
    size: IntSize,
}

impl Default for TraceBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceBackend {
    pub fn new() -> Self {
        Self::with_log(CallLog::default())
    }

    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            size: IntSize::new(256, 256),
        }
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.log.lock().clone()
    }

    /// Just the transform matrices, in call order.
    pub fn transforms(&self) -> Vec<Matrix> {
        self.log
            .lock()
            .iter()
            .filter_map(|call| match call {
                BackendCall::SetTransform(m) => Some(*m),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BackendCall) {
        self.log.lock().push(call);
    }
}

impl Backend for TraceBackend {
    fn draw_surface(
        &mut self,
        _surface: &SurfaceHandle,
        dest: Rect,
        _source: Rect,
        _surface_options: &DrawSurfaceOptions,
        _options: &DrawOptions,
    ) {
        self.record(BackendCall::DrawSurface(dest));
    }

    fn draw_surface_with_shadow(
        &mut self,
        _surface: &SurfaceHandle,
        dest: Point,
        _color: Color,
        _offset: Point,
        _sigma: f32,
        _composition: CompositionOp,
    ) {
        self.record(BackendCall::DrawSurfaceWithShadow(dest));
    }

    fn clear_rect(&mut self, rect: Rect) {
        self.record(BackendCall::ClearRect(rect));
    }

    fn copy_rect(&mut self, _source: IntRect, dest: IntPoint) {
        self.record(BackendCall::CopyRect(dest));
    }

    fn copy_surface(&mut self, _surface: &SurfaceHandle, _source: IntRect, dest: IntPoint) {
        self.record(BackendCall::CopySurface(dest));
    }

    fn fill_rect(&mut self, rect: Rect, _pattern: &Pattern, _options: &DrawOptions) {
        self.record(BackendCall::FillRect(rect));
    }

    fn stroke_rect(
        &mut self,
        rect: Rect,
        _pattern: &Pattern,
        _stroke: &StrokeOptions,
        _options: &DrawOptions,
    ) {
        self.record(BackendCall::StrokeRect(rect));
    }

    fn stroke_line(
        &mut self,
        start: Point,
        end: Point,
        _pattern: &Pattern,
        _stroke: &StrokeOptions,
        _options: &DrawOptions,
    ) {
        self.record(BackendCall::StrokeLine(start, end));
    }

    fn fill(&mut self, _path: &PathHandle, _pattern: &Pattern, _options: &DrawOptions) {
        self.record(BackendCall::Fill);
    }

    fn stroke(
        &mut self,
        _path: &PathHandle,
        _pattern: &Pattern,
        _stroke: &StrokeOptions,
        _options: &DrawOptions,
    ) {
        self.record(BackendCall::Stroke);
    }

    fn fill_glyphs(
        &mut self,
        _font: &FontHandle,
        glyphs: &[Glyph],
        _pattern: &Pattern,
        _options: &DrawOptions,
    ) {
        self.record(BackendCall::FillGlyphs(glyphs.len()));
    }

    fn mask(&mut self, _source: &Pattern, _mask: &Pattern, _options: &DrawOptions) {
        self.record(BackendCall::Mask);
    }

    fn mask_surface(
        &mut self,
        _source: &Pattern,
        _mask: &SurfaceHandle,
        offset: Point,
        _options: &DrawOptions,
    ) {
        self.record(BackendCall::MaskSurface(offset));
    }

    fn push_clip(&mut self, _path: &PathHandle) {
        self.record(BackendCall::PushClip);
    }

    fn push_clip_rect(&mut self, rect: Rect) {
        self.record(BackendCall::PushClipRect(rect));
    }

    fn pop_clip(&mut self) {
        self.record(BackendCall::PopClip);
    }

    fn push_layer(
        &mut self,
        _opaque: bool,
        _opacity: f32,
        _mask: Option<&SurfaceHandle>,
        _mask_transform: &Matrix,
        _bounds: IntRect,
        _copy_background: bool,
    ) {
        self.record(BackendCall::PushLayer);
    }

    fn pop_layer(&mut self) {
        self.record(BackendCall::PopLayer);
    }

    fn set_transform(&mut self, transform: &Matrix) {
        self.record(BackendCall::SetTransform(*transform));
    }

    fn set_opaque_rect(&mut self, rect: IntRect) {
        self.record(BackendCall::SetOpaqueRect(rect));
    }

    fn set_permit_subpixel_aa(&mut self, permit: bool) {
        self.record(BackendCall::SetPermitSubpixelAa(permit));
    }

    fn flush(&mut self) {
        self.record(BackendCall::Flush);
    }

    fn snapshot(&mut self) -> SurfaceHandle {
        self.record(BackendCall::Snapshot);
        Arc::new(TestSurface::new(self.size))
    }

    fn size(&self) -> IntSize {
        self.size
    }

    fn format(&self) -> SurfaceFormat {
        SurfaceFormat::B8G8R8A8
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Software
    }

    fn native_handle(&mut self) -> Option<NativeHandle> {
        self.record(BackendCall::NativeHandle);
        Some(NativeHandle(0))
    }

    fn create_similar(
        &self,
        _size: IntSize,
        _format: SurfaceFormat,
    ) -> Result<Box<dyn Backend>, TargetError> {
        Ok(Box::new(TraceBackend::new()))
    }

    fn create_path_builder(&self, _fill_rule: FillRule) -> PathBuilderHandle {
        Box::new(TestPathBuilder { bounds: None })
    }

    fn create_gradient_stops(
        &self,
        _stops: &[GradientStop],
        _extend: ExtendMode,
    ) -> GradientStopsHandle {
        Arc::new(TestStops)
    }

    fn create_filter_node(&self, _kind: FilterNodeKind) -> Option<FilterHandle> {
        Some(Arc::new(TestFilter))
    }

    fn create_surface_from_data(
        &self,
        _data: &[u8],
        size: IntSize,
        _stride: i32,
        _format: SurfaceFormat,
    ) -> Result<SurfaceHandle, TargetError> {
        Ok(Arc::new(TestSurface::new(size)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pixel backend
// ─────────────────────────────────────────────────────────────────────────────

/// A plain RGBA framebuffer, shared so a test can read pixels after the
/// backend has been handed to a host.
pub struct PixelBuffer {
    size: IntSize,
    pixels: Vec<u32>,
}

pub type FrameHandle = Arc<Mutex<PixelBuffer>>;

impl PixelBuffer {
    pub fn new(size: IntSize) -> Self {
        Self {
            size,
            pixels: vec![0; (size.width * size.height) as usize],
        }
    }

    pub fn get(&self, x: i32, y: i32) -> u32 {
        assert!(x >= 0 && x < self.size.width && y >= 0 && y < self.size.height);
        self.pixels[(y * self.size.width + x) as usize]
    }

    fn fill(&mut self, rect: Rect, value: u32) {
        let x0 = (rect.x.floor().max(0.0)) as i32;
        let y0 = (rect.y.floor().max(0.0)) as i32;
        let x1 = (rect.max_x().ceil() as i32).min(self.size.width);
        let y1 = (rect.max_y().ceil() as i32).min(self.size.height);
        for y in y0..y1 {
            for x in x0..x1 {
                self.pixels[(y * self.size.width + x) as usize] = value;
            }
        }
    }
}

/// A software backend honoring clears and solid fills under the current
/// transform. Every other operation is accepted and ignored; this exists to
/// observe ordering outcomes, not to rasterize faithfully.
pub struct PixelBackend {
    frame: FrameHandle,
    size: IntSize,
    transform: Matrix,
}

impl PixelBackend {
    pub fn new(size: IntSize) -> (Self, FrameHandle) {
        let frame = Arc::new(Mutex::new(PixelBuffer::new(size)));
        (
            Self {
                frame: frame.clone(),
                size,
                transform: Matrix::IDENTITY,
            },
            frame,
        )
    }
}

impl Backend for PixelBackend {
    fn draw_surface(
        &mut self,
        _surface: &SurfaceHandle,
        _dest: Rect,
        _source: Rect,
        _surface_options: &DrawSurfaceOptions,
        _options: &DrawOptions,
    ) {
    }

    fn draw_surface_with_shadow(
        &mut self,
        _surface: &SurfaceHandle,
        _dest: Point,
        _color: Color,
        _offset: Point,
        _sigma: f32,
        _composition: CompositionOp,
    ) {
    }

    fn clear_rect(&mut self, rect: Rect) {
        let device = self.transform.transform_rect(&rect);
        self.frame.lock().fill(device, 0);
    }

    fn copy_rect(&mut self, _source: IntRect, _dest: IntPoint) {}

    fn copy_surface(&mut self, _surface: &SurfaceHandle, _source: IntRect, _dest: IntPoint) {}

    fn fill_rect(&mut self, rect: Rect, pattern: &Pattern, _options: &DrawOptions) {
        if let Pattern::Solid(color) = pattern {
            let device = self.transform.transform_rect(&rect);
            self.frame.lock().fill(device, color.to_packed());
        }
    }

    fn stroke_rect(
        &mut self,
        _rect: Rect,
        _pattern: &Pattern,
        _stroke: &StrokeOptions,
        _options: &DrawOptions,
    ) {
    }

    fn stroke_line(
        &mut self,
        _start: Point,
        _end: Point,
        _pattern: &Pattern,
        _stroke: &StrokeOptions,
        _options: &DrawOptions,
    ) {
    }

    fn fill(&mut self, _path: &PathHandle, _pattern: &Pattern, _options: &DrawOptions) {}

    fn stroke(
        &mut self,
        _path: &PathHandle,
        _pattern: &Pattern,
        _stroke: &StrokeOptions,
        _options: &DrawOptions,
    ) {
    }

    fn fill_glyphs(
        &mut self,
        _font: &FontHandle,
        _glyphs: &[Glyph],
        _pattern: &Pattern,
        _options: &DrawOptions,
    ) {
    }

    fn mask(&mut self, _source: &Pattern, _mask: &Pattern, _options: &DrawOptions) {}

    fn mask_surface(
        &mut self,
        _source: &Pattern,
        _mask: &SurfaceHandle,
        _offset: Point,
        _options: &DrawOptions,
    ) {
    }

    fn push_clip(&mut self, _path: &PathHandle) {}

    fn push_clip_rect(&mut self, _rect: Rect) {}

    fn pop_clip(&mut self) {}

    fn push_layer(
        &mut self,
        _opaque: bool,
        _opacity: f32,
        _mask: Option<&SurfaceHandle>,
        _mask_transform: &Matrix,
        _bounds: IntRect,
        _copy_background: bool,
    ) {
    }

    fn pop_layer(&mut self) {}

    fn set_transform(&mut self, transform: &Matrix) {
        self.transform = *transform;
    }

    fn set_opaque_rect(&mut self, _rect: IntRect) {}

    fn set_permit_subpixel_aa(&mut self, _permit: bool) {}

    fn flush(&mut self) {}

    fn snapshot(&mut self) -> SurfaceHandle {
        Arc::new(TestSurface::new(self.size))
    }

    fn size(&self) -> IntSize {
        self.size
    }

    fn format(&self) -> SurfaceFormat {
        SurfaceFormat::B8G8R8A8
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Software
    }

    fn create_similar(
        &self,
        size: IntSize,
        _format: SurfaceFormat,
    ) -> Result<Box<dyn Backend>, TargetError> {
        Ok(Box::new(PixelBackend::new(size).0))
    }

    fn create_path_builder(&self, _fill_rule: FillRule) -> PathBuilderHandle {
        Box::new(TestPathBuilder { bounds: None })
    }

    fn create_gradient_stops(
        &self,
        _stops: &[GradientStop],
        _extend: ExtendMode,
    ) -> GradientStopsHandle {
        Arc::new(TestStops)
    }

    fn create_filter_node(&self, _kind: FilterNodeKind) -> Option<FilterHandle> {
        None
    }

    fn create_surface_from_data(
        &self,
        _data: &[u8],
        size: IntSize,
        _stride: i32,
        _format: SurfaceFormat,
    ) -> Result<SurfaceHandle, TargetError> {
        Ok(Arc::new(TestSurface::new(size)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test host
// ─────────────────────────────────────────────────────────────────────────────

/// A [`TargetHost`] owning a boxed backend behind its lock, with a teardown
/// switch for simulating a target that died before replay.
pub struct TestHost {
    backend: Mutex<Option<Box<dyn Backend + Send>>>,
    log: CallLog,
}

impl TestHost {
    /// Host a [`TraceBackend`]; read its calls through
    /// [`trace_calls`](Self::trace_calls).
    pub fn trace() -> Arc<Self> {
        let log = CallLog::default();
        Arc::new(Self {
            backend: Mutex::new(Some(Box::new(TraceBackend::with_log(log.clone())))),
            log,
        })
    }

    /// Host a [`PixelBackend`]; read pixels through the returned handle.
    pub fn framebuffer(size: IntSize) -> (Arc<Self>, FrameHandle) {
        let (backend, frame) = PixelBackend::new(size);
        let host = Arc::new(Self {
            backend: Mutex::new(Some(Box::new(backend))),
            log: CallLog::default(),
        });
        (host, frame)
    }

    pub fn trace_calls(&self) -> Vec<BackendCall> {
        self.log.lock().clone()
    }

    /// Drop the backend; subsequent locks return `None`.
    pub fn tear_down(&self) {
        *self.backend.lock() = None;
    }
}

impl TargetHost for TestHost {
    fn lock(&self) -> Option<BackendGuard<'_>> {
        MutexGuard::try_map(self.backend.lock(), |slot| {
            slot.as_mut().map(|backend| &mut **backend as &mut dyn Backend)
        })
        .ok()
    }
}
