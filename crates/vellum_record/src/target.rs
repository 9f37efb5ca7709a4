//! The async draw-target facade
//!
//! [`RecordingTarget`] implements [`Backend`] itself, so callers cannot tell
//! a deferred recorder apart from a real target. Every mutating call becomes
//! one recorded command and returns immediately; no pixel work happens on
//! the calling thread.
//!
//! Queries that need currently-correct pixels (`snapshot`, `native_handle`)
//! force a synchronous replay first, because their results may be held
//! arbitrarily long and must reflect everything recorded so far. Queries
//! describing immutable target properties (`size`, `backend_kind`,
//! capabilities) and resource constructions forward straight through.
//!
//! Surface inputs are pinned here, at record time, on the calling thread:
//! a surface's lifetime assumptions ("this is a transient snapshot") are
//! relative to the call, not to the unknown future replay time.

use std::sync::Arc;

use vellum_core::{
    Backend, BackendKind, Color, CompositionOp, DrawOptions, DrawSurfaceOptions, ExtendMode,
    FillRule, FilterHandle, FilterNodeKind, FontHandle, GradientStop, GradientStopsHandle, Glyph,
    IntPoint, IntRect, IntSize, Matrix, NativeHandle, PathBuilderHandle, PathHandle, Pattern,
    Point, Rect, StrokeOptions, SurfaceFormat, SurfaceHandle, TargetError,
};

use crate::command::DrawCommand;
use crate::recording::{TargetHost, TargetQueue, TargetQueueHandle};

/// Pin a pattern's backing surface, when it has one.
fn pin_pattern(pattern: &Pattern) {
    if let Some(surface) = pattern.surface() {
        surface.guarantee_persistence();
    }
}

/// A draw target that records instead of drawing.
pub struct RecordingTarget {
    queue: TargetQueueHandle,
    host: Arc<dyn TargetHost>,
}

impl RecordingTarget {
    pub fn new(host: Arc<dyn TargetHost>) -> Self {
        Self {
            queue: TargetQueue::new(host.clone()),
            host,
        }
    }

    /// The queue to enroll in a transaction.
    pub fn queue(&self) -> TargetQueueHandle {
        self.queue.clone()
    }

    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// Replay everything recorded so far, inline on this thread.
    fn force_replay(&self) {
        self.queue.replay();
    }
}

impl Backend for RecordingTarget {
    fn draw_surface(
        &mut self,
        surface: &SurfaceHandle,
        dest: Rect,
        source: Rect,
        surface_options: &DrawSurfaceOptions,
        options: &DrawOptions,
    ) {
        surface.guarantee_persistence();
        self.queue.append(DrawCommand::DrawSurface {
            surface: surface.clone(),
            dest,
            source,
            surface_options: *surface_options,
            options: *options,
        });
    }

    fn draw_surface_with_shadow(
        &mut self,
        surface: &SurfaceHandle,
        dest: Point,
        color: Color,
        offset: Point,
        sigma: f32,
        composition: CompositionOp,
    ) {
        surface.guarantee_persistence();
        self.queue.append(DrawCommand::DrawSurfaceWithShadow {
            surface: surface.clone(),
            dest,
            color,
            offset,
            sigma,
            composition,
        });
    }

    fn clear_rect(&mut self, rect: Rect) {
        self.queue.append(DrawCommand::ClearRect { rect });
    }

    fn copy_rect(&mut self, source: IntRect, dest: IntPoint) {
        self.queue.append(DrawCommand::CopyRect { source, dest });
    }

    fn copy_surface(&mut self, surface: &SurfaceHandle, source: IntRect, dest: IntPoint) {
        surface.guarantee_persistence();
        self.queue.append(DrawCommand::CopySurface {
            surface: surface.clone(),
            source,
            dest,
        });
    }

    fn fill_rect(&mut self, rect: Rect, pattern: &Pattern, options: &DrawOptions) {
        pin_pattern(pattern);
        self.queue.append(DrawCommand::FillRect {
            rect,
            pattern: pattern.clone(),
            options: *options,
        });
    }

    fn stroke_rect(
        &mut self,
        rect: Rect,
        pattern: &Pattern,
        stroke: &StrokeOptions,
        options: &DrawOptions,
    ) {
        pin_pattern(pattern);
        self.queue.append(DrawCommand::StrokeRect {
            rect,
            pattern: pattern.clone(),
            stroke: stroke.clone(),
            options: *options,
        });
    }

    fn stroke_line(
        &mut self,
        start: Point,
        end: Point,
        pattern: &Pattern,
        stroke: &StrokeOptions,
        options: &DrawOptions,
    ) {
        pin_pattern(pattern);
        self.queue.append(DrawCommand::StrokeLine {
            start,
            end,
            pattern: pattern.clone(),
            stroke: stroke.clone(),
            options: *options,
        });
    }

    fn fill(&mut self, path: &PathHandle, pattern: &Pattern, options: &DrawOptions) {
        pin_pattern(pattern);
        self.queue.append(DrawCommand::Fill {
            path: path.clone(),
            pattern: pattern.clone(),
            options: *options,
        });
    }

    fn stroke(
        &mut self,
        path: &PathHandle,
        pattern: &Pattern,
        stroke: &StrokeOptions,
        options: &DrawOptions,
    ) {
        pin_pattern(pattern);
        self.queue.append(DrawCommand::Stroke {
            path: path.clone(),
            pattern: pattern.clone(),
            stroke: stroke.clone(),
            options: *options,
        });
    }

    fn fill_glyphs(
        &mut self,
        font: &FontHandle,
        glyphs: &[Glyph],
        pattern: &Pattern,
        options: &DrawOptions,
    ) {
        pin_pattern(pattern);
        self.queue.append(DrawCommand::FillGlyphs {
            font: font.clone(),
            glyphs: glyphs.to_vec(),
            pattern: pattern.clone(),
            options: *options,
        });
    }

    fn mask(&mut self, source: &Pattern, mask: &Pattern, options: &DrawOptions) {
        pin_pattern(source);
        pin_pattern(mask);
        self.queue.append(DrawCommand::Mask {
            source: source.clone(),
            mask: mask.clone(),
            options: *options,
        });
    }

    fn mask_surface(
        &mut self,
        source: &Pattern,
        mask: &SurfaceHandle,
        offset: Point,
        options: &DrawOptions,
    ) {
        pin_pattern(source);
        mask.guarantee_persistence();
        self.queue.append(DrawCommand::MaskSurface {
            source: source.clone(),
            mask: mask.clone(),
            offset,
            options: *options,
        });
    }

    fn push_clip(&mut self, path: &PathHandle) {
        self.queue.append(DrawCommand::PushClip { path: path.clone() });
    }

    fn push_clip_rect(&mut self, rect: Rect) {
        self.queue.append(DrawCommand::PushClipRect { rect });
    }

    fn pop_clip(&mut self) {
        self.queue.append(DrawCommand::PopClip);
    }

    fn push_layer(
        &mut self,
        opaque: bool,
        opacity: f32,
        mask: Option<&SurfaceHandle>,
        mask_transform: &Matrix,
        bounds: IntRect,
        copy_background: bool,
    ) {
        if let Some(mask) = mask {
            mask.guarantee_persistence();
        }
        self.queue.append(DrawCommand::PushLayer {
            opaque,
            opacity,
            mask: mask.cloned(),
            mask_transform: *mask_transform,
            bounds,
            copy_background,
        });
    }

    fn pop_layer(&mut self) {
        self.queue.append(DrawCommand::PopLayer);
    }

    fn set_transform(&mut self, transform: &Matrix) {
        // Runs of transform changes collapse into one command.
        self.queue.set_transform(*transform);
    }

    fn set_opaque_rect(&mut self, rect: IntRect) {
        self.queue.append(DrawCommand::SetOpaqueRect { rect });
    }

    fn set_permit_subpixel_aa(&mut self, permit: bool) {
        self.queue
            .append(DrawCommand::SetPermitSubpixelAa { permit });
    }

    /// Voluntary: forwards only once some replay has actually executed
    /// commands, so a target that never painted costs nothing here.
    fn flush(&mut self) {
        if !self.queue.has_replayed() {
            return;
        }
        if let Some(mut backend) = self.host.lock() {
            backend.flush();
        }
    }

    /// Forces a replay first: a snapshot's lifetime is unbounded and must
    /// reflect every operation recorded before it was taken.
    fn snapshot(&mut self) -> SurfaceHandle {
        self.force_replay();
        self.host
            .lock()
            .expect("snapshot requested but target has no live backend")
            .snapshot()
    }

    fn size(&self) -> IntSize {
        self.host
            .lock()
            .expect("size query but target has no live backend")
            .size()
    }

    fn format(&self) -> SurfaceFormat {
        self.host
            .lock()
            .expect("format query but target has no live backend")
            .format()
    }

    fn backend_kind(&self) -> BackendKind {
        self.host
            .lock()
            .expect("backend query but target has no live backend")
            .backend_kind()
    }

    fn is_dual(&self) -> bool {
        self.host.lock().map_or(false, |b| b.is_dual())
    }

    fn is_tiled(&self) -> bool {
        self.host.lock().map_or(false, |b| b.is_tiled())
    }

    fn supports_region_clipping(&self) -> bool {
        self.host.lock().map_or(true, |b| b.supports_region_clipping())
    }

    /// Same forced-flush contract as [`snapshot`](Self::snapshot): external
    /// code may hold the native handle arbitrarily long.
    fn native_handle(&mut self) -> Option<NativeHandle> {
        self.force_replay();
        self.host
            .lock()
            .expect("native handle access but target has no live backend")
            .native_handle()
    }

    fn create_similar(
        &self,
        size: IntSize,
        format: SurfaceFormat,
    ) -> Result<Box<dyn Backend>, TargetError> {
        self.host
            .lock()
            .expect("create_similar but target has no live backend")
            .create_similar(size, format)
    }

    fn create_path_builder(&self, fill_rule: FillRule) -> PathBuilderHandle {
        self.host
            .lock()
            .expect("create_path_builder but target has no live backend")
            .create_path_builder(fill_rule)
    }

    fn create_gradient_stops(
        &self,
        stops: &[GradientStop],
        extend: ExtendMode,
    ) -> GradientStopsHandle {
        self.host
            .lock()
            .expect("create_gradient_stops but target has no live backend")
            .create_gradient_stops(stops, extend)
    }

    fn create_filter_node(&self, kind: FilterNodeKind) -> Option<FilterHandle> {
        self.host
            .lock()
            .expect("create_filter_node but target has no live backend")
            .create_filter_node(kind)
    }

    fn create_surface_from_data(
        &self,
        data: &[u8],
        size: IntSize,
        stride: i32,
        format: SurfaceFormat,
    ) -> Result<SurfaceHandle, TargetError> {
        self.host
            .lock()
            .expect("create_surface_from_data but target has no live backend")
            .create_surface_from_data(data, size, stride, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BackendCall, TestHost, TestSurface};

    fn red() -> Pattern {
        Color::RED.into()
    }

    #[test]
    fn test_mutating_calls_do_not_reach_backend() {
        let host = TestHost::trace();
        let mut target = RecordingTarget::new(host.clone());
        target.fill_rect(Rect::new(0.0, 0.0, 4.0, 4.0), &red(), &DrawOptions::default());
        target.pop_clip();
        assert_eq!(target.pending(), 2);
        assert!(host.trace_calls().is_empty());
    }

    #[test]
    fn test_snapshot_forces_replay_first() {
        let host = TestHost::trace();
        let mut target = RecordingTarget::new(host.clone());
        target.fill_rect(Rect::new(0.0, 0.0, 4.0, 4.0), &red(), &DrawOptions::default());
        target.clear_rect(Rect::new(1.0, 1.0, 2.0, 2.0));

        let _snapshot = target.snapshot();

        // The two recorded commands land before the snapshot itself.
        assert_eq!(
            host.trace_calls(),
            vec![
                BackendCall::FillRect(Rect::new(0.0, 0.0, 4.0, 4.0)),
                BackendCall::ClearRect(Rect::new(1.0, 1.0, 2.0, 2.0)),
                BackendCall::Snapshot,
            ]
        );
        assert_eq!(target.pending(), 0);
    }

    #[test]
    fn test_size_query_does_not_flush() {
        let host = TestHost::trace();
        let mut target = RecordingTarget::new(host.clone());
        target.fill_rect(Rect::new(0.0, 0.0, 4.0, 4.0), &red(), &DrawOptions::default());

        let _ = target.size();
        let _ = target.backend_kind();

        assert_eq!(target.pending(), 1);
        assert!(host.trace_calls().is_empty());
    }

    #[test]
    fn test_flush_is_noop_until_first_replay() {
        let host = TestHost::trace();
        let mut target = RecordingTarget::new(host.clone());
        target.fill_rect(Rect::new(0.0, 0.0, 4.0, 4.0), &red(), &DrawOptions::default());

        target.flush();
        assert!(host.trace_calls().is_empty(), "no replay yet, flush skipped");

        let _ = target.snapshot();
        target.flush();
        assert_eq!(host.trace_calls().last(), Some(&BackendCall::Flush));
    }

    #[test]
    fn test_surface_inputs_pinned_at_record_time() {
        let host = TestHost::trace();
        let mut target = RecordingTarget::new(host);
        let surface = Arc::new(TestSurface::new(IntSize::new(8, 8)));
        let handle: SurfaceHandle = surface.clone();

        target.draw_surface(
            &handle,
            Rect::new(0.0, 0.0, 8.0, 8.0),
            Rect::new(0.0, 0.0, 8.0, 8.0),
            &DrawSurfaceOptions::default(),
            &DrawOptions::default(),
        );

        // Pinned on append, before any replay.
        assert_eq!(surface.pin_count(), 1);
    }

    #[test]
    fn test_surface_pattern_pinned_at_record_time() {
        let host = TestHost::trace();
        let mut target = RecordingTarget::new(host);
        let surface = Arc::new(TestSurface::new(IntSize::new(8, 8)));
        let pattern = Pattern::Surface(vellum_core::SurfacePattern::new(surface.clone()));

        target.fill_rect(Rect::new(0.0, 0.0, 4.0, 4.0), &pattern, &DrawOptions::default());
        assert_eq!(surface.pin_count(), 1);
    }

    #[test]
    fn test_recorded_inputs_survive_caller_mutation() {
        let host = TestHost::trace();
        let mut target = RecordingTarget::new(host.clone());
        let font: FontHandle = Arc::new(crate::testing::TestFont);

        let mut glyphs = vec![Glyph::new(7, Point::new(1.0, 1.0))];
        let mut stroke = StrokeOptions::default().with_dash(&[4.0, 2.0], 0.0);
        target.fill_glyphs(&font, &glyphs, &red(), &DrawOptions::default());
        target.stroke_line(
            Point::ZERO,
            Point::new(8.0, 0.0),
            &red(),
            &stroke,
            &DrawOptions::default(),
        );

        // The caller's buffers are gone before replay.
        glyphs.clear();
        stroke.dash_pattern.clear();

        let _ = target.snapshot();
        assert!(host
            .trace_calls()
            .contains(&BackendCall::FillGlyphs(1)));
    }

    #[test]
    fn test_transform_coalescing_through_facade() {
        let host = TestHost::trace();
        let mut target = RecordingTarget::new(host.clone());
        target.set_transform(&Matrix::IDENTITY);
        target.set_transform(&Matrix::scale(2.0, 2.0));
        assert_eq!(target.pending(), 1);

        let _ = target.snapshot();
        assert_eq!(
            host.trace_calls(),
            vec![
                BackendCall::SetTransform(Matrix::scale(2.0, 2.0)),
                BackendCall::Snapshot,
            ]
        );
    }

    #[test]
    fn test_resource_construction_is_passthrough() {
        let host = TestHost::trace();
        let target = RecordingTarget::new(host.clone());
        let _stops = target.create_gradient_stops(
            &[GradientStop::new(0.0, Color::RED)],
            ExtendMode::Clamp,
        );
        let _builder = target.create_path_builder(FillRule::NonZero);

        // Nothing recorded, nothing replayed.
        assert_eq!(target.pending(), 0);
    }
}
