//! The draw-command model
//!
//! [`DrawCommand`] is the closed, tagged record of one deferred backend
//! operation. A command is self-sufficient from the moment it is built:
//! cheap inputs (rects, matrices, option structs) are copied by value,
//! reference-counted backend resources are retained through their `Arc`
//! handles, and transient caller-owned buffers (glyph arrays, dash patterns)
//! are deep-copied into command-owned storage. Replay never dereferences
//! anything that could die before the command does.
//!
//! The one sanctioned post-construction mutation is `SetTransform`
//! coalescing, and only [`RecordingBuffer`](crate::recording::RecordingBuffer)
//! performs it.

use vellum_core::{
    Backend, Color, CompositionOp, DrawOptions, DrawSurfaceOptions, FontHandle, Glyph, IntPoint,
    IntRect, Matrix, PathHandle, Pattern, Point, Rect, StrokeOptions, SurfaceHandle,
};

/// Discriminant of a [`DrawCommand`], for logging and inspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    DrawSurface,
    DrawSurfaceWithShadow,
    ClearRect,
    CopyRect,
    CopySurface,
    FillRect,
    StrokeRect,
    StrokeLine,
    Fill,
    Stroke,
    FillGlyphs,
    Mask,
    MaskSurface,
    PushClip,
    PushClipRect,
    PopClip,
    PushLayer,
    PopLayer,
    SetTransform,
    SetOpaqueRect,
    SetPermitSubpixelAa,
    Flush,
}

/// One recorded drawing operation.
///
/// Fields mirror the arguments of the matching [`Backend`] method exactly.
pub enum DrawCommand {
    DrawSurface {
        surface: SurfaceHandle,
        dest: Rect,
        source: Rect,
        surface_options: DrawSurfaceOptions,
        options: DrawOptions,
    },
    DrawSurfaceWithShadow {
        surface: SurfaceHandle,
        dest: Point,
        color: Color,
        offset: Point,
        sigma: f32,
        composition: CompositionOp,
    },
    ClearRect {
        rect: Rect,
    },
    CopyRect {
        source: IntRect,
        dest: IntPoint,
    },
    CopySurface {
        surface: SurfaceHandle,
        source: IntRect,
        dest: IntPoint,
    },
    FillRect {
        rect: Rect,
        pattern: Pattern,
        options: DrawOptions,
    },
    StrokeRect {
        rect: Rect,
        pattern: Pattern,
        stroke: StrokeOptions,
        options: DrawOptions,
    },
    StrokeLine {
        start: Point,
        end: Point,
        pattern: Pattern,
        stroke: StrokeOptions,
        options: DrawOptions,
    },
    Fill {
        path: PathHandle,
        pattern: Pattern,
        options: DrawOptions,
    },
    Stroke {
        path: PathHandle,
        pattern: Pattern,
        stroke: StrokeOptions,
        options: DrawOptions,
    },
    FillGlyphs {
        font: FontHandle,
        /// Deep copy of the caller's glyph array.
        glyphs: Vec<Glyph>,
        pattern: Pattern,
        options: DrawOptions,
    },
    Mask {
        source: Pattern,
        mask: Pattern,
        options: DrawOptions,
    },
    MaskSurface {
        source: Pattern,
        mask: SurfaceHandle,
        offset: Point,
        options: DrawOptions,
    },
    PushClip {
        path: PathHandle,
    },
    PushClipRect {
        rect: Rect,
    },
    PopClip,
    PushLayer {
        opaque: bool,
        opacity: f32,
        mask: Option<SurfaceHandle>,
        mask_transform: Matrix,
        bounds: IntRect,
        copy_background: bool,
    },
    PopLayer,
    SetTransform {
        transform: Matrix,
    },
    SetOpaqueRect {
        rect: IntRect,
    },
    SetPermitSubpixelAa {
        permit: bool,
    },
    Flush,
}

impl DrawCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            DrawCommand::DrawSurface { .. } => CommandKind::DrawSurface,
            DrawCommand::DrawSurfaceWithShadow { .. } => CommandKind::DrawSurfaceWithShadow,
            DrawCommand::ClearRect { .. } => CommandKind::ClearRect,
            DrawCommand::CopyRect { .. } => CommandKind::CopyRect,
            DrawCommand::CopySurface { .. } => CommandKind::CopySurface,
            DrawCommand::FillRect { .. } => CommandKind::FillRect,
            DrawCommand::StrokeRect { .. } => CommandKind::StrokeRect,
            DrawCommand::StrokeLine { .. } => CommandKind::StrokeLine,
            DrawCommand::Fill { .. } => CommandKind::Fill,
            DrawCommand::Stroke { .. } => CommandKind::Stroke,
            DrawCommand::FillGlyphs { .. } => CommandKind::FillGlyphs,
            DrawCommand::Mask { .. } => CommandKind::Mask,
            DrawCommand::MaskSurface { .. } => CommandKind::MaskSurface,
            DrawCommand::PushClip { .. } => CommandKind::PushClip,
            DrawCommand::PushClipRect { .. } => CommandKind::PushClipRect,
            DrawCommand::PopClip => CommandKind::PopClip,
            DrawCommand::PushLayer { .. } => CommandKind::PushLayer,
            DrawCommand::PopLayer => CommandKind::PopLayer,
            DrawCommand::SetTransform { .. } => CommandKind::SetTransform,
            DrawCommand::SetOpaqueRect { .. } => CommandKind::SetOpaqueRect,
            DrawCommand::SetPermitSubpixelAa { .. } => CommandKind::SetPermitSubpixelAa,
            DrawCommand::Flush => CommandKind::Flush,
        }
    }

    /// Execute this command against a live backend.
    ///
    /// `base_transform`, when given, is composed under every recorded
    /// `SetTransform`, so a whole recording can be replayed into a
    /// differently-positioned target.
    pub fn execute(&self, backend: &mut dyn Backend, base_transform: Option<&Matrix>) {
        match self {
            DrawCommand::DrawSurface {
                surface,
                dest,
                source,
                surface_options,
                options,
            } => backend.draw_surface(surface, *dest, *source, surface_options, options),
            DrawCommand::DrawSurfaceWithShadow {
                surface,
                dest,
                color,
                offset,
                sigma,
                composition,
            } => backend
                .draw_surface_with_shadow(surface, *dest, *color, *offset, *sigma, *composition),
            DrawCommand::ClearRect { rect } => backend.clear_rect(*rect),
            DrawCommand::CopyRect { source, dest } => backend.copy_rect(*source, *dest),
            DrawCommand::CopySurface {
                surface,
                source,
                dest,
            } => backend.copy_surface(surface, *source, *dest),
            DrawCommand::FillRect {
                rect,
                pattern,
                options,
            } => backend.fill_rect(*rect, pattern, options),
            DrawCommand::StrokeRect {
                rect,
                pattern,
                stroke,
                options,
            } => backend.stroke_rect(*rect, pattern, stroke, options),
            DrawCommand::StrokeLine {
                start,
                end,
                pattern,
                stroke,
                options,
            } => backend.stroke_line(*start, *end, pattern, stroke, options),
            DrawCommand::Fill {
                path,
                pattern,
                options,
            } => backend.fill(path, pattern, options),
            DrawCommand::Stroke {
                path,
                pattern,
                stroke,
                options,
            } => backend.stroke(path, pattern, stroke, options),
            DrawCommand::FillGlyphs {
                font,
                glyphs,
                pattern,
                options,
            } => backend.fill_glyphs(font, glyphs, pattern, options),
            DrawCommand::Mask {
                source,
                mask,
                options,
            } => backend.mask(source, mask, options),
            DrawCommand::MaskSurface {
                source,
                mask,
                offset,
                options,
            } => backend.mask_surface(source, mask, *offset, options),
            DrawCommand::PushClip { path } => backend.push_clip(path),
            DrawCommand::PushClipRect { rect } => backend.push_clip_rect(*rect),
            DrawCommand::PopClip => backend.pop_clip(),
            DrawCommand::PushLayer {
                opaque,
                opacity,
                mask,
                mask_transform,
                bounds,
                copy_background,
            } => backend.push_layer(
                *opaque,
                *opacity,
                mask.as_ref(),
                mask_transform,
                *bounds,
                *copy_background,
            ),
            DrawCommand::PopLayer => backend.pop_layer(),
            DrawCommand::SetTransform { transform } => match base_transform {
                Some(base) => backend.set_transform(&transform.then(base)),
                None => backend.set_transform(transform),
            },
            DrawCommand::SetOpaqueRect { rect } => backend.set_opaque_rect(*rect),
            DrawCommand::SetPermitSubpixelAa { permit } => backend.set_permit_subpixel_aa(*permit),
            DrawCommand::Flush => backend.flush(),
        }
    }

    /// Conservative device-space bounds of the pixels this command touches,
    /// for geometry commands where that is cheap to answer without
    /// executing. Invalidation trackers use this; replay does not.
    pub fn affected_rect(&self, transform: &Matrix) -> Option<Rect> {
        match self {
            DrawCommand::FillRect { rect, .. } => Some(transform.transform_rect(rect)),
            DrawCommand::Fill { path, .. } => Some(path.device_bounds(transform)),
            DrawCommand::Stroke { path, stroke, .. } => {
                let bounds = path.device_bounds(transform);
                // Pad by the stroke's worst-case device-space extent: half the
                // line width times the miter limit, under the larger axis
                // scale of the transform.
                let scale = (transform.a.hypot(transform.b)).max(transform.c.hypot(transform.d));
                let pad = stroke.line_width * 0.5 * stroke.miter_limit.max(1.0) * scale;
                Some(bounds.inflate(pad))
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for DrawCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DrawCommand::{:?}", self.kind())
    }
}
