//! Paint patterns
//!
//! The closed union of everything a fill or stroke can be painted with.
//! `Clone` is the deep copy a recorded command stores: value fields are
//! copied byte-for-byte and resource handles are retained, so the clone
//! stays valid however long replay is deferred.

use std::sync::Arc;

use crate::backend::{ExtendMode, GradientStopsHandle, SamplingFilter, SurfaceHandle};
use crate::color::Color;
use crate::geometry::{Matrix, Point};

/// A single stop in a gradient ramp
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Color,
}

impl GradientStop {
    pub const fn new(offset: f32, color: Color) -> Self {
        Self { offset, color }
    }
}

/// A surface-backed pattern
#[derive(Clone)]
pub struct SurfacePattern {
    pub surface: SurfaceHandle,
    /// Pattern space to user space.
    pub matrix: Matrix,
    pub extend: ExtendMode,
    pub filter: SamplingFilter,
}

impl SurfacePattern {
    pub fn new(surface: SurfaceHandle) -> Self {
        Self {
            surface,
            matrix: Matrix::IDENTITY,
            extend: ExtendMode::Clamp,
            filter: SamplingFilter::Good,
        }
    }

    pub fn with_matrix(mut self, matrix: Matrix) -> Self {
        self.matrix = matrix;
        self
    }

    pub fn with_extend(mut self, extend: ExtendMode) -> Self {
        self.extend = extend;
        self
    }
}

impl std::fmt::Debug for SurfacePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfacePattern")
            .field("surface", &Arc::as_ptr(&self.surface))
            .field("matrix", &self.matrix)
            .field("extend", &self.extend)
            .field("filter", &self.filter)
            .finish()
    }
}

/// Paint source for fills and strokes.
///
/// The taxonomy is closed: backends and commands match on it exhaustively,
/// so an unsupported kind is a compile error rather than a runtime one.
#[derive(Clone)]
pub enum Pattern {
    Solid(Color),
    Surface(SurfacePattern),
    LinearGradient {
        begin: Point,
        end: Point,
        stops: GradientStopsHandle,
        matrix: Matrix,
    },
    RadialGradient {
        center1: Point,
        radius1: f32,
        center2: Point,
        radius2: f32,
        stops: GradientStopsHandle,
        matrix: Matrix,
    },
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pattern::Solid(color) => f.debug_tuple("Solid").field(color).finish(),
            Pattern::Surface(p) => f.debug_tuple("Surface").field(p).finish(),
            Pattern::LinearGradient { begin, end, .. } => f
                .debug_struct("LinearGradient")
                .field("begin", begin)
                .field("end", end)
                .finish_non_exhaustive(),
            Pattern::RadialGradient {
                center1,
                radius1,
                center2,
                radius2,
                ..
            } => f
                .debug_struct("RadialGradient")
                .field("center1", center1)
                .field("radius1", radius1)
                .field("center2", center2)
                .field("radius2", radius2)
                .finish_non_exhaustive(),
        }
    }
}

impl Pattern {
    /// The surface this pattern samples from, if it is surface-backed.
    pub fn surface(&self) -> Option<&SurfaceHandle> {
        match self {
            Pattern::Surface(p) => Some(&p.surface),
            _ => None,
        }
    }

    pub fn is_opaque_solid(&self) -> bool {
        matches!(self, Pattern::Solid(c) if c.a >= 1.0)
    }
}

impl From<Color> for Pattern {
    fn from(color: Color) -> Self {
        Pattern::Solid(color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_from_color() {
        let p: Pattern = Color::RED.into();
        assert!(p.is_opaque_solid());
        assert!(p.surface().is_none());
    }

    #[test]
    fn test_translucent_solid_is_not_opaque() {
        let p = Pattern::Solid(Color::RED.with_alpha(0.5));
        assert!(!p.is_opaque_solid());
    }
}
