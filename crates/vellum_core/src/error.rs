//! Error types for the backend resource boundary
//!
//! Vellum itself treats contract violations as fatal; the only recoverable
//! failures are resource constructions forwarded to a backend, which may run
//! out of surface memory or be asked for a format it cannot express.

use crate::backend::SurfaceFormat;
use crate::geometry::IntSize;

/// Failures a backend may report when asked to construct a resource.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("failed to create {size:?} {format:?} surface")]
    SurfaceCreation {
        size: IntSize,
        format: SurfaceFormat,
    },

    #[error("surface format {0:?} not supported by this backend")]
    UnsupportedFormat(SurfaceFormat),

    #[error("failed to create similar target of size {0:?}")]
    SimilarTargetCreation(IntSize),
}
