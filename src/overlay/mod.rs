//! Guidance overlay lifecycle

pub mod arrow;
pub mod manager;
pub mod surface;

pub use arrow::{place_arrow, ArrowPlacement};
pub use manager::{OverlayManager, OverlayStyle, PlacedOverlay, INTERACTION_REASON};
pub use surface::{HeadlessSurfaceFactory, OverlaySurface, SurfaceFactory, SurfaceSpec};

use crate::auto_capture::QueueOutcome;

/// Receiver of re-analysis requests raised when guidance is dismissed
pub trait AnalysisQueue: Send + Sync {
    /// Must not block: mark the request and return
    fn queue_analysis(&self, reason: &str, force: bool) -> QueueOutcome;
}
