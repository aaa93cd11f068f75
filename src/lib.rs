/*!
 * Guidance Overlay Library
 *
 * Screen state capture and directional guidance overlays for a
 * conversational desktop assistant.
 */

pub mod auto_capture;
pub mod capture;
pub mod config;
pub mod context;
pub mod display;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod input;
pub mod metrics;
pub mod overlay;
pub mod platform;

// Re-export commonly used types
pub use auto_capture::{AnalysisHandler, AutoCaptureCoordinator, QueueOutcome};
pub use config::EngineConfig;
pub use context::{ScreenContext, ScreenContextStore, ScreenFrame};
pub use engine::{GuidanceEngine, PlacementRequest, PlacementResult};
pub use error::{GuidanceError, Result};
pub use geometry::{Basis, Direction, DisplayBounds, NormalizedPoint, PixelPoint};
pub use overlay::{AnalysisQueue, OverlayManager};
