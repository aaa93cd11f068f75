//! Indicator surfaces.
//!
//! A surface is a transparent, click-through element drawn above the desktop.
//! Painting is left to the host; the engine only needs to create and destroy
//! them. `HeadlessSurfaceFactory` keeps track of live surfaces and logs what
//! would be shown, which is enough for headless sessions and tests.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::arrow::ArrowPlacement;
use crate::error::{GuidanceError, Result};
use crate::geometry::{DisplayBounds, PixelPoint};

pub type SurfaceId = u64;

/// Everything needed to draw one arrow
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfaceSpec {
    pub display: DisplayBounds,
    /// Global target the tip points at
    pub target: PixelPoint,
    pub arrow: ArrowPlacement,
    pub color: String,
    pub opacity: f32,
}

pub trait OverlaySurface: Send + Sync {
    fn id(&self) -> SurfaceId;

    /// Remove the surface from screen. Calling it again is a no-op.
    fn destroy(&self);

    fn is_destroyed(&self) -> bool;
}

pub trait SurfaceFactory: Send + Sync {
    fn create(&self, spec: &SurfaceSpec) -> Result<Box<dyn OverlaySurface>>;
}

struct HeadlessSurface {
    id: SurfaceId,
    destroyed: AtomicBool,
    live: Arc<AtomicUsize>,
}

impl OverlaySurface for HeadlessSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            self.live.fetch_sub(1, Ordering::SeqCst);
            debug!("[Overlay] Surface {} destroyed", self.id);
        }
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl Drop for HeadlessSurface {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[derive(Default)]
pub struct HeadlessSurfaceFactory {
    next_id: AtomicU64,
    live: Arc<AtomicUsize>,
    history: Mutex<Vec<SurfaceSpec>>,
    fail_next: AtomicBool,
}

impl HeadlessSurfaceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Surfaces created and not yet destroyed
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Every spec created so far, oldest first
    pub fn history(&self) -> Vec<SurfaceSpec> {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Make the next `create` fail
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl SurfaceFactory for HeadlessSurfaceFactory {
    fn create(&self, spec: &SurfaceSpec) -> Result<Box<dyn OverlaySurface>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(GuidanceError::Surface("surface creation refused".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.live.fetch_add(1, Ordering::SeqCst);
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(spec.clone());

        info!(
            "[Overlay] Surface {}: {} arrow on {} centred at ({:.1}, {:.1}), {} @ {:.2}",
            id,
            spec.arrow.direction,
            spec.display,
            spec.arrow.center_local.0,
            spec.arrow.center_local.1,
            spec.color,
            spec.opacity
        );

        Ok(Box::new(HeadlessSurface {
            id,
            destroyed: AtomicBool::new(false),
            live: self.live.clone(),
        }))
    }
}
