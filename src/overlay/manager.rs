//! Overlay Lifecycle Manager
//!
//! Empty (no surfaces, not visible) <-> Showing (>= 1 surface, visible).
//!
//! The surface registry and the visible flag live under one mutex and are only
//! ever changed together. Every return to Empty bumps an epoch; timers and
//! input handlers remember the epoch they were created in and do nothing once
//! it has passed, so a stale callback can never tear down newer overlays.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::arrow::{place_arrow, ArrowPlacement};
use super::surface::{OverlaySurface, SurfaceFactory, SurfaceId, SurfaceSpec};
use super::AnalysisQueue;
use crate::config::OverlayConfig;
use crate::error::Result;
use crate::geometry::{Direction, DisplayBounds, PixelPoint};
use crate::input::InputEventSource;
use crate::metrics::EngineMetrics;

/// Reason attached to the analysis queued when the user interacts with guidance on screen
pub const INTERACTION_REASON: &str = "user interacted during guidance";

/// Reason attached when a placement's display duration runs out
pub const DURATION_REASON: &str = "guidance duration elapsed";

type Listener = Box<dyn Fn(bool) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    pub color: String,
    pub opacity: f32,
    /// Arrow box size in pixels
    pub size: f64,
    /// Dismiss automatically after this long
    pub duration: Option<Duration>,
}

impl From<&OverlayConfig> for OverlayStyle {
    fn from(config: &OverlayConfig) -> Self {
        Self {
            color: config.color.clone(),
            opacity: config.opacity,
            size: config.arrow_size,
            duration: None,
        }
    }
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self::from(&OverlayConfig::default())
    }
}

/// Result of a successful placement
#[derive(Debug, Clone)]
pub struct PlacedOverlay {
    pub surface_id: SurfaceId,
    pub target: PixelPoint,
    pub display: DisplayBounds,
    pub arrow: ArrowPlacement,
}

struct LiveSurface {
    surface: Box<dyn OverlaySurface>,
}

#[derive(Default)]
struct State {
    surfaces: Vec<LiveSurface>,
    visible: bool,
    epoch: u64,
}

pub struct OverlayManager {
    state: Mutex<State>,
    factory: Arc<dyn SurfaceFactory>,
    input: InputEventSource,
    analysis: Mutex<Option<Arc<dyn AnalysisQueue>>>,
    visibility: watch::Sender<bool>,
    listeners: Mutex<Vec<Listener>>,
    metrics: EngineMetrics,
}

impl OverlayManager {
    pub fn new(factory: Arc<dyn SurfaceFactory>, input: InputEventSource, metrics: EngineMetrics) -> Self {
        let (visibility, _) = watch::channel(false);
        Self {
            state: Mutex::new(State::default()),
            factory,
            input,
            analysis: Mutex::new(None),
            visibility,
            listeners: Mutex::new(Vec::new()),
            metrics,
        }
    }

    /// Where dismissal re-analysis requests go
    pub fn set_analysis_queue(&self, queue: Arc<dyn AnalysisQueue>) {
        *self.analysis.lock().unwrap_or_else(|e| e.into_inner()) = Some(queue);
    }

    /// Called with `true` on Empty -> Showing and `false` on Showing -> Empty
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(listener));
    }

    /// Live view of the visible flag
    pub fn visibility(&self) -> watch::Receiver<bool> {
        self.visibility.subscribe()
    }

    pub fn is_visible(&self) -> bool {
        self.lock().visible
    }

    pub fn surface_count(&self) -> usize {
        self.lock().surfaces.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, visible: bool) {
        let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        for listener in listeners.iter() {
            listener(visible);
        }
    }

    /// Show an arrow whose tip lands on `target` (global pixels) on `display`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn place(
        self: &Arc<Self>,
        direction: Direction,
        target: PixelPoint,
        display: DisplayBounds,
        style: &OverlayStyle,
    ) -> Result<PlacedOverlay> {
        let arrow = place_arrow(direction, target, display, style.size);
        let spec = SurfaceSpec {
            display,
            target,
            arrow,
            color: style.color.clone(),
            opacity: style.opacity,
        };

        let surface = self.factory.create(&spec)?;
        let surface_id = surface.id();

        let (became_visible, epoch, count) = {
            let mut state = self.lock();
            state.surfaces.push(LiveSurface { surface });
            let became_visible = !state.visible;
            state.visible = true;
            if became_visible {
                self.visibility.send_replace(true);
            }
            (became_visible, state.epoch, state.surfaces.len())
        };

        self.metrics.record_overlay_placed();
        // Alias: tracing's macros import `field::display`, which shadows a local named `display`.
        let shown_display = &display;
        info!(
            "[Overlay] Placed {} arrow at ({}, {}) on {} ({} live)",
            direction, target.x, target.y, shown_display, count
        );

        if became_visible {
            self.notify(true);
            let weak = Arc::downgrade(self);
            self.input.start(move || {
                if let Some(manager) = weak.upgrade() {
                    manager.dismiss_epoch(epoch, INTERACTION_REASON);
                }
            });
        }

        if let Some(duration) = style.duration {
            let weak: Weak<Self> = Arc::downgrade(self);
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                if let Some(manager) = weak.upgrade() {
                    manager.dismiss_epoch(epoch, DURATION_REASON);
                }
            });
        }

        Ok(PlacedOverlay {
            surface_id,
            target,
            display,
            arrow,
        })
    }

    /// Dismiss the guidance currently on screen: queue a forced re-analysis,
    /// then tear everything down. Returns false when nothing was showing.
    pub fn dismiss(&self, reason: &str) -> bool {
        let epoch = self.lock().epoch;
        self.dismiss_epoch(epoch, reason)
    }

    fn dismiss_epoch(&self, epoch: u64, reason: &str) -> bool {
        {
            let state = self.lock();
            if !state.visible || state.epoch != epoch {
                debug!("[Overlay] Ignoring stale dismissal ({})", reason);
                return false;
            }
        }

        // Queued while still showing, before any surface goes away
        let queue = self.analysis.lock().unwrap_or_else(|e| e.into_inner()).clone();
        match queue {
            Some(queue) => {
                let outcome = queue.queue_analysis(reason, true);
                debug!("[Overlay] Re-analysis on dismissal: {:?}", outcome);
            }
            None => debug!("[Overlay] No analysis queue registered"),
        }

        // Re-checked under the lock: the placement may have been replaced meanwhile
        let removed = self.teardown(Some(epoch));
        if removed == 0 {
            debug!("[Overlay] Placement replaced before dismissal completed ({})", reason);
            return false;
        }
        info!("[Overlay] Dismissed {} surface(s): {}", removed, reason);
        true
    }

    /// Remove every surface without queuing analysis. Used to supersede old
    /// guidance with a new placement.
    pub fn clear_all(&self) -> usize {
        let removed = self.teardown(None);
        if removed > 0 {
            info!("[Overlay] Cleared {} surface(s)", removed);
        }
        removed
    }

    /// Process shutdown: unconditional teardown, never queues analysis
    pub fn shutdown(&self) {
        let removed = self.teardown(None);
        self.input.stop();
        info!("[Overlay] Shutdown, removed {} surface(s)", removed);
    }

    /// Remove every surface. With `epoch` set, only if that placement is still current.
    fn teardown(&self, epoch: Option<u64>) -> usize {
        let (surfaces, was_visible) = {
            let mut state = self.lock();
            if epoch.map_or(false, |e| e != state.epoch) {
                return 0;
            }
            let surfaces = std::mem::take(&mut state.surfaces);
            let was_visible = state.visible;
            state.visible = false;
            if was_visible {
                state.epoch += 1;
                self.visibility.send_replace(false);
            }
            (surfaces, was_visible)
        };

        if !was_visible {
            return 0;
        }

        self.input.stop();
        for live in &surfaces {
            live.surface.destroy();
        }
        self.metrics.record_overlays_dismissed(surfaces.len() as u64);
        self.notify(false);
        surfaces.len()
    }
}

impl Drop for OverlayManager {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if !state.surfaces.is_empty() {
            warn!("[Overlay] Dropped with {} live surface(s)", state.surfaces.len());
            for live in state.surfaces.drain(..) {
                live.surface.destroy();
            }
        }
    }
}
