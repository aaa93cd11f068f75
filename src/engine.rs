//! Guidance engine: the composed context object.
//!
//! Owns one of each component and exposes the operations the tool-calling
//! layer needs: capture now, place an overlay, read the screen context.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::auto_capture::{AnalysisHandler, AutoCaptureCoordinator, LastCaptureInfo};
use crate::capture::{self, CapturePipeline, CapturePrimitive, NormalizeSettings, SessionStorage};
use crate::config::EngineConfig;
use crate::context::{ScreenContext, ScreenContextStore, ScreenFrame};
use crate::display::{DisplayProvider, DisplayResolver, SystemDisplays};
use crate::error::Result;
use crate::geometry::{self, Basis, Direction, DisplayBounds, FrameDimensions, MapTarget, NormalizedPoint, PixelPoint};
use crate::input::{GlobalInputHook, InputSourceFactory, RdevHook};
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::overlay::{HeadlessSurfaceFactory, OverlayManager, OverlayStyle, SurfaceFactory};

/// Frames younger than this count as "recent"
pub const RECENT_FRAME_AGE: Duration = Duration::from_secs(30);

/// Basis name for detections given in pixels of the current frame
pub const IMAGE_PIXEL_BASIS: &str = "image_pixel";

/// A placement as requested by the tool-calling layer
#[derive(Debug, Clone, Deserialize)]
pub struct PlacementRequest {
    /// `percent`, `model` (alias `image_norm`), `pixel` or `image_pixel`
    pub basis: String,
    pub x: f64,
    pub y: f64,
    /// Inferred from the location when omitted
    #[serde(default)]
    pub direction: Option<String>,
    /// Display the percent/pixel point refers to; resolved when omitted
    #[serde(default)]
    pub display: Option<DisplayBounds>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub opacity: Option<f32>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl PlacementRequest {
    pub fn new(basis: &str, x: f64, y: f64) -> Self {
        Self {
            basis: basis.to_string(),
            x,
            y,
            direction: None,
            display: None,
            color: None,
            opacity: None,
            duration_ms: None,
        }
    }

    pub fn with_direction(mut self, direction: &str) -> Self {
        self.direction = Some(direction.to_string());
        self
    }

    pub fn on_display(mut self, display: DisplayBounds) -> Self {
        self.display = Some(display);
        self
    }
}

/// What the tool-calling layer gets back
#[derive(Debug, Clone, Serialize)]
pub struct PlacementResult {
    pub surface_id: u64,
    pub direction: Direction,
    pub basis: Basis,
    /// Global pixel the arrow tip points at
    pub pixel: PixelPoint,
    pub display: DisplayBounds,
    /// Arrow box centre relative to the display origin
    pub local_center: (f64, f64),
}

/// Pluggable platform pieces; anything left unset uses the system default
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    capture: Option<Arc<dyn CapturePrimitive>>,
    displays: Option<Arc<dyn DisplayProvider>>,
    hook: Option<Arc<dyn GlobalInputHook>>,
    surfaces: Option<Arc<dyn SurfaceFactory>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn capture(mut self, capture: Arc<dyn CapturePrimitive>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn displays(mut self, displays: Arc<dyn DisplayProvider>) -> Self {
        self.displays = Some(displays);
        self
    }

    pub fn input_hook(mut self, hook: Arc<dyn GlobalInputHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn surfaces(mut self, surfaces: Arc<dyn SurfaceFactory>) -> Self {
        self.surfaces = Some(surfaces);
        self
    }

    pub fn build(self) -> GuidanceEngine {
        let config = self.config;
        let metrics = EngineMetrics::new();

        let capture = self
            .capture
            .unwrap_or_else(|| Arc::new(capture::create_platform_capturer()) as Arc<dyn CapturePrimitive>);
        let displays = self
            .displays
            .unwrap_or_else(|| Arc::new(SystemDisplays) as Arc<dyn DisplayProvider>);
        let hook = self
            .hook
            .unwrap_or_else(|| Arc::new(RdevHook::new()) as Arc<dyn GlobalInputHook>);
        let surfaces = self
            .surfaces
            .unwrap_or_else(|| Arc::new(HeadlessSurfaceFactory::new()) as Arc<dyn SurfaceFactory>);
        let resolver = DisplayResolver::new(displays);

        let store = Arc::new(ScreenContextStore::new());
        let storage = Arc::new(SessionStorage::new(config.capture.screenshot_dir.clone()));
        let pipeline = Arc::new(CapturePipeline::new(
            capture,
            storage.clone(),
            resolver.clone(),
            store.clone(),
            NormalizeSettings::from(&config.capture),
            metrics.clone(),
        ));

        let inputs = InputSourceFactory::new(hook, &config.input);
        let overlay = Arc::new(OverlayManager::new(surfaces, inputs.create("overlay"), metrics.clone()));
        let auto_capture = AutoCaptureCoordinator::new(
            pipeline.clone(),
            inputs.create("auto-capture"),
            overlay.visibility(),
            &config.auto_capture,
            metrics.clone(),
        );
        overlay.set_analysis_queue(auto_capture.clone());

        GuidanceEngine {
            config,
            store,
            resolver,
            storage,
            pipeline,
            overlay,
            auto_capture,
            metrics,
        }
    }
}

pub struct GuidanceEngine {
    config: EngineConfig,
    store: Arc<ScreenContextStore>,
    resolver: DisplayResolver,
    storage: Arc<SessionStorage>,
    pipeline: Arc<CapturePipeline>,
    overlay: Arc<OverlayManager>,
    auto_capture: Arc<AutoCaptureCoordinator>,
    metrics: EngineMetrics,
}

impl GuidanceEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Arm auto-capture if configured. Must be called from within a tokio runtime.
    pub fn start(&self) {
        if self.config.auto_capture.enabled {
            self.auto_capture.enable();
        }
        info!(
            "[Engine] Started (auto-capture {}, screenshots in {})",
            if self.auto_capture.is_enabled() { "on" } else { "off" },
            self.config.capture.screenshot_dir.display()
        );
    }

    /// Capture the screen now and make it the current frame
    pub async fn capture_now(&self) -> Result<Arc<ScreenFrame>> {
        self.pipeline.capture().await
    }

    /// Replace whatever guidance is showing with one arrow.
    ///
    /// Basis and direction are validated before anything changes on screen.
    pub fn place_overlay(&self, request: &PlacementRequest) -> Result<PlacementResult> {
        let point = self.request_point(request)?;
        let basis = point.basis;
        let requested_direction = request
            .direction
            .as_deref()
            .map(str::parse::<Direction>)
            .transpose()?;

        let (display, target) = self.resolve_target(&point, request.display)?;
        let direction =
            requested_direction.unwrap_or_else(|| geometry::direction(&point.to_percent(&display)));

        let style = self.style_for(request);

        let superseded = self.overlay.clear_all();
        if superseded > 0 {
            debug!("[Engine] Superseded {} surface(s)", superseded);
        }

        let placed = self.overlay.place(direction, target, display, &style)?;
        Ok(PlacementResult {
            surface_id: placed.surface_id,
            direction,
            basis,
            pixel: placed.target,
            display: placed.display,
            local_center: placed.arrow.center_local,
        })
    }

    /// Image-pixel detections are normalized onto the model basis of the current frame
    fn request_point(&self, request: &PlacementRequest) -> Result<NormalizedPoint> {
        if request.basis.trim().eq_ignore_ascii_case(IMAGE_PIXEL_BASIS) {
            let frame = self.store.require()?;
            return Ok(geometry::image_pixel_to_model(request.x, request.y, &frame.dimensions()));
        }
        let basis: Basis = request.basis.parse()?;
        Ok(NormalizedPoint::new(basis, request.x, request.y))
    }

    fn resolve_target(
        &self,
        point: &NormalizedPoint,
        requested_display: Option<DisplayBounds>,
    ) -> Result<(DisplayBounds, PixelPoint)> {
        let frame_dims = |frame: Option<&Arc<ScreenFrame>>| {
            frame.map(|f| f.dimensions()).unwrap_or(FrameDimensions::new(
                self.config.capture.target_width,
                self.config.capture.target_height,
            ))
        };

        let (display, frame) = match point.basis {
            // Model points are positions in the current frame, so they need one
            Basis::Model => {
                let frame = self.store.require()?;
                (frame.display_bounds, Some(frame))
            }
            Basis::Percent => {
                let frame = self.store.get();
                let display = requested_display
                    .or_else(|| frame.as_ref().map(|f| f.display_bounds))
                    .unwrap_or_else(|| self.resolver.resolve_at_cursor());
                (display, frame)
            }
            Basis::Pixel => {
                let raw = PixelPoint::from_f64(point.x, point.y);
                let display = requested_display.unwrap_or_else(|| self.resolver.resolve(raw));
                (display, None)
            }
        };

        let target = geometry::to_pixel(point, &display, &frame_dims(frame.as_ref()), MapTarget::Display);
        Ok((display, target))
    }

    fn style_for(&self, request: &PlacementRequest) -> OverlayStyle {
        let mut style = OverlayStyle::from(&self.config.overlay);
        if let Some(color) = &request.color {
            style.color = color.clone();
        }
        if let Some(opacity) = request.opacity {
            style.opacity = opacity.clamp(0.0, 1.0);
        }
        style.duration = request.duration_ms.map(Duration::from_millis);
        style
    }

    /// Remove guidance without triggering analysis
    pub fn clear_overlays(&self) -> usize {
        self.overlay.clear_all()
    }

    /// Dismiss guidance as if the user interacted with it
    pub fn dismiss_overlays(&self, reason: &str) -> bool {
        self.overlay.dismiss(reason)
    }

    pub fn screen_context(&self) -> ScreenContext {
        self.store.context(Utc::now())
    }

    pub fn has_recent_frame(&self) -> bool {
        self.store.is_recent(RECENT_FRAME_AGE)
    }

    pub fn current_frame(&self) -> Option<Arc<ScreenFrame>> {
        self.store.get()
    }

    pub fn set_analysis_handler(&self, handler: Arc<dyn AnalysisHandler>) {
        self.auto_capture.set_analysis_handler(handler);
    }

    pub fn auto_capture(&self) -> &Arc<AutoCaptureCoordinator> {
        &self.auto_capture
    }

    pub fn overlay(&self) -> &Arc<OverlayManager> {
        &self.overlay
    }

    pub fn last_capture_info(&self) -> LastCaptureInfo {
        self.auto_capture.last_capture_info()
    }

    pub fn session(&self) -> Option<crate::capture::storage::SessionStats> {
        self.storage.stats()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Tear down all guidance without analysis and stop listening for input
    pub fn shutdown(&self) {
        self.overlay.shutdown();
        self.auto_capture.shutdown();
        info!("[Engine] Shut down");
    }
}
