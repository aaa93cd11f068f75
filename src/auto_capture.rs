//! Auto-Capture Coordinator
//!
//! Idle --enable()--> Armed --disable()--> Idle.
//!
//! While armed, every qualifying input event outside the debounce window
//! schedules one capture after the settle delay. Analysis requests are
//! single-flight: at most one runs at a time and anything arriving meanwhile
//! is dropped, never queued.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::capture::CapturePipeline;
use crate::config::AutoCaptureConfig;
use crate::context::ScreenFrame;
use crate::input::InputEventSource;
use crate::metrics::EngineMetrics;
use crate::overlay::AnalysisQueue;

/// Reason passed to the handler for analyses started by auto-capture itself
pub const AUTO_CAPTURE_REASON: &str = "screen changed after user interaction";

/// Downstream consumer of fresh frames (typically a vision model round trip)
#[async_trait]
pub trait AnalysisHandler: Send + Sync {
    async fn analyze(&self, frame: Arc<ScreenFrame>, reason: &str) -> anyhow::Result<()>;
}

/// What happened to an analysis request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueOutcome {
    Queued,
    /// Not forced and no guidance on screen
    SkippedNoOverlay,
    /// Another analysis is still running
    SkippedInFlight,
    /// No handler registered
    NoHandler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Idle,
    Armed,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastCaptureInfo {
    pub enabled: bool,
    pub debounce_ms: u64,
    /// Milliseconds since the last honored interaction, if any
    pub since_last_capture_ms: Option<u64>,
    pub analysis_in_flight: bool,
}

/// Clears the in-flight flag however the analysis task ends
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Debounce {
    armed: bool,
    last_capture: Option<Instant>,
    pending: Vec<AbortHandle>,
}

pub struct AutoCaptureCoordinator {
    me: Weak<Self>,
    pipeline: Arc<CapturePipeline>,
    input: InputEventSource,
    overlay_visible: watch::Receiver<bool>,
    handler: Mutex<Option<Arc<dyn AnalysisHandler>>>,
    debounce_window: Duration,
    settle_delay: Duration,
    debounce: Mutex<Debounce>,
    in_flight: Arc<AtomicBool>,
    analyses: Mutex<Vec<AbortHandle>>,
    metrics: EngineMetrics,
}

impl AutoCaptureCoordinator {
    pub fn new(
        pipeline: Arc<CapturePipeline>,
        input: InputEventSource,
        overlay_visible: watch::Receiver<bool>,
        config: &AutoCaptureConfig,
        metrics: EngineMetrics,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            pipeline,
            input,
            overlay_visible,
            handler: Mutex::new(None),
            debounce_window: config.debounce(),
            settle_delay: config.settle_delay(),
            debounce: Mutex::new(Debounce::default()),
            in_flight: Arc::new(AtomicBool::new(false)),
            analyses: Mutex::new(Vec::new()),
            metrics,
        })
    }

    fn debounce_state(&self) -> std::sync::MutexGuard<'_, Debounce> {
        self.debounce.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_analysis_handler(&self, handler: Arc<dyn AnalysisHandler>) {
        *self.handler.lock().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    pub fn clear_analysis_handler(&self) {
        *self.handler.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn state(&self) -> CoordinatorState {
        if self.debounce_state().armed {
            CoordinatorState::Armed
        } else {
            CoordinatorState::Idle
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state() == CoordinatorState::Armed
    }

    pub fn is_analysis_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Start capturing on user interaction. No-op when already armed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enable(&self) {
        {
            let mut debounce = self.debounce_state();
            if debounce.armed {
                return;
            }
            debounce.armed = true;
        }

        let me = self.me.clone();
        self.input.start(move || {
            if let Some(coordinator) = me.upgrade() {
                coordinator.on_input();
            }
        });
        info!(
            "[AutoCapture] Enabled (debounce {}ms, settle {}ms)",
            self.debounce_window.as_millis(),
            self.settle_delay.as_millis()
        );
    }

    /// Stop listening and cancel captures that have not started yet
    pub fn disable(&self) {
        self.input.stop();
        let pending = {
            let mut debounce = self.debounce_state();
            if !std::mem::replace(&mut debounce.armed, false) {
                return;
            }
            std::mem::take(&mut debounce.pending)
        };
        for task in &pending {
            task.abort();
        }
        info!("[AutoCapture] Disabled");
    }

    /// Disable and abort any running analysis
    pub fn shutdown(&self) {
        self.disable();
        let analyses = std::mem::take(&mut *self.analyses.lock().unwrap_or_else(|e| e.into_inner()));
        for task in &analyses {
            task.abort();
        }
    }

    pub fn last_capture_info(&self) -> LastCaptureInfo {
        let debounce = self.debounce_state();
        LastCaptureInfo {
            enabled: debounce.armed,
            debounce_ms: self.debounce_window.as_millis() as u64,
            since_last_capture_ms: debounce
                .last_capture
                .map(|t| t.elapsed().as_millis() as u64),
            analysis_in_flight: self.is_analysis_in_flight(),
        }
    }

    fn on_input(&self) {
        let Some(me) = self.me.upgrade() else {
            return;
        };

        let mut debounce = self.debounce_state();
        if !debounce.armed {
            return;
        }

        let now = Instant::now();
        if let Some(last) = debounce.last_capture {
            let since = now.duration_since(last);
            if since < self.debounce_window {
                debug!(
                    "[AutoCapture] Debounced ({}ms since last capture)",
                    since.as_millis()
                );
                return;
            }
        }
        debounce.last_capture = Some(now);

        let settle = self.settle_delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            // Detached: disable() cancels the wait, never a capture already running
            tokio::spawn(async move {
                me.capture_after_interaction().await;
            });
        });
        debounce.pending.retain(|t| !t.is_finished());
        debounce.pending.push(task.abort_handle());
        debug!("[AutoCapture] Capture scheduled in {}ms", settle.as_millis());
    }

    async fn capture_after_interaction(&self) {
        let frame = match self.pipeline.capture().await {
            Ok(frame) => frame,
            Err(e) => {
                warn!("[AutoCapture] Capture failed: {}", e);
                return;
            }
        };

        let (handler, guard) = match self.try_begin_analysis(AUTO_CAPTURE_REASON, false) {
            Ok(begun) => begun,
            Err(outcome) => {
                debug!("[AutoCapture] Frame {} captured, no analysis ({:?})", frame.id, outcome);
                return;
            }
        };

        self.run_analysis(handler, frame, AUTO_CAPTURE_REASON, guard).await;
    }

    /// Check the gating rules and take the in-flight slot
    fn try_begin_analysis(
        &self,
        reason: &str,
        force: bool,
    ) -> std::result::Result<(Arc<dyn AnalysisHandler>, InFlightGuard), QueueOutcome> {
        let handler = self.handler.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let Some(handler) = handler else {
            debug!("[AutoCapture] No analysis handler, dropping '{}'", reason);
            return Err(QueueOutcome::NoHandler);
        };

        if !force && !*self.overlay_visible.borrow() {
            info!("[AutoCapture] No guidance on screen, dropping analysis '{}'", reason);
            self.metrics.record_analysis_skipped();
            return Err(QueueOutcome::SkippedNoOverlay);
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("[AutoCapture] Analysis already in flight, dropping '{}'", reason);
            self.metrics.record_analysis_skipped();
            return Err(QueueOutcome::SkippedInFlight);
        }

        Ok((handler, InFlightGuard(self.in_flight.clone())))
    }

    async fn run_analysis(
        &self,
        handler: Arc<dyn AnalysisHandler>,
        frame: Arc<ScreenFrame>,
        reason: &str,
        _guard: InFlightGuard,
    ) {
        self.metrics.record_analysis_run();
        info!("[AutoCapture] Analyzing frame {} ({})", frame.id, reason);
        if let Err(e) = handler.analyze(frame, reason).await {
            error!("[AutoCapture] Analysis failed: {:#}", e);
        }
    }
}

impl AnalysisQueue for AutoCaptureCoordinator {
    fn queue_analysis(&self, reason: &str, force: bool) -> QueueOutcome {
        let Some(me) = self.me.upgrade() else {
            return QueueOutcome::NoHandler;
        };

        let (handler, guard) = match self.try_begin_analysis(reason, force) {
            Ok(begun) => begun,
            Err(outcome) => return outcome,
        };

        let reason = reason.to_string();
        let settle = self.settle_delay;
        let task = tokio::spawn(async move {
            // Guard moves in first so an abort during the settle delay still clears it
            let guard = guard;
            tokio::time::sleep(settle).await;
            match me.pipeline.capture().await {
                Ok(frame) => me.run_analysis(handler, frame, &reason, guard).await,
                Err(e) => warn!("[AutoCapture] Capture for analysis '{}' failed: {}", reason, e),
            }
        });

        let mut analyses = self.analyses.lock().unwrap_or_else(|e| e.into_inner());
        analyses.retain(|t| !t.is_finished());
        analyses.push(task.abort_handle());
        debug!("[AutoCapture] Analysis queued (force={})", force);
        QueueOutcome::Queued
    }
}

impl Drop for AutoCaptureCoordinator {
    fn drop(&mut self) {
        for task in self.debounce.get_mut().unwrap_or_else(|e| e.into_inner()).pending.drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::pipeline::test_support::{small_settings, FakeCapture};
    use crate::capture::SessionStorage;
    use crate::config::InputConfig;
    use crate::context::ScreenContextStore;
    use crate::display::{DisplayResolver, StaticDisplays};
    use crate::geometry::DisplayBounds;
    use crate::input::{InputEvent, InputSourceFactory, ManualHook};
    use std::sync::atomic::AtomicUsize;

    struct CountingHandler {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingHandler {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                fail: false,
            })
        }

        fn count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AnalysisHandler for CountingHandler {
        async fn analyze(&self, _frame: Arc<ScreenFrame>, _reason: &str) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                anyhow::bail!("model unavailable");
            }
            Ok(())
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        hook: Arc<ManualHook>,
        capture: Arc<FakeCapture>,
        visible: watch::Sender<bool>,
        coordinator: Arc<AutoCaptureCoordinator>,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let capture = Arc::new(FakeCapture::default());
        let metrics = EngineMetrics::new();
        let pipeline = Arc::new(CapturePipeline::new(
            capture.clone(),
            Arc::new(SessionStorage::new(dir.path())),
            DisplayResolver::new(Arc::new(StaticDisplays::new(vec![DisplayBounds::new(0, 0, 1920, 1080)]))),
            Arc::new(ScreenContextStore::new()),
            small_settings(),
            metrics.clone(),
        ));

        let hook = Arc::new(ManualHook::new());
        let sources = InputSourceFactory::new(hook.clone(), &InputConfig::default());
        let (visible, visible_rx) = watch::channel(false);
        let coordinator = AutoCaptureCoordinator::new(
            pipeline,
            sources.create("auto-capture"),
            visible_rx,
            &AutoCaptureConfig::default(),
            metrics,
        );

        Harness {
            _dir: dir,
            hook,
            capture,
            visible,
            coordinator,
        }
    }

    fn grabs(h: &Harness) -> usize {
        h.capture.grabs.load(Ordering::SeqCst)
    }

    /// Advance virtual time while giving blocking work (encode, file writes)
    /// real time to finish
    async fn drain() {
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            tokio::task::spawn_blocking(|| std::thread::sleep(std::time::Duration::from_millis(2)))
                .await
                .unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn events_within_debounce_window_capture_once() {
        let h = harness();
        h.coordinator.enable();

        h.hook.fire(InputEvent::pointer_down());
        tokio::time::sleep(Duration::from_millis(500)).await;
        h.hook.fire(InputEvent::pointer_down());
        drain().await;

        assert_eq!(grabs(&h), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn events_outside_debounce_window_capture_twice() {
        let h = harness();
        h.coordinator.enable();

        h.hook.fire(InputEvent::pointer_down());
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        h.hook.fire(InputEvent::scroll());
        drain().await;

        assert_eq!(grabs(&h), 2);
        assert!(h.coordinator.last_capture_info().since_last_capture_ms.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn capture_waits_for_settle_delay() {
        let h = harness();
        h.coordinator.enable();

        h.hook.fire(InputEvent::pointer_down());
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(grabs(&h), 0);

        drain().await;
        assert_eq!(grabs(&h), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disable_cancels_pending_capture() {
        let h = harness();
        h.coordinator.enable();
        assert_eq!(h.coordinator.state(), CoordinatorState::Armed);

        h.hook.fire(InputEvent::pointer_down());
        tokio::time::sleep(Duration::from_millis(200)).await;
        h.coordinator.disable();
        h.coordinator.disable();
        drain().await;

        assert_eq!(grabs(&h), 0);
        assert!(!h.coordinator.is_enabled());

        // Events after disable are ignored
        h.hook.fire(InputEvent::pointer_down());
        drain().await;
        assert_eq!(grabs(&h), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn forced_requests_are_single_flight() {
        let h = harness();
        let handler = CountingHandler::new(Duration::from_secs(5));
        h.coordinator.set_analysis_handler(handler.clone());

        assert_eq!(h.coordinator.queue_analysis("first", true), QueueOutcome::Queued);
        assert_eq!(h.coordinator.queue_analysis("second", true), QueueOutcome::SkippedInFlight);
        assert!(h.coordinator.is_analysis_in_flight());

        drain().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(handler.count(), 1);
        assert!(!h.coordinator.is_analysis_in_flight());

        // Slot is free again
        assert_eq!(h.coordinator.queue_analysis("third", true), QueueOutcome::Queued);
    }

    #[tokio::test(start_paused = true)]
    async fn unforced_request_needs_visible_guidance() {
        let h = harness();
        let handler = CountingHandler::new(Duration::ZERO);
        assert_eq!(h.coordinator.queue_analysis("early", true), QueueOutcome::NoHandler);

        h.coordinator.set_analysis_handler(handler.clone());
        assert_eq!(h.coordinator.queue_analysis("idle", false), QueueOutcome::SkippedNoOverlay);

        h.visible.send_replace(true);
        assert_eq!(h.coordinator.queue_analysis("showing", false), QueueOutcome::Queued);
        drain().await;
        assert_eq!(handler.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_handler_still_releases_slot() {
        let h = harness();
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail: true,
        });
        h.coordinator.set_analysis_handler(handler.clone());

        assert_eq!(h.coordinator.queue_analysis("a", true), QueueOutcome::Queued);
        drain().await;
        assert!(!h.coordinator.is_analysis_in_flight());
        assert_eq!(h.coordinator.queue_analysis("b", true), QueueOutcome::Queued);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_settle_releases_slot() {
        let h = harness();
        h.coordinator.set_analysis_handler(CountingHandler::new(Duration::ZERO));
        assert_eq!(h.coordinator.queue_analysis("a", true), QueueOutcome::Queued);

        h.coordinator.shutdown();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!h.coordinator.is_analysis_in_flight());
        assert_eq!(grabs(&h), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_capture_analyzes_only_while_guidance_showing() {
        let h = harness();
        let handler = CountingHandler::new(Duration::ZERO);
        h.coordinator.set_analysis_handler(handler.clone());
        h.coordinator.enable();

        h.hook.fire(InputEvent::pointer_down());
        drain().await;
        assert_eq!(grabs(&h), 1);
        assert_eq!(handler.count(), 0);

        h.visible.send_replace(true);
        h.hook.fire(InputEvent::pointer_down());
        drain().await;
        assert_eq!(grabs(&h), 2);
        assert_eq!(handler.count(), 1);
    }
}
