//! Per-consumer input subscription.
//!
//! Each `InputEventSource` holds at most one active registration. In hook
//! mode the handler runs once per physical interaction (duplicates inside the
//! duplicate window are dropped). In fallback mode, used when the platform
//! hook is unavailable, the handler runs exactly once after a fixed timeout.
//! A hook that fails after a source started switches that source to the
//! timeout from the moment of failure.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::hook::GlobalInputHook;
use crate::config::InputConfig;

/// Cancellation handle for one registration
#[derive(Debug, Clone)]
pub struct Subscription {
    abort: AbortHandle,
}

impl Subscription {
    /// Stop delivering events. Idempotent.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.abort.is_finished()
    }
}

#[derive(Clone)]
enum Mode {
    Hook(Arc<dyn GlobalInputHook>),
    Fallback,
}

/// Checks the platform hook once and hands out sources that share it
#[derive(Clone)]
pub struct InputSourceFactory {
    mode: Mode,
    duplicate_window: Duration,
    fallback_timeout: Duration,
}

impl InputSourceFactory {
    pub fn new(hook: Arc<dyn GlobalInputHook>, config: &InputConfig) -> Self {
        let mode = if hook.is_supported() {
            info!("[Input] Using global input hook '{}'", hook.name());
            Mode::Hook(hook)
        } else {
            warn!(
                "[Input] Global input hook '{}' unavailable; falling back to a {}ms timeout",
                hook.name(),
                config.fallback_timeout_ms
            );
            Mode::Fallback
        };

        Self {
            mode,
            duplicate_window: config.duplicate_window(),
            fallback_timeout: config.fallback_timeout(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.mode, Mode::Fallback)
    }

    /// New independent source; `owner` only labels log lines
    pub fn create(&self, owner: &'static str) -> InputEventSource {
        InputEventSource {
            owner,
            mode: self.mode.clone(),
            duplicate_window: self.duplicate_window,
            fallback_timeout: self.fallback_timeout,
            active: Mutex::new(None),
        }
    }
}

pub struct InputEventSource {
    owner: &'static str,
    mode: Mode,
    duplicate_window: Duration,
    fallback_timeout: Duration,
    active: Mutex<Option<Subscription>>,
}

impl InputEventSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self.mode, Mode::Fallback)
    }

    /// Register `on_event`, replacing any earlier registration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(&self, mut on_event: F) -> Subscription
    where
        F: FnMut() + Send + 'static,
    {
        let owner = self.owner;
        let task = match &self.mode {
            Mode::Hook(hook) => {
                // Subscribe before spawning so nothing fired after start() is missed
                let mut events = hook.subscribe();
                let window = self.duplicate_window;
                let timeout = self.fallback_timeout;
                tokio::spawn(async move {
                    let mut last: Option<Instant> = None;
                    loop {
                        match events.recv().await {
                            Ok(event) => {
                                let now = Instant::now();
                                if last.map_or(false, |prev| now.duration_since(prev) < window) {
                                    debug!("[Input] {}: duplicate {:?} suppressed", owner, event.kind);
                                    continue;
                                }
                                last = Some(now);
                                debug!("[Input] {}: {:?}", owner, event.kind);
                                on_event();
                            }
                            Err(RecvError::Lagged(skipped)) => {
                                debug!("[Input] {}: skipped {} buffered events", owner, skipped);
                            }
                            Err(RecvError::Closed) => {
                                warn!(
                                    "[Input] {}: global hook stopped; falling back to a {}ms timeout",
                                    owner,
                                    timeout.as_millis()
                                );
                                tokio::time::sleep(timeout).await;
                                info!("[Input] {}: fallback timeout elapsed", owner);
                                on_event();
                                break;
                            }
                        }
                    }
                })
            }
            Mode::Fallback => {
                let timeout = self.fallback_timeout;
                tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    info!("[Input] {}: fallback timeout elapsed", owner);
                    on_event();
                })
            }
        };

        let subscription = Subscription {
            abort: task.abort_handle(),
        };
        let previous = self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(subscription.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        subscription
    }

    /// Cancel the active registration and any pending fallback timer. Idempotent.
    pub fn stop(&self) {
        let current = self.active.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(subscription) = current {
            subscription.cancel();
            debug!("[Input] {}: stopped", self.owner);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(false, Subscription::is_active)
    }
}

impl Drop for InputEventSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::hook::{InputEvent, ManualHook};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn factory(hook: Arc<ManualHook>) -> InputSourceFactory {
        InputSourceFactory::new(hook, &InputConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_signals_fire_once() {
        let hook = Arc::new(ManualHook::new());
        let source = factory(hook.clone()).create("test");
        let (count, handler) = counter();
        source.start(handler);

        hook.fire(InputEvent::pointer_down());
        hook.fire(InputEvent::scroll());
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(150)).await;
        hook.fire(InputEvent::pointer_down());
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn new_start_replaces_previous() {
        let hook = Arc::new(ManualHook::new());
        let source = factory(hook.clone()).create("test");
        let (first, h1) = counter();
        let (second, h2) = counter();

        let old = source.start(h1);
        source.start(h2);
        settle().await;
        assert!(!old.is_active());

        hook.fire(InputEvent::pointer_down());
        settle().await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sources_sharing_a_hook_are_independent() {
        let hook = Arc::new(ManualHook::new());
        let factory = factory(hook.clone());
        let a = factory.create("a");
        let b = factory.create("b");
        let (count_a, ha) = counter();
        let (count_b, hb) = counter();
        a.start(ha);
        b.start(hb);

        a.stop();
        hook.fire(InputEvent::pointer_down());
        settle().await;
        assert_eq!(count_a.load(Ordering::SeqCst), 0);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_fires_once_after_timeout() {
        let factory = factory(Arc::new(ManualHook::unsupported()));
        assert!(factory.is_fallback());
        let source = factory.create("test");
        let (count, handler) = counter();
        source.start(handler);

        tokio::time::sleep(Duration::from_millis(9_900)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hook_failure_after_start_arms_fallback() {
        let hook = Arc::new(ManualHook::new());
        let factory = factory(hook.clone());
        assert!(!factory.is_fallback());
        let source = factory.create("test");
        let (count, handler) = counter();
        source.start(handler);

        hook.fail();
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(9_900)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Starting again on the failed hook goes straight to the timeout
        let (again, handler) = counter();
        source.start(handler);
        tokio::time::sleep(Duration::from_millis(10_100)).await;
        assert_eq!(again.load(Ordering::SeqCst), 1);

        assert!(InputSourceFactory::new(hook, &InputConfig::default()).is_fallback());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_fallback_and_is_idempotent() {
        let source = factory(Arc::new(ManualHook::unsupported())).create("test");
        let (count, handler) = counter();
        let subscription = source.start(handler);

        source.stop();
        source.stop();
        subscription.cancel();

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!source.is_active());
    }
}
