// Platform input hooks
// Observe system-wide pointer and wheel events regardless of window focus

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Events buffered per subscriber before it starts lagging
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    PointerDown,
    Scroll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub kind: InputKind,
}

impl InputEvent {
    pub fn pointer_down() -> Self {
        Self { kind: InputKind::PointerDown }
    }

    pub fn scroll() -> Self {
        Self { kind: InputKind::Scroll }
    }
}

/// Source of raw global input events
pub trait GlobalInputHook: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the hook can observe events in this session
    fn is_supported(&self) -> bool;

    /// New receiver for every event from now on.
    ///
    /// The channel closes if the hook stops working (for example when the
    /// platform denies the listener permission); a hook that has already
    /// failed hands out a closed receiver.
    fn subscribe(&self) -> broadcast::Receiver<InputEvent>;
}

type SharedSender = Arc<Mutex<Option<broadcast::Sender<InputEvent>>>>;

fn lock(sender: &SharedSender) -> MutexGuard<'_, Option<broadcast::Sender<InputEvent>>> {
    sender.lock().unwrap_or_else(|e| e.into_inner())
}

fn subscribe_or_closed(sender: &SharedSender) -> broadcast::Receiver<InputEvent> {
    match lock(sender).as_ref() {
        Some(sender) => sender.subscribe(),
        None => broadcast::channel(1).1,
    }
}

/// Global hook backed by `rdev::listen`.
///
/// The listener thread is started on first subscription and lives for the
/// rest of the process; `rdev` offers no way to stop it. If `listen` returns
/// an error the channel is closed so subscribers can fall back.
pub struct RdevHook {
    sender: SharedSender,
    started: Once,
    failed: Arc<AtomicBool>,
}

impl Default for RdevHook {
    fn default() -> Self {
        Self::new()
    }
}

impl RdevHook {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
            started: Once::new(),
            failed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn ensure_listening(&self) {
        self.started.call_once(|| {
            let Some(sender) = lock(&self.sender).clone() else {
                return;
            };
            let shared = self.sender.clone();
            let failed = self.failed.clone();
            let spawned = std::thread::Builder::new()
                .name("input-hook".to_string())
                .spawn(move || {
                    info!("[Input] Global input listener started");
                    let result = rdev::listen(move |event| {
                        let kind = match event.event_type {
                            rdev::EventType::ButtonPress(_) => InputKind::PointerDown,
                            rdev::EventType::Wheel { .. } => InputKind::Scroll,
                            _ => return,
                        };
                        // No receivers is fine: nobody is listening right now
                        let _ = sender.send(InputEvent { kind });
                    });
                    if let Err(e) = result {
                        warn!("[Input] Global input listener stopped: {:?}", e);
                        failed.store(true, Ordering::SeqCst);
                        // The listener's clone is gone; dropping this one closes the channel
                        lock(&shared).take();
                    }
                });
            if let Err(e) = spawned {
                warn!("[Input] Failed to spawn input listener thread: {}", e);
                self.failed.store(true, Ordering::SeqCst);
                lock(&self.sender).take();
            }
        });
    }
}

impl GlobalInputHook for RdevHook {
    fn name(&self) -> &'static str {
        "rdev"
    }

    fn is_supported(&self) -> bool {
        if self.failed.load(Ordering::SeqCst) {
            return false;
        }

        #[cfg(target_os = "linux")]
        {
            // rdev listens through XRecord, which Wayland does not expose
            if crate::platform::is_wayland_session() {
                tracing::debug!("[Input] Wayland session, global hook unavailable");
                return false;
            }
            if std::env::var_os("DISPLAY").is_none() {
                tracing::debug!("[Input] No X display, global hook unavailable");
                return false;
            }
        }

        true
    }

    fn subscribe(&self) -> broadcast::Receiver<InputEvent> {
        self.ensure_listening();
        subscribe_or_closed(&self.sender)
    }
}

/// Hook driven by hand: for tests and for hosts that forward input themselves
pub struct ManualHook {
    sender: SharedSender,
    supported: AtomicBool,
}

impl Default for ManualHook {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualHook {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
            supported: AtomicBool::new(true),
        }
    }

    /// A hook that reports itself unsupported, forcing timeout fallback
    pub fn unsupported() -> Self {
        let hook = Self::new();
        hook.supported.store(false, Ordering::SeqCst);
        hook
    }

    /// Stop working the way a platform hook does when it loses permission:
    /// close every subscriber's channel and report unsupported from now on.
    pub fn fail(&self) {
        self.supported.store(false, Ordering::SeqCst);
        lock(&self.sender).take();
    }

    /// Deliver an event to every subscriber. Returns how many received it.
    pub fn fire(&self, event: InputEvent) -> usize {
        lock(&self.sender)
            .as_ref()
            .map_or(0, |sender| sender.send(event).unwrap_or(0))
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.sender).as_ref().map_or(0, broadcast::Sender::receiver_count)
    }
}

impl GlobalInputHook for ManualHook {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn is_supported(&self) -> bool {
        self.supported.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<InputEvent> {
        subscribe_or_closed(&self.sender)
    }
}
