//! Screen Context Store
//!
//! Holds the most recent [`ScreenFrame`]. One slot, last write wins, readers
//! get a cheap `Arc` clone. The capture pipeline is the only writer and its
//! writes are already sequenced by the auto-capture debounce and the analysis
//! single-flight guard, so the lock here only protects memory, not ordering.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use uuid::Uuid;

use crate::geometry::{DisplayBounds, FrameDimensions};

/// A captured, normalized screen image. Immutable once built.
#[derive(Debug, Clone)]
pub struct ScreenFrame {
    pub id: Uuid,
    /// Normalized width in pixels
    pub width: u32,
    /// Normalized height in pixels
    pub height: u32,
    /// Palette size of the encoded image
    pub colors: u16,
    /// Encoded PNG payload
    pub data: Vec<u8>,
    /// Where the payload was persisted
    pub path: PathBuf,
    pub captured_at: DateTime<Utc>,
    /// Physical display the frame was taken from
    pub display_bounds: DisplayBounds,
    /// blake3 digest of `data`, hex encoded
    pub digest: String,
}

impl ScreenFrame {
    pub fn dimensions(&self) -> FrameDimensions {
        FrameDimensions::new(self.width, self.height)
    }

    /// Time since capture; zero if the clock went backwards
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.captured_at).to_std().unwrap_or_default()
    }
}

/// Summary of the current screen for the conversation layer
#[derive(Debug, Clone, Serialize)]
pub struct ScreenContext {
    pub has_current_screen: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_ago: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<FrameDimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_bounds: Option<DisplayBounds>,
    /// False when the latest capture is pixel-identical to the one before it
    pub changed_since_previous: bool,
    pub message: String,
}

struct Slot {
    frame: Arc<ScreenFrame>,
    changed: bool,
}

/// Single-slot holder for the current frame
#[derive(Default)]
pub struct ScreenContextStore {
    slot: RwLock<Option<Slot>>,
}

impl ScreenContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame
    pub fn set(&self, frame: ScreenFrame) -> Arc<ScreenFrame> {
        let frame = Arc::new(frame);
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        let changed = slot
            .as_ref()
            .map_or(true, |prev| prev.frame.digest != frame.digest);
        *slot = Some(Slot {
            frame: frame.clone(),
            changed,
        });
        frame
    }

    /// Current frame, if any capture completed yet
    pub fn get(&self) -> Option<Arc<ScreenFrame>> {
        self.slot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| s.frame.clone())
    }

    /// Current frame or [`GuidanceError::NoCurrentFrame`](crate::GuidanceError::NoCurrentFrame)
    pub fn require(&self) -> crate::Result<Arc<ScreenFrame>> {
        self.get().ok_or(crate::GuidanceError::NoCurrentFrame)
    }

    pub fn clear(&self) {
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Whether the current frame is younger than `max_age`
    pub fn is_recent(&self, max_age: Duration) -> bool {
        self.get()
            .map(|f| f.age(Utc::now()) <= max_age)
            .unwrap_or(false)
    }

    /// Describe the current screen state as of `now`
    pub fn context(&self, now: DateTime<Utc>) -> ScreenContext {
        let guard = self.slot.read().unwrap_or_else(|e| e.into_inner());
        let Some(slot) = guard.as_ref() else {
            return ScreenContext {
                has_current_screen: false,
                screenshot_path: None,
                captured_at: None,
                seconds_ago: None,
                dimensions: None,
                display_bounds: None,
                changed_since_previous: false,
                message: "No current screen state available. The user hasn't interacted with their screen recently.".to_string(),
            };
        };

        let frame = &slot.frame;
        let seconds_ago = frame.age(now).as_secs_f64().round() as u64;
        ScreenContext {
            has_current_screen: true,
            screenshot_path: Some(frame.path.clone()),
            captured_at: Some(frame.captured_at),
            seconds_ago: Some(seconds_ago),
            dimensions: Some(frame.dimensions()),
            display_bounds: Some(frame.display_bounds),
            changed_since_previous: slot.changed,
            message: format!(
                "Current screen state available (captured {}s ago after user interaction).",
                seconds_ago
            ),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_frame(digest: &str) -> ScreenFrame {
    ScreenFrame {
        id: Uuid::new_v4(),
        width: 1366,
        height: 768,
        colors: 64,
        data: vec![1, 2, 3],
        path: PathBuf::from(format!("/tmp/{}.png", digest)),
        captured_at: Utc::now(),
        display_bounds: DisplayBounds::new(0, 0, 1920, 1080),
        digest: digest.to_string(),
    }
}
