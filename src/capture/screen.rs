//! Native capture through the `screenshots` crate.
//!
//! Works on X11, macOS and Windows without external tools. Returns a raw RGBA
//! buffer of the display that owns the given bounds.

use screenshots::Screen;
use tracing::debug;

use super::{CapturePrimitive, RawCapture};
use crate::capture::frame::{PixelFormat, RawFrame};
use crate::error::{GuidanceError, Result};
use crate::geometry::DisplayBounds;

#[derive(Debug, Default)]
pub struct ScreenCapturer;

impl ScreenCapturer {
    pub fn new() -> Self {
        Self
    }
}

impl CapturePrimitive for ScreenCapturer {
    fn name(&self) -> &'static str {
        "screenshots"
    }

    fn is_available(&self) -> bool {
        if crate::platform::is_wayland_session() {
            // X11 grabs come back black under most Wayland compositors
            return false;
        }
        Screen::all().map(|s| !s.is_empty()).unwrap_or(false)
    }

    fn grab(&self, display: &DisplayBounds) -> Result<RawCapture> {
        let screen = Screen::from_point(display.x, display.y).map_err(|e| {
            GuidanceError::CaptureUnavailable(format!("no screen at ({}, {}): {}", display.x, display.y, e))
        })?;

        let image = screen
            .capture()
            .map_err(|e| GuidanceError::CaptureUnavailable(format!("screen capture failed: {}", e)))?;

        let (width, height) = (image.width(), image.height());
        debug!(
            "[Capture] screenshots grabbed display {} at {}x{}",
            screen.display_info.id, width, height
        );

        Ok(RawCapture::Raw(RawFrame::new(
            image.into_raw(),
            width,
            height,
            PixelFormat::RGBA,
        )))
    }
}
