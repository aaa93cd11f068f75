//! Screen capture primitives and the capture & normalize pipeline.
//!
//! A primitive hands back either a raw pixel buffer or an already encoded
//! image; the pipeline turns both into the same fixed-resolution, fixed-palette
//! PNG, persists it and publishes it to the screen context store.

use tracing::{debug, info, warn};

use crate::error::{GuidanceError, Result};
use crate::geometry::DisplayBounds;

pub mod command;
pub mod encode;
pub mod frame;
pub mod pipeline;
pub mod screen;
pub mod storage;

pub use encode::{EncodedImage, NormalizeSettings, UniformPalette};
pub use frame::{PixelFormat, RawFrame};
pub use pipeline::CapturePipeline;
pub use storage::{SessionStorage, StoragePathProvider};

/// What a capture primitive produced
#[derive(Debug, Clone)]
pub enum RawCapture {
    /// Uncompressed pixels with explicit layout
    Raw(RawFrame),
    /// Pre-encoded image bytes (PNG, JPEG) of the requested display
    Encoded(Vec<u8>),
    /// Pre-encoded image bytes of the whole desktop, all displays included
    Desktop(Vec<u8>),
}

impl RawCapture {
    pub fn len(&self) -> usize {
        match self {
            RawCapture::Raw(frame) => frame.data.len(),
            RawCapture::Encoded(bytes) | RawCapture::Desktop(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Platform capture primitive.
///
/// `grab` blocks; the pipeline runs it on the blocking pool.
pub trait CapturePrimitive: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap availability check, queried once when the capturer is selected
    fn is_available(&self) -> bool;

    /// Capture the screen. `display` is the display under the cursor; primitives
    /// that can only grab the whole desktop may ignore it.
    fn grab(&self, display: &DisplayBounds) -> Result<RawCapture>;
}

/// Tries each primitive in order until one succeeds
pub struct FallbackCapture {
    primitives: Vec<Box<dyn CapturePrimitive>>,
}

impl FallbackCapture {
    pub fn new(primitives: Vec<Box<dyn CapturePrimitive>>) -> Self {
        Self { primitives }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.primitives.iter().map(|p| p.name()).collect()
    }
}

impl CapturePrimitive for FallbackCapture {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn is_available(&self) -> bool {
        !self.primitives.is_empty()
    }

    fn grab(&self, display: &DisplayBounds) -> Result<RawCapture> {
        let mut last_error = None;
        for primitive in &self.primitives {
            match primitive.grab(display) {
                Ok(capture) if !capture.is_empty() => {
                    debug!("[Capture] {} produced {} bytes", primitive.name(), capture.len());
                    return Ok(capture);
                }
                Ok(_) => {
                    warn!("[Capture] {} returned an empty capture", primitive.name());
                    last_error = Some(format!("{} returned an empty capture", primitive.name()));
                }
                Err(e) => {
                    warn!("[Capture] {} failed: {}", primitive.name(), e);
                    last_error = Some(e.to_string());
                }
            }
        }
        Err(GuidanceError::CaptureUnavailable(
            last_error.unwrap_or_else(|| "no capture method available".to_string()),
        ))
    }
}

/// Build the platform capturer from whatever primitives are usable here
pub fn create_platform_capturer() -> FallbackCapture {
    let candidates: Vec<Box<dyn CapturePrimitive>> = vec![
        Box::new(screen::ScreenCapturer::new()),
        Box::new(command::CommandCapturer::new()),
    ];

    let available: Vec<_> = candidates
        .into_iter()
        .filter(|p| {
            let ok = p.is_available();
            if !ok {
                debug!("[Capture] {} not available", p.name());
            }
            ok
        })
        .collect();

    let capturer = FallbackCapture::new(available);
    if capturer.is_available() {
        info!("[Capture] Capture methods: {:?}", capturer.names());
    } else {
        warn!("[Capture] No capture method available; captures will fail");
    }
    capturer
}
