//! Capture & normalize pipeline.
//!
//! grab (blocking pool) -> normalize (blocking pool) -> persist -> publish.
//! The store is only written after every step succeeded, so a failed capture
//! leaves the previous frame in place.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::encode::{self, NormalizeSettings};
use super::storage::StoragePathProvider;
use super::{CapturePrimitive, RawCapture};
use crate::context::{ScreenContextStore, ScreenFrame};
use crate::display::DisplayResolver;
use crate::error::{GuidanceError, Result};
use crate::geometry::FrameDimensions;
use crate::metrics::{EngineMetrics, OperationTimer};

pub struct CapturePipeline {
    primitive: Arc<dyn CapturePrimitive>,
    storage: Arc<dyn StoragePathProvider>,
    resolver: DisplayResolver,
    store: Arc<ScreenContextStore>,
    settings: NormalizeSettings,
    metrics: EngineMetrics,
}

impl CapturePipeline {
    pub fn new(
        primitive: Arc<dyn CapturePrimitive>,
        storage: Arc<dyn StoragePathProvider>,
        resolver: DisplayResolver,
        store: Arc<ScreenContextStore>,
        settings: NormalizeSettings,
        metrics: EngineMetrics,
    ) -> Self {
        Self {
            primitive,
            storage,
            resolver,
            store,
            settings,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<ScreenContextStore> {
        &self.store
    }

    pub fn settings(&self) -> NormalizeSettings {
        self.settings
    }

    /// Capture the screen under the cursor and make it the current frame
    pub async fn capture(&self) -> Result<Arc<ScreenFrame>> {
        let timer = OperationTimer::start();
        match self.run().await {
            Ok(frame) => {
                self.metrics.record_capture_success(timer.elapsed_ms());
                info!(
                    "[Capture] Frame {} ({}x{}, {} colors, {} bytes) saved to {} in {}ms",
                    frame.id,
                    frame.width,
                    frame.height,
                    frame.colors,
                    frame.data.len(),
                    frame.path.display(),
                    timer.elapsed_ms()
                );
                Ok(frame)
            }
            Err(e) => {
                self.metrics.record_capture_failure(timer.elapsed_ms());
                error!("[Capture] Capture failed after {}ms: {}", timer.elapsed_ms(), e);
                Err(e)
            }
        }
    }

    async fn run(&self) -> Result<Arc<ScreenFrame>> {
        let captured_at = Utc::now();
        let primitive = self.primitive.clone();
        let resolver = self.resolver.clone();
        let settings = self.settings;

        let (display, encoded) = tokio::task::spawn_blocking(move || {
            let display = resolver.resolve_at_cursor();
            let raw = match primitive.grab(&display)? {
                RawCapture::Desktop(bytes) => encode::crop_desktop(&bytes, &resolver.desktop(), &display)?,
                other => other,
            };
            let encoded = encode::normalize(raw, &settings)?;
            Ok::<_, GuidanceError>((display, encoded))
        })
        .await
        .map_err(|e| GuidanceError::CaptureUnavailable(format!("capture task failed: {}", e)))??;

        let dims = FrameDimensions::new(encoded.width, encoded.height);
        let path = self
            .storage
            .next_path(captured_at, dims, encoded.colors)
            .map_err(|source| GuidanceError::Storage {
                path: self.storage.root().to_path_buf(),
                source,
            })?;

        tokio::fs::write(&path, &encoded.data)
            .await
            .map_err(|source| GuidanceError::Storage {
                path: path.clone(),
                source,
            })?;

        let frame = ScreenFrame {
            id: Uuid::new_v4(),
            width: encoded.width,
            height: encoded.height,
            colors: encoded.colors,
            digest: encode::digest(&encoded.data),
            data: encoded.data,
            path,
            captured_at,
            display_bounds: display,
        };

        Ok(self.store.set(frame))
    }
}

impl std::fmt::Debug for CapturePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturePipeline")
            .field("primitive", &self.primitive.name())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
