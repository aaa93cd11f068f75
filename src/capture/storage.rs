//! Where normalized captures are written.
//!
//! Captures are grouped per session: one folder per engine run, named after
//! the time of the first capture.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

use crate::geometry::FrameDimensions;

/// Hands out destination paths for encoded captures
pub trait StoragePathProvider: Send + Sync {
    /// Directory everything is written under
    fn root(&self) -> &Path;

    /// Path for the next capture. Parent directories exist when this returns.
    fn next_path(&self, captured_at: DateTime<Utc>, dims: FrameDimensions, colors: u16) -> io::Result<PathBuf>;
}

/// Snapshot of the active session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: String,
    pub path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub screenshot_count: u64,
}

#[derive(Debug)]
struct Session {
    id: String,
    path: PathBuf,
    started_at: DateTime<Utc>,
    screenshot_count: u64,
}

/// `<base>/session_YYYY-MM-DD_HH-MM-SS/screen_<HH-MM-SS-mmm>_<W>x<H>_<N>colors.png`
#[derive(Debug)]
pub struct SessionStorage {
    base_dir: PathBuf,
    session: Mutex<Option<Session>>,
}

impl SessionStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            session: Mutex::new(None),
        }
    }

    /// Close the current session; the next capture opens a new folder
    pub fn start_new_session(&self) {
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn stats(&self) -> Option<SessionStats> {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| SessionStats {
                session_id: s.id.clone(),
                path: s.path.clone(),
                started_at: s.started_at,
                screenshot_count: s.screenshot_count,
            })
    }
}

impl StoragePathProvider for SessionStorage {
    fn root(&self) -> &Path {
        &self.base_dir
    }

    fn next_path(&self, captured_at: DateTime<Utc>, dims: FrameDimensions, colors: u16) -> io::Result<PathBuf> {
        let mut guard = self.session.lock().unwrap_or_else(|e| e.into_inner());

        if guard.is_none() {
            let id = format!("session_{}", captured_at.format("%Y-%m-%d_%H-%M-%S"));
            let path = self.base_dir.join(&id);
            std::fs::create_dir_all(&path)?;
            info!("[Capture] Started screenshot session {}", path.display());
            *guard = Some(Session {
                id,
                path,
                started_at: captured_at,
                screenshot_count: 0,
            });
        }

        let Some(session) = guard.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::Other, "session not initialized"));
        };
        // The folder may have been removed underneath us
        if !session.path.is_dir() {
            std::fs::create_dir_all(&session.path)?;
        }

        session.screenshot_count += 1;
        let file_name = format!(
            "screen_{}_{}x{}_{}colors_{:04}.png",
            captured_at.format("%H-%M-%S-%3f"),
            dims.width,
            dims.height,
            colors,
            session.screenshot_count
        );
        Ok(session.path.join(file_name))
    }
}
