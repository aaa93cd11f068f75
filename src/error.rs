//! Error types for the guidance engine.
//!
//! Every failure an operation can detect is returned as a [`GuidanceError`];
//! nothing here is allowed to take the host process down.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced to callers of the engine.
#[derive(Debug, Error)]
pub enum GuidanceError {
    /// No capture primitive could produce a frame.
    #[error("screen capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// The captured frame could not be decoded, resized or encoded.
    #[error("failed to encode screen frame: {0}")]
    EncodeFailure(String),

    /// An operation needed the current screen frame but none was captured yet.
    #[error("no current screen frame; capture the screen first")]
    NoCurrentFrame,

    /// Coordinate basis outside the recognized set.
    #[error("invalid coordinate basis '{0}' (expected percent, model or pixel)")]
    InvalidBasis(String),

    /// Direction outside the recognized set.
    #[error("invalid direction '{0}'")]
    InvalidDirection(String),

    /// Persisting a frame failed.
    #[error("failed to store screen frame at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The overlay surface could not be created.
    #[error("failed to create overlay surface: {0}")]
    Surface(String),
}

pub type Result<T> = std::result::Result<T, GuidanceError>;
