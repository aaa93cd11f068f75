// Screenshot capture through external tools
// Used where native capture is unavailable (Wayland, minimal X servers)

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

use super::{CapturePrimitive, RawCapture};
use crate::error::{GuidanceError, Result};
use crate::geometry::DisplayBounds;

/// One external screenshot tool and how to invoke it
#[derive(Debug, Clone, Copy)]
struct ScreenshotTool {
    program: &'static str,
    /// Arguments placed before the output path
    args: &'static [&'static str],
}

#[cfg(target_os = "linux")]
const TOOLS: &[ScreenshotTool] = &[
    // -o = overwrite without asking
    ScreenshotTool { program: "scrot", args: &["-o"] },
    // -window root = capture entire screen
    ScreenshotTool { program: "import", args: &["-window", "root"] },
    ScreenshotTool { program: "gnome-screenshot", args: &["-f"] },
];

#[cfg(target_os = "macos")]
const TOOLS: &[ScreenshotTool] = &[
    // -x = no shutter sound
    ScreenshotTool { program: "screencapture", args: &["-x"] },
];

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
const TOOLS: &[ScreenshotTool] = &[];

/// Captures the whole desktop by running the first working screenshot tool.
/// Produces pre-encoded PNG bytes.
#[derive(Debug)]
pub struct CommandCapturer {
    temp_dir: PathBuf,
}

impl Default for CommandCapturer {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandCapturer {
    pub fn new() -> Self {
        Self {
            temp_dir: std::env::temp_dir(),
        }
    }

    fn temp_path(&self) -> PathBuf {
        self.temp_dir
            .join(format!("guidance_capture_{}.png", uuid::Uuid::new_v4().simple()))
    }

    fn run(tool: &ScreenshotTool, output: &Path) -> Result<Vec<u8>> {
        debug!("[Capture] Capturing screenshot with {}", tool.program);

        let result = Command::new(tool.program)
            .args(tool.args)
            .arg(output)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| GuidanceError::CaptureUnavailable(format!("failed to execute {}: {}", tool.program, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(GuidanceError::CaptureUnavailable(format!(
                "{} failed: {}",
                tool.program,
                stderr.trim()
            )));
        }

        let data = fs::read(output).map_err(|e| {
            GuidanceError::CaptureUnavailable(format!("failed to read {} output: {}", tool.program, e))
        });
        let _ = fs::remove_file(output);
        data
    }
}

fn tool_installed(program: &str) -> bool {
    Command::new("which")
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

impl CapturePrimitive for CommandCapturer {
    fn name(&self) -> &'static str {
        "command"
    }

    fn is_available(&self) -> bool {
        TOOLS.iter().any(|t| tool_installed(t.program))
    }

    fn grab(&self, _display: &DisplayBounds) -> Result<RawCapture> {
        let mut last_error = None;

        for tool in TOOLS {
            let output = self.temp_path();
            match Self::run(tool, &output) {
                Ok(data) => {
                    debug!("[Capture] {} captured {} bytes", tool.program, data.len());
                    return Ok(RawCapture::Desktop(data));
                }
                Err(e) => {
                    warn!("[Capture] {}, trying fallback", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            GuidanceError::CaptureUnavailable("no screenshot tool for this platform".to_string())
        }))
    }
}
