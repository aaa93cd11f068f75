//! Platform queries: cursor position, session type, display enumeration.
//!
//! Everything here is best-effort. Callers get `None`/empty results instead of
//! errors and pick a fallback themselves.

use tracing::warn;

use crate::geometry::{DisplayBounds, PixelPoint};

/// True when running inside a Wayland session, where global pointer hooks
/// are not available to ordinary clients.
pub fn is_wayland_session() -> bool {
    std::env::var("XDG_SESSION_TYPE")
        .map(|v| v.eq_ignore_ascii_case("wayland"))
        .unwrap_or(false)
}

/// Current global cursor position
pub fn cursor_position() -> Option<PixelPoint> {
    #[cfg(target_os = "windows")]
    {
        windows_cursor_position()
    }

    #[cfg(target_os = "macos")]
    {
        macos_cursor_position()
    }

    #[cfg(target_os = "linux")]
    {
        linux_cursor_position()
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

#[cfg(target_os = "windows")]
fn windows_cursor_position() -> Option<PixelPoint> {
    use windows::Win32::Foundation::POINT;
    use windows::Win32::UI::WindowsAndMessaging::GetCursorPos;

    let mut point = POINT::default();
    if unsafe { GetCursorPos(&mut point) }.is_ok() {
        Some(PixelPoint::new(point.x, point.y))
    } else {
        None
    }
}

#[cfg(target_os = "macos")]
fn macos_cursor_position() -> Option<PixelPoint> {
    use core_graphics::event::CGEvent;
    use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};

    let source = CGEventSource::new(CGEventSourceStateID::CombinedSessionState).ok()?;
    let event = CGEvent::new(source).ok()?;
    let location = event.location();
    Some(PixelPoint::new(location.x.round() as i32, location.y.round() as i32))
}

#[cfg(target_os = "linux")]
fn linux_cursor_position() -> Option<PixelPoint> {
    let output = std::process::Command::new("xdotool")
        .args(["getmouselocation", "--shell"])
        .output();

    match output {
        Ok(output) if output.status.success() => {
            parse_xdotool_location(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(output) => {
            tracing::debug!(
                "xdotool getmouselocation failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
            None
        }
        Err(e) => {
            tracing::debug!("xdotool not available: {}", e);
            None
        }
    }
}

/// Parse `xdotool getmouselocation --shell` output (`X=..`, `Y=..` lines)
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_xdotool_location(stdout: &str) -> Option<PixelPoint> {
    let mut x = None;
    let mut y = None;
    for line in stdout.lines() {
        if let Some(v) = line.strip_prefix("X=") {
            x = v.trim().parse().ok();
        } else if let Some(v) = line.strip_prefix("Y=") {
            y = v.trim().parse().ok();
        }
    }
    Some(PixelPoint::new(x?, y?))
}

/// Enumerate connected displays, primary first
pub fn enumerate_displays() -> Vec<DisplayBounds> {
    match screenshots::Screen::all() {
        Ok(screens) => {
            let mut screens: Vec<_> = screens.into_iter().map(|s| s.display_info).collect();
            screens.sort_by_key(|info| !info.is_primary);
            screens
                .into_iter()
                .map(|info| DisplayBounds::new(info.x, info.y, info.width, info.height))
                .collect()
        }
        Err(e) => {
            warn!("Display enumeration failed: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_xdotool_shell_output() {
        let out = "X=1234\nY=-56\nSCREEN=0\nWINDOW=8388621\n";
        assert_eq!(parse_xdotool_location(out), Some(PixelPoint::new(1234, -56)));
        assert_eq!(parse_xdotool_location("SCREEN=0\n"), None);
    }

    #[test]
    #[ignore] // Needs a real display server
    fn test_enumerate_displays() {
        let displays = enumerate_displays();
        assert!(!displays.is_empty());
        assert!(displays.iter().all(|d| d.width > 0 && d.height > 0));
    }
}
