//! Display Resolver
//!
//! Maps a global point to the physical display that owns it. Always answers:
//! points outside every display resolve to the nearest one, and a machine that
//! reports no displays at all gets a single default 1920x1080 display.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::geometry::{DisplayBounds, PixelPoint};
use crate::platform;

/// Fallback when the platform reports no displays
pub const DEFAULT_DISPLAY: DisplayBounds = DisplayBounds {
    x: 0,
    y: 0,
    width: 1920,
    height: 1080,
};

/// Source of display layout and cursor position
pub trait DisplayProvider: Send + Sync {
    /// Connected displays, primary first
    fn displays(&self) -> Vec<DisplayBounds>;

    /// Current global cursor position, if the platform exposes one
    fn cursor_position(&self) -> Option<PixelPoint>;
}

/// Live displays from the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDisplays;

impl DisplayProvider for SystemDisplays {
    fn displays(&self) -> Vec<DisplayBounds> {
        platform::enumerate_displays()
    }

    fn cursor_position(&self) -> Option<PixelPoint> {
        platform::cursor_position()
    }
}

/// Fixed layout, for headless sessions and tests
#[derive(Debug, Clone)]
pub struct StaticDisplays {
    pub displays: Vec<DisplayBounds>,
    pub cursor: Option<PixelPoint>,
}

impl StaticDisplays {
    pub fn new(displays: Vec<DisplayBounds>) -> Self {
        Self {
            displays,
            cursor: None,
        }
    }

    pub fn with_cursor(mut self, cursor: PixelPoint) -> Self {
        self.cursor = Some(cursor);
        self
    }
}

impl DisplayProvider for StaticDisplays {
    fn displays(&self) -> Vec<DisplayBounds> {
        self.displays.clone()
    }

    fn cursor_position(&self) -> Option<PixelPoint> {
        self.cursor
    }
}

/// Pick the display containing `point`, else the nearest one.
///
/// Ties on distance go to the earlier (primary-first) display.
pub fn select_display_for_point(displays: &[DisplayBounds], point: PixelPoint) -> Option<DisplayBounds> {
    displays
        .iter()
        .copied()
        .find(|d| d.contains(point))
        .or_else(|| displays.iter().copied().min_by_key(|d| d.distance_sq(point)))
}

/// Resolves points to displays using a [`DisplayProvider`]
#[derive(Clone)]
pub struct DisplayResolver {
    provider: Arc<dyn DisplayProvider>,
}

impl DisplayResolver {
    pub fn new(provider: Arc<dyn DisplayProvider>) -> Self {
        Self { provider }
    }

    /// Owning (or nearest) display for a global point. Never fails.
    pub fn resolve(&self, point: PixelPoint) -> DisplayBounds {
        let displays = self.provider.displays();
        match select_display_for_point(&displays, point) {
            Some(display) => {
                // Alias: tracing's macros import `field::display`, which shadows a local named `display`.
                let shown_display = &display;
                debug!("[Display] ({}, {}) -> {}", point.x, point.y, shown_display);
                display
            }
            None => {
                warn!("[Display] No displays reported, assuming {}", DEFAULT_DISPLAY);
                DEFAULT_DISPLAY
            }
        }
    }

    /// Rectangle covering every display; what a whole-desktop screenshot shows
    pub fn desktop(&self) -> DisplayBounds {
        DisplayBounds::union(&self.provider.displays()).unwrap_or(DEFAULT_DISPLAY)
    }

    /// Display under the cursor, or the primary display when the cursor is unknown
    pub fn resolve_at_cursor(&self) -> DisplayBounds {
        match self.provider.cursor_position() {
            Some(cursor) => self.resolve(cursor),
            None => {
                debug!("[Display] Cursor position unavailable, using primary display");
                self.provider
                    .displays()
                    .first()
                    .copied()
                    .unwrap_or(DEFAULT_DISPLAY)
            }
        }
    }
}

impl std::fmt::Debug for DisplayResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dual() -> Vec<DisplayBounds> {
        vec![
            DisplayBounds::new(0, 0, 2560, 1440),
            DisplayBounds::new(-1920, 0, 1920, 1080),
        ]
    }

    #[test]
    fn points_map_to_owning_display() {
        let displays = dual();
        assert_eq!(select_display_for_point(&displays, PixelPoint::new(-10, 100)), Some(displays[1]));
        assert_eq!(select_display_for_point(&displays, PixelPoint::new(200, 100)), Some(displays[0]));
    }

    #[test]
    fn off_screen_points_fall_back_to_nearest() {
        let displays = dual();
        // Below the shorter left monitor, closer to it than to the primary
        assert_eq!(select_display_for_point(&displays, PixelPoint::new(-1500, 1300)), Some(displays[1]));
        // Far right of everything
        assert_eq!(select_display_for_point(&displays, PixelPoint::new(9000, 10)), Some(displays[0]));
    }

    #[test]
    fn extreme_points_pick_nearest_without_overflow() {
        let far = PixelPoint::new(i32::MIN, i32::MIN);
        let primary = DisplayBounds::new(0, 0, 1920, 1080);
        let right = DisplayBounds::new(1920, 0, 1280, 1024);

        assert_eq!(select_display_for_point(&[primary, right], far), Some(primary));
        assert_eq!(select_display_for_point(&[right, primary], far), Some(primary));
        assert_eq!(select_display_for_point(&[right], far), Some(right));
        assert_eq!(
            select_display_for_point(&[primary, right], PixelPoint::new(i32::MAX, i32::MAX)),
            Some(right)
        );
    }

    #[test]
    fn desktop_spans_every_display() {
        let resolver = DisplayResolver::new(Arc::new(StaticDisplays::new(dual())));
        assert_eq!(resolver.desktop(), DisplayBounds::new(-1920, 0, 4480, 1440));

        let empty = DisplayResolver::new(Arc::new(StaticDisplays::new(Vec::new())));
        assert_eq!(empty.desktop(), DEFAULT_DISPLAY);
    }

    #[test]
    fn resolver_never_fails() {
        let empty = DisplayResolver::new(Arc::new(StaticDisplays::new(Vec::new())));
        assert_eq!(empty.resolve(PixelPoint::new(5, 5)), DEFAULT_DISPLAY);
        assert_eq!(empty.resolve_at_cursor(), DEFAULT_DISPLAY);
    }

    #[test]
    fn cursor_selects_display() {
        let provider = StaticDisplays::new(dual()).with_cursor(PixelPoint::new(-300, 300));
        let resolver = DisplayResolver::new(Arc::new(provider));
        assert_eq!(resolver.resolve_at_cursor(), DisplayBounds::new(-1920, 0, 1920, 1080));

        let no_cursor = DisplayResolver::new(Arc::new(StaticDisplays::new(dual())));
        assert_eq!(no_cursor.resolve_at_cursor(), DisplayBounds::new(0, 0, 2560, 1440));
    }
}
