//! Arrow geometry.
//!
//! The arrow is drawn in a square box centred on a point chosen so that its
//! tip, not its centre, lands on the target.

use serde::Serialize;

use crate::geometry::{Direction, DisplayBounds, PixelPoint};

/// Distance from the box centre to the arrow tip, as a fraction of the box size
pub const TIP_OFFSET_RATIO: f64 = 0.35;

/// Offset from the target to the box centre, in pixels
pub fn tip_offset(direction: Direction, size: f64) -> (f64, f64) {
    let o = size * TIP_OFFSET_RATIO;
    let d = o / std::f64::consts::SQRT_2;
    match direction {
        // Pointing up: the arrow sits below the target
        Direction::Up => (0.0, o),
        Direction::Down => (0.0, -o),
        Direction::Left => (o, 0.0),
        Direction::Right => (-o, 0.0),
        Direction::UpLeft => (d, d),
        Direction::UpRight => (-d, d),
        Direction::DownLeft => (d, -d),
        Direction::DownRight => (-d, -d),
    }
}

/// Clockwise rotation of an up-pointing arrow
pub fn rotation_degrees(direction: Direction) -> f64 {
    match direction {
        Direction::Up => 0.0,
        Direction::UpRight => 45.0,
        Direction::Right => 90.0,
        Direction::DownRight => 135.0,
        Direction::Down => 180.0,
        Direction::DownLeft => 225.0,
        Direction::Left => 270.0,
        Direction::UpLeft => 315.0,
    }
}

/// Where an arrow box goes on its display
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArrowPlacement {
    pub direction: Direction,
    /// Box centre relative to the display origin
    pub center_local: (f64, f64),
    /// Box top-left relative to the display origin
    pub top_left_local: (f64, f64),
    pub size: f64,
    pub rotation_deg: f64,
}

pub fn place_arrow(direction: Direction, target: PixelPoint, display: DisplayBounds, size: f64) -> ArrowPlacement {
    let (local_x, local_y) = display.to_local(target);
    let (dx, dy) = tip_offset(direction, size);
    let center = (local_x as f64 + dx, local_y as f64 + dy);

    ArrowPlacement {
        direction,
        center_local: center,
        top_left_local: (center.0 - size / 2.0, center.1 - size / 2.0),
        size,
        rotation_deg: rotation_degrees(direction),
    }
}
