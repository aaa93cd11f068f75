/*!
 * Coordinate Transform
 *
 * Pure conversions between the three coordinate bases used by the engine and
 * the 3x3 zone rule that picks which way an indicator should point.
 *
 * - `percent`: 0-100 on each axis, origin top-left of a display
 * - `model`:   0-1000 on each axis, origin top-left of the captured image
 * - `pixel`:   absolute desktop coordinates (may be negative on multi-monitor setups)
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GuidanceError;

/// Upper bound of the percent basis
pub const PERCENT_SCALE: f64 = 100.0;

/// Upper bound of the model-normalized basis
pub const MODEL_SCALE: f64 = 1000.0;

/// Pixel-basis input is clamped to this many pixels either side of the origin
pub const PIXEL_LIMIT: i32 = 1 << 24;

const LOWER_THIRD: f64 = 33.33;
const UPPER_THIRD: f64 = 66.67;

/// Coordinate basis a point is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Basis {
    Percent,
    #[serde(alias = "image_norm", alias = "normalized")]
    Model,
    Pixel,
}

impl Basis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Basis::Percent => "percent",
            Basis::Model => "model",
            Basis::Pixel => "pixel",
        }
    }
}

impl FromStr for Basis {
    type Err = GuidanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "percent" | "pct" => Ok(Basis::Percent),
            "model" | "image_norm" | "normalized" => Ok(Basis::Model),
            "pixel" | "px" => Ok(Basis::Pixel),
            _ => Err(GuidanceError::InvalidBasis(s.to_string())),
        }
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which way an indicator points, toward its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
        Direction::UpLeft,
        Direction::UpRight,
        Direction::DownLeft,
        Direction::DownRight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::UpLeft => "up-left",
            Direction::UpRight => "up-right",
            Direction::DownLeft => "down-left",
            Direction::DownRight => "down-right",
        }
    }

    /// True for the four corner (diagonal) values
    pub fn is_diagonal(&self) -> bool {
        matches!(
            self,
            Direction::UpLeft | Direction::UpRight | Direction::DownLeft | Direction::DownRight
        )
    }
}

impl FromStr for Direction {
    type Err = GuidanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            "up-left" => Ok(Direction::UpLeft),
            "up-right" => Ok(Direction::UpRight),
            "down-left" => Ok(Direction::DownLeft),
            "down-right" => Ok(Direction::DownRight),
            _ => Err(GuidanceError::InvalidDirection(s.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Absolute desktop position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Round caller-supplied coordinates, clamping them into `±PIXEL_LIMIT`.
    /// NaN maps to 0.
    pub fn from_f64(x: f64, y: f64) -> Self {
        let limit = PIXEL_LIMIT as f64;
        let axis = |v: f64| if v.is_nan() { 0 } else { v.round().clamp(-limit, limit) as i32 };
        Self::new(axis(x), axis(y))
    }
}

/// Physical display rectangle in global desktop coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl DisplayBounds {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Right edge (exclusive)
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    /// Bottom edge (exclusive)
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    pub fn contains(&self, point: PixelPoint) -> bool {
        let (px, py) = (point.x as i64, point.y as i64);
        px >= self.x as i64 && px < self.right() && py >= self.y as i64 && py < self.bottom()
    }

    /// Squared distance from `point` to the closest pixel of this display.
    /// Zero when the point is inside.
    pub fn distance_sq(&self, point: PixelPoint) -> i128 {
        let (px, py) = (point.x as i64, point.y as i64);
        let max_x = (self.right() - 1).max(self.x as i64);
        let max_y = (self.bottom() - 1).max(self.y as i64);
        let dx = (px - px.clamp(self.x as i64, max_x)) as i128;
        let dy = (py - py.clamp(self.y as i64, max_y)) as i128;
        dx * dx + dy * dy
    }

    /// Convert a global point to display-local coordinates
    pub fn to_local(&self, point: PixelPoint) -> (i32, i32) {
        (point.x.saturating_sub(self.x), point.y.saturating_sub(self.y))
    }

    /// Smallest rectangle covering every display, or `None` for an empty list
    pub fn union(displays: &[DisplayBounds]) -> Option<DisplayBounds> {
        let first = displays.first()?;
        let (mut left, mut top) = (first.x as i64, first.y as i64);
        let (mut right, mut bottom) = (first.right(), first.bottom());
        for d in &displays[1..] {
            left = left.min(d.x as i64);
            top = top.min(d.y as i64);
            right = right.max(d.right());
            bottom = bottom.max(d.bottom());
        }
        Some(DisplayBounds::new(
            left as i32,
            top as i32,
            (right - left).clamp(0, u32::MAX as i64) as u32,
            (bottom - top).clamp(0, u32::MAX as i64) as u32,
        ))
    }
}

impl fmt::Display for DisplayBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@({},{})", self.width, self.height, self.x, self.y)
    }
}

/// Size of a captured (normalized) image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDimensions {
    pub width: u32,
    pub height: u32,
}

impl FrameDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A location tagged with the basis it is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub basis: Basis,
    pub x: f64,
    pub y: f64,
}

impl NormalizedPoint {
    pub fn new(basis: Basis, x: f64, y: f64) -> Self {
        Self { basis, x, y }
    }

    pub fn percent(x: f64, y: f64) -> Self {
        Self::new(Basis::Percent, x, y)
    }

    pub fn model(x: f64, y: f64) -> Self {
        Self::new(Basis::Model, x, y)
    }

    pub fn pixel(x: f64, y: f64) -> Self {
        Self::new(Basis::Pixel, x, y)
    }

    /// Fraction (0.0-1.0) along each axis for the scaled bases
    fn fractions(&self) -> (f64, f64) {
        let scale = match self.basis {
            Basis::Percent => PERCENT_SCALE,
            Basis::Model => MODEL_SCALE,
            Basis::Pixel => 1.0,
        };
        (
            (self.x / scale).clamp(0.0, 1.0),
            (self.y / scale).clamp(0.0, 1.0),
        )
    }

    /// Express this point in the percent basis of `display`.
    ///
    /// Model points map 1:1 onto the display the frame was captured from.
    pub fn to_percent(&self, display: &DisplayBounds) -> NormalizedPoint {
        match self.basis {
            Basis::Percent => *self,
            Basis::Model => NormalizedPoint::percent(self.x / 10.0, self.y / 10.0),
            Basis::Pixel => {
                let p = from_pixel(PixelPoint::from_f64(self.x, self.y), display);
                NormalizedPoint::percent(p.x, p.y)
            }
        }
    }
}

/// What a scaled point is being mapped onto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapTarget {
    /// Position on the physical display (global coordinates)
    Display,
    /// Position within the captured image (image-local coordinates)
    Image,
}

fn clamp_axis(value: f64, origin: i64, size: u32) -> i32 {
    let max = origin + (size as i64 - 1).max(0);
    (value.round() as i64).clamp(origin, max) as i32
}

/// Map a point onto pixels of a display or of the captured image.
///
/// The result is always clamped into the target rectangle.
pub fn to_pixel(
    point: &NormalizedPoint,
    display: &DisplayBounds,
    frame: &FrameDimensions,
    target: MapTarget,
) -> PixelPoint {
    let (origin_x, origin_y, width, height) = match target {
        MapTarget::Display => (display.x as i64, display.y as i64, display.width, display.height),
        MapTarget::Image => (0, 0, frame.width, frame.height),
    };

    if point.basis == Basis::Pixel {
        return PixelPoint::new(
            clamp_axis(point.x, origin_x, width),
            clamp_axis(point.y, origin_y, height),
        );
    }

    let (fx, fy) = point.fractions();
    PixelPoint::new(
        clamp_axis(origin_x as f64 + fx * width as f64, origin_x, width),
        clamp_axis(origin_y as f64 + fy * height as f64, origin_y, height),
    )
}

/// Inverse of the percent -> display mapping
pub fn from_pixel(pixel: PixelPoint, display: &DisplayBounds) -> NormalizedPoint {
    let w = display.width.max(1) as f64;
    let h = display.height.max(1) as f64;
    NormalizedPoint::percent(
        (pixel.x as i64 - display.x as i64) as f64 / w * PERCENT_SCALE,
        (pixel.y as i64 - display.y as i64) as f64 / h * PERCENT_SCALE,
    )
}

/// Normalize an image-pixel detection onto the model basis
pub fn image_pixel_to_model(x: f64, y: f64, frame: &FrameDimensions) -> NormalizedPoint {
    let w = frame.width.max(1) as f64;
    let h = frame.height.max(1) as f64;
    NormalizedPoint::model(
        (x / w * MODEL_SCALE).round().clamp(0.0, MODEL_SCALE),
        (y / h * MODEL_SCALE).round().clamp(0.0, MODEL_SCALE),
    )
}

/// Pick the indicator direction for a target location.
///
/// The square is cut into thirds on both axes. Corner zones get a diagonal,
/// edge zones a cardinal direction. The centre zone resolves to `up` when the
/// model-scale coordinates sum to an even number and `down` otherwise, so the
/// same input always yields the same answer.
///
/// Pixel points carry no scale; convert them with [`NormalizedPoint::to_percent`] first.
/// If one is passed anyway it is read as model scale.
pub fn direction(point: &NormalizedPoint) -> Direction {
    let (xp, yp) = match point.basis {
        Basis::Percent => (point.x, point.y),
        Basis::Model | Basis::Pixel => (point.x / 10.0, point.y / 10.0),
    };
    let xp = xp.clamp(0.0, PERCENT_SCALE);
    let yp = yp.clamp(0.0, PERCENT_SCALE);

    let left = xp <= LOWER_THIRD;
    let right = xp >= UPPER_THIRD;
    let top = yp <= LOWER_THIRD;
    let bottom = yp >= UPPER_THIRD;
    let middle_x = !left && !right;
    let middle_y = !top && !bottom;

    match (top, bottom, left, right) {
        (true, _, true, _) => Direction::UpLeft,
        (true, _, _, true) => Direction::UpRight,
        (_, true, true, _) => Direction::DownLeft,
        (_, true, _, true) => Direction::DownRight,
        (true, _, _, _) => Direction::Up,
        (_, true, _, _) => Direction::Down,
        (_, _, true, _) => Direction::Left,
        (_, _, _, true) => Direction::Right,
        _ => {
            debug_assert!(middle_x && middle_y);
            let (mx, my) = match point.basis {
                Basis::Percent => (point.x * 10.0, point.y * 10.0),
                Basis::Model | Basis::Pixel => (point.x, point.y),
            };
            let sum = mx.round() as i64 + my.round() as i64;
            if sum.rem_euclid(2) == 0 {
                Direction::Up
            } else {
                Direction::Down
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HD: DisplayBounds = DisplayBounds { x: 0, y: 0, width: 1920, height: 1080 };
    const FRAME: FrameDimensions = FrameDimensions { width: 1366, height: 768 };

    #[test]
    fn percent_maps_onto_display() {
        let p = to_pixel(&NormalizedPoint::percent(50.0, 90.0), &HD, &FRAME, MapTarget::Display);
        assert_eq!(p, PixelPoint::new(960, 972));
    }

    #[test]
    fn percent_respects_display_origin() {
        let left_monitor = DisplayBounds::new(-2560, -200, 2560, 1440);
        let p = to_pixel(&NormalizedPoint::percent(25.0, 50.0), &left_monitor, &FRAME, MapTarget::Display);
        assert_eq!(p, PixelPoint::new(-1920, 520));
    }

    #[test]
    fn model_maps_onto_image_or_display() {
        let point = NormalizedPoint::model(500.0, 250.0);
        assert_eq!(
            to_pixel(&point, &HD, &FRAME, MapTarget::Image),
            PixelPoint::new(683, 192)
        );
        assert_eq!(
            to_pixel(&point, &HD, &FRAME, MapTarget::Display),
            PixelPoint::new(960, 270)
        );
    }

    #[test]
    fn output_is_clamped_to_last_pixel() {
        let p = to_pixel(&NormalizedPoint::model(1000.0, 1000.0), &HD, &FRAME, MapTarget::Image);
        assert_eq!(p, PixelPoint::new(1365, 767));

        let p = to_pixel(&NormalizedPoint::percent(140.0, -20.0), &HD, &FRAME, MapTarget::Display);
        assert_eq!(p, PixelPoint::new(1919, 0));

        let second = DisplayBounds::new(1920, 0, 1280, 1024);
        let p = to_pixel(&NormalizedPoint::pixel(9000.0, 10.0), &second, &FRAME, MapTarget::Display);
        assert_eq!(p, PixelPoint::new(3199, 10));
    }

    #[test]
    fn percent_round_trip_within_half_pixel() {
        let displays = [HD, DisplayBounds::new(-1920, 0, 1920, 1080), DisplayBounds::new(1920, -300, 1280, 1024)];
        for display in displays {
            // 100% itself is clamped onto the last pixel, so the sweep stops just short of it.
            for xi in 0..1000 {
                for yi in (0..1000).step_by(37) {
                    let original = NormalizedPoint::percent(xi as f64 / 10.0, yi as f64 / 10.0);
                    let pixel = to_pixel(&original, &display, &FRAME, MapTarget::Display);
                    let back = from_pixel(pixel, &display);
                    let dx = (back.x - original.x) / 100.0 * display.width as f64;
                    let dy = (back.y - original.y) / 100.0 * display.height as f64;
                    assert!(dx.abs() <= 0.5 + 1e-9, "x drift {} at {:?}", dx, original);
                    assert!(dy.abs() <= 0.5 + 1e-9, "y drift {} at {:?}", dy, original);
                }
            }
        }
    }

    #[test]
    fn edge_zones_point_cardinal() {
        assert_eq!(direction(&NormalizedPoint::model(500.0, 100.0)), Direction::Up);
        assert_eq!(direction(&NormalizedPoint::model(500.0, 1000.0)), Direction::Down);
        assert_eq!(direction(&NormalizedPoint::model(0.0, 500.0)), Direction::Left);
        assert_eq!(direction(&NormalizedPoint::model(1000.0, 500.0)), Direction::Right);
        assert_eq!(direction(&NormalizedPoint::percent(50.0, 90.0)), Direction::Down);
    }

    #[test]
    fn corner_zones_point_diagonal() {
        assert_eq!(direction(&NormalizedPoint::model(50.0, 50.0)), Direction::UpLeft);
        assert_eq!(direction(&NormalizedPoint::model(0.0, 0.0)), Direction::UpLeft);
        assert_eq!(direction(&NormalizedPoint::model(1000.0, 0.0)), Direction::UpRight);
        assert_eq!(direction(&NormalizedPoint::model(0.0, 1000.0)), Direction::DownLeft);
        assert_eq!(direction(&NormalizedPoint::model(1000.0, 1000.0)), Direction::DownRight);
        assert!(direction(&NormalizedPoint::model(50.0, 50.0)).is_diagonal());
    }

    #[test]
    fn third_boundaries_are_inclusive() {
        assert_eq!(direction(&NormalizedPoint::percent(50.0, 33.33)), Direction::Up);
        assert_eq!(direction(&NormalizedPoint::percent(66.67, 50.0)), Direction::Right);
    }

    #[test]
    fn centre_tie_break_is_deterministic() {
        let even = NormalizedPoint::model(500.0, 500.0);
        let odd = NormalizedPoint::model(501.0, 500.0);
        assert_eq!(direction(&even), Direction::Up);
        assert_eq!(direction(&odd), Direction::Down);
        for _ in 0..10 {
            assert_eq!(direction(&even), Direction::Up);
            assert_eq!(direction(&odd), Direction::Down);
        }
    }

    #[test]
    fn parses_names_and_rejects_unknown() {
        assert_eq!("percent".parse::<Basis>().unwrap(), Basis::Percent);
        assert_eq!("image_norm".parse::<Basis>().unwrap(), Basis::Model);
        assert!(matches!("inches".parse::<Basis>(), Err(GuidanceError::InvalidBasis(_))));

        assert_eq!("up_left".parse::<Direction>().unwrap(), Direction::UpLeft);
        assert_eq!("Down-Right".parse::<Direction>().unwrap(), Direction::DownRight);
        assert!(matches!("north".parse::<Direction>(), Err(GuidanceError::InvalidDirection(_))));

        for d in Direction::ALL {
            assert_eq!(d.as_str().parse::<Direction>().unwrap(), d);
        }
    }

    #[test]
    fn image_detection_normalizes_to_model() {
        let p = image_pixel_to_model(683.0, 384.0, &FRAME);
        assert_eq!((p.x, p.y), (500.0, 500.0));
        assert_eq!(p.basis, Basis::Model);
    }

    #[test]
    fn nearest_distance_is_zero_inside() {
        assert_eq!(HD.distance_sq(PixelPoint::new(10, 10)), 0);
        assert_eq!(HD.distance_sq(PixelPoint::new(1925, 1079)), 36);
        assert!(HD.contains(PixelPoint::new(1919, 1079)));
        assert!(!HD.contains(PixelPoint::new(1920, 0)));
    }

    #[test]
    fn huge_pixel_input_is_bounded() {
        let far = PixelPoint::from_f64(-1e12, -1e12);
        assert_eq!(far, PixelPoint::new(-PIXEL_LIMIT, -PIXEL_LIMIT));
        assert_eq!(PixelPoint::from_f64(f64::NAN, 1e300), PixelPoint::new(0, PIXEL_LIMIT));

        let extreme = PixelPoint::new(i32::MIN, i32::MIN);
        let second = DisplayBounds::new(1920, 0, 1280, 1024);
        assert!(second.distance_sq(extreme) > HD.distance_sq(extreme));
        assert_eq!(second.to_local(extreme), (i32::MIN, i32::MIN));

        let p = NormalizedPoint::pixel(-1e12, 10.0).to_percent(&second);
        assert!(p.x < 0.0);
        assert_eq!(direction(&p), Direction::UpLeft);
    }

    #[test]
    fn union_covers_all_displays() {
        let displays = [HD, DisplayBounds::new(-1280, -200, 1280, 1024), DisplayBounds::new(1920, 0, 2560, 1440)];
        assert_eq!(DisplayBounds::union(&displays), Some(DisplayBounds::new(-1280, -200, 5760, 1640)));
        assert_eq!(DisplayBounds::union(&[]), None);
    }
}
