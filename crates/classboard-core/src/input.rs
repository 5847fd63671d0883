//! Pointer and touch input in client coordinates, and the viewport that maps
//! them into canvas space.

use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Pointer event in client (page) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PointerEvent {
    Down { position: Point },
    Move { position: Point },
    Up { position: Point },
    /// Pointer left the canvas element.
    Leave { position: Point },
}

impl PointerEvent {
    pub fn position(&self) -> Point {
        match *self {
            PointerEvent::Down { position }
            | PointerEvent::Move { position }
            | PointerEvent::Up { position }
            | PointerEvent::Leave { position } => position,
        }
    }
}

/// Touch event carrying the active touches in client coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TouchEvent {
    Start { touches: Vec<Point> },
    Move { touches: Vec<Point> },
    /// Touch ended. `last` is the final position if the platform reports one.
    End { last: Option<Point> },
}

impl TouchEvent {
    /// Translate to the equivalent pointer event using the first touch.
    ///
    /// Start/Move events without touches produce nothing. An End without a
    /// position maps to `Up` at the origin; the renderer ignores the
    /// position on release.
    pub fn to_pointer(&self) -> Option<PointerEvent> {
        match self {
            TouchEvent::Start { touches } => touches
                .first()
                .map(|&position| PointerEvent::Down { position }),
            TouchEvent::Move { touches } => touches
                .first()
                .map(|&position| PointerEvent::Move { position }),
            TouchEvent::End { last } => Some(PointerEvent::Up {
                position: last.unwrap_or(Point::ZERO),
            }),
        }
    }
}

/// Placement of the canvas element on the page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Element bounding box in client coordinates (CSS pixels).
    pub bounds: Rect,
    pub device_pixel_ratio: f64,
    /// Backing store size in device pixels.
    pub backing_width: u32,
    pub backing_height: u32,
}

impl Viewport {
    /// Create a viewport for an element at `bounds` on a display with the
    /// given device pixel ratio.
    pub fn new(bounds: Rect, device_pixel_ratio: f64) -> Self {
        let dpr = if device_pixel_ratio > 0.0 {
            device_pixel_ratio
        } else {
            1.0
        };
        Self {
            bounds,
            device_pixel_ratio: dpr,
            backing_width: (bounds.width() * dpr).max(0.0) as u32,
            backing_height: (bounds.height() * dpr).max(0.0) as u32,
        }
    }

    /// Convert a client coordinate into canvas space (CSS pixels, corrected
    /// for device pixel ratio).
    pub fn to_canvas(&self, client: Point) -> Point {
        let css_w = self.bounds.width();
        let css_h = self.bounds.height();
        if css_w <= 0.0 || css_h <= 0.0 {
            return Point::ZERO;
        }
        let scale_x = self.backing_width as f64 / css_w;
        let scale_y = self.backing_height as f64 / css_h;
        Point::new(
            (client.x - self.bounds.x0) * scale_x / self.device_pixel_ratio,
            (client.y - self.bounds.y0) * scale_y / self.device_pixel_ratio,
        )
    }

    /// Convert a canvas-space point into backing (device pixel) coordinates.
    pub fn to_backing(&self, canvas: Point) -> Point {
        Point::new(
            canvas.x * self.device_pixel_ratio,
            canvas.y * self.device_pixel_ratio,
        )
    }
}
