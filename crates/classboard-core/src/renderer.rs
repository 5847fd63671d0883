//! Canvas renderer: turns pointer/touch input into local raster strokes and
//! finished stroke drafts.
//!
//! Only what the local user draws in the current session is rasterized;
//! strokes received from other clients are not re-rendered here.

use crate::drawing::{DrawingTool, StrokeDraft, parse_hex_color};
use crate::input::{PointerEvent, TouchEvent, Viewport};
use crate::raster::Raster;
use crate::tools::ToolState;
use kurbo::Point;

/// Opacity of highlighter strokes.
const HIGHLIGHTER_ALPHA: f32 = 0.5;

/// Cursor shown over the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStyle {
    Crosshair,
    Grab,
    Default,
}

/// Stroke state machine: `Idle -> Drawing -> Idle`.
#[derive(Debug, Clone, Default)]
pub enum StrokeState {
    #[default]
    Idle,
    Drawing {
        /// Tool settings captured when the stroke began.
        tools: ToolState,
        /// Canvas-space points accumulated for pen/highlighter strokes.
        points: Vec<Point>,
        last: Point,
    },
}

/// Local renderer for one canvas element.
#[derive(Debug, Clone)]
pub struct CanvasRenderer {
    viewport: Viewport,
    raster: Raster,
    state: StrokeState,
}

impl CanvasRenderer {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            raster: Raster::new(viewport.backing_width, viewport.backing_height),
            viewport,
            state: StrokeState::Idle,
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn state(&self) -> &StrokeState {
        &self.state
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.state, StrokeState::Drawing { .. })
    }

    /// Resize the canvas element. The backing raster is recreated empty.
    pub fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.raster = Raster::new(viewport.backing_width, viewport.backing_height);
    }

    pub fn cursor(&self, tools: &ToolState) -> CursorStyle {
        cursor_for(tools.tool)
    }

    /// Wipe the local raster.
    pub fn clear(&mut self) {
        self.raster.clear();
    }

    /// Feed a pointer event. Returns the finished stroke when one completes.
    pub fn handle_pointer(&mut self, event: PointerEvent, tools: &ToolState) -> Option<StrokeDraft> {
        match event {
            PointerEvent::Down { position } => {
                if !self.is_drawing() {
                    self.begin(self.viewport.to_canvas(position), tools);
                }
                None
            }
            PointerEvent::Move { position } => {
                self.extend(self.viewport.to_canvas(position));
                None
            }
            PointerEvent::Up { .. } | PointerEvent::Leave { .. } => self.finish(),
        }
    }

    /// Feed a touch event, translated to the pointer equivalent.
    pub fn handle_touch(&mut self, event: &TouchEvent, tools: &ToolState) -> Option<StrokeDraft> {
        let pointer = event.to_pointer()?;
        self.handle_pointer(pointer, tools)
    }

    fn begin(&mut self, point: Point, tools: &ToolState) {
        let points = if tools.tool.records_points() {
            vec![point]
        } else {
            Vec::new()
        };
        self.state = StrokeState::Drawing {
            tools: tools.clone(),
            points,
            last: point,
        };
    }

    fn extend(&mut self, point: Point) {
        let StrokeState::Drawing { tools, points, last } = &mut self.state else {
            return;
        };
        let dpr = self.viewport.device_pixel_ratio;
        let width = tools.size as f64 * dpr;
        match tools.tool {
            DrawingTool::Pen | DrawingTool::Highlighter => {
                let rgb = parse_hex_color(&tools.color).unwrap_or([0, 0, 0]);
                let alpha = if tools.tool == DrawingTool::Highlighter {
                    HIGHLIGHTER_ALPHA
                } else {
                    1.0
                };
                let from = self.viewport.to_backing(*last);
                let to = self.viewport.to_backing(point);
                self.raster.stroke_segment(from, to, rgb, width, alpha);
                points.push(point);
            }
            DrawingTool::Eraser => {
                // Radius equals the brush size.
                self.raster.erase_circle(self.viewport.to_backing(point), width);
            }
            DrawingTool::Shapes => {}
        }
        *last = point;
    }

    fn finish(&mut self) -> Option<StrokeDraft> {
        let StrokeState::Drawing { tools, points, .. } = std::mem::take(&mut self.state) else {
            return None;
        };
        log::debug!("Stroke finished: {:?} with {} points", tools.tool, points.len());
        Some(StrokeDraft {
            tool: tools.tool,
            color: tools.color,
            size: tools.size,
            points,
        })
    }
}

/// Cursor for the given tool.
pub fn cursor_for(tool: DrawingTool) -> CursorStyle {
    match tool {
        DrawingTool::Pen | DrawingTool::Highlighter => CursorStyle::Crosshair,
        DrawingTool::Eraser => CursorStyle::Grab,
        DrawingTool::Shapes => CursorStyle::Default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Rect;

    fn renderer() -> CanvasRenderer {
        CanvasRenderer::new(Viewport::new(Rect::new(0.0, 0.0, 100.0, 100.0), 1.0))
    }

    fn down(x: f64, y: f64) -> PointerEvent {
        PointerEvent::Down { position: Point::new(x, y) }
    }

    fn mv(x: f64, y: f64) -> PointerEvent {
        PointerEvent::Move { position: Point::new(x, y) }
    }

    fn up(x: f64, y: f64) -> PointerEvent {
        PointerEvent::Up { position: Point::new(x, y) }
    }

    #[test]
    fn test_pen_stroke_lifecycle() {
        let mut r = renderer();
        let mut tools = ToolState::new();
        tools.set_color("#FF0000").unwrap();

        assert!(r.handle_pointer(down(10.0, 10.0), &tools).is_none());
        assert!(r.is_drawing());
        for i in 1..=4 {
            r.handle_pointer(mv(10.0 + i as f64 * 5.0, 10.0), &tools);
        }
        let draft = r.handle_pointer(up(30.0, 10.0), &tools).unwrap();

        assert!(!r.is_drawing());
        assert_eq!(draft.points.len(), 5);
        assert_eq!(draft.color, "#FF0000");
        assert_eq!(draft.size, 3);
        assert_eq!(r.raster().pixel(20, 10), Some([255, 0, 0, 255]));
    }

    #[test]
    fn test_eraser_emits_empty_points_and_erases() {
        let mut r = renderer();
        let pen = ToolState::new();
        r.handle_pointer(down(0.0, 50.0), &pen);
        r.handle_pointer(mv(100.0, 50.0), &pen);
        r.handle_pointer(up(100.0, 50.0), &pen);
        assert_eq!(r.raster().pixel(50, 50).unwrap()[3], 255);

        let mut eraser = ToolState::new();
        eraser.set_tool(DrawingTool::Eraser);
        eraser.set_size(5).unwrap();
        r.handle_pointer(down(50.0, 50.0), &eraser);
        r.handle_pointer(mv(50.0, 50.0), &eraser);
        let draft = r
            .handle_pointer(PointerEvent::Leave { position: Point::new(50.0, 50.0) }, &eraser)
            .unwrap();

        assert_eq!(draft.tool, DrawingTool::Eraser);
        assert!(draft.points.is_empty());
        assert_eq!(r.raster().pixel(50, 50), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_release_while_idle_emits_nothing() {
        let mut r = renderer();
        let tools = ToolState::new();
        assert!(r.handle_pointer(up(1.0, 1.0), &tools).is_none());
        assert!(r.handle_pointer(mv(1.0, 1.0), &tools).is_none());
    }

    #[test]
    fn test_tool_captured_at_stroke_start() {
        let mut r = renderer();
        let mut tools = ToolState::new();
        r.handle_pointer(down(1.0, 1.0), &tools);
        tools.set_tool(DrawingTool::Highlighter);
        r.handle_pointer(mv(2.0, 2.0), &tools);
        let draft = r.handle_pointer(up(2.0, 2.0), &tools).unwrap();
        assert_eq!(draft.tool, DrawingTool::Pen);
    }

    #[test]
    fn test_touch_drives_same_machine() {
        let mut r = renderer();
        let tools = ToolState::new();
        r.handle_touch(&TouchEvent::Start { touches: vec![Point::new(5.0, 5.0)] }, &tools);
        r.handle_touch(&TouchEvent::Move { touches: vec![Point::new(9.0, 5.0)] }, &tools);
        let draft = r.handle_touch(&TouchEvent::End { last: None }, &tools).unwrap();
        assert_eq!(draft.points, vec![Point::new(5.0, 5.0), Point::new(9.0, 5.0)]);
    }

    #[test]
    fn test_cursor_styles() {
        assert_eq!(cursor_for(DrawingTool::Pen), CursorStyle::Crosshair);
        assert_eq!(cursor_for(DrawingTool::Eraser), CursorStyle::Grab);
        assert_eq!(cursor_for(DrawingTool::Shapes), CursorStyle::Default);
    }
}
