//! Tool state for the whiteboard: current tool, color and brush size.

use crate::drawing::{DrawingTool, is_hex_color};
use crate::error::{ClassroomError, ClassroomResult};
use serde::{Deserialize, Serialize};

/// Preset colors offered by the color picker.
pub const PRESET_COLORS: &[&str] = &[
    "#000000", "#FFFFFF", "#FF0000", "#00FF00", "#0000FF", "#FFFF00", "#FF00FF", "#00FFFF",
    "#FFA500", "#800080", "#008000", "#808080",
];

/// Preset brush sizes.
pub const BRUSH_SIZES: &[u32] = &[1, 3, 5, 8, 12, 16, 24];

/// Largest accepted brush size.
pub const MAX_BRUSH_SIZE: u32 = 64;

/// Transient drawing preferences. Not persisted, not shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolState {
    pub tool: DrawingTool,
    pub color: String,
    pub size: u32,
}

impl Default for ToolState {
    fn default() -> Self {
        Self {
            tool: DrawingTool::Pen,
            color: "#000000".to_string(),
            size: 3,
        }
    }
}

impl ToolState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a tool. Returns whether the tool actually changed.
    pub fn set_tool(&mut self, tool: DrawingTool) -> bool {
        let changed = self.tool != tool;
        self.tool = tool;
        changed
    }

    pub fn set_color(&mut self, color: &str) -> ClassroomResult<()> {
        if !is_hex_color(color) {
            return Err(ClassroomError::Validation(format!("invalid color {:?}", color)));
        }
        self.color = color.to_string();
        Ok(())
    }

    pub fn set_size(&mut self, size: u32) -> ClassroomResult<()> {
        if size == 0 || size > MAX_BRUSH_SIZE {
            return Err(ClassroomError::Validation(format!(
                "brush size must be between 1 and {}",
                MAX_BRUSH_SIZE
            )));
        }
        self.size = size;
        Ok(())
    }
}
