//! Drawing entries: one completed stroke's tool, style and point path.

use crate::error::{ClassroomError, ClassroomResult};
use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Tools that can produce a drawing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DrawingTool {
    #[default]
    Pen,
    Highlighter,
    Eraser,
    Shapes,
}

impl DrawingTool {
    /// Whether strokes with this tool accumulate a vector path.
    pub fn records_points(self) -> bool {
        matches!(self, DrawingTool::Pen | DrawingTool::Highlighter)
    }
}

/// A finished stroke as emitted by the renderer, before it is stamped with
/// an id and an author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeDraft {
    pub tool: DrawingTool,
    pub color: String,
    pub size: u32,
    pub points: Vec<Point>,
}

/// An immutable record of one completed stroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawingEntry {
    pub id: String,
    pub tool: DrawingTool,
    /// Hex color, `#RRGGBB` or `#RGB`.
    pub color: String,
    pub size: u32,
    pub points: Vec<Point>,
    pub author_id: String,
    pub created_at_millis: i64,
}

impl DrawingEntry {
    /// Stamp a draft with a fresh id, its author and creation time.
    pub fn from_draft(draft: StrokeDraft, author_id: &str, now: i64) -> Self {
        Self {
            id: generate_drawing_id(now),
            tool: draft.tool,
            color: draft.color,
            size: draft.size,
            points: draft.points,
            author_id: author_id.to_string(),
            created_at_millis: now,
        }
    }

    /// Reject entries that must not be stored.
    pub fn validate(&self) -> ClassroomResult<()> {
        if self.points.is_empty() {
            return Err(ClassroomError::InvalidEntry(format!(
                "entry {} has no points",
                self.id
            )));
        }
        if self.size == 0 {
            return Err(ClassroomError::InvalidEntry(format!(
                "entry {} has zero brush size",
                self.id
            )));
        }
        if !is_hex_color(&self.color) {
            return Err(ClassroomError::InvalidEntry(format!(
                "entry {} has invalid color {:?}",
                self.id, self.color
            )));
        }
        Ok(())
    }
}

/// Generate an id of the form `draw_<millis>_<9 chars>`.
pub fn generate_drawing_id(now: i64) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("draw_{}_{}", now, &suffix[..9])
}

/// Check for `#RGB` or `#RRGGBB`.
pub fn is_hex_color(color: &str) -> bool {
    match color.strip_prefix('#') {
        Some(hex) => (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Parse a hex color into RGB components.
pub fn parse_hex_color(color: &str) -> Option<[u8; 3]> {
    if !is_hex_color(color) {
        return None;
    }
    let hex = &color[1..];
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    if hex.len() == 3 {
        let mut rgb = [0u8; 3];
        for (i, c) in hex.chars().enumerate() {
            let v = channel(&c.to_string())?;
            rgb[i] = v * 17;
        }
        Some(rgb)
    } else {
        Some([channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?])
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) fn test_entry(id: &str, author: &str) -> DrawingEntry {
    DrawingEntry {
        id: id.to_string(),
        tool: DrawingTool::Pen,
        color: "#FF0000".to_string(),
        size: 3,
        points: vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)],
        author_id: author.to_string(),
        created_at_millis: 0,
    }
}
