//! The shared canvas document: one per classroom.

use crate::drawing::DrawingEntry;
use serde::{Deserialize, Serialize};

/// The last kind of change applied to a canvas document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanvasAction {
    Draw,
    Clear,
    Undo,
    Snapshot,
}

/// A rendered raster stored next to the vector drawing list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RasterSnapshot {
    pub width: u32,
    pub height: u32,
    /// PNG bytes, base64 encoded.
    pub png_base64: String,
}

/// The remote record holding all drawing entries and whiteboard metadata
/// for one classroom.
///
/// `drawings` only grows, except on an explicit [`CanvasDocument::clear`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasDocument {
    pub drawings: Vec<DrawingEntry>,
    pub last_modified_at_millis: i64,
    pub last_modified_by: String,
    pub cleared: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleared_at_millis: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas_snapshot: Option<RasterSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_at_millis: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action: Option<CanvasAction>,
    /// Bumped on every change.
    pub version: u64,
}

impl CanvasDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry with array-union semantics: an entry whose id is
    /// already present is not added twice. Returns whether it was added.
    pub fn append(&mut self, entry: DrawingEntry, by: &str, at: i64) -> bool {
        let added = !self.contains(&entry.id);
        if added {
            self.drawings.push(entry);
            self.cleared = false;
        }
        self.touch(by, at, CanvasAction::Draw);
        added
    }

    /// Reset the drawing list to empty.
    pub fn clear(&mut self, by: &str, at: i64) {
        self.drawings.clear();
        self.cleared = true;
        self.cleared_at_millis = Some(at);
        self.touch(by, at, CanvasAction::Clear);
    }

    /// Record that a client undid a local action. Drawings are untouched.
    pub fn mark_undo(&mut self, by: &str, at: i64) {
        self.touch(by, at, CanvasAction::Undo);
    }

    /// Store a rendered raster. Does not affect `drawings`.
    pub fn set_snapshot(&mut self, snapshot: RasterSnapshot, by: &str, at: i64) {
        self.canvas_snapshot = Some(snapshot);
        self.saved_at_millis = Some(at);
        self.saved_by = Some(by.to_string());
        self.last_action = Some(CanvasAction::Snapshot);
        self.version += 1;
    }

    pub fn contains(&self, id: &str) -> bool {
        self.drawings.iter().any(|d| d.id == id)
    }

    pub fn len(&self) -> usize {
        self.drawings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drawings.is_empty()
    }

    fn touch(&mut self, by: &str, at: i64, action: CanvasAction) {
        self.last_modified_by = by.to_string();
        self.last_modified_at_millis = at;
        self.last_action = Some(action);
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawing::test_entry;

    #[test]
    fn test_append_is_union() {
        let mut doc = CanvasDocument::new();
        assert!(doc.append(test_entry("a", "u1"), "u1", 10));
        assert!(!doc.append(test_entry("a", "u1"), "u1", 11));
        assert!(doc.append(test_entry("b", "u2"), "u2", 12));

        assert_eq!(doc.len(), 2);
        assert_eq!(doc.last_modified_by, "u2");
        assert_eq!(doc.last_modified_at_millis, 12);
        assert_eq!(doc.version, 3);
    }

    #[test]
    fn test_clear_then_append() {
        let mut doc = CanvasDocument::new();
        doc.append(test_entry("a", "u1"), "u1", 1);
        doc.clear("t1", 2);

        assert!(doc.is_empty());
        assert!(doc.cleared);
        assert_eq!(doc.cleared_at_millis, Some(2));
        assert_eq!(doc.last_action, Some(CanvasAction::Clear));

        doc.append(test_entry("b", "u1"), "u1", 3);
        assert!(!doc.cleared);
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn test_snapshot_leaves_drawings_alone() {
        let mut doc = CanvasDocument::new();
        doc.append(test_entry("a", "u1"), "u1", 1);
        let snapshot = RasterSnapshot {
            width: 2,
            height: 2,
            png_base64: "AAAA".to_string(),
        };
        doc.set_snapshot(snapshot.clone(), "u1", 5);

        assert_eq!(doc.len(), 1);
        assert_eq!(doc.canvas_snapshot, Some(snapshot));
        assert_eq!(doc.saved_by.as_deref(), Some("u1"));
    }

    #[test]
    fn test_undo_marker_touches_metadata_only() {
        let mut doc = CanvasDocument::new();
        doc.append(test_entry("a", "u1"), "u1", 1);
        doc.mark_undo("u2", 9);

        assert_eq!(doc.len(), 1);
        assert_eq!(doc.last_modified_by, "u2");
        assert_eq!(doc.last_action, Some(CanvasAction::Undo));
    }
}
