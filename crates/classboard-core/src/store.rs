//! Local drawing store with linear undo/redo history.

use crate::drawing::DrawingEntry;
use crate::error::{ClassroomError, ClassroomResult};

/// Who last modified the remote canvas, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastModified {
    pub by: String,
    pub at_millis: i64,
}

/// What a remote replace did to locally pending entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceOutcome {
    /// Local entries that the remote list now contains.
    pub confirmed: Vec<String>,
    /// Local entries the remote list does not contain yet.
    pub still_pending: Vec<String>,
}

impl ReplaceOutcome {
    pub fn diverged(&self) -> bool {
        !self.still_pending.is_empty()
    }
}

/// Authoritative local view of a canvas' drawing list.
///
/// `history` is a list of snapshots of `drawings` and `drawings` always
/// equals `history[history_index]`, except after [`DrawingStore::replace_all`],
/// which overwrites `drawings` without touching the history.
#[derive(Debug, Clone)]
pub struct DrawingStore {
    drawings: Vec<DrawingEntry>,
    history: Vec<Vec<DrawingEntry>>,
    history_index: usize,
    /// Maximum number of snapshots kept (`None` = unbounded).
    history_limit: Option<usize>,
    /// Ids appended locally and not yet seen in a remote list.
    pending: Vec<String>,
    last_modified: Option<LastModified>,
}

impl Default for DrawingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawingStore {
    /// Create an empty store whose history holds the empty canvas.
    pub fn new() -> Self {
        Self {
            drawings: Vec::new(),
            history: vec![Vec::new()],
            history_index: 0,
            history_limit: None,
            pending: Vec::new(),
            last_modified: None,
        }
    }

    /// Create a store that keeps at most `limit` snapshots (minimum 2).
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            history_limit: Some(limit.max(2)),
            ..Self::new()
        }
    }

    pub fn drawings(&self) -> &[DrawingEntry] {
        &self.drawings
    }

    pub fn history_index(&self) -> usize {
        self.history_index
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn can_undo(&self) -> bool {
        self.history_index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.history_index + 1 < self.history.len()
    }

    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    pub fn last_modified(&self) -> Option<&LastModified> {
        self.last_modified.as_ref()
    }

    /// Append a locally drawn entry and record a history snapshot.
    ///
    /// Redo branches after the cursor are discarded.
    pub fn append(&mut self, entry: DrawingEntry) -> ClassroomResult<()> {
        if entry.points.is_empty() {
            return Err(ClassroomError::InvalidEntry(format!(
                "entry {} has no points",
                entry.id
            )));
        }
        log::debug!("Appending drawing {} by {}", entry.id, entry.author_id);
        self.pending.push(entry.id.clone());
        self.drawings.push(entry);
        self.record_snapshot();
        Ok(())
    }

    /// Empty the canvas and record a history snapshot.
    pub fn clear(&mut self) {
        self.drawings.clear();
        self.pending.clear();
        self.record_snapshot();
    }

    /// Step back one snapshot. Returns false when already at the start.
    pub fn undo(&mut self) -> bool {
        if self.history_index == 0 {
            return false;
        }
        self.history_index -= 1;
        self.drawings = self.history[self.history_index].clone();
        true
    }

    /// Step forward one snapshot. Returns false when already at the end.
    pub fn redo(&mut self) -> bool {
        if !self.can_redo() {
            return false;
        }
        self.history_index += 1;
        self.drawings = self.history[self.history_index].clone();
        true
    }

    /// Overwrite the drawing list with a remote one.
    ///
    /// Local pending strokes are not merged and the history is not rebased,
    /// so a later undo may restore a pre-update snapshot.
    pub fn replace_all(&mut self, remote: Vec<DrawingEntry>) -> ReplaceOutcome {
        let mut outcome = ReplaceOutcome::default();
        for id in std::mem::take(&mut self.pending) {
            if remote.iter().any(|d| d.id == id) {
                outcome.confirmed.push(id);
            } else {
                outcome.still_pending.push(id);
            }
        }
        self.pending = outcome.still_pending.clone();
        if outcome.diverged() {
            log::debug!(
                "Remote canvas is missing {} local entries",
                outcome.still_pending.len()
            );
        }
        self.drawings = remote;
        outcome
    }

    /// Record remote modification metadata.
    pub fn set_last_modified(&mut self, by: &str, at_millis: i64) {
        self.last_modified = Some(LastModified {
            by: by.to_string(),
            at_millis,
        });
    }

    fn record_snapshot(&mut self) {
        self.history.truncate(self.history_index + 1);
        self.history.push(self.drawings.clone());
        self.history_index = self.history.len() - 1;

        if let Some(limit) = self.history_limit {
            let excess = self.history.len().saturating_sub(limit);
            if excess > 0 {
                self.history.drain(..excess);
                self.history_index -= excess;
            }
        }
    }
}
