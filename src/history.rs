//! Undo/redo of whole arrangement runs.
//!
//! Every run records the moves it made as one [`RunRecord`]. Undoing a run puts
//! its items back where they were before the run, in reverse move order. Group
//! membership is not rolled back; a later run will not regroup the items.

use crate::constants::MAX_UNDO_HISTORY;
use crate::types::{ItemId, Point, Scene};
use serde::{Deserialize, Serialize};

/// One item moved from `from` to `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMove {
    pub id: ItemId,
    pub from: Point,
    pub to: Point,
}

impl ItemMove {
    fn inverted(&self) -> Self {
        Self {
            id: self.id.clone(),
            from: self.to,
            to: self.from,
        }
    }
}

/// All moves of one arrangement run, in the order they happened.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunRecord {
    pub run: u32,
    pub moves: Vec<ItemMove>,
}

impl RunRecord {
    /// The same run played backwards.
    pub fn inverted(&self) -> Self {
        Self {
            run: self.run,
            moves: self.moves.iter().rev().map(ItemMove::inverted).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

/// Bounded undo/redo stacks of run records.
#[derive(Debug, Clone, Default)]
pub struct ArrangementHistory {
    /// Runs that can be undone
    undo_stack: Vec<RunRecord>,
    /// Runs that can be redone
    redo_stack: Vec<RunRecord>,
}

impl ArrangementHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a finished run.
    ///
    /// This clears the redo stack since a new run invalidates any undone runs.
    /// Runs without moves are not recorded.
    ///
    /// # Arguments
    ///
    /// * `record` - The run to record
    pub fn push(&mut self, record: RunRecord) {
        if record.is_empty() {
            return;
        }
        self.undo_stack.push(record);
        self.redo_stack.clear();

        if self.undo_stack.len() > MAX_UNDO_HISTORY {
            self.undo_stack.remove(0);
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo_stack.is_empty()
    }

    /// Reverts the most recent run on `scene`.
    ///
    /// # Returns
    ///
    /// The run number that was undone, or None if there was nothing to undo
    pub fn undo(&mut self, scene: &mut Scene) -> Option<u32> {
        let record = self.undo_stack.pop()?;
        scene.apply_record(&record.inverted());
        let run = record.run;
        self.redo_stack.push(record);
        Some(run)
    }

    /// Re-applies the most recently undone run on `scene`.
    pub fn redo(&mut self, scene: &mut Scene) -> Option<u32> {
        let record = self.redo_stack.pop()?;
        scene.apply_record(&record);
        let run = record.run;
        self.undo_stack.push(record);
        Some(run)
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

/// Applying recorded moves to a scene.
pub trait ReplayableScene {
    /// Sets every moved item to its recorded destination. Unknown ids are skipped.
    ///
    /// # Returns
    ///
    /// How many moves were applied.
    fn apply_record(&mut self, record: &RunRecord) -> usize;
}

impl ReplayableScene for Scene {
    fn apply_record(&mut self, record: &RunRecord) -> usize {
        record
            .moves
            .iter()
            .filter(|m| self.set_position(&m.id, m.to))
            .count()
    }
}
