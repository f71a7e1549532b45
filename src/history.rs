//! Undo and redo of committed strokes.
//!
//! Every [`Action`] produces its own inverse when applied. Undoing pops an action from the undo
//! stack, applies it, and pushes the inverse onto the redo stack; redoing does the same in the
//! other direction. There is no separate "currently undoing" state.
//!
//! Committing a new stroke leaves the redo stack alone, so strokes undone earlier can still be
//! redone on top of newer ones.

use crate::stroke::{Stroke, StrokeId};

#[derive(Debug)]
pub enum Action {
    /// Appends the stroke to the committed sequence.
    Commit(Stroke),
    /// Removes the last committed stroke, which must have this ID.
    Remove(StrokeId),
}

impl Action {
    /// Applies the action to `strokes` and returns the action that reverses it.
    ///
    /// Returns `None` if a `Remove` finds nothing to remove, which means the history no longer
    /// matches `strokes`.
    fn apply(self, strokes: &mut Vec<Stroke>) -> Option<Action> {
        match self {
            Action::Commit(stroke) => {
                let id = stroke.id();
                strokes.push(stroke);
                Some(Action::Remove(id))
            }
            Action::Remove(id) => {
                let stroke = strokes.pop();
                let found = stroke.as_ref().map(Stroke::id);
                debug_assert_eq!(
                    found,
                    Some(id),
                    "history is out of sync with the committed strokes"
                );
                if found != Some(id) {
                    log::error!("removed stroke {found:?}, but history expected {id:?}");
                }
                stroke.map(Action::Commit)
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct History {
    undo: Vec<Action>,
    redo: Vec<Action>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `stroke` to `strokes` and records the commit as undoable.
    pub fn commit(&mut self, strokes: &mut Vec<Stroke>, stroke: Stroke) {
        if let Some(inverse) = Action::Commit(stroke).apply(strokes) {
            self.undo.push(inverse);
        }
    }

    /// Reverses the most recent action. Returns `false` if there was nothing to undo.
    pub fn undo(&mut self, strokes: &mut Vec<Stroke>) -> bool {
        let Some(action) = self.undo.pop() else {
            return false;
        };
        if let Some(inverse) = action.apply(strokes) {
            self.redo.push(inverse);
        }
        true
    }

    /// Re-applies the most recently undone action. Returns `false` if there was nothing to redo.
    pub fn redo(&mut self, strokes: &mut Vec<Stroke>) -> bool {
        let Some(action) = self.redo.pop() else {
            return false;
        };
        if let Some(inverse) = action.apply(strokes) {
            self.undo.push(inverse);
        }
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }
}
