//! The drawing model: committed strokes, the stroke being drawn, and the style new strokes get.

use std::{iter, mem, ops::RangeInclusive};

use crate::{
    cmd::Cmd,
    history::History,
    math::Vec2f,
    observe::{Change, Observers, Subscription},
    style::{self, clamp_finite, Color, StrokeStyle},
    stroke::{Stroke, StrokeId},
};

pub struct Drawing {
    /// Finished strokes, oldest first.
    committed: Vec<Stroke>,
    /// The stroke receiving pointer input. Never part of `committed`.
    current: Stroke,
    /// Style given to the next stroke.
    style: StrokeStyle,
    history: History,
    observers: Observers,
    next_id: u64,
}

impl Drawing {
    pub fn new(style: StrokeStyle) -> Self {
        Self {
            committed: Vec::new(),
            current: Stroke::new(StrokeId(0), style),
            style,
            history: History::new(),
            observers: Observers::default(),
            next_id: 1,
        }
    }

    pub fn subscribe(&mut self, callback: impl FnMut(Change) + 'static) -> Subscription {
        self.observers.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, sub: Subscription) -> bool {
        self.observers.unsubscribe(sub)
    }

    /// All strokes in painting order: committed strokes, then the current one.
    pub fn visible_strokes(&self) -> impl Iterator<Item = &Stroke> + '_ {
        self.committed.iter().chain(iter::once(&self.current))
    }

    pub fn committed(&self) -> &[Stroke] {
        &self.committed
    }

    #[cfg(test)]
    pub fn current(&self) -> &Stroke {
        &self.current
    }

    pub fn style(&self) -> &StrokeStyle {
        &self.style
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn add_point(&mut self, point: Vec2f) {
        self.current.push(point);
        self.observers.notify(Change::PointAdded);
    }

    /// Commits the current stroke, even if it has no points, and starts a new one with the
    /// current style.
    pub fn finish_stroke(&mut self) {
        let fresh = Stroke::new(StrokeId(self.next_id), self.style);
        self.next_id += 1;
        let finished = mem::replace(&mut self.current, fresh);
        log::debug!(
            "committing stroke {:?} with {} points",
            finished.id(),
            finished.points().len()
        );
        self.history.commit(&mut self.committed, finished);
        self.observers.notify(Change::StrokeFinished);
    }

    /// Returns `false` if there was nothing to undo.
    pub fn undo(&mut self) -> bool {
        let undone = self.history.undo(&mut self.committed);
        if undone {
            log::debug!("undo; {} strokes left", self.committed.len());
            self.observers.notify(Change::Undone);
        }
        undone
    }

    /// Returns `false` if there was nothing to redo.
    pub fn redo(&mut self) -> bool {
        let redone = self.history.redo(&mut self.committed);
        if redone {
            log::debug!("redo; {} strokes", self.committed.len());
            self.observers.notify(Change::Redone);
        }
        redone
    }

    pub fn set_color(&mut self, color: Color) {
        self.style.color = color;
        self.current.style.color = color;
        self.observers.notify(Change::StyleChanged);
    }

    pub fn set_width(&mut self, width: f32) {
        if let Some(width) = checked("width", width, style::WIDTH_RANGE) {
            self.style.width = width;
            self.current.style.width = width;
            self.observers.notify(Change::StyleChanged);
        }
    }

    pub fn set_spacing(&mut self, spacing: f32) {
        if let Some(spacing) = checked("spacing", spacing, style::SPACING_RANGE) {
            self.style.spacing = spacing;
            self.current.style.spacing = spacing;
            self.observers.notify(Change::StyleChanged);
        }
    }

    pub fn set_blur(&mut self, blur: f32) {
        if let Some(blur) = checked("blur", blur, style::BLUR_RANGE) {
            self.style.blur = blur;
            self.current.style.blur = blur;
            self.observers.notify(Change::StyleChanged);
        }
    }

    pub fn handle(&mut self, cmd: Cmd) {
        match cmd {
            Cmd::PointerMoved { position } => self.add_point(position),
            Cmd::PointerReleased => self.finish_stroke(),
            Cmd::Undo => {
                if !self.undo() {
                    log::debug!("nothing to undo");
                }
            }
            Cmd::Redo => {
                if !self.redo() {
                    log::debug!("nothing to redo");
                }
            }
            Cmd::SetColor { color } => self.set_color(color),
            Cmd::SetWidth { width } => self.set_width(width),
            Cmd::SetSpacing { spacing } => self.set_spacing(spacing),
            Cmd::SetBlur { blur } => self.set_blur(blur),
        }
    }
}

fn checked(name: &str, value: f32, range: RangeInclusive<f32>) -> Option<f32> {
    let clamped = clamp_finite(value, range);
    if clamped.is_none() {
        log::warn!("ignoring non-finite stroke {name} {value}");
    }
    clamped
}

impl Default for Drawing {
    fn default() -> Self {
        Self::new(StrokeStyle::default())
    }
}
