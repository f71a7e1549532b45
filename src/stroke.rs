use crate::{math::Vec2f, style::StrokeStyle};

/// Identifies a stroke within the [`Drawing`][crate::drawing::Drawing] that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrokeId(pub u64);

/// One continuous pointer drag.
#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    id: StrokeId,
    points: Vec<Vec2f>,
    pub style: StrokeStyle,
}

impl Stroke {
    pub fn new(id: StrokeId, style: StrokeStyle) -> Self {
        Self {
            id,
            points: Vec::new(),
            style,
        }
    }

    pub fn id(&self) -> StrokeId {
        self.id
    }

    /// Points in the order they were drawn.
    pub fn points(&self) -> &[Vec2f] {
        &self.points
    }

    pub fn push(&mut self, point: Vec2f) {
        self.points.push(point);
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
