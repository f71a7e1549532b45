use std::mem;

use winit::event::TouchPhase;

use crate::{
    config::{CommandVerb, Config, Steps},
    math::Vec2f,
    style::{Color, StrokeStyle},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cmd {
    PointerMoved {
        /// Pointer position in window pixels.
        position: Vec2f,
    },
    PointerReleased,

    Undo,
    Redo,

    SetColor {
        color: Color,
    },
    SetWidth {
        width: f32,
    },
    SetSpacing {
        spacing: f32,
    },
    SetBlur {
        blur: f32,
    },
}

/// Turns bound key commands into [`Cmd`]s, relative to the current style.
pub struct Controls {
    steps: Steps,
    palette: Vec<Color>,
}

impl Controls {
    pub fn new(config: &Config) -> Self {
        Self {
            steps: config.steps,
            palette: config.palette.clone(),
        }
    }

    pub fn command(&self, verb: &CommandVerb, style: &StrokeStyle) -> Cmd {
        match verb {
            CommandVerb::Undo => Cmd::Undo,
            CommandVerb::Redo => Cmd::Redo,
            CommandVerb::WidthUp => Cmd::SetWidth {
                width: style.width + self.steps.width,
            },
            CommandVerb::WidthDown => Cmd::SetWidth {
                width: style.width - self.steps.width,
            },
            CommandVerb::BlurUp => Cmd::SetBlur {
                blur: style.blur + self.steps.blur,
            },
            CommandVerb::BlurDown => Cmd::SetBlur {
                blur: style.blur - self.steps.blur,
            },
            CommandVerb::SpacingUp => Cmd::SetSpacing {
                spacing: round_tenth(style.spacing + self.steps.spacing),
            },
            CommandVerb::SpacingDown => Cmd::SetSpacing {
                spacing: round_tenth(style.spacing - self.steps.spacing),
            },
            CommandVerb::NextColor => {
                // Continue after the current color, or start over if it isn't in the palette.
                let next = self
                    .palette
                    .iter()
                    .position(|c| *c == style.color)
                    .map_or(0, |i| (i + 1) % self.palette.len());
                Cmd::SetColor {
                    color: self.palette.get(next).copied().unwrap_or(style.color),
                }
            }
        }
    }
}

/// Turns mouse and touch input into pointer commands. One pointer draws at a time: a touch is
/// ignored while the mouse button is down, and the other way around.
#[derive(Debug, Default)]
pub struct Pointer {
    /// Last known cursor position. `None` until the window reports one.
    cursor: Option<Vec2f>,
    mouse_down: bool,
    /// The touch drawing the current stroke.
    touch: Option<u64>,
}

impl Pointer {
    pub fn cursor_moved(&mut self, position: Vec2f) -> Option<Cmd> {
        self.cursor = Some(position);
        self.mouse_down.then_some(Cmd::PointerMoved { position })
    }

    /// The press is the stroke's first point, provided the cursor position is known already.
    /// Otherwise the stroke starts at the next cursor movement.
    pub fn mouse_pressed(&mut self) -> Option<Cmd> {
        if self.touch.is_some() {
            return None;
        }
        self.mouse_down = true;
        self.cursor.map(|position| Cmd::PointerMoved { position })
    }

    pub fn mouse_released(&mut self) -> Option<Cmd> {
        mem::take(&mut self.mouse_down).then_some(Cmd::PointerReleased)
    }

    pub fn touch(&mut self, id: u64, phase: TouchPhase, position: Vec2f) -> Option<Cmd> {
        match phase {
            TouchPhase::Started if self.touch.is_none() && !self.mouse_down => {
                self.touch = Some(id);
                Some(Cmd::PointerMoved { position })
            }
            TouchPhase::Moved if self.touch == Some(id) => Some(Cmd::PointerMoved { position }),
            TouchPhase::Ended | TouchPhase::Cancelled if self.touch == Some(id) => {
                self.touch = None;
                Some(Cmd::PointerReleased)
            }
            _ => None,
        }
    }
}

/// Spacing moves in steps of 0.1; keep repeated additions from drifting off that grid.
fn round_tenth(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}
