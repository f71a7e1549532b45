//! Turns strokes into the work the GPU does to paint them.
//!
//! Every stroke becomes one [`Layer`], painted in three steps:
//!
//! 1. The stroke's dabs are drawn into a coverage target with max blending, so dabs that overlap
//!    never add up. The dabs follow a dash pattern of `[1, spacing * width]` with round caps, so
//!    each dash is a round impression of the stroke's width placed one dash period apart along
//!    the polyline. A spacing of zero makes a solid line, which uses overlapping dabs instead.
//! 2. If the stroke has a blur radius, a separable Gaussian runs over the coverage target, first
//!    horizontally and then vertically.
//! 3. The coverage is composited onto the canvas once, tinted with the stroke's color.

use std::ops::Range;

use bytemuck::NoUninit;

use crate::{
    math::{lerp, vec2, Vec2f, Vec2u},
    stroke::Stroke,
    style::StrokeStyle,
};

/// Length of the "on" part of the dash pattern, in pixels.
const DASH_LENGTH: f32 = 1.0;
/// Distance between dabs of a solid line, relative to its width.
const SOLID_STEP: f32 = 0.25;
const MIN_STEP: f32 = 0.5;
/// Antialiasing falloff around a dab's edge, in pixels.
const EDGE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, NoUninit)]
#[repr(C)]
pub struct Dab {
    /// Center position in pixel coordinates.
    pub pos: Vec2f,
    pub radius: f32,
    _padding: f32,
}

impl Dab {
    fn new(pos: Vec2f, style: &StrokeStyle) -> Self {
        Self {
            pos,
            radius: style.width * 0.5,
            _padding: 0.0,
        }
    }
}

/// How one stroke's coverage is blurred and composited. Indexed by instance in the shader.
#[derive(Debug, Clone, Copy, PartialEq, NoUninit)]
#[repr(C)]
pub struct Layer {
    /// Premultiplied RGBA, applied once to the whole stroke.
    pub color: [f32; 4],
    /// Standard deviation of the Gaussian blur.
    pub sigma: f32,
    /// Samples taken on each side of a pixel per blur pass. `0` skips the blur.
    pub taps: u32,
    first_dab: u32,
    dab_count: u32,
}

impl Layer {
    fn new(style: &StrokeStyle, dabs: Range<usize>) -> Self {
        // The kernel ends at the blur radius, three standard deviations out.
        Self {
            color: style.color.premultiplied(),
            sigma: style.blur / 3.0,
            taps: style.blur.ceil() as u32,
            first_dab: dabs.start as u32,
            dab_count: dabs.len() as u32,
        }
    }

    /// Instance range of the layer's dabs in [`Frame::dabs`].
    pub fn dabs(&self) -> Range<u32> {
        self.first_dab..self.first_dab + self.dab_count
    }

    pub fn is_blurred(&self) -> bool {
        self.taps > 0
    }
}

/// Pixel area a layer can touch, blur included.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec2f,
    pub max: Vec2f,
}

impl Bounds {
    /// Returns the `[x, y, width, height]` scissor rectangle covering the bounds within a target
    /// of `size` pixels, or `None` if they lie entirely outside of it.
    pub fn scissor(&self, size: Vec2u) -> Option<[u32; 4]> {
        let clip = |v: f32, max: u32| v.clamp(0.0, max as f32) as u32;
        let x0 = clip(self.min.x().floor(), size.x());
        let y0 = clip(self.min.y().floor(), size.y());
        let x1 = clip(self.max.x().ceil(), size.x());
        let y1 = clip(self.max.y().ceil(), size.y());
        (x1 > x0 && y1 > y0).then(|| [x0, y0, x1 - x0, y1 - y0])
    }
}

/// Everything uploaded to paint one frame. Kept between frames to reuse the allocations.
#[derive(Debug, Default)]
pub struct Frame {
    pub dabs: Vec<Dab>,
    /// One layer per non-empty stroke, in painting order.
    pub layers: Vec<Layer>,
    /// Area of each entry in `layers`.
    pub bounds: Vec<Bounds>,
}

impl Frame {
    /// Replaces the frame's contents with the given strokes, in painting order.
    pub fn build<'a>(&mut self, strokes: impl IntoIterator<Item = &'a Stroke>) {
        self.dabs.clear();
        self.layers.clear();
        self.bounds.clear();
        for stroke in strokes {
            self.push_stroke(stroke);
        }
    }

    fn push_stroke(&mut self, stroke: &Stroke) {
        if stroke.is_empty() {
            return;
        }
        let first = self.dabs.len();
        put_dabs(stroke, &mut self.dabs);
        let layer = Layer::new(&stroke.style, first..self.dabs.len());

        let margin = stroke.style.width * 0.5 + EDGE + layer.taps as f32;
        let (min, max) = self.dabs[first..].iter().fold(
            (vec2(f32::MAX, f32::MAX), vec2(f32::MIN, f32::MIN)),
            |(min, max), dab| {
                (
                    vec2(min.x().min(dab.pos.x()), min.y().min(dab.pos.y())),
                    vec2(max.x().max(dab.pos.x()), max.y().max(dab.pos.y())),
                )
            },
        );
        self.bounds.push(Bounds {
            min: min - vec2(margin, margin),
            max: max + vec2(margin, margin),
        });
        self.layers.push(layer);
    }
}

/// Distance along the polyline from one dab to the next.
fn dab_step(style: &StrokeStyle) -> f32 {
    if style.spacing > 0.0 {
        DASH_LENGTH + style.spacing * style.width
    } else {
        (style.width * SOLID_STEP).max(MIN_STEP)
    }
}

fn put_dabs(stroke: &Stroke, dabs: &mut Vec<Dab>) {
    let style = &stroke.style;
    let last = match stroke.points() {
        [] => return,
        [point] => {
            dabs.push(Dab::new(*point, style));
            return;
        }
        [.., last] => *last,
    };
    let step = dab_step(style);

    // Distance left until the next dab, carried over from the previous segment so the dash
    // pattern continues around corners.
    let mut until_next = 0.0;
    for segment in stroke.points().windows(2) {
        let (start, end) = (segment[0], segment[1]);
        let len = start.dist(end);
        let mut d = until_next;
        while d <= len {
            let t = if len > 0.0 { d / len } else { 0.0 };
            dabs.push(Dab::new(lerp(start..=end, t), style));
            d += step;
        }
        until_next = d - len;
    }

    // Solid lines always reach their end point, like a round cap.
    if style.spacing <= 0.0 && dabs.last().map(|dab| dab.pos) != Some(last) {
        dabs.push(Dab::new(last, style));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        style::{Color, StrokeStyle},
        stroke::StrokeId,
    };

    fn stroke(style: StrokeStyle, points: &[[f32; 2]]) -> Stroke {
        let mut stroke = Stroke::new(StrokeId(0), style);
        for &p in points {
            stroke.push(p.into());
        }
        stroke
    }

    fn frame<'a>(strokes: impl IntoIterator<Item = &'a Stroke>) -> Frame {
        let mut frame = Frame::default();
        frame.build(strokes);
        frame
    }

    fn positions(dabs: &[Dab]) -> Vec<[f32; 2]> {
        dabs.iter().map(|d| d.pos.into()).collect()
    }

    fn assert_near(actual: &[[f32; 2]], expected: &[[f32; 2]]) {
        assert_eq!(actual.len(), expected.len(), "{actual:?} != {expected:?}");
        for (a, e) in actual.iter().zip(expected) {
            assert!(
                (a[0] - e[0]).abs() < 1e-4 && (a[1] - e[1]).abs() < 1e-4,
                "{actual:?} != {expected:?}"
            );
        }
    }

    /// Alpha the canvas ends up with across a horizontal line, sampled at pixel offsets
    /// `-20..=20` from the line's center. Follows `shader.wgsl`: max-blended dab coverage, the
    /// vertical blur pass, then one composite with the layer color. The horizontal pass leaves
    /// the middle of a long line unchanged, so it is left out.
    fn alpha_across_line(style: StrokeStyle) -> Vec<f32> {
        const REACH: i32 = 20;
        let line = stroke(style, &[[0.0, 0.0], [200.0, 0.0]]);
        let frame = frame([&line]);
        let [layer] = frame.layers[..] else {
            panic!("expected one layer, got {:?}", frame.layers);
        };

        let coverage: Vec<f32> = (-REACH..=REACH)
            .map(|y| {
                let pixel = vec2(100.0, y as f32);
                frame.dabs[layer.dabs().start as usize..layer.dabs().end as usize]
                    .iter()
                    .map(|dab| {
                        let dist = pixel.dist(dab.pos);
                        1.0 - smoothstep(dab.radius - EDGE, dab.radius + EDGE, dist)
                    })
                    .fold(0.0, f32::max)
            })
            .collect();

        let blurred: Vec<f32> = if layer.is_blurred() {
            let taps = layer.taps as i32;
            (0..coverage.len() as i32)
                .map(|y| {
                    let (mut sum, mut total) = (0.0, 0.0);
                    for i in -taps..=taps {
                        let x = i as f32;
                        let weight = (-x * x / (2.0 * layer.sigma * layer.sigma)).exp();
                        let at = (y + i).clamp(0, coverage.len() as i32 - 1);
                        sum += weight * coverage[at as usize];
                        total += weight;
                    }
                    sum / total
                })
                .collect()
        } else {
            coverage
        };

        blurred.iter().map(|c| layer.color[3] * c).collect()
    }

    fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
        let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
        t * t * (3.0 - 2.0 * t)
    }

    #[test]
    fn empty_stroke_has_no_layer() {
        let frame = frame([&stroke(StrokeStyle::default(), &[])]);
        assert!(frame.dabs.is_empty());
        assert!(frame.layers.is_empty());
        assert!(frame.bounds.is_empty());
    }

    #[test]
    fn single_point_is_a_dot() {
        let style = StrokeStyle {
            width: 6.0,
            blur: 3.0,
            color: Color::rgba(1.0, 0.0, 0.0, 0.5),
            ..Default::default()
        };
        let frame = frame([&stroke(style, &[[3.0, 4.0]])]);

        assert_eq!(frame.dabs, [Dab::new(vec2(3.0, 4.0), &style)]);
        assert_eq!(frame.dabs[0].radius, 3.0);
        assert_eq!(
            frame.layers,
            [Layer {
                color: [0.5, 0.0, 0.0, 0.5],
                sigma: 1.0,
                taps: 3,
                first_dab: 0,
                dab_count: 1,
            }]
        );
        // Radius 3, half a pixel of antialiasing, 3 pixels of blur.
        assert_eq!(
            frame.bounds,
            [Bounds {
                min: vec2(-3.5, -2.5),
                max: vec2(9.5, 10.5),
            }]
        );
    }

    #[test]
    fn dashes_continue_across_segments() {
        // Period is 1 + 1 * 2 = 3 pixels.
        let style = StrokeStyle {
            width: 2.0,
            spacing: 1.0,
            ..Default::default()
        };
        let frame = frame([&stroke(style, &[[0.0, 0.0], [4.0, 0.0], [4.0, 5.0]])]);

        assert_near(
            &positions(&frame.dabs),
            &[[0.0, 0.0], [3.0, 0.0], [4.0, 2.0], [4.0, 5.0]],
        );
    }

    #[test]
    fn solid_line_reaches_end() {
        // Width 4 gives a step of 1 pixel.
        let style = StrokeStyle {
            width: 4.0,
            ..Default::default()
        };
        let frame = frame([&stroke(style, &[[0.0, 0.0], [2.5, 0.0]])]);

        assert_near(
            &positions(&frame.dabs),
            &[[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [2.5, 0.0]],
        );
    }

    #[test]
    fn repeated_points_do_not_stack_dabs() {
        let frame = frame([&stroke(
            StrokeStyle::default(),
            &[[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]],
        )]);
        assert_eq!(positions(&frame.dabs), [[1.0, 1.0]]);
    }

    #[test]
    fn strokes_keep_painting_order() {
        let red = StrokeStyle {
            color: Color::rgba(1.0, 0.0, 0.0, 1.0),
            ..Default::default()
        };
        let strokes = [
            stroke(StrokeStyle::default(), &[[0.0, 0.0], [10.0, 0.0]]),
            stroke(StrokeStyle::default(), &[]),
            stroke(red, &[[10.0, 10.0]]),
        ];
        let frame = frame(&strokes);

        assert_eq!(frame.layers.len(), 2);
        assert_eq!(frame.layers[0].color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(frame.layers[1].color, [1.0, 0.0, 0.0, 1.0]);
        let last = frame.dabs.len() as u32;
        assert_eq!(frame.layers[0].dabs(), 0..last - 1);
        assert_eq!(frame.layers[1].dabs(), last - 1..last);
        assert_eq!(frame.dabs[last as usize - 1].pos, vec2(10.0, 10.0));
    }

    #[test]
    fn translucent_stroke_keeps_its_alpha() {
        let style = StrokeStyle {
            color: Color::rgba(0.0, 0.0, 0.0, 0.5),
            width: 3.0,
            ..Default::default()
        };
        let alpha = alpha_across_line(style);
        let center = alpha.len() / 2;

        assert!((alpha[center] - 0.5).abs() < 1e-6, "{alpha:?}");
        assert!(alpha.iter().all(|&a| a <= 0.5 + 1e-6), "{alpha:?}");
        // Hard edge: nothing beyond the half width plus antialiasing.
        assert_eq!(alpha[center + 3], 0.0);
    }

    #[test]
    fn blur_softens_instead_of_widening() {
        let sharp = alpha_across_line(StrokeStyle::default());
        let blurred = alpha_across_line(StrokeStyle {
            blur: 10.0,
            ..Default::default()
        });
        let center = blurred.len() / 2;

        // The line's ink spreads out: it fades instead of staying solid.
        assert!(blurred[center] < 0.5, "{blurred:?}");
        for offset in 0..10 {
            assert!(
                blurred[center + offset] > blurred[center + offset + 1],
                "{blurred:?}"
            );
            assert!((blurred[center + offset] - blurred[center - offset]).abs() < 1e-5);
        }
        assert!(blurred[center + 8] > 0.0);
        // The kernel ends at the blur radius past the line's edge.
        assert_eq!(blurred[center + 13], 0.0);

        // Blurring moves coverage around without adding any.
        let sum = |alpha: &[f32]| alpha.iter().sum::<f32>();
        assert!((sum(&blurred) - sum(&sharp)).abs() < 1e-3, "{blurred:?}");
    }

    #[test]
    fn scissor_clips_to_target() {
        let size = vec2(100, 50);
        let bounds = Bounds {
            min: vec2(-3.5, 10.2),
            max: vec2(20.1, 80.0),
        };
        assert_eq!(bounds.scissor(size), Some([0, 10, 21, 40]));

        let outside = Bounds {
            min: vec2(120.0, 0.0),
            max: vec2(130.0, 10.0),
        };
        assert_eq!(outside.scissor(size), None);
    }
}
