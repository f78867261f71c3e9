// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The result of applying a clip to a draw.

use smallvec::SmallVec;

use crate::atlas::AtlasSample;
use crate::classify::ClipOp;
use crate::element::ClipElement;
use crate::frame::GenerationId;
use crate::geometry::IRect;
use crate::kurbo::{Affine, Line, PathEl, Point, Rect, RoundedRect, Vec2};
use crate::mask::MaskTexture;
use crate::shader::ClipShader;
use crate::shape::Shape;

/// The most edges a single analytic polygon term can have.
pub const MAX_ANALYTIC_EDGES: usize = 8;

/// Exclusion rectangles: the draw has no effect inside any of them.
pub type WindowRects = SmallVec<[IRect; 8]>;

/// How the clip affects a draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClipEffect {
    /// The clip has no effect on the draw.
    Unclipped,
    /// The draw has to be clipped.
    Clipped,
    /// Nothing of the draw remains, so it can be skipped.
    ClippedOut,
}

/// A clip that can be described by a single device-space shape.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SimpleClip {
    /// A rectangle.
    Rect(Rect),
    /// A rounded rectangle.
    RRect(RoundedRect),
}

/// The result of [`ClipStack::pre_apply`](crate::ClipStack::pre_apply).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PreClipResult {
    /// How the clip affects the draw.
    pub effect: ClipEffect,
    /// When the draw is clipped by a single shape, that shape.
    pub simple: Option<SimpleClip>,
    /// Whether `simple` is antialiased.
    pub anti_alias: bool,
}

impl PreClipResult {
    pub(crate) fn new(effect: ClipEffect) -> Self {
        Self {
            effect,
            simple: None,
            anti_alias: false,
        }
    }

    pub(crate) fn simple(shape: SimpleClip, anti_alias: bool) -> Self {
        Self {
            effect: ClipEffect::Clipped,
            simple: Some(shape),
            anti_alias,
        }
    }
}

/// Fixed-function clipping state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HardClip {
    scissor: Option<IRect>,
    windows: WindowRects,
    stencil: Option<GenerationId>,
}

impl HardClip {
    /// The scissor rectangle, if any.
    pub fn scissor(&self) -> Option<IRect> {
        self.scissor
    }

    /// Exclusion windows.
    pub fn windows(&self) -> &[IRect] {
        &self.windows
    }

    /// The clip that the stencil buffer has to hold, if the stencil test is needed.
    pub fn stencil(&self) -> Option<GenerationId> {
        self.stencil
    }

    /// Whether any fixed-function state is used.
    pub fn does_clip(&self) -> bool {
        self.scissor.is_some() || !self.windows.is_empty() || self.stencil.is_some()
    }

    /// Whether the scissor and windows let `(x, y)` through. The stencil isn't considered.
    pub fn contains_pixel(&self, x: i32, y: i32) -> bool {
        self.scissor.map_or(true, |s| s.contains_pixel(x, y))
            && !self.windows.iter().any(|w| w.contains_pixel(x, y))
    }

    pub(crate) fn set_scissor(&mut self, scissor: IRect) {
        self.scissor = Some(scissor);
    }

    pub(crate) fn set_windows(&mut self, windows: WindowRects) {
        self.windows = windows;
    }

    pub(crate) fn set_stencil(&mut self, generation: GenerationId) {
        self.stencil = Some(generation);
    }
}

/// The edge treatment of an analytic term.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EdgeType {
    /// Antialiased coverage inside the shape.
    FillAa,
    /// Aliased coverage inside the shape.
    FillBw,
    /// Antialiased coverage outside the shape.
    InverseFillAa,
    /// Aliased coverage outside the shape.
    InverseFillBw,
}

impl EdgeType {
    /// The edge type for an element with the given op and antialiasing.
    pub fn new(op: ClipOp, anti_alias: bool) -> Self {
        match (op, anti_alias) {
            (ClipOp::Intersect, true) => Self::FillAa,
            (ClipOp::Intersect, false) => Self::FillBw,
            (ClipOp::Difference, true) => Self::InverseFillAa,
            (ClipOp::Difference, false) => Self::InverseFillBw,
        }
    }

    /// Whether edges are antialiased.
    pub fn is_anti_aliased(self) -> bool {
        matches!(self, Self::FillAa | Self::InverseFillAa)
    }

    /// Whether the outside of the shape is kept.
    pub fn is_inverse(self) -> bool {
        matches!(self, Self::InverseFillAa | Self::InverseFillBw)
    }

    fn resolve(self, coverage: f32) -> f32 {
        if self.is_inverse() {
            1.0 - coverage
        } else {
            coverage
        }
    }
}

/// A region of a cached clip mask.
#[derive(Clone, Debug)]
pub struct MaskSample {
    texture: MaskTexture,
}

impl MaskSample {
    pub(crate) fn new(texture: MaskTexture) -> Self {
        Self { texture }
    }

    /// The cached mask.
    pub fn texture(&self) -> &MaskTexture {
        &self.texture
    }

    /// Where device pixel `(0, 0)` lies in the mask texture.
    pub fn texture_offset(&self) -> (i32, i32) {
        let bounds = self.texture.bounds();
        (-bounds.x0, -bounds.y0)
    }

    /// The coverage at `(x, y)`; blocks until the mask has been rasterized.
    pub fn coverage_at(&self, x: i32, y: i32) -> f32 {
        match self.texture.wait() {
            Ok(mask) => f32::from(mask.get(x, y).unwrap_or(0)) / 255.0,
            Err(err) => {
                log::warn!("Sampling unavailable clip mask: {err}");
                0.0
            }
        }
    }
}

/// One factor of the coverage applied to a draw.
#[derive(Clone, Debug)]
pub enum CoverageTerm {
    /// A device-space rectangle.
    Rect {
        /// The rectangle.
        rect: Rect,
        /// The edge treatment.
        edge: EdgeType,
    },
    /// A device-space rounded rectangle.
    RRect {
        /// The rounded rectangle.
        rrect: RoundedRect,
        /// The edge treatment.
        edge: EdgeType,
    },
    /// A device-space convex polygon.
    ConvexPolygon {
        /// The outline, wound so that the inside is to the left of every edge.
        edges: SmallVec<[Line; MAX_ANALYTIC_EDGES]>,
        /// The edge treatment.
        edge: EdgeType,
    },
    /// A single element rasterized into the clip atlas.
    Atlas(AtlasSample),
    /// The merged mask of every element that couldn't be handled otherwise.
    Mask(MaskSample),
    /// The clip shader.
    Shader(ClipShader),
}

impl CoverageTerm {
    /// The coverage of this term at the device pixel `(x, y)`.
    pub fn coverage_at(&self, x: i32, y: i32) -> f32 {
        match self {
            Self::Rect { rect, edge } => edge.resolve(rect_coverage(rect, *edge, x, y)),
            Self::RRect { rrect, edge } => {
                let d = rrect_signed_distance(rrect, pixel_center(x, y));
                edge.resolve(distance_coverage(d, *edge))
            }
            Self::ConvexPolygon { edges, edge } => {
                let center = pixel_center(x, y);
                let coverage = edges
                    .iter()
                    .map(|line| distance_coverage(-edge_distance(line, center), *edge))
                    .product();
                edge.resolve(coverage)
            }
            Self::Atlas(sample) => sample.coverage_at(x, y),
            Self::Mask(sample) => sample.coverage_at(x, y),
            Self::Shader(shader) => {
                let p = pixel_center(x, y);
                shader.coverage_at(p.x, p.y)
            }
        }
    }

    /// Build an analytic term for `element`, if its shape allows one.
    pub(crate) fn analytic(element: &ClipElement) -> Option<Self> {
        let edge = EdgeType::new(element.op, element.anti_alias);
        let transform = &element.local_to_device;
        match &element.shape {
            Shape::Rect(rect) if *transform == Affine::IDENTITY => {
                Some(Self::Rect { rect: *rect, edge })
            }
            Shape::RRect(rrect) if *transform == Affine::IDENTITY => Some(Self::RRect {
                rrect: *rrect,
                edge,
            }),
            shape if shape.is_convex() && shape.is_line_only() => {
                convex_polygon(shape, transform).map(|edges| Self::ConvexPolygon { edges, edge })
            }
            _ => None,
        }
    }
}

fn pixel_center(x: i32, y: i32) -> Point {
    Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5)
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "coverage only needs f32 precision"
)]
fn rect_coverage(rect: &Rect, edge: EdgeType, x: i32, y: i32) -> f32 {
    let (x, y) = (f64::from(x), f64::from(y));
    if edge.is_anti_aliased() {
        let w = ((x + 1.0).min(rect.x1) - x.max(rect.x0)).clamp(0.0, 1.0);
        let h = ((y + 1.0).min(rect.y1) - y.max(rect.y0)).clamp(0.0, 1.0);
        (w * h) as f32
    } else {
        let (cx, cy) = (x + 0.5, y + 0.5);
        let inside = cx >= rect.x0 && cx < rect.x1 && cy >= rect.y0 && cy < rect.y1;
        if inside {
            1.0
        } else {
            0.0
        }
    }
}

/// Coverage for a signed distance that is negative inside the shape.
#[expect(
    clippy::cast_possible_truncation,
    reason = "coverage only needs f32 precision"
)]
fn distance_coverage(d: f64, edge: EdgeType) -> f32 {
    if edge.is_anti_aliased() {
        (0.5 - d).clamp(0.0, 1.0) as f32
    } else if d <= 0.0 {
        1.0
    } else {
        0.0
    }
}

fn rrect_signed_distance(rrect: &RoundedRect, p: Point) -> f64 {
    let rect = rrect.rect();
    let radii = rrect.radii();
    let center = rect.center();
    let radius = match (p.x < center.x, p.y < center.y) {
        (true, true) => radii.top_left,
        (false, true) => radii.top_right,
        (false, false) => radii.bottom_right,
        (true, false) => radii.bottom_left,
    };
    let q = Vec2::new(
        (p.x - center.x).abs() - rect.width() * 0.5 + radius,
        (p.y - center.y).abs() - rect.height() * 0.5 + radius,
    );
    let outside = Vec2::new(q.x.max(0.0), q.y.max(0.0)).hypot();
    let inside = q.x.max(q.y).min(0.0);
    outside + inside - radius
}

/// The distance of `p` from the line, positive to its left.
fn edge_distance(line: &Line, p: Point) -> f64 {
    let dir = line.p1 - line.p0;
    dir.cross(p - line.p0) / dir.hypot()
}

/// The edges of a line-only convex shape in device space, or `None` if there are too many.
fn convex_polygon(
    shape: &Shape,
    transform: &Affine,
) -> Option<SmallVec<[Line; MAX_ANALYTIC_EDGES]>> {
    let mut points: SmallVec<[Point; MAX_ANALYTIC_EDGES]> = SmallVec::new();
    for el in shape.to_path().elements() {
        let p = match *el {
            PathEl::MoveTo(p) | PathEl::LineTo(p) => *transform * p,
            PathEl::ClosePath => continue,
            PathEl::QuadTo(..) | PathEl::CurveTo(..) => return None,
        };
        if points.last().is_some_and(|last| last.distance(p) < 1e-9) {
            continue;
        }
        points.push(p);
        if points.len() > MAX_ANALYTIC_EDGES + 1 {
            return None;
        }
    }
    if points.len() > 1 && points[0].distance(points[points.len() - 1]) < 1e-9 {
        points.pop();
    }
    if points.len() < 3 || points.len() > MAX_ANALYTIC_EDGES {
        return None;
    }

    let area: f64 = (0..points.len())
        .map(|i| points[i].to_vec2().cross(points[(i + 1) % points.len()].to_vec2()))
        .sum();
    if area.abs() < 1e-9 {
        return None;
    }
    // Inside must be to the left of every edge.
    if area < 0.0 {
        points.reverse();
    }
    Some(
        (0..points.len())
            .map(|i| Line::new(points[i], points[(i + 1) % points.len()]))
            .collect(),
    )
}

/// The product of every coverage term applied to a draw.
#[derive(Clone, Debug, Default)]
pub struct CoverageFn {
    terms: Vec<CoverageTerm>,
}

impl CoverageFn {
    /// The factors, in the order they were added.
    pub fn terms(&self) -> &[CoverageTerm] {
        &self.terms
    }

    /// Whether there are no terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// The combined coverage at the device pixel `(x, y)`.
    pub fn coverage_at(&self, x: i32, y: i32) -> f32 {
        self.terms.iter().map(|t| t.coverage_at(x, y)).product()
    }

    /// The number of analytic geometry terms.
    pub fn analytic_count(&self) -> usize {
        self.terms
            .iter()
            .filter(|t| {
                matches!(
                    t,
                    CoverageTerm::Rect { .. }
                        | CoverageTerm::RRect { .. }
                        | CoverageTerm::ConvexPolygon { .. }
                )
            })
            .count()
    }

    /// The merged mask, if one is used.
    pub fn mask(&self) -> Option<&MaskSample> {
        self.terms.iter().find_map(|t| match t {
            CoverageTerm::Mask(m) => Some(m),
            _ => None,
        })
    }

    pub(crate) fn push(&mut self, term: CoverageTerm) {
        self.terms.push(term);
    }
}

/// Everything needed to clip a single draw.
#[derive(Clone, Debug, Default)]
pub struct AppliedClip {
    hard_clip: HardClip,
    coverage: CoverageFn,
}

impl AppliedClip {
    /// Fixed-function state.
    pub fn hard_clip(&self) -> &HardClip {
        &self.hard_clip
    }

    /// Coverage that multiplies the draw.
    pub fn coverage(&self) -> &CoverageFn {
        &self.coverage
    }

    /// Whether the draw is affected at all.
    pub fn does_clip(&self) -> bool {
        self.hard_clip.does_clip() || !self.coverage.is_empty()
    }

    /// The clip's coverage at the device pixel `(x, y)`, ignoring the stencil.
    pub fn coverage_at(&self, x: i32, y: i32) -> f32 {
        if self.hard_clip.contains_pixel(x, y) {
            self.coverage.coverage_at(x, y)
        } else {
            0.0
        }
    }

    pub(crate) fn hard_clip_mut(&mut self) -> &mut HardClip {
        &mut self.hard_clip
    }

    pub(crate) fn coverage_mut(&mut self) -> &mut CoverageFn {
        &mut self.coverage
    }
}
