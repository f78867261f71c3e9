// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Clip geometry.

use std::sync::Arc;

use crate::geometry::{is_scale_translate, rect_contains_rect, rect_intersect, rect_is_empty};
use crate::kurbo::{
    self, Affine, BezPath, PathEl, Point, Rect, RoundedRect, RoundedRectRadii, Shape as _, Vec2,
};
use peniko::Fill;

/// Tolerance used when flattening curves for geometric queries.
const FLATTEN_TOLERANCE: f64 = 0.1;

/// Paths with at most this many points are compared by value when checking element containment.
const MAX_PATH_COMPARE_POINTS: usize = 16;

/// A path used as a clip, along with its fill rule.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipPath {
    path: Arc<BezPath>,
    fill: Fill,
    inverted: bool,
    convex: bool,
}

impl ClipPath {
    /// Create a new clip path.
    ///
    /// The path is shared, so cloning a clip path (for example when it is handed to a background
    /// rasterization task) doesn't copy the geometry.
    pub fn new(path: impl Into<Arc<BezPath>>, fill: Fill) -> Self {
        let path = path.into();
        let convex = is_convex_path(&path);
        Self {
            path,
            fill,
            inverted: false,
            convex,
        }
    }

    /// Fill the outside of the path instead of the inside.
    pub fn inverse(mut self) -> Self {
        self.inverted = !self.inverted;
        self
    }

    /// The underlying path.
    pub fn path(&self) -> &BezPath {
        &self.path
    }

    /// The fill rule.
    pub fn fill(&self) -> Fill {
        self.fill
    }

    /// Whether the path covers its outside rather than its inside.
    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    pub(crate) fn set_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }

    /// Whether the filled region is a single convex area.
    pub fn is_convex(&self) -> bool {
        self.convex && !self.inverted
    }

    /// Whether the point is covered by the path, honoring the fill rule and inversion.
    pub fn contains(&self, point: Point) -> bool {
        let winding = self.path.winding(point);
        let inside = match self.fill {
            Fill::NonZero => winding != 0,
            Fill::EvenOdd => winding % 2 != 0,
        };
        inside != self.inverted
    }

    /// Whether both paths are known to describe the same region.
    ///
    /// Paths need the same fill rule and inversion. Paths sharing storage then always match;
    /// otherwise small paths are compared point by point.
    pub(crate) fn same_geometry(&self, other: &Self) -> bool {
        if self.inverted != other.inverted || self.fill != other.fill {
            return false;
        }
        Arc::ptr_eq(&self.path, &other.path)
            || (point_count(&self.path) <= MAX_PATH_COMPARE_POINTS
                && self.path.elements() == other.path.elements())
    }

    fn is_line_only(&self) -> bool {
        self.path
            .elements()
            .iter()
            .all(|el| matches!(el, PathEl::MoveTo(_) | PathEl::LineTo(_) | PathEl::ClosePath))
    }
}

/// The geometry of a clip element.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Shape {
    /// Covers nothing.
    #[default]
    Empty,
    /// An axis-aligned rectangle in the element's local space.
    Rect(Rect),
    /// A rectangle with circular corners.
    RRect(RoundedRect),
    /// An arbitrary path.
    Path(ClipPath),
}

impl Shape {
    /// Whether the shape covers nothing.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Whether this is an inverse-filled path.
    pub fn is_inverted(&self) -> bool {
        matches!(self, Self::Path(p) if p.is_inverted())
    }

    /// Whether the covered region is convex.
    pub fn is_convex(&self) -> bool {
        match self {
            Self::Empty => false,
            Self::Rect(_) | Self::RRect(_) => true,
            Self::Path(p) => p.is_convex(),
        }
    }

    /// Whether the outline consists only of straight segments.
    pub fn is_line_only(&self) -> bool {
        match self {
            Self::Rect(_) => true,
            Self::Path(p) => p.is_line_only(),
            Self::Empty | Self::RRect(_) => false,
        }
    }

    /// The bounding box of the shape in its local space, ignoring inversion.
    pub fn bounds(&self) -> Rect {
        match self {
            Self::Empty => Rect::ZERO,
            Self::Rect(r) => *r,
            Self::RRect(rr) => rr.rect(),
            Self::Path(p) => p.path.bounding_box(),
        }
    }

    /// Convert the shape to a path.
    pub fn to_path(&self) -> BezPath {
        match self {
            Self::Empty => BezPath::new(),
            Self::Rect(r) => r.to_path(FLATTEN_TOLERANCE),
            Self::RRect(rr) => rr.to_path(FLATTEN_TOLERANCE),
            Self::Path(p) => (*p.path).clone(),
        }
    }

    /// Whether the point lies within the covered region.
    ///
    /// Unlike [`Shape::conservative_contains_point`], this answers for every shape and is meant for
    /// sampling coverage.
    pub fn contains_point(&self, point: Point) -> bool {
        match self {
            Self::Empty => false,
            Self::Rect(r) => point.x >= r.x0 && point.x < r.x1 && point.y >= r.y0 && point.y < r.y1,
            Self::RRect(rr) => rrect_contains_point(rr, point),
            Self::Path(p) => p.contains(point),
        }
    }

    /// Whether the shape certainly covers `point`. False negatives are allowed.
    pub fn conservative_contains_point(&self, point: Point) -> bool {
        match self {
            Self::Empty => false,
            Self::Rect(r) => point.x >= r.x0 && point.x <= r.x1 && point.y >= r.y0 && point.y <= r.y1,
            Self::RRect(rr) => rrect_contains_point(rr, point),
            Self::Path(p) => p.is_convex() && p.contains(point),
        }
    }

    /// Whether the shape certainly covers all of `rect`. False negatives are allowed.
    pub fn conservative_contains_rect(&self, rect: &Rect) -> bool {
        if rect_is_empty(rect) {
            return false;
        }
        match self {
            Self::Empty => false,
            Self::Rect(r) => rect_contains_rect(r, rect),
            // A convex region contains a rectangle exactly when it contains its corners.
            Self::RRect(_) | Self::Path(_) => {
                self.is_convex()
                    && corners(rect)
                        .into_iter()
                        .all(|p| self.conservative_contains_point(p))
            }
        }
    }

    /// Reduce the shape to the simplest equivalent variant.
    ///
    /// Degenerate shapes become [`Shape::Empty`], rounded rectangles without radii become
    /// rectangles, and paths that trace an axis-aligned rectangle become rectangles. Inverse-filled
    /// paths are left alone.
    pub fn simplify(&mut self) {
        match self {
            Self::Empty => {}
            Self::Rect(r) => {
                *r = r.abs();
                if rect_is_empty(r) {
                    *self = Self::Empty;
                }
            }
            Self::RRect(rr) => {
                if rect_is_empty(&rr.rect()) {
                    *self = Self::Empty;
                } else if radii_are_zero(&rr.radii()) {
                    *self = Self::Rect(rr.rect());
                }
            }
            Self::Path(p) => {
                if p.inverted {
                    return;
                }
                if let Some(r) = path_as_rect(&p.path) {
                    *self = Self::Rect(r);
                    self.simplify();
                } else if rect_is_empty(&p.path.bounding_box()) {
                    *self = Self::Empty;
                }
            }
        }
    }
}

impl From<Rect> for Shape {
    fn from(rect: Rect) -> Self {
        Self::Rect(rect)
    }
}

impl From<RoundedRect> for Shape {
    fn from(rrect: RoundedRect) -> Self {
        Self::RRect(rrect)
    }
}

impl From<ClipPath> for Shape {
    fn from(path: ClipPath) -> Self {
        Self::Path(path)
    }
}

pub(crate) fn corners(r: &Rect) -> [Point; 4] {
    [
        Point::new(r.x0, r.y0),
        Point::new(r.x1, r.y0),
        Point::new(r.x1, r.y1),
        Point::new(r.x0, r.y1),
    ]
}

fn point_count(path: &BezPath) -> usize {
    path.elements()
        .iter()
        .map(|el| match el {
            PathEl::MoveTo(_) | PathEl::LineTo(_) => 1,
            PathEl::QuadTo(..) => 2,
            PathEl::CurveTo(..) => 3,
            PathEl::ClosePath => 0,
        })
        .sum()
}

/// Detect a single contour tracing an axis-aligned rectangle.
fn path_as_rect(path: &BezPath) -> Option<Rect> {
    let mut points = Vec::with_capacity(5);
    let mut closed = false;
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) if points.is_empty() => points.push(p),
            // A trailing move doesn't contribute any area.
            PathEl::MoveTo(_) if closed => {}
            PathEl::LineTo(p) if !points.is_empty() && !closed => {
                if points.last() != Some(&p) {
                    points.push(p);
                }
            }
            PathEl::ClosePath if !points.is_empty() => closed = true,
            _ => return None,
        }
    }
    if points.len() == 5 && points[0] == points[4] {
        points.pop();
    }
    let [p0, p1, p2, p3] = points[..] else {
        return None;
    };
    let vertical_first = p0.x == p1.x && p1.y == p2.y && p2.x == p3.x && p3.y == p0.y;
    let horizontal_first = p0.y == p1.y && p1.x == p2.x && p2.y == p3.y && p3.x == p0.x;
    (vertical_first || horizontal_first).then(|| Rect::from_points(p0, p2))
}

/// Whether the path is a single contour whose flattened outline turns consistently in one
/// direction through exactly one revolution.
fn is_convex_path(path: &BezPath) -> bool {
    // Relative to the path's extent. Turns smaller than this are treated as straight.
    const EPSILON: f64 = 1e-9;

    let mut points: Vec<Point> = Vec::new();
    let mut contours = 0_usize;
    let mut extra_segments = false;
    kurbo::flatten(path.iter(), FLATTEN_TOLERANCE, |el| match el {
        PathEl::MoveTo(p) => {
            contours += 1;
            if contours == 1 {
                points.push(p);
            }
        }
        PathEl::LineTo(p) => {
            if contours > 1 {
                extra_segments = true;
            } else {
                points.push(p);
            }
        }
        _ => {}
    });
    if contours == 0 || extra_segments {
        return false;
    }

    let bounds = path.bounding_box();
    let min_distance = EPSILON * bounds.width().max(bounds.height());
    if !min_distance.is_finite() || min_distance <= 0.0 {
        return false;
    }
    // Curve endpoints rarely land exactly on each other, so merge points closer than the
    // tolerance before looking at the turns.
    points.dedup_by(|p, prev| p.distance(*prev) <= min_distance);
    while points.len() > 1 && points[0].distance(points[points.len() - 1]) <= min_distance {
        points.pop();
    }
    let n = points.len();
    if n < 3 {
        return false;
    }

    let mut direction = 0.0_f64;
    let mut turning = 0.0;
    for i in 0..n {
        let e0: Vec2 = points[(i + 1) % n] - points[i];
        let e1: Vec2 = points[(i + 2) % n] - points[(i + 1) % n];
        let cross = e0.cross(e1);
        if cross.abs() > EPSILON * e0.hypot() * e1.hypot() {
            if direction != 0.0 && direction.signum() != cross.signum() {
                return false;
            }
            direction = cross;
        }
        turning += cross.atan2(e0.dot(e1));
    }
    direction != 0.0 && (turning.abs() - std::f64::consts::TAU).abs() < 1e-3
}

fn radii_are_zero(radii: &RoundedRectRadii) -> bool {
    radii.top_left == 0.0
        && radii.top_right == 0.0
        && radii.bottom_right == 0.0
        && radii.bottom_left == 0.0
}

/// The corners of a rectangle, in the same order as [`RoundedRectRadii`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Corner {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl Corner {
    const ALL: [Self; 4] = [
        Self::TopLeft,
        Self::TopRight,
        Self::BottomRight,
        Self::BottomLeft,
    ];

    fn point(self, r: &Rect) -> Point {
        match self {
            Self::TopLeft => Point::new(r.x0, r.y0),
            Self::TopRight => Point::new(r.x1, r.y0),
            Self::BottomRight => Point::new(r.x1, r.y1),
            Self::BottomLeft => Point::new(r.x0, r.y1),
        }
    }

    fn radius(self, radii: &RoundedRectRadii) -> f64 {
        match self {
            Self::TopLeft => radii.top_left,
            Self::TopRight => radii.top_right,
            Self::BottomRight => radii.bottom_right,
            Self::BottomLeft => radii.bottom_left,
        }
    }

    fn radius_mut(self, radii: &mut RoundedRectRadii) -> &mut f64 {
        match self {
            Self::TopLeft => &mut radii.top_left,
            Self::TopRight => &mut radii.top_right,
            Self::BottomRight => &mut radii.bottom_right,
            Self::BottomLeft => &mut radii.bottom_left,
        }
    }

    /// Whether corner point `a` is on the inner side of corner point `b`.
    fn is_inside(self, a: Point, b: Point) -> bool {
        match self {
            Self::TopLeft => a.x >= b.x && a.y >= b.y,
            Self::TopRight => a.x <= b.x && a.y >= b.y,
            Self::BottomRight => a.x <= b.x && a.y <= b.y,
            Self::BottomLeft => a.x >= b.x && a.y <= b.y,
        }
    }
}

/// Closed point containment for a rounded rectangle.
pub(crate) fn rrect_contains_point(rr: &RoundedRect, p: Point) -> bool {
    let r = rr.rect();
    if p.x < r.x0 || p.x > r.x1 || p.y < r.y0 || p.y > r.y1 {
        return false;
    }
    let radii = rr.radii();
    let center = if p.x < r.x0 + radii.top_left && p.y < r.y0 + radii.top_left {
        Some((r.x0 + radii.top_left, r.y0 + radii.top_left, radii.top_left))
    } else if p.x > r.x1 - radii.top_right && p.y < r.y0 + radii.top_right {
        Some((r.x1 - radii.top_right, r.y0 + radii.top_right, radii.top_right))
    } else if p.x > r.x1 - radii.bottom_right && p.y > r.y1 - radii.bottom_right {
        Some((
            r.x1 - radii.bottom_right,
            r.y1 - radii.bottom_right,
            radii.bottom_right,
        ))
    } else if p.x < r.x0 + radii.bottom_left && p.y > r.y1 - radii.bottom_left {
        Some((r.x0 + radii.bottom_left, r.y1 - radii.bottom_left, radii.bottom_left))
    } else {
        None
    };
    match center {
        Some((cx, cy, radius)) => {
            let (dx, dy) = (p.x - cx, p.y - cy);
            dx * dx + dy * dy <= radius * radius
        }
        None => true,
    }
}

/// The largest rounded rectangle contained in both `a` and `b`, if the intersection of the two is
/// exactly a rounded rectangle.
///
/// Returns `None` both when the shapes don't overlap and when their intersection can't be expressed
/// as a single rounded rectangle.
pub(crate) fn rrect_conservative_intersect(
    a: &RoundedRect,
    b: &RoundedRect,
) -> Option<RoundedRect> {
    let rect = rect_intersect(&a.rect(), &b.rect())?;
    let (a_radii, b_radii) = (a.radii(), b.radii());

    let mut radii = RoundedRectRadii::from_single_radius(0.0);
    for corner in Corner::ALL {
        let test = corner.point(&rect);
        let a_corner = corner.point(&a.rect());
        let b_corner = corner.point(&b.rect());
        let (ra, rb) = (corner.radius(&a_radii), corner.radius(&b_radii));

        let radius = if test == a_corner && test == b_corner {
            // Shared corner anchor: the larger radius cuts off the most.
            ra.max(rb)
        } else if test == a_corner {
            let inside = if ra == rb {
                corner.is_inside(a_corner, b_corner)
            } else {
                rrect_contains_point(b, a_corner)
            };
            if !inside {
                return None;
            }
            ra
        } else if test == b_corner {
            let inside = if ra == rb {
                corner.is_inside(b_corner, a_corner)
            } else {
                rrect_contains_point(a, b_corner)
            };
            if !inside {
                return None;
            }
            rb
        } else {
            // A corner formed by straight edges of both shapes.
            if !(rrect_contains_point(a, test) && rrect_contains_point(b, test)) {
                return None;
            }
            0.0
        };
        *corner.radius_mut(&mut radii) = radius;
    }

    // Radii that don't fit the intersected rectangle would get clamped, which would make the
    // result cover more than the true intersection.
    let max_radius = rect.width().min(rect.height()) / 2.0;
    if Corner::ALL
        .into_iter()
        .any(|c| c.radius(&radii) > max_radius)
    {
        return None;
    }
    Some(RoundedRect::from_rect(rect, radii))
}

/// A rectangle fully inside the rounded rectangle, chosen to have a large area.
pub(crate) fn rrect_inner_bounds(rr: &RoundedRect) -> Rect {
    // Inset applied along each axis when cutting every corner at its 45 degree point, nudged up
    // so the resulting corners land safely inside the arcs.
    const CORNER_SCALE: f64 = (1.0 - std::f64::consts::FRAC_1_SQRT_2) + 1e-5;

    let mut bounds = rr.rect();
    let radii = rr.radii();
    if rect_is_empty(&bounds) || radii_are_zero(&radii) {
        return bounds;
    }

    let left = radii.top_left.max(radii.bottom_left);
    let top = radii.top_left.max(radii.top_right);
    let right = radii.top_right.max(radii.bottom_right);
    let bottom = radii.bottom_left.max(radii.bottom_right);
    let dw = left + right;
    let dh = top + bottom;

    let horiz_area = (bounds.width() - dw) * bounds.height();
    let vert_area = (bounds.height() - dh) * bounds.width();
    let inner_area = (bounds.width() - CORNER_SCALE * dw) * (bounds.height() - CORNER_SCALE * dh);

    if horiz_area > vert_area && horiz_area > inner_area {
        bounds.x0 += left;
        bounds.x1 -= right;
    } else if vert_area > inner_area {
        bounds.y0 += top;
        bounds.y1 -= bottom;
    } else if inner_area > 0.0 {
        bounds.x0 += CORNER_SCALE * left;
        bounds.x1 -= CORNER_SCALE * right;
        bounds.y0 += CORNER_SCALE * top;
        bounds.y1 -= CORNER_SCALE * bottom;
    } else {
        return Rect::ZERO;
    }
    bounds
}

/// Map a rounded rectangle through a scale and translate.
///
/// Only uniform scales keep the corners circular, so anything else returns `None`.
pub(crate) fn transform_rrect(rr: &RoundedRect, transform: &Affine) -> Option<RoundedRect> {
    if !is_scale_translate(transform) {
        return None;
    }
    let [sx, _, _, sy, _, _] = transform.as_coeffs();
    let scale = sx.abs();
    if !scale.is_finite() || (scale - sy.abs()).abs() > 1e-9 * scale.max(1.0) {
        return None;
    }
    let src = rr.radii();
    let (mut tl, mut tr, mut br, mut bl) = (
        src.top_left * scale,
        src.top_right * scale,
        src.bottom_right * scale,
        src.bottom_left * scale,
    );
    if sx < 0.0 {
        std::mem::swap(&mut tl, &mut tr);
        std::mem::swap(&mut bl, &mut br);
    }
    if sy < 0.0 {
        std::mem::swap(&mut tl, &mut bl);
        std::mem::swap(&mut tr, &mut br);
    }
    let rect = transform.transform_rect_bbox(rr.rect());
    if rect_is_empty(&rect) {
        return None;
    }
    Some(RoundedRect::from_rect(
        rect,
        RoundedRectRadii::new(tl, tr, br, bl),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kurbo::{Circle, Shape as _};

    fn octagon() -> BezPath {
        let mut path = BezPath::new();
        path.move_to((20.0, 0.0));
        path.line_to((80.0, 0.0));
        path.line_to((100.0, 20.0));
        path.line_to((100.0, 80.0));
        path.line_to((80.0, 100.0));
        path.line_to((20.0, 100.0));
        path.line_to((0.0, 80.0));
        path.line_to((0.0, 20.0));
        path.close_path();
        path
    }

    #[test]
    fn convexity() {
        assert!(ClipPath::new(octagon(), Fill::NonZero).is_convex());

        let mut concave = BezPath::new();
        concave.move_to((0.0, 0.0));
        concave.line_to((10.0, 0.0));
        concave.line_to((5.0, 2.0));
        concave.line_to((10.0, 10.0));
        concave.line_to((0.0, 10.0));
        concave.close_path();
        assert!(!ClipPath::new(concave, Fill::NonZero).is_convex());

        let circle = Circle::new((50.0, 50.0), 20.0).to_path(0.1);
        assert!(ClipPath::new(circle, Fill::NonZero).is_convex());
        let circle = Circle::new((50.0, 50.0), 40.0).to_path(0.1);
        assert!(ClipPath::new(circle, Fill::NonZero).is_convex());
        assert!(!ClipPath::new(octagon(), Fill::NonZero).inverse().is_convex());
    }

    #[test]
    fn shared_paths_compare_fill_rules() {
        let path = Arc::new(octagon());
        let non_zero = ClipPath::new(path.clone(), Fill::NonZero);
        let even_odd = ClipPath::new(path, Fill::EvenOdd);
        assert!(non_zero.same_geometry(&non_zero.clone()));
        assert!(!non_zero.same_geometry(&even_odd));
        assert!(!non_zero.same_geometry(&non_zero.clone().inverse()));
        assert!(non_zero.same_geometry(&ClipPath::new(octagon(), Fill::NonZero)));
    }

    #[test]
    fn rect_path_simplifies_to_rect() {
        let mut shape = Shape::Path(ClipPath::new(
            Rect::new(10.0, 20.0, 30.0, 40.0).to_path(0.1),
            Fill::NonZero,
        ));
        shape.simplify();
        assert_eq!(shape, Shape::Rect(Rect::new(10.0, 20.0, 30.0, 40.0)));
    }

    #[test]
    fn degenerate_shapes_simplify_to_empty() {
        let mut line = BezPath::new();
        line.move_to((0.0, 0.0));
        line.line_to((10.0, 0.0));
        let mut shape = Shape::Path(ClipPath::new(line, Fill::NonZero));
        shape.simplify();
        assert!(shape.is_empty());

        let mut shape = Shape::Rect(Rect::new(5.0, 5.0, 5.0, 10.0));
        shape.simplify();
        assert!(shape.is_empty());

        let mut shape = Shape::RRect(RoundedRect::new(0.0, 0.0, 10.0, 10.0, 0.0));
        shape.simplify();
        assert_eq!(shape, Shape::Rect(Rect::new(0.0, 0.0, 10.0, 10.0)));
    }

    #[test]
    fn rrect_point_containment() {
        let rr = RoundedRect::new(0.0, 0.0, 100.0, 100.0, 20.0);
        assert!(rrect_contains_point(&rr, Point::new(50.0, 0.0)));
        assert!(rrect_contains_point(&rr, Point::new(10.0, 10.0)));
        assert!(!rrect_contains_point(&rr, Point::new(1.0, 1.0)));
        assert!(!rrect_contains_point(&rr, Point::new(101.0, 50.0)));
    }

    #[test]
    fn rrect_intersect_shared_edges() {
        let a = RoundedRect::new(0.0, 0.0, 100.0, 100.0, 10.0);
        let b = RoundedRect::new(0.0, 0.0, 100.0, 100.0, 20.0);
        let joined = rrect_conservative_intersect(&a, &b).unwrap();
        assert_eq!(joined.rect(), Rect::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(joined.radii().top_left, 20.0);
    }

    #[test]
    fn rrect_intersect_with_rect_inside() {
        let a = RoundedRect::new(0.0, 0.0, 100.0, 100.0, 10.0);
        let b = RoundedRect::from_rect(Rect::new(20.0, 20.0, 200.0, 200.0), 0.0);
        let joined = rrect_conservative_intersect(&a, &b).unwrap();
        assert_eq!(joined.rect(), Rect::new(20.0, 20.0, 100.0, 100.0));
        let radii = joined.radii();
        assert_eq!(radii.top_left, 0.0);
        assert_eq!(radii.top_right, 0.0);
        assert_eq!(radii.bottom_right, 10.0);
        assert_eq!(radii.bottom_left, 0.0);
    }

    #[test]
    fn rrect_intersect_rejects_cut_corners() {
        // The rect corner at (5, 5) is outside of `a`'s rounded corner.
        let a = RoundedRect::new(0.0, 0.0, 100.0, 100.0, 20.0);
        let b = RoundedRect::from_rect(Rect::new(-10.0, 5.0, 50.0, 50.0), 0.0);
        assert!(rrect_conservative_intersect(&a, &b).is_none());
        // Disjoint
        let c = RoundedRect::new(200.0, 200.0, 300.0, 300.0, 5.0);
        assert!(rrect_conservative_intersect(&a, &c).is_none());
    }

    #[test]
    fn rrect_inner_bounds_is_contained() {
        let rr = RoundedRect::new(0.0, 0.0, 200.0, 50.0, 10.0);
        let inner = rrect_inner_bounds(&rr);
        assert!(!rect_is_empty(&inner));
        for p in corners(&inner) {
            assert!(rrect_contains_point(&rr, p), "{p:?} not inside");
        }
        // Wide rrect cuts off left and right.
        assert_eq!(inner, Rect::new(10.0, 0.0, 190.0, 50.0));

        // A square cuts every corner at its 45 degree point instead.
        let square = rrect_inner_bounds(&RoundedRect::new(0.0, 0.0, 100.0, 100.0, 10.0));
        assert!(square.x0 > 2.9 && square.x0 < 3.0, "{square:?}");
    }

    #[test]
    fn rrect_flip_swaps_corners() {
        let rr = RoundedRect::from_rect(
            Rect::new(0.0, 0.0, 10.0, 10.0),
            RoundedRectRadii::new(1.0, 2.0, 3.0, 4.0),
        );
        let flipped = transform_rrect(&rr, &Affine::new([-2.0, 0.0, 0.0, 2.0, 0.0, 0.0])).unwrap();
        assert_eq!(flipped.rect(), Rect::new(-20.0, 0.0, 0.0, 20.0));
        assert_eq!(flipped.radii(), RoundedRectRadii::new(4.0, 2.0, 8.0, 6.0));
        assert!(transform_rrect(&rr, &Affine::scale_non_uniform(2.0, 3.0)).is_none());
    }

    #[test]
    fn convex_path_contains_rect() {
        let shape = Shape::Path(ClipPath::new(octagon(), Fill::NonZero));
        assert!(shape.conservative_contains_rect(&Rect::new(20.0, 20.0, 80.0, 80.0)));
        assert!(!shape.conservative_contains_rect(&Rect::new(0.0, 0.0, 10.0, 10.0)));
    }
}
