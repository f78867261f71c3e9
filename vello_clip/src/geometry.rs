// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Integer device rectangles and the pixel-snapping rules shared by the clip stack.

use crate::kurbo::{Affine, Rect};

/// Slack applied when deciding whether float geometry lands on, or is inside, a pixel boundary.
pub const BOUNDS_TOLERANCE: f64 = 1e-3;

/// Bias applied before rounding non-antialiased edges to the nearest pixel.
///
/// Non-AA rasterization samples pixel centers, so an edge sitting almost exactly on a half pixel
/// could snap either way depending on the hardware.
pub const HALF_PIXEL_ROUNDING_TOLERANCE: f64 = 5e-2;

/// Transforms with a determinant smaller than this are treated as singular.
pub(crate) const NEARLY_ZERO_DETERMINANT: f64 = 1.0 / (4096.0 * 4096.0 * 4096.0);

/// A half-open rectangle in integer device coordinates.
///
/// A rectangle whose minimum edge is not strictly less than its maximum edge is empty.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct IRect {
    /// The minimum x coordinate.
    pub x0: i32,
    /// The minimum y coordinate.
    pub y0: i32,
    /// The maximum x coordinate (exclusive).
    pub x1: i32,
    /// The maximum y coordinate (exclusive).
    pub y1: i32,
}

impl IRect {
    /// The canonical empty rectangle.
    pub const EMPTY: Self = Self::new(0, 0, 0, 0);

    /// Create a new rectangle from its edges.
    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Create a rectangle with its origin at `(0, 0)`.
    pub const fn from_size(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// The width of the rectangle, which is negative for malformed rectangles.
    pub fn width(&self) -> i32 {
        self.x1 - self.x0
    }

    /// The height of the rectangle, which is negative for malformed rectangles.
    pub fn height(&self) -> i32 {
        self.y1 - self.y0
    }

    /// The area of the rectangle, or zero if it is empty.
    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            i64::from(self.width()) * i64::from(self.height())
        }
    }

    /// Whether the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    /// Whether `other` lies entirely within `self`.
    ///
    /// Always false if either rectangle is empty.
    pub fn contains(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x0 <= other.x0
            && self.y0 <= other.y0
            && self.x1 >= other.x1
            && self.y1 >= other.y1
    }

    /// Whether the two rectangles share at least one pixel.
    ///
    /// Rectangles that only touch along an edge do not intersect.
    pub fn intersects(&self, other: &Self) -> bool {
        self.x0.max(other.x0) < self.x1.min(other.x1)
            && self.y0.max(other.y0) < self.y1.min(other.y1)
    }

    /// The intersection of the two rectangles, or `None` if they do not intersect.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let r = Self::new(
            self.x0.max(other.x0),
            self.y0.max(other.y0),
            self.x1.min(other.x1),
            self.y1.min(other.y1),
        );
        (!r.is_empty()).then_some(r)
    }

    /// The intersection of the two rectangles, or [`IRect::EMPTY`].
    pub fn intersect_or_empty(&self, other: &Self) -> Self {
        self.intersect(other).unwrap_or(Self::EMPTY)
    }

    /// The smallest rectangle containing both rectangles. Empty rectangles are ignored.
    pub fn union(&self, other: &Self) -> Self {
        if other.is_empty() {
            *self
        } else if self.is_empty() {
            *other
        } else {
            Self::new(
                self.x0.min(other.x0),
                self.y0.min(other.y0),
                self.x1.max(other.x1),
                self.y1.max(other.y1),
            )
        }
    }

    /// Translate the rectangle.
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x0 + dx, self.y0 + dy, self.x1 + dx, self.y1 + dy)
    }

    /// Whether the pixel whose top-left corner is `(x, y)` lies within the rectangle.
    pub fn contains_pixel(&self, x: i32, y: i32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    /// Convert to a floating point rectangle.
    pub fn to_rect(&self) -> Rect {
        Rect::new(
            f64::from(self.x0),
            f64::from(self.y0),
            f64::from(self.x1),
            f64::from(self.y1),
        )
    }

    /// Round each edge of `rect` to the nearest integer.
    pub fn round(rect: Rect) -> Self {
        Self::new(
            round_to_int(rect.x0),
            round_to_int(rect.y0),
            round_to_int(rect.x1),
            round_to_int(rect.y1),
        )
    }

    /// The smallest integer rectangle containing `rect`.
    pub fn round_out(rect: Rect) -> Self {
        Self::new(
            saturate(rect.x0.floor()),
            saturate(rect.y0.floor()),
            saturate(rect.x1.ceil()),
            saturate(rect.y1.ceil()),
        )
    }
}

/// Which direction [`pixel_bounds`] should round towards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundsType {
    /// Every pixel the geometry might touch.
    Exterior,
    /// Only the pixels the geometry fully covers.
    Interior,
}

/// Round `v` half-up and clamp it into `i32`.
pub(crate) fn round_to_int(v: f64) -> i32 {
    saturate((v + 0.5).floor())
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "values are clamped into the i32 range first"
)]
fn saturate(v: f64) -> i32 {
    if v.is_nan() {
        0
    } else {
        v.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
    }
}

/// Whether a float rectangle has no area (also true for NaN edges).
pub(crate) fn rect_is_empty(r: &Rect) -> bool {
    !(r.x0 < r.x1 && r.y0 < r.y1)
}

/// Whether `inner` lies within `outer`, treating both as closed sets.
pub(crate) fn rect_contains_rect(outer: &Rect, inner: &Rect) -> bool {
    !rect_is_empty(outer)
        && !rect_is_empty(inner)
        && outer.x0 <= inner.x0
        && outer.y0 <= inner.y0
        && outer.x1 >= inner.x1
        && outer.y1 >= inner.y1
}

/// The intersection of two float rectangles, or `None` when it has no area.
pub(crate) fn rect_intersect(a: &Rect, b: &Rect) -> Option<Rect> {
    let r = Rect::new(a.x0.max(b.x0), a.y0.max(b.y0), a.x1.min(b.x1), a.y1.min(b.y1));
    (!rect_is_empty(&r)).then_some(r)
}

/// Whether the transform maps axis-aligned rectangles to axis-aligned rectangles.
pub(crate) fn preserves_axis_alignment(transform: &Affine) -> bool {
    let [a, b, c, d, _, _] = transform.as_coeffs();
    (b == 0.0 && c == 0.0 && a != 0.0 && d != 0.0) || (a == 0.0 && d == 0.0 && b != 0.0 && c != 0.0)
}

/// Whether the transform is a pure scale and translate.
pub(crate) fn is_scale_translate(transform: &Affine) -> bool {
    let [_, b, c, _, _, _] = transform.as_coeffs();
    b == 0.0 && c == 0.0
}

/// The inverse of `transform`, or `None` if it is too close to singular.
pub(crate) fn invert(transform: &Affine) -> Option<Affine> {
    let det = transform.determinant();
    (det.is_finite() && det.abs() > NEARLY_ZERO_DETERMINANT).then(|| transform.inverse())
}

/// Snap float device bounds to integer pixel bounds.
///
/// Antialiased geometry rounds outwards (or inwards, for [`BoundsType::Interior`]), while
/// non-antialiased geometry rounds to the nearest pixel edge with a small bias, since only pixels
/// whose centers are covered get drawn.
pub fn pixel_bounds(bounds: Rect, aa: bool, kind: BoundsType) -> IRect {
    if rect_is_empty(&bounds) {
        return IRect::EMPTY;
    }
    let round_low = |v: f64| {
        let v = v + BOUNDS_TOLERANCE;
        if aa {
            saturate(v.floor())
        } else {
            round_to_int(v - HALF_PIXEL_ROUNDING_TOLERANCE)
        }
    };
    let round_high = |v: f64| {
        let v = v - BOUNDS_TOLERANCE;
        if aa {
            saturate(v.ceil())
        } else {
            round_to_int(v + HALF_PIXEL_ROUNDING_TOLERANCE)
        }
    };
    let r = match kind {
        BoundsType::Exterior => IRect::new(
            round_low(bounds.x0),
            round_low(bounds.y0),
            round_high(bounds.x1),
            round_high(bounds.y1),
        ),
        BoundsType::Interior => IRect::new(
            round_high(bounds.x0),
            round_high(bounds.y0),
            round_low(bounds.x1),
            round_low(bounds.y1),
        ),
    };
    if r.is_empty() {
        IRect::EMPTY
    } else {
        r
    }
}

/// Whether every edge of `rect` is within [`BOUNDS_TOLERANCE`] of a pixel boundary.
pub fn is_pixel_aligned(rect: &Rect) -> bool {
    [rect.x0, rect.y0, rect.x1, rect.y1]
        .into_iter()
        .all(|v| (v.round() - v).abs() <= BOUNDS_TOLERANCE)
}

/// Whether a scissor of `inner` would have no effect on a draw covering `draw`.
pub fn is_inside_clip(inner: &IRect, draw: &Rect) -> bool {
    let (x0, y0) = (f64::from(inner.x0), f64::from(inner.y0));
    let (x1, y1) = (f64::from(inner.x1), f64::from(inner.y1));
    x1 > x0 + BOUNDS_TOLERANCE
        && y1 > y0 + BOUNDS_TOLERANCE
        && x0 < draw.x0 + BOUNDS_TOLERANCE
        && y0 < draw.y0 + BOUNDS_TOLERANCE
        && x1 > draw.x1 - BOUNDS_TOLERANCE
        && y1 > draw.y1 - BOUNDS_TOLERANCE
}

/// Compute the largest rectangle of `a` that does not overlap `b`.
///
/// Returns the rectangle and whether it is exactly `a - b`.
fn subtract_rects(a: &IRect, b: &IRect) -> (IRect, bool) {
    if a.is_empty() || b.is_empty() || !a.intersects(b) {
        return (*a, true);
    }

    let width = f64::from(a.width());
    let height = f64::from(a.height());
    let mut positive = 0;
    let (mut left, mut right, mut top, mut bottom) = (0.0, 0.0, 0.0, 0.0);
    if b.x0 > a.x0 {
        left = f64::from(b.x0 - a.x0) / width;
        positive += 1;
    }
    if a.x1 > b.x1 {
        right = f64::from(a.x1 - b.x1) / width;
        positive += 1;
    }
    if b.y0 > a.y0 {
        top = f64::from(b.y0 - a.y0) / height;
        positive += 1;
    }
    if a.y1 > b.y1 {
        bottom = f64::from(a.y1 - b.y1) / height;
        positive += 1;
    }

    if positive == 0 {
        // b covers all of a
        return (IRect::EMPTY, true);
    }

    let mut largest = *a;
    if left > right && left > top && left > bottom {
        largest.x1 = b.x0;
    } else if right > top && right > bottom {
        largest.x0 = b.x1;
    } else if top > bottom {
        largest.y1 = b.y0;
    } else {
        largest.y0 = b.y1;
    }
    (largest, positive == 1)
}

/// Subtract `b` from `a`.
///
/// When `a - b` is not a rectangle, an `exact` subtraction returns `a` unchanged, while an inexact
/// subtraction returns the largest piece of `a` outside of `b`.
pub fn subtract(a: &IRect, b: &IRect, exact: bool) -> IRect {
    let (diff, is_exact) = subtract_rects(a, b);
    if is_exact || !exact {
        diff
    } else {
        *a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_rects_do_not_intersect() {
        let a = IRect::new(0, 0, 10, 10);
        let b = IRect::new(10, 0, 20, 10);
        assert!(!a.intersects(&b));
        assert_eq!(a.intersect(&b), None);
        assert!(a.intersects(&IRect::new(9, 9, 20, 20)));
    }

    #[test]
    fn empty_rects_contain_nothing() {
        let a = IRect::new(0, 0, 10, 10);
        assert!(a.contains(&IRect::new(2, 2, 8, 8)));
        assert!(!a.contains(&IRect::EMPTY));
        assert!(!IRect::EMPTY.contains(&IRect::EMPTY));
    }

    #[test]
    fn exterior_bounds_aa() {
        let r = Rect::new(10.2, 10.7, 20.4, 30.0);
        assert_eq!(
            pixel_bounds(r, true, BoundsType::Exterior),
            IRect::new(10, 10, 21, 30)
        );
        assert_eq!(
            pixel_bounds(r, true, BoundsType::Interior),
            IRect::new(11, 11, 20, 30)
        );
    }

    #[test]
    fn exterior_bounds_non_aa_round_to_centers() {
        let r = Rect::new(10.2, 10.7, 20.4, 30.6);
        assert_eq!(
            pixel_bounds(r, false, BoundsType::Exterior),
            IRect::new(10, 11, 20, 31)
        );
    }

    #[test]
    fn tolerance_absorbs_float_noise() {
        let r = Rect::new(9.9999, 10.0001, 20.0001, 19.9999);
        assert_eq!(
            pixel_bounds(r, true, BoundsType::Exterior),
            IRect::new(10, 10, 20, 20)
        );
        assert!(is_pixel_aligned(&r));
        assert!(!is_pixel_aligned(&Rect::new(10.5, 10.0, 20.0, 20.0)));
    }

    #[test]
    fn tiny_interior_is_empty() {
        let r = Rect::new(10.2, 10.2, 10.8, 10.8);
        assert!(pixel_bounds(r, true, BoundsType::Interior).is_empty());
        assert!(pixel_bounds(Rect::new(5.0, 5.0, 5.0, 9.0), true, BoundsType::Exterior).is_empty());
    }

    #[test]
    fn subtract_single_edge_is_exact() {
        let a = IRect::new(0, 0, 100, 100);
        let b = IRect::new(50, -10, 120, 110);
        assert_eq!(subtract(&a, &b, true), IRect::new(0, 0, 50, 100));
    }

    #[test]
    fn subtract_inexact() {
        let a = IRect::new(0, 0, 100, 100);
        let b = IRect::new(60, 10, 90, 90);
        // Not a rectangle, so the exact version keeps `a`.
        assert_eq!(subtract(&a, &b, true), a);
        assert_eq!(subtract(&a, &b, false), IRect::new(0, 0, 60, 100));
    }

    #[test]
    fn subtract_covering_and_disjoint() {
        let a = IRect::new(10, 10, 20, 20);
        assert!(subtract(&a, &IRect::new(0, 0, 30, 30), true).is_empty());
        let far = IRect::new(40, 40, 50, 50);
        assert_eq!(subtract(&a, &far, true), a);
    }

    #[test]
    fn inside_clip_with_tolerance() {
        let scissor = IRect::new(0, 0, 10, 10);
        assert!(is_inside_clip(&scissor, &Rect::new(0.0, 0.0, 10.0, 10.0)));
        assert!(is_inside_clip(&scissor, &Rect::new(-0.0005, 1.0, 10.0005, 9.0)));
        assert!(!is_inside_clip(&scissor, &Rect::new(-1.0, 0.0, 10.0, 10.0)));
        assert!(!is_inside_clip(&IRect::EMPTY, &Rect::new(0.0, 0.0, 0.0, 0.0)));
    }
}
