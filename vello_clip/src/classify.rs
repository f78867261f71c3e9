// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bounds-only reasoning about how two clip regions combine.

use crate::geometry::IRect;

/// How a clip element combines with the clip beneath it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ClipOp {
    /// Keep only the content inside the shape.
    #[default]
    Intersect,
    /// Remove the content inside the shape.
    Difference,
}

impl ClipOp {
    /// The op that keeps the opposite side of a shape.
    pub fn inverse(self) -> Self {
        match self {
            Self::Intersect => Self::Difference,
            Self::Difference => Self::Intersect,
        }
    }
}

/// The simplified form of combining two clip regions `A` and `B`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClipGeometry {
    /// The combination covers nothing.
    Empty,
    /// The combination is exactly `A`.
    AOnly,
    /// The combination is exactly `B`.
    BOnly,
    /// Both regions are needed to describe the combination.
    Both,
}

/// Something that can take part in [`classify`].
pub trait ClipBounds {
    /// How this region combines with what's below it.
    fn op(&self) -> ClipOp;
    /// Device pixels outside of these bounds are unaffected by the region's shape.
    fn outer_bounds(&self) -> IRect;
}

/// Conservative containment between two clip-like regions.
///
/// `a.contains(b)` means the region `a` fully covers the shape of `b` (not its op), so a false
/// answer is always safe.
pub trait Contains<T: ?Sized> {
    /// Whether `other` is certainly covered.
    fn contains(&self, other: &T) -> bool;
}

/// Determine how `a` and `b` combine, using only their bounds and containment tests.
///
/// Any answer other than [`ClipGeometry::Both`] is exact; `Both` is always a safe fallback.
/// Note that rectangles touching only at an edge are considered disjoint.
pub fn classify<A, B>(a: &A, b: &B) -> ClipGeometry
where
    A: ClipBounds + Contains<B>,
    B: ClipBounds + Contains<A>,
{
    match (a.op(), b.op()) {
        (ClipOp::Intersect, ClipOp::Intersect) => {
            if !a.outer_bounds().intersects(&b.outer_bounds()) {
                ClipGeometry::Empty
            } else if b.contains(a) {
                ClipGeometry::AOnly
            } else if a.contains(b) {
                ClipGeometry::BOnly
            } else {
                ClipGeometry::Both
            }
        }
        (ClipOp::Intersect, ClipOp::Difference) => {
            if !a.outer_bounds().intersects(&b.outer_bounds()) {
                // A only overlaps the part of B that keeps coverage.
                ClipGeometry::AOnly
            } else if b.contains(a) {
                ClipGeometry::Empty
            } else {
                ClipGeometry::Both
            }
        }
        (ClipOp::Difference, ClipOp::Intersect) => {
            if !b.outer_bounds().intersects(&a.outer_bounds()) {
                ClipGeometry::BOnly
            } else if a.contains(b) {
                ClipGeometry::Empty
            } else {
                ClipGeometry::Both
            }
        }
        (ClipOp::Difference, ClipOp::Difference) => {
            if a.contains(b) {
                ClipGeometry::AOnly
            } else if b.contains(a) {
                ClipGeometry::BOnly
            } else {
                ClipGeometry::Both
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A rectangular region whose shape is exactly its bounds.
    #[derive(Debug)]
    struct Region {
        rect: IRect,
        op: ClipOp,
    }

    impl ClipBounds for Region {
        fn op(&self) -> ClipOp {
            self.op
        }

        fn outer_bounds(&self) -> IRect {
            self.rect
        }
    }

    impl Contains<Self> for Region {
        fn contains(&self, other: &Self) -> bool {
            self.rect.contains(&other.rect)
        }
    }

    impl Region {
        fn covers(&self, x: i32, y: i32) -> bool {
            self.rect.contains_pixel(x, y) == (self.op == ClipOp::Intersect)
        }
    }

    fn region(x0: i32, y0: i32, x1: i32, y1: i32, op: ClipOp) -> Region {
        Region {
            rect: IRect::new(x0, y0, x1, y1),
            op,
        }
    }

    #[test]
    fn op_pairs() {
        use ClipOp::{Difference as D, Intersect as I};
        let big = |op| region(0, 0, 10, 10, op);
        let small = |op| region(2, 2, 8, 8, op);
        let far = |op| region(20, 20, 30, 30, op);

        assert_eq!(classify(&big(I), &small(I)), ClipGeometry::BOnly);
        assert_eq!(classify(&small(I), &big(I)), ClipGeometry::AOnly);
        assert_eq!(classify(&big(I), &far(I)), ClipGeometry::Empty);
        assert_eq!(classify(&big(I), &far(D)), ClipGeometry::AOnly);
        assert_eq!(classify(&small(I), &big(D)), ClipGeometry::Empty);
        assert_eq!(classify(&big(I), &small(D)), ClipGeometry::Both);
        assert_eq!(classify(&far(D), &big(I)), ClipGeometry::BOnly);
        assert_eq!(classify(&big(D), &small(I)), ClipGeometry::Empty);
        assert_eq!(classify(&big(D), &small(D)), ClipGeometry::AOnly);
        assert_eq!(classify(&small(D), &big(D)), ClipGeometry::BOnly);
    }

    #[test]
    fn touching_edges_are_disjoint() {
        let a = region(0, 0, 10, 10, ClipOp::Intersect);
        let b = region(10, 0, 20, 10, ClipOp::Intersect);
        assert_eq!(classify(&a, &b), ClipGeometry::Empty);
    }

    /// Every simplification must agree with the pixel-by-pixel combination.
    #[test]
    fn brute_force_soundness() {
        let rects = [
            (0, 0, 8, 8),
            (2, 2, 6, 6),
            (4, 0, 12, 8),
            (8, 0, 12, 4),
            (0, 4, 4, 12),
            (1, 1, 7, 3),
            (9, 9, 12, 12),
        ];
        let ops = [ClipOp::Intersect, ClipOp::Difference];
        for &(ax0, ay0, ax1, ay1) in &rects {
            for &(bx0, by0, bx1, by1) in &rects {
                for a_op in ops {
                    for b_op in ops {
                        let a = region(ax0, ay0, ax1, ay1, a_op);
                        let b = region(bx0, by0, bx1, by1, b_op);
                        let result = classify(&a, &b);
                        for y in -2..14 {
                            for x in -2..14 {
                                let both = a.covers(x, y) && b.covers(x, y);
                                let expected = match result {
                                    ClipGeometry::Empty => false,
                                    ClipGeometry::AOnly => a.covers(x, y),
                                    ClipGeometry::BOnly => b.covers(x, y),
                                    ClipGeometry::Both => both,
                                };
                                assert_eq!(
                                    both, expected,
                                    "{a:?} + {b:?} classified as {result:?} disagrees at ({x}, {y})"
                                );
                            }
                        }
                    }
                }
            }
        }
    }
}
