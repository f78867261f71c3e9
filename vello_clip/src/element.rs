// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Clip elements and their conservative device-space bounds.

use crate::classify::{classify, ClipBounds, ClipGeometry, ClipOp, Contains};
use crate::frame::{ClipState, SaveFrame};
use crate::geometry::{
    invert, is_pixel_aligned, pixel_bounds, preserves_axis_alignment, rect_intersect,
    BoundsType, IRect, BOUNDS_TOLERANCE,
};
use crate::kurbo::{Affine, Point, Rect, RoundedRect};
use crate::shape::{
    corners, rrect_conservative_intersect, rrect_inner_bounds, transform_rrect, Shape,
};

/// A single clip operation as recorded on the stack.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipElement {
    /// The clip geometry, in local coordinates.
    pub shape: Shape,
    /// Maps the shape's local coordinates to device pixels.
    pub local_to_device: Affine,
    /// How the shape combines with the clip beneath it.
    pub op: ClipOp,
    /// Whether the shape's edges are antialiased.
    pub anti_alias: bool,
}

/// A clip element along with everything the stack tracks about it.
#[derive(Clone, Debug)]
pub(crate) struct RawElement {
    element: ClipElement,
    device_to_local: Affine,
    /// Device pixels fully covered by the shape.
    inner: IRect,
    /// Device pixels possibly touched by the shape.
    outer: IRect,
    /// The first element index of the save frame that invalidated this element.
    invalidated_by: Option<usize>,
}

impl RawElement {
    pub(crate) fn new(local_to_device: Affine, shape: Shape, anti_alias: bool, op: ClipOp) -> Self {
        let (shape, device_to_local) = match invert(&local_to_device) {
            Some(inverse) => (shape, inverse),
            // A singular transform collapses the shape to a line or a point.
            None => (Shape::Empty, Affine::IDENTITY),
        };
        Self {
            element: ClipElement {
                shape,
                local_to_device,
                op,
                anti_alias,
            },
            device_to_local,
            inner: IRect::EMPTY,
            outer: IRect::EMPTY,
            invalidated_by: None,
        }
    }

    pub(crate) fn element(&self) -> &ClipElement {
        &self.element
    }

    pub(crate) fn shape(&self) -> &Shape {
        &self.element.shape
    }

    pub(crate) fn anti_alias(&self) -> bool {
        self.element.anti_alias
    }

    pub(crate) fn inner_bounds(&self) -> IRect {
        self.inner
    }

    pub(crate) fn is_invalid(&self) -> bool {
        self.invalidated_by.is_some()
    }

    pub(crate) fn mark_invalid(&mut self, frame_start: usize) {
        debug_assert!(!self.is_invalid(), "element invalidated twice");
        self.invalidated_by = Some(frame_start);
    }

    /// Revive the element if the frame that invalidated it has been popped.
    pub(crate) fn restore_valid(&mut self, frame_start: usize) {
        if self.invalidated_by.is_some_and(|by| frame_start < by) {
            self.invalidated_by = None;
        }
    }

    /// Normalize the element and compute its device-space bounds.
    pub(crate) fn simplify(&mut self, device_bounds: &IRect, force_aa: bool) {
        let element = &mut self.element;
        if let Shape::Path(path) = &mut element.shape {
            if path.is_inverted() {
                path.set_inverted(false);
                element.op = element.op.inverse();
            }
        }

        element.shape.simplify();
        if element.shape.is_empty() {
            return;
        }

        let device_rect = device_bounds.to_rect();
        let Some(outer) = rect_intersect(
            &element.local_to_device.transform_rect_bbox(element.shape.bounds()),
            &device_rect,
        ) else {
            // Offscreen
            element.shape = Shape::Empty;
            return;
        };

        let axis_aligned = preserves_axis_alignment(&element.local_to_device);
        // Non-AA axis-aligned rects stay as they are so they can be handled by a scissor.
        if force_aa && !(matches!(element.shape, Shape::Rect(_)) && axis_aligned) {
            element.anti_alias = true;
        }
        let aa = element.anti_alias;

        self.outer = pixel_bounds(outer, aa, BoundsType::Exterior);

        if axis_aligned {
            match &element.shape {
                Shape::Rect(_) => {
                    element.shape = Shape::Rect(outer);
                    element.local_to_device = Affine::IDENTITY;
                    self.device_to_local = Affine::IDENTITY;

                    if !aa && outer.width() >= 1.0 && outer.height() >= 1.0 {
                        // Snap so the rect can be applied purely with a scissor.
                        self.outer = IRect::round(outer);
                        self.inner = self.outer;
                    } else {
                        self.inner = pixel_bounds(outer, aa, BoundsType::Interior);
                    }
                }
                Shape::RRect(rrect) => {
                    if let Some(device_rrect) = transform_rrect(rrect, &element.local_to_device) {
                        self.inner = pixel_bounds(
                            rrect_inner_bounds(&device_rrect),
                            aa,
                            BoundsType::Interior,
                        )
                        .intersect_or_empty(device_bounds);
                        element.shape = Shape::RRect(device_rrect);
                        element.local_to_device = Affine::IDENTITY;
                        self.device_to_local = Affine::IDENTITY;
                    }
                }
                Shape::Empty | Shape::Path(_) => {}
            }
        }

        if self.outer.is_empty() {
            // Sub-pixel non-AA shapes that miss every pixel center.
            self.element.shape = Shape::Empty;
            self.inner = IRect::EMPTY;
        }

        debug_assert!(
            self.element.shape.is_empty()
                || (!self.outer.is_empty() && device_bounds.contains(&self.outer)),
            "outer bounds must be non-empty and on the device"
        );
        debug_assert!(
            self.element.shape.is_empty()
                || self.inner.is_empty()
                || self.outer.contains(&self.inner),
            "inner bounds must be inside the outer bounds"
        );
    }

    /// Try to fold `other` into this element so that `other` becomes redundant.
    ///
    /// Only intersections of two rects, or of a rect and a rounded rect, are combined. Returns
    /// whether `self` now represents both elements.
    pub(crate) fn combine(&mut self, other: &Self, frame_start: usize) -> bool {
        if self.element.op != ClipOp::Intersect || other.element.op != ClipOp::Intersect {
            return false;
        }

        let mut shape_updated = false;
        match (&self.element.shape, &other.element.shape) {
            (Shape::Rect(a), Shape::Rect(b)) => {
                let (a, b) = (*a, *b);
                let mut aa_match = self.element.anti_alias == other.element.anti_alias;
                if !aa_match
                    && self.element.local_to_device == Affine::IDENTITY
                    && other.element.local_to_device == Affine::IDENTITY
                {
                    if is_pixel_aligned(&a) {
                        // Our edges are on pixel boundaries, so AA doesn't matter for us, but it
                        // might for the other rect.
                        self.element.anti_alias = other.element.anti_alias;
                    } else if !is_pixel_aligned(&b) {
                        return false;
                    }
                    aa_match = true;
                }

                if aa_match && self.element.local_to_device == other.element.local_to_device {
                    let Some(joined) = rect_intersect(&a, &b) else {
                        self.element.shape = Shape::Empty;
                        self.mark_invalid(frame_start);
                        return true;
                    };
                    self.element.shape = Shape::Rect(joined);
                    shape_updated = true;
                }
            }
            (Shape::Rect(_) | Shape::RRect(_), Shape::Rect(_) | Shape::RRect(_)) => {
                if self.element.anti_alias == other.element.anti_alias
                    && self.element.local_to_device == other.element.local_to_device
                {
                    let a = as_rrect(&self.element.shape);
                    let b = as_rrect(&other.element.shape);
                    if let Some(joined) = rrect_conservative_intersect(&a, &b) {
                        let mut shape = Shape::RRect(joined);
                        // All corners could have lost their radii.
                        shape.simplify();
                        self.element.shape = shape;
                        shape_updated = true;
                    } else if rect_intersect(&a.rect(), &b.rect()).is_none() {
                        self.element.shape = Shape::Empty;
                        self.mark_invalid(frame_start);
                        return true;
                    }
                }
            }
            _ => {}
        }

        if shape_updated {
            debug_assert!(
                self.outer.intersects(&other.outer),
                "combined elements must overlap"
            );
            self.outer = self.outer.intersect_or_empty(&other.outer);
            self.inner = self.inner.intersect_or_empty(&other.inner);
        }
        shape_updated
    }

    /// Update this element, and the newly `added` one, so that redundant elements are
    /// invalidated.
    pub(crate) fn update_for_element(&mut self, added: &mut Self, frame_start: usize) {
        if self.is_invalid() {
            return;
        }
        match classify(&*self, &*added) {
            ClipGeometry::Empty => {
                self.mark_invalid(frame_start);
                added.mark_invalid(frame_start);
            }
            ClipGeometry::AOnly => added.mark_invalid(frame_start),
            ClipGeometry::BOnly => self.mark_invalid(frame_start),
            ClipGeometry::Both => {
                if added.combine(self, frame_start) {
                    self.mark_invalid(frame_start);
                }
            }
        }
    }

    /// The simplest state a frame holding only this element could be in.
    pub(crate) fn clip_type(&self) -> ClipState {
        let device_intersect = self.element.op == ClipOp::Intersect
            && self.element.local_to_device == Affine::IDENTITY;
        match self.element.shape {
            Shape::Empty => ClipState::Empty,
            Shape::Rect(_) if device_intersect => ClipState::DeviceRect,
            Shape::RRect(_) if device_intersect => ClipState::DeviceRRect,
            _ => ClipState::Complex,
        }
    }
}

fn as_rrect(shape: &Shape) -> RoundedRect {
    match shape {
        Shape::RRect(rr) => *rr,
        other => RoundedRect::from_rect(other.bounds(), 0.0),
    }
}

/// Whether shape `a` certainly covers the rect `b`, where each lives in its own local space.
///
/// When the AA modes differ, `b` is outset by half a pixel in device space so that a non-AA edge
/// snapping outwards can't escape an AA shape.
fn shape_contains_rect(
    a: &Shape,
    a_to_device: &Affine,
    device_to_a: &Affine,
    b: &Rect,
    b_to_device: &Affine,
    mixed_aa: bool,
) -> bool {
    if !a.is_convex() {
        return false;
    }

    if !mixed_aa && a_to_device == b_to_device {
        return a.conservative_contains_rect(b);
    }
    if *b_to_device == Affine::IDENTITY && preserves_axis_alignment(a_to_device) {
        let b = if mixed_aa { b.inflate(0.5, 0.5) } else { *b };
        return a.conservative_contains_rect(&device_to_a.transform_rect_bbox(b));
    }

    // Since `a` is convex, containing every corner of `b` means containing all of it.
    let device_corners = corners(b).map(|p| *b_to_device * p);
    let device_corners = if mixed_aa {
        let bounds = device_corners
            .iter()
            .skip(1)
            .fold(Rect::from_points(device_corners[0], device_corners[0]), |r, p| {
                r.union_pt(*p)
            });
        corners(&bounds.inflate(0.5, 0.5))
    } else {
        device_corners
    };
    device_corners
        .into_iter()
        .all(|p: Point| a.conservative_contains_point(*device_to_a * p))
}

impl ClipBounds for RawElement {
    fn op(&self) -> ClipOp {
        self.element.op
    }

    fn outer_bounds(&self) -> IRect {
        self.outer
    }
}

impl Contains<Draw> for RawElement {
    fn contains(&self, draw: &Draw) -> bool {
        if self.inner.contains(&draw.outer) {
            return true;
        }
        // Non-AA draws have already been snapped, so test the pixels they will touch.
        let query = if draw.anti_alias {
            draw.original_bounds
        } else {
            draw.outer.to_rect()
        };
        shape_contains_rect(
            &self.element.shape,
            &self.element.local_to_device,
            &self.device_to_local,
            &query,
            &Affine::IDENTITY,
            false,
        )
    }
}

impl Contains<SaveFrame> for RawElement {
    fn contains(&self, frame: &SaveFrame) -> bool {
        let frame_outer = frame.outer_bounds();
        self.inner.contains(&frame_outer)
            || shape_contains_rect(
                &self.element.shape,
                &self.element.local_to_device,
                &self.device_to_local,
                &frame_outer.to_rect(),
                &Affine::IDENTITY,
                false,
            )
    }
}

impl Contains<Self> for RawElement {
    fn contains(&self, other: &Self) -> bool {
        if self.inner.contains(&other.outer) {
            return true;
        }

        let mixed_aa = self.element.anti_alias != other.element.anti_alias;
        if !mixed_aa && self.element.local_to_device == other.element.local_to_device {
            match (&self.element.shape, &other.element.shape) {
                // `a` contains `b` when intersecting them leaves `b` unchanged.
                (Shape::RRect(a), Shape::RRect(b)) => {
                    return rrect_conservative_intersect(a, b).as_ref() == Some(b);
                }
                (Shape::Path(a), Shape::Path(b)) => return a.same_geometry(b),
                _ => {}
            }
        }

        shape_contains_rect(
            &self.element.shape,
            &self.element.local_to_device,
            &self.device_to_local,
            &other.element.shape.bounds(),
            &other.element.local_to_device,
            mixed_aa,
        )
    }
}

/// The bounds of a pending draw, used as the second operand when testing whether a clip applies.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Draw {
    /// The draw bounds, shrunk slightly so that draws are more easily considered inside a clip.
    original_bounds: Rect,
    outer: IRect,
    anti_alias: bool,
}

impl Draw {
    pub(crate) fn new(bounds: Rect, anti_alias: bool) -> Self {
        let inset = Rect::new(
            bounds.x0 + BOUNDS_TOLERANCE,
            bounds.y0 + BOUNDS_TOLERANCE,
            bounds.x1 - BOUNDS_TOLERANCE,
            bounds.y1 - BOUNDS_TOLERANCE,
        );
        let original_bounds = if crate::geometry::rect_is_empty(&inset) {
            bounds
        } else {
            inset
        };
        Self {
            original_bounds,
            outer: pixel_bounds(bounds, anti_alias, BoundsType::Exterior),
            anti_alias,
        }
    }

    /// Clip the draw to the device, returning false if nothing remains.
    pub(crate) fn apply_device_bounds(&mut self, device_bounds: &IRect) -> bool {
        match self.outer.intersect(device_bounds) {
            Some(outer) => {
                self.outer = outer;
                true
            }
            None => false,
        }
    }
}

impl ClipBounds for Draw {
    fn op(&self) -> ClipOp {
        ClipOp::Intersect
    }

    fn outer_bounds(&self) -> IRect {
        self.outer
    }
}

// Draws have no inner bounds, so they never contain anything.
impl Contains<RawElement> for Draw {
    fn contains(&self, _: &RawElement) -> bool {
        false
    }
}

impl Contains<SaveFrame> for Draw {
    fn contains(&self, _: &SaveFrame) -> bool {
        false
    }
}
