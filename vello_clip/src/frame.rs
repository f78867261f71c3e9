// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Save frames: one level of the save/restore protocol.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::classify::{classify, ClipBounds, ClipGeometry, ClipOp, Contains};
use crate::element::{Draw, RawElement};
use crate::geometry::{subtract, IRect};
use crate::mask::{Mask, TextureCache};
use crate::shader::ClipShader;

/// Identifies one particular clip geometry. Cached masks are keyed by it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenerationId(u32);

impl GenerationId {
    /// A frame that hasn't recorded any geometry.
    pub const INVALID: Self = Self(0);
    /// Shared by every clip that covers nothing.
    pub const EMPTY: Self = Self(1);
    /// Shared by every clip that covers the whole device.
    pub const WIDE_OPEN: Self = Self(2);

    const FIRST_UNRESERVED: u32 = 3;

    /// Allocate a fresh, process-wide unique ID.
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(GenerationId::FIRST_UNRESERVED);
        loop {
            let id = NEXT.fetch_add(1, Ordering::Relaxed);
            // Skip the reserved IDs if the counter ever wraps.
            if id >= Self::FIRST_UNRESERVED {
                return Self(id);
            }
        }
    }

    /// The raw value.
    pub fn get(self) -> u32 {
        self.0
    }
}

/// A summary of what the current clip looks like.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClipState {
    /// Nothing can be drawn.
    Empty,
    /// Everything on the device can be drawn.
    WideOpen,
    /// A single device-space rectangle.
    DeviceRect,
    /// A single device-space rounded rectangle.
    DeviceRRect,
    /// Anything else, including any clip with a shader.
    Complex,
}

/// One level of the clip stack.
///
/// A frame owns the elements from `start_element` and the masks from `start_mask` to the end of the
/// stack's shared arrays. Elements before `oldest_valid` are known to be irrelevant to this frame.
#[derive(Clone, Debug)]
pub(crate) struct SaveFrame {
    inner: IRect,
    outer: IRect,
    shader: Option<ClipShader>,
    start_mask: usize,
    start_element: usize,
    oldest_valid: usize,
    /// Saves that haven't needed a frame of their own yet.
    deferred_saves: u32,
    op: ClipOp,
    state: ClipState,
    gen_id: GenerationId,
}

impl SaveFrame {
    /// The wide open root frame.
    pub(crate) fn new(device_bounds: IRect) -> Self {
        Self {
            inner: device_bounds,
            outer: device_bounds,
            shader: None,
            start_mask: 0,
            start_element: 0,
            oldest_valid: 0,
            deferred_saves: 0,
            op: ClipOp::Intersect,
            state: ClipState::WideOpen,
            gen_id: GenerationId::INVALID,
        }
    }

    /// A child frame that starts out identical to `prior` but owns nothing yet.
    ///
    /// The child shares the generation of `prior` until it records its own geometry, so masks
    /// rendered for the parent stay usable.
    pub(crate) fn inherit(prior: &Self, start_mask: usize, start_element: usize) -> Self {
        debug_assert!(
            start_mask >= prior.start_mask && start_element >= prior.start_element,
            "child frames can't own their parent's entries"
        );
        Self {
            shader: prior.shader.clone(),
            start_mask,
            start_element,
            deferred_saves: 0,
            ..*prior
        }
    }

    pub(crate) fn generation_id(&self) -> GenerationId {
        match self.state {
            ClipState::Empty => GenerationId::EMPTY,
            ClipState::WideOpen => GenerationId::WIDE_OPEN,
            _ => self.gen_id,
        }
    }

    pub(crate) fn state(&self) -> ClipState {
        if self.shader.is_some() && self.state != ClipState::Empty {
            ClipState::Complex
        } else {
            self.state
        }
    }

    pub(crate) fn inner_bounds(&self) -> IRect {
        self.inner
    }

    pub(crate) fn shader(&self) -> Option<&ClipShader> {
        self.shader.as_ref()
    }

    pub(crate) fn oldest_element_index(&self) -> usize {
        self.oldest_valid
    }

    pub(crate) fn can_be_updated(&self) -> bool {
        self.deferred_saves == 0
    }

    pub(crate) fn push_save(&mut self) {
        self.deferred_saves += 1;
    }

    /// Undo a deferred save, returning false if there wasn't one.
    pub(crate) fn pop_save(&mut self) -> bool {
        if self.deferred_saves > 0 {
            self.deferred_saves -= 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn remove_elements(&self, elements: &mut Vec<RawElement>) {
        elements.truncate(self.start_element);
    }

    /// Revive the elements that were only invalidated by frames that have since been popped.
    pub(crate) fn restore_elements(&self, elements: &mut [RawElement]) {
        let oldest = self.oldest_valid.min(elements.len());
        for e in elements[oldest..].iter_mut().rev() {
            e.restore_valid(self.start_element);
        }
    }

    /// Drop every mask this frame owns, invalidating its cached texture first.
    pub(crate) fn invalidate_masks(&self, masks: &mut Vec<Mask>, textures: Option<&dyn TextureCache>) {
        debug_assert!(
            textures.is_some() || masks.len() <= self.start_mask,
            "masks exist without a texture cache"
        );
        while masks.len() > self.start_mask {
            if let Some(mask) = masks.pop() {
                if let Some(textures) = textures {
                    mask.invalidate(textures);
                }
            }
        }
    }

    /// Make the frame wide open over `bounds`.
    pub(crate) fn reset(&mut self, bounds: IRect) {
        debug_assert!(self.can_be_updated(), "frame has deferred saves");
        self.oldest_valid = self.start_element;
        self.outer = bounds;
        self.inner = bounds;
        self.op = ClipOp::Intersect;
        self.state = ClipState::WideOpen;
        self.shader = None;
    }

    /// Multiply the frame's coverage by `shader`.
    pub(crate) fn add_shader(&mut self, shader: ClipShader) {
        debug_assert!(self.can_be_updated(), "frame has deferred saves");
        self.shader = Some(match self.shader.take() {
            Some(existing) => existing.multiply(shader),
            None => shader,
        });
    }

    /// Record a simplified element, returning whether the clip changed.
    pub(crate) fn add_element(&mut self, to_add: RawElement, elements: &mut Vec<RawElement>) -> bool {
        debug_assert!(self.can_be_updated(), "frame has deferred saves");

        if self.state == ClipState::Empty {
            // Clips only ever shrink.
            return false;
        }
        if to_add.shape().is_empty() {
            debug_assert_eq!(
                to_add.op(),
                ClipOp::Intersect,
                "empty differences are no-ops and should be skipped earlier"
            );
            self.state = ClipState::Empty;
            return true;
        }

        match classify(&*self, &to_add) {
            ClipGeometry::Empty => {
                self.state = ClipState::Empty;
                return true;
            }
            ClipGeometry::AOnly => return false,
            ClipGeometry::BOnly => {
                self.replace_with_element(to_add, elements);
                return true;
            }
            ClipGeometry::Both => {}
        }

        if self.state == ClipState::WideOpen {
            self.replace_with_element(to_add, elements);
            return true;
        }

        let (e_inner, e_outer) = (to_add.inner_bounds(), to_add.outer_bounds());
        match (self.op, to_add.op()) {
            (ClipOp::Intersect, ClipOp::Intersect) => {
                self.outer = self.outer.intersect_or_empty(&e_outer);
                self.inner = self.inner.intersect_or_empty(&e_inner);
            }
            (ClipOp::Intersect, ClipOp::Difference) => {
                // The outer bounds only shrink if the difference cuts off a whole edge.
                self.outer = subtract(&self.outer, &e_inner, true);
                self.inner = subtract(&self.inner, &e_outer, false);
            }
            (ClipOp::Difference, ClipOp::Intersect) => {
                let old_outer = self.outer;
                self.outer = subtract(&e_outer, &self.inner, true);
                self.inner = subtract(&e_inner, &old_outer, false);
            }
            (ClipOp::Difference, ClipOp::Difference) => {
                self.outer = self.outer.union(&e_outer);
                if e_inner.area() > self.inner.area() {
                    self.inner = e_inner;
                }
            }
        }

        debug_assert!(
            !self.outer.is_empty() && (self.inner.is_empty() || self.outer.contains(&self.inner)),
            "frame bounds must describe a non-trivial clip"
        );

        self.append_element(to_add, elements)
    }

    fn append_element(&mut self, mut to_add: RawElement, elements: &mut Vec<RawElement>) -> bool {
        let count = elements.len();
        let start = self.start_element;
        // Owned elements at or after this index were invalidated by `to_add` and can go.
        let mut keep = start;
        // Every element before this one is invalid for this frame.
        let mut oldest_valid = count;
        // An owned, invalidated slot that can hold `to_add`.
        let mut reusable = None;

        for i in (self.oldest_valid..count).rev() {
            let existing = &mut elements[i];
            existing.update_for_element(&mut to_add, start);

            if to_add.is_invalid() {
                if existing.is_invalid() {
                    // They cancelled each other out completely.
                    self.state = ClipState::Empty;
                    return true;
                }
                // An existing element already clips at least as much.
                return false;
            } else if existing.is_invalid() {
                if i >= start {
                    reusable = Some(i);
                }
            } else {
                oldest_valid = i;
                keep = keep.max(i + 1);
            }
        }

        self.oldest_valid = oldest_valid.min(reusable.unwrap_or(count));
        self.state = if oldest_valid == count {
            to_add.clip_type()
        } else {
            ClipState::Complex
        };
        if self.op == ClipOp::Difference && to_add.op() == ClipOp::Intersect {
            self.op = ClipOp::Intersect;
        }

        let mut target = keep;
        let reusable = match reusable {
            Some(i) if i < target => Some(i),
            _ => {
                target += 1;
                None
            }
        };
        elements.truncate(target);
        match reusable {
            Some(i) => elements[i] = to_add,
            None if elements.len() < target => elements.push(to_add),
            None => {
                if let Some(last) = elements.last_mut() {
                    *last = to_add;
                }
            }
        }

        self.gen_id = GenerationId::next();
        true
    }

    /// Discard everything this frame owns and make it mirror `to_add`.
    fn replace_with_element(&mut self, to_add: RawElement, elements: &mut Vec<RawElement>) {
        self.inner = to_add.inner_bounds();
        self.outer = to_add.outer_bounds();
        self.op = to_add.op();
        self.state = to_add.clip_type();

        let target = self.start_element + 1;
        elements.truncate(target);
        if elements.len() < target {
            elements.push(to_add);
        } else {
            elements[target - 1] = to_add;
        }
        debug_assert_eq!(elements.len(), target, "frame should own exactly one element");

        // This also hides every element owned by lower frames.
        self.oldest_valid = self.start_element;
        self.gen_id = GenerationId::next();
    }
}

impl ClipBounds for SaveFrame {
    fn op(&self) -> ClipOp {
        self.op
    }

    fn outer_bounds(&self) -> IRect {
        self.outer
    }
}

impl Contains<Draw> for SaveFrame {
    fn contains(&self, draw: &Draw) -> bool {
        self.inner.contains(&draw.outer_bounds())
    }
}

impl Contains<RawElement> for SaveFrame {
    fn contains(&self, element: &RawElement) -> bool {
        self.inner.contains(&element.outer_bounds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kurbo::{Affine, Rect};
    use crate::shape::Shape;

    const DEVICE: IRect = IRect::from_size(100, 100);

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64, op: ClipOp) -> RawElement {
        let mut e = RawElement::new(
            Affine::IDENTITY,
            Shape::Rect(Rect::new(x0, y0, x1, y1)),
            true,
            op,
        );
        e.simplify(&DEVICE, false);
        e
    }

    #[test]
    fn reserved_generation_ids() {
        let mut frame = SaveFrame::new(DEVICE);
        assert_eq!(frame.generation_id(), GenerationId::WIDE_OPEN);
        let id = GenerationId::next();
        assert!(id.get() >= 3);
        assert!(GenerationId::next() > id);

        let mut elements = Vec::new();
        assert!(frame.add_element(rect(10.5, 10.5, 50.5, 50.5, ClipOp::Intersect), &mut elements));
        assert!(frame.generation_id().get() >= 3);
        assert!(frame.add_element(rect(60.0, 60.0, 90.0, 90.0, ClipOp::Intersect), &mut elements));
        assert_eq!(frame.state(), ClipState::Empty);
        assert_eq!(frame.generation_id(), GenerationId::EMPTY);
    }

    #[test]
    fn redundant_element_is_ignored() {
        let mut frame = SaveFrame::new(DEVICE);
        let mut elements = Vec::new();
        assert!(frame.add_element(rect(10.5, 10.5, 50.5, 50.5, ClipOp::Intersect), &mut elements));
        let id = frame.generation_id();
        assert!(!frame.add_element(rect(0.0, 0.0, 80.0, 80.0, ClipOp::Intersect), &mut elements));
        assert_eq!(frame.generation_id(), id);
        assert_eq!(elements.len(), 1);
    }

    #[test]
    fn invalidated_slot_is_reused() {
        let mut frame = SaveFrame::new(DEVICE);
        let mut elements = Vec::new();
        // Two differences that don't interact.
        frame.add_element(rect(10.0, 10.0, 20.0, 20.0, ClipOp::Difference), &mut elements);
        frame.add_element(rect(60.0, 60.0, 70.0, 70.0, ClipOp::Difference), &mut elements);
        assert_eq!(elements.len(), 2);
        assert_eq!(frame.state(), ClipState::Complex);

        // Covers the first difference, which gets dropped.
        frame.add_element(rect(5.0, 5.0, 30.0, 30.0, ClipOp::Difference), &mut elements);
        assert_eq!(elements.len(), 2);
        assert!(elements.iter().all(|e| !e.is_invalid()));
        assert_eq!(frame.op(), ClipOp::Difference);
    }

    #[test]
    fn difference_then_intersect_switches_op() {
        let mut frame = SaveFrame::new(DEVICE);
        let mut elements = Vec::new();
        frame.add_element(rect(10.0, 10.0, 20.0, 20.0, ClipOp::Difference), &mut elements);
        assert_eq!(frame.op(), ClipOp::Difference);
        frame.add_element(rect(15.0, 0.0, 90.0, 90.0, ClipOp::Intersect), &mut elements);
        assert_eq!(frame.op(), ClipOp::Intersect);
        // The remaining region isn't a rectangle, so the outer bounds stay conservative.
        assert_eq!(frame.outer_bounds(), IRect::new(15, 0, 90, 90));
        assert_eq!(frame.inner_bounds(), IRect::new(20, 0, 90, 90));
    }
}
