// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The clip stack.

use std::fmt;
use std::sync::Arc;

use crate::applied::{
    AppliedClip, ClipEffect, CoverageTerm, MaskSample, PreClipResult, SimpleClip, WindowRects,
};
use crate::atlas::ClipAtlas;
use crate::classify::{classify, ClipBounds, ClipGeometry, ClipOp};
use crate::element::{ClipElement, Draw, RawElement};
use crate::frame::{ClipState, GenerationId, SaveFrame};
use crate::geometry::{is_inside_clip, rect_intersect, subtract, IRect};
use crate::kurbo::{Affine, Rect, RoundedRect};
use crate::mask::{Mask, MaskTexture, TextureCache};
use crate::raster::{render_sw_mask, RasterScheduler, Rasterizer};
use crate::shader::ClipShader;
use crate::shape::{ClipPath, Shape};
use crate::stencil::{render_stencil_clip, RenderTarget};

/// Options for a [`ClipStack`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClipConfig {
    /// Antialias every element except axis-aligned rectangles, and treat every draw as
    /// antialiased.
    pub force_aa: bool,
    /// How many analytic and atlas terms a single draw can use.
    pub max_analytic_terms: usize,
    /// Elements whose footprint on a draw covers at least this many pixels never go to the atlas.
    pub max_atlas_area: i64,
    /// Caps the window rectangles used per draw, on top of the render target's own limit.
    pub max_window_rects: usize,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            force_aa: false,
            max_analytic_terms: 4,
            max_atlas_area: 256 * 256,
            max_window_rects: 8,
        }
    }
}

/// The collaborators needed to apply a clip to a draw.
pub struct ApplyContext<'a> {
    target: &'a mut dyn RenderTarget,
    textures: &'a Arc<dyn TextureCache>,
    rasterizer: &'a Arc<dyn Rasterizer>,
    scheduler: Option<&'a Arc<dyn RasterScheduler>>,
    atlas: Option<&'a mut ClipAtlas>,
}

impl<'a> ApplyContext<'a> {
    /// Masks are rasterized synchronously unless a scheduler is added.
    pub fn new(
        target: &'a mut dyn RenderTarget,
        textures: &'a Arc<dyn TextureCache>,
        rasterizer: &'a Arc<dyn Rasterizer>,
    ) -> Self {
        Self {
            target,
            textures,
            rasterizer,
            scheduler: None,
            atlas: None,
        }
    }

    /// Rasterize masks in the background.
    pub fn with_scheduler(mut self, scheduler: &'a Arc<dyn RasterScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Allow small antialiased elements to be placed in `atlas`.
    pub fn with_atlas(mut self, atlas: &'a mut ClipAtlas) -> Self {
        self.atlas = Some(atlas);
        self
    }
}

impl fmt::Debug for ApplyContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplyContext")
            .field("rasterizer", self.rasterizer)
            .field("scheduler", &self.scheduler)
            .field("atlas", &self.atlas)
            .finish_non_exhaustive()
    }
}

/// Tracks nested clips and turns them into clipping state for individual draws.
///
/// Elements and masks live in shared arrays; each save frame owns the entries from its start
/// indices onwards. Saves are deferred until the clip is modified, so that save/restore pairs
/// without any clipping cost nothing.
pub struct ClipStack {
    elements: Vec<RawElement>,
    masks: Vec<Mask>,
    top: SaveFrame,
    /// Every frame below `top`, the root first.
    saves: Vec<SaveFrame>,
    device_bounds: IRect,
    config: ClipConfig,
    /// Captured on the first `apply`; masks can't exist before then.
    textures: Option<Arc<dyn TextureCache>>,
}

impl ClipStack {
    /// Create a wide open clip stack for a device of the given size.
    pub fn new(device_bounds: IRect, config: ClipConfig) -> Self {
        debug_assert!(!device_bounds.is_empty(), "device bounds must not be empty");
        Self {
            elements: Vec::new(),
            masks: Vec::new(),
            top: SaveFrame::new(device_bounds),
            saves: Vec::new(),
            device_bounds,
            config,
            textures: None,
        }
    }

    /// The device bounds.
    pub fn device_bounds(&self) -> IRect {
        self.device_bounds
    }

    /// The configuration.
    pub fn config(&self) -> &ClipConfig {
        &self.config
    }

    /// A summary of the current clip.
    pub fn clip_state(&self) -> ClipState {
        self.top.state()
    }

    /// Identifies the current clip geometry.
    pub fn generation_id(&self) -> GenerationId {
        self.top.generation_id()
    }

    /// The elements that make up the current clip, oldest first.
    ///
    /// Empty and wide open clips have no elements.
    pub fn elements(&self) -> impl Iterator<Item = &ClipElement> + '_ {
        let oldest = match self.top.state() {
            ClipState::Empty | ClipState::WideOpen => self.elements.len(),
            _ => self.top.oldest_element_index().min(self.elements.len()),
        };
        self.elements[oldest..]
            .iter()
            .filter(|e| !e.is_invalid())
            .map(RawElement::element)
    }

    /// The number of masks rendered for the current clip and the frames below it.
    pub fn mask_count(&self) -> usize {
        self.masks.len()
    }

    /// Save the current clip, so that it's restored by the matching [`ClipStack::restore`].
    pub fn save(&mut self) {
        self.top.push_save();
    }

    /// Restore the clip to what it was at the matching [`ClipStack::save`].
    pub fn restore(&mut self) {
        if self.top.pop_save() {
            return;
        }
        let Some(parent) = self.saves.pop() else {
            log::warn!("Ignoring restore without a matching save");
            return;
        };
        self.top.remove_elements(&mut self.elements);
        self.top
            .invalidate_masks(&mut self.masks, self.textures.as_deref());
        self.top = parent;
        // Revive elements that were only invalidated by the popped frame.
        self.top.restore_elements(&mut self.elements);
    }

    /// Intersect with, or subtract, a rectangle.
    pub fn clip_rect(&mut self, transform: Affine, rect: Rect, anti_alias: bool, op: ClipOp) {
        self.clip_shape(transform, Shape::Rect(rect), anti_alias, op);
    }

    /// Intersect with, or subtract, a rounded rectangle.
    pub fn clip_rrect(
        &mut self,
        transform: Affine,
        rrect: RoundedRect,
        anti_alias: bool,
        op: ClipOp,
    ) {
        self.clip_shape(transform, Shape::RRect(rrect), anti_alias, op);
    }

    /// Intersect with, or subtract, a path.
    pub fn clip_path(&mut self, transform: Affine, path: ClipPath, anti_alias: bool, op: ClipOp) {
        self.clip_shape(transform, Shape::Path(path), anti_alias, op);
    }

    /// Intersect with, or subtract, any shape.
    pub fn clip_shape(&mut self, transform: Affine, shape: Shape, anti_alias: bool, op: ClipOp) {
        if self.top.state() == ClipState::Empty {
            return;
        }

        let mut element = RawElement::new(transform, shape, anti_alias, op);
        element.simplify(&self.device_bounds, self.config.force_aa);
        debug_assert!(
            !element.shape().is_inverted(),
            "simplified elements are never inverted"
        );
        if element.shape().is_empty() && element.op() == ClipOp::Difference {
            // Subtracting nothing.
            return;
        }

        let was_deferred = self.writable_frame();
        let old_generation = self.top.generation_id();
        if self.top.add_element(element, &mut self.elements) {
            debug_assert!(
                self.top.generation_id() != old_generation
                    && self.top.generation_id() != GenerationId::INVALID,
                "a modified frame needs a new generation"
            );
            if !was_deferred {
                self.top
                    .invalidate_masks(&mut self.masks, self.textures.as_deref());
            }
        } else if was_deferred {
            // Nothing changed, so the new frame isn't needed after all.
            if let Some(parent) = self.saves.pop() {
                self.top = parent;
                self.top.push_save();
            }
        } else {
            debug_assert_eq!(
                self.top.generation_id(),
                old_generation,
                "an unchanged frame keeps its generation"
            );
        }
    }

    /// Multiply the clip's coverage by a shader.
    pub fn clip_shader(&mut self, shader: ClipShader) {
        // Shaders can't add coverage back.
        if self.top.state() == ClipState::Empty {
            return;
        }
        self.writable_frame();
        // The geometry, and therefore every mask, is unchanged.
        self.top.add_shader(shader);
    }

    /// Replace the current clip with a device-space rectangle, ignoring everything that was
    /// clipped since the last save.
    pub fn replace_clip(&mut self, rect: IRect) {
        if !self.writable_frame() {
            self.top.remove_elements(&mut self.elements);
            self.top
                .invalidate_masks(&mut self.masks, self.textures.as_deref());
        }
        self.top.reset(self.device_bounds);
        if rect != self.device_bounds {
            self.clip_rect(Affine::IDENTITY, rect.to_rect(), false, ClipOp::Intersect);
        }
    }

    /// Bounds outside of which nothing can be drawn.
    pub fn conservative_bounds(&self) -> IRect {
        match self.top.state() {
            ClipState::Empty => IRect::EMPTY,
            ClipState::WideOpen => self.device_bounds,
            _ if self.top.op() == ClipOp::Difference => {
                // Only the parts of the device fully cut away can be excluded.
                subtract(&self.device_bounds, &self.top.inner_bounds(), true)
            }
            _ => self.top.outer_bounds(),
        }
    }

    /// Cheaply estimate how the clip affects a draw, without looking at individual elements of
    /// complex clips.
    pub fn pre_apply(&self, bounds: Rect, anti_alias: bool) -> PreClipResult {
        let mut draw = Draw::new(bounds, self.config.force_aa || anti_alias);
        if !draw.apply_device_bounds(&self.device_bounds) {
            return PreClipResult::new(ClipEffect::ClippedOut);
        }

        let frame = &self.top;
        match frame.state() {
            ClipState::Empty => return PreClipResult::new(ClipEffect::ClippedOut),
            ClipState::WideOpen => return PreClipResult::new(ClipEffect::Unclipped),
            _ => {}
        }

        match classify(frame, &draw) {
            ClipGeometry::Empty => PreClipResult::new(ClipEffect::ClippedOut),
            ClipGeometry::BOnly if frame.shader().is_some() => {
                PreClipResult::new(ClipEffect::Clipped)
            }
            ClipGeometry::BOnly => PreClipResult::new(ClipEffect::Unclipped),
            ClipGeometry::AOnly | ClipGeometry::Both => {
                let back = self.elements.last();
                match (frame.state(), back.map(RawElement::shape)) {
                    (ClipState::DeviceRect, Some(Shape::Rect(rect))) => PreClipResult::simple(
                        SimpleClip::Rect(*rect),
                        back.is_some_and(RawElement::anti_alias),
                    ),
                    (ClipState::DeviceRRect, Some(Shape::RRect(rrect))) => PreClipResult::simple(
                        SimpleClip::RRect(*rrect),
                        back.is_some_and(RawElement::anti_alias),
                    ),
                    _ => PreClipResult::new(ClipEffect::Clipped),
                }
            }
        }
    }

    /// Work out how to clip a draw covering `bounds`.
    ///
    /// `out` receives the clipping state and `bounds` is tightened to the device bounds and the
    /// scissor. If the result isn't [`ClipEffect::Clipped`], `out` doesn't clip.
    pub fn apply(
        &mut self,
        ctx: &mut ApplyContext<'_>,
        bounds: &mut Rect,
        anti_alias: bool,
        has_user_stencil_settings: bool,
        out: &mut AppliedClip,
    ) -> ClipEffect {
        *out = AppliedClip::default();
        self.capture_textures(ctx.textures);

        let mut draw = Draw::new(*bounds, self.config.force_aa || anti_alias);
        if !draw.apply_device_bounds(&self.device_bounds) {
            return ClipEffect::ClippedOut;
        }
        if let Some(on_device) = rect_intersect(bounds, &self.device_bounds.to_rect()) {
            *bounds = on_device;
        }

        let frame = &self.top;
        match frame.state() {
            ClipState::Empty => return ClipEffect::ClippedOut,
            ClipState::WideOpen => return ClipEffect::Unclipped,
            _ => {}
        }

        let shader = frame.shader().cloned().map(CoverageTerm::Shader);
        match classify(frame, &draw) {
            ClipGeometry::Empty => return ClipEffect::ClippedOut,
            ClipGeometry::BOnly => {
                // Only the shader can affect the draw.
                return match shader {
                    Some(term) => {
                        out.coverage_mut().push(term);
                        ClipEffect::Clipped
                    }
                    None => ClipEffect::Unclipped,
                };
            }
            ClipGeometry::AOnly | ClipGeometry::Both => {}
        }

        // Start out loose so that draws clipped purely by coverage can be batched; tightened below
        // if a mask is needed.
        let mut scissor = match frame.op() {
            ClipOp::Intersect => frame.outer_bounds(),
            ClipOp::Difference => subtract(&draw.outer_bounds(), &frame.inner_bounds(), true),
        };
        let mut scissor_needed = shader.is_some();

        // User stencil settings need the clip to be in the stencil buffer.
        let mut remaining_analytic = if has_user_stencil_settings {
            0
        } else {
            self.config.max_analytic_terms
        };
        let max_windows = ctx
            .target
            .max_window_rects()
            .min(self.config.max_window_rects);
        let mut windows = WindowRects::new();
        let mut terms = Vec::new();
        let mut for_atlas: Vec<(ClipElement, IRect)> = Vec::new();
        // Newest first.
        let mut for_mask: Vec<ClipElement> = Vec::new();
        let mut mask_requires_aa = false;

        let oldest = frame.oldest_element_index();
        for (i, e) in self.elements.iter().enumerate().rev() {
            if i < oldest {
                break;
            }
            if e.is_invalid() {
                continue;
            }

            match classify(e, &draw) {
                // A difference whose inner bounds cover more than the frame could record.
                ClipGeometry::Empty => return ClipEffect::ClippedOut,
                ClipGeometry::BOnly => continue,
                ClipGeometry::AOnly | ClipGeometry::Both => {}
            }
            scissor_needed = true;

            let (inner, outer) = (e.inner_bounds(), e.outer_bounds());
            let mut fully_applied = match e.op() {
                ClipOp::Intersect => inner == outer || inner.contains(&scissor),
                ClipOp::Difference => {
                    if !inner.is_empty() && windows.len() < max_windows {
                        windows.push(inner);
                        inner == outer
                    } else {
                        false
                    }
                }
            };

            if !fully_applied && remaining_analytic > 0 {
                if let Some(term) = CoverageTerm::analytic(e.element()) {
                    terms.push(term);
                    remaining_analytic -= 1;
                    fully_applied = true;
                } else if ctx.atlas.is_some() && e.anti_alias() {
                    if let Some(footprint) = outer
                        .intersect(&draw.outer_bounds())
                        .filter(|r| r.area() < self.config.max_atlas_area)
                    {
                        for_atlas.push((e.element().clone(), footprint));
                        remaining_analytic -= 1;
                        fully_applied = true;
                    }
                }
            }

            if !fully_applied {
                for_mask.push(e.element().clone());
                mask_requires_aa |= e.anti_alias();
            }
        }

        if !scissor_needed {
            debug_assert!(
                terms.is_empty() && for_atlas.is_empty() && for_mask.is_empty(),
                "elements were processed without needing a scissor"
            );
            return ClipEffect::Unclipped;
        }

        if frame.op() == ClipOp::Intersect && !(for_mask.is_empty() && for_atlas.is_empty()) {
            scissor = scissor.intersect_or_empty(&draw.outer_bounds());
        }
        if !is_inside_clip(&scissor, bounds) {
            out.hard_clip_mut().set_scissor(scissor);
            if let Some(scissored) = rect_intersect(bounds, &scissor.to_rect()) {
                *bounds = scissored;
            }
        }
        if !windows.is_empty() {
            out.hard_clip_mut().set_windows(windows);
        }

        if let Some(atlas) = ctx.atlas.as_deref_mut() {
            for (element, footprint) in for_atlas {
                let sample = footprint
                    .intersect(&scissor)
                    .map(|access| atlas.get_or_insert(&element, access, &**ctx.rasterizer));
                match sample {
                    Some(Ok(sample)) => {
                        terms.push(CoverageTerm::Atlas(sample));
                        continue;
                    }
                    Some(Err(err)) => log::debug!("Clip element falls back to the mask: {err}"),
                    None => {}
                }
                mask_requires_aa |= element.anti_alias;
                for_mask.push(element);
            }
        }

        if !for_mask.is_empty() {
            for_mask.reverse();
            let generation = frame.generation_id();
            let stencil_unavailable = ctx.target.stencil().is_none();
            let mut has_sw_mask = false;
            if (ctx.target.sample_count() <= 1 && mask_requires_aa) || stencil_unavailable {
                if let Some(sample) =
                    sw_mask_sample(&mut self.masks, ctx, generation, scissor, &for_mask)
                {
                    terms.push(CoverageTerm::Mask(sample));
                    has_sw_mask = true;
                }
            }

            if !has_sw_mask {
                let windows: WindowRects = out.hard_clip().windows().iter().copied().collect();
                let Some(stencil) = ctx.target.stencil() else {
                    log::warn!(
                        "Clip mask requires a stencil buffer, but none is available; skipping draw"
                    );
                    return ClipEffect::ClippedOut;
                };
                render_stencil_clip(stencil, generation, &scissor, &windows, &for_mask);
                out.hard_clip_mut().set_stencil(generation);
            }
        }

        let coverage = out.coverage_mut();
        for term in terms.into_iter().chain(shader) {
            coverage.push(term);
        }

        if out.does_clip() {
            ClipEffect::Clipped
        } else {
            ClipEffect::Unclipped
        }
    }

    /// Undefer a save if needed, so that the top frame can be modified. Returns whether a new
    /// frame was pushed.
    fn writable_frame(&mut self) -> bool {
        if self.top.can_be_updated() {
            return false;
        }
        let undeferred = self.top.pop_save();
        debug_assert!(undeferred, "a frame that can't be updated has deferred saves");
        let child = SaveFrame::inherit(&self.top, self.masks.len(), self.elements.len());
        let parent = std::mem::replace(&mut self.top, child);
        self.saves.push(parent);
        true
    }

    fn capture_textures(&mut self, textures: &Arc<dyn TextureCache>) {
        match &self.textures {
            Some(existing) => debug_assert!(
                Arc::ptr_eq(existing, textures),
                "a clip stack must always use the same texture cache"
            ),
            None => self.textures = Some(textures.clone()),
        }
    }
}

impl Drop for ClipStack {
    fn drop(&mut self) {
        if let Some(textures) = &self.textures {
            for mask in self.masks.iter().rev() {
                mask.invalidate(&**textures);
            }
        }
    }
}

impl fmt::Debug for ClipStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClipStack")
            .field("device_bounds", &self.device_bounds)
            .field("config", &self.config)
            .field("state", &self.top.state())
            .field("elements", &self.elements.len())
            .field("masks", &self.masks.len())
            .field("frames", &(self.saves.len() + 1))
            .finish_non_exhaustive()
    }
}

/// Find a cached mask of the current clip that covers `bounds`, or render a new one.
fn sw_mask_sample(
    masks: &mut Vec<Mask>,
    ctx: &ApplyContext<'_>,
    generation: GenerationId,
    bounds: IRect,
    elements: &[ClipElement],
) -> Option<MaskSample> {
    for mask in masks.iter().rev() {
        // Masks of older frames come first.
        if mask.generation() != generation {
            break;
        }
        if mask.applies_to_draw(generation, &bounds) {
            if let Some(texture) = ctx.textures.find_by_key(mask.key()) {
                log::trace!("Reusing clip mask {:?} for {bounds:?}", mask.bounds());
                return Some(MaskSample::new(texture));
            }
        }
    }

    let texture = render_mask_texture(ctx, bounds, elements)?;
    let mask = Mask::new(generation, bounds);
    ctx.textures.assign_key(*mask.key(), texture.clone());
    masks.push(mask);
    Some(MaskSample::new(texture))
}

fn render_mask_texture(
    ctx: &ApplyContext<'_>,
    bounds: IRect,
    elements: &[ClipElement],
) -> Option<MaskTexture> {
    match ctx.scheduler {
        Some(scheduler) if !scheduler.is_worker_thread() => {
            let (sender, receiver) = crossbeam_channel::bounded(1);
            let rasterizer = ctx.rasterizer.clone();
            // The stack may change before the job runs.
            let elements = elements.to_vec();
            scheduler.submit(Box::new(move || {
                // The receiver is gone if nobody needs the mask anymore.
                let _ = sender.send(render_sw_mask(&*rasterizer, bounds, &elements));
            }));
            log::debug!("Scheduled clip mask for {bounds:?} in the background");
            Some(MaskTexture::deferred(bounds, receiver))
        }
        _ => match render_sw_mask(&**ctx.rasterizer, bounds, elements) {
            Ok(mask) => Some(MaskTexture::ready(mask)),
            Err(err) => {
                log::warn!("Couldn't render clip mask: {err}");
                None
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::MaskTextureCache;
    use crate::raster::SoftwareRasterizer;
    use crate::stencil::SoftwareTarget;

    const DEVICE: IRect = IRect::from_size(100, 100);

    #[test]
    fn deferred_save_is_popped_when_nothing_changes() {
        let mut stack = ClipStack::new(DEVICE, ClipConfig::default());
        stack.clip_rect(
            Affine::IDENTITY,
            Rect::new(10.0, 10.0, 50.0, 50.0),
            false,
            ClipOp::Intersect,
        );
        stack.save();
        // Already covered by the existing clip.
        stack.clip_rect(
            Affine::IDENTITY,
            Rect::new(0.0, 0.0, 80.0, 80.0),
            false,
            ClipOp::Intersect,
        );
        assert_eq!(stack.saves.len(), 0);
        assert!(!stack.top.can_be_updated());
        stack.restore();
        assert!(stack.top.can_be_updated());
    }

    #[test]
    fn dropping_the_stack_evicts_masks() {
        let textures: Arc<dyn TextureCache> = Arc::new(MaskTextureCache::new());
        let rasterizer: Arc<dyn Rasterizer> = Arc::new(SoftwareRasterizer::default());
        let mut target = SoftwareTarget::default();

        let mut stack = ClipStack::new(
            DEVICE,
            ClipConfig {
                max_analytic_terms: 0,
                ..ClipConfig::default()
            },
        );
        stack.clip_rrect(
            Affine::IDENTITY,
            RoundedRect::new(10.0, 10.0, 60.0, 60.0, 8.0),
            true,
            ClipOp::Intersect,
        );
        let mut ctx = ApplyContext::new(&mut target, &textures, &rasterizer);
        let mut out = AppliedClip::default();
        let effect = stack.apply(
            &mut ctx,
            &mut Rect::new(0.0, 0.0, 100.0, 100.0),
            true,
            false,
            &mut out,
        );
        assert_eq!(effect, ClipEffect::Clipped);
        assert_eq!(stack.mask_count(), 1);

        let key = *stack.masks[0].key();
        assert!(textures.find_by_key(&key).is_some());
        drop(stack);
        assert!(textures.find_by_key(&key).is_none());
    }
}
