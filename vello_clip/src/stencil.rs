// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Clipping through the render target's stencil buffer.

use crate::classify::ClipOp;
use crate::element::ClipElement;
use crate::frame::GenerationId;
use crate::geometry::IRect;
use crate::kurbo::Affine;
use crate::mask::CoverageMask;
use crate::raster::{RasterOp, Rasterizer, SoftwareRasterizer};
use crate::shape::Shape;

/// A stencil buffer that clip elements can be drawn into.
pub trait StencilBuffer {
    /// Prepare to draw the clip `generation` within `scissor`, excluding the `windows`.
    ///
    /// Returns false if the buffer already holds exactly this clip, in which case nothing else is
    /// called.
    fn begin_clip(
        &mut self,
        generation: GenerationId,
        scissor: &IRect,
        windows: &[IRect],
    ) -> bool;
    /// Reset the clip bit inside the scissor.
    fn clear_clip(&mut self, inside: bool);
    /// Update the clip bit with the coverage of `shape`.
    fn draw_clip_shape(
        &mut self,
        shape: &Shape,
        transform: &Affine,
        op: RasterOp,
        anti_alias: bool,
    );
    /// The clip is complete.
    fn finish_clip(&mut self);
}

/// The capabilities of the surface that draws will be recorded into.
pub trait RenderTarget {
    /// How many window rectangles a draw can use. Zero if they are unsupported.
    fn max_window_rects(&self) -> usize;
    /// The number of samples per pixel.
    fn sample_count(&self) -> u32;
    /// The stencil buffer, if the target has one.
    fn stencil(&mut self) -> Option<&mut dyn StencilBuffer>;
}

/// Draw `elements`, oldest first, into the stencil buffer.
pub(crate) fn render_stencil_clip(
    stencil: &mut dyn StencilBuffer,
    generation: GenerationId,
    scissor: &IRect,
    windows: &[IRect],
    elements: &[ClipElement],
) {
    if !stencil.begin_clip(generation, scissor, windows) {
        log::trace!("Stencil already holds clip {generation:?}");
        return;
    }
    let start_inside = elements.first().is_some_and(|e| e.op == ClipOp::Difference);
    stencil.clear_clip(start_inside);
    for (i, e) in elements.iter().enumerate() {
        stencil.draw_clip_shape(
            &e.shape,
            &e.local_to_device,
            RasterOp::for_element(i, e.op),
            e.anti_alias,
        );
    }
    stencil.finish_clip();
}

/// A one-bit-per-pixel stencil buffer on the CPU.
#[derive(Debug, Default)]
pub struct SoftwareStencil {
    rasterizer: SoftwareRasterizer,
    bits: Option<CoverageMask>,
    pending: Option<GenerationId>,
    current: Option<(GenerationId, IRect)>,
}

impl SoftwareStencil {
    /// Create an empty stencil buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// The clip the buffer currently holds.
    pub fn current_clip(&self) -> Option<(GenerationId, IRect)> {
        self.current
    }

    /// Whether the pixel `(x, y)` passes the stencil test. Pixels outside of the last scissor fail.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.bits
            .as_ref()
            .and_then(|bits| bits.get(x, y))
            .is_some_and(|v| v >= 128)
    }
}

impl StencilBuffer for SoftwareStencil {
    fn begin_clip(&mut self, generation: GenerationId, scissor: &IRect, _: &[IRect]) -> bool {
        if self.current == Some((generation, *scissor)) {
            return false;
        }
        self.current = None;
        self.bits = CoverageMask::new(*scissor)
            .inspect_err(|err| log::warn!("Couldn't allocate stencil bits: {err}"))
            .ok();
        self.pending = Some(generation);
        true
    }

    fn clear_clip(&mut self, inside: bool) {
        if let Some(bits) = &mut self.bits {
            bits.fill(if inside { 255 } else { 0 });
        }
    }

    fn draw_clip_shape(&mut self, shape: &Shape, transform: &Affine, op: RasterOp, _: bool) {
        // A single sample per pixel can only hold aliased coverage.
        if let Some(bits) = &mut self.bits {
            self.rasterizer.rasterize(shape, transform, op, false, bits);
        }
    }

    fn finish_clip(&mut self) {
        if let (Some(generation), Some(bits)) = (self.pending.take(), &self.bits) {
            self.current = Some((generation, bits.bounds()));
        }
    }
}

/// A [`RenderTarget`] with configurable capabilities and an optional [`SoftwareStencil`].
#[derive(Debug)]
pub struct SoftwareTarget {
    /// The number of samples per pixel.
    pub sample_count: u32,
    /// How many window rectangles a draw can use.
    pub max_window_rects: usize,
    /// The stencil buffer, if any.
    pub stencil: Option<SoftwareStencil>,
}

impl Default for SoftwareTarget {
    fn default() -> Self {
        Self {
            sample_count: 1,
            max_window_rects: 0,
            stencil: Some(SoftwareStencil::new()),
        }
    }
}

impl RenderTarget for SoftwareTarget {
    fn max_window_rects(&self) -> usize {
        self.max_window_rects
    }

    fn sample_count(&self) -> u32 {
        self.sample_count
    }

    fn stencil(&mut self) -> Option<&mut dyn StencilBuffer> {
        self.stencil.as_mut().map(|s| s as &mut dyn StencilBuffer)
    }
}
