// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Utility functions shared across different tests.

#![allow(dead_code, reason = "not every test file uses every helper")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use vello_clip::kurbo::{Affine, BezPath, Rect};
use vello_clip::peniko::Fill;
use vello_clip::{
    AppliedClip, ApplyContext, ClipConfig, ClipEffect, ClipPath, ClipStack, CoverageMask,
    GenerationId, IRect, MaskTextureCache, RasterOp, Rasterizer, RenderTarget, Shape,
    SoftwareRasterizer, SoftwareStencil, StencilBuffer, TextureCache,
};

pub(crate) const DEVICE: IRect = IRect::from_size(100, 100);

pub(crate) fn stack() -> ClipStack {
    ClipStack::new(DEVICE, ClipConfig::default())
}

pub(crate) fn stack_with(config: ClipConfig) -> ClipStack {
    ClipStack::new(DEVICE, config)
}

/// A closed polygon through `points`.
pub(crate) fn polygon(points: &[(f64, f64)]) -> ClipPath {
    let mut path = BezPath::new();
    if let Some((first, rest)) = points.split_first() {
        path.move_to(*first);
        for p in rest {
            path.line_to(*p);
        }
        path.close_path();
    }
    ClipPath::new(path, Fill::NonZero)
}

/// A five-pointed star centered on the device whose center has a winding number of two.
pub(crate) fn pentagram() -> Arc<BezPath> {
    let mut path = BezPath::new();
    for i in 0..5 {
        let angle = (-90.0 + 144.0 * f64::from(i)).to_radians();
        let p = (50.0 + 40.0 * angle.cos(), 50.0 + 40.0 * angle.sin());
        if i == 0 {
            path.move_to(p);
        } else {
            path.line_to(p);
        }
    }
    path.close_path();
    Arc::new(path)
}

/// A rasterizer that counts how often it's invoked.
#[derive(Debug, Default)]
pub(crate) struct CountingRasterizer {
    inner: SoftwareRasterizer,
    calls: AtomicUsize,
}

impl CountingRasterizer {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Rasterizer for CountingRasterizer {
    fn rasterize(
        &self,
        shape: &Shape,
        transform: &Affine,
        op: RasterOp,
        anti_alias: bool,
        dst: &mut CoverageMask,
    ) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.rasterize(shape, transform, op, anti_alias, dst);
    }
}

/// A stencil buffer that records what it was asked to do.
#[derive(Debug, Default)]
pub(crate) struct RecordingStencil {
    pub(crate) inner: SoftwareStencil,
    pub(crate) clips_begun: usize,
    pub(crate) clips_rendered: usize,
    pub(crate) shapes_drawn: usize,
    pub(crate) last_windows: Vec<IRect>,
}

impl StencilBuffer for RecordingStencil {
    fn begin_clip(&mut self, generation: GenerationId, scissor: &IRect, windows: &[IRect]) -> bool {
        self.clips_begun += 1;
        self.last_windows = windows.to_vec();
        let needed = self.inner.begin_clip(generation, scissor, windows);
        if needed {
            self.clips_rendered += 1;
        }
        needed
    }

    fn clear_clip(&mut self, inside: bool) {
        self.inner.clear_clip(inside);
    }

    fn draw_clip_shape(&mut self, shape: &Shape, transform: &Affine, op: RasterOp, anti_alias: bool) {
        self.shapes_drawn += 1;
        self.inner.draw_clip_shape(shape, transform, op, anti_alias);
    }

    fn finish_clip(&mut self) {
        self.inner.finish_clip();
    }
}

/// A render target with configurable capabilities and a [`RecordingStencil`].
#[derive(Debug)]
pub(crate) struct TestTarget {
    pub(crate) sample_count: u32,
    pub(crate) max_window_rects: usize,
    pub(crate) stencil: Option<RecordingStencil>,
}

impl TestTarget {
    pub(crate) fn new() -> Self {
        Self {
            sample_count: 1,
            max_window_rects: 0,
            stencil: Some(RecordingStencil::default()),
        }
    }

    pub(crate) fn msaa() -> Self {
        Self {
            sample_count: 4,
            ..Self::new()
        }
    }

    pub(crate) fn recorded(&self) -> &RecordingStencil {
        self.stencil.as_ref().expect("target has a stencil")
    }
}

impl RenderTarget for TestTarget {
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

/// Everything needed to call [`ClipStack::apply`].
pub(crate) struct Harness {
    pub(crate) target: TestTarget,
    pub(crate) textures: Arc<dyn TextureCache>,
    pub(crate) cache: Arc<MaskTextureCache>,
    pub(crate) counter: Arc<CountingRasterizer>,
    pub(crate) rasterizer: Arc<dyn Rasterizer>,
}

impl Harness {
    pub(crate) fn new(target: TestTarget) -> Self {
        let cache = Arc::new(MaskTextureCache::new());
        let counter = Arc::new(CountingRasterizer::default());
        Self {
            target,
            textures: cache.clone(),
            cache,
            rasterizer: counter.clone(),
            counter,
        }
    }

    pub(crate) fn ctx(&mut self) -> ApplyContext<'_> {
        ApplyContext::new(&mut self.target, &self.textures, &self.rasterizer)
    }

    /// Apply the clip of `stack` to an antialiased draw covering `bounds`.
    pub(crate) fn apply(
        &mut self,
        stack: &mut ClipStack,
        bounds: Rect,
    ) -> (ClipEffect, AppliedClip, Rect) {
        let mut out = AppliedClip::default();
        let mut bounds = bounds;
        let effect = stack.apply(&mut self.ctx(), &mut bounds, true, false, &mut out);
        (effect, out, bounds)
    }
}

pub(crate) fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Rect {
    Rect::new(x0, y0, x1, y1)
}

pub(crate) const IDENTITY: Affine = Affine::IDENTITY;
