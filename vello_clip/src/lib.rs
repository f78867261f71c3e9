// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A clip stack for GPU renderers.
//!
//! [`ClipStack`] tracks nested clips made of rectangles, rounded rectangles, paths and coverage
//! shaders while a scene is recorded. For each draw it then works out the cheapest way to enforce
//! the current clip: a scissor rectangle, exclusion windows, analytic coverage terms, single
//! elements rasterized into a shared [atlas](ClipAtlas), one merged coverage mask, or a sequence of
//! stencil operations.
//!
//! All geometric reasoning is conservative. The stack only ever simplifies a clip when it can
//! prove the result is exact, and otherwise falls back to rasterization, so a draw is never
//! clipped more than it should be.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use vello_clip::kurbo::{Affine, Rect, RoundedRect};
//! use vello_clip::{
//!     AppliedClip, ApplyContext, ClipConfig, ClipEffect, ClipOp, ClipStack, IRect,
//!     MaskTextureCache, Rasterizer, SoftwareRasterizer, SoftwareTarget, TextureCache,
//! };
//!
//! let mut stack = ClipStack::new(IRect::from_size(100, 100), ClipConfig::default());
//! stack.save();
//! stack.clip_rect(Affine::IDENTITY, Rect::new(10.0, 10.0, 90.0, 90.0), false, ClipOp::Intersect);
//! stack.clip_rrect(
//!     Affine::IDENTITY,
//!     RoundedRect::new(20.0, 20.0, 80.0, 80.0, 10.0),
//!     true,
//!     ClipOp::Difference,
//! );
//!
//! let textures: Arc<dyn TextureCache> = Arc::new(MaskTextureCache::new());
//! let rasterizer: Arc<dyn Rasterizer> = Arc::new(SoftwareRasterizer::default());
//! let mut target = SoftwareTarget::default();
//! let mut ctx = ApplyContext::new(&mut target, &textures, &rasterizer);
//!
//! let mut out = AppliedClip::default();
//! let mut bounds = Rect::new(0.0, 0.0, 100.0, 100.0);
//! let effect = stack.apply(&mut ctx, &mut bounds, true, false, &mut out);
//! assert_eq!(effect, ClipEffect::Clipped);
//! assert_eq!(out.hard_clip().scissor(), Some(IRect::new(10, 10, 90, 90)));
//! stack.restore();
//! ```
//!
//! # Features
//!
//! - `multithreading` (enabled by default): Enables [`ThreadPoolScheduler`], which rasterizes
//!   clip masks on a rayon thread pool while recording continues.

// LINEBENDER LINT SET - lib.rs - v3
// See https://linebender.org/wiki/canonical-lints/
// These lints shouldn't apply to examples or tests.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
// These lints shouldn't apply to examples.
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub use peniko;
pub use peniko::kurbo;

pub mod applied;
pub mod atlas;
pub mod classify;
pub mod element;
pub mod frame;
pub mod geometry;
pub mod mask;
pub mod raster;
pub mod shader;
pub mod shape;
pub mod stack;
pub mod stencil;

pub use applied::{AppliedClip, ClipEffect, CoverageTerm, HardClip, PreClipResult, SimpleClip};
pub use atlas::{AtlasConfig, AtlasError, ClipAtlas};
pub use classify::{classify, ClipGeometry, ClipOp};
pub use element::ClipElement;
pub use frame::{ClipState, GenerationId};
pub use geometry::IRect;
pub use mask::{CoverageMask, MaskError, MaskKey, MaskTexture, MaskTextureCache, TextureCache};
#[cfg(feature = "multithreading")]
pub use raster::ThreadPoolScheduler;
pub use raster::{RasterOp, RasterScheduler, Rasterizer, SoftwareRasterizer};
pub use shader::{ClipShader, CoverageShader};
pub use shape::{ClipPath, Shape};
pub use stack::{ApplyContext, ClipConfig, ClipStack};
pub use stencil::{RenderTarget, SoftwareStencil, SoftwareTarget, StencilBuffer};
