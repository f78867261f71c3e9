// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A shared atlas of single-element coverage masks.
//!
//! Small antialiased clip elements that can't be evaluated analytically are rasterized
//! individually into the atlas, so that clips sharing an element also share its pixels.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use guillotiere::{size2, AllocId, AtlasAllocator};
use hashbrown::HashMap;
use peniko::color::cache_key::{BitEq, BitHash, CacheKey};
use thiserror::Error;

use crate::classify::ClipOp;
use crate::element::ClipElement;
use crate::geometry::IRect;
use crate::kurbo::{BezPath, PathEl, Point, Rect, RoundedRect};
use crate::mask::{CoverageMask, MaskError};
use crate::raster::{RasterOp, Rasterizer};
use crate::shape::Shape;

/// Errors that can occur when adding an element to the atlas.
#[derive(Debug, Error)]
pub enum AtlasError {
    /// The element's footprint is larger than the whole atlas.
    #[error("Clip element too large ({width}x{height}) for atlas")]
    TooLarge {
        /// The requested width.
        width: i32,
        /// The requested height.
        height: i32,
    },
    /// The atlas has no room left for the element.
    #[error("No space available in the clip atlas")]
    NoSpaceAvailable,
    /// The element's coverage couldn't be rasterized.
    #[error(transparent)]
    Mask(#[from] MaskError),
}

/// Configuration for a [`ClipAtlas`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AtlasConfig {
    /// The width and height of the atlas in pixels.
    pub size: (u32, u32),
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self { size: (1024, 1024) }
    }
}

/// An element's coverage, stored in the atlas.
#[derive(Clone, Debug)]
pub struct AtlasSample {
    mask: Arc<CoverageMask>,
    origin: (u32, u32),
    op: ClipOp,
}

impl AtlasSample {
    /// The top-left corner of the element's pixels within the atlas.
    pub fn origin(&self) -> (u32, u32) {
        self.origin
    }

    /// The device pixels covered by the sample.
    pub fn bounds(&self) -> IRect {
        self.mask.bounds()
    }

    /// Whether the sample's coverage is kept or inverted.
    pub fn op(&self) -> ClipOp {
        self.op
    }

    /// The coverage contributed at the device pixel `(x, y)`.
    pub fn coverage_at(&self, x: i32, y: i32) -> f32 {
        let inside = f32::from(self.mask.get(x, y).unwrap_or(0)) / 255.0;
        match self.op {
            ClipOp::Intersect => inside,
            ClipOp::Difference => 1.0 - inside,
        }
    }
}

/// Pixels that have to be copied into the atlas texture before drawing.
#[derive(Clone, Debug)]
pub struct AtlasUpload {
    /// Where the pixels go in the atlas.
    pub origin: (u32, u32),
    /// The rasterized coverage.
    pub mask: Arc<CoverageMask>,
}

/// The number of frames an unused element stays in the atlas.
const RETAINED_FRAMES: u64 = 3;

/// An element together with the device pixels it was rasterized for.
#[derive(Clone, Debug)]
struct AtlasKey {
    element: ClipElement,
    bounds: IRect,
}

impl BitHash for AtlasKey {
    fn bit_hash<H: Hasher>(&self, state: &mut H) {
        let element = &self.element;
        self.bounds.hash(state);
        element.op.hash(state);
        element.anti_alias.hash(state);
        hash_values(state, &element.local_to_device.as_coeffs());
        match &element.shape {
            Shape::Empty => 0_u8.hash(state),
            Shape::Rect(r) => {
                1_u8.hash(state);
                hash_values(state, &rect_values(r));
            }
            Shape::RRect(rr) => {
                2_u8.hash(state);
                hash_values(state, &rrect_values(rr));
            }
            Shape::Path(p) => {
                3_u8.hash(state);
                p.is_inverted().hash(state);
                matches!(p.fill(), peniko::Fill::NonZero).hash(state);
                for el in p.path().elements() {
                    let (verb, points) = el_parts(*el);
                    verb.hash(state);
                    for pt in points {
                        hash_values(state, &[pt.x, pt.y]);
                    }
                }
            }
        }
    }
}

impl BitEq for AtlasKey {
    fn bit_eq(&self, other: &Self) -> bool {
        let (a, b) = (&self.element, &other.element);
        self.bounds == other.bounds
            && a.op == b.op
            && a.anti_alias == b.anti_alias
            && values_eq(&a.local_to_device.as_coeffs(), &b.local_to_device.as_coeffs())
            && match (&a.shape, &b.shape) {
                (Shape::Empty, Shape::Empty) => true,
                (Shape::Rect(a), Shape::Rect(b)) => values_eq(&rect_values(a), &rect_values(b)),
                (Shape::RRect(a), Shape::RRect(b)) => {
                    values_eq(&rrect_values(a), &rrect_values(b))
                }
                (Shape::Path(a), Shape::Path(b)) => {
                    a.fill() == b.fill()
                        && a.is_inverted() == b.is_inverted()
                        && (std::ptr::eq(a.path(), b.path()) || path_bit_eq(a.path(), b.path()))
                }
                _ => false,
            }
    }
}

#[derive(Debug)]
struct AtlasEntry {
    sample: AtlasSample,
    allocation: AllocId,
    last_used: u64,
}

/// A guillotine-allocated texture holding the coverage of individual clip elements.
///
/// Entries are retained across frames. Call [`ClipAtlas::maintain`] once per frame so that
/// elements which stopped being used give their space back, or [`ClipAtlas::clear`] to start over.
pub struct ClipAtlas {
    allocator: AtlasAllocator,
    config: AtlasConfig,
    entries: HashMap<CacheKey<AtlasKey>, AtlasEntry>,
    uploads: Vec<AtlasUpload>,
    epoch: u64,
}

impl ClipAtlas {
    /// Create an empty atlas.
    pub fn new(config: AtlasConfig) -> Self {
        Self {
            allocator: AtlasAllocator::new(size2(to_i32(config.size.0), to_i32(config.size.1))),
            config,
            entries: HashMap::new(),
            uploads: Vec::new(),
            epoch: 0,
        }
    }

    /// The atlas configuration.
    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    /// Find or rasterize the coverage of `element` over `bounds`.
    pub fn get_or_insert(
        &mut self,
        element: &ClipElement,
        bounds: IRect,
        rasterizer: &dyn Rasterizer,
    ) -> Result<AtlasSample, AtlasError> {
        let (width, height) = (bounds.width(), bounds.height());
        if width > to_i32(self.config.size.0) || height > to_i32(self.config.size.1) {
            return Err(AtlasError::TooLarge { width, height });
        }

        let key = CacheKey(AtlasKey {
            element: element.clone(),
            bounds,
        });
        if let Some(entry) = self.entries.get_mut(&key) {
            log::trace!("Clip atlas hit for {bounds:?}");
            entry.last_used = self.epoch;
            return Ok(entry.sample.clone());
        }

        // Rasterize first so a failure doesn't leak atlas space.
        let mut mask = CoverageMask::new(bounds)?;
        rasterizer.rasterize(
            &element.shape,
            &element.local_to_device,
            RasterOp::Replace,
            element.anti_alias,
            &mut mask,
        );

        let allocation = self
            .allocator
            .allocate(size2(width, height))
            .ok_or(AtlasError::NoSpaceAvailable)?;
        let min = allocation.rectangle.min;
        let origin = (min.x.unsigned_abs(), min.y.unsigned_abs());

        let mask = Arc::new(mask);
        self.uploads.push(AtlasUpload {
            origin,
            mask: mask.clone(),
        });
        let sample = AtlasSample {
            mask,
            origin,
            op: element.op,
        };
        self.entries.insert(
            key,
            AtlasEntry {
                sample: sample.clone(),
                allocation: allocation.id,
                last_used: self.epoch,
            },
        );
        Ok(sample)
    }

    /// Take the pixels added since the last call.
    pub fn take_uploads(&mut self) -> Vec<AtlasUpload> {
        std::mem::take(&mut self.uploads)
    }

    /// Advance to the next frame, releasing elements that weren't used in the last few frames.
    ///
    /// Call this between frames, after the pending uploads were taken.
    pub fn maintain(&mut self) {
        self.epoch += 1;
        let cutoff = self.epoch.saturating_sub(RETAINED_FRAMES);
        let allocator = &mut self.allocator;
        self.entries.retain(|_, entry| {
            let keep = entry.last_used >= cutoff;
            if !keep {
                allocator.deallocate(entry.allocation);
            }
            keep
        });
    }

    /// Forget every element.
    pub fn clear(&mut self) {
        self.allocator.clear();
        self.entries.clear();
        self.uploads.clear();
    }

    /// The number of elements in the atlas.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the atlas holds no elements.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ClipAtlas {
    fn default() -> Self {
        Self::new(AtlasConfig::default())
    }
}

impl fmt::Debug for ClipAtlas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClipAtlas")
            .field("config", &self.config)
            .field("entries", &self.entries.len())
            .field("pending_uploads", &self.uploads.len())
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

fn to_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

fn rect_values(r: &Rect) -> [f64; 4] {
    [r.x0, r.y0, r.x1, r.y1]
}

fn rrect_values(rr: &RoundedRect) -> [f64; 8] {
    let (r, radii) = (rr.rect(), rr.radii());
    [
        r.x0,
        r.y0,
        r.x1,
        r.y1,
        radii.top_left,
        radii.top_right,
        radii.bottom_right,
        radii.bottom_left,
    ]
}

/// The verb of a path element and its points, padded with zeros.
fn el_parts(el: PathEl) -> (u8, [Point; 3]) {
    match el {
        PathEl::MoveTo(a) => (0, [a, Point::ZERO, Point::ZERO]),
        PathEl::LineTo(a) => (1, [a, Point::ZERO, Point::ZERO]),
        PathEl::QuadTo(a, b) => (2, [a, b, Point::ZERO]),
        PathEl::CurveTo(a, b, c) => (3, [a, b, c]),
        PathEl::ClosePath => (4, [Point::ZERO; 3]),
    }
}

fn path_bit_eq(a: &BezPath, b: &BezPath) -> bool {
    a.elements().len() == b.elements().len()
        && a.elements().iter().zip(b.elements()).all(|(x, y)| {
            let ((vx, px), (vy, py)) = (el_parts(*x), el_parts(*y));
            vx == vy
                && px
                    .iter()
                    .zip(&py)
                    .all(|(p, q)| values_eq(&[p.x, p.y], &[q.x, q.y]))
        })
}

fn hash_values<H: Hasher>(state: &mut H, values: &[f64]) {
    for v in values {
        v.to_bits().hash(state);
    }
}

fn values_eq(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}
