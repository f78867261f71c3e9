// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rendering clip elements into coverage masks on the CPU.

use std::fmt::Debug;

use crate::classify::ClipOp;
use crate::element::ClipElement;
use crate::geometry::{invert, IRect};
use crate::kurbo::{Affine, Point};
use crate::mask::{CoverageMask, MaskError};
use crate::shape::Shape;

/// How newly rasterized coverage combines with the coverage already in a mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RasterOp {
    /// Overwrite the destination.
    Replace,
    /// Multiply the destination by the coverage.
    Intersect,
    /// Multiply the destination by the inverse of the coverage.
    Difference,
}

impl RasterOp {
    /// The op for the `index`-th element of a mask, given the element's clip op.
    pub fn for_element(index: usize, op: ClipOp) -> Self {
        match op {
            ClipOp::Intersect if index == 0 => Self::Replace,
            ClipOp::Intersect => Self::Intersect,
            ClipOp::Difference => Self::Difference,
        }
    }

    fn apply(self, dst: u8, coverage: u8) -> u8 {
        match self {
            Self::Replace => coverage,
            Self::Intersect => mul_div_255(dst, coverage),
            Self::Difference => mul_div_255(dst, 255 - coverage),
        }
    }
}

/// `a * b / 255`, rounded.
#[expect(clippy::cast_possible_truncation, reason = "the result is at most 255")]
pub(crate) fn mul_div_255(a: u8, b: u8) -> u8 {
    ((u16::from(a) * u16::from(b) + 127) / 255) as u8
}

/// Draws a single shape into a coverage mask.
pub trait Rasterizer: Debug + Send + Sync {
    /// Combine the coverage of `shape`, mapped to device space by `transform`, into `dst`.
    fn rasterize(
        &self,
        shape: &Shape,
        transform: &Affine,
        op: RasterOp,
        anti_alias: bool,
        dst: &mut CoverageMask,
    );
}

/// A point-sampling [`Rasterizer`].
///
/// Antialiased shapes are supersampled on a regular grid, aliased shapes are sampled once at the
/// pixel center.
#[derive(Clone, Copy, Debug)]
pub struct SoftwareRasterizer {
    /// Samples along each axis of an antialiased pixel.
    pub samples_per_axis: u8,
}

impl Default for SoftwareRasterizer {
    fn default() -> Self {
        Self {
            samples_per_axis: 4,
        }
    }
}

impl SoftwareRasterizer {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "hits never exceed the sample count"
    )]
    fn coverage(
        &self,
        shape: &Shape,
        device_to_local: &Affine,
        anti_alias: bool,
        x: i32,
        y: i32,
    ) -> u8 {
        let (x, y) = (f64::from(x), f64::from(y));
        if !anti_alias {
            let p = *device_to_local * Point::new(x + 0.5, y + 0.5);
            return if shape.contains_point(p) { 255 } else { 0 };
        }

        let n = self.samples_per_axis.max(1);
        let step = 1.0 / f64::from(n);
        let mut hits = 0_u32;
        for sy in 0..n {
            for sx in 0..n {
                let p = Point::new(
                    x + (f64::from(sx) + 0.5) * step,
                    y + (f64::from(sy) + 0.5) * step,
                );
                if shape.contains_point(*device_to_local * p) {
                    hits += 1;
                }
            }
        }
        let total = u32::from(n) * u32::from(n);
        ((hits * 255 + total / 2) / total) as u8
    }
}

impl Rasterizer for SoftwareRasterizer {
    fn rasterize(
        &self,
        shape: &Shape,
        transform: &Affine,
        op: RasterOp,
        anti_alias: bool,
        dst: &mut CoverageMask,
    ) {
        let bounds = dst.bounds();
        let device_to_local = invert(transform);
        // Outside of this rect an uninverted shape has no coverage.
        let shape_bounds = match (&device_to_local, shape.is_inverted()) {
            (Some(_), true) => bounds,
            (Some(_), false) => IRect::round_out(transform.transform_rect_bbox(shape.bounds()))
                .intersect_or_empty(&bounds),
            (None, _) => IRect::EMPTY,
        };

        for y in bounds.y0..bounds.y1 {
            for x in bounds.x0..bounds.x1 {
                let coverage = match &device_to_local {
                    Some(inverse) if shape_bounds.contains_pixel(x, y) => {
                        self.coverage(shape, inverse, anti_alias, x, y)
                    }
                    _ => 0,
                };
                if let Some(px) = dst.get_mut(x, y) {
                    *px = op.apply(*px, coverage);
                }
            }
        }
    }
}

/// Render the combined coverage of `elements` over `bounds`.
pub fn render_sw_mask(
    rasterizer: &dyn Rasterizer,
    bounds: IRect,
    elements: &[ClipElement],
) -> Result<CoverageMask, MaskError> {
    let mut mask = CoverageMask::new(bounds)?;
    // A leading difference starts from full coverage and carves it away.
    let start_inside = elements.first().is_some_and(|e| e.op == ClipOp::Difference);
    mask.fill(if start_inside { 255 } else { 0 });

    for (i, e) in elements.iter().enumerate() {
        rasterizer.rasterize(
            &e.shape,
            &e.local_to_device,
            RasterOp::for_element(i, e.op),
            e.anti_alias,
            &mut mask,
        );
    }
    Ok(mask)
}

/// Runs mask rasterization off the recording thread.
pub trait RasterScheduler: Debug + Send + Sync {
    /// Queue `job` to run at some point in the future.
    fn submit(&self, job: Box<dyn FnOnce() + Send>);
    /// Whether the caller is one of the scheduler's own threads. Jobs are never queued from inside a
    /// worker, so a worker can't end up waiting on itself.
    fn is_worker_thread(&self) -> bool;
}

/// A [`RasterScheduler`] backed by a dedicated rayon thread pool.
#[cfg(feature = "multithreading")]
pub struct ThreadPoolScheduler {
    thread_pool: rayon::ThreadPool,
}

#[cfg(feature = "multithreading")]
impl ThreadPoolScheduler {
    /// Create a scheduler with `num_threads` worker threads.
    pub fn new(num_threads: u16) -> Result<Self, rayon::ThreadPoolBuildError> {
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(usize::from(num_threads))
            .thread_name(|i| format!("vello_clip-mask-{i}"))
            .build()?;
        Ok(Self { thread_pool })
    }
}

#[cfg(feature = "multithreading")]
impl Debug for ThreadPoolScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPoolScheduler")
            .field("num_threads", &self.thread_pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "multithreading")]
impl RasterScheduler for ThreadPoolScheduler {
    fn submit(&self, job: Box<dyn FnOnce() + Send>) {
        self.thread_pool.spawn(job);
    }

    fn is_worker_thread(&self) -> bool {
        self.thread_pool.current_thread_index().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kurbo::{Rect, RoundedRect};

    fn element(shape: impl Into<Shape>, op: ClipOp, anti_alias: bool) -> ClipElement {
        ClipElement {
            shape: shape.into(),
            local_to_device: Affine::IDENTITY,
            op,
            anti_alias,
        }
    }

    #[test]
    fn mul_div_255_rounds() {
        assert_eq!(mul_div_255(255, 255), 255);
        assert_eq!(mul_div_255(255, 0), 0);
        assert_eq!(mul_div_255(128, 255), 128);
        assert_eq!(mul_div_255(128, 128), 64);
    }

    #[test]
    fn aliased_rect() {
        let mask = render_sw_mask(
            &SoftwareRasterizer::default(),
            IRect::from_size(10, 10),
            &[element(Rect::new(2.0, 2.0, 5.0, 5.0), ClipOp::Intersect, false)],
        )
        .unwrap();
        assert_eq!(mask.get(2, 2), Some(255));
        assert_eq!(mask.get(4, 4), Some(255));
        assert_eq!(mask.get(5, 5), Some(0));
        assert_eq!(mask.get(1, 3), Some(0));
    }

    #[test]
    fn antialiased_half_pixel() {
        let mask = render_sw_mask(
            &SoftwareRasterizer::default(),
            IRect::from_size(4, 4),
            &[element(Rect::new(0.0, 0.0, 1.5, 4.0), ClipOp::Intersect, true)],
        )
        .unwrap();
        assert_eq!(mask.get(0, 0), Some(255));
        assert_eq!(mask.get(1, 0), Some(128));
        assert_eq!(mask.get(2, 0), Some(0));
    }

    #[test]
    fn leading_difference_starts_inside() {
        let mask = render_sw_mask(
            &SoftwareRasterizer::default(),
            IRect::new(10, 10, 20, 20),
            &[element(Rect::new(12.0, 12.0, 14.0, 14.0), ClipOp::Difference, false)],
        )
        .unwrap();
        assert_eq!(mask.get(10, 10), Some(255));
        assert_eq!(mask.get(13, 13), Some(0));
    }

    #[test]
    fn elements_combine_in_order() {
        let elements = [
            element(
                RoundedRect::new(0.0, 0.0, 16.0, 16.0, 4.0),
                ClipOp::Intersect,
                true,
            ),
            element(Rect::new(8.0, 0.0, 16.0, 16.0), ClipOp::Intersect, false),
            element(Rect::new(10.0, 6.0, 12.0, 10.0), ClipOp::Difference, false),
        ];
        let mask =
            render_sw_mask(&SoftwareRasterizer::default(), IRect::from_size(16, 16), &elements)
                .unwrap();
        // Removed by the second intersect.
        assert_eq!(mask.get(4, 8), Some(0));
        // Removed by the difference.
        assert_eq!(mask.get(11, 8), Some(0));
        assert_eq!(mask.get(9, 8), Some(255));
        // Outside of the rounded corner.
        assert_eq!(mask.get(15, 15), Some(0));
    }

    #[cfg(feature = "multithreading")]
    #[test]
    fn thread_pool_runs_jobs() {
        let scheduler = ThreadPoolScheduler::new(2).unwrap();
        assert!(!scheduler.is_worker_thread());
        let (sender, receiver) = crossbeam_channel::bounded(1);
        scheduler.submit(Box::new(move || {
            sender.send(()).unwrap();
        }));
        receiver.recv().unwrap();
    }
}
