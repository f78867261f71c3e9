// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Procedural coverage attached to the clip.

use std::fmt::Debug;
use std::sync::Arc;

use smallvec::SmallVec;

/// A procedural coverage function, evaluated per pixel independently of the clip geometry.
pub trait CoverageShader: Debug + Send + Sync {
    /// The coverage in `[0, 1]` at the device-space point `(x, y)`.
    fn coverage_at(&self, x: f64, y: f64) -> f32;
}

/// The product of one or more coverage shaders.
#[derive(Clone, Debug)]
pub struct ClipShader {
    layers: SmallVec<[Arc<dyn CoverageShader>; 2]>,
}

impl ClipShader {
    /// Wrap a single shader.
    pub fn new(shader: Arc<dyn CoverageShader>) -> Self {
        let mut layers = SmallVec::new();
        layers.push(shader);
        Self { layers }
    }

    /// Combine with `other`; since coverage multiplies, the order doesn't matter.
    pub fn multiply(mut self, other: Self) -> Self {
        self.layers.extend(other.layers);
        self
    }

    /// The shaders whose coverage is multiplied together.
    pub fn layers(&self) -> &[Arc<dyn CoverageShader>] {
        &self.layers
    }

    /// The combined coverage at `(x, y)`.
    pub fn coverage_at(&self, x: f64, y: f64) -> f32 {
        self.layers
            .iter()
            .map(|layer| layer.coverage_at(x, y).clamp(0.0, 1.0))
            .product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Constant(f32);

    impl CoverageShader for Constant {
        fn coverage_at(&self, _: f64, _: f64) -> f32 {
            self.0
        }
    }

    #[test]
    fn shaders_multiply() {
        let shader = ClipShader::new(Arc::new(Constant(0.5))).multiply(ClipShader::new(Arc::new(
            Constant(0.5),
        )));
        assert_eq!(shader.layers().len(), 2);
        assert_eq!(shader.coverage_at(3.0, 4.0), 0.25);
    }

    #[test]
    fn coverage_is_clamped() {
        let shader = ClipShader::new(Arc::new(Constant(2.0)));
        assert_eq!(shader.coverage_at(0.0, 0.0), 1.0);
    }
}
