// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rasterized coverage masks and the cache entries that track them.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crossbeam_channel::Receiver;
use hashbrown::HashMap;
use thiserror::Error;

use crate::frame::GenerationId;
use crate::geometry::IRect;

/// The largest width or height of a coverage mask.
pub const MAX_MASK_DIMENSION: i32 = 16384;

/// Errors that can occur when creating a coverage mask.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MaskError {
    /// The requested mask is empty or exceeds [`MAX_MASK_DIMENSION`].
    #[error("Invalid mask size ({width}x{height})")]
    InvalidSize {
        /// The width of the requested mask.
        width: i32,
        /// The height of the requested mask.
        height: i32,
    },
    /// The pixel storage couldn't be allocated.
    #[error("Failed to allocate {bytes} bytes for a clip mask")]
    AllocationFailed {
        /// The size of the failed allocation.
        bytes: usize,
    },
    /// A background rasterization finished without producing a mask.
    #[error("Clip mask rasterization was abandoned")]
    Abandoned,
}

/// An 8-bit coverage bitmap positioned in device space.
#[derive(Clone, PartialEq, Eq)]
pub struct CoverageMask {
    bounds: IRect,
    data: Vec<u8>,
}

impl CoverageMask {
    /// Create a mask covering `bounds`, filled with zero coverage.
    pub fn new(bounds: IRect) -> Result<Self, MaskError> {
        let (width, height) = (bounds.width(), bounds.height());
        if bounds.is_empty() || width > MAX_MASK_DIMENSION || height > MAX_MASK_DIMENSION {
            return Err(MaskError::InvalidSize { width, height });
        }
        let bytes = width.unsigned_abs() as usize * height.unsigned_abs() as usize;
        let mut data = Vec::new();
        data.try_reserve_exact(bytes)
            .map_err(|_| MaskError::AllocationFailed { bytes })?;
        data.resize(bytes, 0);
        Ok(Self { bounds, data })
    }

    /// The device pixels covered by the mask.
    pub fn bounds(&self) -> IRect {
        self.bounds
    }

    /// The width in pixels.
    pub fn width(&self) -> u32 {
        self.bounds.width().unsigned_abs()
    }

    /// The height in pixels.
    pub fn height(&self) -> u32 {
        self.bounds.height().unsigned_abs()
    }

    /// The coverage values, row by row.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Set every pixel to `value`.
    pub fn fill(&mut self, value: u8) {
        self.data.fill(value);
    }

    /// The coverage of the device pixel `(x, y)`, or `None` outside of the mask.
    pub fn get(&self, x: i32, y: i32) -> Option<u8> {
        self.index(x, y).map(|i| self.data[i])
    }

    /// Mutable access to the coverage of the device pixel `(x, y)`.
    pub fn get_mut(&mut self, x: i32, y: i32) -> Option<&mut u8> {
        self.index(x, y).map(|i| &mut self.data[i])
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        self.bounds.contains_pixel(x, y).then(|| {
            let row = (y - self.bounds.y0).unsigned_abs() as usize;
            let col = (x - self.bounds.x0).unsigned_abs() as usize;
            row * self.width() as usize + col
        })
    }
}

impl fmt::Debug for CoverageMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoverageMask")
            .field("bounds", &self.bounds)
            .finish_non_exhaustive()
    }
}

/// A coverage mask that may still be rasterizing on another thread.
///
/// Consumers call [`MaskTexture::wait`] right before reading the pixels, so that recording never
/// has to block on the rasterization.
#[derive(Clone)]
pub struct MaskTexture(Arc<MaskTextureInner>);

struct MaskTextureInner {
    bounds: IRect,
    pixels: OnceLock<Result<Arc<CoverageMask>, MaskError>>,
    pending: Option<Receiver<Result<CoverageMask, MaskError>>>,
}

impl MaskTexture {
    /// Wrap a finished mask.
    pub fn ready(mask: CoverageMask) -> Self {
        let bounds = mask.bounds();
        Self(Arc::new(MaskTextureInner {
            bounds,
            pixels: OnceLock::from(Ok(Arc::new(mask))),
            pending: None,
        }))
    }

    /// A mask that will be delivered through `receiver` once it has been rasterized.
    pub fn deferred(bounds: IRect, receiver: Receiver<Result<CoverageMask, MaskError>>) -> Self {
        Self(Arc::new(MaskTextureInner {
            bounds,
            pixels: OnceLock::new(),
            pending: Some(receiver),
        }))
    }

    /// The device pixels covered by the mask.
    pub fn bounds(&self) -> IRect {
        self.0.bounds
    }

    /// Whether the pixels can be read without blocking.
    pub fn is_ready(&self) -> bool {
        self.0.pixels.get().is_some() || self.0.pending.as_ref().is_some_and(|r| !r.is_empty())
    }

    /// Block until the mask has been rasterized.
    pub fn wait(&self) -> Result<&CoverageMask, MaskError> {
        let inner = &*self.0;
        let pixels = inner.pixels.get_or_init(|| {
            let received = inner
                .pending
                .as_ref()
                .ok_or(MaskError::Abandoned)
                .and_then(|receiver| receiver.recv().map_err(|_| MaskError::Abandoned));
            received.and_then(|result| result.map(Arc::new))
        });
        match pixels {
            Ok(mask) => Ok(mask),
            Err(err) => Err(err.clone()),
        }
    }

    /// Whether both handles refer to the same texture.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for MaskTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaskTexture")
            .field("bounds", &self.0.bounds)
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

/// Identifies a cached clip mask: the clip it was rendered for and the pixels it covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaskKey {
    /// The generation of the clip that was rasterized.
    pub generation: GenerationId,
    /// The device pixels covered by the mask.
    pub bounds: IRect,
}

/// Stores rasterized masks by key.
///
/// Invalidated keys must never be returned by later lookups, even if an identical key gets assigned
/// again. Textures that are still referenced elsewhere stay alive until those references drop.
pub trait TextureCache: Send + Sync {
    /// Look up a texture.
    fn find_by_key(&self, key: &MaskKey) -> Option<MaskTexture>;
    /// Register a texture, replacing any previous texture with the same key.
    fn assign_key(&self, key: MaskKey, texture: MaskTexture);
    /// Forget a texture.
    fn invalidate_key(&self, key: &MaskKey);
}

/// A simple in-memory [`TextureCache`].
#[derive(Debug, Default)]
pub struct MaskTextureCache {
    textures: Mutex<HashMap<MaskKey, MaskTexture>>,
}

impl MaskTextureCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of cached textures.
    pub fn len(&self) -> usize {
        self.textures.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the cache holds no textures.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TextureCache for MaskTextureCache {
    fn find_by_key(&self, key: &MaskKey) -> Option<MaskTexture> {
        self.textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn assign_key(&self, key: MaskKey, texture: MaskTexture) {
        self.textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, texture);
    }

    fn invalidate_key(&self, key: &MaskKey) {
        self.textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// A mask rendered for a save frame, tracked so it can be evicted when the frame changes.
#[derive(Clone, Debug)]
pub(crate) struct Mask {
    key: MaskKey,
}

impl Mask {
    pub(crate) fn new(generation: GenerationId, bounds: IRect) -> Self {
        debug_assert!(
            generation.get() > GenerationId::WIDE_OPEN.get(),
            "trivial clips never need a mask"
        );
        Self {
            key: MaskKey { generation, bounds },
        }
    }

    pub(crate) fn key(&self) -> &MaskKey {
        &self.key
    }

    pub(crate) fn generation(&self) -> GenerationId {
        self.key.generation
    }

    pub(crate) fn bounds(&self) -> IRect {
        self.key.bounds
    }

    /// A larger mask for the same clip contains everything a smaller draw needs.
    pub(crate) fn applies_to_draw(&self, generation: GenerationId, bounds: &IRect) -> bool {
        self.key.generation == generation && self.key.bounds.contains(bounds)
    }

    pub(crate) fn invalidate(&self, textures: &dyn TextureCache) {
        log::trace!("Evicting clip mask {:?}", self.key);
        textures.invalidate_key(&self.key);
    }
}
