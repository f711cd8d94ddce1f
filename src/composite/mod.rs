//! Composite thumbnails of unity leads.
//!
//! The production painter is an external service; it only has to implement
//! [`CompositeBuilder`]. [`GridCompositor`] is the built-in implementation:
//! it tiles grayscale PGM leaf images into a square grid.

use crate::capture::pnm::{self, PnmError};
use crate::store::{CompositeStore, LeafId, LeafImages, StoreError};
use std::sync::Arc;
use thiserror::Error;

/// Composite rendering errors.
#[derive(Debug, Error)]
pub enum CompositeError {
    /// Nothing to compose.
    #[error("no tiles to compose")]
    NoTiles,
    /// More tiles than cells in the grid.
    #[error("{count} tiles do not fit a {side}x{side} grid")]
    TooManyTiles {
        /// Tiles given.
        count: usize,
        /// Cells per grid side.
        side: usize,
    },
    /// A tile differs in size from the first tile.
    #[error("tile {index} is {width}x{height}, expected {expected_width}x{expected_height}")]
    TileSizeMismatch {
        /// Position of the tile in the input.
        index: usize,
        /// Width of the offending tile.
        width: u32,
        /// Height of the offending tile.
        height: u32,
        /// Width of the first tile.
        expected_width: u32,
        /// Height of the first tile.
        expected_height: u32,
    },
    /// A tile is not grayscale.
    #[error("tile {index} has {channels} channels, only grayscale is supported")]
    UnsupportedTile {
        /// Position of the tile.
        index: usize,
        /// Samples per pixel of the tile.
        channels: u8,
    },
    /// A tile could not be decoded.
    #[error("tile {index} could not be decoded: {source}")]
    Decode {
        /// Position of the tile.
        index: usize,
        /// Decoder error.
        source: PnmError,
    },
    /// Loading a tile or saving the composite failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Renders one composite image from encoded leaf images.
pub trait CompositeBuilder: Send + Sync {
    /// Lays `tiles` out row-major in a `side` x `side` grid.
    fn build_composite(&self, tiles: &[Vec<u8>], side: usize) -> Result<Vec<u8>, CompositeError>;
}

/// Tiles grayscale PGM images; empty cells stay black.
#[derive(Debug, Default, Clone, Copy)]
pub struct GridCompositor;

impl CompositeBuilder for GridCompositor {
    fn build_composite(&self, tiles: &[Vec<u8>], side: usize) -> Result<Vec<u8>, CompositeError> {
        if tiles.is_empty() || side == 0 {
            return Err(CompositeError::NoTiles);
        }
        if tiles.len() > side * side {
            return Err(CompositeError::TooManyTiles {
                count: tiles.len(),
                side,
            });
        }

        let mut images = Vec::with_capacity(tiles.len());
        for (index, bytes) in tiles.iter().enumerate() {
            let image = pnm::decode(bytes).map_err(|source| CompositeError::Decode { index, source })?;
            if image.channels != 1 {
                return Err(CompositeError::UnsupportedTile {
                    index,
                    channels: image.channels,
                });
            }
            images.push(image);
        }

        let (tile_w, tile_h) = (images[0].width, images[0].height);
        if let Some((index, bad)) = images
            .iter()
            .enumerate()
            .find(|(_, img)| img.width != tile_w || img.height != tile_h)
        {
            return Err(CompositeError::TileSizeMismatch {
                index,
                width: bad.width,
                height: bad.height,
                expected_width: tile_w,
                expected_height: tile_h,
            });
        }

        let (tw, th) = (tile_w as usize, tile_h as usize);
        let out_w = tw * side;
        let mut canvas = vec![0u8; out_w * th * side];
        for (i, image) in images.iter().enumerate() {
            let (col, row) = (i % side, i / side);
            for y in 0..th {
                let src = &image.pixels[y * tw..(y + 1) * tw];
                let offset = (row * th + y) * out_w + col * tw;
                canvas[offset..offset + tw].copy_from_slice(src);
            }
        }

        Ok(pnm::encode_pgm(out_w as u32, (th * side) as u32, &canvas))
    }
}

/// Loads lead images, builds the composite, stores it.
#[derive(Clone)]
pub struct Thumbnailer {
    images: Arc<dyn LeafImages>,
    builder: Arc<dyn CompositeBuilder>,
    store: Arc<dyn CompositeStore>,
}

impl Thumbnailer {
    /// Creates a thumbnailer over the given stores.
    pub fn new(
        images: Arc<dyn LeafImages>,
        builder: Arc<dyn CompositeBuilder>,
        store: Arc<dyn CompositeStore>,
    ) -> Self {
        Self {
            images,
            builder,
            store,
        }
    }

    /// Renders and stores the composite of `mask` at `version`.
    pub fn render(
        &self,
        mask: &str,
        version: u32,
        leads: &[LeafId],
        side: usize,
    ) -> Result<(), CompositeError> {
        let tiles = leads
            .iter()
            .map(|id| self.images.load_image(*id))
            .collect::<Result<Vec<_>, _>>()?;
        let image = self.builder.build_composite(&tiles, side)?;
        let bytes = image.len();
        self.store.store_composite(mask, version, image)?;
        tracing::debug!(mask, version, side, bytes, "Composite stored");
        Ok(())
    }
}
