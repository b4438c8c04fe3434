//! Tile extractor: overlapping rectangular sub-regions of one frame.
//!
//! Tiling bounds per-write memory when frames are very large. Tiles are
//! emitted in row-major scan order with stride `tile_size - overlap`; edge
//! tiles are clipped to the frame boundary, never padded, so the last tile
//! in a row or column may be smaller than `tile_size`. The downstream
//! encoder receives tiles as a flat image stream and owns any reassembly.

use anyhow::{bail, Result};

/// One rectangular sub-region of a frame, identified by its scan position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// Scan plan over a single frame. Restartable: `iter()` always starts a
/// fresh top-to-bottom, left-to-right pass.
#[derive(Debug, Clone, Copy)]
pub struct TileGrid {
    height: usize,
    width: usize,
    tile_size: usize,
    step: usize,
}

impl TileGrid {
    pub fn new(height: usize, width: usize, tile_size: usize, overlap: usize) -> Result<Self> {
        if height == 0 || width == 0 {
            bail!("frame dimensions must be positive, got {height}x{width}");
        }
        if tile_size == 0 {
            bail!("tile_size must be positive");
        }
        if overlap >= tile_size {
            bail!("tile_overlap {overlap} must be smaller than tile_size {tile_size}");
        }
        Ok(Self {
            height,
            width,
            tile_size,
            step: tile_size - overlap,
        })
    }

    pub fn iter(&self) -> Tiles {
        Tiles {
            grid: *self,
            y: 0,
            x: 0,
        }
    }

    pub fn tile_count(&self) -> usize {
        self.iter().count()
    }
}

pub struct Tiles {
    grid: TileGrid,
    y: usize,
    x: usize,
}

impl Iterator for Tiles {
    type Item = Tile;

    fn next(&mut self) -> Option<Tile> {
        if self.y >= self.grid.height {
            return None;
        }

        let tile = Tile {
            x: self.x,
            y: self.y,
            width: self.grid.tile_size.min(self.grid.width - self.x),
            height: self.grid.tile_size.min(self.grid.height - self.y),
        };

        self.x += self.grid.step;
        if self.x >= self.grid.width {
            self.x = 0;
            self.y += self.grid.step;
        }

        Some(tile)
    }
}

/// Copy one tile out of a packed `[H, W, C]` frame buffer.
pub fn copy_tile(frame: &[u8], frame_width: usize, channels: usize, tile: &Tile) -> Vec<u8> {
    let mut out = Vec::with_capacity(tile.width * tile.height * channels);
    let row_stride = frame_width * channels;
    for row in tile.y..tile.y + tile.height {
        let start = row * row_stride + tile.x * channels;
        out.extend_from_slice(&frame[start..start + tile.width * channels]);
    }
    out
}
