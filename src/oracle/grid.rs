//! Frame downsampling to the fixed decision grid.

use super::OracleError;
use crate::capture::{pnm, Frame};

/// Grid width in cells.
pub const GRID_WIDTH: u32 = 4;
/// Grid height in cells.
pub const GRID_HEIGHT: u32 = 2;
/// Total cells; one byte each, so the grid fills exactly one 64-bit word.
pub const GRID_CELLS: usize = (GRID_WIDTH * GRID_HEIGHT) as usize;

/// A frame compressed to `GRID_WIDTH x GRID_HEIGHT` grayscale cells.
///
/// Cells are stored row-major starting at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid([u8; GRID_CELLS]);

impl Grid {
    /// Wraps already-downsampled cells.
    pub fn from_cells(cells: [u8; GRID_CELLS]) -> Self {
        Self(cells)
    }

    /// Box-averages the frame into grid cells.
    ///
    /// Each cell covers an equal block of the frame (remainder pixels go to
    /// the last row/column of blocks) and its value is the rounded mean of
    /// every channel sample in the block.
    pub fn from_frame(frame: &Frame) -> Result<Self, OracleError> {
        if !frame.is_valid() {
            return Err(OracleError::InvalidFrame);
        }
        if frame.width() < GRID_WIDTH || frame.height() < GRID_HEIGHT {
            return Err(OracleError::FrameTooSmall {
                width: frame.width(),
                height: frame.height(),
            });
        }

        let mut cells = [0u8; GRID_CELLS];
        for cy in 0..GRID_HEIGHT {
            let y0 = cy * frame.height() / GRID_HEIGHT;
            let y1 = (cy + 1) * frame.height() / GRID_HEIGHT;
            for cx in 0..GRID_WIDTH {
                let x0 = cx * frame.width() / GRID_WIDTH;
                let x1 = (cx + 1) * frame.width() / GRID_WIDTH;

                let mut sum: u64 = 0;
                for y in y0..y1 {
                    for x in x0..x1 {
                        sum += frame.pixel(x, y).iter().map(|&s| s as u64).sum::<u64>();
                    }
                }
                let count = ((x1 - x0) as u64) * ((y1 - y0) as u64) * frame.channels() as u64;
                cells[(cy * GRID_WIDTH + cx) as usize] = ((sum + count / 2) / count) as u8;
            }
        }

        Ok(Self(cells))
    }

    /// Returns the cell bytes.
    #[inline]
    pub fn cells(&self) -> &[u8; GRID_CELLS] {
        &self.0
    }

    /// Encodes the grid as a binary PGM audit artifact.
    pub fn to_pgm(&self) -> Vec<u8> {
        pnm::encode_pgm(GRID_WIDTH, GRID_HEIGHT, &self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_on_grid_sized_frame() {
        let cells = [10, 20, 30, 40, 50, 60, 70, 80];
        let frame = Frame::new(cells.to_vec(), GRID_WIDTH, GRID_HEIGHT, 1);

        assert_eq!(Grid::from_frame(&frame).unwrap().cells(), &cells);
    }

    #[test]
    fn test_block_average_rounds() {
        // 8x2 grayscale: each cell averages two horizontal pixels
        let mut pixels = vec![0u8; 16];
        pixels[0] = 1;
        pixels[1] = 2; // mean 1.5 rounds to 2
        let frame = Frame::new(pixels, 8, 2, 1);

        let grid = Grid::from_frame(&frame).unwrap();
        assert_eq!(grid.cells()[0], 2);
        assert_eq!(grid.cells()[1], 0);
    }

    #[test]
    fn test_rgb_channels_are_averaged() {
        let mut pixels = vec![0u8; 4 * 2 * 3];
        pixels[0..3].copy_from_slice(&[30, 60, 90]);
        let frame = Frame::with_channels(pixels, 4, 2, 3, 1);

        assert_eq!(Grid::from_frame(&frame).unwrap().cells()[0], 60);
    }

    #[test]
    fn test_frame_too_small() {
        let frame = Frame::new(vec![0u8; 3], 3, 1, 1);
        assert!(matches!(
            Grid::from_frame(&frame),
            Err(OracleError::FrameTooSmall { width: 3, height: 1 })
        ));
    }

    #[test]
    fn test_invalid_buffer_rejected() {
        let frame = Frame::new(vec![0u8; 5], 4, 2, 1);
        assert!(matches!(Grid::from_frame(&frame), Err(OracleError::InvalidFrame)));
    }

    #[test]
    fn test_pgm_artifact() {
        let grid = Grid::from_cells([0, 1, 2, 3, 4, 5, 6, 7]);
        let image = pnm::decode(&grid.to_pgm()).unwrap();
        assert_eq!((image.width, image.height), (4, 2));
        assert_eq!(image.pixels, vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }
}
