use crate::error::{BendingError, Result};
use log::debug;
use ndarray::{s, Array2, ArrayView2};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkBounds {
    // Output bounds (the block itself)
    pub output_x_min: usize,
    pub output_y_min: usize,
    pub output_x_max: usize,
    pub output_y_max: usize,

    // Read bounds (block plus halo, clipped to the raster)
    pub read_x_min: usize,
    pub read_y_min: usize,
    pub read_x_max: usize,
    pub read_y_max: usize,

    // Halo actually available on each side
    pub pad_left: usize,
    pub pad_right: usize,
    pub pad_top: usize,
    pub pad_bottom: usize,
}

impl ChunkBounds {
    pub fn read_width(&self) -> usize {
        self.read_x_max - self.read_x_min
    }

    pub fn read_height(&self) -> usize {
        self.read_y_max - self.read_y_min
    }

    pub fn output_width(&self) -> usize {
        self.output_x_max - self.output_x_min
    }

    pub fn output_height(&self) -> usize {
        self.output_y_max - self.output_y_min
    }

    fn invalid(&self) -> BendingError {
        BendingError::InvalidChunkBounds(
            self.output_x_min,
            self.output_y_min,
            self.output_x_max,
            self.output_y_max,
            self.read_x_min,
            self.read_y_min,
            self.read_x_max,
            self.read_y_max,
        )
    }

    /// Padded window of a full raster.
    pub fn read_window<'a, T>(&self, full: ArrayView2<'a, T>) -> Result<ArrayView2<'a, T>> {
        let (rows, cols) = full.dim();
        if self.read_y_max > rows || self.read_x_max > cols {
            return Err(self.invalid());
        }
        Ok(full.slice_move(s![
            self.read_y_min..self.read_y_max,
            self.read_x_min..self.read_x_max
        ]))
    }

    /// Drop the halo from a block-local result.
    pub fn trim<'a, T>(&self, padded: &'a Array2<T>) -> Result<ArrayView2<'a, T>> {
        let (height, width) = padded.dim();
        if height != self.read_height() || width != self.read_width() {
            return Err(self.invalid());
        }
        Ok(padded.slice(s![
            self.pad_top..height - self.pad_bottom,
            self.pad_left..width - self.pad_right
        ]))
    }
}

pub struct ChunkGrid {
    raster_width: usize,
    raster_height: usize,
    chunk_size: usize,
    padding: usize,
    pub num_chunks_x: usize,
    pub num_chunks_y: usize,
    pub total_chunks: usize,
}

impl ChunkGrid {
    pub fn new(
        raster_width: usize,
        raster_height: usize,
        chunk_size: usize,
        padding: usize,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(BendingError::InvalidChunkSize(chunk_size));
        }
        if raster_width == 0 || raster_height == 0 {
            return Err(BendingError::InvalidDimensions(raster_width, raster_height));
        }

        let num_chunks_x = raster_width.div_ceil(chunk_size);
        let num_chunks_y = raster_height.div_ceil(chunk_size);
        let total_chunks = num_chunks_x * num_chunks_y;

        debug!(
            "ChunkGrid: {}x{} raster, chunk_size={}, padding={} → {}x{} chunks ({} total)",
            raster_width, raster_height, chunk_size, padding, num_chunks_x, num_chunks_y, total_chunks
        );

        Ok(Self {
            raster_width,
            raster_height,
            chunk_size,
            padding,
            num_chunks_x,
            num_chunks_y,
            total_chunks,
        })
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    pub fn iter(&self) -> ChunkIterator<'_> {
        ChunkIterator::new(self)
    }

    pub fn get_chunk_bounds(&self, chunk_idx: usize) -> ChunkBounds {
        let chunk_y = chunk_idx / self.num_chunks_x;
        let chunk_x = chunk_idx % self.num_chunks_x;

        let output_x_min = chunk_x * self.chunk_size;
        let output_y_min = chunk_y * self.chunk_size;
        let output_x_max = ((chunk_x + 1) * self.chunk_size).min(self.raster_width);
        let output_y_max = ((chunk_y + 1) * self.chunk_size).min(self.raster_height);

        let read_x_min = output_x_min.saturating_sub(self.padding);
        let read_y_min = output_y_min.saturating_sub(self.padding);
        let read_x_max = (output_x_max + self.padding).min(self.raster_width);
        let read_y_max = (output_y_max + self.padding).min(self.raster_height);

        // less than `padding` at raster edges
        let pad_left = output_x_min - read_x_min;
        let pad_top = output_y_min - read_y_min;
        let pad_right = read_x_max - output_x_max;
        let pad_bottom = read_y_max - output_y_max;

        debug!(
            "Chunk {} ({}, {}): output=[{}-{}, {}-{}], read=[{}-{}, {}-{}], padding=[L:{} R:{} T:{} B:{}]",
            chunk_idx, chunk_x, chunk_y,
            output_x_min, output_x_max, output_y_min, output_y_max,
            read_x_min, read_x_max, read_y_min, read_y_max,
            pad_left, pad_right, pad_top, pad_bottom
        );

        ChunkBounds {
            output_x_min,
            output_y_min,
            output_x_max,
            output_y_max,
            read_x_min,
            read_y_min,
            read_x_max,
            read_y_max,
            pad_left,
            pad_right,
            pad_top,
            pad_bottom,
        }
    }
}

pub struct ChunkIterator<'a> {
    grid: &'a ChunkGrid,
    current_idx: usize,
}

impl<'a> ChunkIterator<'a> {
    fn new(grid: &'a ChunkGrid) -> Self {
        Self {
            grid,
            current_idx: 0,
        }
    }
}

impl Iterator for ChunkIterator<'_> {
    type Item = (usize, ChunkBounds);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_idx < self.grid.total_chunks {
            let bounds = self.grid.get_chunk_bounds(self.current_idx);
            let idx = self.current_idx;
            self.current_idx += 1;
            Some((idx, bounds))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_grid_simple() {
        // 9600x9600 raster with the default 4800 block size and a 15 cell halo
        let grid = ChunkGrid::new(9600, 9600, 4800, 15).unwrap();
        assert_eq!(grid.num_chunks_x, 2);
        assert_eq!(grid.num_chunks_y, 2);
        assert_eq!(grid.total_chunks, 4);
    }

    #[test]
    fn test_chunk_grid_partial_blocks() {
        let grid = ChunkGrid::new(10, 7, 4, 2).unwrap();
        assert_eq!(grid.num_chunks_x, 3);
        assert_eq!(grid.num_chunks_y, 2);
        let last = grid.get_chunk_bounds(grid.total_chunks - 1);
        assert_eq!(last.output_x_min, 8);
        assert_eq!(last.output_x_max, 10);
        assert_eq!(last.output_y_max, 7);
        assert_eq!(last.read_x_min, 6);
        assert_eq!(last.pad_right, 0);
    }

    #[test]
    fn test_chunk_bounds_corner() {
        let grid = ChunkGrid::new(9600, 9600, 4800, 15).unwrap();
        let bounds = grid.get_chunk_bounds(0);

        assert_eq!(bounds.output_x_min, 0);
        assert_eq!(bounds.output_x_max, 4800);
        assert_eq!(bounds.read_x_min, 0); // Can't pad beyond edge
        assert_eq!(bounds.read_x_max, 4815);
        assert_eq!(bounds.pad_left, 0);
        assert_eq!(bounds.pad_right, 15);
    }

    #[test]
    fn test_chunk_bounds_edge() {
        let grid = ChunkGrid::new(9600, 9600, 4800, 15).unwrap();
        let bounds = grid.get_chunk_bounds(3);

        assert_eq!(bounds.output_x_min, 4800);
        assert_eq!(bounds.output_x_max, 9600);
        assert_eq!(bounds.output_y_min, 4800);
        assert_eq!(bounds.output_y_max, 9600);

        assert_eq!(bounds.read_x_min, 4785);
        assert_eq!(bounds.read_x_max, 9600);
        assert_eq!(bounds.pad_left, 15);
        assert_eq!(bounds.pad_right, 0);
    }

    #[test]
    fn test_chunk_iterator_covers_raster_once() {
        let grid = ChunkGrid::new(13, 11, 5, 3).unwrap();
        let mut hits = Array2::<u8>::zeros((11, 13));
        for (_, b) in grid.iter() {
            for y in b.output_y_min..b.output_y_max {
                for x in b.output_x_min..b.output_x_max {
                    hits[[y, x]] += 1;
                }
            }
        }
        assert!(hits.iter().all(|&h| h == 1));
        assert_eq!(grid.iter().count(), grid.total_chunks);
    }

    #[test]
    fn test_window_and_trim() {
        let full = Array2::from_shape_fn((6, 8), |(y, x)| y * 10 + x);
        let grid = ChunkGrid::new(8, 6, 4, 1).unwrap();
        let bounds = grid.get_chunk_bounds(1);

        let window = bounds.read_window(full.view()).unwrap().to_owned();
        assert_eq!(window.dim(), (5, 5));
        assert_eq!(window[[0, 0]], 3);

        let trimmed = bounds.trim(&window).unwrap();
        assert_eq!(trimmed.dim(), (4, 4));
        assert_eq!(trimmed[[0, 0]], 4);

        let wrong = Array2::<usize>::zeros((2, 2));
        assert!(bounds.trim(&wrong).is_err());
    }

    #[test]
    fn test_invalid_grid() {
        assert!(matches!(
            ChunkGrid::new(10, 10, 0, 1),
            Err(BendingError::InvalidChunkSize(0))
        ));
        assert!(ChunkGrid::new(0, 10, 4, 1).is_err());
    }
}
