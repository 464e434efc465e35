use crate::error::{BendingError, Result};
use log::warn;
use ndarray::Array2;
use std::ops::{Add, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementShape {
    /// Slightly enlarged disk: `dx² + dy² <= r² + r/2`
    Disk,
    /// Full square
    Square,
}

/// Square kernel of side `2r+1`. Rows are contiguous and centred, so morphology and
/// convolution run as per-row prefix sums.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    shape: ElementShape,
    radius: usize,
    /// Half-width of each kernel row, top to bottom (`2r+1` entries)
    half_widths: Vec<usize>,
}

impl StructuringElement {
    /// Circular buffer of the given radius.
    pub fn disk(radius: usize) -> Result<Self> {
        if radius < 1 {
            return Err(BendingError::InvalidRadius(radius));
        }

        let r = radius as i64;
        let threshold = r * r + r / 2;
        let half_widths = (-r..=r)
            .map(|dy| {
                let remaining = threshold - dy * dy;
                // largest dx with dx² <= remaining
                let mut dx = (remaining as f64).sqrt() as i64;
                while dx * dx > remaining {
                    dx -= 1;
                }
                while (dx + 1) * (dx + 1) <= remaining {
                    dx += 1;
                }
                dx as usize
            })
            .collect();

        Ok(Self {
            shape: ElementShape::Disk,
            radius,
            half_widths,
        })
    }

    pub fn square(radius: usize) -> Result<Self> {
        if radius < 1 {
            return Err(BendingError::InvalidRadius(radius));
        }
        Ok(Self {
            shape: ElementShape::Square,
            radius,
            half_widths: vec![radius; 2 * radius + 1],
        })
    }

    /// The 3×3 square substituted whenever a derived disk would collapse to a single cell.
    pub fn fallback() -> Self {
        Self {
            shape: ElementShape::Square,
            radius: 1,
            half_widths: vec![1; 3],
        }
    }

    /// Disk of radius `radius / divisor`, or the fallback square when that rounds down to 0.
    pub fn reduced(&self, divisor: usize) -> Result<Self> {
        if divisor == 0 {
            return Err(BendingError::invalid_parameter(
                "remove_divisor",
                divisor,
                "divisor must be at least 1",
            ));
        }
        let radius = self.radius / divisor;
        if radius == 0 {
            warn!(
                "Reduced structuring element degenerates (radius {} / {} = 0), using 3x3 square",
                self.radius, divisor
            );
            return Ok(Self::fallback());
        }
        Self::disk(radius)
    }

    pub fn shape(&self) -> ElementShape {
        self.shape
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    pub fn side(&self) -> usize {
        2 * self.radius + 1
    }

    pub fn cell_count(&self) -> usize {
        self.half_widths.iter().map(|w| 2 * w + 1).sum()
    }

    pub fn contains(&self, dy: isize, dx: isize) -> bool {
        let r = self.radius as isize;
        if dy < -r || dy > r {
            return false;
        }
        dx.unsigned_abs() <= self.half_widths[(dy + r) as usize]
    }

    /// Boolean kernel as a `side × side` array.
    pub fn to_array(&self) -> Array2<bool> {
        let r = self.radius as isize;
        Array2::from_shape_fn((self.side(), self.side()), |(i, j)| {
            self.contains(i as isize - r, j as isize - r)
        })
    }

    /// Sum of `fetch(row, col)` over the kernel footprint centred on every cell of a
    /// `rows × cols` grid.
    ///
    /// `fetch` is called with coordinates up to `radius` outside the grid and is
    /// responsible for the boundary policy (constant border, reflection, ...).
    pub(crate) fn window_sums<T, F>(&self, rows: usize, cols: usize, fetch: F) -> Array2<T>
    where
        T: Copy + Default + Add<Output = T> + Sub<Output = T>,
        F: Fn(isize, isize) -> T,
    {
        let r = self.radius;
        let padded_rows = rows + 2 * r;
        let padded_cols = cols + 2 * r;

        // prefix[[pr, pc]] = sum of padded row pr over columns [0, pc)
        let mut prefix = Array2::<T>::default((padded_rows, padded_cols + 1));
        for pr in 0..padded_rows {
            let mut acc = T::default();
            for pc in 0..padded_cols {
                acc = acc + fetch(pr as isize - r as isize, pc as isize - r as isize);
                prefix[[pr, pc + 1]] = acc;
            }
        }

        Array2::from_shape_fn((rows, cols), |(i, j)| {
            let mut total = T::default();
            for (k, &w) in self.half_widths.iter().enumerate() {
                let pr = i + k;
                let centre = j + r;
                total = total + (prefix[[pr, centre + w + 1]] - prefix[[pr, centre - w]]);
            }
            total
        })
    }
}
