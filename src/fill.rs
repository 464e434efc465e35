use crate::config::Version;
use crate::element::StructuringElement;
use crate::morphology::TransitionZoneMasks;
use ndarray::{Array2, ArrayView2, Zip};

/// Boundary handling for [`convolve_sum`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Boundary<T> {
    /// Mirror about the edge, repeating the edge sample (`d c b a | a b c d | d c b a`)
    Reflect,
    Constant(T),
}

/// Map an out-of-range index back into `0..len` by half-sample reflection.
fn reflect_index(index: isize, len: usize) -> usize {
    let len = len as isize;
    let period = 2 * len;
    let m = index.rem_euclid(period);
    if m < len {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

/// Sum of `data` over the footprint centred on every cell.
pub fn convolve_sum<T>(data: ArrayView2<T>, se: &StructuringElement, boundary: Boundary<T>) -> Array2<T>
where
    T: Copy + Default + std::ops::Add<Output = T> + std::ops::Sub<Output = T>,
{
    let (rows, cols) = data.dim();
    se.window_sums(rows, cols, |i, j| {
        let inside = i >= 0 && j >= 0 && i < rows as isize && j < cols as isize;
        match boundary {
            _ if inside => data[[i as usize, j as usize]],
            Boundary::Reflect => data[[reflect_index(i, rows), reflect_index(j, cols)]],
            Boundary::Constant(value) => value,
        }
    })
}

/// Select the high-resolution value on the working mask and the background elsewhere,
/// truncated to integers. `None` marks no-data.
pub fn merge_sources(
    working: ArrayView2<bool>,
    high_res: ArrayView2<f32>,
    background: ArrayView2<f32>,
) -> Array2<Option<i64>> {
    Zip::from(working)
        .and(high_res)
        .and(background)
        .map_collect(|&covered, &high, &low| {
            let value = if covered { high } else { low };
            value.is_finite().then(|| value as i64)
        })
}

/// Locally averaged merge of both sources.
///
/// Values and the valid-cell divisor are both reflected at the array edge, so a
/// mirrored no-data cell counts on neither side of the division.
pub fn averaged_merge(
    working: ArrayView2<bool>,
    high_res: ArrayView2<f32>,
    background: ArrayView2<f32>,
    footprint: &StructuringElement,
) -> Array2<f32> {
    let merged = merge_sources(working, high_res, background);
    let values = merged.mapv(|v| v.unwrap_or(0));
    let valid = merged.mapv(|v| v.is_some() as i64);

    let sums = convolve_sum(values.view(), footprint, Boundary::Reflect);
    let counts = convolve_sum(valid.view(), footprint, Boundary::Reflect);

    Zip::from(&sums).and(&counts).map_collect(|&sum, &count| {
        if count > 0 {
            (sum as f64 / count as f64) as f32
        } else {
            f32::NAN
        }
    })
}

/// Fill the transition zone: keep the high-resolution value on the reference mask
/// (working mask for standard, eroded mask for smooth) and the local average elsewhere.
pub fn fill_transition_zone(
    masks: &TransitionZoneMasks,
    high_res: ArrayView2<f32>,
    background: ArrayView2<f32>,
    footprint: &StructuringElement,
    version: Version,
) -> Array2<f32> {
    let averaged = averaged_merge(masks.working.view(), high_res, background, footprint);
    let keep = match version {
        Version::Standard => &masks.working,
        Version::Smooth => masks.reference(),
    };

    Zip::from(keep)
        .and(high_res)
        .and(&averaged)
        .map_collect(|&keep, &high, &avg| if keep { high } else { avg })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morphology::standard_transition_mask;
    use ndarray::arr2;

    #[test]
    fn test_reflect_index() {
        // d c b a | a b c d | d c b a
        assert_eq!(reflect_index(-1, 4), 0);
        assert_eq!(reflect_index(-2, 4), 1);
        assert_eq!(reflect_index(4, 4), 3);
        assert_eq!(reflect_index(5, 4), 2);
        assert_eq!(reflect_index(2, 4), 2);
        // wider than the array
        assert_eq!(reflect_index(-5, 2), 0);
        assert_eq!(reflect_index(3, 1), 0);
    }

    #[test]
    fn test_convolve_reflect_at_edge() {
        let data = arr2(&[[1i64, 2, 3]]);
        let se = StructuringElement::square(1).unwrap();
        let sums = convolve_sum(data.view(), &se, Boundary::Reflect);
        // rows reflect onto themselves: 3 × (1 + 1 + 2) at the left edge
        assert_eq!(sums[[0, 0]], 12);
        assert_eq!(sums[[0, 1]], 18);
        assert_eq!(sums[[0, 2]], 24);
    }

    #[test]
    fn test_convolve_constant_ones_is_cell_count() {
        let ones = Array2::from_elem((6, 5), 1i64);
        let se = StructuringElement::disk(3).unwrap();
        let counts = convolve_sum(ones.view(), &se, Boundary::Constant(1));
        assert!(counts.iter().all(|&c| c as usize == se.cell_count()));
    }

    #[test]
    fn test_merge_truncates_and_flags_nodata() {
        let working = arr2(&[[true, false, false]]);
        let high = arr2(&[[-12.7f32, 0.0, 0.0]]);
        let low = arr2(&[[0.0f32, 55.9, f32::NAN]]);
        let merged = merge_sources(working.view(), high.view(), low.view());
        assert_eq!(merged, arr2(&[[Some(-12), Some(55), None]]));
    }

    #[test]
    fn test_average_ignores_nodata_reflected_at_edge() {
        let working = Array2::from_elem((1, 3), false);
        let high = Array2::from_elem((1, 3), 0.0f32);
        let low = arr2(&[[f32::NAN, 20.0, 40.0]]);
        let se = StructuringElement::disk(1).unwrap();

        let averaged = averaged_merge(working.view(), high.view(), low.view(), &se);
        // every mirrored copy of the missing edge cell drops out of the divisor too
        assert_eq!(averaged[[0, 0]], 20.0);
        assert_eq!(averaged[[0, 1]], 25.0);
        assert_eq!(averaged[[0, 2]], 36.0);
    }

    #[test]
    fn test_fill_standard_keeps_high_res_inside_mask() {
        let working = Array2::from_shape_fn((7, 7), |(i, j)| (2..5).contains(&i) && (2..5).contains(&j));
        let high = Array2::from_elem((7, 7), 100.0f32);
        let low = Array2::from_elem((7, 7), 50.0f32);
        let se = StructuringElement::disk(1).unwrap();
        let (dilated, diff) = standard_transition_mask(working.view(), &se);
        let masks = TransitionZoneMasks {
            working,
            dilated,
            eroded: None,
            diff,
        };

        let filled = fill_transition_zone(&masks, high.view(), low.view(), &se, Version::Standard);
        assert_eq!(filled[[3, 3]], 100.0);
        // one covered neighbour out of five footprint cells
        assert!((filled[[1, 3]] - 60.0).abs() < 1e-4);
        assert_eq!(filled[[0, 0]], 50.0);
    }

    #[test]
    fn test_fill_smooth_uses_eroded_mask() {
        let working = Array2::from_elem((5, 5), true);
        let mut eroded = Array2::from_elem((5, 5), false);
        eroded[[2, 2]] = true;
        let masks = TransitionZoneMasks {
            dilated: working.clone(),
            diff: eroded.mapv(|e| !e),
            working,
            eroded: Some(eroded),
        };
        let high = Array2::from_elem((5, 5), 10.0f32);
        let low = Array2::from_elem((5, 5), 0.0f32);
        let se = StructuringElement::disk(1).unwrap();

        let filled = fill_transition_zone(&masks, high.view(), low.view(), &se, Version::Smooth);
        assert_eq!(filled[[2, 2]], 10.0);
        // averaged over an all-covered neighbourhood
        assert!((filled[[0, 0]] - 10.0).abs() < 1e-6);
    }
}
