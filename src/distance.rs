use crate::morphology::TransitionZoneMasks;
use ndarray::{Array2, ArrayView2, Axis};

/// Squared 1-D distance transform of `f` into `out`. Non-finite entries of `f` are
/// cells without a target; if every entry is non-finite, `out` is all `+inf`.
fn squared_edt_1d(f: &[f64], out: &mut [f64], v: &mut Vec<usize>, z: &mut Vec<f64>) {
    v.clear();
    z.clear();

    for (q, &fq) in f.iter().enumerate() {
        if !fq.is_finite() {
            continue;
        }
        let height_q = fq + (q * q) as f64;
        loop {
            let Some(&p) = v.last() else {
                v.push(q);
                z.push(f64::NEG_INFINITY);
                break;
            };
            let height_p = f[p] + (p * p) as f64;
            let s = (height_q - height_p) / (2.0 * (q - p) as f64);
            if z.last().is_some_and(|&left| s <= left) {
                v.pop();
                z.pop();
            } else {
                v.push(q);
                z.push(s);
                break;
            }
        }
    }

    if v.is_empty() {
        out.fill(f64::INFINITY);
        return;
    }

    let mut k = 0;
    for (q, slot) in out.iter_mut().enumerate() {
        while k + 1 < v.len() && z[k + 1] < q as f64 {
            k += 1;
        }
        let dx = q as f64 - v[k] as f64;
        *slot = f[v[k]] + dx * dx;
    }
}

/// Euclidean distance from every cell to the nearest cell whose value equals `target`.
///
/// Exact separable transform (Felzenszwalb & Huttenlocher): columns first, then rows.
///
/// Target cells get 0, cells with no target anywhere in the array get `+inf`.
pub fn distance_to(mask: ArrayView2<bool>, target: bool) -> Array2<f32> {
    let (rows, cols) = mask.dim();
    let mut squared = mask.mapv(|v| if v == target { 0.0 } else { f64::INFINITY });

    let longest = rows.max(cols);
    let mut input = vec![0.0; longest];
    let mut output = vec![0.0; longest];
    let mut v = Vec::with_capacity(longest);
    let mut z = Vec::with_capacity(longest + 1);

    for axis in [Axis(0), Axis(1)] {
        let len = squared.len_of(axis);
        for mut lane in squared.lanes_mut(axis) {
            for (slot, &value) in input[..len].iter_mut().zip(lane.iter()) {
                *slot = value;
            }
            squared_edt_1d(&input[..len], &mut output[..len], &mut v, &mut z);
            for (value, &result) in lane.iter_mut().zip(&output[..len]) {
                *value = result;
            }
        }
    }

    squared.mapv(|d2| d2.sqrt() as f32)
}

/// Clamp distances so values beyond `cap` cannot depend on how far the block reaches.
pub fn saturate(distances: &mut Array2<f32>, cap: f32) {
    distances.mapv_inplace(|d| d.min(cap));
}

/// `1 / d²`; zero distance gives `+inf`.
pub fn inverse_square(distances: &Array2<f32>) -> Array2<f32> {
    distances.mapv(|d| 1.0 / (d * d))
}

/// Inner and outer weights of the transition band.
#[derive(Debug, Clone)]
pub struct WeightFields {
    /// Weight of the high-resolution side, from the distance to the reference mask
    pub inner: Array2<f32>,
    /// Weight of the background side, from the distance to the uncovered cells
    pub outer: Array2<f32>,
}

impl WeightFields {
    /// Distances are clamped to `cap` before weighting.
    pub fn compute(masks: &TransitionZoneMasks, cap: f32) -> Self {
        let mut inner = distance_to(masks.reference().view(), true);
        let mut outer = distance_to(masks.dilated.view(), false);
        saturate(&mut inner, cap);
        saturate(&mut outer, cap);

        Self {
            inner: inverse_square(&inner),
            outer: inverse_square(&outer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn brute_force(mask: &Array2<bool>, target: bool) -> Array2<f32> {
        let (rows, cols) = mask.dim();
        Array2::from_shape_fn((rows, cols), |(i, j)| {
            let mut best = f64::INFINITY;
            for ((y, x), &v) in mask.indexed_iter() {
                if v == target {
                    let dy = y as f64 - i as f64;
                    let dx = x as f64 - j as f64;
                    best = best.min((dy * dy + dx * dx).sqrt());
                }
            }
            best as f32
        })
    }

    #[test]
    fn test_distance_matches_brute_force() {
        // deterministic pseudo-random mask
        let mut state = 12345u32;
        let mask = Array2::from_shape_fn((17, 23), |_| {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            (state >> 16) % 7 == 0
        });

        for target in [true, false] {
            let fast = distance_to(mask.view(), target);
            let slow = brute_force(&mask, target);
            for (a, b) in fast.iter().zip(slow.iter()) {
                assert!((a - b).abs() < 1e-5, "{} != {}", a, b);
            }
        }
    }

    #[test]
    fn test_distance_single_target() {
        let mask = arr2(&[
            [false, false, false],
            [false, true, false],
            [false, false, false],
        ]);
        let d = distance_to(mask.view(), true);
        assert_eq!(d[[1, 1]], 0.0);
        assert_eq!(d[[0, 1]], 1.0);
        assert!((d[[0, 0]] - 2f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_distance_without_target_is_infinite() {
        let mask = Array2::from_elem((4, 6), true);
        let d = distance_to(mask.view(), false);
        assert!(d.iter().all(|v| v.is_infinite()));
    }

    #[test]
    fn test_inverse_square() {
        let d = arr2(&[[0.0f32, 1.0], [2.0, f32::INFINITY]]);
        let w = inverse_square(&d);
        assert!(w[[0, 0]].is_infinite());
        assert_eq!(w[[0, 1]], 1.0);
        assert_eq!(w[[1, 0]], 0.25);
        assert_eq!(w[[1, 1]], 0.0);
    }

    #[test]
    fn test_weights_finite_across_band() {
        use crate::element::StructuringElement;
        use crate::morphology::standard_transition_mask;

        let working = Array2::from_shape_fn((15, 15), |(i, j)| (5..10).contains(&i) && (5..10).contains(&j));
        let se = StructuringElement::disk(3).unwrap();
        let (dilated, diff) = standard_transition_mask(working.view(), &se);
        let masks = TransitionZoneMasks {
            working,
            dilated,
            eroded: None,
            diff,
        };
        let weights = WeightFields::compute(&masks, 4.0);

        for ((idx, &band), (&wi, &wo)) in masks
            .diff
            .indexed_iter()
            .zip(weights.inner.iter().zip(weights.outer.iter()))
        {
            if band {
                assert!(wi.is_finite() && wi > 0.0, "inner weight at {:?}", idx);
                assert!(wo.is_finite() && wo > 0.0, "outer weight at {:?}", idx);
            }
        }
    }

    #[test]
    fn test_saturate() {
        let mut d = arr2(&[[1.0f32, 5.0], [f32::INFINITY, 0.0]]);
        saturate(&mut d, 3.0);
        assert_eq!(d, arr2(&[[1.0, 3.0], [3.0, 0.0]]));
    }
}
