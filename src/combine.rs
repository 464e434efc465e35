use crate::distance::WeightFields;
use crate::morphology::TransitionZoneMasks;
use ndarray::{Array2, ArrayView2, Zip};

/// Which source a cell of the combined surface came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum CellSource {
    Background = 0,
    Composite = 1,
    Transition = 2,
}

impl CellSource {
    pub fn code(self) -> i16 {
        self as i16
    }
}

/// Weighted mean of both sides. Non-finite when either weight is infinite or both are
/// zero.
pub fn blend(inner: f32, outer: f32, composite: f32, background: f32) -> f32 {
    (inner * composite + outer * background) / (inner + outer)
}

/// Single source for a transition cell whose blend is not finite.
///
/// The dominating weight (infinite against finite, or the only non-zero one) decides;
/// otherwise membership in the reference mask does.
pub fn guarded_source(inner: f32, outer: f32, in_reference: bool) -> CellSource {
    let inner_wins =
        (inner.is_infinite() && outer.is_finite()) || (inner > 0.0 && outer == 0.0);
    let outer_wins =
        (outer.is_infinite() && inner.is_finite()) || (outer > 0.0 && inner == 0.0);
    match (inner_wins, outer_wins) {
        (true, false) => CellSource::Composite,
        (false, true) => CellSource::Background,
        _ if in_reference => CellSource::Composite,
        _ => CellSource::Background,
    }
}

/// Value of `source`, or the other side when that sample is missing.
fn take(source: CellSource, composite: f32, background: f32) -> (f32, CellSource) {
    match source {
        CellSource::Background if background.is_nan() && !composite.is_nan() => {
            (composite, CellSource::Composite)
        }
        CellSource::Background => (background, CellSource::Background),
        _ if composite.is_nan() && !background.is_nan() => (background, CellSource::Background),
        _ => (composite, CellSource::Composite),
    }
}

#[derive(Debug, Clone)]
pub struct Combined {
    pub surface: Array2<f32>,
    pub usage: Array2<CellSource>,
    /// Transition cells that fell back to a single source
    pub guarded: Array2<bool>,
}

impl Combined {
    pub fn guarded_count(&self) -> usize {
        self.guarded.iter().filter(|&&g| g).count()
    }
}

/// Combine the filled composite with the background.
///
/// Outside the dilated mask the background is used, inside the band the weighted
/// blend, and the composite everywhere else.
pub fn combine(
    composite: ArrayView2<f32>,
    background: ArrayView2<f32>,
    masks: &TransitionZoneMasks,
    weights: &WeightFields,
) -> Combined {
    let dim = composite.dim();
    let reference = masks.reference();
    let mut surface = Array2::<f32>::zeros(dim);
    let mut usage = Array2::from_elem(dim, CellSource::Background);
    let mut guarded = Array2::from_elem(dim, false);

    Zip::indexed(&mut surface)
        .and(&mut usage)
        .and(&mut guarded)
        .and(composite)
        .and(background)
        .for_each(|idx, out, used, fell_back, &c, &b| {
            let (value, source) = if !masks.dilated[idx] {
                (b, CellSource::Background)
            } else if masks.diff[idx] {
                let (wi, wo) = (weights.inner[idx], weights.outer[idx]);
                let value = blend(wi, wo, c, b);
                if value.is_finite() {
                    (value, CellSource::Transition)
                } else {
                    *fell_back = true;
                    take(guarded_source(wi, wo, reference[idx]), c, b)
                }
            } else {
                take(CellSource::Composite, c, b)
            };
            *out = value;
            *used = source;
        });

    Combined {
        surface,
        usage,
        guarded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn masks_3x3(dilated: Array2<bool>, diff: Array2<bool>, working: Array2<bool>) -> TransitionZoneMasks {
        TransitionZoneMasks {
            working,
            dilated,
            eroded: None,
            diff,
        }
    }

    #[test]
    fn test_blend_weighted_mean() {
        assert_eq!(blend(1.0, 1.0, 100.0, 50.0), 75.0);
        assert_eq!(blend(1.0, 0.25, 100.0, 0.0), 80.0);
        assert!(blend(f32::INFINITY, 1.0, 100.0, 50.0).is_nan());
        assert!(blend(0.0, 0.0, 100.0, 50.0).is_nan());
    }

    #[test]
    fn test_guarded_source() {
        assert_eq!(guarded_source(f32::INFINITY, 1.0, false), CellSource::Composite);
        assert_eq!(guarded_source(1.0, f32::INFINITY, true), CellSource::Background);
        assert_eq!(guarded_source(f32::INFINITY, f32::INFINITY, true), CellSource::Composite);
        assert_eq!(guarded_source(0.0, 0.0, false), CellSource::Background);
        assert_eq!(guarded_source(f32::NAN, f32::NAN, true), CellSource::Composite);
    }

    #[test]
    fn test_background_wins_outside_dilation() {
        // centre cell has dilated = 0 but a band flag and a valid blend
        let dilated = arr2(&[[true, true, true], [true, false, true], [true, true, true]]);
        let diff = Array2::from_elem((3, 3), true);
        let working = Array2::from_elem((3, 3), false);
        let masks = masks_3x3(dilated, diff, working);
        let weights = WeightFields {
            inner: Array2::from_elem((3, 3), 1.0),
            outer: Array2::from_elem((3, 3), 1.0),
        };
        let composite = Array2::from_elem((3, 3), 100.0f32);
        let background = Array2::from_elem((3, 3), 50.0f32);

        let out = combine(composite.view(), background.view(), &masks, &weights);
        assert_eq!(out.surface[[1, 1]], 50.0);
        assert_eq!(out.usage[[1, 1]], CellSource::Background);
        assert_eq!(out.surface[[0, 0]], 75.0);
        assert_eq!(out.usage[[0, 0]], CellSource::Transition);
    }

    #[test]
    fn test_composite_inside_coverage() {
        let dilated = Array2::from_elem((3, 3), true);
        let diff = Array2::from_elem((3, 3), false);
        let masks = masks_3x3(dilated, diff, Array2::from_elem((3, 3), true));
        let weights = WeightFields {
            inner: Array2::from_elem((3, 3), f32::INFINITY),
            outer: Array2::from_elem((3, 3), 0.0),
        };
        let composite = Array2::from_elem((3, 3), 100.0f32);
        let background = Array2::from_elem((3, 3), 50.0f32);

        let out = combine(composite.view(), background.view(), &masks, &weights);
        assert!(out.surface.iter().all(|&v| v == 100.0));
        assert!(out.usage.iter().all(|&u| u == CellSource::Composite));
        assert_eq!(out.guarded_count(), 0);
    }

    #[test]
    fn test_non_finite_weight_is_guarded() {
        let dilated = Array2::from_elem((3, 3), true);
        let diff = Array2::from_elem((3, 3), true);
        let masks = masks_3x3(dilated, diff, Array2::from_elem((3, 3), false));
        let mut inner = Array2::from_elem((3, 3), 1.0f32);
        inner[[1, 1]] = f32::INFINITY;
        let mut outer = Array2::from_elem((3, 3), 1.0f32);
        outer[[0, 2]] = f32::INFINITY;
        inner[[0, 2]] = f32::INFINITY;
        let weights = WeightFields { inner, outer };
        let composite = Array2::from_elem((3, 3), 100.0f32);
        let background = Array2::from_elem((3, 3), 50.0f32);

        let out = combine(composite.view(), background.view(), &masks, &weights);
        assert!(out.surface.iter().all(|v| v.is_finite()));
        assert_eq!(out.surface[[1, 1]], 100.0);
        assert_eq!(out.usage[[1, 1]], CellSource::Composite);
        // both infinite, cell outside the reference mask
        assert_eq!(out.surface[[0, 2]], 50.0);
        assert_eq!(out.usage[[0, 2]], CellSource::Background);
        assert_eq!(out.guarded_count(), 2);
        assert!(out.guarded[[1, 1]] && out.guarded[[0, 2]]);
        assert_eq!(out.surface[[2, 2]], 75.0);
    }

    #[test]
    fn test_missing_sample_falls_back_to_other_source() {
        let masks = TransitionZoneMasks {
            working: arr2(&[[true, false]]),
            dilated: arr2(&[[true, false]]),
            eroded: None,
            diff: arr2(&[[false, false]]),
        };
        let weights = WeightFields {
            inner: Array2::zeros((1, 2)),
            outer: Array2::zeros((1, 2)),
        };
        let composite = arr2(&[[f32::NAN, 10.0]]);
        let background = arr2(&[[20.0f32, f32::NAN]]);

        let out = combine(composite.view(), background.view(), &masks, &weights);
        // hole in the composite inside coverage
        assert_eq!(out.surface[[0, 0]], 20.0);
        assert_eq!(out.usage[[0, 0]], CellSource::Background);
        // background no-data outside coverage stays no-data
        assert!(out.surface[[0, 1]].is_nan());
        assert_eq!(out.usage[[0, 1]], CellSource::Background);
    }

    #[test]
    fn test_cell_source_codes() {
        assert_eq!(CellSource::Background.code(), 0);
        assert_eq!(CellSource::Composite.code(), 1);
        assert_eq!(CellSource::Transition.code(), 2);
    }
}
