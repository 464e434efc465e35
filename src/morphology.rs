use crate::config::{BlendConfig, Version};
use crate::element::StructuringElement;
use crate::error::{BendingError, Result};
use log::debug;
use ndarray::{Array2, ArrayView2, Zip};

/// Value assumed for cells outside the array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderValue {
    Zero,
    One,
}

impl BorderValue {
    fn as_bool(self) -> bool {
        matches!(self, BorderValue::One)
    }
}

fn neighbourhood_counts(
    mask: ArrayView2<bool>,
    se: &StructuringElement,
    border: BorderValue,
) -> Array2<u32> {
    let (rows, cols) = mask.dim();
    let border = border.as_bool() as u32;
    se.window_sums(rows, cols, |i, j| {
        if i < 0 || j < 0 || i >= rows as isize || j >= cols as isize {
            border
        } else {
            mask[[i as usize, j as usize]] as u32
        }
    })
}

/// Binary dilation; outside the raster counts as no coverage.
pub fn dilate(mask: ArrayView2<bool>, se: &StructuringElement) -> Array2<bool> {
    neighbourhood_counts(mask, se, BorderValue::Zero).mapv(|count| count > 0)
}

/// Binary erosion with an explicit border value.
pub fn erode(mask: ArrayView2<bool>, se: &StructuringElement, border: BorderValue) -> Array2<bool> {
    let full = se.cell_count() as u32;
    neighbourhood_counts(mask, se, border).mapv(|count| count == full)
}

/// Closing: dilation with border 0, then erosion with border 1 so the raster edge does
/// not eat into the result.
pub fn close(mask: ArrayView2<bool>, se: &StructuringElement) -> Array2<bool> {
    let dilated = dilate(mask, se);
    erode(dilated.view(), se, BorderValue::One)
}

pub fn xor(a: ArrayView2<bool>, b: ArrayView2<bool>) -> Array2<bool> {
    Zip::from(a).and(b).map_collect(|&x, &y| x ^ y)
}

/// Force coverage wherever the override mask forbids the background.
///
/// `background_allowed` is `false` for cells whose override raster value is 0.
pub fn apply_background_override(
    mask: ArrayView2<bool>,
    background_allowed: Option<ArrayView2<bool>>,
) -> Array2<bool> {
    match background_allowed {
        Some(allowed) => Zip::from(mask)
            .and(allowed)
            .map_collect(|&covered, &allowed| covered || !allowed),
        None => mask.to_owned(),
    }
}

/// Masks describing the transition zone of one block.
#[derive(Debug, Clone)]
pub struct TransitionZoneMasks {
    /// Coverage after the background override
    pub working: Array2<bool>,
    /// Dilated (or dilated and cleaned) coverage
    pub dilated: Array2<bool>,
    /// Eroded coverage, smooth version only
    pub eroded: Option<Array2<bool>>,
    /// Transition band
    pub diff: Array2<bool>,
}

impl TransitionZoneMasks {
    /// Mask whose cells keep the high-resolution value untouched.
    pub fn reference(&self) -> &Array2<bool> {
        self.eroded.as_ref().unwrap_or(&self.working)
    }
}

/// Single dilation; the band is every newly covered cell.
pub fn standard_transition_mask(
    mask: ArrayView2<bool>,
    se: &StructuringElement,
) -> (Array2<bool>, Array2<bool>) {
    let dilated = dilate(mask, se);
    let diff = xor(dilated.view(), mask);
    (dilated, diff)
}

/// Close holes and gaps in the dilated mask narrower than the reduced footprint.
///
/// Returns the cleaned mask and its difference to the working mask.
pub fn remove_small_patches(
    dilated: ArrayView2<bool>,
    working: ArrayView2<bool>,
    base: &StructuringElement,
    divisor: usize,
) -> Result<(Array2<bool>, Array2<bool>)> {
    let cleaning = base.reduced(divisor)?;
    Ok(remove_small_patches_with(dilated, working, &cleaning))
}

fn remove_small_patches_with(
    dilated: ArrayView2<bool>,
    working: ArrayView2<bool>,
    cleaning: &StructuringElement,
) -> (Array2<bool>, Array2<bool>) {
    let cleaned = close(dilated, cleaning);
    let diff = xor(cleaned.view(), working);
    (cleaned, diff)
}

/// Dilation and erosion radii of the smooth version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmoothRadii {
    pub dilation: usize,
    pub erosion: usize,
}

impl SmoothRadii {
    pub const MIN_EROSION: usize = 3;

    pub fn derive(buffer: usize, percentage: f64) -> Result<Self> {
        if !(0.0..=0.5).contains(&percentage) {
            return Err(BendingError::invalid_parameter(
                "percentage",
                percentage,
                "choose a value between 0.0 and 0.5",
            ));
        }
        let diameter = 2 * buffer + 1;
        let erosion = ((diameter as f64 * percentage).round_ties_even() as usize)
            .max(Self::MIN_EROSION);
        let mut dilation = diameter.saturating_sub(erosion);
        if dilation % 2 == 0 {
            dilation += 1;
        }
        Ok(Self { dilation, erosion })
    }
}

/// Asymmetric band: dilated with one disk, eroded (border 0) with a smaller one.
pub fn smooth_transition_mask(
    mask: ArrayView2<bool>,
    buffer: usize,
    percentage: f64,
) -> Result<(Array2<bool>, Array2<bool>, Array2<bool>)> {
    let radii = SmoothRadii::derive(buffer, percentage)?;
    let dilation = StructuringElement::disk(radii.dilation)?;
    let erosion = StructuringElement::disk(radii.erosion)?;
    Ok(smooth_transition_mask_with(mask, &dilation, &erosion))
}

fn smooth_transition_mask_with(
    mask: ArrayView2<bool>,
    dilation: &StructuringElement,
    erosion: &StructuringElement,
) -> (Array2<bool>, Array2<bool>, Array2<bool>) {
    let dilated = dilate(mask, dilation);
    let eroded = erode(mask, erosion, BorderValue::Zero);
    let diff = xor(dilated.view(), eroded.view());
    (dilated, eroded, diff)
}

/// Structuring elements for one run, built once and shared by every block.
#[derive(Debug, Clone)]
pub enum TransitionPlan {
    Standard {
        footprint: StructuringElement,
        cleaning: Option<StructuringElement>,
    },
    Smooth {
        dilation: StructuringElement,
        erosion: StructuringElement,
    },
}

impl TransitionPlan {
    pub fn new(config: &BlendConfig, footprint: &StructuringElement) -> Result<Self> {
        match config.version {
            Version::Standard => {
                let cleaning = if config.remove_small_patches {
                    Some(footprint.reduced(config.remove_divisor)?)
                } else {
                    None
                };
                Ok(TransitionPlan::Standard {
                    footprint: footprint.clone(),
                    cleaning,
                })
            }
            Version::Smooth => {
                let radii = SmoothRadii::derive(config.buffer, config.percentage)?;
                debug!(
                    "Smooth radii: dilation={}, erosion={}",
                    radii.dilation, radii.erosion
                );
                Ok(TransitionPlan::Smooth {
                    dilation: StructuringElement::disk(radii.dilation)?,
                    erosion: StructuringElement::disk(radii.erosion)?,
                })
            }
        }
    }

    /// Halo needed for every mask in [`TransitionZoneMasks`] to be exact.
    pub fn depth(&self) -> usize {
        match self {
            TransitionPlan::Standard { footprint, cleaning } => {
                footprint.radius() + cleaning.as_ref().map_or(0, |c| 2 * c.radius())
            }
            TransitionPlan::Smooth { dilation, erosion } => dilation.radius().max(erosion.radius()),
        }
    }

    /// Farthest a band cell can be from either weight target around isolated coverage.
    ///
    /// A closing can bridge cells up to twice its radius beyond the dilation. In the
    /// smooth version a cell on the dilated edge sits the dilation plus the erosion
    /// from the eroded core, and up to `erosion·√2` more at convex corners.
    pub fn band_radius(&self) -> usize {
        match self {
            TransitionPlan::Standard { footprint, cleaning } => {
                footprint.radius() + cleaning.as_ref().map_or(0, |c| 2 * c.radius())
            }
            TransitionPlan::Smooth { dilation, erosion } => {
                dilation.radius() + 2 * erosion.radius()
            }
        }
    }

    /// Radius within which the eroded mask must be valid around output cells.
    pub fn erosion_radius(&self) -> usize {
        match self {
            TransitionPlan::Standard { .. } => 0,
            TransitionPlan::Smooth { erosion, .. } => erosion.radius(),
        }
    }

    pub fn apply(&self, working: Array2<bool>) -> TransitionZoneMasks {
        match self {
            TransitionPlan::Standard { footprint, cleaning } => {
                let (dilated, diff) = standard_transition_mask(working.view(), footprint);
                let (dilated, diff) = match cleaning {
                    Some(cleaning) => {
                        remove_small_patches_with(dilated.view(), working.view(), cleaning)
                    }
                    None => (dilated, diff),
                };
                TransitionZoneMasks {
                    working,
                    dilated,
                    eroded: None,
                    diff,
                }
            }
            TransitionPlan::Smooth { dilation, erosion } => {
                let (dilated, eroded, diff) =
                    smooth_transition_mask_with(working.view(), dilation, erosion);
                TransitionZoneMasks {
                    working,
                    dilated,
                    eroded: Some(eroded),
                    diff,
                }
            }
        }
    }
}
