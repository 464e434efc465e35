use crate::chunking::{ChunkBounds, ChunkGrid};
use crate::combine::combine;
use crate::config::BlendConfig;
use crate::distance::WeightFields;
use crate::element::StructuringElement;
use crate::error::{BendingError, Result};
use crate::fill::fill_transition_zone;
use crate::morphology::{apply_background_override, TransitionPlan};
use log::{debug, info, warn};
use ndarray::{s, Array2, ArrayView2};
use rayon::prelude::*;

/// No-data value of the combined surface.
pub const OUTPUT_NODATA: i16 = i16::MIN;

/// Everything a block computation needs, built once per run.
///
/// The halo covers the morphology depth plus the distance cap, so distances on
/// output cells never see a mask value the block got wrong near its window edge.
#[derive(Debug, Clone)]
pub struct BendingPlan {
    config: BlendConfig,
    footprint: StructuringElement,
    transition: TransitionPlan,
    distance_cap: f32,
    halo: usize,
}

impl BendingPlan {
    pub fn new(config: BlendConfig) -> Result<Self> {
        let footprint = StructuringElement::disk(config.buffer)?;
        let transition = TransitionPlan::new(&config, &footprint)?;

        let distance_cap = transition.band_radius() + 1;
        let fill_depth = footprint.radius().max(transition.erosion_radius());
        let halo = (transition.depth() + distance_cap).max(fill_depth);

        debug!(
            "Plan: footprint radius={}, morphology depth={}, distance cap={}, halo={}",
            footprint.radius(),
            transition.depth(),
            distance_cap,
            halo
        );

        Ok(Self {
            config,
            footprint,
            transition,
            distance_cap: distance_cap as f32,
            halo,
        })
    }

    pub fn config(&self) -> &BlendConfig {
        &self.config
    }

    pub fn footprint(&self) -> &StructuringElement {
        &self.footprint
    }

    pub fn halo(&self) -> usize {
        self.halo
    }

    pub fn chunk_grid(&self, width: usize, height: usize) -> Result<ChunkGrid> {
        ChunkGrid::new(width, height, self.config.block_size, self.halo)
    }
}

/// Padded input windows of one block.
#[derive(Debug, Clone)]
pub struct BlockInputs {
    pub high_res: Array2<f32>,
    pub background: Array2<f32>,
    pub mask: Array2<bool>,
    /// `false` where the background must not be used
    pub background_allowed: Option<Array2<bool>>,
}

/// Trimmed results of one block.
#[derive(Debug, Clone)]
pub struct BlockOutput {
    pub surface: Array2<i16>,
    pub usage: Array2<i16>,
    pub guarded: usize,
}

/// Round and clamp to the output range, keeping `i16::MIN` for no-data.
pub fn to_output_value(value: f32) -> i16 {
    if value.is_finite() {
        value.round().clamp(-(i16::MAX as f32), i16::MAX as f32) as i16
    } else {
        OUTPUT_NODATA
    }
}

fn check_block_shapes(inputs: &BlockInputs) -> Result<()> {
    let dim = inputs.mask.dim();
    let mut shapes = vec![
        ("nearneighbor", inputs.high_res.dim()),
        ("surface", inputs.background.dim()),
    ];
    if let Some(allowed) = &inputs.background_allowed {
        shapes.push(("mask_srtm", allowed.dim()));
    }
    for (name, shape) in shapes {
        if shape != dim {
            return Err(BendingError::shape_mismatch(
                name,
                format!("block shape {:?} differs from mask {:?}", shape, dim),
            ));
        }
    }
    Ok(())
}

/// Run the whole blend on one padded block and trim the halo.
pub fn process_block(
    plan: &BendingPlan,
    bounds: &ChunkBounds,
    inputs: &BlockInputs,
) -> Result<BlockOutput> {
    check_block_shapes(inputs)?;

    let working = apply_background_override(
        inputs.mask.view(),
        inputs.background_allowed.as_ref().map(|a| a.view()),
    );
    let masks = plan.transition.apply(working);
    let weights = WeightFields::compute(&masks, plan.distance_cap);
    let filled = fill_transition_zone(
        &masks,
        inputs.high_res.view(),
        inputs.background.view(),
        &plan.footprint,
        plan.config.version,
    );
    let combined = combine(filled.view(), inputs.background.view(), &masks, &weights);

    let surface = bounds.trim(&combined.surface)?.mapv(to_output_value);
    let usage = bounds.trim(&combined.usage)?.mapv(|source| source.code());
    let guarded = bounds
        .trim(&combined.guarded)?
        .iter()
        .filter(|&&g| g)
        .count();

    Ok(BlockOutput {
        surface,
        usage,
        guarded,
    })
}

/// Source of padded block windows.
pub trait BlockSource {
    /// Raster size as `(width, height)`.
    fn dimensions(&self) -> (usize, usize);

    fn read_block(&self, bounds: &ChunkBounds) -> Result<BlockInputs>;
}

/// Destination of trimmed block results.
pub trait BlockSink {
    fn write_block(&mut self, bounds: &ChunkBounds, block: &BlockOutput) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub blocks: usize,
    /// Transition cells resolved by the numeric guard
    pub guarded: usize,
}

fn block_error(index: usize) -> impl Fn(BendingError) -> BendingError {
    move |e| BendingError::BlockCompute {
        index,
        source: Box::new(e),
    }
}

/// Blend every block of `source` into `sink`.
///
/// Blocks are read in batches of one per rayon thread. The first failing block aborts
/// the run; whatever the sink already received must then be discarded by the caller.
pub fn run_blocks<S, W>(source: &S, sink: &mut W, plan: &BendingPlan) -> Result<RunSummary>
where
    S: BlockSource + ?Sized,
    W: BlockSink + ?Sized,
{
    let (width, height) = source.dimensions();
    let grid = plan.chunk_grid(width, height)?;
    let batch_size = rayon::current_num_threads().max(1);
    let chunks: Vec<(usize, ChunkBounds)> = grid.iter().collect();

    info!(
        "Processing {} blocks ({}x{} cells, halo {}) in batches of {}",
        grid.total_chunks,
        plan.config.block_size,
        plan.config.block_size,
        grid.padding(),
        batch_size
    );

    let mut summary = RunSummary::default();
    for batch in chunks.chunks(batch_size) {
        let mut loaded = Vec::with_capacity(batch.len());
        for (idx, bounds) in batch {
            let inputs = source.read_block(bounds).map_err(block_error(*idx))?;
            loaded.push((*idx, bounds, inputs));
        }

        let results: Vec<(usize, &ChunkBounds, BlockOutput)> = loaded
            .into_par_iter()
            .map(|(idx, bounds, inputs)| {
                process_block(plan, bounds, &inputs)
                    .map(|out| (idx, bounds, out))
                    .map_err(block_error(idx))
            })
            .collect::<Result<_>>()?;

        for (idx, bounds, out) in &results {
            sink.write_block(bounds, out).map_err(block_error(*idx))?;
            summary.guarded += out.guarded;
            summary.blocks += 1;
        }

        info!("Blocks done: {}/{}", summary.blocks, grid.total_chunks);
    }

    if summary.guarded > 0 {
        warn!(
            "{} transition cells had non-finite weights and fell back to a single source",
            summary.guarded
        );
    }

    Ok(summary)
}

/// In-memory co-registered inputs.
pub struct ArraySource<'a> {
    high_res: ArrayView2<'a, f32>,
    background: ArrayView2<'a, f32>,
    mask: ArrayView2<'a, bool>,
    background_allowed: Option<ArrayView2<'a, bool>>,
}

impl<'a> ArraySource<'a> {
    pub fn new(
        high_res: ArrayView2<'a, f32>,
        background: ArrayView2<'a, f32>,
        mask: ArrayView2<'a, bool>,
        background_allowed: Option<ArrayView2<'a, bool>>,
    ) -> Result<Self> {
        let dim = mask.dim();
        if dim.0 == 0 || dim.1 == 0 {
            return Err(BendingError::InvalidDimensions(dim.1, dim.0));
        }
        let mut shapes = vec![("nearneighbor", high_res.dim()), ("surface", background.dim())];
        if let Some(allowed) = &background_allowed {
            shapes.push(("mask_srtm", allowed.dim()));
        }
        for (name, shape) in shapes {
            if shape != dim {
                return Err(BendingError::shape_mismatch(
                    name,
                    format!("shape {:?} differs from mask {:?}", shape, dim),
                ));
            }
        }
        Ok(Self {
            high_res,
            background,
            mask,
            background_allowed,
        })
    }
}

impl BlockSource for ArraySource<'_> {
    fn dimensions(&self) -> (usize, usize) {
        let (rows, cols) = self.mask.dim();
        (cols, rows)
    }

    fn read_block(&self, bounds: &ChunkBounds) -> Result<BlockInputs> {
        Ok(BlockInputs {
            high_res: bounds.read_window(self.high_res)?.to_owned(),
            background: bounds.read_window(self.background)?.to_owned(),
            mask: bounds.read_window(self.mask)?.to_owned(),
            background_allowed: self
                .background_allowed
                .map(|allowed| bounds.read_window(allowed).map(|w| w.to_owned()))
                .transpose()?,
        })
    }
}

/// In-memory outputs, initialised to no-data.
#[derive(Debug, Clone)]
pub struct ArraySink {
    pub surface: Array2<i16>,
    pub usage: Array2<i16>,
}

impl ArraySink {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            surface: Array2::from_elem((height, width), OUTPUT_NODATA),
            usage: Array2::zeros((height, width)),
        }
    }
}

impl BlockSink for ArraySink {
    fn write_block(&mut self, bounds: &ChunkBounds, block: &BlockOutput) -> Result<()> {
        let expected = (bounds.output_height(), bounds.output_width());
        if block.surface.dim() != expected || block.usage.dim() != expected {
            return Err(BendingError::InvalidChunkBounds(
                bounds.output_x_min,
                bounds.output_y_min,
                bounds.output_x_max,
                bounds.output_y_max,
                bounds.read_x_min,
                bounds.read_y_min,
                bounds.read_x_max,
                bounds.read_y_max,
            ));
        }
        let region = s![
            bounds.output_y_min..bounds.output_y_max,
            bounds.output_x_min..bounds.output_x_max
        ];
        self.surface.slice_mut(region).assign(&block.surface);
        self.usage.slice_mut(region).assign(&block.usage);
        Ok(())
    }
}

/// Blend in-memory rasters with the block pipeline.
pub fn blend_arrays<'a>(
    high_res: ArrayView2<'a, f32>,
    background: ArrayView2<'a, f32>,
    mask: ArrayView2<'a, bool>,
    background_allowed: Option<ArrayView2<'a, bool>>,
    config: BlendConfig,
) -> Result<(ArraySink, RunSummary)> {
    let source = ArraySource::new(high_res, background, mask, background_allowed)?;
    let plan = BendingPlan::new(config)?;
    let (width, height) = source.dimensions();
    let mut sink = ArraySink::new(width, height);
    let summary = run_blocks(&source, &mut sink, &plan)?;
    Ok((sink, summary))
}
