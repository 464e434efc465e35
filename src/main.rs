use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use std::path::Path;

use seabed_bending::cli::Args;
use seabed_bending::{cog, crs, pipeline};
use seabed_bending::{BendingError, BendingPlan, BlendConfig, GdalSink, GdalSource, Result};

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    info!("=== SEABED Raster Bending ===");

    // Set thread pool size if specified
    if let Some(n_threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build_global()
            .map_err(|e| BendingError::InvalidParameter {
                name: "threads",
                value: n_threads.to_string(),
                reason: e.to_string(),
            })?;
        info!("Using {} threads", n_threads);
    } else {
        info!("Using all available threads");
    }

    let config = BlendConfig::from_args(&args)?;
    cog::validate_compression(&args.compression)?;
    cog::validate_tile_size(args.tile_size)?;

    info!("surface:        {}", args.surface);
    info!("nearneighbor:   {}", args.nearneighbor);
    info!("mask:           {}", args.mask);
    info!("type:           {}", args.stats_type);
    info!("version:        {}", config.version);
    info!("buffer:         {} cells", config.buffer);
    if config.version == seabed_bending::Version::Smooth {
        info!("percentage:     {}", config.percentage);
    }
    if config.remove_small_patches {
        info!("remove patches: divisor {}", config.remove_divisor);
    }
    if let Some(srtm) = &args.mask_srtm {
        info!("mask_srtm:      {}", srtm);
    }

    let source = GdalSource::open(
        &args.surface,
        &args.nearneighbor,
        &args.mask,
        args.mask_srtm.as_deref(),
    )?;
    let metadata = source.metadata().clone();

    info!("Raster size: {}x{}", metadata.width, metadata.height);
    info!(
        "Pixel size: {:.6} x {:.6}",
        metadata.pixel_width, metadata.pixel_height
    );
    if (metadata.pixel_width - metadata.pixel_height).abs() > 1e-9 {
        warn!(
            "Non-square pixels detected ({:.6} x {:.6}), buffer is counted in cells",
            metadata.pixel_width, metadata.pixel_height
        );
    }
    crs::log_crs_summary(&metadata.projection);
    info!("Output no-data value: {}", pipeline::OUTPUT_NODATA);

    let plan = BendingPlan::new(config)?;

    let paths = args.output_paths();
    let outdir = args.output_dir();
    if !outdir.as_os_str().is_empty() {
        std::fs::create_dir_all(&outdir)?;
    }
    let composite_path = paths.composite.to_string_lossy().into_owned();
    let transition_path = paths.transition_zone.to_string_lossy().into_owned();

    let options = cog::create_dataset_options(&args.compression, args.tile_size);
    let mut sink = GdalSink::create(&composite_path, &transition_path, &metadata, options)?;

    let summary = match pipeline::run_blocks(&source, &mut sink, &plan) {
        Ok(summary) => summary,
        Err(e) => {
            drop(sink);
            discard_output(&paths.composite);
            discard_output(&paths.transition_zone);
            return Err(e);
        }
    };

    if args.overviews {
        cog::build_overviews(&mut sink.composite, "AVERAGE")?;
        cog::build_overviews(&mut sink.transition_zone, "NEAREST")?;
    }
    drop(sink);

    info!("Processed {} blocks", summary.blocks);
    if summary.guarded > 0 {
        info!(
            "{} transition cells used a single source instead of the blend",
            summary.guarded
        );
    }
    info!("Composite:       {}", composite_path);
    info!("Transition zone: {}", transition_path);
    info!("=== Done! ===");
    Ok(())
}

/// Remove a partially written output
fn discard_output(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => info!("Removed incomplete output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}
