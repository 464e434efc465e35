use crate::error::{BendingError, Result};
use gdal::Dataset;
use log::{debug, info};

/// Validate compression type
pub fn validate_compression(compression: &str) -> Result<()> {
    let valid_types = ["DEFLATE", "LZW", "ZSTD", "NONE"];
    if !valid_types.contains(&compression) {
        return Err(BendingError::InvalidCompression(compression.to_string()));
    }
    Ok(())
}

/// Validate tile size (must be multiple of 16)
pub fn validate_tile_size(tile_size: usize) -> Result<()> {
    if tile_size == 0 || tile_size % 16 != 0 {
        return Err(BendingError::InvalidTileSize(tile_size));
    }
    Ok(())
}

/// GeoTIFF creation options for tiled, compressed output
pub fn create_dataset_options(compression: &str, tile_size: usize) -> Vec<String> {
    let mut options = vec![
        format!("COMPRESS={}", compression),
        "TILED=YES".to_string(),
        format!("BLOCKXSIZE={}", tile_size),
        format!("BLOCKYSIZE={}", tile_size),
        "BIGTIFF=IF_SAFER".to_string(),
    ];
    if compression == "DEFLATE" {
        // horizontal differencing suits smooth integer depth grids
        options.push("PREDICTOR=2".to_string());
        options.push("ZLEVEL=6".to_string());
    }
    options
}

/// Build internal overviews (powers of 2 down to 256 cells)
pub fn build_overviews(dataset: &mut Dataset, resampling: &str) -> Result<()> {
    let (width, height) = dataset.raster_size();
    let overview_levels = overview_levels(width.min(height));

    if overview_levels.is_empty() {
        debug!("Raster too small for overviews ({}x{}), skipping", width, height);
        return Ok(());
    }

    info!(
        "Creating {} overview levels ({}): {:?}",
        overview_levels.len(),
        resampling,
        overview_levels
    );

    dataset
        .build_overviews(resampling, &overview_levels, &[])
        .map_err(|e| BendingError::CogCreationFailed(format!("Failed to build overviews: {}", e)))?;

    Ok(())
}

fn overview_levels(min_dim: usize) -> Vec<i32> {
    let mut levels = Vec::new();
    let mut level = 2;
    while min_dim / level >= 256 {
        levels.push(level as i32);
        level *= 2;
    }
    levels
}
