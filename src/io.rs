use crate::chunking::ChunkBounds;
use crate::crs::crs_matches;
use crate::error::{BendingError, Result};
use crate::pipeline::{BlockInputs, BlockOutput, BlockSink, BlockSource, OUTPUT_NODATA};
use gdal::cpl::CslStringList;
use gdal::raster::{GdalType, RasterBand};
use gdal::{Dataset, DriverManager, Metadata};
use log::{debug, info};
use ndarray::Array2;

/// Geotransform coefficients closer than this are treated as equal
const GEOTRANSFORM_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct RasterMetadata {
    pub width: usize,
    pub height: usize,
    pub geotransform: [f64; 6],
    pub projection: String,
    pub nodata: Option<f64>,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

/// Open a single band raster and read its metadata
pub fn open_raster(path: &str) -> Result<(Dataset, RasterMetadata)> {
    info!("Opening input raster: {}", path);
    let dataset = Dataset::open(path)?;
    let metadata = extract_metadata_from_dataset(&dataset)?;

    debug!("Raster dimensions: {}x{}", metadata.width, metadata.height);
    debug!(
        "Pixel size: {:.6} x {:.6}, nodata: {:?}",
        metadata.pixel_width, metadata.pixel_height, metadata.nodata
    );

    Ok((dataset, metadata))
}

/// Extract metadata from a dataset without reading all data
pub fn extract_metadata_from_dataset(dataset: &Dataset) -> Result<RasterMetadata> {
    let rasterband: RasterBand = dataset.rasterband(1)?;

    let width = rasterband.x_size() as usize;
    let height = rasterband.y_size() as usize;

    if width == 0 || height == 0 {
        return Err(BendingError::InvalidDimensions(width, height));
    }

    let nodata = rasterband.no_data_value();
    let geotransform = dataset.geo_transform()?;
    let pixel_width = geotransform[1].abs();
    let pixel_height = geotransform[5].abs();

    if pixel_width <= 0.0 {
        return Err(BendingError::InvalidPixelSize(pixel_width));
    }

    Ok(RasterMetadata {
        width,
        height,
        geotransform,
        projection: dataset.projection(),
        nodata,
        pixel_width,
        pixel_height,
    })
}

/// Every input must share the grid of the surface raster
pub fn check_coregistered(
    name: &str,
    reference: &RasterMetadata,
    other: &RasterMetadata,
) -> Result<()> {
    if (reference.width, reference.height) != (other.width, other.height) {
        return Err(BendingError::shape_mismatch(
            name,
            format!(
                "raster is {}x{}, expected {}x{}",
                other.width, other.height, reference.width, reference.height
            ),
        ));
    }

    let offset = reference
        .geotransform
        .iter()
        .zip(other.geotransform.iter())
        .any(|(a, b)| (a - b).abs() > GEOTRANSFORM_TOLERANCE);
    if offset {
        return Err(BendingError::shape_mismatch(
            name,
            format!(
                "geotransform {:?} differs from {:?}",
                other.geotransform, reference.geotransform
            ),
        ));
    }

    if !crs_matches(&reference.projection, &other.projection)? {
        return Err(BendingError::shape_mismatch(name, "coordinate reference system differs"));
    }

    Ok(())
}

/// Read the padded window of `bounds` from band 1
fn read_padded_chunk<T: GdalType + Copy>(dataset: &Dataset, bounds: &ChunkBounds) -> Result<Array2<T>> {
    let rasterband = dataset.rasterband(1)?;

    let read_width = bounds.read_width();
    let read_height = bounds.read_height();

    debug!(
        "Reading chunk: offset=({},{}), size=({},{})",
        bounds.read_x_min, bounds.read_y_min, read_width, read_height
    );

    let buffer = rasterband.read_as::<T>(
        (bounds.read_x_min as isize, bounds.read_y_min as isize),
        (read_width, read_height),
        (read_width, read_height),
        None,
    )?;

    let data_vec: Vec<T> = buffer.into_iter().collect();
    let data = Array2::from_shape_vec((read_height, read_width), data_vec)?;

    Ok(data)
}

fn is_nodata(value: f32, nodata: Option<f64>) -> bool {
    match nodata {
        Some(nd) if nd.is_nan() => value.is_nan(),
        Some(nd) => value as f64 == nd,
        None => false,
    }
}

/// Depth samples with no-data mapped to NaN
pub fn read_samples(dataset: &Dataset, nodata: Option<f64>, bounds: &ChunkBounds) -> Result<Array2<f32>> {
    let mut data = read_padded_chunk::<f32>(dataset, bounds)?;
    data.mapv_inplace(|v| if is_nodata(v, nodata) { f32::NAN } else { v });
    Ok(data)
}

/// Coverage mask: positive, valid values are set
pub fn read_mask(dataset: &Dataset, nodata: Option<f64>, bounds: &ChunkBounds) -> Result<Array2<bool>> {
    let data = read_padded_chunk::<f32>(dataset, bounds)?;
    Ok(data.mapv(|v| v > 0.0 && !is_nodata(v, nodata)))
}

/// Background override: non-zero values allow the background through
pub fn read_override(dataset: &Dataset, bounds: &ChunkBounds) -> Result<Array2<bool>> {
    let data = read_padded_chunk::<f32>(dataset, bounds)?;
    Ok(data.mapv(|v| v != 0.0))
}

pub struct GdalInput {
    pub dataset: Dataset,
    pub metadata: RasterMetadata,
}

impl GdalInput {
    pub fn open(path: &str) -> Result<Self> {
        let (dataset, metadata) = open_raster(path)?;
        Ok(Self { dataset, metadata })
    }
}

/// Co-registered input rasters read block by block
pub struct GdalSource {
    pub surface: GdalInput,
    pub nearneighbor: GdalInput,
    pub mask: GdalInput,
    pub background_override: Option<GdalInput>,
}

impl GdalSource {
    /// Open all inputs and verify they share the surface grid
    pub fn open(
        surface: &str,
        nearneighbor: &str,
        mask: &str,
        background_override: Option<&str>,
    ) -> Result<Self> {
        let surface = GdalInput::open(surface)?;
        let nearneighbor = GdalInput::open(nearneighbor)?;
        let mask = GdalInput::open(mask)?;
        let background_override = background_override.map(GdalInput::open).transpose()?;

        check_coregistered("nearneighbor", &surface.metadata, &nearneighbor.metadata)?;
        check_coregistered("mask", &surface.metadata, &mask.metadata)?;
        if let Some(over) = &background_override {
            check_coregistered("mask_srtm", &surface.metadata, &over.metadata)?;
        }

        Ok(Self {
            surface,
            nearneighbor,
            mask,
            background_override,
        })
    }

    pub fn metadata(&self) -> &RasterMetadata {
        &self.surface.metadata
    }
}

impl BlockSource for GdalSource {
    fn dimensions(&self) -> (usize, usize) {
        (self.surface.metadata.width, self.surface.metadata.height)
    }

    fn read_block(&self, bounds: &ChunkBounds) -> Result<BlockInputs> {
        let high_res = read_samples(
            &self.nearneighbor.dataset,
            self.nearneighbor.metadata.nodata,
            bounds,
        )?;
        let background = read_samples(&self.surface.dataset, self.surface.metadata.nodata, bounds)?;
        let mask = read_mask(&self.mask.dataset, self.mask.metadata.nodata, bounds)?;
        let background_allowed = self
            .background_override
            .as_ref()
            .map(|over| read_override(&over.dataset, bounds))
            .transpose()?;

        Ok(BlockInputs {
            high_res,
            background,
            mask,
            background_allowed,
        })
    }
}

/// Write a block of one output band
pub fn write_chunk_to_band(
    dataset: &mut Dataset,
    chunk_data: &Array2<i16>,
    bounds: &ChunkBounds,
) -> Result<()> {
    let mut raster_band = dataset.rasterband(1)?;

    let output_width = bounds.output_width();
    let output_height = bounds.output_height();

    let (array_height, array_width) = chunk_data.dim();
    if array_height != output_height || array_width != output_width {
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

    // row-major regardless of the array's memory layout
    let data_vec: Vec<i16> = chunk_data.iter().copied().collect();
    let mut buffer = gdal::raster::Buffer::new((output_width, output_height), data_vec);

    raster_band.write(
        (bounds.output_x_min as isize, bounds.output_y_min as isize),
        (output_width, output_height),
        &mut buffer,
    )?;

    debug!(
        "Wrote chunk at ({},{}) size {}x{}",
        bounds.output_x_min, bounds.output_y_min, output_width, output_height
    );

    Ok(())
}

/// Create a single band Int16 GeoTIFF on the input grid
pub fn create_output_dataset(
    path: &str,
    metadata: &RasterMetadata,
    options: Vec<String>,
) -> Result<Dataset> {
    info!("Creating output dataset: {}", path);

    let driver = DriverManager::get_driver_by_name("GTiff")?;

    let mut dataset = if options.is_empty() {
        driver.create_with_band_type::<i16, _>(path, metadata.width, metadata.height, 1)?
    } else {
        let mut gdal_options = CslStringList::new();
        for opt in options {
            gdal_options.add_string(&opt)?;
        }

        driver.create_with_band_type_with_options::<i16, _>(
            path,
            metadata.width,
            metadata.height,
            1,
            &gdal_options,
        )?
    };

    dataset.set_geo_transform(&metadata.geotransform)?;
    dataset.set_projection(&metadata.projection)?;

    Ok(dataset)
}

/// Composite surface and transition zone rasters written block by block
pub struct GdalSink {
    pub composite: Dataset,
    pub transition_zone: Dataset,
}

impl GdalSink {
    pub fn create(
        composite_path: &str,
        transition_zone_path: &str,
        metadata: &RasterMetadata,
        options: Vec<String>,
    ) -> Result<Self> {
        let composite = create_output_dataset(composite_path, metadata, options.clone())?;
        {
            let mut band = composite.rasterband(1)?;
            band.set_no_data_value(Some(OUTPUT_NODATA as f64))?;
            band.set_description("elevation")?;
        }

        let transition_zone = create_output_dataset(transition_zone_path, metadata, options)?;
        {
            let mut band = transition_zone.rasterband(1)?;
            band.set_description("source")?;
            band.set_metadata_item("VALUES", "0=background,1=composite,2=transition", "")?;
        }

        Ok(Self {
            composite,
            transition_zone,
        })
    }
}

impl BlockSink for GdalSink {
    fn write_block(&mut self, bounds: &ChunkBounds, block: &BlockOutput) -> Result<()> {
        write_chunk_to_band(&mut self.composite, &block.surface, bounds)?;
        write_chunk_to_band(&mut self.transition_zone, &block.usage, bounds)?;
        Ok(())
    }
}
