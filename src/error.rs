use thiserror::Error;

#[derive(Error, Debug)]
pub enum BendingError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("Rasters are not co-registered ({name}): {reason}")]
    ShapeMismatch { name: String, reason: String },

    #[error("Invalid parameter {name}={value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid structuring element radius: {0} (must be at least 1)")]
    InvalidRadius(usize),

    #[error("Input raster has invalid dimensions: {0}x{1}")]
    InvalidDimensions(usize, usize),

    #[error("Pixel size is non-positive: {0}")]
    InvalidPixelSize(f64),

    #[error("Invalid block size: {0} (must be positive)")]
    InvalidChunkSize(usize),

    #[error("Invalid chunk bounds: output=[{0},{1}]-[{2},{3}], read=[{4},{5}]-[{6},{7}]")]
    InvalidChunkBounds(usize, usize, usize, usize, usize, usize, usize, usize),

    #[error("Block {index} failed: {source}")]
    BlockCompute {
        index: usize,
        #[source]
        source: Box<BendingError>,
    },

    #[error("GeoTIFF creation failed: {0}")]
    CogCreationFailed(String),

    #[error("CRS error: {0}")]
    CrsError(String),

    #[error("Invalid compression type: {0}")]
    InvalidCompression(String),

    #[error("Invalid tile size: {0} (must be multiple of 16)")]
    InvalidTileSize(usize),
}

impl BendingError {
    pub(crate) fn invalid_parameter(
        name: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        BendingError::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn shape_mismatch(name: impl Into<String>, reason: impl Into<String>) -> Self {
        BendingError::ShapeMismatch {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BendingError>;
