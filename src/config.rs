use crate::cli::Args;
use crate::error::{BendingError, Result};
use log::{info, warn};
use std::fmt;
use std::str::FromStr;

/// Smallest transition buffer the command line accepts before clamping.
pub const MIN_BUFFER: usize = 3;
/// 4800 × 4800 × 4 bytes ≈ 92 MB per float block.
pub const DEFAULT_BLOCK_SIZE: usize = 4800;
pub const DEFAULT_REMOVE_DIVISOR: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// Transition band only on the background side of the coverage edge
    Standard,
    /// Transition band straddles the edge (eroded composite + dilated background)
    Smooth,
}

impl FromStr for Version {
    type Err = BendingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Version::Standard),
            "smooth" => Ok(Version::Smooth),
            other => Err(BendingError::invalid_parameter(
                "version",
                other,
                "expected 'standard' or 'smooth'",
            )),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Standard => write!(f, "standard"),
            Version::Smooth => write!(f, "smooth"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlendConfig {
    /// Transition zone radius in cells
    pub buffer: usize,
    pub version: Version,
    /// Share of the band placed on the composite side (smooth only)
    pub percentage: f64,
    /// Block edge length for out-of-core processing
    pub block_size: usize,
    /// Close small background patches inside the dilated mask (standard only)
    pub remove_small_patches: bool,
    pub remove_divisor: usize,
}

impl BlendConfig {
    pub fn new(buffer: usize, version: Version, percentage: f64) -> Result<Self> {
        if buffer < 1 {
            return Err(BendingError::invalid_parameter(
                "buffer",
                buffer,
                "buffer size must be at least 1",
            ));
        }
        if !(0.0..=0.5).contains(&percentage) {
            return Err(BendingError::invalid_parameter(
                "percentage",
                percentage,
                "choose a value between 0.0 and 0.5",
            ));
        }

        let version = if version == Version::Smooth && percentage == 0.0 {
            info!("Percentage of high resolution data is 0.0, switching version to standard");
            Version::Standard
        } else {
            version
        };

        Ok(Self {
            buffer,
            version,
            percentage,
            block_size: DEFAULT_BLOCK_SIZE,
            remove_small_patches: false,
            remove_divisor: DEFAULT_REMOVE_DIVISOR,
        })
    }

    pub fn with_block_size(mut self, block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(BendingError::InvalidChunkSize(block_size));
        }
        self.block_size = block_size;
        Ok(self)
    }

    pub fn with_small_patch_removal(mut self, divisor: usize) -> Result<Self> {
        if divisor == 0 {
            return Err(BendingError::invalid_parameter(
                "remove_divisor",
                divisor,
                "divisor must be at least 1",
            ));
        }
        if self.version == Version::Smooth {
            warn!("Small patch removal only applies to the standard version, ignoring it");
            return Ok(self);
        }
        self.remove_small_patches = true;
        self.remove_divisor = divisor;
        Ok(self)
    }

    /// Build the configuration from command line arguments, raising small buffers to
    /// [`MIN_BUFFER`].
    pub fn from_args(args: &Args) -> Result<Self> {
        let version: Version = args.version.parse()?;

        if args.buffer < 1 {
            return Err(BendingError::invalid_parameter(
                "buffer",
                args.buffer,
                "buffer size must be at least 1",
            ));
        }
        let buffer = if args.buffer < MIN_BUFFER {
            warn!(
                "Buffer size {} below minimum, using {}",
                args.buffer, MIN_BUFFER
            );
            MIN_BUFFER
        } else {
            args.buffer
        };

        let mut config = Self::new(buffer, version, args.percentage)?.with_block_size(args.block_size)?;
        if args.remove_small_patches {
            config = config.with_small_patch_removal(args.remove_divisor)?;
        }
        Ok(config)
    }
}
