use clap::Parser;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "bending")]
#[command(about = "Merge two GeoTIFFs into a single grid using a weighted transition zone")]
#[command(author = "Seabed Mapping Project")]
pub struct Args {
    /// Input surface GeoTIFF (low resolution background)
    #[arg(value_name = "SURFACE")]
    pub surface: String,

    /// Input nearest neighbour GeoTIFF (high resolution, sparse)
    #[arg(value_name = "NEARNEIGHBOR")]
    pub nearneighbor: String,

    /// Input coverage mask GeoTIFF of the high resolution data (0/1)
    #[arg(value_name = "MASK")]
    pub mask: String,

    /// Type of input/output data (e.g. median), used in output file names
    #[arg(value_name = "TYPE")]
    pub stats_type: String,

    /// Transition zone buffer size in cells (values below 3 are raised to 3)
    #[arg(short, long, value_name = "CELLS", default_value_t = 5)]
    pub buffer: usize,

    /// Algorithm version: standard or smooth
    #[arg(short = 'v', long, value_name = "VERSION", default_value = "standard")]
    pub version: String,

    /// Share of high resolution data in the transition zone (0.0 - 0.5, smooth only)
    #[arg(short, long, value_name = "FRACTION", default_value_t = 0.2)]
    pub percentage: f64,

    /// Optional mask GeoTIFF marking cells (value 0) where the background must not be used
    #[arg(long, value_name = "FILE")]
    pub mask_srtm: Option<String>,

    /// Close small background patches inside the dilated coverage (standard only)
    #[arg(long)]
    pub remove_small_patches: bool,

    /// Divisor of the buffer size giving the patch removal footprint radius
    #[arg(long, value_name = "N", default_value_t = 5)]
    pub remove_divisor: usize,

    /// Output directory (default: directory of the surface GeoTIFF)
    #[arg(short, long, value_name = "DIR")]
    pub outdir: Option<String>,

    /// Block edge length in cells for out-of-core processing
    #[arg(long, value_name = "CELLS", default_value_t = 4800)]
    pub block_size: usize,

    /// Output GeoTIFF tile size (must be multiple of 16)
    #[arg(long, value_name = "SIZE", default_value_t = 4800)]
    pub tile_size: usize,

    /// Output compression: DEFLATE, LZW, ZSTD or NONE
    #[arg(long, value_name = "TYPE", default_value = "DEFLATE")]
    pub compression: String,

    /// Build internal overviews on the outputs
    #[arg(long)]
    pub overviews: bool,

    /// Number of threads (default: all available)
    #[arg(short, long, value_name = "N")]
    pub threads: Option<usize>,

    /// Enable verbose logging
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub composite: PathBuf,
    pub transition_zone: PathBuf,
}

/// Run timestamp encoded in the surface file name: every `_`-separated part except
/// the last three. Falls back to the file stem for shorter names.
pub fn run_timestamp(surface: &str) -> String {
    let path = Path::new(surface);
    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let parts: Vec<&str> = basename.split('_').collect();
    if parts.len() > 3 {
        parts[..parts.len() - 3].join("_")
    } else {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl Args {
    pub fn output_dir(&self) -> PathBuf {
        match &self.outdir {
            Some(dir) => PathBuf::from(dir),
            None => Path::new(&self.surface)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        }
    }

    pub fn output_paths(&self) -> OutputPaths {
        let dir = self.output_dir();
        let timestamp = run_timestamp(&self.surface);
        OutputPaths {
            composite: dir.join(format!("{}_{}_composite.tif", timestamp, self.stats_type)),
            transition_zone: dir.join(format!(
                "{}_{}_transition-zone.tif",
                timestamp, self.stats_type
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_timestamp() {
        assert_eq!(
            run_timestamp("/data/grids/20210607_1200_surface_500m_grid.tif"),
            "20210607_1200"
        );
        assert_eq!(run_timestamp("surface.tif"), "surface");
    }

    #[test]
    fn test_output_paths() {
        let args = Args::parse_from([
            "bending",
            "/data/20210607_1200_surface_500m_grid.tif",
            "/data/nn.tif",
            "/data/mask.tif",
            "median",
            "-b",
            "10",
        ]);
        let paths = args.output_paths();
        assert_eq!(
            paths.composite,
            PathBuf::from("/data/20210607_1200_median_composite.tif")
        );
        assert_eq!(
            paths.transition_zone,
            PathBuf::from("/data/20210607_1200_median_transition-zone.tif")
        );
    }

    #[test]
    fn test_outdir_override() {
        let args = Args::parse_from([
            "bending", "/data/a_b_c_d.tif", "nn.tif", "m.tif", "mean", "-o", "/out",
        ]);
        assert_eq!(args.output_dir(), PathBuf::from("/out"));
        assert_eq!(
            args.output_paths().composite,
            PathBuf::from("/out/a_mean_composite.tif")
        );
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["bending", "s.tif", "nn.tif", "m.tif", "median"]);
        assert_eq!(args.buffer, 5);
        assert_eq!(args.version, "standard");
        assert!((args.percentage - 0.2).abs() < 1e-12);
        assert_eq!(args.block_size, 4800);
        assert!(args.mask_srtm.is_none());
    }
}
