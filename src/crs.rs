use crate::error::{BendingError, Result};
use gdal::spatial_ref::SpatialRef;
use log::{info, warn};

/// Whether two projection definitions describe the same CRS.
///
/// Identical strings (including two empty ones) match without parsing.
pub fn crs_matches(a: &str, b: &str) -> Result<bool> {
    let (a, b) = (a.trim(), b.trim());
    if a == b {
        return Ok(true);
    }
    if a.is_empty() || b.is_empty() {
        warn!("Only one raster carries a CRS definition");
        return Ok(false);
    }

    let parse = |wkt: &str| {
        SpatialRef::from_wkt(wkt)
            .map_err(|e| BendingError::CrsError(format!("failed to parse projection: {}", e)))
    };
    Ok(parse(a)? == parse(b)?)
}

/// Log what kind of CRS the grids use; the buffer is always counted in cells.
pub fn log_crs_summary(projection_wkt: &str) {
    if projection_wkt.trim().is_empty() {
        warn!("Input rasters carry no CRS definition");
        return;
    }

    let spatial_ref = match SpatialRef::from_wkt(projection_wkt) {
        Ok(sr) => sr,
        Err(e) => {
            warn!("Failed to parse projection WKT: {}", e);
            return;
        }
    };

    let authority = match (spatial_ref.auth_name(), spatial_ref.auth_code()) {
        (Ok(name), Ok(code)) => format!("{}:{}", name, code),
        _ => "unknown authority".to_string(),
    };

    if spatial_ref.is_geographic() {
        info!(
            "Geographic CRS ({}), buffer is applied in cells of varying ground size",
            authority
        );
    } else if spatial_ref.is_projected() {
        info!(
            "Projected CRS ({}), linear units={:.6}",
            authority,
            spatial_ref.linear_units()
        );
    } else {
        warn!("Unknown CRS type ({})", authority);
    }
}
