//! Population-density pipeline for fine-resolution (100 m cell) population
//! count rasters: all-touched clip with a fixed sentinel, then polygon
//! vectorization.
//!
//! Each cell already holds the count for one fixed, uniform cell area, so
//! the count itself serves as the density value and no per-cell area
//! normalization happens here.

use tracing::info;

use crate::clip::{clip_raster, ClipOptions, ClipPolicy};
use crate::error::Result;
use crate::model::{Boundary, FeatureSet, RasterGrid};
use crate::vectorize::raster_to_polygons;

/// Sentinel burned into clipped-out cells of count rasters, replacing the
/// source's own nodata value for the rest of the pipeline.
pub const DENSITY_NODATA: f64 = 99999.0;

/// Clips a population-count raster to the boundary (all-touched, sentinel
/// [`DENSITY_NODATA`]) and vectorizes it to one polygon per contiguous
/// equal-count region.
///
/// The min/max logging is diagnostic only and never affects the output.
pub fn population_density_polygons(
    grid: &RasterGrid,
    boundary: &Boundary,
) -> Result<FeatureSet> {
    log_range("before clipping", grid);

    let clipped = clip_raster(
        grid,
        boundary,
        &ClipOptions {
            policy: ClipPolicy::AllTouched,
            nodata_override: Some(DENSITY_NODATA),
        },
    )?;
    log_range("after clipping", &clipped);

    Ok(raster_to_polygons(&clipped))
}

fn log_range(stage: &str, grid: &RasterGrid) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut valid = 0usize;
    for row in 0..grid.rows {
        for col in 0..grid.cols {
            if grid.is_valid(row, col) {
                let v = grid.value(row, col);
                min = min.min(v);
                max = max.max(v);
                valid += 1;
            }
        }
    }
    if valid == 0 {
        info!("{stage}: no valid cells");
    } else {
        info!("{stage}: {valid} valid cells, values {min:.2} to {max:.2}");
    }
}
