//! Raster clipping: crops a grid to a boundary's bounding region and masks
//! cells outside the boundary with the nodata sentinel.

use gdal::spatial_ref::SpatialRef;
use geo::{Contains, Intersects};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::{Boundary, RasterGrid};

/// Cell inclusion rule for masking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClipPolicy {
    /// A cell survives only when its center lies inside a boundary polygon.
    #[default]
    Strict,
    /// A cell survives when its footprint intersects a boundary polygon at
    /// all.
    AllTouched,
}

/// Per-call clip configuration. Passed explicitly; there is no process-wide
/// registry of defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipOptions {
    pub policy: ClipPolicy,
    /// Sentinel written into masked-out cells and recorded as the output
    /// grid's nodata. Falls back to the source nodata, then NaN.
    pub nodata_override: Option<f64>,
}

/// Clips a raster against a boundary.
///
/// The output grid covers the boundary's bounding window; cells excluded by
/// the policy hold the effective sentinel; the output transform reflects
/// the new origin. The boundary must share the raster's reference system —
/// there is no implicit reprojection.
pub fn clip_raster(
    grid: &RasterGrid,
    boundary: &Boundary,
    options: &ClipOptions,
) -> Result<RasterGrid> {
    if !same_crs(&grid.crs_wkt, &boundary.crs_wkt) {
        return Err(Error::GeometryMismatch {
            raster: grid.crs_wkt.clone(),
            boundary: boundary.crs_wkt.clone(),
        });
    }

    let bbox = boundary
        .bounding_rect()
        .ok_or_else(|| Error::Geometry("boundary has no extent".to_string()))?;

    // Map all four bbox corners through the inverse affine so rotated
    // transforms still yield a correct window.
    let corners = [
        (bbox.min().x, bbox.min().y),
        (bbox.min().x, bbox.max().y),
        (bbox.max().x, bbox.min().y),
        (bbox.max().x, bbox.max().y),
    ];
    let mut px_min = f64::INFINITY;
    let mut px_max = f64::NEG_INFINITY;
    let mut py_min = f64::INFINITY;
    let mut py_max = f64::NEG_INFINITY;
    for (x, y) in corners {
        let (px, py) = grid
            .geo_to_pixel(x, y)
            .ok_or_else(|| Error::Geometry("raster transform is degenerate".to_string()))?;
        px_min = px_min.min(px);
        px_max = px_max.max(px);
        py_min = py_min.min(py);
        py_max = py_max.max(py);
    }

    let col0 = px_min.floor().max(0.0) as usize;
    let col1 = (px_max.ceil().min(grid.cols as f64) as usize).min(grid.cols);
    let row0 = py_min.floor().max(0.0) as usize;
    let row1 = (py_max.ceil().min(grid.rows as f64) as usize).min(grid.rows);
    if px_max <= 0.0 || py_max <= 0.0 || col0 >= col1 || row0 >= row1 {
        return Err(Error::Geometry(
            "boundary does not overlap the raster extent".to_string(),
        ));
    }

    let sentinel = options
        .nodata_override
        .or(grid.nodata)
        .unwrap_or(f64::NAN);

    let (cols, rows) = (col1 - col0, row1 - row0);
    let mut values = Vec::with_capacity(cols * rows);
    let mut kept = 0usize;
    for row in row0..row1 {
        for col in col0..col1 {
            let included = match options.policy {
                ClipPolicy::Strict => {
                    let center = grid.cell_center(row, col);
                    boundary.polygons.iter().any(|p| p.contains(&center))
                }
                ClipPolicy::AllTouched => {
                    let cell = grid.cell_rect(row, col).to_polygon();
                    boundary.polygons.iter().any(|p| p.intersects(&cell))
                }
            };
            if included {
                values.push(grid.value(row, col));
                kept += 1;
            } else {
                values.push(sentinel);
            }
        }
    }

    // Shift the origin by the window offset; scale and rotation terms are
    // untouched.
    let t = &grid.transform;
    let transform = [
        t[0] + col0 as f64 * t[1] + row0 as f64 * t[2],
        t[1],
        t[2],
        t[3] + col0 as f64 * t[4] + row0 as f64 * t[5],
        t[4],
        t[5],
    ];

    info!(
        "clipped raster to {} x {} ({} of {} cells inside boundary)",
        cols,
        rows,
        kept,
        cols * rows
    );

    Ok(RasterGrid {
        cols,
        rows,
        transform,
        nodata: options.nodata_override.or(grid.nodata),
        crs_wkt: grid.crs_wkt.clone(),
        values,
    })
}

/// Compares reference systems without reprojecting. Identical WKT matches;
/// otherwise both sides must resolve to the same authority name and code.
/// A side with no reference system at all cannot be verified and is let
/// through with a warning.
fn same_crs(raster: &str, boundary: &str) -> bool {
    if raster == boundary {
        return true;
    }
    if raster.is_empty() || boundary.is_empty() {
        warn!("one side carries no reference system; skipping CRS check");
        return true;
    }
    let (Ok(a), Ok(b)) = (SpatialRef::from_wkt(raster), SpatialRef::from_wkt(boundary)) else {
        return false;
    };
    match (a.auth_name(), a.auth_code(), b.auth_name(), b.auth_code()) {
        (Some(an), Ok(ac), Some(bn), Ok(bc)) => an == bn && ac == bc,
        _ => false,
    }
}
