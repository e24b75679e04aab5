//! Raster source adapter: loads band 1 of a GDAL-readable raster into a
//! [`RasterGrid`].

use std::path::Path;

use gdal::Dataset;
use tracing::info;

use crate::error::{Error, Result};
use crate::model::RasterGrid;

/// Opens a raster file and reads its first band as `f64`, carrying the
/// geotransform, projection and nodata value along.
pub fn read_raster(path: &Path) -> Result<RasterGrid> {
    if !path.exists() {
        return Err(Error::NotFound(path.to_path_buf()));
    }

    let dataset = Dataset::open(path).map_err(|e| {
        Error::Format(format!(
            "cannot open {} as raster data: {e}",
            path.display()
        ))
    })?;

    let transform = dataset.geo_transform()?;
    let crs_wkt = dataset.projection();
    let (cols, rows) = dataset.raster_size();

    let band = dataset.rasterband(1)?;
    let nodata = band.no_data_value();

    let mut values = vec![0f64; cols * rows];
    band.read_into_slice((0, 0), (cols, rows), (cols, rows), &mut values, None)?;

    info!(
        "read raster {}: {} x {} ({} pixels)",
        path.display(),
        cols,
        rows,
        cols * rows
    );

    Ok(RasterGrid {
        cols,
        rows,
        transform,
        nodata,
        crs_wkt,
        values,
    })
}
