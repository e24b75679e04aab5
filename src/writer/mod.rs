//! Output writers: clipped grids as GeoTIFF, feature sets and normalized
//! sites as GeoJSON.
//!
//! GeoJSON output is finalized atomically: the document is written to a
//! temporary file in the destination directory and persisted into place, so
//! a failed write never leaves a partial output file. GeoTIFF output goes
//! through GDAL, which writes in place; on failure the incomplete file is
//! removed.

use std::io::Write;
use std::path::Path;

use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::DriverManager;
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{Error, Result};
use crate::model::{AttrValue, FeatureSet, NormalizedSite, RasterGrid};

/// Writes a [`RasterGrid`] as a single-band f64 GeoTIFF.
#[derive(Default)]
pub struct GeoTiffWriter {}

impl GeoTiffWriter {
    pub fn new() -> Self {
        Self {}
    }

    pub fn write(&self, grid: &RasterGrid, output_path: &Path) -> Result<()> {
        let result = self.write_inner(grid, output_path);
        if result.is_err() {
            // Never leave a half-written raster behind.
            let _ = std::fs::remove_file(output_path);
        }
        result
    }

    fn write_inner(&self, grid: &RasterGrid, output_path: &Path) -> Result<()> {
        let driver = DriverManager::get_driver_by_name("GTiff")?;

        let mut dataset =
            driver.create_with_band_type::<f64, _>(output_path, grid.cols, grid.rows, 1)?;

        dataset.set_geo_transform(&grid.transform)?;
        if !grid.crs_wkt.is_empty() {
            dataset.set_projection(&grid.crs_wkt)?;
        }

        let mut band = dataset.rasterband(1)?;
        band.set_no_data_value(grid.nodata)?;

        let mut buffer = Buffer::new((grid.cols, grid.rows), grid.values.clone());
        band.write((0, 0), (grid.cols, grid.rows), &mut buffer)?;

        info!(
            "wrote GeoTIFF {} ({} x {})",
            output_path.display(),
            grid.cols,
            grid.rows
        );
        Ok(())
    }
}

/// Writes feature collections as GeoJSON documents.
#[derive(Default)]
pub struct GeoJsonWriter {}

impl GeoJsonWriter {
    pub fn new() -> Self {
        Self {}
    }

    /// Writes a [`FeatureSet`] with the scalar value stored under
    /// `value_property` on every feature.
    pub fn write_features(
        &self,
        set: &FeatureSet,
        value_property: &str,
        output_path: &Path,
    ) -> Result<()> {
        let features = set
            .features
            .iter()
            .map(|f| {
                let mut properties = JsonObject::new();
                properties.insert(value_property.to_string(), JsonValue::from(f.value));
                Feature {
                    bbox: None,
                    geometry: Some(geojson::Geometry::new(geojson::Value::from(&f.geometry))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        let collection = FeatureCollection {
            bbox: None,
            features,
            foreign_members: crs_member(&set.crs_wkt),
        };
        self.persist(&GeoJson::from(collection), output_path)?;
        info!(
            "wrote {} feature(s) to {}",
            set.features.len(),
            output_path.display()
        );
        Ok(())
    }

    /// Writes normalized sites as a point FeatureCollection; every record
    /// carries `site_name` plus its (typed) attribute fields.
    pub fn write_sites(&self, sites: &[NormalizedSite], output_path: &Path) -> Result<()> {
        let features = sites
            .iter()
            .map(|site| {
                let mut properties = JsonObject::new();
                properties.insert(
                    "site_name".to_string(),
                    JsonValue::from(site.name.clone()),
                );
                for (key, value) in &site.fields {
                    properties.insert(key.clone(), attr_to_json(value));
                }
                Feature {
                    bbox: None,
                    geometry: Some(geojson::Geometry::new(geojson::Value::from(&site.point))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        let collection = FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        };
        self.persist(&GeoJson::from(collection), output_path)?;
        info!("wrote {} site(s) to {}", sites.len(), output_path.display());
        Ok(())
    }

    fn persist(&self, document: &GeoJson, output_path: &Path) -> Result<()> {
        let dir = output_path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = match dir {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };
        tmp.write_all(document.to_string().as_bytes())?;
        tmp.flush()?;
        tmp.persist(output_path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

fn attr_to_json(value: &AttrValue) -> JsonValue {
    match value {
        AttrValue::Text(s) => JsonValue::from(s.clone()),
        AttrValue::Number(n) => JsonValue::from(*n),
        AttrValue::Bool(b) => JsonValue::from(*b),
    }
}

/// Legacy-style `crs` member naming the EPSG authority code, when the WKT
/// resolves to one. Unknown reference systems are simply omitted.
fn crs_member(crs_wkt: &str) -> Option<JsonObject> {
    if crs_wkt.is_empty() {
        return None;
    }
    let srs = SpatialRef::from_wkt(crs_wkt).ok()?;
    let name = srs.auth_name()?;
    let code = srs.auth_code().ok()?;

    let mut members = JsonObject::new();
    members.insert(
        "crs".to_string(),
        serde_json::json!({
            "type": "name",
            "properties": { "name": format!("urn:ogc:def:crs:{name}::{code}") }
        }),
    );
    Some(members)
}
