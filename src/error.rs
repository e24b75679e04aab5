use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy for the whole pipeline.
///
/// Parsing and I/O errors abort a pipeline call; per-row and per-cell
/// decisions (malformed attribute rows, value coercion) are handled locally
/// and never surface here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("input file not found: {0}")]
    NotFound(PathBuf),

    #[error("format error: {0}")]
    Format(String),

    #[error("invalid or missing geometry: {0}")]
    Geometry(String),

    #[error("reference system mismatch: raster is '{raster}', boundary is '{boundary}'")]
    GeometryMismatch { raster: String, boundary: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
