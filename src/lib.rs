pub mod attributes;
pub mod boundary;
pub mod clip;
pub mod density;
pub mod error;
pub mod kmz;
pub mod model;
pub mod reader;
pub mod vectorize;
pub mod writer;

pub use attributes::{clean_key, classify_value, normalize, NormalizeMode};
pub use boundary::read_boundary;
pub use clip::{clip_raster, ClipOptions, ClipPolicy};
pub use density::{population_density_polygons, DENSITY_NODATA};
pub use error::{Error, Result};
pub use kmz::read_sites;
pub use model::{
    AttrValue, Boundary, FeatureSet, NormalizedSite, RasterGrid, SiteRecord, ValueFeature,
};
pub use reader::read_raster;
pub use vectorize::{raster_to_points, raster_to_polygons};
pub use writer::{GeoJsonWriter, GeoTiffWriter};
