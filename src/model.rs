use geo::BoundingRect;
use geo_types::{Coord, Geometry, Point, Polygon, Rect};

/// GDAL-style affine transform:
/// `x = t[0] + col * t[1] + row * t[2]`, `y = t[3] + col * t[4] + row * t[5]`.
pub type GeoTransform = [f64; 6];

/// A single-band raster held in memory: row-major cell values plus the
/// georeferencing needed to map grid indices back to coordinates.
///
/// The transform, reference system and nodata sentinel travel with the grid
/// through every pipeline stage unless a stage explicitly overrides them.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    /// Number of columns.
    pub cols: usize,
    /// Number of rows.
    pub rows: usize,
    /// Affine transform mapping (col, row) pixel space to georeferenced space.
    pub transform: GeoTransform,
    /// Declared nodata sentinel, if any.
    pub nodata: Option<f64>,
    /// Reference system as WKT. Empty when the source carried none.
    pub crs_wkt: String,
    /// Cell values in row-major order; `values.len() == cols * rows`.
    pub values: Vec<f64>,
}

impl RasterGrid {
    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.cols + col]
    }

    /// True when the cell holds a measurement: not NaN and not the declared
    /// nodata sentinel. The NaN check and the sentinel check are independent
    /// on purpose; clipped-out cells may carry either.
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        let v = self.value(row, col);
        !v.is_nan() && self.nodata.map_or(true, |nd| v != nd)
    }

    /// Maps a pixel-space position to a georeferenced coordinate. Pixel space
    /// is continuous: `(col, row)` is the cell's upper-left corner,
    /// `(col + 0.5, row + 0.5)` its center.
    pub fn pixel_to_geo(&self, px: f64, py: f64) -> (f64, f64) {
        let t = &self.transform;
        (t[0] + px * t[1] + py * t[2], t[3] + px * t[4] + py * t[5])
    }

    /// Inverse of [`pixel_to_geo`](Self::pixel_to_geo). `None` when the
    /// transform is degenerate (zero determinant).
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let t = &self.transform;
        let det = t[1] * t[5] - t[2] * t[4];
        if det == 0.0 {
            return None;
        }
        let dx = x - t[0];
        let dy = y - t[3];
        Some(((dx * t[5] - dy * t[2]) / det, (dy * t[1] - dx * t[4]) / det))
    }

    /// Georeferenced center of a cell.
    pub fn cell_center(&self, row: usize, col: usize) -> Point<f64> {
        let (x, y) = self.pixel_to_geo(col as f64 + 0.5, row as f64 + 0.5);
        Point::new(x, y)
    }

    /// Georeferenced footprint of a cell as an axis-aligned rectangle.
    /// Only exact for transforms without rotation terms, which is all the
    /// inclusion policies need.
    pub fn cell_rect(&self, row: usize, col: usize) -> Rect<f64> {
        let (x0, y0) = self.pixel_to_geo(col as f64, row as f64);
        let (x1, y1) = self.pixel_to_geo(col as f64 + 1.0, row as f64 + 1.0);
        Rect::new(
            Coord {
                x: x0.min(x1),
                y: y0.min(y1),
            },
            Coord {
                x: x0.max(x1),
                y: y0.max(y1),
            },
        )
    }
}

/// Area-of-interest boundary: one or more polygons plus their reference
/// system. Immutable once loaded; the clipper consumes it without mutation.
#[derive(Debug, Clone)]
pub struct Boundary {
    pub polygons: Vec<Polygon<f64>>,
    pub crs_wkt: String,
}

impl Boundary {
    /// Combined bounding rectangle of all polygons. `None` for an empty
    /// boundary (which `read_boundary` never produces).
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        let mut merged: Option<Rect<f64>> = None;
        for poly in &self.polygons {
            let r = poly.bounding_rect()?;
            merged = Some(match merged {
                None => r,
                Some(m) => Rect::new(
                    Coord {
                        x: m.min().x.min(r.min().x),
                        y: m.min().y.min(r.min().y),
                    },
                    Coord {
                        x: m.max().x.max(r.max().x),
                        y: m.max().y.max(r.max().y),
                    },
                ),
            });
        }
        merged
    }
}

/// One displacement site as parsed from the markup document: raw description
/// still attached, consumed by the attribute normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRecord {
    pub name: String,
    pub description: String,
    pub point: Point<f64>,
}

/// A classified attribute value. Classification is a pure function of the
/// raw text (see [`crate::attributes::classify_value`]); failed coercions
/// stay `Text`.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

/// Flat normalized record for one site. Field order follows the source
/// table's row order; attributes absent from a site are simply absent.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSite {
    pub name: String,
    pub point: Point<f64>,
    pub fields: Vec<(String, AttrValue)>,
}

/// One output feature: a geometry paired with its scalar value.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueFeature {
    pub geometry: Geometry<f64>,
    pub value: f64,
}

/// Ordered collection of output features with an attached reference system.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    pub features: Vec<ValueFeature>,
    pub crs_wkt: String,
}
