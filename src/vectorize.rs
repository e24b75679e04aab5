//! Raster vectorization: re-expresses a (clipped) grid as point features or
//! contiguous equal-value polygon features.
//!
//! Point mode samples valid cells in scan order. Polygon mode merges
//! 4-connected cells of equal value into regions via a lazy, single-pass
//! region iterator, then traces each region's boundary edges into an
//! exterior ring plus hole rings.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;

use geo_types::{Coord, Geometry, LineString, Polygon};
use tracing::info;

use crate::model::{FeatureSet, RasterGrid, ValueFeature};

/// Converts a raster to point features, one per valid cell, optionally
/// keeping only every `sample_rate`-th valid cell in row-major scan order
/// (indices 0, N, 2N, … of the valid sequence).
///
/// A cell is valid when its value is neither NaN nor the declared nodata
/// sentinel, so no emitted feature can carry the sentinel. Points sit at
/// cell centers. An empty result is a valid result.
pub fn raster_to_points(grid: &RasterGrid, sample_rate: NonZeroUsize) -> FeatureSet {
    let n = sample_rate.get();
    let mut features = Vec::new();
    let mut valid_index = 0usize;

    for row in 0..grid.rows {
        for col in 0..grid.cols {
            if !grid.is_valid(row, col) {
                continue;
            }
            if valid_index % n == 0 {
                features.push(ValueFeature {
                    geometry: Geometry::Point(grid.cell_center(row, col)),
                    value: grid.value(row, col),
                });
            }
            valid_index += 1;
        }
    }

    log_summary("points", &features);
    FeatureSet {
        features,
        crs_wkt: grid.crs_wkt.clone(),
    }
}

/// Converts a raster to polygon features: one polygon per 4-connected
/// region of equal value over the not-NaN mask.
///
/// The mask (NaN) and the nodata sentinel are evaluated independently:
/// regions are formed over non-NaN cells, and after materialization any
/// feature whose value equals the declared sentinel is dropped. The two
/// checks disagree exactly when clipping filled cells with a non-NaN
/// sentinel, which is why the second filter exists.
pub fn raster_to_polygons(grid: &RasterGrid) -> FeatureSet {
    let features: Vec<ValueFeature> = Regions::new(grid)
        .map(|region| {
            let polygon = region_to_polygon(grid, &region);
            ValueFeature {
                geometry: Geometry::Polygon(polygon),
                value: region.value,
            }
        })
        .filter(|f| grid.nodata.map_or(true, |nd| f.value != nd))
        .collect();

    log_summary("polygons", &features);
    FeatureSet {
        features,
        crs_wkt: grid.crs_wkt.clone(),
    }
}

fn log_summary(kind: &str, features: &[ValueFeature]) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for f in features {
        min = min.min(f.value);
        max = max.max(f.value);
    }
    if features.is_empty() {
        info!("created 0 {kind}");
    } else {
        info!("created {} {kind}, value range {min:.2} to {max:.2}", features.len());
    }
}

/// One contiguous equal-value region: the shared value and the member
/// cells in discovery order.
struct Region {
    value: f64,
    cells: Vec<(usize, usize)>,
}

/// Lazy single-pass iterator over 4-connected equal-value regions of the
/// non-NaN cells, in row-major discovery order. Not restartable.
struct Regions<'a> {
    grid: &'a RasterGrid,
    visited: Vec<bool>,
    cursor: usize,
}

impl<'a> Regions<'a> {
    fn new(grid: &'a RasterGrid) -> Self {
        Regions {
            grid,
            visited: vec![false; grid.values.len()],
            cursor: 0,
        }
    }
}

impl Iterator for Regions<'_> {
    type Item = Region;

    fn next(&mut self) -> Option<Region> {
        let grid = self.grid;
        while self.cursor < grid.values.len() {
            let seed = self.cursor;
            self.cursor += 1;
            if self.visited[seed] || grid.values[seed].is_nan() {
                continue;
            }

            // Flood fill from the seed across 4-connected equal values.
            let value = grid.values[seed];
            let mut cells = Vec::new();
            let mut stack = vec![seed];
            self.visited[seed] = true;
            while let Some(idx) = stack.pop() {
                let (row, col) = (idx / grid.cols, idx % grid.cols);
                cells.push((row, col));

                let mut neighbors = [None; 4];
                if row > 0 {
                    neighbors[0] = Some(idx - grid.cols);
                }
                if row + 1 < grid.rows {
                    neighbors[1] = Some(idx + grid.cols);
                }
                if col > 0 {
                    neighbors[2] = Some(idx - 1);
                }
                if col + 1 < grid.cols {
                    neighbors[3] = Some(idx + 1);
                }
                for n in neighbors.into_iter().flatten() {
                    if !self.visited[n] && grid.values[n] == value {
                        self.visited[n] = true;
                        stack.push(n);
                    }
                }
            }
            return Some(Region { value, cells });
        }
        None
    }
}

/// Builds the georeferenced outline of one region.
///
/// Every cell side facing a non-member becomes a directed edge; stitching
/// the edges yields closed rings in pixel space. The ring with the largest
/// signed area is the exterior, the rest are holes.
fn region_to_polygon(grid: &RasterGrid, region: &Region) -> Polygon<f64> {
    let members: HashSet<(usize, usize)> = region.cells.iter().copied().collect();
    let inside = |row: i64, col: i64| {
        row >= 0 && col >= 0 && members.contains(&(row as usize, col as usize))
    };

    // Directed so that walking keeps the region on a consistent side:
    // top edges run +x, right edges +y, bottom edges -x, left edges -y
    // (pixel space, y down).
    let mut edges: Vec<((i64, i64), (i64, i64))> = Vec::new();
    for &(row, col) in &region.cells {
        let (r, c) = (row as i64, col as i64);
        if !inside(r - 1, c) {
            edges.push(((c, r), (c + 1, r)));
        }
        if !inside(r, c + 1) {
            edges.push(((c + 1, r), (c + 1, r + 1)));
        }
        if !inside(r + 1, c) {
            edges.push(((c + 1, r + 1), (c, r + 1)));
        }
        if !inside(r, c - 1) {
            edges.push(((c, r + 1), (c, r)));
        }
    }
    edges.sort_unstable();

    let rings = stitch_rings(&edges);

    // Largest signed area (pixel space) is the exterior ring.
    let exterior_idx = rings
        .iter()
        .enumerate()
        .max_by_key(|(_, ring)| signed_area_2x(ring))
        .map(|(i, _)| i)
        .unwrap_or(0);

    let to_geo_ring = |ring: &[(i64, i64)]| -> LineString<f64> {
        ring.iter()
            .map(|&(x, y)| {
                let (gx, gy) = grid.pixel_to_geo(x as f64, y as f64);
                Coord { x: gx, y: gy }
            })
            .collect()
    };

    let exterior = to_geo_ring(&rings[exterior_idx]);
    let interiors = rings
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != exterior_idx)
        .map(|(_, ring)| to_geo_ring(ring))
        .collect();

    Polygon::new(exterior, interiors)
}

/// Links directed boundary edges into closed rings. At a pinch vertex
/// (two boundary loops sharing one corner, e.g. diagonal holes) the walk
/// prefers the turn away from the region, which closes the current ring
/// there instead of crossing onto the other loop and merging the two into
/// one self-touching ring.
fn stitch_rings(edges: &[((i64, i64), (i64, i64))]) -> Vec<Vec<(i64, i64)>> {
    let mut by_start: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, (start, _)) in edges.iter().enumerate() {
        by_start.entry(*start).or_default().push(i);
    }

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for first in 0..edges.len() {
        if used[first] {
            continue;
        }
        let origin = edges[first].0;
        let mut ring = vec![origin];
        let mut current = first;

        loop {
            used[current] = true;
            let (from, to) = edges[current];
            ring.push(to);
            if to == origin {
                break;
            }

            let dir = (to.0 - from.0, to.1 - from.1);
            // Preference order: turn away from the region, straight, turn
            // toward it. Only pinch vertices offer more than one choice.
            let preferred = [(dir.1, -dir.0), dir, (-dir.1, dir.0)];
            let next = preferred.iter().find_map(|want| {
                by_start.get(&to)?.iter().copied().find(|&ci| {
                    if used[ci] {
                        return false;
                    }
                    let (s, e) = edges[ci];
                    (e.0 - s.0, e.1 - s.1) == *want
                })
            });

            match next {
                Some(ci) => current = ci,
                // Every vertex has balanced in/out degree, so this only
                // triggers on malformed input; close what we have.
                None => break,
            }
        }
        rings.push(ring);
    }
    rings
}

/// Twice the shoelace area of a pixel-space ring (y down: positive means
/// the orientation used for exterior rings here).
fn signed_area_2x(ring: &[(i64, i64)]) -> i64 {
    let mut sum = 0i64;
    for pair in ring.windows(2) {
        let (x1, y1) = pair[0];
        let (x2, y2) = pair[1];
        sum += x1 * y2 - x2 * y1;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;
    use geo_types::Point;

    fn grid(cols: usize, rows: usize, nodata: Option<f64>, values: Vec<f64>) -> RasterGrid {
        RasterGrid {
            cols,
            rows,
            transform: [0.0, 1.0, 0.0, rows as f64, 0.0, -1.0],
            nodata,
            crs_wkt: String::new(),
            values,
        }
    }

    fn rate(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn points_sit_at_cell_centers() {
        let g = grid(2, 1, None, vec![5.0, 7.0]);
        let set = raster_to_points(&g, rate(1));
        assert_eq!(set.features.len(), 2);
        assert_eq!(set.features[0].geometry, Geometry::Point(Point::new(0.5, 0.5)));
        assert_eq!(set.features[0].value, 5.0);
        assert_eq!(set.features[1].geometry, Geometry::Point(Point::new(1.5, 0.5)));
    }

    #[test]
    fn sampling_takes_every_nth_valid_cell() {
        let g = grid(10, 10, None, (0..100).map(f64::from).collect());
        let set = raster_to_points(&g, rate(2));
        assert_eq!(set.features.len(), 50);
        // Indices 0, 2, 4, ... of the valid sequence.
        assert_eq!(set.features[0].value, 0.0);
        assert_eq!(set.features[1].value, 2.0);
        assert_eq!(set.features[49].value, 98.0);
    }

    #[test]
    fn sampling_indexes_the_valid_sequence_not_the_grid() {
        // One NaN shifts every later valid index by one.
        let mut values: Vec<f64> = (0..9).map(f64::from).collect();
        values[1] = f64::NAN;
        let g = grid(3, 3, None, values);
        let set = raster_to_points(&g, rate(3));
        // Valid sequence: 0, 2, 3, 4, 5, 6, 7, 8 -> positions 0, 3, 6
        // hold values 0, 4, 7.
        let picked: Vec<f64> = set.features.iter().map(|f| f.value).collect();
        assert_eq!(picked, vec![0.0, 4.0, 7.0]);
    }

    #[test]
    fn points_exclude_nan_and_sentinel() {
        let g = grid(2, 2, Some(-1.0), vec![1.0, f64::NAN, -1.0, 4.0]);
        let set = raster_to_points(&g, rate(1));
        let values: Vec<f64> = set.features.iter().map(|f| f.value).collect();
        assert_eq!(values, vec![1.0, 4.0]);
    }

    #[test]
    fn quadrant_grid_merges_into_four_polygons() {
        let g = grid(
            4,
            4,
            Some(-1.0),
            vec![
                1.0, 1.0, 2.0, 2.0, //
                1.0, 1.0, 2.0, 2.0, //
                3.0, 3.0, 4.0, 4.0, //
                3.0, 3.0, 4.0, 4.0, //
            ],
        );
        let set = raster_to_polygons(&g);
        assert_eq!(set.features.len(), 4);
        let mut values: Vec<f64> = set.features.iter().map(|f| f.value).collect();
        values.sort_by(f64::total_cmp);
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0]);
        for f in &set.features {
            let Geometry::Polygon(p) = &f.geometry else {
                panic!("expected polygon");
            };
            assert_eq!(p.unsigned_area(), 4.0); // each quadrant is 2x2 cells
        }
    }

    #[test]
    fn clipped_top_half_yields_two_polygons() {
        // The two surviving quadrants of the 4x4 scenario after a clip that
        // keeps rows 0-1: nodata sentinel fills the bottom half.
        let g = grid(
            4,
            4,
            Some(-1.0),
            vec![
                1.0, 1.0, 2.0, 2.0, //
                1.0, 1.0, 2.0, 2.0, //
                -1.0, -1.0, -1.0, -1.0, //
                -1.0, -1.0, -1.0, -1.0, //
            ],
        );
        let set = raster_to_polygons(&g);
        assert_eq!(set.features.len(), 2);
        let mut values: Vec<f64> = set.features.iter().map(|f| f.value).collect();
        values.sort_by(f64::total_cmp);
        assert_eq!(values, vec![1.0, 2.0]);
    }

    #[test]
    fn no_emitted_polygon_carries_the_sentinel() {
        let g = grid(3, 1, Some(99999.0), vec![7.0, 99999.0, 7.0]);
        let set = raster_to_polygons(&g);
        assert_eq!(set.features.len(), 2);
        assert!(set.features.iter().all(|f| f.value != 99999.0));
    }

    #[test]
    fn nan_cells_split_regions() {
        let g = grid(3, 1, None, vec![7.0, f64::NAN, 7.0]);
        let set = raster_to_polygons(&g);
        assert_eq!(set.features.len(), 2);
    }

    #[test]
    fn enclosed_region_becomes_a_hole() {
        let g = grid(
            3,
            3,
            None,
            vec![
                1.0, 1.0, 1.0, //
                1.0, 9.0, 1.0, //
                1.0, 1.0, 1.0, //
            ],
        );
        let set = raster_to_polygons(&g);
        assert_eq!(set.features.len(), 2);

        let ring = set
            .features
            .iter()
            .find(|f| f.value == 1.0)
            .expect("ring region");
        let Geometry::Polygon(p) = &ring.geometry else {
            panic!("expected polygon");
        };
        assert_eq!(p.interiors().len(), 1);
        assert_eq!(p.unsigned_area(), 8.0); // 3x3 minus the 1x1 hole

        let hole = set.features.iter().find(|f| f.value == 9.0).unwrap();
        let Geometry::Polygon(p) = &hole.geometry else {
            panic!("expected polygon");
        };
        assert_eq!(p.unsigned_area(), 1.0);
    }

    #[test]
    fn diagonal_holes_stay_separate_rings() {
        // Two holes meeting at one corner must come out as two simple
        // interior rings, not one merged self-touching ring.
        let mut values = vec![1.0; 16];
        values[1 * 4 + 1] = f64::NAN;
        values[2 * 4 + 2] = f64::NAN;
        let g = grid(4, 4, None, values);

        let set = raster_to_polygons(&g);
        assert_eq!(set.features.len(), 1);
        let Geometry::Polygon(p) = &set.features[0].geometry else {
            panic!("expected polygon");
        };
        assert_eq!(p.interiors().len(), 2);
        for ring in p.interiors() {
            // A unit-square hole: four corners plus the closing coordinate.
            assert_eq!(ring.0.len(), 5);
            assert_eq!(ring.0.first(), ring.0.last());
        }
        assert_eq!(p.unsigned_area(), 14.0); // 4x4 minus the two 1x1 holes
    }

    #[test]
    fn diagonal_cells_are_separate_regions() {
        // 4-connectivity: corner contact does not merge.
        let g = grid(2, 2, None, vec![5.0, f64::NAN, f64::NAN, 5.0]);
        let set = raster_to_polygons(&g);
        assert_eq!(set.features.len(), 2);
    }

    #[test]
    fn emission_order_is_deterministic() {
        let g = grid(
            4,
            2,
            None,
            vec![1.0, 2.0, 1.0, 2.0, 2.0, 1.0, 2.0, 1.0],
        );
        let a = raster_to_polygons(&g);
        let b = raster_to_polygons(&g);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_grid_is_a_valid_empty_result() {
        let g = grid(2, 2, None, vec![f64::NAN; 4]);
        let set = raster_to_polygons(&g);
        assert!(set.features.is_empty());
        assert!(raster_to_points(&g, rate(1)).features.is_empty());
    }

    #[test]
    fn polygon_coordinates_follow_the_transform() {
        let mut g = grid(2, 2, None, vec![3.0, 3.0, 3.0, 3.0]);
        g.transform = [100.0, 0.5, 0.0, 200.0, 0.0, -0.5];
        let set = raster_to_polygons(&g);
        assert_eq!(set.features.len(), 1);
        let Geometry::Polygon(p) = &set.features[0].geometry else {
            panic!("expected polygon");
        };
        use geo::BoundingRect;
        let bbox = p.bounding_rect().unwrap();
        assert_eq!(bbox.min().x, 100.0);
        assert_eq!(bbox.max().x, 101.0);
        assert_eq!(bbox.min().y, 199.0);
        assert_eq!(bbox.max().y, 200.0);
    }
}
