//! Shared geometry types and tile-space transforms.

use std::f64::consts::PI;

/// Mean Earth radius in meters, used for great-circle distances.
const EARTH_RADIUS: f64 = 6_371_008.8;

/// 2D object position.
#[derive(PartialEq, Eq, Copy, Clone, Default, Debug)]
pub struct Point<T = i64> {
    pub x: T,
    pub y: T,
}

impl<T> Point<T> {
    pub fn new(x: T, y: T) -> Self {
        Self { x, y }
    }
}

impl<T> From<(T, T)> for Point<T> {
    fn from((x, y): (T, T)) -> Self {
        Self { x, y }
    }
}

impl From<Point<i64>> for Point<f64> {
    fn from(point: Point<i64>) -> Self {
        Self::new(point.x as f64, point.y as f64)
    }
}

/// Web Mercator tile identifier.
///
/// Tile (0, 0) is the northwest corner at zoom 0 and `y` grows southward.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct TileId {
    pub z: u32,
    pub x: u32,
    pub y: u32,
}

impl TileId {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }
}

/// Point in geographical space.
#[derive(PartialEq, Copy, Clone, Default, Debug)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Project this point into a tile's local integer grid.
    ///
    /// The result is expressed relative to the tile's origin, in the same
    /// frame as feature geometry decoded from that tile. It may lie outside
    /// `[0, extent)` when the point is outside the tile.
    pub fn to_tile_local(&self, extent: u32, tile: TileId) -> Point<i64> {
        let z2 = 2f64.powi(tile.z as i32);
        let extent = extent as f64;

        let x_norm = (self.lon + 180.) / 360.;
        let lat_rad = self.lat.to_radians();
        let y_norm = (1. - (lat_rad.tan() + 1. / lat_rad.cos()).ln() / PI) / 2.;

        let x = (x_norm * z2 * extent).round() as i64 - (tile.x as f64 * extent) as i64;
        let y = (y_norm * z2 * extent).round() as i64 - (tile.y as f64 * extent) as i64;

        Point::new(x, y)
    }

    /// Get the geographic point for real-valued tile-local coordinates.
    pub fn from_tile_local(point: Point<f64>, extent: u32, tile: TileId) -> Self {
        let z2 = 2f64.powi(tile.z as i32);

        let x_norm = (tile.x as f64 + point.x / extent as f64) / z2;
        let y_norm = (tile.y as f64 + point.y / extent as f64) / z2;

        let lon = x_norm * 360. - 180.;
        let lat_mercator = -(y_norm * 2. - 1.) * PI;
        let lat = (2. * lat_mercator.exp().atan() - PI / 2.).to_degrees();

        Self { lon, lat }
    }

    /// Calculate distance in meters between two points.
    ///
    /// This uses the haversine formula on a sphere with the mean Earth
    /// radius. It returns 0 for identical inputs and is symmetric.
    pub fn distance(&self, other: Self) -> f64 {
        let slat = self.lat.to_radians();
        let olat = other.lat.to_radians();
        let delta_lat = (other.lat - self.lat).to_radians();
        let delta_lon = (other.lon - self.lon).to_radians();

        let a = (delta_lat / 2.).sin().powi(2)
            + slat.cos() * olat.cos() * (delta_lon / 2.).sin().powi(2);
        let c = 2. * a.sqrt().atan2((1. - a).sqrt());
        EARTH_RADIUS * c
    }
}

/// Tile-local feature geometry.
#[derive(PartialEq, Clone, Debug)]
pub enum TileGeometry {
    /// Individual vertices of a point or multipoint feature.
    Points(Vec<Point<i64>>),
    /// Linestring parts, each with at least two vertices.
    Lines(Vec<Vec<Point<i64>>>),
    /// Polygon rings, outer and inner, without the closing vertex.
    Rings(Vec<Vec<Point<i64>>>),
}

/// Result of a closest-point search.
#[derive(PartialEq, Copy, Clone, Debug)]
pub struct ClosestPoint {
    /// Euclidean distance in tile units.
    pub distance: f64,
    /// Point on the geometry realizing the distance.
    pub point: Point<f64>,
}

impl ClosestPoint {
    /// Replace the current best if a point is closer to the query.
    fn consider(&mut self, point: Point<f64>, query: Point<f64>) {
        let distance = euclidean_distance(query, point);
        if distance < self.distance {
            *self = Self { distance, point };
        }
    }
}

/// Find the point on a geometry closest to a tile-local query point.
///
/// A query point inside a polygon yields a zero distance with the query
/// point itself as the snap point.
pub fn closest_point(geometry: &TileGeometry, query: Point<i64>) -> ClosestPoint {
    let query = Point::from(query);
    let mut best = ClosestPoint { distance: f64::INFINITY, point: query };

    match geometry {
        TileGeometry::Points(points) => {
            for &point in points {
                best.consider(point.into(), query);
            }
        },
        TileGeometry::Lines(lines) => {
            for line in lines {
                for segment in line.windows(2) {
                    let snap = closest_on_segment(segment[0].into(), segment[1].into(), query);
                    best.consider(snap, query);
                }
            }
        },
        TileGeometry::Rings(rings) => {
            if rings_contain(rings, query) {
                return ClosestPoint { distance: 0., point: query };
            }

            // Outside the polygon, all rings are treated as closed
            // linestrings. Ring vertices omit the closing point, so each
            // vertex is paired with its predecessor to cover the closing
            // edge as well.
            for ring in rings {
                let mut previous = match ring.last() {
                    Some(&previous) => previous,
                    None => continue,
                };

                for &vertex in ring {
                    let snap = closest_on_segment(previous.into(), vertex.into(), query);
                    best.consider(snap, query);
                    previous = vertex;
                }
            }
        },
    }

    best
}

/// Euclidean distance between two points.
fn euclidean_distance(a: Point<f64>, b: Point<f64>) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

/// Get the point on a segment closest to a target point.
fn closest_on_segment(start: Point<f64>, end: Point<f64>, target: Point<f64>) -> Point<f64> {
    let dx = end.x - start.x;
    let dy = end.y - start.y;

    // Degenerate segments collapse to their start point.
    let length2 = dx * dx + dy * dy;
    if length2 == 0. {
        return start;
    }

    let t = (((target.x - start.x) * dx + (target.y - start.y) * dy) / length2).clamp(0., 1.);
    Point::new(start.x + dx * t, start.y + dy * t)
}

/// Check if a point lies inside the polygon described by a set of rings.
///
/// Crossings are counted with the even-odd rule across all rings, so
/// interior rings act as cutouts without inspecting winding order.
fn rings_contain(rings: &[Vec<Point<i64>>], point: Point<f64>) -> bool {
    let mut inside = false;

    for ring in rings {
        let mut previous = match ring.last() {
            Some(&previous) => Point::<f64>::from(previous),
            None => continue,
        };

        for &vertex in ring {
            let vertex = Point::<f64>::from(vertex);
            if (vertex.y > point.y) != (previous.y > point.y)
                && point.x
                    < (previous.x - vertex.x) * (point.y - vertex.y) / (previous.y - vertex.y)
                        + vertex.x
            {
                inside = !inside;
            }
            previous = vertex;
        }
    }

    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_to_tile_local() {
        let point = GeoPoint::new(0., 0.).to_tile_local(4096, TileId::new(0, 0, 0));
        assert_eq!(point, Point::new(2048, 2048));

        let point = GeoPoint::new(90., 0.).to_tile_local(4096, TileId::new(0, 0, 0));
        assert_eq!(point, Point::new(3072, 2048));

        let point = GeoPoint::new(90., 0.).to_tile_local(4096, TileId::new(1, 1, 0));
        assert_eq!(point, Point::new(2048, 4096));

        let point = GeoPoint::new(-90., 0.).to_tile_local(256, TileId::new(1, 0, 1));
        assert_eq!(point, Point::new(128, 0));
    }

    #[test]
    fn point_outside_tile() {
        // Query points outside the tile produce coordinates outside the
        // extent without wrapping.
        let point = GeoPoint::new(90., 0.).to_tile_local(4096, TileId::new(1, 0, 0));
        assert_eq!(point, Point::new(6144, 4096));

        let point = GeoPoint::new(-90., 0.).to_tile_local(4096, TileId::new(1, 1, 0));
        assert_eq!(point, Point::new(-2048, 4096));
    }

    #[test]
    fn tile_local_to_point() {
        let point = GeoPoint::from_tile_local(Point::new(2048., 2048.), 4096, TileId::new(0, 0, 0));
        assert_eq!(point, GeoPoint::new(0., 0.));

        let point = GeoPoint::from_tile_local(Point::new(1024., 2048.), 4096, TileId::new(0, 0, 0));
        assert_eq!(point, GeoPoint::new(-90., 0.));

        let point = GeoPoint::from_tile_local(Point::new(0., 4096.), 4096, TileId::new(1, 1, 0));
        assert_eq!(point, GeoPoint::new(0., 0.));
    }

    #[test]
    fn tile_local_roundtrip() {
        let tile = TileId::new(14, 8504, 5473);
        let original = GeoPoint::new(6.865500, 51.157800);

        let local = original.to_tile_local(4096, tile);
        let point = GeoPoint::from_tile_local(Point::from(local), 4096, tile);

        assert!((point.lon - original.lon).abs() < 1e-4);
        assert!((point.lat - original.lat).abs() < 1e-4);
    }

    #[test]
    fn haversine_distance() {
        let a = GeoPoint::new(0., 0.);
        let b = GeoPoint::new(0., 0.);
        assert_eq!(a.distance(b), 0.);

        // One degree of longitude along the equator.
        let a = GeoPoint::new(0., 0.);
        let b = GeoPoint::new(1., 0.);
        assert!((a.distance(b) - 111_195.08).abs() < 0.01);
        assert_eq!(a.distance(b), b.distance(a));
    }

    #[test]
    fn closest_point_on_points() {
        let geometry = TileGeometry::Points(vec![Point::new(0, 0), Point::new(10, 10)]);

        let cp = closest_point(&geometry, Point::new(7, 7));
        assert_eq!(cp.point, Point::new(10., 10.));
        assert_eq!(cp.distance, 3f64.hypot(3.));

        let cp = closest_point(&geometry, Point::new(0, 0));
        assert_eq!(cp.distance, 0.);
    }

    #[test]
    fn closest_point_on_line() {
        let geometry = TileGeometry::Lines(vec![vec![Point::new(0, 0), Point::new(10, 0)]]);

        // Projection onto the segment interior.
        let cp = closest_point(&geometry, Point::new(5, 3));
        assert_eq!(cp.point, Point::new(5., 0.));
        assert_eq!(cp.distance, 3.);

        // Projection clamps to the segment start.
        let cp = closest_point(&geometry, Point::new(-2, 0));
        assert_eq!(cp.point, Point::new(0., 0.));
        assert_eq!(cp.distance, 2.);
    }

    #[test]
    fn closest_point_in_polygon() {
        let ring = vec![Point::new(0, 0), Point::new(10, 0), Point::new(10, 10), Point::new(0, 10)];
        let geometry = TileGeometry::Rings(vec![ring]);

        // Inside hits report zero distance at the query point itself.
        let cp = closest_point(&geometry, Point::new(5, 5));
        assert_eq!(cp.distance, 0.);
        assert_eq!(cp.point, Point::new(5., 5.));

        // Outside points snap to the closest ring edge.
        let cp = closest_point(&geometry, Point::new(5, 13));
        assert_eq!(cp.point, Point::new(5., 10.));
        assert_eq!(cp.distance, 3.);

        // Boundary points count as direct hits.
        let cp = closest_point(&geometry, Point::new(0, 5));
        assert_eq!(cp.distance, 0.);
    }

    #[test]
    fn closest_point_in_polygon_hole() {
        let outer =
            vec![Point::new(0, 0), Point::new(10, 0), Point::new(10, 10), Point::new(0, 10)];
        let inner = vec![Point::new(4, 4), Point::new(6, 4), Point::new(6, 6), Point::new(4, 6)];
        let geometry = TileGeometry::Rings(vec![outer, inner]);

        // A point inside the hole is outside the polygon and snaps to the
        // hole's edge.
        let cp = closest_point(&geometry, Point::new(5, 5));
        assert_eq!(cp.distance, 1.);

        // A point between the rings is still inside.
        let cp = closest_point(&geometry, Point::new(2, 2));
        assert_eq!(cp.distance, 0.);
    }
}
