//! Nearest-feature query execution.

use std::str::FromStr;

use serde::Serialize;
use tracing::debug;

use crate::Error;
use crate::geojson::FeatureCollection;
use crate::geometry::{self, GeoPoint};
use crate::tile::protobuf::{Layer, Value};
use crate::tile::{self, DecodedTile, GeometryType, TileBuffer};

/// Maximum number of results a query may request.
const MAX_LIMIT: usize = 1000;

/// Geometry type filter for queries.
#[derive(PartialEq, Eq, Copy, Clone, Default, Debug)]
pub enum GeomFilter {
    Point,
    Linestring,
    Polygon,
    #[default]
    All,
}

impl GeomFilter {
    /// Check if a feature's geometry type passes this filter.
    fn matches(&self, geometry_type: GeometryType) -> bool {
        match self {
            Self::Point => geometry_type == GeometryType::Point,
            Self::Linestring => geometry_type == GeometryType::Linestring,
            Self::Polygon => geometry_type == GeometryType::Polygon,
            Self::All => true,
        }
    }
}

impl FromStr for GeomFilter {
    type Err = Error;

    fn from_str(geometry: &str) -> Result<Self, Self::Err> {
        match geometry {
            "point" => Ok(Self::Point),
            "linestring" => Ok(Self::Linestring),
            "polygon" => Ok(Self::Polygon),
            _ => Err(Error::InvalidGeometryFilter),
        }
    }
}

/// Query options.
#[derive(Clone, Debug)]
pub struct QueryOptions {
    /// Search radius in meters; at `0` only direct hits qualify.
    pub radius: f64,
    /// Maximum number of results, between 1 and 1000.
    pub limit: usize,
    /// Collapse occurrences of the same feature across tiles.
    pub dedupe: bool,
    /// Layer names to search; an empty list searches all layers.
    pub layers: Vec<String>,
    /// Geometry types to search.
    pub geometry: GeomFilter,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            radius: 0.,
            limit: 5,
            dedupe: true,
            layers: Vec::new(),
            geometry: GeomFilter::All,
        }
    }
}

/// Validate a request before any tile is decoded.
pub(crate) fn validate_request(
    num_tiles: usize,
    lnglat: GeoPoint,
    options: &QueryOptions,
) -> Result<(), Error> {
    if num_tiles == 0 {
        return Err(Error::NoTiles);
    }
    if !lnglat.lon.is_finite() || !lnglat.lat.is_finite() {
        return Err(Error::InvalidLngLat);
    }
    if !options.radius.is_finite() || options.radius < 0. {
        return Err(Error::InvalidRadius);
    }
    if options.limit < 1 {
        return Err(Error::LimitTooSmall);
    }
    if options.limit > MAX_LIMIT {
        return Err(Error::LimitTooLarge);
    }
    if options.layers.iter().any(|layer| layer.is_empty()) {
        return Err(Error::EmptyLayerName);
    }

    Ok(())
}

/// Find the features closest to a geographic point across a set of tiles.
///
/// Tiles are searched in input order and each result is snapped to the
/// closest point on its source geometry. The returned collection is ordered
/// by ascending distance, with encounter order breaking ties.
pub fn query(
    tiles: &[TileBuffer<'_>],
    lnglat: GeoPoint,
    options: &QueryOptions,
) -> Result<FeatureCollection, Error> {
    validate_request(tiles.len(), lnglat, options)?;

    // Decode all tiles up front; result entries borrow layer data from them
    // until the surviving properties are materialized.
    let decoded = tiles
        .iter()
        .map(|buffer| DecodedTile::decode(*buffer))
        .collect::<Result<Vec<_>, _>>()?;

    debug!("querying {} tiles around ({}, {})", decoded.len(), lnglat.lon, lnglat.lat);

    let mut results = ResultSet::new(options.limit);
    for tile in &decoded {
        for layer in &tile.tile.layers {
            if !options.layers.is_empty()
                && !options.layers.iter().any(|name| name == &layer.name)
            {
                continue;
            }

            // A zero extent cannot describe a coordinate grid.
            if layer.extent == 0 {
                debug!("ignoring layer {:?} with zero extent", layer.name);
                continue;
            }

            // The query point is projected per layer, since the extent may
            // differ between layers.
            let query_point = lnglat.to_tile_local(layer.extent, tile.id);

            for feature in &layer.features {
                let Ok(geometry_type) = GeometryType::try_from(feature.r#type()) else {
                    continue;
                };
                if !options.geometry.matches(geometry_type) {
                    continue;
                }

                let Some(feature_geometry) = tile::extract_geometry(feature) else { continue };
                let cp = geometry::closest_point(&feature_geometry, query_point);

                // Distance should never be less than zero, this is a safety
                // check.
                if cp.distance < 0. {
                    continue;
                }

                // Use the request point directly on direct hits, avoiding
                // round-trip precision loss through the projection.
                let (coords, distance) = if cp.distance == 0. {
                    (lnglat, 0.)
                } else {
                    let snap = GeoPoint::from_tile_local(cp.point, layer.extent, tile.id);
                    (snap, lnglat.distance(snap))
                };

                if distance > options.radius {
                    continue;
                }

                let candidate = Candidate {
                    layer,
                    tags: &feature.tags,
                    coords,
                    distance,
                    geometry_type,
                    has_id: feature.id.is_some(),
                    id: feature.id(),
                };
                results.offer(candidate, options.dedupe);
            }
        }
    }

    Ok(FeatureCollection::from_matches(results.finalize()))
}

/// Owned scalar property value.
#[derive(Serialize, PartialEq, Clone, Debug)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
}

impl PropertyValue {
    /// Convert a tag value, if it holds a supported scalar kind.
    fn from_value(value: &Value) -> Option<Self> {
        if let Some(value) = value.bool_value {
            Some(Self::Bool(value))
        } else if let Some(value) = value.int_value {
            Some(Self::Int(value))
        } else if let Some(value) = value.sint_value {
            Some(Self::Int(value))
        } else if let Some(value) = value.uint_value {
            Some(Self::Uint(value))
        } else if let Some(value) = value.double_value {
            Some(Self::Float(value))
        } else if let Some(value) = value.float_value {
            Some(Self::Float(value as f64))
        } else {
            value.string_value.clone().map(Self::String)
        }
    }
}

/// Finalized query result detached from all tile data.
#[derive(Clone, Debug)]
pub(crate) struct QueryMatch {
    pub layer: String,
    pub coords: GeoPoint,
    pub distance: f64,
    pub geometry_type: GeometryType,
    pub id: u64,
    pub properties: Vec<(String, PropertyValue)>,
}

/// Candidate feature offered to the result set.
struct Candidate<'t> {
    /// Source layer, used to resolve tag indices.
    layer: &'t Layer,
    /// Key/value index pairs of the feature.
    tags: &'t [u32],
    coords: GeoPoint,
    distance: f64,
    geometry_type: GeometryType,
    has_id: bool,
    id: u64,
}

impl<'t> Candidate<'t> {
    /// Check whether another candidate refers to the same feature.
    ///
    /// Two entries are duplicates when layer name and geometry type match,
    /// their ids don't contradict each other, and their resolved property
    /// sequences are equal. Indices are resolved against each candidate's
    /// own layer pools, so features from distinct buffers of the same tile
    /// compare correctly.
    fn is_duplicate(&self, other: &Candidate<'_>) -> bool {
        if self.layer.name != other.layer.name {
            return false;
        }
        if self.geometry_type != other.geometry_type {
            return false;
        }
        if self.has_id && other.has_id && self.id != other.id {
            return false;
        }

        self.properties().eq(other.properties())
    }

    /// Resolved property pairs in tag order.
    fn properties(&self) -> impl Iterator<Item = (Option<&String>, Option<&Value>)> + '_ {
        self.tags.chunks_exact(2).map(|pair| {
            (self.layer.keys.get(pair[0] as usize), self.layer.values.get(pair[1] as usize))
        })
    }

    /// Copy the resolved properties out of the layer pools.
    ///
    /// Unsupported value kinds are dropped without emitting their key. The
    /// tag order of the feature is preserved.
    fn materialize_properties(&self) -> Vec<(String, PropertyValue)> {
        let mut properties = Vec::with_capacity(self.tags.len() / 2);
        for (key, value) in self.properties() {
            let (Some(key), Some(value)) = (key, value) else { continue };
            if let Some(value) = PropertyValue::from_value(value) {
                properties.push((key.clone(), value));
            }
        }
        properties
    }
}

/// Result slot, holding either a matched feature or sentinel capacity.
enum Slot<'t> {
    Occupied(Candidate<'t>),
    Empty,
}

impl Slot<'_> {
    /// Distance used for ordering; empty slots sort last.
    fn distance(&self) -> f64 {
        match self {
            Slot::Occupied(candidate) => candidate.distance,
            Slot::Empty => f64::INFINITY,
        }
    }
}

/// Bounded result buffer ordered by ascending distance.
///
/// The buffer always holds exactly `limit` slots, with unused capacity
/// marked by empty sentinel slots at infinite distance. The back slot is
/// the only candidate for non-duplicate eviction.
struct ResultSet<'t> {
    slots: Vec<Slot<'t>>,
}

impl<'t> ResultSet<'t> {
    fn new(limit: usize) -> Self {
        let mut slots = Vec::with_capacity(limit);
        slots.resize_with(limit, || Slot::Empty);
        Self { slots }
    }

    /// Offer a candidate within the search radius to the set.
    fn offer(&mut self, candidate: Candidate<'t>, dedupe: bool) {
        if dedupe {
            for slot in &mut self.slots {
                let Slot::Occupied(entry) = slot else { continue };
                if !entry.is_duplicate(&candidate) {
                    continue;
                }

                // A duplicate at most as far away replaces the stored entry,
                // which keeps queries idempotent when the same tile is
                // supplied twice.
                if candidate.distance <= entry.distance {
                    *entry = candidate;
                    self.sort();
                }
                return;
            }
        }

        let Some(back) = self.slots.last_mut() else { return };
        if candidate.distance < back.distance() {
            *back = Slot::Occupied(candidate);
            self.sort();
        }
    }

    /// Restore ascending distance order.
    fn sort(&mut self) {
        // Stable, so earlier insertions win ties.
        self.slots.sort_by(|a, b| a.distance().total_cmp(&b.distance()));
    }

    /// Drop sentinel slots and materialize the surviving entries.
    fn finalize(self) -> Vec<QueryMatch> {
        self.slots
            .into_iter()
            .filter_map(|slot| {
                let Slot::Occupied(candidate) = slot else { return None };
                Some(QueryMatch {
                    layer: candidate.layer.name.clone(),
                    coords: candidate.coords,
                    distance: candidate.distance,
                    geometry_type: candidate.geometry_type,
                    id: candidate.id,
                    properties: candidate.materialize_properties(),
                })
            })
            .collect()
    }
}
