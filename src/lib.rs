//! Nearest-feature queries against Mapbox vector tiles.
//!
//! Given a geographic point, a search radius, and a set of encoded vector
//! tile buffers, [`query`] finds the closest features across all tiles and
//! returns them as a GeoJSON feature collection. Each result is snapped to
//! the nearest point on its source geometry and annotated with the
//! great-circle distance to the query point in meters.
//!
//! Tile buffers may be raw Mapbox Vector Tile data or gzip-compressed as a
//! whole; compression is detected and handled transparently. Queries can run
//! synchronously through [`query`] or off-thread through a [`QueryPool`].

use thiserror::Error;

pub use crate::geojson::{Feature, FeatureCollection, Geometry, TilequeryInfo};
pub use crate::geometry::{GeoPoint, TileId};
pub use crate::pool::QueryPool;
pub use crate::query::{GeomFilter, PropertyValue, QueryOptions, query};
pub use crate::tile::{GeometryType, TileBuffer, TileData};

pub mod geojson;
pub mod geometry;
pub mod pool;
pub mod query;
pub mod tile;

/// Query errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    TileDecode(#[from] prost::DecodeError),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decompress tile buffer: {0}")]
    Decompress(#[source] std::io::Error),
    #[error("'tiles' array must be of length greater than 0")]
    NoTiles,
    #[error("'lnglat' values must be finite numbers")]
    InvalidLngLat,
    #[error("'radius' must be a positive number")]
    InvalidRadius,
    #[error("'limit' must be 1 or greater")]
    LimitTooSmall,
    #[error("'limit' must be less than 1000")]
    LimitTooLarge,
    #[error("'layers' values must be non-empty strings")]
    EmptyLayerName,
    #[error("'geometry' must be 'point', 'linestring', or 'polygon'")]
    InvalidGeometryFilter,
    #[error("query pool has shut down")]
    PoolShutdown,
}
