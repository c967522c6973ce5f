//! Vector tile decoding.

use std::io::Read;
use std::mem;

use flate2::read::GzDecoder;
use prost::Message;

use crate::Error;
use crate::geometry::{Point, TileGeometry, TileId};
use crate::tile::protobuf::{Command, Feature, GeomType, GeometryIter, Tile};

pub mod protobuf;

/// Magic bytes identifying a gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Borrowed view of an encoded vector tile.
///
/// The data may be raw vector tile bytes or a gzip-compressed tile; the
/// decoder detects compression from the leading magic bytes.
#[derive(Copy, Clone, Debug)]
pub struct TileBuffer<'a> {
    pub id: TileId,
    pub data: &'a [u8],
}

impl<'a> TileBuffer<'a> {
    pub fn new(z: u32, x: u32, y: u32, data: &'a [u8]) -> Self {
        Self { id: TileId::new(z, x, y), data }
    }
}

/// Owned tile buffer for queries crossing thread boundaries.
#[derive(Clone, Debug)]
pub struct TileData {
    pub id: TileId,
    pub data: Vec<u8>,
}

impl TileData {
    pub fn new(z: u32, x: u32, y: u32, data: Vec<u8>) -> Self {
        Self { id: TileId::new(z, x, y), data }
    }

    /// Get a borrowed view of this tile.
    pub fn buffer(&self) -> TileBuffer<'_> {
        TileBuffer { id: self.id, data: &self.data }
    }
}

/// Fully decoded vector tile at its grid position.
///
/// Decoded tiles own all layer data; query results borrow layer names and
/// key/value pools from them until properties are materialized, so decoded
/// tiles must outlive the query execution.
#[derive(Debug)]
pub struct DecodedTile {
    pub id: TileId,
    pub tile: Tile,
}

impl DecodedTile {
    /// Decode a tile buffer, transparently decompressing gzipped data.
    pub fn decode(buffer: TileBuffer<'_>) -> Result<Self, Error> {
        let tile = if buffer.data.starts_with(&GZIP_MAGIC) {
            let mut decompressed = Vec::new();
            let mut decoder = GzDecoder::new(buffer.data);
            decoder.read_to_end(&mut decompressed).map_err(Error::Decompress)?;
            Tile::decode(decompressed.as_slice())?
        } else {
            Tile::decode(buffer.data)?
        };

        Ok(Self { id: buffer.id, tile })
    }
}

/// Geometry types usable as query results.
#[derive(Hash, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Debug)]
pub enum GeometryType {
    Point,
    Linestring,
    Polygon,
}

impl GeometryType {
    /// Name used in GeoJSON output and geometry filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Linestring => "linestring",
            Self::Polygon => "polygon",
        }
    }
}

impl TryFrom<GeomType> for GeometryType {
    type Error = ();

    fn try_from(geometry_type: GeomType) -> Result<Self, Self::Error> {
        match geometry_type {
            GeomType::Unknown => Err(()),
            GeomType::Point => Ok(GeometryType::Point),
            GeomType::Linestring => Ok(GeometryType::Linestring),
            GeomType::Polygon => Ok(GeometryType::Polygon),
        }
    }
}

/// Extract a feature's tile-local geometry.
///
/// Returns `None` for unknown geometry types and for features whose command
/// stream yields no usable coordinates.
pub fn extract_geometry(feature: &Feature) -> Option<TileGeometry> {
    let geometry_type = GeometryType::try_from(feature.r#type()).ok()?;

    // Command offsets are relative to a cursor starting at (0, 0);
    // collected coordinates are absolute.
    let mut x = 0i64;
    let mut y = 0i64;

    match geometry_type {
        GeometryType::Point => {
            let mut points = Vec::new();
            for command in GeometryIter::new(&feature.geometry) {
                if let Command::MoveTo(dx, dy) = command {
                    x += dx as i64;
                    y += dy as i64;
                    points.push(Point::new(x, y));
                }
            }

            (!points.is_empty()).then_some(TileGeometry::Points(points))
        },
        GeometryType::Linestring => {
            let mut lines = Vec::new();
            let mut line = Vec::new();
            for command in GeometryIter::new(&feature.geometry) {
                match command {
                    // Each `MoveTo` starts a new linestring part.
                    Command::MoveTo(dx, dy) => {
                        if line.len() > 1 {
                            lines.push(mem::take(&mut line));
                        }
                        line.clear();

                        x += dx as i64;
                        y += dy as i64;
                        line.push(Point::new(x, y));
                    },
                    Command::LineTo(dx, dy) => {
                        x += dx as i64;
                        y += dy as i64;
                        line.push(Point::new(x, y));
                    },
                    // Not part of linestring encoding.
                    Command::ClosePath => (),
                }
            }
            if line.len() > 1 {
                lines.push(line);
            }

            (!lines.is_empty()).then_some(TileGeometry::Lines(lines))
        },
        GeometryType::Polygon => {
            let mut rings = Vec::new();
            let mut ring = Vec::new();
            for command in GeometryIter::new(&feature.geometry) {
                match command {
                    Command::MoveTo(dx, dy) => {
                        // Unterminated rings are dropped.
                        ring.clear();

                        x += dx as i64;
                        y += dy as i64;
                        ring.push(Point::new(x, y));
                    },
                    Command::LineTo(dx, dy) => {
                        x += dx as i64;
                        y += dy as i64;
                        ring.push(Point::new(x, y));
                    },
                    Command::ClosePath => {
                        // The closing edge is implicit; rings need at least
                        // three vertices to span an area.
                        if ring.len() >= 3 {
                            rings.push(mem::take(&mut ring));
                        } else {
                            ring.clear();
                        }
                    },
                }
            }

            (!rings.is_empty()).then_some(TileGeometry::Rings(rings))
        },
    }
}
