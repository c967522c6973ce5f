//! Protobuf mapbox vector tile deserialization.
//!
//! See <https://github.com/mapbox/vector-tile-spec/tree/master/2.1>.

use prost::{Enumeration, Message};
use tracing::error;

/// Vector tile data.
#[derive(Clone, PartialEq, Message)]
pub struct Tile {
    #[prost(message, repeated, tag = "3")]
    pub layers: Vec<Layer>,
}

/// Tile layer.
///
/// See <https://github.com/mapbox/vector-tile-spec/tree/master/2.1#41-layers>.
#[derive(Clone, PartialEq, Message)]
pub struct Layer {
    /// Vector tile specification version used by this layer.
    #[prost(uint32, required, tag = "15", default = "1")]
    pub version: u32,
    /// Unique layer identifier.
    #[prost(string, required, tag = "1")]
    pub name: String,
    /// The features in this layer.
    #[prost(message, repeated, tag = "2")]
    pub features: Vec<Feature>,
    /// Tag keys used by the layer's features.
    #[prost(string, repeated, tag = "3")]
    pub keys: Vec<String>,
    /// Tag values used by the layer's features.
    #[prost(message, repeated, tag = "4")]
    pub values: Vec<Value>,
    /// Inclusive width and height of the layer's coordinate system.
    #[prost(uint32, tag = "5", default = "4096")]
    pub extent: u32,
}

/// Layer features.
///
/// See <https://github.com/mapbox/vector-tile-spec/tree/master/2.1#42-features>.
#[derive(Clone, PartialEq, Message)]
pub struct Feature {
    /// Unique feature identifier.
    #[prost(uint64, optional, tag = "1", default = "0")]
    pub id: Option<u64>,
    /// Feature tags are consecutive pairs of keys and values indexing into
    /// [`Layer::keys`] and [`Layer::values`].
    ///
    /// See <https://github.com/mapbox/vector-tile-spec/tree/master/2.1#44-feature-attributes>.
    #[prost(uint32, repeated, tag = "2")]
    pub tags: Vec<u32>,
    /// The type of geometry stored in this feature.
    #[prost(enumeration = "GeomType", optional, tag = "3", default = "Unknown")]
    pub r#type: Option<i32>,
    /// Contains a stream of commands and parameters.
    ///
    /// See <https://github.com/mapbox/vector-tile-spec/tree/master/2.1#43-geometry-encoding>.
    #[prost(uint32, repeated, tag = "4")]
    pub geometry: Vec<u32>,
}

/// Types of geometry for a feature.
///
/// See <https://github.com/mapbox/vector-tile-spec/tree/master/2.1#434-geometry-types>.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum GeomType {
    Unknown = 0,
    Point = 1,
    Linestring = 2,
    Polygon = 3,
}

/// Feature tag's value.
///
/// Exactly one of these values must be present in a valid message.
///
/// See <https://github.com/mapbox/vector-tile-spec/tree/master/2.1#41-layers>.
#[derive(Clone, PartialEq, Message)]
pub struct Value {
    #[prost(string, optional, tag = "1")]
    pub string_value: Option<String>,
    #[prost(float, optional, tag = "2")]
    pub float_value: Option<f32>,
    #[prost(double, optional, tag = "3")]
    pub double_value: Option<f64>,
    #[prost(int64, optional, tag = "4")]
    pub int_value: Option<i64>,
    #[prost(uint64, optional, tag = "5")]
    pub uint_value: Option<u64>,
    #[prost(sint64, optional, tag = "6")]
    pub sint_value: Option<i64>,
    #[prost(bool, optional, tag = "7")]
    pub bool_value: Option<bool>,
}

/// Geometry drawing command with relative, zigzag-decoded offsets.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Command {
    /// Move the cursor without drawing.
    MoveTo(i32, i32),
    /// Draw an edge from the cursor position.
    LineTo(i32, i32),
    /// Close the current ring.
    ClosePath,
}

// Command ids defined by the geometry encoding.
const MOVE_TO: u32 = 1;
const LINE_TO: u32 = 2;
const CLOSE_PATH: u32 = 7;

/// Iterator over the commands of a feature's geometry stream.
///
/// Commands are announced by a header integer packing the command id with a
/// repetition count. Each `MoveTo`/`LineTo` repetition consumes one pair of
/// zigzag-encoded offsets, relative to the cursor position after the
/// previous command. Malformed streams end iteration early with the
/// remaining integers unread.
pub struct GeometryIter<'a> {
    stream: &'a [u32],
    cursor: usize,

    /// Remaining repetitions of the announced command.
    repeat: u32,
    command_id: u32,
}

impl<'a> GeometryIter<'a> {
    pub fn new(stream: &'a [u32]) -> Self {
        Self { stream, cursor: 0, repeat: 0, command_id: 0 }
    }

    /// Read one integer from the stream.
    fn read(&mut self) -> Option<u32> {
        let value = *self.stream.get(self.cursor)?;
        self.cursor += 1;
        Some(value)
    }
}

impl<'a> Iterator for GeometryIter<'a> {
    type Item = Command;

    fn next(&mut self) -> Option<Self::Item> {
        // Announce the next command once the current one is exhausted,
        // skipping headers with a zero repetition count.
        while self.repeat == 0 {
            let header = self.read()?;
            self.command_id = header & 0x7;
            self.repeat = header >> 3;

            if !matches!(self.command_id, MOVE_TO | LINE_TO | CLOSE_PATH) {
                error!("Unknown geometry command id: {}", self.command_id);
                self.cursor = self.stream.len();
                return None;
            }
        }

        self.repeat -= 1;
        if self.command_id == CLOSE_PATH {
            return Some(Command::ClosePath);
        }

        let dx = zigzag_decode(self.read()?);
        let dy = zigzag_decode(self.read()?);
        match self.command_id {
            MOVE_TO => Some(Command::MoveTo(dx, dy)),
            _ => Some(Command::LineTo(dx, dy)),
        }
    }
}

/// Decode a zigzag-encoded command parameter.
fn zigzag_decode(parameter: u32) -> i32 {
    ((parameter >> 1) as i32) ^ -((parameter & 1) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_point_commands() {
        // A single cursor move.
        let stream = [9, 6, 5];
        let commands: Vec<_> = GeometryIter::new(&stream).collect();
        assert_eq!(commands, vec![Command::MoveTo(3, -3)]);

        // Multipoints repeat the move command under one header.
        let stream = [17, 8, 8, 1, 1];
        let commands: Vec<_> = GeometryIter::new(&stream).collect();
        assert_eq!(commands, vec![Command::MoveTo(4, 4), Command::MoveTo(-1, -1)]);
    }

    #[test]
    fn decode_linestring_commands() {
        let stream = [9, 2, 2, 26, 10, 0, 0, 10, 9, 0];
        let commands: Vec<_> = GeometryIter::new(&stream).collect();
        assert_eq!(commands, vec![
            Command::MoveTo(1, 1),
            Command::LineTo(5, 0),
            Command::LineTo(0, 5),
            Command::LineTo(-5, 0),
        ]);
    }

    #[test]
    fn decode_ring_commands() {
        let stream = [9, 0, 0, 18, 16, 0, 0, 16, 15];
        let commands: Vec<_> = GeometryIter::new(&stream).collect();
        assert_eq!(commands, vec![
            Command::MoveTo(0, 0),
            Command::LineTo(8, 0),
            Command::LineTo(0, 8),
            Command::ClosePath,
        ]);

        // Repeated close commands are emitted individually.
        let stream = [23];
        let commands: Vec<_> = GeometryIter::new(&stream).collect();
        assert_eq!(commands, vec![Command::ClosePath, Command::ClosePath]);
    }

    #[test]
    fn decode_degenerate_streams() {
        // Nothing to decode.
        assert_eq!(GeometryIter::new(&[]).next(), None);

        // Headers with a zero repetition count are skipped.
        let stream = [1, 9, 6, 5];
        let commands: Vec<_> = GeometryIter::new(&stream).collect();
        assert_eq!(commands, vec![Command::MoveTo(3, -3)]);

        // Command id 5 is not part of the encoding.
        let stream = [45, 2, 2];
        assert_eq!(GeometryIter::new(&stream).next(), None);

        // Parameters cut off mid-command end iteration.
        let stream = [17, 8, 8, 2];
        let commands: Vec<_> = GeometryIter::new(&stream).collect();
        assert_eq!(commands, vec![Command::MoveTo(4, 4)]);
    }

    #[test]
    fn roundtrip_encode_decode() {
        let tile = Tile {
            layers: vec![Layer {
                version: 2,
                name: "poi".into(),
                features: vec![Feature {
                    id: Some(7),
                    tags: vec![0, 0],
                    r#type: Some(GeomType::Point as i32),
                    geometry: vec![9, 4096, 4096],
                }],
                keys: vec!["name".into()],
                values: vec![Value { string_value: Some("X".into()), ..Default::default() }],
                extent: 4096,
            }],
        };

        let encoded = tile.encode_to_vec();
        let decoded = Tile::decode(encoded.as_slice()).unwrap();

        assert_eq!(decoded, tile);
    }
}
