//! GeoJSON result serialization.
//!
//! See <https://datatracker.ietf.org/doc/html/rfc7946>.

use indexmap::IndexMap;
use serde::Serialize;

use crate::Error;
use crate::query::{PropertyValue, QueryMatch};

/// GeoJSON feature collection holding all results of a query.
#[derive(Serialize, Debug)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    kind: &'static str,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    /// Build the collection from finalized query results.
    pub(crate) fn from_matches(matches: Vec<QueryMatch>) -> Self {
        let features = matches.into_iter().map(Feature::from_match).collect();
        Self { kind: "FeatureCollection", features }
    }

    /// Serialize the collection to a GeoJSON string.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Single query result as a GeoJSON feature.
#[derive(Serialize, Debug)]
pub struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
    /// Source feature id.
    ///
    /// Always emitted; features without an id report `0`, matching the
    /// established wire behavior.
    pub id: u64,
    pub geometry: Geometry,
    pub properties: IndexMap<String, PropertyEntry>,
}

impl Feature {
    fn from_match(result: QueryMatch) -> Self {
        let mut properties: IndexMap<_, _> = result
            .properties
            .into_iter()
            .map(|(key, value)| (key, PropertyEntry::Value(value)))
            .collect();

        // A user property named "tilequery" is overwritten in place.
        let info = TilequeryInfo {
            distance: result.distance,
            geometry: result.geometry_type.as_str(),
            layer: result.layer,
        };
        properties.insert("tilequery".into(), PropertyEntry::Tilequery(info));

        let geometry = Geometry::Point { coordinates: [result.coords.lon, result.coords.lat] };
        Self { kind: "Feature", id: result.id, geometry, properties }
    }
}

/// Snapped result geometry.
#[derive(Serialize, Debug)]
#[serde(tag = "type")]
pub enum Geometry {
    /// Closest point on the source geometry, as `[lon, lat]`.
    Point { coordinates: [f64; 2] },
}

/// Values appearing in a result feature's properties object.
#[derive(Serialize, Debug)]
#[serde(untagged)]
pub enum PropertyEntry {
    Value(PropertyValue),
    Tilequery(TilequeryInfo),
}

/// Query metadata injected into each result's properties.
#[derive(Serialize, Debug)]
pub struct TilequeryInfo {
    /// Great-circle distance from the query point in meters.
    pub distance: f64,
    /// Source geometry type, one of `point`, `linestring`, or `polygon`.
    pub geometry: &'static str,
    /// Source layer name.
    pub layer: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeoPoint;
    use crate::tile::GeometryType;

    fn result(properties: Vec<(String, PropertyValue)>) -> QueryMatch {
        QueryMatch {
            layer: "poi".into(),
            coords: GeoPoint::new(1.5, -2.5),
            distance: 42.25,
            geometry_type: GeometryType::Point,
            id: 0,
            properties,
        }
    }

    #[test]
    fn empty_collection() {
        let collection = FeatureCollection::from_matches(Vec::new());

        assert_eq!(collection.to_json().unwrap(), r#"{"type":"FeatureCollection","features":[]}"#);
    }

    #[test]
    fn feature_shape() {
        let properties = vec![
            ("name".into(), PropertyValue::String("X".into())),
            ("height".into(), PropertyValue::Uint(12)),
            ("open".into(), PropertyValue::Bool(true)),
        ];
        let collection = FeatureCollection::from_matches(vec![result(properties)]);
        let output = serde_json::to_value(&collection).unwrap();

        let feature = &output["features"][0];
        assert_eq!(feature["type"], "Feature");
        // Features without an id report id 0.
        assert_eq!(feature["id"], 0);
        assert_eq!(feature["geometry"]["type"], "Point");
        assert_eq!(feature["geometry"]["coordinates"][0], 1.5);
        assert_eq!(feature["geometry"]["coordinates"][1], -2.5);
        assert_eq!(feature["properties"]["name"], "X");
        assert_eq!(feature["properties"]["height"], 12);
        assert_eq!(feature["properties"]["open"], true);
        assert_eq!(feature["properties"]["tilequery"]["distance"], 42.25);
        assert_eq!(feature["properties"]["tilequery"]["geometry"], "point");
        assert_eq!(feature["properties"]["tilequery"]["layer"], "poi");
    }

    #[test]
    fn property_order_is_preserved() {
        let properties = vec![
            ("zulu".into(), PropertyValue::Int(1)),
            ("alpha".into(), PropertyValue::Int(2)),
            ("mike".into(), PropertyValue::Int(3)),
        ];
        let collection = FeatureCollection::from_matches(vec![result(properties)]);
        let json = collection.to_json().unwrap();

        // Property order follows the feature's tag order, not key order.
        let zulu = json.find("\"zulu\"").unwrap();
        let alpha = json.find("\"alpha\"").unwrap();
        let mike = json.find("\"mike\"").unwrap();
        assert!(zulu < alpha && alpha < mike);
    }

    #[test]
    fn tilequery_collision_is_overwritten() {
        let properties = vec![
            ("before".into(), PropertyValue::Int(1)),
            ("tilequery".into(), PropertyValue::String("user".into())),
            ("after".into(), PropertyValue::Int(2)),
        ];
        let collection = FeatureCollection::from_matches(vec![result(properties)]);
        let output = serde_json::to_value(&collection).unwrap();

        // The injected object replaces the user value at its position.
        let properties = output["features"][0]["properties"].as_object().unwrap();
        assert_eq!(properties.len(), 3);
        assert_eq!(properties["tilequery"]["layer"], "poi");
    }
}
