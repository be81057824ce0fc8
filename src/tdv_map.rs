// Map projection of delayed stations: markers, initial region and GeoJSON export
use crate::tdv_models::{Coordinates, EnrichedDelay, Result, TDVError, TDVModels};
use crate::tdv_pipeline::TDVPipeline;
use geo::BoundingRect;
use geo_types::{MultiPoint, Point};
use geojson::{Feature, FeatureCollection, JsonObject, JsonValue, Value};
use log::warn;
use std::fs;
use std::path::Path;

/// Smallest span shown around the markers, in degrees.
const MIN_REGION_DELTA: f64 = 0.1;
const REGION_PADDING: f64 = 1.5;

#[derive(Debug, Clone, PartialEq)]
pub struct MapMarker {
    pub activity_id: String,
    pub title: String,
    pub description: String,
    pub coordinates: Coordinates,
    pub canceled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapRegion {
    pub latitude: f64,
    pub longitude: f64,
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

pub struct TDVMap;

impl TDVMap {
    /// One marker per delay whose origin station has a usable geometry.
    pub fn markers(delays: &[EnrichedDelay]) -> Vec<MapMarker> {
        delays
            .iter()
            .filter_map(|delay| {
                let coordinates =
                    match TDVPipeline::parse_coordinates(&delay.from_station.geometry.wgs84) {
                        Ok(coordinates) => coordinates,
                        Err(e) => {
                            warn!(
                                "Leaving {} off the map: {}",
                                delay.from_station.location_signature, e
                            );
                            return None;
                        }
                    };

                let cancelled = if delay.event.canceled { " (CANCELLED)" } else { "" };
                let title = format!(
                    "{} to {}.{}",
                    delay.from_station.advertised_name,
                    delay.destination_name(),
                    cancelled
                );
                let description = format!(
                    "Train {}. ETA was {}, new ETA is {}.",
                    delay.event.advertised_train_ident,
                    TDVModels::format_clock(&delay.event.advertised_time_at_location),
                    TDVModels::format_clock_opt(delay.event.estimated_time_at_location.as_ref()),
                );

                Some(MapMarker {
                    activity_id: delay.event.activity_id.clone(),
                    title,
                    description,
                    coordinates,
                    canceled: delay.event.canceled,
                })
            })
            .collect()
    }

    /// Region covering all markers, padded, or `None` without markers.
    pub fn region(markers: &[MapMarker]) -> Option<MapRegion> {
        let points: Vec<Point<f64>> = markers.iter().map(|m| m.coordinates.to_point()).collect();
        let rect = MultiPoint::from(points).bounding_rect()?;
        let center = rect.center();

        Some(MapRegion {
            latitude: center.y,
            longitude: center.x,
            latitude_delta: (rect.height() * REGION_PADDING).max(MIN_REGION_DELTA),
            longitude_delta: (rect.width() * REGION_PADDING).max(MIN_REGION_DELTA),
        })
    }

    pub fn to_geojson(markers: &[MapMarker]) -> FeatureCollection {
        let features = markers
            .iter()
            .map(|marker| {
                let mut properties = JsonObject::new();
                properties.insert(
                    "activity_id".to_string(),
                    JsonValue::from(marker.activity_id.clone()),
                );
                properties.insert("title".to_string(), JsonValue::from(marker.title.clone()));
                properties.insert(
                    "description".to_string(),
                    JsonValue::from(marker.description.clone()),
                );
                properties.insert("canceled".to_string(), JsonValue::from(marker.canceled));

                Feature {
                    bbox: None,
                    geometry: Some(geojson::Geometry::new(Value::Point(vec![
                        marker.coordinates.longitude,
                        marker.coordinates.latitude,
                    ]))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }

    pub fn write_geojson(path: &Path, markers: &[MapMarker]) -> Result<()> {
        let json = serde_json::to_string(&Self::to_geojson(markers))
            .map_err(|e| TDVError::ParseError(format!("Failed to encode GeoJSON: {}", e)))?;
        fs::write(path, json)
            .map_err(|e| TDVError::FileError(format!("Failed to write {:?}: {}", path, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tdv_models::{DisturbanceEvent, Geometry, LocationRef, Station};
    use chrono::DateTime;

    fn station(signature: &str, name: &str, wgs84: &str) -> Station {
        Station {
            location_signature: signature.to_string(),
            advertised_name: name.to_string(),
            geometry: Geometry {
                wgs84: wgs84.to_string(),
            },
        }
    }

    fn delay(id: &str, from: Station, to: Option<Station>, canceled: bool) -> EnrichedDelay {
        EnrichedDelay {
            event: DisturbanceEvent {
                activity_id: id.to_string(),
                activity_type: "Avgang".to_string(),
                advertised_train_ident: "8713".to_string(),
                advertised_time_at_location: DateTime::parse_from_rfc3339(
                    "2022-05-03T10:15:00+02:00",
                )
                .unwrap(),
                estimated_time_at_location: Some(
                    DateTime::parse_from_rfc3339("2022-05-03T10:40:00+02:00").unwrap(),
                ),
                canceled,
                from_location: vec![LocationRef {
                    location_name: from.location_signature.clone(),
                }],
                to_location: Vec::new(),
            },
            from_station: from,
            to_station: to,
        }
    }

    #[test]
    fn markers_skip_unmappable_stations() {
        let delays = vec![
            delay(
                "1",
                station("Kac", "Karlskrona C", "POINT (15.58 56.16)"),
                Some(station("Cst", "Stockholm C", "POINT (18.05 59.33)")),
                false,
            ),
            delay("2", station("X", "Nowhere", "POINT (broken)"), None, true),
        ];

        let markers = TDVMap::markers(&delays);

        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].title, "Karlskrona C to Stockholm C.");
        assert_eq!(
            markers[0].description,
            "Train 8713. ETA was 10:15, new ETA is 10:40."
        );
        assert_eq!(markers[0].coordinates.longitude, 15.58);
    }

    #[test]
    fn cancelled_marker_without_destination() {
        let delays = vec![delay(
            "1",
            station("Kac", "Karlskrona C", "POINT (15.58 56.16)"),
            None,
            true,
        )];

        let markers = TDVMap::markers(&delays);

        assert_eq!(markers[0].title, "Karlskrona C to unknown destination. (CANCELLED)");
        assert!(markers[0].canceled);
    }

    #[test]
    fn region_covers_markers() {
        let delays = vec![
            delay("1", station("A", "A", "POINT (15.0 56.0)"), None, false),
            delay("2", station("B", "B", "POINT (17.0 60.0)"), None, false),
        ];
        let region = TDVMap::region(&TDVMap::markers(&delays)).unwrap();

        assert_eq!(region.longitude, 16.0);
        assert_eq!(region.latitude, 58.0);
        assert_eq!(region.latitude_delta, 6.0);
        assert_eq!(region.longitude_delta, 3.0);
        assert!(TDVMap::region(&[]).is_none());
    }

    #[test]
    fn geojson_points_are_lon_lat() {
        let delays = vec![delay("1", station("A", "A", "POINT (15.58 56.16)"), None, false)];
        let collection = TDVMap::to_geojson(&TDVMap::markers(&delays));

        assert_eq!(collection.features.len(), 1);
        let geometry = collection.features[0].geometry.as_ref().unwrap();
        assert_eq!(geometry.value, Value::Point(vec![15.58, 56.16]));
        assert_eq!(
            collection.features[0].property("activity_id"),
            Some(&JsonValue::from("1"))
        );
    }

    #[test]
    fn writes_geojson_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("delays.geojson");
        let delays = vec![delay("1", station("A", "A", "POINT (15.58 56.16)"), None, false)];

        TDVMap::write_geojson(&path, &TDVMap::markers(&delays)).unwrap();

        let written: geojson::GeoJson = fs::read_to_string(&path).unwrap().parse().unwrap();
        match written {
            geojson::GeoJson::FeatureCollection(collection) => {
                assert_eq!(collection.features.len(), 1)
            }
            other => panic!("expected a feature collection, got {:?}", other),
        }
    }
}
