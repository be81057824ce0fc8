// Data model for the Train Delay Viewer (Swedish rail traffic)
//
// Records mirror the traffic API payloads:
// - Stations:  {base}/stations  -> TrainStation objects (LocationSignature, Geometry.WGS84)
// - Delays:    {base}/delayed   -> TrainAnnouncement objects with deviations
// - Messages:  {base}/messages  -> TrainMessage objects (Header, TrafficImpact)
// - Favorites: {auth}/data      -> account artefacts {id, artefact}

use chrono::{DateTime, FixedOffset};
use chrono_tz::Europe::Stockholm;
use serde::{Deserialize, Serialize};

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "WGS84", default)]
    pub wgs84: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Station {
    pub location_signature: String,
    #[serde(rename = "AdvertisedLocationName", default)]
    pub advertised_name: String,
    #[serde(default)]
    pub geometry: Geometry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LocationRef {
    pub location_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DisturbanceEvent {
    pub activity_id: String,
    #[serde(default)]
    pub activity_type: String,
    #[serde(default)]
    pub advertised_train_ident: String,
    pub advertised_time_at_location: DateTime<FixedOffset>,
    #[serde(default)]
    pub estimated_time_at_location: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub canceled: bool,
    #[serde(default)]
    pub from_location: Vec<LocationRef>,
    #[serde(default)]
    pub to_location: Vec<LocationRef>,
}

impl DisturbanceEvent {
    /// Signature of the first origin location, if any.
    pub fn origin_signature(&self) -> Option<&str> {
        self.from_location.first().map(|l| l.location_name.as_str())
    }

    pub fn destination_signature(&self) -> Option<&str> {
        self.to_location.first().map(|l| l.location_name.as_str())
    }

    /// Events without an origin cannot be placed on any station.
    pub fn is_routable(&self) -> bool {
        !self.from_location.is_empty()
    }
}

/// A disturbance joined with the station records at both ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedDelay {
    #[serde(flatten)]
    pub event: DisturbanceEvent,
    pub from_station: Station,
    pub to_station: Option<Station>,
}

impl EnrichedDelay {
    pub fn destination_name(&self) -> &str {
        self.to_station
            .as_ref()
            .map(|s| s.advertised_name.as_str())
            .unwrap_or("unknown destination")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrafficImpact {
    #[serde(default)]
    pub from_location: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrafficMessage {
    #[serde(default)]
    pub header: String,
    #[serde(default)]
    pub external_description: String,
    #[serde(default)]
    pub traffic_impact: Vec<TrafficImpact>,
}

impl TrafficMessage {
    /// True when any impact entry starts at `signature`.
    pub fn affects(&self, signature: &str) -> bool {
        self.traffic_impact
            .iter()
            .any(|impact| impact.from_location.first().map(String::as_str) == Some(signature))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteRecord {
    pub id: i64,
    pub artefact: String,
}

/// Decoded form of `FavoriteRecord::artefact`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteArtefact {
    pub station: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub geo: Option<serde_json::Value>,
}

impl FavoriteArtefact {
    pub fn for_station(station: &Station) -> Self {
        FavoriteArtefact {
            station: station.location_signature.clone(),
            name: Some(station.advertised_name.clone()),
            geo: Some(serde_json::Value::String(station.geometry.wgs84.clone())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn to_point(self) -> geo_types::Point<f64> {
        geo_types::Point::new(self.longitude, self.latitude)
    }
}

/// Result of the latest delay refresh. Replaced wholesale on every refresh.
#[derive(Debug, Clone, Default)]
pub struct DelayBoard {
    pub stations: Vec<Station>,
    pub delays: Vec<EnrichedDelay>,
}

impl DelayBoard {
    pub fn find_station(&self, query: &str) -> Option<&Station> {
        self.stations.iter().find(|s| {
            s.location_signature.eq_ignore_ascii_case(query)
                || s.advertised_name.eq_ignore_ascii_case(query)
        })
    }
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum TDVError {
    NetworkError(String),
    ParseError(String),
    AuthError(String),
    FileError(String),
}

impl std::fmt::Display for TDVError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TDVError::NetworkError(e) => write!(f, "Network error: {}", e),
            TDVError::ParseError(e) => write!(f, "Parse error: {}", e),
            TDVError::AuthError(e) => write!(f, "Auth error: {}", e),
            TDVError::FileError(e) => write!(f, "File error: {}", e),
        }
    }
}

impl std::error::Error for TDVError {}

pub type Result<T> = std::result::Result<T, TDVError>;

// ============================================================================
// Formatting helpers
// ============================================================================

pub struct TDVModels;

impl TDVModels {
    /// Clock time in Swedish local time, e.g. "14:05".
    pub fn format_clock(time: &DateTime<FixedOffset>) -> String {
        time.with_timezone(&Stockholm).format("%H:%M").to_string()
    }

    pub fn format_clock_opt(time: Option<&DateTime<FixedOffset>>) -> String {
        time.map(Self::format_clock).unwrap_or_else(|| "--:--".to_string())
    }

    /// Minutes between advertised and estimated time, when both are known.
    pub fn delay_minutes(event: &DisturbanceEvent) -> Option<i64> {
        event
            .estimated_time_at_location
            .map(|est| (est - event.advertised_time_at_location).num_minutes())
    }

    /// "Avgang" is reported by the API for departures.
    pub fn activity_label(activity_type: &str) -> &str {
        match activity_type {
            "Avgang" => "Departure",
            "Ankomst" => "Arrival",
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_station_payload() {
        let json = r#"{
            "AdvertisedLocationName": "Karlskrona C",
            "Geometry": { "WGS84": "POINT (15.5869 56.1612)" },
            "LocationSignature": "Kac"
        }"#;
        let station: Station = serde_json::from_str(json).unwrap();
        assert_eq!(station.location_signature, "Kac");
        assert_eq!(station.advertised_name, "Karlskrona C");
        assert_eq!(station.geometry.wgs84, "POINT (15.5869 56.1612)");
    }

    #[test]
    fn disturbance_without_locations_is_not_routable() {
        let json = r#"{
            "ActivityId": "1500adde-f7b1-8d1a-08da-1234",
            "ActivityType": "Avgang",
            "AdvertisedTrainIdent": "1021",
            "AdvertisedTimeAtLocation": "2022-05-03T10:15:00.000+02:00",
            "Canceled": true
        }"#;
        let event: DisturbanceEvent = serde_json::from_str(json).unwrap();
        assert!(!event.is_routable());
        assert_eq!(event.origin_signature(), None);
        assert!(event.estimated_time_at_location.is_none());
        assert!(event.canceled);
    }

    #[test]
    fn disturbance_with_locations() {
        let json = r#"{
            "ActivityId": "a1",
            "ActivityType": "Avgang",
            "AdvertisedTrainIdent": "8713",
            "AdvertisedTimeAtLocation": "2022-05-03T10:15:00.000+02:00",
            "EstimatedTimeAtLocation": "2022-05-03T10:27:00.000+02:00",
            "Canceled": false,
            "FromLocation": [{ "LocationName": "Cst", "Priority": 1, "Order": 0 }],
            "ToLocation": [{ "LocationName": "U", "Priority": 1, "Order": 0 }]
        }"#;
        let event: DisturbanceEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.origin_signature(), Some("Cst"));
        assert_eq!(event.destination_signature(), Some("U"));
        assert_eq!(TDVModels::delay_minutes(&event), Some(12));
        assert_eq!(TDVModels::format_clock(&event.advertised_time_at_location), "10:15");
    }

    #[test]
    fn message_without_impact_affects_nothing() {
        let json = r#"{ "Header": "Signalfel", "ExternalDescription": "Signalfel vid Kac" }"#;
        let message: TrafficMessage = serde_json::from_str(json).unwrap();
        assert!(message.traffic_impact.is_empty());
        assert!(!message.affects("Kac"));
    }

    #[test]
    fn message_affects_only_origin_of_impact() {
        let message = TrafficMessage {
            header: "Spårfel".to_string(),
            external_description: String::new(),
            traffic_impact: vec![TrafficImpact {
                from_location: vec!["Hb".to_string(), "Kac".to_string()],
            }],
        };
        assert!(message.affects("Hb"));
        assert!(!message.affects("Kac"));
    }

    #[test]
    fn activity_labels() {
        assert_eq!(TDVModels::activity_label("Avgang"), "Departure");
        assert_eq!(TDVModels::activity_label("Ankomst"), "Arrival");
        assert_eq!(TDVModels::activity_label("Other"), "Other");
    }
}
