// Delay correlation and station enrichment
//
// Every function here is pure: it takes the records of one refresh cycle and
// returns a fresh result. Nothing is cached between calls.

use crate::tdv_models::{
    Coordinates, DisturbanceEvent, EnrichedDelay, FavoriteArtefact, FavoriteRecord, Result,
    Station, TDVError, TrafficMessage,
};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};

/// Length of the `POINT (` wrapper in front of the coordinate pair.
const GEOMETRY_PREFIX_LEN: usize = 7;

// ============================================================================
// Message lookup state
// ============================================================================

/// Outcome of looking up traffic messages for a station.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MessageLookup {
    #[default]
    NotFetched,
    Empty,
    Found(Vec<TrafficMessage>),
}

impl MessageLookup {
    /// Re-fetch gate used by the details view.
    ///
    /// `Empty` is terminal and more than one message counts as already fetched.
    /// A single found message does not close the gate, so it is fetched again
    /// on the next call. That conflation of "has data" with "done fetching" is
    /// the long-standing behaviour of the client and is kept as-is.
    pub fn should_fetch(&self) -> bool {
        match self {
            MessageLookup::Empty => false,
            MessageLookup::Found(messages) if messages.len() > 1 => false,
            _ => true,
        }
    }

    pub fn messages(&self) -> &[TrafficMessage] {
        match self {
            MessageLookup::Found(messages) => messages,
            _ => &[],
        }
    }
}

/// Message lookup bound to the currently selected station.
#[derive(Debug, Clone, Default)]
pub struct StationMessages {
    station: Option<String>,
    lookup: MessageLookup,
}

impl StationMessages {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn station(&self) -> Option<&str> {
        self.station.as_deref()
    }

    pub fn lookup(&self) -> &MessageLookup {
        &self.lookup
    }

    /// Switch to `signature`. The previous lookup is dropped when the station changes.
    pub fn select(&mut self, signature: &str) {
        if self.station.as_deref() != Some(signature) {
            self.station = Some(signature.to_string());
            self.lookup = MessageLookup::NotFetched;
        }
    }

    /// Select `signature` and, if the gate allows it, load the feed with
    /// `fetch` and match it against the station.
    pub fn ensure<F>(&mut self, signature: &str, fetch: F) -> Result<&MessageLookup>
    where
        F: FnOnce() -> Result<Vec<TrafficMessage>>,
    {
        self.select(signature);

        if !self.lookup.should_fetch() {
            debug!("Skipping message fetch for {} ({:?})", signature, self.lookup);
            return Ok(&self.lookup);
        }

        let messages = fetch()?;
        self.lookup = TDVPipeline::find_messages(signature, &messages);
        Ok(&self.lookup)
    }
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct TDVPipeline;

impl TDVPipeline {
    /// Parse a `POINT (<lon> <lat>)` geometry. Longitude comes first in the source text.
    pub fn parse_coordinates(geometry: &str) -> Result<Coordinates> {
        let inner = geometry
            .len()
            .checked_sub(1)
            .filter(|end| *end >= GEOMETRY_PREFIX_LEN)
            .and_then(|end| geometry.get(GEOMETRY_PREFIX_LEN..end))
            .ok_or_else(|| TDVError::ParseError(format!("Geometry too short: {:?}", geometry)))?;

        let tokens: Vec<&str> = inner.split_whitespace().collect();
        if tokens.len() != 2 {
            return Err(TDVError::ParseError(format!(
                "Expected two coordinates in {:?}, found {}",
                geometry,
                tokens.len()
            )));
        }

        let parse = |token: &str| {
            token
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| {
                    TDVError::ParseError(format!("Invalid coordinate {:?} in {:?}", token, geometry))
                })
        };

        let longitude = parse(tokens[0])?;
        let latitude = parse(tokens[1])?;

        Ok(Coordinates { latitude, longitude })
    }

    /// Join disturbances to stations on location signature.
    ///
    /// One record per station that is the origin of a routable event, in
    /// station order. When several events start at the same station the first
    /// one in feed order wins. Destination lookup is best effort.
    pub fn correlate(stations: &[Station], events: &[DisturbanceEvent]) -> Vec<EnrichedDelay> {
        if stations.is_empty() || events.is_empty() {
            return Vec::new();
        }

        let mut first_event: HashMap<&str, &DisturbanceEvent> = HashMap::new();
        let mut unroutable = 0usize;
        for event in events {
            if !event.is_routable() {
                unroutable += 1;
                continue;
            }
            if let Some(origin) = event.origin_signature() {
                first_event.entry(origin).or_insert(event);
            }
        }

        let mut directory: HashMap<&str, &Station> = HashMap::with_capacity(stations.len());
        for station in stations {
            directory
                .entry(station.location_signature.as_str())
                .or_insert(station);
        }

        let mut emitted: HashSet<&str> = HashSet::new();
        let delays: Vec<EnrichedDelay> = stations
            .iter()
            .filter_map(|from_station| {
                let signature = from_station.location_signature.as_str();
                // Repeated signatures are the same station; only the first copy emits.
                if !emitted.insert(signature) {
                    return None;
                }
                let event = first_event.get(signature)?;

                let to_station = event
                    .destination_signature()
                    .and_then(|dest| directory.get(dest))
                    .map(|station| (*station).clone());

                if to_station.is_none() {
                    debug!(
                        "Destination {:?} of activity {} not in station directory",
                        event.destination_signature(),
                        event.activity_id
                    );
                }

                Some(EnrichedDelay {
                    event: (*event).clone(),
                    from_station: from_station.clone(),
                    to_station,
                })
            })
            .collect();

        debug!(
            "Correlated {} delays from {} stations and {} events ({} unroutable)",
            delays.len(),
            stations.len(),
            events.len(),
            unroutable
        );

        delays
    }

    /// Messages whose traffic impact starts at `signature`, each at most once.
    pub fn find_messages(signature: &str, messages: &[TrafficMessage]) -> MessageLookup {
        let found: Vec<TrafficMessage> = messages
            .iter()
            .filter(|message| message.affects(signature))
            .cloned()
            .collect();

        debug!("Found {} messages for {}", found.len(), signature);

        if found.is_empty() {
            MessageLookup::Empty
        } else {
            MessageLookup::Found(found)
        }
    }

    /// Normalise quoting in a stored favorite artefact before JSON parsing.
    ///
    /// Artefacts come back from the account store in two shapes: valid JSON
    /// wrapped in stray single quotes (`'{"station":"Cst"}'`) and JSON written
    /// with single quotes (`{'station': 'Cst'}`). The first loses its single
    /// quotes, the second has them turned into double quotes.
    ///
    /// Apostrophes inside values are not told apart from quoting: they are
    /// dropped from double-quoted artefacts and break single-quoted ones, which
    /// then fail to parse. Station signatures never contain one.
    pub fn sanitize_artefact(raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed.contains('"') {
            trimmed.replace('\'', "")
        } else {
            trimmed.replace('\'', "\"")
        }
    }

    pub fn parse_artefact(raw: &str) -> Result<FavoriteArtefact> {
        let cleaned = Self::sanitize_artefact(raw);
        serde_json::from_str(&cleaned)
            .map_err(|e| TDVError::ParseError(format!("Invalid favorite artefact {:?}: {}", raw, e)))
    }

    /// Delays whose origin station is bookmarked, in delay order, once per activity.
    pub fn match_favorites(
        favorites: &[FavoriteRecord],
        delays: &[EnrichedDelay],
    ) -> Vec<EnrichedDelay> {
        let bookmarked: HashSet<String> = favorites
            .iter()
            .filter_map(|favorite| match Self::parse_artefact(&favorite.artefact) {
                Ok(artefact) => Some(artefact.station),
                Err(e) => {
                    warn!("Skipping favorite {}: {}", favorite.id, e);
                    None
                }
            })
            .collect();

        if bookmarked.is_empty() {
            return Vec::new();
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut matched = Vec::new();
        for delay in delays {
            if bookmarked.contains(&delay.from_station.location_signature)
                && seen.insert(delay.event.activity_id.as_str())
            {
                matched.push(delay.clone());
            }
        }

        matched
    }

    /// The stored favorite that bookmarks `signature`, if any.
    pub fn favorite_for_station<'a>(
        favorites: &'a [FavoriteRecord],
        signature: &str,
    ) -> Option<&'a FavoriteRecord> {
        favorites.iter().find(|favorite| {
            Self::parse_artefact(&favorite.artefact)
                .map(|artefact| artefact.station == signature)
                .unwrap_or(false)
        })
    }
}
