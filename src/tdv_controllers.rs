// Controllers for the Train Delay Viewer terminal client
use crate::tdv_api::{AuthClient, Session, SessionStore, TrafficClient};
use crate::tdv_config::{AppConfig, Args};
use crate::tdv_map::TDVMap;
use crate::tdv_models::{DelayBoard, EnrichedDelay, FavoriteArtefact, Result, TDVError};
use crate::tdv_pipeline::{StationMessages, TDVPipeline};
use crate::tdv_views::TDVViews;
use log::{info, warn};
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;

const DEFAULT_GEOJSON_PATH: &str = "delays.geojson";

pub struct TDVControllers {
    runtime: Runtime,
    traffic: TrafficClient,
    auth: AuthClient,
    store: SessionStore,
    session: Option<Session>,
    board: DelayBoard,
    messages: StationMessages,
}

impl TDVControllers {
    pub fn new(args: &Args) -> Result<Self> {
        let config = AppConfig::from(args);
        let runtime = Runtime::new()
            .map_err(|e| TDVError::NetworkError(format!("Failed to start runtime: {}", e)))?;
        let store = SessionStore::new(
            args.session_file
                .clone()
                .unwrap_or_else(SessionStore::default_path),
        );
        let session = store.load();

        Ok(TDVControllers {
            runtime,
            traffic: TrafficClient::new(&config)?,
            auth: AuthClient::new(&config)?,
            store,
            session,
            board: DelayBoard::default(),
            messages: StationMessages::new(),
        })
    }

    /// One refresh, GeoJSON written to `path`, no menu.
    pub fn export_once(&mut self, path: &Path) -> Result<()> {
        let board = self.runtime.block_on(self.traffic.load_board())?;
        self.replace_board(board);
        self.write_map(path)
    }

    /// Main application loop
    pub fn run(&mut self) {
        TDVViews::show_welcome();
        self.refresh();

        loop {
            TDVViews::show_menu(
                self.session.as_ref().map(|s| s.email.as_str()),
                self.board.delays.len(),
            );
            let choice = TDVViews::read_choice();

            match (choice.as_str(), self.session.is_some()) {
                ("1", _) => TDVViews::show_delays("Delayed stations", &self.board.delays),
                ("2", _) => self.handle_details(),
                ("3", _) => self.handle_favorites(),
                ("4", _) => self.handle_add_favorite(),
                ("5", _) => self.handle_remove_favorite(),
                ("6", _) => self.handle_map_export(),
                ("7", _) => self.refresh(),
                ("8", true) => self.handle_logout(),
                ("8", false) => self.handle_credentials(false),
                ("9", false) => self.handle_credentials(true),
                ("0", _) => {
                    TDVViews::goodbye_message();
                    break;
                }
                ("", _) => {}
                (other, _) => println!("\n✗ Invalid option '{}'.", other),
            }
        }
    }

    /// Replace the board with a fresh load. A failed load leaves an empty board.
    fn refresh(&mut self) {
        TDVViews::show_loading("Loading delays");
        let result = self.runtime.block_on(self.traffic.load_board());
        TDVViews::clear_loading();

        let board = match result {
            Ok(board) => {
                info!("Refreshed: {} delayed stations", board.delays.len());
                board
            }
            Err(e) => {
                warn!("Refresh failed: {}", e);
                TDVViews::network_error(&e.to_string());
                DelayBoard::default()
            }
        };
        self.replace_board(board);
    }

    /// Swap in a new board. Message lookups belong to the old board and start over.
    fn replace_board(&mut self, board: DelayBoard) {
        self.board = board;
        self.messages = StationMessages::new();
    }

    fn active_session(&mut self) -> Option<Session> {
        if let Some(session) = &self.session {
            if session.is_valid() {
                return Some(session.clone());
            }
            info!("Session for {} expired", session.email);
            self.handle_logout();
        }
        TDVViews::login_required();
        None
    }

    fn handle_details(&mut self) {
        if self.board.delays.is_empty() {
            TDVViews::show_delays("Delayed stations", &self.board.delays);
            return;
        }

        let input = TDVViews::prompt("Number, train or station signature");
        let Some(delay) = Self::select_delay(&self.board.delays, &input).cloned() else {
            TDVViews::invalid_selection(&input);
            return;
        };

        let signature = delay.from_station.location_signature.clone();
        let runtime = &self.runtime;
        let traffic = &self.traffic;
        if let Err(e) = self
            .messages
            .ensure(&signature, || runtime.block_on(traffic.fetch_messages()))
        {
            warn!("Could not load messages for {}: {}", signature, e);
        }

        TDVViews::show_delay_details(&delay, self.messages.lookup());
    }

    fn handle_favorites(&mut self) {
        let Some(session) = self.active_session() else {
            return;
        };

        match self.auth.favorites(&session) {
            Ok(favorites) => {
                let matched = TDVPipeline::match_favorites(&favorites, &self.board.delays);
                TDVViews::show_delays("Favorites", &matched);
            }
            Err(e) => eprintln!("\n⚠️  Could not load favorites: {}", e),
        }
    }

    fn handle_add_favorite(&mut self) {
        let Some(session) = self.active_session() else {
            return;
        };

        let input = TDVViews::prompt("Station name or signature");
        let Some(station) = self.board.find_station(&input).cloned() else {
            TDVViews::invalid_selection(&input);
            return;
        };

        let result = self.auth.favorites(&session).and_then(|favorites| {
            if TDVPipeline::favorite_for_station(&favorites, &station.location_signature).is_some() {
                println!("\nℹ️  {} is already a favorite", station.advertised_name);
                return Ok(None);
            }
            self.auth
                .save_favorite(&session, &FavoriteArtefact::for_station(&station))
                .map(Some)
        });

        match result {
            Ok(Some(notice)) => TDVViews::show_notice(&notice),
            Ok(None) => {}
            Err(e) => eprintln!("\n⚠️  Could not save favorite: {}", e),
        }
    }

    fn handle_remove_favorite(&mut self) {
        let Some(session) = self.active_session() else {
            return;
        };

        let input = TDVViews::prompt("Station name or signature");
        let signature = self
            .board
            .find_station(&input)
            .map(|s| s.location_signature.clone())
            .unwrap_or(input);

        let result = self.auth.favorites(&session).and_then(|favorites| {
            match TDVPipeline::favorite_for_station(&favorites, &signature) {
                Some(favorite) => self.auth.delete_favorite(&session, favorite.id).map(Some),
                None => Ok(None),
            }
        });

        match result {
            Ok(Some(notice)) => TDVViews::show_notice(&notice),
            Ok(None) => TDVViews::invalid_selection(&signature),
            Err(e) => eprintln!("\n⚠️  Could not remove favorite: {}", e),
        }
    }

    fn handle_map_export(&mut self) {
        let input = TDVViews::prompt(&format!("Output file [{}]", DEFAULT_GEOJSON_PATH));
        let path = if input.is_empty() {
            PathBuf::from(DEFAULT_GEOJSON_PATH)
        } else {
            PathBuf::from(input)
        };

        if let Err(e) = self.write_map(&path) {
            eprintln!("\n⚠️  {}", e);
        }
    }

    fn write_map(&self, path: &Path) -> Result<()> {
        let markers = TDVMap::markers(&self.board.delays);
        TDVMap::write_geojson(path, &markers)?;
        TDVViews::show_map_export(path, markers.len(), TDVMap::region(&markers));
        Ok(())
    }

    fn handle_credentials(&mut self, register: bool) {
        let email = TDVViews::prompt("Email");
        let password = TDVViews::prompt("Password");
        if email.is_empty() || password.is_empty() {
            println!("\n⚠️  Email and password are required");
            return;
        }

        let result = if register {
            self.auth.register(&email, &password)
        } else {
            self.auth.login(&email, &password)
        };

        match result {
            Ok((notice, session)) => {
                TDVViews::show_notice(&notice);
                if let Some(session) = session {
                    match self.auth.user_id(&session) {
                        Ok(Some(id)) => info!("Signed in as user #{}", id),
                        Ok(None) => warn!("No account id found for {}", session.email),
                        Err(e) => warn!("Account lookup failed: {}", e),
                    }
                    match self.store.save(&session) {
                        Ok(()) => info!("Session stored in {:?}", self.store.path()),
                        Err(e) => warn!("Session not persisted: {}", e),
                    }
                    self.session = Some(session);
                }
            }
            Err(e) => eprintln!("\n⚠️  {}", e),
        }
    }

    fn handle_logout(&mut self) {
        self.session = None;
        if let Err(e) = self.store.clear() {
            warn!("Could not remove stored session: {}", e);
        }
        println!("\n✓ Logged out");
    }

    // ========================================================================
    // Helper Functions
    // ========================================================================

    /// Pick a delay by 1-based list position, train ident or origin signature.
    pub fn select_delay<'a>(delays: &'a [EnrichedDelay], input: &str) -> Option<&'a EnrichedDelay> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        if let Ok(position) = input.parse::<usize>() {
            if let Some(delay) = position.checked_sub(1).and_then(|i| delays.get(i)) {
                return Some(delay);
            }
        }

        delays.iter().find(|d| d.event.advertised_train_ident == input).or_else(|| {
            delays
                .iter()
                .find(|d| d.from_station.location_signature.eq_ignore_ascii_case(input))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tdv_models::{
        DisturbanceEvent, Geometry, LocationRef, Station, TrafficImpact, TrafficMessage,
    };
    use crate::tdv_pipeline::MessageLookup;
    use chrono::DateTime;
    use clap::Parser;

    fn delay(id: &str, ident: &str, from: &str) -> EnrichedDelay {
        EnrichedDelay {
            event: DisturbanceEvent {
                activity_id: id.to_string(),
                activity_type: "Avgang".to_string(),
                advertised_train_ident: ident.to_string(),
                advertised_time_at_location: DateTime::parse_from_rfc3339(
                    "2022-05-03T10:15:00+02:00",
                )
                .unwrap(),
                estimated_time_at_location: None,
                canceled: false,
                from_location: vec![LocationRef {
                    location_name: from.to_string(),
                }],
                to_location: Vec::new(),
            },
            from_station: Station {
                location_signature: from.to_string(),
                advertised_name: from.to_string(),
                geometry: Geometry::default(),
            },
            to_station: None,
        }
    }

    #[test]
    fn selects_by_position_ident_or_signature() {
        let delays = vec![delay("a", "8713", "Cst"), delay("b", "1021", "Kac")];

        let selected = |input: &str| {
            TDVControllers::select_delay(&delays, input).map(|d| d.event.activity_id.clone())
        };

        assert_eq!(selected("2").as_deref(), Some("b"));
        assert_eq!(selected("8713").as_deref(), Some("a"));
        assert_eq!(selected("kac").as_deref(), Some("b"));
    }

    #[test]
    fn rejects_unknown_selection() {
        let delays = vec![delay("a", "8713", "Cst")];

        assert!(TDVControllers::select_delay(&delays, "").is_none());
        assert!(TDVControllers::select_delay(&delays, "0").is_none());
        assert!(TDVControllers::select_delay(&delays, "U").is_none());
    }

    fn message(origin: &str) -> TrafficMessage {
        TrafficMessage {
            header: "Signalfel".to_string(),
            external_description: "Signal fault".to_string(),
            traffic_impact: vec![TrafficImpact {
                from_location: vec![origin.to_string()],
            }],
        }
    }

    fn controllers(dir: &tempfile::TempDir) -> TDVControllers {
        let session_file = dir.path().join("session.json");
        let args = Args::try_parse_from([
            "tdv",
            "--base-url",
            "http://localhost:1337",
            "--session-file",
            session_file.to_str().unwrap(),
        ])
        .unwrap();
        TDVControllers::new(&args).unwrap()
    }

    #[test]
    fn new_board_reopens_message_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let mut controllers = controllers(&dir);

        controllers.messages.ensure("X", || Ok(Vec::new())).unwrap();
        assert_eq!(controllers.messages.lookup(), &MessageLookup::Empty);

        controllers.replace_board(DelayBoard::default());
        assert_eq!(controllers.messages.lookup(), &MessageLookup::NotFetched);

        let lookup = controllers
            .messages
            .ensure("X", || Ok(vec![message("X"), message("X")]))
            .unwrap();
        assert_eq!(lookup.messages().len(), 2);
    }
}
