// Remote data sources: traffic feeds and the account store
//
// Traffic endpoints ({base_url}):
// - GET /stations  -> { data: [Station] }
// - GET /delayed   -> { data: [DisturbanceEvent] }
// - GET /messages  -> { data: [TrafficMessage] }
//
// Account endpoints ({auth_url}):
// - POST /login, POST /register      -> { data: { token, message } } | { errors }
// - GET /users?api_key=              -> { data: [{ user_id, email }] }
// - GET|POST|DELETE /data            -> favorite artefacts, token in `x-access-token`

use crate::tdv_config::AppConfig;
use crate::tdv_models::{
    DelayBoard, DisturbanceEvent, FavoriteArtefact, FavoriteRecord, Result, Station, TDVError,
    TrafficMessage,
};
use crate::tdv_pipeline::TDVPipeline;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use reqwest::blocking;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const TOKEN_HEADER: &str = "x-access-token";

#[derive(Debug, Deserialize)]
struct DataEnvelope {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

/// Decode records one by one so a single bad record does not sink the batch.
pub fn decode_records<T: DeserializeOwned>(kind: &str, values: Vec<serde_json::Value>) -> Vec<T> {
    let total = values.len();
    let records: Vec<T> = values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping {} record #{}: {}", kind, index, e);
                None
            }
        })
        .collect();

    if records.len() < total {
        debug!("Decoded {}/{} {} records", records.len(), total, kind);
    }
    records
}

// ============================================================================
// Traffic feeds
// ============================================================================

pub struct TrafficClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TrafficClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TDVError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(TrafficClient {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    async fn fetch_records<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let url = format!("{}/{}", self.base_url, path);

        let mut request = self.client.get(&url);
        if !self.api_key.is_empty() {
            request = request.query(&[("api_key", self.api_key.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TDVError::NetworkError(format!("Failed to fetch {}: {}", path, e)))?;

        if !response.status().is_success() {
            return Err(TDVError::NetworkError(format!(
                "API returned error for {}: {}",
                path,
                response.status()
            )));
        }

        let envelope: DataEnvelope = response
            .json()
            .await
            .map_err(|e| TDVError::ParseError(format!("Invalid {} response: {}", path, e)))?;

        Ok(decode_records(path, envelope.data))
    }

    pub async fn fetch_stations(&self) -> Result<Vec<Station>> {
        self.fetch_records("stations").await
    }

    pub async fn fetch_delays(&self) -> Result<Vec<DisturbanceEvent>> {
        self.fetch_records("delayed").await
    }

    pub async fn fetch_messages(&self) -> Result<Vec<TrafficMessage>> {
        self.fetch_records("messages").await
    }

    /// Load stations and delays side by side, then correlate once both are in.
    pub async fn load_board(&self) -> Result<DelayBoard> {
        let (stations, events) =
            futures::try_join!(self.fetch_stations(), self.fetch_delays())?;

        info!("Loaded {} stations and {} delay events", stations.len(), events.len());

        let delays = TDVPipeline::correlate(&stations, &events);
        Ok(DelayBoard { stations, delays })
    }
}

// ============================================================================
// Session
// ============================================================================

/// Identity of the logged-in user. Passed explicitly to every account call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub email: String,
    pub issued_at: DateTime<Utc>,
}

impl Session {
    pub const VALIDITY_HOURS: i64 = 24;

    pub fn new(token: String, email: String) -> Self {
        Session {
            token,
            email,
            issued_at: Utc::now(),
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now - self.issued_at < chrono::Duration::hours(Self::VALIDITY_HOURS)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

/// Keeps the session on disk between runs.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        SessionStore { path }
    }

    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("tdv");
        path.push("session.json");
        path
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| TDVError::FileError(format!("Failed to create {:?}: {}", parent, e)))?;
        }

        let json = serde_json::to_string_pretty(session)
            .map_err(|e| TDVError::FileError(format!("Failed to serialize session: {}", e)))?;

        fs::write(&self.path, json)
            .map_err(|e| TDVError::FileError(format!("Failed to write session: {}", e)))?;

        debug!("Session saved to {:?}", self.path);
        Ok(())
    }

    /// The stored session, if there is one and it has not expired.
    pub fn load(&self) -> Option<Session> {
        if !self.path.exists() {
            debug!("No stored session at {:?}", self.path);
            return None;
        }

        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to read session file ({}), login required", e);
                return None;
            }
        };

        match serde_json::from_str::<Session>(&contents) {
            Ok(session) if session.is_valid() => Some(session),
            Ok(_) => {
                info!("Stored session expired, login required");
                None
            }
            Err(e) => {
                warn!("Failed to parse session file ({}), login required", e);
                None
            }
        }
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .map_err(|e| TDVError::FileError(format!("Failed to remove session: {}", e)))?;
        }
        Ok(())
    }
}

// ============================================================================
// Account store
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Danger,
}

/// Short outcome shown to the user after an account action.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthNotice {
    pub title: String,
    pub message: String,
    pub kind: NoticeKind,
}

impl AuthNotice {
    pub fn success(title: &str, message: &str) -> Self {
        AuthNotice {
            title: title.to_string(),
            message: message.to_string(),
            kind: NoticeKind::Success,
        }
    }

    pub fn danger(title: &str, message: &str) -> Self {
        AuthNotice {
            title: title.to_string(),
            message: message.to_string(),
            kind: NoticeKind::Danger,
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == NoticeKind::Success
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrors {
    #[serde(default)]
    title: String,
    #[serde(default)]
    detail: String,
}

#[derive(Debug, Deserialize)]
struct ApiReply<T> {
    data: Option<T>,
    errors: Option<ApiErrors>,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    token: Option<String>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    user_id: i64,
    email: String,
}

/// Split an account reply into a notice and its payload.
/// An `errors` body is a refused request, not a transport failure.
fn interpret_reply<T: DeserializeOwned>(
    title: &str,
    body: &str,
) -> Result<(AuthNotice, Option<T>)> {
    let reply: ApiReply<T> = serde_json::from_str(body)
        .map_err(|e| TDVError::ParseError(format!("Invalid {} response: {}", title, e)))?;

    match (reply.errors, reply.data) {
        (Some(errors), _) => Ok((AuthNotice::danger(&errors.title, &errors.detail), None)),
        (None, Some(data)) => Ok((AuthNotice::success(title, ""), Some(data))),
        (None, None) => Err(TDVError::ParseError(format!(
            "{} response carried neither data nor errors",
            title
        ))),
    }
}

pub struct AuthClient {
    client: blocking::Client,
    auth_url: String,
    api_key: String,
}

impl AuthClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TDVError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(AuthClient {
            client,
            auth_url: config.auth_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn read_body(response: blocking::Response, what: &str) -> Result<String> {
        response
            .text()
            .map_err(|e| TDVError::NetworkError(format!("Failed to read {} response: {}", what, e)))
    }

    fn credentials_request(
        &self,
        endpoint: &str,
        title: &str,
        email: &str,
        password: &str,
    ) -> Result<(AuthNotice, Option<Session>)> {
        let body = serde_json::json!({
            "api_key": self.api_key,
            "email": email,
            "password": password,
        });

        let response = self
            .client
            .post(format!("{}/{}", self.auth_url, endpoint))
            .json(&body)
            .send()
            .map_err(|e| TDVError::NetworkError(format!("Failed to {}: {}", endpoint, e)))?;

        let text = Self::read_body(response, endpoint)?;
        let (mut notice, data) = interpret_reply::<TokenData>(title, &text)?;

        let session = data.and_then(|data| {
            notice.message = data.message;
            data.token.map(|token| Session::new(token, email.to_string()))
        });

        if notice.is_success() && session.is_none() {
            return Err(TDVError::AuthError(format!("{} succeeded without a token", title)));
        }

        Ok((notice, session))
    }

    pub fn login(&self, email: &str, password: &str) -> Result<(AuthNotice, Option<Session>)> {
        info!("Logging in {}", email);
        self.credentials_request("login", "Login", email, password)
    }

    pub fn register(&self, email: &str, password: &str) -> Result<(AuthNotice, Option<Session>)> {
        info!("Registering {}", email);
        self.credentials_request("register", "Register", email, password)
    }

    /// Account id of the session's user, looked up by email.
    pub fn user_id(&self, session: &Session) -> Result<Option<i64>> {
        let response = self
            .client
            .get(format!("{}/users", self.auth_url))
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .map_err(|e| TDVError::NetworkError(format!("Failed to fetch users: {}", e)))?;

        let text = Self::read_body(response, "users")?;
        let (notice, users) = interpret_reply::<Vec<serde_json::Value>>("Users", &text)?;
        if !notice.is_success() {
            return Err(TDVError::AuthError(format!("{}: {}", notice.title, notice.message)));
        }

        Ok(decode_records::<UserRecord>("users", users.unwrap_or_default())
            .into_iter()
            .find(|user| user.email == session.email)
            .map(|user| user.user_id))
    }

    pub fn favorites(&self, session: &Session) -> Result<Vec<FavoriteRecord>> {
        let response = self
            .client
            .get(format!("{}/data", self.auth_url))
            .query(&[("api_key", self.api_key.as_str())])
            .header(TOKEN_HEADER, &session.token)
            .send()
            .map_err(|e| TDVError::NetworkError(format!("Failed to fetch favorites: {}", e)))?;

        let text = Self::read_body(response, "data")?;
        let (notice, records) = interpret_reply::<Vec<serde_json::Value>>("Favorites", &text)?;
        if !notice.is_success() {
            return Err(TDVError::AuthError(format!("{}: {}", notice.title, notice.message)));
        }

        Ok(decode_records("favorites", records.unwrap_or_default()))
    }

    pub fn save_favorite(&self, session: &Session, artefact: &FavoriteArtefact) -> Result<AuthNotice> {
        let artefact = serde_json::to_string(artefact)
            .map_err(|e| TDVError::ParseError(format!("Failed to encode favorite: {}", e)))?;
        let body = serde_json::json!({
            "api_key": self.api_key,
            "artefact": artefact,
        });

        let response = self
            .client
            .post(format!("{}/data", self.auth_url))
            .header(TOKEN_HEADER, &session.token)
            .json(&body)
            .send()
            .map_err(|e| TDVError::NetworkError(format!("Failed to save favorite: {}", e)))?;

        let text = Self::read_body(response, "data")?;
        let (notice, _) = interpret_reply::<serde_json::Value>("Favorite saved", &text)?;
        Ok(notice)
    }

    pub fn delete_favorite(&self, session: &Session, id: i64) -> Result<AuthNotice> {
        let body = serde_json::json!({
            "api_key": self.api_key,
            "id": id,
        });

        let response = self
            .client
            .delete(format!("{}/data", self.auth_url))
            .header(TOKEN_HEADER, &session.token)
            .json(&body)
            .send()
            .map_err(|e| TDVError::NetworkError(format!("Failed to delete favorite: {}", e)))?;

        if response.status().is_success() {
            Ok(AuthNotice::success("Deletion", "Deleted data!"))
        } else {
            Ok(AuthNotice::danger("Deletion", "Something went wrong."))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bad_records_are_skipped() {
        let values = vec![
            json!({ "LocationSignature": "Cst", "AdvertisedLocationName": "Stockholm C" }),
            json!({ "AdvertisedLocationName": "No signature" }),
            json!({ "LocationSignature": "U", "AdvertisedLocationName": "Uppsala C" }),
        ];

        let stations: Vec<Station> = decode_records("stations", values);

        assert_eq!(stations.len(), 2);
        assert_eq!(stations[1].location_signature, "U");
        assert_eq!(stations[1].geometry.wgs84, "");
    }

    #[test]
    fn favorite_records_decode() {
        let values = vec![json!({ "id": 4, "artefact": "{'station': 'Cst'}", "user_id": 1 })];
        let favorites: Vec<FavoriteRecord> = decode_records("favorites", values);
        assert_eq!(favorites[0].id, 4);
        assert_eq!(favorites[0].artefact, "{'station': 'Cst'}");
    }

    #[test]
    fn reply_with_errors_becomes_danger_notice() {
        let body = r#"{ "errors": { "status": 401, "title": "Wrong password", "detail": "Password is incorrect." } }"#;

        let (notice, data) = interpret_reply::<serde_json::Value>("Login", body).unwrap();

        assert_eq!(notice, AuthNotice::danger("Wrong password", "Password is incorrect."));
        assert!(data.is_none());
    }

    #[test]
    fn reply_with_data_is_success() {
        let body = r#"{ "data": { "message": "User logged in", "user": { "api_key": "k" }, "token": "abc" } }"#;

        let (notice, data) = interpret_reply::<TokenData>("Login", body).unwrap();
        let data = data.unwrap();

        assert!(notice.is_success());
        assert_eq!(data.token.as_deref(), Some("abc"));
        assert_eq!(data.message, "User logged in");
    }

    #[test]
    fn reply_without_data_or_errors_is_rejected() {
        assert!(interpret_reply::<serde_json::Value>("Login", "{}").is_err());
        assert!(interpret_reply::<serde_json::Value>("Login", "not json").is_err());
    }

    #[test]
    fn session_expires_after_a_day() {
        let session = Session::new("token".to_string(), "user@example.com".to_string());
        let issued = session.issued_at;

        assert!(session.is_valid_at(issued + chrono::Duration::hours(23)));
        assert!(!session.is_valid_at(issued + chrono::Duration::hours(24)));
    }

    #[test]
    fn session_store_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested").join("session.json"));
        assert!(store.load().is_none());

        let session = Session::new("token".to_string(), "user@example.com".to_string());
        store.save(&session).unwrap();
        assert_eq!(store.load(), Some(session));

        store.clear().unwrap();
        assert!(store.load().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn expired_session_is_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        let mut session = Session::new("token".to_string(), "user@example.com".to_string());
        session.issued_at = Utc::now() - chrono::Duration::hours(25);

        store.save(&session).unwrap();

        assert!(store.load().is_none());
    }
}
