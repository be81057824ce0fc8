// Command line and environment configuration
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "tdv")]
#[command(about = "Swedish train delays, traffic messages and favorite stations")]
pub struct Args {
    /// Base URL of the traffic API (stations, delayed, messages)
    #[arg(long, env = "TDV_BASE_URL", default_value = "https://trafik.emilfolino.se")]
    pub base_url: String,

    /// Base URL of the account API (login, register, data)
    #[arg(long, env = "TDV_AUTH_URL", default_value = "https://auth.emilfolino.se")]
    pub auth_url: String,

    /// API key sent with every request
    #[arg(long, env = "TDV_API_KEY", default_value = "")]
    pub api_key: String,

    /// Request timeout in seconds
    #[arg(long = "timeout", env = "TDV_TIMEOUT_SECS", default_value_t = 15)]
    pub timeout_secs: u64,

    /// Where the login session is kept between runs
    #[arg(long, env = "TDV_SESSION_FILE")]
    pub session_file: Option<PathBuf>,

    /// Write the delayed stations as GeoJSON to this path and exit
    #[arg(long)]
    pub geojson: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub base_url: String,
    pub auth_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl From<&Args> for AppConfig {
    fn from(args: &Args) -> Self {
        AppConfig {
            base_url: args.base_url.trim_end_matches('/').to_string(),
            auth_url: args.auth_url.trim_end_matches('/').to_string(),
            api_key: args.api_key.clone(),
            timeout: Duration::from_secs(args.timeout_secs),
        }
    }
}
