use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use snafu::ResultExt;
use url::Url;

use crate::error::{LauncherError, LoadConfigSnafu};
use crate::model::EndpointNaming;

/// Identifies the launcher to the public APIs it calls; Nominatim in
/// particular rejects clients without one.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Launcher configuration, loaded from `HELIOCAST_*` environment variables.
///
/// Every field has a default so the binary runs out of the box; a `.env`
/// file is picked up before the environment is read.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Title given to the ingest endpoint when one must be created.
    pub ingest_title: String,
    /// Whether ingest endpoints are shared or minted per broadcast.
    pub endpoint_naming: EndpointNaming,
    /// Template for the broadcast title; `{date}` expands to today's date.
    pub title_template: String,
    /// Description attached to scheduled broadcasts.
    pub description: String,
    /// File the scheduling run writes the broadcast id into.
    pub handoff_file: String,
    /// Names registered for the deferred start and end tasks.
    pub start_task_name: String,
    pub end_task_name: String,
    /// Path to the OBS executable; platform default when unset.
    pub obs_path: Option<PathBuf>,
    /// Seconds to wait after launching OBS before going live.
    pub obs_startup_delay_secs: u64,
    /// Seconds to linger in the testing state before the live transition.
    pub testing_delay_secs: u64,
    /// Probe that the broadcast still exists before going live.
    pub verify_before_live: bool,
    /// Directory holding `credentials.json` and `youtube_token.json`.
    pub credentials_dir: Option<PathBuf>,
    /// Directory log files are written into; file logging is off when unset.
    pub log_dir: Option<PathBuf>,
    pub youtube_api_base: Url,
    pub sun_api_base: Url,
    pub geocode_api_base: Url,
    pub ip_locate_api_base: Url,
    pub release_api_base: Url,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ingest_title: "Heliocast Ingest".to_string(),
            endpoint_naming: EndpointNaming::Fixed,
            title_template: "Heliocast Live ({date})".to_string(),
            description: "Scheduled live broadcast".to_string(),
            handoff_file: "broadcast_id.txt".to_string(),
            start_task_name: "HeliocastStreamStart".to_string(),
            end_task_name: "HeliocastStreamEnd".to_string(),
            obs_path: None,
            obs_startup_delay_secs: 30,
            testing_delay_secs: 2,
            verify_before_live: false,
            credentials_dir: None,
            log_dir: None,
            youtube_api_base: url("https://www.googleapis.com/youtube/v3"),
            sun_api_base: url("https://api.sunrise-sunset.org"),
            geocode_api_base: url("https://nominatim.openstreetmap.org"),
            ip_locate_api_base: url("http://ip-api.com"),
            release_api_base: url("https://api.github.com/repos/heliocast/heliocast/releases"),
        }
    }
}

impl Config {
    /// Where the broadcast id is handed off between the scheduling run and
    /// the deferred start/end runs.
    pub fn handoff_path(&self) -> PathBuf {
        base_dir().join(&self.handoff_file)
    }

    /// Directory the OAuth credential files live in.
    pub fn credentials_dir(&self) -> PathBuf {
        self.credentials_dir.clone().unwrap_or_else(base_dir)
    }

    pub fn obs_startup_delay(&self) -> Duration {
        Duration::from_secs(self.obs_startup_delay_secs)
    }

    pub fn testing_delay(&self) -> Duration {
        Duration::from_secs(self.testing_delay_secs)
    }
}

pub fn load() -> Result<Config, LauncherError> {
    envy::prefixed("HELIOCAST_").from_env().context(LoadConfigSnafu)
}

/// Directory of the running executable.
///
/// Deferred task runs start with an arbitrary working directory, so every
/// relative path is anchored here instead of in the cwd.
pub fn base_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn url(input: &str) -> Url {
    Url::parse(input).expect("default URL is well-formed")
}

/// Base URL as a string with any trailing slash removed, ready for
/// `format!`-style endpoint building.
pub fn api_root(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}
