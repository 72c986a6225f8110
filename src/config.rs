//! Runtime configuration, read from environment variables.

use anyhow::{anyhow, Result};
use std::path::PathBuf;

use crate::email::DEFAULT_EMAIL_API_URL;
use crate::geo::{DEFAULT_NOMINATIM_URL, DEFAULT_OSRM_URL};
use crate::ocr::DEFAULT_OCR_API_URL;

#[derive(Debug, Clone)]
pub struct Config {
    /// Root for the database and stored documents (env: CREW_DATA_DIR)
    pub data_dir: PathBuf,
    /// SQLite file (env: CREW_DB_PATH, default `<data_dir>/crew.db`)
    pub db_path: PathBuf,
    /// Transactional e-mail API key (env: CREW_EMAIL_API_KEY); unset = console mock
    pub email_api_key: Option<String>,
    pub email_api_url: String,
    pub email_from: String,
    /// OCR.space key (env: CREW_OCR_API_KEY)
    pub ocr_api_key: Option<String>,
    pub ocr_api_url: String,
    pub nominatim_url: String,
    pub osrm_url: String,
    /// Sent with every geocoding request, as Nominatim's usage policy asks.
    pub user_agent: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_opt = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let data_dir = match env_opt("CREW_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir()?,
        };
        let mut config = Self::default_for(data_dir);

        if let Some(path) = env_opt("CREW_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        config.email_api_key = env_opt("CREW_EMAIL_API_KEY");
        if let Some(url) = env_opt("CREW_EMAIL_API_URL") {
            config.email_api_url = url;
        }
        if let Some(from) = env_opt("CREW_EMAIL_FROM") {
            config.email_from = from;
        }
        config.ocr_api_key = env_opt("CREW_OCR_API_KEY");
        if let Some(url) = env_opt("CREW_OCR_API_URL") {
            config.ocr_api_url = url;
        }
        if let Some(url) = env_opt("CREW_NOMINATIM_URL") {
            config.nominatim_url = url;
        }
        if let Some(url) = env_opt("CREW_OSRM_URL") {
            config.osrm_url = url;
        }
        if let Some(agent) = env_opt("CREW_USER_AGENT") {
            config.user_agent = agent;
        }
        Ok(config)
    }

    pub fn default_for(data_dir: PathBuf) -> Self {
        Self {
            db_path: data_dir.join("crew.db"),
            data_dir,
            email_api_key: None,
            email_api_url: DEFAULT_EMAIL_API_URL.to_string(),
            email_from: "Crew Office <office@example.com>".to_string(),
            ocr_api_key: None,
            ocr_api_url: DEFAULT_OCR_API_URL.to_string(),
            nominatim_url: DEFAULT_NOMINATIM_URL.to_string(),
            osrm_url: DEFAULT_OSRM_URL.to_string(),
            user_agent: format!("crew/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn documents_dir(&self, worker_id: i64) -> PathBuf {
        self.data_dir.join("documents").join(worker_id.to_string())
    }
}

fn default_data_dir() -> Result<PathBuf> {
    directories::ProjectDirs::from("", "", "crew")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| anyhow!("Could not determine a data directory; set CREW_DATA_DIR"))
}
