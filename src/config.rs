use std::{env, path::PathBuf};

const DEFAULT_DATABASE_PATH: &str = "./chat.db";
const DEFAULT_UPLOAD_DIR: &str = "./uploads";
const DEFAULT_UPLOAD_BASE_URL: &str = "/uploads";
const DEFAULT_TITLE_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_TITLE_MODEL: &str = "gpt-4o-mini";

/// Process-wide settings, read once at startup and handed to the backend.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub upload_dir: PathBuf,
    pub upload_base_url: String,
    pub title_api_base: String,
    pub title_api_key: Option<String>,
    pub title_model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            upload_base_url: DEFAULT_UPLOAD_BASE_URL.to_string(),
            title_api_base: DEFAULT_TITLE_API_BASE.to_string(),
            title_api_key: None,
            title_model: DEFAULT_TITLE_MODEL.to_string(),
        }
    }
}

impl Config {
    /// Loads `.env` if present, then overlays the process environment on the defaults.
    pub fn from_env() -> Self {
        if let Err(err) = dotenv::dotenv() {
            log::debug!("no .env file loaded: {err}");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            database_path: non_empty("CHAT_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            upload_dir: non_empty("CHAT_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            upload_base_url: non_empty("CHAT_UPLOAD_BASE_URL").unwrap_or(defaults.upload_base_url),
            title_api_base: non_empty("TITLE_API_BASE").unwrap_or(defaults.title_api_base),
            title_api_key: non_empty("TITLE_API_KEY"),
            title_model: non_empty("TITLE_MODEL").unwrap_or(defaults.title_model),
        }
    }
}
