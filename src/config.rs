use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";
pub const DEFAULT_SESSION_DB_URL: &str = "sqlite://course_manager.db?mode=rwc";
pub const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 300;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: String,
    pub session_db_url: String,
    pub search_debounce: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            session_db_url: DEFAULT_SESSION_DB_URL.to_string(),
            search_debounce: Duration::from_millis(DEFAULT_SEARCH_DEBOUNCE_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        let base_url = env::var("COURSE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let session_db_url =
            env::var("SESSION_DB_URL").unwrap_or_else(|_| DEFAULT_SESSION_DB_URL.to_string());
        let debounce_ms = parse_var("SEARCH_DEBOUNCE_MS", DEFAULT_SEARCH_DEBOUNCE_MS)?;
        let timeout_secs = parse_var("REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            session_db_url,
            search_debounce: Duration::from_millis(debounce_ms),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn auth_url(&self) -> String {
        format!("{}/api/auth", self.base_url)
    }

    pub fn courses_url(&self) -> String {
        format!("{}/api/courses", self.base_url)
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    parse_value(key, env::var(key).ok(), default)
}

fn parse_value<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, AppError> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{} must be a number, got {:?}", key, raw))),
        None => Ok(default),
    }
}
