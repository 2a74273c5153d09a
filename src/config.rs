//! Typed configuration, extracted from the `cas` key of Rocket's figment.
//!
//! ```toml
//! [default.cas]
//! after_login_url = "/"
//!
//! [default.cas.session]
//! secret = "change me"
//!
//! [default.cas.client]
//! server_url = "https://cas.example.edu"
//! service_url = "https://app.example.com/login"
//!
//! [default.cas.server]
//! services = ["https://wiki.example.com/"]
//! ```

use crate::error::ConfigError;
use crate::identity::HardcodedUser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct CasConfig {
    #[serde(default)]
    pub client: Option<ClientConfig>,
    #[serde(default)]
    pub server: Option<ServerConfig>,
    pub session: SessionConfig,
    #[serde(default)]
    pub hardcoded_users: Vec<HardcodedUser>,
    /// JSON file holding the people directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_after_login_url")]
    pub after_login_url: String,
    #[serde(default)]
    pub log: LogConfig,
}

/// Where the upstream CAS server lives and how it calls us back.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub server_url: String,
    #[serde(default = "default_cas_login_path")]
    pub login_path: String,
    #[serde(default = "default_cas_logout_path")]
    pub logout_path: String,
    #[serde(default = "default_cas_validate_path")]
    pub validate_path: String,
    /// Our own `/login` URL, sent upstream as `service`.
    pub service_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Allow-listed service URL prefixes.
    pub services: Vec<String>,
    #[serde(default = "default_ticket_ttl_secs")]
    pub ticket_ttl_secs: u64,
    #[serde(default = "default_single_use")]
    pub single_use: bool,
    /// Local login entry point for unauthenticated `/cas/login` requests.
    /// Without a client role the host serves it and calls
    /// `SessionHandle::log_in`.
    #[serde(default = "default_local_login_path")]
    pub login_path: String,
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: String,
    #[serde(default = "default_session_max_age_secs")]
    pub max_age_secs: u64,
    #[serde(default = "default_secure")]
    pub secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_after_login_url() -> String {
    String::from("/")
}

fn default_cas_login_path() -> String {
    String::from("/cas/login")
}

fn default_cas_logout_path() -> String {
    String::from("/cas/logout")
}

fn default_cas_validate_path() -> String {
    String::from("/cas/serviceValidate")
}

fn default_local_login_path() -> String {
    String::from("/login")
}

fn default_ticket_ttl_secs() -> u64 {
    300
}

fn default_single_use() -> bool {
    true
}

fn default_reap_interval_secs() -> u64 {
    60
}

fn default_session_max_age_secs() -> u64 {
    8 * 60 * 60
}

fn default_secure() -> bool {
    true
}

fn default_log_level() -> String {
    String::from("info")
}

impl CasConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client.is_none() && self.server.is_none() {
            return Err(ConfigError::NoRole);
        }
        if self.session.secret.is_empty() {
            return Err(ConfigError::EmptySessionSecret);
        }
        if let Some(client) = &self.client {
            parse_url("client.server_url", &client.server_url)?;
            parse_url("client.service_url", &client.service_url)?;
        }
        if let Some(server) = &self.server {
            if server.services.iter().all(|s| s.is_empty()) {
                return Err(ConfigError::EmptyAllowList);
            }
        }
        Ok(())
    }
}

impl ClientConfig {
    /// Upstream login URL with our own service URL attached.
    pub fn login_url(&self) -> String {
        let base = format!("{}{}", self.server_url.trim_end_matches('/'), self.login_path);
        match Url::parse_with_params(&base, &[("service", &self.service_url)]) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{base}?service={}", urlencoding::encode(&self.service_url)),
        }
    }

    pub fn logout_url(&self) -> String {
        format!("{}{}", self.server_url.trim_end_matches('/'), self.logout_path)
    }

    pub fn validate_url(&self) -> String {
        format!("{}{}", self.server_url.trim_end_matches('/'), self.validate_path)
    }
}

impl ServerConfig {
    pub fn ticket_ttl(&self) -> Duration {
        Duration::from_secs(self.ticket_ttl_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        field,
        reason: e.to_string(),
    })
}
