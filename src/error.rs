//! Error types shared by both CAS roles.

use thiserror::Error;

/// The ticket store could not complete an operation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("ticket store unavailable: {0}")]
    Unavailable(String),
}

/// A requested service URL cannot be used as a redirect target.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// No `service` parameter was supplied, or it was empty.
    #[error("missing service")]
    Missing,
    /// The service does not start with any allow-listed prefix.
    #[error("invalid service: {0}")]
    NotAllowed(String),
}

/// The user directory failed to answer a lookup.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("directory I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("directory data is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// A CAS username could not be turned into a local identity.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Authenticated against CAS but no local account exists.
    #[error("no local account for CAS user {0}")]
    Insufficient(String),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Talking to the upstream CAS server failed (client role).
#[derive(Error, Debug)]
pub enum CasClientError {
    #[error("CAS unreachable: {0}")]
    Unreachable(#[source] isahc::Error),
    #[error("CAS unavailable (HTTP {0})")]
    Unavailable(u16),
    #[error("bad CAS response")]
    BadResponse,
    #[error("CAS authentication failed: {code}")]
    AuthenticationFailed { code: String, message: String },
}

/// The session cookie could not be signed.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("cannot sign session: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

/// The loaded configuration cannot start a server.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("neither the client nor the server role is configured")]
    NoRole,
    #[error("session secret must not be empty")]
    EmptySessionSecret,
    #[error("invalid URL for {field}: {reason}")]
    InvalidUrl { field: &'static str, reason: String },
    #[error("server role has an empty service allow-list")]
    EmptyAllowList,
}
