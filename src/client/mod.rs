//! Client role: delegate login to an upstream CAS server.

mod cas;
mod login;
mod logout;
pub use cas::*;
pub use login::*;
pub use logout::*;

use crate::config::ClientConfig;
use crate::identity::AfterLogin;
use rocket::{routes, Route};
use std::sync::Arc;

/// Managed state for the client role.
pub struct CasClient {
    pub config: ClientConfig,
    pub verifier: Arc<dyn TicketVerifier>,
    /// Picks where to go once the local identity is established.
    pub after_login: Arc<dyn AfterLogin>,
}

impl CasClient {
    pub fn new(config: ClientConfig, verifier: Arc<dyn TicketVerifier>, after_login: Arc<dyn AfterLogin>) -> Self {
        CasClient {
            config,
            verifier,
            after_login,
        }
    }
}

pub fn routes() -> Vec<Route> {
    routes![client_login, client_logout]
}
