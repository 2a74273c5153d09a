//! Server role: issue service tickets to allow-listed services and validate
//! them on the services' behalf.

mod continuation;
mod login;
mod logout;
mod validate;
pub use continuation::*;
pub use login::*;
pub use logout::*;
pub use validate::*;

use crate::config::ServerConfig;
use crate::store::TicketStore;
use rocket::fairing::AdHoc;
use rocket::{routes, FromForm, Route};
use std::sync::Arc;

/// Parameters CAS endpoints accept either in the query or a form body.
#[derive(Debug, Default, FromForm)]
pub struct CasParams {
    pub service: Option<String>,
    pub ticket: Option<String>,
}

/// Managed state for the server role.
pub struct Provider {
    pub issuer: Issuer,
    pub validator: Validator,
    /// Local login entry point for unauthenticated users.
    pub login_path: String,
}

impl Provider {
    pub fn new(config: &ServerConfig, store: Arc<dyn TicketStore>) -> Self {
        Provider {
            issuer: Issuer::new(Arc::clone(&store), &config.services, config.ticket_ttl()),
            validator: Validator::new(store, config.single_use),
            login_path: config.login_path.clone(),
        }
    }
}

pub fn routes() -> Vec<Route> {
    routes![
        provider_login,
        provider_login_form,
        provider_logout,
        provider_validate,
        provider_validate_form,
        provider_service_validate,
        provider_service_validate_form,
    ]
}

/// Periodically purges expired tickets once the server is up.
pub fn reaper(store: Arc<dyn TicketStore>, config: &ServerConfig) -> AdHoc {
    let period = config.reap_interval();
    AdHoc::on_liftoff("CAS ticket reaper", move |_| {
        Box::pin(async move {
            rocket::tokio::spawn(async move {
                let mut interval = rocket::tokio::time::interval(period);
                loop {
                    interval.tick().await;
                    match store.purge_expired().await {
                        Ok(0) => {}
                        Ok(purged) => tracing::debug!(purged, "purged expired tickets"),
                        Err(e) => tracing::error!(error = %e, "ticket purge failed"),
                    }
                }
            });
        })
    })
}
