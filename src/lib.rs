//! A CAS participant: logs users in through an upstream CAS server (client
//! role), issues and validates service tickets for allow-listed services
//! (server role), or both.

pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod provider;
pub mod service;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod ticket;
pub mod user;

pub(crate) use rocket::{
    http::{Header, Status},
    response::{Responder, Response},
    State,
};
pub(crate) use std::io::Cursor;

use client::{CasClient, IsahcVerifier, TicketVerifier};
use config::CasConfig;
use error::DirectoryError;
use identity::{AfterLogin, Directory, EmptyDirectory, IdentityResolver, JsonDirectory, RedirectTo};
use provider::{PendingLoginContinuation, Provider};
use rocket::{Build, Rocket};
use session::SessionKeys;
use std::sync::Arc;
use store::{MemoryTicketStore, TicketStore};

/// 303 redirect to an arbitrary location.
pub struct SeeOther(pub String);

impl<'r, 'o: 'r> Responder<'r, 'o> for SeeOther {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        redirect(self.0)
    }
}

pub(crate) fn redirect<'o>(next: String) -> rocket::response::Result<'o> {
    Ok(Response::build()
        .status(Status::SeeOther)
        .header(Header::new("Location", next))
        .finalize())
}

pub(crate) fn plain_text<'o>(status: Status, body: String) -> rocket::response::Result<'o> {
    Ok(Response::build()
        .status(status)
        .header(Header::new("Content-Type", "text/plain; charset=utf-8"))
        .sized_body(body.len(), Cursor::new(body))
        .finalize())
}

/// Capabilities the CAS core consumes but does not implement.
pub struct Collaborators {
    pub store: Arc<dyn TicketStore>,
    pub directory: Arc<dyn Directory>,
    /// Upstream ticket verifier; defaults to HTTP calls to the configured
    /// CAS server.
    pub verifier: Option<Arc<dyn TicketVerifier>>,
    /// Post-resolution hook and landing page after a client-role login.
    pub after_login: Arc<dyn AfterLogin>,
}

impl Collaborators {
    /// In-memory ticket store and the directory named in `config`, if any.
    pub fn from_config(config: &CasConfig) -> Result<Self, DirectoryError> {
        let directory: Arc<dyn Directory> = match &config.directory {
            Some(path) => {
                let directory = JsonDirectory::open(path)?;
                tracing::info!(path = %path.display(), people = directory.len(), "loaded directory");
                Arc::new(directory)
            }
            None => Arc::new(EmptyDirectory),
        };
        Ok(Collaborators {
            store: Arc::new(MemoryTicketStore::new()),
            directory,
            verifier: None,
            after_login: Arc::new(RedirectTo(config.after_login_url.clone())),
        })
    }
}

/// Mounts the routes of every configured role.
pub fn build(config: CasConfig, collaborators: Collaborators) -> Rocket<Build> {
    let Collaborators {
        store,
        directory,
        verifier,
        after_login,
    } = collaborators;

    let resolver = IdentityResolver::new(config.hardcoded_users.clone(), directory).with_hooks(Arc::clone(&after_login));
    let mut rocket = rocket::build()
        .manage(SessionKeys::new(&config.session))
        .manage(resolver);

    if let Some(client_config) = config.client.clone() {
        let verifier = verifier.unwrap_or_else(|| Arc::new(IsahcVerifier::new(client_config.validate_url())));
        tracing::info!(cas_server = %client_config.server_url, "client role enabled");
        rocket = rocket
            .manage(CasClient::new(client_config, verifier, after_login))
            .mount("/", client::routes());
    }

    if let Some(server_config) = &config.server {
        tracing::info!(services = ?server_config.services, "server role enabled");
        if config.client.is_none() {
            tracing::warn!(
                login_path = %server_config.login_path,
                "no client role: the host must mount a login route there that calls SessionHandle::log_in"
            );
        }
        rocket = rocket
            .manage(Provider::new(server_config, Arc::clone(&store)))
            .attach(PendingLoginContinuation)
            .attach(provider::reaper(store, server_config))
            .mount("/", provider::routes());
    }

    rocket
}
