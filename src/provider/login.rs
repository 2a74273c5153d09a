//! Services redirect to this page to obtain a ticket for the current user.
//! Unauthenticated users are sent to the local login first; the pending
//! continuation brings them back once they are in.

use super::*;
use crate::error::{ServiceError, StoreError};
use crate::service::ServiceAllowList;
use crate::session::{PendingLogin, SessionHandle};
use crate::store::TicketBinding;
use crate::ticket::Ticket;
use crate::user::CurrentUser;
use crate::*;
use rocket::form::Form;
use rocket::{get, post};
use std::time::Duration;

/// Mints tickets and records their bindings.
pub struct Issuer {
    store: Arc<dyn TicketStore>,
    services: ServiceAllowList,
    ttl: Duration,
}

impl Issuer {
    pub fn new(store: Arc<dyn TicketStore>, services: &[String], ttl: Duration) -> Self {
        Issuer {
            store,
            services: ServiceAllowList::new(services.iter().cloned()),
            ttl,
        }
    }

    pub fn services(&self) -> &ServiceAllowList {
        &self.services
    }

    /// Stores a fresh ticket for `username`. The caller must have checked
    /// `service` against the allow-list.
    pub async fn issue(&self, username: &str, service: &str) -> Result<Ticket, StoreError> {
        let ticket = Ticket::generate();
        self.store
            .set(&ticket, TicketBinding::new(username, service), self.ttl)
            .await?;
        tracing::info!(user = %username, service = %service, "issued service ticket");
        Ok(ticket)
    }
}

pub enum ProviderLoginResponse {
    InvalidService(ServiceError),
    StoreFailure,
    Next(String),
}

impl<'r, 'o: 'r> Responder<'r, 'o> for ProviderLoginResponse {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        match self {
            ProviderLoginResponse::InvalidService(err) => {
                let (status, body) = match err {
                    ServiceError::Missing => (Status::BadRequest, "missing service"),
                    ServiceError::NotAllowed(_) => (Status::Forbidden, "invalid service"),
                };
                plain_text(status, body.to_owned())
            }
            ProviderLoginResponse::StoreFailure => plain_text(Status::InternalServerError, String::from("error")),
            ProviderLoginResponse::Next(next) => redirect(next),
        }
    }
}

async fn login(
    provider: &Provider,
    session: &SessionHandle<'_>,
    user: Option<CurrentUser>,
    service: Option<String>,
) -> ProviderLoginResponse {
    let service = match provider.issuer.services().check(service.as_deref()) {
        Ok(service) => service.to_owned(),
        Err(e) => {
            tracing::warn!(error = %e, "refusing CAS login");
            return ProviderLoginResponse::InvalidService(e);
        }
    };

    let Some(user) = user else {
        let mut state = session.get();
        state.pending = Some(PendingLogin { service });
        if let Err(e) = session.save(state) {
            tracing::error!(error = %e, "cannot record pending CAS login");
            return ProviderLoginResponse::StoreFailure;
        }
        return ProviderLoginResponse::Next(provider.login_path.clone());
    };

    match provider.issuer.issue(user.username(), &service).await {
        Ok(ticket) => ProviderLoginResponse::Next(ticket.append_to(&service)),
        Err(e) => {
            tracing::error!(error = %e, "cannot store service ticket");
            ProviderLoginResponse::StoreFailure
        }
    }
}

#[get("/cas/login?<service>")]
pub async fn provider_login(
    provider: &State<Provider>,
    user: Option<CurrentUser>,
    session: SessionHandle<'_>,
    service: Option<String>,
) -> ProviderLoginResponse {
    login(provider, &session, user, service).await
}

#[post("/cas/login?<service>", data = "<form>")]
pub async fn provider_login_form(
    provider: &State<Provider>,
    user: Option<CurrentUser>,
    session: SessionHandle<'_>,
    service: Option<String>,
    form: Option<Form<CasParams>>,
) -> ProviderLoginResponse {
    let service = service.or_else(|| form.and_then(|f| f.into_inner().service));
    login(provider, &session, user, service).await
}
