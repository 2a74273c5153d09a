//! `/login`: send the user to the upstream CAS server, then turn the ticket
//! it hands back into a local session.

use super::*;
use crate::error::{CasClientError, ResolveError};
use crate::identity::IdentityResolver;
use crate::session::SessionHandle;
use crate::*;
use rocket::get;

const INSUFFICIENT_PAGE: &str = "<!DOCTYPE html>\n\
<html><head><title>Insufficient access</title></head>\n\
<body><h1>Insufficient access</h1>\n\
<p>You signed in successfully, but there is no account for you on this site.</p>\n\
</body></html>\n";

pub enum LoginCallbackError {
    CasUnreachable,
    CasUnavailable,
    BadCasResponse,
    CasAuthenticationFailed(String),
}

impl From<CasClientError> for LoginCallbackError {
    fn from(err: CasClientError) -> Self {
        match err {
            CasClientError::Unreachable(_) => LoginCallbackError::CasUnreachable,
            CasClientError::Unavailable(_) => LoginCallbackError::CasUnavailable,
            CasClientError::BadResponse => LoginCallbackError::BadCasResponse,
            CasClientError::AuthenticationFailed { code, .. } => LoginCallbackError::CasAuthenticationFailed(code),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for LoginCallbackError {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let (status, body) = match self {
            LoginCallbackError::CasUnreachable => (Status::ServiceUnavailable, String::from("CAS unreachable")),
            LoginCallbackError::CasUnavailable => (Status::ServiceUnavailable, String::from("CAS unavailable")),
            LoginCallbackError::BadCasResponse => (Status::ServiceUnavailable, String::from("Bad CAS response")),
            LoginCallbackError::CasAuthenticationFailed(code) => {
                (Status::Forbidden, format!("CAS authentication failed: {code}"))
            }
        };
        plain_text(status, body)
    }
}

pub enum LoginResponse {
    Next(String),
    Insufficient,
    Failure,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for LoginResponse {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        match self {
            LoginResponse::Next(next) => redirect(next),
            LoginResponse::Insufficient => Ok(Response::build()
                .status(Status::Ok)
                .header(Header::new("Content-Type", "text/html; charset=utf-8"))
                .sized_body(INSUFFICIENT_PAGE.len(), Cursor::new(INSUFFICIENT_PAGE))
                .finalize()),
            LoginResponse::Failure => plain_text(Status::InternalServerError, String::from("error")),
        }
    }
}

#[get("/login?<ticket>")]
pub async fn client_login(
    client: &State<CasClient>,
    resolver: &State<IdentityResolver>,
    session: SessionHandle<'_>,
    ticket: Option<String>,
) -> Result<LoginResponse, LoginCallbackError> {
    if let Some(ticket) = ticket.filter(|t| !t.is_empty()) {
        match client.verifier.verify(&ticket, &client.config.service_url).await {
            Ok(cas_user) => {
                tracing::info!(cas_user = %cas_user, "upstream CAS accepted ticket");
                if let Err(e) = session.log_in(cas_user) {
                    tracing::error!(error = %e, "cannot store CAS user in session");
                    return Ok(LoginResponse::Failure);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "upstream CAS ticket validation failed");
                session.destroy();
                return Err(e.into());
            }
        }
    }

    let Some(cas_user) = session.get().cas_user else {
        return Ok(LoginResponse::Next(client.config.login_url()));
    };

    match resolver.resolve(&cas_user).await {
        Ok(identity) => {
            tracing::info!(user = %identity.username, "local session established");
            session.remember(&identity);
            Ok(LoginResponse::Next(client.after_login.redirect_for(&identity).await))
        }
        Err(ResolveError::Insufficient(user)) => {
            tracing::warn!(cas_user = %user, "CAS user has no local account");
            session.destroy();
            Ok(LoginResponse::Insufficient)
        }
        Err(e @ ResolveError::Directory(_)) => {
            tracing::error!(error = %e, "directory lookup failed during login");
            session.destroy();
            Ok(LoginResponse::Failure)
        }
    }
}
