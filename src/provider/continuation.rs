//! Sends a user back to the service that asked for them once they have
//! logged in locally.

use super::*;
use crate::error::StoreError;
use crate::identity::Identity;
use crate::session::{replace_session_cookie, Session, SessionCell, SessionKeys};
use crate::user::CurrentUser;
use crate::*;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::request::Outcome;
use rocket::Request;

/// Consumes the session's pending login, if any, mints its ticket and
/// returns where to send the user.
pub async fn resume(issuer: &Issuer, identity: &Identity, session: &mut Session) -> Result<Option<String>, StoreError> {
    let Some(pending) = session.pending.take() else {
        return Ok(None);
    };
    let ticket = issuer.issue(&identity.username, &pending.service).await?;
    Ok(Some(ticket.append_to(&pending.service)))
}

/// Response fairing: runs after the route (and the authentication it
/// performed) and replaces the response with the continuation redirect.
pub struct PendingLoginContinuation;

#[rocket::async_trait]
impl Fairing for PendingLoginContinuation {
    fn info(&self) -> Info {
        Info {
            name: "Pending CAS login continuation",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let rocket = req.rocket();
        let (Some(provider), Some(keys)) = (rocket.state::<Provider>(), rocket.state::<SessionKeys>()) else {
            return;
        };

        let cell = SessionCell::of(req, keys);
        match cell.current() {
            Some(Session {
                cas_user: Some(_),
                pending: Some(_),
            }) => {}
            _ => return,
        }

        let identity = match req.guard::<CurrentUser>().await {
            Outcome::Success(user) => user.0,
            _ => {
                tracing::debug!("pending login waits for a resolvable user");
                if cell.current().is_none() {
                    replace_session_cookie(res, &keys.expired_cookie());
                }
                return;
            }
        };
        let Some(mut session) = cell.current() else {
            return;
        };

        let next = match resume(&provider.issuer, &identity, &mut session).await {
            Ok(Some(next)) => next,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(error = %e, "cannot issue ticket for pending login");
                return;
            }
        };
        let cookie = match keys.cookie_for(&session) {
            Ok(cookie) => cookie,
            Err(e) => {
                tracing::error!(error = %e, "cannot clear pending login");
                return;
            }
        };

        tracing::info!(user = %identity.username, "resuming pending CAS login");
        cell.replace(Some(session));
        res.set_status(Status::SeeOther);
        res.remove_header("Content-Type");
        res.set_header(Header::new("Location", next));
        replace_session_cookie(res, &cookie);
        res.set_sized_body(0, Cursor::new(""));
    }
}
