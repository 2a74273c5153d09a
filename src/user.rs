//! Authentication middleware: the `CurrentUser` request guard.
//!
//! Every request that asks for the user re-resolves the CAS username kept in
//! the session, so directory changes apply without logging in again. A
//! session whose user no longer resolves is destroyed. The result is kept in
//! the request's session cell, so guards, handlers and fairings of one
//! request share a single lookup.

use crate::identity::{Identity, IdentityResolver};
use crate::session::SessionHandle;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};

#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

impl CurrentUser {
    pub fn username(&self) -> &str {
        &self.0.username
    }
}

async fn authenticate(req: &Request<'_>) -> Option<Identity> {
    let (Some(resolver), Outcome::Success(session)) = (
        req.rocket().state::<IdentityResolver>(),
        req.guard::<SessionHandle<'_>>().await,
    ) else {
        return None;
    };

    let cas_user = session.get().cas_user?;
    if let Some(identity) = session.resolved() {
        return Some(identity);
    }

    match resolver.resolve(&cas_user).await {
        Ok(identity) => {
            session.remember(&identity);
            Some(identity)
        }
        Err(e) => {
            tracing::warn!(cas_user = %cas_user, error = %e, "destroying session of unresolvable user");
            session.destroy();
            None
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentUser {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match authenticate(req).await {
            Some(identity) => Outcome::Success(CurrentUser(identity)),
            None => Outcome::Forward(Status::Unauthorized),
        }
    }
}
