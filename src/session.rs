//! Per-browser session, carried in a signed `cas_session` cookie.
//!
//! The session is decoded once per request into a [`SessionCell`] kept in
//! Rocket's request-local cache, so route handlers, guards and fairings of
//! the same request all see the same (possibly updated) state.

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::identity::Identity;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Validation};
use parking_lot::Mutex;
use rocket::http::{Cookie, CookieJar, Header, SameSite, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket::Response;
use rocket::time::Duration as CookieDuration;
use serde::{Deserialize, Serialize};

pub const SESSION_COOKIE: &str = "cas_session";

/// Service waiting for the user to finish logging in. Its ticket is minted
/// when the login completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
    pub service: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Username asserted by the upstream CAS server.
    #[serde(default)]
    pub cas_user: Option<String>,
    #[serde(default)]
    pub pending: Option<PendingLogin>,
}

#[derive(Serialize, Deserialize)]
struct SessionClaims {
    exp: usize,
    iat: usize,
    #[serde(flatten)]
    session: Session,
}

/// Signing material and cookie attributes for sessions.
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    max_age: u64,
    secure: bool,
}

impl SessionKeys {
    pub fn new(config: &SessionConfig) -> Self {
        SessionKeys {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            max_age: config.max_age_secs,
            secure: config.secure,
        }
    }

    pub fn encode(&self, session: &Session) -> Result<String, SessionError> {
        let utc_now = chrono::Utc::now().timestamp() as usize;
        let claims = SessionClaims {
            exp: utc_now + self.max_age as usize,
            iat: utc_now,
            session: session.clone(),
        };
        let token = jsonwebtoken::encode(&jsonwebtoken::Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(token)
    }

    /// `None` for expired, tampered or malformed tokens.
    pub fn decode(&self, token: &str) -> Option<Session> {
        match jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &Validation::new(Algorithm::HS256)) {
            Ok(data) => Some(data.claims.session),
            Err(e) => {
                tracing::debug!(error = %e, "discarding unusable session cookie");
                None
            }
        }
    }

    pub fn cookie_for(&self, session: &Session) -> Result<Cookie<'static>, SessionError> {
        let token = self.encode(session)?;
        Ok(Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(CookieDuration::seconds(self.max_age as i64))
            .build())
    }

    fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE).path("/").build()
    }

    /// Removal cookie for responses the jar no longer reaches.
    pub fn expired_cookie(&self) -> Cookie<'static> {
        let mut cookie = self.removal_cookie();
        cookie.make_removal();
        cookie
    }
}

/// Puts `cookie` on a response that already left the handler, dropping any
/// session cookie written there. Rocket copies the cookie jar into the
/// response before response fairings run, so the jar cannot be used here.
pub fn replace_session_cookie(res: &mut Response<'_>, cookie: &Cookie<'_>) {
    let others: Vec<String> = res
        .headers()
        .get("Set-Cookie")
        .filter(|header| header.split_once('=').map_or(true, |(name, _)| name.trim() != SESSION_COOKIE))
        .map(str::to_owned)
        .collect();
    res.remove_header("Set-Cookie");
    for header in others {
        res.adjoin_header(Header::new("Set-Cookie", header));
    }
    res.adjoin_header(cookie);
}

/// Request-local view of the session. `None` means no session (never
/// created, or destroyed during this request). Also remembers the identity
/// resolved for the session's CAS user, so one request resolves it once.
pub struct SessionCell {
    state: Mutex<Option<Session>>,
    resolved: Mutex<Option<(String, Identity)>>,
}

impl SessionCell {
    fn load(jar: &CookieJar<'_>, keys: &SessionKeys) -> Self {
        let session = jar.get(SESSION_COOKIE).and_then(|cookie| keys.decode(cookie.value()));
        SessionCell {
            state: Mutex::new(session),
            resolved: Mutex::new(None),
        }
    }

    pub fn of<'r>(req: &'r Request<'_>, keys: &SessionKeys) -> &'r SessionCell {
        req.local_cache(|| SessionCell::load(req.cookies(), keys))
    }

    pub fn current(&self) -> Option<Session> {
        self.state.lock().clone()
    }

    pub fn replace(&self, session: Option<Session>) {
        *self.state.lock() = session;
    }

    /// Identity resolved earlier in this request for the current CAS user.
    pub fn resolved(&self) -> Option<Identity> {
        let cas_user = self.current()?.cas_user?;
        match &*self.resolved.lock() {
            Some((user, identity)) if *user == cas_user => Some(identity.clone()),
            _ => None,
        }
    }

    fn remember(&self, identity: &Identity) {
        if let Some(cas_user) = self.current().and_then(|s| s.cas_user) {
            *self.resolved.lock() = Some((cas_user, identity.clone()));
        }
    }
}

/// Request guard giving handlers read/write access to the session.
pub struct SessionHandle<'r> {
    cell: &'r SessionCell,
    jar: &'r CookieJar<'r>,
    keys: &'r SessionKeys,
}

impl<'r> SessionHandle<'r> {
    pub fn exists(&self) -> bool {
        self.cell.current().is_some()
    }

    /// The current session, or an empty one.
    pub fn get(&self) -> Session {
        self.cell.current().unwrap_or_default()
    }

    pub fn save(&self, session: Session) -> Result<(), SessionError> {
        let cookie = self.keys.cookie_for(&session)?;
        self.jar.add(cookie);
        self.cell.replace(Some(session));
        Ok(())
    }

    /// Establishes the local session for `cas_user`, keeping any pending
    /// CAS login so it resumes at the end of this request.
    ///
    /// The client role calls this once the upstream server vouched for the
    /// user. A server-only deployment has no such route: the host mounts its
    /// own login handler at `server.login_path` and calls this once it has
    /// authenticated the user itself. The name must resolve through the
    /// hardcoded users or the directory.
    pub fn log_in(&self, cas_user: impl Into<String>) -> Result<(), SessionError> {
        let mut session = self.get();
        session.cas_user = Some(cas_user.into());
        self.save(session)
    }

    pub fn destroy(&self) {
        self.jar.remove(self.keys.removal_cookie());
        self.cell.replace(None);
    }

    pub fn resolved(&self) -> Option<Identity> {
        self.cell.resolved()
    }

    /// Caches `identity` for the rest of the request.
    pub fn remember(&self, identity: &Identity) {
        self.cell.remember(identity)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for SessionHandle<'r> {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(keys) = req.rocket().state::<SessionKeys>() else {
            tracing::error!("session keys are not managed");
            return Outcome::Error((Status::InternalServerError, ()));
        };
        Outcome::Success(SessionHandle {
            cell: SessionCell::of(req, keys),
            jar: req.cookies(),
            keys,
        })
    }
}
