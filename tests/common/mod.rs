#![allow(dead_code)]

use cas_bridge::client::TicketVerifier;
use cas_bridge::config::{CasConfig, ClientConfig, LogConfig, ServerConfig, SessionConfig};
use cas_bridge::error::{CasClientError, DirectoryError, StoreError};
use cas_bridge::identity::{AfterLogin, Directory, HardcodedUser, Identity, RedirectTo};
use cas_bridge::store::{MemoryTicketStore, TicketBinding, TicketStore};
use cas_bridge::ticket::Ticket;
use cas_bridge::{build, Collaborators};
use parking_lot::Mutex;
use rocket::local::blocking::Client;
use rocket::Route;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const APP: &str = "https://app.example.com";
pub const CAS_SERVER: &str = "https://cas.example.edu";
pub const OWN_LOGIN: &str = "https://portal.example.com/login";

/// Upstream CAS stand-in: maps tickets to usernames.
#[derive(Default)]
pub struct FakeVerifier {
    tickets: Mutex<HashMap<String, String>>,
    pub calls: AtomicUsize,
}

impl FakeVerifier {
    pub fn with(ticket: &str, user: &str) -> Arc<Self> {
        let verifier = FakeVerifier::default();
        verifier.add(ticket, user);
        Arc::new(verifier)
    }

    pub fn add(&self, ticket: &str, user: &str) {
        self.tickets.lock().insert(ticket.to_owned(), user.to_owned());
    }
}

#[rocket::async_trait]
impl TicketVerifier for FakeVerifier {
    async fn verify(&self, ticket: &str, service: &str) -> Result<String, CasClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(service, OWN_LOGIN);
        self.tickets
            .lock()
            .remove(ticket)
            .ok_or_else(|| CasClientError::AuthenticationFailed {
                code: String::from("INVALID_TICKET"),
                message: format!("Ticket {ticket} not recognized"),
            })
    }
}

/// People directory whose content tests can change between requests.
#[derive(Default)]
pub struct FakeDirectory {
    people: Mutex<HashMap<String, Identity>>,
    pub lookups: AtomicUsize,
    pub broken: AtomicBool,
}

impl FakeDirectory {
    pub fn add(&self, username: &str) {
        self.people.lock().insert(
            username.to_owned(),
            Identity {
                id: format!("id-{username}"),
                username: username.to_owned(),
                email: Some(format!("{username}@example.edu")),
                title: None,
            },
        );
    }

    pub fn remove(&self, username: &str) {
        self.people.lock().remove(username);
    }
}

#[rocket::async_trait]
impl Directory for FakeDirectory {
    async fn find_person(&self, _kind: &str, username: &str) -> Result<Option<Identity>, DirectoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.broken.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable(String::from("db password is hunter2")));
        }
        Ok(self.people.lock().get(username).cloned())
    }
}

/// Store whose backend is down.
pub struct FailingStore;

#[rocket::async_trait]
impl TicketStore for FailingStore {
    async fn set(&self, _: &Ticket, _: TicketBinding, _: Duration) -> Result<(), StoreError> {
        Err(StoreError::Unavailable(String::from("redis at 10.0.0.7 refused connection")))
    }

    async fn get(&self, _: &str) -> Result<Option<TicketBinding>, StoreError> {
        Err(StoreError::Unavailable(String::from("redis at 10.0.0.7 refused connection")))
    }

    async fn take(&self, _: &str) -> Result<Option<TicketBinding>, StoreError> {
        Err(StoreError::Unavailable(String::from("redis at 10.0.0.7 refused connection")))
    }
}

pub fn config() -> CasConfig {
    CasConfig {
        client: Some(ClientConfig {
            server_url: String::from(CAS_SERVER),
            login_path: String::from("/cas/login"),
            logout_path: String::from("/cas/logout"),
            validate_path: String::from("/cas/serviceValidate"),
            service_url: String::from(OWN_LOGIN),
        }),
        server: Some(ServerConfig {
            services: vec![String::from(APP)],
            ticket_ttl_secs: 300,
            single_use: true,
            login_path: String::from("/login"),
            reap_interval_secs: 60,
        }),
        session: SessionConfig {
            secret: String::from("integration-secret"),
            max_age_secs: 3600,
            secure: false,
        },
        hardcoded_users: vec![HardcodedUser {
            username: String::from("jdoe"),
            email: Some(String::from("jdoe@example.edu")),
            title: Some(String::from("John Doe")),
        }],
        directory: None,
        after_login_url: String::from("/"),
        log: LogConfig::default(),
    }
}

pub struct Harness {
    pub client: Client,
    pub verifier: Arc<FakeVerifier>,
    pub directory: Arc<FakeDirectory>,
    pub store: Arc<dyn TicketStore>,
}

/// Everything a test may swap out; `Setup::new(config)` uses the defaults.
pub struct Setup {
    pub config: CasConfig,
    pub store: Arc<dyn TicketStore>,
    pub verifier: Arc<FakeVerifier>,
    pub after_login: Option<Arc<dyn AfterLogin>>,
    /// Host routes mounted next to the CAS ones.
    pub routes: Vec<Route>,
}

impl Setup {
    pub fn new(config: CasConfig) -> Self {
        Setup {
            config,
            store: Arc::new(MemoryTicketStore::new()),
            verifier: Arc::new(FakeVerifier::default()),
            after_login: None,
            routes: Vec::new(),
        }
    }

    pub fn start(self) -> Harness {
        let Setup {
            config,
            store,
            verifier,
            after_login,
            routes,
        } = self;
        let directory = Arc::new(FakeDirectory::default());
        let after_login: Arc<dyn AfterLogin> = match after_login {
            Some(hooks) => hooks,
            None => Arc::new(RedirectTo(config.after_login_url.clone())),
        };
        let rocket = build(
            config,
            Collaborators {
                store: Arc::clone(&store),
                directory: directory.clone(),
                verifier: Some(verifier.clone()),
                after_login,
            },
        )
        .mount("/", routes);
        let client = Client::tracked(rocket).expect("valid rocket instance");
        Harness {
            client,
            verifier,
            directory,
            store,
        }
    }
}

pub fn harness_with(config: CasConfig, store: Arc<dyn TicketStore>, verifier: Arc<FakeVerifier>) -> Harness {
    Setup {
        store,
        verifier,
        ..Setup::new(config)
    }
    .start()
}

pub fn harness(verifier: Arc<FakeVerifier>) -> Harness {
    harness_with(config(), Arc::new(MemoryTicketStore::new()), verifier)
}

pub fn session_cookies(response: &rocket::local::blocking::LocalResponse<'_>) -> usize {
    response
        .headers()
        .get("Set-Cookie")
        .filter(|cookie| cookie.starts_with("cas_session="))
        .count()
}

pub fn location(response: &rocket::local::blocking::LocalResponse<'_>) -> String {
    response
        .headers()
        .get_one("Location")
        .expect("redirect has a Location")
        .to_owned()
}

pub fn ticket_from(location: &str) -> String {
    location
        .split_once("ticket=")
        .map(|(_, ticket)| ticket.to_owned())
        .expect("location carries a ticket")
}

pub fn enc(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

impl Harness {
    /// Completes an upstream CAS login for `user` through `/login`.
    pub fn log_in(&self, ticket: &str) -> rocket::local::blocking::LocalResponse<'_> {
        self.client.get(format!("/login?ticket={}", enc(ticket))).dispatch()
    }
}
