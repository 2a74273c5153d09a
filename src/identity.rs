//! Turning a CAS username into a local identity.
//!
//! Lookup order: configured hardcoded users (by username or email), then the
//! people directory by username. The host's [`AfterLogin`] hook sees every
//! resolved identity last. Only the username is ever kept in the
//! session; the full identity is resolved again on each request.

use crate::error::{DirectoryError, ResolveError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub const PERSON_KIND: &str = "person";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Unique id; the username for hardcoded users.
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Account declared directly in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HardcodedUser {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl HardcodedUser {
    fn matches(&self, cas_user: &str) -> bool {
        self.username == cas_user || self.email.as_deref() == Some(cas_user)
    }

    fn to_identity(&self) -> Identity {
        Identity {
            id: self.username.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            title: self.title.clone(),
        }
    }
}

/// External people directory.
#[rocket::async_trait]
pub trait Directory: Send + Sync {
    async fn find_person(&self, kind: &str, username: &str) -> Result<Option<Identity>, DirectoryError>;
}

/// Directory with nobody in it, used when none is configured.
pub struct EmptyDirectory;

#[rocket::async_trait]
impl Directory for EmptyDirectory {
    async fn find_person(&self, _kind: &str, _username: &str) -> Result<Option<Identity>, DirectoryError> {
        Ok(None)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct DirectoryRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<String>,
    username: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// Directory loaded from a JSON array of records:
/// `[{"type": "person", "username": "jdoe", "email": "...", "title": "..."}]`.
pub struct JsonDirectory {
    records: Vec<DirectoryRecord>,
}

impl JsonDirectory {
    pub fn from_json(json: &str) -> Result<Self, DirectoryError> {
        Ok(JsonDirectory {
            records: serde_json::from_str(json)?,
        })
    }

    pub fn open(path: &Path) -> Result<Self, DirectoryError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[rocket::async_trait]
impl Directory for JsonDirectory {
    async fn find_person(&self, kind: &str, username: &str) -> Result<Option<Identity>, DirectoryError> {
        Ok(self
            .records
            .iter()
            .find(|r| r.kind == kind && r.username == username)
            .map(|r| Identity {
                id: r.id.clone().unwrap_or_else(|| r.username.clone()),
                username: r.username.clone(),
                email: r.email.clone(),
                title: r.title.clone(),
            }))
    }
}

/// Host hooks around local login.
#[rocket::async_trait]
pub trait AfterLogin: Send + Sync {
    /// Runs on every freshly resolved identity. May adjust it, or refuse it
    /// with an error that counts as a failed resolution.
    async fn after_resolve(&self, identity: Identity) -> Result<Identity, ResolveError> {
        Ok(identity)
    }

    /// Where the client role sends the user once the local session exists.
    async fn redirect_for(&self, identity: &Identity) -> String;
}

/// Sends everyone to the same URL; `after_login_url` in configuration.
pub struct RedirectTo(pub String);

impl Default for RedirectTo {
    fn default() -> Self {
        RedirectTo(String::from("/"))
    }
}

#[rocket::async_trait]
impl AfterLogin for RedirectTo {
    async fn redirect_for(&self, _identity: &Identity) -> String {
        self.0.clone()
    }
}

pub struct IdentityResolver {
    hardcoded: Vec<HardcodedUser>,
    directory: Arc<dyn Directory>,
    hooks: Arc<dyn AfterLogin>,
}

impl IdentityResolver {
    pub fn new(hardcoded: Vec<HardcodedUser>, directory: Arc<dyn Directory>) -> Self {
        IdentityResolver {
            hardcoded,
            directory,
            hooks: Arc::new(RedirectTo::default()),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn AfterLogin>) -> Self {
        self.hooks = hooks;
        self
    }

    pub async fn resolve(&self, cas_user: &str) -> Result<Identity, ResolveError> {
        let identity = match self.hardcoded.iter().find(|u| u.matches(cas_user)) {
            Some(user) => user.to_identity(),
            None => self
                .directory
                .find_person(PERSON_KIND, cas_user)
                .await?
                .ok_or_else(|| ResolveError::Insufficient(cas_user.to_owned()))?,
        };
        self.hooks.after_resolve(identity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDirectory {
        inner: JsonDirectory,
        calls: AtomicUsize,
    }

    #[rocket::async_trait]
    impl Directory for CountingDirectory {
        async fn find_person(&self, kind: &str, username: &str) -> Result<Option<Identity>, DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.find_person(kind, username).await
        }
    }

    struct BrokenDirectory;

    #[rocket::async_trait]
    impl Directory for BrokenDirectory {
        async fn find_person(&self, _: &str, _: &str) -> Result<Option<Identity>, DirectoryError> {
            Err(DirectoryError::Unavailable(String::from("connection refused")))
        }
    }

    const PEOPLE: &str = r#"[
        {"type": "person", "username": "asmith", "email": "asmith@example.edu", "title": "Alice Smith"},
        {"type": "group", "username": "staff"}
    ]"#;

    fn hardcoded() -> Vec<HardcodedUser> {
        vec![HardcodedUser {
            username: String::from("jdoe"),
            email: Some(String::from("jdoe@example.edu")),
            title: Some(String::from("John Doe")),
        }]
    }

    fn resolver() -> (IdentityResolver, Arc<CountingDirectory>) {
        let directory = Arc::new(CountingDirectory {
            inner: JsonDirectory::from_json(PEOPLE).unwrap(),
            calls: AtomicUsize::new(0),
        });
        (IdentityResolver::new(hardcoded(), directory.clone()), directory)
    }

    #[rocket::async_test]
    async fn hardcoded_user_skips_directory() {
        let (resolver, directory) = resolver();

        let by_name = resolver.resolve("jdoe").await.unwrap();
        assert_eq!(by_name.id, "jdoe");
        assert_eq!(by_name.title.as_deref(), Some("John Doe"));

        let by_email = resolver.resolve("jdoe@example.edu").await.unwrap();
        assert_eq!(by_email.username, "jdoe");

        assert_eq!(directory.calls.load(Ordering::SeqCst), 0);
    }

    #[rocket::async_test]
    async fn falls_back_to_directory_person() {
        let (resolver, directory) = resolver();
        let person = resolver.resolve("asmith").await.unwrap();
        assert_eq!(person.email.as_deref(), Some("asmith@example.edu"));
        assert_eq!(directory.calls.load(Ordering::SeqCst), 1);
    }

    #[rocket::async_test]
    async fn unknown_or_non_person_is_insufficient() {
        let (resolver, _) = resolver();
        assert!(matches!(resolver.resolve("nobody").await, Err(ResolveError::Insufficient(u)) if u == "nobody"));
        assert!(matches!(resolver.resolve("staff").await, Err(ResolveError::Insufficient(_))));
    }

    #[rocket::async_test]
    async fn directory_failure_is_not_insufficient() {
        let resolver = IdentityResolver::new(Vec::new(), Arc::new(BrokenDirectory));
        assert!(matches!(resolver.resolve("asmith").await, Err(ResolveError::Directory(_))));
    }

    #[rocket::async_test]
    async fn directory_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, PEOPLE.as_bytes()).unwrap();

        let directory = JsonDirectory::open(file.path()).unwrap();
        assert_eq!(directory.len(), 2);
        let person = directory.find_person(PERSON_KIND, "asmith").await.unwrap().unwrap();
        assert_eq!(person.id, "asmith");
    }

    struct StaffOnly;

    #[rocket::async_trait]
    impl AfterLogin for StaffOnly {
        async fn after_resolve(&self, mut identity: Identity) -> Result<Identity, ResolveError> {
            if identity.email.as_deref().is_some_and(|e| e.ends_with("@example.edu")) {
                identity.title.get_or_insert_with(|| String::from("Staff"));
                Ok(identity)
            } else {
                Err(ResolveError::Insufficient(identity.username))
            }
        }

        async fn redirect_for(&self, identity: &Identity) -> String {
            format!("/desk/{}", identity.username)
        }
    }

    #[rocket::async_test]
    async fn hooks_adjust_or_refuse_resolved_identities() {
        let directory = JsonDirectory::from_json(
            r#"[
                {"type": "person", "username": "asmith", "email": "asmith@example.edu"},
                {"type": "person", "username": "guest", "email": "guest@gmail.com"}
            ]"#,
        )
        .unwrap();
        let resolver = IdentityResolver::new(hardcoded(), Arc::new(directory)).with_hooks(Arc::new(StaffOnly));

        assert_eq!(resolver.resolve("asmith").await.unwrap().title.as_deref(), Some("Staff"));
        assert_eq!(resolver.resolve("jdoe").await.unwrap().title.as_deref(), Some("John Doe"));
        assert!(matches!(resolver.resolve("guest").await, Err(ResolveError::Insufficient(u)) if u == "guest"));
    }

    #[rocket::async_test]
    async fn default_hook_redirects_to_configured_url() {
        let identity = Identity {
            id: String::from("jdoe"),
            username: String::from("jdoe"),
            email: None,
            title: None,
        };
        assert_eq!(RedirectTo(String::from("/home")).redirect_for(&identity).await, "/home");
        assert_eq!(RedirectTo::default().redirect_for(&identity).await, "/");
    }

    #[test]
    fn missing_directory_file_is_io_error() {
        assert!(matches!(
            JsonDirectory::open(Path::new("/nonexistent/people.json")),
            Err(DirectoryError::Io(_))
        ));
    }

    #[test]
    fn malformed_directory_is_rejected() {
        assert!(matches!(JsonDirectory::from_json("{"), Err(DirectoryError::Malformed(_))));
    }
}
