use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::fmt;

const TICKET_PREFIX: &str = "ST-";
const TICKET_RANDOM_LEN: usize = 32;

/// Opaque service ticket handed to a service after login.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticket(String);

impl Ticket {
    /// Mint a fresh ticket from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let random: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TICKET_RANDOM_LEN)
            .map(char::from)
            .collect();
        Ticket(format!("{TICKET_PREFIX}{random}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `service` with `ticket=<value>` appended to its query string.
    pub fn append_to(&self, service: &str) -> String {
        let sep = if service.contains('?') { "&" } else { "?" };
        format!("{service}{sep}ticket={}", urlencoding::encode(&self.0))
    }
}

impl From<String> for Ticket {
    fn from(value: String) -> Self {
        Ticket(value)
    }
}

impl AsRef<str> for Ticket {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
