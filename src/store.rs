//! Time-bounded ticket → binding storage.
//!
//! The store is the only state shared between concurrent requests. It is
//! injected into the issuer and the validator as `Arc<dyn TicketStore>` so a
//! distributed cache can replace the in-memory map.

use crate::error::StoreError;
use crate::ticket::Ticket;
use rocket::tokio::sync::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// What a ticket proves: `username` logged in to reach `service`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketBinding {
    pub username: String,
    pub service: String,
    /// Unix timestamp of issuance.
    pub issued_at: i64,
}

impl TicketBinding {
    pub fn new(username: impl Into<String>, service: impl Into<String>) -> Self {
        TicketBinding {
            username: username.into(),
            service: service.into(),
            issued_at: chrono::Utc::now().timestamp(),
        }
    }
}

#[rocket::async_trait]
pub trait TicketStore: Send + Sync {
    async fn set(&self, ticket: &Ticket, binding: TicketBinding, ttl: Duration) -> Result<(), StoreError>;

    /// Returns the binding without consuming it.
    async fn get(&self, ticket: &str) -> Result<Option<TicketBinding>, StoreError>;

    /// Returns the binding and removes it in one step. Two concurrent calls
    /// for the same ticket never both see it.
    async fn take(&self, ticket: &str) -> Result<Option<TicketBinding>, StoreError>;

    /// Drops expired entries, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

struct Entry {
    binding: TicketBinding,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Process-local store backed by a locked `HashMap`.
#[derive(Default)]
pub struct MemoryTicketStore {
    tickets: RwLock<HashMap<String, Entry>>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tickets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[rocket::async_trait]
impl TicketStore for MemoryTicketStore {
    async fn set(&self, ticket: &Ticket, binding: TicketBinding, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut tickets = self.tickets.write().await;
        tickets.retain(|_, entry| !entry.is_expired(now));
        tickets.insert(
            ticket.as_str().to_owned(),
            Entry {
                binding,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, ticket: &str) -> Result<Option<TicketBinding>, StoreError> {
        let tickets = self.tickets.read().await;
        Ok(tickets
            .get(ticket)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.binding.clone()))
    }

    async fn take(&self, ticket: &str) -> Result<Option<TicketBinding>, StoreError> {
        let mut tickets = self.tickets.write().await;
        Ok(tickets
            .remove(ticket)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.binding))
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let mut tickets = self.tickets.write().await;
        let before = tickets.len();
        tickets.retain(|_, entry| !entry.is_expired(now));
        Ok(before - tickets.len())
    }
}
