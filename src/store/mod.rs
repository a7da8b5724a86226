//! Durable ticket records and the row-lock contract the coordinator relies on.
//!
//! A [`RowLock`] is the proof that the caller holds the exclusive lock for one
//! ticket. [`TicketStore::read`] and [`TicketStore::write`] demand that proof,
//! so lock, read and write compose into one critical section.

mod memory;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;

use crate::error::StoreError;
use crate::state_machine::{NewTicket, Status, Ticket, TicketId, WorkerId};

pub use memory::MemoryStore;

/// Exclusive handle on one ticket row. Dropping it releases the lock.
#[derive(Debug)]
pub struct RowLock {
    ticket: TicketId,
    _guard: OwnedMutexGuard<()>,
}

impl RowLock {
    pub fn new(ticket: TicketId, guard: OwnedMutexGuard<()>) -> Self {
        Self { ticket, _guard: guard }
    }

    pub fn ticket(&self) -> TicketId {
        self.ticket
    }
}

impl Drop for RowLock {
    fn drop(&mut self) {
        tracing::trace!(ticket = %self.ticket, "row lock released");
    }
}

/// Storage backend for tickets.
pub trait TicketStore: Send + Sync {
    /// Wait for the exclusive lock on `id`.
    ///
    /// Succeeds for ids that do not exist; the subsequent [`read`](Self::read)
    /// reports the absence.
    fn lock_for_update(
        &self,
        id: TicketId,
    ) -> impl Future<Output = Result<RowLock, StoreError>> + Send;

    /// Read the committed ticket guarded by `lock`.
    fn read(&self, lock: &RowLock) -> Result<Option<Ticket>, StoreError>;

    /// Commit `ticket` in a single step. Its version must be exactly one
    /// above the stored version.
    fn write(&self, lock: &RowLock, ticket: &Ticket) -> Result<(), StoreError>;

    /// Persist a new ticket and return it with its assigned id, together with
    /// its row lock. The lock is taken before the row is visible, so no
    /// transition can touch the ticket until the caller drops it.
    fn insert(
        &self,
        draft: NewTicket,
        now: DateTime<Utc>,
    ) -> Result<(Ticket, RowLock), StoreError>;

    /// Unlocked read of the last committed state.
    fn get(&self, id: TicketId) -> Result<Option<Ticket>, StoreError>;

    /// Unlocked scan of committed tickets matching `filter`, in id order.
    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, StoreError>;
}

/// Criteria for listing tickets. Empty criteria match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketFilter {
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub assigned_to: Option<WorkerId>,
    /// Case-insensitive substring over client name, phone and address.
    #[serde(default)]
    pub search: Option<String>,
}

impl TicketFilter {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn matches(&self, ticket: &Ticket) -> bool {
        if self.status.is_some_and(|status| status != ticket.status) {
            return false;
        }
        if self.assigned_to.is_some() && self.assigned_to != ticket.assigned_to {
            return false;
        }
        match &self.search {
            Some(needle) if !needle.trim().is_empty() => {
                let needle = needle.trim().to_lowercase();
                [&ticket.client_name, &ticket.phone, &ticket.address]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            }
            _ => true,
        }
    }
}
