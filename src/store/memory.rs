use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::{RowLock, TicketFilter, TicketStore};
use crate::error::StoreError;
use crate::state_machine::{NewTicket, Ticket, TicketId};

/// In-process ticket store.
///
/// Row locks live in their own table, one async mutex per ticket, so that
/// waiting on one ticket never blocks another. Committed rows sit in a sharded
/// map; a write replaces the whole row at once, so unlocked readers only ever
/// see committed states.
pub struct MemoryStore {
    rows: DashMap<TicketId, Ticket>,
    locks: DashMap<TicketId, Arc<Mutex<()>>>,
    next_id: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            locks: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Load a previously persisted ticket as-is, keeping its id and version.
    pub fn restore(&self, ticket: Ticket) {
        self.next_id.fetch_max(ticket.id.0 + 1, Ordering::SeqCst);
        self.locks.entry(ticket.id).or_default();
        self.rows.insert(ticket.id, ticket);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl TicketStore for MemoryStore {
    async fn lock_for_update(&self, id: TicketId) -> Result<RowLock, StoreError> {
        // Unknown ids get a throwaway mutex; ids are never reused, so nothing
        // else can contend for it.
        let mutex = self
            .locks
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .unwrap_or_default();
        let guard = mutex.lock_owned().await;
        tracing::trace!(ticket = %id, "row lock acquired");
        Ok(RowLock::new(id, guard))
    }

    fn read(&self, lock: &RowLock) -> Result<Option<Ticket>, StoreError> {
        Ok(self.rows.get(&lock.ticket()).map(|row| row.value().clone()))
    }

    fn write(&self, lock: &RowLock, ticket: &Ticket) -> Result<(), StoreError> {
        if lock.ticket() != ticket.id {
            return Err(StoreError::LockMismatch {
                held: lock.ticket(),
                requested: ticket.id,
            });
        }

        let mut stored = self.rows.get_mut(&ticket.id).ok_or_else(|| {
            StoreError::Backend(format!("ticket {} vanished under lock", ticket.id))
        })?;
        let expected = stored.version + 1;
        if ticket.version != expected {
            return Err(StoreError::VersionConflict {
                ticket: ticket.id,
                expected,
                found: ticket.version,
            });
        }
        *stored = ticket.clone();
        Ok(())
    }

    fn insert(
        &self,
        draft: NewTicket,
        now: DateTime<Utc>,
    ) -> Result<(Ticket, RowLock), StoreError> {
        let id = TicketId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let ticket = Ticket::from_intake(id, draft, now);

        // Locked before the row becomes visible.
        let mutex = Arc::new(Mutex::new(()));
        let guard = Arc::clone(&mutex)
            .try_lock_owned()
            .map_err(|e| StoreError::Backend(format!("fresh row lock for {id} was taken: {e}")))?;
        self.locks.insert(id, mutex);
        self.rows.insert(id, ticket.clone());
        tracing::trace!(ticket = %id, "row inserted under lock");
        Ok((ticket, RowLock::new(id, guard)))
    }

    fn get(&self, id: TicketId) -> Result<Option<Ticket>, StoreError> {
        Ok(self.rows.get(&id).map(|row| row.value().clone()))
    }

    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, StoreError> {
        let mut tickets: Vec<Ticket> = self
            .rows
            .iter()
            .filter(|row| filter.matches(row.value()))
            .map(|row| row.value().clone())
            .collect();
        tickets.sort_by_key(|ticket| ticket.id);
        Ok(tickets)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::state_machine::{Status, WorkerId};

    fn draft(name: &str) -> NewTicket {
        NewTicket {
            client_name: name.into(),
            phone: "+70000000000".into(),
            address: "Test street 1".into(),
            problem: "Something is broken".into(),
        }
    }

    #[test]
    fn insert_assigns_increasing_ids() {
        let store = MemoryStore::new();
        let a = store.insert(draft("a"), Utc::now()).unwrap().0;
        let b = store.insert(draft("b"), Utc::now()).unwrap().0;
        assert_eq!(a.id, TicketId(1));
        assert_eq!(b.id, TicketId(2));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(a.id).unwrap().unwrap().client_name, "a");
    }

    #[test]
    fn restore_keeps_ids_unique() {
        let store = MemoryStore::new();
        let mut old = Ticket::from_intake(TicketId(10), draft("old"), Utc::now());
        old.status = Status::Done;
        old.assigned_to = Some(WorkerId(2));
        old.version = 4;
        store.restore(old);
        let fresh = store.insert(draft("fresh"), Utc::now()).unwrap().0;
        assert_eq!(fresh.id, TicketId(11));
        assert_eq!(store.get(TicketId(10)).unwrap().unwrap().version, 4);
    }

    #[tokio::test]
    async fn write_requires_next_version() {
        let store = MemoryStore::new();
        let ticket = store.insert(draft("a"), Utc::now()).unwrap().0;
        let lock = store.lock_for_update(ticket.id).await.unwrap();

        let mut stale = store.read(&lock).unwrap().unwrap();
        stale.status = Status::Canceled;
        let err = store.write(&lock, &stale).unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict { expected: 2, found: 1, .. }
        ));

        let mut next = stale.clone();
        next.version = 2;
        store.write(&lock, &next).unwrap();
        assert_eq!(store.get(ticket.id).unwrap().unwrap().status, Status::Canceled);
    }

    #[tokio::test]
    async fn write_rejects_foreign_lock() {
        let store = MemoryStore::new();
        let a = store.insert(draft("a"), Utc::now()).unwrap().0;
        let b = store.insert(draft("b"), Utc::now()).unwrap().0;
        let lock = store.lock_for_update(a.id).await.unwrap();
        let mut other = b.clone();
        other.version += 1;
        assert!(matches!(
            store.write(&lock, &other),
            Err(StoreError::LockMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn lock_is_exclusive_per_ticket() {
        let store = Arc::new(MemoryStore::new());
        let a = store.insert(draft("a"), Utc::now()).unwrap().0;
        let b = store.insert(draft("b"), Utc::now()).unwrap().0;

        let held = store.lock_for_update(a.id).await.unwrap();

        // Same ticket: blocked while held.
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), store.lock_for_update(a.id)).await;
        assert!(blocked.is_err());

        // Different ticket: proceeds immediately.
        let other =
            tokio::time::timeout(Duration::from_millis(50), store.lock_for_update(b.id)).await;
        assert!(other.is_ok());

        drop(held);
        let reacquired =
            tokio::time::timeout(Duration::from_millis(50), store.lock_for_update(a.id)).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn insert_hands_back_a_held_lock() {
        let store = MemoryStore::new();
        let (ticket, lock) = store.insert(draft("a"), Utc::now()).unwrap();
        assert_eq!(lock.ticket(), ticket.id);
        assert_eq!(store.get(ticket.id).unwrap().unwrap(), ticket);

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), store.lock_for_update(ticket.id)).await;
        assert!(blocked.is_err());

        drop(lock);
        let free =
            tokio::time::timeout(Duration::from_millis(50), store.lock_for_update(ticket.id)).await;
        assert!(free.is_ok());
    }

    #[test]
    fn list_is_ordered_by_id() {
        let store = MemoryStore::new();
        for i in [7u64, 3, 12, 1] {
            store.restore(Ticket::from_intake(TicketId(i), draft("r"), Utc::now()));
        }
        store.insert(draft("new"), Utc::now()).unwrap();
        let ids: Vec<u64> = store
            .list(&TicketFilter::default())
            .unwrap()
            .iter()
            .map(|t| t.id.0)
            .collect();
        assert_eq!(ids, vec![1, 3, 7, 12, 13]);
    }

    #[tokio::test]
    async fn unknown_ticket_locks_and_reads_absent() {
        let store = MemoryStore::new();
        let lock = store.lock_for_update(TicketId(99)).await.unwrap();
        assert!(store.read(&lock).unwrap().is_none());
        assert!(store.locks.is_empty());
    }
}
