use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::state_machine::Status;
use crate::store::{TicketFilter, TicketStore};

/// Ticket counts per status.
///
/// Built from unlocked reads, so it may trail transitions that are in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total: usize,
    pub by_status: BTreeMap<Status, usize>,
}

impl Stats {
    pub fn count(&self, status: Status) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

pub struct StatsAggregator;

impl StatsAggregator {
    /// Count every committed ticket by status. All five statuses are present
    /// in the result, zero or not.
    pub fn snapshot(store: &impl TicketStore) -> Result<Stats, StoreError> {
        let mut by_status: BTreeMap<Status, usize> =
            Status::ALL.into_iter().map(|status| (status, 0)).collect();
        let tickets = store.list(&TicketFilter::default())?;
        for ticket in &tickets {
            *by_status.entry(ticket.status).or_insert(0) += 1;
        }
        Ok(Stats {
            total: tickets.len(),
            by_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::state_machine::{NewTicket, Ticket, TicketId, WorkerId};
    use crate::store::MemoryStore;

    fn ticket(id: u64, status: Status) -> Ticket {
        let mut ticket = Ticket::from_intake(
            TicketId(id),
            NewTicket {
                client_name: "Client".into(),
                phone: "+70000000000".into(),
                address: "Street 1".into(),
                problem: "Broken".into(),
            },
            Utc::now(),
        );
        ticket.status = status;
        if status.requires_assignee() {
            ticket.assigned_to = Some(WorkerId(2));
        }
        ticket
    }

    #[test]
    fn empty_store_reports_zeroes() {
        let stats = StatsAggregator::snapshot(&MemoryStore::new()).unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.by_status.len(), 5);
        assert!(Status::ALL.iter().all(|&s| stats.count(s) == 0));
    }

    #[test]
    fn counts_each_status() {
        let store = MemoryStore::new();
        let statuses = [
            Status::New,
            Status::New,
            Status::Assigned,
            Status::InProgress,
            Status::Done,
            Status::Done,
            Status::Done,
            Status::Canceled,
        ];
        for (i, status) in statuses.into_iter().enumerate() {
            store.restore(ticket(i as u64 + 1, status));
        }

        let stats = StatsAggregator::snapshot(&store).unwrap();
        assert_eq!(stats.total, 8);
        assert_eq!(stats.count(Status::New), 2);
        assert_eq!(stats.count(Status::Assigned), 1);
        assert_eq!(stats.count(Status::InProgress), 1);
        assert_eq!(stats.count(Status::Done), 3);
        assert_eq!(stats.count(Status::Canceled), 1);
        assert_eq!(stats.by_status.values().sum::<usize>(), stats.total);
    }

    #[test]
    fn serializes_status_keys() {
        let store = MemoryStore::new();
        store.restore(ticket(1, Status::InProgress));
        let json = serde_json::to_value(StatsAggregator::snapshot(&store).unwrap()).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["by_status"]["in_progress"], 1);
        assert_eq!(json["by_status"]["new"], 0);
    }
}
