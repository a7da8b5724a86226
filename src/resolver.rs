use crate::audit::AuditSink;
use crate::coordinator::{Applied, TransitionCoordinator};
use crate::directory::WorkerDirectory;
use crate::error::TransitionError;
use crate::state_machine::{Action, Actor, Role, TicketId, Worker, WorkerId};
use crate::store::TicketStore;

/// Look up `id` and confirm it can receive assignments.
pub fn eligible_master(
    directory: &impl WorkerDirectory,
    id: WorkerId,
) -> Result<Worker, TransitionError> {
    let invalid = |reason: &str| TransitionError::InvalidTarget {
        worker: id,
        reason: reason.to_string(),
    };
    let worker = directory
        .find_worker(id)
        .ok_or_else(|| invalid("unknown worker"))?;
    if worker.role != Role::Master {
        return Err(invalid("not a master"));
    }
    if !worker.active {
        return Err(invalid("worker is inactive"));
    }
    Ok(worker)
}

/// Dispatcher-facing entry point for assignments.
///
/// Rejects ineligible targets before touching the ticket's lock. The
/// coordinator checks eligibility again once it holds the lock.
pub struct AssignmentResolver<'a, S, A, D> {
    coordinator: &'a TransitionCoordinator<S, A, D>,
}

impl<'a, S, A, D> AssignmentResolver<'a, S, A, D>
where
    S: TicketStore,
    A: AuditSink,
    D: WorkerDirectory,
{
    pub fn new(coordinator: &'a TransitionCoordinator<S, A, D>) -> Self {
        Self { coordinator }
    }

    pub async fn assign(
        &self,
        ticket: TicketId,
        master: WorkerId,
        dispatcher: Actor,
    ) -> Result<Applied, TransitionError> {
        let target = eligible_master(self.coordinator.directory(), master)?;
        tracing::debug!(
            ticket = %ticket,
            master = %target.id,
            username = %target.username,
            "assignment target accepted"
        );
        self.coordinator
            .apply(ticket, Action::Assign { master }, dispatcher)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::directory::MemoryDirectory;
    use crate::error::ErrorClass;
    use crate::state_machine::{NewTicket, Status};
    use crate::store::MemoryStore;

    fn worker(id: u64, role: Role, active: bool) -> Worker {
        Worker {
            id: WorkerId(id),
            username: format!("w{id}"),
            full_name: None,
            role,
            active,
        }
    }

    fn setup() -> (
        TransitionCoordinator<MemoryStore, Arc<MemoryAuditSink>, MemoryDirectory>,
        Arc<MemoryAuditSink>,
        TicketId,
    ) {
        let audit = Arc::new(MemoryAuditSink::new());
        let directory = MemoryDirectory::new([
            worker(1, Role::Dispatcher, true),
            worker(2, Role::Master, true),
            worker(3, Role::Master, false),
        ]);
        let coord = TransitionCoordinator::new(MemoryStore::new(), Arc::clone(&audit), directory);
        let id = coord
            .store()
            .insert(
                NewTicket {
                    client_name: "Client".into(),
                    phone: "+70000000000".into(),
                    address: "Street 1".into(),
                    problem: "Broken heater".into(),
                },
                Utc::now(),
            )
            .unwrap()
            .0
            .id;
        (coord, audit, id)
    }

    #[test]
    fn eligibility_reasons() {
        let directory = MemoryDirectory::new([
            worker(1, Role::Dispatcher, true),
            worker(2, Role::Master, true),
            worker(3, Role::Master, false),
        ]);
        assert!(eligible_master(&directory, WorkerId(2)).is_ok());
        for (id, reason) in [(1, "not a master"), (3, "worker is inactive"), (9, "unknown worker")] {
            match eligible_master(&directory, WorkerId(id)) {
                Err(TransitionError::InvalidTarget { worker, reason: got }) => {
                    assert_eq!(worker, WorkerId(id));
                    assert_eq!(got, reason);
                }
                other => panic!("expected invalid target, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn assigns_active_master() {
        let (coord, audit, id) = setup();
        let applied = AssignmentResolver::new(&coord)
            .assign(id, WorkerId(2), Actor::dispatcher(WorkerId(1)))
            .await
            .unwrap();
        assert_eq!(applied.ticket.status, Status::Assigned);
        assert_eq!(applied.ticket.assigned_to, Some(WorkerId(2)));
        assert_eq!(audit.len(), 1);
    }

    #[tokio::test]
    async fn ineligible_target_never_reaches_the_ticket() {
        let (coord, audit, id) = setup();
        let resolver = AssignmentResolver::new(&coord);
        for target in [1, 3, 9] {
            let err = resolver
                .assign(id, WorkerId(target), Actor::dispatcher(WorkerId(1)))
                .await
                .unwrap_err();
            assert_eq!(err.class(), ErrorClass::InvalidTarget);
        }
        assert_eq!(coord.store().get(id).unwrap().unwrap().version, 1);
        assert!(audit.is_empty());
    }

    #[tokio::test]
    async fn invalid_target_wins_over_missing_ticket() {
        let (coord, _audit, _id) = setup();
        let err = AssignmentResolver::new(&coord)
            .assign(TicketId(500), WorkerId(3), Actor::dispatcher(WorkerId(1)))
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::InvalidTarget);
    }
}
