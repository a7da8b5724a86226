//! Caller-facing service: intake, queries, lifecycle actions and stats.
//!
//! All mutations, intake included, go through the [`TransitionCoordinator`];
//! assignments are routed through the [`AssignmentResolver`] first.

use crate::audit::AuditSink;
use crate::coordinator::{Applied, TransitionCoordinator};
use crate::directory::WorkerDirectory;
use crate::error::TransitionError;
use crate::resolver::AssignmentResolver;
use crate::state_machine::{Action, Actor, NewTicket, Role, Ticket, TicketId, Worker, WorkerId};
use crate::stats::{Stats, StatsAggregator};
use crate::store::{TicketFilter, TicketStore};

pub struct ServiceDesk<S, A, D> {
    coordinator: TransitionCoordinator<S, A, D>,
}

impl<S, A, D> ServiceDesk<S, A, D>
where
    S: TicketStore,
    A: AuditSink,
    D: WorkerDirectory,
{
    pub fn new(coordinator: TransitionCoordinator<S, A, D>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &TransitionCoordinator<S, A, D> {
        &self.coordinator
    }

    /// Register a new ticket in status `new` and audit its creation.
    pub fn create_ticket(&self, draft: NewTicket) -> Result<Applied, TransitionError> {
        if draft.client_name.trim().is_empty() || draft.problem.trim().is_empty() {
            return Err(TransitionError::InvalidRequest(
                "client name and problem description are required".into(),
            ));
        }
        self.coordinator.intake(draft)
    }

    pub fn find(&self, id: TicketId) -> Result<Ticket, TransitionError> {
        self.coordinator
            .store()
            .get(id)?
            .ok_or(TransitionError::NotFound(id))
    }

    /// Tickets matching `filter`, newest first. A master viewer only sees
    /// tickets assigned to them.
    pub fn list(
        &self,
        filter: &TicketFilter,
        viewer: Option<Actor>,
    ) -> Result<Vec<Ticket>, TransitionError> {
        let mut filter = filter.clone();
        if let Some(viewer) = viewer.filter(|v| v.role == Role::Master) {
            if filter.assigned_to.is_some_and(|id| id != viewer.id) {
                return Ok(Vec::new());
            }
            filter.assigned_to = Some(viewer.id);
        }
        let mut tickets = self.coordinator.store().list(&filter)?;
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(tickets)
    }

    /// Active masters, ordered by id: the candidates for `assign`.
    pub fn masters(&self) -> Vec<Worker> {
        self.coordinator.directory().masters()
    }

    /// Apply any lifecycle action. Assignments pass through the resolver.
    pub async fn apply(
        &self,
        ticket: TicketId,
        action: Action,
        actor: Actor,
    ) -> Result<Applied, TransitionError> {
        match action {
            Action::Assign { master } => self.assign(ticket, master, actor).await,
            other => self.coordinator.apply(ticket, other, actor).await,
        }
    }

    pub async fn assign(
        &self,
        ticket: TicketId,
        master: WorkerId,
        dispatcher: Actor,
    ) -> Result<Applied, TransitionError> {
        AssignmentResolver::new(&self.coordinator)
            .assign(ticket, master, dispatcher)
            .await
    }

    pub async fn take_to_work(&self, ticket: TicketId, master: Actor) -> Result<Applied, TransitionError> {
        self.coordinator.apply(ticket, Action::TakeToWork, master).await
    }

    pub async fn complete(&self, ticket: TicketId, master: Actor) -> Result<Applied, TransitionError> {
        self.coordinator.apply(ticket, Action::Complete, master).await
    }

    pub async fn cancel(&self, ticket: TicketId, dispatcher: Actor) -> Result<Applied, TransitionError> {
        self.coordinator.apply(ticket, Action::Cancel, dispatcher).await
    }

    pub fn stats(&self) -> Result<Stats, TransitionError> {
        Ok(StatsAggregator::snapshot(self.coordinator.store())?)
    }
}
