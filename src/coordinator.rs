//! The single mutation path for tickets.
//!
//! [`TransitionCoordinator::apply`] takes the ticket's row lock, re-reads the
//! ticket under it, validates the request, writes the new state and emits the
//! audit record, all inside one critical section. Callers racing on the same
//! ticket are therefore accepted in lock-acquisition order, and every loser
//! observes the winner's committed state.

use std::time::Duration;

use chrono::Utc;

use crate::audit::{AuditSink, TransitionRecord};
use crate::directory::WorkerDirectory;
use crate::error::{TransitionError, TransitionWarning};
use crate::resolver::eligible_master;
use crate::state_machine::{Action, Actor, NewTicket, Rejection, StateMachine, Ticket, TicketId};
use crate::store::TicketStore;

/// Lock wait used when none is configured.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of an intake or an accepted transition.
#[derive(Debug, Clone)]
pub struct Applied {
    /// The ticket as committed.
    pub ticket: Ticket,
    /// The record handed to the audit sink.
    pub record: TransitionRecord,
    /// Set when the transition committed but auditing did not.
    pub warning: Option<TransitionWarning>,
}

/// Serializes transitions per ticket over a [`TicketStore`].
pub struct TransitionCoordinator<S, A, D> {
    store: S,
    audit: A,
    directory: D,
    lock_timeout: Duration,
}

impl<S, A, D> TransitionCoordinator<S, A, D>
where
    S: TicketStore,
    A: AuditSink,
    D: WorkerDirectory,
{
    pub fn new(store: S, audit: A, directory: D) -> Self {
        Self {
            store,
            audit,
            directory,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Bound the time `apply` may wait for a ticket's lock.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn audit(&self) -> &A {
        &self.audit
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Store a new ticket and emit its intake record while its fresh row lock
    /// is still held.
    pub fn intake(&self, draft: NewTicket) -> Result<Applied, TransitionError> {
        let (ticket, lock) = self.store.insert(draft, Utc::now())?;
        let record = TransitionRecord::created(&ticket);
        let warning = self.emit(&record);
        drop(lock);

        tracing::info!(ticket = %ticket.id, client = %ticket.client_name, "ticket created");
        Ok(Applied {
            ticket,
            record,
            warning,
        })
    }

    /// Apply `action` to ticket `ticket_id` on behalf of `actor`.
    ///
    /// Makes exactly one lock attempt. On any error the stored ticket is
    /// unchanged and no audit record is emitted.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn apply(
        &self,
        ticket_id: TicketId,
        action: Action,
        actor: Actor,
    ) -> Result<Applied, TransitionError> {
        let lock = tokio::time::timeout(self.lock_timeout, self.store.lock_for_update(ticket_id))
            .await
            .map_err(|_| {
                tracing::warn!(
                    ticket = %ticket_id,
                    waited = ?self.lock_timeout,
                    "row lock wait timed out"
                );
                TransitionError::Timeout {
                    ticket: ticket_id,
                    waited: self.lock_timeout,
                }
            })??;

        let current = self
            .store
            .read(&lock)?
            .ok_or(TransitionError::NotFound(ticket_id))?;

        let next = match self.evaluate(&current, action, actor) {
            Ok(next) => next,
            Err(e) => {
                tracing::debug!(
                    ticket = %ticket_id,
                    status = %current.status,
                    error = %e,
                    "transition rejected"
                );
                return Err(e);
            }
        };

        self.store.write(&lock, &next)?;

        let record = TransitionRecord::between(action.kind(), actor, &current, &next);
        let warning = self.emit(&record);
        drop(lock);

        tracing::info!(
            ticket = %ticket_id,
            action = %record.action,
            from = %current.status,
            to = %record.new_status,
            version = next.version,
            actor = %actor.id,
            "transition accepted"
        );

        Ok(Applied {
            ticket: next,
            record,
            warning,
        })
    }

    /// Hand `record` to the sink. A refusal never undoes the committed write.
    fn emit(&self, record: &TransitionRecord) -> Option<TransitionWarning> {
        match self.audit.record(record) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(
                    ticket = %record.ticket,
                    record = %record.record_id,
                    error = %e,
                    "change committed but audit record was not accepted"
                );
                Some(TransitionWarning::AuditDegraded(e.to_string()))
            }
        }
    }

    /// Validate `action` against the locked `current` state and build the
    /// successor. Check order: role, assignee, status, assignment target.
    fn evaluate(
        &self,
        current: &Ticket,
        action: Action,
        actor: Actor,
    ) -> Result<Ticket, TransitionError> {
        let kind = action.kind();
        let verdict = StateMachine::allowed_transition(current.status, kind, actor.role);

        if let Err(rejection @ Rejection::Unauthorized { .. }) = verdict {
            return Err(TransitionError::from_rejection(current.id, rejection));
        }
        if kind.requires_assignee() && current.assigned_to != Some(actor.id) {
            return Err(TransitionError::Forbidden {
                ticket: current.id,
                actor: actor.id,
            });
        }
        let status = verdict.map_err(|r| TransitionError::from_rejection(current.id, r))?;

        let mut next = current.clone();
        next.status = status;
        if let Action::Assign { master } = action {
            // The directory may have changed since any pre-lock check.
            eligible_master(&self.directory, master)?;
            next.assigned_to = Some(master);
        }
        next.version = current.version + 1;
        next.updated_at = Utc::now().max(current.updated_at);
        Ok(next)
    }
}
