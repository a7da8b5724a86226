//! Transition records and the sinks that receive them.
//!
//! The coordinator hands every intake and every accepted transition to an
//! [`AuditSink`] exactly once. Sinks must not block: delivery to slow
//! destinations happens behind a queue (see [`ChannelAuditSink`] and [`webhook::WebhookForwarder`]).

pub mod webhook;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::error::AuditError;
use crate::state_machine::{ActionKind, Actor, Status, Ticket, TicketId, WorkerId};

/// What produced a record: intake or one of the lifecycle actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Assign,
    TakeToWork,
    Complete,
    Cancel,
}

impl AuditAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Assign => "assign",
            AuditAction::TakeToWork => "take_to_work",
            AuditAction::Complete => "complete",
            AuditAction::Cancel => "cancel",
        }
    }
}

impl From<ActionKind> for AuditAction {
    fn from(kind: ActionKind) -> Self {
        match kind {
            ActionKind::Assign => AuditAction::Assign,
            ActionKind::TakeToWork => AuditAction::TakeToWork,
            ActionKind::Complete => AuditAction::Complete,
            ActionKind::Cancel => AuditAction::Cancel,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one ticket creation or accepted transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub record_id: Uuid,
    pub action: AuditAction,
    pub ticket: TicketId,
    /// `None` for intake.
    pub prior_status: Option<Status>,
    pub new_status: Status,
    pub prior_assignee: Option<WorkerId>,
    pub new_assignee: Option<WorkerId>,
    /// `None` when the ticket came in through the public intake form.
    pub actor: Option<WorkerId>,
    /// Ticket version after the write.
    pub version: u64,
    pub at: DateTime<Utc>,
}

impl TransitionRecord {
    /// Describe the intake of a fresh ticket.
    pub fn created(ticket: &Ticket) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            action: AuditAction::Create,
            ticket: ticket.id,
            prior_status: None,
            new_status: ticket.status,
            prior_assignee: None,
            new_assignee: ticket.assigned_to,
            actor: None,
            version: ticket.version,
            at: ticket.created_at,
        }
    }

    /// Describe the step from `before` to `after`.
    pub fn between(action: ActionKind, actor: Actor, before: &Ticket, after: &Ticket) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            action: action.into(),
            ticket: after.id,
            prior_status: Some(before.status),
            new_status: after.status,
            prior_assignee: before.assigned_to,
            new_assignee: after.assigned_to,
            actor: Some(actor.id),
            version: after.version,
            at: after.updated_at,
        }
    }
}

/// Receiver of transition records.
///
/// `record` is called while the ticket's row lock is still held, so
/// implementations must return promptly.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &TransitionRecord) -> Result<(), AuditError>;
}

impl<T: AuditSink + ?Sized> AuditSink for Arc<T> {
    fn record(&self, record: &TransitionRecord) -> Result<(), AuditError> {
        (**self).record(record)
    }
}

/// Keeps every record in memory; answers history queries.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<TransitionRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records in emission order.
    pub fn records(&self) -> Vec<TransitionRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Records for one ticket, newest first.
    pub fn history(&self, ticket: TicketId) -> Vec<TransitionRecord> {
        self.select(|r| r.ticket == ticket)
    }

    /// Records produced by one worker, newest first.
    pub fn by_actor(&self, actor: WorkerId) -> Vec<TransitionRecord> {
        self.select(|r| r.actor == Some(actor))
    }

    fn select(&self, keep: impl Fn(&TransitionRecord) -> bool) -> Vec<TransitionRecord> {
        self.records
            .lock()
            .iter()
            .rev()
            .filter(|r| keep(*r))
            .cloned()
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &TransitionRecord) -> Result<(), AuditError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Pushes records onto a bounded queue without waiting.
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    tx: mpsc::Sender<TransitionRecord>,
}

impl ChannelAuditSink {
    /// Create a sink and the receiving end of its queue.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<TransitionRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, record: &TransitionRecord) -> Result<(), AuditError> {
        self.tx.try_send(record.clone()).map_err(|e| match e {
            TrySendError::Full(_) => AuditError::QueueFull,
            TrySendError::Closed(_) => AuditError::Closed,
        })
    }
}

/// Hands each record to every inner sink.
///
/// All sinks are tried; the first failure is reported.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl AuditSink for FanoutSink {
    fn record(&self, record: &TransitionRecord) -> Result<(), AuditError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(record) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
