use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state_machine::{ActionKind, Rejection, Status, TicketId, WorkerId};

/// Failures of a single lifecycle transition.
///
/// Every variant except [`Storage`](TransitionError::Storage) leaves the
/// store untouched.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("ticket {0} not found")]
    NotFound(TicketId),

    #[error("ticket {ticket} is not assigned to worker {actor}")]
    Forbidden { ticket: TicketId, actor: WorkerId },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("ticket {ticket} cannot `{action}`: status is already {current}")]
    Conflict {
        ticket: TicketId,
        action: ActionKind,
        current: Status,
    },

    #[error("worker {worker} cannot receive assignments: {reason}")]
    InvalidTarget { worker: WorkerId, reason: String },

    #[error("timed out after {waited:?} waiting for the lock on ticket {ticket}")]
    Timeout { ticket: TicketId, waited: Duration },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl TransitionError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TransitionError::NotFound(_) => ErrorClass::NotFound,
            TransitionError::Forbidden { .. } => ErrorClass::Forbidden,
            TransitionError::InvalidRequest(_) => ErrorClass::InvalidRequest,
            TransitionError::Conflict { .. } => ErrorClass::Conflict,
            TransitionError::InvalidTarget { .. } => ErrorClass::InvalidTarget,
            TransitionError::Timeout { .. } => ErrorClass::Timeout,
            TransitionError::Storage(StoreError::VersionConflict { .. }) => ErrorClass::Conflict,
            TransitionError::Storage(_) => ErrorClass::Storage,
        }
    }

    /// Map a state-machine rejection for `ticket` to the caller-facing class:
    /// a ticket that already moved past the source status lost a race,
    /// anything else is a malformed request.
    pub fn from_rejection(ticket: TicketId, rejection: Rejection) -> Self {
        match rejection {
            Rejection::PreconditionFailed {
                action,
                current,
                superseded: true,
            } => TransitionError::Conflict {
                ticket,
                action,
                current,
            },
            other => TransitionError::InvalidRequest(format!("ticket {ticket}: {other}")),
        }
    }
}

/// Failures reported by a [`TicketStore`](crate::store::TicketStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("version conflict on ticket {ticket}: expected {expected}, found {found}")]
    VersionConflict {
        ticket: TicketId,
        expected: u64,
        found: u64,
    },

    #[error("row lock is held for ticket {held}, not {requested}")]
    LockMismatch { held: TicketId, requested: TicketId },

    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Failures handing a record to an [`AuditSink`](crate::audit::AuditSink).
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit queue is full")]
    QueueFull,

    #[error("audit queue is closed")]
    Closed,

    #[error("audit sink rejected the record: {0}")]
    Rejected(String),
}

/// Stable, caller-facing classification of failures and warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorClass {
    NotFound,
    Forbidden,
    InvalidRequest,
    Conflict,
    InvalidTarget,
    Timeout,
    AuditDegraded,
    Storage,
}

impl ErrorClass {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorClass::NotFound => "not-found",
            ErrorClass::Forbidden => "forbidden",
            ErrorClass::InvalidRequest => "invalid-request",
            ErrorClass::Conflict => "conflict",
            ErrorClass::InvalidTarget => "invalid-target",
            ErrorClass::Timeout => "timeout",
            ErrorClass::AuditDegraded => "audit-degraded",
            ErrorClass::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-fatal conditions attached to an accepted transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionWarning {
    /// The transition committed but its audit record was not delivered.
    AuditDegraded(String),
}

impl TransitionWarning {
    pub fn class(&self) -> ErrorClass {
        match self {
            TransitionWarning::AuditDegraded(_) => ErrorClass::AuditDegraded,
        }
    }
}

impl fmt::Display for TransitionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionWarning::AuditDegraded(reason) => write!(f, "audit degraded: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superseded_rejection_is_a_conflict() {
        let err = TransitionError::from_rejection(
            TicketId(4),
            Rejection::PreconditionFailed {
                action: ActionKind::TakeToWork,
                current: Status::InProgress,
                superseded: true,
            },
        );
        assert_eq!(err.class(), ErrorClass::Conflict);
        assert_eq!(
            err.to_string(),
            "ticket #4 cannot `take_to_work`: status is already in_progress"
        );
    }

    #[test]
    fn premature_or_wrong_role_is_invalid_request() {
        let premature = TransitionError::from_rejection(
            TicketId(4),
            Rejection::PreconditionFailed {
                action: ActionKind::Complete,
                current: Status::Assigned,
                superseded: false,
            },
        );
        assert_eq!(premature.class(), ErrorClass::InvalidRequest);

        let wrong_role = TransitionError::from_rejection(
            TicketId(4),
            Rejection::Unauthorized {
                action: ActionKind::Assign,
                required: crate::state_machine::Role::Dispatcher,
                actual: crate::state_machine::Role::Master,
            },
        );
        assert_eq!(wrong_role.class(), ErrorClass::InvalidRequest);
    }

    #[test]
    fn classes_render_kebab_case() {
        assert_eq!(ErrorClass::InvalidTarget.to_string(), "invalid-target");
        assert_eq!(
            serde_json::to_string(&ErrorClass::AuditDegraded).unwrap(),
            "\"audit-degraded\""
        );
        let warning = TransitionWarning::AuditDegraded("queue full".into());
        assert_eq!(warning.class(), ErrorClass::AuditDegraded);
        assert_eq!(warning.to_string(), "audit degraded: queue full");
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TransitionError>();
        assert_send_sync::<StoreError>();
        assert_send_sync::<AuditError>();
    }
}
