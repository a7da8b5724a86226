use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ticket::{Role, Status, WorkerId};

/// The four lifecycle actions, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Assign,
    TakeToWork,
    Complete,
    Cancel,
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [
        ActionKind::Assign,
        ActionKind::TakeToWork,
        ActionKind::Complete,
        ActionKind::Cancel,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ActionKind::Assign => "assign",
            ActionKind::TakeToWork => "take_to_work",
            ActionKind::Complete => "complete",
            ActionKind::Cancel => "cancel",
        }
    }

    /// Actions that only the currently assigned master may perform.
    pub const fn requires_assignee(self) -> bool {
        matches!(self, ActionKind::TakeToWork | ActionKind::Complete)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace('-', "_");
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown action `{s}`"))
    }
}

/// A requested lifecycle action together with its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Assign { master: WorkerId },
    TakeToWork,
    Complete,
    Cancel,
}

impl Action {
    pub const fn kind(&self) -> ActionKind {
        match self {
            Action::Assign { .. } => ActionKind::Assign,
            Action::TakeToWork => ActionKind::TakeToWork,
            Action::Complete => ActionKind::Complete,
            Action::Cancel => ActionKind::Cancel,
        }
    }
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub action: ActionKind,
    pub role: Role,
    pub from: &'static [Status],
    pub to: Status,
}

/// Why the state machine refused a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The actor's role may never perform this action.
    Unauthorized {
        action: ActionKind,
        required: Role,
        actual: Role,
    },
    /// The ticket is not in a valid source status for this action.
    ///
    /// `superseded` is set when the current status lies downstream of every
    /// valid source, i.e. someone else already moved the ticket on.
    PreconditionFailed {
        action: ActionKind,
        current: Status,
        superseded: bool,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Unauthorized { action, required, actual } => {
                write!(f, "`{action}` requires role {required}, actor is {actual}")
            }
            Rejection::PreconditionFailed { action, current, .. } => {
                write!(f, "`{action}` is not allowed from status {current}")
            }
        }
    }
}

/// The lifecycle transition table.
pub struct StateMachine;

impl StateMachine {
    /// The single table row for `action`.
    pub const fn rule(action: ActionKind) -> Rule {
        match action {
            ActionKind::Assign => Rule {
                action,
                role: Role::Dispatcher,
                from: &[Status::New],
                to: Status::Assigned,
            },
            ActionKind::TakeToWork => Rule {
                action,
                role: Role::Master,
                from: &[Status::Assigned],
                to: Status::InProgress,
            },
            ActionKind::Complete => Rule {
                action,
                role: Role::Master,
                from: &[Status::InProgress],
                to: Status::Done,
            },
            ActionKind::Cancel => Rule {
                action,
                role: Role::Dispatcher,
                from: &[Status::New, Status::Assigned],
                to: Status::Canceled,
            },
        }
    }

    /// Compute the target status for `action` applied to a ticket in
    /// `current`, performed by an actor holding `role`.
    ///
    /// The role is checked before the source status. This function knows
    /// nothing about storage or assignees.
    pub fn allowed_transition(
        current: Status,
        action: ActionKind,
        role: Role,
    ) -> Result<Status, Rejection> {
        let rule = Self::rule(action);
        if rule.role != role {
            return Err(Rejection::Unauthorized {
                action,
                required: rule.role,
                actual: role,
            });
        }
        if !rule.from.contains(&current) {
            let superseded = rule
                .from
                .iter()
                .any(|&source| current.is_reachable_from(source));
            return Err(Rejection::PreconditionFailed {
                action,
                current,
                superseded,
            });
        }
        Ok(rule.to)
    }
}
