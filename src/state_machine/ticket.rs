use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ticket identity, assigned by the store at intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub u64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a dispatcher or master in the worker directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a ticket.
///
/// The statuses form a DAG: `new → assigned → in_progress → done`, with
/// `new` and `assigned` also able to move to `canceled`. `done` and
/// `canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    New,
    Assigned,
    InProgress,
    Done,
    Canceled,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::New,
        Status::Assigned,
        Status::InProgress,
        Status::Done,
        Status::Canceled,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Status::New => "new",
            Status::Assigned => "assigned",
            Status::InProgress => "in_progress",
            Status::Done => "done",
            Status::Canceled => "canceled",
        }
    }

    /// Statuses reachable in exactly one step.
    pub const fn successors(self) -> &'static [Status] {
        match self {
            Status::New => &[Status::Assigned, Status::Canceled],
            Status::Assigned => &[Status::InProgress, Status::Canceled],
            Status::InProgress => &[Status::Done],
            Status::Done | Status::Canceled => &[],
        }
    }

    pub const fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    /// Whether `self` lies strictly downstream of `origin` in the lifecycle.
    pub fn is_reachable_from(self, origin: Status) -> bool {
        origin
            .successors()
            .iter()
            .any(|&next| next == self || self.is_reachable_from(next))
    }

    /// Whether a ticket in this status must carry an assignee.
    pub const fn requires_assignee(self) -> bool {
        matches!(self, Status::Assigned | Status::InProgress | Status::Done)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown status `{s}`"))
    }
}

/// Role a worker holds in the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Dispatcher,
    Master,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Dispatcher => "dispatcher",
            Role::Master => "master",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dispatcher" => Ok(Role::Dispatcher),
            "master" => Ok(Role::Master),
            other => Err(format!("unknown role `{other}`")),
        }
    }
}

/// An authenticated caller: who is acting and in which role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: WorkerId,
    pub role: Role,
}

impl Actor {
    pub const fn dispatcher(id: WorkerId) -> Self {
        Self { id, role: Role::Dispatcher }
    }

    pub const fn master(id: WorkerId) -> Self {
        Self { id, role: Role::Master }
    }
}

/// A worker record as held by the worker directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub role: Role,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Worker {
    pub fn actor(&self) -> Actor {
        Actor { id: self.id, role: self.role }
    }

    /// Only active masters may receive assignments.
    pub fn is_assignable(&self) -> bool {
        self.active && self.role == Role::Master
    }
}

/// Intake data for a new ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicket {
    pub client_name: String,
    pub phone: String,
    pub address: String,
    pub problem: String,
}

/// A service request and its lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub client_name: String,
    pub phone: String,
    pub address: String,
    pub problem: String,
    pub status: Status,
    pub assigned_to: Option<WorkerId>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Build the initial record for an accepted intake.
    pub fn from_intake(id: TicketId, draft: NewTicket, now: DateTime<Utc>) -> Self {
        Self {
            id,
            client_name: draft.client_name,
            phone: draft.phone,
            address: draft.address,
            problem: draft.problem,
            status: Status::New,
            assigned_to: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Canceled tickets may keep a stale assignee; every other status
    /// carries one exactly when the status requires it.
    pub fn assignment_is_consistent(&self) -> bool {
        match self.status {
            Status::Canceled => true,
            status => status.requires_assignee() == self.assigned_to.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> NewTicket {
        NewTicket {
            client_name: "Anna Petrova".into(),
            phone: "+79001234567".into(),
            address: "Lenina 1, apt 4".into(),
            problem: "Boiler leaks under pressure".into(),
        }
    }

    #[test]
    fn intake_starts_new_unassigned_at_version_one() {
        let ticket = Ticket::from_intake(TicketId(7), draft(), Utc::now());
        assert_eq!(ticket.status, Status::New);
        assert_eq!(ticket.assigned_to, None);
        assert_eq!(ticket.version, 1);
        assert_eq!(ticket.created_at, ticket.updated_at);
        assert!(ticket.assignment_is_consistent());
    }

    #[test]
    fn lifecycle_is_a_dag() {
        for status in Status::ALL {
            assert!(!status.is_reachable_from(status), "{status} reaches itself");
        }
        assert!(Status::Done.is_reachable_from(Status::New));
        assert!(Status::Canceled.is_reachable_from(Status::Assigned));
        assert!(!Status::Canceled.is_reachable_from(Status::InProgress));
        assert!(!Status::New.is_reachable_from(Status::Assigned));
        assert!(Status::Done.is_terminal());
        assert!(Status::Canceled.is_terminal());
        assert!(!Status::InProgress.is_terminal());
    }

    #[test]
    fn assignment_consistency() {
        let mut ticket = Ticket::from_intake(TicketId(1), draft(), Utc::now());
        ticket.status = Status::Assigned;
        assert!(!ticket.assignment_is_consistent());
        ticket.assigned_to = Some(WorkerId(3));
        assert!(ticket.assignment_is_consistent());
        ticket.status = Status::Canceled;
        assert!(ticket.assignment_is_consistent());
        ticket.status = Status::New;
        assert!(!ticket.assignment_is_consistent());
    }

    #[test]
    fn status_parses_and_displays_snake_case() {
        assert_eq!("in_progress".parse::<Status>().unwrap(), Status::InProgress);
        assert_eq!(Status::InProgress.to_string(), "in_progress");
        assert!("finished".parse::<Status>().is_err());
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn only_active_masters_are_assignable() {
        let mut worker = Worker {
            id: WorkerId(2),
            username: "master_a".into(),
            full_name: None,
            role: Role::Master,
            active: true,
        };
        assert!(worker.is_assignable());
        worker.active = false;
        assert!(!worker.is_assignable());
        worker.active = true;
        worker.role = Role::Dispatcher;
        assert!(!worker.is_assignable());
    }

    #[test]
    fn worker_defaults_to_active() {
        let worker: Worker =
            serde_json::from_str(r#"{"id": 4, "username": "m", "role": "master"}"#).unwrap();
        assert!(worker.active);
        assert_eq!(worker.actor(), Actor::master(WorkerId(4)));
    }
}
