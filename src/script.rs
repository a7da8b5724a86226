//! Scenario files: seed workers and tickets, then replay lifecycle steps.
//!
//! A scenario is TOML or JSON (chosen by file extension). A step with
//! `concurrency = N` fires N identical requests at once, which is how the
//! race behaviour is exercised from the command line.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::audit::AuditSink;
use crate::coordinator::TransitionCoordinator;
use crate::desk::ServiceDesk;
use crate::directory::{MemoryDirectory, WorkerDirectory};
use crate::error::ErrorClass;
use crate::state_machine::{Action, ActionKind, NewTicket, Status, TicketId, Worker, WorkerId};
use crate::stats::Stats;
use crate::store::MemoryStore;

/// Desk wired to in-process collaborators, as built from a scenario.
pub type ScenarioDesk<A> = ServiceDesk<MemoryStore, A, MemoryDirectory>;

const DEMO: &str = include_str!("demo.toml");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub workers: Vec<Worker>,
    /// Created in order, so the first ticket gets id 1.
    #[serde(default)]
    pub tickets: Vec<NewTicket>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub ticket: TicketId,
    pub action: ActionKind,
    pub actor: WorkerId,
    /// Assignment target; required for `assign`.
    #[serde(default)]
    pub master: Option<WorkerId>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    1
}

impl Step {
    fn action(&self) -> Result<Action> {
        Ok(match self.action {
            ActionKind::Assign => {
                let Some(master) = self.master else {
                    bail!("step on ticket {}: `assign` needs a `master`", self.ticket);
                };
                Action::Assign { master }
            }
            ActionKind::TakeToWork => Action::TakeToWork,
            ActionKind::Complete => Action::Complete,
            ActionKind::Cancel => Action::Cancel,
        })
    }
}

/// What one request of a step produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Accepted {
        status: Status,
        version: u64,
        warning: Option<ErrorClass>,
    },
    Rejected {
        class: ErrorClass,
        message: String,
    },
}

impl Outcome {
    /// `"ok"` or the error class name.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Accepted { .. } => "ok",
            Outcome::Rejected { class, .. } => class.as_str(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: Step,
    pub outcomes: Vec<Outcome>,
}

impl StepReport {
    /// Count of outcomes per label.
    pub fn tally(&self) -> BTreeMap<&'static str, usize> {
        let mut tally = BTreeMap::new();
        for outcome in &self.outcomes {
            *tally.entry(outcome.label()).or_insert(0) += 1;
        }
        tally
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub steps: Vec<StepReport>,
    pub stats: Stats,
}

impl Scenario {
    /// The built-in walkthrough: assignment, ten racing masters, a wrong
    /// master, an inactive target and a double cancel.
    pub fn demo() -> Result<Self> {
        toml::from_str(DEMO).context("built-in demo scenario is malformed")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let scenario = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?,
            _ => toml::from_str(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?,
        };
        Ok(scenario)
    }

    /// Build a desk seeded with this scenario's workers and tickets.
    pub fn seed<A: AuditSink>(&self, audit: A, lock_timeout: Duration) -> Result<ScenarioDesk<A>> {
        let directory = MemoryDirectory::new(self.workers.iter().cloned());
        let coordinator = TransitionCoordinator::new(MemoryStore::new(), audit, directory)
            .with_lock_timeout(lock_timeout);
        let desk = ServiceDesk::new(coordinator);
        for draft in &self.tickets {
            desk.create_ticket(draft.clone())
                .with_context(|| format!("failed to seed ticket for {}", draft.client_name))?;
        }
        Ok(desk)
    }
}

/// Replay `steps` in order against `desk`.
pub async fn run_steps<A>(desk: Arc<ScenarioDesk<A>>, steps: &[Step]) -> Result<ScenarioReport>
where
    A: AuditSink + 'static,
{
    let mut reports = Vec::with_capacity(steps.len());
    for step in steps {
        let action = step.action()?;
        let actor = desk
            .coordinator()
            .directory()
            .find_worker(step.actor)
            .with_context(|| format!("step on ticket {}: unknown actor {}", step.ticket, step.actor))?
            .actor();

        let handles: Vec<_> = (0..step.concurrency.max(1))
            .map(|_| {
                let desk = Arc::clone(&desk);
                let ticket = step.ticket;
                tokio::spawn(async move { desk.apply(ticket, action, actor).await })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            let outcome = match handle.await.context("step task panicked")? {
                Ok(applied) => Outcome::Accepted {
                    status: applied.ticket.status,
                    version: applied.ticket.version,
                    warning: applied.warning.map(|w| w.class()),
                },
                Err(e) => Outcome::Rejected {
                    class: e.class(),
                    message: e.to_string(),
                },
            };
            outcomes.push(outcome);
        }
        reports.push(StepReport {
            step: step.clone(),
            outcomes,
        });
    }

    let stats = desk.stats()?;
    Ok(ScenarioReport {
        steps: reports,
        stats,
    })
}
