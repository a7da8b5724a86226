mod cli;

use std::collections::BTreeMap;
use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::{JoinHandle, JoinSet};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cli::{Cli, Command};
use servicedesk::audit::webhook::{ForwardReport, WebhookForwarder};
use servicedesk::audit::{ChannelAuditSink, FanoutSink, MemoryAuditSink};
use servicedesk::config::DeskConfig;
use servicedesk::script::{self, Scenario};
use servicedesk::state_machine::{Actor, NewTicket, Role, TicketId, Worker, WorkerId};
use servicedesk::ui::{RaceProgress, Report};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = DeskConfig::load()?;
    if let Some(ms) = cli.lock_timeout_ms {
        config.lock_timeout_ms = ms;
    }

    let audit = AuditPipeline::start(&config)?;
    let result = match cli.command {
        Command::Demo { audit: show_audit } => {
            run_scenario(Scenario::demo()?, &config, &audit, false, show_audit).await
        }
        Command::Race { racers } => race(racers, &config, &audit).await,
        Command::Run {
            file,
            json,
            audit: show_audit,
        } => {
            let scenario = Scenario::from_path(&file)?;
            run_scenario(scenario, &config, &audit, json, show_audit).await
        }
    };
    audit.shutdown().await;
    result
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("SERVICEDESK_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "servicedesk=debug,warn"
        } else {
            "servicedesk=warn"
        })
    });

    let format = env::var("SERVICEDESK_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Audit sinks shared by every desk the binary builds: an in-process copy for
/// printing, plus a webhook queue when one is configured.
struct AuditPipeline {
    memory: Arc<MemoryAuditSink>,
    sink: Arc<FanoutSink>,
    forwarder: Option<JoinHandle<ForwardReport>>,
}

impl AuditPipeline {
    fn start(config: &DeskConfig) -> Result<Self> {
        let memory = Arc::new(MemoryAuditSink::new());
        let mut fanout = FanoutSink::new().with(memory.clone());
        let mut forwarder = None;

        if let Some(url) = &config.audit_webhook_url {
            let (channel, rx) = ChannelAuditSink::bounded(config.audit_buffer);
            let webhook = WebhookForwarder::new(url.clone(), config.webhook_timeout())
                .context("failed to build audit webhook client")?;
            forwarder = Some(webhook.spawn(rx));
            fanout = fanout.with(Arc::new(channel));
            tracing::info!(url = %url, "forwarding audit records");
        }

        Ok(Self {
            memory,
            sink: Arc::new(fanout),
            forwarder,
        })
    }

    /// Close the queue and wait for pending webhook deliveries.
    async fn shutdown(self) {
        let Self { sink, forwarder, .. } = self;
        drop(sink);
        if let Some(handle) = forwarder {
            match handle.await {
                Ok(report) => tracing::info!(
                    delivered = report.delivered,
                    failed = report.failed,
                    "audit forwarding finished"
                ),
                Err(e) => tracing::warn!(error = %e, "audit forwarder stopped abnormally"),
            }
        }
    }
}

async fn run_scenario(
    scenario: Scenario,
    config: &DeskConfig,
    audit: &AuditPipeline,
    json: bool,
    show_audit: bool,
) -> Result<()> {
    let desk = Arc::new(scenario.seed(Arc::clone(&audit.sink), config.lock_timeout())?);
    let report = script::run_steps(desk, &scenario.steps).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let ui = Report::new();
    for (index, step) in report.steps.iter().enumerate() {
        ui.step(index, step);
    }
    ui.stats(&report.stats);
    if show_audit {
        ui.audit(&audit.memory.records());
    }
    Ok(())
}

async fn race(racers: usize, config: &DeskConfig, audit: &AuditPipeline) -> Result<()> {
    let dispatcher = Actor::dispatcher(WorkerId(1));
    let master = Actor::master(WorkerId(2));
    let scenario = Scenario {
        workers: vec![
            Worker {
                id: dispatcher.id,
                username: "dispatcher".into(),
                full_name: None,
                role: Role::Dispatcher,
                active: true,
            },
            Worker {
                id: master.id,
                username: "master".into(),
                full_name: None,
                role: Role::Master,
                active: true,
            },
        ],
        tickets: vec![NewTicket {
            client_name: "Race Client".into(),
            phone: "+70000000000".into(),
            address: "Contention Lane 1".into(),
            problem: "Everyone wants this job at once".into(),
        }],
        steps: Vec::new(),
    };
    let desk = Arc::new(scenario.seed(Arc::clone(&audit.sink), config.lock_timeout())?);
    let ticket = TicketId(1);
    let version_before = desk.assign(ticket, master.id, dispatcher).await?.ticket.version;

    let racers = racers.max(1);
    let progress = RaceProgress::start(racers as u64);
    let mut set = JoinSet::new();
    for _ in 0..racers {
        let desk = Arc::clone(&desk);
        set.spawn(async move { desk.take_to_work(ticket, master).await });
    }

    let mut tally: BTreeMap<&'static str, usize> = BTreeMap::new();
    while let Some(joined) = set.join_next().await {
        let label = match joined.context("racer task panicked")? {
            Ok(_) => "ok",
            Err(e) => e.class().as_str(),
        };
        *tally.entry(label).or_insert(0) += 1;
        progress.finish_one();
    }
    progress.finish();

    let version_after = desk.find(ticket)?.version;
    Report::new().race(&tally, version_before, version_after);
    Ok(())
}
