//! Interface de terminal do servicedesk: barras de progresso e saída colorida.
//!
//! Usa as crates `indicatif` para acompanhar corridas concorrentes e `console`
//! para estilização com cores. O [`Report`] imprime os resultados de cada
//! passo, as estatísticas e os registros de auditoria.

use std::collections::BTreeMap;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::audit::TransitionRecord;
use crate::script::{Outcome, StepReport};
use crate::state_machine::Status;
use crate::stats::Stats;

/// Barra de progresso para N requisições concorrentes sobre o mesmo ticket.
pub struct RaceProgress {
    pb: ProgressBar,
}

impl RaceProgress {
    /// Inicia a barra com o total de competidores.
    pub fn start(racers: u64) -> Self {
        let pb = ProgressBar::new(racers);
        let style = ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        pb.set_style(style);
        pb.set_message("racing for the lock");
        Self { pb }
    }

    /// Marca uma requisição como concluída.
    pub fn finish_one(&self) {
        self.pb.inc(1);
    }

    /// Finaliza e limpa a barra.
    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

/// Impressão estilizada dos resultados de um cenário.
pub struct Report {
    // Estilo verde para transições aceitas.
    green: Style,
    // Estilo vermelho para rejeições.
    red: Style,
    // Estilo amarelo para avisos (auditoria degradada).
    yellow: Style,
    // Estilo esmaecido para detalhes.
    dim: Style,
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

impl Report {
    pub fn new() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }

    /// Imprime um passo: ação, ator e a contagem de resultados por classe.
    pub fn step(&self, index: usize, report: &StepReport) {
        let step = &report.step;
        let fanout = if step.concurrency > 1 {
            format!(" ×{}", step.concurrency)
        } else {
            String::new()
        };
        println!(
            "{} ticket {} {}{} by worker {}",
            self.dim.apply_to(format!("[{:>2}]", index + 1)),
            step.ticket,
            step.action,
            fanout,
            step.actor
        );
        for (label, count) in report.tally() {
            let style = if label == "ok" { &self.green } else { &self.red };
            println!("       {} {count}", style.apply_to(label));
        }
        if let Some(detail) = Self::first_rejection(&report.outcomes) {
            println!("       {}", self.dim.apply_to(detail));
        }
        for outcome in &report.outcomes {
            if let Outcome::Accepted { warning: Some(class), .. } = outcome {
                println!("       {} {class}", self.yellow.apply_to("⚠"));
            }
        }
    }

    /// Imprime o total e a contagem por status.
    pub fn stats(&self, stats: &Stats) {
        println!();
        println!("{}", self.green.apply_to("─── Stats ───"));
        println!("  total        {}", stats.total);
        for status in Status::ALL {
            println!("  {:<12} {}", status.as_str(), stats.count(status));
        }
    }

    /// Imprime os registros de auditoria em JSON formatado.
    pub fn audit(&self, records: &[TransitionRecord]) {
        println!();
        println!("{}", self.yellow.apply_to("─── Audit Records ───"));
        for record in records {
            println!("{}", serde_json::to_string(record).unwrap_or_default());
        }
    }

    /// Imprime o placar de uma corrida.
    pub fn race(&self, tally: &BTreeMap<&'static str, usize>, version_before: u64, version_after: u64) {
        println!("{}", self.green.apply_to("─── Race Result ───"));
        for (label, count) in tally {
            let style = if *label == "ok" { &self.green } else { &self.red };
            println!("  {:<16} {count}", style.apply_to(label));
        }
        println!("  version          {version_before} → {version_after}");
    }

    fn first_rejection(outcomes: &[Outcome]) -> Option<&str> {
        outcomes.iter().find_map(|outcome| match outcome {
            Outcome::Rejected { message, .. } => Some(message.as_str()),
            Outcome::Accepted { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    #[test]
    fn first_rejection_skips_accepted() {
        let outcomes = vec![
            Outcome::Accepted {
                status: Status::InProgress,
                version: 3,
                warning: None,
            },
            Outcome::Rejected {
                class: ErrorClass::Conflict,
                message: "already in_progress".into(),
            },
        ];
        assert_eq!(Report::first_rejection(&outcomes), Some("already in_progress"));
        assert_eq!(Report::first_rejection(&outcomes[..1]), None);
    }
}
