//! Interface de linha de comando do servicedesk baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (demo, race, run)
//! e flags globais (--lock-timeout-ms, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// servicedesk: núcleo de transições de tickets seguro contra corridas.
#[derive(Debug, Parser)]
#[command(name = "servicedesk", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Tempo máximo de espera pelo lock de um ticket, em milissegundos.
    #[arg(long, global = true)]
    pub lock_timeout_ms: Option<u64>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa a demonstração embutida do ciclo de vida.
    Demo {
        /// Imprime também os registros de auditoria.
        #[arg(long)]
        audit: bool,
    },

    /// Dispara N requisições `take_to_work` concorrentes sobre um único ticket.
    Race {
        /// Número de requisições concorrentes.
        #[arg(long, short = 'n', default_value_t = 10)]
        racers: usize,
    },

    /// Executa um cenário a partir de um arquivo JSON ou TOML.
    Run {
        /// Caminho para o arquivo de cenário.
        file: PathBuf,

        /// Emite o relatório completo em JSON em vez de texto.
        #[arg(long)]
        json: bool,

        /// Imprime também os registros de auditoria.
        #[arg(long)]
        audit: bool,
    },
}
