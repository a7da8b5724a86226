//! Configuração do servicedesk carregada a partir de `servicedesk.toml`.
//!
//! A struct [`DeskConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `SERVICEDESK_AUDIT_WEBHOOK` tem precedência sobre o arquivo.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Nome do arquivo de configuração procurado no diretório atual.
pub const CONFIG_FILE: &str = "servicedesk.toml";

/// Variável de ambiente que sobrescreve a URL do webhook de auditoria.
pub const WEBHOOK_ENV: &str = "SERVICEDESK_AUDIT_WEBHOOK";

/// Configuração de nível superior carregada de `servicedesk.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct DeskConfig {
    /// Tempo máximo de espera pelo lock de um ticket, em milissegundos.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Capacidade da fila de registros de auditoria.
    #[serde(default = "default_audit_buffer")]
    pub audit_buffer: usize,

    /// URL que recebe cada registro de transição via POST.
    #[serde(default)]
    pub audit_webhook_url: Option<String>,

    /// Timeout de cada entrega ao webhook, em milissegundos.
    #[serde(default = "default_webhook_timeout_ms")]
    pub webhook_timeout_ms: u64,
}

// Valor padrão para a espera pelo lock: 5000ms.
fn default_lock_timeout_ms() -> u64 {
    5000
}

// Valor padrão para a fila de auditoria: 1024 registros.
fn default_audit_buffer() -> usize {
    1024
}

// Valor padrão para o timeout do webhook: 3000ms.
fn default_webhook_timeout_ms() -> u64 {
    3000
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            audit_buffer: default_audit_buffer(),
            audit_webhook_url: None,
            webhook_timeout_ms: default_webhook_timeout_ms(),
        }
    }
}

impl DeskConfig {
    /// Carrega a configuração de `servicedesk.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(Path::new(CONFIG_FILE))?;

        // Variável de ambiente tem precedência sobre o arquivo para o webhook.
        if let Some(url) = std::env::var(WEBHOOK_ENV).ok().filter(|url| !url.is_empty()) {
            config.audit_webhook_url = Some(url);
        }

        Ok(config)
    }

    /// Carrega a configuração de um caminho explícito, sem consultar o ambiente.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = toml::from_str::<DeskConfig>(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_millis(self.webhook_timeout_ms)
    }
}
