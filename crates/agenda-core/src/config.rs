use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_SMTP_TIMEOUT_SECS: u64 = 20;

/// Top-level config (agenda.toml + AGENDA_* and SMTP_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgendaConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds to sleep between two reminder cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Outgoing mail server settings. Empty strings mean "not configured"; the
/// email channel reports them as missing at send time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Sender address placed in the `From` header.
    #[serde(default)]
    pub from: String,
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
    /// Log reminders instead of sending them.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_SMTP_PORT,
            user: String::new(),
            password: String::new(),
            from: String::new(),
            timeout_secs: DEFAULT_SMTP_TIMEOUT_SECS,
            dry_run: false,
        }
    }
}

impl SmtpConfig {
    /// Names of the required settings that are still empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.host.is_empty() {
            missing.push("SMTP_HOST");
        }
        if self.user.is_empty() {
            missing.push("SMTP_USER");
        }
        if self.password.is_empty() {
            missing.push("SMTP_PASSWORD");
        }
        if self.from.is_empty() {
            missing.push("SMTP_FROM");
        }
        missing
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}
fn default_smtp_timeout() -> u64 {
    DEFAULT_SMTP_TIMEOUT_SECS
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.agenda/agenda.db", home)
}

impl AgendaConfig {
    /// Load config from a TOML file with env var overrides.
    ///
    /// Precedence (last wins):
    ///   1. the TOML file (explicit path, else ~/.agenda/agenda.toml)
    ///   2. `SMTP_HOST`, `SMTP_PORT`, ... mapped into `[smtp]`
    ///   3. `AGENDA_<SECTION>__<KEY>`, e.g. `AGENDA_SCHEDULER__POLL_INTERVAL_SECS=30`
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        if !std::path::Path::new(&path).exists() {
            tracing::debug!(path = %path, "config file not found, using defaults and env");
        }

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::AgendaError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("SMTP_").map(|key| format!("smtp.{key}").into()))
            .merge(Env::prefixed("AGENDA_").split("__"))
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.scheduler.poll_interval_secs)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.agenda/agenda.toml", home)
}
