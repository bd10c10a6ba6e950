//! Configuration loading and validation.
//!
//! Loads taskdesk configuration from `./config.toml` (or `$TASKDESK_CONFIG`).
//! Environment variables override file values; file values override defaults.
//! A `.env` file in the working directory is read first, so secrets and
//! overrides can live there.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Telegram bot settings.
    pub telegram: TelegramConfig,
    /// Who holds system-wide rights.
    pub access: AccessConfig,
    /// SQLite location and pool size.
    pub database: DatabaseConfig,
    /// Overdue reminder loop.
    pub reminders: RemindersConfig,
    /// Read-only web dashboard.
    pub dashboard: DashboardConfig,
    /// Filesystem paths.
    pub paths: PathsConfig,
    /// Task listing behaviour.
    pub tasks: TasksConfig,
}

/// Telegram-specific configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Environment variable name holding the bot token.
    pub bot_token_env: String,
    /// Token resolved from `bot_token_env` at load time. Never read from TOML.
    #[serde(skip)]
    pub bot_token: Option<String>,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token_env", &self.bot_token_env)
            .field("bot_token", &self.bot_token.as_ref().map(|_| "__REDACTED__"))
            .finish()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token_env: default_bot_token_env(),
            bot_token: None,
        }
    }
}

/// Access control configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Telegram user ids with super admin rights.
    pub super_admin_ids: Vec<i64>,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file.
    pub path: PathBuf,
    /// Connection pool size.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/taskdesk.db"),
            max_connections: default_max_connections(),
        }
    }
}

/// Overdue reminder configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemindersConfig {
    /// Run the reminder loop alongside the bot.
    pub enabled: bool,
    /// Seconds between reminder ticks.
    pub interval_secs: u64,
    /// Optional cron expression gating reminder passes (seconds field first).
    pub check_cron: Option<String>,
    /// Offset of local wall-clock time from UTC, in hours. Deadlines are
    /// entered and compared in this local time.
    pub utc_offset_hours: i32,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_reminder_interval(),
            check_cron: None,
            utc_offset_hours: 0,
        }
    }
}

impl RemindersConfig {
    /// Fixed offset for local deadline time.
    ///
    /// # Errors
    ///
    /// Returns an error if the offset is outside the -12..=14 hour range.
    pub fn offset(&self) -> Result<FixedOffset> {
        if !(-12..=14).contains(&self.utc_offset_hours) {
            anyhow::bail!(
                "utc_offset_hours must be between -12 and 14, got {}",
                self.utc_offset_hours
            );
        }
        let seconds = self
            .utc_offset_hours
            .checked_mul(3600)
            .context("utc offset overflow")?;
        FixedOffset::east_opt(seconds).context("invalid utc offset")
    }

    /// Convert a UTC instant to local wall-clock time.
    pub fn local_naive(&self, now: DateTime<Utc>) -> NaiveDateTime {
        match self.offset() {
            Ok(offset) => now.with_timezone(&offset).naive_local(),
            Err(_) => now.naive_utc(),
        }
    }
}

/// Dashboard configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Serve the dashboard alongside the bot.
    pub enabled: bool,
    /// Socket address to bind.
    pub bind: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_dashboard_bind(),
        }
    }
}

/// Filesystem paths.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory for rolling JSON logs.
    pub logs_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("logs"),
        }
    }
}

/// Task listing configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    /// Maximum tasks shown in one list.
    pub list_limit: usize,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            list_limit: default_list_limit(),
        }
    }
}

fn default_bot_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".to_owned()
}
fn default_max_connections() -> u32 {
    5
}
fn default_reminder_interval() -> u64 {
    3600
}
fn default_dashboard_bind() -> String {
    "127.0.0.1:8080".to_owned()
}
fn default_list_limit() -> usize {
    20
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Reads `.env` first if present. Config file path: `$TASKDESK_CONFIG`
    /// or `./config.toml`. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "failed to read .env"),
        }

        let path = config_path_with(|key| std::env::var(key).ok());
        let mut config = Self::load_from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from a TOML file only, no env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("failed to parse config at {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config at {}: {e}",
                path.display()
            )),
        }
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("failed to parse config TOML")
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function so tests need not touch the process env.
    /// Invalid values are logged and ignored.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        self.telegram.bot_token = env(&self.telegram.bot_token_env).filter(|t| !t.is_empty());

        if let Some(v) = env("SUPER_ADMIN_ID") {
            match parse_id_list(&v) {
                Ok(ids) => self.access.super_admin_ids = ids,
                Err(_) => tracing::warn!(
                    var = "SUPER_ADMIN_ID",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }

        if let Some(v) = env("TASKDESK_DATABASE") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = env("TASKDESK_LOGS_DIR") {
            self.paths.logs_dir = PathBuf::from(v);
        }
        if let Some(v) = env("TASKDESK_DASHBOARD_BIND") {
            self.dashboard.bind = v;
            self.dashboard.enabled = true;
        }

        if let Some(v) = env("TASKDESK_REMINDER_INTERVAL_SECS") {
            match v.parse() {
                Ok(n) => self.reminders.interval_secs = n,
                Err(_) => tracing::warn!(
                    var = "TASKDESK_REMINDER_INTERVAL_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("TASKDESK_UTC_OFFSET_HOURS") {
            match v.parse() {
                Ok(n) => self.reminders.utc_offset_hours = n,
                Err(_) => tracing::warn!(
                    var = "TASKDESK_UTC_OFFSET_HOURS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.reminders.interval_secs == 0 {
            anyhow::bail!("reminders.interval_secs must be positive");
        }
        if let Some(ref expr) = self.reminders.check_cron {
            cron::Schedule::from_str(expr)
                .map_err(|e| anyhow::anyhow!("invalid reminders.check_cron '{expr}': {e}"))?;
        }
        self.reminders.offset()?;
        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be positive");
        }
        if self.tasks.list_limit == 0 {
            anyhow::bail!("tasks.list_limit must be positive");
        }
        Ok(())
    }

    /// Whether a user id is configured as super admin.
    pub fn is_super_admin(&self, user_id: i64) -> bool {
        self.access.super_admin_ids.contains(&user_id)
    }

    /// The bot token, required for anything that talks to Telegram.
    ///
    /// # Errors
    ///
    /// Returns an error naming the env var when the token is absent.
    pub fn require_bot_token(&self) -> Result<&str> {
        self.telegram.bot_token.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "bot token not set: export {} or add it to .env",
                self.telegram.bot_token_env
            )
        })
    }
}

/// Resolve the config file path using a custom env resolver.
pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
    env("TASKDESK_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

/// Parse a comma-separated list of user ids, skipping blanks.
///
/// # Errors
///
/// Returns an error if any entry is not an integer.
pub fn parse_id_list(value: &str) -> Result<Vec<i64>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .with_context(|| format!("invalid user id '{s}'"))
        })
        .collect()
}
