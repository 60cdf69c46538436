//! Application configuration.

use serde::Deserialize;
use std::path::Path;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Application configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    /// Health endpoint configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// External vote service configuration.
    #[validate(nested)]
    pub vote_api: VoteApiConfig,
    /// Telegram bot configuration.
    pub telegram: TelegramConfig,
    /// Governance thresholds consumed by the tally.
    #[serde(default)]
    #[validate(nested)]
    pub governance: GovernanceConfig,
    /// Settlement schedule.
    #[serde(default)]
    #[validate(nested)]
    pub scheduler: SchedulerSettings,
}

/// Health endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// External polling service configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VoteApiConfig {
    /// Base URL of the vote service, e.g. `http://vote-api:8000`.
    #[validate(url)]
    pub url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

/// Telegram bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot token of the governance bot.
    pub bot_token: String,
    /// Bot API base URL.
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,
    /// Chat that approved members are invited into.
    pub members_chat_id: i64,
    /// Chat that promoted seeders are invited into.
    pub seeders_chat_id: i64,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

/// How votes from identities that resolve to no known user are tallied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedVoterPolicy {
    /// Count their yes/no votes, but never toward quorum.
    #[default]
    Count,
    /// Drop their votes entirely.
    Exclude,
}

/// Governance thresholds.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GovernanceConfig {
    /// Community name used in notifications.
    #[serde(default = "default_community_name")]
    pub community_name: String,
    /// Fraction of the seeder roster that must vote.
    #[serde(default = "default_quorum_fraction")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub quorum_fraction: f64,
    /// Cap on the number of seeders required for quorum.
    #[serde(default = "default_max_required_seeders")]
    pub max_required_seeders: u32,
    /// Minimum share of cast yes/no votes that must be "yes".
    #[serde(default = "default_min_yes_fraction")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_yes_fraction: f64,
    /// Floor on yes votes regardless of the fraction.
    #[serde(default = "default_min_absolute_yes_votes")]
    pub min_absolute_yes_votes: u32,
    /// Fraction of the whole seeder roster whose "yes" overrides any "no".
    #[serde(default = "default_yes_override_fraction")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub yes_override_fraction: f64,
    /// Length of the voting window.
    #[serde(default = "default_voting_duration_days")]
    #[validate(range(min = 1))]
    pub voting_duration_days: u32,
    /// Minimum gap between a failed nomination and the next one for the same person.
    #[serde(default = "default_renomination_cooldown_days")]
    pub renomination_cooldown_days: u32,
    /// Treatment of votes from unknown identities.
    #[serde(default)]
    pub unresolved_voters: UnresolvedVoterPolicy,
    /// Telegram nicknames granted the seeder role at startup.
    #[serde(default)]
    pub initial_seeders: Vec<String>,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            community_name: default_community_name(),
            quorum_fraction: default_quorum_fraction(),
            max_required_seeders: default_max_required_seeders(),
            min_yes_fraction: default_min_yes_fraction(),
            min_absolute_yes_votes: default_min_absolute_yes_votes(),
            yes_override_fraction: default_yes_override_fraction(),
            voting_duration_days: default_voting_duration_days(),
            renomination_cooldown_days: default_renomination_cooldown_days(),
            unresolved_voters: UnresolvedVoterPolicy::default(),
            initial_seeders: Vec::new(),
        }
    }
}

/// Settlement schedule.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SchedulerSettings {
    /// Whether the daily settlement pass runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Hour of the daily pass (UTC).
    #[serde(default = "default_settlement_hour")]
    #[validate(range(max = 23))]
    pub settlement_hour_utc: u32,
    /// Minute of the daily pass (UTC).
    #[serde(default = "default_settlement_minute")]
    #[validate(range(max = 59))]
    pub settlement_minute_utc: u32,
    /// Timeout applied to every store, vote and messenger call during a pass.
    #[serde(default = "default_io_timeout_secs")]
    #[validate(range(min = 1))]
    pub io_timeout_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            settlement_hour_utc: default_settlement_hour(),
            settlement_minute_utc: default_settlement_minute(),
            io_timeout_secs: default_io_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8080
}

const fn default_max_connections() -> u32 {
    10
}

const fn default_min_connections() -> u32 {
    1
}

const fn default_request_timeout_secs() -> u64 {
    10
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_community_name() -> String {
    "the community".to_string()
}

const fn default_quorum_fraction() -> f64 {
    0.3
}

const fn default_max_required_seeders() -> u32 {
    10
}

const fn default_min_yes_fraction() -> f64 {
    0.5
}

const fn default_min_absolute_yes_votes() -> u32 {
    1
}

const fn default_yes_override_fraction() -> f64 {
    0.5
}

const fn default_voting_duration_days() -> u32 {
    7
}

const fn default_renomination_cooldown_days() -> u32 {
    90
}

const fn default_true() -> bool {
    true
}

const fn default_settlement_hour() -> u32 {
    12
}

const fn default_settlement_minute() -> u32 {
    10
}

const fn default_io_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `ACCORD_ENV`)
    /// 4. Environment variables with `ACCORD_` prefix
    ///
    /// Thresholds are validated before the configuration is returned.
    pub fn load() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        let env = std::env::var("ACCORD_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("ACCORD")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("governance.initial_seeders"),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.check()?;
        tracing::debug!(environment = %env, "Configuration loaded");
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("ACCORD")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("governance.initial_seeders"),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    /// Validate all sections, reporting failures as configuration errors.
    pub fn check(&self) -> AppResult<()> {
        self.validate()
            .map_err(|e| AppError::Config(format!("invalid configuration: {e}")))
    }
}
