// Configuration loading (watch.toml, credentials.toml) and env overrides.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use draftwatch_core::watcher::RetryPolicy;
use draftwatch_football::rankings::ScoringFormat;

pub const DRAFT_ID_ENV: &str = "DRAFTWATCH_DRAFT_ID";
pub const ANTHROPIC_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const FANTASYPROS_KEY_ENV: &str = "FANTASYPROS_API_KEY";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// watch.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct WatchFile {
    draft: DraftSection,
    #[serde(default)]
    polling: PollingConfig,
    league: LeagueSection,
    #[serde(default)]
    rankings: RankingsConfig,
    llm: LlmConfig,
    #[serde(default)]
    database: DatabaseSection,
}

/// Which draft to watch and which seat is the user's. The seat is either
/// given explicitly (`draft_position` + `roster_id`) or resolved from the
/// draft order via `sleeper_user_id`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DraftSection {
    #[serde(default)]
    pub draft_id: String,
    #[serde(default)]
    pub sleeper_user_id: Option<String>,
    #[serde(default)]
    pub draft_position: Option<u32>,
    #[serde(default)]
    pub roster_id: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollingConfig {
    pub poll_interval_secs: u64,
    pub fetch_timeout_ms: u64,
    pub retry_base_delay_ms: u64,
    pub max_consecutive_failures: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        PollingConfig {
            poll_interval_secs: 5,
            fetch_timeout_ms: 4000,
            retry_base_delay_ms: 1000,
            max_consecutive_failures: 5,
        }
    }
}

impl PollingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_consecutive_failures: self.max_consecutive_failures,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LeagueSection {
    #[serde(default)]
    pub scoring: ScoringFormat,
    #[serde(default)]
    pub superflex: bool,
    #[serde(default)]
    pub starters: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RankingsConfig {
    pub ttl_hours: u64,
    pub seed_path: Option<String>,
}

impl Default for RankingsConfig {
    fn default() -> Self {
        RankingsConfig {
            ttl_hours: 6,
            seed_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LlmConfig {
    pub model: String,
    pub max_tokens: u32,
    /// Request a recommendation when this many picks remain before the
    /// user's turn. 0 disables the early request.
    #[serde(default = "default_prefire_at")]
    pub prefire_at: u32,
}

fn default_prefire_at() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize, Default)]
struct DatabaseSection {
    /// Empty or missing means the platform data directory.
    #[serde(default)]
    path: Option<String>,
}

// ---------------------------------------------------------------------------
// credentials.toml
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct CredentialsConfig {
    pub anthropic_api_key: Option<String>,
    pub fantasypros_api_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Values taken from the environment, applied over the files.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub draft_id: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub fantasypros_api_key: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        EnvOverrides {
            draft_id: var(DRAFT_ID_ENV),
            anthropic_api_key: var(ANTHROPIC_KEY_ENV),
            fantasypros_api_key: var(FANTASYPROS_KEY_ENV),
        }
    }
}

// ---------------------------------------------------------------------------
// Assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub draft: DraftSection,
    pub polling: PollingConfig,
    pub league: LeagueSection,
    pub rankings: RankingsConfig,
    pub llm: LlmConfig,
    pub credentials: CredentialsConfig,
    pub db_path: PathBuf,
}

/// Load and validate `config/watch.toml` and (optionally)
/// `config/credentials.toml` under `base_dir`. Does not copy defaults.
pub fn load_config_from(base_dir: &Path, env: &EnvOverrides) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    let watch_path = config_dir.join("watch.toml");
    let watch_text = read_file(&watch_path)?;
    let watch: WatchFile = toml::from_str(&watch_text).map_err(|e| ConfigError::ParseError {
        path: watch_path.clone(),
        source: e,
    })?;

    let credentials_path = config_dir.join("credentials.toml");
    let mut credentials: CredentialsConfig = if credentials_path.exists() {
        let text = read_file(&credentials_path)?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let mut draft = watch.draft;
    if let Some(id) = &env.draft_id {
        draft.draft_id = id.clone();
    }
    if env.anthropic_api_key.is_some() {
        credentials.anthropic_api_key = env.anthropic_api_key.clone();
    }
    if env.fantasypros_api_key.is_some() {
        credentials.fantasypros_api_key = env.fantasypros_api_key.clone();
    }

    let db_path = match watch.database.path.filter(|p| !p.trim().is_empty()) {
        Some(p) => PathBuf::from(p),
        None => default_db_path()?,
    };

    let config = Config {
        draft,
        polling: watch.polling,
        league: watch.league,
        rankings: watch.rankings,
        llm: watch.llm,
        credentials,
        db_path,
    };
    validate(&config)?;
    Ok(config)
}

/// Copy missing files from `defaults/` into `config/`, skipping
/// `.example` templates. Returns the files copied.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    let mut copied = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| ConfigError::DefaultsCopyError {
                message: format!("failed to read defaults entry: {e}"),
            })?
            .path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }

        let target = config_dir.join(file_name);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }
    Ok(copied)
}

/// Load config relative to the working directory, copying defaults first
/// and applying environment overrides.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd, &EnvOverrides::from_env())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn default_db_path() -> Result<PathBuf, ConfigError> {
    directories::ProjectDirs::from("", "", "draftwatch")
        .map(|dirs| dirs.data_dir().join("draftwatch.db"))
        .ok_or_else(|| invalid("database.path", "no home directory; set an explicit path"))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.draft.draft_id.trim().is_empty() {
        return Err(invalid(
            "draft.draft_id",
            format!("must be set in watch.toml or via {DRAFT_ID_ENV}"),
        ));
    }

    let has_position = config.draft.draft_position.is_some();
    let has_user = config
        .draft
        .sleeper_user_id
        .as_deref()
        .is_some_and(|u| !u.trim().is_empty());
    if !has_position && !has_user {
        return Err(invalid(
            "draft.draft_position",
            "set draft_position or sleeper_user_id to identify the user's seat",
        ));
    }
    if config.draft.draft_position == Some(0) {
        return Err(invalid("draft.draft_position", "must be 1-based"));
    }
    if config.draft.roster_id == Some(0) {
        return Err(invalid("draft.roster_id", "must be greater than 0"));
    }

    let polling = &config.polling;
    let polling_fields: &[(&str, u64)] = &[
        ("polling.poll_interval_secs", polling.poll_interval_secs),
        ("polling.fetch_timeout_ms", polling.fetch_timeout_ms),
        ("polling.retry_base_delay_ms", polling.retry_base_delay_ms),
        (
            "polling.max_consecutive_failures",
            u64::from(polling.max_consecutive_failures),
        ),
    ];
    for (name, val) in polling_fields {
        if *val == 0 {
            return Err(invalid(name, "must be greater than 0"));
        }
    }

    if config.rankings.ttl_hours == 0 {
        return Err(invalid("rankings.ttl_hours", "must be greater than 0"));
    }
    if config.llm.model.trim().is_empty() {
        return Err(invalid("llm.model", "must not be empty"));
    }
    if config.llm.max_tokens == 0 {
        return Err(invalid("llm.max_tokens", "must be greater than 0"));
    }

    Ok(())
}
