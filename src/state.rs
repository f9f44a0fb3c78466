use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::db::RapportDb;
use crate::error::AppError;
use crate::locks::UserLocks;
use crate::notification::{sender_from_config, NotificationSender, RetryPolicy};
use crate::sent_registry::SentRegistry;
use crate::types::{Config, ExecutionRecord, ExecutionTrigger, JobId};

/// Maximum number of execution records to keep in memory
const MAX_HISTORY_SIZE: usize = 100;

/// Environment variable that overrides `telegram.botToken`.
pub const BOT_TOKEN_ENV: &str = "RAPPORT_BOT_TOKEN";

/// Process-wide state shared by the scheduler, the executor and the CLI.
pub struct AppState {
    pub config: RwLock<Config>,
    pub db: Mutex<RapportDb>,
    pub sender: Arc<dyn NotificationSender>,
    pub retry_policy: RetryPolicy,
    pub user_locks: UserLocks,
    pub sent_registry: SentRegistry,
    pub execution_history: Mutex<Vec<ExecutionRecord>>,
    pub last_scheduled_run: Mutex<HashMap<JobId, DateTime<Utc>>>,
    /// Where execution history is persisted. `None` keeps it in memory only.
    state_dir: Option<PathBuf>,
}

impl AppState {
    /// Build state from already-constructed collaborators. History is not
    /// persisted.
    pub fn new(config: Config, db: RapportDb, sender: Arc<dyn NotificationSender>) -> Self {
        Self {
            config: RwLock::new(config),
            db: Mutex::new(db),
            sender,
            retry_policy: RetryPolicy::default(),
            user_locks: UserLocks::new(),
            sent_registry: SentRegistry::new(),
            execution_history: Mutex::new(Vec::new()),
            last_scheduled_run: Mutex::new(HashMap::new()),
            state_dir: None,
        }
    }

    /// Load `~/.rapport/config.json`, open the database and pick a sender.
    pub fn initialize() -> Result<Self, AppError> {
        let config = load_config()?;
        let db_path = RapportDb::path_for(config.database_path.as_deref())?;
        let db = RapportDb::open_at(db_path)?;
        let sender = sender_from_config(&config.telegram)?;

        Ok(Self::new(config, db, sender).with_state_dir(get_state_dir()?))
    }

    /// Persist execution history under `dir`, starting from what is already
    /// saved there.
    pub fn with_state_dir(mut self, dir: PathBuf) -> Self {
        let history = load_execution_history(&dir).unwrap_or_else(|e| {
            log::warn!("State: could not load execution history: {}", e);
            Vec::new()
        });
        if let Ok(mut guard) = self.execution_history.lock() {
            *guard = history;
        }
        self.state_dir = Some(dir);
        self
    }

    /// Snapshot of the current config.
    pub fn config(&self) -> Config {
        self.config
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// The configured timezone, used to decide what "today" is.
    pub fn timezone(&self) -> Result<Tz, AppError> {
        parse_timezone(&self.config().timezone)
    }

    /// The calendar date at `now` in the configured timezone.
    pub fn today(&self, now: DateTime<Utc>) -> Result<NaiveDate, AppError> {
        Ok(now.with_timezone(&self.timezone()?).date_naive())
    }

    /// Add an execution record to history. Kept in memory until it finishes.
    pub fn add_execution_record(&self, record: ExecutionRecord) {
        if let Ok(mut guard) = self.execution_history.lock() {
            guard.insert(0, record);

            if guard.len() > MAX_HISTORY_SIZE {
                guard.truncate(MAX_HISTORY_SIZE);
            }
        }
    }

    /// Update an existing execution record. History is written to disk once
    /// the record is marked finished.
    pub fn update_execution_record(&self, id: &str, f: impl FnOnce(&mut ExecutionRecord)) {
        let mut finished = false;
        if let Ok(mut guard) = self.execution_history.lock() {
            if let Some(record) = guard.iter_mut().find(|r| r.id == id) {
                f(record);
                finished = record.finished_at.is_some();
            }
        }

        if finished {
            self.persist_history();
        }
    }

    /// Most recent executions first
    pub fn get_execution_history(&self, limit: usize) -> Vec<ExecutionRecord> {
        self.execution_history
            .lock()
            .map(|guard| guard.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Record when a scheduled run last occurred
    pub fn set_last_scheduled_run(&self, job: JobId, time: DateTime<Utc>) {
        if let Ok(mut guard) = self.last_scheduled_run.lock() {
            guard.insert(job, time);
        }
    }

    pub fn get_last_scheduled_run(&self, job: JobId) -> Option<DateTime<Utc>> {
        self.last_scheduled_run
            .lock()
            .ok()
            .and_then(|guard| guard.get(&job).cloned())
    }

    fn persist_history(&self) {
        let Some(dir) = &self.state_dir else { return };
        if let Err(e) = self.save_execution_history(dir) {
            log::warn!("State: failed to save execution history: {}", e);
        }
    }

    fn save_execution_history(&self, dir: &Path) -> Result<(), String> {
        let history = self
            .execution_history
            .lock()
            .map_err(|_| "Lock poisoned")?
            .clone();

        let content =
            serde_json::to_string_pretty(&history).map_err(|e| format!("Serialize error: {}", e))?;
        fs::write(dir.join("execution_history.json"), content)
            .map_err(|e| format!("Write error: {}", e))?;
        Ok(())
    }
}

/// Get the canonical config file path (~/.rapport/config.json)
pub fn config_path() -> Result<PathBuf, AppError> {
    let home = dirs::home_dir()
        .ok_or_else(|| AppError::Configuration("Could not find home directory".to_string()))?;
    Ok(home.join(".rapport").join("config.json"))
}

/// Get the state directory (~/.rapport), creating it if needed
fn get_state_dir() -> Result<PathBuf, AppError> {
    let home = dirs::home_dir()
        .ok_or_else(|| AppError::Configuration("Could not find home directory".to_string()))?;
    let state_dir = home.join(".rapport");

    if !state_dir.exists() {
        fs::create_dir_all(&state_dir).map_err(|e| {
            AppError::Configuration(format!("Failed to create state dir: {}", e))
        })?;
    }

    Ok(state_dir)
}

/// Load configuration from ~/.rapport/config.json, falling back to defaults
/// when the file does not exist.
pub fn load_config() -> Result<Config, AppError> {
    let config = load_config_from(&config_path()?)?;
    let config = apply_env_overrides(config, std::env::var(BOT_TOKEN_ENV).ok());
    validate_config(&config)?;
    Ok(config)
}

/// Read and parse a config file. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, AppError> {
    if !path.exists() {
        log::info!("Config: {} not found, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| AppError::Configuration(format!("Failed to read config: {}", e)))?;
    serde_json::from_str(&content)
        .map_err(|e| AppError::Configuration(format!("Failed to parse config: {}", e)))
}

/// A non-empty bot token from the environment replaces the file's.
pub fn apply_env_overrides(mut config: Config, env_token: Option<String>) -> Config {
    if let Some(token) = env_token.filter(|t| !t.trim().is_empty()) {
        config.telegram.bot_token = Some(token);
    }
    config
}

/// Reject configs the scheduler or drivers could not run with.
pub fn validate_config(config: &Config) -> Result<(), AppError> {
    parse_timezone(&config.timezone)?;
    let scan = &config.schedules.reminder_scan;
    parse_timezone(&scan.timezone)?;
    crate::scheduler::parse_cron(&scan.cron)?;
    if config.event_reminder_lead_minutes <= 0 {
        return Err(AppError::Configuration(
            "eventReminderLeadMinutes must be positive".to_string(),
        ));
    }
    if config.sent_registry_ttl_minutes <= 0 {
        return Err(AppError::Configuration(
            "sentRegistryTtlMinutes must be positive".to_string(),
        ));
    }
    Ok(())
}

pub fn parse_timezone(name: &str) -> Result<Tz, AppError> {
    name.parse::<Tz>()
        .map_err(|_| AppError::Configuration(format!("Invalid timezone: {}", name)))
}

fn load_execution_history(dir: &Path) -> Result<Vec<ExecutionRecord>, String> {
    let path = dir.join("execution_history.json");
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(&path).map_err(|e| format!("Read error: {}", e))?;
    serde_json::from_str(&content).map_err(|e| format!("Parse error: {}", e))
}

/// Create a new execution record
pub fn create_execution_record(job: JobId, trigger: ExecutionTrigger) -> ExecutionRecord {
    ExecutionRecord {
        id: uuid::Uuid::new_v4().to_string(),
        job,
        started_at: Utc::now(),
        finished_at: None,
        success: false,
        summary: None,
        error_message: None,
        trigger,
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use crate::db::test_utils::test_db;
    use crate::notification::LogSender;

    /// State over a fresh temp database, logging instead of sending.
    pub fn test_state() -> AppState {
        AppState::new(Config::default(), test_db(), Arc::new(LogSender))
    }
}
