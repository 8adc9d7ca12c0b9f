use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lib_axis::core::dispatcher::{DEFAULT_EVICTION_THRESHOLD, DEFAULT_MAILBOX_CAPACITY};
use lib_axis::core::store::STATE_FILE_NAME;
use lib_axis::inventory::WorkspaceEndpoints;
use lib_axis::SchedulerConfig;

const DEFAULT_CONFIG_FILE: &str = "server_axis.conf";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
const DEFAULT_POLL_PERIOD_TICKS: u32 = 60;

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Axis operator console server", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "AXIS_PORT", help = "Port to listen on for HTTP clients.")]
    pub port: Option<u16>,

    #[clap(long, env = "AXIS_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "AXIS_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "AXIS_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "AXIS_STATE_FILE", help = "Path of the persisted mode/status document.")]
    pub state_file: Option<PathBuf>,

    #[clap(long, env = "AXIS_STATIC_DIR", help = "Directory with the built web UI.")]
    pub static_dir: Option<PathBuf>,

    #[clap(long, env = "AXIS_TICK_INTERVAL_MS", help = "Scheduler tick interval in milliseconds.")]
    pub tick_interval_ms: Option<u64>,

    #[clap(long, env = "AXIS_POLL_PERIOD_TICKS", help = "Ticks between two registry snapshots.")]
    pub poll_period_ticks: Option<u32>,

    #[clap(long, env = "AXIS_MAILBOX_CAPACITY", help = "Messages buffered per event subscriber.")]
    pub mailbox_capacity: Option<usize>,

    #[clap(long, env = "AXIS_EVICTION_THRESHOLD", help = "Consecutive dropped messages before a subscriber is evicted (0 disables).")]
    pub eviction_threshold: Option<usize>,

    #[clap(long, env = "AXIS_KEEP_BASE_URL", help = "Base URL of the Keep API.")]
    pub keep_base_url: Option<String>,

    #[clap(long, env = "AXIS_DRIVE_BASE_URL", help = "Base URL of the Drive API.")]
    pub drive_base_url: Option<String>,

    #[clap(long, env = "AXIS_DOCS_BASE_URL", help = "Base URL of the Docs API.")]
    pub docs_base_url: Option<String>,

    #[clap(long, env = "AXIS_SHEETS_BASE_URL", help = "Base URL of the Sheets API.")]
    pub sheets_base_url: Option<String>,

    #[clap(long, env = "AXIS_DIRECTORY_BASE_URL", help = "Base URL of the Admin Directory API.")]
    pub directory_base_url: Option<String>,

    #[clap(long, env = "AXIS_ACCESS_TOKEN", hide_env_values = true, help = "OAuth bearer token for the Workspace APIs.")]
    #[serde(skip_serializing)]
    pub access_token: Option<String>,

    #[clap(long, env = "AXIS_USER_EMAIL", help = "Email of the operator whose profile is shown.")]
    pub user_email: Option<String>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            state_file: other.state_file.or(self.state_file),
            static_dir: other.static_dir.or(self.static_dir),
            tick_interval_ms: other.tick_interval_ms.or(self.tick_interval_ms),
            poll_period_ticks: other.poll_period_ticks.or(self.poll_period_ticks),
            mailbox_capacity: other.mailbox_capacity.or(self.mailbox_capacity),
            eviction_threshold: other.eviction_threshold.or(self.eviction_threshold),
            keep_base_url: other.keep_base_url.or(self.keep_base_url),
            drive_base_url: other.drive_base_url.or(self.drive_base_url),
            docs_base_url: other.docs_base_url.or(self.docs_base_url),
            sheets_base_url: other.sheets_base_url.or(self.sheets_base_url),
            directory_base_url: other.directory_base_url.or(self.directory_base_url),
            access_token: other.access_token.or(self.access_token),
            user_email: other.user_email.or(self.user_email),
        }
    }

    fn defaults() -> Config {
        let endpoints = WorkspaceEndpoints::default();
        Config {
            port: Some(DEFAULT_PORT),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            state_file: Some(PathBuf::from(STATE_FILE_NAME)),
            static_dir: Some(PathBuf::from("./web/dist")),
            tick_interval_ms: Some(DEFAULT_TICK_INTERVAL_MS),
            poll_period_ticks: Some(DEFAULT_POLL_PERIOD_TICKS),
            mailbox_capacity: Some(DEFAULT_MAILBOX_CAPACITY),
            eviction_threshold: Some(DEFAULT_EVICTION_THRESHOLD),
            keep_base_url: Some(endpoints.keep),
            drive_base_url: Some(endpoints.drive),
            docs_base_url: Some(endpoints.docs),
            sheets_base_url: Some(endpoints.sheets),
            directory_base_url: Some(endpoints.directory),
            ..Default::default()
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn log_dir(&self) -> &Path {
        self.log_dir.as_deref().unwrap_or(Path::new("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(STATE_FILE_NAME))
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: Duration::from_millis(
                self.tick_interval_ms.unwrap_or(DEFAULT_TICK_INTERVAL_MS).max(1),
            ),
            period_ticks: self.poll_period_ticks.unwrap_or(DEFAULT_POLL_PERIOD_TICKS),
        }
    }

    pub fn mailbox_capacity(&self) -> usize {
        self.mailbox_capacity.unwrap_or(DEFAULT_MAILBOX_CAPACITY)
    }

    pub fn eviction_threshold(&self) -> usize {
        self.eviction_threshold.unwrap_or(DEFAULT_EVICTION_THRESHOLD)
    }

    pub fn endpoints(&self) -> WorkspaceEndpoints {
        let defaults = WorkspaceEndpoints::default();
        WorkspaceEndpoints {
            keep: self.keep_base_url.clone().unwrap_or(defaults.keep),
            drive: self.drive_base_url.clone().unwrap_or(defaults.drive),
            docs: self.docs_base_url.clone().unwrap_or(defaults.docs),
            sheets: self.sheets_base_url.clone().unwrap_or(defaults.sheets),
            directory: self.directory_base_url.clone().unwrap_or(defaults.directory),
        }
    }
}

pub fn load_config() -> Config {
    load_config_from(Config::parse())
}

/// Defaults < config file < environment / CLI.
pub fn load_config_from(cli: Config) -> Config {
    // The config file location itself may come from the CLI or the environment.
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();

    if config_file_path.exists() {
        match fs::read_to_string(&config_file_path) {
            Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
                Ok(file_config) => current_config = current_config.merge(file_config),
                Err(e) => log::warn!(
                    "Failed to parse config file {}: {}. Falling back to other sources.",
                    config_file_path.display(),
                    e
                ),
            },
            Err(e) => log::warn!(
                "Failed to read config file {}: {}. Falling back to other sources.",
                config_file_path.display(),
                e
            ),
        }
    } else {
        log::info!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            config_file_path.display()
        );
    }

    current_config.merge(cli)
}
