use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::error::Result;
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorConfig {
    #[serde(default = "default_supervisor_host")]
    pub host: String,
    #[serde(default = "default_supervisor_port")]
    pub port: u16,
    /// Public URL workers use to reach this supervisor.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Registry file; relative paths resolve against the base directory.
    #[serde(default = "default_registry_path")]
    pub registry_path: String,
    #[serde(default = "default_sender_name")]
    pub sender_name: String,
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,
    /// Background aggregate health probing interval. 0 disables it.
    #[serde(default)]
    pub health_interval_secs: u64,
}

fn default_supervisor_host() -> String {
    "localhost".to_string()
}

fn default_supervisor_port() -> u16 {
    8000
}

fn default_registry_path() -> String {
    "supervisor/registry.json".to_string()
}

fn default_sender_name() -> String {
    "SupervisorAgent_Main".to_string()
}

fn default_task_timeout() -> u64 {
    30
}

fn default_health_timeout() -> u64 {
    5
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            host: default_supervisor_host(),
            port: default_supervisor_port(),
            base_url: None,
            registry_path: default_registry_path(),
            sender_name: default_sender_name(),
            task_timeout_secs: default_task_timeout(),
            health_timeout_secs: default_health_timeout(),
            health_interval_secs: 0,
        }
    }
}

impl SupervisorConfig {
    pub fn base_url(&self) -> String {
        match self.base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => format!("http://{}:{}", self.host, self.port),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerConfig {
    #[serde(default = "default_worker_name")]
    pub name: String,
    #[serde(default = "default_worker_host")]
    pub host: String,
    #[serde(default = "default_worker_port")]
    pub port: u16,
    /// URL advertised to the supervisor at registration.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_worker_supervisor_url")]
    pub supervisor_url: String,
    #[serde(default = "default_auto_register")]
    pub auto_register: bool,
    #[serde(default = "default_register_timeout")]
    pub register_timeout_secs: u64,
}

fn default_worker_name() -> String {
    "SmartCampusEnergyAgent".to_string()
}

fn default_worker_host() -> String {
    "localhost".to_string()
}

fn default_worker_port() -> u16 {
    8001
}

fn default_worker_supervisor_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_auto_register() -> bool {
    true
}

fn default_register_timeout() -> u64 {
    5
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: default_worker_name(),
            host: default_worker_host(),
            port: default_worker_port(),
            base_url: None,
            supervisor_url: default_worker_supervisor_url(),
            auto_register: default_auto_register(),
            register_timeout_secs: default_register_timeout(),
        }
    }
}

impl WorkerConfig {
    pub fn base_url(&self) -> String {
        match self.base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => format!("http://{}:{}", self.host, self.port),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LtmBackendKind {
    Sqlite,
    File,
}

impl LtmBackendKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Some(LtmBackendKind::Sqlite),
            "file" | "json" => Some(LtmBackendKind::File),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LtmBackendKind::Sqlite => "sqlite",
            LtmBackendKind::File => "file",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LtmConfig {
    #[serde(default = "default_ltm_backend")]
    pub backend: LtmBackendKind,
    #[serde(default = "default_ltm_path")]
    pub path: String,
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u32,
    /// Background compaction interval. 0 disables it.
    #[serde(default = "default_compact_interval")]
    pub compact_interval_secs: u64,
}

fn default_ltm_backend() -> LtmBackendKind {
    LtmBackendKind::Sqlite
}

fn default_ltm_path() -> String {
    "worker/ltm.db".to_string()
}

fn default_ttl_days() -> u32 {
    30
}

fn default_compact_interval() -> u64 {
    3600
}

impl Default for LtmConfig {
    fn default() -> Self {
        Self {
            backend: default_ltm_backend(),
            path: default_ltm_path(),
            ttl_days: default_ttl_days(),
            compact_interval_secs: default_compact_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub ltm: LtmConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply process environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the environment in
    /// production, a map in tests). Unparseable numbers are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SUPERVISOR_HOST") {
            self.supervisor.host = v;
        }
        if let Some(v) = lookup("SUPERVISOR_PORT") {
            match v.parse() {
                Ok(port) => self.supervisor.port = port,
                Err(_) => warn!(value = %v, "Ignoring invalid SUPERVISOR_PORT"),
            }
        }
        if let Some(v) = lookup("SUPERVISOR_BASE_URL") {
            self.supervisor.base_url = Some(v.clone());
            self.worker.supervisor_url = v;
        }
        if let Some(v) = lookup("REGISTRY_PATH") {
            self.supervisor.registry_path = v;
        }
        if let Some(v) = lookup("AGENT_HOST") {
            self.worker.host = v;
        }
        if let Some(v) = lookup("AGENT_PORT") {
            match v.parse() {
                Ok(port) => self.worker.port = port,
                Err(_) => warn!(value = %v, "Ignoring invalid AGENT_PORT"),
            }
        }
        if let Some(v) = lookup("AGENT_BASE_URL") {
            self.worker.base_url = Some(v);
        }
        if let Some(v) = lookup("LTM_TYPE") {
            match LtmBackendKind::from_str(&v) {
                Some(kind) => self.ltm.backend = kind,
                None => warn!(value = %v, "Ignoring unknown LTM_TYPE"),
            }
        }
        if let Some(v) = lookup("LTM_PATH") {
            self.ltm.path = v;
        }
    }
}
