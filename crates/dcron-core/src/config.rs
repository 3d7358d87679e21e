//! Configuration — layered YAML file plus environment variable overrides, following the
//! teacher's `mofa_kernel::config` loading idiom (`config::Config::builder()` stacking a `File`
//! source under an `Environment` source).

use config::{Config as ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::error::{DcronError, DcronResult};

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const CONFIG_PATH_ENV_VAR: &str = "CONFIG_PATH";
const ENV_PREFIX: &str = "DCRON";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
}

impl Default for StoreBackend {
    fn default() -> Self {
        Self::Memory
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_redis_host")]
    pub redis_host: String,
    #[serde(default)]
    pub redis_db: i64,
}

fn default_redis_host() -> String {
    "redis://127.0.0.1:6379".into()
}

/// Kept even though the concrete broker client is out of scope (§4.10) — the configuration
/// surface for a future NSQ-backed `Publisher` is not itself a Non-goal.
#[derive(Debug, Clone, Deserialize)]
pub struct PubsubConfig {
    #[serde(default = "default_event_channel")]
    pub event_channel: String,
    #[serde(default = "default_broker_host")]
    pub broker_host: String,
    #[serde(default = "default_max_inflight")]
    pub max_inflight: u32,
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_max_requeue_delay_ms")]
    pub max_requeue_delay_ms: u64,
}

fn default_event_channel() -> String {
    "dgua_event_channel".into()
}
fn default_broker_host() -> String {
    "127.0.0.1:4150".into()
}
fn default_max_inflight() -> u32 {
    50
}
fn default_dial_timeout_ms() -> u64 {
    1_000
}
fn default_max_attempts() -> u32 {
    5
}
fn default_max_requeue_delay_ms() -> u64 {
    15 * 60 * 1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerPoolConfig {
    #[serde(default = "default_pool_size")]
    pub size: usize,
    #[serde(default = "default_max_open")]
    pub max_open: usize,
    #[serde(default = "default_idle")]
    pub idle: usize,
    #[serde(default = "default_life_time_secs")]
    pub life_time_secs: u64,
}

fn default_pool_size() -> usize {
    16
}
fn default_max_open() -> usize {
    64
}
fn default_idle() -> usize {
    8
}
fn default_life_time_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct DcronConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub pubsub: PubsubConfig,
    #[serde(default)]
    pub worker_pool: WorkerPoolConfig,
    #[serde(default = "default_grace_shutdown_secs")]
    pub grace_shutdown_secs: u64,
}

fn default_grace_shutdown_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_host: default_redis_host(),
            redis_db: 0,
        }
    }
}

impl Default for PubsubConfig {
    fn default() -> Self {
        Self {
            event_channel: default_event_channel(),
            broker_host: default_broker_host(),
            max_inflight: default_max_inflight(),
            dial_timeout_ms: default_dial_timeout_ms(),
            max_attempts: default_max_attempts(),
            max_requeue_delay_ms: default_max_requeue_delay_ms(),
        }
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
            max_open: default_max_open(),
            idle: default_idle(),
            life_time_secs: default_life_time_secs(),
        }
    }
}

impl Default for DcronConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            pubsub: PubsubConfig::default(),
            worker_pool: WorkerPoolConfig::default(),
            grace_shutdown_secs: default_grace_shutdown_secs(),
        }
    }
}

/// Loads configuration from `path` (if it exists) layered under `DCRON_*` environment overrides
/// (e.g. `DCRON_SERVER__PORT=9090`). A missing file is not an error — defaults plus environment
/// take over, matching the teacher's lenient `File` source behavior.
pub fn load(path: &str) -> DcronResult<DcronConfig> {
    let builder = ConfigBuilder::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let built = builder
        .build()
        .map_err(|e| DcronError::Store(format!("config load error: {e}")))?;

    built
        .try_deserialize()
        .map_err(|e| DcronError::Store(format!("config parse error: {e}")))
}

/// Resolves the configuration path from `--config <path>` CLI args, falling back to
/// `CONFIG_PATH`, falling back to `config.yaml`.
pub fn resolve_config_path(args: &[String]) -> String {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            if let Some(path) = iter.next() {
                return path.clone();
            }
        }
    }
    std::env::var(CONFIG_PATH_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_file_absent() {
        let cfg = load("/nonexistent/path/config.yaml").unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.pubsub.event_channel, "dgua_event_channel");
    }

    #[test]
    fn resolve_config_path_prefers_cli_flag() {
        let args = vec!["--config".to_string(), "custom.yaml".to_string()];
        assert_eq!(resolve_config_path(&args), "custom.yaml");
    }

    #[test]
    fn resolve_config_path_falls_back_to_default() {
        // SAFETY: test-local env mutation, no concurrent readers of CONFIG_PATH in this process.
        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV_VAR);
        }
        assert_eq!(resolve_config_path(&[]), DEFAULT_CONFIG_PATH);
    }
}
