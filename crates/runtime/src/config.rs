//! The runtime's configuration layer.
//!
//! `PREFIX_FIELD_SUBFIELD`-style environment overrides are usually applied
//! by walking a config struct's fields reflectively. Rust has no portable
//! runtime reflection, so this uses an explicit **schema** instead: a
//! registered list of `(dotted_path, setter)` pairs built once at startup.
//! Applying overrides means walking that schema and, for each entry whose
//! environment variable is set, invoking the setter with a coerced value.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use verge_logstore::Durability;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
    #[error("env override {key}: {reason}")]
    EnvOverride { key: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSection {
    pub executor_workers: usize,
    pub executor_queue: usize,
    pub default_mailbox_capacity: usize,
}

impl Default for BusSection {
    fn default() -> Self {
        Self { executor_workers: 10, executor_queue: 1000, default_mailbox_capacity: 100 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLoopSection {
    pub queue_depth: usize,
}

impl Default for EventLoopSection {
    fn default() -> Self {
        Self { queue_depth: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestSection {
    pub min_timeout_ms: u64,
    pub max_timeout_ms: u64,
}

impl Default for RequestSection {
    fn default() -> Self {
        Self { min_timeout_ms: 1, max_timeout_ms: 5 * 60 * 1000 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DurabilityMode {
    Memory,
    Fsync,
}

impl From<DurabilityMode> for Durability {
    fn from(mode: DurabilityMode) -> Self {
        match mode {
            DurabilityMode::Memory => Durability::Memory,
            DurabilityMode::Fsync => Durability::Fsync,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub dir: PathBuf,
    pub durability: DurabilityMode,
    pub max_segment_bytes: u64,
    pub max_buffered_bytes: usize,
    pub queue_capacity: usize,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/log"),
            durability: DurabilityMode::Fsync,
            max_segment_bytes: 64 * 1024 * 1024,
            max_buffered_bytes: 16 * 1024 * 1024,
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VmSection {
    pub call_stack_limit: usize,
}

impl Default for VmSection {
    fn default() -> Self {
        Self { call_stack_limit: 1000 }
    }
}

/// Root configuration, deserialized from YAML or JSON (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RuntimeConfig {
    pub bus: BusSection,
    pub event_loop: EventLoopSection,
    pub request: RequestSection,
    pub log: LogSection,
    pub vm: VmSection,
}

impl RuntimeConfig {
    /// Loads a `RuntimeConfig` from a file, dispatching on extension
    /// (`.yaml`/`.yml` vs everything else, parsed as JSON).
    pub fn load_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read { path: path.clone(), source })?;
        Self::parse(&raw, is_yaml(&path)).map_err(|source| ConfigError::Parse { path, source })
    }

    fn parse(raw: &str, yaml: bool) -> Result<Self, ParseError> {
        if yaml {
            Ok(serde_yaml::from_str(raw)?)
        } else {
            Ok(serde_json::from_str(raw)?)
        }
    }

    pub fn event_loop_queue_depth(&self) -> usize {
        self.event_loop.queue_depth
    }

    pub fn request_timeout_bounds(&self) -> (Duration, Duration) {
        (Duration::from_millis(self.request.min_timeout_ms), Duration::from_millis(self.request.max_timeout_ms))
    }
}

fn is_yaml(path: &std::path::Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// One `(dotted_path, setter)` entry in the environment-override schema.
/// `setter` receives the raw string value already confirmed present in the
/// environment and applies whatever coercion its field needs.
pub struct EnvOverride {
    pub path: &'static str,
    setter: Box<dyn Fn(&mut RuntimeConfig, &str) -> Result<(), String> + Send + Sync>,
}

impl EnvOverride {
    pub fn new(
        path: &'static str,
        setter: impl Fn(&mut RuntimeConfig, &str) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self { path, setter: Box::new(setter) }
    }
}

/// The default schema covering every field a production deployment
/// typically overrides per-environment. Extra entries can be appended by
/// callers that add their own config sections.
pub fn default_schema() -> Vec<EnvOverride> {
    vec![
        EnvOverride::new("bus.executor_workers", |cfg, v| {
            cfg.bus.executor_workers = parse_usize(v)?;
            Ok(())
        }),
        EnvOverride::new("bus.executor_queue", |cfg, v| {
            cfg.bus.executor_queue = parse_usize(v)?;
            Ok(())
        }),
        EnvOverride::new("bus.default_mailbox_capacity", |cfg, v| {
            cfg.bus.default_mailbox_capacity = parse_usize(v)?;
            Ok(())
        }),
        EnvOverride::new("event_loop.queue_depth", |cfg, v| {
            cfg.event_loop.queue_depth = parse_usize(v)?;
            Ok(())
        }),
        EnvOverride::new("request.min_timeout_ms", |cfg, v| {
            cfg.request.min_timeout_ms = parse_u64(v)?;
            Ok(())
        }),
        EnvOverride::new("request.max_timeout_ms", |cfg, v| {
            cfg.request.max_timeout_ms = parse_u64(v)?;
            Ok(())
        }),
        EnvOverride::new("log.dir", |cfg, v| {
            cfg.log.dir = PathBuf::from(v);
            Ok(())
        }),
        EnvOverride::new("log.durability", |cfg, v| {
            cfg.log.durability = match v.to_ascii_lowercase().as_str() {
                "memory" => DurabilityMode::Memory,
                "fsync" => DurabilityMode::Fsync,
                other => return Err(format!("unknown durability mode {other:?}")),
            };
            Ok(())
        }),
        EnvOverride::new("log.max_segment_bytes", |cfg, v| {
            cfg.log.max_segment_bytes = parse_u64(v)?;
            Ok(())
        }),
        EnvOverride::new("log.max_buffered_bytes", |cfg, v| {
            cfg.log.max_buffered_bytes = parse_usize(v)?;
            Ok(())
        }),
        EnvOverride::new("vm.call_stack_limit", |cfg, v| {
            cfg.vm.call_stack_limit = parse_usize(v)?;
            Ok(())
        }),
    ]
}

fn parse_usize(raw: &str) -> Result<usize, String> {
    raw.parse().map_err(|_| format!("{raw:?} is not a valid unsigned integer"))
}

fn parse_u64(raw: &str) -> Result<u64, String> {
    raw.parse().map_err(|_| format!("{raw:?} is not a valid unsigned integer"))
}

/// Applies every schema entry whose environment variable is set. The
/// variable name is `{prefix}_{PATH}` with `path`'s `.` replaced by `_`
/// and upper-cased, e.g. `bus.executor_workers` under prefix `VERGE`
/// becomes `VERGE_BUS_EXECUTOR_WORKERS`.
pub fn apply_env_overrides(
    prefix: &str,
    config: &mut RuntimeConfig,
    schema: &[EnvOverride],
) -> Result<(), ConfigError> {
    for entry in schema {
        let key = format!("{prefix}_{}", entry.path.to_ascii_uppercase().replace('.', "_"));
        if let Ok(value) = std::env::var(&key) {
            (entry.setter)(config, &value).map_err(|reason| ConfigError::EnvOverride { key, reason })?;
        }
    }
    Ok(())
}

/// Coerces a boolean the conventional env-override way: `"true"`/`"1"` is
/// truthy, anything else is falsy. Exposed for override setters of boolean
/// fields added by downstream schema extensions.
pub fn coerce_bool(raw: &str) -> bool {
    matches!(raw, "true" | "1")
}

/// Comma-splits a slice-valued override.
pub fn coerce_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}
