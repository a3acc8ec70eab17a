//! Configuration loading
//!
//! Configuration is JSON (camelCase) with `SWITCHYARD_*` environment
//! variables layered on top. Validation happens at `initialize`.

use std::path::Path;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use tracing::{debug, info};

use sy_common::{ConfigError, CoreConfig, SelectionStrategy, WorkKind};

/// Read a JSON configuration file.
pub fn load_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)?;
    let config = serde_json::from_str(&raw)?;
    info!(path = %path.display(), "Loaded configuration file");
    Ok(config)
}

/// Apply `SWITCHYARD_*` overrides from the process environment.
pub fn apply_env_overrides(config: &mut CoreConfig) -> Result<(), ConfigError> {
    apply_overrides(config, |key| std::env::var(key).ok())
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(format!("{} has an invalid value: {:?}", key, value)))
}

fn parse_selection(key: &str, value: &str) -> Result<SelectionStrategy, ConfigError> {
    match value.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
        "roundrobin" => Ok(SelectionStrategy::RoundRobin),
        "leastloaded" => Ok(SelectionStrategy::LeastLoaded),
        "skillweighted" => Ok(SelectionStrategy::SkillWeighted),
        _ => Err(ConfigError::invalid(format!("{} has an invalid value: {:?}", key, value))),
    }
}

/// Apply overrides from any key lookup.
pub fn apply_overrides<F>(config: &mut CoreConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut applied = 0;
    let mut get = |key: &str| {
        let value = lookup(key);
        if value.is_some() {
            debug!(key, "Applying environment override");
            applied += 1;
        }
        value
    };

    for kind in WorkKind::ALL {
        let prefix = kind.as_str().to_ascii_uppercase();
        let limits = config.queues.limits_mut(kind);
        let key = format!("SWITCHYARD_{}_CAPACITY", prefix);
        if let Some(v) = get(&key) {
            limits.capacity = parse(&key, &v)?;
        }
        let key = format!("SWITCHYARD_{}_MAX_WAIT_MS", prefix);
        if let Some(v) = get(&key) {
            limits.max_wait_ms = parse(&key, &v)?;
        }
    }

    if let Some(v) = get("SWITCHYARD_HIGH_THRESHOLD") {
        config.load.high_threshold = parse("SWITCHYARD_HIGH_THRESHOLD", &v)?;
    }
    if let Some(v) = get("SWITCHYARD_CRITICAL_THRESHOLD") {
        config.load.critical_threshold = parse("SWITCHYARD_CRITICAL_THRESHOLD", &v)?;
    }
    if let Some(v) = get("SWITCHYARD_HYSTERESIS") {
        config.load.hysteresis = parse("SWITCHYARD_HYSTERESIS", &v)?;
    }
    if let Some(v) = get("SWITCHYARD_TICK_INTERVAL_MS") {
        config.tick_interval_ms = parse("SWITCHYARD_TICK_INTERVAL_MS", &v)?;
    }
    if let Some(v) = get("SWITCHYARD_SWEEP_INTERVAL_MS") {
        config.sweep_interval_ms = Some(parse("SWITCHYARD_SWEEP_INTERVAL_MS", &v)?);
    }
    if let Some(v) = get("SWITCHYARD_ALERT_DEDUPE_WINDOW_MS") {
        config.alerts.dedupe_window_ms = parse("SWITCHYARD_ALERT_DEDUPE_WINDOW_MS", &v)?;
    }
    if let Some(v) = get("SWITCHYARD_SELECTION") {
        config.selection = parse_selection("SWITCHYARD_SELECTION", &v)?;
    }
    if let Some(v) = get("SWITCHYARD_SHUTDOWN_GRACE_MS") {
        config.shutdown_grace_ms = parse("SWITCHYARD_SHUTDOWN_GRACE_MS", &v)?;
    }

    if applied > 0 {
        info!(applied, "Applied environment overrides to configuration");
    }
    Ok(())
}
