use std::env;

use super::types::{ConfigError, Environment, ThresholdPair};
use crate::db::types::ViolationKind;

const DEFAULT_CORS_ORIGINS: &[&str] =
    &["http://localhost:5173", "http://localhost:3000", "http://localhost:8080"];

pub(super) fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

pub(super) fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

pub(super) fn parse_u16(field: &'static str, value: String) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_u32(field: &'static str, value: String) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_cors_origins(value: Option<String>) -> Result<Vec<String>, ConfigError> {
    let Some(raw) = value else {
        return Ok(default_cors_origins());
    };

    if raw.trim().is_empty() {
        return Ok(default_cors_origins());
    }

    if raw.trim_start().starts_with('[') {
        let parsed: Vec<String> =
            serde_json::from_str(&raw).map_err(|_| ConfigError::InvalidCors(raw.clone()))?;
        if parsed.is_empty() {
            return Ok(default_cors_origins());
        }
        return Ok(parsed);
    }

    let items: Vec<String> = raw
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();

    if items.is_empty() {
        return Ok(default_cors_origins());
    }

    Ok(items)
}

/// Comma separated violation kinds. An explicitly empty variable means "none",
/// an unset one falls back to `defaults`.
pub(super) fn parse_violation_kinds(value: Option<String>, defaults: &[&str]) -> Vec<ViolationKind> {
    let raw = match value {
        Some(raw) => raw,
        None => return defaults.iter().map(|item| ViolationKind::parse(item)).collect(),
    };

    raw.split(',')
        .map(|item| item.trim().to_ascii_lowercase())
        .filter(|item| !item.is_empty())
        .map(|item| ViolationKind::parse(&item))
        .collect()
}

/// Parses `kind=warn:force` pairs, e.g. `tab-switch=2:4,copy-paste=1:2`.
pub(super) fn parse_kind_thresholds(
    value: Option<String>,
) -> Result<Vec<(ViolationKind, ThresholdPair)>, ConfigError> {
    let Some(raw) = value else {
        return Ok(Vec::new());
    };

    let invalid = || ConfigError::InvalidValue { field: "VIOLATION_TYPE_THRESHOLDS", value: raw.clone() };

    let mut parsed = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        let (kind, limits) = item.split_once('=').ok_or_else(invalid)?;
        let (warn, force) = limits.split_once(':').ok_or_else(invalid)?;
        let warn = warn.trim().parse::<u32>().map_err(|_| invalid())?;
        let force = force.trim().parse::<u32>().map_err(|_| invalid())?;
        if force == 0 || warn > force {
            return Err(invalid());
        }
        parsed.push((ViolationKind::parse(kind.trim()), ThresholdPair { warn, force }));
    }

    Ok(parsed)
}

pub(super) fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

pub(super) fn parse_environment(value: Option<String>) -> Environment {
    match value.as_deref().map(|item| item.to_lowercase()) {
        Some(ref val) if val == "production" || val == "prod" => Environment::Production,
        Some(ref val) if val == "staging" => Environment::Staging,
        Some(ref val) if val == "test" || val == "testing" => Environment::Test,
        _ => Environment::Development,
    }
}

fn default_cors_origins() -> Vec<String> {
    DEFAULT_CORS_ORIGINS.iter().map(|item| item.to_string()).collect()
}
