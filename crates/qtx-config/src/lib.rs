//! Layered configuration for the execution/risk engine.
//!
//! Layers, lowest to highest precedence:
//! 1. compiled-in defaults ([`Configuration::default`])
//! 2. an optional YAML file, deep-merged over the defaults
//! 3. an optional `QTX_`-prefixed environment overlay
//!
//! The effective configuration can be content-hashed
//! ([`Configuration::content_hash`]) so two runs can be diffed without
//! comparing full YAML dumps.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Kelly position-sizer caps (§4.2 / §6.4).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KellyConfig {
    pub max_position_pct: f64,
    pub max_total_exposure: f64,
    pub min_position_size: f64,
    pub max_position_size: f64,
}

impl Default for KellyConfig {
    fn default() -> Self {
        KellyConfig {
            max_position_pct: 0.25,
            max_total_exposure: 1.0,
            min_position_size: 100.0,
            max_position_size: 50_000.0,
        }
    }
}

/// Circuit breaker thresholds (§4.4 / §6.4).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub daily_loss_limit: f64,
    pub max_drawdown_limit: f64,
    pub consecutive_loss_limit: u32,
    pub volatility_threshold: f64,
    pub rapid_drawdown_limit: f64,
    pub rapid_drawdown_window_minutes: i64,
    pub auto_reset_hours: i64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        BreakerConfig {
            daily_loss_limit: 0.03,
            max_drawdown_limit: 0.10,
            consecutive_loss_limit: 5,
            volatility_threshold: 40.0,
            rapid_drawdown_limit: 0.05,
            rapid_drawdown_window_minutes: 60,
            auto_reset_hours: 24,
        }
    }
}

/// Execution router strategy thresholds (§4.6 / §6.4).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub small_order_threshold: f64,
    pub large_order_threshold: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            small_order_threshold: 10_000.0,
            large_order_threshold: 100_000.0,
        }
    }
}

/// TWAP default slicing parameters (§4.5.1 / §6.4).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwapConfig {
    pub default_time_window_minutes: i64,
    pub default_num_slices: u32,
    pub timing_randomization_seconds: i64,
}

impl Default for TwapConfig {
    fn default() -> Self {
        TwapConfig {
            default_time_window_minutes: 60,
            default_num_slices: 10,
            timing_randomization_seconds: 30,
        }
    }
}

/// VWAP slicing and deviation-alert parameters (§4.5.2 / §6.4).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VwapConfig {
    pub vwap_deviation_threshold: f64,
    /// Half-hour window label ("09:30-10:00") -> profile fraction.
    /// Empty means "use the built-in U-shaped default profile".
    pub volume_profile: BTreeMap<String, f64>,
}

impl Default for VwapConfig {
    fn default() -> Self {
        VwapConfig {
            vwap_deviation_threshold: 0.005,
            volume_profile: BTreeMap::new(),
        }
    }
}

/// Execution monitor alert thresholds (§4.8 / §6.4).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub slippage_threshold_bps: f64,
    pub vwap_deviation_threshold: f64,
    pub failed_order_threshold: usize,
    pub slow_execution_threshold_minutes: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            slippage_threshold_bps: 20.0,
            vwap_deviation_threshold: 0.01,
            failed_order_threshold: 3,
            slow_execution_threshold_minutes: 120,
        }
    }
}

/// The full, effective configuration (§6.4's table).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub initial_cash: f64,
    pub commission_per_trade: f64,
    pub commission_per_share: f64,
    pub min_slippage: f64,
    pub slippage_volatility_multiplier: f64,
    pub enforce_market_hours: bool,
    pub enable_risk_systems: bool,
    /// §9 Open Question: whether a breaker trip cancels in-flight plans.
    /// Default "let it finish" (`false`).
    pub cancel_inflight_on_trip: bool,

    pub kelly: KellyConfig,
    pub breaker: BreakerConfig,
    pub router: RouterConfig,
    pub twap: TwapConfig,
    pub vwap: VwapConfig,
    pub monitor: MonitorConfig,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            initial_cash: 100_000.0,
            commission_per_trade: 1.0,
            commission_per_share: 0.005,
            min_slippage: 0.0001,
            slippage_volatility_multiplier: 1.0,
            enforce_market_hours: false,
            enable_risk_systems: true,
            cancel_inflight_on_trip: false,
            kelly: KellyConfig::default(),
            breaker: BreakerConfig::default(),
            router: RouterConfig::default(),
            twap: TwapConfig::default(),
            vwap: VwapConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl Configuration {
    /// Load the layered configuration: defaults, optional YAML file
    /// overlay, optional `QTX_`-prefixed environment overlay.
    pub fn load(yaml_path: Option<&Path>) -> Result<Configuration> {
        let mut value = serde_json::to_value(Configuration::default())
            .context("serializing default configuration")?;

        if let Some(path) = yaml_path {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            let overlay: Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?;
            deep_merge(&mut value, overlay);
        }

        let env_overlay = env_overlay();
        if !env_overlay.is_null() {
            deep_merge(&mut value, env_overlay);
        }

        serde_json::from_value(value).context("deserializing effective configuration")
    }

    /// SHA-256 hash of the canonicalized (sorted-key) JSON
    /// representation, for logging/diffing effective config at startup.
    pub fn content_hash(&self) -> Result<String> {
        let value = serde_json::to_value(self).context("serializing configuration")?;
        let canonical = canonicalize(&value);
        let bytes = serde_json::to_vec(&canonical).context("encoding canonical configuration")?;
        let digest = Sha256::digest(&bytes);
        Ok(hex::encode(digest))
    }
}

/// Recursively merge `overlay` into `base`, overlay winning on conflicts.
/// Scalars and arrays are replaced wholesale; objects merge key by key.
fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(base_val) => deep_merge(base_val, overlay_val),
                    None => {
                        base_map.insert(key, overlay_val);
                    }
                }
            }
        }
        (base_slot, overlay_val) => {
            *base_slot = overlay_val;
        }
    }
}

/// Sort every object's keys recursively so the JSON encoding is
/// deterministic regardless of struct field order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: BTreeMap<String, Value> = BTreeMap::new();
            for (k, v) in map {
                sorted.insert(k.clone(), canonicalize(v));
            }
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Build a nested JSON overlay from `QTX_SECTION__FIELD=value` env vars,
/// e.g. `QTX_BREAKER__DAILY_LOSS_LIMIT=0.05`. Returns `Value::Null` if no
/// recognized env vars are set.
fn env_overlay() -> Value {
    let mut root = serde_json::Map::new();

    for (key, raw) in std::env::vars() {
        let Some(rest) = key.strip_prefix("QTX_") else {
            continue;
        };
        let path: Vec<String> = rest.split("__").map(|s| s.to_ascii_lowercase()).collect();
        insert_path(&mut root, &path, parse_env_value(&raw));
    }

    if root.is_empty() {
        Value::Null
    } else {
        Value::Object(root)
    }
}

fn insert_path(map: &mut serde_json::Map<String, Value>, path: &[String], value: Value) {
    match path.split_first() {
        None => {}
        Some((head, [])) => {
            map.insert(head.clone(), value);
        }
        Some((head, rest)) => {
            let entry = map
                .entry(head.clone())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if let Value::Object(inner) = entry {
                insert_path(inner, rest, value);
            }
        }
    }
}

fn parse_env_value(raw: &str) -> Value {
    if let Ok(b) = raw.parse::<bool>() {
        return Value::Bool(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = Configuration::default();
        assert_eq!(cfg.breaker.daily_loss_limit, 0.03);
        assert_eq!(cfg.breaker.max_drawdown_limit, 0.10);
        assert_eq!(cfg.breaker.consecutive_loss_limit, 5);
        assert_eq!(cfg.kelly.max_position_pct, 0.25);
        assert_eq!(cfg.router.small_order_threshold, 10_000.0);
        assert_eq!(cfg.router.large_order_threshold, 100_000.0);
        assert_eq!(cfg.twap.default_num_slices, 10);
        assert_eq!(cfg.monitor.failed_order_threshold, 3);
        assert!(!cfg.enforce_market_hours);
        assert!(!cfg.cancel_inflight_on_trip);
    }

    #[test]
    fn yaml_overlay_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "breaker:\n  daily_loss_limit: 0.05\ninitial_cash: 250000.0\n",
        )
        .unwrap();

        let cfg = Configuration::load(Some(&path)).unwrap();
        assert_eq!(cfg.breaker.daily_loss_limit, 0.05);
        assert_eq!(cfg.initial_cash, 250_000.0);
        // Untouched fields keep their defaults.
        assert_eq!(cfg.breaker.max_drawdown_limit, 0.10);
    }

    #[test]
    fn content_hash_is_stable_for_equal_configs() {
        let a = Configuration::default();
        let b = Configuration::default();
        assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());
    }

    #[test]
    fn content_hash_changes_with_config() {
        let a = Configuration::default();
        let mut b = Configuration::default();
        b.breaker.daily_loss_limit = 0.5;
        assert_ne!(a.content_hash().unwrap(), b.content_hash().unwrap());
    }
}
