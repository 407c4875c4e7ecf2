//! Environment-driven configuration for the control plane's ambient knobs.
//!
//! Every value has a default from spec §6 and can be overridden via an
//! environment variable, mirroring the teacher's `LLMConfig::from_env()`.

use crate::error::{GatewayError, GatewayResult};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

/// Per-tier resource multiplier used by the task scheduler (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Tier {
    Standard,
    Priority,
    Premium,
    Enterprise,
}

impl Tier {
    /// Whether this tier is allowed to run multiple sessions in parallel.
    pub fn allows_parallel_sessions(self) -> bool {
        matches!(self, Tier::Premium | Tier::Enterprise)
    }
}

impl FromStr for Tier {
    type Err = GatewayError;

    fn from_str(s: &str) -> GatewayResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Tier::Standard),
            "priority" => Ok(Tier::Priority),
            "premium" => Ok(Tier::Premium),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(GatewayError::configuration_error(format!(
                "unknown tier: {other}"
            ))),
        }
    }
}

/// Resource multipliers for each scheduler tier, keyed by [`Tier`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResourceMultipliers {
    pub standard: f64,
    pub priority: f64,
    pub premium: f64,
    pub enterprise: f64,
}

impl Default for ResourceMultipliers {
    fn default() -> Self {
        Self {
            standard: 1.0,
            priority: 3.0,
            premium: 5.0,
            enterprise: 10.0,
        }
    }
}

impl ResourceMultipliers {
    pub fn for_tier(&self, tier: Tier) -> f64 {
        match tier {
            Tier::Standard => self.standard,
            Tier::Priority => self.priority,
            Tier::Premium => self.premium,
            Tier::Enterprise => self.enterprise,
        }
    }
}

/// Alert debounce thresholds (§4.6).
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct AlertThresholds {
    /// Fraction of the soft limit at which an early-warning alert fires.
    pub soft_ratio: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self { soft_ratio: 0.8 }
    }
}

/// Ambient configuration for the control plane, loaded once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Output token ceiling used as a cost hint during the pre-check phase (§4.8 step 2).
    pub default_output_token_estimate: u32,
    /// Base per-stage duration in seconds used to size scheduler tasks (§4.10).
    pub base_stage_seconds: u64,
    /// Per-tier scheduler concurrency multipliers.
    pub resource_multipliers: ResourceMultipliers,
    /// Number of free accesses granted per tenant before the fractional ledger starts charging.
    pub free_tier_limit: u32,
    pub alert_thresholds: AlertThresholds,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_output_token_estimate: 500,
            base_stage_seconds: 15,
            resource_multipliers: ResourceMultipliers::default(),
            free_tier_limit: 3,
            alert_thresholds: AlertThresholds::default(),
        }
    }
}

impl GatewayConfig {
    /// Build configuration from environment variables, falling back to spec defaults.
    pub fn from_env() -> GatewayResult<Self> {
        let mut cfg = Self::default();

        if let Some(v) = env_u32("DEFAULT_OUTPUT_TOKEN_ESTIMATE")? {
            cfg.default_output_token_estimate = v;
        }
        if let Some(v) = env_u64("BASE_STAGE_SECONDS")? {
            cfg.base_stage_seconds = v;
        }
        if let Some(v) = env_u32("FREE_TIER_LIMIT")? {
            cfg.free_tier_limit = v;
        }
        if let Some(v) = env_f64("ALERT_SOFT_RATIO")? {
            cfg.alert_thresholds.soft_ratio = v;
        }
        if let Some(multipliers) = env_resource_multipliers()? {
            cfg.resource_multipliers = multipliers;
        }

        Ok(cfg)
    }
}

/// Default output budget for the default tier, expressed as a [`Decimal`] hint.
///
/// Not load-bearing per §4.8 step 2 — only needs to be a reasonable ceiling.
pub fn default_cache_discount() -> Option<Decimal> {
    None
}

fn env_u32(key: &str) -> GatewayResult<Option<u32>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<u32>()
            .map(Some)
            .map_err(|e| GatewayError::configuration_error(format!("invalid {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

fn env_u64(key: &str) -> GatewayResult<Option<u64>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|e| GatewayError::configuration_error(format!("invalid {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

fn env_f64(key: &str) -> GatewayResult<Option<f64>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<f64>()
            .map(Some)
            .map_err(|e| GatewayError::configuration_error(format!("invalid {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Parses `RESOURCE_MULTIPLIERS` as `standard=1,priority=3,premium=5,enterprise=10`.
fn env_resource_multipliers() -> GatewayResult<Option<ResourceMultipliers>> {
    let Ok(raw) = std::env::var("RESOURCE_MULTIPLIERS") else {
        return Ok(None);
    };

    let mut parsed: HashMap<String, f64> = HashMap::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (key, value) = entry.split_once('=').ok_or_else(|| {
            GatewayError::configuration_error(format!(
                "invalid RESOURCE_MULTIPLIERS entry: {entry}"
            ))
        })?;
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|e| GatewayError::configuration_error(format!("invalid multiplier: {e}")))?;
        parsed.insert(key.trim().to_ascii_lowercase(), value);
    }

    let defaults = ResourceMultipliers::default();
    Ok(Some(ResourceMultipliers {
        standard: parsed.get("standard").copied().unwrap_or(defaults.standard),
        priority: parsed.get("priority").copied().unwrap_or(defaults.priority),
        premium: parsed.get("premium").copied().unwrap_or(defaults.premium),
        enterprise: parsed
            .get("enterprise")
            .copied()
            .unwrap_or(defaults.enterprise),
    }))
}
