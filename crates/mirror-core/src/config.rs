//! mirrors.toml configuration parser.
//!
//! The config is static for the lifetime of a resolver. Unknown keys are
//! rejected at parse time; semantic checks run in [`ResolverConfig::validate`].

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::FontFace;
use crate::url::trim_origin;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    pub origins: Vec<String>,
    #[serde(default = "default_test_path")]
    pub test_path: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Serve the first configured origin, uncached, before any probe round
    /// has completed.
    #[serde(default = "default_true")]
    pub provisional_first_origin: bool,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub local_fallback: LocalFallbackConfig,
    #[serde(default)]
    pub local_optimization: LocalOptimizationConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub fonts: FontTable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Healthy first, configuration order otherwise.
    #[default]
    Availability,
    /// Healthy first, fastest first.
    Speed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    #[serde(default)]
    pub mode: ScoringMode,
    #[serde(default = "default_speed_weight")]
    pub speed_weight: f64,
    #[serde(default = "default_availability_weight")]
    pub availability_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalFallbackConfig {
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalOptimizationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Explicit override; takes precedence over every heuristic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_local: Option<bool>,
    /// Build-time development flag. Counts as a dev signal for the
    /// loopback heuristic.
    #[serde(default)]
    pub dev_mode: bool,
    /// Inclusive port ranges treated as development servers.
    #[serde(default = "default_dev_ports")]
    pub dev_ports: Vec<[u16; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Full origin cycles before giving up. Defaults to `max_retries`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cycles: Option<u32>,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    /// Try the local copy once after every origin has been exhausted.
    #[serde(default = "default_true")]
    pub local_fallback: bool,
}

/// Stylesheet path per font face. Keys outside [`FontFace`] fail to parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FontTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sans: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serif: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mono: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icons: Option<String>,
}

impl FontTable {
    /// Build the enum-keyed lookup table.
    pub fn to_map(&self) -> BTreeMap<FontFace, String> {
        [
            (FontFace::Sans, &self.sans),
            (FontFace::Serif, &self.serif),
            (FontFace::Mono, &self.mono),
            (FontFace::Icons, &self.icons),
        ]
        .into_iter()
        .filter_map(|(face, path)| path.clone().map(|p| (face, p)))
        .collect()
    }
}

impl ResolverConfig {
    /// Minimal config for the given origins, everything else defaulted.
    pub fn new<S: Into<String>>(origins: impl IntoIterator<Item = S>) -> Self {
        Self {
            origins: origins.into_iter().map(Into::into).collect(),
            test_path: default_test_path(),
            timeout_ms: default_timeout_ms(),
            max_concurrency: default_max_concurrency(),
            provisional_first_origin: true,
            scoring: ScoringConfig::default(),
            local_fallback: LocalFallbackConfig::default(),
            local_optimization: LocalOptimizationConfig::default(),
            retry: RetryConfig::default(),
            fonts: FontTable::default(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse, normalize and validate.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: ResolverConfig = toml::from_str(s)?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Strip trailing slashes from origins and surrounding slashes from the
    /// probe test path.
    pub fn normalized(mut self) -> Self {
        self.origins = self.origins.iter().map(|o| trim_origin(o).to_string()).collect();
        self.test_path = self.test_path.trim_matches('/').to_string();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.origins.is_empty() {
            return Err(ConfigError::NoOrigins);
        }

        let mut seen = HashSet::new();
        for origin in &self.origins {
            let trimmed = trim_origin(origin);
            let host = trimmed
                .strip_prefix("https://")
                .or_else(|| trimmed.strip_prefix("http://"));
            match host {
                Some(h) if !h.is_empty() && !h.starts_with('/') => {}
                _ => return Err(ConfigError::InvalidOrigin(origin.clone())),
            }
            if !seen.insert(trimmed) {
                return Err(ConfigError::DuplicateOrigin(origin.clone()));
            }
        }

        if self.timeout_ms == 0 {
            return Err(invalid("timeout_ms", "must be at least 1"));
        }
        if self.max_concurrency == 0 {
            return Err(invalid("max_concurrency", "must be at least 1"));
        }

        let weights = [
            ("scoring.speed_weight", self.scoring.speed_weight),
            ("scoring.availability_weight", self.scoring.availability_weight),
        ];
        for (field, w) in weights {
            if !w.is_finite() || w < 0.0 {
                return Err(invalid(field, format!("must be a non-negative number, got {w}")));
            }
        }

        if !self.retry.backoff_factor.is_finite() || self.retry.backoff_factor < 1.0 {
            return Err(invalid("retry.backoff_factor", "must be >= 1.0"));
        }
        if self.retry.max_cycles == Some(0) {
            return Err(invalid("retry.max_cycles", "must be at least 1"));
        }

        for [lo, hi] in &self.local_optimization.dev_ports {
            if lo > hi {
                return Err(invalid(
                    "local_optimization.dev_ports",
                    format!("range {lo}..={hi} is reversed"),
                ));
            }
        }

        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl RetryConfig {
    /// Full origin cycles the retry policy walks before giving up.
    pub fn max_cycles_before_giving_up(&self) -> u32 {
        self.max_cycles.unwrap_or(self.max_retries).max(1)
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            mode: ScoringMode::default(),
            speed_weight: default_speed_weight(),
            availability_weight: default_availability_weight(),
        }
    }
}

impl Default for LocalFallbackConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
        }
    }
}

impl Default for LocalOptimizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            force_local: None,
            dev_mode: false,
            dev_ports: default_dev_ports(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            max_cycles: None,
            base_delay_ms: default_base_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
            local_fallback: true,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

fn default_test_path() -> String {
    "favicon.ico".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_max_concurrency() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_speed_weight() -> f64 {
    0.7
}

fn default_availability_weight() -> f64 {
    0.3
}

fn default_base_path() -> String {
    "/".to_string()
}

fn default_dev_ports() -> Vec<[u16; 2]> {
    vec![[3000, 3999], [4000, 4999], [5000, 5999], [8000, 8999]]
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    8000
}

fn default_jitter_ms() -> u64 {
    250
}
