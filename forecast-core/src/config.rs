use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{provider::ProviderId, weights::SourceWeights};

/// Environment variables that override the API key stored on disk.
const ENV_KEYS: &[(ProviderId, &str)] = &[
    (ProviderId::OpenWeather, "OWM_KEY"),
    (ProviderId::WeatherApi, "WEATHERAPI_KEY"),
    (ProviderId::Tomorrow, "TOMORROW_KEY"),
    (ProviderId::VisualCrossing, "VISUALCROSSING_KEY"),
];

/// Configuration for a single provider (e.g., API key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
}

/// Network and cache tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-provider timeout for one aggregation pass.
    pub timeout_secs: u64,
    pub cache_ttl_minutes: u64,
    /// Weight given to sources missing from the weight table.
    pub default_weight: f64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { timeout_secs: 10, cache_ttl_minutes: 30, default_weight: crate::weights::DEFAULT_WEIGHT }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// [providers.openweather]
/// api_key = "..."
///
/// [weights]
/// "MET Norway" = 0.3
///
/// [fetch]
/// timeout_secs = 10
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Overrides on top of the built-in weight table, keyed by source name.
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,

    #[serde(default)]
    pub fetch: FetchConfig,
}

impl Config {
    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    /// Directory for the persistent forecast cache.
    pub fn cache_dir() -> Result<PathBuf> {
        Ok(project_dirs()?.cache_dir().join("forecasts"))
    }

    /// Set or replace a provider API key.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers.insert(provider_id.as_str().to_string(), ProviderConfig { api_key });
    }

    pub fn remove_provider(&mut self, provider_id: ProviderId) -> bool {
        self.providers.remove(provider_id.as_str()).is_some()
    }

    /// Returns API key for a provider, if present and non-empty.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.providers
            .get(provider_id.as_str())
            .map(|cfg| cfg.api_key.trim())
            .filter(|key| !key.is_empty())
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        self.provider_api_key(provider_id).is_some()
    }

    /// Let API keys from the environment win over the ones on disk.
    ///
    /// `lookup` is usually `|name| std::env::var(name).ok()`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for &(id, var) in ENV_KEYS {
            if let Some(key) = lookup(var).filter(|k| !k.trim().is_empty()) {
                tracing::debug!(provider = %id, var, "using API key from environment");
                self.upsert_provider_api_key(id, key);
            }
        }
    }

    /// Built-in weight table with the `[weights]` overrides applied.
    pub fn source_weights(&self) -> Result<SourceWeights> {
        let mut table: BTreeMap<String, f64> = SourceWeights::default()
            .iter()
            .map(|(name, w)| (name.to_string(), w))
            .collect();

        for (name, &weight) in &self.weights {
            if !(weight > 0.0 && weight <= 1.0) {
                bail!("Weight for '{name}' must be in (0, 1], got {weight}");
            }
            table.insert(name.clone(), weight);
        }

        let default_weight = self.fetch.default_weight;
        if let Some((name, min)) = table
            .iter()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .filter(|(_, min)| default_weight >= **min)
        {
            bail!(
                "default_weight ({default_weight}) must be lower than every provider weight, \
                 but '{name}' has {min}"
            );
        }

        let mut weights = SourceWeights::new(default_weight)
            .with_context(|| format!("Invalid default_weight {default_weight}"))?;
        for (name, weight) in table {
            weights = weights.with_weight(name, weight)?;
        }

        Ok(weights)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.fetch.cache_ttl_minutes * 60)
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "forecast", "forecast-cli")
        .ok_or_else(|| anyhow!("Could not determine platform directories"))
}
