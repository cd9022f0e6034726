use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use forecast_core::{Aggregator, Config, ProviderId, SourceCache, sources_from_config};
use inquire::{Password, PasswordDisplayMode};

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "forecast", version, about = "Consensus weather forecast from several providers")]
pub struct Cli {
    /// Log per-source progress to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the API key for a provider.
    Configure {
        /// Provider short name, e.g. "openweather" or "weatherapi".
        provider: String,
    },

    /// Show the aggregated forecast for a place.
    Show {
        /// City or place name.
        location: String,

        /// Only print the next 24 hours.
        #[arg(long, conflicts_with = "daily")]
        hourly: bool,

        /// Only print the 7-day outlook.
        #[arg(long)]
        daily: bool,
    },

    /// List providers, whether they are configured, and their weights.
    Sources,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure { provider } => configure(&provider),
            Command::Show { location, hourly, daily } => {
                let sections = render::Sections { hourly: !daily, daily: !hourly };
                show(&location, sections).await
            }
            Command::Sources => sources(),
        }
    }
}

fn load_config() -> anyhow::Result<Config> {
    let mut config = Config::load()?;
    config.apply_env_overrides(|var| std::env::var(var).ok());
    Ok(config)
}

fn configure(provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;

    if !id.needs_api_key() {
        println!(
            "{} needs no key of its own; it is enabled once `openweather` is configured.",
            id.source_name()
        );
        return Ok(());
    }

    let api_key = Password::new(&format!("API key for {}:", id.source_name()))
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    let mut config = Config::load()?;
    config.upsert_provider_api_key(id, api_key.trim().to_string());
    config.save()?;

    println!("Saved API key for {} to {}", id, Config::config_file_path()?.display());
    Ok(())
}

async fn show(location: &str, sections: render::Sections) -> anyhow::Result<()> {
    let config = load_config()?;
    let weights = config.source_weights()?;
    let cache = Arc::new(SourceCache::persistent(Config::cache_dir()?));
    cache.clear_expired();
    let sources = sources_from_config(&config, cache)?;

    if sources.is_empty() {
        tracing::warn!("no providers configured");
        println!(
            "No providers configured.\n\
             Hint: run `forecast configure <provider>` (e.g. `forecast configure weatherapi`) first."
        );
        return Ok(());
    }

    let aggregator = Aggregator::new(sources, weights).with_timeout(config.fetch_timeout());
    let report = aggregator.aggregate_with_report(location).await;

    print!("{}", render::render_report(location, &report, sections));
    Ok(())
}

fn sources() -> anyhow::Result<()> {
    let config = load_config()?;
    let weights = config.source_weights()?;

    for id in ProviderId::all() {
        let status = match (id.needs_api_key(), config.is_provider_configured(*id)) {
            (true, true) => "configured",
            (true, false) => "missing API key",
            (false, _) if config.is_provider_configured(ProviderId::OpenWeather) => "configured",
            (false, _) => "needs openweather key",
        };
        println!(
            "{:<16} {:<16} weight {:.2}  {}",
            id.as_str(),
            id.source_name(),
            weights.weight_of(id.source_name()),
            status
        );
    }
    println!("{:<33} weight {:.2}", "(any other source)", weights.default_weight());

    Ok(())
}
