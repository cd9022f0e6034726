//! Consensus forecast from several providers.
//!
//! Every configured source is queried concurrently. Whatever subset answers
//! is bucketed by hour (and by day), and each bucket is reduced to a
//! weighted mean using the per-source weights.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use chrono::{NaiveDate, NaiveDateTime};
use futures::future::join_all;

use crate::{
    error::{SourceError, SourceFailure},
    model::{DailyObservation, HourlyObservation, ObservedAt, SourceForecast, UnifiedForecast},
    provider::ForecastSource,
    weights::SourceWeights,
};

pub const MAX_HOURS: usize = 24;
pub const MAX_DAYS: usize = 7;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one aggregation pass, including the sources that were dropped.
#[derive(Debug)]
pub struct AggregationReport {
    pub forecast: Option<UnifiedForecast>,
    /// Names of the sources that contributed, in priority order.
    pub succeeded: Vec<String>,
    pub failures: Vec<SourceFailure>,
}

#[derive(Debug)]
pub struct Aggregator {
    sources: Vec<Arc<dyn ForecastSource>>,
    weights: SourceWeights,
    timeout: Duration,
}

impl Aggregator {
    /// `sources` order is the priority order used to pick city metadata.
    pub fn new(sources: Vec<Arc<dyn ForecastSource>>, weights: SourceWeights) -> Self {
        Self { sources, weights, timeout: DEFAULT_TIMEOUT }
    }

    /// Per-source bound on how long a fetch may take.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn weights(&self) -> &SourceWeights {
        &self.weights
    }

    /// Consensus forecast for `location`, or `None` when no source answered.
    pub async fn aggregate(&self, location: &str) -> Option<UnifiedForecast> {
        self.aggregate_with_report(location).await.forecast
    }

    pub async fn aggregate_with_report(&self, location: &str) -> AggregationReport {
        let fetches = self.sources.iter().map(move |source| async move {
            let result = match tokio::time::timeout(self.timeout, source.fetch(location)).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout(self.timeout)),
            };
            (source.name().to_string(), result)
        });

        // join_all keeps input order, so the fold below sees sources in
        // priority order no matter which finished first.
        let mut succeeded = Vec::new();
        let mut forecasts = Vec::new();
        let mut failures = Vec::new();

        for (name, result) in join_all(fetches).await {
            match result {
                Ok(forecast) => {
                    tracing::debug!(
                        source = %name,
                        hourly = forecast.hourly.len(),
                        daily = forecast.daily.len(),
                        "source answered"
                    );
                    succeeded.push(name);
                    forecasts.push(forecast);
                }
                Err(error) => {
                    tracing::warn!(source = %name, location, %error, "source failed, excluding it");
                    failures.push(SourceFailure { source: name, error });
                }
            }
        }

        let forecast = combine(&forecasts, &self.weights);
        match &forecast {
            Some(f) => tracing::info!(
                location,
                sources = succeeded.len(),
                failed = failures.len(),
                hours = f.hourly().len(),
                days = f.daily().len(),
                "aggregated forecast"
            ),
            None => tracing::warn!(location, "no source produced a forecast"),
        }

        AggregationReport { forecast, succeeded, failures }
    }
}

/// Merge already-fetched per-source forecasts. `forecasts` must be in priority order.
pub fn combine(forecasts: &[SourceForecast], weights: &SourceWeights) -> Option<UnifiedForecast> {
    let base = forecasts.first()?;

    Some(UnifiedForecast::new(
        base.city.clone(),
        base.country.clone(),
        base.timezone.clone(),
        aggregate_hourly(forecasts, weights),
        aggregate_daily(forecasts, weights),
    ))
}

pub fn aggregate_hourly(forecasts: &[SourceForecast], weights: &SourceWeights) -> Vec<HourlyObservation> {
    let mut buckets: BTreeMap<NaiveDateTime, Vec<&HourlyObservation>> = BTreeMap::new();
    for obs in forecasts.iter().flat_map(|f| &f.hourly) {
        buckets.entry(obs.time.hour_key()).or_default().push(obs);
    }

    buckets
        .into_iter()
        .take(MAX_HOURS)
        .map(|(hour, group)| {
            let [temperature, precipitation, wind_speed] = consensus(&group, weights, |o| {
                (o.source.as_str(), [o.temperature, o.precipitation, o.wind_speed])
            });

            // A bucket fed only by zoned instants is a UTC hour; anything
            // else is wall-clock time of unknown zone.
            let time = if group.iter().all(|o| o.time.is_zoned()) {
                ObservedAt::from(hour.and_utc())
            } else {
                ObservedAt::Local(hour)
            };

            HourlyObservation {
                time,
                temperature: round_to(temperature, 1),
                precipitation: round_to(precipitation, 2),
                wind_speed: round_to(wind_speed, 1),
                source: aggregated_label(group.len()),
            }
        })
        .collect()
}

pub fn aggregate_daily(forecasts: &[SourceForecast], weights: &SourceWeights) -> Vec<DailyObservation> {
    let mut buckets: BTreeMap<NaiveDate, Vec<&DailyObservation>> = BTreeMap::new();
    for obs in forecasts.iter().flat_map(|f| &f.daily) {
        buckets.entry(obs.date).or_default().push(obs);
    }

    buckets
        .into_iter()
        .take(MAX_DAYS)
        .map(|(date, group)| {
            let [temp_min, temp_max, precipitation, wind_speed] = consensus(&group, weights, |o| {
                (o.source.as_str(), [o.temp_min, o.temp_max, o.precipitation, o.wind_speed])
            });

            DailyObservation {
                date,
                temp_min: round_to(temp_min, 1),
                temp_max: round_to(temp_max, 1),
                precipitation: round_to(precipitation, 2),
                wind_speed: round_to(wind_speed, 1),
                source: aggregated_label(group.len()),
            }
        })
        .collect()
}

/// Weighted mean of each field across a non-empty bucket.
///
/// Falls back to the plain mean when every weight in the bucket is zero.
fn consensus<T, const N: usize>(
    group: &[&T],
    weights: &SourceWeights,
    fields: impl Fn(&T) -> (&str, [f64; N]),
) -> [f64; N] {
    let mut weighted = [0.0; N];
    let mut plain = [0.0; N];
    let mut total_weight = 0.0;

    for &obs in group {
        let (source, values) = fields(obs);
        let weight = weights.weight_of(source);
        for (i, value) in values.into_iter().enumerate() {
            weighted[i] += value * weight;
            plain[i] += value;
        }
        total_weight += weight;
    }

    if total_weight > 0.0 {
        weighted.map(|sum| sum / total_weight)
    } else {
        let count = group.len().max(1) as f64;
        plain.map(|sum| sum / count)
    }
}

fn aggregated_label(count: usize) -> String {
    format!("Aggregated ({count} sources)")
}

/// Round the stored binary value to `decimals` places, exact ties to even.
///
/// Goes through the exact decimal expansion `fmt` produces, so `4.35`
/// (stored just below the tie) becomes 4.3, while `17.25` (an exact tie)
/// becomes 17.2.
pub fn round_to(value: f64, decimals: usize) -> f64 {
    if !value.is_finite() {
        return value;
    }
    format!("{value:.decimals$}").parse().unwrap_or(value)
}
