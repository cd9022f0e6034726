use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};
use reqwest::Client;
use serde::Deserialize;

use crate::{
    error::SourceError,
    model::{DailyObservation, HourlyObservation, SourceForecast},
    provider::{ProviderId, USER_AGENT, geocode::Geocoder, read_body},
};

use super::ForecastSource;

const DEFAULT_BASE_URL: &str = "https://api.met.no";
const SOURCE: &str = ProviderId::MetNo.source_name();
/// Seven days of hourly steps.
const DAILY_WINDOW: usize = 168;

/// MET Norway locationforecast. Free, no key, but coordinates only.
#[derive(Debug, Clone)]
pub struct MetNoProvider {
    http: Client,
    geocoder: Geocoder,
    base_url: String,
}

impl MetNoProvider {
    pub fn new(http: Client, geocoder: Geocoder) -> Self {
        Self { http, geocoder, base_url: DEFAULT_BASE_URL.to_string() }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct MnResponse {
    properties: MnProperties,
}

#[derive(Debug, Deserialize)]
struct MnProperties {
    timeseries: Vec<MnStep>,
}

#[derive(Debug, Deserialize)]
struct MnStep {
    time: DateTime<FixedOffset>,
    data: MnData,
}

#[derive(Debug, Deserialize)]
struct MnData {
    instant: MnInstant,
    next_1_hours: Option<MnNextHour>,
}

#[derive(Debug, Deserialize)]
struct MnInstant {
    details: MnInstantDetails,
}

#[derive(Debug, Deserialize)]
struct MnInstantDetails {
    air_temperature: f64,
    wind_speed: f64,
}

#[derive(Debug, Deserialize)]
struct MnNextHour {
    details: MnNextHourDetails,
}

#[derive(Debug, Deserialize)]
struct MnNextHourDetails {
    #[serde(default)]
    precipitation_amount: f64,
}

impl MnStep {
    fn precipitation(&self) -> Option<f64> {
        self.data.next_1_hours.as_ref().map(|n| n.details.precipitation_amount)
    }
}

#[derive(Default)]
struct DayAccumulator {
    temps: Vec<f64>,
    winds: Vec<f64>,
    precipitation: f64,
}

#[async_trait]
impl ForecastSource for MetNoProvider {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn fetch(&self, location: &str) -> Result<SourceForecast, SourceError> {
        let city = self.geocoder.locate(location).await?;

        let res = self
            .http
            .get(format!("{}/weatherapi/locationforecast/2.0/compact", self.base_url))
            .query(&[("lat", city.latitude.to_string()), ("lon", city.longitude.to_string())])
            // api.met.no rejects requests without an identifying agent.
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;

        let parsed: MnResponse = serde_json::from_str(&read_body(res).await?)?;
        let steps = &parsed.properties.timeseries;

        let hourly: Vec<HourlyObservation> = steps
            .iter()
            .take(24)
            .map(|step| HourlyObservation {
                time: step.time.into(),
                temperature: step.data.instant.details.air_temperature,
                precipitation: step.precipitation().unwrap_or(0.0),
                wind_speed: step.data.instant.details.wind_speed,
                source: SOURCE.to_string(),
            })
            .collect();

        Ok(SourceForecast {
            city: city.name,
            country: city.country,
            timezone: city.timezone,
            hourly,
            daily: summarize_days(steps),
        })
    }
}

/// MET Norway has no daily product; derive one from the hourly steps.
fn summarize_days(steps: &[MnStep]) -> Vec<DailyObservation> {
    let mut days: BTreeMap<NaiveDate, DayAccumulator> = BTreeMap::new();

    for step in steps.iter().take(DAILY_WINDOW) {
        let details = &step.data.instant.details;
        let day = days.entry(step.time.date_naive()).or_default();
        day.temps.push(details.air_temperature);
        day.winds.push(details.wind_speed);
        day.precipitation += step.precipitation().unwrap_or(0.0);
    }

    days.into_iter()
        .take(7)
        .map(|(date, day)| DailyObservation {
            date,
            temp_min: day.temps.iter().copied().fold(f64::INFINITY, f64::min),
            temp_max: day.temps.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            precipitation: day.precipitation,
            wind_speed: day.winds.iter().sum::<f64>() / day.winds.len() as f64,
            source: SOURCE.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(time: &str, temp: f64, wind: f64, precip: Option<f64>) -> MnStep {
        MnStep {
            time: DateTime::parse_from_rfc3339(time).unwrap(),
            data: MnData {
                instant: MnInstant {
                    details: MnInstantDetails { air_temperature: temp, wind_speed: wind },
                },
                next_1_hours: precip.map(|p| MnNextHour {
                    details: MnNextHourDetails { precipitation_amount: p },
                }),
            },
        }
    }

    #[test]
    fn days_are_summarized_from_hourly_steps() {
        let steps = vec![
            step("2025-03-01T22:00:00Z", 4.0, 2.0, Some(0.5)),
            step("2025-03-01T23:00:00Z", 2.0, 4.0, None),
            step("2025-03-02T00:00:00Z", 1.0, 3.0, Some(1.25)),
        ];

        let days = summarize_days(&steps);

        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(days[0].temp_min, 2.0);
        assert_eq!(days[0].temp_max, 4.0);
        assert_eq!(days[0].precipitation, 0.5);
        assert_eq!(days[0].wind_speed, 3.0);
        assert_eq!(days[1].precipitation, 1.25);
        assert_eq!(days[1].source, "MET Norway");
    }
}
