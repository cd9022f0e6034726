use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use reqwest::Client;
use serde::Deserialize;

use crate::{
    error::SourceError,
    model::{DailyObservation, HourlyObservation, SourceForecast},
    provider::{ProviderId, geocode::Geocoder, read_body},
};

use super::ForecastSource;

const DEFAULT_BASE_URL: &str = "https://api.tomorrow.io";
const SOURCE: &str = ProviderId::Tomorrow.source_name();
/// The daily timeline only carries a representative temperature.
const DAILY_SPREAD_C: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct TomorrowProvider {
    api_key: String,
    http: Client,
    geocoder: Geocoder,
    base_url: String,
}

impl TomorrowProvider {
    pub fn new(http: Client, api_key: String, geocoder: Geocoder) -> Self {
        Self { api_key, http, geocoder, base_url: DEFAULT_BASE_URL.to_string() }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct TmResponse {
    data: TmData,
}

#[derive(Debug, Deserialize)]
struct TmData {
    timelines: Vec<TmTimeline>,
}

#[derive(Debug, Deserialize)]
struct TmTimeline {
    timestep: String,
    intervals: Vec<TmInterval>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TmInterval {
    start_time: DateTime<FixedOffset>,
    values: TmValues,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TmValues {
    temperature: f64,
    precipitation_intensity: f64,
    wind_speed: f64,
}

#[async_trait]
impl ForecastSource for TomorrowProvider {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn fetch(&self, location: &str) -> Result<SourceForecast, SourceError> {
        let city = self.geocoder.locate(location).await?;

        let res = self
            .http
            .get(format!("{}/v4/timelines", self.base_url))
            .query(&[
                ("location", format!("{},{}", city.latitude, city.longitude)),
                ("fields", "temperature,precipitationIntensity,windSpeed".to_string()),
                ("timesteps", "1h,1d".to_string()),
                ("units", "metric".to_string()),
                ("apikey", self.api_key.clone()),
            ])
            .send()
            .await?;

        let parsed: TmResponse = serde_json::from_str(&read_body(res).await?)?;

        let mut hourly = Vec::new();
        let mut daily = Vec::new();

        for timeline in &parsed.data.timelines {
            match timeline.timestep.as_str() {
                "1h" => hourly.extend(timeline.intervals.iter().take(24).map(|i| {
                    HourlyObservation {
                        time: i.start_time.into(),
                        temperature: i.values.temperature,
                        precipitation: i.values.precipitation_intensity,
                        wind_speed: i.values.wind_speed,
                        source: SOURCE.to_string(),
                    }
                })),
                "1d" => daily.extend(timeline.intervals.iter().take(7).map(|i| DailyObservation {
                    date: i.start_time.date_naive(),
                    temp_min: i.values.temperature - DAILY_SPREAD_C,
                    temp_max: i.values.temperature + DAILY_SPREAD_C,
                    precipitation: i.values.precipitation_intensity * 24.0,
                    wind_speed: i.values.wind_speed,
                    source: SOURCE.to_string(),
                })),
                other => tracing::debug!(timestep = other, "ignoring unexpected Tomorrow.io timeline"),
            }
        }

        Ok(SourceForecast {
            city: city.name,
            country: city.country,
            timezone: city.timezone,
            hourly,
            daily,
        })
    }
}
