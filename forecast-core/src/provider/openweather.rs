use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::{
    error::SourceError,
    model::{DailyObservation, HourlyObservation, SourceForecast},
    provider::{ProviderId, geocode::Geocoder, read_body},
};

use super::ForecastSource;

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";
const SOURCE: &str = ProviderId::OpenWeather.source_name();

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    http: Client,
    geocoder: Geocoder,
    base_url: String,
}

impl OpenWeatherProvider {
    pub fn new(http: Client, api_key: String, geocoder: Geocoder) -> Self {
        Self { api_key, http, geocoder, base_url: DEFAULT_BASE_URL.to_string() }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct OwOneHour {
    #[serde(rename = "1h", default)]
    one_hour: f64,
}

#[derive(Debug, Deserialize)]
struct OwHour {
    dt: i64,
    temp: f64,
    wind_speed: f64,
    rain: Option<OwOneHour>,
    snow: Option<OwOneHour>,
}

#[derive(Debug, Deserialize)]
struct OwDayTemp {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct OwDay {
    dt: i64,
    temp: OwDayTemp,
    wind_speed: f64,
    #[serde(default)]
    rain: f64,
    #[serde(default)]
    snow: f64,
}

#[derive(Debug, Deserialize)]
struct OwOneCallResponse {
    #[serde(default)]
    timezone_offset: i64,
    #[serde(default)]
    hourly: Vec<OwHour>,
    #[serde(default)]
    daily: Vec<OwDay>,
}

#[async_trait]
impl ForecastSource for OpenWeatherProvider {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn fetch(&self, location: &str) -> Result<SourceForecast, SourceError> {
        let city = self.geocoder.locate(location).await?;

        let res = self
            .http
            .get(format!("{}/data/3.0/onecall", self.base_url))
            .query(&[
                ("lat", city.latitude.to_string()),
                ("lon", city.longitude.to_string()),
                ("appid", self.api_key.clone()),
                ("units", "metric".to_string()),
                ("exclude", "minutely,alerts".to_string()),
            ])
            .send()
            .await?;

        let parsed: OwOneCallResponse = serde_json::from_str(&read_body(res).await?)?;

        let hourly = parsed
            .hourly
            .iter()
            .take(24)
            .map(|h| {
                let precipitation = h.rain.as_ref().map_or(0.0, |r| r.one_hour)
                    + h.snow.as_ref().map_or(0.0, |s| s.one_hour);
                Ok(HourlyObservation {
                    time: unix_to_utc(h.dt)?.into(),
                    temperature: h.temp,
                    precipitation,
                    wind_speed: h.wind_speed,
                    source: SOURCE.to_string(),
                })
            })
            .collect::<Result<Vec<_>, SourceError>>()?;

        let daily = parsed
            .daily
            .iter()
            .take(7)
            .map(|d| {
                Ok(DailyObservation {
                    date: unix_to_utc(d.dt + parsed.timezone_offset)?.date_naive(),
                    temp_min: d.temp.min,
                    temp_max: d.temp.max,
                    precipitation: d.rain + d.snow,
                    wind_speed: d.wind_speed,
                    source: SOURCE.to_string(),
                })
            })
            .collect::<Result<Vec<_>, SourceError>>()?;

        Ok(SourceForecast {
            city: city.name,
            country: city.country,
            timezone: city.timezone,
            hourly,
            daily,
        })
    }
}

fn unix_to_utc(ts: i64) -> Result<DateTime<Utc>, SourceError> {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .ok_or_else(|| SourceError::Parse(format!("timestamp {ts} out of range")))
}
