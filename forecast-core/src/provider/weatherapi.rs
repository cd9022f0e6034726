use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use reqwest::Client;
use serde::Deserialize;

use crate::{
    error::SourceError,
    model::{DailyObservation, HourlyObservation, ObservedAt, SourceForecast},
    provider::{ProviderId, read_body},
};

use super::ForecastSource;

const DEFAULT_BASE_URL: &str = "http://api.weatherapi.com";
const SOURCE: &str = ProviderId::WeatherApi.source_name();

#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    http: Client,
    base_url: String,
}

impl WeatherApiProvider {
    pub fn new(http: Client, api_key: String) -> Self {
        Self { api_key, http, base_url: DEFAULT_BASE_URL.to_string() }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct WaLocation {
    name: String,
    country: String,
    tz_id: String,
}

#[derive(Debug, Deserialize)]
struct WaForecastHour {
    /// Local time, "2025-06-01 13:00"
    time: String,
    temp_c: f64,
    precip_mm: f64,
    wind_kph: f64,
}

#[derive(Debug, Deserialize)]
struct WaDay {
    mintemp_c: f64,
    maxtemp_c: f64,
    totalprecip_mm: f64,
    maxwind_kph: f64,
}

#[derive(Debug, Deserialize)]
struct WaForecastDay {
    date: String,
    day: WaDay,
    #[serde(default)]
    hour: Vec<WaForecastHour>,
}

#[derive(Debug, Deserialize)]
struct WaForecast {
    forecastday: Vec<WaForecastDay>,
}

#[derive(Debug, Deserialize)]
struct WaForecastResponse {
    location: WaLocation,
    forecast: WaForecast,
}

#[async_trait]
impl ForecastSource for WeatherApiProvider {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn fetch(&self, location: &str) -> Result<SourceForecast, SourceError> {
        let res = self
            .http
            .get(format!("{}/v1/forecast.json", self.base_url))
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", location),
                ("days", "7"),
                ("aqi", "no"),
                ("alerts", "no"),
            ])
            .send()
            .await?;

        let parsed: WaForecastResponse = serde_json::from_str(&read_body(res).await?)?;

        // Hourly data only for the first forecast day.
        let hourly = match parsed.forecast.forecastday.first() {
            Some(today) => today
                .hour
                .iter()
                .map(|h| {
                    let time = NaiveDateTime::parse_from_str(&h.time, "%Y-%m-%d %H:%M")?;
                    Ok(HourlyObservation {
                        time: ObservedAt::Local(time),
                        temperature: h.temp_c,
                        precipitation: h.precip_mm,
                        wind_speed: kph_to_mps(h.wind_kph),
                        source: SOURCE.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, SourceError>>()?,
            None => Vec::new(),
        };

        let daily = parsed
            .forecast
            .forecastday
            .iter()
            .map(|d| {
                Ok(DailyObservation {
                    date: NaiveDate::parse_from_str(&d.date, "%Y-%m-%d")?,
                    temp_min: d.day.mintemp_c,
                    temp_max: d.day.maxtemp_c,
                    precipitation: d.day.totalprecip_mm,
                    wind_speed: kph_to_mps(d.day.maxwind_kph),
                    source: SOURCE.to_string(),
                })
            })
            .collect::<Result<Vec<_>, SourceError>>()?;

        Ok(SourceForecast {
            city: parsed.location.name,
            country: parsed.location.country,
            timezone: parsed.location.tz_id,
            hourly,
            daily,
        })
    }
}

pub(crate) fn kph_to_mps(kph: f64) -> f64 {
    kph / 3.6
}
