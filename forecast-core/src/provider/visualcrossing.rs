use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::{
    error::SourceError,
    model::{DailyObservation, HourlyObservation, ObservedAt, SourceForecast},
    provider::{ProviderId, read_body, weatherapi::kph_to_mps},
};

use super::ForecastSource;

const DEFAULT_BASE_URL: &str = "https://weather.visualcrossing.com";
const SOURCE: &str = ProviderId::VisualCrossing.source_name();

#[derive(Debug, Clone)]
pub struct VisualCrossingProvider {
    api_key: String,
    http: Client,
    base_url: String,
}

impl VisualCrossingProvider {
    pub fn new(http: Client, api_key: String) -> Self {
        Self { api_key, http, base_url: DEFAULT_BASE_URL.to_string() }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// The location is one escaped path segment, whatever it contains.
    fn timeline_url(&self, location: &str) -> Result<Url, SourceError> {
        let base = format!("{}/VisualCrossingWebServices/rest/services/timeline", self.base_url);
        let mut url = Url::parse(&base).map_err(|err| SourceError::InvalidUrl(format!("{base}: {err}")))?;
        url.path_segments_mut()
            .map_err(|()| SourceError::InvalidUrl(base.clone()))?
            .push(location);
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VcResponse {
    resolved_address: String,
    timezone: String,
    #[serde(default)]
    days: Vec<VcDay>,
}

#[derive(Debug, Deserialize)]
struct VcDay {
    datetime: NaiveDate,
    tempmin: f64,
    tempmax: f64,
    precip: Option<f64>,
    /// km/h with the metric unit group
    windspeed: f64,
    #[serde(default)]
    hours: Vec<VcHour>,
}

#[derive(Debug, Deserialize)]
struct VcHour {
    datetime: NaiveTime,
    temp: f64,
    precip: Option<f64>,
    windspeed: f64,
}

#[async_trait]
impl ForecastSource for VisualCrossingProvider {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn fetch(&self, location: &str) -> Result<SourceForecast, SourceError> {
        let res = self
            .http
            .get(self.timeline_url(location)?)
            .query(&[
                ("key", self.api_key.as_str()),
                ("unitGroup", "metric"),
                ("include", "hours,days"),
                ("elements", "datetime,temp,tempmin,tempmax,precip,windspeed"),
            ])
            .send()
            .await?;

        let parsed: VcResponse = serde_json::from_str(&read_body(res).await?)?;

        let hourly: Vec<HourlyObservation> = parsed
            .days
            .first()
            .map(|today| {
                today
                    .hours
                    .iter()
                    .map(|h| HourlyObservation {
                        time: ObservedAt::Local(today.datetime.and_time(h.datetime)),
                        temperature: h.temp,
                        precipitation: h.precip.unwrap_or(0.0),
                        wind_speed: kph_to_mps(h.windspeed),
                        source: SOURCE.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let daily = parsed
            .days
            .iter()
            .take(7)
            .map(|d| DailyObservation {
                date: d.datetime,
                temp_min: d.tempmin,
                temp_max: d.tempmax,
                precipitation: d.precip.unwrap_or(0.0),
                wind_speed: kph_to_mps(d.windspeed),
                source: SOURCE.to_string(),
            })
            .collect();

        let (city, country) = split_address(&parsed.resolved_address);

        Ok(SourceForecast { city, country, timezone: parsed.timezone, hourly, daily })
    }
}

/// "Madrid, Comunidad de Madrid, España" -> ("Madrid", "España")
fn split_address(address: &str) -> (String, String) {
    let city = address.split(',').next().unwrap_or(address).trim();
    let country = address.rsplit(',').next().unwrap_or(address).trim();
    (city.to_string(), country.to_string())
}
