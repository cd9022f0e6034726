//! Place-name lookup through the OpenWeatherMap geocoding API.
//! Shared by the providers that only accept coordinates.

use reqwest::Client;
use serde::Deserialize;

use crate::{error::SourceError, provider::read_body};

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

#[derive(Debug, Clone, PartialEq)]
pub struct CityInfo {
    pub name: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Label such as "UTC+2".
    pub timezone: String,
}

#[derive(Debug, Clone)]
pub struct Geocoder {
    http: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GeoEntry {
    name: String,
    country: String,
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct OffsetResponse {
    #[serde(default)]
    timezone: i64,
}

impl Geocoder {
    pub fn new(http: Client, api_key: String) -> Self {
        Self { http, api_key, base_url: DEFAULT_BASE_URL.to_string() }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn locate(&self, location: &str) -> Result<CityInfo, SourceError> {
        let res = self
            .http
            .get(format!("{}/geo/1.0/direct", self.base_url))
            .query(&[("q", location), ("limit", "1"), ("appid", self.api_key.as_str())])
            .send()
            .await?;

        let entries: Vec<GeoEntry> = serde_json::from_str(&read_body(res).await?)?;
        let entry = entries
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::LocationNotFound(location.to_string()))?;

        let res = self
            .http
            .get(format!("{}/data/2.5/weather", self.base_url))
            .query(&[
                ("lat", entry.lat.to_string()),
                ("lon", entry.lon.to_string()),
                ("appid", self.api_key.clone()),
            ])
            .send()
            .await?;

        let offset: OffsetResponse = serde_json::from_str(&read_body(res).await?)?;

        Ok(CityInfo {
            name: entry.name,
            country: entry.country,
            latitude: entry.lat,
            longitude: entry.lon,
            timezone: offset_label(offset.timezone),
        })
    }
}

/// "UTC+2" style label; partial hours round down.
pub fn offset_label(offset_secs: i64) -> String {
    format!("UTC{:+}", offset_secs.div_euclid(3600))
}
