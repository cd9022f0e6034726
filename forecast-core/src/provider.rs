use crate::{
    Config, SourceCache,
    cache::CachedSource,
    error::SourceError,
    model::SourceForecast,
    provider::{
        geocode::Geocoder, metno::MetNoProvider, openweather::OpenWeatherProvider,
        tomorrow::TomorrowProvider, visualcrossing::VisualCrossingProvider,
        weatherapi::WeatherApiProvider,
    },
};
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::{convert::TryFrom, fmt::Debug, sync::Arc, time::Duration};

pub mod geocode;
pub mod metno;
pub mod openweather;
pub mod tomorrow;
pub mod visualcrossing;
pub mod weatherapi;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const USER_AGENT: &str = concat!("forecast-core/", env!("CARGO_PKG_VERSION"));

/// Built-in providers, in the order their metadata is preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenWeather,
    MetNo,
    WeatherApi,
    Tomorrow,
    VisualCrossing,
}

impl ProviderId {
    /// Short id used in config files and on the command line.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "openweather",
            ProviderId::MetNo => "metno",
            ProviderId::WeatherApi => "weatherapi",
            ProviderId::Tomorrow => "tomorrow",
            ProviderId::VisualCrossing => "visualcrossing",
        }
    }

    /// Label stamped on every observation the provider emits.
    pub const fn source_name(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "OpenWeatherMap",
            ProviderId::MetNo => "MET Norway",
            ProviderId::WeatherApi => "WeatherAPI",
            ProviderId::Tomorrow => "Tomorrow.io",
            ProviderId::VisualCrossing => "Visual Crossing",
        }
    }

    /// MET Norway has no key of its own; it borrows the OpenWeather key for geocoding.
    pub fn needs_api_key(&self) -> bool {
        !matches!(self, ProviderId::MetNo)
    }

    pub const fn all() -> &'static [ProviderId] {
        &[
            ProviderId::OpenWeather,
            ProviderId::MetNo,
            ProviderId::WeatherApi,
            ProviderId::Tomorrow,
            ProviderId::VisualCrossing,
        ]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        ProviderId::all().iter().copied().find(|id| id.as_str() == lower).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: \
                 openweather, metno, weatherapi, tomorrow, visualcrossing."
            )
        })
    }
}

/// One upstream forecast provider, translated into the shared schema.
#[async_trait]
pub trait ForecastSource: Send + Sync + Debug {
    /// Source identifier; also the key into the weight table.
    fn name(&self) -> &str;

    async fn fetch(&self, location: &str) -> Result<SourceForecast, SourceError>;
}

/// Build every configured provider in priority order, each behind the shared cache.
pub fn sources_from_config(
    config: &Config,
    cache: Arc<SourceCache>,
) -> anyhow::Result<Vec<Arc<dyn ForecastSource>>> {
    let http = http_client()?;
    let geocoder = config
        .provider_api_key(ProviderId::OpenWeather)
        .map(|key| Geocoder::new(http.clone(), key.to_owned()));
    let ttl = config.cache_ttl();

    let mut sources: Vec<Arc<dyn ForecastSource>> = Vec::new();

    for &id in ProviderId::all() {
        let api_key = config.provider_api_key(id).map(str::to_owned);

        let source: Option<Arc<dyn ForecastSource>> = match (id, api_key, geocoder.clone()) {
            (ProviderId::OpenWeather, Some(key), Some(geo)) => {
                Some(Arc::new(OpenWeatherProvider::new(http.clone(), key, geo)))
            }
            (ProviderId::MetNo, _, Some(geo)) => Some(Arc::new(MetNoProvider::new(http.clone(), geo))),
            (ProviderId::WeatherApi, Some(key), _) => {
                Some(Arc::new(WeatherApiProvider::new(http.clone(), key)))
            }
            (ProviderId::Tomorrow, Some(key), Some(geo)) => {
                Some(Arc::new(TomorrowProvider::new(http.clone(), key, geo)))
            }
            (ProviderId::VisualCrossing, Some(key), _) => {
                Some(Arc::new(VisualCrossingProvider::new(http.clone(), key)))
            }
            _ => None,
        };

        match source {
            Some(inner) => {
                sources.push(Arc::new(CachedSource::new(inner, cache.clone(), ttl)));
            }
            None => tracing::debug!(provider = %id, "provider not configured, skipping"),
        }
    }

    Ok(sources)
}

pub(crate) fn http_client() -> anyhow::Result<Client> {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))
}

/// Read the body of `res`, turning non-success statuses into `SourceError::Status`.
pub(crate) async fn read_body(res: Response) -> Result<String, SourceError> {
    let status = res.status();
    let body = res.text().await?;

    if !status.is_success() {
        return Err(SourceError::Status { status, body: truncate_body(&body) });
    }

    Ok(body)
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn provider_id_as_str_roundtrip() {
        for id in ProviderId::all() {
            let s = id.as_str();
            let parsed = ProviderId::try_from(s).expect("roundtrip should succeed");
            assert_eq!(*id, parsed);
        }
    }

    #[test]
    fn provider_id_parse_is_case_insensitive() {
        assert_eq!(ProviderId::try_from("MetNo").unwrap(), ProviderId::MetNo);
    }

    #[test]
    fn unknown_provider_error() {
        let err = ProviderId::try_from("doesnotexist").unwrap_err();
        assert!(err.to_string().contains("Unknown provider"));
    }

    #[test]
    fn no_sources_without_keys() {
        let cfg = Config::default();
        let sources = sources_from_config(&cfg, Arc::new(SourceCache::new())).unwrap();
        assert!(sources.is_empty());
    }

    #[test]
    fn sources_follow_priority_order() {
        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::VisualCrossing, "VC".into());
        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "WA".into());
        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "OWM".into());

        let sources = sources_from_config(&cfg, Arc::new(SourceCache::new())).unwrap();
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();

        assert_eq!(names, ["OpenWeatherMap", "MET Norway", "WeatherAPI", "Visual Crossing"]);
    }

    #[test]
    fn tomorrow_requires_geocoding_key() {
        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::Tomorrow, "TMR".into());

        let sources = sources_from_config(&cfg, Arc::new(SourceCache::new())).unwrap();
        assert!(sources.is_empty());
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let body = "é".repeat(150);
        let short = truncate_body(&body);
        assert!(short.ends_with("..."));
        assert!(short.len() <= 203);
    }
}
