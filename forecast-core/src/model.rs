use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp attached to an hourly observation.
///
/// Some providers report local wall-clock time without a zone, others report
/// a zoned instant. Both are kept as reported and reconciled at bucketing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservedAt {
    Local(NaiveDateTime),
    Zoned(DateTime<FixedOffset>),
}

impl ObservedAt {
    /// Zone-free timestamp: zoned instants are converted to UTC first.
    pub fn naive(&self) -> NaiveDateTime {
        match self {
            ObservedAt::Local(dt) => *dt,
            ObservedAt::Zoned(dt) => dt.with_timezone(&Utc).naive_utc(),
        }
    }

    pub fn is_zoned(&self) -> bool {
        matches!(self, ObservedAt::Zoned(_))
    }

    /// Hour bucket this timestamp belongs to.
    pub fn hour_key(&self) -> NaiveDateTime {
        let dt = self.naive();
        dt.with_minute(0)
            .and_then(|d| d.with_second(0))
            .and_then(|d| d.with_nanosecond(0))
            .unwrap_or(dt)
    }
}

impl From<NaiveDateTime> for ObservedAt {
    fn from(dt: NaiveDateTime) -> Self {
        ObservedAt::Local(dt)
    }
}

impl From<DateTime<FixedOffset>> for ObservedAt {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        ObservedAt::Zoned(dt)
    }
}

impl From<DateTime<Utc>> for ObservedAt {
    fn from(dt: DateTime<Utc>) -> Self {
        ObservedAt::Zoned(dt.fixed_offset())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyObservation {
    pub time: ObservedAt,
    /// °C
    pub temperature: f64,
    /// mm per hour
    pub precipitation: f64,
    /// m/s
    pub wind_speed: f64,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyObservation {
    pub date: NaiveDate,
    pub temp_min: f64,
    pub temp_max: f64,
    /// Total over the day, mm
    pub precipitation: f64,
    /// Average over the day, m/s
    pub wind_speed: f64,
    pub source: String,
}

/// What a single provider returned for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceForecast {
    pub city: String,
    pub country: String,
    pub timezone: String,
    pub hourly: Vec<HourlyObservation>,
    pub daily: Vec<DailyObservation>,
}

/// Consensus forecast built from every provider that answered.
///
/// Constructed once per aggregation and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedForecast {
    city: String,
    country: String,
    timezone: String,
    hourly: Vec<HourlyObservation>,
    daily: Vec<DailyObservation>,
    last_updated: DateTime<Utc>,
}

impl UnifiedForecast {
    pub fn new(
        city: String,
        country: String,
        timezone: String,
        hourly: Vec<HourlyObservation>,
        daily: Vec<DailyObservation>,
    ) -> Self {
        Self { city, country, timezone, hourly, daily, last_updated: Utc::now() }
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    /// Up to 24 hourly records, earliest first.
    pub fn hourly(&self) -> &[HourlyObservation] {
        &self.hourly
    }

    /// Up to 7 daily records, earliest first.
    pub fn daily(&self) -> &[DailyObservation] {
        &self.daily
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn zoned_time_is_normalized_to_utc() {
        let madrid = FixedOffset::east_opt(2 * 3600).unwrap();
        let at: ObservedAt = madrid.with_ymd_and_hms(2025, 6, 1, 14, 0, 0).unwrap().into();

        let expected = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(at.naive(), expected);
    }

    #[test]
    fn hour_key_truncates_minutes_and_seconds() {
        let dt = NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_milli_opt(9, 47, 13, 250)
            .unwrap();
        let key = ObservedAt::Local(dt).hour_key();

        assert_eq!(key, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap().and_hms_opt(9, 0, 0).unwrap());
    }

    #[test]
    fn local_time_is_kept_as_is() {
        let dt = NaiveDate::from_ymd_opt(2025, 1, 3).unwrap().and_hms_opt(23, 0, 0).unwrap();
        assert_eq!(ObservedAt::Local(dt).naive(), dt);
    }

    #[test]
    fn unified_forecast_stamps_last_updated() {
        let before = Utc::now();
        let forecast = UnifiedForecast::new(
            "Oslo".into(),
            "NO".into(),
            "UTC+1".into(),
            Vec::new(),
            Vec::new(),
        );

        assert!(forecast.last_updated() >= before);
        assert_eq!(forecast.city(), "Oslo");
        assert!(forecast.hourly().is_empty());
    }
}
