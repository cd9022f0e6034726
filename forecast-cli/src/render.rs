//! Plain-text rendering of an aggregation report.

use std::fmt::Write;

use forecast_core::{AggregationReport, DailyObservation, ObservedAt, UnifiedForecast};

/// Days above this much precipitation count as rainy.
const RAIN_DAY_MM: f64 = 0.5;
/// Only call out the rainiest day when it is this wet.
const RAINIEST_DAY_MM: f64 = 2.0;

#[derive(Debug, Clone, Copy)]
pub struct Sections {
    pub hourly: bool,
    pub daily: bool,
}

pub fn render_report(location: &str, report: &AggregationReport, sections: Sections) -> String {
    let mut out = match &report.forecast {
        Some(forecast) => render_forecast(forecast, sections),
        None => no_data(location),
    };

    if !report.succeeded.is_empty() {
        let _ = writeln!(out, "Sources: {}", report.succeeded.join(", "));
    }
    for failure in &report.failures {
        let _ = writeln!(out, "Unavailable: {} ({})", failure.source, failure.error);
    }

    out
}

pub fn no_data(location: &str) -> String {
    format!("No weather data available for {location}.\n")
}

pub fn render_forecast(forecast: &UnifiedForecast, sections: Sections) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}, {}", forecast.city(), forecast.country());
    let _ = writeln!(out, "Timezone: {}", forecast.timezone());

    if sections.hourly && !forecast.hourly().is_empty() {
        let _ = writeln!(out, "\nNext hours");
        for h in forecast.hourly() {
            let _ = writeln!(
                out,
                "  {:<13}  {:>6.1}°C  {:>6.2} mm  {:>4.0} km/h",
                hour_label(&h.time),
                h.temperature,
                h.precipitation,
                to_kmh(h.wind_speed),
            );
        }
    }

    if sections.daily && !forecast.daily().is_empty() {
        let _ = writeln!(out, "\n7-day outlook");
        for d in forecast.daily() {
            let _ = writeln!(
                out,
                "  {}  {:>5.1} – {:>5.1}°C  {:>6.2} mm  {:>4.0} km/h",
                d.date.format("%a %d %b"),
                d.temp_min,
                d.temp_max,
                d.precipitation,
                to_kmh(d.wind_speed),
            );
        }
        out.push_str(&week_summary(forecast.daily()));
    }

    let _ = writeln!(out, "\nUpdated: {}", forecast.last_updated().format("%Y-%m-%d %H:%M UTC"));
    out
}

/// Zoned buckets are UTC hours and say so; local ones are shown as reported.
fn hour_label(time: &ObservedAt) -> String {
    let label = time.naive().format("%a %H:%M").to_string();
    if time.is_zoned() { format!("{label} UTC") } else { label }
}

fn week_summary(days: &[DailyObservation]) -> String {
    let mut out = String::from("\n");

    let (Some(hottest), Some(coldest)) = (
        days.iter().max_by(|a, b| a.temp_max.total_cmp(&b.temp_max)),
        days.iter().min_by(|a, b| a.temp_min.total_cmp(&b.temp_min)),
    ) else {
        return String::new();
    };

    let _ = writeln!(out, "Hottest: {} ({:.1}°C)", hottest.date.format("%A"), hottest.temp_max);
    let _ = writeln!(out, "Coldest: {} ({:.1}°C)", coldest.date.format("%A"), coldest.temp_min);

    let total: f64 = days.iter().map(|d| d.precipitation).sum();
    if total > 0.0 {
        let rainy = days.iter().filter(|d| d.precipitation > RAIN_DAY_MM).count();
        let _ = writeln!(out, "Rain: {total:.1} mm total, {rainy} of {} days wet", days.len());

        if let Some(wettest) = days
            .iter()
            .max_by(|a, b| a.precipitation.total_cmp(&b.precipitation))
            .filter(|d| d.precipitation > RAINIEST_DAY_MM)
        {
            let _ = writeln!(
                out,
                "Wettest: {} ({:.1} mm)",
                wettest.date.format("%A"),
                wettest.precipitation
            );
        }
    } else {
        let _ = writeln!(out, "Rain: none expected");
    }

    let avg_kmh = to_kmh(days.iter().map(|d| d.wind_speed).sum::<f64>() / days.len() as f64);
    let _ = writeln!(out, "Wind: {avg_kmh:.0} km/h average, {}", wind_description(avg_kmh));

    out
}

fn wind_description(kmh: f64) -> &'static str {
    match kmh {
        k if k < 11.0 => "light",
        k if k < 22.0 => "moderate breeze",
        k if k < 36.0 => "strong",
        _ => "very strong",
    }
}

fn to_kmh(mps: f64) -> f64 {
    mps * 3.6
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use forecast_core::{HourlyObservation, SourceError, SourceFailure};

    fn day(d: u32, min: f64, max: f64, precip: f64, wind: f64) -> DailyObservation {
        DailyObservation {
            date: NaiveDate::from_ymd_opt(2025, 6, d).unwrap(),
            temp_min: min,
            temp_max: max,
            precipitation: precip,
            wind_speed: wind,
            source: "Aggregated (2 sources)".into(),
        }
    }

    fn sample() -> UnifiedForecast {
        let hourly = vec![HourlyObservation {
            time: ObservedAt::Local(
                NaiveDate::from_ymd_opt(2025, 6, 2).unwrap().and_hms_opt(9, 0, 0).unwrap(),
            ),
            temperature: 18.0,
            precipitation: 0.25,
            wind_speed: 5.0,
            source: "Aggregated (2 sources)".into(),
        }];
        let daily = vec![day(2, 12.0, 24.5, 0.0, 3.0), day(3, 9.5, 20.0, 6.3, 5.0)];

        UnifiedForecast::new("Granada".into(), "ES".into(), "Europe/Madrid".into(), hourly, daily)
    }

    #[test]
    fn absent_forecast_says_no_data() {
        let report = AggregationReport {
            forecast: None,
            succeeded: Vec::new(),
            failures: vec![SourceFailure {
                source: "WeatherAPI".into(),
                error: SourceError::LocationNotFound("Nowhere".into()),
            }],
        };

        let text = render_report("Nowhere", &report, Sections { hourly: true, daily: true });

        assert!(text.starts_with("No weather data available for Nowhere."));
        assert!(text.contains("Unavailable: WeatherAPI (location 'Nowhere' not found)"));
    }

    #[test]
    fn forecast_lists_hours_days_and_summary() {
        let text = render_forecast(&sample(), Sections { hourly: true, daily: true });

        assert!(text.starts_with("Granada, ES\nTimezone: Europe/Madrid"));
        assert!(text.contains("Mon 09:00        18.0°C    0.25 mm    18 km/h"));
        assert!(text.contains("Hottest: Monday (24.5°C)"));
        assert!(text.contains("Coldest: Tuesday (9.5°C)"));
        assert!(text.contains("Rain: 6.3 mm total, 1 of 2 days wet"));
        assert!(text.contains("Wettest: Tuesday (6.3 mm)"));
        assert!(text.contains("Wind: 14 km/h average, moderate breeze"));
    }

    #[test]
    fn utc_hours_are_labelled() {
        let at = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap().and_hms_opt(7, 0, 0).unwrap();

        assert_eq!(hour_label(&ObservedAt::from(at.and_utc())), "Mon 07:00 UTC");
        assert_eq!(hour_label(&ObservedAt::Local(at)), "Mon 07:00");
    }

    #[test]
    fn sections_can_be_hidden() {
        let text = render_forecast(&sample(), Sections { hourly: false, daily: true });
        assert!(!text.contains("Next hours"));
        assert!(text.contains("7-day outlook"));

        let text = render_forecast(&sample(), Sections { hourly: true, daily: false });
        assert!(!text.contains("7-day outlook"));
    }

    #[test]
    fn dry_week_is_reported() {
        let summary = week_summary(&[day(2, 10.0, 20.0, 0.0, 1.0)]);
        assert!(summary.contains("Rain: none expected"));
        assert!(summary.contains("light"));
    }

    #[test]
    fn wind_bands() {
        assert_eq!(wind_description(5.0), "light");
        assert_eq!(wind_description(30.0), "strong");
        assert_eq!(wind_description(50.0), "very strong");
    }
}
