//! Per-source confidence weights.

use std::collections::HashMap;

/// Weight used for sources missing from the table.
pub const DEFAULT_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WeightError {
    #[error("weight for '{source_name}' must be a finite number in [0, 1], got {weight}")]
    OutOfRange { source_name: String, weight: f64 },
}

/// Static mapping from source identifier to weight.
///
/// Weights don't have to sum to 1: the aggregator renormalizes over the
/// sources present in each bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceWeights {
    weights: HashMap<String, f64>,
    default_weight: f64,
}

impl SourceWeights {
    pub fn new(default_weight: f64) -> Result<Self, WeightError> {
        check("<default>", default_weight)?;
        Ok(Self { weights: HashMap::new(), default_weight })
    }

    pub fn with_weight(mut self, source: impl Into<String>, weight: f64) -> Result<Self, WeightError> {
        let source = source.into();
        check(&source, weight)?;
        self.weights.insert(source, weight);
        Ok(self)
    }

    /// Weight for `source`, falling back to the default for unknown sources.
    pub fn weight_of(&self, source: &str) -> f64 {
        self.weights.get(source).copied().unwrap_or(self.default_weight)
    }

    pub fn default_weight(&self) -> f64 {
        self.default_weight
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl Default for SourceWeights {
    /// Reference table for the built-in providers.
    fn default() -> Self {
        let weights = [
            ("OpenWeatherMap", 0.25),
            ("MET Norway", 0.25),
            ("WeatherAPI", 0.20),
            ("Tomorrow.io", 0.15),
            ("Visual Crossing", 0.15),
        ]
        .into_iter()
        .map(|(name, w)| (name.to_string(), w))
        .collect();

        Self { weights, default_weight: DEFAULT_WEIGHT }
    }
}

fn check(source: &str, weight: f64) -> Result<(), WeightError> {
    if weight.is_finite() && (0.0..=1.0).contains(&weight) {
        Ok(())
    } else {
        Err(WeightError::OutOfRange { source_name: source.to_string(), weight })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_table_outweighs_unknown_sources() {
        let weights = SourceWeights::default();

        assert_eq!(weights.weight_of("MET Norway"), 0.25);
        assert_eq!(weights.weight_of("WeatherAPI"), 0.20);
        assert_eq!(weights.weight_of("Some Blog"), DEFAULT_WEIGHT);
        assert!(weights.iter().all(|(_, w)| w > weights.default_weight()));
    }

    #[test]
    fn rejects_out_of_range_weights() {
        let err = SourceWeights::new(0.1).unwrap().with_weight("a", 1.5).unwrap_err();
        assert!(err.to_string().contains("'a'"));

        assert!(SourceWeights::new(f64::NAN).is_err());
        assert!(SourceWeights::new(-0.1).is_err());
    }

    #[test]
    fn zero_weight_is_accepted() {
        let weights = SourceWeights::new(0.0).unwrap().with_weight("a", 0.0).unwrap();
        assert_eq!(weights.weight_of("a"), 0.0);
        assert_eq!(weights.iter().collect::<Vec<_>>(), [("a", 0.0)]);
    }
}
