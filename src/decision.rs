use crate::error::ConfigError;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Label {
    Tumor,
    Normal,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Tumor => "Tumor",
            Label::Normal => "Normal",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probability cutoff for the positive class, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(value: f64) -> Result<Self, ConfigError> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::ThresholdRange(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(0.5)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    #[serde(rename = "prediction")]
    pub label: Label,
    pub probability: f64,
}

/// Labels `probability` against `threshold`. A probability equal to the
/// threshold counts as `Tumor`. The reported probability is rounded to four
/// decimal places; the comparison uses the unrounded value.
pub fn decide(probability: f32, threshold: Threshold) -> Prediction {
    let probability = f64::from(probability);
    let label = if probability >= threshold.value() {
        Label::Tumor
    } else {
        Label::Normal
    };
    Prediction {
        label,
        probability: round4(probability),
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
