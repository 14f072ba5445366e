//! Data-quality score configuration.
//!
//! Defaults reproduce the monthly data-quality metric: sixteen key census
//! fields, a 500-row seeded sample, and equal weights for completeness,
//! validity, and timeliness.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Validity rule applied to non-null values of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidityCheck {
    /// Any non-null value is valid.
    Present,
    /// Rendered value must match `pattern` after removing `strip` characters.
    Pattern {
        pattern: String,
        #[serde(default)]
        strip: String,
    },
    /// Numeric value within `[min, max]`; a bound of `None` is open.
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    /// Value is one of an enumerated set (case-insensitive).
    OneOf { values: Vec<String> },
    /// Year value between `min_year` and the snapshot year.
    YearNotFuture { min_year: i32 },
    /// Date value not after the snapshot date.
    DateNotFuture,
}

/// Freshness rule. Missing values count as fully stale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Timeliness {
    /// Date field: `clip(1 - age_days / horizon_days, 0, 1)`.
    DateAge { horizon_days: f64 },
    /// Year field: `clip(1 - (snapshot_year - year) / horizon_years, 0, 1)`.
    YearAge { horizon_years: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field: String,
    #[serde(default = "default_field_weight")]
    pub weight: f64,
    pub check: ValidityCheck,
    #[serde(default)]
    pub timeliness: Option<Timeliness>,
}

fn default_field_weight() -> f64 {
    1.0
}

impl FieldRule {
    fn new(field: &str, check: ValidityCheck) -> Self {
        FieldRule {
            field: field.to_string(),
            weight: 1.0,
            check,
            timeliness: None,
        }
    }

    fn with_timeliness(mut self, timeliness: Timeliness) -> Self {
        self.timeliness = Some(timeliness);
        self
    }
}

/// Component weights of the aggregate score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DqsWeights {
    pub completeness: f64,
    pub validity: f64,
    pub timeliness: f64,
}

impl Default for DqsWeights {
    fn default() -> Self {
        DqsWeights {
            completeness: 1.0 / 3.0,
            validity: 1.0 / 3.0,
            timeliness: 1.0 / 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DqsConfig {
    pub sample_size: usize,
    pub weights: DqsWeights,
    pub fields: Vec<FieldRule>,
}

impl Default for DqsConfig {
    fn default() -> Self {
        let mileage = || ValidityCheck::Range {
            min: Some(0.0),
            max: Some(100_000_000.0),
        };
        let year = || ValidityCheck::YearNotFuture { min_year: 1900 };
        DqsConfig {
            sample_size: 500,
            weights: DqsWeights::default(),
            fields: vec![
                FieldRule::new("legal_name", ValidityCheck::Present),
                FieldRule::new("dba_name", ValidityCheck::Present),
                FieldRule::new(
                    "carrier_operation",
                    ValidityCheck::OneOf {
                        values: vec![
                            "Interstate".into(),
                            "Intrastate Hazmat".into(),
                            "Intrastate Non-Hazmat".into(),
                        ],
                    },
                ),
                FieldRule::new("add_date", ValidityCheck::DateNotFuture).with_timeliness(
                    Timeliness::DateAge {
                        horizon_days: 1825.0,
                    },
                ),
                FieldRule::new(
                    "email_address",
                    ValidityCheck::Pattern {
                        pattern: r"^[^@\s]+@[^@\s]+\.[^@\s]+$".into(),
                        strip: String::new(),
                    },
                ),
                FieldRule::new(
                    "telephone",
                    ValidityCheck::Pattern {
                        pattern: r"^\+?\d{7,15}$".into(),
                        strip: " ()-.".into(),
                    },
                ),
                FieldRule::new("phy_street", ValidityCheck::Present),
                FieldRule::new("phy_city", ValidityCheck::Present),
                FieldRule::new(
                    "phy_state",
                    ValidityCheck::Pattern {
                        pattern: r"^[A-Z]{2}$".into(),
                        strip: String::new(),
                    },
                ),
                FieldRule::new(
                    "phy_zip",
                    ValidityCheck::Pattern {
                        pattern: r"^\d{5}$".into(),
                        strip: String::new(),
                    },
                ),
                FieldRule::new(
                    "driver_total",
                    ValidityCheck::Range {
                        min: Some(0.0),
                        max: Some(1_000_000.0),
                    },
                ),
                FieldRule::new("mcs150_date", ValidityCheck::DateNotFuture).with_timeliness(
                    Timeliness::DateAge {
                        horizon_days: 730.0,
                    },
                ),
                FieldRule::new("mcs150_mileage", mileage()),
                FieldRule::new("mcs150_mileage_year", year()).with_timeliness(
                    Timeliness::YearAge { horizon_years: 5.0 },
                ),
                FieldRule::new("recent_mileage", mileage()),
                FieldRule::new("recent_mileage_year", year()).with_timeliness(
                    Timeliness::YearAge { horizon_years: 5.0 },
                ),
            ],
        }
    }
}

impl DqsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_size == 0 {
            return Err(ConfigError::Invalid("dqs.sample_size must be > 0".into()));
        }
        let w = self.weights;
        for (name, value) in [
            ("completeness", w.completeness),
            ("validity", w.validity),
            ("timeliness", w.timeliness),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "dqs.weights.{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if w.completeness + w.validity + w.timeliness <= 0.0 {
            return Err(ConfigError::Invalid("dqs weights sum to zero".into()));
        }
        if self.fields.is_empty() {
            return Err(ConfigError::Invalid("dqs.fields is empty".into()));
        }
        for rule in &self.fields {
            if !rule.weight.is_finite() || rule.weight < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "dqs field '{}' has invalid weight {}",
                    rule.field, rule.weight
                )));
            }
            match rule.timeliness {
                Some(Timeliness::DateAge { horizon_days: h })
                | Some(Timeliness::YearAge { horizon_years: h })
                    if h <= 0.0 =>
                {
                    return Err(ConfigError::Invalid(format!(
                        "dqs field '{}' has non-positive timeliness horizon",
                        rule.field
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}
