//! Declared source precedence for fields present in more than one source.
//!
//! The record linker never merges overlapping fields by "last write wins".
//! For each logical field the first source in the declared order that has a
//! non-null value supplies it; the rest are recorded as conflicts when they
//! disagree.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use cm_common::SourceKind;

use crate::error::ConfigError;

/// Fields that more than one source can supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalField {
    PhyStreet,
    PhyCity,
    PhyState,
    PhyZip,
}

impl LogicalField {
    pub const ALL: [LogicalField; 4] = [
        LogicalField::PhyStreet,
        LogicalField::PhyCity,
        LogicalField::PhyState,
        LogicalField::PhyZip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalField::PhyStreet => "phy_street",
            LogicalField::PhyCity => "phy_city",
            LogicalField::PhyState => "phy_state",
            LogicalField::PhyZip => "phy_zip",
        }
    }
}

impl fmt::Display for LogicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered sources for one field, most authoritative first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPrecedence {
    pub field: LogicalField,
    pub order: Vec<SourceKind>,
}

/// The full, inspectable precedence declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecedenceList {
    pub rules: Vec<FieldPrecedence>,
}

impl Default for PrecedenceList {
    /// Census registration first; the geocoder's standardized address only
    /// fills components the registration leaves empty.
    fn default() -> Self {
        PrecedenceList {
            rules: LogicalField::ALL
                .iter()
                .map(|field| FieldPrecedence {
                    field: *field,
                    order: vec![SourceKind::Census, SourceKind::Geocode],
                })
                .collect(),
        }
    }
}

impl PrecedenceList {
    /// Sources for a field in precedence order. Fields without a rule fall
    /// back to census only.
    pub fn order_for(&self, field: LogicalField) -> &[SourceKind] {
        self.rules
            .iter()
            .find(|rule| rule.field == field)
            .map(|rule| rule.order.as_slice())
            .unwrap_or(&[SourceKind::Census])
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut fields = HashSet::new();
        for rule in &self.rules {
            if !fields.insert(rule.field) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate precedence rule for {}",
                    rule.field
                )));
            }
            if rule.order.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "precedence rule for {} lists no sources",
                    rule.field
                )));
            }
            let unique: HashSet<_> = rule.order.iter().collect();
            if unique.len() != rule.order.len() {
                return Err(ConfigError::Invalid(format!(
                    "precedence rule for {} repeats a source",
                    rule.field
                )));
            }
            if let Some(bad) = rule
                .order
                .iter()
                .find(|s| !matches!(s, SourceKind::Census | SourceKind::Geocode))
            {
                return Err(ConfigError::Invalid(format!(
                    "source {bad} cannot supply {}",
                    rule.field
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prefers_census() {
        let list = PrecedenceList::default();
        assert!(list.validate().is_ok());
        assert_eq!(
            list.order_for(LogicalField::PhyZip),
            &[SourceKind::Census, SourceKind::Geocode]
        );
    }

    #[test]
    fn empty_rule_rejected() {
        let list = PrecedenceList {
            rules: vec![FieldPrecedence {
                field: LogicalField::PhyCity,
                order: vec![],
            }],
        };
        assert!(list.validate().is_err());
    }

    #[test]
    fn unsupported_source_rejected() {
        let list = PrecedenceList {
            rules: vec![FieldPrecedence {
                field: LogicalField::PhyCity,
                order: vec![SourceKind::Insurance],
            }],
        };
        assert!(list.validate().is_err());
    }

    #[test]
    fn missing_rule_falls_back_to_census() {
        let list = PrecedenceList { rules: vec![] };
        assert_eq!(list.order_for(LogicalField::PhyState), &[SourceKind::Census]);
    }

    #[test]
    fn serde_roundtrip() {
        let list = PrecedenceList::default();
        let json = serde_json::to_string(&list).unwrap();
        assert!(json.contains("\"phy_street\""));
        let back: PrecedenceList = serde_json::from_str(&json).unwrap();
        assert_eq!(back, list);
    }
}
