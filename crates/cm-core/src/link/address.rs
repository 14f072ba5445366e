//! Address resolution under the declared precedence list.

use serde::Serialize;
use tracing::debug;

use cm_common::{AddressFields, AddressSources, CarrierId, GeocodedAddress, MatchTier, SourceKind};
use cm_config::{LogicalField, PrecedenceList};

/// A lower-precedence source disagreed with the value that was kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldConflict {
    pub dot_number: CarrierId,
    pub field: LogicalField,
    pub kept_source: SourceKind,
    pub kept: String,
    pub other_source: SourceKind,
    pub other: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedAddress {
    pub fields: AddressFields,
    pub sources: AddressSources,
    pub conflicts: Vec<FieldConflict>,
}

fn component(address: &AddressFields, field: LogicalField) -> Option<&str> {
    match field {
        LogicalField::PhyStreet => address.street.as_deref(),
        LogicalField::PhyCity => address.city.as_deref(),
        LogicalField::PhyState => address.state.as_deref(),
        LogicalField::PhyZip => address.zip.as_deref(),
    }
}

fn candidate<'a>(
    census: &'a AddressFields,
    geocoded: Option<&'a AddressFields>,
    source: SourceKind,
    field: LogicalField,
) -> Option<&'a str> {
    match source {
        SourceKind::Census => component(census, field),
        SourceKind::Geocode => geocoded.and_then(|a| component(a, field)),
        _ => None,
    }
}

fn same_value(a: &str, b: &str) -> bool {
    let norm = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
    norm(a) == norm(b)
}

/// Pick each address component from the first source in precedence order
/// that has it. Unmatched geocodes supply nothing.
pub fn resolve_address(
    dot_number: CarrierId,
    census: &AddressFields,
    geocode: Option<&GeocodedAddress>,
    precedence: &PrecedenceList,
) -> ResolvedAddress {
    let geocoded = geocode.filter(|g| g.tier != MatchTier::Unmatched).map(|g| &g.matched);

    let mut resolved = ResolvedAddress::default();
    for field in LogicalField::ALL {
        let mut kept: Option<(SourceKind, &str)> = None;
        for &source in precedence.order_for(field) {
            let Some(value) = candidate(census, geocoded, source, field) else {
                continue;
            };
            match kept {
                None => kept = Some((source, value)),
                Some((kept_source, kept_value)) if !same_value(kept_value, value) => {
                    debug!(
                        dot_number = dot_number.0,
                        field = field.as_str(),
                        kept = kept_source.as_str(),
                        other = source.as_str(),
                        "address conflict resolved by precedence"
                    );
                    resolved.conflicts.push(FieldConflict {
                        dot_number,
                        field,
                        kept_source,
                        kept: kept_value.to_string(),
                        other_source: source,
                        other: value.to_string(),
                    });
                }
                Some(_) => {}
            }
        }
        let (value, source) = match kept {
            Some((source, value)) => (Some(value.to_string()), Some(source)),
            None => (None, None),
        };
        match field {
            LogicalField::PhyStreet => {
                resolved.fields.street = value;
                resolved.sources.street = source;
            }
            LogicalField::PhyCity => {
                resolved.fields.city = value;
                resolved.sources.city = source;
            }
            LogicalField::PhyState => {
                resolved.fields.state = value;
                resolved.sources.state = source;
            }
            LogicalField::PhyZip => {
                resolved.fields.zip = value;
                resolved.sources.zip = source;
            }
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_config::FieldPrecedence;

    fn census() -> AddressFields {
        AddressFields {
            street: Some("12 Main St".into()),
            city: Some("Austin".into()),
            state: Some("TX".into()),
            zip: None,
        }
    }

    fn geocode(tier: MatchTier) -> GeocodedAddress {
        GeocodedAddress {
            dot_number: CarrierId(1),
            tier,
            latitude: Some(30.0),
            longitude: Some(-97.0),
            matched: AddressFields {
                street: Some("12 MAIN ST".into()),
                city: Some("ROUND ROCK".into()),
                state: Some("TX".into()),
                zip: Some("78664".into()),
            },
        }
    }

    #[test]
    fn census_wins_and_geocode_fills_gaps() {
        let g = geocode(MatchTier::Exact);
        let r = resolve_address(CarrierId(1), &census(), Some(&g), &PrecedenceList::default());
        assert_eq!(r.fields.city.as_deref(), Some("Austin"));
        assert_eq!(r.fields.zip.as_deref(), Some("78664"));
        assert_eq!(r.sources.zip, Some(SourceKind::Geocode));
        assert_eq!(r.sources.street, Some(SourceKind::Census));
        // Street differs only by case: not a conflict. City disagrees.
        assert_eq!(r.conflicts.len(), 1);
        assert_eq!(r.conflicts[0].field, LogicalField::PhyCity);
        assert_eq!(r.conflicts[0].other, "ROUND ROCK");
    }

    #[test]
    fn unmatched_geocode_contributes_nothing() {
        let g = geocode(MatchTier::Unmatched);
        let r = resolve_address(CarrierId(1), &census(), Some(&g), &PrecedenceList::default());
        assert_eq!(r.fields.zip, None);
        assert!(r.conflicts.is_empty());
    }

    #[test]
    fn reversed_precedence_prefers_geocoder() {
        let precedence = PrecedenceList {
            rules: vec![FieldPrecedence {
                field: LogicalField::PhyCity,
                order: vec![SourceKind::Geocode, SourceKind::Census],
            }],
        };
        let g = geocode(MatchTier::Interpolated);
        let r = resolve_address(CarrierId(1), &census(), Some(&g), &precedence);
        assert_eq!(r.fields.city.as_deref(), Some("ROUND ROCK"));
        // Fields without a rule fall back to census only.
        assert_eq!(r.fields.zip, None);
    }
}
