//! Typed record extraction from canonical tables.

use std::collections::BTreeMap;

use tracing::warn;

use cm_common::{
    AddressFields, CarrierId, CarrierRecord, CrashRecord, CrashSeverity, CrashSystem,
    GeocodedAddress, LabelDefinition, MatchTier, PolicyRow, Value,
};

use super::CanonicalTable;

fn text(v: &Value) -> Option<String> {
    v.as_str().map(str::to_string)
}

/// Census rows as carrier records. Census keys are never null.
pub fn census_records(table: &CanonicalTable) -> Vec<CarrierRecord> {
    table
        .rows
        .iter()
        .filter_map(|row| {
            let id = row.key?;
            let get = |name: &str| table.value(row, name);
            Some(CarrierRecord {
                dot_number: id,
                legal_name: get("legal_name").as_str().unwrap_or_default().to_string(),
                dba_name: text(get("dba_name")),
                carrier_operation: text(get("carrier_operation")),
                hazmat: get("hm_flag").as_bool(),
                passenger_carrier: get("pc_flag").as_bool(),
                address: AddressFields {
                    street: text(get("phy_street")),
                    city: text(get("phy_city")),
                    state: text(get("phy_state")),
                    zip: text(get("phy_zip")),
                },
                telephone: text(get("telephone")),
                email_address: text(get("email_address")),
                power_units: get("nbr_power_unit").as_i64(),
                drivers: get("driver_total").as_i64(),
                mcs150_date: get("mcs150_date").as_date(),
                mcs150_mileage: get("mcs150_mileage").as_i64(),
                mcs150_mileage_year: get("mcs150_mileage_year").as_i64(),
                recent_mileage: get("recent_mileage").as_i64(),
                recent_mileage_year: get("recent_mileage_year").as_i64(),
                add_date: get("add_date").as_date(),
            })
        })
        .collect()
}

/// Policy rows with a usable carrier id, plus the count of orphaned rows.
pub fn policy_rows(table: &CanonicalTable) -> (Vec<PolicyRow>, usize) {
    let mut orphaned = 0;
    let rows = table
        .rows
        .iter()
        .filter_map(|row| {
            let Some(id) = row.key else {
                orphaned += 1;
                return None;
            };
            Some(PolicyRow {
                dot_number: id,
                insurer: text(table.value(row, "insurer")),
                coverage_amount: table.value(row, "coverage_amount").as_f64(),
                effective_date: table.value(row, "effective_date").as_date(),
                cancel_date: table.value(row, "cancel_date").as_date(),
                coverage_type: text(table.value(row, "coverage_type")),
                cancel_method: text(table.value(row, "cancel_method")),
            })
        })
        .collect();
    (rows, orphaned)
}

/// Crash rows. FARS only records fatal crashes, so a missing FARS severity
/// is fatal. Rows without a crash or vehicle id cannot be fused and are
/// skipped with a warning.
pub fn crash_records(table: &CanonicalTable, system: CrashSystem) -> Vec<CrashRecord> {
    let mut skipped = 0usize;
    let records: Vec<CrashRecord> = table
        .rows
        .iter()
        .filter_map(|row| {
            let crash_id = table.value(row, "crash_id").as_str();
            let vehicle_id = table.value(row, "vehicle_id").as_str();
            let (Some(crash_id), Some(vehicle_id)) = (crash_id, vehicle_id) else {
                skipped += 1;
                return None;
            };
            let severity = match (table.value(row, "severity").as_str(), system) {
                (Some(raw), _) => CrashSeverity::parse(raw),
                (None, CrashSystem::Fars) => CrashSeverity::Fatal,
                (None, CrashSystem::Crss) => CrashSeverity::Unknown,
            };
            Some(CrashRecord {
                crash_id: crash_id.to_string(),
                vehicle_id: vehicle_id.to_string(),
                system,
                dot_number: row.key,
                at_fault: table.value(row, "at_fault").as_bool(),
                year: table
                    .value(row, "year")
                    .as_i64()
                    .and_then(|y| i32::try_from(y).ok()),
                severity,
            })
        })
        .collect();
    if skipped > 0 {
        warn!(system = system.as_str(), rows = skipped, "crash rows without crash/vehicle id skipped");
    }
    records
}

/// Cargo free text per carrier. Null cargo cells are omitted.
pub fn cargo_texts(table: &CanonicalTable) -> BTreeMap<CarrierId, String> {
    table
        .rows
        .iter()
        .filter_map(|row| {
            let text = table.value(row, "cargo_carried").as_str()?;
            Some((row.key?, text.to_string()))
        })
        .collect()
}

/// Geocoder results. Anything other than a `Match` is unmatched and keeps
/// null coordinates.
pub fn geocodes(table: &CanonicalTable) -> BTreeMap<CarrierId, GeocodedAddress> {
    table
        .rows
        .iter()
        .filter_map(|row| {
            let id = row.key?;
            let status = table.value(row, "match_status").as_str().unwrap_or_default();
            let kind = table.value(row, "match_type").as_str().unwrap_or_default();
            let tier = if !status.trim().eq_ignore_ascii_case("match") {
                MatchTier::Unmatched
            } else if kind.trim().eq_ignore_ascii_case("exact") {
                MatchTier::Exact
            } else {
                MatchTier::Interpolated
            };
            let coords = table.value(row, "lonlat").as_str().and_then(parse_lonlat);
            let geocode = match (tier, coords) {
                (MatchTier::Unmatched, _) | (_, None) => GeocodedAddress {
                    dot_number: id,
                    tier: MatchTier::Unmatched,
                    latitude: None,
                    longitude: None,
                    matched: AddressFields::default(),
                },
                (tier, Some((lon, lat))) => GeocodedAddress {
                    dot_number: id,
                    tier,
                    latitude: Some(lat),
                    longitude: Some(lon),
                    matched: table
                        .value(row, "matched_address")
                        .as_str()
                        .map(split_matched_address)
                        .unwrap_or_default(),
                },
            };
            Some((id, geocode))
        })
        .collect()
}

/// `"lon,lat"` → `(lon, lat)`.
fn parse_lonlat(raw: &str) -> Option<(f64, f64)> {
    let (lon, lat) = raw.split_once(',')?;
    let lon: f64 = lon.trim().parse().ok()?;
    let lat: f64 = lat.trim().parse().ok()?;
    ((-180.0..=180.0).contains(&lon) && (-90.0..=90.0).contains(&lat)).then_some((lon, lat))
}

/// `"STREET, CITY, ST, ZIP"` → components. Extra leading parts belong to
/// the street (suite numbers and the like).
pub fn split_matched_address(raw: &str) -> AddressFields {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
    if parts.len() < 4 {
        return AddressFields {
            street: parts.first().and_then(|s| non_empty(s)),
            ..AddressFields::default()
        };
    }
    let n = parts.len();
    AddressFields {
        street: non_empty(&parts[..n - 3].join(", ")),
        city: non_empty(parts[n - 3]),
        state: non_empty(parts[n - 2]).map(|s| s.to_ascii_uppercase()),
        zip: non_empty(parts[n - 1]),
    }
}

/// Binary targets per carrier, plus the number of rows whose label is not
/// covered by the definition.
pub fn labels(table: &CanonicalTable, definition: &LabelDefinition) -> (BTreeMap<CarrierId, u8>, usize) {
    let mut skipped = 0;
    let mut targets = BTreeMap::new();
    for row in &table.rows {
        let Some(id) = row.key else { continue };
        let raw = table.value(row, "expert_label").as_str();
        match raw.and_then(|raw| definition.target(raw)) {
            Some(target) => {
                targets.insert(id, target);
            }
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(rows = skipped, "annotation rows with unmapped labels skipped");
    }
    (targets, skipped)
}
