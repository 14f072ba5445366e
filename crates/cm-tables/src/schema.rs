//! Arrow schema definitions for published tables.

use std::collections::HashMap;

use arrow::datatypes::{DataType, Field, Schema};

use crate::SCHEMA_VERSION;

/// Schema metadata key carrying [`SCHEMA_VERSION`].
pub const SCHEMA_VERSION_KEY: &str = "cm.schema_version";

fn versioned(fields: Vec<Field>) -> Schema {
    let metadata = HashMap::from([(SCHEMA_VERSION_KEY.to_string(), SCHEMA_VERSION.to_string())]);
    Schema::new(fields).with_metadata(metadata)
}

/// Published table names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableName {
    Master,
    UnresolvedCrashes,
}

impl TableName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableName::Master => "master",
            TableName::UnresolvedCrashes => "unresolved_crashes",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.parquet", self.as_str())
    }
}

/// Prefix of the per-category cargo columns.
pub const CARGO_COLUMN_PREFIX: &str = "cargo_";

/// Master table schema. One boolean column per cargo category follows the
/// fixed columns, in vocabulary order.
pub fn master_schema(cargo_slugs: &[String]) -> Schema {
    let mut fields = vec![
        // Identity and provenance
        Field::new("dot_number", DataType::UInt64, false),
        Field::new("snapshot_version", DataType::Utf8, false),
        Field::new("artifact_version", DataType::Utf8, true),
        // Registration
        Field::new("legal_name", DataType::Utf8, false),
        Field::new("dba_name", DataType::Utf8, true),
        Field::new("carrier_operation", DataType::Utf8, true),
        Field::new("hazmat", DataType::Boolean, true),
        Field::new("passenger_carrier", DataType::Boolean, true),
        Field::new("phy_street", DataType::Utf8, true),
        Field::new("phy_city", DataType::Utf8, true),
        Field::new("phy_state", DataType::Utf8, true),
        Field::new("phy_zip", DataType::Utf8, true),
        Field::new("address_source", DataType::Utf8, true),
        Field::new("telephone", DataType::Utf8, true),
        Field::new("email_address", DataType::Utf8, true),
        Field::new("power_units", DataType::Int64, true),
        Field::new("driver_total", DataType::Int64, true),
        Field::new("mcs150_date", DataType::Date32, true),
        Field::new("mcs150_mileage", DataType::Int64, true),
        Field::new("mcs150_mileage_year", DataType::Int64, true),
        Field::new("recent_mileage", DataType::Int64, true),
        Field::new("recent_mileage_year", DataType::Int64, true),
        Field::new("add_date", DataType::Date32, true),
        // Insurance summary
        Field::new("num_filings", DataType::UInt32, true),
        Field::new("num_unique_companies", DataType::UInt32, true),
        Field::new("max_coverage", DataType::Float64, true),
        Field::new("min_coverage", DataType::Float64, true),
        Field::new("active_policies", DataType::UInt32, true),
        Field::new("lapse_count", DataType::UInt32, true),
        Field::new("min_gap_days", DataType::Float64, true),
        Field::new("max_gap_days", DataType::Float64, true),
        Field::new("median_gap_days", DataType::Float64, true),
        Field::new("avg_gap_days", DataType::Float64, true),
        Field::new("first_effective", DataType::Date32, true),
        Field::new("last_effective", DataType::Date32, true),
        Field::new("top_company", DataType::Utf8, true),
        Field::new("top_company_share", DataType::Float64, true),
        Field::new("cancelled_method_count", DataType::UInt32, true),
        Field::new("replaced_method_count", DataType::UInt32, true),
        Field::new("name_changed_method_count", DataType::UInt32, true),
        Field::new("transferred_method_count", DataType::UInt32, true),
        Field::new("count_cargo", DataType::UInt32, true),
        Field::new("count_bipd", DataType::UInt32, true),
        Field::new("count_broker_bond", DataType::UInt32, true),
        Field::new("count_broker_trust_fund", DataType::UInt32, true),
        // Crash summary
        Field::new("total_crashes", DataType::UInt32, true),
        Field::new("total_at_fault_crashes", DataType::UInt32, true),
        Field::new("pct_at_fault", DataType::Float64, true),
        Field::new("fatal_crashes", DataType::UInt32, true),
        Field::new("fars_total", DataType::UInt32, true),
        Field::new("fars_at_fault", DataType::UInt32, true),
        Field::new("fars_pct_at_fault", DataType::Float64, true),
        Field::new("crss_total", DataType::UInt32, true),
        Field::new("crss_at_fault", DataType::UInt32, true),
        Field::new("crss_pct_at_fault", DataType::Float64, true),
        Field::new("max_severity", DataType::Utf8, true),
        Field::new("most_recent_crash_year", DataType::Int32, true),
        Field::new("rate_per_100_trucks", DataType::Float64, true),
        Field::new("rate_at_fault_per_100_trucks", DataType::Float64, true),
        Field::new("rate_per_100_drivers", DataType::Float64, true),
        Field::new("rate_at_fault_per_100_drivers", DataType::Float64, true),
        Field::new("rate_per_1m_miles", DataType::Float64, true),
        Field::new("rate_at_fault_per_1m_miles", DataType::Float64, true),
        // Geocode
        Field::new("geocode_tier", DataType::Utf8, true),
        Field::new("latitude", DataType::Float64, true),
        Field::new("longitude", DataType::Float64, true),
        // Cargo
        Field::new("cargo_carried", DataType::Utf8, true),
        Field::new("cargo_unmapped", DataType::Utf8, true),
    ];
    fields.extend(
        cargo_slugs
            .iter()
            .map(|slug| Field::new(format!("{CARGO_COLUMN_PREFIX}{slug}"), DataType::Boolean, true)),
    );
    fields.extend([
        // Scores
        Field::new("company_fit_score", DataType::Float64, true),
        Field::new("fit_provenance", DataType::Utf8, true),
        Field::new("dqs", DataType::Float64, false),
    ]);
    versioned(fields)
}

/// Crash rows that did not resolve to a census carrier.
pub fn unresolved_crash_schema() -> Schema {
    versioned(vec![
        Field::new("crash_id", DataType::Utf8, false),
        Field::new("vehicle_id", DataType::Utf8, false),
        Field::new("system", DataType::Utf8, false),
        Field::new("dot_number", DataType::UInt64, true),
        Field::new("at_fault", DataType::Boolean, true),
        Field::new("year", DataType::Int32, true),
        Field::new("severity", DataType::Utf8, false),
        Field::new("reason", DataType::Utf8, false),
    ])
}
