//! Record → Arrow conversion for published tables.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Date32Array, Float64Array, Int32Array, Int64Array, StringArray,
    UInt32Array, UInt64Array,
};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate};

use cm_common::{CrashRecord, MasterRecord};

use crate::error::TableError;
use crate::schema::{master_schema, unresolved_crash_schema};

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn date32(date: Option<NaiveDate>) -> Option<i32> {
    date.map(|d| d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
}

fn utf8<'a, F>(records: &'a [MasterRecord], f: F) -> ArrayRef
where
    F: Fn(&'a MasterRecord) -> Option<&'a str>,
{
    Arc::new(records.iter().map(f).collect::<StringArray>())
}

fn int64<F: Fn(&MasterRecord) -> Option<i64>>(records: &[MasterRecord], f: F) -> ArrayRef {
    Arc::new(records.iter().map(f).collect::<Int64Array>())
}

fn uint32<F: Fn(&MasterRecord) -> Option<u32>>(records: &[MasterRecord], f: F) -> ArrayRef {
    Arc::new(records.iter().map(f).collect::<UInt32Array>())
}

fn float64<F: Fn(&MasterRecord) -> Option<f64>>(records: &[MasterRecord], f: F) -> ArrayRef {
    Arc::new(records.iter().map(f).collect::<Float64Array>())
}

fn boolean<F: Fn(&MasterRecord) -> Option<bool>>(records: &[MasterRecord], f: F) -> ArrayRef {
    Arc::new(records.iter().map(f).collect::<BooleanArray>())
}

fn date<F: Fn(&MasterRecord) -> Option<NaiveDate>>(records: &[MasterRecord], f: F) -> ArrayRef {
    Arc::new(records.iter().map(|r| date32(f(r))).collect::<Date32Array>())
}

/// Build the master table batch. Column order follows [`master_schema`].
pub fn master_batch(records: &[MasterRecord], cargo_slugs: &[String]) -> Result<RecordBatch, TableError> {
    let address_sources: Vec<Option<String>> =
        records.iter().map(|r| r.address_sources.label()).collect();
    let unmapped: Vec<Option<String>> = records
        .iter()
        .map(|r| {
            r.cargo
                .as_ref()
                .filter(|c| !c.unmapped.is_empty())
                .map(|c| c.unmapped.join("; "))
        })
        .collect();

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(records.iter().map(|r| Some(r.dot_number().0)).collect::<UInt64Array>()),
        utf8(records, |r| Some(r.snapshot_version.as_str())),
        utf8(records, |r| r.artifact_version.as_deref()),
        utf8(records, |r| Some(r.carrier.legal_name.as_str())),
        utf8(records, |r| r.carrier.dba_name.as_deref()),
        utf8(records, |r| r.carrier.carrier_operation.as_deref()),
        boolean(records, |r| r.carrier.hazmat),
        boolean(records, |r| r.carrier.passenger_carrier),
        utf8(records, |r| r.resolved_address.street.as_deref()),
        utf8(records, |r| r.resolved_address.city.as_deref()),
        utf8(records, |r| r.resolved_address.state.as_deref()),
        utf8(records, |r| r.resolved_address.zip.as_deref()),
        Arc::new(StringArray::from(address_sources)),
        utf8(records, |r| r.carrier.telephone.as_deref()),
        utf8(records, |r| r.carrier.email_address.as_deref()),
        int64(records, |r| r.carrier.power_units),
        int64(records, |r| r.carrier.drivers),
        date(records, |r| r.carrier.mcs150_date),
        int64(records, |r| r.carrier.mcs150_mileage),
        int64(records, |r| r.carrier.mcs150_mileage_year),
        int64(records, |r| r.carrier.recent_mileage),
        int64(records, |r| r.carrier.recent_mileage_year),
        date(records, |r| r.carrier.add_date),
        uint32(records, |r| r.insurance.as_ref().map(|i| i.num_filings)),
        uint32(records, |r| r.insurance.as_ref().map(|i| i.num_unique_companies)),
        float64(records, |r| r.insurance.as_ref().and_then(|i| i.max_coverage)),
        float64(records, |r| r.insurance.as_ref().and_then(|i| i.min_coverage)),
        uint32(records, |r| r.insurance.as_ref().map(|i| i.active_policies)),
        uint32(records, |r| r.insurance.as_ref().map(|i| i.lapse_count)),
        float64(records, |r| r.insurance.as_ref().and_then(|i| i.min_gap_days)),
        float64(records, |r| r.insurance.as_ref().and_then(|i| i.max_gap_days)),
        float64(records, |r| r.insurance.as_ref().and_then(|i| i.median_gap_days)),
        float64(records, |r| r.insurance.as_ref().and_then(|i| i.avg_gap_days)),
        date(records, |r| r.insurance.as_ref().and_then(|i| i.first_effective)),
        date(records, |r| r.insurance.as_ref().and_then(|i| i.last_effective)),
        utf8(records, |r| r.insurance.as_ref().and_then(|i| i.top_company.as_deref())),
        float64(records, |r| r.insurance.as_ref().and_then(|i| i.top_company_share)),
        uint32(records, |r| r.insurance.as_ref().map(|i| i.cancelled_method_count)),
        uint32(records, |r| r.insurance.as_ref().map(|i| i.replaced_method_count)),
        uint32(records, |r| r.insurance.as_ref().map(|i| i.name_changed_method_count)),
        uint32(records, |r| r.insurance.as_ref().map(|i| i.transferred_method_count)),
        uint32(records, |r| r.insurance.as_ref().map(|i| i.count_cargo)),
        uint32(records, |r| r.insurance.as_ref().map(|i| i.count_bipd)),
        uint32(records, |r| r.insurance.as_ref().map(|i| i.count_broker_bond)),
        uint32(records, |r| r.insurance.as_ref().map(|i| i.count_broker_trust_fund)),
        uint32(records, |r| r.crashes.as_ref().map(|c| c.total_crashes)),
        uint32(records, |r| r.crashes.as_ref().map(|c| c.at_fault_crashes)),
        float64(records, |r| r.crashes.as_ref().and_then(|c| c.pct_at_fault)),
        uint32(records, |r| r.crashes.as_ref().map(|c| c.fatal_crashes)),
        uint32(records, |r| r.crashes.as_ref().map(|c| c.fars_total)),
        uint32(records, |r| r.crashes.as_ref().map(|c| c.fars_at_fault)),
        float64(records, |r| r.crashes.as_ref().and_then(|c| c.fars_pct_at_fault)),
        uint32(records, |r| r.crashes.as_ref().map(|c| c.crss_total)),
        uint32(records, |r| r.crashes.as_ref().map(|c| c.crss_at_fault)),
        float64(records, |r| r.crashes.as_ref().and_then(|c| c.crss_pct_at_fault)),
        utf8(records, |r| r.crashes.as_ref().map(|c| c.max_severity.as_str())),
        Arc::new(
            records
                .iter()
                .map(|r| r.crashes.as_ref().and_then(|c| c.most_recent_year))
                .collect::<Int32Array>(),
        ),
        float64(records, |r| r.crashes.as_ref().and_then(|c| c.rates.rate_per_100_trucks)),
        float64(records, |r| r.crashes.as_ref().and_then(|c| c.rates.rate_at_fault_per_100_trucks)),
        float64(records, |r| r.crashes.as_ref().and_then(|c| c.rates.rate_per_100_drivers)),
        float64(records, |r| r.crashes.as_ref().and_then(|c| c.rates.rate_at_fault_per_100_drivers)),
        float64(records, |r| r.crashes.as_ref().and_then(|c| c.rates.rate_per_1m_miles)),
        float64(records, |r| r.crashes.as_ref().and_then(|c| c.rates.rate_at_fault_per_1m_miles)),
        utf8(records, |r| r.geocode.as_ref().map(|g| g.tier.as_str())),
        float64(records, |r| r.geocode.as_ref().and_then(|g| g.latitude)),
        float64(records, |r| r.geocode.as_ref().and_then(|g| g.longitude)),
        utf8(records, |r| r.cargo_carried.as_deref()),
        Arc::new(StringArray::from(unmapped)),
    ];
    for idx in 0..cargo_slugs.len() {
        columns.push(boolean(records, |r| {
            r.cargo.as_ref().and_then(|c| c.vector.get(idx).copied())
        }));
    }
    columns.push(float64(records, |r| r.fit.as_ref().map(|f| f.score)));
    columns.push(utf8(records, |r| r.fit.as_ref().map(|f| f.provenance.as_str())));
    columns.push(float64(records, |r| Some(r.dqs)));

    Ok(RecordBatch::try_new(
        Arc::new(master_schema(cargo_slugs)),
        columns,
    )?)
}

/// Build the unresolved crash batch.
pub fn unresolved_crash_batch(crashes: &[CrashRecord]) -> Result<RecordBatch, TableError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(crashes.iter().map(|c| Some(c.crash_id.as_str())).collect::<StringArray>()),
        Arc::new(crashes.iter().map(|c| Some(c.vehicle_id.as_str())).collect::<StringArray>()),
        Arc::new(crashes.iter().map(|c| Some(c.system.as_str())).collect::<StringArray>()),
        Arc::new(crashes.iter().map(|c| c.dot_number.map(|id| id.0)).collect::<UInt64Array>()),
        Arc::new(crashes.iter().map(|c| c.at_fault).collect::<BooleanArray>()),
        Arc::new(crashes.iter().map(|c| c.year).collect::<Int32Array>()),
        Arc::new(crashes.iter().map(|c| Some(c.severity.as_str())).collect::<StringArray>()),
        Arc::new(
            crashes
                .iter()
                .map(|c| {
                    Some(if c.dot_number.is_some() {
                        "not_in_census"
                    } else {
                        "missing_link"
                    })
                })
                .collect::<StringArray>(),
        ),
    ];
    Ok(RecordBatch::try_new(
        Arc::new(unresolved_crash_schema()),
        columns,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use cm_common::{
        AddressFields, AddressSources, CarrierId, CarrierRecord, CrashSeverity, CrashSystem,
    };

    fn record(id: u64) -> MasterRecord {
        MasterRecord {
            carrier: CarrierRecord::new(CarrierId(id), format!("Carrier {id}")),
            resolved_address: AddressFields::default(),
            address_sources: AddressSources::default(),
            cargo_carried: None,
            insurance: None,
            crashes: None,
            geocode: None,
            cargo: None,
            fit: None,
            dqs: 0.8,
            snapshot_version: "2025-09".into(),
            artifact_version: None,
        }
    }

    #[test]
    fn epoch_is_day_zero() {
        assert_eq!(date32(NaiveDate::from_ymd_opt(1970, 1, 1)), Some(0));
        assert_eq!(date32(NaiveDate::from_ymd_opt(1970, 1, 2)), Some(1));
    }

    #[test]
    fn master_batch_matches_schema() {
        let slugs = vec!["general_freight".to_string()];
        let batch = master_batch(&[record(1), record(2)], &slugs).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().fields().len(), master_schema(&slugs).fields().len());
        let filings = batch.column_by_name("num_filings").unwrap();
        assert_eq!(filings.null_count(), 2);
        let cargo = batch.column_by_name("cargo_general_freight").unwrap();
        assert_eq!(cargo.null_count(), 2);
    }

    #[test]
    fn unresolved_reason_distinguishes_links() {
        let crash = |dot: Option<u64>| CrashRecord {
            crash_id: "c".into(),
            vehicle_id: "1".into(),
            system: CrashSystem::Crss,
            dot_number: dot.map(CarrierId),
            at_fault: None,
            year: Some(2022),
            severity: CrashSeverity::Injury,
        };
        let batch = unresolved_crash_batch(&[crash(Some(4)), crash(None)]).unwrap();
        let reasons = batch
            .column_by_name("reason")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(reasons.value(0), "not_in_census");
        assert_eq!(reasons.value(1), "missing_link");
    }
}
