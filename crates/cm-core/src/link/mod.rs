//! Record linker: fuses the canonical per-source tables on carrier id.
//!
//! Census is the anchor. Every census carrier yields exactly one fused row;
//! one-to-many sources (policies, crashes) are aggregated before the join so
//! the anchor is never fanned out, and overlapping fields are resolved by the
//! declared [`PrecedenceList`].

pub mod address;
pub mod crash;
pub mod insurance;

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{info, warn};

use cm_common::{
    AddressFields, AddressSources, CarrierId, CarrierRecord, CrashRecord, CrashSummary, Error,
    GeocodedAddress, InsuranceSummary, MatchTier, PolicyRow, Result, SnapshotVersion, Stage,
    StageContext, Value,
};
use cm_config::PrecedenceList;

pub use address::{resolve_address, FieldConflict, ResolvedAddress};
pub use crash::{fuse_crashes, summarize_crashes, with_exposure, FusedCrashes};
pub use insurance::summarize_policies;

/// Typed per-source inputs of one snapshot.
#[derive(Debug, Clone, Default)]
pub struct LinkInputs {
    pub census: Vec<CarrierRecord>,
    pub policies: Vec<PolicyRow>,
    /// Policy rows dropped upstream for lacking a carrier id.
    pub unkeyed_policies: usize,
    /// Already fused across reporting systems.
    pub crashes: Vec<CrashRecord>,
    /// Same-system repeats dropped during crash fusion.
    pub duplicate_crash_rows: usize,
    pub cargo_texts: BTreeMap<CarrierId, String>,
    pub geocodes: BTreeMap<CarrierId, GeocodedAddress>,
}

/// One census carrier with everything the other sources say about it.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedRecord {
    pub carrier: CarrierRecord,
    pub resolved_address: AddressFields,
    pub address_sources: AddressSources,
    pub cargo_carried: Option<String>,
    pub insurance: Option<InsuranceSummary>,
    pub crashes: Option<CrashSummary>,
    pub geocode: Option<GeocodedAddress>,
}

impl FusedRecord {
    pub fn dot_number(&self) -> CarrierId {
        self.carrier.dot_number
    }

    /// Field lookup by canonical column name. Unknown names read as null.
    pub fn field(&self, name: &str) -> Value {
        let c = &self.carrier;
        match name {
            "dot_number" => Value::Int(c.dot_number.0 as i64),
            "legal_name" => Value::text(Some(c.legal_name.as_str()).filter(|s| !s.trim().is_empty())),
            "dba_name" => Value::text(c.dba_name.as_deref()),
            "carrier_operation" => Value::text(c.carrier_operation.as_deref()),
            "hm_flag" | "hazmat" => Value::flag(c.hazmat),
            "pc_flag" | "passenger_carrier" => Value::flag(c.passenger_carrier),
            "phy_street" => Value::text(self.resolved_address.street.as_deref()),
            "phy_city" => Value::text(self.resolved_address.city.as_deref()),
            "phy_state" => Value::text(self.resolved_address.state.as_deref()),
            "phy_zip" => Value::text(self.resolved_address.zip.as_deref()),
            "telephone" => Value::text(c.telephone.as_deref()),
            "email_address" => Value::text(c.email_address.as_deref()),
            "nbr_power_unit" | "power_units" => Value::int(c.power_units),
            "driver_total" => Value::int(c.drivers),
            "mcs150_date" => Value::date(c.mcs150_date),
            "mcs150_mileage" => Value::int(c.mcs150_mileage),
            "mcs150_mileage_year" => Value::int(c.mcs150_mileage_year),
            "recent_mileage" => Value::int(c.recent_mileage),
            "recent_mileage_year" => Value::int(c.recent_mileage_year),
            "add_date" => Value::date(c.add_date),
            "cargo_carried" => Value::text(self.cargo_carried.as_deref()),
            "num_filings" => Value::int(self.insurance.as_ref().map(|i| i64::from(i.num_filings))),
            "max_coverage" => Value::float(self.insurance.as_ref().and_then(|i| i.max_coverage)),
            "top_company" => Value::text(self.insurance.as_ref().and_then(|i| i.top_company.as_deref())),
            "total_crashes" => Value::int(self.crashes.as_ref().map(|s| i64::from(s.total_crashes))),
            "fars_total" => Value::int(self.crashes.as_ref().map(|s| i64::from(s.fars_total))),
            "crss_total" => Value::int(self.crashes.as_ref().map(|s| i64::from(s.crss_total))),
            "rate_per_100_trucks" => Value::float(self.crashes.as_ref().and_then(|s| s.rates.rate_per_100_trucks)),
            "geocode_tier" => Value::text(self.geocode.as_ref().map(|g| g.tier.as_str())),
            _ => Value::Null,
        }
    }
}

/// Join statistics and non-fatal findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LinkReport {
    pub anchor_rows: usize,
    pub with_insurance: usize,
    pub with_crashes: usize,
    pub with_cargo: usize,
    pub with_geocode: usize,
    pub unmatched_geocodes: usize,
    /// Policy rows whose carrier is null or not in census.
    pub orphaned_policies: usize,
    pub unresolved_crashes: usize,
    /// Crash rows that repeated an involvement within one reporting system.
    pub duplicate_crash_rows: usize,
    pub field_conflicts: Vec<FieldConflict>,
}

/// Output of the linker.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedTable {
    pub snapshot: SnapshotVersion,
    /// One row per census carrier, sorted by carrier id.
    pub records: Vec<FusedRecord>,
    /// Crash rows whose carrier link is null or absent from census.
    pub unresolved_crashes: Vec<CrashRecord>,
    pub report: LinkReport,
}

impl FusedTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = CarrierId> + '_ {
        self.records.iter().map(FusedRecord::dot_number)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordLinker {
    precedence: PrecedenceList,
}

impl RecordLinker {
    pub fn new(precedence: PrecedenceList) -> Self {
        RecordLinker { precedence }
    }

    pub fn precedence(&self) -> &PrecedenceList {
        &self.precedence
    }

    pub fn link(&self, inputs: LinkInputs, snapshot: &SnapshotVersion) -> Result<FusedTable> {
        let context = |table: &str| StageContext::new(Stage::Link, table).with_snapshot(snapshot);
        let LinkInputs {
            census,
            policies,
            unkeyed_policies,
            crashes,
            duplicate_crash_rows,
            cargo_texts,
            geocodes,
        } = inputs;

        let anchor_rows = census.len();
        let anchor_ids: BTreeSet<CarrierId> = census.iter().map(|c| c.dot_number).collect();
        if anchor_ids.len() != anchor_rows {
            return Err(Error::KeyViolation {
                context: context("census"),
                detail: format!(
                    "{} duplicate carrier ids in anchor",
                    anchor_rows - anchor_ids.len()
                ),
            });
        }

        let mut report = LinkReport {
            anchor_rows,
            duplicate_crash_rows,
            ..LinkReport::default()
        };

        report.orphaned_policies = unkeyed_policies
            + policies
                .iter()
                .filter(|p| !anchor_ids.contains(&p.dot_number))
                .count();
        let mut insurance = summarize_policies(&policies, snapshot.as_of);

        let (linked, unresolved): (Vec<CrashRecord>, Vec<CrashRecord>) = crashes
            .into_iter()
            .partition(|c| c.dot_number.map_or(false, |id| anchor_ids.contains(&id)));
        let mut crash_summaries = summarize_crashes(&linked);
        report.unresolved_crashes = unresolved.len();

        let mut cargo_texts = cargo_texts;
        let mut geocodes = geocodes;

        let mut records: Vec<FusedRecord> = Vec::with_capacity(anchor_rows);
        for carrier in census {
            let id = carrier.dot_number;
            let geocode = geocodes.remove(&id);
            let resolved = resolve_address(id, &carrier.address, geocode.as_ref(), &self.precedence);
            report.field_conflicts.extend(resolved.conflicts);
            let record = FusedRecord {
                resolved_address: resolved.fields,
                address_sources: resolved.sources,
                cargo_carried: cargo_texts.remove(&id),
                insurance: insurance.remove(&id),
                crashes: crash_summaries.remove(&id).map(|s| with_exposure(s, &carrier)),
                geocode,
                carrier,
            };
            report.with_insurance += usize::from(record.insurance.is_some());
            report.with_crashes += usize::from(record.crashes.is_some());
            report.with_cargo += usize::from(record.cargo_carried.is_some());
            if let Some(g) = &record.geocode {
                report.with_geocode += 1;
                report.unmatched_geocodes += usize::from(g.tier == MatchTier::Unmatched);
            }
            records.push(record);
        }
        records.sort_by_key(FusedRecord::dot_number);
        // One fused row per census carrier: the loop above pushes once per
        // anchor row and the anchor ids are unique.
        debug_assert_eq!(records.len(), anchor_rows);

        if report.unresolved_crashes > 0 {
            warn!(rows = report.unresolved_crashes, "crash rows did not resolve to a census carrier");
        }
        if report.unmatched_geocodes > 0 {
            warn!(rows = report.unmatched_geocodes, "carrier addresses without a geocode match");
        }
        if report.orphaned_policies > 0 {
            warn!(rows = report.orphaned_policies, "policy rows without a census carrier");
        }
        info!(
            snapshot = snapshot.id.as_str(),
            carriers = anchor_rows,
            with_insurance = report.with_insurance,
            with_crashes = report.with_crashes,
            conflicts = report.field_conflicts.len(),
            "sources linked"
        );

        Ok(FusedTable {
            snapshot: snapshot.clone(),
            records,
            unresolved_crashes: unresolved,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_common::{CrashSeverity, CrashSystem};

    fn snap() -> SnapshotVersion {
        SnapshotVersion::parse("2025-09").unwrap()
    }

    fn crash(id: &str, dot: Option<u64>) -> CrashRecord {
        CrashRecord {
            crash_id: id.into(),
            vehicle_id: "1".into(),
            system: CrashSystem::Crss,
            dot_number: dot.map(CarrierId),
            at_fault: Some(false),
            year: Some(2024),
            severity: CrashSeverity::Injury,
        }
    }

    fn inputs() -> LinkInputs {
        LinkInputs {
            census: vec![
                CarrierRecord::new(CarrierId(3), "C"),
                CarrierRecord::new(CarrierId(1), "A"),
                CarrierRecord::new(CarrierId(2), "B"),
            ],
            policies: vec![
                PolicyRow {
                    dot_number: CarrierId(1),
                    insurer: Some("X".into()),
                    coverage_amount: Some(1.0),
                    effective_date: None,
                    cancel_date: None,
                    coverage_type: None,
                    cancel_method: None,
                },
                PolicyRow {
                    dot_number: CarrierId(9),
                    insurer: None,
                    coverage_amount: None,
                    effective_date: None,
                    cancel_date: None,
                    coverage_type: None,
                    cancel_method: None,
                },
            ],
            unkeyed_policies: 1,
            crashes: vec![crash("a", Some(2)), crash("b", Some(4)), crash("c", None)],
            duplicate_crash_rows: 3,
            ..LinkInputs::default()
        }
    }

    #[test]
    fn anchor_is_preserved_and_sorted() {
        let fused = RecordLinker::default().link(inputs(), &snap()).unwrap();
        let ids: Vec<u64> = fused.ids().map(|id| id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(fused.records[0].insurance.is_some());
        assert!(fused.records[2].insurance.is_none());
        assert_eq!(fused.records[1].crashes.as_ref().unwrap().total_crashes, 1);
        assert_eq!(fused.unresolved_crashes.len(), 2);
        assert_eq!(fused.report.orphaned_policies, 2);
        assert_eq!(fused.report.duplicate_crash_rows, 3);
    }

    #[test]
    fn crash_rates_use_the_anchor_carrier() {
        let mut input = inputs();
        input.census[2].power_units = Some(2);
        let fused = RecordLinker::default().link(input, &snap()).unwrap();
        let rec = &fused.records[1];
        assert_eq!(rec.field("rate_per_100_trucks").as_f64(), Some(50.0));
        assert_eq!(rec.field("crss_total").as_i64(), Some(1));
        assert!(fused.records[0].field("rate_per_100_trucks").is_null());
    }

    #[test]
    fn duplicate_anchor_ids_rejected() {
        let mut input = inputs();
        input.census.push(CarrierRecord::new(CarrierId(1), "A again"));
        let err = RecordLinker::default().link(input, &snap()).unwrap_err();
        assert!(err.is_structural());
        assert_eq!(err.context().unwrap().snapshot.as_deref(), Some("2025-09"));
    }

    #[test]
    fn field_lookup_reads_resolved_values() {
        let fused = RecordLinker::default().link(inputs(), &snap()).unwrap();
        let rec = &fused.records[0];
        assert_eq!(rec.field("legal_name").as_str(), Some("A"));
        assert_eq!(rec.field("num_filings").as_i64(), Some(1));
        assert!(rec.field("phy_city").is_null());
        assert!(rec.field("no_such_field").is_null());
    }
}
