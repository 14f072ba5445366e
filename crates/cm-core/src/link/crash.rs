//! Crash fusion across the two reporting systems and per-carrier summaries.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use cm_common::{CarrierId, CarrierRecord, CrashRates, CrashRecord, CrashSeverity, CrashSummary, CrashSystem};

/// Case numbers restart every reporting year, so an involvement is only
/// unique within its year.
type InvolvementKey = (Option<i32>, String, String);

fn involvement_key(row: &CrashRecord) -> InvolvementKey {
    (row.year, row.crash_id.clone(), row.vehicle_id.clone())
}

/// Fused involvements plus the same-system repeats that were dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusedCrashes {
    /// Sorted by `(year, crash_id, vehicle_id)`.
    pub records: Vec<CrashRecord>,
    /// Rows that repeated a key already reported by the same system.
    pub duplicates: usize,
}

/// Fuse FARS and CRSS rows on `(year, crash_id, vehicle_id)`.
///
/// FARS wins when both systems report the same involvement; fields FARS
/// leaves null are filled from the CRSS row. Within one system the first row
/// of a key is kept and the repeat is counted.
pub fn fuse_crashes(fars: Vec<CrashRecord>, crss: Vec<CrashRecord>) -> FusedCrashes {
    let mut fused: BTreeMap<InvolvementKey, CrashRecord> = BTreeMap::new();
    let mut duplicates = 0usize;
    let mut overlaps = 0usize;
    for row in fars.into_iter().chain(crss) {
        let key = involvement_key(&row);
        match fused.get_mut(&key) {
            Some(existing) if existing.system != row.system => {
                overlaps += 1;
                existing.dot_number = existing.dot_number.or(row.dot_number);
                existing.at_fault = existing.at_fault.or(row.at_fault);
            }
            Some(existing) => {
                duplicates += 1;
                debug!(
                    system = existing.system.as_str(),
                    crash_id = existing.crash_id.as_str(),
                    vehicle_id = existing.vehicle_id.as_str(),
                    year = ?existing.year,
                    "repeated crash involvement dropped"
                );
            }
            None => {
                fused.insert(key, row);
            }
        }
    }
    if overlaps > 0 {
        debug!(rows = overlaps, "crash involvements reported by both systems");
    }
    if duplicates > 0 {
        warn!(rows = duplicates, "crash rows repeat an involvement within one system");
    }
    FusedCrashes {
        records: fused.into_values().collect(),
        duplicates,
    }
}

/// Distinct crash identity: a case number within one system's year.
type CrashKey<'a> = (CrashSystem, Option<i32>, &'a str);

fn crash_key(c: &CrashRecord) -> CrashKey<'_> {
    (c.system, c.year, c.crash_id.as_str())
}

fn count_in(set: &BTreeSet<CrashKey<'_>>, system: CrashSystem) -> usize {
    set.iter().filter(|key| key.0 == system).count()
}

fn share(part: usize, total: usize) -> Option<f64> {
    (total > 0).then(|| part as f64 / total as f64)
}

/// Per-carrier summaries over linked crash rows. Counts are distinct crashes,
/// so two vehicles of one carrier in the same crash count once. Rates are
/// left empty until [`with_exposure`] fills them.
pub fn summarize_crashes<'a, I>(crashes: I) -> BTreeMap<CarrierId, CrashSummary>
where
    I: IntoIterator<Item = &'a CrashRecord>,
{
    let mut grouped: BTreeMap<CarrierId, Vec<&'a CrashRecord>> = BTreeMap::new();
    for crash in crashes {
        if let Some(id) = crash.dot_number {
            grouped.entry(id).or_default().push(crash);
        }
    }
    grouped
        .into_iter()
        .map(|(id, rows)| {
            let all: BTreeSet<CrashKey> = rows.iter().map(|c| crash_key(c)).collect();
            let at_fault: BTreeSet<CrashKey> = rows
                .iter()
                .filter(|c| c.at_fault == Some(true))
                .map(|c| crash_key(c))
                .collect();
            let fatal: BTreeSet<CrashKey> = rows
                .iter()
                .filter(|c| c.severity == CrashSeverity::Fatal)
                .map(|c| crash_key(c))
                .collect();
            let fars_total = count_in(&all, CrashSystem::Fars);
            let fars_at_fault = count_in(&at_fault, CrashSystem::Fars);
            let crss_total = count_in(&all, CrashSystem::Crss);
            let crss_at_fault = count_in(&at_fault, CrashSystem::Crss);
            let summary = CrashSummary {
                dot_number: id,
                total_crashes: all.len() as u32,
                at_fault_crashes: at_fault.len() as u32,
                fatal_crashes: fatal.len() as u32,
                pct_at_fault: share(at_fault.len(), all.len()),
                fars_total: fars_total as u32,
                fars_at_fault: fars_at_fault as u32,
                fars_pct_at_fault: share(fars_at_fault, fars_total),
                crss_total: crss_total as u32,
                crss_at_fault: crss_at_fault as u32,
                crss_pct_at_fault: share(crss_at_fault, crss_total),
                max_severity: rows
                    .iter()
                    .map(|c| c.severity)
                    .max()
                    .unwrap_or(CrashSeverity::Unknown),
                most_recent_year: rows.iter().filter_map(|c| c.year).max(),
                rates: CrashRates::default(),
            };
            (id, summary)
        })
        .collect()
}

fn per(count: u32, exposure: Option<f64>, scale: f64) -> Option<f64> {
    match exposure {
        Some(e) if e > 0.0 && e.is_finite() => Some(f64::from(count) * scale / e),
        _ => None,
    }
}

/// Fill exposure rates from the carrier's fleet size, driver count, and best
/// available annual mileage. A missing or zero exposure leaves its rate empty.
pub fn with_exposure(mut summary: CrashSummary, carrier: &CarrierRecord) -> CrashSummary {
    let trucks = carrier.power_units.map(|v| v as f64);
    let drivers = carrier.drivers.map(|v| v as f64);
    let miles = carrier.mileage().map(|v| v as f64);
    let (total, at_fault) = (summary.total_crashes, summary.at_fault_crashes);
    summary.rates = CrashRates {
        rate_per_100_trucks: per(total, trucks, 100.0),
        rate_at_fault_per_100_trucks: per(at_fault, trucks, 100.0),
        rate_per_100_drivers: per(total, drivers, 100.0),
        rate_at_fault_per_100_drivers: per(at_fault, drivers, 100.0),
        rate_per_1m_miles: per(total, miles, 1_000_000.0),
        rate_at_fault_per_1m_miles: per(at_fault, miles, 1_000_000.0),
    };
    summary
}
