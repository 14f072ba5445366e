//! Policy history → one insurance summary per carrier.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use cm_common::{CarrierId, InsuranceSummary, PolicyRow};
use cm_math::{mean, median};

/// Reduce policy rows to per-carrier summaries as of `as_of`.
pub fn summarize_policies(rows: &[PolicyRow], as_of: NaiveDate) -> BTreeMap<CarrierId, InsuranceSummary> {
    let mut by_carrier: BTreeMap<CarrierId, Vec<&PolicyRow>> = BTreeMap::new();
    for row in rows {
        by_carrier.entry(row.dot_number).or_default().push(row);
    }
    by_carrier
        .into_iter()
        .map(|(id, policies)| (id, summarize_one(id, policies, as_of)))
        .collect()
}

fn summarize_one(id: CarrierId, mut policies: Vec<&PolicyRow>, as_of: NaiveDate) -> InsuranceSummary {
    let mut filings_by_insurer: BTreeMap<String, u32> = BTreeMap::new();
    for name in policies
        .iter()
        .filter_map(|p| p.insurer.as_deref())
        .map(|name| name.trim().to_ascii_uppercase())
        .filter(|name| !name.is_empty())
    {
        *filings_by_insurer.entry(name).or_default() += 1;
    }
    // Ascending name order, so the first maximum wins ties.
    let top = filings_by_insurer
        .iter()
        .fold(None::<(&String, u32)>, |best, (name, count)| match best {
            Some((_, top)) if top >= *count => best,
            _ => Some((name, *count)),
        });
    let coverages: Vec<f64> = policies.iter().filter_map(|p| p.coverage_amount).collect();
    let active = policies
        .iter()
        .filter(|p| p.cancel_date.map_or(true, |cancel| cancel > as_of))
        .count();

    let mut methods: BTreeMap<EndMethod, u32> = BTreeMap::new();
    let mut kinds: BTreeMap<CoverageKind, u32> = BTreeMap::new();
    for policy in &policies {
        if let Some(method) = policy.cancel_method.as_deref().and_then(EndMethod::classify) {
            *methods.entry(method).or_default() += 1;
        }
        if let Some(kind) = policy.coverage_type.as_deref().and_then(CoverageKind::classify) {
            *kinds.entry(kind).or_default() += 1;
        }
    }
    let method = |m: EndMethod| methods.get(&m).copied().unwrap_or(0);
    let kind = |k: CoverageKind| kinds.get(&k).copied().unwrap_or(0);

    // Undated policies sort last and never open or close a gap.
    policies.sort_by_key(|p| (p.effective_date.is_none(), p.effective_date, p.cancel_date));
    let gaps = coverage_gaps(&policies);
    let filings = policies.len() as u32;

    InsuranceSummary {
        dot_number: id,
        num_filings: filings,
        num_unique_companies: filings_by_insurer.len() as u32,
        max_coverage: coverages.iter().copied().reduce(f64::max),
        min_coverage: coverages.iter().copied().reduce(f64::min),
        active_policies: active as u32,
        lapse_count: gaps.len() as u32,
        min_gap_days: gaps.iter().copied().reduce(f64::min),
        max_gap_days: gaps.iter().copied().reduce(f64::max),
        median_gap_days: median(&gaps),
        avg_gap_days: mean(&gaps),
        first_effective: policies.iter().filter_map(|p| p.effective_date).min(),
        last_effective: policies.iter().filter_map(|p| p.effective_date).max(),
        top_company: top.map(|(name, _)| name.clone()),
        top_company_share: top.and_then(|(_, count)| (filings > 0).then(|| f64::from(count) / f64::from(filings))),
        cancelled_method_count: method(EndMethod::Cancelled),
        replaced_method_count: method(EndMethod::Replaced),
        name_changed_method_count: method(EndMethod::NameChanged),
        transferred_method_count: method(EndMethod::Transferred),
        count_cargo: kind(CoverageKind::Cargo),
        count_bipd: kind(CoverageKind::Bipd),
        count_broker_bond: kind(CoverageKind::BrokerBond),
        count_broker_trust_fund: kind(CoverageKind::BrokerTrustFund),
    }
}

/// How a policy period ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EndMethod {
    Cancelled,
    Replaced,
    NameChanged,
    Transferred,
}

impl EndMethod {
    fn classify(raw: &str) -> Option<Self> {
        let raw = raw.to_ascii_uppercase();
        if raw.contains("CANCEL") {
            Some(EndMethod::Cancelled)
        } else if raw.contains("REPLACE") {
            Some(EndMethod::Replaced)
        } else if raw.contains("NAME") {
            Some(EndMethod::NameChanged)
        } else if raw.contains("TRANSFER") {
            Some(EndMethod::Transferred)
        } else {
            None
        }
    }
}

/// Filed coverage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum CoverageKind {
    Cargo,
    Bipd,
    BrokerBond,
    BrokerTrustFund,
}

impl CoverageKind {
    fn classify(raw: &str) -> Option<Self> {
        let compact: String = raw
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if compact.contains("CARGO") {
            Some(CoverageKind::Cargo)
        } else if compact.contains("BIPD") {
            Some(CoverageKind::Bipd)
        } else if compact.contains("TRUST") {
            Some(CoverageKind::BrokerTrustFund)
        } else if compact.contains("BOND") || compact.contains("SURETY") {
            Some(CoverageKind::BrokerBond)
        } else {
            None
        }
    }
}

/// Positive gaps, in days, between the end of coverage so far and the next
/// policy's effective date. `policies` must be sorted by effective date.
fn coverage_gaps(policies: &[&PolicyRow]) -> Vec<f64> {
    let mut gaps = Vec::new();
    let mut covered_until: Option<NaiveDate> = None;
    let mut open_ended = false;
    for policy in policies {
        let Some(effective) = policy.effective_date else {
            continue;
        };
        if let (false, Some(until)) = (open_ended, covered_until) {
            let days = (effective - until).num_days();
            if days > 0 {
                gaps.push(days as f64);
            }
        }
        match policy.cancel_date {
            None => open_ended = true,
            Some(cancel) => {
                covered_until = Some(covered_until.map_or(cancel, |until| until.max(cancel)));
            }
        }
    }
    gaps
}
