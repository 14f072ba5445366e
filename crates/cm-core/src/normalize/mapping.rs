//! Per-source schema mappings: canonical columns, raw aliases, cell types.

use std::collections::BTreeMap;

use cm_common::SourceKind;

/// How a raw cell is typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    /// Trimmed and upper-cased (state codes, status words).
    Upper,
    Int,
    /// Integer where `0` encodes "unknown".
    IntZeroNull,
    Float,
    Date,
    Flag,
    /// Census operation code `A`/`B`/`C`.
    Operation,
}

/// Row multiplicity of a source relative to the carrier key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// At most one row per carrier; duplicates are a key violation.
    One,
    /// At most one row per carrier after keeping the last duplicate.
    LastWins,
    /// Any number of rows per carrier.
    Many,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Canonical name.
    pub name: String,
    /// Alternative raw names, matched case-insensitively.
    pub aliases: Vec<String>,
    pub kind: ColumnKind,
    pub required: bool,
}

impl ColumnSpec {
    fn new(name: &str, kind: ColumnKind) -> Self {
        ColumnSpec {
            name: name.to_string(),
            aliases: Vec::new(),
            kind,
            required: false,
        }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn alias(mut self, aliases: &[&str]) -> Self {
        self.aliases.extend(aliases.iter().map(|a| (*a).to_string()));
        self
    }

    /// Canonical name followed by aliases.
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Everything the normalizer needs to know about one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMapping {
    pub source: SourceKind,
    /// Carrier id column.
    pub key: ColumnSpec,
    /// Whether rows may carry a null or unparseable carrier id.
    pub key_nullable: bool,
    pub cardinality: Cardinality,
    pub columns: Vec<ColumnSpec>,
}

impl SchemaMapping {
    /// Built-in mapping for a source.
    pub fn for_source(source: SourceKind) -> Self {
        match source {
            SourceKind::Census => census(),
            SourceKind::Insurance => insurance(),
            SourceKind::Fars | SourceKind::Crss => crash(source),
            SourceKind::Cargo => cargo(),
            SourceKind::Geocode => geocode(),
            SourceKind::Labels => labels(),
        }
    }

    /// Add configured aliases (canonical column → extra raw names).
    pub fn with_aliases(mut self, extra: Option<&BTreeMap<String, Vec<String>>>) -> Self {
        let Some(extra) = extra else {
            return self;
        };
        for (column, aliases) in extra {
            let spec = if self.key.name == *column {
                Some(&mut self.key)
            } else {
                self.columns.iter_mut().find(|c| c.name == *column)
            };
            if let Some(spec) = spec {
                spec.aliases.extend(aliases.iter().cloned());
            }
        }
        self
    }
}

fn dot_key() -> ColumnSpec {
    ColumnSpec::new("dot_number", ColumnKind::Int)
        .required()
        .alias(&["usdot", "dot", "usdot_number"])
}

fn census() -> SchemaMapping {
    use ColumnKind::*;
    SchemaMapping {
        source: SourceKind::Census,
        key: dot_key(),
        key_nullable: false,
        cardinality: Cardinality::One,
        columns: vec![
            ColumnSpec::new("legal_name", Text).required(),
            ColumnSpec::new("dba_name", Text),
            ColumnSpec::new("carrier_operation", Operation),
            ColumnSpec::new("hm_flag", Flag).alias(&["hazmat_flag"]),
            ColumnSpec::new("pc_flag", Flag).alias(&["passenger_flag"]),
            ColumnSpec::new("phy_street", Text),
            ColumnSpec::new("phy_city", Text),
            ColumnSpec::new("phy_state", Upper),
            ColumnSpec::new("phy_zip", Text),
            ColumnSpec::new("telephone", Text).alias(&["phone"]),
            ColumnSpec::new("email_address", Text).alias(&["email"]),
            ColumnSpec::new("nbr_power_unit", Int).alias(&["power_units"]),
            ColumnSpec::new("driver_total", Int).alias(&["total_drivers"]),
            ColumnSpec::new("mcs150_date", Date),
            ColumnSpec::new("mcs150_mileage", Int),
            ColumnSpec::new("mcs150_mileage_year", Int),
            ColumnSpec::new("recent_mileage", IntZeroNull),
            ColumnSpec::new("recent_mileage_year", IntZeroNull),
            ColumnSpec::new("add_date", Date),
        ],
    }
}

fn insurance() -> SchemaMapping {
    use ColumnKind::*;
    SchemaMapping {
        source: SourceKind::Insurance,
        key: dot_key(),
        key_nullable: true,
        cardinality: Cardinality::Many,
        columns: vec![
            ColumnSpec::new("insurer", Text).alias(&["insurance_company", "name_company"]),
            ColumnSpec::new("coverage_amount", Float).alias(&["max_cov_amount", "coverage"]),
            ColumnSpec::new("effective_date", Date).alias(&["effective_dt"]),
            ColumnSpec::new("cancel_date", Date).alias(&["cancl_effective_date", "cancel_dt"]),
            ColumnSpec::new("coverage_type", Text).alias(&["ins_type_desc", "ins_type"]),
            ColumnSpec::new("cancel_method", Text).alias(&["cancl_method", "method"]),
        ],
    }
}

fn crash(source: SourceKind) -> SchemaMapping {
    use ColumnKind::*;
    SchemaMapping {
        source,
        key: dot_key().alias(&["mcarr_id"]),
        key_nullable: true,
        cardinality: Cardinality::Many,
        columns: vec![
            ColumnSpec::new("crash_id", Text).required().alias(&["st_case", "casenum"]),
            ColumnSpec::new("vehicle_id", Text).required().alias(&["veh_no"]),
            ColumnSpec::new("at_fault", Flag),
            ColumnSpec::new("year", Int).alias(&["crash_year"]),
            ColumnSpec::new("severity", Text).alias(&["max_sev"]),
        ],
    }
}

fn cargo() -> SchemaMapping {
    SchemaMapping {
        source: SourceKind::Cargo,
        key: dot_key(),
        key_nullable: false,
        cardinality: Cardinality::One,
        columns: vec![ColumnSpec::new("cargo_carried", ColumnKind::Text)
            .required()
            .alias(&["cargo_types"])],
    }
}

fn geocode() -> SchemaMapping {
    use ColumnKind::*;
    SchemaMapping {
        source: SourceKind::Geocode,
        key: ColumnSpec::new("id", Int).required().alias(&["dot_number"]),
        key_nullable: false,
        cardinality: Cardinality::One,
        columns: vec![
            ColumnSpec::new("input_address", Text),
            ColumnSpec::new("match_status", Text).required(),
            ColumnSpec::new("match_type", Text),
            ColumnSpec::new("matched_address", Text),
            ColumnSpec::new("lonlat", Text).alias(&["coordinates"]),
        ],
    }
}

fn labels() -> SchemaMapping {
    SchemaMapping {
        source: SourceKind::Labels,
        key: dot_key(),
        key_nullable: false,
        cardinality: Cardinality::LastWins,
        columns: vec![ColumnSpec::new("expert_label", ColumnKind::Text).required()],
    }
}
