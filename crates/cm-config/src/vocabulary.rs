//! Closed, versioned cargo-category vocabulary.
//!
//! The vocabulary fixes the order and length of every cargo multi-hot vector.
//! Its `version` and content digest are recorded in every model artifact
//! bundle; a bundle trained against another vocabulary version, or against
//! different categories or aliases under the same version, is rejected at
//! scoring time, so any vocabulary edit forces retraining.
//!
//! # File format
//!
//! ```json
//! {
//!   "version": "safer-2025.1",
//!   "categories": [
//!     { "name": "General Freight", "aliases": ["gen freight"] }
//!   ],
//!   "content_hash": "<sha256 of categories; computed on load when absent>"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use cm_common::sha256_hex;

use crate::error::ConfigError;

/// FMCSA SAFER cargo classes followed by categories discovered by inspection.
const DEFAULT_CATEGORIES: &[(&str, &[&str])] = &[
    ("General Freight", &["general", "freight", "dry van"]),
    ("Household Goods", &["household", "moving"]),
    ("Metal: sheets, coils, rolls", &["metal", "steel", "coils"]),
    ("Motor Vehicles", &["vehicles", "cars", "auto"]),
    ("Drive/Tow away", &["tow away", "drive away", "towing"]),
    ("Logs, Poles, Beams, Lumber", &["logs", "lumber", "timber"]),
    ("Building Materials", &["building supplies"]),
    ("Mobile Homes", &["manufactured homes"]),
    ("Machinery, Large Objects", &["machinery", "heavy equipment"]),
    ("Fresh Produce", &["produce"]),
    ("Liquids/Gases", &["liquids", "gases", "tanker", "fuel"]),
    ("Intermodal Cont.", &["intermodal", "containers"]),
    ("Passengers", &["passenger"]),
    ("Oilfield Equipment", &["oilfield"]),
    ("Livestock", &["cattle"]),
    ("Grain, Feed, Hay", &["grain", "feed", "hay"]),
    ("Coal/Coke", &["coal"]),
    ("Meat", &[]),
    ("Garbage/Refuse", &["garbage", "refuse", "trash", "waste"]),
    ("US Mail", &["mail"]),
    ("Chemicals", &["chemical"]),
    ("Commodities Dry Bulk", &["dry bulk", "bulk"]),
    ("Refrigerated Food", &["refrigerated", "reefer", "frozen food"]),
    ("Beverages", &["beverage"]),
    ("Paper Products", &["paper"]),
    ("Utilities", &["utility"]),
    ("Agricultural/Farm Supplies", &["agricultural", "farm supplies"]),
    ("Construction", &["construction materials"]),
    ("Water Well", &["water"]),
    ("Lawn Equipment", &["landscaping"]),
    ("Farm Use", &[]),
    ("Sediments and Gravel", &["gravel", "sand", "dirt", "aggregate"]),
    ("Food", &["groceries"]),
];

/// Version tag of the embedded vocabulary.
pub const DEFAULT_VOCABULARY_VERSION: &str = "safer-2025.1";

/// One category of the closed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CargoCategory {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl CargoCategory {
    /// Column-safe identifier, e.g. `metal_sheets_coils_rolls`.
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

/// A versioned vocabulary with its integrity hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CargoVocabulary {
    pub version: String,
    pub categories: Vec<CargoCategory>,
    /// SHA-256 of the JSON-serialized `categories`. Verified on load when
    /// present in the file, computed otherwise.
    #[serde(default)]
    pub content_hash: Option<String>,
}

impl Default for CargoVocabulary {
    fn default() -> Self {
        Self::embedded_default()
    }
}

impl CargoVocabulary {
    /// Create a vocabulary, computing the integrity hash.
    pub fn new(version: impl Into<String>, categories: Vec<CargoCategory>) -> Self {
        let mut vocab = CargoVocabulary {
            version: version.into(),
            categories,
            content_hash: None,
        };
        vocab.content_hash = Some(vocab.compute_hash());
        vocab
    }

    /// The vocabulary shipped with the binary.
    pub fn embedded_default() -> Self {
        let categories = DEFAULT_CATEGORIES
            .iter()
            .map(|(name, aliases)| CargoCategory {
                name: (*name).to_string(),
                aliases: aliases.iter().map(|a| (*a).to_string()).collect(),
            })
            .collect();
        Self::new(DEFAULT_VOCABULARY_VERSION, categories)
    }

    /// Load from a JSON file, verifying integrity. The returned vocabulary
    /// always carries its hash.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut vocab: CargoVocabulary =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        vocab.validate()?;
        vocab.content_hash = Some(vocab.compute_hash());
        Ok(vocab)
    }

    /// Check shape and, if present, the integrity hash.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.trim().is_empty() {
            return Err(ConfigError::Invalid("vocabulary version is empty".into()));
        }
        if self.categories.is_empty() {
            return Err(ConfigError::Invalid("vocabulary has no categories".into()));
        }
        let mut slugs = HashSet::new();
        for category in &self.categories {
            let slug = category.slug();
            if slug.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "cargo category '{}' has no usable name",
                    category.name
                )));
            }
            if !slugs.insert(slug.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate cargo category '{slug}'"
                )));
            }
        }
        if let Some(expected) = &self.content_hash {
            let actual = self.compute_hash();
            if *expected != actual {
                return Err(ConfigError::VocabularyHashMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Category slugs in vector order.
    pub fn slugs(&self) -> Vec<String> {
        self.categories.iter().map(CargoCategory::slug).collect()
    }

    /// Digest of the categories and aliases as they are now. Pinned in
    /// artifact bundles next to the version tag.
    pub fn digest(&self) -> String {
        self.compute_hash()
    }

    fn compute_hash(&self) -> String {
        let json = serde_json::to_string(&self.categories).unwrap_or_default();
        sha256_hex(json.as_bytes())
    }
}

/// Lowercase, alphanumeric runs joined by single underscores.
pub fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}
