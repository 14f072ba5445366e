//! Cargo feature builder: free-text cargo descriptions to multi-hot vectors.
//!
//! Matching runs in three passes over a case- and whitespace-folded copy of
//! the text:
//!
//! 1. full category names, longest first (names may contain commas, e.g.
//!    `Metal: sheets, coils, rolls`), matched only on delimiter boundaries;
//! 2. the remainder is split on delimiters and each token is looked up
//!    exactly against names and aliases;
//! 3. tokens still unmatched are compared by normalized Levenshtein
//!    similarity, ties going to the earlier category.
//!
//! Nothing depends on other rows, so vectorizing a batch in parallel gives
//! the same profiles as vectorizing each text alone.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use cm_common::{CargoProfile, CarrierId};
use cm_config::CargoVocabulary;

const DELIMITERS: &[char] = &[',', ';', '|', '\n'];

/// Result of matching one text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CargoMatch {
    pub vector: Vec<bool>,
    pub unmapped: Vec<String>,
}

/// Compiled matcher for one vocabulary version.
#[derive(Debug, Clone)]
pub struct CargoVectorizer {
    version: String,
    width: usize,
    /// Folded category names with their index, longest first.
    phrases: Vec<(String, usize)>,
    /// Folded name or alias → category index.
    exact: HashMap<String, usize>,
    /// Fuzzy candidates in vocabulary order.
    candidates: Vec<(String, usize)>,
    threshold: f64,
}

fn fold(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn is_boundary(c: Option<char>) -> bool {
    match c {
        None => true,
        Some(c) => DELIMITERS.contains(&c),
    }
}

impl CargoVectorizer {
    pub fn new(vocabulary: &CargoVocabulary, threshold: f64) -> Self {
        let mut phrases: Vec<(String, usize)> = vocabulary
            .categories
            .iter()
            .enumerate()
            .map(|(idx, c)| (fold(&c.name), idx))
            .collect();
        // Longest first; equal lengths keep vocabulary order (stable sort).
        phrases.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let mut exact = HashMap::new();
        let mut candidates = Vec::new();
        for (idx, category) in vocabulary.categories.iter().enumerate() {
            for term in std::iter::once(&category.name).chain(&category.aliases) {
                let folded = fold(term);
                if folded.is_empty() {
                    continue;
                }
                exact.entry(folded.clone()).or_insert(idx);
                candidates.push((folded, idx));
            }
        }

        CargoVectorizer {
            version: vocabulary.version.clone(),
            width: vocabulary.len(),
            phrases,
            exact,
            candidates,
            threshold,
        }
    }

    pub fn vocabulary_version(&self) -> &str {
        &self.version
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Match one free-text cargo description.
    pub fn vectorize(&self, text: &str) -> CargoMatch {
        let mut vector = vec![false; self.width];
        let mut rest = fold(text);

        for (phrase, idx) in &self.phrases {
            while let Some(start) = find_bounded(&rest, phrase) {
                vector[*idx] = true;
                rest.replace_range(start..start + phrase.len(), ",");
            }
        }

        let mut unmapped: Vec<String> = Vec::new();
        for token in rest.split(DELIMITERS).map(str::trim).filter(|t| !t.is_empty()) {
            if let Some(idx) = self.exact.get(token) {
                vector[*idx] = true;
            } else if let Some((idx, similarity)) = self.fuzzy(token) {
                debug!(token, category = idx, similarity, "fuzzy cargo match");
                vector[idx] = true;
            } else if !unmapped.iter().any(|u| u == token) {
                unmapped.push(token.to_string());
            }
        }

        CargoMatch { vector, unmapped }
    }

    fn fuzzy(&self, token: &str) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (candidate, idx) in &self.candidates {
            let similarity = strsim::normalized_levenshtein(token, candidate);
            if similarity >= self.threshold && best.map_or(true, |(_, s)| similarity > s) {
                best = Some((*idx, similarity));
            }
        }
        best
    }

    /// Vectorize every carrier's text. Output order and values do not depend
    /// on how rayon partitions the batch.
    pub fn vectorize_all(&self, texts: &BTreeMap<CarrierId, String>) -> BTreeMap<CarrierId, CargoProfile> {
        let entries: Vec<(&CarrierId, &String)> = texts.iter().collect();
        let profiles: Vec<CargoProfile> = entries
            .par_iter()
            .map(|(id, text)| {
                let CargoMatch { vector, unmapped } = self.vectorize(text);
                CargoProfile {
                    dot_number: **id,
                    vocabulary_version: self.version.clone(),
                    vector,
                    unmapped,
                }
            })
            .collect();

        let unmapped_tokens: usize = profiles.iter().map(|p| p.unmapped.len()).sum();
        if unmapped_tokens > 0 {
            warn!(tokens = unmapped_tokens, "cargo tokens matched no category");
        }
        info!(
            carriers = profiles.len(),
            vocabulary = self.version.as_str(),
            "cargo profiles built"
        );
        profiles.into_iter().map(|p| (p.dot_number, p)).collect()
    }
}

/// First occurrence of `phrase` in `text` that starts and ends on a
/// delimiter boundary (ignoring surrounding spaces).
fn find_bounded(text: &str, phrase: &str) -> Option<usize> {
    if phrase.is_empty() {
        return None;
    }
    text.match_indices(phrase).map(|(start, _)| start).find(|&start| {
        let before = text[..start].trim_end().chars().next_back();
        let after = text[start + phrase.len()..].trim_start().chars().next();
        is_boundary(before) && is_boundary(after)
    })
}
