//! Free-text symbol resolution

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::similarity::ratio;
use super::table::{SymbolEntry, SymbolTable};

/// Error text carried by an unresolved symbol
pub const MAPPING_FAILED: &str = "종목코드 매핑 실패";

const PREFERRED_LONG: &str = "우선주";
const PREFERRED_SHORT: &str = "우";

static CANDIDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[가-힣A-Za-z0-9]{2,20}(?:우|우B|우선주)?").expect("candidate pattern is valid")
});

/// A symbol as extracted from a query
///
/// `exchange_code`/`provider_code` are `None` exactly when `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRef {
    pub raw: Option<String>,
    /// Matched table name, when it differs from what the user typed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub exchange_code: Option<String>,
    pub provider_code: Option<String>,
    pub error: Option<String>,
}

impl SymbolRef {
    /// A successfully resolved symbol
    pub fn resolved(raw: &str, entry: &SymbolEntry) -> Self {
        Self {
            raw: Some(raw.to_string()),
            name: (entry.name != raw).then(|| entry.name.clone()),
            exchange_code: Some(entry.exchange_code.clone()),
            provider_code: Some(entry.provider_code.clone()),
            error: None,
        }
    }

    /// Nothing in the text mapped to a listed company
    pub fn unresolved() -> Self {
        Self {
            raw: None,
            name: None,
            exchange_code: None,
            provider_code: None,
            error: Some(MAPPING_FAILED.to_string()),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.error.is_none() && self.provider_code.is_some()
    }

    /// Name to show the user: the table name, else the raw text
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.raw.as_deref())
            .unwrap_or_default()
    }
}

/// Maps name fragments to trading codes, tolerating spelling drift
#[derive(Debug, Clone)]
pub struct SymbolResolver {
    table: Arc<SymbolTable>,
    cutoff: f64,
}

impl SymbolResolver {
    pub fn new(table: Arc<SymbolTable>, cutoff: f64) -> Self {
        Self { table, cutoff }
    }

    pub fn table(&self) -> &SymbolTable {
        &self.table
    }

    /// Resolve one fragment: exact name first, then the best fuzzy match
    pub fn resolve(&self, fragment: &str) -> Option<&SymbolEntry> {
        let fragment = fragment.trim();
        let normalized = match fragment.strip_suffix(PREFERRED_LONG) {
            Some(stem) => format!("{stem}{PREFERRED_SHORT}"),
            None => fragment.to_string(),
        };

        if let Some(entry) = self.table.get(&normalized) {
            return Some(entry);
        }

        self.closest(&normalized)
            .and_then(|name| self.table.get(name))
    }

    fn closest(&self, fragment: &str) -> Option<&str> {
        let mut best: Option<(f64, &str)> = None;

        for name in self.table.names() {
            let score = ratio(fragment, name);
            if score < self.cutoff {
                continue;
            }
            let better = match best {
                None => true,
                Some((top, top_name)) => {
                    score > top || ((score - top).abs() < f64::EPSILON && name > top_name)
                }
            };
            if better {
                best = Some((score, name));
            }
        }

        if let Some((score, name)) = best {
            tracing::debug!(fragment, matched = name, score, "fuzzy symbol match");
        }
        best.map(|(_, name)| name)
    }

    /// Scan `text` and return the first candidate that resolves
    ///
    /// Non-numeric candidates are tried first; the second pass includes
    /// numeric tokens, which may also match the code column.
    pub fn extract_and_resolve(&self, text: &str) -> SymbolRef {
        let candidates: Vec<&str> = CANDIDATE.find_iter(text).map(|m| m.as_str()).collect();
        let is_numeric = |word: &str| word.chars().all(|c| c.is_ascii_digit());

        let first_pass = candidates.iter().filter(|word| !is_numeric(word));
        for word in first_pass {
            if let Some(entry) = self.resolve(word) {
                return SymbolRef::resolved(word, entry);
            }
        }

        for word in &candidates {
            let entry = if is_numeric(word) {
                self.table.by_code(word).or_else(|| self.resolve(word))
            } else {
                self.resolve(word)
            };
            if let Some(entry) = entry {
                return SymbolRef::resolved(word, entry);
            }
        }

        SymbolRef::unresolved()
    }
}
