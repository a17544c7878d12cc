//! Listed-company lookup table

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MarketError, Result};

const BUNDLED_TABLE: &str = include_str!("../../data/krx_symbols.csv");

const NAME_COLUMN: &str = "회사명";
const CODE_COLUMN: &str = "종목코드";

/// One listed company
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub name: String,
    /// Six-digit exchange code
    pub exchange_code: String,
    /// Code with the data-provider market suffix
    pub provider_code: String,
}

impl SymbolEntry {
    fn new(name: &str, code: &str, market: &str) -> Self {
        let exchange_code = format!("{code:0>6}");
        let suffix = if market == "KOSDAQ" { ".KQ" } else { ".KS" };

        Self {
            name: name.to_string(),
            provider_code: format!("{exchange_code}{suffix}"),
            exchange_code,
        }
    }
}

/// One CSV row; unknown columns are ignored
#[derive(Debug, Deserialize)]
struct SymbolRow {
    #[serde(rename = "회사명")]
    name: String,
    #[serde(rename = "종목코드")]
    code: String,
    #[serde(rename = "시장구분", default)]
    market: Option<String>,
}

/// Read-only name/code index, loaded once and shared
#[derive(Debug, Clone)]
pub struct SymbolTable {
    by_name: HashMap<String, SymbolEntry>,
    name_by_code: HashMap<String, String>,
}

impl SymbolTable {
    /// Table shipped with the crate
    pub fn bundled() -> Result<Self> {
        Self::from_csv(BUNDLED_TABLE)
    }

    /// Load a CSV file with `회사명,종목코드,시장구분` columns
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_csv(&text)
    }

    /// Parse CSV text; columns are located by header name
    pub fn from_csv(text: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.trim_start_matches('\u{feff}').as_bytes());

        let headers = reader.headers()?.clone();
        if headers.is_empty() || headers.iter().all(str::is_empty) {
            return Err(MarketError::SymbolTable("empty symbol table".to_string()));
        }
        for wanted in [NAME_COLUMN, CODE_COLUMN] {
            if !headers.iter().any(|h| h == wanted) {
                return Err(MarketError::SymbolTable(format!("missing column {wanted}")));
            }
        }

        let mut by_name = HashMap::new();
        let mut name_by_code = HashMap::new();

        for record in reader.records() {
            let record = record?;
            let line = record.position().map_or(0, csv::Position::line);

            let row: SymbolRow = match record.deserialize(Some(&headers)) {
                Ok(row) => row,
                Err(err) => {
                    tracing::warn!(line, error = %err, "skipping short symbol row");
                    continue;
                }
            };
            if row.name.is_empty()
                || row.code.is_empty()
                || !row.code.chars().all(|c| c.is_ascii_digit())
            {
                tracing::warn!(line, code = %row.code, "skipping malformed symbol row");
                continue;
            }

            let market = row.market.as_deref().unwrap_or_default();
            let entry = SymbolEntry::new(&row.name, &row.code, market);
            name_by_code.insert(entry.exchange_code.clone(), entry.name.clone());
            by_name.insert(entry.name.clone(), entry);
        }

        if by_name.is_empty() {
            return Err(MarketError::SymbolTable(
                "symbol table has no usable rows".to_string(),
            ));
        }

        tracing::debug!(symbols = by_name.len(), "symbol table loaded");
        Ok(Self {
            by_name,
            name_by_code,
        })
    }

    /// Exact name lookup
    pub fn get(&self, name: &str) -> Option<&SymbolEntry> {
        self.by_name.get(name)
    }

    /// Lookup by six-digit code or provider code
    pub fn by_code(&self, code: &str) -> Option<&SymbolEntry> {
        let bare = code.split('.').next().unwrap_or(code);
        self.name_by_code
            .get(bare)
            .and_then(|name| self.by_name.get(name))
    }

    /// Entry for `code`, or a `.KS` placeholder named after the code
    pub fn describe(&self, code: &str) -> SymbolEntry {
        self.by_code(code)
            .cloned()
            .unwrap_or_else(|| SymbolEntry::new(code, code, "KOSPI"))
    }

    /// All company names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_table_loads() {
        let table = SymbolTable::bundled().unwrap();
        let samsung = table.get("삼성전자").unwrap();
        assert_eq!(samsung.exchange_code, "005930");
        assert_eq!(samsung.provider_code, "005930.KS");
        assert!(table.len() >= 20);
    }

    #[test]
    fn test_codes_are_zero_padded_and_kosdaq_suffixed() {
        let csv = "회사명,종목코드,시장구분\n카프로,6380,KOSPI\n펄어비스,263750,KOSDAQ\n";
        let table = SymbolTable::from_csv(csv).unwrap();

        assert_eq!(table.get("카프로").unwrap().provider_code, "006380.KS");
        assert_eq!(table.get("펄어비스").unwrap().provider_code, "263750.KQ");
    }

    #[test]
    fn test_columns_found_by_header() {
        let csv = "\u{feff}종목코드,상장일,회사명\n\"005930\",1975-06-11,\"삼성전자\"\n";
        let table = SymbolTable::from_csv(csv).unwrap();
        assert_eq!(table.get("삼성전자").unwrap().provider_code, "005930.KS");
    }

    #[test]
    fn test_quoted_names_keep_their_commas() {
        let csv = "회사명,종목코드,시장구분\n\"Foo, Inc\",123456,KOSPI\n삼성전자,005930,KOSPI\n";
        let table = SymbolTable::from_csv(csv).unwrap();

        assert_eq!(table.len(), 2);
        let foo = table.get("Foo, Inc").unwrap();
        assert_eq!(foo.provider_code, "123456.KS");
        assert_eq!(table.by_code("123456").unwrap().name, "Foo, Inc");
    }

    #[test]
    fn test_market_column_is_optional() {
        let table = SymbolTable::from_csv("회사명,종목코드\n카카오,35720\n").unwrap();
        assert_eq!(table.get("카카오").unwrap().provider_code, "035720.KS");
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let csv = "회사명,종목코드,시장구분\n,005930,KOSPI\n이상한,ABC,KOSPI\n기아,000270,KOSPI\n";
        let table = SymbolTable::from_csv(csv).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_empty_or_headerless_tables_are_rejected() {
        assert!(SymbolTable::from_csv("").is_err());
        assert!(SymbolTable::from_csv("name,code\nfoo,1\n").is_err());
        assert!(SymbolTable::from_csv("회사명,종목코드\n").is_err());
    }

    #[test]
    fn test_lookup_by_code() {
        let table = SymbolTable::bundled().unwrap();
        assert_eq!(table.by_code("000660").unwrap().name, "SK하이닉스");
        assert_eq!(table.by_code("000660.KS").unwrap().name, "SK하이닉스");
        assert_eq!(table.describe("999999").provider_code, "999999.KS");
    }
}
