//! Settings consumed by the library
//!
//! The settings record is owned by whatever configuration surface the host
//! provides (the CLI reads it from a TOML file). The library only ever reads
//! it. Every field has a default, so a partial record deserializes into a
//! complete one.

use crate::types::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Default refresh interval in minutes
pub const DEFAULT_REFRESH_MINUTES: u64 = 5;

/// Complete settings record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where the sold/unsold table comes from
    pub source: DataSource,
    /// Which columns hold the VIN, stock code and status
    pub columns: ColumnMapping,
    /// Status values that mean "sold" (compared trimmed, case-insensitive)
    pub sold_values: Vec<String>,
    /// Page selectors for items and their identifier fields
    pub selectors: SelectorConfig,
    /// Label-aware stock extraction configuration
    pub heuristics: StockHeuristics,
    /// Text of the badge attached to sold items
    pub badge_text: String,
    /// Hide sold items in addition to marking them
    pub hide_sold: bool,
    /// Minutes between scheduled refreshes (clamped to at least 1)
    pub auto_refresh_minutes: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source: DataSource::default(),
            columns: ColumnMapping::default(),
            sold_values: vec!["Sold".to_string(), "SOLD".to_string()],
            selectors: SelectorConfig::default(),
            heuristics: StockHeuristics::default(),
            badge_text: default_badge_text(),
            hide_sold: false,
            auto_refresh_minutes: DEFAULT_REFRESH_MINUTES,
        }
    }
}

fn default_badge_text() -> String {
    "Sold".to_string()
}

/// Tabular data source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DataSource {
    /// Published CSV file (header line + comma-separated rows)
    Csv {
        #[serde(default)]
        url: String,
    },
    /// Google Sheets values API
    Sheets {
        #[serde(default)]
        spreadsheet_id: String,
        #[serde(default = "default_range")]
        range: String,
        #[serde(default)]
        api_key: String,
    },
}

fn default_range() -> String {
    "Sheet1!A:C".to_string()
}

impl Default for DataSource {
    fn default() -> Self {
        DataSource::Csv { url: String::new() }
    }
}

impl DataSource {
    /// Check that every field the source needs is filled in
    pub fn validate(&self) -> Result<()> {
        match self {
            DataSource::Csv { url } => {
                if url.trim().is_empty() {
                    return Err(SyncError::Configuration(
                        "CSV URL is not configured.".to_string(),
                    ));
                }
            }
            DataSource::Sheets {
                spreadsheet_id,
                range,
                api_key,
            } => {
                if spreadsheet_id.trim().is_empty()
                    || range.trim().is_empty()
                    || api_key.trim().is_empty()
                {
                    return Err(SyncError::Configuration(
                        "Sheets API requires Spreadsheet ID, Range, and API Key.".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Column-name mapping
///
/// A key that is missing or blank counts as unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub vin: Option<String>,
    pub stock: Option<String>,
    pub status: Option<String>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            vin: Some("VIN".to_string()),
            stock: Some("Stock".to_string()),
            status: Some("Status".to_string()),
        }
    }
}

fn configured(key: &Option<String>) -> Option<&str> {
    key.as_deref().map(str::trim).filter(|k| !k.is_empty())
}

impl ColumnMapping {
    pub fn vin_key(&self) -> Option<&str> {
        configured(&self.vin)
    }

    pub fn stock_key(&self) -> Option<&str> {
        configured(&self.stock)
    }

    pub fn status_key(&self) -> Option<&str> {
        configured(&self.status)
    }

    /// Keys every ingested row must carry: status, stock, and VIN if configured
    pub fn required_keys(&self) -> Vec<&str> {
        [self.status_key(), self.stock_key(), self.vin_key()]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// CSS-like selectors describing the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Item container (one per inventory item)
    #[serde(alias = "card")]
    pub item: String,
    /// Element inside an item holding the VIN
    pub vin: String,
    /// Element inside an item holding the stock code
    pub stock: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            item: ".vehicle-card, .inventory-card, .result-item, .vehicle".to_string(),
            vin: "[data-vehicle-vin], [data-vin], .vin".to_string(),
            stock: "[data-vehicle-stock], [data-stock], .stock".to_string(),
        }
    }
}

/// Stock-label heuristic configuration
///
/// Label synonyms are matched case-insensitively as whole words; language
/// variants belong here, not in code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockHeuristics {
    pub labels: Vec<String>,
    pub token: TokenShape,
}

impl Default for StockHeuristics {
    fn default() -> Self {
        Self {
            labels: ["STOCK", "STK", "SKU", "Склад", "Сток"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            token: TokenShape::default(),
        }
    }
}

impl StockHeuristics {
    /// Builder method: replace the label synonyms
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method: add one label synonym
    pub fn add_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Builder method: set the value-token shape
    pub fn with_token(mut self, token: TokenShape) -> Self {
        self.token = token;
        self
    }
}

/// Shape of a stock value token: at least `min_len` characters drawn from
/// A-Z, 0-9 and the characters listed in `extra`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenShape {
    pub min_len: usize,
    pub extra: String,
}

impl Default for TokenShape {
    fn default() -> Self {
        Self {
            min_len: 4,
            extra: "-".to_string(),
        }
    }
}

impl Settings {
    /// Create settings with all defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the data source
    pub fn with_source(mut self, source: DataSource) -> Self {
        self.source = source;
        self
    }

    /// Builder method: set the column mapping
    pub fn with_columns(mut self, columns: ColumnMapping) -> Self {
        self.columns = columns;
        self
    }

    /// Builder method: set the sold-status values
    pub fn with_sold_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sold_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method: set the page selectors
    pub fn with_selectors(mut self, selectors: SelectorConfig) -> Self {
        self.selectors = selectors;
        self
    }

    /// Builder method: set the stock heuristics
    pub fn with_heuristics(mut self, heuristics: StockHeuristics) -> Self {
        self.heuristics = heuristics;
        self
    }

    /// Builder method: set the badge label
    pub fn with_badge_text(mut self, text: impl Into<String>) -> Self {
        self.badge_text = text.into();
        self
    }

    /// Builder method: set the hide-sold default
    pub fn with_hide_sold(mut self, hide: bool) -> Self {
        self.hide_sold = hide;
        self
    }

    /// Badge label, falling back to the default when blank
    pub fn badge_label(&self) -> &str {
        let trimmed = self.badge_text.trim();
        if trimmed.is_empty() {
            "Sold"
        } else {
            trimmed
        }
    }

    /// Sold-status values, trimmed and uppercased; blanks are dropped
    pub fn sold_statuses(&self) -> HashSet<String> {
        self.sold_values
            .iter()
            .map(|v| v.trim().to_uppercase())
            .filter(|v| !v.is_empty())
            .collect()
    }

    /// Interval between scheduled refreshes (never below one minute)
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.auto_refresh_minutes.max(1) * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_partial_record() {
        let json = r#"{ "badge_text": "Vendu", "sold_values": ["vendu"] }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.badge_text, "Vendu");
        assert_eq!(settings.columns.stock_key(), Some("Stock"));
        assert_eq!(settings.auto_refresh_minutes, DEFAULT_REFRESH_MINUTES);
        assert_eq!(settings.heuristics.labels.len(), 5);
    }

    #[test]
    fn test_blank_column_counts_as_unset() {
        let columns = ColumnMapping {
            vin: Some("  ".to_string()),
            stock: Some("Stock".to_string()),
            status: None,
        };
        assert_eq!(columns.vin_key(), None);
        assert_eq!(columns.status_key(), None);
        assert_eq!(columns.required_keys(), vec!["Stock"]);
    }

    #[test]
    fn test_sold_statuses_are_folded() {
        let settings = Settings::new().with_sold_values([" sold ", "SOLD", "", "Pending"]);
        let statuses = settings.sold_statuses();
        assert_eq!(statuses.len(), 2);
        assert!(statuses.contains("SOLD"));
        assert!(statuses.contains("PENDING"));
    }

    #[test]
    fn test_refresh_interval_is_clamped() {
        let mut settings = Settings::new();
        settings.auto_refresh_minutes = 0;
        assert_eq!(settings.refresh_interval(), Duration::from_secs(60));
        settings.auto_refresh_minutes = 15;
        assert_eq!(settings.refresh_interval(), Duration::from_secs(900));
    }

    #[test]
    fn test_source_validation() {
        assert!(DataSource::default().validate().is_err());
        assert!(DataSource::Csv {
            url: "https://example.com/inventory.csv".to_string()
        }
        .validate()
        .is_ok());

        let sheets = DataSource::Sheets {
            spreadsheet_id: "abc".to_string(),
            range: default_range(),
            api_key: String::new(),
        };
        let err = sheets.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Sheets API requires Spreadsheet ID, Range, and API Key."
        );
    }

    #[test]
    fn test_selector_alias() {
        let json = r#"{ "card": ".car", "vin": ".v", "stock": ".s" }"#;
        let selectors: SelectorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(selectors.item, ".car");
    }

    #[test]
    fn test_badge_label_fallback() {
        assert_eq!(Settings::new().with_badge_text("  ").badge_label(), "Sold");
        assert_eq!(Settings::new().with_badge_text("Vendu").badge_label(), "Vendu");
    }
}
