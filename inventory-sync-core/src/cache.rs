//! Identifier sets and the active cache
//!
//! [`IdentifierSets`] is what the lookup builder produces. [`Cache`] is the
//! committed pair plus the time it was built; it is only ever replaced
//! wholesale, never merged. [`CacheRecord`] is the persisted shape: two
//! lists of canonical strings and an integer millisecond timestamp.

use crate::types::{ItemIdentifiers, Timestamp};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Canonical VINs and stock codes that mean "sold"
///
/// Members are always normalized and never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierSets {
    vins: BTreeSet<String>,
    stocks: BTreeSet<String>,
}

impl IdentifierSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a normalized VIN; empty strings are ignored
    pub fn insert_vin(&mut self, vin: String) {
        if !vin.is_empty() {
            self.vins.insert(vin);
        }
    }

    /// Add a normalized stock code; empty strings are ignored
    pub fn insert_stock(&mut self, stock: String) {
        if !stock.is_empty() {
            self.stocks.insert(stock);
        }
    }

    pub fn vins(&self) -> &BTreeSet<String> {
        &self.vins
    }

    pub fn stocks(&self) -> &BTreeSet<String> {
        &self.stocks
    }

    pub fn contains_vin(&self, vin: &str) -> bool {
        !vin.is_empty() && self.vins.contains(vin)
    }

    pub fn contains_stock(&self, stock: &str) -> bool {
        !stock.is_empty() && self.stocks.contains(stock)
    }

    pub fn is_empty(&self) -> bool {
        self.vins.is_empty() && self.stocks.is_empty()
    }
}

/// The active cache
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cache {
    pub sets: IdentifierSets,
    /// When the sets were committed (`None` = never synced)
    pub last_sync: Option<Timestamp>,
}

impl Cache {
    pub fn new(sets: IdentifierSets, last_sync: Timestamp) -> Self {
        Self {
            sets,
            last_sync: Some(last_sync),
        }
    }

    /// Either identifier alone is enough to call an item sold
    pub fn is_sold(&self, ids: &ItemIdentifiers) -> bool {
        self.sets.contains_vin(&ids.vin) || self.sets.contains_stock(&ids.stock)
    }

    /// Milliseconds since the epoch, 0 when never synced
    pub fn last_sync_millis(&self) -> i64 {
        self.last_sync.map(|t| t.timestamp_millis()).unwrap_or(0)
    }

    pub fn to_record(&self) -> CacheRecord {
        CacheRecord {
            vins: self.sets.vins.iter().cloned().collect(),
            stocks: self.sets.stocks.iter().cloned().collect(),
            last_sync: self.last_sync_millis(),
        }
    }

    /// Rebuild from the persisted shape; blank entries are dropped
    pub fn from_record(record: CacheRecord) -> Self {
        let mut sets = IdentifierSets::new();
        for vin in record.vins {
            sets.insert_vin(vin);
        }
        for stock in record.stocks {
            sets.insert_stock(stock);
        }
        Self {
            sets,
            last_sync: timestamp_from_millis(record.last_sync),
        }
    }
}

/// Persisted cache shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    #[serde(default)]
    pub vins: Vec<String>,
    #[serde(default)]
    pub stocks: Vec<String>,
    #[serde(default, rename = "lastSync")]
    pub last_sync: i64,
}

fn timestamp_from_millis(millis: i64) -> Option<Timestamp> {
    if millis <= 0 {
        return None;
    }
    DateTime::from_timestamp_millis(millis)
}

/// Human-readable last-sync time: "Never", "Invalid date", or local time
pub fn format_last_sync(millis: i64) -> String {
    if millis == 0 {
        return "Never".to_string();
    }
    match DateTime::from_timestamp_millis(millis) {
        Some(t) => t
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => "Invalid date".to_string(),
    }
}
