//! Lookup building
//!
//! Turns ingested rows into the identifier sets that define "sold". The
//! function is pure: row order does not matter and running it twice on the
//! same input gives the same sets.

use crate::cache::IdentifierSets;
use crate::config::Settings;
use crate::normalize::{normalize_stock, normalize_vin};
use crate::types::Row;

/// Build the sold VIN and stock sets from `rows`
///
/// An unset status or stock column yields two empty sets; that is an
/// incomplete configuration, not an error. The VIN set stays empty when no
/// VIN column is configured.
pub fn build_lookups(rows: &[Row], settings: &Settings) -> IdentifierSets {
    let mut sets = IdentifierSets::new();

    let (Some(status_key), Some(stock_key)) =
        (settings.columns.status_key(), settings.columns.stock_key())
    else {
        log::debug!("Status or stock column not configured, lookups left empty");
        return sets;
    };
    let vin_key = settings.columns.vin_key();
    let sold = settings.sold_statuses();

    for row in rows {
        let status = cell(row, status_key).trim().to_uppercase();
        if !sold.contains(&status) {
            continue;
        }
        if let Some(vin_key) = vin_key {
            sets.insert_vin(normalize_vin(cell(row, vin_key)));
        }
        sets.insert_stock(normalize_stock(cell(row, stock_key)));
    }

    log::debug!(
        "Built lookups from {} rows: {} VINs, {} stock codes",
        rows.len(),
        sets.vins().len(),
        sets.stocks().len()
    );
    sets
}

fn cell<'r>(row: &'r Row, key: &str) -> &'r str {
    row.get(key).map(String::as_str).unwrap_or_default()
}
