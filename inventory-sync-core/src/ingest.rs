//! Tabular ingestion
//!
//! Both source shapes reduce to the same `Vec<Row>`:
//! - CSV text: header line, then comma-separated lines. No quoting or
//!   escaping - a comma always separates cells.
//! - A grid of strings whose first row holds the headers (Sheets values API).
//!
//! Headers and cells are trimmed; a short line fills missing cells with "".

use crate::types::Row;

/// Parse header + comma-delimited lines into rows
pub fn parse_csv(text: &str) -> Vec<Row> {
    let mut lines = text.trim().lines();
    let headers: Vec<&str> = match lines.next() {
        Some(line) => line.split(',').map(str::trim).collect(),
        None => return Vec::new(),
    };

    lines
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let cells: Vec<&str> = line.split(',').collect();
            build_row(headers.iter().copied(), |idx| cells.get(idx).copied())
        })
        .collect()
}

/// Convert a header-first grid into rows
pub fn rows_from_grid<S: AsRef<str>>(grid: &[Vec<S>]) -> Vec<Row> {
    let Some((headers, body)) = grid.split_first() else {
        return Vec::new();
    };
    let headers: Vec<&str> = headers.iter().map(|h| h.as_ref().trim()).collect();

    body.iter()
        .map(|cells| build_row(headers.iter().copied(), |idx| cells.get(idx).map(|c| c.as_ref())))
        .collect()
}

fn build_row<'a, F>(headers: impl Iterator<Item = &'a str>, cell: F) -> Row
where
    F: Fn(usize) -> Option<&'a str>,
{
    headers
        .enumerate()
        .map(|(idx, header)| {
            let value = cell(idx).unwrap_or_default().trim().to_string();
            (header.to_string(), value)
        })
        .collect()
}

/// Column names present in a row
pub fn row_columns(row: &Row) -> Vec<&str> {
    let mut columns: Vec<&str> = row.keys().map(String::as_str).collect();
    columns.sort_unstable();
    columns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv_basic() {
        let rows = parse_csv("Stock,Comment\nSTK-001,sold\nSTK-002,available");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Stock"], "STK-001");
        assert_eq!(rows[1]["Comment"], "available");
    }

    #[test]
    fn test_parse_csv_crlf_and_padding() {
        let rows = parse_csv("\r\n VIN , Stock ,Status\r\n JM3KK1WY0R1100001 , STK-001 \r\n\r\n,STK-002,Sold\r\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["VIN"], "JM3KK1WY0R1100001");
        assert_eq!(rows[0]["Stock"], "STK-001");
        // Short line: missing trailing cell becomes empty
        assert_eq!(rows[0]["Status"], "");
        assert_eq!(rows[1]["VIN"], "");
        assert_eq!(rows[1]["Status"], "Sold");
    }

    #[test]
    fn test_parse_csv_header_only_and_empty() {
        assert!(parse_csv("Stock,Status").is_empty());
        assert!(parse_csv("").is_empty());
        assert!(parse_csv("   \n  ").is_empty());
    }

    #[test]
    fn test_parse_csv_no_quoting() {
        // Quotes are not special: the comma still splits
        let rows = parse_csv("Stock,Status\n\"A,1\",Sold");
        assert_eq!(rows[0]["Stock"], "\"A");
        assert_eq!(rows[0]["Status"], "1\"");
    }

    #[test]
    fn test_rows_from_grid() {
        let grid = vec![
            vec!["VIN", "Stock", "Status"],
            vec!["JM3KK1WY0R1100001", " STK-001 ", "Sold"],
            vec!["1HGCM82633A004352"],
        ];
        let rows = rows_from_grid(&grid);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Stock"], "STK-001");
        assert_eq!(rows[1]["Status"], "");
        assert_eq!(row_columns(&rows[1]), vec!["Status", "Stock", "VIN"]);
    }

    #[test]
    fn test_rows_from_empty_grid() {
        let grid: Vec<Vec<String>> = Vec::new();
        assert!(rows_from_grid(&grid).is_empty());
    }
}
