//! Identifier extraction
//!
//! Pulls a VIN and a stock code out of a page item. A configured selector is
//! preferred; when it is missing or yields nothing usable, the item's full
//! text is scanned with label-aware heuristics. Extraction never fails - an
//! empty string means "nothing found".

use crate::config::{Settings, StockHeuristics};
use crate::dom::{Page, Selector};
use crate::normalize::{normalize_stock, normalize_vin};
use crate::types::{ItemIdentifiers, Result, SyncError};
use regex::Regex;
use std::sync::OnceLock;

/// 17 characters from the VIN alphabet (no I, O, Q), as a standalone word
fn vin_pattern() -> &'static Regex {
    static VIN: OnceLock<Regex> = OnceLock::new();
    VIN.get_or_init(|| Regex::new(r"\b[A-HJ-NPR-Z0-9]{17}\b").expect("static VIN pattern"))
}

/// Find the first VIN-shaped token in free text, normalized
pub fn find_vin_in_text(text: &str) -> String {
    vin_pattern()
        .find(text)
        .map(|m| normalize_vin(m.as_str()))
        .unwrap_or_default()
}

/// Compiled stock-label heuristics
#[derive(Debug, Clone)]
pub struct StockMatcher {
    /// Any label synonym as a standalone word
    label: Option<Regex>,
    /// Text that is exactly one label synonym
    exact_label: Option<Regex>,
    /// A stock value token
    token: Regex,
}

impl StockMatcher {
    /// Compile the heuristics
    pub fn new(heuristics: &StockHeuristics) -> Result<Self> {
        let labels: Vec<&str> = heuristics
            .labels
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect();

        let (label, exact_label) = if labels.is_empty() {
            (None, None)
        } else {
            let bounded: Vec<String> = labels.iter().map(|l| word_bounded(l)).collect();
            let escaped: Vec<String> = labels.iter().map(|l| regex::escape(l)).collect();
            (
                Some(compile(&format!(r"(?i){}", bounded.join("|")))?),
                Some(compile(&format!(r"(?i)^(?:{})$", escaped.join("|")))?),
            )
        };

        let extra: String = heuristics
            .token
            .extra
            .chars()
            .filter(|c| !c.is_ascii_alphanumeric() && !c.is_whitespace())
            .map(|c| regex::escape(&c.to_string()))
            .collect();
        let token = compile(&format!(
            r"\b[A-Z0-9{}]{{{},}}\b",
            extra,
            heuristics.token.min_len.max(1)
        ))?;

        Ok(Self {
            label,
            exact_label,
            token,
        })
    }

    /// First value token in `text`
    pub fn find_token<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.token.find(text).map(|m| m.as_str())
    }

    fn is_label(&self, text: &str) -> bool {
        self.exact_label
            .as_ref()
            .is_some_and(|re| re.is_match(text.trim()))
    }

    /// Label-aware search of free text; returns the raw (un-normalized) value
    pub fn extract_from_text<'t>(&self, text: &'t str) -> Option<&'t str> {
        if text.is_empty() {
            return None;
        }

        // Value following a label occurrence, first hit wins
        if let Some(label) = &self.label {
            for found in label.find_iter(text) {
                if let Some(value) = self.find_token(strip_separators(&text[found.end()..])) {
                    return Some(value);
                }
            }
        }

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        match trimmed.find(&[':', '#'][..]) {
            Some(sep) => {
                let before = trimmed[..sep].trim();
                if before.is_empty() || self.is_label(before) {
                    self.find_token(strip_separators(&trimmed[sep + 1..]))
                } else {
                    None
                }
            }
            None => self.find_token(trimmed),
        }
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| SyncError::Configuration(format!("Invalid stock heuristic: {}", e)))
}

/// Escaped label with `\b` on each side that starts or ends in a word character
fn word_bounded(label: &str) -> String {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let mut pattern = String::from("(?:");
    if label.chars().next().is_some_and(is_word) {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&regex::escape(label));
    if label.chars().next_back().is_some_and(is_word) {
        pattern.push_str(r"\b");
    }
    pattern.push(')');
    pattern
}

/// Drop leading `:`, `#`, `-` and whitespace
fn strip_separators(text: &str) -> &str {
    text.trim_start_matches(|c: char| matches!(c, ':' | '#' | '-') || c.is_whitespace())
        .trim()
}

/// Free-text stock extraction with the given heuristics, raw value
pub fn extract_stock_from_text(text: &str, heuristics: &StockHeuristics) -> Result<String> {
    let matcher = StockMatcher::new(heuristics)?;
    Ok(matcher
        .extract_from_text(text)
        .map(str::to_string)
        .unwrap_or_default())
}

/// Selector + heuristic configuration, compiled once per settings change
#[derive(Debug, Clone)]
pub struct Extractor {
    vin_selector: Option<Selector>,
    stock_selector: Option<Selector>,
    stock: StockMatcher,
}

impl Extractor {
    /// Compile the extraction part of the settings
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            vin_selector: Selector::parse_optional(&settings.selectors.vin)?,
            stock_selector: Selector::parse_optional(&settings.selectors.stock)?,
            stock: StockMatcher::new(&settings.heuristics)?,
        })
    }

    pub fn stock_matcher(&self) -> &StockMatcher {
        &self.stock
    }

    fn selector_text<P: Page>(page: &P, item: P::Item, selector: Option<&Selector>) -> String {
        selector
            .and_then(|sel| page.select_text(item, sel))
            .unwrap_or_default()
    }

    /// Normalized VIN of an item, or empty
    pub fn extract_vin<P: Page>(&self, page: &P, item: P::Item) -> String {
        let from_selector = normalize_vin(&Self::selector_text(page, item, self.vin_selector.as_ref()));
        if !from_selector.is_empty() {
            return from_selector;
        }
        find_vin_in_text(&page.text(item))
    }

    /// Normalized stock code of an item, or empty
    pub fn extract_stock<P: Page>(&self, page: &P, item: P::Item) -> String {
        let from_selector = Self::selector_text(page, item, self.stock_selector.as_ref());
        if !from_selector.trim().is_empty() {
            if let Some(value) = self.stock.find_token(&from_selector) {
                return normalize_stock(value);
            }
        }
        self.stock
            .extract_from_text(&page.text(item))
            .map(normalize_stock)
            .unwrap_or_default()
    }

    /// Both identifiers; an item with neither is an extraction error
    pub fn identify<P: Page>(&self, page: &P, item: P::Item) -> Result<ItemIdentifiers> {
        let ids = ItemIdentifiers {
            vin: self.extract_vin(page, item),
            stock: self.extract_stock(page, item),
        };
        if ids.is_empty() {
            let text = page.text(item);
            let preview: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
            let preview: String = preview.chars().take(60).collect();
            return Err(SyncError::Extraction(format!("{:?}", preview)));
        }
        Ok(ids)
    }
}
