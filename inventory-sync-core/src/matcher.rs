//! Matching and annotation
//!
//! [`annotate`] brings a single item's visual state in line with a sold
//! verdict. It reads before it writes, so calling it again with the same
//! inputs touches nothing. [`PageContext`] is the per-page controller: it
//! owns the compiled settings, the cache snapshot, the hide flag and the
//! debounce slot, and every event that can change the page is a method on
//! it.

use crate::cache::Cache;
use crate::config::Settings;
use crate::dom::{Flag, Page, Selector};
use crate::extract::Extractor;
use crate::timing::Debouncer;
use crate::types::{ItemIdentifiers, Result};
use std::time::Instant;

/// Sold iff either identifier is in the matching cache set
pub fn classify(ids: &ItemIdentifiers, cache: &Cache) -> bool {
    cache.is_sold(ids)
}

/// How sold items are rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationStyle {
    pub badge_label: String,
    pub hide_sold: bool,
}

impl AnnotationStyle {
    pub fn new(settings: &Settings, hide_sold: bool) -> Self {
        Self {
            badge_label: settings.badge_label().to_string(),
            hide_sold,
        }
    }
}

/// Page mutations issued by one or more [`annotate`] calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotationChanges {
    pub flags: usize,
    pub badges: usize,
}

impl AnnotationChanges {
    pub fn is_empty(&self) -> bool {
        self.flags == 0 && self.badges == 0
    }

    fn merge(&mut self, other: AnnotationChanges) {
        self.flags += other.flags;
        self.badges += other.badges;
    }
}

/// Apply the sold verdict to one item
pub fn annotate<P: Page>(
    page: &mut P,
    item: P::Item,
    sold: bool,
    style: &AnnotationStyle,
) -> AnnotationChanges {
    let mut changes = AnnotationChanges::default();

    let hidden = sold && style.hide_sold;
    for (flag, on) in [(Flag::Sold, sold), (Flag::Hidden, hidden)] {
        if page.has_flag(item, flag) != on {
            page.set_flag(item, flag, on);
            changes.flags += 1;
        }
    }

    match (sold, page.badge(item)) {
        (true, Some(label)) if label == style.badge_label => {}
        (true, _) => {
            page.set_badge(item, &style.badge_label);
            changes.badges += 1;
        }
        (false, Some(_)) => {
            page.remove_badge(item);
            changes.badges += 1;
        }
        (false, None) => {}
    }

    changes
}

/// Result of one full pass over the page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Items matched by the item selector
    pub items: usize,
    /// Items classified sold
    pub sold: usize,
    /// Items where neither identifier could be extracted
    pub unidentified: usize,
    pub changes: AnnotationChanges,
}

/// Compiled settings: item selector, extractor and annotation style
#[derive(Debug, Clone)]
pub struct Matcher {
    items: Option<Selector>,
    extractor: Extractor,
    style: AnnotationStyle,
}

impl Matcher {
    pub fn new(settings: &Settings, hide_sold: bool) -> Result<Self> {
        Ok(Self {
            items: Selector::parse_optional(&settings.selectors.item)?,
            extractor: Extractor::new(settings)?,
            style: AnnotationStyle::new(settings, hide_sold),
        })
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    pub fn style(&self) -> &AnnotationStyle {
        &self.style
    }

    pub fn set_hide_sold(&mut self, hide: bool) {
        self.style.hide_sold = hide;
    }

    /// Classify and annotate every item on the page
    ///
    /// An item whose identifiers cannot be extracted is treated as not sold;
    /// the miss is logged and the pass continues.
    pub fn run_pass<P: Page>(&self, page: &mut P, cache: &Cache) -> PassSummary {
        let mut summary = PassSummary::default();
        let Some(selector) = &self.items else {
            return summary;
        };

        for item in page.items(selector) {
            summary.items += 1;
            let sold = match self.extractor.identify(page, item) {
                Ok(ids) => classify(&ids, cache),
                Err(e) => {
                    log::debug!("{}", e);
                    summary.unidentified += 1;
                    false
                }
            };
            if sold {
                summary.sold += 1;
            }
            summary.changes.merge(annotate(page, item, sold, &self.style));
        }

        log::debug!(
            "Pass over {} items: {} sold, {} unidentified, {} flag and {} badge changes",
            summary.items,
            summary.sold,
            summary.unidentified,
            summary.changes.flags,
            summary.changes.badges
        );
        summary
    }
}

/// Per-page controller
#[derive(Debug)]
pub struct PageContext {
    settings: Settings,
    matcher: Matcher,
    cache: Cache,
    debouncer: Debouncer,
}

impl PageContext {
    /// Compile `settings` and take the initial cache snapshot
    pub fn new(settings: Settings, cache: Cache, hide_sold: bool) -> Result<Self> {
        let matcher = Matcher::new(&settings, hide_sold)?;
        Ok(Self {
            settings,
            matcher,
            cache,
            debouncer: Debouncer::default(),
        })
    }

    /// Swap in a debouncer with a different window
    pub fn with_debouncer(mut self, debouncer: Debouncer) -> Self {
        self.debouncer = debouncer;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn hide_sold(&self) -> bool {
        self.matcher.style().hide_sold
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Initial pass when the page is first available
    pub fn on_load<P: Page>(&mut self, page: &mut P) -> PassSummary {
        self.full_pass(page)
    }

    /// A newer cache was committed
    pub fn on_cache_replaced<P: Page>(&mut self, page: &mut P, cache: Cache) -> PassSummary {
        self.cache = cache;
        self.full_pass(page)
    }

    /// Settings changed; an invalid record keeps the previous compilation
    pub fn on_settings_replaced<P: Page>(
        &mut self,
        page: &mut P,
        settings: Settings,
        hide_sold: bool,
    ) -> Result<PassSummary> {
        self.matcher = Matcher::new(&settings, hide_sold)?;
        self.settings = settings;
        Ok(self.full_pass(page))
    }

    /// Hide-sold flag toggled
    pub fn on_hide_toggled<P: Page>(&mut self, page: &mut P, hide: bool) -> PassSummary {
        self.matcher.set_hide_sold(hide);
        self.full_pass(page)
    }

    /// The page structure changed; reprocessing waits for the burst to end
    pub fn on_mutation(&mut self, now: Instant) {
        self.debouncer.signal(now);
    }

    /// Run the debounced pass if its window has elapsed
    pub fn poll<P: Page>(&mut self, page: &mut P, now: Instant) -> Option<PassSummary> {
        if self.debouncer.fire(now) {
            Some(self.full_pass(page))
        } else {
            None
        }
    }

    /// When the pending debounced pass is due, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    fn full_pass<P: Page>(&mut self, page: &mut P) -> PassSummary {
        // A direct pass supersedes a pending debounced one
        self.debouncer.cancel();
        self.matcher.run_pass(page, &self.cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::IdentifierSets;
    use crate::dom::parse_html;
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    /// Minimal page that counts every mutation it receives
    #[derive(Default)]
    struct CountingPage {
        texts: Vec<String>,
        flags: HashSet<(usize, Flag)>,
        badges: HashMap<usize, String>,
        flag_writes: usize,
        badge_writes: usize,
    }

    impl CountingPage {
        fn with_items(texts: &[&str]) -> Self {
            Self {
                texts: texts.iter().map(|t| t.to_string()).collect(),
                ..Default::default()
            }
        }

        fn writes(&self) -> usize {
            self.flag_writes + self.badge_writes
        }
    }

    impl Page for CountingPage {
        type Item = usize;

        fn items(&self, _selector: &Selector) -> Vec<usize> {
            (0..self.texts.len()).collect()
        }

        fn text(&self, item: usize) -> String {
            self.texts[item].clone()
        }

        fn select_text(&self, _item: usize, _selector: &Selector) -> Option<String> {
            None
        }

        fn has_flag(&self, item: usize, flag: Flag) -> bool {
            self.flags.contains(&(item, flag))
        }

        fn set_flag(&mut self, item: usize, flag: Flag, on: bool) {
            self.flag_writes += 1;
            if on {
                self.flags.insert((item, flag));
            } else {
                self.flags.remove(&(item, flag));
            }
        }

        fn badge(&self, item: usize) -> Option<String> {
            self.badges.get(&item).cloned()
        }

        fn set_badge(&mut self, item: usize, label: &str) {
            self.badge_writes += 1;
            self.badges.insert(item, label.to_string());
        }

        fn remove_badge(&mut self, item: usize) {
            self.badge_writes += 1;
            self.badges.remove(&item);
        }
    }

    fn cache_with_stocks(stocks: &[&str]) -> Cache {
        let mut sets = IdentifierSets::new();
        for stock in stocks {
            sets.insert_stock(stock.to_string());
        }
        Cache::new(sets, chrono::Utc::now())
    }

    fn style(hide_sold: bool) -> AnnotationStyle {
        AnnotationStyle {
            badge_label: "Sold".to_string(),
            hide_sold,
        }
    }

    #[test]
    fn test_classify() {
        let cache = cache_with_stocks(&["STK-001"]);
        let ids = |stock: &str| ItemIdentifiers {
            vin: String::new(),
            stock: stock.to_string(),
        };
        assert!(classify(&ids("STK-001"), &cache));
        assert!(!classify(&ids("STK-002"), &cache));
        assert!(!classify(&ids(""), &cache));
    }

    #[test]
    fn test_annotate_is_idempotent() {
        let mut page = CountingPage::with_items(&["Stock: A100"]);
        let first = annotate(&mut page, 0, true, &style(true));
        assert_eq!(first, AnnotationChanges { flags: 2, badges: 1 });
        assert!(page.has_flag(0, Flag::Sold));
        assert!(page.has_flag(0, Flag::Hidden));

        let writes = page.writes();
        let second = annotate(&mut page, 0, true, &style(true));
        assert!(second.is_empty());
        assert_eq!(page.writes(), writes);
    }

    #[test]
    fn test_annotate_clears_when_no_longer_sold() {
        let mut page = CountingPage::with_items(&["Stock: A100"]);
        annotate(&mut page, 0, true, &style(true));

        let changes = annotate(&mut page, 0, false, &style(true));
        assert_eq!(changes, AnnotationChanges { flags: 2, badges: 1 });
        assert!(page.flags.is_empty());
        assert!(page.badges.is_empty());

        // Unsold and unannotated: nothing to do
        assert!(annotate(&mut page, 0, false, &style(true)).is_empty());
    }

    #[test]
    fn test_annotate_hide_toggle_and_relabel() {
        let mut page = CountingPage::with_items(&["Stock: A100"]);
        annotate(&mut page, 0, true, &style(false));
        assert!(!page.has_flag(0, Flag::Hidden));

        let changes = annotate(&mut page, 0, true, &style(true));
        assert_eq!(changes, AnnotationChanges { flags: 1, badges: 0 });

        let relabel = AnnotationStyle {
            badge_label: "Vendu".to_string(),
            hide_sold: true,
        };
        let changes = annotate(&mut page, 0, true, &relabel);
        assert_eq!(changes, AnnotationChanges { flags: 0, badges: 1 });
        assert_eq!(page.badge(0).as_deref(), Some("Vendu"));
    }

    #[test]
    fn test_run_pass_counts_and_unidentified_items() {
        let settings = Settings::default();
        let matcher = Matcher::new(&settings, false).unwrap();
        let cache = cache_with_stocks(&["A100"]);
        let mut page = CountingPage::with_items(&["Stock: A100", "Stock: B200", "no identifiers here"]);

        let summary = matcher.run_pass(&mut page, &cache);
        assert_eq!(summary.items, 3);
        assert_eq!(summary.sold, 1);
        assert_eq!(summary.unidentified, 1);
        assert_eq!(summary.changes, AnnotationChanges { flags: 1, badges: 1 });

        // Second pass over the same state changes nothing
        let again = matcher.run_pass(&mut page, &cache);
        assert!(again.changes.is_empty());
    }

    #[test]
    fn test_empty_item_selector_is_noop() {
        let mut settings = Settings::default();
        settings.selectors.item = "  ".to_string();
        let matcher = Matcher::new(&settings, false).unwrap();
        let mut page = CountingPage::with_items(&["Stock: A100"]);
        let summary = matcher.run_pass(&mut page, &cache_with_stocks(&["A100"]));
        assert_eq!(summary, PassSummary::default());
        assert_eq!(page.writes(), 0);
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let mut settings = Settings::default();
        settings.selectors.item = "div:hover".to_string();
        assert!(Matcher::new(&settings, false).is_err());
    }

    #[test]
    fn test_page_context_events() {
        let mut doc = parse_html(
            r#"<div class="vehicle-card">Stock: A100</div><div class="vehicle-card">Stock: B200</div>"#,
        );
        let mut ctx = PageContext::new(Settings::default(), Cache::default(), false).unwrap();

        let summary = ctx.on_load(&mut doc);
        assert_eq!(summary.items, 2);
        assert_eq!(summary.sold, 0);

        let summary = ctx.on_cache_replaced(&mut doc, cache_with_stocks(&["B200"]));
        assert_eq!(summary.sold, 1);
        let cards = doc.select_all(&Selector::parse(".vehicle-card").unwrap());
        assert!(doc.has_class(cards[1], "ih-sold"));
        assert!(!doc.has_class(cards[1], "ih-hidden"));

        ctx.on_hide_toggled(&mut doc, true);
        assert!(ctx.hide_sold());
        assert!(doc.has_class(cards[1], "ih-hidden"));

        let relabeled = Settings::default().with_badge_text("Vendu");
        ctx.on_settings_replaced(&mut doc, relabeled, true).unwrap();
        assert_eq!(doc.badge(cards[1]).as_deref(), Some("Vendu"));

        // Broken settings leave the previous compilation in place
        let mut broken = Settings::default();
        broken.selectors.item = "div:hover".to_string();
        assert!(ctx.on_settings_replaced(&mut doc, broken, true).is_err());
        assert_eq!(ctx.settings().badge_text, "Vendu");
    }

    #[test]
    fn test_items_without_end_tags_are_classified_separately() {
        let mut doc = parse_html(
            "<ul><li class=\"vehicle\">Call for price\n<li class=\"vehicle\">Stock: B200</ul>",
        );
        let mut settings = Settings::default();
        settings.selectors.item = ".vehicle".to_string();
        let mut ctx = PageContext::new(settings, cache_with_stocks(&["B200"]), true).unwrap();

        let summary = ctx.on_load(&mut doc);
        assert_eq!(summary.items, 2);
        assert_eq!(summary.sold, 1);
        assert_eq!(summary.unidentified, 1);

        let items = doc.select_all(&Selector::parse(".vehicle").unwrap());
        assert!(!doc.has_class(items[0], "ih-sold"));
        assert!(!doc.has_class(items[0], "ih-hidden"));
        assert!(doc.has_class(items[1], "ih-sold"));
        assert!(doc.has_class(items[1], "ih-hidden"));
        assert_eq!(doc.badge(items[0]), None);

        let html = crate::dom::to_html(&doc);
        assert!(html.contains(r#"Stock: B200<div class="ih-badge""#));
        assert_eq!(html.matches("ih-badge").count(), 1);
    }

    #[test]
    fn test_page_context_debounces_mutations() {
        let mut doc = parse_html(r#"<div class="vehicle-card">Stock: A100</div>"#);
        let mut ctx = PageContext::new(Settings::default(), cache_with_stocks(&["A100"]), false)
            .unwrap()
            .with_debouncer(Debouncer::new(Duration::from_millis(100)));
        ctx.on_load(&mut doc);

        let start = Instant::now();
        let root = doc.root();
        for i in 0..5u32 {
            let now = start + Duration::from_millis(10) * i;
            let card = doc.create_element("div");
            doc.set_attr(card, "class", "vehicle-card");
            let text = doc.create_text(&format!("Stock: A10{}", i));
            doc.append_child(card, text);
            doc.append_child(root, card);
            ctx.on_mutation(now);
            assert!(ctx.poll(&mut doc, now).is_none());
        }

        let last = start + Duration::from_millis(40);
        assert_eq!(ctx.next_deadline(), Some(last + Duration::from_millis(100)));
        let summary = ctx.poll(&mut doc, last + Duration::from_millis(100)).unwrap();
        assert_eq!(summary.items, 6);
        // A100 on the first card and the first new one; A101..A104 are not sold
        assert_eq!(summary.sold, 2);
        assert!(ctx.poll(&mut doc, last + Duration::from_secs(1)).is_none());
    }
}
