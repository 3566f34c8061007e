//! Inventory Sync Library
//!
//! Marks inventory items on a page as sold, using a published spreadsheet
//! as the source of truth.
//!
//! # Architecture
//!
//! The library is split along the two contexts that share state only through
//! a store and broadcast messages:
//! - The refresh side ([`Refresher`]) fetches the sold/unsold table, checks
//!   it, builds the sold identifier sets and commits them as the new cache
//! - The page side ([`PageContext`]) extracts a VIN and stock code from each
//!   item, classifies it against the cache and annotates it
//!
//! The library does NOT:
//! - Perform HTTP requests (hosts implement [`RowSource`])
//! - Persist anything to disk (hosts implement [`Store`])
//! - Render pages (hosts implement [`Page`], or use [`Document`])
//!
//! The file store, HTTP source and watch loop live in the application layer
//! (inventory-sync-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use inventory_sync_core::{
//!     parse_html, DataSource, MemoryStore, NullNotifier, PageContext, Refresher, Row,
//!     RowSource, Settings, Store, Trigger,
//! };
//!
//! struct StaticSource;
//!
//! impl RowSource for StaticSource {
//!     fn fetch_rows(&self, _settings: &Settings) -> inventory_sync_core::Result<Vec<Row>> {
//!         Ok(inventory_sync_core::parse_csv("Stock,Status\nSTK-001,Sold"))
//!     }
//! }
//!
//! let settings = Settings::new().with_source(DataSource::Csv {
//!     url: "https://example.com/inventory.csv".to_string(),
//! });
//! let refresher = Refresher::new(MemoryStore::with_settings(settings), StaticSource, NullNotifier);
//! refresher.refresh(Trigger::Manual).unwrap();
//!
//! let store = refresher.store();
//! let mut page = parse_html(r#"<div class="vehicle-card">Stock: STK-001</div>"#);
//! let mut ctx = PageContext::new(
//!     store.load_settings().unwrap(),
//!     store.load_cache().unwrap(),
//!     store.hide_sold().unwrap(),
//! )
//! .unwrap();
//! let summary = ctx.on_load(&mut page);
//! println!("{} of {} items sold", summary.sold, summary.items);
//! ```

// Public modules
pub mod cache;
pub mod config;
pub mod dom;
pub mod extract;
pub mod ingest;
pub mod lookup;
pub mod matcher;
pub mod messages;
pub mod normalize;
pub mod refresh;
pub mod store;
pub mod timing;
pub mod types;

// Re-export main types for convenience
pub use cache::{format_last_sync, Cache, CacheRecord, IdentifierSets};
pub use config::{
    ColumnMapping, DataSource, SelectorConfig, Settings, StockHeuristics, TokenShape,
    DEFAULT_REFRESH_MINUTES,
};
pub use dom::{parse_html, to_html, Document, Flag, NodeId, Page, Selector};
pub use extract::{extract_stock_from_text, find_vin_in_text, Extractor, StockMatcher};
pub use ingest::{parse_csv, rows_from_grid};
pub use lookup::build_lookups;
pub use matcher::{annotate, classify, AnnotationChanges, AnnotationStyle, Matcher, PageContext, PassSummary};
pub use messages::{
    ChannelNotifier, LastSyncResponse, Notification, Notifier, NullNotifier, RefreshResponse,
    Request, Response,
};
pub use normalize::{normalize_stock, normalize_vin};
pub use refresh::{RefreshOutcome, RefreshReport, RefreshState, Refresher, RowSource, Trigger};
pub use store::{apply_settings, set_hide_sold, MemoryStore, Store};
pub use timing::{Debouncer, RefreshSchedule};
pub use types::{status_message, ErrorKind, ItemIdentifiers, Result, Row, SyncError, Timestamp};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
