//! Refresh orchestrator
//!
//! One attempt walks Idle → Fetching → Validating → Committing → Idle. Any
//! failure goes through Failed back to Idle and leaves the stored cache
//! exactly as it was.
//!
//! Attempts may overlap (a manual refresh while a scheduled one is still
//! fetching). Every attempt draws a sequence number when it starts, and only
//! the most recently issued attempt may commit; an older one that finishes
//! late ends as [`RefreshOutcome::Superseded`].

use crate::cache::Cache;
use crate::config::Settings;
use crate::ingest::row_columns;
use crate::lookup::build_lookups;
use crate::messages::{LastSyncResponse, Notification, Notifier, RefreshResponse, Request, Response};
use crate::store::Store;
use crate::types::{status_message, Result, Row, SyncError, Timestamp};
use chrono::Utc;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Where the sold/unsold table comes from
pub trait RowSource {
    /// Fetch and ingest the configured source
    fn fetch_rows(&self, settings: &Settings) -> Result<Vec<Row>>;
}

impl<F: RowSource + ?Sized> RowSource for &F {
    fn fetch_rows(&self, settings: &Settings) -> Result<Vec<Row>> {
        (**self).fetch_rows(settings)
    }
}

/// What started an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Scheduled,
    Manual,
    SettingsChanged,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Scheduled => write!(f, "scheduled"),
            Trigger::Manual => write!(f, "manual"),
            Trigger::SettingsChanged => write!(f, "settings change"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Fetching,
    Validating,
    Committing,
    Failed,
}

/// A committed refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub sequence: u64,
    pub last_sync: Timestamp,
    /// Ingested rows
    pub count: usize,
    pub vins: usize,
    pub stocks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Committed(RefreshReport),
    /// A newer attempt was issued before this one could commit
    Superseded { sequence: u64, latest: u64 },
}

/// Record of one attempt's state transitions
#[derive(Debug, Clone)]
struct Attempt {
    sequence: u64,
    trigger: Trigger,
    states: Vec<RefreshState>,
}

impl Attempt {
    fn new(sequence: u64, trigger: Trigger) -> Self {
        Self {
            sequence,
            trigger,
            states: vec![RefreshState::Idle],
        }
    }

    fn enter(&mut self, state: RefreshState) {
        log::debug!("Refresh #{} ({}): {:?}", self.sequence, self.trigger, state);
        self.states.push(state);
    }
}

/// Drives refresh attempts against a store, a row source and a notifier
pub struct Refresher<S, F, N> {
    store: S,
    source: F,
    notifier: N,
    issued: AtomicU64,
    commit_lock: Mutex<()>,
    last_error: Mutex<Option<String>>,
    last_states: Mutex<Vec<RefreshState>>,
}

impl<S, F, N> Refresher<S, F, N>
where
    S: Store,
    F: RowSource,
    N: Notifier,
{
    pub fn new(store: S, source: F, notifier: N) -> Self {
        Self {
            store,
            source,
            notifier,
            issued: AtomicU64::new(0),
            commit_lock: Mutex::new(()),
            last_error: Mutex::new(None),
            last_states: Mutex::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Message of the most recent failed attempt, cleared by a commit
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    /// State transitions of the most recently finished attempt
    pub fn last_transitions(&self) -> Vec<RefreshState> {
        self.last_states
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Run one attempt
    pub fn refresh(&self, trigger: Trigger) -> Result<RefreshOutcome> {
        let sequence = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let mut attempt = Attempt::new(sequence, trigger);
        log::info!("Refresh #{} started ({})", sequence, trigger);

        let result = self.run(&mut attempt);
        match &result {
            Ok(RefreshOutcome::Committed(_)) => self.set_last_error(None),
            Ok(RefreshOutcome::Superseded { .. }) => {}
            Err(e) => {
                attempt.enter(RefreshState::Failed);
                self.set_last_error(Some(e.to_string()));
            }
        }
        attempt.enter(RefreshState::Idle);
        if let Ok(mut states) = self.last_states.lock() {
            *states = attempt.states;
        }
        result
    }

    /// Timer or settings-change attempt: failures are logged, not returned
    pub fn refresh_in_background(&self, trigger: Trigger) -> Option<RefreshOutcome> {
        match self.refresh(trigger) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                log::error!("Background refresh failed ({}): {}", e.kind(), e);
                None
            }
        }
    }

    /// Milliseconds of the last commit, 0 when never synced
    pub fn last_sync(&self) -> Result<i64> {
        Ok(self.store.load_cache()?.last_sync_millis())
    }

    /// Answer a cross-context request
    pub fn handle(&self, request: Request) -> Response {
        match request {
            Request::RefreshNow => Response::Refresh(match self.refresh(Trigger::Manual) {
                Ok(RefreshOutcome::Committed(report)) => {
                    RefreshResponse::ok(report.last_sync.timestamp_millis(), report.count)
                }
                Ok(RefreshOutcome::Superseded { .. }) => {
                    RefreshResponse::failed("Refresh superseded by a newer request.")
                }
                Err(e) => RefreshResponse::failed(status_message(Some(&e))),
            }),
            Request::GetLastSync => {
                let last_sync = self.last_sync().unwrap_or_else(|e| {
                    log::warn!("Could not read last sync: {}", e);
                    0
                });
                Response::LastSync(LastSyncResponse { last_sync })
            }
        }
    }

    fn run(&self, attempt: &mut Attempt) -> Result<RefreshOutcome> {
        attempt.enter(RefreshState::Fetching);
        let settings = self.store.load_settings()?;
        check_configuration(&settings)?;
        let rows = self.source.fetch_rows(&settings)?;

        attempt.enter(RefreshState::Validating);
        validate_rows(&rows, &settings)?;

        attempt.enter(RefreshState::Committing);
        let sets = build_lookups(&rows, &settings);

        let guard = self
            .commit_lock
            .lock()
            .map_err(|_| SyncError::Store("commit lock poisoned".to_string()))?;
        let latest = self.issued.load(Ordering::SeqCst);
        if attempt.sequence != latest {
            log::warn!(
                "Refresh #{} superseded by #{}, discarding {} rows",
                attempt.sequence,
                latest,
                rows.len()
            );
            return Ok(RefreshOutcome::Superseded {
                sequence: attempt.sequence,
                latest,
            });
        }

        let now = Utc::now();
        let report = RefreshReport {
            sequence: attempt.sequence,
            last_sync: now,
            count: rows.len(),
            vins: sets.vins().len(),
            stocks: sets.stocks().len(),
        };
        self.store.save_cache(&Cache::new(sets, now))?;
        drop(guard);

        log::info!(
            "Refresh #{} committed: {} rows, {} sold VINs, {} sold stock codes",
            report.sequence,
            report.count,
            report.vins,
            report.stocks
        );
        self.notifier.notify(Notification::CacheUpdated {
            last_sync: now.timestamp_millis(),
        });
        Ok(RefreshOutcome::Committed(report))
    }

    fn set_last_error(&self, error: Option<String>) {
        if let Ok(mut last) = self.last_error.lock() {
            *last = error;
        }
    }
}

/// Everything a fetch needs must be filled in
fn check_configuration(settings: &Settings) -> Result<()> {
    settings.source.validate()?;
    if settings.columns.status_key().is_none() || settings.columns.stock_key().is_none() {
        return Err(SyncError::Configuration(
            "Status and Stock columns must be configured.".to_string(),
        ));
    }
    Ok(())
}

/// Structural check on the first row: every required key must be present
fn validate_rows(rows: &[Row], settings: &Settings) -> Result<()> {
    let Some(sample) = rows.first() else {
        return Err(SyncError::Validation(
            "Data source returned no rows.".to_string(),
        ));
    };
    let missing: Vec<&str> = settings
        .columns
        .required_keys()
        .into_iter()
        .filter(|key| !sample.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(SyncError::Validation(format!(
            "Missing column(s) {} in data source (found: {}).",
            missing.join(", "),
            row_columns(sample).join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnMapping, DataSource};
    use crate::ingest::parse_csv;
    use crate::messages::ChannelNotifier;
    use crate::store::MemoryStore;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc::{self, Receiver};

    /// Serves CSV text, or a fetch error when none is set
    struct CsvSource {
        text: Mutex<Option<String>>,
    }

    impl CsvSource {
        fn new(text: &str) -> Self {
            Self {
                text: Mutex::new(Some(text.to_string())),
            }
        }

        fn set(&self, text: Option<&str>) {
            *self.text.lock().unwrap() = text.map(str::to_string);
        }
    }

    impl RowSource for CsvSource {
        fn fetch_rows(&self, _settings: &Settings) -> Result<Vec<Row>> {
            match &*self.text.lock().unwrap() {
                Some(text) => Ok(parse_csv(text)),
                None => Err(SyncError::Fetch(
                    "CSV request failed: 404 Not Found".to_string(),
                )),
            }
        }
    }

    fn configured_store() -> MemoryStore {
        MemoryStore::with_settings(Settings::new().with_source(DataSource::Csv {
            url: "https://example.test/sheet.csv".to_string(),
        }))
    }

    const SHEET: &str = "VIN,Stock,Status\nJM3KK1WY0R1100001,STK-001,Sold\n1HGCM82633A004352,STK-002,Available";

    fn drain(rx: &Receiver<Notification>) -> Vec<Notification> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_successful_refresh_commits_and_broadcasts() {
        let (tx, rx) = mpsc::channel();
        let refresher = Refresher::new(configured_store(), CsvSource::new(SHEET), ChannelNotifier::new(tx));

        let outcome = refresher.refresh(Trigger::Manual).unwrap();
        let RefreshOutcome::Committed(report) = outcome else {
            panic!("expected commit, got {:?}", outcome);
        };
        assert_eq!(report.count, 2);
        assert_eq!((report.vins, report.stocks), (1, 1));

        let cache = refresher.store().load_cache().unwrap();
        assert!(cache.sets.contains_stock("STK-001"));
        assert_eq!(cache.last_sync, Some(report.last_sync));
        assert_eq!(
            drain(&rx),
            vec![Notification::CacheUpdated {
                last_sync: report.last_sync.timestamp_millis()
            }]
        );
        assert_eq!(
            refresher.last_transitions(),
            vec![
                RefreshState::Idle,
                RefreshState::Fetching,
                RefreshState::Validating,
                RefreshState::Committing,
                RefreshState::Idle,
            ]
        );
        assert_eq!(refresher.last_error(), None);
    }

    #[test]
    fn test_failed_refresh_leaves_cache_untouched() {
        let (tx, rx) = mpsc::channel();
        let source = CsvSource::new(SHEET);
        let refresher = Refresher::new(configured_store(), &source, ChannelNotifier::new(tx));
        refresher.refresh(Trigger::Manual).unwrap();
        let before = refresher.store().load_cache().unwrap();
        drain(&rx);

        source.set(None);
        let err = refresher.refresh(Trigger::Manual).unwrap_err();
        assert_eq!(err.to_string(), "CSV request failed: 404 Not Found");
        assert_eq!(refresher.last_error().as_deref(), Some("CSV request failed: 404 Not Found"));
        assert_eq!(
            refresher.last_transitions(),
            vec![
                RefreshState::Idle,
                RefreshState::Fetching,
                RefreshState::Failed,
                RefreshState::Idle,
            ]
        );

        // Header-only source: zero rows is a validation failure
        source.set(Some("VIN,Stock,Status"));
        assert!(matches!(
            refresher.refresh(Trigger::Scheduled),
            Err(SyncError::Validation(_))
        ));

        assert_eq!(refresher.store().load_cache().unwrap(), before);
        assert_eq!(refresher.store().cache_writes(), 1);
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_missing_column_fails_validation() {
        let refresher = Refresher::new(
            configured_store(),
            CsvSource::new("Stock,Comment\nSTK-001,sold"),
            crate::messages::NullNotifier,
        );
        let err = refresher.refresh(Trigger::Manual).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing column(s) Status, VIN in data source (found: Comment, Stock)."
        );
        assert_eq!(refresher.store().cache_writes(), 0);
    }

    #[test]
    fn test_configuration_errors() {
        let refresher = Refresher::new(
            MemoryStore::new(),
            CsvSource::new(SHEET),
            crate::messages::NullNotifier,
        );
        let err = refresher.refresh(Trigger::Manual).unwrap_err();
        assert_eq!(err.kind(), crate::types::ErrorKind::Configuration);
        assert_eq!(err.to_string(), "CSV URL is not configured.");

        let sheets = Settings::new().with_source(DataSource::Sheets {
            spreadsheet_id: "abc".to_string(),
            range: "Sheet1!A:C".to_string(),
            api_key: String::new(),
        });
        refresher.store().save_settings(&sheets).unwrap();
        let err = refresher.refresh(Trigger::SettingsChanged).unwrap_err();
        assert_eq!(err.to_string(), "Sheets API requires Spreadsheet ID, Range, and API Key.");

        let no_status = Settings::new()
            .with_source(DataSource::Csv {
                url: "https://example.test/sheet.csv".to_string(),
            })
            .with_columns(ColumnMapping {
                vin: None,
                stock: Some("Stock".to_string()),
                status: None,
            });
        refresher.store().save_settings(&no_status).unwrap();
        let err = refresher.refresh(Trigger::Manual).unwrap_err();
        assert_eq!(err.kind(), crate::types::ErrorKind::Configuration);
    }

    #[test]
    fn test_background_failure_is_recorded_not_returned() {
        let refresher = Refresher::new(
            MemoryStore::new(),
            CsvSource::new(SHEET),
            crate::messages::NullNotifier,
        );
        assert_eq!(refresher.refresh_in_background(Trigger::Scheduled), None);
        assert_eq!(refresher.last_error().as_deref(), Some("CSV URL is not configured."));
    }

    /// First fetch blocks until released; later fetches return immediately
    struct GatedSource {
        calls: AtomicUsize,
        gate: Mutex<Receiver<()>>,
        started: Mutex<mpsc::Sender<()>>,
    }

    impl RowSource for GatedSource {
        fn fetch_rows(&self, _settings: &Settings) -> Result<Vec<Row>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                let _ = self.started.lock().unwrap().send(());
                self.gate.lock().unwrap().recv().unwrap();
                return Ok(parse_csv("VIN,Stock,Status\n,OLD-001,Sold"));
            }
            Ok(parse_csv("VIN,Stock,Status\n,NEW-001,Sold"))
        }
    }

    #[test]
    fn test_stale_attempt_is_superseded() {
        let (release, gate) = mpsc::channel();
        let (started_tx, started) = mpsc::channel();
        let source = GatedSource {
            calls: AtomicUsize::new(0),
            gate: Mutex::new(gate),
            started: Mutex::new(started_tx),
        };
        let refresher = Refresher::new(configured_store(), source, crate::messages::NullNotifier);

        std::thread::scope(|scope| {
            let slow = scope.spawn(|| refresher.refresh(Trigger::Scheduled));
            started.recv().unwrap();

            let fast = refresher.refresh(Trigger::Manual).unwrap();
            assert!(matches!(fast, RefreshOutcome::Committed(ref r) if r.sequence == 2));

            release.send(()).unwrap();
            let slow = slow.join().unwrap().unwrap();
            assert_eq!(slow, RefreshOutcome::Superseded { sequence: 1, latest: 2 });
        });

        let cache = refresher.store().load_cache().unwrap();
        assert!(cache.sets.contains_stock("NEW-001"));
        assert!(!cache.sets.contains_stock("OLD-001"));
        assert_eq!(refresher.store().cache_writes(), 1);
    }

    #[test]
    fn test_handle_requests() {
        let refresher = Refresher::new(
            configured_store(),
            CsvSource::new(SHEET),
            crate::messages::NullNotifier,
        );
        assert_eq!(
            refresher.handle(Request::GetLastSync),
            Response::LastSync(LastSyncResponse { last_sync: 0 })
        );

        let Response::Refresh(resp) = refresher.handle(Request::RefreshNow) else {
            panic!("expected refresh response");
        };
        assert!(resp.success);
        assert_eq!(resp.count, Some(2));

        let Response::LastSync(last) = refresher.handle(Request::GetLastSync) else {
            panic!("expected last sync response");
        };
        assert_eq!(Some(last.last_sync), resp.last_sync);
    }
}
