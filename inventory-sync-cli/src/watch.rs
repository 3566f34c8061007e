//! Long-running watch mode
//!
//! Two threads connected by an mpsc channel of [`Notification`]s:
//! - background: runs scheduled refreshes, and turns store changes made by
//!   other processes (settings edits, `hide-sold`, a manual `refresh`) into
//!   notifications
//! - page: owns the [`PageContext`] and the page file, reacts to
//!   notifications, and re-annotates after the page file changes on disk
//!   (debounced)

use crate::page::PageFile;
use crate::store::FileStore;
use anyhow::Result;
use inventory_sync_core::{
    ChannelNotifier, Notification, PageContext, RefreshOutcome, RefreshSchedule, Refresher,
    RowSource, Settings, Store, Trigger,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

pub struct WatchOptions {
    pub page: Option<PathBuf>,
    pub out: Option<PathBuf>,
    /// Stop after this long (runs until killed when `None`)
    pub run_for: Option<Duration>,
    /// Polling period for store and page changes
    pub tick: Duration,
}

/// Diffs the store against what was last seen
#[derive(Debug, Clone)]
pub struct StoreWatcher {
    settings: Settings,
    hide: bool,
    last_sync: i64,
}

impl StoreWatcher {
    pub fn new<S: Store>(store: &S) -> inventory_sync_core::Result<Self> {
        Ok(Self {
            settings: store.load_settings()?,
            hide: store.hide_sold()?,
            last_sync: store.load_cache()?.last_sync_millis(),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// A commit made in this process, already broadcast
    pub fn note_commit(&mut self, last_sync: i64) {
        self.last_sync = last_sync;
    }

    /// Notifications for everything that changed since the last poll
    pub fn poll<S: Store>(&mut self, store: &S) -> inventory_sync_core::Result<Vec<Notification>> {
        let mut changes = Vec::new();

        let settings = store.load_settings()?;
        if settings != self.settings {
            self.settings = settings;
            changes.push(Notification::SettingsUpdated);
        }

        let hide = store.hide_sold()?;
        if hide != self.hide {
            self.hide = hide;
            changes.push(Notification::HideSoldToggled { value: hide });
        }

        let last_sync = store.load_cache()?.last_sync_millis();
        if last_sync != self.last_sync {
            self.last_sync = last_sync;
            changes.push(Notification::CacheUpdated { last_sync });
        }

        Ok(changes)
    }
}

/// Run watch mode until `run_for` elapses
pub fn run<F>(store: &FileStore, source: F, options: &WatchOptions) -> Result<()>
where
    F: RowSource + Send,
{
    let (tx, rx) = mpsc::channel();
    let stop = AtomicBool::new(false);
    let deadline = options.run_for.map(|d| Instant::now() + d);

    thread::scope(|scope| {
        let stop = &stop;
        let background = scope.spawn(move || background_loop(store, source, tx, stop, options.tick));

        let result = page_loop(store, rx, options, deadline);
        stop.store(true, Ordering::SeqCst);

        match background.join() {
            Ok(Ok(())) => result,
            Ok(Err(e)) => Err(e),
            Err(_) => Err(anyhow::anyhow!("background thread panicked")),
        }
    })
}

fn background_loop<F: RowSource>(
    store: &FileStore,
    source: F,
    tx: Sender<Notification>,
    stop: &AtomicBool,
    tick: Duration,
) -> Result<()> {
    let refresher = Refresher::new(store, source, ChannelNotifier::new(tx.clone()));
    let mut watcher = StoreWatcher::new(store)?;
    let mut schedule = RefreshSchedule::new(watcher.settings().refresh_interval(), Instant::now());
    log::info!(
        "Background refresh every {}s",
        schedule.interval().as_secs()
    );

    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();

        let mut trigger = None;
        match watcher.poll(store) {
            Ok(changes) => {
                for change in changes {
                    if change == Notification::SettingsUpdated {
                        schedule.reset(watcher.settings().refresh_interval(), now);
                        trigger = Some(Trigger::SettingsChanged);
                    }
                    // The page thread may already be gone on shutdown
                    let _ = tx.send(change);
                }
            }
            Err(e) => log::error!("Failed to read store: {}", e),
        }

        if trigger.is_none() && schedule.fire(now) {
            trigger = Some(Trigger::Scheduled);
        }
        if let Some(trigger) = trigger {
            if let Some(RefreshOutcome::Committed(report)) = refresher.refresh_in_background(trigger) {
                watcher.note_commit(report.last_sync.timestamp_millis());
            }
        }

        thread::sleep(tick.min(schedule.time_until(Instant::now())).max(Duration::from_millis(10)));
    }
    Ok(())
}

fn page_loop(
    store: &FileStore,
    rx: Receiver<Notification>,
    options: &WatchOptions,
    deadline: Option<Instant>,
) -> Result<()> {
    let mut ctx = PageContext::new(store.load_settings()?, store.load_cache()?, store.hide_sold()?)?;
    let mut page = match &options.page {
        Some(input) => {
            let mut page = PageFile::open(input, options.out.as_deref())?;
            page.apply(&mut ctx, |ctx, doc| ctx.on_load(doc))?;
            Some(page)
        }
        None => None,
    };

    loop {
        let now = Instant::now();
        if deadline.is_some_and(|d| now >= d) {
            break;
        }

        let mut wait = options.tick;
        if let Some(due) = ctx.next_deadline() {
            wait = wait.min(due.saturating_duration_since(now));
        }
        if let Some(d) = deadline {
            wait = wait.min(d.saturating_duration_since(now));
        }

        match rx.recv_timeout(wait) {
            Ok(notification) => {
                log::debug!("Received {:?}", notification);
                if let Some(page) = page.as_mut() {
                    if let Err(e) = handle_notification(store, &mut ctx, page, notification) {
                        log::error!("{:#}", e);
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if let Some(page) = page.as_mut() {
            let now = Instant::now();
            match page.reload_if_changed() {
                Ok(true) => ctx.on_mutation(now),
                Ok(false) => {}
                Err(e) => log::error!("{:#}", e),
            }
            page.apply(&mut ctx, |ctx, doc| ctx.poll(doc, now).unwrap_or_default())?;
        }
    }
    Ok(())
}

fn handle_notification(
    store: &FileStore,
    ctx: &mut PageContext,
    page: &mut PageFile,
    notification: Notification,
) -> Result<()> {
    match notification {
        Notification::CacheUpdated { .. } => {
            let cache = store.load_cache()?;
            page.apply(ctx, |ctx, doc| ctx.on_cache_replaced(doc, cache))?;
        }
        Notification::SettingsUpdated => {
            let settings = store.load_settings()?;
            let hide = store.hide_sold()?;
            let mut result = Ok(());
            page.apply(ctx, |ctx, doc| match ctx.on_settings_replaced(doc, settings, hide) {
                Ok(summary) => summary,
                Err(e) => {
                    result = Err(e);
                    Default::default()
                }
            })?;
            result?;
        }
        Notification::HideSoldToggled { value } => {
            page.apply(ctx, |ctx, doc| ctx.on_hide_toggled(doc, value))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_sync_core::{set_hide_sold, MemoryStore, NullNotifier};

    #[test]
    fn test_store_watcher_reports_each_change_once() {
        let store = MemoryStore::new();
        let mut watcher = StoreWatcher::new(&store).unwrap();
        assert!(watcher.poll(&store).unwrap().is_empty());

        set_hide_sold(&store, &NullNotifier, true).unwrap();
        store
            .save_settings(&Settings::new().with_badge_text("Vendu"))
            .unwrap();
        assert_eq!(
            watcher.poll(&store).unwrap(),
            vec![
                Notification::SettingsUpdated,
                Notification::HideSoldToggled { value: true },
            ]
        );
        assert!(watcher.poll(&store).unwrap().is_empty());
    }

    #[test]
    fn test_own_commits_are_not_reported_twice() {
        let store = MemoryStore::new();
        let mut watcher = StoreWatcher::new(&store).unwrap();

        let cache = inventory_sync_core::Cache::new(Default::default(), chrono::Utc::now());
        store.save_cache(&cache).unwrap();
        watcher.note_commit(cache.last_sync_millis());
        assert!(watcher.poll(&store).unwrap().is_empty());

        let later = inventory_sync_core::Cache::new(
            Default::default(),
            chrono::DateTime::from_timestamp_millis(cache.last_sync_millis() + 1000).unwrap(),
        );
        store.save_cache(&later).unwrap();
        assert_eq!(
            watcher.poll(&store).unwrap(),
            vec![Notification::CacheUpdated {
                last_sync: later.last_sync_millis()
            }]
        );
    }
}
