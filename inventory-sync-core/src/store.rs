//! Persistent store seam
//!
//! Three records live in the store: the settings, the committed cache and a
//! standalone hide-sold flag. When the flag has never been written the
//! settings' own `hide_sold` value applies.

use crate::cache::Cache;
use crate::config::Settings;
use crate::messages::{Notification, Notifier};
use crate::types::{Result, SyncError};
use std::sync::{Mutex, MutexGuard};

pub trait Store {
    fn load_settings(&self) -> Result<Settings>;
    fn save_settings(&self, settings: &Settings) -> Result<()>;

    fn load_cache(&self) -> Result<Cache>;
    fn save_cache(&self, cache: &Cache) -> Result<()>;

    /// The standalone flag, `None` if never written
    fn load_hide_flag(&self) -> Result<Option<bool>>;
    fn save_hide_flag(&self, hide: bool) -> Result<()>;

    /// Effective hide-sold value
    fn hide_sold(&self) -> Result<bool> {
        match self.load_hide_flag()? {
            Some(hide) => Ok(hide),
            None => Ok(self.load_settings()?.hide_sold),
        }
    }
}

impl<S: Store + ?Sized> Store for &S {
    fn load_settings(&self) -> Result<Settings> {
        (**self).load_settings()
    }
    fn save_settings(&self, settings: &Settings) -> Result<()> {
        (**self).save_settings(settings)
    }
    fn load_cache(&self) -> Result<Cache> {
        (**self).load_cache()
    }
    fn save_cache(&self, cache: &Cache) -> Result<()> {
        (**self).save_cache(cache)
    }
    fn load_hide_flag(&self) -> Result<Option<bool>> {
        (**self).load_hide_flag()
    }
    fn save_hide_flag(&self, hide: bool) -> Result<()> {
        (**self).save_hide_flag(hide)
    }
}

/// Save settings from a configuration surface
///
/// The settings' hide value is written through to the standalone flag, then
/// listeners are told to reload.
pub fn apply_settings<S, N>(store: &S, notifier: &N, settings: &Settings) -> Result<()>
where
    S: Store + ?Sized,
    N: Notifier + ?Sized,
{
    store.save_settings(settings)?;
    store.save_hide_flag(settings.hide_sold)?;
    log::info!("Settings saved");
    notifier.notify(Notification::SettingsUpdated);
    Ok(())
}

/// Flip the hide flag from a quick toggle
pub fn set_hide_sold<S, N>(store: &S, notifier: &N, hide: bool) -> Result<()>
where
    S: Store + ?Sized,
    N: Notifier + ?Sized,
{
    store.save_hide_flag(hide)?;
    log::info!("Hide sold set to {}", hide);
    notifier.notify(Notification::HideSoldToggled { value: hide });
    Ok(())
}

#[derive(Debug, Default)]
struct MemoryState {
    settings: Settings,
    cache: Cache,
    hide: Option<bool>,
    cache_writes: usize,
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Settings) -> Self {
        let store = Self::default();
        if let Ok(mut state) = store.state.lock() {
            state.settings = settings;
        }
        store
    }

    /// Number of successful cache commits
    pub fn cache_writes(&self) -> usize {
        self.lock().map(|s| s.cache_writes).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| SyncError::Store("memory store lock poisoned".to_string()))
    }
}

impl Store for MemoryStore {
    fn load_settings(&self) -> Result<Settings> {
        Ok(self.lock()?.settings.clone())
    }

    fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.lock()?.settings = settings.clone();
        Ok(())
    }

    fn load_cache(&self) -> Result<Cache> {
        Ok(self.lock()?.cache.clone())
    }

    fn save_cache(&self, cache: &Cache) -> Result<()> {
        let mut state = self.lock()?;
        state.cache = cache.clone();
        state.cache_writes += 1;
        Ok(())
    }

    fn load_hide_flag(&self) -> Result<Option<bool>> {
        Ok(self.lock()?.hide)
    }

    fn save_hide_flag(&self, hide: bool) -> Result<()> {
        self.lock()?.hide = Some(hide);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::IdentifierSets;
    use crate::messages::ChannelNotifier;
    use std::sync::mpsc;

    #[test]
    fn test_hide_flag_falls_back_to_settings() {
        let store = MemoryStore::with_settings(Settings::new().with_hide_sold(true));
        assert_eq!(store.load_hide_flag().unwrap(), None);
        assert!(store.hide_sold().unwrap());

        store.save_hide_flag(false).unwrap();
        assert!(!store.hide_sold().unwrap());
    }

    #[test]
    fn test_cache_roundtrip_preserves_membership() {
        let store = MemoryStore::new();
        let mut sets = IdentifierSets::new();
        sets.insert_stock("STK-001".to_string());
        sets.insert_vin("JM3KK1WY0R1100001".to_string());
        let cache = Cache::new(sets, chrono::Utc::now());

        store.save_cache(&cache).unwrap();
        assert_eq!(store.load_cache().unwrap(), cache);
        assert_eq!(store.cache_writes(), 1);
    }

    #[test]
    fn test_apply_settings_writes_flag_and_notifies() {
        let store = MemoryStore::new();
        let (tx, rx) = mpsc::channel();
        let notifier = ChannelNotifier::new(tx);

        let settings = Settings::new().with_badge_text("Vendu").with_hide_sold(true);
        apply_settings(&store, &notifier, &settings).unwrap();
        assert_eq!(store.load_settings().unwrap().badge_text, "Vendu");
        assert_eq!(store.load_hide_flag().unwrap(), Some(true));
        assert_eq!(rx.try_recv().unwrap(), Notification::SettingsUpdated);

        set_hide_sold(&store, &notifier, false).unwrap();
        assert!(!store.hide_sold().unwrap());
        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::HideSoldToggled { value: false }
        );
    }
}
