//! Notifiers used by the CLI

use inventory_sync_core::{format_last_sync, Notification, Notifier};

/// Logs broadcasts; used by one-shot commands that have no listeners
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::CacheUpdated { last_sync } => {
                log::info!("Cache updated ({})", format_last_sync(last_sync))
            }
            Notification::SettingsUpdated => log::info!("Settings updated"),
            Notification::HideSoldToggled { value } => log::info!("Hide sold toggled: {}", value),
        }
    }
}
