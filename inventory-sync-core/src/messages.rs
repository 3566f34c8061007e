//! Cross-context messages
//!
//! Requests go to the refresh orchestrator and get exactly one response.
//! Notifications are broadcast fire-and-forget to every listening context.
//! The JSON shapes are fixed; field names are camelCase on the wire.

use serde::{Deserialize, Serialize};
use std::sync::mpsc::Sender;

/// Requests answered by the refresh orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    #[serde(rename = "ih_refresh_now")]
    RefreshNow,
    #[serde(rename = "ih_get_last_sync")]
    GetLastSync,
}

/// Reply to [`Request::RefreshNow`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RefreshResponse {
    pub fn ok(last_sync: i64, count: usize) -> Self {
        Self {
            success: true,
            last_sync: Some(last_sync),
            count: Some(count),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            last_sync: None,
            count: None,
            error: Some(error.into()),
        }
    }
}

/// Reply to [`Request::GetLastSync`]; 0 means never synced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSyncResponse {
    pub last_sync: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Refresh(RefreshResponse),
    LastSync(LastSyncResponse),
}

/// Broadcast notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    #[serde(rename = "ih_cache_updated", rename_all = "camelCase")]
    CacheUpdated { last_sync: i64 },
    #[serde(rename = "ih_settings_updated")]
    SettingsUpdated,
    #[serde(rename = "ih_hide_sold_toggled")]
    HideSoldToggled { value: bool },
}

/// Broadcast side of the message bus
///
/// Delivery is best effort: a listener that has gone away is not an error.
pub trait Notifier {
    fn notify(&self, notification: Notification);
}

/// Drops every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _notification: Notification) {}
}

/// Forwards notifications into an mpsc channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new(sender: Sender<Notification>) -> Self {
        Self { sender }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if self.sender.send(notification).is_err() {
            log::trace!("No listener for {:?}", notification);
        }
    }
}

impl<N: Notifier + ?Sized> Notifier for &N {
    fn notify(&self, notification: Notification) {
        (**self).notify(notification)
    }
}
