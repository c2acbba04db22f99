//! Test doubles shared by the scheduler and recovery tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use statuswatch_sink::{
    LabelSink, NotificationLocation, NotificationSink, Resolver, SinkError,
};
use statuswatch_status::{StatusError, StatusSnapshot, StatusSource};

pub fn online(players: u32) -> StatusSnapshot {
    StatusSnapshot {
        online: true,
        player_count: players,
        motd: "Ein Blockspiel".to_string(),
    }
}

pub fn offline() -> StatusSnapshot {
    StatusSnapshot {
        online: false,
        player_count: 0,
        motd: String::new(),
    }
}

// ── Status source ─────────────────────────────────────────────

/// Scripted status source: responses are consumed in order, and the last
/// one repeats once the script runs dry.
pub struct MockStatusSource {
    script: Mutex<VecDeque<Result<StatusSnapshot, String>>>,
    last: Mutex<Option<Result<StatusSnapshot, String>>>,
}

impl MockStatusSource {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
        }
    }

    pub fn push_ok(&self, snapshot: StatusSnapshot) {
        self.script.lock().unwrap().push_back(Ok(snapshot));
    }

    pub fn push_err(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }
}

#[async_trait::async_trait]
impl StatusSource for MockStatusSource {
    async fn fetch(&self, _target_address: &str) -> Result<StatusSnapshot, StatusError> {
        let next = self.script.lock().unwrap().pop_front();
        let result = match next {
            Some(result) => {
                *self.last.lock().unwrap() = Some(result.clone());
                result
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Err("mock script empty".to_string())),
        };
        result.map_err(StatusError::Unreachable)
    }
}

// ── Notification sink ─────────────────────────────────────────

/// In-memory notification sink. Unknown locations behave as existing empty
/// messages; `mark_missing` simulates external deletion.
pub struct MockNotificationSink {
    texts: Mutex<HashMap<NotificationLocation, String>>,
    missing: Mutex<HashSet<NotificationLocation>>,
    update_log: Mutex<Vec<String>>,
    deletes: AtomicUsize,
}

impl MockNotificationSink {
    pub fn new() -> Self {
        Self {
            texts: Mutex::new(HashMap::new()),
            missing: Mutex::new(HashSet::new()),
            update_log: Mutex::new(Vec::new()),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn set_text(&self, channel_id: &str, message_id: &str, text: &str) {
        self.texts
            .lock()
            .unwrap()
            .insert(NotificationLocation::new(channel_id, message_id), text.to_string());
    }

    pub fn mark_missing(&self, channel_id: &str, message_id: &str) {
        self.missing
            .lock()
            .unwrap()
            .insert(NotificationLocation::new(channel_id, message_id));
    }

    pub fn updates(&self) -> Vec<String> {
        self.update_log.lock().unwrap().clone()
    }

    pub fn update_count(&self) -> usize {
        self.update_log.lock().unwrap().len()
    }

    pub fn last_update(&self) -> Option<String> {
        self.update_log.lock().unwrap().last().cloned()
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn gone(&self, location: &NotificationLocation) -> bool {
        self.missing.lock().unwrap().contains(location)
    }
}

#[async_trait::async_trait]
impl NotificationSink for MockNotificationSink {
    async fn update(&self, location: &NotificationLocation, text: &str) -> Result<(), SinkError> {
        if self.gone(location) {
            return Err(SinkError::NotFound);
        }
        self.texts
            .lock()
            .unwrap()
            .insert(location.clone(), text.to_string());
        self.update_log.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn delete(&self, location: &NotificationLocation) -> Result<(), SinkError> {
        if self.gone(location) {
            return Err(SinkError::NotFound);
        }
        self.texts.lock().unwrap().remove(location);
        self.missing.lock().unwrap().insert(location.clone());
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn current_text(&self, location: &NotificationLocation) -> Result<String, SinkError> {
        if self.gone(location) {
            return Err(SinkError::NotFound);
        }
        Ok(self
            .texts
            .lock()
            .unwrap()
            .get(location)
            .cloned()
            .unwrap_or_default())
    }
}

// ── Label sink ────────────────────────────────────────────────

/// In-memory label sink. Unknown channels behave as existing with an empty
/// label; `mark_missing` simulates channel deletion.
pub struct MockLabelSink {
    labels: Mutex<HashMap<String, String>>,
    missing: Mutex<HashSet<String>>,
    rename_log: Mutex<Vec<String>>,
}

impl MockLabelSink {
    pub fn new() -> Self {
        Self {
            labels: Mutex::new(HashMap::new()),
            missing: Mutex::new(HashSet::new()),
            rename_log: Mutex::new(Vec::new()),
        }
    }

    pub fn set_label(&self, channel_id: &str, label: &str) {
        self.labels
            .lock()
            .unwrap()
            .insert(channel_id.to_string(), label.to_string());
    }

    pub fn mark_missing(&self, channel_id: &str) {
        self.missing.lock().unwrap().insert(channel_id.to_string());
    }

    pub fn renames(&self) -> Vec<String> {
        self.rename_log.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LabelSink for MockLabelSink {
    async fn rename(&self, channel_id: &str, label: &str) -> Result<(), SinkError> {
        if self.missing.lock().unwrap().contains(channel_id) {
            return Err(SinkError::NotFound);
        }
        self.labels
            .lock()
            .unwrap()
            .insert(channel_id.to_string(), label.to_string());
        self.rename_log.lock().unwrap().push(label.to_string());
        Ok(())
    }

    async fn current_label(&self, channel_id: &str) -> Result<String, SinkError> {
        if self.missing.lock().unwrap().contains(channel_id) {
            return Err(SinkError::NotFound);
        }
        Ok(self
            .labels
            .lock()
            .unwrap()
            .get(channel_id)
            .cloned()
            .unwrap_or_default())
    }
}

// ── Resolver ──────────────────────────────────────────────────

/// Scripted resolver for recovery tests.
pub struct MockResolver {
    missing_notifications: Mutex<HashSet<NotificationLocation>>,
    missing_channels: Mutex<HashSet<String>>,
    /// Channel ids whose resolution fails with a transport error.
    unreachable_channels: Mutex<HashSet<String>>,
    /// channel id → message id of a still-visible tracking announcement.
    announcements: Mutex<HashMap<String, String>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self {
            missing_notifications: Mutex::new(HashSet::new()),
            missing_channels: Mutex::new(HashSet::new()),
            unreachable_channels: Mutex::new(HashSet::new()),
            announcements: Mutex::new(HashMap::new()),
        }
    }

    pub fn mark_notification_missing(&self, channel_id: &str, message_id: &str) {
        self.missing_notifications
            .lock()
            .unwrap()
            .insert(NotificationLocation::new(channel_id, message_id));
    }

    pub fn mark_channel_missing(&self, channel_id: &str) {
        self.missing_channels
            .lock()
            .unwrap()
            .insert(channel_id.to_string());
    }

    pub fn mark_channel_unreachable(&self, channel_id: &str) {
        self.unreachable_channels
            .lock()
            .unwrap()
            .insert(channel_id.to_string());
    }

    pub fn set_announcement(&self, channel_id: &str, message_id: &str) {
        self.announcements
            .lock()
            .unwrap()
            .insert(channel_id.to_string(), message_id.to_string());
    }
}

#[async_trait::async_trait]
impl Resolver for MockResolver {
    async fn resolve_notification(
        &self,
        location: &NotificationLocation,
    ) -> Result<bool, SinkError> {
        if self
            .unreachable_channels
            .lock()
            .unwrap()
            .contains(&location.channel_id)
        {
            return Err(SinkError::Api("mock transport error".to_string()));
        }
        Ok(!self
            .missing_notifications
            .lock()
            .unwrap()
            .contains(location))
    }

    async fn resolve_label_target(&self, channel_id: &str) -> Result<bool, SinkError> {
        if self.unreachable_channels.lock().unwrap().contains(channel_id) {
            return Err(SinkError::Api("mock transport error".to_string()));
        }
        Ok(!self.missing_channels.lock().unwrap().contains(channel_id))
    }

    async fn find_recent_message(
        &self,
        channel_id: &str,
        _content: &str,
    ) -> Result<Option<String>, SinkError> {
        Ok(self.announcements.lock().unwrap().get(channel_id).cloned())
    }
}
