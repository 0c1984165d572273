//! Per-upload progress tracking and subscriber fan-out (spec §4.11).
//!
//! A process-wide cache maps `uploadId -> latest ProgressEvent`, alongside a
//! `uploadId -> subscribers` map of push callbacks. The HTTP layer that
//! frames these as server-sent events lives outside this crate; here we only
//! keep the cache, the subscriber registry, and the plain [`ProgressSink`]
//! seam a transport adapts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stage vocabulary a progress event can report, in roughly the order a
/// single upload passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    UploadCompleted,
    ParsingStarted,
    ParsingInProgress,
    ParsingCompleted,
    ValidationStarted,
    ValidationInProgress,
    ValidationCompleted,
    DbSavingStarted,
    DbSavingInProgress,
    DbSavingCompleted,
    LdapSavingStarted,
    LdapSavingInProgress,
    LdapSavingCompleted,
    Completed,
    Failed,
}

impl Stage {
    /// Human-readable label, separate from the wire-stable enum tag.
    pub fn display_name(self) -> &'static str {
        match self {
            Stage::UploadCompleted => "Upload completed",
            Stage::ParsingStarted => "Parsing started",
            Stage::ParsingInProgress => "Parsing in progress",
            Stage::ParsingCompleted => "Parsing completed",
            Stage::ValidationStarted => "Validation started",
            Stage::ValidationInProgress => "Validation in progress",
            Stage::ValidationCompleted => "Validation completed",
            Stage::DbSavingStarted => "Saving to database",
            Stage::DbSavingInProgress => "Saving to database",
            Stage::DbSavingCompleted => "Database save completed",
            Stage::LdapSavingStarted => "Saving to LDAP directory",
            Stage::LdapSavingInProgress => "Saving to LDAP directory",
            Stage::LdapSavingCompleted => "LDAP save completed",
            Stage::Completed => "Completed",
            Stage::Failed => "Failed",
        }
    }

    /// Whether this stage is one of the two terminal states.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }
}

/// A single progress update for one upload. Serializes to the JSON body the
/// SSE/poll surface carries: `{ uploadId, stage, stageName, percentage,
/// processedCount, totalCount, message, errorMessage, details, updatedAt }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub upload_id: Uuid,
    pub stage: Stage,
    pub stage_name: String,
    pub percentage: u8,
    pub processed_count: u64,
    pub total_count: u64,
    pub message: Option<String>,
    pub error_message: Option<String>,
    pub details: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(upload_id: Uuid, stage: Stage, percentage: u8, now: DateTime<Utc>) -> Self {
        Self {
            upload_id,
            stage,
            stage_name: stage.display_name().to_string(),
            percentage,
            processed_count: 0,
            total_count: 0,
            message: None,
            error_message: None,
            details: None,
            updated_at: now,
        }
    }

    pub fn with_counts(mut self, processed: u64, total: u64) -> Self {
        self.processed_count = processed;
        self.total_count = total;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn failed(upload_id: Uuid, error_message: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut event = Self::new(upload_id, Stage::Failed, 100, now);
        event.error_message = Some(error_message.into());
        event
    }

    /// Render as an `event: progress\ndata: {...}\n\n` SSE frame.
    pub fn to_sse_frame(&self) -> String {
        let data = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("event: progress\ndata: {data}\n\n")
    }
}

/// Push seam a transport (HTTP/SSE, a test harness, a CLI printer)
/// implements to receive progress updates as they're sent. Kept as a plain
/// callback trait, not an async trait, since a subscriber must never block
/// the sender -- it is expected to forward to a bounded channel and return
/// immediately.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

struct SubscriberEntry {
    id: u64,
    sink: Arc<dyn ProgressSink>,
}

/// The process-wide cache + subscriber registry described by spec §4.11.
/// Cheap to clone: the guarded state lives behind an `Arc`.
#[derive(Clone)]
pub struct ProgressManager {
    inner: Arc<Mutex<ProgressManagerState>>,
}

#[derive(Default)]
struct ProgressManagerState {
    latest: HashMap<Uuid, ProgressEvent>,
    subscribers: HashMap<Uuid, Vec<SubscriberEntry>>,
    next_subscriber_id: u64,
}

/// Handle returned by [`ProgressManager::register_subscriber`]; drop or pass
/// to [`ProgressManager::unregister_subscriber`] to stop receiving events.
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionHandle {
    pub upload_id: Uuid,
    id: u64,
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ProgressManagerState::default())),
        }
    }

    /// Update the cache and forward to every live subscriber for this
    /// upload. A subscriber is dropped from the registry if it panics
    /// (spec: "silently removing subscribers whose callback throws").
    pub fn send_progress(&self, event: ProgressEvent) {
        let upload_id = event.upload_id;
        let mut state = self.inner.lock().expect("progress mutex poisoned");
        state.latest.insert(upload_id, event.clone());

        if let Some(subs) = state.subscribers.get_mut(&upload_id) {
            subs.retain(|entry| {
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| entry.sink.on_progress(&event))).is_ok()
            });
        }
    }

    /// Attach a subscriber and immediately replay the cached latest state,
    /// if any exists for this upload.
    pub fn register_subscriber(&self, upload_id: Uuid, sink: Arc<dyn ProgressSink>) -> SubscriptionHandle {
        let mut state = self.inner.lock().expect("progress mutex poisoned");
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;

        if let Some(cached) = state.latest.get(&upload_id).cloned() {
            sink.on_progress(&cached);
        }

        state.subscribers.entry(upload_id).or_default().push(SubscriberEntry { id, sink });
        SubscriptionHandle { upload_id, id }
    }

    pub fn unregister_subscriber(&self, handle: SubscriptionHandle) {
        let mut state = self.inner.lock().expect("progress mutex poisoned");
        if let Some(subs) = state.subscribers.get_mut(&handle.upload_id) {
            subs.retain(|entry| entry.id != handle.id);
        }
    }

    /// Snapshot for pull-based polling (`GET /api/progress/status/{id}`).
    pub fn get_progress(&self, upload_id: Uuid) -> Option<ProgressEvent> {
        let state = self.inner.lock().expect("progress mutex poisoned");
        state.latest.get(&upload_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        count: Arc<AtomicUsize>,
    }

    impl ProgressSink for CountingSink {
        fn on_progress(&self, _event: &ProgressEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn get_progress_returns_none_before_any_send() {
        let manager = ProgressManager::new();
        assert!(manager.get_progress(Uuid::new_v4()).is_none());
    }

    #[test]
    fn send_progress_updates_cache() {
        let manager = ProgressManager::new();
        let upload_id = Uuid::new_v4();
        manager.send_progress(ProgressEvent::new(upload_id, Stage::ParsingStarted, 10, now()));
        manager.send_progress(ProgressEvent::new(upload_id, Stage::Completed, 100, now()));

        let snapshot = manager.get_progress(upload_id).unwrap();
        assert_eq!(snapshot.stage, Stage::Completed);
        assert_eq!(snapshot.percentage, 100);
    }

    #[test]
    fn register_subscriber_replays_cached_latest() {
        let manager = ProgressManager::new();
        let upload_id = Uuid::new_v4();
        manager.send_progress(ProgressEvent::new(upload_id, Stage::ValidationStarted, 40, now()));

        let count = Arc::new(AtomicUsize::new(0));
        manager.register_subscriber(upload_id, Arc::new(CountingSink { count: count.clone() }));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscriber_receives_subsequent_sends() {
        let manager = ProgressManager::new();
        let upload_id = Uuid::new_v4();
        let count = Arc::new(AtomicUsize::new(0));
        manager.register_subscriber(upload_id, Arc::new(CountingSink { count: count.clone() }));

        manager.send_progress(ProgressEvent::new(upload_id, Stage::ParsingStarted, 5, now()));
        manager.send_progress(ProgressEvent::new(upload_id, Stage::ParsingCompleted, 20, now()));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unregister_stops_delivery() {
        let manager = ProgressManager::new();
        let upload_id = Uuid::new_v4();
        let count = Arc::new(AtomicUsize::new(0));
        let handle = manager.register_subscriber(upload_id, Arc::new(CountingSink { count: count.clone() }));
        manager.unregister_subscriber(handle);

        manager.send_progress(ProgressEvent::new(upload_id, Stage::Completed, 100, now()));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn sse_frame_has_event_and_data_lines() {
        let event = ProgressEvent::new(Uuid::new_v4(), Stage::Completed, 100, now());
        let frame = event.to_sse_frame();
        assert!(frame.starts_with("event: progress\ndata: "));
        assert!(frame.ends_with("\n\n"));
    }
}
