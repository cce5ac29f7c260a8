//! Status patch helpers and event recording for `DirectUpdate` reconciliation.

use chrono::Utc;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Resource;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};

use crate::crd::{DirectUpdate, DirectUpdateStatus, UpgradePhase};

/// Set the phase on a status, stamping `completedAt`/`lastUpdated` as needed.
pub fn set_phase(status: &mut DirectUpdateStatus, phase: UpgradePhase) {
    if phase == UpgradePhase::Succeeded {
        status.completed_at = Some(Utc::now());
    }
    status.last_updated = Utc::now();
    status.phase = phase;
}

/// Set the phase to `Failed` with a message.
pub fn set_failed(status: &mut DirectUpdateStatus, message: impl Into<String>) {
    status.phase = UpgradePhase::Failed;
    status.completed_at = Some(Utc::now());
    status.last_updated = Utc::now();
    status.message = message.into();
}

/// Set the phase to `RequiresAttention` with a message, e.g. when a
/// control-plane backup fails (spec.md §4.6): the operation stalls rather
/// than rolling back.
pub fn set_requires_attention(status: &mut DirectUpdateStatus, message: impl Into<String>) {
    status.phase = UpgradePhase::RequiresAttention;
    status.last_updated = Utc::now();
    status.message = message.into();
}

/// Event recorder bundled with its target `ObjectReference`.
pub struct EventRecorder {
    recorder: Recorder,
    obj_ref: ObjectReference,
}

impl EventRecorder {
    /// Create an event recorder for the given `DirectUpdate` resource.
    pub fn new(client: kube::Client, obj: &DirectUpdate) -> Self {
        let reporter = Reporter {
            controller: "cupcake-operator".into(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
            obj_ref: obj.object_ref(&()),
        }
    }

    /// Publish a Normal event.
    pub async fn publish(&self, reason: &str, message: &str) {
        self.recorder
            .publish(
                &Event {
                    type_: EventType::Normal,
                    reason: reason.into(),
                    note: Some(message.into()),
                    action: reason.into(),
                    secondary: None,
                },
                &self.obj_ref,
            )
            .await
            .unwrap_or_else(|e| tracing::warn!("failed to publish event: {e}"));
    }

    /// Publish a Warning event.
    pub async fn publish_warning(&self, reason: &str, message: &str) {
        self.recorder
            .publish(
                &Event {
                    type_: EventType::Warning,
                    reason: reason.into(),
                    note: Some(message.into()),
                    action: reason.into(),
                    secondary: None,
                },
                &self.obj_ref,
            )
            .await
            .unwrap_or_else(|e| tracing::warn!("failed to publish warning event: {e}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn status() -> DirectUpdateStatus {
        DirectUpdateStatus {
            phase: UpgradePhase::Pending,
            operation_id: "op-1".to_string(),
            started_at: Utc::now(),
            last_updated: Utc::now(),
            completed_at: None,
            message: String::new(),
            upgrade_path: None,
            preflight_results: None,
            backup_info: None,
            nodes: BTreeMap::new(),
            summary: Default::default(),
            node_absence_counters: BTreeMap::new(),
        }
    }

    #[test]
    fn test_set_phase_succeeded_stamps_completed_at() {
        let mut s = status();
        set_phase(&mut s, UpgradePhase::Succeeded);
        assert_eq!(s.phase, UpgradePhase::Succeeded);
        assert!(s.completed_at.is_some());
    }

    #[test]
    fn test_set_phase_in_progress_leaves_completed_at_unset() {
        let mut s = status();
        set_phase(&mut s, UpgradePhase::InProgress);
        assert_eq!(s.phase, UpgradePhase::InProgress);
        assert!(s.completed_at.is_none());
    }

    #[test]
    fn test_set_failed_sets_message_and_timestamps() {
        let mut s = status();
        set_failed(&mut s, "boom");
        assert_eq!(s.phase, UpgradePhase::Failed);
        assert_eq!(s.message, "boom");
        assert!(s.completed_at.is_some());
    }

    #[test]
    fn test_set_requires_attention_does_not_complete() {
        let mut s = status();
        set_requires_attention(&mut s, "backup failed");
        assert_eq!(s.phase, UpgradePhase::RequiresAttention);
        assert_eq!(s.message, "backup failed");
        assert!(s.completed_at.is_none());
    }
}
