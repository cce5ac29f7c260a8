//! `ScheduledUpdate`: a one-shot future upgrade that fires a `DirectUpdate`.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::direct_update::DirectUpdateSpec;

/// `ScheduledUpdate` spec.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "cupcake.ricardomolendijk.com",
    version = "v1",
    kind = "ScheduledUpdate",
    status = "ScheduledUpdateStatus",
    printcolumn = r#"{"name":"PHASE","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"SCHEDULED-FOR","type":"string","jsonPath":".spec.scheduleAt"}"#,
    printcolumn = r#"{"name":"AGE","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledUpdateSpec {
    /// UTC instant at which the `DirectUpdate` should be created.
    pub schedule_at: DateTime<Utc>,

    /// Spec to stamp onto the `DirectUpdate` this schedule creates. The
    /// distilled spec is silent on this; resolved here because a real
    /// `ScheduledUpdate` must carry the upgrade intent somewhere.
    pub direct_update_template: DirectUpdateSpec,
}

/// Phase of a `ScheduledUpdate`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub enum ScheduledPhase {
    Scheduled,
    Executing,
    Done,
}

impl std::fmt::Display for ScheduledPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "Scheduled"),
            Self::Executing => write!(f, "Executing"),
            Self::Done => write!(f, "Done"),
        }
    }
}

/// `ScheduledUpdate` status.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledUpdateStatus {
    pub phase: ScheduledPhase,
    pub scheduled_for: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_update_name: Option<String>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduled_phase_display() {
        assert_eq!(ScheduledPhase::Scheduled.to_string(), "Scheduled");
        assert_eq!(ScheduledPhase::Executing.to_string(), "Executing");
        assert_eq!(ScheduledPhase::Done.to_string(), "Done");
    }
}
