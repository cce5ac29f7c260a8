//! `UpdateSchedule`: a recurring, cron-driven upgrade schedule.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::direct_update::DirectUpdateSpec;

const fn default_suspended() -> bool {
    false
}

/// `UpdateSchedule` spec.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "cupcake.ricardomolendijk.com",
    version = "v1",
    kind = "UpdateSchedule",
    status = "UpdateScheduleStatus",
    printcolumn = r#"{"name":"SCHEDULE","type":"string","jsonPath":".spec.schedule"}"#,
    printcolumn = r#"{"name":"SUSPENDED","type":"boolean","jsonPath":".spec.suspended"}"#,
    printcolumn = r#"{"name":"LAST-RUN","type":"string","jsonPath":".status.lastRun"}"#,
    printcolumn = r#"{"name":"AGE","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScheduleSpec {
    /// Standard five-field cron expression.
    pub schedule: String,

    #[serde(default = "default_suspended")]
    pub suspended: bool,

    /// Template stamped onto each `ScheduledUpdate` this schedule creates.
    pub direct_update_template: DirectUpdateSpec,
}

/// `UpdateSchedule` status.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScheduleStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scheduled_update_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_schedule_status_default() {
        let s = UpdateScheduleStatus::default();
        assert!(s.last_run.is_none());
        assert!(s.next_run.is_none());
    }
}
