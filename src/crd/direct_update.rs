//! `DirectUpdate` spec and status types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{NodePhase, UpgradePhase};

fn default_components() -> Vec<String> {
    vec!["kubeadm".to_string(), "kubelet".to_string()]
}

const fn default_concurrency() -> u32 {
    1
}

const fn default_true() -> bool {
    true
}

/// Canary rollout configuration.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CanaryConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Worker node names to upgrade first, preserving this order.
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// Air-gapped bundle verification configuration.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AirGappedConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_config_map: Option<String>,
}

/// `DirectUpdate` spec: user intent, immutable once the controller starts
/// reconciling (the controller never writes to `spec`).
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "cupcake.ricardomolendijk.com",
    version = "v1",
    kind = "DirectUpdate",
    status = "DirectUpdateStatus",
    printcolumn = r#"{"name":"PHASE","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"TARGET","type":"string","jsonPath":".spec.targetVersion"}"#,
    printcolumn = r#"{"name":"OPERATION","type":"string","jsonPath":".status.operationID"}"#,
    printcolumn = r#"{"name":"AGE","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DirectUpdateSpec {
    /// Target Kubernetes version, e.g. "1.28.0" or "v1.28".
    pub target_version: String,

    /// Components the node agent should upgrade on each node.
    #[serde(default = "default_components")]
    pub components: Vec<String>,

    /// Only nodes matching every key/value pair are included in the plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    /// Maximum number of worker nodes upgrading simultaneously.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Whether to gate entry into `InProgress` behind the preflight battery.
    #[serde(default = "default_true")]
    pub preflight_checks: bool,

    #[serde(default)]
    pub canary: CanaryConfig,

    #[serde(default)]
    pub air_gapped: AirGappedConfig,
}

impl DirectUpdateSpec {
    /// Concurrency clamped to a minimum of 1 (spec.md §4.7 tie-break:
    /// `concurrency=0` is rejected at validation; we clamp rather than error
    /// since the source never validates this field at all).
    pub fn effective_concurrency(&self) -> u32 {
        self.concurrency.max(1)
    }
}

/// Result of a single preflight check.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreflightCheckStatus {
    pub name: String,
    pub passed: bool,
    pub message: String,
}

/// Aggregate preflight result.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreflightResultsStatus {
    pub passed: bool,
    pub checks: Vec<PreflightCheckStatus>,
}

/// Multi-step version upgrade path, present only when more than one step is
/// required (spec.md §4.7: "Emit `upgradePath` only when `len(path) > 1`").
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpgradePathStatus {
    pub current_version: String,
    pub target_version: String,
    pub steps: Vec<String>,
    pub current_step: u32,
    pub total_steps: u32,
}

/// Record of an etcd backup taken ahead of a control-plane node upgrade.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfoStatus {
    pub etcd_snapshot: String,
    pub timestamp: DateTime<Utc>,
    pub node: String,
    pub status: String,
}

/// Per-node progress as observed by the controller.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub phase: NodePhase,
    pub last_step: String,
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Derived counts over `status.nodes`, recomputed every tick.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStatus {
    pub total: u32,
    pub completed: u32,
    pub upgrading: u32,
    pub pending: u32,
    pub failed: u32,
}

/// `DirectUpdate` status: entirely controller-owned.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DirectUpdateStatus {
    pub phase: UpgradePhase,

    /// Assigned once at creation; never changes thereafter.
    pub operation_id: String,

    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,

    /// Set once when the operation reaches Succeeded; never cleared back to
    /// `None`, so `skip_serializing_if` is safe here (contrast `upgrade_path`
    /// fields elsewhere in this codebase, which rely on `None` -> `null`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_path: Option<UpgradePathStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preflight_results: Option<PreflightResultsStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_info: Option<BackupInfoStatus>,

    #[serde(default)]
    pub nodes: BTreeMap<String, NodeStatus>,

    #[serde(default)]
    pub summary: SummaryStatus,

    /// Consecutive-tick absence counters for nodes that have vanished from
    /// the cluster before completing (spec.md §9, "vanished nodes"). Not
    /// part of the distilled spec's NodeStatus fields; internal bookkeeping
    /// only, documented in DESIGN.md.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_absence_counters: BTreeMap<String, u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_components() {
        assert_eq!(default_components(), vec!["kubeadm", "kubelet"]);
    }

    #[test]
    fn test_spec_defaults_from_json() {
        let json = serde_json::json!({ "targetVersion": "1.28.0" });
        let spec: DirectUpdateSpec = serde_json::from_value(json).unwrap();
        assert_eq!(spec.components, vec!["kubeadm", "kubelet"]);
        assert_eq!(spec.concurrency, 1);
        assert!(spec.preflight_checks);
        assert!(!spec.canary.enabled);
        assert!(!spec.air_gapped.enabled);
    }

    #[test]
    fn test_effective_concurrency_clamps_zero() {
        let mut spec: DirectUpdateSpec =
            serde_json::from_value(serde_json::json!({ "targetVersion": "1.28.0" })).unwrap();
        spec.concurrency = 0;
        assert_eq!(spec.effective_concurrency(), 1);
        spec.concurrency = 4;
        assert_eq!(spec.effective_concurrency(), 4);
    }

    #[test]
    fn test_summary_status_default() {
        let s = SummaryStatus::default();
        assert_eq!(s.total, 0);
        assert_eq!(s.completed + s.upgrading + s.pending + s.failed, 0);
    }
}
