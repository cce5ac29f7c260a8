//! Strategic-merge status patcher over the CRD status subresource.
//!
//! Two mechanisms combine here: a hand-rolled recursive deep-merge (ported
//! from the source's `deep_merge`, exercised directly in tests as a pure
//! function) and Kubernetes' own JSON Merge Patch (RFC 7396) applied via
//! `Patch::Merge`, which relies on the `Option<T>`-without-`skip_serializing_if`
//! idiom on the status types to turn a cleared field into a real `null` that
//! the API server's merge machinery then removes.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::{Api, Result};
use serde_json::Value;

use crate::crd::{DirectUpdate, DirectUpdateStatus, NodePhase, NodeStatus, SummaryStatus};

/// Consecutive ticks a node may be absent from the cluster before the
/// controller gives up on it and marks it `Failed` (spec.md §9, "vanished
/// nodes").
pub const VANISHED_NODE_TICKS: u32 = 3;

/// Recursively merge `patch` into `base`: where both sides are objects, merge
/// recursively; otherwise the incoming value replaces the existing one
/// (including replacing with `null` or an array wholesale — arrays are never
/// concatenated).
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, patch) => {
            *base = patch.clone();
        }
    }
}

/// Apply a JSON Merge Patch of `status` to the `DirectUpdate` status
/// subresource. Not conditioned on resource version; safe only under the
/// single-leader assumption documented in spec.md §9.
pub async fn patch_status(
    api: &Api<DirectUpdate>,
    name: &str,
    status: &DirectUpdateStatus,
) -> Result<DirectUpdate> {
    let patch = serde_json::json!({ "status": status });
    api.patch_status(name, &PatchParams::apply("cupcake-operator"), &Patch::Merge(&patch))
        .await
}

/// Pure function: classifies phases into the four buckets and returns the
/// tuple plus total. Unknown phases are counted only in `total` — not
/// reachable today since `NodePhase` is exhaustive, but kept general per
/// spec.md §4.4's stated contract for forward-compatible phase additions.
pub fn compute_summary(nodes: &BTreeMap<String, NodeStatus>) -> SummaryStatus {
    use crate::crd::NodePhase;

    let mut summary = SummaryStatus {
        total: nodes.len() as u32,
        ..Default::default()
    };

    for node in nodes.values() {
        match node.phase {
            NodePhase::Completed => summary.completed += 1,
            NodePhase::Draining | NodePhase::Upgrading | NodePhase::Verifying | NodePhase::Uncordoning => {
                summary.upgrading += 1;
            }
            NodePhase::Pending => summary.pending += 1,
            NodePhase::Failed => summary.failed += 1,
        }
    }

    summary
}

/// Advance the vanished-node absence counters against the set of node names
/// the current plan still lists as present. A node terminal-completed
/// already is left alone even if it has disappeared (a drained-and-removed
/// control-plane node is an expected outcome, not a failure). Nodes that
/// reappear in `present` have their counter cleared.
pub fn reconcile_vanished_nodes(
    nodes: &mut BTreeMap<String, NodeStatus>,
    absence_counters: &mut BTreeMap<String, u32>,
    present: &BTreeSet<String>,
) {
    for (name, node) in nodes.iter_mut() {
        if present.contains(name) {
            absence_counters.remove(name);
            continue;
        }
        if node.phase.is_terminal() {
            continue;
        }
        let counter = absence_counters.entry(name.clone()).or_insert(0);
        *counter += 1;
        if *counter >= VANISHED_NODE_TICKS {
            node.phase = NodePhase::Failed;
            node.message = "node vanished from the cluster".to_string();
            node.last_updated = Utc::now();
            absence_counters.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deep_merge_identity_with_empty_patch() {
        let mut base = json!({"a": 1, "b": {"c": 2}});
        let original = base.clone();
        deep_merge(&mut base, &json!({}));
        assert_eq!(base, original);
    }

    #[test]
    fn test_deep_merge_self_is_identity() {
        let mut base = json!({"a": 1, "b": {"c": 2}});
        let clone = base.clone();
        deep_merge(&mut base, &clone);
        assert_eq!(base, clone);
    }

    #[test]
    fn test_deep_merge_recurses_into_nested_objects() {
        let mut base = json!({"nodes": {"n1": {"phase": "Pending"}, "n2": {"phase": "Pending"}}});
        deep_merge(&mut base, &json!({"nodes": {"n1": {"phase": "Upgrading"}}}));
        assert_eq!(base["nodes"]["n1"]["phase"], "Upgrading");
        assert_eq!(base["nodes"]["n2"]["phase"], "Pending");
    }

    #[test]
    fn test_deep_merge_replaces_arrays_wholesale() {
        let mut base = json!({"checks": [1, 2, 3]});
        deep_merge(&mut base, &json!({"checks": [4]}));
        assert_eq!(base["checks"], json!([4]));
    }

    #[test]
    fn test_deep_merge_null_replaces_value() {
        let mut base = json!({"updateId": "abc"});
        deep_merge(&mut base, &json!({"updateId": null}));
        assert_eq!(base["updateId"], Value::Null);
    }

    #[test]
    fn test_deep_merge_associative_on_nonconflicting_keys() {
        let start = json!({"a": 1});
        let p1 = json!({"b": 2});
        let p2 = json!({"c": 3});

        let mut left = start.clone();
        deep_merge(&mut left, &p1);
        deep_merge(&mut left, &p2);

        let mut combined_patch = p1.clone();
        deep_merge(&mut combined_patch, &p2);
        let mut right = start;
        deep_merge(&mut right, &combined_patch);

        assert_eq!(left, right);
    }

    fn node(phase: crate::crd::NodePhase) -> NodeStatus {
        NodeStatus {
            phase,
            last_step: String::new(),
            message: String::new(),
            started_at: Utc::now(),
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_compute_summary_buckets() {
        use crate::crd::NodePhase;

        let mut nodes = BTreeMap::new();
        nodes.insert("n1".to_string(), node(NodePhase::Completed));
        nodes.insert("n2".to_string(), node(NodePhase::Upgrading));
        nodes.insert("n3".to_string(), node(NodePhase::Draining));
        nodes.insert("n4".to_string(), node(NodePhase::Pending));
        nodes.insert("n5".to_string(), node(NodePhase::Failed));

        let summary = compute_summary(&nodes);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.upgrading, 2);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(
            summary.completed + summary.upgrading + summary.pending + summary.failed,
            summary.total
        );
    }

    #[test]
    fn test_compute_summary_empty() {
        let nodes = BTreeMap::new();
        let summary = compute_summary(&nodes);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.completed, 0);
    }

    #[test]
    fn test_reconcile_vanished_nodes_marks_failed_after_threshold() {
        use crate::crd::NodePhase;

        let mut nodes = BTreeMap::new();
        nodes.insert("n1".to_string(), node(NodePhase::Upgrading));
        let mut counters = BTreeMap::new();
        let present = BTreeSet::new();

        reconcile_vanished_nodes(&mut nodes, &mut counters, &present);
        assert_eq!(counters["n1"], 1);
        assert_eq!(nodes["n1"].phase, NodePhase::Upgrading);

        reconcile_vanished_nodes(&mut nodes, &mut counters, &present);
        assert_eq!(counters["n1"], 2);

        reconcile_vanished_nodes(&mut nodes, &mut counters, &present);
        assert_eq!(nodes["n1"].phase, NodePhase::Failed);
        assert!(!counters.contains_key("n1"));
    }

    #[test]
    fn test_reconcile_vanished_nodes_resets_on_reappearance() {
        use crate::crd::NodePhase;

        let mut nodes = BTreeMap::new();
        nodes.insert("n1".to_string(), node(NodePhase::Upgrading));
        let mut counters = BTreeMap::new();
        let empty = BTreeSet::new();
        reconcile_vanished_nodes(&mut nodes, &mut counters, &empty);
        assert_eq!(counters["n1"], 1);

        let present: BTreeSet<String> = ["n1".to_string()].into_iter().collect();
        reconcile_vanished_nodes(&mut nodes, &mut counters, &present);
        assert!(!counters.contains_key("n1"));
        assert_eq!(nodes["n1"].phase, NodePhase::Upgrading);
    }

    #[test]
    fn test_reconcile_vanished_nodes_ignores_already_terminal() {
        use crate::crd::NodePhase;

        let mut nodes = BTreeMap::new();
        nodes.insert("n1".to_string(), node(NodePhase::Completed));
        let mut counters = BTreeMap::new();
        let empty = BTreeSet::new();

        for _ in 0..5 {
            reconcile_vanished_nodes(&mut nodes, &mut counters, &empty);
        }
        assert_eq!(nodes["n1"].phase, NodePhase::Completed);
        assert!(counters.is_empty());
    }
}
