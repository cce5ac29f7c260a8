//! Node classification (control-plane vs worker), selector filtering, and
//! canary ordering.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Node;
use kube::{Api, api::ListParams};

use crate::version::Version;

const CONTROL_PLANE_LABEL: &str = "node-role.kubernetes.io/control-plane";
const MASTER_LABEL: &str = "node-role.kubernetes.io/master";

/// Classified, ordered node plan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Plan {
    pub control_plane_nodes: Vec<String>,
    pub worker_nodes: Vec<String>,
}

impl Plan {
    pub fn total(&self) -> usize {
        self.control_plane_nodes.len() + self.worker_nodes.len()
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = &String> {
        self.control_plane_nodes.iter().chain(self.worker_nodes.iter())
    }
}

/// List cluster nodes and classify them per spec: control-plane iff either
/// role label is present, otherwise worker; filtered by `node_selector`
/// (every key/value must match exactly); workers reordered so any
/// `canary_nodes` (in the given order) come first.
pub async fn make_plan(
    client: kube::Client,
    node_selector: Option<&BTreeMap<String, String>>,
    canary_enabled: bool,
    canary_nodes: &[String],
) -> kube::Result<Plan> {
    let api: Api<Node> = Api::all(client);
    let nodes = api.list(&ListParams::default()).await?;

    let mut control_plane = Vec::new();
    let mut workers = Vec::new();

    for node in &nodes.items {
        let Some(name) = node.metadata.name.clone() else {
            continue;
        };
        let labels = node.metadata.labels.clone().unwrap_or_default();

        if let Some(selector) = node_selector
            && !selector.is_empty()
            && !selector
                .iter()
                .all(|(k, v)| labels.get(k).is_some_and(|lv| lv == v))
        {
            continue;
        }

        let is_control_plane =
            labels.contains_key(CONTROL_PLANE_LABEL) || labels.contains_key(MASTER_LABEL);

        if is_control_plane {
            control_plane.push(name);
        } else {
            workers.push(name);
        }
    }

    if canary_enabled && !canary_nodes.is_empty() {
        workers = reorder_canary(workers, canary_nodes);
    }

    Ok(Plan {
        control_plane_nodes: control_plane,
        worker_nodes: workers,
    })
}

/// The cluster's current version: the oldest `kubeletVersion` reported across
/// the plan's nodes (control-plane preferred when present), since that is the
/// version every node must clear before the operation can be considered
/// complete. Returns `None` when the plan is empty or no node reports a
/// parseable version.
pub async fn current_version(client: kube::Client, plan: &Plan) -> kube::Result<Option<Version>> {
    let api: Api<Node> = Api::all(client);
    let mut oldest: Option<Version> = None;

    for name in plan.all_nodes() {
        let node = api.get(name).await?;
        let Some(kubelet_version) = node
            .status
            .as_ref()
            .and_then(|s| s.node_info.as_ref())
            .map(|info| info.kubelet_version.as_str())
        else {
            continue;
        };
        let Ok(version) = kubelet_version.parse::<Version>() else {
            continue;
        };
        oldest = Some(match oldest {
            Some(current) if current <= version => current,
            _ => version,
        });
    }

    Ok(oldest)
}

/// Move `canary_nodes` (preserving their given order) to the front of
/// `workers`; nodes named in `canary_nodes` but absent from `workers` are
/// silently ignored.
fn reorder_canary(workers: Vec<String>, canary_nodes: &[String]) -> Vec<String> {
    let canary_in_workers: Vec<String> = canary_nodes
        .iter()
        .filter(|n| workers.contains(n))
        .cloned()
        .collect();
    let rest: Vec<String> = workers
        .into_iter()
        .filter(|n| !canary_nodes.contains(n))
        .collect();

    let mut ordered = canary_in_workers;
    ordered.extend(rest);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reorder_canary_moves_listed_nodes_first() {
        let workers = vec!["a", "b", "c", "d"]
            .into_iter()
            .map(String::from)
            .collect();
        let canary = vec!["c".to_string()];
        let result = reorder_canary(workers, &canary);
        assert_eq!(result, vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn test_reorder_canary_ignores_unknown_nodes() {
        let workers = vec!["a", "b"].into_iter().map(String::from).collect();
        let canary = vec!["nonexistent".to_string(), "b".to_string()];
        let result = reorder_canary(workers, &canary);
        assert_eq!(result, vec!["b", "a"]);
    }

    #[test]
    fn test_reorder_canary_preserves_given_order() {
        let workers = vec!["a", "b", "c"].into_iter().map(String::from).collect();
        let canary = vec!["c".to_string(), "a".to_string()];
        let result = reorder_canary(workers, &canary);
        assert_eq!(result, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_plan_total() {
        let plan = Plan {
            control_plane_nodes: vec!["cp1".to_string()],
            worker_nodes: vec!["w1".to_string(), "w2".to_string()],
        };
        assert_eq!(plan.total(), 3);
    }

    #[test]
    fn test_plan_all_nodes_order() {
        let plan = Plan {
            control_plane_nodes: vec!["cp1".to_string()],
            worker_nodes: vec!["w1".to_string()],
        };
        let all: Vec<&String> = plan.all_nodes().collect();
        assert_eq!(all, vec!["cp1", "w1"]);
    }
}
