//! Write-only hand-off from the controller to the per-node upgrade agent via
//! node annotations.

use k8s_openapi::api::core::v1::Node;
use kube::api::{Patch, PatchParams};
use kube::{Api, Result};

const ANNOTATION_PREFIX: &str = "cupcake.ricardomolendijk.com";

/// The canonical agent progress annotation (spec.md §9): the agent advances
/// this value through `pending -> draining -> upgrading -> verifying ->
/// uncordoning -> completed` (or `failed`); the controller mirrors it into
/// `status.nodes[name].phase` each tick via [`read_agent_status`].
pub fn status_annotation_key() -> String {
    format!("{ANNOTATION_PREFIX}/status")
}

/// Patches the node's metadata with the upgrade hand-off annotations. This
/// is the only write path into node annotations the controller performs; it
/// does not interpret agent progress.
pub async fn annotate(
    client: kube::Client,
    node_name: &str,
    operation_id: &str,
    target_version: &str,
    components: &[String],
) -> Result<()> {
    let api: Api<Node> = Api::all(client);

    let patch = serde_json::json!({
        "metadata": {
            "annotations": {
                format!("{ANNOTATION_PREFIX}/operation-id"): operation_id,
                format!("{ANNOTATION_PREFIX}/target-version"): target_version,
                format!("{ANNOTATION_PREFIX}/components"): components.join(","),
                format!("{ANNOTATION_PREFIX}/status"): "pending",
            }
        }
    });

    api.patch(node_name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Reads the agent-owned `status` annotation back from the node, returning
/// its raw string value (the caller maps it onto `NodePhase`).
pub async fn read_agent_status(client: kube::Client, node_name: &str) -> Result<Option<String>> {
    let api: Api<Node> = Api::all(client);
    let node = api.get(node_name).await?;
    Ok(node
        .metadata
        .annotations
        .and_then(|a| a.get(&status_annotation_key()).cloned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_annotation_key() {
        assert_eq!(
            status_annotation_key(),
            "cupcake.ricardomolendijk.com/status"
        );
    }
}
