//! Fixed battery of cluster-state checks gating entry into `InProgress`.

use k8s_openapi::api::core::v1::{ConfigMap, Node};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::{Api, api::ListParams};

use crate::crd::{AirGappedConfig, PreflightCheckStatus, PreflightResultsStatus};
use crate::planner::Plan;

const AIRGAP_NAMESPACE: &str = "kube-system";

/// Runs all checks in order and aggregates `passed` as the logical AND of
/// each check's `passed` field (the PDB check always reports `passed=true`;
/// it is informational only and never fails the gate).
pub async fn run(
    client: kube::Client,
    plan: &Plan,
    air_gapped: &AirGappedConfig,
) -> PreflightResultsStatus {
    let mut checks = vec![
        check_api_server(client.clone()).await,
        check_nodes_ready(client.clone(), plan).await,
        check_disk_pressure(client.clone(), plan).await,
        check_pdbs(client.clone()).await,
    ];

    if air_gapped.enabled {
        checks.push(check_airgap_bundle(client, air_gapped).await);
    }

    let passed = checks.iter().all(|c| c.passed);

    PreflightResultsStatus { passed, checks }
}

async fn check_api_server(client: kube::Client) -> PreflightCheckStatus {
    let api: Api<Node> = Api::all(client);
    match api.list(&ListParams::default().limit(1)).await {
        Ok(_) => PreflightCheckStatus {
            name: "API Server Connectivity".to_string(),
            passed: true,
            message: "API server is reachable".to_string(),
        },
        Err(e) => PreflightCheckStatus {
            name: "API Server Connectivity".to_string(),
            passed: false,
            message: format!("API server unreachable: {e}"),
        },
    }
}

async fn check_nodes_ready(client: kube::Client, plan: &Plan) -> PreflightCheckStatus {
    let api: Api<Node> = Api::all(client);
    let mut not_ready = Vec::new();

    for name in plan.all_nodes() {
        match api.get(name).await {
            Ok(node) => {
                let ready = node
                    .status
                    .as_ref()
                    .and_then(|s| s.conditions.as_ref())
                    .is_some_and(|conds| {
                        conds
                            .iter()
                            .any(|c| c.type_ == "Ready" && c.status == "True")
                    });
                if !ready {
                    not_ready.push(name.clone());
                }
            }
            Err(e) => {
                return PreflightCheckStatus {
                    name: "Node Readiness".to_string(),
                    passed: false,
                    message: format!("failed to check node readiness: {e}"),
                };
            }
        }
    }

    if not_ready.is_empty() {
        PreflightCheckStatus {
            name: "Node Readiness".to_string(),
            passed: true,
            message: format!("all {} nodes are ready", plan.total()),
        }
    } else {
        PreflightCheckStatus {
            name: "Node Readiness".to_string(),
            passed: false,
            message: format!("nodes not ready: {}", not_ready.join(", ")),
        }
    }
}

async fn check_disk_pressure(client: kube::Client, plan: &Plan) -> PreflightCheckStatus {
    let api: Api<Node> = Api::all(client);
    let mut low_disk = Vec::new();

    for name in plan.all_nodes() {
        match api.get(name).await {
            Ok(node) => {
                let has_pressure = node
                    .status
                    .as_ref()
                    .and_then(|s| s.conditions.as_ref())
                    .is_some_and(|conds| {
                        conds
                            .iter()
                            .any(|c| c.type_ == "DiskPressure" && c.status == "True")
                    });
                if has_pressure {
                    low_disk.push(name.clone());
                }
            }
            Err(e) => {
                return PreflightCheckStatus {
                    name: "Disk Space".to_string(),
                    passed: false,
                    message: format!("failed to check disk space: {e}"),
                };
            }
        }
    }

    if low_disk.is_empty() {
        PreflightCheckStatus {
            name: "Disk Space".to_string(),
            passed: true,
            message: "all nodes have sufficient disk space".to_string(),
        }
    } else {
        PreflightCheckStatus {
            name: "Disk Space".to_string(),
            passed: false,
            message: format!("nodes with disk pressure: {}", low_disk.join(", ")),
        }
    }
}

/// Informational only — always `passed: true`, even when restrictive PDBs
/// are found or the check itself errors (matches the source: a drain
/// deadlock is surfaced to the operator, not used to block the gate).
async fn check_pdbs(client: kube::Client) -> PreflightCheckStatus {
    let api: Api<PodDisruptionBudget> = Api::all(client);
    match api.list(&ListParams::default()).await {
        Ok(list) => {
            let restrictive: Vec<String> = list
                .items
                .iter()
                .filter(|pdb| {
                    pdb.status
                        .as_ref()
                        .is_some_and(|s| s.disruptions_allowed == 0)
                })
                .map(|pdb| {
                    format!(
                        "{}/{}",
                        pdb.metadata.namespace.as_deref().unwrap_or("default"),
                        pdb.metadata.name.as_deref().unwrap_or("unknown")
                    )
                })
                .collect();

            if restrictive.is_empty() {
                PreflightCheckStatus {
                    name: "PodDisruptionBudgets".to_string(),
                    passed: true,
                    message: "PDBs are not overly restrictive".to_string(),
                }
            } else {
                PreflightCheckStatus {
                    name: "PodDisruptionBudgets".to_string(),
                    passed: true,
                    message: format!(
                        "warning: {} PDBs with 0 disruptions allowed: {}",
                        restrictive.len(),
                        restrictive.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
                    ),
                }
            }
        }
        Err(_) => PreflightCheckStatus {
            name: "PodDisruptionBudgets".to_string(),
            passed: true,
            message: "could not check PDBs (non-critical)".to_string(),
        },
    }
}

async fn check_airgap_bundle(
    client: kube::Client,
    air_gapped: &AirGappedConfig,
) -> PreflightCheckStatus {
    let Some(bundle_cm) = air_gapped.bundle_config_map.as_deref() else {
        return PreflightCheckStatus {
            name: "Air-Gap Bundle".to_string(),
            passed: false,
            message: "air-gap enabled but no bundleConfigMap specified".to_string(),
        };
    };

    let api: Api<ConfigMap> = Api::namespaced(client, AIRGAP_NAMESPACE);
    match api.get(bundle_cm).await {
        Ok(_) => PreflightCheckStatus {
            name: "Air-Gap Bundle".to_string(),
            passed: true,
            message: format!("air-gap bundle ConfigMap {bundle_cm} exists"),
        },
        Err(kube::Error::Api(e)) if e.code == 404 => PreflightCheckStatus {
            name: "Air-Gap Bundle".to_string(),
            passed: false,
            message: format!("air-gap bundle ConfigMap {bundle_cm} not found"),
        },
        Err(e) => PreflightCheckStatus {
            name: "Air-Gap Bundle".to_string(),
            passed: false,
            message: format!("failed to check air-gap bundle: {e}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preflight_results_passed_is_and_of_checks() {
        let checks = vec![
            PreflightCheckStatus {
                name: "a".into(),
                passed: true,
                message: String::new(),
            },
            PreflightCheckStatus {
                name: "b".into(),
                passed: false,
                message: String::new(),
            },
        ];
        let passed = checks.iter().all(|c| c.passed);
        assert!(!passed);
    }

    #[test]
    fn test_airgap_missing_bundle_name_fails() {
        let cfg = AirGappedConfig {
            enabled: true,
            bundle_config_map: None,
        };
        assert!(cfg.bundle_config_map.is_none());
    }
}
