//! Coordinates an out-of-band etcd snapshot via a ConfigMap handshake with
//! the node agent.

use std::collections::BTreeMap;

use chrono::Utc;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Result};

use crate::crd::BackupInfoStatus;

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const OPERATION_ID_LABEL: &str = "cupcake.ricardomolendijk.com/operation-id";
const BACKUP_LABEL: &str = "cupcake.ricardomolendijk.com/backup";

/// Backup store configuration, read once from the environment.
#[derive(Clone, Debug)]
pub struct BackupConfig {
    pub enabled: bool,
    pub store_type: String,
    pub bucket: String,
    pub endpoint: String,
    pub region: String,
    pub namespace: String,
}

impl BackupConfig {
    pub fn from_env() -> Self {
        Self::from_map(&std::env::vars().collect())
    }

    /// Pure parsing logic, kept separate from `from_env` so tests can cover
    /// defaults and overrides without mutating process-global environment
    /// state.
    fn from_map(vars: &std::collections::HashMap<String, String>) -> Self {
        let get = |key: &str| vars.get(key).cloned();
        Self {
            enabled: get("BACKUP_STORE_ENABLED").is_some_and(|v| v.eq_ignore_ascii_case("true")),
            store_type: get("BACKUP_STORE_TYPE").unwrap_or_else(|| "s3".to_string()),
            bucket: get("BACKUP_STORE_BUCKET").unwrap_or_default(),
            endpoint: get("BACKUP_STORE_ENDPOINT").unwrap_or_default(),
            region: get("BACKUP_STORE_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            namespace: get("NAMESPACE").unwrap_or_else(|| "kube-system".to_string()),
        }
    }
}

/// Result of reading the agent-written backup-status ConfigMap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupStatus {
    pub completed: bool,
    pub success: bool,
    pub message: String,
    pub snapshot_path: String,
    pub upload_path: String,
}

fn sanitize(node_name: &str) -> String {
    node_name.replace('.', "-")
}

/// Creates the backup ConfigMap that hands the snapshot request to the agent.
pub async fn trigger(
    client: kube::Client,
    config: &BackupConfig,
    node_name: &str,
    operation_id: &str,
) -> Result<BackupInfoStatus> {
    let now = Utc::now();
    let timestamp = now.format("%Y%m%d-%H%M%S").to_string();
    let snapshot_name = format!("etcd-snapshot-{operation_id}-{timestamp}");
    let cm_name = format!("backup-{operation_id}-{}", sanitize(node_name));

    let mut labels = BTreeMap::new();
    labels.insert(MANAGED_BY_LABEL.to_string(), "cupcake".to_string());
    labels.insert(OPERATION_ID_LABEL.to_string(), operation_id.to_string());
    labels.insert(BACKUP_LABEL.to_string(), "true".to_string());

    let mut data = BTreeMap::new();
    data.insert("operation_id".to_string(), operation_id.to_string());
    data.insert("node_name".to_string(), node_name.to_string());
    data.insert("snapshot_name".to_string(), snapshot_name.clone());
    data.insert("backup_type".to_string(), "etcd".to_string());
    data.insert("timestamp".to_string(), timestamp);

    let cm = ConfigMap {
        metadata: ObjectMeta {
            name: Some(cm_name),
            namespace: Some(config.namespace.clone()),
            labels: Some(labels),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    };

    let api: Api<ConfigMap> = Api::namespaced(client, &config.namespace);
    api.create(&PostParams::default(), &cm).await?;

    Ok(BackupInfoStatus {
        etcd_snapshot: snapshot_name,
        timestamp: now,
        node: node_name.to_string(),
        status: "initiated".to_string(),
    })
}

/// Reads the sibling status ConfigMap the agent writes back.
pub async fn check_status(
    client: kube::Client,
    config: &BackupConfig,
    operation_id: &str,
    node_name: &str,
) -> BackupStatus {
    let cm_name = format!("backup-status-{operation_id}-{}", sanitize(node_name));
    let api: Api<ConfigMap> = Api::namespaced(client, &config.namespace);

    match api.get(&cm_name).await {
        Ok(cm) => {
            let data = cm.data.unwrap_or_default();
            let get = |k: &str| data.get(k).cloned().unwrap_or_default();
            BackupStatus {
                completed: get("completed") == "true",
                success: get("success") == "true",
                message: get("message"),
                snapshot_path: get("snapshot_path"),
                upload_path: get("upload_path"),
            }
        }
        Err(kube::Error::Api(e)) if e.code == 404 => BackupStatus {
            completed: false,
            success: false,
            message: "Backup in progress".to_string(),
            snapshot_path: String::new(),
            upload_path: String::new(),
        },
        Err(e) => BackupStatus {
            completed: false,
            success: false,
            message: format!("error checking status: {e}"),
            snapshot_path: String::new(),
            upload_path: String::new(),
        },
    }
}

/// Deletes every backup ConfigMap labeled with `operation_id`. Individual
/// delete failures are logged but never fail the overall cleanup.
pub async fn cleanup(client: kube::Client, config: &BackupConfig, operation_id: &str) {
    let api: Api<ConfigMap> = Api::namespaced(client, &config.namespace);
    let selector = format!("{OPERATION_ID_LABEL}={operation_id},{BACKUP_LABEL}=true");

    let list = match api.list(&ListParams::default().labels(&selector)).await {
        Ok(list) => list,
        Err(e) => {
            tracing::error!("failed to list backup ConfigMaps for {operation_id}: {e}");
            return;
        }
    };

    for cm in list.items {
        let Some(name) = cm.metadata.name else { continue };
        if let Err(e) = api.delete(&name, &DeleteParams::default()).await {
            tracing::warn!("failed to delete backup ConfigMap {name}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_dots() {
        assert_eq!(sanitize("node-1.example.com"), "node-1-example-com");
    }

    #[test]
    fn test_backup_config_defaults() {
        let config = BackupConfig::from_map(&std::collections::HashMap::new());
        assert!(!config.enabled);
        assert_eq!(config.namespace, "kube-system");
        assert_eq!(config.region, "us-east-1");
    }

    #[test]
    fn test_backup_config_reads_overrides() {
        let vars = std::collections::HashMap::from([
            ("BACKUP_STORE_ENABLED".to_string(), "true".to_string()),
            ("BACKUP_STORE_BUCKET".to_string(), "my-bucket".to_string()),
        ]);
        let config = BackupConfig::from_map(&vars);
        assert!(config.enabled);
        assert_eq!(config.bucket, "my-bucket");
    }
}
