//! Prometheus metrics for the cupcake operator, matching the four series the
//! Python original exposes from `main.py`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OperationPhaseLabels {
    pub phase: String,
    pub operation_id: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OperationNodeStatusLabels {
    pub operation_id: String,
    pub status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct NodeStepLabels {
    pub operation_id: String,
    pub node: String,
    pub step: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OperationLabels {
    pub operation_id: String,
}

/// Buckets for node-step duration (a single kubeadm/kubelet upgrade step:
/// seconds to low tens of minutes).
const STEP_DURATION_BUCKETS: &[f64] = &[
    1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0,
];

/// The four metrics the operator exposes on `/metrics`.
pub struct Metrics {
    /// Total reconcile-visible phase transitions, by phase and operation.
    pub upgrade_operations_total: Family<OperationPhaseLabels, Counter>,
    /// Current node count per status for an in-flight operation.
    pub upgrade_operation_nodes_total: Family<OperationNodeStatusLabels, Gauge>,
    /// Per-node, per-step duration.
    pub upgrade_node_step_duration_seconds: Family<NodeStepLabels, Histogram>,
    /// 1 while an operation is in flight, 0 once terminal.
    pub upgrade_in_progress: Family<OperationLabels, Gauge>,
}

impl Metrics {
    /// Create and register all metrics with the given registry.
    pub fn new(registry: &mut Registry) -> Self {
        let upgrade_operations_total = Family::<OperationPhaseLabels, Counter>::default();
        registry.register(
            "cupcake_upgrade_operations",
            "Total number of upgrade operation phase transitions",
            upgrade_operations_total.clone(),
        );

        let upgrade_operation_nodes_total = Family::<OperationNodeStatusLabels, Gauge>::default();
        registry.register(
            "cupcake_upgrade_operation_nodes",
            "Current node count per status for an upgrade operation",
            upgrade_operation_nodes_total.clone(),
        );

        let upgrade_node_step_duration_seconds =
            Family::<NodeStepLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(STEP_DURATION_BUCKETS.iter().copied())
            });
        registry.register(
            "cupcake_upgrade_node_step_duration_seconds",
            "Duration of a single node upgrade step in seconds",
            upgrade_node_step_duration_seconds.clone(),
        );

        let upgrade_in_progress = Family::<OperationLabels, Gauge>::default();
        registry.register(
            "cupcake_upgrade_in_progress",
            "Whether an upgrade operation is currently in flight (1) or terminal (0)",
            upgrade_in_progress.clone(),
        );

        Self {
            upgrade_operations_total,
            upgrade_operation_nodes_total,
            upgrade_node_step_duration_seconds,
            upgrade_in_progress,
        }
    }
}

/// Axum handler that encodes the registry as OpenMetrics text.
async fn metrics_handler(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    let mut buf = String::new();
    if encode(&mut buf, &registry).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics".to_string(),
        );
    }
    (StatusCode::OK, buf)
}

/// Start the metrics server on the given port.
pub async fn serve(port: u16, registry: Arc<Registry>) -> anyhow::Result<()> {
    use axum::Router;
    use axum::routing::get;
    use tokio::net::TcpListener;
    use tracing::info;

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Metrics server listening on port {}", port);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration_and_increment() {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);

        metrics
            .upgrade_operations_total
            .get_or_create(&OperationPhaseLabels {
                phase: "Succeeded".to_string(),
                operation_id: "op-1".to_string(),
            })
            .inc();

        metrics
            .upgrade_in_progress
            .get_or_create(&OperationLabels {
                operation_id: "op-1".to_string(),
            })
            .set(0);
    }

    #[test]
    fn test_node_status_gauge() {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);

        metrics
            .upgrade_operation_nodes_total
            .get_or_create(&OperationNodeStatusLabels {
                operation_id: "op-1".to_string(),
                status: "completed".to_string(),
            })
            .set(3);

        let mut buf = String::new();
        encode(&mut buf, &registry).unwrap();
        assert!(buf.contains("cupcake_upgrade_operation_nodes"));
        assert!(buf.contains(r#"status="completed""#));
    }

    #[test]
    fn test_step_duration_histogram() {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);

        metrics
            .upgrade_node_step_duration_seconds
            .get_or_create(&NodeStepLabels {
                operation_id: "op-1".to_string(),
                node: "node-1".to_string(),
                step: "upgrading".to_string(),
            })
            .observe(42.0);

        let mut buf = String::new();
        encode(&mut buf, &registry).unwrap();
        assert!(buf.contains("cupcake_upgrade_node_step_duration_seconds_bucket{"));
    }

    #[test]
    fn test_full_encoding_has_all_four_families() {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);

        metrics
            .upgrade_operations_total
            .get_or_create(&OperationPhaseLabels {
                phase: "InProgress".to_string(),
                operation_id: "op-2".to_string(),
            })
            .inc();
        metrics
            .upgrade_operation_nodes_total
            .get_or_create(&OperationNodeStatusLabels {
                operation_id: "op-2".to_string(),
                status: "pending".to_string(),
            })
            .set(5);
        metrics
            .upgrade_node_step_duration_seconds
            .get_or_create(&NodeStepLabels {
                operation_id: "op-2".to_string(),
                node: "node-2".to_string(),
                step: "draining".to_string(),
            })
            .observe(10.0);
        metrics
            .upgrade_in_progress
            .get_or_create(&OperationLabels {
                operation_id: "op-2".to_string(),
            })
            .set(1);

        let mut buf = String::new();
        encode(&mut buf, &registry).unwrap();

        assert!(buf.contains("# TYPE cupcake_upgrade_operations counter"));
        assert!(buf.contains("# TYPE cupcake_upgrade_operation_nodes gauge"));
        assert!(buf.contains("# TYPE cupcake_upgrade_node_step_duration_seconds histogram"));
        assert!(buf.contains("# TYPE cupcake_upgrade_in_progress gauge"));
        assert!(buf.ends_with("# EOF\n"));
    }
}
