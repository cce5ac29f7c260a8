//! `DirectUpdate` controller — phase-dispatch reconciler implementing the
//! in-place node upgrade state machine (spec.md §4.7).

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kube::Api;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use tracing::warn;
use uuid::Uuid;

use super::Context;
use crate::crd::{
    DirectUpdate, DirectUpdateSpec, DirectUpdateStatus, NodePhase, NodeStatus, UpgradePathStatus,
    UpgradePhase,
};
use crate::error::CupcakeError;
use crate::metrics::{NodeStepLabels, OperationLabels, OperationNodeStatusLabels, OperationPhaseLabels};
use crate::version::Version;
use crate::{backup, dispatcher, planner, preflight, state, status};

/// Marks a `DirectUpdate` as owning backup ConfigMaps that must be cleaned up
/// before the resource is allowed to be deleted (spec.md §3 lifecycle).
const BACKUP_CLEANUP_FINALIZER: &str = "cupcake.ricardomolendijk.com/backup-cleanup";

fn has_finalizer(obj: &DirectUpdate) -> bool {
    obj.metadata
        .finalizers
        .as_ref()
        .is_some_and(|fs| fs.iter().any(|f| f == BACKUP_CLEANUP_FINALIZER))
}

/// Reconcile a `DirectUpdate` resource.
pub async fn reconcile(obj: Arc<DirectUpdate>, ctx: Arc<Context>) -> Result<Action, kube::Error> {
    let name = obj.metadata.name.clone().unwrap_or_else(|| "unknown".to_string());
    let api: Api<DirectUpdate> = Api::all(ctx.kube_client.clone());

    if obj.metadata.deletion_timestamp.is_some() {
        return Ok(finalize_delete(&api, &name, &ctx, &obj).await);
    }

    if !has_finalizer(&obj) {
        ensure_finalizer(&api, &name, &obj).await;
    }

    let Some(current_status) = obj.status.clone() else {
        return Ok(initialize(&api, &name, ctx.kube_client.clone(), &obj.spec).await);
    };

    if current_status.phase.is_terminal() {
        return Ok(Action::await_change());
    }

    let recorder = status::EventRecorder::new(ctx.kube_client.clone(), &obj);
    let mut new_status = current_status;
    let phase = new_status.phase.clone();

    let result = match phase {
        UpgradePhase::Pending => run_pending(&ctx, &obj.spec, &mut new_status).await,
        UpgradePhase::InProgress => run_in_progress(&ctx, &obj.spec, &mut new_status).await,
        UpgradePhase::RequiresAttention
        | UpgradePhase::Succeeded
        | UpgradePhase::Failed
        | UpgradePhase::Cancelled => return Ok(Action::await_change()),
    };

    if let Err(e) = result {
        warn!("reconcile error for {name}: {e}");
        if e.is_transient() {
            return Ok(Action::requeue(Duration::from_secs(10)));
        }
        status::set_failed(&mut new_status, e.to_string());
    }

    new_status.last_updated = Utc::now();
    record_metrics(&ctx, &new_status);

    if let Err(e) = state::patch_status(&api, &name, &new_status).await {
        warn!("failed to patch status for {name}: {e}");
        return Ok(Action::requeue(Duration::from_secs(5)));
    }

    match new_status.phase {
        UpgradePhase::Succeeded => {
            recorder.publish("UpgradeSucceeded", &new_status.message).await;
        }
        UpgradePhase::Failed => {
            recorder.publish_warning("UpgradeFailed", &new_status.message).await;
        }
        UpgradePhase::RequiresAttention => {
            recorder
                .publish_warning("UpgradeRequiresAttention", &new_status.message)
                .await;
        }
        _ => {}
    }

    Ok(Action::requeue(Duration::from_secs(15)))
}

/// Error policy: always retry after a fixed backoff.
pub fn error_policy(obj: Arc<DirectUpdate>, err: &kube::Error, _ctx: Arc<Context>) -> Action {
    let name = obj.metadata.name.as_deref().unwrap_or("unknown");
    tracing::error!("controller error for {name}: {err}");
    Action::requeue(Duration::from_secs(30))
}

/// Add `BACKUP_CLEANUP_FINALIZER` if the resource doesn't already carry it.
async fn ensure_finalizer(api: &Api<DirectUpdate>, name: &str, obj: &DirectUpdate) {
    let mut finalizers = obj.metadata.finalizers.clone().unwrap_or_default();
    finalizers.push(BACKUP_CLEANUP_FINALIZER.to_string());

    let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
    if let Err(e) = api.patch(name, &PatchParams::default(), &Patch::Merge(&patch)).await {
        warn!("failed to add finalizer to {name}: {e}");
    }
}

/// Handle a `DirectUpdate` marked for deletion: clean up backup ConfigMaps
/// labeled with its operation ID, then remove the finalizer so the API
/// server can finish deleting the resource (spec.md §3 lifecycle, §4.7
/// "on delete").
async fn finalize_delete(api: &Api<DirectUpdate>, name: &str, ctx: &Context, obj: &DirectUpdate) -> Action {
    if !has_finalizer(obj) {
        return Action::await_change();
    }

    if let Some(status) = obj.status.as_ref() {
        backup::cleanup(ctx.kube_client.clone(), &ctx.backup_config, &status.operation_id).await;
    }

    let finalizers: Vec<String> = obj
        .metadata
        .finalizers
        .clone()
        .unwrap_or_default()
        .into_iter()
        .filter(|f| f != BACKUP_CLEANUP_FINALIZER)
        .collect();

    let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
    if let Err(e) = api.patch(name, &PatchParams::default(), &Patch::Merge(&patch)).await {
        warn!("failed to remove finalizer from {name}: {e}");
        return Action::requeue(Duration::from_secs(5));
    }

    Action::await_change()
}

/// First reconcile of a newly created resource: generate the operation ID,
/// validate the target version, build the node plan, and seed `status.nodes`
/// (spec.md §4.7).
async fn initialize(
    api: &Api<DirectUpdate>,
    name: &str,
    client: kube::Client,
    spec: &DirectUpdateSpec,
) -> Action {
    let now = Utc::now();
    let mut new_status = DirectUpdateStatus {
        phase: UpgradePhase::Pending,
        operation_id: Uuid::new_v4().to_string(),
        started_at: now,
        last_updated: now,
        completed_at: None,
        message: "upgrade operation accepted".to_string(),
        upgrade_path: None,
        preflight_results: None,
        backup_info: None,
        nodes: Default::default(),
        summary: Default::default(),
        node_absence_counters: Default::default(),
    };

    let target_version: Version = match spec.target_version.parse() {
        Ok(v) => v,
        Err(e) => {
            status::set_failed(&mut new_status, format!("invalid targetVersion: {e}"));
            let _ = state::patch_status(api, name, &new_status).await;
            return Action::await_change();
        }
    };
    if let Err(e) = target_version.validate() {
        status::set_failed(&mut new_status, e);
        let _ = state::patch_status(api, name, &new_status).await;
        return Action::await_change();
    }

    let plan = match planner::make_plan(
        client.clone(),
        spec.node_selector.as_ref(),
        spec.canary.enabled,
        &spec.canary.nodes,
    )
    .await
    {
        Ok(p) => p,
        Err(e) => {
            new_status.message = format!("failed to build node plan: {e}");
            let _ = state::patch_status(api, name, &new_status).await;
            return Action::requeue(Duration::from_secs(10));
        }
    };

    if let Ok(Some(current_version)) = planner::current_version(client, &plan).await {
        let path = current_version.path(&target_version);
        if path.len() > 1 {
            new_status.upgrade_path = Some(UpgradePathStatus {
                current_version: current_version.to_string(),
                target_version: target_version.to_string(),
                steps: path.iter().map(Version::to_string).collect(),
                current_step: 0,
                total_steps: path.len() as u32,
            });
        }
    }

    for node_name in plan.all_nodes() {
        new_status.nodes.insert(
            node_name.clone(),
            NodeStatus {
                phase: NodePhase::Pending,
                last_step: String::new(),
                message: String::new(),
                started_at: now,
                last_updated: now,
            },
        );
    }
    new_status.summary = state::compute_summary(&new_status.nodes);

    if let Err(e) = state::patch_status(api, name, &new_status).await {
        warn!("failed to write initial status for {name}: {e}");
        return Action::requeue(Duration::from_secs(5));
    }

    Action::requeue(Duration::from_millis(100))
}

/// `Pending`: run the preflight battery (unless disabled), then move to
/// `InProgress` or stall in `RequiresAttention`.
async fn run_pending(
    ctx: &Context,
    spec: &DirectUpdateSpec,
    new_status: &mut DirectUpdateStatus,
) -> Result<(), CupcakeError> {
    if new_status.summary.total == 0 {
        status::set_phase(new_status, UpgradePhase::Succeeded);
        new_status.message = "no matching nodes to upgrade".to_string();
        return Ok(());
    }

    if !spec.preflight_checks {
        new_status.phase = UpgradePhase::InProgress;
        new_status.message = "preflight checks skipped".to_string();
        return Ok(());
    }

    if new_status.preflight_results.is_some() {
        return Ok(());
    }

    let plan = planner::make_plan(
        ctx.kube_client.clone(),
        spec.node_selector.as_ref(),
        spec.canary.enabled,
        &spec.canary.nodes,
    )
    .await
    .map_err(CupcakeError::Planning)?;

    let results = preflight::run(ctx.kube_client.clone(), &plan, &spec.air_gapped).await;
    let passed = results.passed;
    new_status.preflight_results = Some(results);

    if passed {
        new_status.phase = UpgradePhase::InProgress;
        new_status.message = "preflight checks passed".to_string();
    } else {
        new_status.phase = UpgradePhase::RequiresAttention;
        new_status.message = "preflight checks failed".to_string();
    }

    Ok(())
}

/// `InProgress`: dispatch control-plane nodes strictly one at a time (backup
/// before hand-off), then dispatch worker nodes bounded by `concurrency` once
/// every control-plane node has completed, mirroring agent progress and
/// vanished-node bookkeeping every tick.
async fn run_in_progress(
    ctx: &Context,
    spec: &DirectUpdateSpec,
    new_status: &mut DirectUpdateStatus,
) -> Result<(), CupcakeError> {
    let plan = planner::make_plan(
        ctx.kube_client.clone(),
        spec.node_selector.as_ref(),
        spec.canary.enabled,
        &spec.canary.nodes,
    )
    .await
    .map_err(CupcakeError::Planning)?;

    let present: BTreeSet<String> = plan.all_nodes().cloned().collect();
    state::reconcile_vanished_nodes(&mut new_status.nodes, &mut new_status.node_absence_counters, &present);

    mirror_agent_progress(ctx, new_status, &present).await;

    dispatch_control_plane(ctx, spec, new_status, &plan).await?;

    let cp_all_completed = plan
        .control_plane_nodes
        .iter()
        .all(|n| new_status.nodes.get(n).is_some_and(|ns| ns.phase == NodePhase::Completed));

    if new_status.phase == UpgradePhase::InProgress && cp_all_completed {
        dispatch_workers(ctx, spec, new_status, &plan).await?;
    }

    new_status.summary = state::compute_summary(&new_status.nodes);

    if new_status.phase != UpgradePhase::InProgress {
        return Ok(());
    }

    if new_status.summary.total == 0 {
        status::set_phase(new_status, UpgradePhase::Succeeded);
        new_status.message = "no matching nodes to upgrade".to_string();
    } else if new_status.summary.pending == 0 && new_status.summary.upgrading == 0 {
        if new_status.summary.failed > 0 {
            status::set_failed(
                new_status,
                format!(
                    "{} of {} nodes failed to upgrade",
                    new_status.summary.failed, new_status.summary.total
                ),
            );
        } else {
            status::set_phase(new_status, UpgradePhase::Succeeded);
            new_status.message = "all nodes upgraded successfully".to_string();
        }
    }

    Ok(())
}

/// Pull each dispatched, non-terminal node's progress from its
/// `cupcake.ricardomolendijk.com/status` annotation (spec.md §9), recording
/// how long the step that just finished took.
async fn mirror_agent_progress(
    ctx: &Context,
    new_status: &mut DirectUpdateStatus,
    present: &BTreeSet<String>,
) {
    let operation_id = new_status.operation_id.clone();

    for node_name in present {
        let Some(node_status) = new_status.nodes.get(node_name) else {
            continue;
        };
        if node_status.phase.is_terminal() || node_status.last_step.is_empty() {
            continue;
        }

        match dispatcher::read_agent_status(ctx.kube_client.clone(), node_name).await {
            Ok(Some(raw)) => {
                // `pending` is the annotation value dispatch itself writes
                // (dispatcher.rs); treating it as fresh agent progress would
                // downgrade a node already marked `Upgrading` back to
                // `Pending`, double-counting it against the concurrency
                // bound on the next tick. Only a phase past that initial
                // value is real progress.
                if let Some(phase) = NodePhase::from_annotation(&raw)
                    && phase != NodePhase::Pending
                    && let Some(ns) = new_status.nodes.get_mut(node_name)
                {
                    if phase != ns.phase {
                        let now = Utc::now();
                        let elapsed = (now - ns.last_updated).num_milliseconds().max(0) as f64 / 1000.0;
                        ctx.metrics
                            .upgrade_node_step_duration_seconds
                            .get_or_create(&NodeStepLabels {
                                operation_id: operation_id.clone(),
                                node: node_name.clone(),
                                step: ns.phase.to_string(),
                            })
                            .observe(elapsed);
                        ns.phase = phase;
                        ns.last_updated = now;
                    }
                    ns.last_step = raw;
                }
            }
            Ok(None) => {}
            Err(e) => warn!("failed to read agent status for {node_name}: {e}"),
        }
    }
}

/// Dispatch at most one control-plane node per tick: the first one that has
/// not yet been handed off. Earlier control-plane nodes must already be
/// terminal, enforcing strict sequencing.
async fn dispatch_control_plane(
    ctx: &Context,
    spec: &DirectUpdateSpec,
    new_status: &mut DirectUpdateStatus,
    plan: &planner::Plan,
) -> Result<(), CupcakeError> {
    for node_name in &plan.control_plane_nodes {
        let Some(node_status) = new_status.nodes.get(node_name) else {
            continue;
        };
        if node_status.phase.is_terminal() {
            continue;
        }
        if !node_status.last_step.is_empty() {
            return Ok(());
        }

        if ctx.backup_config.enabled {
            match backup::trigger(
                ctx.kube_client.clone(),
                &ctx.backup_config,
                node_name,
                &new_status.operation_id,
            )
            .await
            {
                Ok(info) => new_status.backup_info = Some(info),
                Err(e) => {
                    status::set_requires_attention(
                        new_status,
                        format!("etcd backup failed for {node_name}: {e}"),
                    );
                    return Ok(());
                }
            }
        }

        dispatcher::annotate(
            ctx.kube_client.clone(),
            node_name,
            &new_status.operation_id,
            &spec.target_version,
            &spec.components,
        )
        .await
        .map_err(CupcakeError::Annotation)?;

        if let Some(ns) = new_status.nodes.get_mut(node_name) {
            ns.phase = NodePhase::Upgrading;
            ns.last_step = "dispatched".to_string();
            ns.last_updated = Utc::now();
        }
        return Ok(());
    }

    Ok(())
}

/// Dispatch worker nodes up to `spec.effectiveConcurrency()`, canary-ordered
/// by the plan. Dispatched nodes are marked `Upgrading` immediately so the
/// in-flight count on the very next tick reflects them, even before the
/// agent has reported any progress of its own (spec.md §8: workers in an
/// in-flight phase must never exceed `concurrency`).
async fn dispatch_workers(
    ctx: &Context,
    spec: &DirectUpdateSpec,
    new_status: &mut DirectUpdateStatus,
    plan: &planner::Plan,
) -> Result<(), CupcakeError> {
    let in_flight = plan
        .worker_nodes
        .iter()
        .filter(|n| new_status.nodes.get(*n).is_some_and(|ns| ns.phase.is_in_flight()))
        .count() as u32;
    let mut available = spec.effective_concurrency().saturating_sub(in_flight);

    for node_name in &plan.worker_nodes {
        if available == 0 {
            break;
        }
        let Some(node_status) = new_status.nodes.get(node_name) else {
            continue;
        };
        if node_status.phase.is_terminal() || !node_status.last_step.is_empty() {
            continue;
        }

        dispatcher::annotate(
            ctx.kube_client.clone(),
            node_name,
            &new_status.operation_id,
            &spec.target_version,
            &spec.components,
        )
        .await
        .map_err(CupcakeError::Annotation)?;

        if let Some(ns) = new_status.nodes.get_mut(node_name) {
            ns.phase = NodePhase::Upgrading;
            ns.last_step = "dispatched".to_string();
            ns.last_updated = Utc::now();
        }
        available -= 1;
    }

    Ok(())
}

fn record_metrics(ctx: &Context, new_status: &DirectUpdateStatus) {
    ctx.metrics
        .upgrade_operations_total
        .get_or_create(&OperationPhaseLabels {
            phase: new_status.phase.to_string(),
            operation_id: new_status.operation_id.clone(),
        })
        .inc();

    ctx.metrics
        .upgrade_in_progress
        .get_or_create(&OperationLabels {
            operation_id: new_status.operation_id.clone(),
        })
        .set(i64::from(!new_status.phase.is_terminal()));

    let summary = &new_status.summary;
    for (label, count) in [
        ("completed", summary.completed),
        ("upgrading", summary.upgrading),
        ("pending", summary.pending),
        ("failed", summary.failed),
    ] {
        ctx.metrics
            .upgrade_operation_nodes_total
            .get_or_create(&OperationNodeStatusLabels {
                operation_id: new_status.operation_id.clone(),
                status: label.to_string(),
            })
            .set(i64::from(count));
    }
}
