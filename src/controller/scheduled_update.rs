//! `ScheduledUpdate` controller — fires a `DirectUpdate` once `scheduleAt`
//! has passed (spec.md §4.8, a supplement to the distilled spec).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kube::Api;
use kube::api::{Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use tracing::{error, warn};

use super::Context;
use crate::crd::{ScheduledPhase, ScheduledUpdate, ScheduledUpdateStatus};
use crate::crd::DirectUpdate;

/// Poll period: coarse, since a `ScheduledUpdate` only needs to notice it
/// crossed its instant, not react within seconds of it.
pub const REQUEUE_SECS: u64 = 60;

pub async fn reconcile(obj: Arc<ScheduledUpdate>, ctx: Arc<Context>) -> Result<Action, kube::Error> {
    let name = obj.metadata.name.clone().unwrap_or_else(|| "unknown".to_string());
    let api: Api<ScheduledUpdate> = Api::all(ctx.kube_client.clone());

    let mut new_status = obj.status.clone().unwrap_or_else(|| ScheduledUpdateStatus {
        phase: ScheduledPhase::Scheduled,
        scheduled_for: obj.spec.schedule_at,
        executed_at: None,
        direct_update_name: None,
        message: "waiting for scheduled time".to_string(),
    });

    if new_status.phase == ScheduledPhase::Done {
        return Ok(Action::await_change());
    }

    if new_status.phase == ScheduledPhase::Scheduled && Utc::now() >= obj.spec.schedule_at {
        let du_name = format!("{name}-run");
        let du_api: Api<DirectUpdate> = Api::all(ctx.kube_client.clone());

        let du = DirectUpdate::new(&du_name, obj.spec.direct_update_template.clone());

        match du_api.create(&PostParams::default(), &du).await {
            Ok(_) => {
                new_status.phase = ScheduledPhase::Done;
                new_status.executed_at = Some(Utc::now());
                new_status.direct_update_name = Some(du_name);
                new_status.message = "DirectUpdate created".to_string();
            }
            Err(kube::Error::Api(e)) if e.code == 409 => {
                // Already created by a previous reconcile that crashed before
                // patching status; treat as success.
                new_status.phase = ScheduledPhase::Done;
                new_status.executed_at = Some(Utc::now());
                new_status.direct_update_name = Some(du_name);
                new_status.message = "DirectUpdate already existed".to_string();
            }
            Err(e) => {
                error!("failed to create DirectUpdate for {name}: {e}");
                new_status.message = format!("failed to create DirectUpdate: {e}");
                let patch = serde_json::json!({ "status": new_status });
                let _ = api
                    .patch_status(&name, &PatchParams::apply("cupcake-operator"), &Patch::Merge(&patch))
                    .await;
                return Ok(Action::requeue(Duration::from_secs(30)));
            }
        }
    }

    let patch = serde_json::json!({ "status": new_status });
    if let Err(e) = api
        .patch_status(&name, &PatchParams::apply("cupcake-operator"), &Patch::Merge(&patch))
        .await
    {
        warn!("failed to patch ScheduledUpdate status for {name}: {e}");
        return Ok(Action::requeue(Duration::from_secs(10)));
    }

    if new_status.phase == ScheduledPhase::Done {
        Ok(Action::await_change())
    } else {
        Ok(Action::requeue(Duration::from_secs(REQUEUE_SECS)))
    }
}

pub fn error_policy(obj: Arc<ScheduledUpdate>, err: &kube::Error, _ctx: Arc<Context>) -> Action {
    let name = obj.metadata.name.as_deref().unwrap_or("unknown");
    error!("controller error for {name}: {err}");
    Action::requeue(Duration::from_secs(30))
}
