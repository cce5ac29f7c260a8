//! `UpdateSchedule` controller — evaluates a cron expression and creates a
//! `ScheduledUpdate` each time it fires (spec.md §4.9, a supplement to the
//! distilled spec).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use kube::Api;
use kube::api::{Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use tracing::{error, warn};

use super::Context;
use crate::crd::{ScheduledUpdate, ScheduledUpdateStatus, UpdateSchedule, UpdateScheduleStatus};

pub const REQUEUE_SECS: u64 = 300;

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(0, 0).expect("unix epoch is a valid timestamp")
}

pub async fn reconcile(obj: Arc<UpdateSchedule>, ctx: Arc<Context>) -> Result<Action, kube::Error> {
    let name = obj.metadata.name.clone().unwrap_or_else(|| "unknown".to_string());
    let api: Api<UpdateSchedule> = Api::all(ctx.kube_client.clone());

    let mut new_status = obj.status.clone().unwrap_or_default();

    if obj.spec.suspended {
        new_status.next_run = None;
        patch_status(&api, &name, &new_status).await;
        return Ok(Action::requeue(Duration::from_secs(REQUEUE_SECS)));
    }

    // The upstream crate's cron dialect is seconds-first; the spec's schedule
    // field is a standard five-field expression, so a literal "0" seconds
    // field is prepended.
    let schedule = match Schedule::from_str(&format!("0 {}", obj.spec.schedule)) {
        Ok(s) => s,
        Err(e) => {
            warn!("invalid cron expression for {name}: {e}");
            patch_status(&api, &name, &new_status).await;
            return Ok(Action::requeue(Duration::from_secs(REQUEUE_SECS)));
        }
    };

    let now = Utc::now();
    let last = new_status.last_run.unwrap_or_else(epoch);
    let due = schedule.after(&last).next().is_some_and(|next| next <= now);

    if due {
        let su_name = format!("{name}-{}", now.format("%Y%m%d%H%M%S"));
        let su_api: Api<ScheduledUpdate> = Api::all(ctx.kube_client.clone());

        let su = ScheduledUpdate::new(
            &su_name,
            crate::crd::ScheduledUpdateSpec {
                schedule_at: now,
                direct_update_template: obj.spec.direct_update_template.clone(),
            },
        );

        match su_api.create(&PostParams::default(), &su).await {
            Ok(_) | Err(kube::Error::Api(_)) => {
                new_status.last_run = Some(now);
                new_status.last_scheduled_update_name = Some(su_name);
            }
            Err(e) => {
                error!("failed to create ScheduledUpdate for {name}: {e}");
            }
        }
    }

    new_status.next_run = schedule.after(&now).next();
    patch_status(&api, &name, &new_status).await;

    Ok(Action::requeue(Duration::from_secs(REQUEUE_SECS)))
}

async fn patch_status(api: &Api<UpdateSchedule>, name: &str, status: &UpdateScheduleStatus) {
    let patch = serde_json::json!({ "status": status });
    if let Err(e) = api
        .patch_status(name, &PatchParams::apply("cupcake-operator"), &Patch::Merge(&patch))
        .await
    {
        warn!("failed to patch UpdateSchedule status for {name}: {e}");
    }
}

pub fn error_policy(obj: Arc<UpdateSchedule>, err: &kube::Error, _ctx: Arc<Context>) -> Action {
    let name = obj.metadata.name.as_deref().unwrap_or("unknown");
    error!("controller error for {name}: {err}");
    Action::requeue(Duration::from_secs(30))
}
