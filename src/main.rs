//! cupcake-operator - in-place Kubernetes control-plane and worker node
//! upgrade operator.
//!
//! Watches `DirectUpdate`, `ScheduledUpdate`, and `UpdateSchedule` CRD
//! resources and drives node upgrades via an out-of-band node-agent
//! annotation protocol, with etcd backups ahead of each control-plane node.

mod backup;
mod config;
mod controller;
mod crd;
mod dispatcher;
mod error;
mod health;
mod metrics;
mod planner;
mod preflight;
mod state;
mod status;
mod version;

use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use kube::Api;
use kube::runtime::Controller;
use kube::runtime::watcher::Config as WatcherConfig;
use tracing::{error, info};

use controller::Context;
use crd::{DirectUpdate, ScheduledUpdate, UpdateSchedule};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = init_tracing() {
        eprintln!("failed to initialize logging: {e}");
        std::process::exit(1);
    }

    info!("starting cupcake-operator v{VERSION}");

    if let Err(e) = run().await {
        error!("operator failed: {e}");
        std::process::exit(1);
    }
}

/// Initialize tracing subscriber with JSON format for production.
fn init_tracing() -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("failed to initialize log filter: {e}"))?;

    fmt().with_env_filter(filter).json().with_target(true).init();

    Ok(())
}

/// Main operator loop: brings up the health/metrics servers, then runs all
/// three controllers concurrently until one exits.
async fn run() -> Result<()> {
    let operator_config = config::Config::from_env();
    let backup_config = backup::BackupConfig::from_env();

    let client = kube::Client::try_default().await?;
    info!("connected to Kubernetes API server");

    let mut registry = prometheus_client::registry::Registry::default();
    let metrics = Arc::new(metrics::Metrics::new(&mut registry));
    let registry = Arc::new(registry);

    let health_state = health::HealthState::new();
    if operator_config.metrics_enabled {
        let registry = registry.clone();
        let port = operator_config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = metrics::serve(port, registry).await {
                error!("metrics server failed: {e}");
            }
        });
    }

    let health_state_clone = health_state.clone();
    let health_port = operator_config.health_port;
    tokio::spawn(async move {
        if let Err(e) = health::serve(health_port, health_state_clone).await {
            error!("health server failed: {e}");
        }
    });

    let ctx = Arc::new(Context {
        kube_client: client.clone(),
        metrics,
        backup_config,
    });

    health_state.set_ready(true);

    let direct_update_api: Api<DirectUpdate> = Api::all(client.clone());
    let scheduled_update_api: Api<ScheduledUpdate> = Api::all(client.clone());
    let update_schedule_api: Api<UpdateSchedule> = Api::all(client.clone());

    let direct_update_ctx = ctx.clone();
    let direct_update_controller = Controller::new(direct_update_api, WatcherConfig::default())
        .run(
            controller::direct_update::reconcile,
            controller::direct_update::error_policy,
            direct_update_ctx,
        )
        .for_each(|res| async move {
            match res {
                Ok(o) => info!("reconciled DirectUpdate: {:?}", o),
                Err(e) => error!("DirectUpdate reconcile failed: {:?}", e),
            }
        });

    let scheduled_update_ctx = ctx.clone();
    let scheduled_update_controller = Controller::new(scheduled_update_api, WatcherConfig::default())
        .run(
            controller::scheduled_update::reconcile,
            controller::scheduled_update::error_policy,
            scheduled_update_ctx,
        )
        .for_each(|res| async move {
            match res {
                Ok(o) => info!("reconciled ScheduledUpdate: {:?}", o),
                Err(e) => error!("ScheduledUpdate reconcile failed: {:?}", e),
            }
        });

    let update_schedule_ctx = ctx.clone();
    let update_schedule_controller = Controller::new(update_schedule_api, WatcherConfig::default())
        .run(
            controller::update_schedule::reconcile,
            controller::update_schedule::error_policy,
            update_schedule_ctx,
        )
        .for_each(|res| async move {
            match res {
                Ok(o) => info!("reconciled UpdateSchedule: {:?}", o),
                Err(e) => error!("UpdateSchedule reconcile failed: {:?}", e),
            }
        });

    info!("starting controllers for DirectUpdate, ScheduledUpdate, UpdateSchedule");
    tokio::join!(
        direct_update_controller,
        scheduled_update_controller,
        update_schedule_controller,
    );

    Ok(())
}
