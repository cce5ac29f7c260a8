//! Reconcilers for the three CRD kinds this operator watches.

pub mod direct_update;
pub mod scheduled_update;
pub mod update_schedule;

use std::sync::Arc;

use crate::backup::BackupConfig;
use crate::metrics::Metrics;

/// Shared context handed to every reconciler.
pub struct Context {
    pub kube_client: kube::Client,
    pub metrics: Arc<Metrics>,
    pub backup_config: BackupConfig,
}
