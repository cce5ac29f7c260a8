//! Custom Resource Definition types for the `cupcake.ricardomolendijk.com/v1` group.

pub mod direct_update;
pub mod scheduled_update;
pub mod types;
pub mod update_schedule;

pub use direct_update::{
    AirGappedConfig, BackupInfoStatus, CanaryConfig, DirectUpdate, DirectUpdateSpec,
    DirectUpdateStatus, NodeStatus, PreflightCheckStatus, PreflightResultsStatus, SummaryStatus,
    UpgradePathStatus,
};
pub use scheduled_update::{ScheduledPhase, ScheduledUpdate, ScheduledUpdateSpec, ScheduledUpdateStatus};
pub use types::{NodePhase, UpgradePhase};
pub use update_schedule::{UpdateSchedule, UpdateScheduleSpec, UpdateScheduleStatus};
