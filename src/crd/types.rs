//! Enum types shared by the `DirectUpdate` status.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Phase of a `DirectUpdate` operation.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub enum UpgradePhase {
    Pending,
    InProgress,
    RequiresAttention,
    Succeeded,
    Failed,
    Cancelled,
}

impl UpgradePhase {
    /// Terminal phases receive no further controller-initiated status writes.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for UpgradePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::InProgress => write!(f, "InProgress"),
            Self::RequiresAttention => write!(f, "RequiresAttention"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Phase of a single node's upgrade.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub enum NodePhase {
    Pending,
    Draining,
    Upgrading,
    Verifying,
    Uncordoning,
    Completed,
    Failed,
}

impl NodePhase {
    /// The node is actively occupying a concurrency/sequencing slot.
    pub const fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Draining | Self::Upgrading | Self::Verifying | Self::Uncordoning
        )
    }

    /// The node will not change state without further controller action.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Parse the canonical `cupcake.ricardomolendijk.com/status` annotation
    /// value written by the node agent. Unrecognized values return `None` so
    /// the caller can leave the existing phase untouched.
    pub fn from_annotation(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "draining" => Some(Self::Draining),
            "upgrading" => Some(Self::Upgrading),
            "verifying" => Some(Self::Verifying),
            "uncordoning" => Some(Self::Uncordoning),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Draining => write!(f, "Draining"),
            Self::Upgrading => write!(f, "Upgrading"),
            Self::Verifying => write!(f, "Verifying"),
            Self::Uncordoning => write!(f, "Uncordoning"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upgrade_phase_display() {
        assert_eq!(UpgradePhase::Pending.to_string(), "Pending");
        assert_eq!(UpgradePhase::InProgress.to_string(), "InProgress");
        assert_eq!(
            UpgradePhase::RequiresAttention.to_string(),
            "RequiresAttention"
        );
    }

    #[test]
    fn test_upgrade_phase_is_terminal() {
        assert!(UpgradePhase::Succeeded.is_terminal());
        assert!(UpgradePhase::Failed.is_terminal());
        assert!(UpgradePhase::Cancelled.is_terminal());
        assert!(!UpgradePhase::Pending.is_terminal());
        assert!(!UpgradePhase::InProgress.is_terminal());
        assert!(!UpgradePhase::RequiresAttention.is_terminal());
    }

    #[test]
    fn test_node_phase_is_in_flight() {
        assert!(NodePhase::Draining.is_in_flight());
        assert!(NodePhase::Upgrading.is_in_flight());
        assert!(NodePhase::Verifying.is_in_flight());
        assert!(NodePhase::Uncordoning.is_in_flight());
        assert!(!NodePhase::Pending.is_in_flight());
        assert!(!NodePhase::Completed.is_in_flight());
        assert!(!NodePhase::Failed.is_in_flight());
    }

    #[test]
    fn test_node_phase_is_terminal() {
        assert!(NodePhase::Completed.is_terminal());
        assert!(NodePhase::Failed.is_terminal());
        assert!(!NodePhase::Pending.is_terminal());
        assert!(!NodePhase::Upgrading.is_terminal());
    }

    #[test]
    fn test_node_phase_from_annotation() {
        assert_eq!(
            NodePhase::from_annotation("upgrading"),
            Some(NodePhase::Upgrading)
        );
        assert_eq!(
            NodePhase::from_annotation("Completed"),
            Some(NodePhase::Completed)
        );
        assert_eq!(NodePhase::from_annotation("bogus"), None);
    }
}
