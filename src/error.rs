//! Typed error kinds for the cupcake operator, matching the propagation
//! policy in spec.md §7.

use thiserror::Error;

/// Errors that can occur while reconciling `DirectUpdate` (and sibling)
/// resources.
#[derive(Error, Debug)]
pub enum CupcakeError {
    /// Bad spec: permanent, never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Cluster API error while listing/classifying nodes.
    #[error("planning failed: {0}")]
    Planning(#[source] kube::Error),

    /// The preflight gate did not pass.
    #[error("preflight checks failed: {0}")]
    Preflight(String),

    /// Backup ConfigMap creation or status read failed.
    #[error("backup operation failed: {0}")]
    Backup(#[source] kube::Error),

    /// Node annotation hand-off failed.
    #[error("node annotation failed: {0}")]
    Annotation(#[source] kube::Error),

    /// Any other Kubernetes API error encountered during reconciliation.
    #[error("kubernetes API error: {0}")]
    KubernetesApi(#[from] kube::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CupcakeError {
    /// Transient errors are retried on the next 30-second tick; permanent
    /// errors surface as a terminal-style status write (spec.md §7).
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Planning(_) | Self::Backup(_) | Self::Annotation(_) | Self::KubernetesApi(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_kube_error() -> kube::Error {
        kube::Error::LinesCodecMaxLineLengthExceeded
    }

    #[test]
    fn test_validation_is_not_transient() {
        let err = CupcakeError::Validation("bad targetVersion".to_string());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_preflight_is_not_transient() {
        let err = CupcakeError::Preflight("node not ready".to_string());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_planning_is_transient() {
        let err = CupcakeError::Planning(fake_kube_error());
        assert!(err.is_transient());
    }

    #[test]
    fn test_backup_is_transient() {
        let err = CupcakeError::Backup(fake_kube_error());
        assert!(err.is_transient());
    }

    #[test]
    fn test_annotation_is_transient() {
        let err = CupcakeError::Annotation(fake_kube_error());
        assert!(err.is_transient());
    }

    #[test]
    fn test_display_messages() {
        let err = CupcakeError::Validation("targetVersion is required".to_string());
        assert_eq!(err.to_string(), "validation failed: targetVersion is required");
    }
}
