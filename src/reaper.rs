//! Fleet-wide sandbox cleanup
//!
//! Jobs normally tear down their own sandbox, but crashes and abandoned
//! sessions leak them. The reaper sweeps everything the fleet reports as
//! live, independent of any running job.

use crate::sandbox::SandboxProvider;
use crate::Result;
use serde::Serialize;
use tracing::{info, warn};

/// Outcome of one fleet sweep
#[derive(Debug, Clone, Serialize)]
pub struct ReapReport {
    /// Sandboxes successfully killed
    pub killed_count: usize,
    /// Sandboxes that could not be killed
    pub failed_count: usize,
    /// One diagnostic per failed kill
    pub errors: Vec<String>,
    /// Human-readable summary
    pub message: String,
}

/// Kill every live sandbox the fleet knows about.
///
/// Individual kill failures are collected and the sweep continues; only a
/// failure to enumerate sandboxes at all is an error.
pub async fn reap_all(provider: &dyn SandboxProvider) -> Result<ReapReport> {
    let sandboxes = provider.list_sandboxes().await?;

    let mut killed_count = 0;
    let mut errors = Vec::new();

    for sandbox in &sandboxes {
        match provider.kill_sandbox(&sandbox.sandbox_id).await {
            Ok(()) => killed_count += 1,
            Err(e) => {
                warn!(sandbox_id = %sandbox.sandbox_id, error = %e, "failed to kill sandbox");
                errors.push(format!(
                    "Failed to kill sandbox {}: {}",
                    sandbox.sandbox_id, e
                ));
            }
        }
    }

    let failed_count = errors.len();

    let message = if killed_count > 0 && failed_count == 0 {
        format!("Successfully killed {} sandboxes", killed_count)
    } else if killed_count > 0 {
        format!(
            "Killed {} sandboxes, failed to kill {}",
            killed_count, failed_count
        )
    } else if failed_count > 0 {
        format!("Failed to kill {} sandboxes", failed_count)
    } else {
        "No active sandboxes found".to_string()
    };

    info!(killed_count, failed_count, "sandbox sweep finished");

    Ok(ReapReport {
        killed_count,
        failed_count,
        errors,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::sandbox::{SandboxHandle, SandboxInfo};
    use async_trait::async_trait;
    use std::collections::HashSet;

    struct SweepProvider {
        live: Vec<&'static str>,
        unkillable: HashSet<&'static str>,
        fail_listing: bool,
    }

    impl SweepProvider {
        fn with_fleet(live: Vec<&'static str>) -> Self {
            SweepProvider {
                live,
                unkillable: HashSet::new(),
                fail_listing: false,
            }
        }

        fn unkillable(mut self, sandbox_id: &'static str) -> Self {
            self.unkillable.insert(sandbox_id);
            self
        }
    }

    #[async_trait]
    impl SandboxProvider for SweepProvider {
        async fn provision(&self) -> Result<Box<dyn SandboxHandle>> {
            Err(Error::Provisioning("not supported here".to_string()))
        }

        async fn list_sandboxes(&self) -> Result<Vec<SandboxInfo>> {
            if self.fail_listing {
                return Err(Error::Provisioning("List sandboxes failed".to_string()));
            }
            Ok(self
                .live
                .iter()
                .map(|id| SandboxInfo {
                    sandbox_id: id.to_string(),
                })
                .collect())
        }

        async fn kill_sandbox(&self, sandbox_id: &str) -> Result<()> {
            if self.unkillable.contains(sandbox_id) {
                return Err(Error::Provisioning(format!(
                    "Kill sandbox failed (500): {}",
                    sandbox_id
                )));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_partial_failure_is_counted_not_raised() {
        let provider = SweepProvider::with_fleet(vec!["a", "b", "c"]).unkillable("b");

        let report = reap_all(&provider).await.unwrap();

        assert_eq!(report.killed_count, 2);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("b"));
        assert_eq!(report.message, "Killed 2 sandboxes, failed to kill 1");
    }

    #[tokio::test]
    async fn test_clean_sweep_message() {
        let provider = SweepProvider::with_fleet(vec!["a", "b"]);
        let report = reap_all(&provider).await.unwrap();

        assert_eq!(report.killed_count, 2);
        assert_eq!(report.message, "Successfully killed 2 sandboxes");
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_empty_fleet() {
        let provider = SweepProvider::with_fleet(Vec::new());
        let report = reap_all(&provider).await.unwrap();

        assert_eq!(report.killed_count, 0);
        assert_eq!(report.failed_count, 0);
        assert_eq!(report.message, "No active sandboxes found");
    }

    #[tokio::test]
    async fn test_all_kills_fail() {
        let provider = SweepProvider::with_fleet(vec!["a", "b"])
            .unkillable("a")
            .unkillable("b");
        let report = reap_all(&provider).await.unwrap();

        assert_eq!(report.killed_count, 0);
        assert_eq!(report.failed_count, 2);
        assert_eq!(report.message, "Failed to kill 2 sandboxes");
    }

    #[tokio::test]
    async fn test_enumeration_failure_propagates() {
        let provider = SweepProvider {
            live: Vec::new(),
            unkillable: HashSet::new(),
            fail_listing: true,
        };

        assert!(reap_all(&provider).await.is_err());
    }
}
