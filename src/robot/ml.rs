//! The ML inference worker is an external collaborator: this crate only
//! defines the interface it is enqueued through and forwards its result
//! back onto a robot's connection.

use crate::error::{AppError, ExternalError, Result};
use async_trait::async_trait;

#[async_trait]
pub trait MlWorker: Send + Sync {
    /// Submit a decoded frame for inference under the given team and model
    /// index. The worker is responsible for eventually calling back with a
    /// `prediction` reply on the same team's connection; this call only
    /// reports whether the submission itself was accepted.
    async fn enqueue(&self, team_name: &str, model_index: i64, frame: Vec<u8>) -> Result<()>;
}

/// Used until a real ML worker is wired in; every submission fails as an
/// external-collaborator error, per the spec's error-kind table.
pub struct UnconfiguredMlWorker;

#[async_trait]
impl MlWorker for UnconfiguredMlWorker {
    async fn enqueue(&self, team_name: &str, _model_index: i64, _frame: Vec<u8>) -> Result<()> {
        Err(AppError::External(ExternalError::MlEnqueueFailed {
            details: format!("no ml worker configured for team {team_name}"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_worker_always_fails_enqueue() {
        let worker = UnconfiguredMlWorker;
        let err = worker.enqueue("Alpha", 0, vec![1, 2, 3]).await.unwrap_err();
        assert_eq!(err.severity(), crate::error::ErrorSeverity::Warning);
    }
}
