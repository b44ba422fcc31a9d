//! Stage runner
//!
//! Every lifecycle stage goes through `run_stage`: one timeout per attempt, a
//! bounded number of retries on timeout, and the session token checked
//! throughout. Errors other than a timeout are returned as-is without retry.

use std::future::Future;
use std::time::Duration;

use armdeck_transport::SessionToken;
use tracing::{debug, warn};

use crate::error::DeckError;
use crate::state::ConnectionState;

/// Timeout and retry budget for one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePolicy {
    /// Per attempt
    pub timeout: Duration,
    /// Extra attempts after a timeout
    pub retries: u32,
}

impl StagePolicy {
    pub fn new(timeout: Duration, retries: u32) -> Self {
        Self { timeout, retries }
    }

    /// Single attempt
    pub fn once(timeout: Duration) -> Self {
        Self::new(timeout, 0)
    }
}

/// Run `op` under `policy`, cancellable through `token`.
pub async fn run_stage<T, F, Fut>(
    stage: ConnectionState,
    policy: StagePolicy,
    token: &SessionToken,
    mut op: F,
) -> Result<T, DeckError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DeckError>>,
{
    let attempts = policy.retries + 1;
    for attempt in 1..=attempts {
        let outcome = token
            .run(tokio::time::timeout(policy.timeout, op()))
            .await
            .ok_or(DeckError::Cancelled)?;
        match outcome {
            Ok(result) => {
                if result.is_ok() {
                    debug!("{}: done (attempt {}/{})", stage, attempt, attempts);
                }
                return result;
            }
            Err(_) if attempt < attempts => {
                warn!(
                    "{}: timed out after {:?}, retrying ({}/{})",
                    stage, policy.timeout, attempt, attempts
                );
            }
            Err(_) => {}
        }
    }
    Err(DeckError::StageTimeout {
        stage,
        timeout: policy.timeout,
        attempts,
    })
}
