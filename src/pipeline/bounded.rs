//! Deadline-bounded execution of capability calls.

use super::capability::CapabilityError;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Why a bounded call produced nothing.
#[derive(Debug, Clone)]
pub(crate) enum BoundedFailure {
    /// The deadline fired first; the task was aborted.
    Elapsed,
    /// The capability returned an error or its task died.
    Failed(CapabilityError),
}

/// Aborts the wrapped task when dropped.
///
/// Ensures that abandoning a stage (overall deadline, caller disconnect)
/// also stops the delegated call instead of leaving it detached.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs `work` as its own task and waits for it until `deadline`.
///
/// The wait ends at the deadline whether or not the task has actually
/// stopped; cancellation is requested and not awaited.
pub(crate) async fn run_until<T, F>(work: F, deadline: Instant) -> Result<T, BoundedFailure>
where
    T: Send + 'static,
    F: Future<Output = Result<T, CapabilityError>> + Send + 'static,
{
    let mut task = AbortOnDrop(tokio::spawn(work));
    match tokio::time::timeout_at(deadline, &mut task.0).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(err))) => Err(BoundedFailure::Failed(err)),
        Ok(Err(join_err)) => {
            warn!(error = %join_err, "Capability task died");
            Err(BoundedFailure::Failed(CapabilityError::new(format!(
                "capability task failed: {}",
                join_err
            ))))
        }
        Err(_) => {
            debug!("Deadline elapsed, abandoning capability task");
            Err(BoundedFailure::Elapsed)
        }
    }
}
