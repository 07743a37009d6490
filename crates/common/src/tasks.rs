//! Wait-all, first-error task groups
//!
//! Every concurrent phase (bootnode start, a stage category, a stage's
//! per-group updates) spawns its operations into a [`TaskGroup`] and waits
//! for all of them. The first error is reported; later ones are logged.
//! Dropping an unfinished group aborts whatever is still running.

use std::future::Future;

use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;

pub(crate) struct TaskGroup<E> {
    tasks: JoinSet<Result<(), E>>,
}

impl<E> TaskGroup<E>
where
    E: std::fmt::Display + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
        }
    }

    pub fn spawn<F>(&mut self, f: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
    {
        let span = tracing::Span::current();
        self.tasks.spawn(f.instrument(span));
    }

    /// Wait for every task, returning the first failure observed
    pub async fn wait(mut self, on_panic: impl Fn(JoinError) -> E) -> Result<(), E> {
        let mut first = None;
        while let Some(result) = self.tasks.join_next().await {
            let err = match result {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(e) if e.is_cancelled() => {
                    tracing::trace!("task cancelled: {}", e);
                    continue;
                }
                Err(e) => on_panic(e),
            };
            if first.is_none() {
                first = Some(err);
            } else {
                tracing::debug!("discarding error from sibling task: {}", err);
            }
        }
        first.map_or(Ok(()), Err)
    }
}
