//! Command handlers

mod card;
mod send;

pub use card::*;
pub use send::*;

use std::sync::Arc;
use std::time::Duration;

use nexum_apdu_core::Executor;
use nexum_tapcard::{TaskOrchestrator, TaskOutcome, TaskReport, TaskRequest};
use tracing::debug;

use crate::utils::listener::ConsoleListener;

const TASK_POLL: Duration = Duration::from_millis(50);

/// Run a task to its end, cancelling it on Ctrl-C
pub async fn run_task<E: Executor + 'static>(
    orchestrator: &TaskOrchestrator<E>,
    request: TaskRequest,
) -> eyre::Result<TaskReport> {
    let handle = orchestrator.start(request, Some(Arc::new(ConsoleListener)))?;
    let mut cancelled = false;

    let outcome = loop {
        if let Some(outcome) = handle.try_outcome() {
            break outcome;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c(), if !cancelled => {
                debug!("Interrupted, cancelling task");
                handle.cancel();
                cancelled = true;
            }
            _ = tokio::time::sleep(TASK_POLL) => {}
        }
    };

    match outcome {
        TaskOutcome::Completed(report) => Ok(report),
        TaskOutcome::Failed(error) => {
            let class = error.class();
            Err(eyre::Report::new(error).wrap_err(format!("task failed ({class:?})")))
        }
        TaskOutcome::Cancelled => eyre::bail!("cancelled"),
    }
}
