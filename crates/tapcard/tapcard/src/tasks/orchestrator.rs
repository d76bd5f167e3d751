use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, bounded};
use nexum_apdu_core::Executor;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::listener::SlotObserver;
use super::one_touch::sign_with;
use super::{
    ListenerSlot, PROGRESS_DONE, PROGRESS_PRIMARY, PROGRESS_READ, PROGRESS_VERIFIED,
    TaskError, TaskListener, TaskOutcome, TaskReport, TaskRequest, TaskStep,
};
use crate::Error;
use crate::session::{CancelToken, CardSession};

/// Runs tasks on one card session, one at a time
#[derive(Debug)]
pub struct TaskOrchestrator<E: Executor + 'static> {
    session: Arc<Mutex<CardSession<E>>>,
    busy: Arc<AtomicBool>,
}

impl<E: Executor + 'static> Clone for TaskOrchestrator<E> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            busy: Arc::clone(&self.busy),
        }
    }
}

impl<E: Executor + 'static> TaskOrchestrator<E> {
    /// Take ownership of a session
    pub fn new(session: CardSession<E>) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared session, for direct use between tasks
    pub fn session(&self) -> Arc<Mutex<CardSession<E>>> {
        Arc::clone(&self.session)
    }

    /// Whether a task is running
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Start a task on a worker thread
    ///
    /// Fails with [`TaskError::SessionBusy`] while another task runs.
    pub fn start(
        &self,
        request: TaskRequest,
        listener: Option<Arc<dyn TaskListener>>,
    ) -> Result<TaskHandle, TaskError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(task = request.name(), "Rejected task start, session busy");
            return Err(TaskError::SessionBusy);
        }
        let busy = BusyGuard(Arc::clone(&self.busy));

        let cancel = CancelToken::new();
        let slot = Arc::new(ListenerSlot::new(listener));
        let (tx, outcome) = bounded(1);

        let session = Arc::clone(&self.session);
        let worker_cancel = cancel.clone();
        let worker_slot = Arc::clone(&slot);
        let name = request.name();

        let spawned = thread::Builder::new()
            .name(format!("tapcard-{}", name.to_lowercase()))
            .spawn(move || {
                info!(task = name, "Task started");
                let outcome = {
                    let mut session = session.lock();
                    run_task(&mut session, request, &worker_cancel, &worker_slot)
                };
                drop(busy);

                match &outcome {
                    TaskOutcome::Completed(report) => {
                        info!(task = name, "Task completed");
                        worker_slot.notify(|l| l.on_completed(report));
                    }
                    TaskOutcome::Failed(error) => {
                        warn!(task = name, %error, class = ?error.class(), "Task failed");
                        worker_slot.notify(|l| l.on_failed(error));
                    }
                    TaskOutcome::Cancelled => {
                        info!(task = name, "Task cancelled");
                        worker_slot.notify(|l| l.on_cancelled());
                    }
                }
                // nobody waiting is fine
                let _ = tx.send(outcome);
            });

        // a failed spawn drops the closure, and with it the busy guard
        let thread = spawned.map_err(|e| {
            warn!(error = %e, "Could not spawn task worker");
            TaskError::Aborted
        })?;

        Ok(TaskHandle {
            cancel,
            slot,
            outcome,
            thread: Some(thread),
        })
    }
}

struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle to a running task
#[derive(Debug)]
pub struct TaskHandle {
    cancel: CancelToken,
    slot: Arc<ListenerSlot>,
    outcome: Receiver<TaskOutcome>,
    thread: Option<thread::JoinHandle<()>>,
}

impl TaskHandle {
    /// Ask the task to stop at the next checkpoint or exchange
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stop delivering events to the listener; safe to call repeatedly
    pub fn detach(&self) {
        self.slot.detach();
    }

    /// Outcome if the task already finished
    pub fn try_outcome(&self) -> Option<TaskOutcome> {
        self.outcome.try_recv().ok()
    }

    /// Block until the task finishes
    pub fn wait(mut self) -> TaskOutcome {
        let outcome = self
            .outcome
            .recv()
            .unwrap_or(TaskOutcome::Failed(TaskError::Aborted));
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Task worker panicked");
            }
        }
        outcome
    }
}

struct Progress<'a> {
    slot: &'a ListenerSlot,
    cancel: &'a CancelToken,
}

impl Progress<'_> {
    /// Report a checkpoint, unless the task was cancelled on the way
    fn reach(&self, percent: u8) -> Result<(), TaskError> {
        if self.cancel.is_cancelled() {
            return Err(TaskError::step(TaskStep::Complete, Error::Cancelled));
        }
        debug!(percent, "Task progress");
        self.slot.notify(|l| l.on_progress(percent));
        Ok(())
    }
}

fn run_task<E: Executor>(
    session: &mut CardSession<E>,
    request: TaskRequest,
    cancel: &CancelToken,
    slot: &Arc<ListenerSlot>,
) -> TaskOutcome {
    session.set_cancel_token(cancel.clone());
    let previous = session.observer();
    session.set_observer(Some(Arc::new(SlotObserver(Arc::clone(slot)))));

    let progress = Progress { slot, cancel };
    let result = run_steps(session, request, &progress);

    session.set_observer(previous);
    session.set_cancel_token(CancelToken::new());

    match result {
        Ok(report) => TaskOutcome::Completed(report),
        Err(TaskError::Step {
            source: Error::Cancelled,
            ..
        }) => TaskOutcome::Cancelled,
        Err(e) => TaskOutcome::Failed(e),
    }
}

fn run_steps<E: Executor>(
    session: &mut CardSession<E>,
    request: TaskRequest,
    progress: &Progress<'_>,
) -> Result<TaskReport, TaskError> {
    let at = |step: TaskStep| move |e: Error| TaskError::step(step, e);

    if let TaskRequest::ReadInfo = request {
        session.read().map_err(at(TaskStep::Read))?;
        progress.reach(PROGRESS_READ)?;
        let issuer = session.verify_card().map_err(at(TaskStep::Verify))?;
        progress.reach(PROGRESS_DONE)?;
        return report(session, issuer, Vec::new());
    }

    let issuer = session.verify_card().map_err(at(TaskStep::Verify))?;
    progress.reach(PROGRESS_VERIFIED)?;

    let pin2 = session.pin2();
    let mut signatures = Vec::new();
    match request {
        TaskRequest::CreateWallet { overwrite } => {
            session
                .create_wallet(&pin2, overwrite)
                .map_err(at(TaskStep::CreateWallet))?;
            progress.reach(PROGRESS_PRIMARY)?;
        }
        TaskRequest::Purge => {
            session.purge_wallet(&pin2).map_err(at(TaskStep::Purge))?;
            progress.reach(PROGRESS_PRIMARY)?;
        }
        TaskRequest::SwapPin { new_pin1, new_pin2 } => {
            session
                .set_pin(&pin2, &new_pin1, &new_pin2, true)
                .map_err(at(TaskStep::SwapPin))?;
            progress.reach(PROGRESS_PRIMARY)?;
        }
        TaskRequest::OneTouchSign(mut collaborator) => {
            let mut reached = Ok(());
            signatures = sign_with(session, collaborator.as_mut(), progress.cancel, || {
                reached = progress.reach(PROGRESS_PRIMARY);
            })?;
            reached?;
        }
        TaskRequest::ReadInfo => {}
    }

    session.read().map_err(at(TaskStep::FinalRead))?;
    progress.reach(PROGRESS_DONE)?;
    report(session, issuer, signatures)
}

fn report<E: Executor>(
    session: &CardSession<E>,
    issuer: Option<crate::trust::TrustedIssuer>,
    signatures: Vec<crate::types::RawSignature>,
) -> Result<TaskReport, TaskError> {
    match (session.identity(), session.card_state()) {
        (Some(identity), Some(state)) => Ok(TaskReport {
            identity: identity.clone(),
            state: state.clone(),
            issuer,
            signatures,
        }),
        _ => Err(TaskError::step(TaskStep::FinalRead, Error::NoWallet)),
    }
}
