mod common;

use std::sync::Arc;

use common::{CardEmulator, session};
use crossbeam_channel::{Receiver, Sender, bounded};
use nexum_tapcard::constants::ins;
use nexum_tapcard::tasks::{CollaboratorError, RawSignRequest, TaskStep};
use nexum_tapcard::{
    CardIdentity, CardStatus, Classify, Error, ErrorClass, PinCache, RawSignature,
    SignCollaborator, TaskError, TaskListener, TaskOrchestrator, TaskOutcome, TaskReport,
    TaskRequest,
};
use parking_lot::Mutex;

#[derive(Default)]
struct Recorder {
    progress: Mutex<Vec<u8>>,
    finished: Mutex<Vec<&'static str>>,
}

impl TaskListener for Recorder {
    fn on_progress(&self, percent: u8) {
        self.progress.lock().push(percent);
    }

    fn on_completed(&self, _report: &TaskReport) {
        self.finished.lock().push("completed");
    }

    fn on_failed(&self, _error: &TaskError) {
        self.finished.lock().push("failed");
    }

    fn on_cancelled(&self) {
        self.finished.lock().push("cancelled");
    }
}

#[derive(Debug, thiserror::Error)]
#[error("not enough funds")]
struct NotEnoughFunds;

impl Classify for NotEnoughFunds {
    fn class(&self) -> ErrorClass {
        ErrorClass::InsufficientFunds
    }
}

/// Collaborator that signs fixed digests, optionally waiting for a go signal first
struct Digests {
    hashes: Vec<Vec<u8>>,
    gate: Option<Receiver<()>>,
    fail: bool,
    completed: Arc<Mutex<Option<Vec<RawSignature>>>>,
}

impl Digests {
    fn new(hashes: Vec<Vec<u8>>) -> Self {
        Self {
            hashes,
            gate: None,
            fail: false,
            completed: Arc::default(),
        }
    }

    fn gated(mut self) -> (Self, Sender<()>) {
        let (tx, rx) = bounded(1);
        self.gate = Some(rx);
        (self, tx)
    }
}

impl SignCollaborator for Digests {
    fn is_signing_supported(&self, card: &CardIdentity) -> bool {
        !card.signing_methods.is_empty()
    }

    fn hashes_to_sign(&mut self, _card: &CardIdentity) -> Result<Vec<Vec<u8>>, CollaboratorError> {
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        if self.fail {
            return Err(Box::new(NotEnoughFunds));
        }
        Ok(self.hashes.clone())
    }

    fn raw_data_to_sign(&mut self, _card: &CardIdentity) -> Result<RawSignRequest, CollaboratorError> {
        Err(Box::new(NotEnoughFunds))
    }

    fn on_sign_completed(
        &mut self,
        _card: &CardIdentity,
        signatures: &[RawSignature],
    ) -> Result<(), CollaboratorError> {
        *self.completed.lock() = Some(signatures.to_vec());
        Ok(())
    }
}

#[test]
fn test_create_wallet_reports_fixed_checkpoints() {
    let card = CardEmulator::new();
    let orchestrator = TaskOrchestrator::new(session(&card, Arc::new(PinCache::new())));
    let recorder = Arc::new(Recorder::default());

    let handle = orchestrator
        .start(TaskRequest::CreateWallet { overwrite: false }, Some(recorder.clone()))
        .unwrap();
    let report = handle.wait().completed().unwrap();

    assert_eq!(report.state.status, CardStatus::Loaded);
    assert!(report.state.wallet_public_key.is_some());
    assert_eq!(*recorder.progress.lock(), vec![20, 60, 100]);
    assert_eq!(*recorder.finished.lock(), vec!["completed"]);
    assert_eq!(
        card.instructions(),
        vec![ins::READ, ins::VERIFY_CARD, ins::READ, ins::CREATE_WALLET, ins::READ]
    );
    assert!(!orchestrator.is_busy());
}

#[test]
fn test_read_info_reports_half_way_after_read() {
    let card = CardEmulator::new();
    let orchestrator = TaskOrchestrator::new(session(&card, Arc::new(PinCache::new())));
    let recorder = Arc::new(Recorder::default());

    let report = orchestrator
        .start(TaskRequest::ReadInfo, Some(recorder.clone()))
        .unwrap()
        .wait()
        .completed()
        .unwrap();

    assert_eq!(report.identity.manufacturer, "TANGEM");
    assert_eq!(*recorder.progress.lock(), vec![50, 100]);
}

#[test]
fn test_failed_step_stops_progress_and_keeps_the_error() {
    let card = CardEmulator::new().with_wallet().with_pins("000000", "321");
    let pins = Arc::new(PinCache::new().with_pin2("999"));
    let orchestrator = TaskOrchestrator::new(session(&card, pins));
    let recorder = Arc::new(Recorder::default());

    let outcome = orchestrator
        .start(TaskRequest::Purge, Some(recorder.clone()))
        .unwrap()
        .wait();

    let TaskOutcome::Failed(error) = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert_eq!(error.failed_step(), Some(TaskStep::Purge));
    assert_eq!(error.class(), ErrorClass::Authentication);
    assert!(matches!(
        error,
        TaskError::Step {
            source: Error::InvalidPin,
            ..
        }
    ));
    assert_eq!(*recorder.progress.lock(), vec![20]);
    assert_eq!(*recorder.finished.lock(), vec!["failed"]);
}

#[test]
fn test_one_touch_sign_hands_signatures_to_the_collaborator() {
    let card = CardEmulator::new().with_wallet();
    let orchestrator = TaskOrchestrator::new(session(&card, Arc::new(PinCache::new())));
    let recorder = Arc::new(Recorder::default());

    let collaborator = Digests::new(vec![vec![0xAB; 32], vec![0xCD; 32]]);
    let completed = collaborator.completed.clone();

    let report = orchestrator
        .start(
            TaskRequest::OneTouchSign(Box::new(collaborator)),
            Some(recorder.clone()),
        )
        .unwrap()
        .wait()
        .completed()
        .unwrap();

    let signatures = completed.lock().clone().unwrap();
    assert_eq!(signatures, report.signatures);
    assert!(card.verify(&[0xAB; 32], &signatures[0]));
    assert!(card.verify(&[0xCD; 32], &signatures[1]));
    assert_eq!(*recorder.progress.lock(), vec![20, 60, 100]);
}

#[test]
fn test_collaborator_errors_keep_their_class() {
    let card = CardEmulator::new().with_wallet();
    let orchestrator = TaskOrchestrator::new(session(&card, Arc::new(PinCache::new())));

    let mut collaborator = Digests::new(vec![vec![0xAB; 32]]);
    collaborator.fail = true;

    let outcome = orchestrator
        .start(TaskRequest::OneTouchSign(Box::new(collaborator)), None)
        .unwrap()
        .wait();
    let TaskOutcome::Failed(error) = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert_eq!(error.class(), ErrorClass::InsufficientFunds);
    assert!(!card.instructions().contains(&ins::SIGN));
}

#[test]
fn test_second_task_while_running_is_session_busy() {
    let card = CardEmulator::new().with_wallet();
    let orchestrator = TaskOrchestrator::new(session(&card, Arc::new(PinCache::new())));

    let (collaborator, go) = Digests::new(vec![vec![0x01; 32]]).gated();
    let running = orchestrator
        .start(TaskRequest::OneTouchSign(Box::new(collaborator)), None)
        .unwrap();

    let err = orchestrator.start(TaskRequest::ReadInfo, None).unwrap_err();
    assert!(matches!(err, TaskError::SessionBusy));
    assert_eq!(err.class(), ErrorClass::SessionBusy);

    go.send(()).unwrap();
    assert!(running.wait().completed().is_some());

    // the slot is free again once the outcome is delivered
    assert!(
        orchestrator
            .start(TaskRequest::ReadInfo, None)
            .unwrap()
            .wait()
            .completed()
            .is_some()
    );
}

#[test]
fn test_cancelled_sign_never_completes() {
    let card = CardEmulator::new().with_wallet();
    let orchestrator = TaskOrchestrator::new(session(&card, Arc::new(PinCache::new())));
    let recorder = Arc::new(Recorder::default());

    let (collaborator, go) = Digests::new(vec![vec![0x01; 32]]).gated();
    let completed = collaborator.completed.clone();
    let handle = orchestrator
        .start(
            TaskRequest::OneTouchSign(Box::new(collaborator)),
            Some(recorder.clone()),
        )
        .unwrap();

    handle.cancel();
    go.send(()).unwrap();

    assert!(handle.wait().is_cancelled());
    assert!(completed.lock().is_none());
    assert!(!card.instructions().contains(&ins::SIGN));
    assert_eq!(*recorder.finished.lock(), vec!["cancelled"]);
    assert!(!recorder.progress.lock().contains(&60));
}

#[test]
fn test_detached_listener_hears_nothing_more() {
    let card = CardEmulator::new().with_wallet();
    let orchestrator = TaskOrchestrator::new(session(&card, Arc::new(PinCache::new())));
    let recorder = Arc::new(Recorder::default());

    let (collaborator, go) = Digests::new(vec![vec![0x01; 32]]).gated();
    let handle = orchestrator
        .start(
            TaskRequest::OneTouchSign(Box::new(collaborator)),
            Some(recorder.clone()),
        )
        .unwrap();

    handle.detach();
    handle.detach();
    go.send(()).unwrap();

    assert!(handle.wait().completed().is_some());
    assert!(recorder.finished.lock().is_empty());
    assert!(!recorder.progress.lock().contains(&100));
}
