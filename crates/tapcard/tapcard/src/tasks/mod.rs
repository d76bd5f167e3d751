//! Multi-step card tasks
//!
//! A task strings session operations together, reports integer progress at fixed checkpoints
//! and ends in exactly one [`TaskOutcome`]. Only one task runs per session at a time.

mod listener;
mod one_touch;
mod orchestrator;

pub use listener::{ListenerSlot, TaskListener};
pub use one_touch::{CollaboratorError, RawSignRequest, SignCollaborator};
pub use orchestrator::{TaskHandle, TaskOrchestrator};

use std::fmt;

use crate::error::{Classify, ErrorClass};
use crate::trust::TrustedIssuer;
use crate::types::{CardIdentity, CardState, RawSignature};

/// Progress after the verification step
pub const PROGRESS_VERIFIED: u8 = 20;
/// Progress after the primary operation
pub const PROGRESS_PRIMARY: u8 = 60;
/// Progress when a task is done
pub const PROGRESS_DONE: u8 = 100;
/// Progress after the read step of [`TaskRequest::ReadInfo`]
pub const PROGRESS_READ: u8 = 50;

/// A task to run on a card
pub enum TaskRequest {
    /// Read and verify the card
    ReadInfo,
    /// Create the wallet, purging an existing one when `overwrite` is set
    CreateWallet {
        /// Replace an existing wallet
        overwrite: bool,
    },
    /// Erase the wallet
    Purge,
    /// Change both PINs
    SwapPin {
        /// New PIN1
        new_pin1: String,
        /// New PIN2
        new_pin2: String,
    },
    /// Sign whatever the collaborator asks for, in one tap
    OneTouchSign(Box<dyn SignCollaborator>),
}

impl TaskRequest {
    /// Short task name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ReadInfo => "ReadInfo",
            Self::CreateWallet { .. } => "CreateWallet",
            Self::Purge => "Purge",
            Self::SwapPin { .. } => "SwapPin",
            Self::OneTouchSign(_) => "OneTouchSign",
        }
    }
}

impl fmt::Debug for TaskRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateWallet { overwrite } => f
                .debug_struct("CreateWallet")
                .field("overwrite", overwrite)
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}

/// Step a task failed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStep {
    /// Reading the card
    Read,
    /// Card challenge and issuer check
    Verify,
    /// Wallet creation
    CreateWallet,
    /// Wallet purge
    Purge,
    /// PIN change
    SwapPin,
    /// Signing
    Sign,
    /// Handing the signatures to the collaborator
    Complete,
    /// Read after the primary operation
    FinalRead,
}

impl fmt::Display for TaskStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "read",
            Self::Verify => "verify",
            Self::CreateWallet => "create wallet",
            Self::Purge => "purge",
            Self::SwapPin => "swap pin",
            Self::Sign => "sign",
            Self::Complete => "sign completion",
            Self::FinalRead => "final read",
        };
        f.write_str(name)
    }
}

/// Why a task failed
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Another task is running on the same session
    #[error("Session busy with another task")]
    SessionBusy,

    /// A session operation failed
    #[error("{step} failed: {source}")]
    Step {
        /// Failing step
        step: TaskStep,
        /// Session error, unchanged
        #[source]
        source: crate::Error,
    },

    /// The sign collaborator failed
    #[error("{step} failed: {source}")]
    Collaborator {
        /// Failing step
        step: TaskStep,
        /// Class reported by the collaborator
        class: ErrorClass,
        /// Collaborator error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The worker stopped without reporting an outcome
    #[error("Task worker stopped unexpectedly")]
    Aborted,
}

impl TaskError {
    pub(crate) const fn step(step: TaskStep, source: crate::Error) -> Self {
        Self::Step { step, source }
    }

    pub(crate) fn collaborator(step: TaskStep, source: CollaboratorError) -> Self {
        Self::Collaborator {
            step,
            class: source.class(),
            source,
        }
    }

    /// Step the error happened at
    pub const fn failed_step(&self) -> Option<TaskStep> {
        match self {
            Self::Step { step, .. } | Self::Collaborator { step, .. } => Some(*step),
            Self::SessionBusy | Self::Aborted => None,
        }
    }

    /// Recovery class
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::SessionBusy => ErrorClass::SessionBusy,
            Self::Step { source, .. } => source.class(),
            Self::Collaborator { class, .. } => *class,
            Self::Aborted => ErrorClass::Card,
        }
    }
}

impl Classify for TaskError {
    fn class(&self) -> ErrorClass {
        Self::class(self)
    }
}

/// What a finished task leaves behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    /// Identity of the card the task ran on
    pub identity: CardIdentity,
    /// Card state after the final read
    pub state: CardState,
    /// Issuer the card was verified against, if any
    pub issuer: Option<TrustedIssuer>,
    /// Signatures produced by a signing task
    pub signatures: Vec<RawSignature>,
}

/// Terminal result of a task
#[derive(Debug)]
pub enum TaskOutcome {
    /// Task finished
    Completed(TaskReport),
    /// Task failed
    Failed(TaskError),
    /// Task was cancelled; nothing after the cancellation point ran
    Cancelled,
}

impl TaskOutcome {
    /// Report of a completed task
    pub fn completed(self) -> Option<TaskReport> {
        match self {
            Self::Completed(report) => Some(report),
            _ => None,
        }
    }

    /// Whether the task was cancelled
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
