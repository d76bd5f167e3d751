//! One-touch signing: verify, sign and read back in a single card tap

use nexum_apdu_core::Executor;
use tracing::debug;

use super::{TaskError, TaskStep};
use crate::Error;
use crate::error::Classify;
use crate::session::{CancelToken, CardSession, IssuerAuthorization};
use crate::types::{CardIdentity, HashAlgorithm, RawSignature};

/// Error raised by a sign collaborator
pub type CollaboratorError = Box<dyn Classify>;

/// Raw payload the card should hash and sign
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSignRequest {
    /// Payload bytes
    pub payload: Vec<u8>,
    /// Hash the card applies
    pub algorithm: HashAlgorithm,
}

/// Supplies the data for a one-touch signing task and receives the result
///
/// Which of [`hashes_to_sign`](Self::hashes_to_sign) and
/// [`raw_data_to_sign`](Self::raw_data_to_sign) is called depends on the card's signing method.
pub trait SignCollaborator: Send {
    /// Whether this card can sign for the collaborator at all
    fn is_signing_supported(&self, card: &CardIdentity) -> bool;

    /// Digests to sign, for hash signing cards
    fn hashes_to_sign(&mut self, card: &CardIdentity) -> Result<Vec<Vec<u8>>, CollaboratorError>;

    /// Payload to sign, for raw signing cards
    fn raw_data_to_sign(&mut self, card: &CardIdentity)
    -> Result<RawSignRequest, CollaboratorError>;

    /// Issuer authorization over the signed bytes, when the card requires one
    fn issuer_signature_for(
        &self,
        _card: &CardIdentity,
        _payload: &[u8],
    ) -> Option<IssuerAuthorization> {
        None
    }

    /// Signatures are ready; never called for a cancelled task
    fn on_sign_completed(
        &mut self,
        card: &CardIdentity,
        signatures: &[RawSignature],
    ) -> Result<(), CollaboratorError>;
}

/// Sign step of a one-touch task, up to and including the completion callback
pub(super) fn sign_with<E: Executor>(
    session: &mut CardSession<E>,
    collaborator: &mut dyn SignCollaborator,
    cancel: &CancelToken,
    on_signed: impl FnOnce(),
) -> Result<Vec<RawSignature>, TaskError> {
    let card = session
        .identity()
        .cloned()
        .ok_or(TaskError::step(TaskStep::Sign, Error::NoWallet))?;
    if !collaborator.is_signing_supported(&card) {
        return Err(TaskError::step(
            TaskStep::Sign,
            Error::UnsupportedSigningMethod("card cannot sign for this request"),
        ));
    }

    let method = card
        .signing_methods
        .preferred()
        .ok_or(TaskError::step(
            TaskStep::Sign,
            Error::UnsupportedSigningMethod("card reports no signing method"),
        ))?;
    debug!(%method, "Dispatching one-touch sign");

    let pin2 = session.pin2();
    let signatures = if method.is_raw() {
        let request = collaborator
            .raw_data_to_sign(&card)
            .map_err(|e| TaskError::collaborator(TaskStep::Sign, e))?;
        let issuer = collaborator.issuer_signature_for(&card, &request.payload);
        let signature = session
            .sign_raw(&pin2, request.algorithm, &request.payload, issuer.as_ref())
            .map_err(|e| TaskError::step(TaskStep::Sign, e))?;
        vec![signature]
    } else {
        let hashes = collaborator
            .hashes_to_sign(&card)
            .map_err(|e| TaskError::collaborator(TaskStep::Sign, e))?;
        let issuer = collaborator.issuer_signature_for(&card, &hashes.concat());
        session
            .sign_hashes(&pin2, &hashes, issuer.as_ref())
            .map_err(|e| TaskError::step(TaskStep::Sign, e))?
    };
    on_signed();

    if cancel.is_cancelled() {
        return Err(TaskError::step(TaskStep::Complete, Error::Cancelled));
    }
    collaborator
        .on_sign_completed(&card, &signatures)
        .map_err(|e| TaskError::collaborator(TaskStep::Complete, e))?;

    Ok(signatures)
}
