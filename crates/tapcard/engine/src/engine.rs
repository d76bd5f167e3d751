use std::sync::Arc;

use k256::ecdsa::VerifyingKey;
use nexum_tapcard::tasks::{CollaboratorError, RawSignRequest, SignCollaborator};
use nexum_tapcard::{CardIdentity, RawSignature};
use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::chains::{bch, binance, btc, eos, evm, utxo, xrp};
use crate::transaction::{SignedTransaction, UnsignedBody, UnsignedTransaction};
use crate::wallet::{TransferIntent, WalletState};
use crate::{ChainFamily, Error, Result};

/// Builds and assembles transactions for one chain family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Engine {
    family: ChainFamily,
}

impl Engine {
    /// Engine for a chain family
    pub const fn new(family: ChainFamily) -> Self {
        Self { family }
    }

    /// Chain family this engine serves
    pub const fn family(&self) -> ChainFamily {
        self.family
    }

    fn check_family(&self, found: ChainFamily) -> Result<()> {
        if self.family != found {
            return Err(Error::WrongChain {
                expected: self.family,
                found,
            });
        }
        Ok(())
    }

    /// Build the digests to sign for a transfer
    ///
    /// Pure with respect to the wallet state: calling it twice with the same inputs gives the
    /// same transaction and reserves no nonce.
    #[instrument(skip_all, fields(family = %self.family, destination = %intent.destination))]
    pub fn build_unsigned(
        &self,
        wallet: &WalletState,
        intent: &TransferIntent,
    ) -> Result<UnsignedTransaction> {
        self.check_family(wallet.family)?;
        if intent.amount.is_zero() {
            return Err(Error::InvalidAmount("0".to_owned()));
        }
        if intent.token.is_some() && self.family != ChainFamily::Evm {
            return Err(Error::TokensUnsupported(self.family));
        }
        let key = VerifyingKey::from_sec1_bytes(&wallet.public_key.0)?;

        let unsigned = match self.family {
            ChainFamily::Evm => evm::build(wallet, intent, key),
            ChainFamily::Bitcoin => btc::build(wallet, intent, key),
            ChainFamily::BitcoinCash => bch::build(wallet, intent, key),
            ChainFamily::Ripple => xrp::build(wallet, intent, key),
            ChainFamily::Eos => eos::build(wallet, intent, key),
            ChainFamily::Binance => binance::build(wallet, intent, key),
        }?;

        debug!(
            digests = unsigned.digests.len(),
            raw = unsigned.raw.is_some(),
            "Built unsigned transaction"
        );
        Ok(unsigned)
    }

    /// Attach card signatures to an unsigned transaction
    ///
    /// Every signature is checked against the wallet key and the digest it should cover.
    #[instrument(skip_all, fields(family = %self.family, signatures = signatures.len()))]
    pub fn assemble_signed(
        &self,
        unsigned: &UnsignedTransaction,
        signatures: &[RawSignature],
    ) -> Result<SignedTransaction> {
        self.check_family(unsigned.family)?;

        let signed = match &unsigned.body {
            UnsignedBody::Evm(tx) => evm::assemble(unsigned, tx, signatures),
            UnsignedBody::Utxo(tx) => utxo::assemble(unsigned, tx, signatures),
            UnsignedBody::Ripple(payment) => xrp::assemble(unsigned, payment, signatures),
            UnsignedBody::Eos(transfer) => eos::assemble(unsigned, transfer, signatures),
            UnsignedBody::Binance(send) => binance::assemble(unsigned, send, signatures),
        }?;

        debug!(id = %signed.id, bytes = signed.raw.len(), "Assembled signed transaction");
        Ok(signed)
    }

    /// Adapt an unsigned transaction to a one-touch signing task
    pub fn collaborator(&self, unsigned: UnsignedTransaction) -> PendingSignature {
        PendingSignature::new(unsigned)
    }
}

/// Where a one-touch task leaves the card's signatures
#[derive(Debug, Clone, Default)]
pub struct SignatureSlot(Arc<Mutex<Option<Vec<RawSignature>>>>);

impl SignatureSlot {
    /// Take the signatures, leaving the slot empty
    pub fn take(&self) -> Option<Vec<RawSignature>> {
        self.0.lock().take()
    }

    /// Whether signatures are waiting
    pub fn is_filled(&self) -> bool {
        self.0.lock().is_some()
    }

    fn fill(&self, signatures: Vec<RawSignature>) {
        *self.0.lock() = Some(signatures);
    }
}

/// An unsigned transaction handed to a one-touch signing task
///
/// Keep a [`SignatureSlot`] from [`slot`](Self::slot) before moving this into the task; the
/// signatures land there once the card has signed.
#[derive(Debug)]
pub struct PendingSignature {
    unsigned: UnsignedTransaction,
    slot: SignatureSlot,
}

impl PendingSignature {
    /// Wrap an unsigned transaction
    pub fn new(unsigned: UnsignedTransaction) -> Self {
        Self {
            unsigned,
            slot: SignatureSlot::default(),
        }
    }

    /// Slot the signatures are written to
    pub fn slot(&self) -> SignatureSlot {
        self.slot.clone()
    }

    /// The transaction being signed
    pub const fn unsigned(&self) -> &UnsignedTransaction {
        &self.unsigned
    }
}

fn collaborator_error(error: Error) -> CollaboratorError {
    Box::new(error)
}

impl SignCollaborator for PendingSignature {
    fn is_signing_supported(&self, card: &CardIdentity) -> bool {
        match card.signing_methods.preferred() {
            Some(method) if method.is_raw() => self.unsigned.raw.is_some(),
            Some(_) => true,
            None => false,
        }
    }

    fn hashes_to_sign(
        &mut self,
        _card: &CardIdentity,
    ) -> std::result::Result<Vec<Vec<u8>>, CollaboratorError> {
        Ok(self.unsigned.digest_payloads())
    }

    fn raw_data_to_sign(
        &mut self,
        _card: &CardIdentity,
    ) -> std::result::Result<RawSignRequest, CollaboratorError> {
        self.unsigned.raw.clone().ok_or_else(|| {
            collaborator_error(Error::SignatureFormat(
                "chain hash cannot be computed by the card",
            ))
        })
    }

    fn on_sign_completed(
        &mut self,
        _card: &CardIdentity,
        signatures: &[RawSignature],
    ) -> std::result::Result<(), CollaboratorError> {
        if signatures.len() < self.unsigned.signatures_needed() {
            return Err(collaborator_error(Error::SignatureFormat(
                "card returned fewer signatures than requested",
            )));
        }
        self.slot.fill(signatures.to_vec());
        Ok(())
    }
}
