use std::sync::Arc;

use alloy_consensus::SignableTransaction;
use alloy_network::{AnyNetwork, EthereumWallet, IntoWallet};
use alloy_primitives::{Address, B256, ChainId, Signature};
use alloy_signer::{Signer, sign_transaction_with_chain_id};
use async_trait::async_trait;
use k256::ecdsa::{RecoveryId, VerifyingKey};
use nexum_apdu_core::Executor;
use nexum_tapcard::CardSession;
use tokio::sync::Mutex;
use tracing::debug;

/// Error binding a card to an Ethereum account
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Card session failed
    #[error(transparent)]
    Card(#[from] nexum_tapcard::Error),

    /// Card holds no wallet key
    #[error("Card has no wallet")]
    NoWallet,

    /// Card answered without a signature
    #[error("Card returned no signature")]
    MissingSignature,

    /// Wallet key or signature is malformed, or the signature is not by the wallet key
    #[error(transparent)]
    Ecdsa(#[from] k256::ecdsa::Error),
}

/// Signs Ethereum transactions with the wallet key of a card
///
/// Every signature needs the card in the field and PIN2 from the session's PIN cache.
#[derive(Debug)]
pub struct CardSigner<E: Executor> {
    inner: Arc<Mutex<CardSession<E>>>,
    public_key: VerifyingKey,
    pub(crate) chain_id: Option<ChainId>,
    pub(crate) address: Address,
}

impl<E: Executor> CardSigner<E> {
    /// Read the card and bind to its wallet key
    pub async fn connect(session: Arc<Mutex<CardSession<E>>>) -> Result<Self, Error> {
        let read = session.lock().await.read()?;
        let key = read.state.wallet_public_key.ok_or(Error::NoWallet)?;
        let public_key = VerifyingKey::from_sec1_bytes(&key.0)?;
        let address = Address::from_public_key(&public_key);
        debug!(%address, card_id = %read.identity.card_id_hex(), "Bound signer to card wallet");

        Ok(Self {
            inner: session,
            public_key,
            chain_id: None,
            address,
        })
    }

    /// Set the chain id used for EIP-155 signatures
    pub const fn with_chain_id(mut self, chain_id: Option<ChainId>) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Wallet public key
    pub const fn public_key(&self) -> &VerifyingKey {
        &self.public_key
    }

    fn sign_digest(&self, session: &mut CardSession<E>, hash: &B256) -> Result<Signature, Error> {
        let pin2 = session.pin2();
        let mut signatures = session.sign_hashes(&pin2, &[hash.to_vec()], None)?;
        let raw = signatures.pop().ok_or(Error::MissingSignature)?;

        let signature = k256::ecdsa::Signature::from_slice(&raw)?;
        let signature = signature.normalize_s().unwrap_or(signature);
        let recovery_id =
            RecoveryId::trial_recovery_from_prehash(&self.public_key, hash.as_slice(), &signature)?;
        Ok((signature, recovery_id).into())
    }
}

#[cfg_attr(not(target_family = "wasm"), async_trait)]
impl<E: Executor> Signer for CardSigner<E> {
    #[inline]
    async fn sign_hash(&self, hash: &B256) -> alloy_signer::Result<Signature> {
        let mut session = self.inner.lock().await;
        self.sign_digest(&mut session, hash)
            .map_err(|e| alloy_signer::Error::Other(Box::new(e)))
    }

    #[inline]
    fn address(&self) -> Address {
        self.address
    }

    #[inline]
    fn chain_id(&self) -> Option<ChainId> {
        self.chain_id
    }

    #[inline]
    fn set_chain_id(&mut self, chain_id: Option<ChainId>) {
        self.chain_id = chain_id;
    }
}

#[cfg_attr(not(target_family = "wasm"), async_trait)]
impl<E: Executor> alloy_network::TxSigner<Signature> for CardSigner<E> {
    fn address(&self) -> Address {
        self.address
    }

    #[inline]
    async fn sign_transaction(
        &self,
        tx: &mut dyn SignableTransaction<Signature>,
    ) -> alloy_signer::Result<Signature> {
        sign_transaction_with_chain_id!(self, tx, self.sign_hash(&tx.signature_hash()).await)
    }
}

impl<E: Executor + 'static> IntoWallet for CardSigner<E> {
    type NetworkWallet = EthereumWallet;

    fn into_wallet(self) -> Self::NetworkWallet {
        EthereumWallet::from(self)
    }
}

impl<E: Executor + 'static> IntoWallet<AnyNetwork> for CardSigner<E> {
    type NetworkWallet = EthereumWallet;

    fn into_wallet(self) -> Self::NetworkWallet {
        EthereumWallet::from(self)
    }
}
