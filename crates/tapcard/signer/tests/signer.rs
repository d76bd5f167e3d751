#[path = "../../tapcard/tests/common/mod.rs"]
mod common;

use std::sync::Arc;

use alloy_consensus::{SignableTransaction, TxLegacy};
use alloy_network::TxSigner;
use alloy_primitives::{Address, B256, TxKind, U256, address};
use alloy_signer::Signer;
use common::{CardEmulator, session};
use nexum_tapcard::PinCache;
use nexum_tapcard::constants::ins;
use nexum_tapcard_signer::{CardSigner, Error};
use tokio::sync::Mutex;

#[tokio::test]
async fn test_signer_binds_to_card_wallet() {
    let card = CardEmulator::new().with_wallet();
    let session = Arc::new(Mutex::new(session(&card, Arc::new(PinCache::new()))));
    let signer = CardSigner::connect(session).await.unwrap();

    let expected = Address::from_public_key(&card.wallet_verifying_key().unwrap());
    assert_eq!(Signer::address(&signer), expected);
    assert_eq!(signer.public_key(), &card.wallet_verifying_key().unwrap());

    let hash = B256::repeat_byte(0x42);
    let signature = signer.sign_hash(&hash).await.unwrap();
    assert_eq!(signature.recover_address_from_prehash(&hash).unwrap(), expected);
    assert_eq!(card.instructions().last(), Some(&ins::SIGN));
}

#[tokio::test]
async fn test_signer_signs_legacy_transaction_with_chain_id() {
    let card = CardEmulator::new().with_wallet().with_pins("000000", "4321");
    let pins = Arc::new(PinCache::new().with_pin2("4321"));
    let session = Arc::new(Mutex::new(session(&card, pins)));
    let signer = CardSigner::connect(session).await.unwrap().with_chain_id(Some(5));

    let mut tx = TxLegacy {
        chain_id: None,
        nonce: 3,
        gas_price: 1_000_000_000,
        gas_limit: 21_000,
        to: TxKind::Call(address!("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed")),
        value: U256::from(1_000u64),
        input: Default::default(),
    };
    let signature = signer.sign_transaction(&mut tx).await.unwrap();

    assert_eq!(tx.chain_id, Some(5));
    let recovered = signature
        .recover_address_from_prehash(&tx.signature_hash())
        .unwrap();
    assert_eq!(recovered, TxSigner::address(&signer));
}

#[tokio::test]
async fn test_signer_needs_a_wallet() {
    let card = CardEmulator::new();
    let session = Arc::new(Mutex::new(session(&card, Arc::new(PinCache::new()))));
    assert!(matches!(
        CardSigner::connect(session).await,
        Err(Error::NoWallet)
    ));
}
