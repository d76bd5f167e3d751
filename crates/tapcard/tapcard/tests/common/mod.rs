//! Scripted card used by the integration tests
//!
//! The emulator speaks the same record protocol as a real card and signs with an in-memory
//! k256 key. State sits behind a shared handle so tests can inspect it after the transport was
//! moved into a session.

#![allow(dead_code, unreachable_pub)]

use std::sync::Arc;

use k256::ecdsa::signature::Signer;
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use nexum_apdu_core::{
    ApduCommand, Bytes, CardExecutor, CardTransport, Command, Response, TlvList, TransportError,
};
use nexum_tapcard::constants::{ins, sw, tags};
use nexum_tapcard::{CardSession, IssuerTrust, PinCache, pin_hash};
use parking_lot::Mutex;
use sha2::{Digest, Sha256, Sha512};

pub const CARD_ID: [u8; 8] = [0xCB, 0x22, 0x00, 0x00, 0x00, 0x00, 0x12, 0x34];

#[derive(Debug)]
pub struct EmulatorState {
    pub card_id: Vec<u8>,
    pub card_key: SigningKey,
    pub wallet_key: Option<SigningKey>,
    pub status: u8,
    pub pin1: [u8; 32],
    pub pin2: [u8; 32],
    pub signing_method: u8,
    pub issuer_data_key: Option<Vec<u8>>,
    pub reusable: bool,
    pub delays_ms: Vec<u32>,
    delay_cursor: usize,
    pub remaining_signatures: u32,
    pub signed_hashes: u32,
    pub truncate_signatures: bool,
    pub instructions: Vec<u8>,
    pub last_sign_records: Option<TlvList>,
}

/// Card emulator, cheap to clone
#[derive(Debug, Clone)]
pub struct CardEmulator {
    state: Arc<Mutex<EmulatorState>>,
}

impl Default for CardEmulator {
    fn default() -> Self {
        Self::new()
    }
}

impl CardEmulator {
    /// Personalized card without a wallet, factory PINs, hash signing
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(EmulatorState {
                card_id: CARD_ID.to_vec(),
                card_key: SigningKey::random(&mut rand_v8::thread_rng()),
                wallet_key: None,
                status: 1,
                pin1: pin_hash("000000"),
                pin2: pin_hash("000"),
                signing_method: 0,
                issuer_data_key: None,
                reusable: true,
                delays_ms: Vec::new(),
                delay_cursor: 0,
                remaining_signatures: 1000,
                signed_hashes: 0,
                truncate_signatures: false,
                instructions: Vec::new(),
                last_sign_records: None,
            })),
        }
    }

    pub fn with_wallet(self) -> Self {
        {
            let mut state = self.state.lock();
            state.wallet_key = Some(SigningKey::random(&mut rand_v8::thread_rng()));
            state.status = 2;
        }
        self
    }

    pub fn with_pins(self, pin1: &str, pin2: &str) -> Self {
        {
            let mut state = self.state.lock();
            state.pin1 = pin_hash(pin1);
            state.pin2 = pin_hash(pin2);
        }
        self
    }

    pub fn with_signing_method(self, method: u8) -> Self {
        self.state.lock().signing_method = method;
        self
    }

    pub fn with_issuer_data_key(self, key: Vec<u8>) -> Self {
        self.state.lock().issuer_data_key = Some(key);
        self
    }

    /// Delay reports sent before every PIN2 protected command completes
    pub fn with_security_delay(self, delays_ms: Vec<u32>) -> Self {
        self.state.lock().delays_ms = delays_ms;
        self
    }

    pub fn state(&self) -> parking_lot::MutexGuard<'_, EmulatorState> {
        self.state.lock()
    }

    pub fn instructions(&self) -> Vec<u8> {
        self.state.lock().instructions.clone()
    }

    pub fn wallet_verifying_key(&self) -> Option<VerifyingKey> {
        self.state.lock().wallet_key.as_ref().map(|k| *k.verifying_key())
    }

    /// Check a raw signature against the wallet key and a prehash
    pub fn verify(&self, prehash: &[u8], signature: &[u8; 64]) -> bool {
        let Some(key) = self.wallet_verifying_key() else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify_prehash(prehash, &signature).is_ok()
    }

    fn respond(&self, raw: &[u8]) -> Response {
        let Ok(command) = Command::from_bytes(raw) else {
            return Response::status_only(0x6700);
        };
        let Ok(records) = TlvList::from_bytes(command.data().unwrap_or_default()) else {
            return Response::status_only(0x6700);
        };

        let mut state = self.state.lock();
        state.instructions.push(command.instruction());

        if records.bytes(tags::PIN) != Some(&state.pin1[..]) {
            return Response::status_only(sw::INVALID_PARAMS);
        }
        if command.instruction() != ins::READ
            && records.bytes(tags::CARD_ID) != Some(state.card_id.as_slice())
        {
            return Response::status_only(sw::INVALID_STATE);
        }

        let protected = matches!(
            command.instruction(),
            ins::CREATE_WALLET | ins::PURGE_WALLET | ins::SWAP_PIN | ins::SIGN
        );
        if protected {
            if records.bytes(tags::PIN2) != Some(&state.pin2[..]) {
                return Response::status_only(sw::INVALID_PARAMS);
            }
            if state.delay_cursor < state.delays_ms.len() {
                let remaining = state.delays_ms[state.delay_cursor];
                state.delay_cursor += 1;
                let mut pause = TlvList::new();
                pause.push_u32(tags::PAUSE, remaining / 10);
                return encode(&pause, sw::NEED_PAUSE);
            }
            state.delay_cursor = 0;
        }

        match command.instruction() {
            ins::READ => read(&state),
            ins::VERIFY_CARD => verify_card(&state, &records),
            ins::CREATE_WALLET => create_wallet(&mut state),
            ins::PURGE_WALLET => purge_wallet(&mut state),
            ins::SWAP_PIN => swap_pin(&mut state, &records),
            ins::SIGN => sign(&mut state, &records),
            _ => Response::status_only(sw::INS_NOT_SUPPORTED),
        }
    }
}

impl CardTransport for CardEmulator {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        Ok(self.respond(command).into())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

fn encode(records: &TlvList, status: u16) -> Response {
    match records.to_bytes() {
        Ok(payload) => Response::new(payload, status),
        Err(_) => Response::status_only(0x6F00),
    }
}

fn public_key(key: &SigningKey) -> Vec<u8> {
    key.verifying_key().to_encoded_point(false).as_bytes().to_vec()
}

fn read(state: &EmulatorState) -> Response {
    let mut card_data = TlvList::new();
    card_data
        .push(tags::card_data::BATCH, vec![0x00, 0x10])
        .push_str(tags::card_data::ISSUER_NAME, "TANGEM SDK")
        .push_str(tags::card_data::BLOCKCHAIN_NAME, "ETH");

    let mut records = TlvList::new();
    records
        .push(tags::CARD_ID, state.card_id.clone())
        .push_str(tags::MANUFACTURER_NAME, "TANGEM")
        .push_u8(tags::STATUS, state.status)
        .push_str(tags::FIRMWARE, "2.30r")
        .push(tags::CARD_PUBLIC_KEY, public_key(&state.card_key))
        .push_u8(tags::SIGNING_METHOD, state.signing_method)
        .push_str(tags::CURVE_ID, "secp256k1")
        .push_u16(tags::PAUSE_BEFORE_PIN2, 100)
        .push_u32(tags::MAX_SIGNATURES, 1000)
        .push_opt(tags::ISSUER_DATA_PUBLIC_KEY, state.issuer_data_key.clone());
    if let Some(wallet) = &state.wallet_key {
        records
            .push(tags::WALLET_PUBLIC_KEY, public_key(wallet))
            .push_u32(tags::WALLET_REMAINING_SIGNATURES, state.remaining_signatures)
            .push_u32(tags::WALLET_SIGNED_HASHES, state.signed_hashes);
    }
    if records.push_nested(tags::CARD_DATA, &card_data).is_err() {
        return Response::status_only(0x6F00);
    }
    encode(&records, sw::PROCESS_COMPLETED)
}

fn verify_card(state: &EmulatorState, records: &TlvList) -> Response {
    let Some(challenge) = records.bytes(tags::CHALLENGE) else {
        return Response::status_only(0x6A80);
    };
    let salt = [0x5A; 16];
    let message = [challenge, &salt[..]].concat();
    let signature: Signature = state.card_key.sign(&message);

    let mut answer = TlvList::new();
    answer
        .push(tags::CARD_ID, state.card_id.clone())
        .push(tags::SALT, salt.to_vec())
        .push(tags::CARD_SIGNATURE, signature.to_bytes().to_vec());
    encode(&answer, sw::PROCESS_COMPLETED)
}

fn create_wallet(state: &mut EmulatorState) -> Response {
    if state.status != 1 {
        return Response::status_only(sw::INVALID_STATE);
    }
    let key = SigningKey::random(&mut rand_v8::thread_rng());
    let mut answer = TlvList::new();
    answer
        .push(tags::CARD_ID, state.card_id.clone())
        .push_u8(tags::STATUS, 2)
        .push(tags::WALLET_PUBLIC_KEY, public_key(&key));
    state.wallet_key = Some(key);
    state.status = 2;
    state.signed_hashes = 0;
    encode(&answer, sw::PROCESS_COMPLETED)
}

fn purge_wallet(state: &mut EmulatorState) -> Response {
    if state.status != 2 {
        return Response::status_only(sw::INVALID_STATE);
    }
    state.wallet_key = None;
    state.status = if state.reusable { 1 } else { 3 };
    let mut answer = TlvList::new();
    answer
        .push(tags::CARD_ID, state.card_id.clone())
        .push_u8(tags::STATUS, state.status);
    encode(&answer, sw::PROCESS_COMPLETED)
}

fn swap_pin(state: &mut EmulatorState, records: &TlvList) -> Response {
    let (Some(new_pin1), Some(new_pin2)) =
        (records.bytes(tags::NEW_PIN), records.bytes(tags::NEW_PIN2))
    else {
        return Response::status_only(0x6A80);
    };
    let pin1_changed = new_pin1 != state.pin1;
    let pin2_changed = new_pin2 != state.pin2;
    state.pin1.copy_from_slice(new_pin1);
    state.pin2.copy_from_slice(new_pin2);

    let status = match (pin1_changed, pin2_changed) {
        (false, false) => sw::PROCESS_COMPLETED,
        (true, false) => sw::PIN1_CHANGED,
        (false, true) => sw::PIN2_CHANGED,
        (true, true) => sw::PINS_CHANGED,
    };
    let mut answer = TlvList::new();
    answer.push(tags::CARD_ID, state.card_id.clone());
    encode(&answer, status)
}

fn sign(state: &mut EmulatorState, records: &TlvList) -> Response {
    state.last_sign_records = Some(records.clone());
    let Some(wallet) = state.wallet_key.clone() else {
        return Response::status_only(sw::INVALID_STATE);
    };

    let digests: Vec<Vec<u8>> = if let Some(raw) = records.bytes(tags::TRANSACTION_OUT_RAW) {
        let algorithm = records.utf8(tags::HASH_ALG_ID).ok().flatten();
        let digest = match algorithm.as_deref() {
            Some("sha-256") => Sha256::digest(raw).to_vec(),
            Some("sha-256x2") => Sha256::digest(Sha256::digest(raw)).to_vec(),
            Some("sha-512") => Sha512::digest(raw).to_vec(),
            _ => return Response::status_only(0x6A80),
        };
        vec![digest]
    } else {
        let (Ok(Some(size)), Some(hashes)) = (
            records.u8(tags::TRANSACTION_OUT_HASH_SIZE),
            records.bytes(tags::TRANSACTION_OUT_HASH),
        ) else {
            return Response::status_only(0x6A80);
        };
        if size == 0 || hashes.len() % size as usize != 0 {
            return Response::status_only(0x6A80);
        }
        hashes.chunks(size as usize).map(<[u8]>::to_vec).collect()
    };

    let mut blob = Vec::new();
    for digest in &digests {
        let signature: Signature = match wallet.sign_prehash(digest) {
            Ok(signature) => signature,
            Err(_) => return Response::status_only(0x6A80),
        };
        blob.extend_from_slice(&signature.to_bytes());
    }
    if state.truncate_signatures {
        blob.truncate(blob.len() - 64);
    }

    state.signed_hashes += digests.len() as u32;
    state.remaining_signatures -= digests.len() as u32;

    let mut answer = TlvList::new();
    answer
        .push(tags::CARD_ID, state.card_id.clone())
        .push(tags::WALLET_SIGNATURE, blob)
        .push_u32(tags::WALLET_REMAINING_SIGNATURES, state.remaining_signatures)
        .push_u32(tags::WALLET_SIGNED_HASHES, state.signed_hashes);
    encode(&answer, sw::PROCESS_COMPLETED)
}

/// Session over an emulator with an empty trust list
pub fn session(
    card: &CardEmulator,
    pins: Arc<PinCache>,
) -> CardSession<CardExecutor<CardEmulator>> {
    CardSession::new(
        CardExecutor::new(card.clone()),
        Arc::new(IssuerTrust::default().with_self_certified(true)),
        pins,
    )
}
