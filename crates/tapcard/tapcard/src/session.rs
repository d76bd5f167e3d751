//! Card session
//!
//! A [`CardSession`] runs one card operation at a time as a strictly sequential series of
//! exchanges over an [`Executor`]. It resolves PIN1 from the [`PinsProvider`], answers security
//! delay reports by resending the pending command, and binds itself to the first card it reads.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nexum_apdu_core::{Executor, Response, TlvList};
use tracing::{debug, info, instrument, warn};

use crate::commands::{
    CardCommand, CreateWalletCommand, CreateWalletResponse, IssuerDataUpdate, PurgeWalletCommand,
    PurgeWalletResponse, ReadCommand, ReadResponse, SignCommand, SignPayload, SignResponse,
    SwapPinCommand, VerifyCardCommand, VerifyCardResponse,
};
use crate::constants::{
    DEFAULT_PAUSE_MS, DEFAULT_PIN2, MAX_DIGEST_LENGTH, MAX_HASHES_PER_SIGN, MAX_RAW_PAYLOAD, sw, tags,
};
use crate::crypto::{TerminalKey, random_challenge, verify_signature};
use crate::delay::{DELAY_DISPLAY_FLOOR_MS, DelayCountdown, DelayDisplay};
use crate::pins::{PinsProvider, pin1_candidates};
use crate::trust::{IssuerTrust, TrustedIssuer};
use crate::types::{
    CardIdentity, CardState, CardStatus, HashAlgorithm, HexBytes, RawSignature, SigningMethod,
};
use crate::{Error, Result};

/// Session tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Consecutive delay reports tolerated for one command before giving up
    pub max_delay_reports: u32,
    /// First delay report below which no countdown is shown
    pub delay_display_floor_ms: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionConfig {
    /// Default configuration
    pub const fn new() -> Self {
        Self {
            max_delay_reports: 600,
            delay_display_floor_ms: DELAY_DISPLAY_FLOOR_MS,
        }
    }

    /// Bound the number of delay reports per command
    pub const fn with_max_delay_reports(mut self, reports: u32) -> Self {
        self.max_delay_reports = reports;
        self
    }

    /// Change the countdown display floor
    pub const fn with_delay_display_floor(mut self, floor_ms: u32) -> Self {
        self.delay_display_floor_ms = floor_ms;
        self
    }
}

/// Where the session is within the current operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No operation started yet
    Idle,
    /// Operation started, nothing exchanged yet
    Connecting,
    /// Resolving PIN1 against the card
    AwaitingPin1,
    /// Sending a PIN2 protected command
    AwaitingPin2,
    /// Command sent, waiting for its result
    Executing,
    /// Card is counting down a security delay
    AwaitingDelay,
    /// Last operation succeeded
    Completed,
    /// Last operation failed
    Failed,
    /// Last operation was cancelled
    Cancelled,
}

impl SessionState {
    /// Whether no operation is in progress
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Idle | Self::Completed | Self::Failed | Self::Cancelled
        )
    }
}

/// Cooperative cancellation flag, checked before every exchange
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives session events, from whichever thread runs the session
pub trait SessionObserver: Send + Sync {
    /// The session moved to a new state
    fn on_state(&self, _state: SessionState) {}

    /// The card reported a security delay
    fn on_security_delay(&self, remaining_ms: u32, display: DelayDisplay);
}

/// Issuer material attached to a SIGN
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssuerAuthorization {
    /// Issuer signature over the signed bytes
    pub signature: Vec<u8>,
    /// Issuer data to write in the same command
    pub data_update: Option<IssuerDataUpdate>,
}

impl IssuerAuthorization {
    /// Authorization carrying only a transaction signature
    pub const fn new(signature: Vec<u8>) -> Self {
        Self {
            signature,
            data_update: None,
        }
    }

    /// Also write issuer data
    pub fn with_data_update(mut self, update: IssuerDataUpdate) -> Self {
        self.data_update = Some(update);
        self
    }
}

/// One logical conversation with a card
pub struct CardSession<E: Executor> {
    executor: E,
    config: SessionConfig,
    trust: Arc<IssuerTrust>,
    pins: Arc<dyn PinsProvider>,
    terminal: Option<TerminalKey>,
    observer: Option<Arc<dyn SessionObserver>>,
    cancel: CancelToken,
    state: SessionState,
    identity: Option<CardIdentity>,
    card_state: Option<CardState>,
    pin1: Option<String>,
    countdown: DelayCountdown,
}

impl<E: Executor> fmt::Debug for CardSession<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardSession")
            .field("executor", &self.executor)
            .field("state", &self.state)
            .field("card_id", &self.identity.as_ref().map(CardIdentity::card_id_hex))
            .field("terminal", &self.terminal.is_some())
            .finish()
    }
}

impl<E: Executor> CardSession<E> {
    /// Create a session over an executor
    pub fn new(executor: E, trust: Arc<IssuerTrust>, pins: Arc<dyn PinsProvider>) -> Self {
        let config = SessionConfig::new();
        Self {
            executor,
            config,
            trust,
            pins,
            terminal: None,
            observer: None,
            cancel: CancelToken::new(),
            state: SessionState::Idle,
            identity: None,
            card_state: None,
            pin1: None,
            countdown: DelayCountdown::new(config.delay_display_floor_ms),
        }
    }

    /// Replace the configuration
    pub const fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Link a terminal key
    pub fn with_terminal_key(mut self, key: TerminalKey) -> Self {
        self.terminal = Some(key);
        self
    }

    /// Attach an observer
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Replace the observer, or remove it with `None`
    pub fn set_observer(&mut self, observer: Option<Arc<dyn SessionObserver>>) {
        self.observer = observer;
    }

    /// Replace the cancellation token used by the following operations
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = token;
    }

    /// Current cancellation token
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Current state
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Identity of the card this session is bound to
    pub const fn identity(&self) -> Option<&CardIdentity> {
        self.identity.as_ref()
    }

    /// Card state as of the last exchange that reported it
    pub const fn card_state(&self) -> Option<&CardState> {
        self.card_state.as_ref()
    }

    /// PIN2 from the PIN cache, or the factory PIN2 when none is cached
    pub fn pin2(&self) -> String {
        self.pins.pin2().unwrap_or_else(|| DEFAULT_PIN2.to_string())
    }

    /// Observer currently attached
    pub fn observer(&self) -> Option<Arc<dyn SessionObserver>> {
        self.observer.clone()
    }

    /// Executor the session runs on
    pub const fn executor(&self) -> &E {
        &self.executor
    }

    /// Mutable executor access
    pub const fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// Read identity and state, resolving PIN1
    #[instrument(level = "debug", skip(self))]
    pub fn read(&mut self) -> Result<ReadResponse> {
        self.operation(Self::do_read)
    }

    /// Read the card, prove possession of the card key and check the issuer
    #[instrument(level = "debug", skip(self))]
    pub fn verify_card(&mut self) -> Result<Option<TrustedIssuer>> {
        self.operation(|session| {
            session.do_read()?;
            session.do_verify()
        })
    }

    /// Generate the wallet key pair
    #[instrument(level = "debug", skip(self, pin2))]
    pub fn create_wallet(&mut self, pin2: &str, overwrite: bool) -> Result<HexBytes> {
        self.operation(|session| {
            let read = session.do_read()?;
            match read.state.status {
                CardStatus::NotPersonalized => return Err(Error::NotPersonalized),
                CardStatus::Purged => return Err(Error::WalletPurged),
                CardStatus::Loaded if !overwrite => return Err(Error::WalletAlreadyExists),
                CardStatus::Loaded => {
                    info!("Overwriting existing wallet");
                    session.do_purge(pin2)?;
                    if session.do_read()?.state.status != CardStatus::Empty {
                        return Err(Error::WalletPurged);
                    }
                }
                CardStatus::Empty => {}
            }

            let (pin1, card_id) = session.credentials()?;
            let command = CreateWalletCommand::with_pins(&pin1, &card_id, pin2)?;
            let records = session.exchange_protected(&command, true)?;
            let created = CreateWalletResponse::try_from(&records)?;

            if let Some(state) = session.card_state.as_mut() {
                state.status = created.status;
                state.wallet_public_key = Some(created.wallet_public_key.clone());
            }
            debug!(wallet = ?created.wallet_public_key, "Wallet created");
            Ok(created.wallet_public_key)
        })
    }

    /// Sign digests of identical length, one signature each
    ///
    /// The request is validated before anything is sent, and the answer is rejected unless it
    /// holds exactly one signature per digest.
    #[instrument(level = "debug", skip_all, fields(count = digests.len()))]
    pub fn sign_hashes(
        &mut self,
        pin2: &str,
        digests: &[Vec<u8>],
        issuer: Option<&IssuerAuthorization>,
    ) -> Result<Vec<RawSignature>> {
        validate_digests(digests)?;
        let payload = SignPayload::Hashes(digests.to_vec());
        self.operation(|session| {
            session.do_read()?;
            let method = session
                .identity()
                .and_then(|id| id.signing_methods.for_hashes())
                .ok_or(Error::UnsupportedSigningMethod("hash signing"))?;
            session.do_sign(pin2, method, &payload, issuer)
        })
    }

    /// Let the card hash a raw payload and sign it
    #[instrument(level = "debug", skip(self, pin2, payload, issuer), fields(len = payload.len()))]
    pub fn sign_raw(
        &mut self,
        pin2: &str,
        algorithm: HashAlgorithm,
        payload: &[u8],
        issuer: Option<&IssuerAuthorization>,
    ) -> Result<RawSignature> {
        if payload.is_empty() {
            return Err(Error::EmptySigningRequest);
        }
        if payload.len() > MAX_RAW_PAYLOAD {
            return Err(Error::PayloadTooLarge(payload.len()));
        }

        let payload = SignPayload::Raw {
            payload: payload.to_vec(),
            algorithm,
        };
        self.operation(|session| {
            session.do_read()?;
            let method = session
                .identity()
                .and_then(|id| id.signing_methods.for_raw())
                .ok_or(Error::UnsupportedSigningMethod("raw signing"))?;
            let mut signatures = session.do_sign(pin2, method, &payload, issuer)?;
            signatures.pop().ok_or(Error::EmptySigningRequest)
        })
    }

    /// Change PIN1 and PIN2
    ///
    /// On success the new PIN1 is written to the PIN cache before this returns. Without
    /// `finalize` the session gives up at the first security delay report.
    #[instrument(level = "debug", skip(self, pin2, new_pin1, new_pin2))]
    pub fn set_pin(
        &mut self,
        pin2: &str,
        new_pin1: &str,
        new_pin2: &str,
        finalize: bool,
    ) -> Result<()> {
        self.operation(|session| {
            session.do_read()?;
            session.do_swap_pin(pin2, new_pin1, new_pin2, finalize)
        })
    }

    /// Erase the wallet and read the card again
    #[instrument(level = "debug", skip(self, pin2))]
    pub fn purge_wallet(&mut self, pin2: &str) -> Result<CardState> {
        self.operation(|session| {
            let read = session.do_read()?;
            match read.state.status {
                CardStatus::Loaded => {}
                CardStatus::NotPersonalized => return Err(Error::NotPersonalized),
                CardStatus::Purged => return Err(Error::WalletPurged),
                CardStatus::Empty => return Err(Error::NoWallet),
            }
            session.do_purge(pin2)?;
            Ok(session.do_read()?.state)
        })
    }

    /// Probe whether PIN2 is still the factory value
    ///
    /// Resets both PINs to their current values with the default PIN2. Returns `None` when the
    /// card would require a security delay to answer.
    #[instrument(level = "debug", skip(self))]
    pub fn check_pin2_is_default(&mut self) -> Result<Option<bool>> {
        self.operation(|session| {
            session.do_read()?;
            let (pin1, _) = session.credentials()?;
            let outcome = match session.do_swap_pin(DEFAULT_PIN2, &pin1, DEFAULT_PIN2, false) {
                Ok(()) => Some(true),
                Err(Error::InvalidPin) => Some(false),
                Err(Error::CardBusy { .. }) => None,
                Err(e) => return Err(e),
            };
            if let Some(state) = session.card_state.as_mut() {
                state.pin2_default = outcome;
            }
            Ok(outcome)
        })
    }

    fn operation<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.set_state(SessionState::Connecting);
        self.countdown = DelayCountdown::new(self.config.delay_display_floor_ms);

        let result = op(self);
        match &result {
            Ok(_) => self.set_state(SessionState::Completed),
            Err(Error::Cancelled) => self.set_state(SessionState::Cancelled),
            Err(e) => {
                debug!(error = %e, class = ?e.class(), "Card operation failed");
                self.set_state(SessionState::Failed);
            }
        }
        result
    }

    fn do_read(&mut self) -> Result<ReadResponse> {
        self.set_state(SessionState::AwaitingPin1);
        let terminal_key = self.terminal.as_ref().map(TerminalKey::public_key);

        for pin1 in pin1_candidates(self.pins.as_ref()) {
            let command = ReadCommand::with_pin(&pin1, terminal_key.as_deref())?;
            match self.exchange(&command, true) {
                Ok(records) => {
                    let read = ReadResponse::try_from(&records)?;
                    self.bind(&read)?;
                    self.pins.set_last_used_pin(&pin1);
                    self.pin1 = Some(pin1);
                    return Ok(read);
                }
                Err(Error::InvalidPin) => debug!("PIN1 candidate rejected"),
                Err(e) => return Err(e),
            }
        }

        warn!("No PIN1 candidate accepted");
        Err(Error::InvalidPin)
    }

    fn bind(&mut self, read: &ReadResponse) -> Result<()> {
        match &self.identity {
            Some(bound) if bound.card_id != read.identity.card_id => {
                return Err(Error::CardMismatch {
                    expected: bound.card_id_hex(),
                    found: read.identity.card_id_hex(),
                });
            }
            Some(_) => {}
            None => {
                info!(card_id = %read.identity.card_id_hex(), "Bound session to card");
                self.identity = Some(read.identity.clone());
            }
        }

        let pin2_default = self.card_state.as_ref().and_then(|s| s.pin2_default);
        self.card_state = Some(CardState {
            pin2_default,
            ..read.state.clone()
        });
        Ok(())
    }

    fn do_verify(&mut self) -> Result<Option<TrustedIssuer>> {
        let (pin1, card_id) = self.credentials()?;
        let challenge = random_challenge();
        let command = VerifyCardCommand::with_challenge(&pin1, &card_id, &challenge)?;

        self.set_state(SessionState::Executing);
        let records = self.exchange(&command, true)?;
        let answer = VerifyCardResponse::try_from(&records)?;

        let identity = self.identity.as_ref().ok_or(Error::VerificationFailed)?;
        let message = [challenge.as_slice(), answer.salt.as_slice()].concat();
        if !verify_signature(&identity.card_public_key, &message, &answer.signature)? {
            warn!(card_id = %identity.card_id_hex(), "Card failed the challenge");
            return Err(Error::VerificationFailed);
        }

        Ok(self.trust.validate(identity)?.cloned())
    }

    fn do_sign(
        &mut self,
        pin2: &str,
        method: SigningMethod,
        payload: &SignPayload,
        issuer: Option<&IssuerAuthorization>,
    ) -> Result<Vec<RawSignature>> {
        match self.card_state.as_ref().map(|s| s.status) {
            Some(CardStatus::Loaded) => {}
            Some(CardStatus::Purged) => return Err(Error::WalletPurged),
            _ => return Err(Error::NoWallet),
        }
        if method.requires_issuer() && issuer.is_none() {
            return Err(Error::MissingIssuerValidation(method));
        }
        let update = issuer.and_then(|i| i.data_update.as_ref());
        if update.is_some() && !method.writes_issuer_data() {
            return Err(Error::UnsupportedSigningMethod("issuer data update"));
        }

        debug!(%method, "Signing");
        let (pin1, card_id) = self.credentials()?;
        let mut builder = SignCommand::new(&pin1, &card_id, pin2, payload);
        if let Some(issuer) = issuer {
            builder = builder.with_issuer_signature(&issuer.signature);
        }
        if let Some(update) = update {
            builder = builder.with_issuer_data(update);
        }
        if let Some(terminal) = &self.terminal {
            let signature = terminal.sign(&payload.signed_bytes());
            builder = builder.with_terminal(&signature, &terminal.public_key());
        }
        let command = builder.build()?;

        let records = self.exchange_protected(&command, true)?;
        let answer = SignResponse::decode(&records, payload.signature_count())?;

        if let Some(state) = self.card_state.as_mut() {
            state.remaining_signatures = answer.remaining_signatures.or(state.remaining_signatures);
            state.signed_hashes = answer.signed_hashes.or(state.signed_hashes);
        }
        Ok(answer.signatures)
    }

    fn do_swap_pin(
        &mut self,
        pin2: &str,
        new_pin1: &str,
        new_pin2: &str,
        finalize: bool,
    ) -> Result<()> {
        let (pin1, card_id) = self.credentials()?;
        let command = SwapPinCommand::with_pins(&pin1, &card_id, pin2, new_pin1, new_pin2)?;

        self.set_state(SessionState::AwaitingPin2);
        let response = self.transceive(&command, finalize)?;
        let status = response.status().to_u16();
        if !sw::is_pin_swap_success(status) {
            return Err(self.status_error(&command, &response));
        }

        self.pins.set_last_used_pin(new_pin1);
        self.pin1 = Some(new_pin1.to_string());
        if let Some(state) = self.card_state.as_mut() {
            state.pin2_default = Some(new_pin2 == DEFAULT_PIN2);
        }
        debug!(status = format_args!("{status:#06x}"), "PINs changed");
        Ok(())
    }

    fn do_purge(&mut self, pin2: &str) -> Result<()> {
        let (pin1, card_id) = self.credentials()?;
        let command = PurgeWalletCommand::with_pins(&pin1, &card_id, pin2)?;
        let records = self.exchange_protected(&command, true)?;
        let purged = PurgeWalletResponse::try_from(&records)?;
        if let Some(state) = self.card_state.as_mut() {
            state.status = purged.status.unwrap_or(CardStatus::Purged);
            state.wallet_public_key = None;
        }
        Ok(())
    }

    fn credentials(&self) -> Result<(String, Vec<u8>)> {
        match (&self.pin1, &self.identity) {
            (Some(pin1), Some(identity)) => Ok((pin1.clone(), identity.card_id.clone())),
            _ => Err(Error::InvalidPin),
        }
    }

    fn exchange_protected(&mut self, command: &CardCommand, wait: bool) -> Result<TlvList> {
        self.set_state(SessionState::AwaitingPin2);
        if let Some(estimate) = self.identity.as_ref().and_then(|i| i.pause_before_pin2_ms) {
            self.countdown = DelayCountdown::new(self.config.delay_display_floor_ms)
                .with_estimate(estimate);
        }
        self.exchange(command, wait)
    }

    /// Send a command and require a plain success status
    fn exchange(&mut self, command: &CardCommand, wait: bool) -> Result<TlvList> {
        let response = self.transceive(command, wait)?;
        if !response.has_status(sw::PROCESS_COMPLETED) {
            return Err(self.status_error(command, &response));
        }
        Ok(response.records()?)
    }

    fn status_error(&self, command: &CardCommand, response: &Response) -> Error {
        let status = response.status();
        match status.to_u16() {
            sw::INVALID_PARAMS => {
                warn!(command = command.name(), "PIN rejected");
                Error::InvalidPin
            }
            _ => {
                warn!(command = command.name(), %status, "Card returned an error");
                Error::card(command.name(), status)
            }
        }
    }

    /// Send a command, resending it for as long as the card reports a security delay
    fn transceive(&mut self, command: &CardCommand, wait: bool) -> Result<Response> {
        let mut reports = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                info!(command = command.name(), "Cancelled before exchange");
                return Err(Error::Cancelled);
            }

            let response = self.executor.send(command)?;
            if !response.has_status(sw::NEED_PAUSE) {
                self.set_state(SessionState::Executing);
                return Ok(response);
            }

            let remaining_ms = pause_ms(&response);
            reports += 1;
            debug!(command = command.name(), remaining_ms, reports, "Security delay");

            if !wait || reports > self.config.max_delay_reports {
                return Err(Error::CardBusy { remaining_ms });
            }

            self.set_state(SessionState::AwaitingDelay);
            let display = self.countdown.report(remaining_ms);
            if let Some(observer) = &self.observer {
                observer.on_security_delay(remaining_ms, display);
            }
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            self.state = state;
            if let Some(observer) = &self.observer {
                observer.on_state(state);
            }
        }
    }
}

/// Remaining delay carried by a NEED_PAUSE answer
fn pause_ms(response: &Response) -> u32 {
    response
        .records()
        .ok()
        .and_then(|records| records.u32(tags::PAUSE).ok().flatten())
        .map_or(DEFAULT_PAUSE_MS, |pause| pause.saturating_mul(10))
}

fn validate_digests(digests: &[Vec<u8>]) -> Result<()> {
    let Some(first) = digests.first() else {
        return Err(Error::EmptySigningRequest);
    };
    if digests.len() > MAX_HASHES_PER_SIGN {
        return Err(Error::TooManyDigests(digests.len()));
    }
    if first.is_empty() {
        return Err(Error::EmptySigningRequest);
    }
    if first.len() > MAX_DIGEST_LENGTH {
        return Err(Error::DigestTooLong(first.len()));
    }
    if let Some(odd) = digests.iter().find(|d| d.len() != first.len()) {
        return Err(Error::InconsistentDigestLength {
            expected: first.len(),
            found: odd.len(),
        });
    }
    Ok(())
}
