//! Firmware contract of the card: instruction codes, status words and record tags

/// Class byte used by every command
pub const CLA: u8 = 0x00;

/// PIN1 a card leaves the factory with
pub const DEFAULT_PIN1: &str = "000000";
/// PIN2 a card leaves the factory with
pub const DEFAULT_PIN2: &str = "000";

/// Most digests the card signs in one SIGN command
pub const MAX_HASHES_PER_SIGN: usize = 10;
/// Longest digest, its size travels in a single byte record
pub const MAX_DIGEST_LENGTH: usize = 0xFF;
/// Largest raw payload accepted by SIGN in raw mode
pub const MAX_RAW_PAYLOAD: usize = 1024;
/// Remaining security delay assumed when the card omits the pause record
pub const DEFAULT_PAUSE_MS: u32 = 60_000;
/// Length of the challenge sent with VERIFY_CARD
pub const CHALLENGE_LENGTH: usize = 16;
/// Length of one raw `r || s` signature
pub const SIGNATURE_LENGTH: usize = 64;

/// Instruction codes
pub mod ins {
    /// READ: card and wallet data
    pub const READ: u8 = 0xF2;
    /// VERIFY_CARD: prove possession of the card key
    pub const VERIFY_CARD: u8 = 0xF3;
    /// CREATE_WALLET: generate the wallet key pair
    pub const CREATE_WALLET: u8 = 0xF8;
    /// SWAP_PIN: change PIN1 and PIN2
    pub const SWAP_PIN: u8 = 0xFA;
    /// SIGN: sign digests or a raw payload
    pub const SIGN: u8 = 0xFB;
    /// PURGE_WALLET: erase the wallet key pair
    pub const PURGE_WALLET: u8 = 0xFC;
}

/// Status words returned by the firmware
pub mod sw {
    /// Command completed
    pub const PROCESS_COMPLETED: u16 = 0x9000;
    /// SWAP_PIN: PIN1 changed
    pub const PIN1_CHANGED: u16 = 0x9001;
    /// SWAP_PIN: PIN2 changed
    pub const PIN2_CHANGED: u16 = 0x9002;
    /// SWAP_PIN: both PINs changed
    pub const PINS_CHANGED: u16 = 0x9003;
    /// Wrong PIN1 or PIN2 on a PIN-carrying command
    pub const INVALID_PARAMS: u16 = 0x6A86;
    /// Generic processing failure
    pub const ERROR_PROCESSING_COMMAND: u16 = 0x6286;
    /// Command not allowed in the current card status
    pub const INVALID_STATE: u16 = 0x6985;
    /// Instruction unknown to this firmware
    pub const INS_NOT_SUPPORTED: u16 = 0x6D00;
    /// Card requires an encrypted session
    pub const NEED_ENCRYPTION: u16 = 0x6982;
    /// Security delay in progress, resend the same command
    pub const NEED_PAUSE: u16 = 0x9789;

    /// Whether the status word reports a successful SWAP_PIN
    pub const fn is_pin_swap_success(sw: u16) -> bool {
        matches!(sw, PROCESS_COMPLETED | PIN1_CHANGED | PIN2_CHANGED | PINS_CHANGED)
    }
}

/// Record tags
pub mod tags {
    /// Card identifier (8 bytes)
    pub const CARD_ID: u8 = 0x01;
    /// Card status, see `CardStatus`
    pub const STATUS: u8 = 0x02;
    /// Card public key (uncompressed SEC1)
    pub const CARD_PUBLIC_KEY: u8 = 0x03;
    /// Signature made with the card key
    pub const CARD_SIGNATURE: u8 = 0x04;
    /// Curve name
    pub const CURVE_ID: u8 = 0x05;
    /// Hash algorithm name for raw signing
    pub const HASH_ALG_ID: u8 = 0x06;
    /// Allowed signing methods
    pub const SIGNING_METHOD: u8 = 0x07;
    /// Total signatures the wallet may produce
    pub const MAX_SIGNATURES: u8 = 0x08;
    /// Security delay before PIN2 operations, in units of 10 ms
    pub const PAUSE_BEFORE_PIN2: u8 = 0x09;
    /// Personalization settings
    pub const SETTINGS_MASK: u8 = 0x0A;
    /// Nested card data
    pub const CARD_DATA: u8 = 0x0C;
    /// SHA-256 of PIN1
    pub const PIN: u8 = 0x10;
    /// SHA-256 of PIN2
    pub const PIN2: u8 = 0x11;
    /// SHA-256 of the new PIN1
    pub const NEW_PIN: u8 = 0x12;
    /// SHA-256 of the new PIN2
    pub const NEW_PIN2: u8 = 0x13;
    /// Host challenge
    pub const CHALLENGE: u8 = 0x16;
    /// Card salt
    pub const SALT: u8 = 0x17;
    /// Remaining security delay, in units of 10 ms
    pub const PAUSE: u8 = 0x1C;
    /// Manufacturer name
    pub const MANUFACTURER_NAME: u8 = 0x20;
    /// Issuer key for issuer data
    pub const ISSUER_DATA_PUBLIC_KEY: u8 = 0x30;
    /// Issuer key for transaction validation
    pub const ISSUER_TRANSACTION_PUBLIC_KEY: u8 = 0x31;
    /// Issuer data blob
    pub const ISSUER_DATA: u8 = 0x32;
    /// Issuer signature over the issuer data
    pub const ISSUER_DATA_SIGNATURE: u8 = 0x33;
    /// Issuer signature over the data to sign
    pub const ISSUER_TRANSACTION_SIGNATURE: u8 = 0x34;
    /// Length of each digest in a SIGN request
    pub const TRANSACTION_OUT_HASH_SIZE: u8 = 0x50;
    /// Concatenated digests to sign
    pub const TRANSACTION_OUT_HASH: u8 = 0x51;
    /// Raw payload to hash and sign
    pub const TRANSACTION_OUT_RAW: u8 = 0x52;
    /// Terminal signature over the data to sign
    pub const TERMINAL_TRANSACTION_SIGNATURE: u8 = 0x57;
    /// Terminal public key
    pub const TERMINAL_PUBLIC_KEY: u8 = 0x5C;
    /// Wallet public key
    pub const WALLET_PUBLIC_KEY: u8 = 0x60;
    /// Concatenated `r || s` signatures
    pub const WALLET_SIGNATURE: u8 = 0x61;
    /// Signatures left on the wallet
    pub const WALLET_REMAINING_SIGNATURES: u8 = 0x62;
    /// Hashes signed so far
    pub const WALLET_SIGNED_HASHES: u8 = 0x63;
    /// Firmware version string
    pub const FIRMWARE: u8 = 0x80;

    /// Records nested in [`CARD_DATA`]
    pub mod card_data {
        /// Batch identifier
        pub const BATCH: u8 = 0x81;
        /// Manufacture date
        pub const MANUFACTURE_DATE_TIME: u8 = 0x82;
        /// Issuer name
        pub const ISSUER_NAME: u8 = 0x83;
        /// Blockchain the card is personalized for
        pub const BLOCKCHAIN_NAME: u8 = 0x84;
        /// Manufacturer signature over `card_id || card_public_key`
        pub const CARD_ID_MANUFACTURER_SIGNATURE: u8 = 0x86;
    }
}
