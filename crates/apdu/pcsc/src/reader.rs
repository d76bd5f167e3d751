//! Readers as seen by the PC/SC resource manager

use pcsc::{ReaderState, State};

/// Name fragments vendors use for the contactless slot of a reader
const CONTACTLESS_NAMES: [&str; 3] = ["picc", "contactless", "nfc"];

/// A reader and the card it currently holds, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcscReader {
    name: String,
    atr: Option<Vec<u8>>,
}

impl PcscReader {
    /// Reader holding a card with the given ATR, or no card
    pub const fn new(name: String, atr: Option<Vec<u8>>) -> Self {
        Self { name, atr }
    }

    /// Reader name, as passed to [`PcscDeviceManager::open_reader`](crate::PcscDeviceManager::open_reader)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a card is in the field
    pub const fn has_card(&self) -> bool {
        self.atr.is_some()
    }

    /// ATR of the card in the field
    pub fn atr(&self) -> Option<&[u8]> {
        self.atr.as_deref()
    }

    /// Whether this is a contactless slot
    ///
    /// A card tapped on a contactless slot gets a synthesized ATR `3B 8n 80 01 ..`; without a
    /// card the reader name is all there is to go on.
    pub fn is_contactless(&self) -> bool {
        if let Some([0x3B, t0, 0x80, 0x01, ..]) = self.atr.as_deref() {
            if t0 & 0xF0 == 0x80 {
                return true;
            }
        }
        let name = self.name.to_ascii_lowercase();
        CONTACTLESS_NAMES.iter().any(|n| name.contains(n))
    }

    pub(crate) fn from_reader_state(reader_state: &ReaderState) -> Self {
        let state = reader_state.event_state();
        let has_card = state.contains(State::PRESENT) && !state.contains(State::EMPTY);

        Self {
            name: reader_state.name().to_string_lossy().into_owned(),
            atr: has_card.then(|| reader_state.atr().to_vec()),
        }
    }
}
