//! Connection settings for PC/SC readers

use pcsc::{Protocols, ShareMode as PcscShareMode};

/// Whether other processes may talk to the card while we hold it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShareMode {
    /// Keep the card to ourselves, e.g. across a multi-command signing session
    Exclusive,
    /// Let other readers of the card in between our commands
    #[default]
    Shared,
}

impl From<ShareMode> for PcscShareMode {
    fn from(mode: ShareMode) -> Self {
        match mode {
            ShareMode::Exclusive => Self::Exclusive,
            ShareMode::Shared => Self::Shared,
        }
    }
}

/// How a [`PcscTransport`](crate::PcscTransport) connects and exchanges
#[derive(Debug, Clone)]
pub struct PcscConfig {
    /// Sharing mode of the connection
    pub share_mode: ShareMode,
    /// Protocols offered when connecting; contactless cards answer over T=1
    pub protocols: Protocols,
    /// Reconnect once when a tap resets the card mid-exchange
    pub auto_reconnect: bool,
    /// Receive buffer, sized for extended length answers
    pub receive_buffer: usize,
}

impl Default for PcscConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PcscConfig {
    /// Shared access, any protocol, reconnect on reset
    pub const fn new() -> Self {
        Self {
            share_mode: ShareMode::Shared,
            protocols: Protocols::ANY,
            auto_reconnect: true,
            receive_buffer: pcsc::MAX_BUFFER_SIZE_EXTENDED,
        }
    }

    /// Set the sharing mode
    pub const fn with_share_mode(mut self, mode: ShareMode) -> Self {
        self.share_mode = mode;
        self
    }

    /// Restrict the protocols offered on connect
    pub const fn with_protocols(mut self, protocols: Protocols) -> Self {
        self.protocols = protocols;
        self
    }

    pub const fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PcscConfig::default();
        assert_eq!(config.share_mode, ShareMode::Shared);
        assert!(config.auto_reconnect);
        assert!(config.receive_buffer >= 65_538);

        let exclusive = config.with_share_mode(ShareMode::Exclusive);
        assert!(matches!(
            PcscShareMode::from(exclusive.share_mode),
            PcscShareMode::Exclusive
        ));

        let t1 = PcscConfig::new()
            .with_protocols(Protocols::T1)
            .with_auto_reconnect(false);
        assert_eq!(t1.protocols, Protocols::T1);
        assert!(!t1.auto_reconnect);
    }
}
