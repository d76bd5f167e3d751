use std::sync::Arc;

use nexum_apdu_core::CardExecutor;
use nexum_apdu_transport_pcsc::{
    PcscConfig, PcscDeviceManager, PcscReader, PcscTransport, ShareMode,
};
use nexum_tapcard::{CardSession, PinCache, TaskOrchestrator};
use tracing::info;

use crate::config::Config;

pub type PcscSession = CardSession<CardExecutor<PcscTransport>>;

/// PIN cache seeded from the command line
pub fn pin_cache(pins: &[String], pin2: Option<&str>) -> Arc<PinCache> {
    let cache = pins
        .iter()
        .fold(PinCache::new(), |cache, pin| cache.with_saved_pin(pin.as_str()));
    Arc::new(match pin2 {
        Some(pin2) => cache.with_pin2(pin2),
        None => cache,
    })
}

/// Open a card session on a reader
pub fn open_session(
    manager: &PcscDeviceManager,
    reader: &PcscReader,
    config: &Config,
    pins: Arc<PinCache>,
) -> eyre::Result<PcscSession> {
    info!(reader = reader.name(), exclusive = config.exclusive, "Using reader");
    let share_mode = if config.exclusive {
        ShareMode::Exclusive
    } else {
        ShareMode::Shared
    };
    let pcsc = PcscConfig::new()
        .with_share_mode(share_mode)
        .with_auto_reconnect(config.reconnect);
    let transport = manager.open_reader_with_config(reader.name(), pcsc)?;

    Ok(
        CardSession::new(CardExecutor::new(transport), Arc::new(config.trust()), pins)
            .with_config(config.session_config()),
    )
}

/// Orchestrator owning a fresh session
pub fn orchestrator(
    manager: &PcscDeviceManager,
    reader: &PcscReader,
    config: &Config,
    pins: Arc<PinCache>,
) -> eyre::Result<TaskOrchestrator<CardExecutor<PcscTransport>>> {
    Ok(TaskOrchestrator::new(open_session(
        manager, reader, config, pins,
    )?))
}
