use colored::Colorize;
use eyre::WrapErr;
use nexum_apdu_transport_pcsc::{PcscDeviceManager, PcscReader};

/// Find a reader with a specific name
pub fn find_reader_by_name(manager: &PcscDeviceManager, name: &str) -> eyre::Result<PcscReader> {
    manager
        .list_readers()?
        .into_iter()
        .find(|r| r.name() == name)
        .ok_or_else(|| eyre::eyre!("reader '{name}' not found"))
}

/// Find a reader holding a card, preferring contactless slots
pub fn find_reader_with_card(manager: &PcscDeviceManager) -> eyre::Result<PcscReader> {
    manager
        .find_reader_with_card()
        .wrap_err("no card found in any reader, tap a card on the reader")
}

/// Reader named on the command line, or the first one with a card
pub fn select_reader(
    manager: &PcscDeviceManager,
    name: Option<&str>,
) -> eyre::Result<PcscReader> {
    match name {
        Some(name) => find_reader_by_name(manager, name),
        None => find_reader_with_card(manager),
    }
}

/// List all available readers
pub fn list_readers(manager: &PcscDeviceManager) -> eyre::Result<()> {
    let readers = manager.list_readers()?;

    println!("Available readers:");
    for (i, reader) in readers.iter().enumerate() {
        let status = match reader.atr() {
            Some(atr) => format!("card present, ATR {}", hex::encode_upper(atr)).green(),
            None => "no card".dimmed(),
        };
        let kind = if reader.is_contactless() {
            "contactless"
        } else {
            "contact"
        };
        println!("{}. {} [{kind}] ({status})", i + 1, reader.name());
    }

    Ok(())
}
