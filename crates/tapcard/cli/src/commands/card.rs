//! Card management commands

use colored::Colorize;
use nexum_apdu_core::Executor;
use nexum_tapcard::{CardIdentity, CardState, CardStatus, TaskOrchestrator, TaskReport, TaskRequest};
use tracing::info;

use super::run_task;

/// Read the card and print what it reports
pub async fn read_command<E: Executor + 'static>(
    orchestrator: &TaskOrchestrator<E>,
    json: bool,
) -> eyre::Result<()> {
    let report = run_task(orchestrator, TaskRequest::ReadInfo).await?;
    if json {
        let value = serde_json::json!({
            "identity": report.identity,
            "state": report.state,
            "issuer": report.issuer,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Prove the card holds its card key and check the issuer
pub async fn verify_command<E: Executor + 'static>(
    orchestrator: &TaskOrchestrator<E>,
) -> eyre::Result<()> {
    let session = orchestrator.session();
    let issuer = tokio::task::spawn_blocking(move || session.lock().verify_card()).await??;

    match issuer {
        Some(issuer) => println!("{} issued by {}", "Card verified,".green().bold(), issuer.name),
        None => println!(
            "{} issuer is not trusted, accepted as self-certified",
            "Card verified,".yellow().bold()
        ),
    }
    Ok(())
}

pub async fn create_wallet_command<E: Executor + 'static>(
    orchestrator: &TaskOrchestrator<E>,
    overwrite: bool,
) -> eyre::Result<()> {
    let report = run_task(orchestrator, TaskRequest::CreateWallet { overwrite }).await?;
    let key = report
        .state
        .wallet_public_key
        .as_ref()
        .ok_or_else(|| eyre::eyre!("card reports no wallet after creation"))?;

    info!(card_id = %report.identity.card_id_hex(), "Wallet created");
    println!("{}", "Wallet created".green().bold());
    println!("Public key: {}", hex::encode(&key.0));
    Ok(())
}

pub async fn purge_command<E: Executor + 'static>(
    orchestrator: &TaskOrchestrator<E>,
) -> eyre::Result<()> {
    let report = run_task(orchestrator, TaskRequest::Purge).await?;
    println!("{} status {:?}", "Wallet purged,".green().bold(), report.state.status);
    Ok(())
}

/// Replace both PINs
pub async fn swap_pin_command<E: Executor + 'static>(
    orchestrator: &TaskOrchestrator<E>,
    new_pin1: &str,
    new_pin2: &str,
) -> eyre::Result<()> {
    run_task(
        orchestrator,
        TaskRequest::SwapPin {
            new_pin1: new_pin1.to_owned(),
            new_pin2: new_pin2.to_owned(),
        },
    )
    .await?;
    println!("{}", "PINs changed".green().bold());
    Ok(())
}

pub async fn check_pin2_command<E: Executor + 'static>(
    orchestrator: &TaskOrchestrator<E>,
) -> eyre::Result<()> {
    let session = orchestrator.session();
    let default =
        tokio::task::spawn_blocking(move || session.lock().check_pin2_is_default()).await??;

    match default {
        Some(true) => println!("{}", "PIN2 is the factory default, change it".red().bold()),
        Some(false) => println!("{}", "PIN2 has been changed".green()),
        None => println!("{}", "Unknown, the card asks for a security delay".yellow()),
    }
    Ok(())
}

fn print_report(report: &TaskReport) {
    print_identity(&report.identity);
    print_state(&report.state);
    match &report.issuer {
        Some(issuer) => println!("Issuer:        {} {}", issuer.name, "(trusted)".green()),
        None => println!("Issuer:        {} {}", report.identity.issuer, "(self-certified)".yellow()),
    }
}

fn print_identity(identity: &CardIdentity) {
    println!("Card ID:       {}", identity.card_id_hex().bold());
    println!("Manufacturer:  {}", identity.manufacturer);
    println!("Firmware:      {}", identity.firmware);
    if let Some(blockchain) = &identity.blockchain {
        println!("Blockchain:    {blockchain}");
    }
    if let Some(curve) = &identity.curve {
        println!("Curve:         {curve}");
    }
    let methods: Vec<String> = identity
        .signing_methods
        .iter()
        .map(|m| m.to_string())
        .collect();
    println!("Signing:       {}", methods.join(", "));
    if let Some(ms) = identity.pause_before_pin2_ms {
        println!("PIN2 delay:    {ms} ms");
    }
}

fn print_state(state: &CardState) {
    let status = match state.status {
        CardStatus::Loaded => "Loaded".green(),
        CardStatus::Empty => "Empty".normal(),
        CardStatus::NotPersonalized => "Not personalized".yellow(),
        CardStatus::Purged => "Purged".red(),
    };
    println!("Status:        {status}");
    if let Some(key) = &state.wallet_public_key {
        println!("Wallet key:    {}", hex::encode(&key.0));
    }
    if let Some(remaining) = state.remaining_signatures {
        println!("Signatures:    {remaining} remaining");
    }
    if let Some(signed) = state.signed_hashes {
        println!("Signed hashes: {signed}");
    }
    if state.pin2_default == Some(true) {
        println!("PIN2:          {}", "factory default".red());
    }
}
