//! Build, sign on the card, assemble and broadcast a transfer

use std::path::{Path, PathBuf};

use clap::Args;
use colored::Colorize;
use eyre::{OptionExt, WrapErr};
use nexum_apdu_core::Executor;
use nexum_tapcard::{TaskOrchestrator, TaskRequest};
use nexum_tapcard_broadcast::{Coordinator, Receipt, backend_for, broadcast_fanout};
use nexum_tapcard_engine::{
    Engine, SignedTransaction, TransferIntent, WalletState, format_amount, parse_amount,
};
use tracing::{info, warn};

use super::run_task;
use crate::config::Config;

#[derive(Args, Debug, Clone)]
pub struct SendArgs {
    /// Destination address or account
    #[arg(required = true)]
    pub to: String,

    /// Amount in the chain's native unit, e.g. 0.015
    #[arg(required = true)]
    pub amount: String,

    /// Total fee in the chain's native unit
    #[arg(long, required = true)]
    pub fee: String,

    /// Wallet state file (JSON), updated after the network accepts the transaction
    #[arg(long, short)]
    pub wallet: PathBuf,

    /// Memo, for chains that carry one
    #[arg(long)]
    pub memo: Option<String>,

    /// Ripple destination tag
    #[arg(long)]
    pub destination_tag: Option<u32>,

    /// ERC-20 contract to send tokens of, EVM wallets only
    #[arg(long)]
    pub token: Option<String>,

    /// Decimal places of the token amount
    #[arg(long, default_value_t = 18, requires = "token")]
    pub token_decimals: u8,

    /// Race this many groups of endpoints instead of walking one list
    #[arg(long)]
    pub fanout: Option<usize>,

    /// Sign and print the transaction without broadcasting it
    #[arg(long)]
    pub dry_run: bool,
}

impl SendArgs {
    fn intent(&self, wallet: &WalletState) -> eyre::Result<TransferIntent> {
        let decimals = wallet.family.decimals();
        let amount_decimals = match self.token {
            Some(_) => self.token_decimals,
            None => decimals,
        };
        let amount = parse_amount(&self.amount, amount_decimals)?;
        let fee = parse_amount(&self.fee, decimals)?;

        let mut intent = TransferIntent::new(&self.to, amount, fee);
        if let Some(contract) = &self.token {
            intent = intent.with_token(contract);
        }
        if let Some(memo) = &self.memo {
            intent = intent.with_memo(memo);
        }
        if let Some(tag) = self.destination_tag {
            intent = intent.with_destination_tag(tag);
        }
        Ok(intent)
    }
}

pub fn load_wallet(path: &Path) -> eyre::Result<WalletState> {
    let json = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("cannot read wallet file {}", path.display()))?;
    serde_json::from_str(&json).wrap_err_with(|| format!("invalid wallet file {}", path.display()))
}

pub fn store_wallet(path: &Path, wallet: &WalletState) -> eyre::Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(wallet)?)?;
    Ok(())
}

/// Sign a transfer with one tap and hand it to the network
pub async fn send_command<E: Executor + 'static>(
    orchestrator: &TaskOrchestrator<E>,
    config: &Config,
    args: &SendArgs,
) -> eyre::Result<()> {
    let mut wallet = load_wallet(&args.wallet)?;
    let family = wallet.family;
    let engine = Engine::new(family);
    let intent = args.intent(&wallet)?;

    let unsigned = engine.build_unsigned(&wallet, &intent)?;
    let (amount_decimals, unit) = match &intent.token {
        Some(contract) => (args.token_decimals, contract.as_str()),
        None => (family.decimals(), family.symbol()),
    };
    println!(
        "Sending {} {} to {} (fee {} {}), tap the card",
        format_amount(intent.amount, amount_decimals),
        unit,
        intent.destination,
        format_amount(intent.fee, family.decimals()),
        family.symbol(),
    );

    let pending = engine.collaborator(unsigned.clone());
    let slot = pending.slot();
    let report = run_task(orchestrator, TaskRequest::OneTouchSign(Box::new(pending))).await?;
    check_wallet_key(
        &wallet,
        report.state.wallet_public_key.as_ref().map(|k| k.0.as_slice()),
    )?;
    let signatures = slot.take().unwrap_or(report.signatures);

    let signed = engine.assemble_signed(&unsigned, &signatures)?;
    info!(id = %signed.id, "Transaction signed");

    if args.dry_run {
        println!("{}", signed.payload);
        println!("Transaction id: {}", signed.id.bold());
        return Ok(());
    }

    let receipt = broadcast(config, &signed, &mut wallet, args.fanout).await?;
    store_wallet(&args.wallet, &wallet)?;

    println!("{}", "Transaction accepted".green().bold());
    println!("Transaction id: {}", receipt.id.bold());
    println!("Endpoint:       {} ({} attempts)", receipt.endpoint, receipt.attempts);
    Ok(())
}

async fn broadcast(
    config: &Config,
    signed: &SignedTransaction,
    wallet: &mut WalletState,
    fanout: Option<usize>,
) -> eyre::Result<Receipt> {
    let client = reqwest::Client::builder()
        .timeout(config.coordinator_config().timeout)
        .build()?;
    let backends = config
        .endpoints_for(signed.family)?
        .iter()
        .map(|url| backend_for(signed.family, client.clone(), url))
        .collect::<Result<Vec<_>, _>>()?;
    let coordinator = Coordinator::new(backends, config.coordinator_config());

    let groups = fanout.unwrap_or(config.broadcast.fanout);
    let receipt = if groups > 1 {
        let children = coordinator.partition(groups);
        broadcast_fanout(&children, signed, wallet).await
    } else {
        coordinator.broadcast(signed, wallet).await
    };

    receipt.map_err(|e| {
        warn!(error = %e, class = ?e.class(), "Broadcast failed");
        eyre::Report::new(e).wrap_err(format!(
            "transaction {} was signed but not accepted",
            signed.id
        ))
    })
}

/// The card that signed must hold the wallet the file describes
pub fn check_wallet_key(wallet: &WalletState, card_key: Option<&[u8]>) -> eyre::Result<()> {
    let card_key = card_key.ok_or_eyre("card holds no wallet")?;
    if card_key != wallet.public_key.0.as_slice() {
        eyre::bail!("card wallet does not match the wallet file");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use nexum_tapcard::HexBytes;
    use nexum_tapcard_engine::{ChainFamily, ChainReference};

    use super::*;

    fn args(amount: &str, fee: &str) -> SendArgs {
        SendArgs {
            to: "rPEPPER7kfTD9w2To4CQk6UCfuHM9c6GDY".to_owned(),
            amount: amount.to_owned(),
            fee: fee.to_owned(),
            wallet: PathBuf::from("wallet.json"),
            memo: None,
            destination_tag: Some(7),
            token: None,
            token_decimals: 18,
            fanout: None,
            dry_run: false,
        }
    }

    fn ripple_wallet() -> WalletState {
        WalletState::new(ChainFamily::Ripple, "rHb9", HexBytes(vec![4; 65])).with_reference(
            ChainReference::Ripple {
                last_ledger_sequence: None,
            },
        )
    }

    #[test]
    fn test_intent_uses_chain_decimals() {
        let intent = args("1.5", "0.000012").intent(&ripple_wallet()).unwrap();
        assert_eq!(intent.amount.to::<u64>(), 1_500_000);
        assert_eq!(intent.fee.to::<u64>(), 12);
        assert_eq!(intent.destination_tag, Some(7));
        assert_eq!(intent.memo, None);

        assert!(args("1,5", "0").intent(&ripple_wallet()).is_err());
    }

    #[test]
    fn test_token_amount_uses_token_decimals() {
        let wallet = WalletState::new(ChainFamily::Evm, "0x00", HexBytes(vec![4; 65]));
        let mut args = args("2.5", "0.001");
        args.token = Some("0xdAC17F958D2ee523a2206206994597C13D831ec7".to_owned());
        args.token_decimals = 6;

        let intent = args.intent(&wallet).unwrap();
        assert_eq!(intent.amount.to::<u64>(), 2_500_000);
        assert_eq!(intent.fee.to::<u64>(), 1_000_000_000_000_000);
        assert_eq!(intent.token.as_deref(), args.token.as_deref());
    }

    #[test]
    fn test_wallet_key_must_match() {
        let wallet = ripple_wallet();
        assert!(check_wallet_key(&wallet, Some(&[4; 65])).is_ok());
        assert!(check_wallet_key(&wallet, Some(&[2; 33])).is_err());
        assert!(check_wallet_key(&wallet, None).is_err());
    }

    #[test]
    fn test_wallet_file_keeps_sequence() {
        let path = std::env::temp_dir().join(format!("tapcard-wallet-{}.json", std::process::id()));
        let mut wallet = ripple_wallet().with_nonce(41);
        wallet.advance_sequence();
        store_wallet(&path, &wallet).unwrap();

        let loaded = load_wallet(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, wallet);
        assert_eq!(loaded.nonce, 42);
        assert!(load_wallet(&path).is_err());
    }
}
