use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nexum_apdu_transport_pcsc::PcscDeviceManager;

mod commands;
mod config;
mod utils;

use commands::*;
use utils::{reader, session};

#[derive(Parser)]
#[command(version, about = "Read, manage and sign with contactless signing cards")]
struct Cli {
    /// Optional reader name to use (will auto-detect if not specified)
    #[arg(short, long, global = true)]
    reader: Option<String>,

    /// Trace level output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default ~/.nxm/tapcard.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Saved PIN1 candidate, may be repeated
    #[arg(long = "pin", global = true)]
    pins: Vec<String>,

    /// PIN2 for signing and wallet management
    #[arg(long, global = true)]
    pin2: Option<String>,

    /// Open the reader in exclusive mode
    #[arg(long, global = true)]
    exclusive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available readers
    List,

    /// Print the effective configuration
    Config,

    /// Read the card and show its identity and wallet
    Read {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Verify the card key and the issuer
    Verify,

    /// Create the wallet key pair on the card
    CreateWallet {
        /// Purge an existing wallet first
        #[arg(long)]
        overwrite: bool,
    },

    /// Erase the wallet, the card cannot hold a new one afterwards
    Purge,

    /// Change PIN1 and PIN2
    SwapPin {
        /// New PIN1
        #[arg(required = true)]
        new_pin1: String,

        /// New PIN2
        #[arg(required = true)]
        new_pin2: String,
    },

    /// Check whether PIN2 is still the factory value
    CheckPin2,

    /// Sign a transfer on the card and broadcast it
    Send(SendArgs),
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mut config = config::load_config(cli.config.as_deref())?;
    config.exclusive |= cli.exclusive;
    if let Commands::Config = &cli.command {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let manager = PcscDeviceManager::new()?;
    if let Commands::List = &cli.command {
        return reader::list_readers(&manager);
    }

    let reader = reader::select_reader(&manager, cli.reader.as_deref())?;
    let pins = session::pin_cache(&cli.pins, cli.pin2.as_deref());
    let orchestrator = session::orchestrator(&manager, &reader, &config, pins)?;

    match &cli.command {
        Commands::List | Commands::Config => Ok(()),
        Commands::Read { json } => read_command(&orchestrator, *json).await,
        Commands::Verify => verify_command(&orchestrator).await,
        Commands::CreateWallet { overwrite } => {
            create_wallet_command(&orchestrator, *overwrite).await
        }
        Commands::Purge => purge_command(&orchestrator).await,
        Commands::SwapPin { new_pin1, new_pin2 } => {
            swap_pin_command(&orchestrator, new_pin1, new_pin2).await
        }
        Commands::CheckPin2 => check_pin2_command(&orchestrator).await,
        Commands::Send(args) => send_command(&orchestrator, &config, args).await,
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .init();
}
