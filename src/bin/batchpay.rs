use std::path::PathBuf;

use anyhow::{anyhow, bail};
use batchpay::batch::{BatchTransfer, TransferMode, TransferOutcome, TransferRequest};
use batchpay::config::{AppConfig, ConfigError, EnsMode};
use batchpay::donation::{donate, filter_profiles, find_profile};
use batchpay::ens::{EnsRegistryResolver, IndexerResolver, NameResolver};
use batchpay::eth::Provider;
use batchpay::logging::{init_logging, LogFormat};
use batchpay::wallet::{parse_address, Wallet};
use clap::{Parser, Subcommand};
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "batchpay", version, about = "Send ETH and ERC20 tokens, one or many at a time")]
struct Cli {
    /// TOML configuration file; BATCHPAY_* environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the connected account
    Account,
    /// Show the connected account's balance
    Balance {
        /// ERC20 token contract; native currency when omitted
        #[arg(long)]
        token: Option<String>,
    },
    /// Send ether to an address or ENS name
    Send {
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: String,
    },
    /// Pay several recipients in one batch-contract call
    Batch {
        /// Comma-separated addresses or ENS names
        #[arg(long)]
        recipients: String,
        /// Comma-separated amounts, paired with recipients by position
        #[arg(long)]
        amounts: String,
        /// ERC20 token contract; native currency when omitted
        #[arg(long)]
        token: Option<String>,
    },
    /// List donation profiles
    Profiles {
        /// Filter by name or ENS name
        #[arg(long, default_value = "")]
        search: String,
    },
    /// Donate ether to a profile
    Donate {
        /// Profile id
        #[arg(long)]
        profile: String,
        #[arg(long)]
        amount: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_logging(&cli.log_level, format)?;

    let config = AppConfig::load(cli.config.as_deref())?;
    debug!(rpc_url = %config.rpc_url, chain_id = config.chain_id, "configuration loaded");

    if let Command::Profiles { search } = &cli.command {
        for profile in filter_profiles(&config.profiles, search) {
            println!(
                "{:<4} {:<24} {:<20} {}",
                profile.id, profile.name, profile.ens, profile.address
            );
        }
        return Ok(());
    }

    let provider = Provider::new(config.rpc_url.clone(), config.chain_id, config.rpc_timeout())?;
    provider.verify_chain_id().await?;

    let wallet = Wallet::new(
        provider.clone(),
        config.signer()?,
        config.confirmation_policy(),
    );
    let resolver: Box<dyn NameResolver> = match config.ens.mode {
        EnsMode::Registry => Box::new(EnsRegistryResolver::with_registry(
            provider,
            config.ens.registry,
        )),
        EnsMode::Indexer => {
            let url = config
                .ens
                .indexer_url
                .clone()
                .ok_or(ConfigError::MissingIndexerUrl)?;
            Box::new(IndexerResolver::new(url)?)
        }
    };
    let transfers = BatchTransfer::new(wallet, resolver, config.batch_contract)
        .with_name_matcher(config.name_matcher());

    match cli.command {
        Command::Account => println!("{}", transfers.account()),
        Command::Balance { token } => {
            let mode = transfer_mode(token.as_deref())?;
            let balance = transfers.balance(mode).await?;
            let unit = match mode {
                TransferMode::Native => "ETH".to_string(),
                TransferMode::Token(token) => transfers.ledger().token_symbol(token).await,
            };
            println!("{} {}", balance, unit);
        }
        Command::Send { to, amount } => {
            let receipt = transfers.send_native(&to, &amount).await?;
            println!("sent {} ETH to {} in {}", amount, to, receipt.hash);
        }
        Command::Batch {
            recipients,
            amounts,
            token,
        } => {
            let mode = transfer_mode(token.as_deref())?;
            let request = TransferRequest::from_lists(&recipients, &amounts);
            match transfers.submit_batch(&request, mode).await {
                TransferOutcome::Success(receipt) => println!(
                    "batch of {} transfers confirmed in block {} ({})",
                    request.recipients().len(),
                    receipt.block_number,
                    receipt.hash
                ),
                TransferOutcome::Failed(e) => return Err(e.into()),
                TransferOutcome::Pending => bail!("batch submission did not complete"),
            }
        }
        Command::Donate { profile, amount } => {
            let profile = find_profile(&config.profiles, &profile)
                .ok_or_else(|| anyhow!("no profile with id {}", profile))?;
            let receipt = donate(&transfers, profile, &amount).await?;
            println!(
                "your donation to {} has been sent ({})",
                profile.name, receipt.hash
            );
        }
        Command::Profiles { .. } => {}
    }

    Ok(())
}

fn transfer_mode(token: Option<&str>) -> anyhow::Result<TransferMode> {
    Ok(match token {
        Some(token) => TransferMode::Token(parse_address(token)?),
        None => TransferMode::Native,
    })
}
