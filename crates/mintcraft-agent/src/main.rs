//! MintCraft CLI: generate, mint and list AI content from a local wallet
//!
//! Each value-moving command runs the four-phase protocol against the
//! MintCraft authority and the ledger RPC. The wallet key stays local; the
//! authority only ever sees signed transactions.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mintcraft_agent_logic::config::BaseConfig;
use mintcraft_agent_logic::confirm::new_confirm_lock;
use mintcraft_agent_logic::coordinator::OperationCoordinator;
use mintcraft_agent_logic::error::{OperationFailure, Severity};
use mintcraft_agent_logic::ledger::JsonRpcLedger;
use mintcraft_agent_logic::notify::{FanoutSink, TracingSink};
use mintcraft_agent_logic::reconcile::ReconciliationJournal;
use mintcraft_agent_logic::rpc_client::AuthorityRpcClient;
use mintcraft_agent_logic::session::UserSession;
use mintcraft_agent_logic::sign::KeypairWallet;
use mintcraft_agent_logic::types::{ConfigScope, PendingOperation};

mod config;
mod console;

use console::ConsoleSink;

// ============================================================================
// CLI
// ============================================================================

#[derive(Parser)]
#[command(name = "mintcraft")]
#[command(about = "MintCraft agent: pay for AI content, mint it and list it")]
struct Cli {
    /// Path to agent configuration file
    #[arg(short, long, default_value = "agent.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Prompt for confirmation before signing each transaction
    #[arg(long, global = true)]
    confirm: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new wallet keypair and print it as env lines
    GenerateKeypair,
    /// List the AI models offered by the authority
    Models,
    /// Create the per-user configuration record for a program scope
    InitConfig {
        /// content | marketplace
        #[arg(long)]
        scope: ConfigScope,
    },
    /// Pay for and generate content from a prompt
    Generate {
        /// Model id (see `mintcraft models`)
        #[arg(long)]
        model: Option<u64>,
        #[arg(long)]
        prompt: String,
    },
    /// Mint previously generated content as an NFT
    Mint {
        #[arg(long)]
        content_id: u64,
    },
    /// List a minted NFT for sale
    List {
        /// Mint address of the NFT
        #[arg(long)]
        mint: String,
        /// Price in lamports
        #[arg(long)]
        price: u64,
        /// Marketplace id (default: [marketplace] in agent.toml)
        #[arg(long)]
        marketplace_id: Option<u64>,
    },
    /// Operations that may have moved funds without settling
    Reconcile {
        #[command(subcommand)]
        command: ReconcileCommands,
    },
}

#[derive(Subcommand)]
enum ReconcileCommands {
    /// Show journaled operations
    List,
    /// Retry settlement for a journaled operation
    Settle { id: u64 },
    /// Drop a journal entry without settling it
    Dismiss { id: u64 },
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Initialize logging (LOG_DESTINATION=console|file)
    mintcraft_agent_logic::logging::init_logging(
        cli.verbose,
        &["mintcraft", "mintcraft_agent_logic"],
        "mintcraft",
    );

    // Handle commands that don't need config first
    if let Commands::GenerateKeypair = &cli.command {
        return run_generate_keypair();
    }

    let base_config = config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    match cli.command {
        Commands::Models => run_models(base_config).await,
        Commands::Reconcile { command } => run_reconcile(base_config, command, cli.confirm).await,
        command => run_operation(base_config, command, cli.confirm).await,
    }
}

// ============================================================================
// Wiring
// ============================================================================

struct App {
    config: BaseConfig,
    authority: Arc<AuthorityRpcClient>,
    session: UserSession,
}

fn build_app(config: BaseConfig, confirm: bool) -> Result<App> {
    let mut wallet = KeypairWallet::from_base58(config::wallet_key(&config)?)?;
    if confirm || config.require_approval {
        wallet = wallet.with_approval(new_confirm_lock());
    }
    info!(wallet = %wallet.address(), "wallet loaded");

    let authority = Arc::new(
        AuthorityRpcClient::new(config.authority_config(), wallet.address())
            .context("Failed to build authority client")?,
    );
    let ledger =
        Arc::new(JsonRpcLedger::new(config.ledger_config()).context("Failed to build ledger client")?);
    let sink = FanoutSink::new()
        .with(Arc::new(ConsoleSink))
        .with(Arc::new(TracingSink));

    let coordinator = Arc::new(OperationCoordinator::new(
        authority.clone(),
        Arc::new(wallet),
        ledger,
        Arc::new(sink),
        config.finality_timeout(),
    ));
    let journal = ReconciliationJournal::open(&config.journal_path).with_context(|| {
        format!("Failed to open journal {}", config.journal_path.display())
    })?;
    let session = UserSession::new(coordinator)
        .with_journal(journal)
        .with_mint_defaults(config.mint_defaults())
        .with_marketplace(config.marketplace.marketplace_id);

    Ok(App {
        config,
        authority,
        session,
    })
}

/// Token cancelled on the first Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, cancelling operation");
            token.cancel();
        }
    });
    cancel
}

// ============================================================================
// Commands
// ============================================================================

fn run_generate_keypair() -> Result<()> {
    let (private_key, public_key) = mintcraft_agent_logic::sign::generate_keypair();
    println!("WALLET_PRIVATE_KEY={}", private_key);
    println!("WALLET_PUBLIC_KEY={}", public_key);
    Ok(())
}

async fn run_models(config: BaseConfig) -> Result<()> {
    // Catalog reads need no wallet; the address header is left empty
    let authority = AuthorityRpcClient::new(config.authority_config(), "")
        .context("Failed to build authority client")?;
    let models = authority.list_models().await.context("Failed to fetch models")?;
    console::print_models(&models);
    Ok(())
}

async fn run_operation(config: BaseConfig, command: Commands, confirm: bool) -> Result<()> {
    let app = build_app(config, confirm)?;
    let cancel = cancel_on_ctrl_c();

    let outcome: Result<PendingOperation, OperationFailure> = match command {
        Commands::InitConfig { scope } => {
            match app.session.initialize_config(scope, &cancel).await {
                Ok(result) => {
                    println!("{} configuration ready ({:?})", scope, result);
                    return Ok(());
                }
                Err(failure) => Err(failure),
            }
        }
        Commands::Generate { model, prompt } => {
            let catalog = app
                .authority
                .list_models()
                .await
                .context("Failed to fetch models")?;
            app.session
                .generate_content(&prompt, model, &catalog, &cancel)
                .await
        }
        Commands::Mint { content_id } => app.session.mint_nft(content_id, &cancel).await,
        Commands::List {
            mint,
            price,
            marketplace_id,
        } => match marketplace_id {
            Some(id) => app.session.list_nft_on(id, &mint, price, &cancel).await,
            None => app.session.list_nft(&mint, price, &cancel).await,
        },
        Commands::GenerateKeypair | Commands::Models | Commands::Reconcile { .. } => {
            bail!("command does not run an operation")
        }
    };

    match outcome {
        Ok(op) => {
            console::print_operation(&op, |sig| app.config.explorer_tx_url(sig));
            Ok(())
        }
        Err(failure) => report_failure(&app.config, failure),
    }
}

fn report_failure(config: &BaseConfig, failure: OperationFailure) -> Result<()> {
    let error = &failure.error;
    let tx_url = |sig: &str| config.explorer_tx_url(sig);
    eprintln!("{}", error.user_message(Some(&tx_url)));
    match error.severity() {
        Severity::Error => {}
        Severity::RecoverableWarning | Severity::UnknownOutcome => {
            eprintln!(
                "Recorded in {}; run `mintcraft reconcile list` to follow up",
                config.journal_path.display()
            );
        }
    }
    let kind = failure
        .operation
        .as_ref()
        .map(|op| op.kind().to_string())
        .unwrap_or_else(|| "operation".to_string());
    bail!("{} failed in {} phase", kind, error.phase())
}

async fn run_reconcile(config: BaseConfig, command: ReconcileCommands, confirm: bool) -> Result<()> {
    match command {
        ReconcileCommands::List => {
            let journal = ReconciliationJournal::open(&config.journal_path)?;
            console::print_journal(journal.entries());
            Ok(())
        }
        ReconcileCommands::Settle { id } => {
            let app = build_app(config, confirm)?;
            let cancel = cancel_on_ctrl_c();
            let result = app.session.resettle(id, &cancel).await?;
            println!("Entry #{} settled: {:?}", id, result);
            Ok(())
        }
        ReconcileCommands::Dismiss { id } => {
            let mut journal = ReconciliationJournal::open(&config.journal_path)?;
            match journal.remove(id)? {
                Some(entry) => println!("Dismissed #{} ({})", id, entry.kind),
                None => bail!("journal entry {} not found", id),
            }
            Ok(())
        }
    }
}
