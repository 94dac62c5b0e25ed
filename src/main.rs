use std::{io::Write, path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};

use proofport_client::{
    config::{self, Config},
    error::SessionError,
    issuer::PortalIssuer,
    presenter,
    proof::{ChainSelector, VerifyMode},
    session::{SessionEvent, VerificationSession},
    verifier::{
        Verifiers,
        evm::{EvmVerifier, hide_api_key},
        solana::SolanaVerifier,
    },
};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// TOML config file, defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "base")]
    chain: ChainSelector,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Acquire a proof and verify it
    Run {
        #[arg(long, default_value = "onchain")]
        mode: VerifyMode,
        /// Fetch a fresh proof and retry once when verification fails
        #[arg(long)]
        regenerate_on_failure: bool,
    },
    /// Acquire a proof and write it as JSON
    Export {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the verifier contract link for the chain
    Link,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::rfc_3339())
        .init();
}

fn build_session(config: &Config) -> Result<VerificationSession> {
    let issuer = PortalIssuer::new(&config.issuer)?
        .on_portal_opened(|opened| println!("{}", presenter::portal_line(&opened.portal_url)));
    let base = EvmVerifier::from_config(&config.base).context("Failed to build Base verifier")?;
    let solana =
        SolanaVerifier::from_config(&config.solana).context("Failed to build Solana verifier")?;
    let verifiers = Verifiers::new(Arc::new(base), Arc::new(solana))?;

    Ok(VerificationSession::new(Arc::new(issuer), verifiers))
}

fn print_events(
    events: &mut broadcast::Receiver<SessionEvent>,
    out: &mut impl Write,
) -> Result<()> {
    while let Ok(event) = events.try_recv() {
        for line in presenter::event_lines(&event) {
            writeln!(out, "{line}")?;
        }
    }

    Ok(())
}

/// `false` when the portal did not deliver; the reason was already printed.
async fn acquire(
    session: &mut VerificationSession,
    chain: ChainSelector,
    events: &mut broadcast::Receiver<SessionEvent>,
    out: &mut impl Write,
) -> Result<bool> {
    let acquired = session.request_proof(chain).await;
    print_events(events, out)?;

    match acquired {
        Ok(()) => {
            for line in presenter::status_lines(session) {
                writeln!(out, "{line}")?;
            }
            Ok(true)
        }
        Err(SessionError::Acquisition(_)) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Returns whether the final attempt verified.
async fn run(
    session: &mut VerificationSession,
    chain: ChainSelector,
    mode: VerifyMode,
    regenerate_on_failure: bool,
    out: &mut impl Write,
) -> Result<bool> {
    let mut events = session.subscribe();

    if !acquire(session, chain, &mut events, out).await? {
        return Ok(false);
    }

    let mut result = session.verify(mode).await?;
    print_events(&mut events, out)?;

    if !result.is_success() && regenerate_on_failure {
        warn!("Verification failed, regenerating proof for another attempt");
        if !acquire(session, chain, &mut events, out).await? {
            return Ok(false);
        }

        result = session.verify(mode).await?;
        print_events(&mut events, out)?;
    }

    Ok(result.is_success())
}

async fn export(
    session: &mut VerificationSession,
    chain: ChainSelector,
    output: Option<PathBuf>,
    out: &mut impl Write,
) -> Result<bool> {
    let mut events = session.subscribe();

    if !acquire(session, chain, &mut events, out).await? {
        return Ok(false);
    }

    let json = session
        .export_proof_json()
        .context("Session holds no proof to export")??;

    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write proof to {}", path.display()))?;
            info!("Proof written to {}", path.display());
        }
        None => writeln!(out, "{json}")?,
    }

    Ok(true)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv::dotenv().ok();
    init_logging();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    info!(
        "Using Base RPC {} and Solana RPC {} ({})",
        hide_api_key(&config.base.rpc_http_url),
        hide_api_key(&config.solana.rpc_http_url),
        config.solana.cluster
    );
    if config::get_base_relayer_private_key().is_none() {
        info!("`BASE_RELAYER_PRIVATE_KEY` is not set, on-chain Base verification is unavailable");
    }

    let mut stdout = std::io::stdout();
    let succeeded = match args.command {
        Command::Link => {
            let link = config.verifier_link(args.chain).with_context(|| {
                format!("No verifier is configured for {}", args.chain.display_name())
            })?;
            println!("{link}");
            true
        }
        Command::Run {
            mode,
            regenerate_on_failure,
        } => {
            let mut session = build_session(&config)?;
            run(&mut session, args.chain, mode, regenerate_on_failure, &mut stdout).await?
        }
        Command::Export { output } => {
            let mut session = build_session(&config)?;
            export(&mut session, args.chain, output, &mut stdout).await?
        }
    };

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
