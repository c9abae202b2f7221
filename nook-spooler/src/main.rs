//! nook-spooler CLI
//!
//! `run` is the daemon; the other subcommands are operator tools. redb holds
//! an exclusive lock on the queue file, so queue subcommands (`submit`,
//! `status`, `requeue`, `list`) run while the daemon is stopped.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use nook_printer::{Discovery, FallbackStore, ReliableTransmitter};

use nook_spooler::printing::DEFAULT_PRIORITY;
use nook_spooler::{
    BackgroundTasks, Config, JobCorrelation, JobStatus, PrintJobQueue, ReceiptData,
    ReceiptPrintService, SpoolerState, print_banner, setup_environment,
};

#[derive(Parser, Debug)]
#[command(name = "nook-spooler")]
#[command(author, version, about = "Receipt print queue and spooler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the print queue worker until Ctrl-C
    Run,

    /// Show which printer transport would be used right now
    Discover,

    /// Encode a receipt without printing it
    Preview {
        /// Receipt JSON file
        receipt: PathBuf,

        /// Write the ESC/POS bytes here instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Queue a receipt for printing
    Submit {
        /// Receipt JSON file
        receipt: PathBuf,

        /// Higher prints first
        #[arg(long, default_value_t = DEFAULT_PRIORITY)]
        priority: i32,

        /// Session id for traceability
        #[arg(long)]
        session: Option<String>,

        /// User id for traceability
        #[arg(long)]
        user: Option<String>,
    },

    /// Show the status of a print job
    Status {
        job_id: String,
    },

    /// Put a failed print job back in the queue
    Requeue {
        job_id: String,
    },

    /// List print jobs, newest first
    List {
        /// pending, processing, completed or failed
        #[arg(long)]
        status: Option<JobStatus>,

        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Print a receipt immediately, bypassing the queue
    TestPrint {
        /// Receipt JSON file
        receipt: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 设置环境 (dotenv, 日志) 并加载配置
    let config = setup_environment();

    match cli.command {
        Commands::Run => run_daemon(config).await,
        Commands::Discover => {
            let discovery = Discovery::standard(&config.discovery());
            match discovery.discover().await {
                Some(channel) => println!("{} ({})", channel, channel.kind()),
                None => println!("No printer transport available"),
            }
            Ok(())
        }
        Commands::Preview { receipt, out } => {
            let receipt = read_receipt(&receipt)?;
            let bytes = config.encoder().encode(&receipt);
            match out {
                Some(path) => {
                    std::fs::write(&path, &bytes)
                        .with_context(|| format!("Cannot write {}", path.display()))?;
                    println!("{} bytes written to {}", bytes.len(), path.display());
                }
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&bytes)?;
                }
            }
            Ok(())
        }
        Commands::Submit {
            receipt,
            priority,
            session,
            user,
        } => {
            let receipt = read_receipt(&receipt)?;
            let state = SpoolerState::initialize(&config)?;
            let correlation = JobCorrelation {
                session_id: session,
                user_id: user,
            };
            let id = state
                .print_service
                .submit_receipt(&receipt, correlation, priority)?;
            println!("{}", id);
            Ok(())
        }
        Commands::Status { job_id } => {
            let state = SpoolerState::initialize(&config)?;
            let view = state.print_service.get_job_status(&job_id)?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        Commands::Requeue { job_id } => {
            let state = SpoolerState::initialize(&config)?;
            let view = state.print_service.requeue(&job_id)?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        Commands::List { status, limit } => {
            let state = SpoolerState::initialize(&config)?;
            for job in state.print_service.list_jobs(status, limit)? {
                println!(
                    "{}  {:<10}  p={:<3} retries={}  {}",
                    job.id,
                    job.status,
                    job.priority,
                    job.retry_count,
                    job.error.as_deref().unwrap_or("")
                );
            }
            println!("{}", serde_json::to_string(&state.print_service.stats()?)?);
            Ok(())
        }
        Commands::TestPrint { receipt } => {
            let receipt = read_receipt(&receipt)?;
            // Direct print bypasses the queue file
            let service = ReceiptPrintService::new(
                PrintJobQueue::open_in_memory()?,
                config.encoder(),
                Discovery::standard(&config.discovery()),
                ReliableTransmitter::new(
                    config.transmit_policy(),
                    FallbackStore::new(config.fallback_dir()),
                ),
            );
            let channel = service.print_direct(&receipt).await?;
            println!("Printed via {}", channel);
            Ok(())
        }
    }
}

async fn run_daemon(config: Config) -> anyhow::Result<()> {
    print_banner();
    tracing::info!("Nook spooler starting...");

    let state = SpoolerState::initialize(&config)?;
    let mut tasks = BackgroundTasks::new();
    state.start_background_tasks(&mut tasks);

    let signal = shutdown_signal();
    tokio::pin!(signal);
    let mut health = tokio::time::interval(Duration::from_secs(30));

    loop {
        tokio::select! {
            _ = &mut signal => break,
            _ = health.tick() => {
                tasks.check_health();
            }
        }
    }

    tasks.shutdown().await;
    Ok(())
}

fn read_receipt(path: &Path) -> anyhow::Result<ReceiptData> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid receipt JSON in {}", path.display()))
}

/// Graceful shutdown handler
///
/// Listens for SIGTERM and Ctrl+C signals
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
