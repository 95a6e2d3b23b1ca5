// parley-agent/src/main.rs
mod echo;
mod interrupt;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use parley_core::services::{StreamEvent, TurnOutcome, TurnStore};
use parley_core::{parley_root, Runtime};

use crate::echo::EchoBackend;
use crate::interrupt::TurnInterrupts;

#[derive(Parser, Debug)]
#[command(
    name = "parley-agent",
    about = "Run chat turns through the parley intake pipeline"
)]
struct Cli {
    /// Data root (defaults to $PARLEY_ROOT or .parley)
    #[arg(long)]
    root: Option<PathBuf>,
    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    json_logs: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one message (--message) or every stdin line as a turn
    Chat {
        #[arg(long, default_value = "guest")]
        identity: String,
        #[arg(long)]
        message: Option<String>,
        /// Print outcomes as JSON instead of streaming text
        #[arg(long)]
        json: bool,
        /// Delay between echoed chunks
        #[arg(long, default_value_t = 0)]
        chunk_delay_ms: u64,
    },
    /// Show stored turns for an identity, oldest first
    History {
        #[arg(long, default_value = "guest")]
        identity: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Delete stored turns for an identity
    Clear {
        #[arg(long, default_value = "guest")]
        identity: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let root = cli.root.clone().unwrap_or_else(parley_root);

    match cli.command {
        Command::Chat {
            identity,
            message,
            json,
            chunk_delay_ms,
        } => {
            let backend = Arc::new(EchoBackend::new(Duration::from_millis(chunk_delay_ms)));
            let rt = Runtime::open(&root, backend)
                .with_context(|| format!("opening runtime at {}", root.display()))?;
            tracing::info!(root = %root.display(), "chat session started");
            let interrupts = TurnInterrupts::new();
            let listener = interrupts.listen();
            match message {
                Some(text) => run_turn(&rt, &interrupts, &text, &identity, json).await?,
                None => {
                    let mut lines = BufReader::new(tokio::io::stdin()).lines();
                    while let Some(line) = lines.next_line().await.context("reading stdin")? {
                        run_turn(&rt, &interrupts, &line, &identity, json).await?;
                    }
                }
            }
            listener.abort();
            rt.orchestrator.drain_pending().await;
        }
        Command::History {
            identity,
            limit,
            json,
        } => {
            let rt = Runtime::open(&root, Arc::new(EchoBackend::default()))?;
            let turns = rt.store.list_recent(&identity, limit).await?;
            for turn in turns {
                if json {
                    println!("{}", serde_json::to_string(&turn)?);
                    continue;
                }
                let mark = if turn.fallback { " (fallback)" } else { "" };
                println!(
                    "[{}] {} you: {}",
                    turn.created_at.format("%Y-%m-%d %H:%M:%S"),
                    turn.locale,
                    turn.user_text
                );
                println!("    reply{}: {}", mark, turn.response_text);
            }
        }
        Command::Clear { identity } => {
            let rt = Runtime::open(&root, Arc::new(EchoBackend::default()))?;
            let removed = rt.store.clear(&identity).await?;
            println!("removed {} turn(s) for {}", removed, identity);
        }
    }
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Run one turn; Ctrl-C cancels the turn in flight.
async fn run_turn(
    rt: &Runtime,
    interrupts: &TurnInterrupts,
    text: &str,
    identity: &str,
    json: bool,
) -> Result<()> {
    let cancel = interrupts.begin();

    let mut shown = 0usize;
    let sink = move |event: StreamEvent| {
        if json {
            return;
        }
        let mut out = std::io::stdout().lock();
        let _ = match event {
            StreamEvent::Partial { text, .. } => {
                let delta = text.get(shown..).unwrap_or_default();
                shown = text.len();
                write!(out, "{}", delta)
            }
            StreamEvent::Completed { .. } => writeln!(out),
            StreamEvent::Fallback { text, .. } => {
                if shown > 0 {
                    let _ = writeln!(out);
                }
                writeln!(out, "{}", text)
            }
            StreamEvent::Cancelled { .. } => writeln!(out, " [cancelled]"),
        };
        let _ = out.flush();
    };

    let outcome = rt
        .orchestrator
        .handle_turn_cancellable(text, identity, sink, cancel)
        .await;
    interrupts.end();

    if json {
        println!("{}", serde_json::to_string(&outcome)?);
        return Ok(());
    }
    match outcome {
        TurnOutcome::Rejected { message, .. } => println!("{}", message),
        TurnOutcome::RateLimited { message, remaining, .. } => {
            println!("{} ({} left)", message, remaining)
        }
        TurnOutcome::Completed { .. } | TurnOutcome::Cancelled { .. } => {}
    }
    Ok(())
}
