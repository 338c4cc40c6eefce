//! chatapp CLI — chat with the LLM server selected by profile name.
//!
//! Usage:
//!   chatapp <PROFILE>                    — Chat using a server from ./llms.yaml
//!   chatapp <PROFILE> --config my.yaml   — Use another server file

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use chatapp_core::config::{resolve_config_path, ProviderRegistry, DEFAULT_FILE_NAME};
use chatapp_core::provider::{ImplementationRegistry, LlmProvider, ProviderFactory};
use chatapp_core::session::ChatSession;

/// Timeout applied to every backend HTTP request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Parser, Debug)]
#[command(
    name = "chatapp",
    version,
    about = "Chat with an LLM server picked from llms.yaml",
    long_about = "chatapp — a single-session terminal chat shell.\n\nThe server file lists named profiles; pass the profile to use as the only argument."
)]
struct Cli {
    /// Name of the server profile to chat with
    profile: String,

    /// Server file (default: ./llms.yaml, then ~/.chatapp/llms.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    // Usage errors exit here, before any file is touched.
    let cli = Cli::parse();

    // API keys usually live in .env.
    match ignore_missing(dotenvy::dotenv()) {
        Ok(Some(path)) => debug!(path = %path.display(), "Loaded .env"),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Failed to load .env"),
    }

    let mut session = start_session(&cli)?;
    run_repl(&mut session, &cli.profile).await
}

// ── Startup ─────────────────────────────────────────────────────────

/// A missing `.env` is fine; anything else is an error.
fn ignore_missing<T>(result: dotenvy::Result<T>) -> dotenvy::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

fn start_session(cli: &Cli) -> Result<ChatSession> {
    let home = dirs::home_dir();
    let path = resolve_config_path(
        cli.config.as_deref(),
        Path::new(DEFAULT_FILE_NAME),
        home.as_deref(),
    );
    let servers = ProviderRegistry::load(&path)?;

    let client = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;
    let factory = ProviderFactory::new(ImplementationRegistry::with_builtins(client));

    let instance = factory.resolve(&servers, &cli.profile).map_err(|e| {
        if matches!(e, chatapp_core::Error::ProviderNotFound { .. }) {
            anyhow::anyhow!(
                "{}. Servers in {}: {}",
                e,
                path.display(),
                servers.names().join(", ")
            )
        } else {
            e.into()
        }
    })?;

    println!();
    println!("  chatapp v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Profile: {} | Backend: {} | Model: {}",
        instance.profile(),
        instance.class(),
        instance.model()
    );
    println!("  Config: {}", path.display());
    println!();
    println!("  Type your message, or /help for commands.");
    println!("  ─────────────────────────────────────");
    println!();

    Ok(ChatSession::new(Box::new(instance)))
}

// ── Chat loop ───────────────────────────────────────────────────────

enum Command {
    Quit,
    Clear,
    History,
    Summary,
    Help,
    Message,
}

fn parse_command(input: &str) -> Command {
    match input {
        "/quit" | "/exit" | "/q" => Command::Quit,
        "/clear" => Command::Clear,
        "/history" => Command::History,
        "/summary" => Command::Summary,
        "/help" => Command::Help,
        _ => Command::Message,
    }
}

async fn run_repl(session: &mut ChatSession, profile: &str) -> Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("  \x1b[36m{}>\x1b[0m ", profile);
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            // EOF
            println!();
            break;
        };
        let line = line?;
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match parse_command(input) {
            Command::Quit => {
                println!("  Goodbye!");
                break;
            }
            Command::Clear => {
                session.clear();
                println!("  Session cleared.");
            }
            Command::History => print_history(session),
            Command::Summary => {
                if session.summary().is_empty() {
                    println!("  (no summary yet)");
                } else {
                    println!("  {}", session.summary());
                }
            }
            Command::Help => {
                println!("  /history  show this session's messages");
                println!("  /summary  show the memory summary");
                println!("  /clear    forget the conversation");
                println!("  /quit     leave");
            }
            Command::Message => {
                println!();
                match session.send(input).await {
                    Ok(response) => println!("  \x1b[32m{}\x1b[0m\n", response),
                    Err(e) => eprintln!("  \x1b[31mError: {:#}\x1b[0m\n", e),
                }
            }
        }
    }

    Ok(())
}

fn print_history(session: &ChatSession) {
    if session.transcript().is_empty() {
        println!("  No messages yet.");
        return;
    }
    println!();
    for turn in session.transcript() {
        println!("  [{}] {}: {}", turn.timestamp, turn.role, turn.content);
    }
    println!();
}
