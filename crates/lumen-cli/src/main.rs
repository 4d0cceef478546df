//! lumen - desktop ask assistant CLI

mod account;
mod config;
mod storage;
mod surface;

use anyhow::Context;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use lumen_ask::{
    AskConfig, AskEvent, AskOrchestrator, ChatTransport, HistoryInput, HttpTransport,
    SubmitOptions,
};

use crate::{
    account::FileAccount, config::Config, storage::JsonlSessionStore, surface::TerminalSurface,
};

/// lumen - ask a question, get a streamed answer
#[derive(Parser, Debug)]
#[command(name = "lumen")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The question to ask
    question: Option<String>,

    /// Path to a base64-encoded JPEG screenshot to attach
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Treat this as a camera-triggered request
    #[arg(long)]
    camera: bool,

    /// Treat this as a live-insights request
    #[arg(long)]
    live_insights: bool,

    /// Transcript line to include as context (repeatable)
    #[arg(long = "transcript")]
    transcript: Vec<String>,

    /// Persona for the standard prompt path
    #[arg(long)]
    persona: Option<String>,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Log in the local account
    #[arg(long)]
    login: bool,

    /// Log out the local account
    #[arg(long)]
    logout: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "lumen=debug" } else { "lumen=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if args.init_config {
        let path = Config::init()?;
        println!("Config file: {}", path.display());
        return Ok(());
    }

    let account = Arc::new(FileAccount::load());
    if args.login {
        account.login()?;
        println!("Logged in.");
        return Ok(());
    }
    if args.logout {
        account.logout()?;
        println!("Logged out.");
        return Ok(());
    }

    let question = args
        .question
        .context("a question is required (see --help)")?;

    let config = Config::load();
    let transport = config
        .model_config()
        .map(|model| Arc::new(HttpTransport::new(model)) as Arc<dyn ChatTransport>);

    let orchestrator = Arc::new(AskOrchestrator::new(
        AskConfig {
            persona: args.persona.unwrap_or_else(|| config.persona()),
        },
        transport,
        account.clone(),
        Arc::new(JsonlSessionStore::new()),
        account.clone(),
        Arc::new(TerminalSurface),
    ));

    let mut events = orchestrator.subscribe();
    let printer = tokio::spawn(async move {
        let mut printed = 0usize;
        while let Ok(event) = events.recv().await {
            match event {
                AskEvent::StateUpdate { state } => {
                    if state.current_response.len() > printed {
                        print!("{}", &state.current_response[printed..]);
                        std::io::stdout().flush().ok();
                        printed = state.current_response.len();
                    }
                }
                AskEvent::StreamError { error } => {
                    eprintln!("error: {}", error);
                }
            }
        }
    });

    let screenshot_base64 = match args.screenshot {
        Some(path) => Some(
            std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read screenshot {}", path.display()))?
                .trim()
                .to_string(),
        ),
        None => None,
    };
    let history = if args.transcript.is_empty() {
        None
    } else {
        Some(HistoryInput::RawTranscript(args.transcript))
    };

    let result = orchestrator
        .submit(
            &question,
            SubmitOptions {
                history,
                screenshot_base64,
                from_camera: args.camera,
                from_live_insights: args.live_insights,
                ..Default::default()
            },
        )
        .await;

    // Dropping the orchestrator closes the broadcast channel and ends the
    // printer task once it has drained.
    drop(orchestrator);
    printer.await.ok();
    println!();

    result.map_err(|e| anyhow::anyhow!(e))
}
