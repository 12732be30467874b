//! Concierge CLI
//!
//! A travel concierge chat that remembers the traveller across sessions.

use clap::Parser;
use concierge::commands::{parse_command, Command};
use concierge::concierge_agent::LlmClient;
use concierge::memory::{NoteMerger, StateStore};
use concierge::session::Reply;
use concierge::{
    default_data_dir, search, ChatSession, ConciergeAgent, ConciergeConfig, ConversationWindow,
    ModelRuntime,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const LOG_FILE: &str = "concierge.log";

/// Concierge - travel planning assistant with long-term memory
#[derive(Parser, Debug)]
#[command(name = "concierge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Traveller whose profile and notes are loaded
    #[arg(short, long, default_value = "default")]
    user: String,

    /// Directory for config.toml and traveller state (default: ~/.concierge)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// User turns kept in the conversation window
    #[arg(long)]
    max_turns: Option<usize>,

    /// Model for conversational turns
    #[arg(long)]
    model: Option<String>,

    /// List travellers with saved state and exit
    #[arg(long)]
    list_users: bool,

    /// Verbose output: debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Send a single message and exit
    #[arg(trailing_var_arg = true)]
    prompt: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = match cli.data_dir.clone() {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    let _log_guard = init_logging(&data_dir, cli.verbose)?;

    let mut config = ConciergeConfig::new(data_dir, cli.user.clone())
        .load_overrides()
        .await;
    if let Some(turns) = cli.max_turns {
        config = config.with_max_turns(turns);
    }
    if let Some(model) = cli.model.clone() {
        config = config.with_model(model);
    }

    let store = StateStore::new(&config.data_dir).await?;
    if cli.list_users {
        for user in store.list_users().await? {
            println!("{}", user);
        }
        return Ok(());
    }

    info!("Data directory: {:?}", config.data_dir);
    let state = store.load_or_default(&config.user_id).await?.into_shared();

    let llm = LlmClient::from_config(&config)?;
    let merger: Arc<dyn NoteMerger> = Arc::new(llm.with_model(config.consolidation_model.clone()));
    let runtime: Arc<dyn ModelRuntime> = Arc::new(llm);

    let agent = ConciergeAgent::with_default_tools(runtime, state.clone(), search::from_env(), &config);
    let window = ConversationWindow::new(config.user_id.clone(), state.clone(), config.max_turns);
    let session = ChatSession::new(config.user_id.clone(), store, state, window, agent, merger);

    if !cli.prompt.is_empty() {
        let reply = session.chat(&cli.prompt.join(" ")).await;
        println!("{}", reply);
        return Ok(());
    }

    run_repl(&session, &config.user_id).await
}

/// Debug log file under `<data_dir>/logs`; only errors reach the console
/// unless `--verbose` or `RUST_LOG` say otherwise.
fn init_logging(data_dir: &Path, verbose: bool) -> anyhow::Result<WorkerGuard> {
    let (file_writer, guard) = log_file_writer(data_dir)?;

    let console_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"))
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(false)
                .with_filter(EnvFilter::new("debug")),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_filter),
        )
        .init();

    Ok(guard)
}

/// Non-blocking writer for `<data_dir>/logs/concierge.log`. The guard must
/// outlive logging or buffered lines are lost.
fn log_file_writer(data_dir: &Path) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(&log_dir, LOG_FILE);
    Ok(tracing_appender::non_blocking(file_appender))
}

async fn run_repl(session: &ChatSession, user_id: &str) -> anyhow::Result<()> {
    println!("Concierge ready for {}. Type /help for commands.", user_id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            // EOF behaves like /quit
            if let Reply::Quit(msg) = session.handle(Command::Quit).await {
                println!("\n{}", msg);
            }
            return Ok(());
        };

        let Some(command) = parse_command(&line) else {
            continue;
        };

        match session.handle(command).await {
            Reply::Text(text) => println!("{}\n", text),
            Reply::Quit(text) => {
                println!("{}", text);
                return Ok(());
            }
        }
    }
}
