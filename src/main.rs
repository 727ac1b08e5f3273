use anyhow::Result;
use clap::Parser;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

mod ai;
mod app;
mod art;
mod config;
mod handler;
mod session;
mod speech;
mod tui;
mod ui;

use app::App;
use config::Config;

#[derive(Parser)]
#[command(name = "nexus")]
#[command(about = "Terminal learning companion with AI chat, tutoring, and art generation")]
struct Cli {
    /// Text model to chat with
    #[arg(long)]
    model: Option<String>,

    /// Image model for art generation
    #[arg(long)]
    image_model: Option<String>,

    /// Transcriber command enabling voice input
    #[arg(long)]
    speech_command: Option<String>,

    /// Directory artwork downloads are written to
    #[arg(long)]
    download_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let mut config = Config::load().unwrap_or_else(|_| Config::new());
    if cli.model.is_some() {
        config.model = cli.model;
    }
    if cli.image_model.is_some() {
        config.image_model = cli.image_model;
    }
    if cli.speech_command.is_some() {
        config.speech_command = cli.speech_command;
    }
    if cli.download_dir.is_some() {
        config.download_dir = cli.download_dir;
    }

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut events = tui::EventHandler::new();
    let mut app = App::new(config, events.sender());

    let result = run(&mut terminal, &mut events, &mut app).await;

    tui::restore()?;
    result
}

async fn run(
    terminal: &mut tui::Tui,
    events: &mut tui::EventHandler,
    app: &mut App,
) -> Result<()> {
    loop {
        terminal.draw(|frame| ui::render(app, frame))?;

        if let Some(event) = events.next().await {
            handler::handle_event(app, event)?;
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

/// Logs go to a file; the TUI owns stderr.
fn init_logging() -> Result<()> {
    let log_path = Config::log_path()?;
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let log_file = OpenOptions::new().create(true).append(true).open(log_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("NEXUS_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();

    Ok(())
}
