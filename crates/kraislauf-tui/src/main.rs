use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use kraislauf_core::{Config, Conversation, HttpAssistantClient};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;

#[derive(Parser)]
#[command(name = "kraislauf")]
#[command(about = "Chat with the kraislauf recycling assistant")]
#[command(version)]
struct Cli {
    /// Base URL of the assistant service (overrides KRAISLAUF_API_URL and the config file)
    #[arg(long)]
    api_url: Option<String>,

    /// Give up on a request after this many seconds (0 waits forever)
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Replay at most this many earlier messages with each question
    #[arg(long, value_name = "N")]
    history_limit: Option<usize>,

    /// Write logs here instead of the default data directory
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,

    /// Persist the resolved settings to the config file
    #[arg(long)]
    save_config: bool,
}

impl Cli {
    fn overrides(&self) -> Config {
        Config {
            api_url: self.api_url.clone(),
            request_timeout_secs: self.timeout,
            history_limit: self.history_limit,
            greeting: None,
        }
    }
}

/// The terminal belongs to the UI, so logs go to a file.
fn init_logging(cli: &Cli) -> Result<PathBuf> {
    let log_path = match &cli.log_file {
        Some(path) => path.clone(),
        None => dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("kraislauf")
            .join("kraislauf.log"),
    };
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Could not open log file {}", log_path.display()))?;

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("kraislauf_tui={default_level},kraislauf_core={default_level}").into()
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .init();

    Ok(log_path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_path = init_logging(&cli)?;

    let config = Config::load().context("Failed to load config")?;
    let settings = config.resolve(&cli.overrides());
    info!(
        api_url = %settings.api_url,
        log = %log_path.display(),
        "Starting kraislauf"
    );

    if cli.save_config {
        let path = Config::from(&settings).save()?;
        info!("Saved settings to {}", path.display());
    }

    let client = HttpAssistantClient::new(&settings.api_url).with_timeout(settings.request_timeout);
    let conversation = Conversation::new(Arc::new(client), &settings.greeting)
        .with_history_limit(settings.history_limit);
    let mut app = App::new(conversation, &settings.api_url);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    let result = run(&mut terminal, &mut events, &mut app).await;

    tui::restore()?;
    result
}

async fn run(
    terminal: &mut tui::Tui,
    events: &mut tui::EventHandler,
    app: &mut App,
) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    info!("Exiting");
    Ok(())
}
