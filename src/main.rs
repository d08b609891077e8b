use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chatterm_core::{
    ChatService, ClientOptions, ConcurrencyPolicy, Config, ConversationClient, HttpChatService,
    ThinkDelay,
};
use clap::Parser;
use tracing::info;

mod app;
mod handler;
mod logging;
mod renderer;
mod tui;
mod ui;

use app::App;
use renderer::ChannelRenderer;
use tui::{AppEvent, EventHandler, Tui};

#[derive(Parser)]
#[command(name = "chatterm")]
#[command(about = "Terminal chat client for a JSON-over-HTTP chat service")]
struct Cli {
    /// Chat service base URL, e.g. http://localhost:8000
    #[arg(short, long)]
    base_url: Option<String>,

    /// Config file to use instead of the one in the user config directory
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where to write logs
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Let Enter send while a reply is still pending
    #[arg(long)]
    allow_concurrent: bool,

    /// Skip the simulated thinking pause before each request
    #[arg(long)]
    no_think_delay: bool,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load().context("loading config")?,
    };

    if let Some(url) = &cli.base_url {
        config.base_url = url.clone();
    }
    if cli.allow_concurrent {
        config.concurrency = ConcurrencyPolicy::Allow;
    }
    if cli.no_think_delay {
        config.think_delay = ThinkDelay::none();
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let log_path = match &cli.log_file {
        Some(path) => path.clone(),
        None => logging::default_log_path()?,
    };
    logging::init(&log_path, config.log_level.as_deref())?;
    info!(base_url = config.service_url(), "starting chatterm");

    let service = HttpChatService::with_timeout(config.service_url(), config.request_timeout())?;

    let mut events = EventHandler::new();
    let client = ConversationClient::new(
        Arc::new(service) as Arc<dyn ChatService>,
        ChannelRenderer::new(events.sender()),
        ClientOptions::from(&config),
    );
    let mut app = App::new(client, config.service_url());

    // Health check runs once in the background; the UI is usable meanwhile
    let probe = app.client.clone();
    let tx = events.sender();
    tokio::spawn(async move {
        let healthy = probe.probe_health().await;
        let _ = tx.send(AppEvent::Health(healthy));
    });

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    info!(messages = app.log.len(), "chatterm exiting");
    result
}

async fn run(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    loop {
        terminal.draw(|frame| ui::render(app, frame))?;

        let Some(event) = events.next().await else {
            break;
        };
        handler::handle_event(app, event);

        // Apply everything already queued before drawing again
        while let Some(event) = events.try_next() {
            handler::handle_event(app, event);
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}
