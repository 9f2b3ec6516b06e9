use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use nhakhoa_core::{BookingClient, Config};

mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, Tui};

#[derive(Parser)]
#[command(name = "nhakhoa")]
#[command(about = "Book a dental appointment by chatting with the clinic's AI assistant")]
struct Cli {
    /// Booking API base URL (overrides config and NHAKHOA_API_URL)
    #[arg(long)]
    api_url: Option<String>,
    /// Clinic website base URL used for payment and appointment links
    #[arg(long)]
    web_url: Option<String>,
    /// Access token sent as a bearer token
    #[arg(long)]
    token: Option<String>,
    /// Log file path
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Save the effective settings to the config file and exit
    #[arg(long)]
    save_config: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.api_url {
            config.api_base_url = url.clone();
        }
        if let Some(url) = &self.web_url {
            config.web_base_url = url.clone();
        }
        if let Some(token) = &self.token {
            config.access_token = Some(token.clone());
        }
        if let Some(path) = &self.log_file {
            config.log_file = Some(path.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    cli.apply(&mut config);

    if cli.save_config {
        config.save()?;
        println!("Saved settings to {}", Config::get_config_path()?.display());
        return Ok(());
    }

    logging::init_tracing(&config.log_path()?)?;
    tracing::info!(api = %config.api_base_url, "starting booking assistant");

    let client = BookingClient::from_config(&config)?;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();
    let mut app = App::new(config, Arc::new(client), events.sender());

    let result = run(&mut terminal, &mut app, &mut events).await;

    // Drop background tasks before handing the terminal back
    drop(app);
    tui::restore()?;

    if let Err(e) = &result {
        tracing::error!(error = %e, "booking assistant exited with error");
    }
    result
}

async fn run(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags_override_config() {
        let cli = Cli::parse_from([
            "nhakhoa",
            "--api-url",
            "https://api.nhakhoa.test",
            "--token",
            "abc",
        ]);
        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config.api_base_url, "https://api.nhakhoa.test");
        assert_eq!(config.access_token.as_deref(), Some("abc"));
        assert_eq!(config.web_base_url, nhakhoa_core::config::DEFAULT_WEB_BASE_URL);
        assert!(!cli.save_config);
    }
}
