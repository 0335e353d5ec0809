use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossterm::{
    event::Event,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Layout},
    Terminal,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crowdwatch::settings::{LoggingSettings, Overrides};
use crowdwatch::ui::{self, common::alert_visible, Theme};
use crowdwatch::{
    connector_for, events, ApiClient, ApiError, App, AuthContext, ConfigStore, SessionController,
    Settings,
};

#[derive(Parser, Debug)]
#[command(name = "crowdwatch")]
#[command(about = "Live crowd-density monitoring for a registered camera")]
struct Args {
    /// Id of the camera to monitor
    camera_id: String,

    /// Configuration file (TOML). Defaults to ./crowdwatch.toml when present
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL of the REST API
    #[arg(long)]
    api_url: Option<String>,

    /// Streaming endpoint: http(s):// Socket.IO server, ws://, wss:// or tcp://
    #[arg(long)]
    stream_url: Option<String>,

    /// Bearer token for the REST API
    #[arg(long, env = "CROWDWATCH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Alert threshold sent to the backend (0.0 - 1.0)
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Start streaming immediately
    #[arg(short, long)]
    start: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            api_url: self.api_url.clone(),
            stream_url: self.stream_url.clone(),
            token: self.token.clone(),
            threshold: self.threshold,
            log_file: self.log_file.clone(),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref(), args.overrides())?;
    init_logging(&settings.logging)?;

    // The runtime drives the channel tasks and HTTP requests; the TUI loop
    // stays on this thread.
    let rt = tokio::runtime::Runtime::new()?;
    let _guard = rt.enter();

    let api = ApiClient::builder()
        .base_url(&settings.server.api_url)
        .auth(AuthContext::bearer(settings.auth.token.clone().unwrap_or_default()))
        .build()
        .context("failed to set up the API client")?;

    let camera = match rt.block_on(api.fetch_camera(&args.camera_id)) {
        Ok(camera) => camera,
        Err(ApiError::NotFound(_)) => bail!("Camera not found: {}", args.camera_id),
        Err(e) => {
            return Err(e).with_context(|| format!("Camera not found: {}", args.camera_id));
        }
    };
    info!(camera_id = %camera.id, name = %camera.name, "camera loaded");

    let window = settings.session.history_window_minutes;
    let history = match rt.block_on(api.fetch_density_history(&camera.id, window)) {
        Ok(history) => history,
        Err(e) => {
            warn!(error = %e, "density history unavailable, starting empty");
            Vec::new()
        }
    };

    let connector = connector_for(&settings.server.stream_url)?;
    let mut controller = SessionController::new(
        connector,
        settings.server.stream_url.clone(),
        settings.retry_policy(),
        settings.session.history_capacity,
    );
    controller.seed_history(&camera.id, history);

    let config = ConfigStore::new(settings.session.threshold);
    let mut app = App::new(camera, controller, config, Theme::auto_detect());
    if args.start {
        app.toggle_stream();
    }

    run_tui(&mut app)
}

/// Log to a file when one is configured. The terminal belongs to the TUI.
fn init_logging(logging: &LoggingSettings) -> Result<()> {
    let Some(path) = &logging.file else {
        return Ok(());
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level)
            .with_context(|| format!("invalid log level '{}'", logging.level))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

/// Run the TUI until the user quits
fn run_tui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Setup panic hook to restore terminal
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic);
    }));

    let result = run_app(&mut terminal, app);

    // Restore terminal
    app.controller.stop();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    // Minimum terminal size for usable display
    const MIN_WIDTH: u16 = 72;
    const MIN_HEIGHT: u16 = 20;

    while app.running {
        app.tick();

        terminal.draw(|frame| {
            let area = frame.area();

            if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
                let msg = format!(
                    "Terminal too small: {}x{}\nMinimum: {}x{}\n\nResize to continue",
                    area.width, area.height, MIN_WIDTH, MIN_HEIGHT
                );
                let paragraph = ratatui::widgets::Paragraph::new(msg)
                    .alignment(ratatui::layout::Alignment::Center)
                    .style(ratatui::style::Style::default().fg(ratatui::style::Color::Yellow));
                let centered = ratatui::layout::Rect::new(
                    0,
                    (area.height / 2).saturating_sub(2),
                    area.width,
                    5.min(area.height),
                );
                frame.render_widget(paragraph, centered);
                return;
            }

            let banner_height = if alert_visible(app) { 1 } else { 0 };
            let chunks = Layout::vertical([
                Constraint::Length(1),             // Header bar
                Constraint::Length(banner_height), // Alert banner
                Constraint::Min(12),               // Content
                Constraint::Length(1),             // Status bar
            ])
            .split(area);

            ui::common::render_header(frame, app, chunks[0]);
            if banner_height > 0 {
                ui::common::render_alert_banner(frame, app, chunks[1]);
            }

            let body = Layout::horizontal([Constraint::Min(40), Constraint::Length(34)])
                .split(chunks[2]);
            let main = Layout::vertical([
                Constraint::Length(6), // Live feed
                Constraint::Length(3), // Stats
                Constraint::Min(8),    // History chart
            ])
            .split(body[0]);

            ui::monitor::render_feed(frame, app, main[0]);
            ui::monitor::render_stats(frame, app, main[1]);
            ui::chart::render(frame, app, main[2]);
            ui::monitor::render_sidebar(frame, app, body[1]);

            ui::common::render_status_bar(frame, app, chunks[3]);

            if app.settings_draft.is_some() {
                ui::settings::render_overlay(frame, app, area);
            }
            if app.show_help {
                ui::common::render_help(frame, app, area);
            }
        })?;

        // Poll for events with a short timeout
        if let Some(Event::Key(key)) = events::poll_event(Duration::from_millis(100))? {
            events::handle_key_event(app, key);
        }
    }

    Ok(())
}
