use chatbuilder::app::App;
use chatbuilder::relay::Relay;
use chatbuilder::ui::theme;
use chatbuilder::Config;
use chatbuilder_integrations::MessageBus;
use color_eyre::eyre::{eyre, Result};
use directories::ProjectDirs;
use ratatui::crossterm::event;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "chatbuilder", "chatbuilder")
}

fn get_config_path() -> PathBuf {
    match project_dirs() {
        Some(dirs) => dirs.config_dir().join("config.toml"),
        None => PathBuf::from("config/default.toml"),
    }
}

fn init_logging() -> Result<()> {
    let dir = project_dirs()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(std::env::temp_dir);
    std::fs::create_dir_all(&dir)?;
    let file = File::create(dir.join("chatbuilder.log"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    init_logging()?;

    let mut config = Config::load_or_default(&get_config_path());
    config.apply_env(|key| std::env::var(key).ok());
    theme::init(config.ui.theme);

    let rt = tokio::runtime::Runtime::new()?;
    let _guard = rt.enter();

    let bus = MessageBus::new();
    let relay = match rt.block_on(Relay::start(bus.clone(), config.callback.port)) {
        Ok(relay) => Some(relay),
        Err(e) => {
            tracing::warn!("Continuing without callback relay: {:#}", e);
            None
        }
    };

    let mut app = App::new(config, bus, relay.as_ref().map(|r| r.completion_url()))
        .map_err(|e| eyre!("{:#}", e))?;
    app.init();

    let mut terminal = ratatui::init();
    let result = run(&mut terminal, &mut app);
    ratatui::restore();

    drop(app);
    if let Some(relay) = relay {
        rt.block_on(relay.shutdown());
    }

    result
}

fn run(terminal: &mut ratatui::DefaultTerminal, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|frame| app.render(frame))?;

        if event::poll(Duration::from_millis(50))? {
            let event = event::read()?;
            if app.handle_event(event).map_err(|e| eyre!("{:#}", e))? {
                break;
            }
        }

        app.process_events();

        if app.should_quit {
            break;
        }
    }
    Ok(())
}
