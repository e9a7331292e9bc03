//! kohd-console: game-master console for the Kohd datastream terminal
//!
//! `serve` starts the shared-state synchronizer and the HTTP API: the player
//! terminal's credentials bootstrap and login, plus the GM routes that drive
//! the console session. `encode` and `cipher` run offline.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use kohd_console::api::{create_router, ApiState};
use kohd_console::auth::{spawn_token_purge, AuthService};
use kohd_console::bootstrap::{self, StoreCredentials};
use kohd_console::cli::{self, Commands};
use kohd_console::config::Config;
use kohd_console::session::GmSession;
use kohd_console::store::{MemoryStore, RemoteStore};
use kohd_console::sync::{SyncEvent, Synchronizer};

#[derive(Parser)]
#[command(name = "kohd-console")]
#[command(about = "Game-master console for the Kohd datastream terminal")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "kohd-console.toml")]
    config: String,

    /// Data directory for local history and presets
    #[arg(short, long, env = "KOHD_DATA_DIR")]
    data_dir: Option<String>,

    /// HTTP API port (overrides config file)
    #[arg(short, long, env = "KOHD_HTTP_PORT")]
    port: Option<u16>,

    /// Bearer token for the GM routes (overrides config file)
    #[arg(long, env = "KOHD_GM_TOKEN")]
    gm_token: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kohd_console=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(Path::new(&cli.config))?;

    // Apply CLI overrides
    if let Some(data_dir) = cli.data_dir {
        config.console.data_dir = PathBuf::from(data_dir);
    }
    if let Some(port) = cli.port {
        config.api.http_port = port;
    }
    if let Some(token) = cli.gm_token {
        config.auth.gm_token = Some(token);
    }

    match cli.command {
        None | Some(Commands::Serve) => serve(config).await,
        Some(command) => match cli::execute_command(command) {
            Ok(output) => {
                println!("{}", output);
                Ok(())
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!("Starting kohd-console");
    info!("Data dir: {}", config.console.data_dir.display());

    let credentials = match (&config.bootstrap.url, &config.bootstrap.local_file) {
        (None, None) => StoreCredentials::from_env(),
        _ => match bootstrap::load(&config.bootstrap).await {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!(error = %e, "Bootstrap failed, using environment credentials");
                StoreCredentials::from_env()
            }
        },
    };
    if !credentials.is_complete() {
        warn!("No database URL in store credentials, players cannot connect remotely");
    }

    let store: Arc<dyn RemoteStore> = Arc::new(MemoryStore::new());

    // Synchronizer with an event logger
    let synchronizer = Synchronizer::new(Arc::clone(&store));
    let mut events = synchronizer.subscribe_events();
    let sync_handle = synchronizer.start().await?;
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Event logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let session = GmSession::open(
        Arc::clone(&store),
        config.session_settings(),
        &config.console.data_dir,
    )?;
    info!(
        history = session.history().len(),
        presets = session.presets().names().len(),
        "GM session opened"
    );

    let auth = Arc::new(AuthService::new(Arc::clone(&store), config.token_ttl()));
    let purge_task = spawn_token_purge(Arc::clone(&auth), config.token_purge_interval());

    if config.auth.gm_token.is_none() {
        warn!("No GM token configured, GM routes are open to anyone who can reach the port");
    }
    let state = Arc::new(ApiState {
        credentials,
        auth,
        session: tokio::sync::Mutex::new(session),
        sync: Arc::clone(&synchronizer),
        gm_token: config.auth.gm_token.clone(),
    });
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api.http_port));
    info!("API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await;

    purge_task.abort();
    sync_handle.shutdown();
    info!("kohd-console stopped");
    result?;
    Ok(())
}

fn log_event(event: &SyncEvent) {
    match event {
        SyncEvent::CipherChanged(table) => info!(symbols = table.len(), "Cipher changed"),
        SyncEvent::KeySwitchesChanged(switches) => {
            let unlocked = switches.iter().filter(|s| s.unlocked).count();
            info!(unlocked, total = switches.len(), "Key switches changed");
        }
        SyncEvent::TerminalConfigChanged(config) => {
            info!(system = %config.system_name, theme = %config.theme, "Terminal config changed")
        }
        SyncEvent::FilesChanged(files) => info!(count = files.len(), "Files changed"),
        SyncEvent::CommandsChanged(commands) => info!(count = commands.len(), "Commands changed"),
        SyncEvent::ResourcesChanged(r) => info!(name = %r.name, count = r.count, "Resources changed"),
        SyncEvent::GlitchesChanged(g) => info!(
            override_active = g.override_state.is_some(),
            glitched = ?g.glitched_command,
            scramble_next = g.scramble_next,
            "Glitches changed"
        ),
        SyncEvent::AccessResetNotice { timestamp } => {
            info!(timestamp, "Player access level has been reset remotely")
        }
        SyncEvent::UsersChanged(users) => info!(count = users.len(), "Users changed"),
        SyncEvent::HistoryChanged(history) => info!(count = history.len(), "History changed"),
        SyncEvent::PlayersChanged { players, .. } => {
            info!(connected = players.len(), "Players changed")
        }
        SyncEvent::RepliesChanged(replies) => info!(count = replies.len(), "Replies changed"),
        SyncEvent::AccessControlChanged(_) => info!("Access passwords changed"),
    }
}
