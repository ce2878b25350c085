//! # Ecopila Desktop Library
//!
//! Core library for the Ecopila inventory client. Wires the local replica,
//! the sync agent and the command layer together, and (with the `tauri`
//! feature) runs the desktop shell.
//!
//! ## Module Organization
//! ```text
//! ecopila_desktop_lib/
//! ├── lib.rs          ◄─── You are here (startup & Tauri setup)
//! ├── ipc.rs          ◄─── #[tauri::command] wrappers (feature "tauri")
//! ├── pdf.rs          ◄─── Price list rendering
//! ├── state/
//! │   ├── db.rs       ◄─── Replica + temp id allocator
//! │   ├── cart.rs     ◄─── Cart state management
//! │   ├── session.rs  ◄─── Logged-in user
//! │   ├── config.rs   ◄─── ecopila.toml
//! │   └── sync.rs     ◄─── API client, dólar, agent handle, events
//! ├── commands/
//! │   ├── producto.rs ◄─── Catalog CRUD, relations, scan, refresh
//! │   ├── proveedor.rs
//! │   ├── rubro.rs
//! │   ├── cart.rs     ◄─── Cart + checkout
//! │   ├── import.rs   ◄─── CSV import/export
//! │   ├── report.rs   ◄─── PDF price lists
//! │   ├── dolar.rs
//! │   ├── auth.rs
//! │   ├── sync.rs
//! │   └── config.rs
//! └── error.rs        ◄─── API error type for commands
//! ```
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. init_tracing()        RUST_LOG or "info,ecopila=debug,sqlx=warn"    │
//! │  2. SyncConfig::load      ecopila.toml + ECOPILA_* overrides            │
//! │  3. Database::new         replica file, migrations                      │
//! │  4. SyncAgentBuilder      ApiClient + DolarService + emitter            │
//! │  5. agent.start()         queue processor + supervisor                  │
//! │  6. manage states         Db, Cart, Session, Config, Sync               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod commands;
pub mod error;
pub mod pdf;
pub mod state;

#[cfg(feature = "tauri")]
mod ipc;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ecopila_db::{Database, DbConfig, DbError};
use ecopila_sync::{OnlineManager, SyncAgentBuilder, SyncConfig, SyncError, SyncEventEmitter};
use state::{CartState, ConfigState, DbState, SessionState, SyncState};

/// Why the app could not start.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Could not determine app data directory")]
    NoDataDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Every managed state, ready for `app.manage`.
pub struct AppState {
    pub db: DbState,
    pub cart: CartState,
    pub session: SessionState,
    pub config: ConfigState,
    pub sync: SyncState,
}

/// Opens the replica and starts the sync agent.
///
/// `SyncState` reuses the agent's API client so the token set by `login`
/// is the one the queue processor sends.
pub async fn bootstrap(
    db_config: DbConfig,
    config: SyncConfig,
    config_path: Option<PathBuf>,
    emitter: Arc<dyn SyncEventEmitter>,
) -> Result<AppState, StartupError> {
    let db = Arc::new(Database::new(db_config).await?);
    info!("Database connected and migrations applied");

    let mut agent = SyncAgentBuilder::new(config.clone())
        .with_database(db.clone())
        .with_online(OnlineManager::default())
        .with_emitter(emitter)
        .build()?;

    let sync = SyncState::new(agent.api().clone(), agent.dolar().clone());
    let handle = agent.start().await?;
    sync.attach(handle).await;

    Ok(AppState {
        db: DbState::new(db),
        cart: CartState::new(),
        session: SessionState::new(),
        config: ConfigState::new(config, config_path),
        sync,
    })
}

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=ecopila_sync=trace` - Trace the queue only
/// - Default: INFO, DEBUG for the ecopila crates
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ecopila=debug,sqlx=warn"));

    // a second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Where the replica lives.
///
/// ## Platform-Specific Paths
/// - **macOS**: `~/Library/Application Support/com.ecopila.ecopila/ecopila.db`
/// - **Windows**: `%APPDATA%\ecopila\ecopila\data\ecopila.db`
/// - **Linux**: `~/.local/share/ecopila/ecopila.db`
///
/// ## Development Override
/// Set `ECOPILA_DB_PATH` to use a custom path.
pub fn get_database_path() -> Result<PathBuf, StartupError> {
    if let Ok(path) = std::env::var("ECOPILA_DB_PATH") {
        return Ok(PathBuf::from(path));
    }

    let path = SyncConfig::default_db_path().ok_or(StartupError::NoDataDir)?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(path)
}

/// Runs the Tauri application.
#[cfg(feature = "tauri")]
pub fn run() {
    use tauri::Manager;
    use tracing::error;

    init_tracing();
    info!("Starting Ecopila Desktop");

    let result = tauri::Builder::default()
        .setup(|app| {
            let db_path = get_database_path()?;
            info!(?db_path, "Database path determined");

            let config = SyncConfig::load_or_default(None);
            let emitter = Arc::new(state::TauriSyncEventEmitter::new(app.handle().clone()));
            let states = tauri::async_runtime::block_on(bootstrap(
                DbConfig::new(db_path),
                config,
                None,
                emitter,
            ))?;

            let unauthorized = states.sync.api().subscribe_unauthorized();
            app.manage(states.db);
            app.manage(states.cart);
            app.manage(states.session);
            app.manage(states.config);
            app.manage(states.sync);

            let handle = app.handle().clone();
            tauri::async_runtime::spawn(async move {
                handle
                    .state::<SessionState>()
                    .expire_on_unauthorized(unauthorized)
                    .await;
            });

            info!("State initialized");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // Productos
            ipc::list_productos,
            ipc::get_producto,
            ipc::get_related_productos,
            ipc::create_producto,
            ipc::update_producto,
            ipc::delete_producto,
            ipc::relate_productos,
            ipc::add_relacion,
            ipc::remove_relacion,
            ipc::scan_producto,
            ipc::refresh_productos,
            // Proveedores
            ipc::list_proveedores,
            ipc::get_proveedor,
            ipc::create_proveedor,
            ipc::update_proveedor,
            ipc::delete_proveedor,
            // Rubros
            ipc::list_rubros,
            ipc::get_rubro,
            ipc::create_rubro,
            ipc::update_rubro,
            ipc::delete_rubro,
            // Cart
            ipc::get_cart,
            ipc::add_to_cart,
            ipc::update_cart_quantity,
            ipc::remove_from_cart,
            ipc::clear_cart,
            ipc::checkout,
            // Import / export / reports
            ipc::preview_import,
            ipc::run_import,
            ipc::export_productos_csv,
            ipc::price_list_pdf_custom,
            ipc::price_list_pdf_proveedor,
            // Dólar
            ipc::get_dolar,
            ipc::force_update_dolar,
            // Auth
            ipc::login,
            ipc::register,
            ipc::logout,
            ipc::session_info,
            // Sync / config
            ipc::get_sync_status,
            ipc::set_offline_mode,
            ipc::list_failed_mutations,
            ipc::discard_mutation,
            ipc::get_config,
            ipc::update_config,
        ])
        .build(tauri::generate_context!())
        .map(|app| {
            app.run(|handle, event| {
                if let tauri::RunEvent::Exit = event {
                    let sync = handle.state::<SyncState>();
                    tauri::async_runtime::block_on(sync.stop_agent());
                }
            })
        });

    if let Err(e) = result {
        error!(error = %e, "Error while running the application");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::closed_port_url;
    use ecopila_sync::NoOpEmitter;

    #[tokio::test]
    async fn test_bootstrap_shares_the_agent_client() {
        let mut config = SyncConfig::with_base_url(closed_port_url().await);
        config.offline = true;

        let states = bootstrap(DbConfig::in_memory(), config, None, Arc::new(NoOpEmitter))
            .await
            .unwrap();

        assert!(states.sync.online().is_offline_mode());
        let status = states.sync.status(states.db.inner()).await.unwrap();
        assert_eq!(status.pending_count, 0);
        assert!(states.cart.with_cart(|c| c.is_empty()));

        states.sync.stop_agent().await;
    }

    #[tokio::test]
    async fn test_bootstrap_rejects_invalid_config() {
        let mut config = SyncConfig::default();
        config.queue.batch_size = 0;

        let err = bootstrap(DbConfig::in_memory(), config, None, Arc::new(NoOpEmitter))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StartupError::Sync(_)));
    }
}
