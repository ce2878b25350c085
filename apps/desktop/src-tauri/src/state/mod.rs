//! # State Module
//!
//! Manages application state for the desktop app.
//!
//! Instead of a single `AppState` struct containing everything, each
//! concern gets its own state type, and each command asks only for the
//! ones it needs.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    State Architecture                                   │
//! │                                                                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐                   │
//! │  │   DbState    │  │  CartState   │  │ SessionState │                   │
//! │  │              │  │              │  │              │                   │
//! │  │  Arc<        │  │  Arc<Mutex<  │  │  RwLock<     │                   │
//! │  │   Database>  │  │    Cart      │  │   Option<    │                   │
//! │  │  temp ids    │  │  >>          │  │   Session>>  │                   │
//! │  └──────────────┘  └──────────────┘  └──────────────┘                   │
//! │                                                                         │
//! │  ┌──────────────┐  ┌──────────────────────────────────┐                 │
//! │  │ ConfigState  │  │ SyncState                        │                 │
//! │  │              │  │                                  │                 │
//! │  │  SyncConfig  │  │  ApiClient, DolarService,        │                 │
//! │  │  + file path │  │  SyncAgentHandle                 │                 │
//! │  └──────────────┘  └──────────────────────────────────┘                 │
//! │                                                                         │
//! │  THREAD SAFETY:                                                        │
//! │  • DbState: Database has internal connection pool (thread-safe)        │
//! │  • CartState: Protected by Arc<Mutex<T>> for exclusive access          │
//! │  • SessionState / ConfigState: tokio RwLock, mostly read               │
//! │  • SyncState: clients are cheap clones over shared handles             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod cart;
mod config;
mod db;
mod session;
mod sync;

pub use cart::{Cart, CartItem, CartState, CartTotals};
pub use config::ConfigState;
pub use db::DbState;
pub use session::SessionState;
pub use sync::{SyncState, SyncStatusDto};

#[cfg(feature = "tauri")]
pub use sync::TauriSyncEventEmitter;
