//! # ecopila-sync: Server Sync for Ecopila
//!
//! The client half of Ecopila's offline-first design: a typed REST client
//! for the Ecopila API, the persisted mutation queue that replays local
//! writes, and the dólar cache.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Agent Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      SyncAgent (Main Orchestrator)               │  │
//! │  │                                                                  │  │
//! │  │  Spawned as Tokio task in Tauri setup                           │  │
//! │  │  Owns the processor, the timers and the status                   │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │MutationProcess.│  │   ApiClient    │  │  DolarService          │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Reads pending  │  │ reqwest + JSON │  │ Cached exchange rate   │    │
//! │  │ mutation_queue │  │ bearer token   │  │ reprices the replica   │    │
//! │  │ applies or     │  │ error classes  │  │ on change              │    │
//! │  │ rolls back     │  │                │  │                        │    │
//! │  └────────────────┘  └───────┬────────┘  └────────────────────────┘    │
//! │                              │                                          │
//! │                      ┌───────▼────────┐                                 │
//! │                      │ OnlineManager  │  watch<bool> + offline mode     │
//! │                      └────────────────┘                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`agent`] - Main `SyncAgent` orchestrator and status
//! - [`api`] - REST client for every endpoint
//! - [`config`] - TOML configuration with env overrides
//! - [`dolar`] - Dólar cache and force update
//! - [`error`] - Sync error types and the retry policy
//! - [`mutation`] - Typed queue entries with rollback data
//! - [`online`] - Connectivity flag
//! - [`queue`] - Mutation processor
//! - [`refresh`] - Catalog pull into the replica
//! - [`session`] - Login token and role
//! - [`wire`] - Server JSON shapes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ecopila_sync::{SyncAgentBuilder, SyncConfig};
//!
//! let config = SyncConfig::load_or_default(None);
//! let mut agent = SyncAgentBuilder::new(config)
//!     .with_database(database)
//!     .build()?;
//! let handle = agent.start().await?;
//!
//! let status = handle.status().await;
//! println!("Online: {} ({} pending)", status.online, status.pending_count);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod api;
pub mod config;
pub mod dolar;
pub mod error;
pub mod mutation;
pub mod online;
pub mod queue;
pub mod refresh;
pub mod session;
pub mod wire;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{
    NoOpEmitter, SyncAgent, SyncAgentBuilder, SyncAgentHandle, SyncEventEmitter, SyncStatus,
};
pub use api::ApiClient;
pub use config::SyncConfig;
pub use dolar::{DolarService, ForcedUpdate};
pub use error::{SyncError, SyncResult};
pub use mutation::QueuedMutation;
pub use online::OnlineManager;
pub use queue::{BatchReport, MutationProcessor, MutationProcessorHandle, RejectedMutation};
pub use refresh::{refresh_catalog, RefreshOutcome};
pub use session::Session;
