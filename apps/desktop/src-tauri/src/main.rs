//! # Ecopila Desktop Entry Point
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Ecopila Desktop                                  │
//! │                                                                         │
//! │  Tauri WebView (catalog, cart, import, price lists)                     │
//! │        │ invoke('command')                                              │
//! │        ▼                                                                │
//! │  lib.rs ─► ipc.rs ─► commands/ ─► state/                                │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ecopila.db (replica + mutation queue) ◄──► Ecopila API                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

// Prevents an additional console window on Windows in release
#![cfg_attr(
    all(not(debug_assertions), target_os = "windows"),
    windows_subsystem = "windows"
)]

fn main() {
    ecopila_desktop_lib::run();
}
