//! Terminal viewer for pipelog
//!
//! State management, keybindings, event handling and rendering for the
//! live log view over a [`pipelog_logs::LogSink`].

pub mod app;
pub mod config;
pub mod tui;
pub mod ui;

pub use app::{Action, AppState, FilterCache, UiState};
pub use config::{KeyBinding, KeyBindings, KeyContext};
pub use tui::{Event, EventHandler, Tui, install_panic_hook};
pub use ui::components::{HelpOverlay, StatusBar};
pub use ui::screens::LogViewerScreen;
pub use ui::{Layout, Theme};
