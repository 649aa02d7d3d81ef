//! TUI debugger for the LC-3 virtual machine.
//!
//! Provides an interactive terminal-based debugger with:
//! - Register and condition-code view
//! - Memory view around PC
//! - Captured console output, with typed keys fed to the program
//! - Step/run/breakpoint controls

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
