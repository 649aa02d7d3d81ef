//! # LC-3 Virtual Machine
//!
//! A virtual machine for the LC-3, a 16-bit teaching architecture with
//! eight general purpose registers, a condition-code register, 64K words of
//! memory, memory-mapped keyboard registers and console trap routines.
//!
//! Console I/O goes through the [`Console`] trait so programs can run
//! against a real terminal or a scripted buffer.

pub mod console;
pub mod cpu;
pub mod image;
pub mod config;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export commonly used types
pub use console::{Console, ScriptedConsole, TerminalConsole};
pub use cpu::{Cpu, CpuState, CpuError, Memory, Registers, Register, CondFlag, Instruction};
pub use image::{Image, ImageError};
pub use config::{RunConfig, DumpFormat};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
