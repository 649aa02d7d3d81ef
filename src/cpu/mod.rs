//! CPU emulation for the LC-3.
//!
//! This module implements the complete LC-3 architecture:
//! - 65,536 sixteen-bit memory words with keyboard registers at xFE00/xFE02
//! - 10 registers: R0-R7, PC, COND
//! - 16 opcodes plus the console trap routines

pub mod memory;
pub mod registers;
pub mod decode;
pub mod execute;
pub mod trap;

pub use memory::{Memory, KBDR, KBSR, MEMORY_SIZE};
pub use registers::{CondFlag, Register, Registers};
pub use decode::{decode, encode, sign_extend, DecodeError, Instruction, JsrTarget, Opcode, Operand};
pub use execute::{Cpu, CpuError, CpuState, PcOverflow, INTERRUPT_CHECK_INTERVAL};
pub use trap::TrapVector;
