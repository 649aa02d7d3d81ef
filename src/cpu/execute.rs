//! CPU execution engine for the LC-3.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.

use crate::console::Console;
use crate::cpu::decode::{self, DecodeError, Instruction, JsrTarget, Operand};
use crate::cpu::memory::Memory;
use crate::cpu::registers::{Register, Registers};
use crate::image::{Image, ImageError};
use serde::{Serialize, Deserialize};
use std::io;
use thiserror::Error;

/// Instructions between checks for a user interrupt.
pub const INTERRUPT_CHECK_INTERVAL: u64 = 1024;

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// CPU has halted (executed TRAP x25).
    Halted,
    /// CPU stopped on a fatal error.
    Error,
}

/// What happens when fetching advances PC past `0xFFFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PcOverflow {
    /// PC wraps to `0x0000`.
    #[default]
    Wrap,
    /// The fetch fails with [`CpuError::ProgramCounterOverflow`].
    Fault,
}

/// The LC-3 machine: registers, memory and the console behind them.
pub struct Cpu<C> {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory<C>,
    /// Current execution state.
    pub state: CpuState,
    /// Instruction count.
    pub cycles: u64,
    pc_overflow: PcOverflow,
    last_instr: Option<Instruction>,
}

impl<C: Console> Cpu<C> {
    /// Create a new CPU with zeroed state, attached to `console`.
    pub fn new(console: C) -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::new(console),
            state: CpuState::Running,
            cycles: 0,
            pc_overflow: PcOverflow::default(),
            last_instr: None,
        }
    }

    /// Choose the PC overflow policy.
    pub fn with_pc_overflow(mut self, policy: PcOverflow) -> Self {
        self.pc_overflow = policy;
        self
    }

    pub fn pc_overflow(&self) -> PcOverflow {
        self.pc_overflow
    }

    /// Reset the CPU to initial state. The console is kept.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.mem.clear();
        self.state = CpuState::Running;
        self.cycles = 0;
        self.last_instr = None;
    }

    /// Copy a parsed image into memory. Returns the number of words stored.
    pub fn load_image(&mut self, image: &Image) -> usize {
        image.load_into(&mut self.mem)
    }

    /// Parse an image from `reader` and copy it into memory.
    pub fn load_image_from<R: io::Read>(&mut self, reader: R) -> Result<Image, CpuError> {
        let image = Image::read_from(reader)?;
        self.load_image(&image);
        Ok(image)
    }

    /// Read the word at PC and advance PC.
    pub fn fetch(&mut self) -> Result<u16, CpuError> {
        let pc = self.regs.pc();
        let next = match self.pc_overflow {
            PcOverflow::Wrap => pc.wrapping_add(1),
            PcOverflow::Fault => pc.checked_add(1).ok_or(CpuError::ProgramCounterOverflow)?,
        };
        self.regs.set_pc(next);
        Ok(self.mem.read(pc))
    }

    /// Execute a single instruction.
    ///
    /// Returns the instruction that was executed, or an error. Any error
    /// leaves the CPU in [`CpuState::Error`].
    pub fn step(&mut self) -> Result<Instruction, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        let result = self.cycle();
        if result.is_err() {
            self.state = CpuState::Error;
        }
        result
    }

    fn cycle(&mut self) -> Result<Instruction, CpuError> {
        if self.cycles % INTERRUPT_CHECK_INTERVAL == 0 {
            self.mem.console_mut().check_interrupt()?;
        }

        let pc = self.regs.pc();
        let word = self.fetch()?;
        let instr = decode::decode(word)?;
        tracing::debug!(pc = %format_args!("{:#06x}", pc), word = %format_args!("{:#06x}", word), %instr, "step");

        self.execute(instr)?;
        if let Some(fault) = self.mem.take_fault() {
            return Err(CpuError::Console(fault));
        }

        self.cycles += 1;
        self.last_instr = Some(instr);
        Ok(instr)
    }

    /// Run until halt or error.
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;

        while self.state == CpuState::Running {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_cycles);

        while self.state == CpuState::Running && self.cycles < limit {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Execute a decoded instruction.
    fn execute(&mut self, instr: Instruction) -> Result<(), CpuError> {
        let pc = self.regs.pc();

        match instr {
            // ==================== Operate ====================

            Instruction::Add { dr, sr1, src2 } => {
                let value = self.regs.get(sr1).wrapping_add(self.operand(src2));
                self.write_dr(dr, value);
            }

            Instruction::And { dr, sr1, src2 } => {
                let value = self.regs.get(sr1) & self.operand(src2);
                self.write_dr(dr, value);
            }

            Instruction::Not { dr, sr } => {
                let value = !self.regs.get(sr);
                self.write_dr(dr, value);
            }

            // ==================== Data Movement ====================

            Instruction::Ld { dr, offset } => {
                let value = self.mem.read(pc.wrapping_add(offset));
                self.write_dr(dr, value);
            }

            Instruction::Ldi { dr, offset } => {
                let pointer = self.mem.read(pc.wrapping_add(offset));
                let value = self.mem.read(pointer);
                self.write_dr(dr, value);
            }

            Instruction::Ldr { dr, base, offset } => {
                let addr = self.regs.get(base).wrapping_add(offset);
                let value = self.mem.read(addr);
                self.write_dr(dr, value);
            }

            Instruction::Lea { dr, offset } => {
                self.write_dr(dr, pc.wrapping_add(offset));
            }

            Instruction::St { sr, offset } => {
                self.mem.write(pc.wrapping_add(offset), self.regs.get(sr));
            }

            Instruction::Sti { sr, offset } => {
                let pointer = self.mem.read(pc.wrapping_add(offset));
                self.mem.write(pointer, self.regs.get(sr));
            }

            Instruction::Str { sr, base, offset } => {
                let addr = self.regs.get(base).wrapping_add(offset);
                self.mem.write(addr, self.regs.get(sr));
            }

            // ==================== Control ====================

            Instruction::Br { nzp, offset } => {
                if nzp & self.regs.get(Register::Cond) != 0 {
                    self.regs.set_pc(pc.wrapping_add(offset));
                }
            }

            Instruction::Jmp { base } => {
                self.regs.set_pc(self.regs.get(base));
            }

            Instruction::Jsr { target } => {
                // Resolve before linking so JSRR R7 jumps to the old R7.
                let dest = match target {
                    JsrTarget::Offset(offset) => pc.wrapping_add(offset),
                    JsrTarget::Reg(base) => self.regs.get(base),
                };
                self.regs.set(Register::R7, pc);
                self.regs.set_pc(dest);
            }

            Instruction::Trap { vector } => {
                self.trap(vector)?;
            }

            // ==================== Unused ====================

            Instruction::Rti | Instruction::Reserved => {}
        }

        Ok(())
    }

    fn operand(&self, src2: Operand) -> u16 {
        match src2 {
            Operand::Reg(reg) => self.regs.get(reg),
            Operand::Imm(imm) => imm,
        }
    }

    /// Write a destination register and recompute COND from it.
    fn write_dr(&mut self, dr: Register, value: u16) {
        self.regs.set(dr, value);
        self.regs.update_flags(dr);
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }

    pub fn console(&self) -> &C {
        self.mem.console()
    }

    pub fn console_mut(&mut self) -> &mut C {
        self.mem.console_mut()
    }
}

impl<C> std::fmt::Debug for Cpu<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("bad trap vector: {0:#04x}")]
    BadTrap(u8),

    #[error("program counter overflow")]
    ProgramCounterOverflow,

    #[error("image load error: {0}")]
    ImageLoad(#[from] ImageError),

    #[error("console error: {0}")]
    Console(#[from] io::Error),
}
