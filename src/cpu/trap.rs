//! Trap service routines.
//!
//! The machine has no operating system image, so the console routines that
//! would normally live in trap-vector table code are implemented natively.
//! No return linkage is saved in R7 before dispatch.

use crate::console::Console;
use crate::cpu::execute::{Cpu, CpuState, CpuError};
use crate::cpu::registers::Register;

/// Prompt printed by the IN routine.
pub const IN_PROMPT: &str = "Enter a character: ";
/// Notice printed by the HALT routine.
pub const HALT_NOTICE: &str = "HALT\n";

/// Trap vectors with a built-in routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TrapVector {
    /// Read one character into R0, no echo.
    Getc = 0x20,
    /// Write the low byte of R0.
    Out = 0x21,
    /// Write a zero-terminated string, one character per word, at R0.
    Puts = 0x22,
    /// Prompt, then read one character into R0.
    In = 0x23,
    /// Write a zero-terminated string, two characters per word, at R0.
    Putsp = 0x24,
    /// Stop the machine.
    Halt = 0x25,
}

impl TryFrom<u8> for TrapVector {
    type Error = CpuError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x20 => Ok(TrapVector::Getc),
            0x21 => Ok(TrapVector::Out),
            0x22 => Ok(TrapVector::Puts),
            0x23 => Ok(TrapVector::In),
            0x24 => Ok(TrapVector::Putsp),
            0x25 => Ok(TrapVector::Halt),
            other => Err(CpuError::BadTrap(other)),
        }
    }
}

impl<C: Console> Cpu<C> {
    /// Run the routine selected by `vector`.
    pub(crate) fn trap(&mut self, vector: u8) -> Result<(), CpuError> {
        let routine = TrapVector::try_from(vector)?;
        tracing::debug!(?routine, "trap");

        match routine {
            TrapVector::Getc => self.trap_getc()?,
            TrapVector::Out => {
                let byte = self.regs.get(Register::R0) as u8;
                let console = self.mem.console_mut();
                console.write_byte(byte)?;
                console.flush()?;
            }
            TrapVector::Puts => {
                let bytes = self.collect_string(|word| vec![word as u8]);
                self.write_all(&bytes)?;
            }
            TrapVector::In => {
                self.mem.console_mut().write_str(IN_PROMPT)?;
                self.mem.console_mut().flush()?;
                self.trap_getc()?;
            }
            TrapVector::Putsp => {
                let bytes = self.collect_string(|word| {
                    let low = (word & 0xFF) as u8;
                    let high = (word >> 8) as u8;
                    if high == 0 { vec![low] } else { vec![low, high] }
                });
                self.write_all(&bytes)?;
            }
            TrapVector::Halt => {
                self.mem.console_mut().write_str(HALT_NOTICE)?;
                self.mem.console_mut().flush()?;
                self.state = CpuState::Halted;
                tracing::info!(cycles = self.cycles + 1, "halted");
            }
        }

        Ok(())
    }

    fn trap_getc(&mut self) -> Result<(), CpuError> {
        let byte = self.mem.console_mut().read_byte()?;
        self.regs.set(Register::R0, u16::from(byte));
        self.regs.update_flags(Register::R0);
        Ok(())
    }

    /// Walk the zero-terminated word string at R0, expanding each word with
    /// `unpack`. Stops after one full lap of memory if no terminator exists.
    fn collect_string(&self, unpack: impl Fn(u16) -> Vec<u8>) -> Vec<u8> {
        let mut addr = self.regs.get(Register::R0);
        let mut bytes = Vec::new();

        for _ in 0..crate::cpu::memory::MEMORY_SIZE {
            let word = self.mem.peek(addr);
            if word == 0 {
                break;
            }
            bytes.extend(unpack(word));
            addr = addr.wrapping_add(1);
        }

        bytes
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), CpuError> {
        let console = self.mem.console_mut();
        for &byte in bytes {
            console.write_byte(byte)?;
        }
        console.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ScriptedConsole;
    use crate::cpu::registers::CondFlag;

    fn cpu_with_input(input: &str) -> Cpu<ScriptedConsole> {
        Cpu::new(ScriptedConsole::with_input(input))
    }

    #[test]
    fn test_getc_reads_without_echo() {
        let mut cpu = cpu_with_input("A");

        cpu.trap(0x20).unwrap();

        assert_eq!(cpu.regs.get(Register::R0), 0x41);
        assert_eq!(cpu.regs.cond(), Some(CondFlag::Positive));
        assert!(cpu.console().output().is_empty());
    }

    #[test]
    fn test_out_writes_low_byte() {
        let mut cpu = cpu_with_input("");
        cpu.regs.set(Register::R0, 0x1221); // '!' in the low byte

        cpu.trap(0x21).unwrap();

        assert_eq!(cpu.console().output_string(), "!");
        assert_eq!(cpu.console().flush_count(), 1);
    }

    #[test]
    fn test_puts_stops_at_zero_word() {
        let mut cpu = cpu_with_input("");
        cpu.mem.load(0x4000, &[b'h' as u16, b'i' as u16, 0, b'x' as u16]);
        cpu.regs.set(Register::R0, 0x4000);

        cpu.trap(0x22).unwrap();

        assert_eq!(cpu.console().output_string(), "hi");
    }

    #[test]
    fn test_in_prompts_then_reads() {
        let mut cpu = cpu_with_input("y");

        cpu.trap(0x23).unwrap();

        assert_eq!(cpu.console().output_string(), IN_PROMPT);
        assert_eq!(cpu.regs.get(Register::R0), u16::from(b'y'));
    }

    #[test]
    fn test_putsp_unpacks_two_per_word() {
        let mut cpu = cpu_with_input("");
        // "abc": 'a','b' packed low-first, then 'c' with a zero high byte
        cpu.mem.load(0x5000, &[0x6261, 0x0063, 0x0000]);
        cpu.regs.set(Register::R0, 0x5000);

        cpu.trap(0x24).unwrap();

        assert_eq!(cpu.console().output_string(), "abc");
    }

    #[test]
    fn test_halt_clears_running() {
        let mut cpu = cpu_with_input("");

        cpu.trap(0x25).unwrap();

        assert_eq!(cpu.state, CpuState::Halted);
        assert_eq!(cpu.console().output_string(), HALT_NOTICE);
    }

    #[test]
    fn test_unknown_vector_is_bad_trap() {
        let mut cpu = cpu_with_input("");

        let err = cpu.trap(0x26).unwrap_err();

        assert!(matches!(err, CpuError::BadTrap(0x26)));
        assert!(cpu.is_running());
    }

    #[test]
    fn test_getc_without_input_is_console_error() {
        let mut cpu = cpu_with_input("");

        let err = cpu.trap(0x20).unwrap_err();

        assert!(matches!(err, CpuError::Console(_)));
    }
}
