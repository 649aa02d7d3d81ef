//! LC-3 memory subsystem.
//!
//! 65,536 sixteen-bit words. Two addresses are wired to the keyboard:
//! reading KBSR polls the console and refreshes both KBSR and KBDR.

use crate::console::Console;
use std::io;

/// The number of addressable words.
pub const MEMORY_SIZE: usize = 1 << 16;

/// Keyboard status register.
pub const KBSR: u16 = 0xFE00;
/// Keyboard data register.
pub const KBDR: u16 = 0xFE02;

/// KBSR value when a key is ready.
const KEY_READY: u16 = 1 << 15;

/// Main memory plus the console backing the keyboard registers.
pub struct Memory<C> {
    cells: Vec<u16>,
    console: C,
    fault: Option<io::Error>,
}

impl<C: Console> Memory<C> {
    /// Create a new memory with all cells zeroed.
    pub fn new(console: C) -> Self {
        Self {
            cells: vec![0; MEMORY_SIZE],
            console,
            fault: None,
        }
    }

    /// Read a word.
    ///
    /// This is not a pure read: reading [`KBSR`] polls the console. If a key
    /// is pending it is consumed into [`KBDR`] and KBSR reads `0x8000`,
    /// otherwise KBSR reads 0.
    pub fn read(&mut self, addr: u16) -> u16 {
        if addr == KBSR {
            self.poll_keyboard();
        }
        self.cells[usize::from(addr)]
    }

    /// Read a word without triggering any device side effects.
    #[inline]
    pub fn peek(&self, addr: u16) -> u16 {
        self.cells[usize::from(addr)]
    }

    #[inline]
    pub fn write(&mut self, addr: u16, value: u16) {
        self.cells[usize::from(addr)] = value;
    }

    fn poll_keyboard(&mut self) {
        let key = match self.console.poll_key() {
            Ok(true) => self.console.read_byte().map(Some),
            Ok(false) => Ok(None),
            Err(e) => Err(e),
        };

        match key {
            Ok(Some(byte)) => {
                self.cells[usize::from(KBSR)] = KEY_READY;
                self.cells[usize::from(KBDR)] = u16::from(byte);
            }
            Ok(None) => self.cells[usize::from(KBSR)] = 0,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                self.cells[usize::from(KBSR)] = 0;
                self.fault = Some(e);
            }
            Err(e) => {
                tracing::warn!(error = %e, "keyboard poll failed; reporting no key");
                self.cells[usize::from(KBSR)] = 0;
            }
        }
    }

    /// Take the interrupt seen by the last keyboard poll, if any.
    ///
    /// A KBSR read cannot fail, so an interrupt is parked here until the
    /// CPU collects it after the instruction completes.
    pub fn take_fault(&mut self) -> Option<io::Error> {
        self.fault.take()
    }

    /// Copy `words` into memory starting at `origin`.
    ///
    /// Stops at the top of the address space. Returns the number of words
    /// actually stored.
    pub fn load(&mut self, origin: u16, words: &[u16]) -> usize {
        let start = usize::from(origin);
        let count = words.len().min(MEMORY_SIZE - start);
        self.cells[start..start + count].copy_from_slice(&words[..count]);
        count
    }

    /// Clear all memory to zeros.
    pub fn clear(&mut self) {
        self.cells.fill(0);
        self.fault = None;
    }

    /// Dump a window of memory as `(address, word)` pairs (no side effects).
    pub fn dump(&self, start: u16, count: usize) -> Vec<(u16, u16)> {
        let begin = usize::from(start);
        let end = begin.saturating_add(count).min(MEMORY_SIZE);
        (begin..end)
            .map(|i| (i as u16, self.cells[i]))
            .collect()
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }
}

impl<C> std::fmt::Debug for Memory<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only count non-zero cells
        let non_zero = self.cells.iter().filter(|&&w| w != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ScriptedConsole;

    #[test]
    fn test_memory_read_write() {
        let mut mem = Memory::new(ScriptedConsole::new());

        mem.write(0x3000, 42);
        assert_eq!(mem.read(0x3000), 42);
        mem.write(0xFFFF, 7);
        assert_eq!(mem.read(0xFFFF), 7);
    }

    #[test]
    fn test_keyboard_status_with_pending_key() {
        let mut mem = Memory::new(ScriptedConsole::with_input("q"));

        assert_eq!(mem.read(KBSR), 0x8000);
        assert_eq!(mem.read(KBDR), u16::from(b'q'));
        assert_eq!(mem.console().pending_input(), 0);
    }

    #[test]
    fn test_keyboard_status_is_not_cached() {
        let mut mem = Memory::new(ScriptedConsole::with_input("a"));

        assert_eq!(mem.read(KBSR), 0x8000);
        // The key was consumed by the first poll.
        assert_eq!(mem.read(KBSR), 0);
        // KBDR keeps the last key.
        assert_eq!(mem.read(KBDR), u16::from(b'a'));

        mem.console_mut().push_input("b");
        assert_eq!(mem.read(KBSR), 0x8000);
        assert_eq!(mem.read(KBDR), u16::from(b'b'));
    }

    #[test]
    fn test_kbdr_read_does_not_poll() {
        let mut mem = Memory::new(ScriptedConsole::with_input("z"));

        assert_eq!(mem.read(KBDR), 0);
        assert_eq!(mem.peek(KBSR), 0);
        assert_eq!(mem.console().pending_input(), 1);
    }

    #[test]
    fn test_load_truncates_at_top() {
        let mut mem = Memory::new(ScriptedConsole::new());

        let stored = mem.load(0xFFFE, &[1, 2, 3]);

        assert_eq!(stored, 2);
        assert_eq!(mem.peek(0xFFFE), 1);
        assert_eq!(mem.peek(0xFFFF), 2);
        assert_eq!(mem.peek(0x0000), 0);
    }

    #[test]
    fn test_dump_window() {
        let mut mem = Memory::new(ScriptedConsole::new());
        mem.load(0x3000, &[0xAAAA, 0xBBBB]);

        assert_eq!(mem.dump(0x3000, 2), vec![(0x3000, 0xAAAA), (0x3001, 0xBBBB)]);
        assert_eq!(mem.dump(0xFFFF, 4).len(), 1);
        assert_eq!(mem.dump(0xFFF0, usize::MAX).len(), 16);
    }

    #[test]
    fn test_interrupted_poll_is_kept() {
        let mut console = ScriptedConsole::with_input("k");
        console.interrupt();
        let mut mem = Memory::new(console);

        assert_eq!(mem.read(KBSR), 0);
        let fault = mem.take_fault().unwrap();
        assert_eq!(fault.kind(), std::io::ErrorKind::Interrupted);
        assert!(mem.take_fault().is_none());

        // The key is still there for the next poll.
        assert_eq!(mem.read(KBSR), 0x8000);
    }
}
