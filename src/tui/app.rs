//! Debugger application state and logic.

use crate::console::ScriptedConsole;
use crate::cpu::{decode, Cpu, Instruction, TrapVector};
use crate::image::Image;
use std::collections::HashSet;

/// Instructions executed per UI tick while running.
const STEPS_PER_TICK: usize = 256;

/// Debugger application state.
pub struct DebuggerApp {
    /// The CPU being debugged. Console I/O is captured, not sent to the terminal.
    pub cpu: Cpu<ScriptedConsole>,
    /// Loaded images, kept for reset.
    pub images: Vec<Image>,
    /// Start address applied on reset.
    pub entry: u16,
    /// Breakpoints (by address).
    pub breakpoints: HashSet<u16>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Memory view offset relative to PC.
    pub mem_scroll: i32,
    /// Program output so far.
    pub output: String,
    /// Breakpoints are ignored until the first step of a run, so `r` can
    /// resume from one.
    armed: bool,
}

impl DebuggerApp {
    /// Create a new debugger with the given images loaded.
    pub fn new(images: Vec<Image>, entry: u16) -> Self {
        let mut app = Self {
            cpu: Cpu::new(ScriptedConsole::new()),
            images,
            entry,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status: String::new(),
            mem_scroll: 0,
            output: String::new(),
            armed: false,
        };
        app.reset();
        app.status = "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into();
        app
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if !self.cpu.is_running() {
            self.status = format!("CPU stopped: {:?}", self.cpu.state);
            self.running = false;
            return;
        }
        if self.waiting_for_input() {
            self.status = "Waiting for input: press 'r' and type.".into();
            return;
        }

        let pc = self.cpu.regs.pc();
        match self.cpu.step() {
            Ok(instr) => {
                self.status = format!("PC=x{:04X}: {}", pc, instr);
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                self.running = false;
            }
        }
        self.collect_output();
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        self.running = true;
        self.armed = false;
        self.status = "Running... (Esc to pause, keys go to the program)".into();
    }

    /// Run one batch of continuous execution.
    pub fn tick(&mut self) {
        for _ in 0..STEPS_PER_TICK {
            if !self.running {
                return;
            }

            if !self.cpu.is_running() {
                self.running = false;
                self.status = format!("{:?} after {} cycles", self.cpu.state, self.cpu.cycles);
                return;
            }

            let pc = self.cpu.regs.pc();
            if self.armed && self.breakpoints.contains(&pc) {
                self.running = false;
                self.status = format!("Breakpoint at PC=x{:04X}", pc);
                return;
            }

            if self.waiting_for_input() {
                self.status = "Waiting for input...".into();
                return;
            }

            self.step();
            self.armed = true;
        }
    }

    /// Queue a typed character as program input.
    pub fn send_key(&mut self, byte: u8) {
        self.cpu.console_mut().push_input([byte]);
    }

    /// True when the next instruction is a blocking read with no input queued.
    pub fn waiting_for_input(&self) -> bool {
        if self.cpu.console().pending_input() > 0 {
            return false;
        }
        let word = self.cpu.mem.peek(self.cpu.regs.pc());
        matches!(
            decode(word),
            Ok(Instruction::Trap { vector })
                if vector == TrapVector::Getc as u8 || vector == TrapVector::In as u8
        )
    }

    /// Toggle breakpoint at current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.cpu.regs.pc();
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at PC=x{:04X}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at PC=x{:04X}", pc);
        }
    }

    /// Reset CPU to initial state and reload the images.
    pub fn reset(&mut self) {
        self.cpu.reset();
        for image in &self.images {
            self.cpu.load_image(image);
        }
        self.cpu.regs.set_pc(self.entry);
        self.cpu.console_mut().take_output();
        self.output.clear();
        self.running = false;
        self.mem_scroll = 0;
        self.status = "Reset. Ready.".into();
    }

    /// Memory rows `(address, word, is_pc)` for the memory panel.
    pub fn memory_window(&self, lines: usize) -> Vec<(u16, u16, bool)> {
        let pc = self.cpu.regs.pc();
        let back = (lines / 2) as i32 - self.mem_scroll;
        let start = pc.wrapping_sub(back as u16);

        (0..lines as u16)
            .map(|i| {
                let addr = start.wrapping_add(i);
                (addr, self.cpu.mem.peek(addr), addr == pc)
            })
            .collect()
    }

    fn collect_output(&mut self) {
        let bytes = self.cpu.console_mut().take_output();
        if !bytes.is_empty() {
            self.output.push_str(&String::from_utf8_lossy(&bytes));
        }
    }
}

/// Run the debugger with the given images.
pub fn run_debugger(images: Vec<Image>, entry: u16) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut app = DebuggerApp::new(images, entry);

    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if app.running {
                        match key.code {
                            KeyCode::Esc => {
                                app.running = false;
                                app.status = "Paused.".into();
                            }
                            KeyCode::Enter => app.send_key(b'\n'),
                            KeyCode::Backspace => app.send_key(0x08),
                            KeyCode::Char(c) if c.is_ascii() => app.send_key(c as u8),
                            _ => {}
                        }
                    } else {
                        match key.code {
                            KeyCode::Char('q') => app.should_quit = true,
                            KeyCode::Char('s') => app.step(),
                            KeyCode::Char('r') => app.run(),
                            KeyCode::Char('b') => app.toggle_breakpoint(),
                            KeyCode::Char('x') => app.reset(),
                            KeyCode::Up => app.mem_scroll -= 1,
                            KeyCode::Down => app.mem_scroll += 1,
                            _ => {}
                        }
                    }
                }
            }
        }

        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
