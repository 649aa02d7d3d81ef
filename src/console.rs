//! Console capability used by the keyboard registers and trap routines.
//!
//! The machine never touches stdin/stdout directly. Everything goes through
//! a [`Console`], so tests and the debugger can script input and capture
//! output deterministically.

use crossterm::event::{Event, KeyEvent};
use std::collections::VecDeque;
use std::io::{self, BufReader, IsTerminal, Read, Stdout, Write};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

/// Character I/O as seen by the machine.
pub trait Console {
    /// Whether a character is ready to be read without blocking.
    fn poll_key(&mut self) -> io::Result<bool>;

    /// Block until one character is available and return it.
    fn read_byte(&mut self) -> io::Result<u8>;

    /// Queue one character for output.
    fn write_byte(&mut self, byte: u8) -> io::Result<()>;

    /// Push queued output to the device.
    fn flush(&mut self) -> io::Result<()>;

    /// Fail with `Interrupted` if the user asked to stop the machine.
    ///
    /// Called periodically while the machine runs, whether or not the
    /// program reads the keyboard.
    fn check_interrupt(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Write a run of characters.
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        for byte in s.bytes() {
            self.write_byte(byte)?;
        }
        Ok(())
    }
}

impl<C: Console + ?Sized> Console for Box<C> {
    fn poll_key(&mut self) -> io::Result<bool> {
        (**self).poll_key()
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        (**self).read_byte()
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        (**self).write_byte(byte)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }

    fn check_interrupt(&mut self) -> io::Result<()> {
        (**self).check_interrupt()
    }
}

/// In-memory console with queued input and captured output.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConsole {
    input: VecDeque<u8>,
    output: Vec<u8>,
    flushes: usize,
    interrupted: bool,
}

impl ScriptedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a console with `input` already queued.
    pub fn with_input(input: impl AsRef<[u8]>) -> Self {
        let mut console = Self::new();
        console.push_input(input);
        console
    }

    /// Queue more input characters.
    pub fn push_input(&mut self, input: impl AsRef<[u8]>) {
        self.input.extend(input.as_ref());
    }

    /// Characters still waiting to be read.
    pub fn pending_input(&self) -> usize {
        self.input.len()
    }

    /// Everything written so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Output decoded lossily as text.
    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    /// Take the captured output, leaving the buffer empty.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// Number of flushes requested by the machine.
    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    /// Act as if the user pressed Ctrl-C: the next poll or interrupt check
    /// fails with `Interrupted`.
    pub fn interrupt(&mut self) {
        self.interrupted = true;
    }

    fn take_interrupt(&mut self) -> io::Result<()> {
        if std::mem::take(&mut self.interrupted) {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "scripted interrupt"));
        }
        Ok(())
    }
}

impl Console for ScriptedConsole {
    fn poll_key(&mut self) -> io::Result<bool> {
        self.take_interrupt()?;
        Ok(!self.input.is_empty())
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        self.input.pop_front().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "scripted input exhausted")
        })
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.output.push(byte);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }

    fn check_interrupt(&mut self) -> io::Result<()> {
        self.take_interrupt()
    }
}

/// The process terminal.
///
/// When stdin is a TTY the terminal is switched to raw mode for the lifetime
/// of this value, so single keystrokes reach the machine unechoed. Piped
/// stdin is read on a background thread so that polling never blocks.
pub struct TerminalConsole {
    input: Input,
    pending: VecDeque<u8>,
    stdout: Stdout,
}

enum Input {
    Raw,
    Piped(Receiver<io::Result<u8>>),
}

impl TerminalConsole {
    pub fn new() -> io::Result<Self> {
        if io::stdin().is_terminal() {
            crossterm::terminal::enable_raw_mode()?;
            Ok(Self::with_input(Input::Raw))
        } else {
            Ok(Self::from_reader(BufReader::new(io::stdin())))
        }
    }

    /// Take input from any blocking reader instead of stdin.
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Self::with_input(Input::Piped(spawn_reader(reader)))
    }

    fn with_input(input: Input) -> Self {
        Self { input, pending: VecDeque::new(), stdout: io::stdout() }
    }

    fn is_raw(&self) -> bool {
        matches!(self.input, Input::Raw)
    }

    /// Move whatever input is ready into `pending` without blocking.
    fn fill_pending(&mut self) -> io::Result<()> {
        match &self.input {
            Input::Raw => queue_events(ready_events(), &mut self.pending),
            Input::Piped(rx) => {
                if let Ok(byte) = rx.try_recv() {
                    self.pending.push_back(byte?);
                }
                Ok(())
            }
        }
    }
}

impl Drop for TerminalConsole {
    fn drop(&mut self) {
        if self.is_raw() {
            let _ = crossterm::terminal::disable_raw_mode();
        }
    }
}

impl std::fmt::Debug for TerminalConsole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalConsole")
            .field("raw", &self.is_raw())
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Read `reader` to the end on its own thread, one byte per message.
///
/// The channel disconnects once the reader hits EOF or fails.
fn spawn_reader<R: Read + Send + 'static>(reader: R) -> Receiver<io::Result<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for byte in reader.bytes() {
            let failed = byte.is_err();
            if tx.send(byte).is_err() || failed {
                break;
            }
        }
    });
    rx
}

/// Terminal events that are available right now.
fn ready_events() -> impl Iterator<Item = io::Result<Event>> {
    std::iter::from_fn(|| match crossterm::event::poll(Duration::ZERO) {
        Ok(true) => Some(crossterm::event::read()),
        Ok(false) => None,
        Err(e) => Some(Err(e)),
    })
}

/// Translate `events`, queueing every byte a program would see.
///
/// Resizes, mouse and focus events, key releases and keys with no
/// character are dropped. Ctrl-C stops with an `Interrupted` error.
fn queue_events<I>(events: I, pending: &mut VecDeque<u8>) -> io::Result<()>
where
    I: IntoIterator<Item = io::Result<Event>>,
{
    for event in events {
        if let Event::Key(key) = event? {
            if let Some(byte) = key_to_byte(key)? {
                pending.push_back(byte);
            }
        }
    }
    Ok(())
}

/// Translate a key press into the character a program expects.
fn key_to_byte(key: KeyEvent) -> io::Result<Option<u8>> {
    use crossterm::event::{KeyCode, KeyEventKind, KeyModifiers};

    if key.kind != KeyEventKind::Press {
        return Ok(None);
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Err(io::Error::new(io::ErrorKind::Interrupted, "interrupted by Ctrl-C"));
    }

    let byte = match key.code {
        KeyCode::Char(c) if c.is_ascii() => Some(c as u8),
        KeyCode::Enter => Some(b'\n'),
        KeyCode::Backspace => Some(0x08),
        KeyCode::Tab => Some(b'\t'),
        KeyCode::Esc => Some(0x1B),
        _ => None,
    };
    Ok(byte)
}

impl Console for TerminalConsole {
    fn poll_key(&mut self) -> io::Result<bool> {
        if self.pending.is_empty() {
            self.fill_pending()?;
        }
        Ok(!self.pending.is_empty())
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        if let Some(byte) = self.pending.pop_front() {
            return Ok(byte);
        }
        match &self.input {
            Input::Raw => loop {
                let event = crossterm::event::read()?;
                queue_events([Ok(event)], &mut self.pending)?;
                if let Some(byte) = self.pending.pop_front() {
                    return Ok(byte);
                }
            },
            Input::Piped(rx) => match rx.recv() {
                Ok(byte) => byte,
                Err(_) => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "end of input")),
            },
        }
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        // Raw mode also disables output post-processing.
        if byte == b'\n' && self.is_raw() {
            self.stdout.write_all(b"\r\n")
        } else {
            self.stdout.write_all(&[byte])
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush()
    }

    /// Raw mode swallows SIGINT, so Ctrl-C has to be read off the event queue.
    fn check_interrupt(&mut self) -> io::Result<()> {
        match self.input {
            Input::Raw => queue_events(ready_events(), &mut self.pending),
            Input::Piped(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{Memory, KBSR};
    use crossterm::event::{KeyCode, KeyEventKind, KeyEventState, KeyModifiers};
    use std::sync::mpsc::Sender;
    use std::time::Instant;

    /// A reader that blocks until the test hands it bytes, and reports EOF
    /// once the sender is dropped.
    struct Gate(Receiver<Vec<u8>>);

    impl Read for Gate {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.recv() {
                Ok(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                Err(_) => Ok(0),
            }
        }
    }

    fn gated_console() -> (Sender<Vec<u8>>, TerminalConsole) {
        let (tx, rx) = mpsc::channel();
        (tx, TerminalConsole::from_reader(Gate(rx)))
    }

    fn wait_for_key(console: &mut TerminalConsole) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if console.poll_key().unwrap() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    fn key(code: KeyCode) -> io::Result<Event> {
        Ok(Event::Key(KeyEvent::new(code, KeyModifiers::NONE)))
    }

    #[test]
    fn test_scripted_input_order() {
        let mut console = ScriptedConsole::with_input("ab");

        assert!(console.poll_key().unwrap());
        assert_eq!(console.read_byte().unwrap(), b'a');
        assert_eq!(console.read_byte().unwrap(), b'b');
        assert!(!console.poll_key().unwrap());
        assert!(console.read_byte().is_err());
    }

    #[test]
    fn test_scripted_output_capture() {
        let mut console = ScriptedConsole::new();
        console.write_str("hi").unwrap();
        console.flush().unwrap();

        assert_eq!(console.output_string(), "hi");
        assert_eq!(console.flush_count(), 1);
        assert_eq!(console.take_output(), b"hi".to_vec());
        assert!(console.output().is_empty());
    }

    #[test]
    fn test_key_translation() {
        let enter = KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE);
        assert_eq!(key_to_byte(enter).unwrap(), Some(b'\n'));

        let letter = KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE);
        assert_eq!(key_to_byte(letter).unwrap(), Some(b'x'));

        let arrow = KeyEvent::new(KeyCode::Up, KeyModifiers::NONE);
        assert_eq!(key_to_byte(arrow).unwrap(), None);

        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        let err = key_to_byte(ctrl_c).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
    }

    #[test]
    fn test_scripted_interrupt_is_reported_once() {
        let mut console = ScriptedConsole::with_input("a");
        console.interrupt();

        let err = console.poll_key().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
        assert!(console.poll_key().unwrap());

        console.interrupt();
        assert!(console.check_interrupt().is_err());
        assert!(console.check_interrupt().is_ok());
    }

    #[test]
    fn test_idle_pipe_polls_without_blocking() {
        let (tx, mut console) = gated_console();

        let started = Instant::now();
        assert!(!console.poll_key().unwrap());
        assert!(started.elapsed() < Duration::from_secs(1));

        tx.send(b"a".to_vec()).unwrap();
        assert!(wait_for_key(&mut console));
        assert_eq!(console.read_byte().unwrap(), b'a');
        assert!(!console.poll_key().unwrap());
    }

    #[test]
    fn test_idle_pipe_reads_keyboard_status_zero() {
        let (tx, console) = gated_console();
        let mut mem = Memory::new(console);

        assert_eq!(mem.read(KBSR), 0);
        assert!(mem.take_fault().is_none());
        drop(tx);
    }

    #[test]
    fn test_closed_pipe_reports_eof() {
        let (tx, mut console) = gated_console();
        tx.send(b"z".to_vec()).unwrap();
        drop(tx);

        assert_eq!(console.read_byte().unwrap(), b'z');
        let err = console.read_byte().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(!console.poll_key().unwrap());
    }

    #[test]
    fn test_events_without_characters_are_dropped() {
        let release = KeyEvent::new_with_kind_and_state(
            KeyCode::Char('r'),
            KeyModifiers::NONE,
            KeyEventKind::Release,
            KeyEventState::NONE,
        );
        let events = vec![
            Ok(Event::Resize(80, 24)),
            Ok(Event::FocusGained),
            Ok(Event::Key(release)),
            key(KeyCode::Up),
            key(KeyCode::Char('\u{e9}')),
        ];
        let mut pending = VecDeque::new();

        queue_events(events, &mut pending).unwrap();
        assert!(pending.is_empty());

        queue_events(vec![key(KeyCode::Left), key(KeyCode::Char('x'))], &mut pending).unwrap();
        assert_eq!(pending, VecDeque::from(vec![b'x']));
    }

    #[test]
    fn test_ctrl_c_stops_event_queueing() {
        let ctrl_c = Event::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        let events = vec![key(KeyCode::Char('a')), Ok(ctrl_c), key(KeyCode::Char('b'))];
        let mut pending = VecDeque::new();

        let err = queue_events(events, &mut pending).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
        assert_eq!(pending, VecDeque::from(vec![b'a']));
    }
}
