//! Interactive prompts for the auth commands.
//!
//! The password prompt puts the terminal in raw mode so typed characters are
//! never echoed. Raw mode is left again by [`RawModeGuard`] on every exit
//! path, including errors and Ctrl+C.
//!
//! When stdin is not a terminal (piped input, scripts) both prompts fall back
//! to reading one plain line.

use std::io::{self, BufRead, IsTerminal, Write};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use zeroize::Zeroizing;

/// What a key press did to a hidden input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Keep reading keys.
    Continue,
    /// Enter was pressed; the line is complete.
    Submit,
    /// Ctrl+C was pressed; the prompt was abandoned.
    Cancel,
}

/// A line of input collected key by key without being displayed.
#[derive(Default)]
pub struct HiddenLine {
    buffer: Zeroizing<String>,
}

impl std::fmt::Debug for HiddenLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HiddenLine")
            .field("len", &self.buffer.chars().count())
            .finish()
    }
}

impl HiddenLine {
    /// Creates an empty line.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one key event.
    ///
    /// Only presses count; release and repeat events reported by some
    /// platforms are ignored.
    pub fn apply(&mut self, key: KeyEvent) -> KeyOutcome {
        if key.kind != KeyEventKind::Press {
            return KeyOutcome::Continue;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Enter => KeyOutcome::Submit,
            KeyCode::Char('c') if ctrl => KeyOutcome::Cancel,
            KeyCode::Char('u') if ctrl => {
                self.buffer.clear();
                KeyOutcome::Continue
            }
            KeyCode::Char(_) if ctrl => KeyOutcome::Continue,
            KeyCode::Char(c) => {
                self.buffer.push(c);
                KeyOutcome::Continue
            }
            KeyCode::Backspace => {
                self.buffer.pop();
                KeyOutcome::Continue
            }
            _ => KeyOutcome::Continue,
        }
    }

    /// Consumes the line, returning what was typed.
    #[must_use]
    pub fn into_inner(self) -> Zeroizing<String> {
        self.buffer
    }
}

/// Leaves raw mode when dropped.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Prints `label` to stderr and reads one visible line from stdin.
pub fn read_line(label: &str) -> io::Result<String> {
    eprint!("{label}");
    io::stderr().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

/// Prints `label` to stderr and reads a password without echoing it.
///
/// # Errors
///
/// Returns [`io::ErrorKind::Interrupted`] if the user presses Ctrl+C, or any
/// error raised while switching terminal modes or reading input.
pub fn read_password(label: &str) -> io::Result<Zeroizing<String>> {
    eprint!("{label}");
    io::stderr().flush()?;

    if !io::stdin().is_terminal() {
        let mut input = Zeroizing::new(String::new());
        io::stdin().lock().read_line(&mut input)?;
        return Ok(Zeroizing::new(
            input.trim_end_matches(['\r', '\n']).to_string(),
        ));
    }

    let outcome = {
        let _raw = RawModeGuard::enable()?;
        read_hidden(event::read)
    };
    // Raw mode swallowed the newline.
    eprintln!();

    outcome
}

/// Feeds terminal events into a [`HiddenLine`] until Enter or Ctrl+C.
fn read_hidden(
    mut next_event: impl FnMut() -> io::Result<Event>,
) -> io::Result<Zeroizing<String>> {
    let mut line = HiddenLine::new();
    loop {
        let Event::Key(key) = next_event()? else {
            continue;
        };
        match line.apply(key) {
            KeyOutcome::Continue => {}
            KeyOutcome::Submit => return Ok(line.into_inner()),
            KeyOutcome::Cancel => {
                return Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "password entry cancelled",
                ));
            }
        }
    }
}
