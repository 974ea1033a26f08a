use std::io::{self, Write};
use std::time::Duration;

use crossterm::cursor::{Hide, Show};
use crossterm::event::{self, Event};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

/// Line discipline and cursor control of the interactive terminal.
pub trait TerminalDevice: Send {
    fn set_raw_mode(&mut self, enabled: bool) -> io::Result<()>;
    fn set_cursor_visible(&mut self, visible: bool) -> io::Result<()>;
}

/// Where keystrokes come from while input is blocked.
pub trait EventSource: Send + 'static {
    /// Wait up to `timeout` for the next event.
    fn poll_event(&mut self, timeout: Duration) -> io::Result<Option<Event>>;
}

/// The process's controlling terminal. The cursor is drawn on stderr so it
/// works even when stdout is redirected.
#[derive(Debug, Default)]
pub struct CrosstermDevice;

impl TerminalDevice for CrosstermDevice {
    fn set_raw_mode(&mut self, enabled: bool) -> io::Result<()> {
        if enabled {
            enable_raw_mode()
        } else {
            disable_raw_mode()
        }
    }

    fn set_cursor_visible(&mut self, visible: bool) -> io::Result<()> {
        let mut err = io::stderr();
        if visible {
            execute!(err, Show)?;
        } else {
            execute!(err, Hide)?;
        }
        err.flush()
    }
}

#[derive(Debug, Default)]
pub struct CrosstermEvents;

impl EventSource for CrosstermEvents {
    fn poll_event(&mut self, timeout: Duration) -> io::Result<Option<Event>> {
        if event::poll(timeout)? {
            event::read().map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Used when stdin is not a terminal: nothing to block, nothing to hide.
#[derive(Debug, Default)]
pub struct NullDevice;

impl TerminalDevice for NullDevice {
    fn set_raw_mode(&mut self, _enabled: bool) -> io::Result<()> {
        Ok(())
    }

    fn set_cursor_visible(&mut self, _visible: bool) -> io::Result<()> {
        Ok(())
    }
}

/// Best-effort restore for panic hooks and fatal exits.
pub fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stderr(), Show);
}
