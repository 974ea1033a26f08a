//! Input guard: keeps keystrokes from garbling streamed output.
//!
//! While blocked, the terminal is in raw mode with the cursor hidden and a
//! listener thread swallows every event. The only event acted upon is Ctrl-C,
//! which is forwarded to the run's [`KillSwitch`].

use std::io;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use crossterm::event::{Event, KeyCode, KeyEventKind, KeyModifiers};

use super::device::{CrosstermDevice, CrosstermEvents, EventSource, NullDevice, TerminalDevice};
use crate::runner::KillSwitch;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Passthrough,
    Blocked,
}

pub struct InputGuard {
    device: Box<dyn TerminalDevice>,
    events: Option<Box<dyn EventSource>>,
    listener: Option<InputListener>,
    state: GuardState,
}

impl InputGuard {
    pub fn new(device: Box<dyn TerminalDevice>, events: Option<Box<dyn EventSource>>) -> Self {
        Self {
            device,
            events,
            listener: None,
            state: GuardState::Passthrough,
        }
    }

    /// Guard over the real terminal.
    pub fn interactive() -> Self {
        Self::new(Box::new(CrosstermDevice), Some(Box::new(CrosstermEvents)))
    }

    /// Guard that changes nothing; for non-interactive stdin.
    pub fn inert() -> Self {
        Self::new(Box::new(NullDevice), None)
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn is_blocked(&self) -> bool {
        self.state == GuardState::Blocked
    }

    pub fn enter_blocked(&mut self, kill: KillSwitch) -> io::Result<()> {
        if self.is_blocked() {
            return Ok(());
        }
        self.device.set_raw_mode(true)?;
        self.state = GuardState::Blocked;
        if let Err(e) = self.device.set_cursor_visible(false) {
            tracing::warn!(error.kind = "terminal.cursor", error = %e, "failed to hide cursor");
        }
        if let Some(source) = self.events.take() {
            self.listener = Some(InputListener::start(source, kill));
        }
        Ok(())
    }

    /// Restore passthrough. No-op when not blocked.
    pub fn exit_blocked(&mut self) -> io::Result<()> {
        if !self.is_blocked() {
            return Ok(());
        }
        self.state = GuardState::Passthrough;
        if let Some(listener) = self.listener.take() {
            self.events = listener.stop();
        }
        let cursor = self.device.set_cursor_visible(true);
        self.device.set_raw_mode(false)?;
        cursor
    }
}

impl Drop for InputGuard {
    fn drop(&mut self) {
        let _ = self.exit_blocked();
    }
}

/// True for a Ctrl-C key press. In raw mode ETX arrives as this key event.
pub fn is_cancel_event(ev: &Event) -> bool {
    match ev {
        Event::Key(key) => {
            key.kind == KeyEventKind::Press
                && key.modifiers.contains(KeyModifiers::CONTROL)
                && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('C'))
        }
        _ => false,
    }
}

struct InputListener {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<Box<dyn EventSource>>>,
}

impl InputListener {
    fn start(mut source: Box<dyn EventSource>, kill: KillSwitch) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let handle = std::thread::spawn(move || {
            while thread_running.load(Ordering::SeqCst) {
                match source.poll_event(POLL_INTERVAL) {
                    Ok(Some(ev)) if is_cancel_event(&ev) => {
                        kill.request_kill();
                    }
                    Ok(Some(ev)) => {
                        tracing::trace!(?ev, "input discarded while blocked");
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(error.kind = "terminal.input", error = %e, "input listener stopped");
                        break;
                    }
                }
            }
            source
        });
        Self {
            running,
            handle: Some(handle),
        }
    }

    fn stop(mut self) -> Option<Box<dyn EventSource>> {
        self.running.store(false, Ordering::SeqCst);
        self.handle.take().and_then(|h| h.join().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RunState;
    use crossterm::event::KeyEvent;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<&'static str>>>);

    impl Recorder {
        fn calls(&self) -> Vec<&'static str> {
            self.0.lock().unwrap().clone()
        }
    }

    impl TerminalDevice for Recorder {
        fn set_raw_mode(&mut self, enabled: bool) -> io::Result<()> {
            self.0
                .lock()
                .unwrap()
                .push(if enabled { "raw_on" } else { "raw_off" });
            Ok(())
        }

        fn set_cursor_visible(&mut self, visible: bool) -> io::Result<()> {
            self.0
                .lock()
                .unwrap()
                .push(if visible { "show" } else { "hide" });
            Ok(())
        }
    }

    struct Scripted(VecDeque<Event>);

    impl EventSource for Scripted {
        fn poll_event(&mut self, timeout: Duration) -> io::Result<Option<Event>> {
            match self.0.pop_front() {
                Some(ev) => Ok(Some(ev)),
                None => {
                    std::thread::sleep(timeout.min(Duration::from_millis(5)));
                    Ok(None)
                }
            }
        }
    }

    fn ctrl_c() -> Event {
        Event::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL))
    }

    fn key(c: char) -> Event {
        Event::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE))
    }

    fn wait_until(mut f: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if f() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn enter_and_exit_toggle_device() {
        let rec = Recorder::default();
        let state = RunState::new();
        let mut guard = InputGuard::new(Box::new(rec.clone()), None);

        guard.enter_blocked(state.kill_switch()).unwrap();
        assert_eq!(guard.state(), GuardState::Blocked);
        guard.exit_blocked().unwrap();
        assert_eq!(guard.state(), GuardState::Passthrough);
        assert_eq!(rec.calls(), vec!["raw_on", "hide", "show", "raw_off"]);
    }

    #[test]
    fn exit_twice_is_same_as_once() {
        let rec = Recorder::default();
        let state = RunState::new();
        let mut guard = InputGuard::new(Box::new(rec.clone()), None);

        guard.enter_blocked(state.kill_switch()).unwrap();
        guard.exit_blocked().unwrap();
        let after_one = rec.calls();
        guard.exit_blocked().unwrap();
        assert_eq!(rec.calls(), after_one);
        assert_eq!(guard.state(), GuardState::Passthrough);
    }

    #[test]
    fn exit_without_enter_is_noop() {
        let rec = Recorder::default();
        let mut guard = InputGuard::new(Box::new(rec.clone()), None);
        guard.exit_blocked().unwrap();
        assert!(rec.calls().is_empty());
    }

    #[test]
    fn drop_restores_terminal() {
        let rec = Recorder::default();
        let state = RunState::new();
        {
            let mut guard = InputGuard::new(Box::new(rec.clone()), None);
            guard.enter_blocked(state.kill_switch()).unwrap();
        }
        assert_eq!(rec.calls().last(), Some(&"raw_off"));
    }

    #[test]
    fn ctrl_c_while_busy_kills_and_other_keys_are_discarded() {
        let state = RunState::new();
        state.set_busy(true);
        let events = Scripted(VecDeque::from(vec![key('x'), key('\r'), ctrl_c()]));
        let mut guard = InputGuard::new(Box::new(NullDevice), Some(Box::new(events)));

        guard.enter_blocked(state.kill_switch()).unwrap();
        assert!(wait_until(|| state.is_killed()));
        guard.exit_blocked().unwrap();
    }

    #[test]
    fn ctrl_c_while_idle_is_ignored() {
        let state = RunState::new();
        let events = Scripted(VecDeque::from(vec![ctrl_c()]));
        let mut guard = InputGuard::new(Box::new(NullDevice), Some(Box::new(events)));

        guard.enter_blocked(state.kill_switch()).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        guard.exit_blocked().unwrap();
        assert!(!state.is_killed());
    }

    #[test]
    fn cancel_event_requires_control_press() {
        assert!(is_cancel_event(&ctrl_c()));
        assert!(!is_cancel_event(&key('c')));
        let mut release = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        release.kind = KeyEventKind::Release;
        assert!(!is_cancel_event(&Event::Key(release)));
    }
}
