use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use indicatif::ProgressBar;
use quill_core::api::{
    GenerationParams, InputGuard, ModelProvider, ModelSession, OutputSink, SinkError,
    TerminalDevice, TokenStream,
};

#[derive(Debug, Clone)]
pub enum Step {
    Token(&'static str),
    Wait(Duration),
    Fail(&'static str),
}

pub fn tokens(list: &[&'static str]) -> Vec<Step> {
    list.iter().map(|t| Step::Token(*t)).collect()
}

/// Tokens separated by a fixed delay.
pub fn spaced(list: &[&'static str], gap: Duration) -> Vec<Step> {
    list.iter()
        .flat_map(|t| [Step::Wait(gap), Step::Token(*t)])
        .collect()
}

pub type SessionLogRef = Arc<Mutex<SessionLog>>;

#[derive(Debug, Default)]
pub struct SessionLog {
    pub streams_opened: usize,
    pub last_input: Option<String>,
    pub dispose_calls: usize,
    pub disposed_at: Option<Instant>,
}

pub struct ScriptedSession {
    script: Vec<Step>,
    log: Arc<Mutex<SessionLog>>,
    disposed: bool,
}

impl ScriptedSession {
    pub fn new(script: Vec<Step>) -> (Self, Arc<Mutex<SessionLog>>) {
        let log = Arc::new(Mutex::new(SessionLog::default()));
        (
            Self {
                script,
                log: Arc::clone(&log),
                disposed: false,
            },
            log,
        )
    }
}

#[async_trait]
impl ModelSession for ScriptedSession {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(
        &mut self,
        input: &str,
        _params: &GenerationParams,
        cancel: CancellationToken,
    ) -> anyhow::Result<TokenStream> {
        {
            let mut log = self.log.lock().unwrap();
            log.streams_opened += 1;
            log.last_input = Some(input.to_string());
        }
        let steps: VecDeque<Step> = self.script.clone().into();
        let stream = futures::stream::unfold(steps, move |mut steps| {
            let cancel = cancel.clone();
            async move {
                loop {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    match steps.pop_front()? {
                        Step::Wait(d) => tokio::time::sleep(d).await,
                        Step::Token(t) => return Some((Ok(t.to_string()), steps)),
                        Step::Fail(msg) => return Some((Err(anyhow::anyhow!(msg)), steps)),
                    }
                }
            }
        });
        Ok(Box::pin(stream))
    }

    async fn dispose(&mut self) -> anyhow::Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;
        let mut log = self.log.lock().unwrap();
        log.dispose_calls += 1;
        log.disposed_at = Some(Instant::now());
        Ok(())
    }
}

pub struct ScriptedProvider {
    script: Vec<Step>,
    log: Arc<Mutex<SessionLog>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script,
            log: Arc::new(Mutex::new(SessionLog::default())),
        }
    }

    pub fn log(&self) -> Arc<Mutex<SessionLog>> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn open_session(
        &self,
        _params: &GenerationParams,
    ) -> anyhow::Result<Box<dyn ModelSession>> {
        Ok(Box::new(ScriptedSession {
            script: self.script.clone(),
            log: Arc::clone(&self.log),
            disposed: false,
        }))
    }
}

#[derive(Debug, Default)]
pub struct SinkLog {
    pub writes: Vec<(Instant, String)>,
    pub finished: bool,
    pub prepared: bool,
    /// Spinner state seen by the first write: `(message, cleared)`.
    pub spinner_at_first_write: Option<(String, bool)>,
}

impl SinkLog {
    pub fn text(&self) -> String {
        self.writes.iter().map(|(_, t)| t.as_str()).collect()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.writes.iter().map(|(_, t)| t.clone()).collect()
    }
}

/// Records every write; optionally fails on the nth write (0-based).
pub struct RecordingSink {
    log: Arc<Mutex<SinkLog>>,
    interactive: bool,
    fail_on: Option<usize>,
    spinner: Option<ProgressBar>,
}

impl RecordingSink {
    pub fn new() -> (Self, Arc<Mutex<SinkLog>>) {
        let log = Arc::new(Mutex::new(SinkLog::default()));
        (
            Self {
                log: Arc::clone(&log),
                interactive: false,
                fail_on: None,
                spinner: None,
            },
            log,
        )
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    pub fn failing_on(mut self, nth: usize) -> Self {
        self.fail_on = Some(nth);
        self
    }

    /// Note the spinner's state when the first token arrives.
    pub fn watching(mut self, spinner: ProgressBar) -> Self {
        self.spinner = Some(spinner);
        self
    }
}

#[async_trait]
impl OutputSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn is_interactive(&self) -> bool {
        self.interactive
    }

    async fn prepare(&mut self) -> Result<(), SinkError> {
        self.log.lock().unwrap().prepared = true;
        Ok(())
    }

    async fn write(&mut self, token: &str) -> Result<(), SinkError> {
        let mut log = self.log.lock().unwrap();
        if self.fail_on == Some(log.writes.len()) {
            return Err(SinkError::Write {
                sink: "recording",
                source: io::Error::new(io::ErrorKind::BrokenPipe, "reader went away"),
            });
        }
        if log.writes.is_empty() {
            if let Some(bar) = &self.spinner {
                log.spinner_at_first_write = Some((bar.message(), bar.is_finished()));
            }
        }
        log.writes.push((Instant::now(), token.to_string()));
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), SinkError> {
        self.log.lock().unwrap().finished = true;
        Ok(())
    }
}

/// Terminal device that records raw-mode and cursor changes in order.
#[derive(Debug, Clone, Default)]
pub struct DeviceLog(Arc<Mutex<Vec<&'static str>>>);

impl DeviceLog {
    pub fn calls(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}

impl TerminalDevice for DeviceLog {
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

/// Guard over a recording device with no event source.
pub fn recorded_guard() -> (InputGuard, DeviceLog) {
    let device = DeviceLog::default();
    (InputGuard::new(Box::new(device.clone()), None), device)
}
