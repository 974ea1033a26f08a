//! Generation controller: drives one run from idle to terminated.
//!
//! Tokens flow source -> lookahead buffer -> sink in source order. Killing the
//! run (Ctrl-C, a source error or a sink error) abandons everything still
//! buffered. A natural end drains the buffer, trims the fragment after the
//! last boundary and paces the remaining tail out on a fixed interval.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::GenerationParams;
use crate::error::StreamError;
use crate::progress::ProgressIndicator;
use crate::sink::OutputSink;
use crate::terminal::InputGuard;
use crate::text::LookaheadBuffer;

use super::state::{KillSwitch, RunPhase, RunState};
use super::traits::ModelSession;
use super::types::{ControllerOptions, RunOutcome};

pub struct GenerationController {
    session: Option<Box<dyn ModelSession>>,
    params: GenerationParams,
    options: ControllerOptions,
    state: RunState,
    guard: InputGuard,
    progress: ProgressIndicator,
}

#[derive(Debug, Default)]
struct Counters {
    emitted: usize,
    trimmed: usize,
}

enum StreamEnd {
    Natural,
    Killed,
}

impl GenerationController {
    pub fn new(
        session: Box<dyn ModelSession>,
        params: GenerationParams,
        options: ControllerOptions,
    ) -> Self {
        Self {
            session: Some(session),
            params,
            options,
            state: RunState::new(),
            guard: InputGuard::inert(),
            progress: ProgressIndicator::disabled(),
        }
    }

    pub fn with_guard(mut self, guard: InputGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_progress(mut self, progress: ProgressIndicator) -> Self {
        self.progress = progress;
        self
    }

    /// Handle for cancelling the run from another task or thread.
    pub fn kill_switch(&self) -> KillSwitch {
        self.state.kill_switch()
    }

    pub fn phase(&self) -> RunPhase {
        self.state.phase()
    }

    /// Stream a continuation of `input` into `sink` and shut down.
    ///
    /// Stream and sink failures do not surface as `Err`; they kill the run and
    /// are reported in [`RunOutcome::error`].
    pub async fn run(self, input: &str, sink: &mut dyn OutputSink) -> RunOutcome {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("generation", run_id = %run_id, sink = sink.name());
        self.run_inner(run_id, input, sink).instrument(span).await
    }

    async fn run_inner(
        mut self,
        run_id: String,
        input: &str,
        sink: &mut dyn OutputSink,
    ) -> RunOutcome {
        let mut counters = Counters::default();
        let mut error: Option<StreamError> = None;

        if let Err(e) = sink.prepare().await {
            // nothing started yet: no guard, no spinner, no delay
            self.record(&mut error, StreamError::Sink(e));
        } else {
            self.begin();
            let mut buffer = LookaheadBuffer::new(self.options.lookahead_depth).with_input(input);
            match self.consume(input, &mut buffer, sink, &mut counters).await {
                Ok(StreamEnd::Natural) => {
                    self.state.set_busy(false);
                    self.advance(RunPhase::Completed);
                    // the source is done, so a kill now only cuts the tail
                    // short and never delays disposal
                    self.state.set_pacing(true);
                    let tail = self.emit_tail(&mut buffer, sink, &mut counters).await;
                    self.state.set_pacing(false);
                    if let Err(e) = tail {
                        self.record(&mut error, e);
                    }
                    if self.state.is_killed() {
                        self.advance(RunPhase::Killed);
                    }
                }
                Ok(StreamEnd::Killed) => self.advance(RunPhase::Killed),
                Err(e) => {
                    self.record(&mut error, e);
                    self.advance(RunPhase::Killed);
                }
            }
        }

        let settled = self.state.phase();
        self.shutdown(sink, &mut error).await;
        let disposal_deferred = self.dispose().await;

        tracing::info!(
            phase = settled.as_str(),
            emitted = counters.emitted,
            trimmed = counters.trimmed,
            disposal_deferred,
            "generation finished"
        );

        RunOutcome {
            run_id,
            phase: settled,
            emitted: counters.emitted,
            trimmed: counters.trimmed,
            disposal_deferred,
            error: error.map(|e| e.to_string()),
        }
    }

    fn begin(&mut self) {
        self.advance(RunPhase::Busy);
        self.state.set_busy(true);
        if let Err(e) = self.guard.enter_blocked(self.state.kill_switch()) {
            tracing::warn!(error.kind = "terminal.guard", error = %e, "input guard unavailable");
        }
        self.progress.start("generating");
    }

    async fn consume(
        &mut self,
        input: &str,
        buffer: &mut LookaheadBuffer,
        sink: &mut dyn OutputSink,
        counters: &mut Counters,
    ) -> Result<StreamEnd, StreamError> {
        let cancel = self.state.cancel_token();
        let Some(session) = self.session.as_mut() else {
            return Err(StreamError::Source(anyhow::anyhow!("model session already released")));
        };

        let mut stream = session
            .stream(input, &self.params, cancel.clone())
            .await
            .map_err(StreamError::Source)?;

        loop {
            if cancel.is_cancelled() {
                return Ok(StreamEnd::Killed);
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(StreamEnd::Killed),
                item = stream.next() => item,
            };

            let text = match next {
                None => return Ok(StreamEnd::Natural),
                Some(Ok(text)) => text,
                Some(Err(e)) => return Err(StreamError::Source(e)),
            };

            let token = buffer.push(text);
            tracing::trace!(index = token.index, "token buffered");

            while let Some(token) = buffer.pop_ready() {
                if cancel.is_cancelled() {
                    return Ok(StreamEnd::Killed);
                }
                self.write(sink, &token.text, counters).await?;
            }
        }
    }

    async fn emit_tail(
        &mut self,
        buffer: &mut LookaheadBuffer,
        sink: &mut dyn OutputSink,
        counters: &mut Counters,
    ) -> Result<(), StreamError> {
        let drained = buffer.drain();
        counters.trimmed = drained.trimmed;
        if drained.trimmed > 0 {
            tracing::debug!(trimmed = drained.trimmed, "trailing fragment dropped");
        }

        let cancel = self.state.cancel_token();
        for token in drained.tail {
            if !pace(&cancel, self.options.tail_interval).await {
                break;
            }
            self.write(sink, &token.text, counters).await?;
        }
        Ok(())
    }

    async fn write(
        &mut self,
        sink: &mut dyn OutputSink,
        text: &str,
        counters: &mut Counters,
    ) -> Result<(), StreamError> {
        if sink.is_interactive() {
            self.progress.stop();
        }
        sink.write(text).await?;
        counters.emitted += 1;
        Ok(())
    }

    async fn shutdown(&mut self, sink: &mut dyn OutputSink, error: &mut Option<StreamError>) {
        self.advance(RunPhase::ShuttingDown);

        if let Err(e) = sink.finish().await {
            if error.is_none() {
                self.record(error, StreamError::Sink(e));
            } else {
                tracing::debug!(error = %e, "final newline not written");
            }
        }

        self.progress.stop();
        if let Err(e) = self.guard.exit_blocked() {
            tracing::warn!(error.kind = "terminal.restore", error = %e, "failed to restore terminal");
        }
    }

    /// Release the model. When the run was still busy the backend may be
    /// mid-token, so disposal waits out the grace period first.
    async fn dispose(&mut self) -> bool {
        let deferred = self.state.is_busy();
        if deferred {
            tracing::debug!(
                grace_ms = self.options.dispose_grace.as_millis() as u64,
                "deferring model disposal"
            );
            tokio::time::sleep(self.options.dispose_grace).await;
        }

        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.dispose().await {
                tracing::warn!(error.kind = "model.dispose", error = %e, session = session.name(), "model disposal failed");
            }
        }
        self.state.set_busy(false);
        self.advance(RunPhase::Terminated);
        deferred
    }

    fn record(&self, slot: &mut Option<StreamError>, e: StreamError) {
        tracing::error!(error.kind = e.kind(), error = %e, "generation aborted");
        self.state.fail();
        if slot.is_none() {
            *slot = Some(e);
        }
    }

    fn advance(&mut self, to: RunPhase) {
        if let Err(e) = self.state.transition(to) {
            let e = StreamError::Transition(e);
            tracing::error!(error.kind = e.kind(), error = %e);
        }
    }
}

/// Wait one pacing interval. Returns false if the run was killed meanwhile.
async fn pace(cancel: &CancellationToken, interval: std::time::Duration) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(interval) => true,
    }
}
