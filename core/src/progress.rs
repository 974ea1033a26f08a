use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Spinner on stderr shown while the model warms up and nothing has been
/// written yet.
pub struct ProgressIndicator {
    bar: ProgressBar,
    tick: Duration,
    enabled: bool,
    running: bool,
}

impl ProgressIndicator {
    /// `enabled` should already account for stderr being a terminal.
    pub fn new(enabled: bool, tick: Duration) -> Self {
        if !enabled {
            return Self::disabled();
        }

        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        if let Ok(style) = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .map(|s| s.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", " "]))
        {
            bar.set_style(style);
        }

        Self {
            bar,
            tick,
            enabled: true,
            running: false,
        }
    }

    /// Drive a caller-supplied bar, e.g. one with its own draw target.
    pub fn with_bar(bar: ProgressBar, tick: Duration) -> Self {
        Self {
            bar,
            tick,
            enabled: true,
            running: false,
        }
    }

    pub fn disabled() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            tick: Duration::from_millis(120),
            enabled: false,
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self, msg: &str) {
        if self.running {
            return;
        }
        self.running = true;
        if self.enabled {
            self.bar.set_message(msg.to_string());
            self.bar.enable_steady_tick(self.tick);
        }
    }

    /// Clear the spinner line. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        if self.enabled {
            self.bar.finish_and_clear();
        }
    }
}

impl Drop for ProgressIndicator {
    fn drop(&mut self) {
        self.stop();
    }
}
