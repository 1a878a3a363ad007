use std::time::{Duration, Instant};

/// Stopwatch for the current call.
#[derive(Debug, Clone, Default)]
pub struct CallTimer {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl CallTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    /// Starts a paused timer or pauses a running one.
    pub fn toggle(&mut self) {
        self.toggle_at(Instant::now());
    }

    pub fn toggle_at(&mut self, now: Instant) {
        match self.running_since.take() {
            Some(since) => self.accumulated += now.saturating_duration_since(since),
            None => self.running_since = Some(now),
        }
    }

    /// Zeroes and stops the timer.
    pub fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
        self.running_since = None;
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed_at(Instant::now())
    }

    pub fn elapsed_at(&self, now: Instant) -> Duration {
        let running = self
            .running_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default();
        self.accumulated + running
    }

    pub fn display(&self) -> String {
        format_elapsed(self.elapsed())
    }
}

/// `MM:SS`; minutes keep counting past 59.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!("{:02}:{:02}", total / 60, total % 60)
}
