//! Debounced pass scheduling for change notifications

use std::time::{Duration, Instant};

pub const DEFAULT_WINDOW: Duration = Duration::from_millis(16);

/// Coalesces change notifications into evaluation passes.
///
/// The first notification after setup (or [`reset`](Self::reset)) asks for
/// an immediate pass. Later notifications push a single pending pass out to
/// `window` after the most recent one. A pending pass is never dropped.
#[derive(Debug, Clone)]
pub struct PassScheduler {
    window: Duration,
    first_run_done: bool,
    due: Option<Instant>,
}

impl Default for PassScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl PassScheduler {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            first_run_done: false,
            due: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a notification. Returns true when a pass should run right now.
    pub fn notify(&mut self, now: Instant) -> bool {
        if !self.first_run_done {
            self.first_run_done = true;
            return true;
        }
        self.due = Some(now + self.window);
        false
    }

    /// Consume the pending pass if it has come due
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.due {
            Some(due) if now >= due => {
                self.due = None;
                true
            }
            _ => false,
        }
    }

    pub fn pending(&self) -> bool {
        self.due.is_some()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.due
    }

    pub fn reset(&mut self) {
        self.first_run_done = false;
        self.due = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_notification_runs_immediately() {
        let start = Instant::now();
        let mut scheduler = PassScheduler::default();
        assert!(scheduler.notify(start));
        assert!(!scheduler.pending());
    }

    #[test]
    fn test_burst_collapses_into_one_pass() {
        let start = Instant::now();
        let mut scheduler = PassScheduler::default();
        scheduler.notify(start);

        for offset in [1, 5, 10] {
            assert!(!scheduler.notify(start + Duration::from_millis(offset)));
        }
        assert_eq!(
            scheduler.next_due(),
            Some(start + Duration::from_millis(10) + DEFAULT_WINDOW)
        );

        assert!(!scheduler.poll(start + Duration::from_millis(20)));
        assert!(scheduler.poll(start + Duration::from_millis(26)));
        assert!(!scheduler.poll(start + Duration::from_millis(100)));
    }

    #[test]
    fn test_reset_restores_immediate_run() {
        let start = Instant::now();
        let mut scheduler = PassScheduler::new(Duration::from_millis(50));
        scheduler.notify(start);
        scheduler.notify(start);
        scheduler.reset();
        assert!(!scheduler.pending());
        assert!(scheduler.notify(start));
    }
}
