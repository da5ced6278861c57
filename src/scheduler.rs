//! Debounced re-bake scheduling.
//!
//! Hosts feed edits in via `request` and poll `due` from their update loop.
//! Each request supersedes the previous one and restarts the settle window,
//! so a burst of edits collapses into one bake. `begin` and `finish` bracket
//! the bake pass itself: only the generation that is still newest gets to
//! run, and at most one pass runs at a time.

use std::time::{Duration, Instant};

/// How long edits must stay quiet before a requested bake becomes due.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug)]
struct Pending {
    generation: u64,
    ready_at: Instant,
}

pub struct RebakeScheduler {
    settle: Duration,
    next_generation: u64,
    pending: Option<Pending>,
    in_flight: bool,
}

impl Default for RebakeScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLE)
    }
}

impl RebakeScheduler {
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            next_generation: 0,
            pending: None,
            in_flight: false,
        }
    }

    /// Arm (or re-arm) a bake request. Any not-yet-started request is
    /// superseded and will never run.
    pub fn request(&mut self, now: Instant) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.pending = Some(Pending {
            generation,
            ready_at: now + self.settle,
        });
        generation
    }

    /// The settled request waiting to run, if any. Always `None` while a
    /// pass is in flight.
    pub fn due(&self, now: Instant) -> Option<u64> {
        if self.in_flight {
            return None;
        }
        self.pending
            .filter(|p| now >= p.ready_at)
            .map(|p| p.generation)
    }

    /// Claim a due generation for a bake pass. Returns false when the
    /// request has been superseded since `due` handed it out, or when a
    /// pass is already running.
    pub fn begin(&mut self, generation: u64) -> bool {
        if self.in_flight {
            return false;
        }
        match self.pending {
            Some(p) if p.generation == generation => {
                self.pending = None;
                self.in_flight = true;
                true
            }
            _ => {
                log::debug!("stale bake request {generation} dropped");
                false
            }
        }
    }

    /// Mark the running pass as done, letting the next due request through.
    pub fn finish(&mut self) {
        self.in_flight = false;
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_none() && !self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTLE: Duration = Duration::from_millis(100);

    #[test]
    fn request_becomes_due_after_the_settle_window() {
        let mut sched = RebakeScheduler::new(SETTLE);
        let t0 = Instant::now();
        let g = sched.request(t0);
        assert_eq!(sched.due(t0), None);
        assert_eq!(sched.due(t0 + Duration::from_millis(99)), None);
        assert_eq!(sched.due(t0 + SETTLE), Some(g));
    }

    #[test]
    fn newer_request_supersedes_the_pending_one() {
        let mut sched = RebakeScheduler::new(SETTLE);
        let t0 = Instant::now();
        let g1 = sched.request(t0);
        let g2 = sched.request(t0 + Duration::from_millis(50));
        // Only the newest generation ever becomes due, and the settle
        // window restarts from the second request.
        assert_eq!(sched.due(t0 + SETTLE), None);
        assert_eq!(sched.due(t0 + Duration::from_millis(150)), Some(g2));
        assert!(!sched.begin(g1), "superseded generation must not run");
        assert!(sched.begin(g2));
    }

    #[test]
    fn only_one_pass_runs_at_a_time() {
        let mut sched = RebakeScheduler::new(SETTLE);
        let t0 = Instant::now();
        let g1 = sched.request(t0);
        assert!(sched.begin(g1));
        let g2 = sched.request(t0 + Duration::from_millis(1));
        assert_eq!(sched.due(t0 + Duration::from_secs(5)), None);
        assert!(!sched.begin(g2));
        sched.finish();
        assert_eq!(sched.due(t0 + Duration::from_millis(101)), Some(g2));
    }

    #[test]
    fn begin_consumes_the_pending_request() {
        let mut sched = RebakeScheduler::new(SETTLE);
        let t0 = Instant::now();
        let g = sched.request(t0);
        assert!(sched.begin(g));
        sched.finish();
        assert_eq!(sched.due(t0 + Duration::from_secs(1)), None);
        assert!(sched.is_idle());
    }

    #[test]
    fn zero_settle_is_due_immediately() {
        let mut sched = RebakeScheduler::new(Duration::ZERO);
        let t0 = Instant::now();
        let g = sched.request(t0);
        assert_eq!(sched.due(t0), Some(g));
    }
}
