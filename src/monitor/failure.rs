//! Per-target consecutive-failure accounting.
//!
//! A failure is an exhausted extraction budget or a failed webhook
//! dispatch. Any successful cycle resets the count. Counters live only in
//! memory; a restarted process starts every target with a clean slate.

use std::collections::HashMap;
use std::sync::Mutex;

use super::target::TargetId;

pub struct FailureTracker {
    counts: Mutex<HashMap<TargetId, u32>>,
    threshold: u32,
}

impl FailureTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
            threshold,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Increments and returns the new consecutive-failure count.
    pub fn record_failure(&self, id: &TargetId) -> u32 {
        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(id.clone()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn record_success(&self, id: &TargetId) {
        self.counts.lock().unwrap().insert(id.clone(), 0);
    }

    pub fn count(&self, id: &TargetId) -> u32 {
        self.counts.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    /// Drops the counter entirely; used when a target is stopped.
    pub fn forget(&self, id: &TargetId) {
        self.counts.lock().unwrap().remove(id);
    }

    pub fn reset_all(&self) {
        self.counts.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_consecutive_failures() {
        let tracker = FailureTracker::new(5);
        let id = TargetId::from("t-1");
        assert_eq!(tracker.record_failure(&id), 1);
        assert_eq!(tracker.record_failure(&id), 2);
        assert_eq!(tracker.count(&id), 2);
    }

    #[test]
    fn success_resets_to_zero() {
        let tracker = FailureTracker::new(5);
        let id = TargetId::from("t-1");
        tracker.record_failure(&id);
        tracker.record_failure(&id);
        tracker.record_success(&id);
        assert_eq!(tracker.count(&id), 0);
        assert_eq!(tracker.record_failure(&id), 1);
    }

    #[test]
    fn threshold_boundary_is_exact() {
        let tracker = FailureTracker::new(5);
        let id = TargetId::from("t-1");
        for _ in 0..4 {
            assert!(tracker.record_failure(&id) < tracker.threshold());
        }
        assert_eq!(tracker.record_failure(&id), 5);
        assert!(tracker.count(&id) >= tracker.threshold());
    }

    #[test]
    fn targets_are_independent() {
        let tracker = FailureTracker::new(5);
        let a = TargetId::from("t-a");
        let b = TargetId::from("t-b");
        tracker.record_failure(&a);
        assert_eq!(tracker.count(&b), 0);
    }

    #[test]
    fn forget_and_reset_all_clear_state() {
        let tracker = FailureTracker::new(5);
        let id = TargetId::from("t-1");
        tracker.record_failure(&id);
        tracker.forget(&id);
        assert_eq!(tracker.count(&id), 0);

        tracker.record_failure(&id);
        tracker.reset_all();
        assert_eq!(tracker.count(&id), 0);
    }
}
