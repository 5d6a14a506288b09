use std::time::Duration;

use tokio::time::Instant;

/// When to push the live streaming text to observers.
///
/// Text is published either once `batch_bytes` of unpublished text has piled
/// up, or when the single armed deadline passes. The deadline is armed by the
/// first unpublished delta and dropped on every publish or cancel, so a panel
/// never has more than one pending flush.
#[derive(Debug, Clone)]
pub struct PublishSchedule {
    interval: Duration,
    batch_bytes: usize,
    deadline: Option<Instant>,
    unpublished: usize,
}

impl PublishSchedule {
    pub fn new(interval: Duration, batch_bytes: usize) -> Self {
        Self {
            interval,
            batch_bytes,
            deadline: None,
            unpublished: 0,
        }
    }

    /// Account for `bytes` of new text. Returns true when it should be
    /// published right away.
    pub fn record(&mut self, bytes: usize, now: Instant) -> bool {
        self.unpublished = self.unpublished.saturating_add(bytes);
        if self.unpublished >= self.batch_bytes {
            return true;
        }
        if self.deadline.is_none() {
            self.deadline = Some(now + self.interval);
        }
        false
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn mark_published(&mut self) {
        self.deadline = None;
        self.unpublished = 0;
    }

    pub fn cancel(&mut self) {
        self.mark_published();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_small_delta_arms_one_deadline() {
        let start = Instant::now();
        let mut schedule = PublishSchedule::new(Duration::from_millis(1000), 512);

        assert!(!schedule.record(5, start));
        assert_eq!(schedule.deadline(), Some(start + Duration::from_millis(1000)));

        assert!(!schedule.record(5, start + Duration::from_millis(400)));
        assert_eq!(schedule.deadline(), Some(start + Duration::from_millis(1000)));

        assert!(!schedule.is_due(start + Duration::from_millis(999)));
        assert!(schedule.is_due(start + Duration::from_millis(1000)));
    }

    #[test]
    fn batch_threshold_publishes_immediately() {
        let now = Instant::now();
        let mut schedule = PublishSchedule::new(Duration::from_millis(1000), 8);
        assert!(!schedule.record(4, now));
        assert!(schedule.record(4, now));
    }

    #[test]
    fn publish_and_cancel_clear_the_deadline() {
        let now = Instant::now();
        let mut schedule = PublishSchedule::new(Duration::from_millis(10), 512);
        schedule.record(1, now);
        schedule.mark_published();
        assert_eq!(schedule.deadline(), None);
        assert!(!schedule.is_due(now + Duration::from_secs(1)));

        schedule.record(1, now);
        schedule.cancel();
        assert_eq!(schedule.deadline(), None);
    }
}
