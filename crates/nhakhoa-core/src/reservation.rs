//! Reservation hold countdown
//!
//! A hold exists only while the booking service keeps sending an expiry.
//! Remaining time is always recomputed from the wall clock rather than
//! decremented, so a late or skipped tick never drifts.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

/// Whole seconds left until `expires_at`, clamped at zero
pub fn seconds_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (expires_at - now).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis / 1000) as u64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationWindow {
    expires_at: Option<DateTime<Utc>>,
    remaining_secs: u64,
}

impl ReservationWindow {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    pub fn is_active(&self) -> bool {
        self.expires_at.is_some()
    }

    /// Replace the hold. An expiry already in the past voids it immediately.
    pub fn set(&mut self, expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        self.expires_at = expires_at;
        self.tick(now);
    }

    pub fn clear(&mut self) {
        self.expires_at = None;
        self.remaining_secs = 0;
    }

    /// Recompute the countdown; the hold is dropped once it reaches zero.
    pub fn tick(&mut self, now: DateTime<Utc>) -> u64 {
        self.remaining_secs = match self.expires_at {
            Some(at) => seconds_until(at, now),
            None => 0,
        };
        if self.remaining_secs == 0 {
            self.expires_at = None;
        }
        self.remaining_secs
    }

    /// `mm:ss` for the banner
    pub fn display(&self) -> String {
        format!("{:02}:{:02}", self.remaining_secs / 60, self.remaining_secs % 60)
    }
}

/// One-second ticker bound to a single expiry. Aborted on drop, so the owner
/// replaces it whenever the expiry changes and drops it on teardown.
pub struct CountdownTimer {
    expires_at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

impl CountdownTimer {
    pub fn spawn<F>(expires_at: DateTime<Utc>, on_tick: F) -> Self
    where
        F: Fn(u64) + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                let remaining = seconds_until(expires_at, Utc::now());
                on_tick(remaining);
                if remaining == 0 {
                    tracing::debug!(%expires_at, "reservation countdown finished");
                    break;
                }
            }
        });

        Self { expires_at, handle }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokio::sync::mpsc;

    fn at(secs: i64, millis: u32) -> DateTime<Utc> {
        Utc.timestamp_opt(1_800_000_000 + secs, millis * 1_000_000).unwrap()
    }

    #[test]
    fn test_seconds_until_floors_and_clamps() {
        let now = at(0, 0);
        assert_eq!(seconds_until(at(90, 999), now), 90);
        assert_eq!(seconds_until(at(0, 999), now), 0);
        assert_eq!(seconds_until(at(-5, 0), now), 0);
        assert_eq!(seconds_until(at(1, 0), now), 1);
    }

    #[test]
    fn test_window_clears_exactly_at_zero() {
        let mut window = ReservationWindow::default();
        window.set(Some(at(2, 500)), at(0, 0));
        assert_eq!(window.remaining_secs(), 2);
        assert!(window.is_active());

        assert_eq!(window.tick(at(1, 0)), 1);
        assert!(window.is_active());

        assert_eq!(window.tick(at(1, 600)), 0);
        assert!(!window.is_active());
        assert_eq!(window.expires_at(), None);
    }

    #[test]
    fn test_past_expiry_is_void_on_set() {
        let mut window = ReservationWindow::default();
        window.set(Some(at(-1, 0)), at(0, 0));
        assert!(!window.is_active());
        assert_eq!(window.remaining_secs(), 0);
    }

    #[test]
    fn test_update_mid_countdown_restarts_from_new_value() {
        let mut window = ReservationWindow::default();
        window.set(Some(at(30, 0)), at(0, 0));
        window.tick(at(20, 0));
        assert_eq!(window.remaining_secs(), 10);

        window.set(Some(at(320, 0)), at(20, 0));
        assert_eq!(window.remaining_secs(), 300);
        assert_eq!(window.display(), "05:00");
    }

    #[test]
    fn test_tick_without_expiry_stays_idle() {
        let mut window = ReservationWindow::default();
        assert_eq!(window.tick(at(0, 0)), 0);
        assert!(!window.is_active());
    }

    #[tokio::test]
    async fn test_timer_stops_after_reporting_zero() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timer = CountdownTimer::spawn(Utc::now() - chrono::Duration::seconds(5), move |secs| {
            let _ = tx.send(secs);
        });

        assert_eq!(rx.recv().await, Some(0));
        // the task exits and drops its sender
        assert_eq!(rx.recv().await, None);
        drop(timer);
    }

    #[tokio::test]
    async fn test_dropping_timer_cancels_ticks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timer = CountdownTimer::spawn(Utc::now() + chrono::Duration::minutes(10), move |secs| {
            let _ = tx.send(secs);
        });

        let first = rx.recv().await.unwrap();
        assert!(first > 500);

        drop(timer);
        while rx.recv().await.is_some() {}
    }
}
