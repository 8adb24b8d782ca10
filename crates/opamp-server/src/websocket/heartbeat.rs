//! Ping cadence and idle timeout for one connection.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Liveness timer for an agent connection.
///
/// When disabled, [`Heartbeat::tick`] never completes and connections are
/// never expired.
#[derive(Debug)]
pub struct Heartbeat {
    interval: Option<Interval>,
    timeout: Duration,
}

impl Heartbeat {
    /// Ping every `every` (if set), expiring connections idle past `timeout`.
    pub fn new(every: Option<Duration>, timeout: Duration) -> Self {
        let interval = every.filter(|d| !d.is_zero()).map(|every| {
            // First ping one full period after connect.
            let mut interval = time::interval_at(Instant::now() + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        Self { interval, timeout }
    }

    /// Whether pings are sent at all.
    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }

    /// Wait for the next ping slot.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                let _ = interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Whether a connection silent for `idle` should be dropped.
    pub fn is_expired(&self, idle: Duration) -> bool {
        self.is_enabled() && idle > self.timeout
    }
}
