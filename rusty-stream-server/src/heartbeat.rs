use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Fires periodically to keep an idle response alive.
///
/// The first tick is one period after [`Heartbeat::start`].
#[derive(Debug)]
pub struct Heartbeat {
    interval: Interval,
}

impl Heartbeat {
    pub fn start(period: Duration) -> Self {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    /// Cancel safe.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }

    /// Releases the timer.
    pub fn stop(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_about(elapsed: Duration, expected: Duration) {
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(50),
            "{elapsed:?} is not about {expected:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_after_one_period() {
        let start = Instant::now();
        let mut heartbeat = Heartbeat::start(Duration::from_secs(1));
        heartbeat.tick().await;
        assert_about(start.elapsed(), Duration::from_secs(1));
        heartbeat.tick().await;
        assert_about(start.elapsed(), Duration::from_secs(2));
        heartbeat.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn missed_ticks_are_not_bursted() {
        let mut heartbeat = Heartbeat::start(Duration::from_secs(1));
        time::sleep(Duration::from_millis(3500)).await;
        heartbeat.tick().await;
        let after_late_tick = Instant::now();
        heartbeat.tick().await;
        assert_about(after_late_tick.elapsed(), Duration::from_secs(1));
    }
}
