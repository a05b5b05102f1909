//! Solve-attempt accounting shared by all coordinators.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::models::share::SolutionCounterFn;

pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(30);

/// Total number of solve attempts reported by all workers.
#[derive(Debug, Default)]
pub struct SolutionCounter {
    attempts: AtomicU64,
    solutions: AtomicU64,
}

impl SolutionCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// accounts one result message: `attempts` tries that led to one
    /// solution.
    pub fn add(&self, attempts: u64) {
        self.attempts.fetch_add(attempts, Ordering::Relaxed);
        self.solutions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn solutions(&self) -> u64 {
        self.solutions.load(Ordering::Relaxed)
    }

    /// callback for [crate::coordinator::GpuMiner::new]
    pub fn callback(self: &Arc<Self>) -> SolutionCounterFn {
        let counter = self.clone();
        Arc::new(move |attempts| counter.add(attempts))
    }
}

/// attempts per second, 0 for an empty interval
pub fn rate(attempts: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        attempts as f64 / secs
    } else {
        0.0
    }
}

/// Logs the attempt rate once per `interval` until `cancel` fires.
///
/// Attempts are only reported together with a solution, so the rate lags
/// behind on hard targets.
pub async fn report_rate(
    counter: Arc<SolutionCounter>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.tick().await;

    let mut last_attempts = counter.attempts();
    let mut last_at = Instant::now();
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let attempts = counter.attempts();
                let now = Instant::now();
                info!(
                    "{:.1} attempts/s, {} attempts and {} solutions in total",
                    rate(attempts - last_attempts, now - last_at),
                    attempts,
                    counter.solutions()
                );
                last_attempts = attempts;
                last_at = now;
            }
            _ = cancel.cancelled() => break,
        }
    }
}

#[cfg(test)]
mod accounting_tests {
    use tracing_test::traced_test;

    use super::*;

    #[test]
    fn callback_feeds_the_shared_counter() {
        let counter = SolutionCounter::new();
        let count = counter.callback();
        count(150);
        count(30);
        count(0);

        assert_eq!(180, counter.attempts());
        assert_eq!(3, counter.solutions());
    }

    #[tokio::test]
    async fn zero_interval_does_not_kill_the_reporter() {
        let cancel = CancellationToken::new();
        let reporter = tokio::spawn(report_rate(
            SolutionCounter::new(),
            Duration::ZERO,
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        assert!(reporter.await.is_ok());
    }

    #[test]
    fn rate_of_empty_interval_is_zero() {
        assert_eq!(0.0, rate(100, Duration::ZERO));
        assert_eq!(50.0, rate(100, Duration::from_secs(2)));
    }

    #[traced_test]
    #[tokio::test]
    async fn reports_until_cancelled() {
        let counter = SolutionCounter::new();
        let cancel = CancellationToken::new();
        // polled on the test task so that its log lines carry the test span
        tokio::join!(
            report_rate(counter.clone(), Duration::from_millis(100), cancel.clone()),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                counter.add(1000);
                tokio::time::sleep(Duration::from_millis(150)).await;
                cancel.cancel();
            }
        );

        assert!(logs_contain("1000 attempts and 1 solutions in total"));
    }
}
