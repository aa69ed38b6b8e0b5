use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Wall-clock port.
///
/// Rate-limit resets from both platforms are absolute epoch times, so the
/// scheduler and every rate-limit check read time through here.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, dur: Duration);

    /// Sleep until `at`; returns immediately if `at` is in the past.
    async fn sleep_until(&self, at: DateTime<Utc>) {
        if let Ok(dur) = (at - self.now()).to_std() {
            if dur > Duration::ZERO {
                self.sleep(dur).await;
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, dur: Duration) {
        tokio::time::sleep(dur).await;
    }
}

/// `at + dur`, saturating on overflow.
pub fn offset(at: DateTime<Utc>, dur: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(dur)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
