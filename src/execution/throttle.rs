//! Minimum-interval rate limiter for exchange calls.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::types::{PaddockError, PaddockResult};

pub const DEFAULT_CALLS_PER_MINUTE: u32 = 20;

/// Blocks each call until `min_interval` has passed since the previous one.
///
/// Owned by a single client; create one per process or worker.
#[derive(Debug, Clone)]
pub struct Throttle {
    min_interval: Duration,
    last_call: Option<Instant>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: None,
        }
    }

    pub fn per_minute(calls: u32) -> PaddockResult<Self> {
        if calls == 0 {
            return Err(PaddockError::Configuration(
                "throttle needs at least one call per minute".into(),
            ));
        }
        Ok(Self::new(Duration::from_secs(60) / calls))
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// How long a call made at `now` has to wait.
    pub fn delay(&self, now: Instant) -> Duration {
        match self.last_call {
            Some(last) => self
                .min_interval
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Sleep as long as needed, then mark the call.
    pub async fn wait(&mut self) {
        let delay = self.delay(Instant::now());
        if !delay.is_zero() {
            debug!(sleep_ms = delay.as_millis() as u64, "Throttling exchange call");
            tokio::time::sleep(delay).await;
        }
        self.last_call = Some(Instant::now());
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(Duration::from_secs(60) / DEFAULT_CALLS_PER_MINUTE)
    }
}
