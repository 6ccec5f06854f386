use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Doubling delay between reconnect attempts, capped and jittered
#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_retries: u32,
    current_attempt: u32,
    jitter: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("Maximum retry attempts exceeded ({0})")]
pub struct MaxRetriesExceeded(pub u32);

impl ExponentialBackoff {
    pub fn new(initial_secs: u64, max_secs: u64, retries: u32) -> Self {
        Self::from_durations(
            Duration::from_secs(initial_secs),
            Duration::from_secs(max_secs),
            retries,
        )
    }

    pub fn from_durations(initial: Duration, max: Duration, retries: u32) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max,
            max_retries: retries,
            current_attempt: 0,
            jitter: true,
        }
    }

    /// Disable the random jitter (deterministic delays)
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.current_attempt
    }

    /// Delay before the next attempt, without sleeping
    pub fn next_delay(&self) -> Result<Duration, MaxRetriesExceeded> {
        if self.current_attempt >= self.max_retries {
            return Err(MaxRetriesExceeded(self.max_retries));
        }
        let factor = 2u32.saturating_pow(self.current_attempt);
        let base = self
            .initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        Ok(base)
    }

    pub async fn sleep(&mut self) -> Result<(), MaxRetriesExceeded> {
        let mut delay = self.next_delay()?;
        if self.jitter && !delay.is_zero() {
            // Up to +25% so reconnecting clients spread out
            let extra_ms = rand::thread_rng().gen_range(0..=delay.as_millis() as u64 / 4);
            delay += Duration::from_millis(extra_ms);
        }

        log::warn!(
            "⏳ Retry attempt {} of {} in {:.1}s",
            self.current_attempt + 1,
            self.max_retries,
            delay.as_secs_f64()
        );

        sleep(delay).await;
        self.current_attempt += 1;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}
