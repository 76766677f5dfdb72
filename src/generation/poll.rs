//! Bounded polling with explicit backoff.
//!
//! Used for ComfyUI job status, Replicate predictions and web result elements.
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    /// Multiplier applied to the interval after each attempt. `1.0` is a fixed interval.
    pub backoff: f64,
    pub max_interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            max_attempts: 60,
            interval: Duration::from_secs(1),
            backoff: 1.0,
            max_interval: Duration::from_secs(10),
        }
    }
}

/// Result of one probe.
#[derive(Debug)]
pub enum PollStatus<T> {
    Pending,
    Ready(T),
}

/// Polling gave up without the probe becoming ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollExhausted {
    pub attempts: u32,
}

impl PollPolicy {
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        PollPolicy { max_attempts, interval, backoff: 1.0, max_interval: interval }
    }

    /// Delay to sleep after the zero-based `attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.backoff.max(1.0).powi(attempt.min(32) as i32);
        let millis = (self.interval.as_millis() as f64 * factor).min(self.max_interval.as_millis() as f64);
        Duration::from_millis(millis.max(0.0) as u64).max(self.interval.min(self.max_interval))
    }

    /// Upper bound on the time spent sleeping between probes.
    pub fn total_wait(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1)).map(|a| self.delay_after(a)).sum()
    }

    /// Run `probe` until it is ready, it fails, or the attempts run out.
    pub async fn run<T, E, F, Fut>(&self, mut probe: F) -> Result<Result<T, PollExhausted>, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<PollStatus<T>, E>>,
    {
        for attempt in 0..self.max_attempts {
            if let PollStatus::Ready(value) = probe(attempt).await? {
                return Ok(Ok(value));
            }
            if attempt + 1 < self.max_attempts {
                tokio::time::sleep(self.delay_after(attempt)).await;
            }
        }
        Ok(Err(PollExhausted { attempts: self.max_attempts }))
    }
}
