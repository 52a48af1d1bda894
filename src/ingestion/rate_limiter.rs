use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Pacing rules: a fixed pause after every request plus a longer pause after
/// every `long_pause_every`-th request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacingConfig {
    pub base_delay: Duration,
    /// 0 disables the long pause
    pub long_pause_every: u64,
    pub long_pause: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            long_pause_every: 50,
            long_pause: Duration::from_secs(5),
        }
    }
}

impl PacingConfig {
    pub fn unpaced() -> Self {
        Self {
            base_delay: Duration::ZERO,
            long_pause_every: 0,
            long_pause: Duration::ZERO,
        }
    }

    /// Pause owed after the request with 1-based number `request_number`.
    pub fn pause_after(&self, request_number: u64) -> Duration {
        let long = self.long_pause_every > 0
            && request_number > 0
            && request_number % self.long_pause_every == 0;
        if long {
            self.base_delay + self.long_pause
        } else {
            self.base_delay
        }
    }
}

/// Shared request gate. Clones share one counter and one gate, so the
/// spacing between requests holds across every caller in the run.
#[derive(Clone, Debug)]
pub struct RateController {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    pacing: PacingConfig,
    issued: Mutex<u64>,
}

/// Exclusive right to issue one request. The gate stays closed until
/// `release` has slept the owed pause.
pub struct RequestPermit<'a> {
    guard: MutexGuard<'a, u64>,
    pacing: &'a PacingConfig,
    number: u64,
}

impl RateController {
    pub fn new(pacing: PacingConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                pacing,
                issued: Mutex::new(0),
            }),
        }
    }

    pub fn pacing(&self) -> &PacingConfig {
        &self.inner.pacing
    }

    /// Wait for the gate and claim the next request number.
    pub async fn acquire(&self) -> RequestPermit<'_> {
        let mut guard = self.inner.issued.lock().await;
        *guard += 1;
        let number = *guard;
        RequestPermit {
            guard,
            pacing: &self.inner.pacing,
            number,
        }
    }

    /// Requests issued through this controller so far.
    pub async fn issued(&self) -> u64 {
        *self.inner.issued.lock().await
    }
}

impl RequestPermit<'_> {
    /// 1-based position of this request in the controller's total order.
    pub fn number(&self) -> u64 {
        self.number
    }

    pub async fn release(self) {
        let pause = self.pacing.pause_after(self.number);
        if pause > self.pacing.base_delay {
            info!(
                "Taking a longer break after {} requests ({:?})",
                self.number, pause
            );
        } else {
            debug!("Pacing {:?} after request {}", pause, self.number);
        }
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        drop(self.guard);
    }
}
