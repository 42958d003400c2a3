//! Admission gate: a refillable token bucket shared by concurrent callers.
//!
//! Tokens are permits of a tokio [`Semaphore`]. Granting a token forgets the
//! permit, so it only comes back through the background refill task, which
//! tops the semaphore up to `capacity` once per window. Waiters park on the
//! semaphore queue (FIFO), so nobody spins and nobody starves while tokens
//! are being handed out.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

// ── Configuration ─────────────────────────────────────────────────────────────

/// At most `capacity` grants per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateConfig {
    pub capacity: u32,
    pub window: Duration,
}

impl RateConfig {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self { capacity, window }
    }

    /// `n` requests per one-second window.
    pub fn per_second(n: u32) -> Self {
        Self::new(n, Duration::from_secs(1))
    }

    pub fn validate(&self) -> Result<(), InvalidRate> {
        if self.capacity == 0 || self.window.is_zero() {
            return Err(InvalidRate {
                capacity: self.capacity,
                window: self.window,
            });
        }
        Ok(())
    }
}

impl Default for RateConfig {
    /// One request every five seconds.
    fn default() -> Self {
        Self::new(1, Duration::from_secs(5))
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    #[error("canceled while waiting for admission")]
    Canceled,

    #[error("admission gate is closed")]
    Closed,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid rate: {capacity} requests per {window:?}")]
pub struct InvalidRate {
    pub capacity: u32,
    pub window: Duration,
}

// ── Gate ──────────────────────────────────────────────────────────────────────

/// Cloneable handle; every clone draws from the same token budget.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    tokens: Arc<Semaphore>,
    config: RateConfig,
    shutdown: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.tokens.close();
    }
}

impl AdmissionGate {
    /// Create a gate with a full bucket and start its refill task.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn new(config: RateConfig) -> Result<Self, InvalidRate> {
        config.validate()?;

        let tokens = Arc::new(Semaphore::new(config.capacity as usize));
        let shutdown = CancellationToken::new();

        tokio::spawn(refill(Arc::clone(&tokens), config, shutdown.clone()));

        debug!(
            "Admission gate started: {} per {:?}",
            config.capacity, config.window
        );

        Ok(Self {
            inner: Arc::new(Inner {
                tokens,
                config,
                shutdown,
            }),
        })
    }

    /// Wait for a token.
    ///
    /// Returns [`GateError::Closed`] immediately on a shut-down gate, and
    /// [`GateError::Canceled`] if `cancel` fires (or the gate shuts down)
    /// before a token is granted. An already-canceled signal wins over an
    /// available token.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), GateError> {
        if self.is_closed() {
            return Err(GateError::Closed);
        }

        tokio::select! {
            biased;

            _ = cancel.cancelled() => Err(GateError::Canceled),
            _ = self.inner.shutdown.cancelled() => Err(GateError::Canceled),
            permit = self.inner.tokens.acquire() => match permit {
                Ok(permit) => {
                    permit.forget();
                    trace!("Admission granted ({} left)", self.available());
                    Ok(())
                }
                Err(_) => Err(GateError::Canceled),
            },
        }
    }

    /// Stop refilling, fail later `acquire` calls and release current waiters.
    pub fn shutdown(&self) {
        if self.is_closed() {
            return;
        }
        self.inner.shutdown.cancel();
        self.inner.tokens.close();
        info!("Admission gate shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.tokens.is_closed()
    }

    /// Tokens currently in the bucket.
    pub fn available(&self) -> usize {
        self.inner.tokens.available_permits()
    }

    pub fn config(&self) -> RateConfig {
        self.inner.config
    }
}

/// Tops the bucket up to capacity at a fixed cadence.
///
/// Only this task adds permits, so reading `available_permits` and then adding
/// the difference can never push the count past capacity.
async fn refill(tokens: Arc<Semaphore>, config: RateConfig, shutdown: CancellationToken) {
    let capacity = config.capacity as usize;
    let mut ticker = interval_at(Instant::now() + config.window, config.window);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let missing = capacity.saturating_sub(tokens.available_permits());
                if missing > 0 {
                    tokens.add_permits(missing);
                    trace!("Refilled {} admission token(s)", missing);
                }
            }
        }
    }

    debug!("Admission gate refill stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_rate_config_validation() {
        assert!(RateConfig::default().validate().is_ok());
        assert!(RateConfig::per_second(10).validate().is_ok());
        assert!(RateConfig::new(0, Duration::from_secs(1)).validate().is_err());
        assert!(RateConfig::new(3, Duration::ZERO).validate().is_err());
    }

    #[test]
    fn test_default_rate_is_one_per_five_seconds() {
        let rate = RateConfig::default();
        assert_eq!(rate.capacity, 1);
        assert_eq!(rate.window, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_new_rejects_zero_capacity() {
        let err = assert_err!(AdmissionGate::new(RateConfig::new(0, Duration::from_secs(1))));
        assert_eq!(err.capacity, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grants_never_exceed_capacity_per_window() {
        let gate = AdmissionGate::new(RateConfig::new(2, Duration::from_secs(1))).unwrap();
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let mut grants = Vec::new();
        for _ in 0..5 {
            assert_ok!(gate.acquire(&cancel).await);
            grants.push(start.elapsed());
        }

        let in_window = |w: u64| grants.iter().filter(|d| d.as_secs() == w).count();
        assert_eq!(in_window(0), 2);
        assert_eq!(in_window(1), 2);
        assert_eq!(in_window(2), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_all_served() {
        let gate = AdmissionGate::new(RateConfig::new(3, Duration::from_secs(1))).unwrap();
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..7 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                gate.acquire(&CancellationToken::new()).await.map(|_| start.elapsed())
            }));
        }

        let mut grants = Vec::new();
        for h in handles {
            grants.push(h.await.unwrap().unwrap());
        }
        grants.sort();

        assert_eq!(grants.len(), 7);
        assert!(grants[..3].iter().all(|d| d.as_secs() == 0));
        assert!(grants[3..6].iter().all(|d| d.as_secs() == 1));
        assert_eq!(grants[6].as_secs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_refill_stays_at_capacity() {
        let gate = AdmissionGate::new(RateConfig::new(4, Duration::from_secs(1))).unwrap();
        assert_ok!(gate.acquire(&CancellationToken::new()).await);
        assert_eq!(gate.available(), 3);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(gate.available(), 4);
    }

    #[tokio::test]
    async fn test_precanceled_signal_wins_over_free_token() {
        let gate = AdmissionGate::new(RateConfig::per_second(5)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(gate.acquire(&cancel).await, Err(GateError::Canceled));
        assert_eq!(gate.available(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting() {
        let gate = AdmissionGate::new(RateConfig::new(1, Duration::from_secs(60))).unwrap();
        let cancel = CancellationToken::new();
        assert_ok!(gate.acquire(&cancel).await);

        let waiter = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.acquire(&cancel).await })
        };

        sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        assert_eq!(waiter.await.unwrap(), Err(GateError::Canceled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_waiters_and_fails_fast() {
        let gate = AdmissionGate::new(RateConfig::new(1, Duration::from_secs(60))).unwrap();
        let cancel = CancellationToken::new();
        assert_ok!(gate.acquire(&cancel).await);

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire(&CancellationToken::new()).await })
        };

        sleep(Duration::from_millis(10)).await;
        gate.shutdown();

        assert_eq!(waiter.await.unwrap(), Err(GateError::Canceled));
        assert_eq!(gate.acquire(&cancel).await, Err(GateError::Closed));
        assert!(gate.is_closed());
    }
}
