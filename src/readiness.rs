//! Readiness polling for freshly started servers.
//!
//! A server process accepts TCP connections some time after its container
//! reports as started. [`ReadinessPoller`] probes the port with exponential
//! backoff until it answers or the [`RetryPolicy`] budget runs out, in which
//! case it fails with [`SandboxError::Timeout`].
//!
//! The budget covers probing as well as sleeping: a probe that hangs is cut
//! off when the deadline passes. Both the probe and the sleep are injectable
//! so the poller can be exercised without a server.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::address::ServerAddress;
use crate::error::{Result, SandboxError};

/// One readiness check against a server address.
pub trait Probe: Send + Sync {
    fn probe(&self, addr: &ServerAddress) -> impl Future<Output = bool> + Send;
}

/// Waits between probes.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Succeeds when a TCP connection to the address can be opened.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    pub connect_timeout: Duration,
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(500),
        }
    }
}

impl Probe for TcpProbe {
    async fn probe(&self, addr: &ServerAddress) -> bool {
        match tokio::time::timeout(
            self.connect_timeout,
            tokio::net::TcpStream::connect(addr.socket_addr()),
        )
        .await
        {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::trace!(addr = %addr, error = %e, "Probe refused");
                false
            },
            Err(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Upper bound on the whole wait, probes included
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Constant interval between probes
    pub fn fixed(interval: Duration, timeout: Duration) -> Self {
        Self {
            initial_delay: interval,
            max_delay: interval,
            multiplier: 1.0,
            timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// A zero delay would let the poller spin without ever using up its budget.
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay.is_zero() || self.max_delay.is_zero() {
            return Err(SandboxError::PreconditionViolation(format!(
                "readiness delays must be positive, got initial {:?} and max {:?}",
                self.initial_delay, self.max_delay
            )));
        }
        if !self.multiplier.is_finite() {
            return Err(SandboxError::PreconditionViolation(format!(
                "readiness multiplier must be finite, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }

    /// Delay after the `attempt`-th failed probe (zero-based), capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay)
        }
    }
}

pub struct ReadinessPoller<P = TcpProbe, S = TokioSleeper> {
    policy: RetryPolicy,
    probe: P,
    sleeper: S,
}

impl ReadinessPoller {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            probe: TcpProbe::default(),
            sleeper: TokioSleeper,
        }
    }
}

impl<P: Probe, S: Sleeper> ReadinessPoller<P, S> {
    pub fn with_probe<Q: Probe>(self, probe: Q) -> ReadinessPoller<Q, S> {
        ReadinessPoller {
            policy: self.policy,
            probe,
            sleeper: self.sleeper,
        }
    }

    pub fn with_sleeper<T: Sleeper>(self, sleeper: T) -> ReadinessPoller<P, T> {
        ReadinessPoller {
            policy: self.policy,
            probe: self.probe,
            sleeper,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Probe until the server answers. Returns the number of probes made.
    ///
    /// Time is charged as the larger of the measured elapsed time and the
    /// sum of requested sleeps, so the budget holds for slow probes and for
    /// sleepers that do not advance the clock.
    #[tracing::instrument(skip(self, addr), fields(addr = %addr))]
    pub async fn wait_until_ready(&self, addr: &ServerAddress) -> Result<u32> {
        self.policy.validate()?;

        let started = Instant::now();
        let mut slept = Duration::ZERO;
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);
            let remaining = self
                .policy
                .timeout
                .saturating_sub(started.elapsed().max(slept));
            let ready = tokio::time::timeout(remaining, self.probe.probe(addr))
                .await
                .unwrap_or(false);
            if ready {
                tracing::debug!(
                    attempts,
                    elapsed = ?started.elapsed(),
                    "Server is accepting connections"
                );
                return Ok(attempts);
            }

            let waited = started.elapsed().max(slept);
            let delay = self.policy.delay_for(attempts - 1);
            if waited + delay > self.policy.timeout {
                tracing::warn!(attempts, ?waited, "Gave up waiting for server");
                return Err(SandboxError::Timeout {
                    addr: addr.to_string(),
                    attempts,
                    waited,
                });
            }

            tracing::debug!(attempt = attempts, ?delay, "Server not ready yet");
            self.sleeper.sleep(delay).await;
            slept += delay;
        }
    }
}

/// Wait for `addr` with the default TCP probe and tokio timer.
pub async fn wait_until_ready(addr: &ServerAddress, policy: RetryPolicy) -> Result<()> {
    ReadinessPoller::new(policy)
        .wait_until_ready(addr)
        .await
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::{ReadyAfter, RecordingSleeper, SlowProbe};

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
            timeout: Duration::from_secs(10),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(500));
    }

    #[test]
    fn test_fixed_policy_is_constant() {
        let policy = RetryPolicy::fixed(Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(7), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_ready_on_first_probe_does_not_sleep() {
        let sleeper = RecordingSleeper::default();
        let poller = ReadinessPoller::new(RetryPolicy::default())
            .with_probe(ReadyAfter::new(0))
            .with_sleeper(sleeper.clone());

        let attempts = poller
            .wait_until_ready(&ServerAddress::new("db", 5432))
            .await
            .unwrap();

        assert_eq!(attempts, 1);
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_ready_after_failures_follows_backoff() {
        let sleeper = RecordingSleeper::default();
        let poller = ReadinessPoller::new(RetryPolicy::default())
            .with_probe(ReadyAfter::new(3))
            .with_sleeper(sleeper.clone());

        let attempts = poller
            .wait_until_ready(&ServerAddress::new("db", 5432))
            .await
            .unwrap();

        assert_eq!(attempts, 4);
        assert_eq!(
            sleeper.recorded(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
            ]
        );
    }

    #[tokio::test]
    async fn test_never_ready_times_out() {
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy::fixed(Duration::from_secs(1), Duration::from_secs(5));
        let poller = ReadinessPoller::new(policy)
            .with_probe(ReadyAfter::never())
            .with_sleeper(sleeper.clone());

        let err = poller
            .wait_until_ready(&ServerAddress::new("db", 5432))
            .await
            .unwrap_err();

        match err {
            SandboxError::Timeout {
                addr,
                attempts,
                waited,
            } => {
                assert_eq!(addr, "db:5432");
                assert_eq!(attempts, 6);
                assert_eq!(waited, Duration::from_secs(5));
            },
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(sleeper.recorded().len(), 5);
    }

    #[tokio::test]
    async fn test_zero_delay_policy_is_rejected() {
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy::fixed(Duration::ZERO, Duration::from_secs(1));
        let poller = ReadinessPoller::new(policy)
            .with_probe(ReadyAfter::never())
            .with_sleeper(sleeper.clone());

        let err = poller
            .wait_until_ready(&ServerAddress::new("db", 5432))
            .await
            .unwrap_err();

        assert!(matches!(err, SandboxError::PreconditionViolation(_)), "{err:?}");
        assert!(sleeper.recorded().is_empty());
    }

    #[test]
    fn test_validate_rejects_zero_max_delay() {
        let policy = RetryPolicy {
            max_delay: Duration::ZERO,
            ..RetryPolicy::default()
        };
        assert!(policy.validate().is_err());
        assert!(RetryPolicy::default().validate().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_counts_against_timeout() {
        let policy = RetryPolicy::fixed(Duration::from_millis(50), Duration::from_millis(500));
        let poller =
            ReadinessPoller::new(policy).with_probe(SlowProbe::new(Duration::from_millis(200)));

        let started = Instant::now();
        let err = poller
            .wait_until_ready(&ServerAddress::new("db", 5432))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(elapsed <= Duration::from_millis(500), "took {elapsed:?}");
        match err {
            SandboxError::Timeout {
                attempts, waited, ..
            } => {
                assert_eq!(attempts, 3);
                assert!(waited <= Duration::from_millis(500), "{waited:?}");
            },
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_is_cut_off_at_deadline() {
        let policy = RetryPolicy::fixed(Duration::from_millis(100), Duration::from_secs(1));
        let poller =
            ReadinessPoller::new(policy).with_probe(SlowProbe::new(Duration::from_secs(3600)));

        let started = Instant::now();
        let err = poller
            .wait_until_ready(&ServerAddress::new("db", 5432))
            .await
            .unwrap_err();

        assert!(matches!(err, SandboxError::Timeout { attempts: 1, .. }), "{err:?}");
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_tcp_probe_against_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let addr = ServerAddress::new("127.0.0.1", port);

        assert!(TcpProbe::default().probe(&addr).await);

        drop(listener);
        assert!(!TcpProbe::default().probe(&addr).await);
    }
}
