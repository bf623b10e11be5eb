//! Condition Poller
//!
//! Blocking retry-until-deadline evaluation of a predicate against live
//! browser state. The calling thread evaluates, sleeps one poll interval,
//! and evaluates again until the predicate is truthy or the deadline passes.
//! There is no background thread; the deadline is the only cancellation.
//!
//! ## Predicate contract
//!
//! - `Ok(truthy)` ends the wait with the truthy value
//! - `Ok(falsy)` means "not yet ready"
//! - `Err(e)` where `e` is transient (`NotFound`, `StaleReference`) means
//!   "not yet ready"; any other error ends the wait immediately
//!
//! The predicate is evaluated once more exactly at the deadline, so a failed
//! wait always takes between `timeout` and `timeout + poll_interval`.

use std::time::{Duration, Instant};

use crate::result::{EsperaError, EsperaResult};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for implicit and explicit waits (10 seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default polling interval (250ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

// =============================================================================
// TRUTHINESS
// =============================================================================

/// A predicate result that is either ready (truthy) or not yet ready
pub trait Truthy {
    /// Value handed back once the condition holds
    type Output;

    /// `Some` when the condition holds
    fn into_ready(self) -> Option<Self::Output>;
}

impl Truthy for bool {
    type Output = bool;

    fn into_ready(self) -> Option<bool> {
        self.then_some(true)
    }
}

impl<T> Truthy for Option<T> {
    type Output = T;

    fn into_ready(self) -> Option<T> {
        self
    }
}

// =============================================================================
// WAIT OUTCOME
// =============================================================================

/// Result of a successful wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOutcome<T> {
    /// Truthy value the predicate produced
    pub value: T,
    /// Time spent waiting
    pub elapsed: Duration,
    /// Number of predicate evaluations
    pub attempts: u32,
}

// =============================================================================
// POLLER
// =============================================================================

/// Deadline and polling parameters for one timeout value.
///
/// A `Poller` holds no per-call state; the deadline is computed from the call
/// start each time [`Poller::until`] runs, so one instance is shared by every
/// wait that uses the same timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    timeout: Duration,
    poll_interval: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl Poller {
    /// Create a poller.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if either duration is zero
    pub fn new(timeout: Duration, poll_interval: Duration) -> EsperaResult<Self> {
        if timeout.is_zero() {
            return Err(EsperaError::configuration("wait timeout must be positive"));
        }
        if poll_interval.is_zero() {
            return Err(EsperaError::configuration("poll interval must be positive"));
        }
        Ok(Self {
            timeout,
            poll_interval,
        })
    }

    /// Configured timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Configured polling interval
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Absolute deadline for a wait starting at `start`.
    ///
    /// `None` when the timeout reaches past the last representable instant;
    /// such a wait has no deadline.
    #[must_use]
    pub fn deadline_from(&self, start: Instant) -> Option<Instant> {
        start.checked_add(self.timeout)
    }

    /// Poll `predicate` until truthy, absorbing transient errors.
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` when the deadline passes first; any non-transient
    /// error raised by the predicate, unchanged.
    pub fn until<R, F>(&self, waited_for: &str, predicate: F) -> EsperaResult<R::Output>
    where
        R: Truthy,
        F: FnMut() -> EsperaResult<R>,
    {
        self.until_ignoring(waited_for, EsperaError::is_transient, predicate)
            .map(|outcome| outcome.value)
    }

    /// Poll `predicate` until truthy, absorbing only errors `ignore` accepts.
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` when the deadline passes first; any error `ignore`
    /// rejects, unchanged.
    pub fn until_ignoring<R, F, I>(
        &self,
        waited_for: &str,
        ignore: I,
        mut predicate: F,
    ) -> EsperaResult<WaitOutcome<R::Output>>
    where
        R: Truthy,
        F: FnMut() -> EsperaResult<R>,
        I: Fn(&EsperaError) -> bool,
    {
        let start = Instant::now();
        let deadline = self.deadline_from(start);
        let mut attempts = 0u32;

        tracing::debug!(
            waited_for,
            timeout_ms = self.timeout.as_millis() as u64,
            "wait started"
        );

        loop {
            attempts += 1;
            match predicate() {
                Ok(result) => {
                    if let Some(value) = result.into_ready() {
                        let elapsed = start.elapsed();
                        tracing::debug!(
                            waited_for,
                            attempts,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "wait satisfied"
                        );
                        return Ok(WaitOutcome {
                            value,
                            elapsed,
                            attempts,
                        });
                    }
                    tracing::trace!(waited_for, attempts, "condition not yet met");
                }
                Err(err) if ignore(&err) => {
                    tracing::trace!(waited_for, attempts, error = %err, "absorbed transient error");
                }
                Err(err) => {
                    tracing::debug!(waited_for, attempts, error = %err, "wait aborted");
                    return Err(err);
                }
            }

            let now = Instant::now();
            let Some(deadline) = deadline else {
                std::thread::sleep(self.poll_interval);
                continue;
            };
            if now >= deadline {
                let elapsed = start.elapsed();
                tracing::debug!(
                    waited_for,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "wait deadline exceeded"
                );
                return Err(EsperaError::DeadlineExceeded {
                    waited_for: waited_for.to_string(),
                    timeout: self.timeout,
                    elapsed,
                });
            }
            std::thread::sleep(self.poll_interval.min(deadline.saturating_duration_since(now)));
        }
    }
}

// =============================================================================
// CONVENIENCE FUNCTIONS
// =============================================================================

/// Wait for a plain boolean condition with the default poll interval
///
/// # Errors
///
/// `DeadlineExceeded` if `predicate` never returns `true`, or a configuration
/// error for a zero timeout
pub fn wait_until<F>(mut predicate: F, timeout: Duration) -> EsperaResult<()>
where
    F: FnMut() -> bool,
{
    let poller = Poller::new(timeout, Duration::from_millis(DEFAULT_POLL_INTERVAL_MS))?;
    poller.until("custom condition", || Ok(predicate()))?;
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn fast(timeout_ms: u64) -> Poller {
        Poller::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(10),
        )
        .unwrap()
    }

    mod truthy_tests {
        use super::*;

        #[test]
        fn test_bool_truthiness() {
            assert_eq!(true.into_ready(), Some(true));
            assert_eq!(false.into_ready(), None);
        }

        #[test]
        fn test_option_truthiness() {
            assert_eq!(Some(3).into_ready(), Some(3));
            assert_eq!(None::<u8>.into_ready(), None);
        }
    }

    mod poller_tests {
        use super::*;

        #[test]
        fn test_default_poller() {
            let poller = Poller::default();
            assert_eq!(poller.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
            assert_eq!(
                poller.poll_interval(),
                Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)
            );
        }

        #[test]
        fn test_zero_timeout_rejected() {
            let err = Poller::new(Duration::ZERO, Duration::from_millis(10)).unwrap_err();
            assert!(matches!(err, EsperaError::Configuration { .. }));
        }

        #[test]
        fn test_zero_interval_rejected() {
            assert!(Poller::new(Duration::from_secs(1), Duration::ZERO).is_err());
        }

        #[test]
        fn test_deadline_from_start() {
            let poller = fast(500);
            let start = Instant::now();
            assert_eq!(
                poller.deadline_from(start).unwrap() - start,
                Duration::from_millis(500)
            );
        }

        #[test]
        fn test_unrepresentable_deadline_polls_without_one() {
            let poller = Poller::new(Duration::MAX, Duration::from_millis(5)).unwrap();
            assert!(poller.deadline_from(Instant::now()).is_none());

            let calls = AtomicU32::new(0);
            let outcome = poller
                .until_ignoring("third call", EsperaError::is_transient, || {
                    Ok(calls.fetch_add(1, Ordering::SeqCst) >= 2)
                })
                .unwrap();
            assert!(outcome.value);
            assert_eq!(outcome.attempts, 3);
        }

        #[test]
        fn test_unrepresentable_deadline_still_propagates_errors() {
            let poller = Poller::new(Duration::MAX, Duration::from_millis(5)).unwrap();
            let err = poller
                .until("broken", || -> EsperaResult<bool> { Err(EsperaError::driver("gone")) })
                .unwrap_err();
            assert!(matches!(err, EsperaError::Driver { .. }));
        }

        #[test]
        fn test_immediate_success_evaluates_once() {
            let outcome = fast(100)
                .until_ignoring("always", EsperaError::is_transient, || Ok(true))
                .unwrap();
            assert!(outcome.value);
            assert_eq!(outcome.attempts, 1);
        }

        #[test]
        fn test_returns_option_payload() {
            let calls = AtomicU32::new(0);
            let value = fast(500)
                .until("third call", || {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok((n >= 3).then_some(n * 10))
                })
                .unwrap();
            assert_eq!(value, 30);
        }

        #[test]
        fn test_timeout_window() {
            let poller = fast(100);
            let start = Instant::now();
            let err = poller.until("never", || Ok(false)).unwrap_err();
            let elapsed = start.elapsed();
            match err {
                EsperaError::DeadlineExceeded {
                    timeout, elapsed: reported, waited_for,
                } => {
                    assert_eq!(timeout, Duration::from_millis(100));
                    assert!(reported >= timeout);
                    assert_eq!(waited_for, "never");
                }
                other => panic!("expected DeadlineExceeded, got {other:?}"),
            }
            assert!(elapsed >= Duration::from_millis(100));
            assert!(elapsed < Duration::from_millis(100 + 10 + 50));
        }

        #[test]
        fn test_transient_errors_are_absorbed() {
            let calls = AtomicU32::new(0);
            let result = fast(500).until("appears", || {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(EsperaError::NotFound {
                        locator: "css=#late".into(),
                    })
                } else {
                    Ok(true)
                }
            });
            assert!(result.unwrap());
            assert_eq!(calls.load(Ordering::SeqCst), 3);
        }

        #[test]
        fn test_fatal_error_propagates_immediately() {
            let start = Instant::now();
            let calls = AtomicU32::new(0);
            let err = fast(1_000)
                .until("fatal", || -> EsperaResult<bool> {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(EsperaError::driver("session closed"))
                })
                .unwrap_err();
            assert!(matches!(err, EsperaError::Driver { .. }));
            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert!(start.elapsed() < Duration::from_millis(500));
        }

        #[test]
        fn test_custom_ignore_filter_narrows_transients() {
            let err = fast(500)
                .until_ignoring("raw handle", EsperaError::is_not_found, || -> EsperaResult<bool> {
                    Err(EsperaError::StaleReference {
                        element: "node-1".into(),
                    })
                })
                .unwrap_err();
            assert!(matches!(err, EsperaError::StaleReference { .. }));
        }

        #[test]
        fn test_transient_until_deadline_times_out() {
            let err = fast(60)
                .until("missing", || -> EsperaResult<bool> {
                    Err(EsperaError::NotFound {
                        locator: "css=#gone".into(),
                    })
                })
                .unwrap_err();
            assert!(err.is_deadline_exceeded());
        }
    }

    mod scenario_tests {
        use super::*;

        #[test]
        fn test_text_becomes_loaded_within_timeout() {
            let text = Arc::new(Mutex::new(String::from("Loading")));
            let writer = Arc::clone(&text);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(300));
                *writer.lock().unwrap() = String::from("Loaded");
            });

            let poller = Poller::new(Duration::from_secs(1), Duration::from_millis(50)).unwrap();
            let outcome = poller
                .until_ignoring("text contains 'Loaded'", EsperaError::is_transient, || {
                    Ok(text.lock().unwrap().contains("Loaded"))
                })
                .unwrap();
            assert!(outcome.value);
            assert!(outcome.elapsed >= Duration::from_millis(300));
            assert!(outcome.elapsed < Duration::from_millis(600));
        }

        #[test]
        fn test_never_satisfied_fails_near_one_second() {
            let poller = Poller::new(
                Duration::from_secs(1),
                Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            )
            .unwrap();
            let start = Instant::now();
            let err = poller.until("never", || Ok(false)).unwrap_err();
            let elapsed = start.elapsed();
            assert!(err.is_deadline_exceeded());
            assert!(elapsed >= Duration::from_secs(1));
            assert!(elapsed <= Duration::from_millis(1_300));
        }

        #[test]
        fn test_flag_set_from_other_thread() {
            let flag = Arc::new(AtomicBool::new(false));
            let flag_clone = Arc::clone(&flag);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                flag_clone.store(true, Ordering::SeqCst);
            });
            assert!(fast(500).until("flag", || Ok(flag.load(Ordering::SeqCst))).unwrap());
        }
    }

    mod convenience_tests {
        use super::*;

        #[test]
        fn test_wait_until_success() {
            assert!(wait_until(|| true, Duration::from_millis(100)).is_ok());
        }

        #[test]
        fn test_wait_until_timeout() {
            let err = wait_until(|| false, Duration::from_millis(100)).unwrap_err();
            assert!(err.is_deadline_exceeded());
        }

        #[test]
        fn test_wait_until_zero_timeout() {
            let err = wait_until(|| true, Duration::ZERO).unwrap_err();
            assert!(matches!(err, EsperaError::Configuration { .. }));
        }
    }
}
