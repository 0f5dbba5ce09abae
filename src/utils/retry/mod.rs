//! Bounded retry of a single outbound request.
//!
//! A policy is a plain value: which response codes trigger a retry, how many
//! retries are allowed and the fixed delay between attempts. The loop itself
//! is explicit; `backon` only supplies the delay sequence.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ConstantBuilder};
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::protocol::{Exchange, HasResponseCode, ResponseCode};
use crate::utils::cancel::CancelSignal;

/// Response condition that can trigger another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryTrigger {
    /// `ServerError`.
    ServerError,
    /// `DuplicateVoucherRetry`; the caller must rotate the local transaction id.
    DuplicateVoucher,
    /// `SessionNoSessionInProgress`.
    NoSessionInProgress,
}

impl RetryTrigger {
    pub fn of(code: ResponseCode) -> Option<Self> {
        match code {
            ResponseCode::ServerError => Some(RetryTrigger::ServerError),
            ResponseCode::DuplicateVoucherRetry => Some(RetryTrigger::DuplicateVoucher),
            ResponseCode::SessionNoSessionInProgress => Some(RetryTrigger::NoSessionInProgress),
            _ => None,
        }
    }
}

impl fmt::Display for RetryTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Anything the retry loop can inspect for a retry trigger.
pub trait Retryable {
    fn retry_trigger(&self) -> Option<RetryTrigger>;
}

impl<R: HasResponseCode> Retryable for Exchange<R> {
    fn retry_trigger(&self) -> Option<RetryTrigger> {
        // A missing response is never retried in place.
        self.as_ref()
            .ok()
            .and_then(|response| RetryTrigger::of(response.response_code()))
    }
}

/// Lets policies nest: an inner loop's outcome feeds the outer loop.
impl<T: Retryable> Retryable for Result<T, RetryError> {
    fn retry_trigger(&self) -> Option<RetryTrigger> {
        self.as_ref().ok().and_then(Retryable::retry_trigger)
    }
}

/// Details of a retry about to happen, passed to the `on_retry` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    /// Attempt that just failed, starting at 1.
    pub attempt: usize,
    pub trigger: RetryTrigger,
    pub delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetryError {
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: usize },
}

/// Bounded retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    name: &'static str,
    retries: usize,
    delay: Duration,
    triggers: &'static [RetryTrigger],
}

impl RetryPolicy {
    pub fn new(
        name: &'static str,
        retries: usize,
        delay: Duration,
        triggers: &'static [RetryTrigger],
    ) -> Self {
        Self {
            name,
            retries,
            delay,
            triggers,
        }
    }

    /// Standard policy: configured retries, fixed delay, `ServerError` only.
    pub fn standard(config: &RetryConfig) -> Self {
        Self::new(
            "standard",
            config.retries as usize,
            config.delay(),
            &[RetryTrigger::ServerError],
        )
    }

    /// RequestPlay policy: exactly one retry, on `ServerError` or
    /// `SessionNoSessionInProgress`, whatever the standard policy allows.
    pub fn single_retry(delay: Duration) -> Self {
        Self::new(
            "single_retry",
            1,
            delay,
            &[RetryTrigger::ServerError, RetryTrigger::NoSessionInProgress],
        )
    }

    /// Outer EndSession loop: retries on `DuplicateVoucherRetry` only.
    pub fn duplicate_voucher(retries: u32, delay: Duration) -> Self {
        Self::new(
            "duplicate_voucher",
            retries as usize,
            delay,
            &[RetryTrigger::DuplicateVoucher],
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn max_retries(&self) -> usize {
        self.retries
    }

    pub fn retries_on(&self, trigger: RetryTrigger) -> bool {
        self.triggers.contains(&trigger)
    }

    fn delays(&self) -> impl Iterator<Item = Duration> {
        ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.retries)
            .build()
    }

    /// Run `request` under this policy.
    ///
    /// `request` receives the attempt number, starting at 1. Returns the last
    /// result once it is not retryable or retries are exhausted.
    pub async fn run<T, F, Fut>(&self, cancel: &CancelSignal, request: F) -> Result<T, RetryError>
    where
        T: Retryable,
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = T>,
    {
        self.run_notify(cancel, request, |_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_retry` before each wait.
    pub async fn run_notify<T, F, Fut, N>(
        &self,
        cancel: &CancelSignal,
        mut request: F,
        mut on_retry: N,
    ) -> Result<T, RetryError>
    where
        T: Retryable,
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = T>,
        N: FnMut(&RetryAttempt),
    {
        let mut delays = self.delays();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt - 1 });
                }
                result = request(attempt) => result,
            };

            let Some(trigger) = result.retry_trigger().filter(|t| self.retries_on(*t)) else {
                return Ok(result);
            };

            let Some(delay) = delays.next() else {
                warn!(
                    policy = self.name,
                    attempts = attempt,
                    %trigger,
                    "Retries exhausted"
                );
                return Ok(result);
            };

            debug!(
                policy = self.name,
                attempt,
                %trigger,
                delay_ms = delay.as_millis() as u64,
                "Retrying request"
            );
            on_retry(&RetryAttempt {
                attempt,
                trigger,
                delay,
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
