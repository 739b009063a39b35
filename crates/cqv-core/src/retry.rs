//! Bounded exponential backoff for transient failures.

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Total attempts including the first. `1` disables retrying.
  pub max_attempts:       u32,
  pub initial_backoff_ms: u64,
  pub max_backoff_ms:     u64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { max_attempts: 3, initial_backoff_ms: 100, max_backoff_ms: 2_000 }
  }
}

impl RetryPolicy {
  pub fn no_retry() -> Self { Self { max_attempts: 1, ..Self::default() } }

  /// Delay before attempt `attempt + 1`, where `attempt` counts from 1.
  pub fn backoff(&self, attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    let ms = self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
    Duration::from_millis(ms)
  }

  /// Run `op` until it succeeds, returns an error `should_retry` rejects, or
  /// the attempt budget is spent. The last error is returned.
  pub async fn run<T, E, F, Fut>(
    &self,
    mut op: F,
    should_retry: impl Fn(&E) -> bool,
  ) -> Result<T, E>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
  {
    let mut attempt = 1;
    loop {
      match op().await {
        Ok(v) => return Ok(v),
        Err(e) if attempt < self.max_attempts.max(1) && should_retry(&e) => {
          let delay = self.backoff(attempt);
          tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying");
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(e) => return Err(e),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicU32, Ordering};

  use super::*;

  fn fast(max_attempts: u32) -> RetryPolicy {
    RetryPolicy { max_attempts, initial_backoff_ms: 1, max_backoff_ms: 4 }
  }

  #[test]
  fn backoff_doubles_up_to_the_cap() {
    let p = RetryPolicy { max_attempts: 10, initial_backoff_ms: 100, max_backoff_ms: 350 };
    assert_eq!(p.backoff(1), Duration::from_millis(100));
    assert_eq!(p.backoff(2), Duration::from_millis(200));
    assert_eq!(p.backoff(3), Duration::from_millis(350));
    assert_eq!(p.backoff(80), Duration::from_millis(350));
  }

  #[tokio::test]
  async fn retries_until_success() {
    let calls = AtomicU32::new(0);
    let out: Result<u32, String> = fast(5)
      .run(
        || async {
          let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
          if n < 3 { Err(format!("attempt {n}")) } else { Ok(n) }
        },
        |_| true,
      )
      .await;
    assert_eq!(out, Ok(3));
  }

  #[tokio::test]
  async fn stops_at_the_attempt_budget() {
    let calls = AtomicU32::new(0);
    let out: Result<(), String> = fast(2)
      .run(
        || async {
          calls.fetch_add(1, Ordering::SeqCst);
          Err("down".to_owned())
        },
        |_| true,
      )
      .await;
    assert!(out.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn permanent_errors_are_not_retried() {
    let calls = AtomicU32::new(0);
    let _: Result<(), String> = fast(5)
      .run(
        || async {
          calls.fetch_add(1, Ordering::SeqCst);
          Err("syntax".to_owned())
        },
        |e| e != "syntax",
      )
      .await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }
}
