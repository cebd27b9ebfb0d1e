//! Clock and timer capabilities injected into the scheduler.

use futures::future::BoxFuture;
use std::time::Duration;
use tracing::warn;

/// Largest delay a timer will accept (2^31 - 1 ms, about 24.8 days).
pub const MAX_TIMER_DELAY: Duration = Duration::from_millis(i32::MAX as u64);

/// Source of the current time in epoch milliseconds.
pub trait Clock: Send + Sync {
  fn now_millis(&self) -> i64;
}

/// Wall clock backed by `chrono::Utc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now_millis(&self) -> i64 {
    chrono::Utc::now().timestamp_millis()
  }
}

/// One-shot timer facility. There is no cancel: an armed task always runs.
pub trait Timer: Send + Sync {
  /// Run `task` once `delay` has elapsed.
  fn arm(&self, delay: Duration, task: BoxFuture<'static, ()>);

  /// Delays above this are never armed.
  fn max_delay(&self) -> Duration {
    MAX_TIMER_DELAY
  }
}

/// Timer that spawns a sleeping task on the current tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimer;

impl Timer for TokioTimer {
  fn arm(&self, delay: Duration, task: BoxFuture<'static, ()>) {
    match tokio::runtime::Handle::try_current() {
      Ok(handle) => {
        handle.spawn(async move {
          tokio::time::sleep(delay).await;
          task.await;
        });
      }
      Err(_) => warn!(?delay, "no tokio runtime available, timer not armed"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::Arc;

  #[tokio::test(start_paused = true)]
  async fn test_tokio_timer_fires_after_delay() {
    let fired = Arc::new(AtomicBool::new(false));
    let flag = fired.clone();

    TokioTimer.arm(
      Duration::from_secs(30),
      Box::pin(async move {
        flag.store(true, Ordering::SeqCst);
      }),
    );

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert!(!fired.load(Ordering::SeqCst));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(fired.load(Ordering::SeqCst));
  }

  #[test]
  fn test_arm_without_runtime_does_not_panic() {
    TokioTimer.arm(Duration::from_millis(1), Box::pin(async {}));
  }

  #[test]
  fn test_system_clock_is_epoch_millis() {
    // 2020-01-01T00:00:00Z
    assert!(SystemClock.now_millis() > 1_577_836_800_000);
  }
}
