//! Expiry-driven purchase refresh scheduling.
//!
//! Each [`ScheduledRefresh`] moves through a small state machine:
//!
//! ```text
//! Pending --(fires, no sibling in progress)--> InProgress --(ok)--> Completed
//! Pending --(fires, sibling in progress)-----> Pending (skipped)
//! InProgress --(err, first attempt)--> new Pending "retry-<reason>" 30s later
//! InProgress --(err, already a retry)--> abandoned
//! ```
//!
//! Timers cannot be cancelled. Clearing the schedules only drops bookkeeping;
//! a timer that fires afterwards finds no record and degrades to a plain
//! refresh without state updates or retries.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::timer::{Clock, Timer};
use crate::billing::Purchase;
use crate::error::Result;

/// Distance of the pre/post expiration probes from the expiration instant.
pub const EXPIRATION_PROBE_OFFSET_MS: i64 = 10_000;
/// Delay before the single retry of a failed refresh.
pub const RETRY_DELAY_MS: i64 = 30_000;
/// A timer firing earlier than this before its target is treated as spurious.
pub const EARLY_FIRE_TOLERANCE_MS: i64 = 10_000;

pub const RETRY_PREFIX: &str = "retry-";
pub const PRE_EXPIRATION: &str = "pre-expiration";
pub const POST_EXPIRATION: &str = "post-expiration";

/// Capability the scheduler calls back into when a timer fires.
#[async_trait]
pub trait PurchaseRefresher: Send + Sync {
  async fn refresh_purchases(&self) -> Result<()>;
}

/// A pending or finished time-triggered refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledRefresh {
  pub id: String,
  pub subscription_id: String,
  /// Target instant in epoch milliseconds
  pub scheduled_at: i64,
  pub reason: String,
  pub completed: bool,
  pub in_progress: bool,
}

impl ScheduledRefresh {
  pub fn is_retry(&self) -> bool {
    self.reason.starts_with(RETRY_PREFIX)
  }
}

/// What `schedule_refresh` did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
  /// A schedule with the same id already exists
  Duplicate,
  /// Recorded and a timer was armed
  Armed,
  /// Recorded, but the target is not in the future so no timer was armed
  PastDue,
  /// Recorded, but the delay exceeds what the timer can represent
  BeyondTimerRange,
}

/// Schedule id: one record per subscription and target instant.
pub fn schedule_id(subscription_id: &str, scheduled_at: i64) -> String {
  format!("{}:{}", subscription_id, scheduled_at)
}

/// Decision taken under the lock when a timer fires.
enum Claim {
  Skip,
  Orphaned,
  Run {
    subscription_id: String,
    reason: String,
  },
}

/// Owns the schedule records and arms timers for them.
pub struct RefreshScheduler {
  schedules: Mutex<BTreeMap<String, ScheduledRefresh>>,
  refresher: Weak<dyn PurchaseRefresher>,
  clock: Arc<dyn Clock>,
  timer: Arc<dyn Timer>,
}

impl RefreshScheduler {
  pub fn new(
    refresher: Weak<dyn PurchaseRefresher>,
    clock: Arc<dyn Clock>,
    timer: Arc<dyn Timer>,
  ) -> Self {
    Self {
      schedules: Mutex::new(BTreeMap::new()),
      refresher,
      clock,
      timer,
    }
  }

  /// Record a refresh for `subscription_id` at `scheduled_at` and arm a timer.
  ///
  /// Idempotent per (subscription, instant). Past-due schedules are recorded
  /// but never run. So are schedules beyond the timer range, and since the
  /// record exists, asking again once in range is a duplicate.
  pub fn schedule_refresh(
    self: &Arc<Self>,
    subscription_id: &str,
    scheduled_at: i64,
    reason: &str,
  ) -> ScheduleOutcome {
    let id = schedule_id(subscription_id, scheduled_at);

    {
      let mut schedules = self.schedules.lock();
      if schedules.contains_key(&id) {
        debug!(%id, "refresh already scheduled");
        return ScheduleOutcome::Duplicate;
      }
      schedules.insert(
        id.clone(),
        ScheduledRefresh {
          id: id.clone(),
          subscription_id: subscription_id.to_string(),
          scheduled_at,
          reason: reason.to_string(),
          completed: false,
          in_progress: false,
        },
      );
    }

    let delay_ms = scheduled_at - self.clock.now_millis();
    if delay_ms <= 0 {
      debug!(%id, reason, delay_ms, "refresh target already passed, not arming");
      return ScheduleOutcome::PastDue;
    }

    let delay = Duration::from_millis(delay_ms as u64);
    if delay > self.timer.max_delay() {
      debug!(%id, reason, ?delay, "refresh target beyond timer range, not arming");
      return ScheduleOutcome::BeyondTimerRange;
    }

    debug!(%id, reason, ?delay, "arming refresh timer");
    let scheduler = Arc::downgrade(self);
    self.timer.arm(
      delay,
      Box::pin(async move {
        if let Some(scheduler) = scheduler.upgrade() {
          scheduler.fire(id).await;
        }
      }),
    );

    ScheduleOutcome::Armed
  }

  /// Bracket a purchase's expiration with a probe shortly before and after.
  ///
  /// Purchases without an expiration date never need probing. Probes whose
  /// target already passed are skipped entirely.
  pub fn schedule_purchase_refreshes(self: &Arc<Self>, purchase: &Purchase) {
    let Some(expiration) = purchase.expiration_date else {
      return;
    };
    let expiration = expiration.timestamp_millis();
    let now = self.clock.now_millis();

    for (at, reason) in [
      (expiration - EXPIRATION_PROBE_OFFSET_MS, PRE_EXPIRATION),
      (expiration + EXPIRATION_PROBE_OFFSET_MS, POST_EXPIRATION),
    ] {
      if at <= now {
        debug!(purchase = %purchase.id, reason, "probe time already passed");
        continue;
      }
      self.schedule_refresh(&purchase.id, at, reason);
    }
  }

  /// Drop every schedule. Already-armed timers still fire.
  pub fn clear_schedules(&self) {
    let mut schedules = self.schedules.lock();
    debug!(count = schedules.len(), "clearing refresh schedules");
    schedules.clear();
  }

  /// Snapshot of all schedule records, ordered by id.
  pub fn schedules(&self) -> Vec<ScheduledRefresh> {
    self.schedules.lock().values().cloned().collect()
  }

  pub fn get(&self, id: &str) -> Option<ScheduledRefresh> {
    self.schedules.lock().get(id).cloned()
  }

  pub fn len(&self) -> usize {
    self.schedules.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.schedules.lock().is_empty()
  }

  /// Timer callback for the schedule `id`.
  async fn fire(self: Arc<Self>, id: String) {
    let Some(refresher) = self.refresher.upgrade() else {
      debug!(%id, "refresher dropped, ignoring timer");
      return;
    };
    let now = self.clock.now_millis();

    // Checks and the in-progress claim happen under one lock
    let claim = {
      let mut schedules = self.schedules.lock();
      match schedules.get(&id) {
        None => Claim::Orphaned,
        Some(schedule) if schedule.completed => Claim::Skip,
        Some(schedule) if schedule.scheduled_at - now > EARLY_FIRE_TOLERANCE_MS => {
          debug!(%id, early_ms = schedule.scheduled_at - now, "timer fired too early, ignoring");
          Claim::Skip
        }
        Some(schedule) => {
          let subscription_id = schedule.subscription_id.clone();
          let reason = schedule.reason.clone();
          if schedules
            .values()
            .any(|s| s.subscription_id == subscription_id && s.in_progress)
          {
            debug!(%id, subscription = %subscription_id, "refresh already in progress, skipping");
            Claim::Skip
          } else {
            if let Some(schedule) = schedules.get_mut(&id) {
              schedule.in_progress = true;
            }
            Claim::Run {
              subscription_id,
              reason,
            }
          }
        }
      }
    };

    let (subscription_id, reason) = match claim {
      Claim::Skip => return,
      Claim::Orphaned => {
        debug!(%id, "timer fired for a cleared schedule");
        if let Err(e) = refresher.refresh_purchases().await {
          debug!(%id, error = %e, "refresh for cleared schedule failed");
        }
        return;
      }
      Claim::Run {
        subscription_id,
        reason,
      } => (subscription_id, reason),
    };

    let result = refresher.refresh_purchases().await;

    let still_scheduled = {
      let mut schedules = self.schedules.lock();
      match schedules.get_mut(&id) {
        Some(schedule) => {
          schedule.in_progress = false;
          schedule.completed = result.is_ok();
          true
        }
        None => false,
      }
    };

    match result {
      Ok(()) => info!(%id, subscription = %subscription_id, %reason, "scheduled refresh completed"),
      Err(e) if reason.starts_with(RETRY_PREFIX) => {
        warn!(%id, error = %e, "scheduled refresh retry failed, giving up");
      }
      Err(e) if !still_scheduled => {
        warn!(%id, error = %e, "scheduled refresh failed after schedules were cleared");
      }
      Err(e) => {
        warn!(%id, error = %e, "scheduled refresh failed, retrying in {}ms", RETRY_DELAY_MS);
        // A retry landing on an existing schedule of the same subscription is
        // a duplicate: that schedule already runs at the retry instant, so no
        // retry record is added.
        let retry_at = self.clock.now_millis() + RETRY_DELAY_MS;
        self.schedule_refresh(
          &subscription_id,
          retry_at,
          &format!("{}{}", RETRY_PREFIX, reason),
        );
      }
    }
  }
}

impl std::fmt::Debug for RefreshScheduler {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RefreshScheduler")
      .field("schedules", &self.schedules.lock().len())
      .finish_non_exhaustive()
  }
}
