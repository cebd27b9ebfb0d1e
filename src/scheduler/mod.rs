//! Time-triggered purchase revalidation around subscription expirations.

mod refresh;
mod timer;

pub use refresh::{
  schedule_id, PurchaseRefresher, RefreshScheduler, ScheduleOutcome, ScheduledRefresh,
  EARLY_FIRE_TOLERANCE_MS, EXPIRATION_PROBE_OFFSET_MS, POST_EXPIRATION, PRE_EXPIRATION,
  RETRY_DELAY_MS, RETRY_PREFIX,
};
pub use timer::{Clock, SystemClock, Timer, TokioTimer, MAX_TIMER_DELAY};
