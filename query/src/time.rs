use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// The source of "now" for staleness decisions and `updated_at` stamps.
pub trait Clock: Send + Sync + 'static {
  fn now(&self) -> Instant;
}

/// The wall clock. Used unless a different clock is set on the builder.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  #[inline]
  fn now(&self) -> Instant {
    Instant::now()
  }
}

/// A clock that only moves when told to.
///
/// Useful for exercising staleness thresholds without sleeping.
pub struct ManualClock {
  origin: Instant,
  offset_nanos: AtomicU64,
}

impl ManualClock {
  pub fn new() -> Self {
    Self {
      origin: Instant::now(),
      offset_nanos: AtomicU64::new(0),
    }
  }

  /// Moves the clock forward by `duration`. The total offset saturates at
  /// `u64::MAX` nanoseconds (about 584 years).
  pub fn advance(&self, duration: Duration) {
    let step = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
    // The closure always returns `Some`, so the update cannot fail.
    let _ = self
      .offset_nanos
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |offset| {
        Some(offset.saturating_add(step))
      });
  }

  /// Total time advanced since the clock was created.
  pub fn elapsed(&self) -> Duration {
    Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
  }
}

impl Default for ManualClock {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for ManualClock {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ManualClock")
      .field("elapsed", &self.elapsed())
      .finish()
  }
}

// A century past the origin; reported when the offset is too large for the
// platform's `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

impl Clock for ManualClock {
  fn now(&self) -> Instant {
    self
      .origin
      .checked_add(self.elapsed())
      .unwrap_or_else(|| self.origin + FAR_FUTURE)
  }
}

/// How long a cached result stays fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaleTime {
  /// Fresh while the entry's age is at most this duration. A zero duration
  /// makes every access stale.
  After(Duration),
  /// Once cached, the entry never goes stale. Only `invalidate` refetches it.
  Never,
}

impl StaleTime {
  pub const ZERO: StaleTime = StaleTime::After(Duration::ZERO);
  pub const DEFAULT: StaleTime = StaleTime::After(Duration::from_millis(1000));

  pub const fn from_millis(millis: u64) -> Self {
    StaleTime::After(Duration::from_millis(millis))
  }

  /// Whether an entry of the given age must be refetched.
  #[inline]
  pub fn is_stale(&self, age: Duration) -> bool {
    match self {
      StaleTime::Never => false,
      StaleTime::After(limit) => limit.is_zero() || age > *limit,
    }
  }
}

impl Default for StaleTime {
  fn default() -> Self {
    StaleTime::DEFAULT
  }
}

impl From<Duration> for StaleTime {
  fn from(duration: Duration) -> Self {
    StaleTime::After(duration)
  }
}
