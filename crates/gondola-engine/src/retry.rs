//! Time source and bounded read retry.
//!
//! The engine never calls `Instant::now()` or `thread::sleep` directly. Both go
//! through [`Clock`], so tests can drive timeouts and retry delays with a
//! [`ManualClock`] instead of waiting in real time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Source of monotonic time and blocking sleeps.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Wall clock backed by `std::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock for tests. Time only moves through [`advance`](Self::advance)
/// or `sleep`, which returns immediately after advancing.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use gondola_engine::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.sleep(Duration::from_millis(50));
/// clock.advance(Duration::from_secs(1));
/// assert_eq!(clock.now() - start, Duration::from_millis(1050));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
    slept: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            slept: Mutex::new(Vec::new()),
        }
    }

    /// Move time forward.
    pub fn advance(&self, duration: Duration) {
        *self.offset.lock() += duration;
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.slept.lock().push(duration);
        self.advance(duration);
    }
}

/// Attempt count and spacing for a bounded read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Worst-case time spent sleeping when every attempt comes back empty.
    pub fn max_wait(&self) -> Duration {
        self.delay * self.attempts.saturating_sub(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            gondola_core::constants::DEFAULT_READ_ATTEMPTS,
            Duration::from_millis(gondola_core::constants::DEFAULT_READ_DELAY_MS),
        )
    }
}

/// Call `op` until it yields a value, at most `policy.attempts` times.
///
/// Sleeps `policy.delay` between consecutive attempts and never after the
/// last one. Returns `None` if every attempt came back empty.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use gondola_engine::{ManualClock, RetryPolicy, retry_read};
///
/// let clock = ManualClock::new();
/// let mut replies = vec![None, None, Some(4)].into_iter();
/// let value = retry_read(&clock, RetryPolicy::new(4, Duration::from_millis(50)), || {
///     replies.next().flatten()
/// });
///
/// assert_eq!(value, Some(4));
/// assert_eq!(clock.elapsed(), Duration::from_millis(100));
/// ```
pub fn retry_read<T, K, F>(clock: &K, policy: RetryPolicy, mut op: F) -> Option<T>
where
    K: Clock + ?Sized,
    F: FnMut() -> Option<T>,
{
    for attempt in 0..policy.attempts {
        if attempt > 0 {
            clock.sleep(policy.delay);
        }
        if let Some(value) = op() {
            return Some(value);
        }
    }
    None
}
