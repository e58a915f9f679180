use std::time::{Duration, Instant};

// Nanoseconds elapsed since the clock origin
pub type TimestampNanos = u64;

/// Monotonic clock local to one benchmark run.
///
/// All measurement timestamps are nanoseconds since `origin` so they can be
/// compared and subtracted without wall clock jumps.
#[derive(Clone, Copy, Debug)]
pub struct RunClock {
    origin: Instant,
}

impl RunClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    #[inline]
    pub fn now(&self) -> TimestampNanos {
        let nanos = self.origin.elapsed().as_nanos();
        // u64 nanoseconds covers more than 500 years
        u64::try_from(nanos).unwrap_or(u64::MAX)
    }

    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

impl Default for RunClock {
    fn default() -> Self {
        Self::start()
    }
}

#[inline]
pub fn nanos_to_seconds(nanos: TimestampNanos) -> f64 {
    nanos as f64 / 1_000_000_000f64
}
