//! Fixed-period timers for xbridge.
//!
//! Every recurring action in the bridge (session heartbeat, server ping,
//! friend reconciliation, follower auto-friend sweep) runs off a
//! [`TickScheduler`]. The periods are long (seconds to minutes) and the
//! actions are network calls, so a late tick never bursts: it is followed
//! by a full period, not a catch-up volley.
//!
//! # Integration
//!
//! The scheduler sits inside an actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         _ = heartbeat.wait_for_tick() => {
//!             put_session().await;
//!             heartbeat.record_tick_end();
//!         }
//!     }
//! }
//! ```
//!
//! `wait_for_tick` only mutates the scheduler after its sleep completes,
//! so dropping it from a losing `select!` branch is safe.

use std::time::{Duration, Instant};

use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the tick scheduler.
#[derive(Debug, Clone, Default)]
pub struct TickConfig {
    /// Time between ticks. `None` disables the timer (it never fires).
    pub period: Option<Duration>,
}

impl TickConfig {
    /// Shortest period accepted. Anything below is clamped up to it.
    pub const MIN_PERIOD: Duration = Duration::from_millis(10);

    /// A config that ticks every `period`.
    pub fn every(period: Duration) -> Self {
        Self {
            period: Some(period),
        }
    }

    /// A config that never ticks.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Clamp out-of-range values. Called by [`TickScheduler::new`].
    ///
    /// A zero period would spin, so it is clamped to [`Self::MIN_PERIOD`].
    pub fn validated(mut self) -> Self {
        if let Some(period) = self.period {
            if period < Self::MIN_PERIOD {
                warn!(
                    period_ms = period.as_millis() as u64,
                    min_ms = Self::MIN_PERIOD.as_millis() as u64,
                    "tick period below minimum; clamping"
                );
                self.period = Some(Self::MIN_PERIOD);
            }
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tick info (returned to caller each tick)
// ---------------------------------------------------------------------------

/// Information about a fired tick, returned by
/// [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// `true` if this tick fired more than 10% of a period late.
    pub late: bool,
    /// Whole periods skipped because of lateness (0 in normal operation).
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-period tick scheduler. One per recurring action.
pub struct TickScheduler {
    config: TickConfig,
    tick_count: u64,
    next_tick: Option<TokioInstant>,
    /// Set by `wait_for_tick`, consumed by `record_tick_end`.
    tick_start: Option<Instant>,
}

impl TickScheduler {
    /// Create a new scheduler from config. The first tick fires one period
    /// from now.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let next_tick = config.period.map(|period| TokioInstant::now() + period);

        match config.period {
            Some(period) => debug!(period_ms = period.as_millis() as u64, "tick scheduler created"),
            None => debug!("tick scheduler created disabled"),
        }

        Self {
            config,
            tick_count: 0,
            next_tick,
            tick_start: None,
        }
    }

    /// Shorthand for `TickScheduler::new(TickConfig::every(period))`.
    pub fn every(period: Duration) -> Self {
        Self::new(TickConfig::every(period))
    }

    /// Wait until the next tick is due.
    ///
    /// When disabled this future pends forever; `tokio::select!` keeps
    /// servicing its other branches.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let (next, period) = match (self.next_tick, self.config.period) {
            (Some(next), Some(period)) => (next, period),
            _ => std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = TokioInstant::now();
        self.tick_count += 1;
        self.tick_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(next);
        let late = late_by > period / 10;
        let mut ticks_skipped = 0u64;
        if late {
            ticks_skipped = (late_by.as_nanos() / period.as_nanos()) as u64;
            if ticks_skipped > 0 {
                warn!(
                    tick = self.tick_count,
                    skipped = ticks_skipped,
                    late_ms = late_by.as_millis() as u64,
                    "tick late; skipping ahead"
                );
            }
        }
        self.next_tick = Some(now + period);

        trace!(tick = self.tick_count, late, "tick fired");

        TickInfo {
            tick: self.tick_count,
            late,
            ticks_skipped,
        }
    }

    /// Record that the action for the current tick finished.
    ///
    /// Warns when the action ran longer than a whole period, which means
    /// the next tick is already overdue.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.tick_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        if let Some(period) = self.config.period {
            if elapsed >= period {
                warn!(
                    tick = self.tick_count,
                    elapsed_ms = elapsed.as_millis() as u64,
                    period_ms = period.as_millis() as u64,
                    "action outlasted its tick period"
                );
            }
        }
    }
}
