//! Pulse scheduler: the suspend/resume state machine behind a module's
//! `pulse` hook.
//!
//! ```text
//!            resume → returns
//!   ┌──────────────────────────────┐
//!   ▼                              │
//! Idle ──resume──► luna.yield()  ──┼─► Yielded ──next tick──► resume
//!                  luna.yield(d) ──┼─► SleepingUntil(t+d) ──now ≥ t+d──► resume
//!                  error ──────────┴─► Faulted (module exits)
//! ```
//!
//! `t` is the moment the script called `luna.yield`, not the tick timestamp.
//! `Paused` is tracked by the module state, not here: a paused module is
//! simply not handed to the scheduler.

use mlua::{Table, ThreadStatus, Value};
use std::fmt;
use std::time::{Duration, Instant};

/// Scheduler state for one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseState {
    /// The next tick starts the hook from the top.
    Idle,
    /// Suspended; resumes on the next tick exactly where it left off.
    Yielded,
    /// Suspended until the deadline.
    SleepingUntil(Instant),
    /// The hook raised an error. Terminal.
    Faulted,
}

impl PulseState {
    /// Returns `true` if a coroutine is parked and must be resumed rather
    /// than restarted.
    #[must_use]
    pub fn is_suspended(self) -> bool {
        matches!(self, Self::Yielded | Self::SleepingUntil(_))
    }
}

impl fmt::Display for PulseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Yielded => f.write_str("yielded"),
            Self::SleepingUntil(t) => {
                let left = t.saturating_duration_since(Instant::now());
                write!(f, "sleeping ({}ms left)", left.as_millis())
            }
            Self::Faulted => f.write_str("faulted"),
        }
    }
}

/// What a `luna.yield` call asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldRequest {
    /// Resume on the next tick.
    NextTick,
    /// Resume on the first tick at or after the yield time plus `duration`.
    Sleep(Duration),
}

impl YieldRequest {
    /// Parses the first argument of `luna.yield`.
    ///
    /// Accepts nothing/nil, an integer number of milliseconds, or a table
    /// with optional integer `min`, `sec` and `ms` fields that are summed.
    /// A negative total counts as zero.
    ///
    /// # Errors
    ///
    /// Any other argument shape.
    pub fn from_value(value: Option<&Value>) -> mlua::Result<Self> {
        match value {
            None | Some(Value::Nil) => Ok(Self::NextTick),
            Some(Value::Integer(ms)) => Ok(Self::Sleep(millis(*ms))),
            Some(Value::Number(n)) if n.fract() == 0.0 && n.is_finite() => {
                Ok(Self::Sleep(millis(*n as i64)))
            }
            Some(Value::Number(_)) => Err(mlua::Error::RuntimeError(
                "luna.yield duration must be a whole number of milliseconds".into(),
            )),
            Some(Value::Table(spec)) => Ok(Self::Sleep(Self::duration_from_table(spec)?)),
            Some(other) => Err(mlua::Error::RuntimeError(format!(
                "unknown argument passed to luna.yield: {}",
                other.type_name()
            ))),
        }
    }

    fn duration_from_table(spec: &Table) -> mlua::Result<Duration> {
        let min: Option<i64> = spec.get("min")?;
        let sec: Option<i64> = spec.get("sec")?;
        let ms: Option<i64> = spec.get("ms")?;
        let total = min
            .unwrap_or(0)
            .saturating_mul(60_000)
            .saturating_add(sec.unwrap_or(0).saturating_mul(1_000))
            .saturating_add(ms.unwrap_or(0));
        Ok(millis(total))
    }
}

/// A `luna.yield` call: the request and the moment it was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct YieldCall {
    pub(crate) request: YieldRequest,
    pub(crate) at: Instant,
}

/// Time as seen by scripts during a tick: the tick timestamp plus the wall
/// time spent in the tick so far.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TickClock {
    tick: Instant,
    started: Instant,
}

impl TickClock {
    pub(crate) fn start(tick: Instant) -> Self {
        Self {
            tick,
            started: Instant::now(),
        }
    }

    pub(crate) fn now(&self) -> Instant {
        deadline(self.tick, self.started.elapsed())
    }
}

/// `now + d`, clamped instead of overflowing for absurd durations.
fn deadline(now: Instant, d: Duration) -> Instant {
    const CEILING: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);
    now.checked_add(d.min(CEILING)).unwrap_or(now)
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(u64::try_from(ms).unwrap_or(0))
}

/// Result of one scheduler step.
#[derive(Debug, Clone, PartialEq)]
pub enum PulseOutcome {
    /// No `pulse` hook, module paused or exiting.
    Skipped,
    /// Deadline not reached.
    Asleep,
    /// Hook ran to completion.
    Completed,
    /// Hook suspended; see the new [`PulseState`].
    Suspended(PulseState),
    /// Hook raised an error.
    Faulted(String),
}

/// Per-module pulse state. The coroutine itself lives with the module and
/// is reused across runs of the hook.
#[derive(Debug)]
pub struct PulseScheduler {
    state: PulseState,
}

impl Default for PulseScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseScheduler {
    /// Creates an idle scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: PulseState::Idle,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PulseState {
        self.state
    }

    /// Returns `true` if a deadline is pending and not yet reached.
    #[must_use]
    pub fn is_asleep(&self, now: Instant) -> bool {
        matches!(self.state, PulseState::SleepingUntil(t) if now < t)
    }

    /// Records the result of one resume.
    ///
    /// `status` is the coroutine's status afterwards; `call` is whatever
    /// `luna.yield` recorded during the resume. A sleep deadline counts from
    /// the moment of the yield call.
    pub(crate) fn settle(
        &mut self,
        resumed: mlua::Result<()>,
        status: ThreadStatus,
        call: Option<YieldCall>,
    ) -> PulseOutcome {
        if let Err(e) = resumed {
            self.state = PulseState::Faulted;
            return PulseOutcome::Faulted(e.to_string());
        }
        if status != ThreadStatus::Resumable {
            self.state = PulseState::Idle;
            return PulseOutcome::Completed;
        }
        self.state = match call {
            Some(YieldCall {
                request: YieldRequest::Sleep(d),
                at,
            }) => PulseState::SleepingUntil(deadline(at, d)),
            Some(YieldCall {
                request: YieldRequest::NextTick,
                ..
            })
            | None => PulseState::Yielded,
        };
        PulseOutcome::Suspended(self.state)
    }

    /// Discards any suspension and marks the scheduler faulted.
    pub(crate) fn fault(&mut self) {
        self.state = PulseState::Faulted;
    }
}
