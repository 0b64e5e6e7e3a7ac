//! Periodic time windows and the bounds they produce.

use std::fmt;

use crate::error::{Error, Result};
use crate::time::{Duration, Time};

/// A half-open time interval `[start, stop)`. `start >= stop` is the empty interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Bounds {
    pub start: Time,
    pub stop: Time,
}

impl Bounds {
    pub const fn new(start: Time, stop: Time) -> Self {
        Self { start, stop }
    }

    /// `[Time::MIN, Time::MAX)`.
    pub const fn unbounded() -> Self {
        Self::new(Time::MIN, Time::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.stop
    }

    pub fn contains(&self, t: Time) -> bool {
        t >= self.start && t < self.stop
    }

    /// Whether the two intervals share at least one instant.
    pub fn overlaps(&self, other: &Bounds) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.start < other.stop
            && other.start < self.stop
    }

    /// The common part of both intervals; empty when they do not overlap.
    pub fn intersect(&self, other: &Bounds) -> Bounds {
        Bounds::new(self.start.max(other.start), self.stop.min(other.stop))
    }

    /// The smallest interval covering both. Empty inputs are ignored.
    pub fn union(&self, other: &Bounds) -> Bounds {
        match (self.is_empty(), other.is_empty()) {
            (true, _) => *other,
            (_, true) => *self,
            _ => Bounds::new(self.start.min(other.start), self.stop.max(other.stop)),
        }
    }

    /// Width of the interval, zero when empty.
    pub fn length(&self) -> Duration {
        if self.is_empty() {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.stop.nanos().saturating_sub(self.start.nanos()))
    }

    pub fn shift(&self, d: Duration) -> Bounds {
        Bounds::new(self.start.add(d), self.stop.add(d))
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}

/// One window of a [`Window`] tiling together with its position in the tiling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowBounds {
    bounds: Bounds,
    index: i64,
}

impl WindowBounds {
    pub fn start(&self) -> Time {
        self.bounds.start
    }

    pub fn stop(&self) -> Time {
        self.bounds.stop
    }

    pub fn index(&self) -> i64 {
        self.index
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }
}

/// An infinite sequence of windows.
///
/// Window `k` is anchored at the boundary `(epoch + k * every) + offset`. A non-negative period
/// spans `[boundary, boundary + period)`; a negative period spans `[boundary - |period|,
/// boundary)`. Calendar months are applied before nanoseconds, so month-based windows follow
/// the calendar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    every: Duration,
    period: Duration,
    offset: Duration,
}

impl Window {
    /// Build a window. The offset is reduced into `[0, every)` when both are expressed in the same
    /// unit.
    pub fn new(every: Duration, period: Duration, offset: Duration) -> Result<Self> {
        if every.is_zero() {
            return Err(Error::InvalidWindow(
                "duration used as an interval cannot be zero".to_string(),
            ));
        }
        if every.is_mixed() {
            return Err(Error::InvalidWindow(
                "duration used as an interval cannot mix month and nanosecond units".to_string(),
            ));
        }
        if every.is_negative() {
            return Err(Error::InvalidWindow(
                "duration used as an interval cannot be negative".to_string(),
            ));
        }
        Ok(Self {
            every,
            period,
            offset: offset.normalize(every),
        })
    }

    pub fn every(&self) -> Duration {
        self.every
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn offset(&self) -> Duration {
        self.offset
    }

    pub fn is_infinite(&self) -> bool {
        self.every.is_infinite()
    }

    fn boundary(&self, index: i64) -> Time {
        Time::EPOCH.add(self.every.mul(index)).add(self.offset)
    }

    fn bounds_at(&self, index: i64) -> WindowBounds {
        if self.is_infinite() {
            let bounds = match index.cmp(&0) {
                std::cmp::Ordering::Equal => Bounds::unbounded(),
                std::cmp::Ordering::Greater => Bounds::new(Time::MAX, Time::MAX),
                std::cmp::Ordering::Less => Bounds::new(Time::MIN, Time::MIN),
            };
            return WindowBounds { bounds, index };
        }
        let boundary = self.boundary(index);
        let end = boundary.add(self.period);
        let bounds = if self.period.is_negative() {
            Bounds::new(end, boundary)
        } else {
            Bounds::new(boundary, end)
        };
        WindowBounds { bounds, index }
    }

    /// A first guess at the index of the latest window starting at or before `t`.
    fn estimate_index(&self, t: Time) -> i64 {
        // Window starts sit `period` before their boundary when the period is negative.
        let target = if self.period.is_negative() {
            t.add(-self.period)
        } else {
            t
        };
        let zero = Time::EPOCH.add(self.offset);
        if self.every.is_months_only() {
            let delta = target.month_index() - zero.month_index();
            delta.div_euclid(self.every.months())
        } else {
            let delta = target.nanos().saturating_sub(zero.nanos());
            delta.div_euclid(self.every.nanos())
        }
    }

    /// The window with the greatest start that is not after `t`.
    ///
    /// For underlapping windows that do not contain `t`, this is the window directly before it.
    pub fn get_latest_bounds(&self, t: Time) -> WindowBounds {
        if self.is_infinite() {
            return self.bounds_at(0);
        }
        let mut current = self.bounds_at(self.estimate_index(t));
        while current.start() > t {
            let prev = self.prev_bounds(&current);
            if prev.start() >= current.start() {
                break;
            }
            current = prev;
        }
        loop {
            let next = self.next_bounds(&current);
            if next.start() > t || next.start() <= current.start() {
                break;
            }
            current = next;
        }
        current
    }

    pub fn next_bounds(&self, b: &WindowBounds) -> WindowBounds {
        self.bounds_at(b.index.saturating_add(1))
    }

    pub fn prev_bounds(&self, b: &WindowBounds) -> WindowBounds {
        self.bounds_at(b.index.saturating_sub(1))
    }

    /// Every window overlapping `[start, stop)`, in ascending order. Empty input bounds yield no
    /// windows. An infinite `every` yields the single window `[Time::MIN, Time::MAX)`.
    pub fn get_overlapping_bounds(&self, start: Time, stop: Time) -> Vec<Bounds> {
        let query = Bounds::new(start, stop);
        if query.is_empty() {
            return Vec::new();
        }
        if self.is_infinite() {
            return vec![Bounds::unbounded()];
        }

        // Earlier windows may still reach into the query when windows overlap.
        let mut first = self.get_latest_bounds(start);
        loop {
            let prev = self.prev_bounds(&first);
            if prev.stop() <= start || prev.start() >= first.start() {
                break;
            }
            first = prev;
        }

        let mut out = Vec::new();
        let mut current = first;
        while current.start() < stop {
            if current.bounds.overlaps(&query) {
                out.push(current.bounds);
            }
            let next = self.next_bounds(&current);
            if next.start() <= current.start() {
                break;
            }
            current = next;
        }
        out
    }

    /// The windows overlapping `bounds`, each clipped to `bounds`.
    pub fn clipped_bounds(&self, bounds: &Bounds) -> Vec<Bounds> {
        self.get_overlapping_bounds(bounds.start, bounds.stop)
            .into_iter()
            .map(|b| b.intersect(bounds))
            .filter(|b| !b.is_empty())
            .collect()
    }
}
