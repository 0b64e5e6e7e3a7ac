//! Nanosecond timestamps and calendar-aware durations.

use std::fmt;
use std::ops::Neg;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Months, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;
const NANOS_PER_DAY: i64 = 24 * NANOS_PER_HOUR;
const NANOS_PER_WEEK: i64 = 7 * NANOS_PER_DAY;

/// A point in time: signed nanoseconds since the Unix epoch (UTC).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Time(i64);

impl Time {
    pub const MIN: Time = Time(i64::MIN);
    pub const MAX: Time = Time(i64::MAX);
    pub const EPOCH: Time = Time(0);

    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(NANOS_PER_SECOND))
    }

    pub const fn nanos(self) -> i64 {
        self.0
    }

    /// Parse an RFC 3339 timestamp such as `2019-01-01T00:00:00Z`.
    pub fn parse_rfc3339(s: &str) -> Result<Self> {
        let parsed = DateTime::parse_from_rfc3339(s)
            .map_err(|err| Error::InvalidTime(format!("{s:?}: {err}")))?;
        parsed
            .with_timezone(&Utc)
            .timestamp_nanos_opt()
            .map(Time)
            .ok_or_else(|| Error::InvalidTime(format!("{s:?} is outside the representable range")))
    }

    pub fn to_datetime(self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }

    /// Add a duration: calendar months first (clamping the day to the end of the target month),
    /// then nanoseconds. Saturates at [`Time::MIN`]/[`Time::MAX`].
    pub fn add(self, d: Duration) -> Time {
        let mut t = self;
        if d.months != 0 {
            t = t.add_months(d.months);
        }
        t.add_nanos(d.nanos)
    }

    pub fn add_nanos(self, nanos: i64) -> Time {
        Time(self.0.saturating_add(nanos))
    }

    fn add_months(self, months: i64) -> Time {
        let saturated = if months > 0 { Time::MAX } else { Time::MIN };
        let Ok(magnitude) = u32::try_from(months.unsigned_abs()) else {
            return saturated;
        };
        let dt = self.to_datetime();
        let shifted = if months > 0 {
            dt.checked_add_months(Months::new(magnitude))
        } else {
            dt.checked_sub_months(Months::new(magnitude))
        };
        shifted
            .and_then(|dt| dt.timestamp_nanos_opt())
            .map(Time)
            .unwrap_or(saturated)
    }

    /// Absolute month number (`year * 12 + month0`); only differences are meaningful.
    pub fn month_index(self) -> i64 {
        let dt = self.to_datetime();
        i64::from(dt.year()) * 12 + i64::from(dt.month0())
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_datetime().to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl FromStr for Time {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Time::parse_rfc3339(s)
    }
}

/// A duration made of calendar months and nanoseconds.
///
/// Both components always carry the same sign. A duration is *mixed* when both are non-zero, in
/// which case adding it to a time applies the months first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Duration {
    months: i64,
    nanos: i64,
}

impl Duration {
    pub const ZERO: Duration = Duration { months: 0, nanos: 0 };
    /// Sentinel for an unbounded window interval.
    pub const INFINITE: Duration = Duration {
        months: 0,
        nanos: i64::MAX,
    };

    pub const fn from_nanos(nanos: i64) -> Self {
        Self { months: 0, nanos }
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self::from_nanos(secs.saturating_mul(NANOS_PER_SECOND))
    }

    pub const fn from_minutes(minutes: i64) -> Self {
        Self::from_nanos(minutes.saturating_mul(NANOS_PER_MINUTE))
    }

    pub const fn from_hours(hours: i64) -> Self {
        Self::from_nanos(hours.saturating_mul(NANOS_PER_HOUR))
    }

    pub const fn from_days(days: i64) -> Self {
        Self::from_nanos(days.saturating_mul(NANOS_PER_DAY))
    }

    pub const fn from_months(months: i64) -> Self {
        Self { months, nanos: 0 }
    }

    /// Build a mixed duration. Both parts must share a sign.
    pub fn try_from_parts(months: i64, nanos: i64) -> Result<Self> {
        if (months < 0 && nanos > 0) || (months > 0 && nanos < 0) {
            return Err(Error::InvalidDuration(
                "duration magnitudes must be the same sign".to_string(),
            ));
        }
        Ok(Self { months, nanos })
    }

    pub const fn months(self) -> i64 {
        self.months
    }

    pub const fn nanos(self) -> i64 {
        self.nanos
    }

    pub const fn is_zero(self) -> bool {
        self.months == 0 && self.nanos == 0
    }

    pub const fn is_negative(self) -> bool {
        self.months < 0 || self.nanos < 0
    }

    pub const fn is_positive(self) -> bool {
        !self.is_negative() && !self.is_zero()
    }

    pub const fn is_mixed(self) -> bool {
        self.months != 0 && self.nanos != 0
    }

    pub const fn is_months_only(self) -> bool {
        self.months != 0 && self.nanos == 0
    }

    pub const fn is_infinite(self) -> bool {
        self.months == 0 && self.nanos == i64::MAX
    }

    /// Scale both components; a negative scale flips the sign.
    pub fn mul(self, scale: i64) -> Self {
        Self {
            months: self.months.saturating_mul(scale),
            nanos: self.nanos.saturating_mul(scale),
        }
    }

    /// The smallest non-negative duration equivalent to `self` modulo `every`.
    ///
    /// Only applies when both durations are expressed in the same single unit; any other pair is
    /// returned unchanged.
    pub fn normalize(self, every: Duration) -> Self {
        if self.is_mixed() || every.is_mixed() || every.is_zero() || every.is_infinite() {
            return self;
        }
        if every.is_months_only() && self.nanos == 0 {
            return Self::from_months(self.months.rem_euclid(every.months));
        }
        if every.months == 0 && self.months == 0 {
            return Self::from_nanos(self.nanos.rem_euclid(every.nanos));
        }
        self
    }
}

impl Neg for Duration {
    type Output = Duration;

    fn neg(self) -> Duration {
        self.mul(-1)
    }
}

impl FromStr for Duration {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        if body.is_empty() {
            return Err(Error::InvalidDuration(format!("{s:?}: empty duration")));
        }

        let overflow = || Error::InvalidDuration(format!("{s:?}: duration out of range"));
        let mut months: i64 = 0;
        let mut nanos: i64 = 0;
        let mut rest = body;
        while !rest.is_empty() {
            let digits = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            if digits == 0 {
                return Err(Error::InvalidDuration(format!(
                    "{s:?}: expected a magnitude before {rest:?}"
                )));
            }
            let magnitude: i64 = rest[..digits].parse().map_err(|_| overflow())?;
            rest = &rest[digits..];

            let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
            let unit = &rest[..unit_len];
            rest = &rest[unit_len..];

            let (month_scale, nano_scale) = match unit {
                "y" => (12, 0),
                "mo" => (1, 0),
                "w" => (0, NANOS_PER_WEEK),
                "d" => (0, NANOS_PER_DAY),
                "h" => (0, NANOS_PER_HOUR),
                "m" => (0, NANOS_PER_MINUTE),
                "s" => (0, NANOS_PER_SECOND),
                "ms" => (0, NANOS_PER_MILLI),
                "us" | "µs" => (0, NANOS_PER_MICRO),
                "ns" => (0, 1),
                "" => {
                    return Err(Error::InvalidDuration(format!(
                        "{s:?}: missing unit after {magnitude}"
                    )))
                }
                other => {
                    return Err(Error::InvalidDuration(format!(
                        "{s:?}: unknown unit {other:?}"
                    )))
                }
            };
            months = magnitude
                .checked_mul(month_scale)
                .and_then(|m| months.checked_add(m))
                .ok_or_else(overflow)?;
            nanos = magnitude
                .checked_mul(nano_scale)
                .and_then(|n| nanos.checked_add(n))
                .ok_or_else(overflow)?;
        }

        let d = Duration { months, nanos };
        Ok(if negative { -d } else { d })
    }
}

impl TryFrom<String> for Duration {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Duration> for String {
    fn from(d: Duration) -> String {
        d.to_string()
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0s");
        }
        if self.is_negative() {
            f.write_str("-")?;
        }
        let months = self.months.unsigned_abs();
        let (years, months) = (months / 12, months % 12);
        if years > 0 {
            write!(f, "{years}y")?;
        }
        if months > 0 {
            write!(f, "{months}mo")?;
        }

        let mut nanos = self.nanos.unsigned_abs();
        for (unit, size) in [
            ("w", NANOS_PER_WEEK),
            ("d", NANOS_PER_DAY),
            ("h", NANOS_PER_HOUR),
            ("m", NANOS_PER_MINUTE),
            ("s", NANOS_PER_SECOND),
            ("ms", NANOS_PER_MILLI),
            ("us", NANOS_PER_MICRO),
            ("ns", 1),
        ] {
            let size = size.unsigned_abs();
            let count = nanos / size;
            if count > 0 {
                write!(f, "{count}{unit}")?;
                nanos %= size;
            }
        }
        Ok(())
    }
}
