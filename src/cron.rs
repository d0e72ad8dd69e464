//! 5-field cron expression parsing and next-fire computation.
//! Field model mirrors the explicit per-component struct shape used by
//! other manifests in the retrieval pack, generalized here to cron's
//! literal/list/range/step syntax; the forward-scan evaluation algorithm is
//! hand-built to spec (no reference implementation of cron evaluation
//! exists in the corpus, only job models).

use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Timelike, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CronError {
    #[error("cron expression must have exactly 5 fields, got {0}")]
    WrongFieldCount(usize),
    #[error("invalid field {field}: {value}")]
    InvalidField { field: &'static str, value: String },
    #[error("value {value} out of range [{min}, {max}] for field {field}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

/// One field's accepted values, represented as a sorted, deduplicated list.
/// Cron fields are small enough (max 60 entries) that a `Vec<u32>` plus
/// linear "next matching value" scan is simpler and fast enough compared to
/// a bitset.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    values: Vec<u32>,
}

impl Field {
    fn parse(raw: &str, field: &'static str, min: u32, max: u32) -> Result<Self, CronError> {
        let mut values = std::collections::BTreeSet::new();
        for part in raw.split(',') {
            Self::parse_part(part, field, min, max, &mut values)?;
        }
        if values.is_empty() {
            return Err(CronError::InvalidField {
                field,
                value: raw.to_string(),
            });
        }
        Ok(Field {
            values: values.into_iter().collect(),
        })
    }

    fn parse_part(
        part: &str,
        field: &'static str,
        min: u32,
        max: u32,
        out: &mut std::collections::BTreeSet<u32>,
    ) -> Result<(), CronError> {
        let (range_part, step) = match part.split_once('/') {
            Some((r, s)) => {
                let step: u32 = s.parse().map_err(|_| CronError::InvalidField {
                    field,
                    value: part.to_string(),
                })?;
                (r, step)
            }
            None => (part, 1),
        };

        let (lo, hi) = if range_part == "*" {
            (min, max)
        } else if let Some((a, b)) = range_part.split_once('-') {
            let a: u32 = a.parse().map_err(|_| CronError::InvalidField {
                field,
                value: part.to_string(),
            })?;
            let b: u32 = b.parse().map_err(|_| CronError::InvalidField {
                field,
                value: part.to_string(),
            })?;
            (a, b)
        } else {
            let v: u32 = range_part.parse().map_err(|_| CronError::InvalidField {
                field,
                value: part.to_string(),
            })?;
            (v, v)
        };

        if lo < min || hi > max || lo > hi {
            return Err(CronError::OutOfRange {
                field,
                value: lo,
                min,
                max,
            });
        }

        let mut v = lo;
        while v <= hi {
            out.insert(v);
            v += step;
        }
        Ok(())
    }

    fn contains(&self, v: u32) -> bool {
        self.values.binary_search(&v).is_ok()
    }

    /// Smallest value in this field that is `>= from`, wrapping to the first
    /// value otherwise. Returns whether a wrap occurred.
    fn next_at_or_after(&self, from: u32) -> (u32, bool) {
        match self.values.iter().find(|&&v| v >= from) {
            Some(&v) => (v, false),
            None => (self.values[0], true),
        }
    }
}

/// A parsed 5-field cron expression: minute, hour, day-of-month, month,
/// day-of-week. Day-of-month and day-of-week are OR'd when both are
/// restricted (standard cron semantics).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    minute: Field,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronExpression {
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::WrongFieldCount(fields.len()));
        }
        Ok(CronExpression {
            minute: Field::parse(fields[0], "minute", 0, 59)?,
            hour: Field::parse(fields[1], "hour", 0, 23)?,
            day_of_month: Field::parse(fields[2], "day_of_month", 1, 31)?,
            month: Field::parse(fields[3], "month", 1, 12)?,
            day_of_week: Field::parse(fields[4], "day_of_week", 0, 6)?,
            dom_restricted: fields[2] != "*",
            dow_restricted: fields[4] != "*",
        })
    }

    fn day_matches(&self, date: DateTime<Utc>) -> bool {
        let dom_ok = self.day_of_month.contains(date.day());
        // chrono: Sunday = 0 in cron convention; `weekday().num_days_from_sunday()`.
        let dow_ok = self.day_of_week.contains(date.weekday().num_days_from_sunday());
        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom_ok || dow_ok,
            (true, false) => dom_ok,
            (false, true) => dow_ok,
            (false, false) => true,
        }
    }

    /// The smallest instant strictly greater than `t` that matches, floored
    /// to the minute boundary. Scans forward minute by minute with a
    /// fast-forward when the month or day doesn't match, so a search never
    /// iterates more than ~4 years of minutes in the worst case (Feb 29
    /// expressions). Never returns a value `<= t`.
    pub fn next_after(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let mut candidate = t
            .with_second(0)
            .and_then(|d| d.with_nanosecond(0))
            .unwrap_or(t)
            + ChronoDuration::minutes(1);

        // Bound the scan: cron expressions always recur within 8 years.
        let give_up_after = candidate + ChronoDuration::days(366 * 8);

        loop {
            if candidate > give_up_after {
                unreachable!("cron expression matches no representable date");
            }

            if !self.month.contains(candidate.month()) {
                candidate = next_month_start(candidate);
                continue;
            }
            if !self.day_matches(candidate) {
                candidate = next_day_start(candidate);
                continue;
            }
            if !self.hour.contains(candidate.hour()) {
                candidate = next_hour_start(candidate);
                continue;
            }
            if !self.minute.contains(candidate.minute()) {
                let (next_minute, wrapped) = self.minute.next_at_or_after(candidate.minute());
                if wrapped {
                    candidate = next_hour_start(candidate);
                } else {
                    candidate = candidate.with_minute(next_minute).unwrap();
                }
                continue;
            }
            return candidate;
        }
    }
}

fn next_hour_start(t: DateTime<Utc>) -> DateTime<Utc> {
    (t + ChronoDuration::hours(1))
        .with_minute(0)
        .and_then(|d| d.with_second(0))
        .unwrap()
}

fn next_day_start(t: DateTime<Utc>) -> DateTime<Utc> {
    (t + ChronoDuration::days(1))
        .with_hour(0)
        .and_then(|d| d.with_minute(0))
        .and_then(|d| d.with_second(0))
        .unwrap()
}

fn next_month_start(t: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap()
}
