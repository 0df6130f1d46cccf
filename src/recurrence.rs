//! Occurrence generation for recurrence rules.
//!
//! Shared by the projector (virtual transactions over a window) and by
//! realization (concrete transactions up to today). Monthly and yearly
//! occurrences clamp to the last day of short months, so a rule anchored
//! on the 31st fires on Feb 28/29.

use chrono::{Datelike as _, Days, Months, NaiveDate, Weekday};

use crate::error::ValidationError;
use crate::models::{Anchor, Frequency, RecurrenceEnd, RecurrenceRule};

impl RecurrenceRule {
    /// Checks the rule for structural errors.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Recurrence`] if the interval is zero, the
    /// anchor does not fit the frequency, or the end condition can never
    /// be satisfied.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.interval == 0 {
            return Err(ValidationError::Recurrence("interval must be at least 1"));
        }
        match (self.frequency, self.anchor) {
            (_, None)
            | (Frequency::Week, Some(Anchor::Weekday { .. }))
            | (Frequency::Month, Some(Anchor::LastDayOfMonth)) => {}
            (Frequency::Month, Some(Anchor::DayOfMonth { day })) => {
                if !(1..=31).contains(&day) {
                    return Err(ValidationError::Recurrence("day of month must be 1..=31"));
                }
            }
            (Frequency::Day | Frequency::Week | Frequency::Month | Frequency::Year, Some(_)) => {
                return Err(ValidationError::Recurrence(
                    "anchor does not match the frequency",
                ));
            }
        }
        match self.end {
            RecurrenceEnd::Never => Ok(()),
            RecurrenceEnd::On { date } if date < self.start_date => Err(
                ValidationError::Recurrence("end date is before the start date"),
            ),
            RecurrenceEnd::After { count: 0 } => Err(ValidationError::Recurrence(
                "occurrence count must be at least 1",
            )),
            RecurrenceEnd::On { .. } | RecurrenceEnd::After { .. } => Ok(()),
        }
    }

    /// Returns the occurrence dates in ascending order after validating
    /// the rule.
    ///
    /// The iterator is unbounded for [`RecurrenceEnd::Never`]; bound it
    /// with `take_while`.
    ///
    /// # Errors
    ///
    /// Returns the validation error of [`Self::validate`].
    #[inline]
    pub fn occurrences(&self) -> Result<Occurrences<'_>, ValidationError> {
        self.validate()?;
        Ok(self.occurrences_trusted())
    }

    /// Returns the occurrence dates without validating the rule.
    ///
    /// Used for rules that already passed Commit validation. A zero
    /// interval is treated as one and a mismatched anchor is ignored, so
    /// the iterator always terminates on its own end condition.
    #[inline]
    #[must_use]
    pub const fn occurrences_trusted(&self) -> Occurrences<'_> {
        Occurrences {
            rule: self,
            step: 0,
            emitted: 0,
            done: false,
        }
    }
}

/// Iterator over the dates of a [`RecurrenceRule`].
#[derive(Debug, Clone)]
pub struct Occurrences<'rule> {
    /// Rule being expanded.
    rule: &'rule RecurrenceRule,
    /// Index of the next candidate period.
    step: u32,
    /// Occurrences yielded so far.
    emitted: u32,
    /// Set once the end condition or date overflow is reached.
    done: bool,
}

impl Occurrences<'_> {
    /// Computes the candidate date for the `step`-th period.
    fn candidate(&self, step: u32) -> Option<NaiveDate> {
        let rule = self.rule;
        let periods = step.checked_mul(rule.interval.max(1))?;
        match rule.frequency {
            Frequency::Day => rule.start_date.checked_add_days(Days::new(u64::from(periods))),
            Frequency::Week => {
                let base = match rule.anchor {
                    Some(Anchor::Weekday { weekday }) => next_weekday(rule.start_date, weekday)?,
                    Some(Anchor::DayOfMonth { .. } | Anchor::LastDayOfMonth) | None => {
                        rule.start_date
                    }
                };
                base.checked_add_days(Days::new(u64::from(periods).checked_mul(7)?))
            }
            Frequency::Month => {
                let first = month_start(rule.start_date)?.checked_add_months(Months::new(periods))?;
                let day = match rule.anchor {
                    Some(Anchor::DayOfMonth { day }) => day,
                    Some(Anchor::LastDayOfMonth) => 31,
                    Some(Anchor::Weekday { .. }) | None => rule.start_date.day(),
                };
                clamp_to_month(first, day)
            }
            Frequency::Year => {
                let first = month_start(rule.start_date)?
                    .checked_add_months(Months::new(periods.checked_mul(12)?))?;
                clamp_to_month(first, rule.start_date.day())
            }
        }
    }
}

impl Iterator for Occurrences<'_> {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        while !self.done {
            if let RecurrenceEnd::After { count } = self.rule.end
                && self.emitted >= count
            {
                self.done = true;
                break;
            }
            let Some(date) = self.candidate(self.step) else {
                self.done = true;
                break;
            };
            self.step = self.step.saturating_add(1);
            // Anchored first periods can land before the start date.
            if date < self.rule.start_date {
                continue;
            }
            if let RecurrenceEnd::On { date: end } = self.rule.end
                && date > end
            {
                self.done = true;
                break;
            }
            self.emitted = self.emitted.saturating_add(1);
            return Some(date);
        }
        None
    }
}

/// Returns the first day of `date`'s month.
fn month_start(date: NaiveDate) -> Option<NaiveDate> {
    date.with_day(1)
}

/// Returns the date `day` in the month starting at `first`, clamped to
/// the month's last day.
fn clamp_to_month(first: NaiveDate, day: u32) -> Option<NaiveDate> {
    let last = first
        .checked_add_months(Months::new(1))?
        .pred_opt()?
        .day();
    first.with_day(day.min(last))
}

/// Returns the first date on or after `from` falling on `weekday`.
fn next_weekday(from: NaiveDate, weekday: Weekday) -> Option<NaiveDate> {
    let ahead = (weekday.num_days_from_monday() + 7 - from.weekday().num_days_from_monday()) % 7;
    from.checked_add_days(Days::new(u64::from(ahead)))
}
