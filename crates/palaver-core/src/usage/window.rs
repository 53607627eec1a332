//! Reset window arithmetic.
//!
//! Windows are stepped deterministically from a fixed anchor: hourly, daily
//! and weekly windows are fixed durations, monthly windows step calendar
//! months (the anchor's day is clamped to the month's last day).

use chrono::{DateTime, Months, TimeDelta, Utc};

use palaver_types::usage::ResetPeriod;

/// The window that contains a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageWindow {
    /// Inclusive start; `None` means unbounded.
    pub start: Option<DateTime<Utc>>,
    /// Exclusive end, i.e. when usage resets. `None` means never.
    pub reset_date: Option<DateTime<Utc>>,
}

impl UsageWindow {
    pub const UNBOUNDED: UsageWindow = UsageWindow {
        start: None,
        reset_date: None,
    };

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| at >= start)
    }
}

/// The window of `period` containing `now`, anchored at `anchor`.
pub fn current_window(period: ResetPeriod, anchor: DateTime<Utc>, now: DateTime<Utc>) -> UsageWindow {
    match period {
        ResetPeriod::Hourly => fixed_window(TimeDelta::hours(1), anchor, now),
        ResetPeriod::Daily => fixed_window(TimeDelta::days(1), anchor, now),
        ResetPeriod::Weekly => fixed_window(TimeDelta::weeks(1), anchor, now),
        ResetPeriod::Monthly => monthly_window(anchor, now),
        ResetPeriod::Never => UsageWindow::UNBOUNDED,
    }
}

fn fixed_window(step: TimeDelta, anchor: DateTime<Utc>, now: DateTime<Utc>) -> UsageWindow {
    let step_secs = step.num_seconds();
    let steps = (now - anchor).num_seconds().div_euclid(step_secs);

    let Some(mut start) = TimeDelta::try_seconds(steps * step_secs)
        .and_then(|offset| anchor.checked_add_signed(offset))
    else {
        return UsageWindow::UNBOUNDED;
    };
    // Sub-second offsets before the anchor truncate toward zero.
    if start > now {
        start -= step;
    }
    UsageWindow {
        start: Some(start),
        reset_date: start.checked_add_signed(step),
    }
}

fn shift_months(anchor: DateTime<Utc>, months: i64) -> Option<DateTime<Utc>> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        anchor.checked_add_months(magnitude)
    } else {
        anchor.checked_sub_months(magnitude)
    }
}

fn monthly_window(anchor: DateTime<Utc>, now: DateTime<Utc>) -> UsageWindow {
    use chrono::Datelike;

    let mut months = i64::from(now.year() - anchor.year()) * 12
        + i64::from(now.month0())
        - i64::from(anchor.month0());

    let Some(mut start) = shift_months(anchor, months) else {
        return UsageWindow::UNBOUNDED;
    };
    if start > now {
        months -= 1;
        let Some(earlier) = shift_months(anchor, months) else {
            return UsageWindow::UNBOUNDED;
        };
        start = earlier;
    }
    UsageWindow {
        start: Some(start),
        reset_date: shift_months(anchor, months + 1),
    }
}
