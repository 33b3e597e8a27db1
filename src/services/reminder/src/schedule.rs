//! Next-fire-time calculation
//!
//! Pure wall-clock arithmetic for reminder scheduling. All functions take the
//! current instant as an argument so behavior is deterministic and testable.
//! Timezones are fixed numeric offsets from UTC (fractional hours allowed);
//! there is no DST handling at this layer.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc};
use kinesia_shared::User;

use crate::error::{ReminderError, Result};

/// Largest offset chrono's `FixedOffset` accepts, in seconds
const MAX_OFFSET_SECONDS: i32 = 86_399;

/// Build a fixed timezone from an offset in hours east of UTC
pub fn fixed_offset(timezone_offset_hours: f64) -> FixedOffset {
    let seconds = (timezone_offset_hours * 3600.0).round() as i32;
    let seconds = seconds.clamp(-MAX_OFFSET_SECONDS, MAX_OFFSET_SECONDS);
    FixedOffset::east_opt(seconds).unwrap_or_else(|| Utc.fix())
}

/// Compute the next instant at which a daily reminder at `hour:minute`
/// local time should fire.
///
/// The candidate is today at `hour:minute:00.000` in the user's local time;
/// if that has already passed (or is exactly now), the result is the same
/// wall-clock time on the next calendar day. Hour and minute are validated
/// at the API boundary.
pub fn next_fire_time(
    hour: u8,
    minute: u8,
    timezone_offset_hours: f64,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let tz = fixed_offset(timezone_offset_hours);
    let local_now = now.with_timezone(&tz).naive_local();
    let target = wall_clock(hour, minute);

    let mut candidate = local_now.date().and_time(target);
    if candidate <= local_now {
        candidate = next_day(candidate.date()).and_time(target);
    }

    local_to_utc(candidate, tz)
}

/// Compute a one-time target for today at `hour:minute` local time.
///
/// When the target has already passed, `force_today` keeps today's (past)
/// instant so the next scan picks it up; otherwise the target rolls to the
/// same wall-clock time tomorrow.
pub fn one_time_target(
    hour: u8,
    minute: u8,
    timezone_offset_hours: f64,
    force_today: bool,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    if force_today {
        let tz = fixed_offset(timezone_offset_hours);
        let local_now = now.with_timezone(&tz).naive_local();
        local_to_utc(local_now.date().and_time(wall_clock(hour, minute)), tz)
    } else {
        next_fire_time(hour, minute, timezone_offset_hours, now)
    }
}

/// Resolve the instant a user's next reminder should fire, or `None` when
/// nothing should be scheduled.
///
/// A pinned manual override that is still in the future wins verbatim over
/// recomputation. Otherwise the user's daily preferences drive the result;
/// users without enabled daily preferences get `None`.
pub fn effective_target(user: &User, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if user.next_notification_time_manual_override {
        if let Some(pinned) = user.next_notification_time {
            if pinned > now {
                return Some(pinned);
            }
        }
    }

    if !user.wants_daily_reminder() {
        return None;
    }

    let prefs = user.notification_preferences.as_ref()?;
    Some(next_fire_time(
        prefs.hour,
        prefs.minute,
        prefs.timezone_offset,
        now,
    ))
}

/// Parse a `"HH:MM"` wall-clock string into hour and minute
pub fn parse_wall_clock(value: &str) -> Result<(u8, u8)> {
    let (hour_part, minute_part) = value.split_once(':').ok_or_else(|| {
        ReminderError::validation("notification_time", "expected HH:MM format")
    })?;

    let hour: u8 = hour_part
        .trim()
        .parse()
        .map_err(|_| ReminderError::validation("notification_time", "hour is not a number"))?;
    let minute: u8 = minute_part
        .trim()
        .parse()
        .map_err(|_| ReminderError::validation("notification_time", "minute is not a number"))?;

    if hour > 23 {
        return Err(ReminderError::validation(
            "notification_time",
            "hour must be 0-23",
        ));
    }
    if minute > 59 {
        return Err(ReminderError::validation(
            "notification_time",
            "minute must be 0-59",
        ));
    }

    Ok((hour, minute))
}

fn wall_clock(hour: u8, minute: u8) -> NaiveTime {
    NaiveTime::from_hms_opt(u32::from(hour.min(23)), u32::from(minute.min(59)), 0)
        .unwrap_or(NaiveTime::MIN)
}

fn next_day(date: NaiveDate) -> NaiveDate {
    date.succ_opt().unwrap_or(date)
}

fn local_to_utc(local: NaiveDateTime, tz: FixedOffset) -> DateTime<Utc> {
    let utc_naive = local - Duration::seconds(i64::from(tz.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc_naive, Utc)
}
