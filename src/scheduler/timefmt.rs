//! Human-readable relative times for job summaries and logs.

const MINUTE: i64 = 60;
const HOUR: i64 = 3600;
const DAY: i64 = 86_400;

/// Whole units of `unit` in `secs`, plus one when the remainder is at least
/// half a unit.
fn rounded(secs: i64, unit: i64) -> i64 {
    secs / unit + i64::from(secs % unit >= unit / 2)
}

pub fn plural(count: i64, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Time until something happens, in the largest whole unit.
///
/// Two days or more are truncated to whole days. Between one and two days the
/// value is pushed past the two-day mark so it reads as "2 days" rather than
/// rounding once to hours and again to days. Negative input reads as zero.
pub fn next_run_in(secs: i64) -> String {
    let mut diff = secs.max(0);
    if diff >= 2 * DAY {
        return format!("{} days", diff / DAY);
    }
    if diff > DAY {
        diff += DAY;
    }
    let days = rounded(diff, DAY);
    let hours = rounded(diff, HOUR);
    let minutes = rounded(diff, MINUTE);
    if days > 1 {
        format!("{days} days")
    } else if hours > 1 {
        format!("{hours} hours")
    } else if minutes > 1 {
        format!("{minutes} minutes")
    } else if diff == 1 {
        "1 second".to_owned()
    } else {
        format!("{diff} seconds")
    }
}

/// Time since something happened.
pub fn ago(secs: i64) -> String {
    let diff = secs.max(0);
    let days = rounded(diff, DAY);
    let hours = rounded(diff, HOUR);
    let minutes = rounded(diff, MINUTE);
    if days > 1 {
        format!("{days} days ago")
    } else if hours > 1 {
        format!("{hours} hours ago")
    } else if minutes > 1 {
        format!("{minutes} minutes ago")
    } else if diff > 1 {
        format!("{diff} seconds ago")
    } else {
        "just now".to_owned()
    }
}

/// Coarse description of a delay in minutes for log lines.
pub fn describe_minutes(minutes: i64) -> String {
    let minutes = minutes.max(1);
    if minutes <= 120 {
        return plural(minutes, "minute");
    }
    let hours = minutes / 60;
    if hours <= 48 {
        plural(hours, "hour")
    } else {
        plural(hours / 24, "day")
    }
}
