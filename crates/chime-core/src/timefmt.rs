use chrono::{NaiveDateTime, Timelike, Utc};

/// Current time as timezone-naive UTC, truncated to microseconds.
///
/// Every timestamp the engine stores or compares goes through this: the
/// offset is stripped after converting to UTC so persisted text orders
/// lexicographically in SQL, and precision matches the stored text so a
/// timer read back from the store equals its in-memory original.
pub fn utcnow() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(now.nanosecond() / 1_000 * 1_000)
        .unwrap_or(now)
}

/// Human-readable delta between two instants, largest unit first.
///
/// "5 seconds", "2 hours and 10 minutes", "3 days, 1 hour and 5 minutes".
/// Negative and sub-second deltas collapse to "0 seconds".
pub fn human_delta(earlier: NaiveDateTime, later: NaiveDateTime) -> String {
    let total = (later - earlier).num_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    let mut parts: Vec<String> = Vec::new();
    if days > 0 {
        parts.push(unit(days, "day"));
    }
    if hours > 0 {
        parts.push(unit(hours, "hour"));
    }
    if minutes > 0 {
        parts.push(unit(minutes, "minute"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(unit(seconds, "second"));
    }

    match parts.len() {
        1 => parts.remove(0),
        2 => format!("{} and {}", parts[0], parts[1]),
        _ => {
            let last = parts.pop().unwrap_or_default();
            format!("{} and {}", parts.join(", "), last)
        }
    }
}

fn unit(n: i64, name: &str) -> String {
    if n == 1 {
        format!("1 {name}")
    } else {
        format!("{n} {name}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn base() -> NaiveDateTime {
        utcnow()
    }

    #[test]
    fn utcnow_is_microsecond_granular() {
        use chrono::Timelike;
        let now = utcnow();
        assert_eq!(now.nanosecond() % 1_000, 0);
    }

    #[test]
    fn seconds_only() {
        let t = base();
        assert_eq!(human_delta(t, t + Duration::seconds(5)), "5 seconds");
        assert_eq!(human_delta(t, t + Duration::seconds(1)), "1 second");
    }

    #[test]
    fn zero_and_negative_collapse() {
        let t = base();
        assert_eq!(human_delta(t, t), "0 seconds");
        assert_eq!(human_delta(t, t - Duration::seconds(30)), "0 seconds");
    }

    #[test]
    fn two_units_joined_with_and() {
        let t = base();
        let later = t + Duration::hours(2) + Duration::minutes(10);
        assert_eq!(human_delta(t, later), "2 hours and 10 minutes");
    }

    #[test]
    fn three_units_comma_then_and() {
        let t = base();
        let later = t + Duration::days(3) + Duration::hours(1) + Duration::minutes(5);
        assert_eq!(human_delta(t, later), "3 days, 1 hour and 5 minutes");
    }

    #[test]
    fn middle_zero_units_are_skipped() {
        let t = base();
        let later = t + Duration::days(1) + Duration::seconds(12);
        assert_eq!(human_delta(t, later), "1 day and 12 seconds");
    }
}
