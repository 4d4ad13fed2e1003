use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Wall-clock distance from `now` to `target`, clamped at zero for instants
/// already in the past.
pub fn delay_until(target: DateTime<Utc>, now: DateTime<Utc>) -> std::time::Duration {
    (target - now).to_std().unwrap_or(std::time::Duration::ZERO)
}

/// Midnight UTC of the day containing `at`.
pub fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Half-open window `[start, end)` covering the whole UTC calendar day that
/// lies `days_back` days before `now`.
pub fn day_window(now: DateTime<Utc>, days_back: u32) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = start_of_day(now - Duration::days(i64::from(days_back)));
    (start, start + Duration::days(1))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn delay_is_zero_for_past_targets() {
        let now = Utc::now();
        assert_eq!(delay_until(now - Duration::hours(1), now), std::time::Duration::ZERO);
        assert_eq!(
            delay_until(now + Duration::seconds(90), now),
            std::time::Duration::from_secs(90)
        );
    }

    #[test]
    fn day_window_spans_one_calendar_day() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 15, 42, 7).unwrap();
        let (start, end) = day_window(now, 7);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 3, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap());
    }

    #[test]
    fn day_window_crosses_month_boundary() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 1).unwrap();
        let (start, _) = day_window(now, 7);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 2, 23, 0, 0, 0).unwrap());
    }
}
