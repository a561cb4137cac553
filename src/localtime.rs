//! Wall-clock helpers. Every calendar date in the planner is a date on the
//! user's local clock; instants are stored in UTC and converted here.

use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone,
    Timelike, Utc,
};

use crate::error::{Result, ScheduleError};

/// Instant at which the wall clock of `tz` shows `time` on `date`.
///
/// Ambiguous times (clocks turned back) resolve to the earlier instant.
/// Times inside a spring-forward gap move forward in 15 minute steps until
/// they exist.
pub fn resolve<Tz: TimeZone>(tz: &Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let wanted = date.and_time(time);
    let mut naive = wanted;
    for _ in 0..16 {
        match tz.from_local_datetime(&naive) {
            LocalResult::Single(t) => return t.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => naive += Duration::minutes(15),
        }
    }
    Utc.from_utc_datetime(&wanted)
}

/// Local midnight at the start of `date`.
pub fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    resolve(tz, date, NaiveTime::MIN)
}

pub fn local_naive<Tz: TimeZone>(tz: &Tz, instant: DateTime<Utc>) -> NaiveDateTime {
    instant.with_timezone(tz).naive_local()
}

/// Calendar date of `instant` on the local clock, never the UTC date.
pub fn local_date<Tz: TimeZone>(tz: &Tz, instant: DateTime<Utc>) -> NaiveDate {
    local_naive(tz, instant).date()
}

/// Parses `YYYY-MM-DD HH:MM` (a `T` separator also works) as wall-clock time
/// in `tz`. A bare date means the last minute of that day.
pub fn parse_local_datetime<Tz: TimeZone>(tz: &Tz, s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(resolve(tz, naive.date(), naive.time()));
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
        ScheduleError::InvalidInput(format!("invalid date/time '{}', use YYYY-MM-DD [HH:MM]", s))
    })?;
    let last_minute = NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN);
    Ok(resolve(tz, date, last_minute))
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| ScheduleError::InvalidInput(format!("invalid date '{}': {}. Use YYYY-MM-DD.", s, e)))
}

/// Rounds `instant` up to the next multiple of `step_minutes` on the local
/// clock. Instants already on a boundary are returned unchanged.
pub fn round_up<Tz: TimeZone>(tz: &Tz, instant: DateTime<Utc>, step_minutes: u32) -> DateTime<Utc> {
    let step = i64::from(step_minutes.max(1)) * 60;
    let offset = i64::from(instant.with_timezone(tz).offset().fix().local_minus_utc());
    let secs = instant.timestamp();
    let rem = (secs + offset).rem_euclid(step);
    if rem == 0 && instant.timestamp_subsec_nanos() == 0 {
        return instant;
    }
    Utc.timestamp_opt(secs - rem + step, 0)
        .single()
        .unwrap_or(instant)
}

/// The local hours during which tasks may start: `[start_hour, end_hour)`.
/// Everything else is the sleep window. A window with `start_hour >
/// end_hour` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl DayWindow {
    pub fn is_awake(&self, hour: u32) -> bool {
        if self.start_hour < self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }

    /// First instant after `instant` at which the window opens.
    pub fn next_opening<Tz: TimeZone>(&self, tz: &Tz, instant: DateTime<Utc>) -> DateTime<Utc> {
        let local = local_naive(tz, instant);
        let date = if local.hour() < self.start_hour {
            local.date()
        } else {
            local.date().succ_opt().unwrap_or(local.date())
        };
        let opening = NaiveTime::from_hms_opt(self.start_hour, 0, 0).unwrap_or(NaiveTime::MIN);
        resolve(tz, date, opening)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;
    use chrono_tz::Asia::Tokyo;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn date(y: i32, mo: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn resolve_skips_spring_forward_gap() {
        // 2026-03-08 02:30 does not exist in New York.
        let t = resolve(&New_York, date(2026, 3, 8), time(2, 30));
        assert_eq!(t, utc(2026, 3, 8, 7, 0));
    }

    #[test]
    fn resolve_picks_earlier_of_repeated_hour() {
        let t = resolve(&New_York, date(2026, 11, 1), time(1, 30));
        assert_eq!(t, utc(2026, 11, 1, 5, 30));
    }

    #[test]
    fn local_date_uses_zone_not_utc() {
        // 20:00 UTC on the 18th is already the 19th in Tokyo.
        assert_eq!(local_date(&Tokyo, utc(2026, 10, 18, 20, 0)), date(2026, 10, 19));
        assert_eq!(local_date(&New_York, utc(2026, 10, 19, 2, 0)), date(2026, 10, 18));
    }

    #[test]
    fn round_up_to_local_half_hour() {
        assert_eq!(round_up(&Utc, utc(2026, 10, 19, 8, 0), 30), utc(2026, 10, 19, 8, 0));
        assert_eq!(round_up(&Utc, utc(2026, 10, 19, 8, 1), 30), utc(2026, 10, 19, 8, 30));
        assert_eq!(round_up(&Utc, utc(2026, 10, 19, 8, 45), 30), utc(2026, 10, 19, 9, 0));

        let kathmandu = chrono_tz::Asia::Kathmandu;
        // 08:10 UTC is 13:55 local; the next local half hour is 14:00.
        assert_eq!(round_up(&kathmandu, utc(2026, 10, 19, 8, 10), 30), utc(2026, 10, 19, 8, 15));
    }

    #[test]
    fn parses_local_date_times() {
        let t = parse_local_datetime(&Tokyo, "2026-10-19 09:30").unwrap();
        assert_eq!(t, utc(2026, 10, 19, 0, 30));
        let t = parse_local_datetime(&Utc, "2026-10-19").unwrap();
        assert_eq!(t, utc(2026, 10, 19, 23, 59));
        assert!(parse_local_datetime(&Utc, "19/10/2026").is_err());
    }

    #[test]
    fn day_window_opens_same_or_next_day() {
        let w = DayWindow { start_hour: 7, end_hour: 23 };
        assert!(w.is_awake(7));
        assert!(w.is_awake(22));
        assert!(!w.is_awake(23));
        assert!(!w.is_awake(3));

        assert_eq!(w.next_opening(&Utc, utc(2026, 10, 19, 2, 0)), utc(2026, 10, 19, 7, 0));
        assert_eq!(w.next_opening(&Utc, utc(2026, 10, 19, 23, 30)), utc(2026, 10, 20, 7, 0));
    }
}
