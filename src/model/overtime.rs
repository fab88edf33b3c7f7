use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Scanner window in minutes after midnight: opens 20:30, closes 22:00.
const SCAN_OPENS_AT: u32 = 20 * 60 + 30;
const SCAN_CLOSES_AT: u32 = 22 * 60;
const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct OvertimeRecord {
    pub ot_id: u64,
    pub employee_id: u64,
    #[schema(value_type = String, format = "date")]
    pub work_date: NaiveDate,
    #[schema(value_type = Option<String>, example = "20:45:00")]
    pub start_time: Option<NaiveTime>,
    #[schema(value_type = Option<String>, example = "22:00:00")]
    pub end_time: Option<NaiveTime>,
    #[schema(value_type = Option<String>, example = "1.25")]
    pub hours: Option<Decimal>,
    pub reason: Option<String>,
    #[schema(example = "approved")]
    pub status: String,
    pub approved_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub approved_at: Option<NaiveDateTime>,
    pub rejected_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub rejected_at: Option<NaiveDateTime>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub approved_by_username: Option<String>,
    pub rejected_by_username: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OvertimeForm {
    /// defaults to the caller's linked employee
    pub employee_id: Option<u64>,
    #[schema(example = "2024-05-20")]
    pub work_date: Option<String>,
    #[schema(value_type = Option<f64>, example = 1.5)]
    pub hours: Option<Decimal>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OvertimeUpdate {
    pub employee_id: Option<u64>,
    #[schema(example = "2024-05-20")]
    pub work_date: Option<String>,
    #[schema(example = "20:30")]
    pub start_time: Option<String>,
    #[schema(example = "22:00")]
    pub end_time: Option<String>,
    #[schema(value_type = Option<f64>, example = 1.5)]
    pub hours: Option<Decimal>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ScanForm {
    pub employee_id: u64,
    /// defaults to today on the scanner's clock
    #[schema(example = "2024-05-20")]
    pub work_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Rejected(&'static str),
    TimeIn { time: NaiveTime },
    TimeOut { time: NaiveTime, hours: Option<Decimal> },
    Done,
}

fn minute_of_day(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

/// Hours between two clock times, wrapping past midnight, rounded to 2
/// decimals. `None` for a zero-length span.
pub fn overtime_hours(start: NaiveTime, end: NaiveTime) -> Option<Decimal> {
    let mut seconds = (end - start).num_seconds();
    if seconds < 0 {
        seconds += SECONDS_PER_DAY;
    }
    if seconds <= 0 {
        return None;
    }

    Some(
        (Decimal::from(seconds) / Decimal::from(3600))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
    )
}

/// What a scan at `now` does to an approved request with the given times.
/// Times are taken to the minute.
pub fn decide_scan(now: NaiveTime, start: Option<NaiveTime>, end: Option<NaiveTime>) -> ScanOutcome {
    let minute = minute_of_day(now);
    let now = NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap_or(now);

    if minute < SCAN_OPENS_AT {
        return ScanOutcome::Rejected("Overtime scan allowed only between 8:30 PM and 10:00 PM");
    }
    if minute > SCAN_CLOSES_AT {
        return ScanOutcome::Rejected("Scanner closed. Please contact HR or Admin to open again.");
    }

    let Some(start) = start else {
        return ScanOutcome::TimeIn { time: now };
    };

    if end.is_some() {
        return ScanOutcome::Done;
    }

    if minute < SCAN_CLOSES_AT {
        return ScanOutcome::Rejected("You are already time in. Time out is allowed at 10:00 PM.");
    }

    // only reachable at closing time, so hours are capped there
    ScanOutcome::TimeOut {
        time: now,
        hours: overtime_hours(start, now),
    }
}

/// Accepts `HH:MM` or `HH:MM:SS`.
pub fn parse_clock(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn scans_follow_the_evening_window() {
        assert!(matches!(decide_scan(at(20, 0), None, None), ScanOutcome::Rejected(m) if m.starts_with("Overtime scan allowed")));

        assert_eq!(decide_scan(at(21, 0), None, None), ScanOutcome::TimeIn { time: at(21, 0) });

        assert!(matches!(
            decide_scan(at(21, 30), Some(at(21, 0)), None),
            ScanOutcome::Rejected(m) if m.contains("Time out is allowed at 10:00 PM")
        ));

        assert_eq!(
            decide_scan(at(22, 0), Some(at(21, 0)), None),
            ScanOutcome::TimeOut { time: at(22, 0), hours: Some(dec!(1.00)) }
        );
    }

    #[test]
    fn scanner_closes_after_ten() {
        assert!(matches!(
            decide_scan(at(22, 1), Some(at(21, 0)), None),
            ScanOutcome::Rejected(m) if m.starts_with("Scanner closed")
        ));
    }

    #[test]
    fn seconds_are_ignored_and_completed_requests_are_done() {
        let late = NaiveTime::from_hms_opt(22, 0, 45).unwrap();
        assert_eq!(
            decide_scan(late, Some(at(20, 40)), None),
            ScanOutcome::TimeOut { time: at(22, 0), hours: Some(dec!(1.33)) }
        );
        assert_eq!(decide_scan(at(21, 15), Some(at(20, 40)), Some(at(22, 0))), ScanOutcome::Done);
    }

    #[test]
    fn hours_wrap_past_midnight() {
        assert_eq!(overtime_hours(at(22, 0), at(1, 30)), Some(dec!(3.50)));
        assert_eq!(overtime_hours(at(21, 0), at(21, 0)), None);
    }

    #[test]
    fn clock_accepts_both_forms() {
        assert_eq!(parse_clock("20:30"), Some(at(20, 30)));
        assert_eq!(parse_clock(" 22:00:00 "), Some(at(22, 0)));
        assert_eq!(parse_clock("8pm"), None);
    }
}
