use chrono::{DateTime, Local, NaiveDate, Offset, TimeZone, Utc};

/// Key format for the stored "last seen" calendar date.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date_key(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Minutes to add to local time to get UTC. Matches the sign convention browsers use, so
/// UTC-5 yields `300` and UTC+2 yields `-120`.
pub fn timezone_offset_minutes<Tz: TimeZone>(moment: &DateTime<Tz>) -> i32 {
    -moment.offset().fix().local_minus_utc() / 60
}

pub fn local_timezone_offset_minutes(moment: DateTime<Utc>) -> i32 {
    timezone_offset_minutes(&moment.with_timezone(&Local))
}

/// Human readable duration: `42 s`, `3m 5s`, `2h 0m 7s`.
pub fn format_seconds(seconds: u64) -> String {
    let mins = seconds / 60;
    let secs = seconds % 60;
    if seconds < 60 {
        format!("{secs} s")
    } else if mins < 60 {
        format!("{mins}m {secs}s")
    } else {
        format!("{}h {}m {secs}s", mins / 60, mins % 60)
    }
}
