use std::time::{SystemTime, UNIX_EPOCH};

/// Length of one subscription month. Months are a flat 30 days, not calendar months
pub const MONTH_MILLIS: i64 = 30 * 24 * 60 * 60 * 1000;

pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// `now + months * 30 days`, or None if the result does not fit
pub fn add_months(now_millis: i64, months: u32) -> Option<i64> {
    i64::from(months)
        .checked_mul(MONTH_MILLIS)
        .and_then(|span| now_millis.checked_add(span))
}
