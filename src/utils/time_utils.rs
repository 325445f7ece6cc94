use {
    chrono::{DateTime, NaiveDate, NaiveDateTime, Utc},
    serde_json::Value,
};

pub const MS_IN_S: i64 = 1000;
pub const MS_IN_MIN: i64 = MS_IN_S * 60;
pub const MS_IN_H: i64 = MS_IN_MIN * 60;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Lenient timestamp reading for backend date columns.
///
/// Accepts RFC 3339 strings, SQL-style `YYYY-MM-DD HH:MM:SS[.fff]` (read as UTC),
/// bare dates, and epoch milliseconds as a number or numeric string.
/// Anything else is `None`.
pub fn parse_timestamp_ms(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => parse_timestamp_str(s.trim()),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<i64> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis());
    }
    s.parse::<i64>().ok()
}

pub fn epoch_ms_to_utc(epoch_ms: i64) -> String {
    DateTime::from_timestamp_millis(epoch_ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Short human duration: `850ms`, `42s`, `3m 20s`, `1h 05m`.
pub fn format_duration(ms: i64) -> String {
    if ms < MS_IN_S {
        return format!("{}ms", ms.max(0));
    }
    let secs = ms / MS_IN_S;
    if ms < MS_IN_MIN {
        return format!("{}s", secs);
    }
    let mins = ms / MS_IN_MIN;
    if ms < MS_IN_H {
        return format!("{}m {}s", mins, secs % 60);
    }
    format!("{}h {:02}m", ms / MS_IN_H, mins % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_backend_timestamp_shapes() {
        let rfc = parse_timestamp_ms(&json!("2025-04-01T08:00:00Z"));
        let sql = parse_timestamp_ms(&json!("2025-04-01 08:00:00"));
        let sql_frac = parse_timestamp_ms(&json!("2025-04-01 08:00:00.250"));
        assert_eq!(rfc, Some(1_743_494_400_000));
        assert_eq!(sql, rfc);
        assert_eq!(sql_frac, Some(1_743_494_400_250));
        assert_eq!(parse_timestamp_ms(&json!(1_743_494_400_000i64)), rfc);
        assert_eq!(parse_timestamp_ms(&json!("2025-04-01")), Some(1_743_465_600_000));
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_timestamp_ms(&json!("yesterday")), None);
        assert_eq!(parse_timestamp_ms(&json!("")), None);
        assert_eq!(parse_timestamp_ms(&json!(true)), None);
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(850), "850ms");
        assert_eq!(format_duration(42_000), "42s");
        assert_eq!(format_duration(200_000), "3m 20s");
        assert_eq!(format_duration(3_900_000), "1h 05m");
    }
}
