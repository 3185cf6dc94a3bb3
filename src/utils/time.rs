use chrono::Utc;

pub fn current_timestamp_seconds() -> i64 {
    Utc::now().timestamp()
}
