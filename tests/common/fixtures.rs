use chrono::{Duration, SecondsFormat, Utc};
use serde_json::json;

/// A listing entry shaped like the ticket-metrics API returns it, with a few
/// pass-through fields so round-trip assertions have something to lose.
pub fn metric_json(ticket_id: u64, updated_at: &str) -> serde_json::Value {
    json!({
        "ticket_id": ticket_id,
        "updated_at": updated_at,
        "reopens": 1,
        "replies": 2,
        "reply_time_in_minutes": { "calendar": 45, "business": 30 },
    })
}

/// RFC 3339 timestamp `days` days before now; inside the extraction window
/// for small values, outside it for anything past the lookback.
pub fn days_ago(days: i64) -> String {
    (Utc::now() - Duration::days(days)).to_rfc3339_opts(SecondsFormat::Secs, true)
}
