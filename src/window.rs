use chrono::{DateTime, Duration, NaiveTime, Utc};

use crate::zendesk::TicketMetric;

/// How far back the incremental snapshot reaches, in whole days before the
/// current UTC midnight.
pub const LOOKBACK_DAYS: i64 = 3;

/// Start of the current extraction window: `now` truncated to UTC midnight,
/// minus the lookback.
pub fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc() - Duration::days(LOOKBACK_DAYS)
}

/// Keeps the records updated at or after `window_start`, preserving input
/// order. Timestamps are compared in UTC regardless of the offset they were
/// reported with; an unparseable `updated_at` fails the whole snapshot.
pub fn filter_window(
    records: Vec<TicketMetric>,
    window_start: DateTime<Utc>,
) -> Result<Vec<TicketMetric>, TimestampError> {
    let mut kept = Vec::with_capacity(records.len());
    for record in records {
        let updated_at = DateTime::parse_from_rfc3339(&record.updated_at)
            .map_err(|source| TimestampError {
                ticket_id: record.ticket_id,
                raw: record.updated_at.clone(),
                source,
            })?
            .with_timezone(&Utc);
        if updated_at >= window_start {
            kept.push(record);
        }
    }
    Ok(kept)
}

#[derive(Debug, thiserror::Error)]
#[error("unparseable updated_at {raw:?} on ticket {ticket_id}")]
pub struct TimestampError {
    pub ticket_id: u64,
    pub raw: String,
    #[source]
    source: chrono::ParseError,
}
