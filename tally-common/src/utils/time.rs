use chrono::{DateTime, Utc};

/// Returns the current UTC instant.
///
/// Used to stamp operations, votes and order mutations.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Nanoseconds since the UNIX epoch, saturating at zero for clocks set before it.
pub fn unix_nanos(at: &DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or_else(|| at.timestamp_micros() * 1_000).max(0)
}
