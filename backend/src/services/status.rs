use chrono::{Duration, NaiveDateTime};

/// Decide whether a controller is reachable from its last-seen timestamp.
///
/// A sample landing exactly on the threshold boundary counts as offline;
/// a controller that has never been seen is offline.
pub fn is_online(
    last_seen: Option<NaiveDateTime>,
    now: NaiveDateTime,
    threshold: Duration,
) -> bool {
    match last_seen {
        Some(seen) => now - seen < threshold,
        None => false,
    }
}

/// Null-skipping max over a set of possibly-absent timestamps.
///
/// Absent values are excluded from the reduction rather than treated as
/// zero; if every input is absent the result is absent.
pub fn latest_of<I>(timestamps: I) -> Option<NaiveDateTime>
where
    I: IntoIterator<Item = Option<NaiveDateTime>>,
{
    timestamps.into_iter().flatten().max()
}

/// Parse a timestamp reported by a controller, accepting RFC 3339 with an
/// offset or a bare naive form. Controllers in the field send both.
pub fn parse_reported_timestamp(s: &str) -> Option<NaiveDateTime> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.naive_utc())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").ok())
}
