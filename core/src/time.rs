use prost_types::Timestamp;

/// Current wall-clock time as a protobuf timestamp.
pub fn now_timestamp() -> Timestamp {
    let now = chrono::Utc::now();
    Timestamp {
        seconds: now.timestamp(),
        nanos: now.timestamp_subsec_nanos() as i32,
    }
}

/// Ordering helper: `a >= b` on (seconds, nanos).
pub fn timestamp_ge(a: &Timestamp, b: &Timestamp) -> bool {
    (a.seconds, a.nanos) >= (b.seconds, b.nanos)
}
