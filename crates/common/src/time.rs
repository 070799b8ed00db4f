use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Convert a transport timestamp (seconds) to milliseconds, falling back to
/// the local clock when the transport did not supply one.
pub fn transport_ts_to_ms(seconds: Option<i64>) -> i64 {
    match seconds {
        Some(s) if s > 0 => s.saturating_mul(1000),
        _ => now_ms(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_are_scaled() {
        assert_eq!(transport_ts_to_ms(Some(1_700_000_000)), 1_700_000_000_000);
    }

    #[test]
    fn missing_timestamp_uses_clock() {
        let before = now_ms();
        let ts = transport_ts_to_ms(None);
        assert!(ts >= before);
        assert!(transport_ts_to_ms(Some(0)) >= before);
    }
}
