use chrono::{DateTime, Utc};

/// Return the current UTC timestamp in ISO 8601 format.
pub fn utc_now() -> String {
    rfc3339(Utc::now())
}

/// Format a timestamp the way generated-section comments carry it.
pub fn rfc3339(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Compact stamp used in backup file names, e.g. "20261016-101500".
pub fn backup_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d-%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_utc_now_format() {
        let ts = utc_now();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), 20);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], "T");
    }

    #[test]
    fn test_backup_stamp() {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 10, 15, 0).unwrap();
        assert_eq!(backup_stamp(at), "20261016-101500");
        assert_eq!(rfc3339(at), "2026-10-16T10:15:00Z");
    }
}
