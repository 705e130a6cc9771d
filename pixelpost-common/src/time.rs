use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{SecondsFormat, TimeZone, Utc, offset::LocalResult};

/// Seconds since the unix epoch.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

/// Render epoch seconds as an RFC 3339 UTC string, or `None` for zero or out of range values.
#[must_use]
pub fn rfc3339(epoch_secs: u64) -> Option<String> {
    if epoch_secs == 0 {
        return None;
    }

    match Utc.timestamp_opt(i64::try_from(epoch_secs).ok()?, 0) {
        LocalResult::Single(dt) => Some(dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_epoch_seconds() {
        assert_eq!(rfc3339(1_700_000_000).as_deref(), Some("2023-11-14T22:13:20Z"));
    }

    #[test]
    fn zero_means_never() {
        assert_eq!(rfc3339(0), None);
    }

    #[test]
    fn now_is_after_2020() {
        assert!(unix_now() > 1_577_836_800);
    }
}
