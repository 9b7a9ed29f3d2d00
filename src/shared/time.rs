use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Current time at microsecond precision, the finest precision every
/// supported database keeps. Values written and read back compare equal.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Stable textual form used in audit hashes.
pub fn to_canonical(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_has_microsecond_precision() {
        let ts = now_utc();
        assert_eq!(ts.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn canonical_form_is_utc_with_micros() {
        let ts = DateTime::parse_from_rfc3339("2026-05-01T12:30:00.5+02:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(to_canonical(&ts), "2026-05-01T10:30:00.500000Z");
    }
}
