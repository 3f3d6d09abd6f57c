use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

/// Current UTC time as an RFC 3339 string.
pub fn now_iso8601() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Current UTC wall-clock time as `HH:MM:SS`, used to prefix job log lines.
pub fn clock_hms() -> String {
    format_hms(OffsetDateTime::now_utc())
}

fn format_hms(at: OffsetDateTime) -> String {
    at.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| "00:00:00".to_string())
}

/// Render one job log entry: `HH:MM:SS: <line>\n`.
pub fn stamp_log_line(line: &str) -> String {
    format!("{}: {}\n", clock_hms(), line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn format_hms_zero_pads() {
        assert_eq!(format_hms(datetime!(2026-01-02 03:04:05 UTC)), "03:04:05");
    }

    #[test]
    fn now_iso8601_is_parseable_rfc3339() {
        let now = now_iso8601();
        assert!(OffsetDateTime::parse(&now, &Rfc3339).is_ok(), "got {now}");
    }

    #[test]
    fn stamped_line_has_prefix_and_newline() {
        let line = stamp_log_line("Transferred: 1 / 1");
        assert!(line.ends_with(": Transferred: 1 / 1\n"));
        assert_eq!(line.as_bytes()[2], b':');
    }
}
