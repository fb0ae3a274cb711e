// Display-time formatting shared by event publishers.

use chrono::{DateTime, Utc};

/// Human-readable timestamp rendered next to each message,
/// e.g. `"Nov 14, 2023 10:13 PM"`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%b %d, %Y %I:%M %p").to_string()
}

/// Milliseconds since the Unix epoch, the wire timestamp unit.
pub fn epoch_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_display_timestamp() {
        let at = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();
        assert_eq!(format_timestamp(at), "Nov 14, 2023 10:13 PM");
    }

    #[test]
    fn formats_morning_with_zero_padded_hour() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 9, 5, 0).unwrap();
        assert_eq!(format_timestamp(at), "Jan 02, 2024 09:05 AM");
    }

    #[test]
    fn epoch_millis_matches_chrono() {
        let at = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();
        assert_eq!(epoch_millis(at), at.timestamp_millis());
        assert_eq!(epoch_millis(at) % 1000, 0);
    }
}
