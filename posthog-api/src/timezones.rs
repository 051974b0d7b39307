use std::collections::BTreeMap;

use chrono::{DateTime, Offset, TimeZone, Utc};
use chrono_tz::{Tz, TZ_VARIANTS};
use serde_json::Value;

pub fn is_valid_timezone(name: &str) -> bool {
    name.parse::<Tz>().is_ok()
}

/// Every recognized zone with its UTC offset in hours at `now`.
/// Whole hours are integers, the rest (e.g. India) floats.
pub fn available_timezones(now: DateTime<Utc>) -> BTreeMap<&'static str, Value> {
    TZ_VARIANTS
        .iter()
        .map(|tz| (tz.name(), offset_hours(tz, now)))
        .collect()
}

fn offset_hours(tz: &Tz, now: DateTime<Utc>) -> Value {
    let seconds = tz
        .offset_from_utc_datetime(&now.naive_utc())
        .fix()
        .local_minus_utc();
    if seconds % 3600 == 0 {
        Value::from(seconds / 3600)
    } else {
        Value::from(f64::from(seconds) / 3600.0)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_validates_iana_names() {
        assert!(is_valid_timezone("Europe/Moscow"));
        assert!(is_valid_timezone("UTC"));
        assert!(!is_valid_timezone("America/I_Dont_Exist"));
        assert!(!is_valid_timezone(""));
    }

    #[test]
    fn test_offsets_are_in_hours() {
        let timezones = available_timezones(Utc::now());

        assert_eq!(timezones["UTC"], json!(0));
        assert_eq!(timezones["Europe/Moscow"], json!(3));
        assert_eq!(timezones["Asia/Kolkata"], json!(5.5));
        assert!(timezones.len() > 400);
    }
}
