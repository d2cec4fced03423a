//! # Temporal Values
//!
//! Dates, times, datetimes and durations have no native JSON/YAML scalar, so
//! they are stored as tagged strings: a `@kind:` marker followed by an
//! ISO-8601 payload.
//!
//! | Kind     | Encoding                          |
//! |----------|-----------------------------------|
//! | date     | `@date:2023-10-17`                |
//! | time     | `@time:03:55:17.000001`           |
//! | datetime | `@datetime:2023-10-17T01:04:36Z`  |
//! | duration | `@duration:P1DT3661S`             |
//!
//! Datetimes are always written in UTC. Plain strings starting with `@` are
//! escaped by doubling the `@`, so a decoded `@...` string is never ambiguous.
//!
//! Older files used JSON objects instead of tagged strings; those are still
//! understood by [`decode_legacy`].

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use thiserror::Error;

use super::value::{SettingValue, Settings};

/// Marker every tagged string starts with.
pub const TAG_MARKER: char = '@';

const DATE_TAG: &str = "@date:";
const TIME_TAG: &str = "@time:";
const DATETIME_TAG: &str = "@datetime:";
const DURATION_TAG: &str = "@duration:";

const SECONDS_PER_DAY: i64 = 86_400;

/// # Temporal
///
/// A date, time, datetime or duration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Temporal {
    /// A calendar date.
    Date(NaiveDate),
    /// A wall clock time.
    Time(NaiveTime),
    /// An instant, normalized to UTC.
    DateTime(DateTime<Utc>),
    /// A signed span of time.
    Duration(TimeDelta),
}

/// A tagged string whose payload could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind} payload '{payload}': {reason}")]
pub struct TemporalError {
    /// The kind named by the tag.
    pub kind: &'static str,
    /// The payload that failed to parse.
    pub payload: String,
    /// Why parsing failed.
    pub reason: String,
}

impl TemporalError {
    fn new(kind: &'static str, payload: &str, reason: impl fmt::Display) -> Self {
        Self {
            kind,
            payload: payload.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl Temporal {
    /// Builds a datetime value from any timezone, converting it to UTC.
    pub fn from_datetime<Tz: TimeZone>(datetime: DateTime<Tz>) -> Self {
        Temporal::DateTime(datetime.with_timezone(&Utc))
    }

    /// Name of the kind, as used in the tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Temporal::Date(_) => "date",
            Temporal::Time(_) => "time",
            Temporal::DateTime(_) => "datetime",
            Temporal::Duration(_) => "duration",
        }
    }

    /// The tagged string representation.
    pub fn encode(&self) -> String {
        match self {
            Temporal::Date(date) => format!("{}{}", DATE_TAG, date.format("%Y-%m-%d")),
            Temporal::Time(time) => format!("{}{}", TIME_TAG, time.format("%H:%M:%S%.f")),
            Temporal::DateTime(datetime) => format!(
                "{}{}Z",
                DATETIME_TAG,
                datetime.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f")
            ),
            Temporal::Duration(delta) => format!("{}{}", DURATION_TAG, encode_duration(delta)),
        }
    }

    /// Parses a tagged string.
    ///
    /// Returns `None` when `encoded` carries no known tag, otherwise the parse
    /// result of the payload.
    pub fn decode(encoded: &str) -> Option<Result<Temporal, TemporalError>> {
        if let Some(payload) = encoded.strip_prefix(DATE_TAG) {
            Some(parse_date(payload).map(Temporal::Date))
        } else if let Some(payload) = encoded.strip_prefix(TIME_TAG) {
            Some(parse_time(payload).map(Temporal::Time))
        } else if let Some(payload) = encoded.strip_prefix(DATETIME_TAG) {
            Some(parse_datetime(payload).map(Temporal::DateTime))
        } else {
            encoded
                .strip_prefix(DURATION_TAG)
                .map(|payload| decode_duration(payload).map(Temporal::Duration))
        }
    }
}

impl fmt::Display for Temporal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Temporal {
    type Err = TemporalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Temporal::decode(s).unwrap_or_else(|| Err(TemporalError::new("temporal", s, "missing type tag")))
    }
}

/// Escapes a plain string so it cannot be mistaken for a tagged value.
pub(crate) fn escape(text: &str) -> Cow<'_, str> {
    if text.starts_with(TAG_MARKER) {
        Cow::Owned(format!("{}{}", TAG_MARKER, text))
    } else {
        Cow::Borrowed(text)
    }
}

/// Turns a decoded string back into a setting value: unescapes `@@...`,
/// decodes tagged values and keeps everything else as a plain string.
pub(crate) fn decode_string(text: String) -> SettingValue {
    if text.starts_with("@@") {
        return SettingValue::String(text[1..].to_string());
    }
    if !text.starts_with(TAG_MARKER) {
        return SettingValue::String(text);
    }
    match Temporal::decode(&text) {
        Some(Ok(temporal)) => SettingValue::Temporal(temporal),
        Some(Err(e)) => {
            tracing::warn!("Keeping '{}' as plain string: {}", text, e);
            SettingValue::String(text)
        }
        None => SettingValue::String(text),
    }
}

/// # Decode Legacy
///
/// Recognizes the object encodings written by earlier versions:
///
/// - `{"__type__": "datetime" | "date" | "time", "__value__": "<iso>"}`
/// - `{"__type__": "timedelta", "days": d, "seconds": s, "microseconds": us}`
/// - `{"__datetime__": "<iso>"}`, `{"__date__": "<iso>"}`, `{"__time__": "<iso>"}`
///
/// Extra keys next to `__type__` are ignored. Returns `None` if `map` is not
/// one of them, or its payload does not parse.
pub fn decode_legacy(map: &Settings) -> Option<Temporal> {
    if map.len() == 1 {
        let (key, value) = map.iter().next()?;
        let kind = match key.as_str() {
            "__datetime__" => "datetime",
            "__date__" => "date",
            "__time__" => "time",
            _ => return None,
        };
        tracing::warn!("Serializing with '{}' keys is deprecated, re-save to upgrade", key);
        return parse_legacy_value(kind, value.as_str()?);
    }

    let kind = map.get("__type__")?.as_str()?;
    if kind == "timedelta" {
        let part = |key: &str| match map.get(key) {
            None => Some(0),
            Some(value) => value.as_i64(),
        };
        let delta = TimeDelta::try_days(part("days")?)?
            .checked_add(&TimeDelta::try_seconds(part("seconds")?)?)?
            .checked_add(&TimeDelta::microseconds(part("microseconds")?))?;
        tracing::warn!("Serializing timedelta as object is deprecated, re-save to upgrade");
        return Some(Temporal::Duration(delta));
    }

    // Keys besides `__type__` and `__value__` are ignored, as older readers did
    if !matches!(kind, "datetime" | "date" | "time") {
        return None;
    }
    let payload = map.get("__value__")?.as_str()?;
    tracing::warn!("Serializing {} as object is deprecated, re-save to upgrade", kind);
    parse_legacy_value(kind, payload)
}

fn parse_legacy_value(kind: &str, payload: &str) -> Option<Temporal> {
    let parsed = match kind {
        "datetime" => parse_datetime(payload).map(Temporal::DateTime),
        "date" => parse_date(payload).map(Temporal::Date),
        _ => parse_time(payload).map(Temporal::Time),
    };
    match parsed {
        Ok(temporal) => Some(temporal),
        Err(e) => {
            tracing::warn!("Ignoring legacy {} value: {}", kind, e);
            None
        }
    }
}

fn parse_date(payload: &str) -> Result<NaiveDate, TemporalError> {
    NaiveDate::from_str(payload).map_err(|e| TemporalError::new("date", payload, e))
}

fn parse_time(payload: &str) -> Result<NaiveTime, TemporalError> {
    NaiveTime::from_str(payload).map_err(|e| TemporalError::new("time", payload, e))
}

/// Accepts RFC 3339 with `Z` or an explicit offset (converted to UTC), or a
/// datetime without any offset, which is taken as UTC.
fn parse_datetime(payload: &str) -> Result<DateTime<Utc>, TemporalError> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(payload) {
        return Ok(datetime.with_timezone(&Utc));
    }
    NaiveDateTime::from_str(payload)
        .map(|naive| naive.and_utc())
        .map_err(|e| TemporalError::new("datetime", payload, e))
}

fn encode_fraction(nanos: u32) -> String {
    if nanos == 0 {
        String::new()
    } else if nanos % 1_000_000 == 0 {
        format!(".{:03}", nanos / 1_000_000)
    } else if nanos % 1_000 == 0 {
        format!(".{:06}", nanos / 1_000)
    } else {
        format!(".{:09}", nanos)
    }
}

/// `[-]P<days>DT<seconds>[.<fraction>]S`
fn encode_duration(delta: &TimeDelta) -> String {
    let sign = if *delta < TimeDelta::zero() { "-" } else { "" };
    let magnitude = delta.abs();
    let total_seconds = magnitude.num_seconds();
    let nanos = magnitude.subsec_nanos().unsigned_abs();
    format!(
        "{}P{}DT{}{}S",
        sign,
        total_seconds / SECONDS_PER_DAY,
        total_seconds % SECONDS_PER_DAY,
        encode_fraction(nanos)
    )
}

/// Splits `12D3H` into `[("12", 'D'), ("3", 'H')]`.
fn duration_components(part: &str) -> Result<Vec<(&str, char)>, String> {
    let mut components = Vec::new();
    let mut start = 0;
    for (index, c) in part.char_indices() {
        if c.is_ascii_alphabetic() {
            if index == start {
                return Err(format!("designator '{}' without a number", c));
            }
            components.push((&part[start..index], c));
            start = index + c.len_utf8();
        }
    }
    if start != part.len() {
        return Err(format!("trailing number '{}' without designator", &part[start..]));
    }
    Ok(components)
}

fn whole_number(number: &str) -> Result<i64, String> {
    number.parse::<i64>().map_err(|e| format!("'{}': {}", number, e))
}

fn seconds_with_fraction(number: &str) -> Result<TimeDelta, String> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if fraction.len() > 9 || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("invalid fractional seconds '{}'", number));
    }
    let seconds = TimeDelta::try_seconds(whole_number(whole)?).ok_or("seconds out of range")?;
    let nanos = if fraction.is_empty() {
        0
    } else {
        format!("{:0<9}", fraction).parse::<i64>().map_err(|e| e.to_string())?
    };
    seconds
        .checked_add(&TimeDelta::nanoseconds(nanos))
        .ok_or_else(|| "seconds out of range".to_string())
}

fn decode_duration(payload: &str) -> Result<TimeDelta, TemporalError> {
    parse_duration(payload).map_err(|reason| TemporalError::new("duration", payload, reason))
}

fn parse_duration(payload: &str) -> Result<TimeDelta, String> {
    let (negative, rest) = match payload.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, payload),
    };
    let rest = rest.strip_prefix('P').ok_or("missing 'P' designator")?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((date_part, time_part)) if time_part.is_empty() => {
            return Err(format!("empty time part after '{}T'", date_part));
        }
        Some((date_part, time_part)) => (date_part, Some(time_part)),
        None => (rest, None),
    };
    if date_part.is_empty() && time_part.is_none() {
        return Err("no components".to_string());
    }

    let overflow = || "duration out of range".to_string();
    let mut total = TimeDelta::zero();
    for (number, designator) in duration_components(date_part)? {
        let value = whole_number(number)?;
        let part = match designator {
            'W' => TimeDelta::try_weeks(value),
            'D' => TimeDelta::try_days(value),
            other => return Err(format!("unexpected designator '{}' in date part", other)),
        };
        total = total.checked_add(&part.ok_or_else(overflow)?).ok_or_else(overflow)?;
    }
    for (number, designator) in duration_components(time_part.unwrap_or(""))? {
        let part = match designator {
            'H' => TimeDelta::try_hours(whole_number(number)?).ok_or_else(overflow)?,
            'M' => TimeDelta::try_minutes(whole_number(number)?).ok_or_else(overflow)?,
            'S' => seconds_with_fraction(number)?,
            other => return Err(format!("unexpected designator '{}' in time part", other)),
        };
        total = total.checked_add(&part).ok_or_else(overflow)?;
    }

    if negative {
        TimeDelta::zero().checked_sub(&total).ok_or_else(overflow)
    } else {
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate};

    fn datetime(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn encodes_datetime_in_utc() {
        let value = Temporal::DateTime(datetime(2023, 10, 17, 1, 4, 36));
        assert_eq!(value.encode(), "@datetime:2023-10-17T01:04:36Z");
    }

    #[test]
    fn encodes_time_with_microseconds() {
        let value = Temporal::Time(NaiveTime::from_hms_micro_opt(3, 55, 17, 1).unwrap());
        assert_eq!(value.encode(), "@time:03:55:17.000001");
    }

    #[test]
    fn encodes_date_and_duration() {
        let date = Temporal::Date(NaiveDate::from_ymd_opt(2019, 4, 15).unwrap());
        assert_eq!(date.encode(), "@date:2019-04-15");

        let delta = TimeDelta::days(1) + TimeDelta::hours(1) + TimeDelta::seconds(1);
        assert_eq!(Temporal::Duration(delta).encode(), "@duration:P1DT3601S");

        let negative = -(TimeDelta::seconds(1) + TimeDelta::milliseconds(500));
        assert_eq!(Temporal::Duration(negative).encode(), "@duration:-P0DT1.500S");
    }

    #[test]
    fn datetime_from_other_timezone_normalizes_to_utc() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2019, 4, 15, 12, 0, 0).unwrap();
        let value = Temporal::from_datetime(local);

        assert_eq!(value.encode(), "@datetime:2019-04-15T10:00:00Z");
        assert_eq!(Temporal::decode(&value.encode()), Some(Ok(value)));
    }

    #[test]
    fn decodes_every_kind_back() {
        let values = [
            Temporal::Date(NaiveDate::from_ymd_opt(2023, 10, 17).unwrap()),
            Temporal::Time(NaiveTime::from_hms_nano_opt(23, 59, 59, 123_456_789).unwrap()),
            Temporal::DateTime(datetime(1999, 12, 31, 23, 59, 59) + TimeDelta::microseconds(42)),
            Temporal::Duration(TimeDelta::days(-3) + TimeDelta::nanoseconds(7)),
            Temporal::Duration(TimeDelta::zero()),
        ];
        for value in values {
            assert_eq!(Temporal::decode(&value.encode()), Some(Ok(value)), "{}", value);
        }
    }

    #[test]
    fn datetime_offset_and_naive_payloads_are_utc() {
        assert_eq!(
            Temporal::decode("@datetime:2019-04-15T12:00:00+02:00"),
            Some(Ok(Temporal::DateTime(datetime(2019, 4, 15, 10, 0, 0))))
        );
        assert_eq!(
            Temporal::decode("@datetime:2019-04-15T10:00:00"),
            Some(Ok(Temporal::DateTime(datetime(2019, 4, 15, 10, 0, 0))))
        );
    }

    #[test]
    fn duration_accepts_iso_components() {
        assert_eq!(
            Temporal::decode("@duration:P1W2DT3H4M5.25S"),
            Some(Ok(Temporal::Duration(
                TimeDelta::weeks(1)
                    + TimeDelta::days(2)
                    + TimeDelta::hours(3)
                    + TimeDelta::minutes(4)
                    + TimeDelta::milliseconds(5250)
            )))
        );
        assert_eq!(
            Temporal::decode("@duration:PT90M"),
            Some(Ok(Temporal::Duration(TimeDelta::minutes(90))))
        );
    }

    #[test]
    fn malformed_payloads_are_errors() {
        for encoded in [
            "@date:2023-13-45",
            "@time:25:00:00",
            "@datetime:yesterday",
            "@duration:1D",
            "@duration:P",
            "@duration:PT",
            "@duration:P1H",
            "@duration:PT1.5H",
            "@duration:PTS",
            "@duration:PT9223372036854775.999S",
            "@duration:-PT9223372036854775.999S",
            "@duration:P1DT9223372036854775S",
            "@duration:P99999999999999999W",
        ] {
            assert!(matches!(Temporal::decode(encoded), Some(Err(_))), "{}", encoded);
        }
    }

    #[test]
    fn untagged_strings_are_not_temporal() {
        assert_eq!(Temporal::decode("2023-10-17"), None);
        assert_eq!(Temporal::decode("@home"), None);
    }

    #[test]
    fn plain_strings_with_marker_are_escaped() {
        assert_eq!(escape("@home"), "@@home");
        assert_eq!(escape("home"), "home");
        assert_eq!(decode_string("@@home".to_string()), SettingValue::String("@home".to_string()));
        assert_eq!(
            decode_string("@@date:2020-01-01".to_string()),
            SettingValue::String("@date:2020-01-01".to_string())
        );
        assert_eq!(
            decode_string("@date:not-a-date".to_string()),
            SettingValue::String("@date:not-a-date".to_string())
        );
    }

    #[test]
    fn legacy_objects_decode() {
        let mut typed = Settings::new();
        typed.insert("__type__".to_string(), "datetime".into());
        typed.insert("__value__".to_string(), "2023-10-17T01:04:36Z".into());
        assert_eq!(decode_legacy(&typed), Some(Temporal::DateTime(datetime(2023, 10, 17, 1, 4, 36))));

        let mut oldest = Settings::new();
        oldest.insert("__datetime__".to_string(), "2023-10-17T01:04:36Z".into());
        assert_eq!(decode_legacy(&oldest), Some(Temporal::DateTime(datetime(2023, 10, 17, 1, 4, 36))));

        let mut time = Settings::new();
        time.insert("__time__".to_string(), "03:55:17.000001".into());
        assert_eq!(
            decode_legacy(&time),
            Some(Temporal::Time(NaiveTime::from_hms_micro_opt(3, 55, 17, 1).unwrap()))
        );

        let mut delta = Settings::new();
        delta.insert("__type__".to_string(), "timedelta".into());
        delta.insert("days".to_string(), 1i64.into());
        delta.insert("seconds".to_string(), 3601i64.into());
        delta.insert("microseconds".to_string(), 5i64.into());
        assert_eq!(
            decode_legacy(&delta),
            Some(Temporal::Duration(
                TimeDelta::days(1) + TimeDelta::seconds(3601) + TimeDelta::microseconds(5)
            ))
        );
    }

    #[test]
    fn legacy_objects_ignore_extra_keys() {
        let mut map = Settings::new();
        map.insert("__type__".to_string(), "date".into());
        map.insert("__value__".to_string(), "2020-01-01".into());
        map.insert("extra".to_string(), true.into());
        assert_eq!(
            decode_legacy(&map),
            Some(Temporal::Date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()))
        );
    }

    #[test]
    fn ordinary_objects_are_not_legacy() {
        let mut unknown_type = Settings::new();
        unknown_type.insert("__type__".to_string(), "decimal".into());
        unknown_type.insert("__value__".to_string(), "1.5".into());
        assert_eq!(decode_legacy(&unknown_type), None);

        let mut unrelated = Settings::new();
        unrelated.insert("name".to_string(), "x".into());
        assert_eq!(decode_legacy(&unrelated), None);
    }
}
