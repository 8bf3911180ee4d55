//! timeslot.rs
//!
//! Временные интервалы бронирования.
//!
//! - `TimeOfDay` - время суток `HH:MM` (минуты от полуночи).
//! - `TimeRange` - полуоткрытый интервал `[start, end)`; соседние интервалы
//!   (`09:00-10:00` и `10:00-11:00`) не пересекаются.
//! - `Timeslot` - непустой набор непересекающихся интервалов одной брони,
//!   на проводе `{"timeslot": [["HH:MM","HH:MM"], ...]}`.
//! - `TimeslotEncoding` - то, что реально лежит в базе: либо старый тег
//!   (`morning`/`afternoon`/`evening`), либо список интервалов.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeslotError {
    #[error("timeslot must contain at least one time range")]
    Empty,
    #[error("invalid time '{0}', expected HH:MM")]
    BadTime(String),
    #[error("invalid time range {start}-{end}: start must be before end")]
    EmptyRange { start: TimeOfDay, end: TimeOfDay },
    #[error("time ranges {0} and {1} overlap")]
    OverlappingRanges(TimeRange, TimeRange),
    #[error("unknown timeslot '{0}'")]
    UnknownTag(String),
    #[error("malformed timeslot: {0}")]
    Malformed(String),
}

/// Время суток в минутах от полуночи, `00:00..=23:59`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self(hour * 60 + minute))
        } else {
            None
        }
    }

    pub fn minutes(self) -> u16 {
        self.0
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeslotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || TimeslotError::BadTime(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(bad)?;
        // "9:30" допускаем, "09:3" и "09:300" - нет
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(bad());
        }
        if !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        let hour: u16 = h.parse().map_err(|_| bad())?;
        let minute: u16 = m.parse().map_err(|_| bad())?;
        Self::from_hm(hour, minute).ok_or_else(bad)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Полуоткрытый интервал `[start, end)`, `start < end` гарантируется конструктором.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeRange {
    start: TimeOfDay,
    end: TimeOfDay,
}

impl TimeRange {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Result<Self, TimeslotError> {
        if start >= end {
            return Err(TimeslotError::EmptyRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, TimeslotError> {
        Self::new(start.parse()?, end.parse()?)
    }

    pub fn start(&self) -> TimeOfDay {
        self.start
    }

    pub fn end(&self) -> TimeOfDay {
        self.end
    }

    /// Строгие неравенства с обеих сторон: стык интервалов не конфликт.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && self.end > other.start
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// `HH:MM-HH:MM`, формат переменных окружения и фильтров в URL.
impl FromStr for TimeRange {
    type Err = TimeslotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| TimeslotError::Malformed(format!("expected HH:MM-HH:MM, got '{s}'")))?;
        Self::parse(start, end)
    }
}

impl Serialize for TimeRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.start, self.end).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TimeRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (start, end) = <(TimeOfDay, TimeOfDay)>::deserialize(deserializer)?;
        TimeRange::new(start, end).map_err(de::Error::custom)
    }
}

/// Набор интервалов одной брони: непустой, отсортирован, без пересечений.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeslot {
    ranges: Vec<TimeRange>,
}

impl Timeslot {
    pub fn new(mut ranges: Vec<TimeRange>) -> Result<Self, TimeslotError> {
        if ranges.is_empty() {
            return Err(TimeslotError::Empty);
        }
        ranges.sort();
        for pair in ranges.windows(2) {
            if let [a, b] = pair {
                if a.overlaps(b) {
                    return Err(TimeslotError::OverlappingRanges(*a, *b));
                }
            }
        }
        Ok(Self { ranges })
    }

    pub fn single(range: TimeRange) -> Self {
        Self { ranges: vec![range] }
    }

    pub fn ranges(&self) -> &[TimeRange] {
        &self.ranges
    }

    /// Первая пара пересекающихся интервалов `(наш, чужой)`, если есть.
    pub fn first_overlap(&self, other: &Timeslot) -> Option<(TimeRange, TimeRange)> {
        self.ranges.iter().find_map(|mine| {
            other
                .ranges
                .iter()
                .find(|theirs| mine.overlaps(theirs))
                .map(|theirs| (*mine, *theirs))
        })
    }

    pub fn overlaps(&self, other: &Timeslot) -> bool {
        self.first_overlap(other).is_some()
    }
}

impl fmt::Display for Timeslot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{range}")?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct WireTimeslot<'a> {
    timeslot: &'a [TimeRange],
}

impl Serialize for Timeslot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireTimeslot { timeslot: &self.ranges }.serialize(serializer)
    }
}

/// Канонические границы старых тегов.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacySlots {
    pub morning: TimeRange,
    pub afternoon: TimeRange,
    pub evening: TimeRange,
}

impl Default for LegacySlots {
    fn default() -> Self {
        let range = |s: u16, e: u16| TimeRange {
            start: TimeOfDay(s * 60),
            end: TimeOfDay(e * 60),
        };
        Self {
            morning: range(8, 12),
            afternoon: range(12, 17),
            evening: range(17, 21),
        }
    }
}

impl LegacySlots {
    pub fn lookup(&self, tag: &str) -> Option<TimeRange> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "morning" => Some(self.morning),
            "afternoon" => Some(self.afternoon),
            "evening" => Some(self.evening),
            _ => None,
        }
    }
}

/// Форма, в которой timeslot хранится в строке `bookings`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeslotEncoding {
    LegacyTag(String),
    RangeList(Vec<TimeRange>),
    /// Хранимое значение, которое не удалось разобрать; отдаётся клиенту как есть.
    Unrecognized(Value),
}

impl TimeslotEncoding {
    /// Разбирает любое из исторических представлений:
    /// `{"timeslot": [[s,e],...]}`, тот же объект строкой JSON, голый массив пар,
    /// строку `HH:MM-HH:MM` или тег.
    pub fn decode(value: &Value) -> Result<Self, TimeslotError> {
        match value {
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.starts_with('{') || trimmed.starts_with('[') {
                    let inner: Value = serde_json::from_str(trimmed)
                        .map_err(|e| TimeslotError::Malformed(e.to_string()))?;
                    return Self::decode_structured(&inner);
                }
                if trimmed.contains(':') {
                    return Ok(Self::RangeList(vec![trimmed.parse()?]));
                }
                if trimmed.is_empty() {
                    return Err(TimeslotError::Empty);
                }
                Ok(Self::LegacyTag(trimmed.to_string()))
            }
            other => Self::decode_structured(other),
        }
    }

    fn decode_structured(value: &Value) -> Result<Self, TimeslotError> {
        let list = match value {
            Value::Object(map) => map
                .get("timeslot")
                .ok_or_else(|| TimeslotError::Malformed("missing 'timeslot' key".to_string()))?,
            other => other,
        };
        let ranges: Vec<TimeRange> = serde_json::from_value(list.clone()).map_err(|e| {
            // ошибки валидации интервала приходят строкой из serde, достаём исходную
            match list.as_array().and_then(|a| first_invalid_range(a)) {
                Some(err) => err,
                None => TimeslotError::Malformed(e.to_string()),
            }
        })?;
        Ok(Self::RangeList(ranges))
    }

    /// Приводит к набору интервалов; тег разворачивается по `slots`.
    pub fn resolve(&self, slots: &LegacySlots) -> Result<Timeslot, TimeslotError> {
        match self {
            Self::LegacyTag(tag) => slots
                .lookup(tag)
                .map(Timeslot::single)
                .ok_or_else(|| TimeslotError::UnknownTag(tag.clone())),
            Self::RangeList(ranges) => Timeslot::new(ranges.clone()),
            Self::Unrecognized(raw) => Err(TimeslotError::Malformed(raw.to_string())),
        }
    }
}

impl From<Timeslot> for TimeslotEncoding {
    fn from(timeslot: Timeslot) -> Self {
        Self::RangeList(timeslot.ranges)
    }
}

impl Serialize for TimeslotEncoding {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::LegacyTag(tag) => serializer.serialize_str(tag),
            Self::RangeList(ranges) => WireTimeslot { timeslot: ranges }.serialize(serializer),
            Self::Unrecognized(raw) => raw.serialize(serializer),
        }
    }
}

fn first_invalid_range(items: &[Value]) -> Option<TimeslotError> {
    items.iter().find_map(|item| {
        let pair = item.as_array()?;
        let (Some(start), Some(end)) = (pair.first()?.as_str(), pair.get(1)?.as_str()) else {
            return None;
        };
        TimeRange::parse(start, end).err()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn r(s: &str, e: &str) -> TimeRange {
        TimeRange::parse(s, e).unwrap()
    }

    #[test]
    fn parses_wall_clock_times() {
        assert_eq!("09:05".parse::<TimeOfDay>().unwrap().minutes(), 545);
        assert_eq!("9:05".parse::<TimeOfDay>().unwrap().minutes(), 545);
        assert_eq!("23:59".parse::<TimeOfDay>().unwrap().to_string(), "23:59");
        for bad in ["24:00", "12:60", "1200", "ab:cd", "12:5", "", "-1:00", "12:000"] {
            assert!(bad.parse::<TimeOfDay>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn range_requires_start_before_end() {
        assert!(matches!(
            TimeRange::parse("10:00", "09:00"),
            Err(TimeslotError::EmptyRange { .. })
        ));
        assert!(TimeRange::parse("10:00", "10:00").is_err());
    }

    #[test]
    fn abutting_ranges_do_not_overlap() {
        assert!(!r("09:00", "10:00").overlaps(&r("10:00", "11:00")));
        assert!(!r("10:00", "11:00").overlaps(&r("09:00", "10:00")));
    }

    #[test]
    fn one_minute_of_overlap_conflicts() {
        assert!(r("09:00", "10:01").overlaps(&r("10:00", "11:00")));
    }

    #[test]
    fn nested_range_conflicts() {
        assert!(r("09:00", "11:00").overlaps(&r("09:30", "09:45")));
        assert!(r("09:30", "09:45").overlaps(&r("09:00", "11:00")));
    }

    #[test]
    fn timeslot_rejects_empty_and_self_overlapping_sets() {
        assert_eq!(Timeslot::new(vec![]), Err(TimeslotError::Empty));
        assert!(matches!(
            Timeslot::new(vec![r("09:00", "10:00"), r("09:30", "11:00")]),
            Err(TimeslotError::OverlappingRanges(..))
        ));
        let ok = Timeslot::new(vec![r("13:00", "14:00"), r("09:00", "10:00")]).unwrap();
        assert_eq!(ok.ranges()[0], r("09:00", "10:00"));
    }

    #[test]
    fn first_overlap_reports_the_clashing_pair() {
        let mine = Timeslot::new(vec![r("08:00", "09:00"), r("12:00", "13:00")]).unwrap();
        let theirs = Timeslot::single(r("12:30", "14:00"));
        assert_eq!(
            mine.first_overlap(&theirs),
            Some((r("12:00", "13:00"), r("12:30", "14:00")))
        );
    }

    #[test]
    fn serializes_wire_format() {
        let slot = Timeslot::new(vec![r("09:00", "10:00"), r("14:00", "15:30")]).unwrap();
        assert_eq!(
            serde_json::to_value(&slot).unwrap(),
            json!({"timeslot": [["09:00", "10:00"], ["14:00", "15:30"]]})
        );
    }

    #[test]
    fn decodes_structured_object() {
        let v = json!({"timeslot": [["09:00", "10:00"]]});
        assert_eq!(
            TimeslotEncoding::decode(&v).unwrap(),
            TimeslotEncoding::RangeList(vec![r("09:00", "10:00")])
        );
    }

    #[test]
    fn decodes_json_string_encoding() {
        let v = Value::String(r#"{"timeslot":[["09:00","10:00"],["11:00","12:00"]]}"#.into());
        assert_eq!(
            TimeslotEncoding::decode(&v).unwrap(),
            TimeslotEncoding::RangeList(vec![r("09:00", "10:00"), r("11:00", "12:00")])
        );
    }

    #[test]
    fn decodes_bare_array_and_range_string() {
        assert_eq!(
            TimeslotEncoding::decode(&json!([["09:00", "10:00"]])).unwrap(),
            TimeslotEncoding::RangeList(vec![r("09:00", "10:00")])
        );
        assert_eq!(
            TimeslotEncoding::decode(&json!("09:00-10:00")).unwrap(),
            TimeslotEncoding::RangeList(vec![r("09:00", "10:00")])
        );
    }

    #[test]
    fn decodes_legacy_tag() {
        assert_eq!(
            TimeslotEncoding::decode(&json!("morning")).unwrap(),
            TimeslotEncoding::LegacyTag("morning".into())
        );
    }

    #[test]
    fn decode_reports_inverted_range() {
        let err = TimeslotEncoding::decode(&json!({"timeslot": [["10:00", "09:00"]]})).unwrap_err();
        assert!(matches!(err, TimeslotError::EmptyRange { .. }), "{err:?}");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(TimeslotEncoding::decode(&json!(42)).is_err());
        assert!(TimeslotEncoding::decode(&json!({"slots": []})).is_err());
        assert!(TimeslotEncoding::decode(&json!([["09:00"]])).is_err());
        assert!(TimeslotEncoding::decode(&json!("")).is_err());
    }

    #[test]
    fn legacy_tags_resolve_through_configured_mapping() {
        let slots = LegacySlots::default();
        let morning = TimeslotEncoding::LegacyTag("Morning".into()).resolve(&slots).unwrap();
        assert_eq!(morning.ranges(), &[r("08:00", "12:00")]);
        assert_eq!(
            TimeslotEncoding::LegacyTag("night".into()).resolve(&slots),
            Err(TimeslotError::UnknownTag("night".into()))
        );
    }

    #[test]
    fn empty_range_list_does_not_resolve() {
        let slots = LegacySlots::default();
        assert_eq!(
            TimeslotEncoding::RangeList(vec![]).resolve(&slots),
            Err(TimeslotError::Empty)
        );
    }

    #[test]
    fn encoding_serializes_back_to_stored_shape() {
        assert_eq!(
            serde_json::to_value(TimeslotEncoding::LegacyTag("evening".into())).unwrap(),
            json!("evening")
        );
        assert_eq!(
            serde_json::to_value(TimeslotEncoding::RangeList(vec![r("09:00", "10:00")])).unwrap(),
            json!({"timeslot": [["09:00", "10:00"]]})
        );
    }

    fn arb_range() -> impl Strategy<Value = TimeRange> {
        (0u16..1439).prop_flat_map(|s| (Just(s), (s + 1)..1440)).prop_map(|(s, e)| {
            TimeRange::new(TimeOfDay(s), TimeOfDay(e)).unwrap()
        })
    }

    proptest! {
        #[test]
        fn overlap_is_symmetric(a in arb_range(), b in arb_range()) {
            prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
        }

        #[test]
        fn range_overlaps_itself(a in arb_range()) {
            prop_assert!(a.overlaps(&a));
        }

        #[test]
        fn split_halves_abut_without_overlap(a in arb_range()) {
            prop_assume!(a.end().minutes() - a.start().minutes() >= 2);
            let mid = TimeOfDay((a.start().minutes() + a.end().minutes()) / 2);
            let left = TimeRange::new(a.start(), mid).unwrap();
            let right = TimeRange::new(mid, a.end()).unwrap();
            prop_assert!(!left.overlaps(&right));
            prop_assert!(left.overlaps(&a) && right.overlaps(&a));
        }
    }
}
