use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{trace, warn};

use crate::datetime::{self, LEGACY_DUE_TIME, timestamp_serde};

const UNPARSED_SUFFIX: &str = "_unparsed";

const KNOWN_KEYS: [&str; 7] = [
    "text",
    "done",
    "priority",
    "due_dt",
    "due",
    "created_at",
    "done_at",
];

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(Self::Low),
            1 => Some(Self::Normal),
            2 => Some(Self::High),
            _ => None,
        }
    }

    pub fn value(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::High => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }

    /// One-character marker shown in the list view.
    pub fn marker(self) -> &'static str {
        match self {
            Self::Low => "↓",
            Self::Normal => "=",
            Self::High => "↑",
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.value()
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::from_raw(i64::from(raw)).ok_or_else(|| format!("priority out of range: {raw}"))
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "low" | "l" => Ok(Self::Low),
            "1" | "normal" | "n" | "m" => Ok(Self::Normal),
            "2" | "high" | "h" => Ok(Self::High),
            other => Err(anyhow!("expected priority 0|1|2|low|normal|high, got: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub text: String,

    #[serde(default)]
    pub done: bool,

    #[serde(default)]
    pub priority: Priority,

    /// Kept verbatim so a value that no longer parses is not lost on save.
    #[serde(default)]
    pub due_dt: Option<String>,

    #[serde(with = "timestamp_serde")]
    pub created_at: NaiveDateTime,

    #[serde(default, with = "timestamp_serde::option")]
    pub done_at: Option<NaiveDateTime>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Item {
    pub fn new(
        text: impl Into<String>,
        priority: Priority,
        due: Option<NaiveDateTime>,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            text: text.into(),
            done: false,
            priority,
            due_dt: due.map(datetime::format_due),
            created_at: now,
            done_at: None,
            extra: BTreeMap::new(),
        }
    }

    /// The deadline, or `None` when absent or unparsable.
    pub fn due(&self) -> Option<NaiveDateTime> {
        self.due_dt
            .as_deref()
            .and_then(|raw| datetime::parse_due(raw).ok())
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due().map(|dt| dt.date())
    }

    pub fn set_due(&mut self, due: Option<NaiveDateTime>) {
        self.due_dt = due.map(datetime::format_due);
    }

    pub fn set_done(&mut self, done: bool, now: NaiveDateTime) {
        self.done = done;
        self.done_at = if done { Some(now) } else { None };
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.done && self.due_date().map(|date| date < today).unwrap_or(false)
    }
}

/// Upgrades any decoded JSON value into a well-formed [`Item`].
///
/// Never fails: missing or malformed fields fall back to defaults, the
/// date-only `due` field of the old schema becomes `due_dt` at
/// [`LEGACY_DUE_TIME`], and anything that is not an object becomes an item
/// whose text is the value itself. Running it again on its own output is a
/// no-op.
#[tracing::instrument(skip(raw, now))]
pub fn migrate(raw: &Value, now: NaiveDateTime) -> Item {
    let Value::Object(map) = raw else {
        trace!("coercing non-object item");
        return Item::new(scalar_text(raw), Priority::default(), None, now);
    };

    let text = match map.get("text") {
        Some(value) => scalar_text(value),
        None => String::new(),
    };

    let done = map.get("done").and_then(Value::as_bool).unwrap_or(false);

    let priority = map
        .get("priority")
        .and_then(raw_priority)
        .and_then(Priority::from_raw)
        .unwrap_or_default();

    let due_dt = if map.contains_key("due_dt") {
        map.get("due_dt")
            .and_then(Value::as_str)
            .map(str::to_string)
    } else {
        legacy_due(map)
    };

    let mut extra: BTreeMap<String, Value> = map
        .iter()
        .filter(|(key, _)| !KNOWN_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let created_at = timestamp_field(map, "created_at", now, &mut extra);
    let done_at = done.then(|| timestamp_field(map, "done_at", now, &mut extra));

    Item {
        text,
        done,
        priority,
        due_dt,
        created_at,
        done_at,
        extra,
    }
}

/// Reads a stamp field, falling back to `now`. A value that is present but
/// unreadable is kept under `<key>_unparsed` so saving does not lose it.
fn timestamp_field(
    map: &Map<String, Value>,
    key: &str,
    now: NaiveDateTime,
    extra: &mut BTreeMap<String, Value>,
) -> NaiveDateTime {
    let Some(value) = map.get(key) else {
        return now;
    };
    if let Some(parsed) = value.as_str().and_then(datetime::parse_timestamp) {
        return parsed;
    }
    if !value.is_null() {
        warn!(field = key, %value, "unparsable timestamp; using now");
        extra
            .entry(format!("{key}{UNPARSED_SUFFIX}"))
            .or_insert_with(|| value.clone());
    }
    now
}

fn legacy_due(map: &Map<String, Value>) -> Option<String> {
    let due = map.get("due").and_then(Value::as_str)?.trim();
    if due.is_empty() {
        return None;
    }
    trace!(due, "upgrading legacy date-only deadline");
    Some(format!("{due} {LEGACY_DUE_TIME}"))
}

fn raw_priority(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .expect("valid datetime")
    }

    #[test]
    fn legacy_date_becomes_end_of_day_deadline() {
        let now = at(2024, 6, 1, 8, 0);
        let item = migrate(&json!({"text": "pay rent", "due": "2024-05-01"}), now);

        assert_eq!(item.due_dt.as_deref(), Some("2024-05-01 23:59"));
        assert_eq!(item.due(), Some(at(2024, 5, 1, 23, 59)));

        let encoded = serde_json::to_value(&item).expect("encode");
        assert!(encoded.get("due").is_none());
        assert_eq!(encoded["due_dt"], json!("2024-05-01 23:59"));
    }

    #[test]
    fn new_field_wins_over_legacy_field() {
        let now = at(2024, 6, 1, 8, 0);
        let item = migrate(
            &json!({"text": "x", "due_dt": null, "due": "2024-05-01"}),
            now,
        );
        assert_eq!(item.due_dt, None);
        assert!(!item.extra.contains_key("due"));
    }

    #[test]
    fn non_object_values_become_minimal_items() {
        let now = at(2024, 6, 1, 8, 0);

        let from_string = migrate(&json!("buy bread"), now);
        assert_eq!(from_string.text, "buy bread");
        assert!(!from_string.done);
        assert_eq!(from_string.priority, Priority::Normal);
        assert_eq!(from_string.due_dt, None);
        assert_eq!(from_string.created_at, now);
        assert_eq!(from_string.done_at, None);

        assert_eq!(migrate(&json!(42), now).text, "42");
        assert_eq!(migrate(&Value::Null, now).text, "");
    }

    #[test]
    fn malformed_fields_fall_back_to_defaults() {
        let now = at(2024, 6, 1, 8, 0);
        let item = migrate(
            &json!({
                "text": "odd",
                "done": "yes",
                "priority": 7,
                "due_dt": 12,
                "created_at": "last tuesday",
                "done_at": "2024-01-01T00:00:00"
            }),
            now,
        );

        assert!(!item.done);
        assert_eq!(item.priority, Priority::Normal);
        assert_eq!(item.due_dt, None);
        assert_eq!(item.created_at, now);
        assert_eq!(item.done_at, None);
        assert_eq!(item.extra.get("created_at_unparsed"), Some(&json!("last tuesday")));
        assert!(!item.extra.contains_key("done_at_unparsed"));
    }

    #[test]
    fn stamps_keep_sub_seconds_offsets_and_dates() {
        let now = at(2024, 6, 13, 12, 0);
        let item = migrate(
            &json!({
                "text": "t",
                "done": true,
                "created_at": "2024-06-01T08:30:00.250",
                "done_at": "2024-06-02T10:00:00+07:00"
            }),
            now,
        );
        assert_eq!(
            item.created_at,
            at(2024, 6, 1, 8, 30) + chrono::Duration::milliseconds(250)
        );
        assert_eq!(item.done_at, Some(at(2024, 6, 2, 10, 0)));

        let encoded = serde_json::to_value(&item).expect("encode");
        assert_eq!(encoded["created_at"], json!("2024-06-01T08:30:00.250"));
        assert_eq!(encoded["done_at"], json!("2024-06-02T10:00:00"));

        let dated = migrate(&json!({"text": "t", "created_at": "2024-06-01"}), now);
        assert_eq!(dated.created_at, at(2024, 6, 1, 0, 0));
        assert!(dated.extra.is_empty());
    }

    #[test]
    fn unreadable_stamps_survive_a_save() {
        let now = at(2024, 6, 13, 12, 0);
        let item = migrate(
            &json!({"text": "t", "done": true, "created_at": 17, "done_at": "soon"}),
            now,
        );
        assert_eq!(item.created_at, now);
        assert_eq!(item.done_at, Some(now));

        let encoded = serde_json::to_value(&item).expect("encode");
        assert_eq!(encoded["created_at_unparsed"], json!(17));
        assert_eq!(encoded["done_at_unparsed"], json!("soon"));

        let reloaded = migrate(&encoded, at(2025, 1, 1, 0, 0));
        assert_eq!(reloaded, item);
    }

    #[test]
    fn unparsable_deadline_is_kept_but_reads_as_absent() {
        let now = at(2024, 6, 1, 8, 0);
        let item = migrate(&json!({"text": "t", "due_dt": "next week"}), now);
        assert_eq!(item.due_dt.as_deref(), Some("next week"));
        assert_eq!(item.due(), None);
    }

    #[test]
    fn done_at_follows_done() {
        let now = at(2024, 6, 1, 8, 0);

        let done_without_stamp = migrate(&json!({"text": "t", "done": true}), now);
        assert_eq!(done_without_stamp.done_at, Some(now));

        let done_with_stamp = migrate(
            &json!({"text": "t", "done": true, "done_at": "2024-05-30T17:45:10"}),
            now,
        );
        assert_eq!(
            done_with_stamp.done_at,
            Some(at(2024, 5, 30, 17, 45) + chrono::Duration::seconds(10))
        );
    }

    #[test]
    fn migration_is_idempotent() {
        let now = at(2024, 6, 1, 8, 0);
        let later = at(2025, 1, 1, 0, 0);
        let inputs = [
            json!("bare"),
            json!(3.5),
            json!({}),
            json!({"text": "a", "due": "2024-05-01", "priority": 2, "tag": "home"}),
            json!({"text": "b", "done": true, "priority": "0"}),
            json!({"text": "c", "due_dt": "garbage", "created_at": "2023-03-03T03:03:03"}),
            json!({"text": "d", "created_at": "2024-06-01T08:30:00.250"}),
            json!({"text": "e", "created_at": "2024-06-01T08:30:00+07:00"}),
            json!({"text": "f", "created_at": "2024-06-01", "done": true, "done_at": 5}),
            json!([1, 2, 3]),
        ];

        for raw in inputs {
            let once = migrate(&raw, now);
            let encoded = serde_json::to_value(&once).expect("encode");
            let twice = migrate(&encoded, later);
            assert_eq!(once, twice, "not idempotent for {raw}");
        }
    }

    #[test]
    fn unknown_keys_survive() {
        let now = at(2024, 6, 1, 8, 0);
        let item = migrate(&json!({"text": "t", "tag": "home", "due": ""}), now);
        assert_eq!(item.extra.get("tag"), Some(&json!("home")));
        assert_eq!(item.extra.len(), 1);
    }

    #[test]
    fn priority_parses_names_and_numbers() {
        assert_eq!("2".parse::<Priority>().expect("2"), Priority::High);
        assert_eq!("Low".parse::<Priority>().expect("low"), Priority::Low);
        assert!("urgent".parse::<Priority>().is_err());
        assert_eq!(Priority::try_from(3_u8), Err("priority out of range: 3".to_string()));
    }

    #[test]
    fn overdue_only_counts_open_items_due_before_today() {
        let now = at(2024, 6, 1, 8, 0);
        let today = NaiveDate::from_ymd_opt(2024, 6, 13).expect("date");
        let mut item = Item::new("t", Priority::Normal, Some(at(2024, 6, 12, 23, 0)), now);
        assert!(item.is_overdue(today));

        item.set_due(Some(at(2024, 6, 13, 0, 0)));
        assert!(!item.is_overdue(today));

        item.set_due(Some(at(2024, 6, 1, 0, 0)));
        item.set_done(true, now);
        assert!(!item.is_overdue(today));
    }
}
