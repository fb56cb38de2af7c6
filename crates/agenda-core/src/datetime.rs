use chrono::{
  DateTime,
  Datelike,
  Duration,
  Local,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  SubsecRound,
  Weekday
};
use regex::Regex;

pub const DUE_FORMAT: &str =
  "%Y-%m-%d %H:%M";
pub const DATE_FORMAT: &str =
  "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";
/// Sub-second digits are written only
/// when present.
pub const TIMESTAMP_FORMAT: &str =
  "%Y-%m-%dT%H:%M:%S%.f";

/// Time of day assumed for deadlines
/// stored by the date-only schema.
pub const LEGACY_DUE_TIME: &str =
  "23:59";

/// Monday-first, independent of the
/// platform locale.
pub const WEEKDAY_LABELS: [&str; 7] = [
  "Mon", "Tue", "Wed", "Thu", "Fri",
  "Sat", "Sun"
];

const DUE_SHAPE: &str =
  r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}$";
const DATE_SHAPE: &str =
  r"^\d{4}-\d{2}-\d{2}$";

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  thiserror::Error,
)]
pub enum InputError {
  #[error(
    "invalid deadline {input:?}: use \
     YYYY-MM-DD HH:MM (24h)"
  )]
  Due { input: String },
  #[error(
    "invalid date {input:?}: use \
     YYYY-MM-DD"
  )]
  Date { input: String }
}

/// Current local wall-clock time,
/// truncated to whole seconds so it
/// survives a save/load cycle.
#[must_use]
pub fn now_local() -> NaiveDateTime {
  Local::now()
    .naive_local()
    .trunc_subsecs(0)
}

#[tracing::instrument(fields(input = input))]
pub fn parse_due(
  input: &str
) -> Result<NaiveDateTime, InputError> {
  let token = input.trim();
  if !matches_shape(DUE_SHAPE, token) {
    return Err(InputError::Due {
      input: input.to_string()
    });
  }

  NaiveDateTime::parse_from_str(
    token, DUE_FORMAT
  )
  .map_err(|err| {
    tracing::debug!(
      error = %err,
      "deadline out of range"
    );
    InputError::Due {
      input: input.to_string()
    }
  })
}

/// Parses an optional deadline where a
/// blank answer means "no deadline".
pub fn parse_optional_due(
  input: Option<&str>
) -> Result<Option<NaiveDateTime>, InputError>
{
  match input.map(str::trim) {
    | None | Some("") => Ok(None),
    | Some(raw) => {
      parse_due(raw).map(Some)
    }
  }
}

#[tracing::instrument(fields(input = input))]
pub fn parse_date(
  input: &str
) -> Result<NaiveDate, InputError> {
  let token = input.trim();
  if !matches_shape(DATE_SHAPE, token) {
    return Err(InputError::Date {
      input: input.to_string()
    });
  }

  NaiveDate::parse_from_str(
    token,
    DATE_FORMAT
  )
  .map_err(|_| {
    InputError::Date {
      input: input.to_string()
    }
  })
}

#[must_use]
pub fn format_due(
  dt: NaiveDateTime
) -> String {
  dt.format(DUE_FORMAT).to_string()
}

#[must_use]
pub fn format_date(
  date: NaiveDate
) -> String {
  date.format(DATE_FORMAT).to_string()
}

/// Accepts an ISO-8601 local date-time
/// (fractional seconds kept), an
/// RFC 3339 stamp with an offset (read
/// as its wall-clock time) or a bare
/// date (midnight).
pub fn parse_timestamp(
  raw: &str
) -> Option<NaiveDateTime> {
  let token = raw.trim();
  if let Ok(dt) =
    token.parse::<NaiveDateTime>()
  {
    return Some(dt);
  }
  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Some(dt.naive_local());
  }
  token
    .parse::<NaiveDate>()
    .ok()
    .map(|date| {
      date.and_time(NaiveTime::MIN)
    })
}

#[must_use]
pub fn start_of_week(
  date: NaiveDate
) -> NaiveDate {
  date
    - Duration::days(i64::from(
      date
        .weekday()
        .num_days_from_monday()
    ))
}

#[must_use]
pub fn end_of_week(
  date: NaiveDate
) -> NaiveDate {
  start_of_week(date)
    + Duration::days(6)
}

#[must_use]
pub fn weekday_label(
  weekday: Weekday
) -> &'static str {
  WEEKDAY_LABELS[weekday
    .num_days_from_monday()
    as usize]
}

fn matches_shape(
  pattern: &str,
  token: &str
) -> bool {
  match Regex::new(pattern) {
    | Ok(re) => re.is_match(token),
    | Err(err) => {
      tracing::error!(
        error = %err,
        "internal regex compile failure"
      );
      false
    }
  }
}

pub mod timestamp_serde {
  use chrono::NaiveDateTime;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  use super::TIMESTAMP_FORMAT;

  pub fn serialize<S>(
    dt: &NaiveDateTime,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &dt
        .format(TIMESTAMP_FORMAT)
        .to_string()
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveDateTime, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_timestamp(&raw)
      .ok_or_else(|| {
        serde::de::Error::custom(
          format!(
            "invalid timestamp: {raw}"
          )
        )
      })
  }

  pub mod option {
    use chrono::NaiveDateTime;
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    pub fn serialize<S>(
      dt: &Option<NaiveDateTime>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match dt {
        | Some(value) => {
          super::serialize(
            value, serializer
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<NaiveDateTime>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      let opt =
        Option::<String>::deserialize(
          deserializer
        )?;
      match opt {
        | Some(raw) => {
          super::super::parse_timestamp(
            &raw
          )
          .map(Some)
          .ok_or_else(|| {
            serde::de::Error::custom(
              format!(
                "invalid timestamp: \
                 {raw}"
              )
            )
          })
        }
        | None => Ok(None)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    Timelike
  };

  use super::*;

  fn date(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn week_of_a_thursday_runs_monday_to_sunday()
   {
    let anchor = date(2024, 6, 13);
    assert_eq!(
      start_of_week(anchor),
      date(2024, 6, 10)
    );
    assert_eq!(
      end_of_week(anchor),
      date(2024, 6, 16)
    );
  }

  #[test]
  fn week_boundaries_on_the_edges() {
    let monday = date(2024, 6, 10);
    let sunday = date(2024, 6, 16);
    assert_eq!(
      start_of_week(monday),
      monday
    );
    assert_eq!(
      start_of_week(sunday),
      monday
    );
    assert_eq!(
      end_of_week(sunday),
      sunday
    );
    assert_eq!(
      start_of_week(date(2025, 1, 1)),
      date(2024, 12, 30)
    );
  }

  #[test]
  fn parses_canonical_deadline() {
    let parsed =
      parse_due(" 2024-06-10 09:05 ")
        .expect("parse deadline");
    assert_eq!(
      parsed.date(),
      date(2024, 6, 10)
    );
    assert_eq!(parsed.hour(), 9);
    assert_eq!(parsed.minute(), 5);
    assert_eq!(
      format_due(parsed),
      "2024-06-10 09:05"
    );
  }

  #[test]
  fn rejects_loose_deadlines() {
    for bad in [
      "2024-6-10 09:00",
      "2024-06-10 9:00",
      "2024-06-10T09:00",
      "2024-06-10 09:00:00",
      "2024-06-10",
      "2024-13-10 09:00",
      "2024-06-10 24:00",
      "tomorrow"
    ] {
      assert_eq!(
        parse_due(bad),
        Err(InputError::Due {
          input: bad.to_string()
        }),
        "{bad} should be rejected"
      );
    }
  }

  #[test]
  fn blank_optional_deadline_is_none()
  {
    assert_eq!(
      parse_optional_due(None),
      Ok(None)
    );
    assert_eq!(
      parse_optional_due(Some("   ")),
      Ok(None)
    );
    assert!(
      parse_optional_due(Some(
        "soon"
      ))
      .is_err()
    );
  }

  #[test]
  fn parses_plain_dates_strictly() {
    assert_eq!(
      parse_date("2024-02-29"),
      Ok(date(2024, 2, 29))
    );
    assert!(
      parse_date("2023-02-29").is_err()
    );
    assert!(
      parse_date("2024-2-1").is_err()
    );
    let err = parse_date("06/13/2024")
      .expect_err("slash format");
    assert!(
      err
        .to_string()
        .contains("YYYY-MM-DD")
    );
  }

  #[test]
  fn timestamps_keep_fractional_seconds()
   {
    let fractional = parse_timestamp(
      "2024-06-01T08:30:00.250"
    )
    .expect("fractional");
    assert_eq!(
      fractional.nanosecond(),
      250_000_000
    );
    assert_eq!(
      fractional
        .format(TIMESTAMP_FORMAT)
        .to_string(),
      "2024-06-01T08:30:00.250"
    );

    let whole = parse_timestamp(
      "2024-06-01T08:30:00"
    )
    .expect("whole");
    assert_eq!(
      whole
        .format(TIMESTAMP_FORMAT)
        .to_string(),
      "2024-06-01T08:30:00"
    );
    assert_eq!(
      whole,
      fractional.trunc_subsecs(0)
    );
  }

  #[test]
  fn timestamps_accept_offsets_and_bare_dates()
   {
    let expected = date(2024, 6, 1)
      .and_hms_opt(8, 30, 0)
      .expect("time");
    assert_eq!(
      parse_timestamp(
        "2024-06-01T08:30:00+07:00"
      ),
      Some(expected)
    );
    assert_eq!(
      parse_timestamp(
        "2024-06-01T08:30:00Z"
      ),
      Some(expected)
    );
    assert_eq!(
      parse_timestamp("2024-06-01"),
      Some(
        date(2024, 6, 1)
          .and_time(NaiveTime::MIN)
      )
    );
    assert!(
      parse_timestamp("yesterday")
        .is_none()
    );
  }

  #[test]
  fn weekday_labels_are_monday_first() {
    assert_eq!(
      weekday_label(Weekday::Mon),
      "Mon"
    );
    assert_eq!(
      weekday_label(Weekday::Sun),
      "Sun"
    );
  }
}
