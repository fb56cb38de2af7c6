use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  Datelike,
  NaiveDate,
  NaiveDateTime,
  NaiveTime
};
use tracing::trace;

use crate::datetime::{
  end_of_week,
  start_of_week,
  weekday_label
};
use crate::item::Item;

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub enum StatusFilter {
  #[default]
  All,
  Todo,
  Done
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub enum RangeFilter {
  #[default]
  All,
  Today,
  Week
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub enum SortKey {
  #[default]
  Default,
  DueDt,
  Priority,
  CreatedAt
}

/// Transient list-view parameters. None
/// of it is persisted.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct ViewState {
  pub status: StatusFilter,
  pub range:  RangeFilter,
  pub query:  String,
  pub sort:   SortKey
}

impl ViewState {
  /// True when visible order is storage
  /// order, so neighbours on screen are
  /// neighbours in the list.
  pub fn is_linear(&self) -> bool {
    self.status == StatusFilter::All
      && self.range == RangeFilter::All
      && self.query.trim().is_empty()
      && self.sort == SortKey::Default
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayEntry<'a> {
  pub index: usize,
  pub time:  NaiveTime,
  pub item:  &'a Item
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeekEntry<'a> {
  pub index:   usize,
  pub weekday: &'static str,
  pub date:    NaiveDate,
  pub time:    NaiveTime,
  pub item:    &'a Item
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub struct Stats {
  pub done:    usize,
  pub total:   usize,
  pub percent: usize
}

impl StatusFilter {
  pub fn as_str(self) -> &'static str {
    match self {
      | Self::All => "all",
      | Self::Todo => "todo",
      | Self::Done => "done"
    }
  }

  fn keeps(self, item: &Item) -> bool {
    match self {
      | Self::All => true,
      | Self::Todo => !item.done,
      | Self::Done => item.done
    }
  }
}

impl RangeFilter {
  pub fn as_str(self) -> &'static str {
    match self {
      | Self::All => "all",
      | Self::Today => "today",
      | Self::Week => "week"
    }
  }

  fn keeps(
    self,
    item: &Item,
    today: NaiveDate
  ) -> bool {
    match self {
      | Self::All => true,
      | Self::Today => {
        item.due_date() == Some(today)
      }
      | Self::Week => {
        item.due_date().is_some_and(
          |date| in_week(date, today)
        )
      }
    }
  }
}

impl SortKey {
  pub fn as_str(self) -> &'static str {
    match self {
      | Self::Default => "default",
      | Self::DueDt => "due_dt",
      | Self::Priority => "priority",
      | Self::CreatedAt => "created_at"
    }
  }
}

impl FromStr for StatusFilter {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s.trim() {
      | "all" => Ok(Self::All),
      | "todo" => Ok(Self::Todo),
      | "done" => Ok(Self::Done),
      | other => {
        Err(anyhow!(
          "expected status all|todo|done, \
           got: {other}"
        ))
      }
    }
  }
}

impl FromStr for RangeFilter {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s.trim() {
      | "all" => Ok(Self::All),
      | "today" => Ok(Self::Today),
      | "week" => Ok(Self::Week),
      | other => {
        Err(anyhow!(
          "expected range all|today|week, \
           got: {other}"
        ))
      }
    }
  }
}

impl FromStr for SortKey {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s.trim() {
      | "default" => Ok(Self::Default),
      | "due_dt" => Ok(Self::DueDt),
      | "priority" => Ok(Self::Priority),
      | "created_at" => {
        Ok(Self::CreatedAt)
      }
      | other => {
        Err(anyhow!(
          "expected sort \
           default|due_dt|priority|\
           created_at, got: {other}"
        ))
      }
    }
  }
}

impl fmt::Display for StatusFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl fmt::Display for RangeFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl fmt::Display for SortKey {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Indices of the items passing every
/// filter, in list order.
#[tracing::instrument(skip(
  items, query
))]
pub fn filtered_indices(
  items: &[Item],
  status: StatusFilter,
  range: RangeFilter,
  query: &str,
  today: NaiveDate
) -> Vec<usize> {
  let needle = query.to_lowercase();

  let out: Vec<usize> = items
    .iter()
    .enumerate()
    .filter(|(_, item)| {
      status.keeps(item)
        && range.keeps(item, today)
        && (needle.is_empty()
          || item
            .text
            .to_lowercase()
            .contains(&needle))
    })
    .map(|(idx, _)| idx)
    .collect();

  trace!(
    kept = out.len(),
    total = items.len(),
    "filtered items"
  );
  out
}

/// Stable: equal keys keep their
/// relative order.
pub fn sort_indices(
  items: &[Item],
  indices: &mut [usize],
  key: SortKey
) {
  match key {
    | SortKey::Default => {}
    | SortKey::DueDt => {
      indices.sort_by_key(|&idx| {
        due_sort_key(items[idx].due())
      })
    }
    | SortKey::Priority => {
      indices.sort_by_key(|&idx| {
        Reverse(items[idx].priority)
      })
    }
    | SortKey::CreatedAt => {
      indices.sort_by_key(|&idx| {
        Reverse(items[idx].created_at)
      })
    }
  }
}

#[tracing::instrument(skip(
  items, view
))]
pub fn visible_indices(
  items: &[Item],
  view: &ViewState,
  today: NaiveDate
) -> Vec<usize> {
  let mut indices = filtered_indices(
    items,
    view.status,
    view.range,
    &view.query,
    today
  );
  sort_indices(
    items,
    &mut indices,
    view.sort
  );
  indices
}

/// Items due on `date`, earliest first.
pub fn day_projection(
  items: &[Item],
  date: NaiveDate
) -> Vec<DayEntry<'_>> {
  let mut out: Vec<(
    NaiveDateTime,
    DayEntry<'_>
  )> = items
    .iter()
    .enumerate()
    .filter_map(|(index, item)| {
      let due = item.due()?;
      (due.date() == date).then_some((
        due,
        DayEntry {
          index,
          time: due.time(),
          item
        }
      ))
    })
    .collect();

  out.sort_by_key(|(due, _)| *due);
  out
    .into_iter()
    .map(|(_, entry)| entry)
    .collect()
}

/// Items due in the Monday-start week
/// containing `anchor`, ordered by day
/// then time.
pub fn week_projection(
  items: &[Item],
  anchor: NaiveDate
) -> Vec<WeekEntry<'_>> {
  let mut out: Vec<WeekEntry<'_>> =
    items
      .iter()
      .enumerate()
      .filter_map(|(index, item)| {
        let due = item.due()?;
        let date = due.date();
        in_week(date, anchor).then(
          || {
            WeekEntry {
              index,
              weekday: weekday_label(
                date.weekday()
              ),
              date,
              time: due.time(),
              item
            }
          }
        )
      })
      .collect();

  out.sort_by_key(|entry| {
    (entry.date, entry.time)
  });
  out
}

pub fn stats(items: &[Item]) -> Stats {
  let total = items.len();
  let done = items
    .iter()
    .filter(|item| item.done)
    .count();
  let percent = if total == 0 {
    0
  } else {
    done * 100 / total
  };

  Stats {
    done,
    total,
    percent
  }
}

/// Where list index `index` sits in a
/// computed view.
pub fn view_position(
  indices: &[usize],
  index: usize
) -> Option<usize> {
  indices
    .iter()
    .position(|&idx| idx == index)
}

fn in_week(
  date: NaiveDate,
  anchor: NaiveDate
) -> bool {
  start_of_week(anchor) <= date
    && date <= end_of_week(anchor)
}

// absent sorts after every real date
fn due_sort_key(
  due: Option<NaiveDateTime>
) -> (bool, Option<NaiveDateTime>) {
  (due.is_none(), due)
}
