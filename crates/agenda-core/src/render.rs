use std::io::{self, IsTerminal, Write};

use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{self, TIME_FORMAT};
use crate::item::Item;
use crate::query::{DayEntry, Stats, WeekEntry};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let wanted = cfg.get_bool("color")?.unwrap_or(true);
        Ok(Self {
            color: wanted && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    /// Rows are `indices` in view order; the `#` column is the 1-based list
    /// position that other commands accept.
    #[tracing::instrument(skip_all, fields(rows = indices.len()))]
    pub fn write_list<W: Write>(
        &self,
        mut out: W,
        items: &[Item],
        indices: &[usize],
        stats: Stats,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let headers = ["#", "", "Pri", "Due", "Text"];
        let mut rows = Vec::with_capacity(indices.len());

        for &idx in indices {
            let item = &items[idx];
            let due = item.due_dt.clone().unwrap_or_default();
            let due = if item.is_overdue(today) {
                self.paint(&format!("{due} overdue"), "31")
            } else {
                due
            };

            rows.push(vec![
                self.paint(&(idx + 1).to_string(), "33"),
                done_badge(item).to_string(),
                item.priority.marker().to_string(),
                due,
                item.text.clone(),
            ]);
        }

        write_table(&mut out, &headers, rows)?;
        writeln!(out)?;
        writeln!(out, "{}", summary(stats))?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(rows = entries.len()))]
    pub fn write_day<W: Write>(
        &self,
        mut out: W,
        date: NaiveDate,
        entries: &[DayEntry<'_>],
    ) -> anyhow::Result<()> {
        writeln!(out, "{}", datetime::format_date(date))?;

        let rows = entries
            .iter()
            .map(|entry| {
                vec![
                    entry.time.format(TIME_FORMAT).to_string(),
                    (entry.index + 1).to_string(),
                    entry.item.text.clone(),
                    entry.item.priority.label().to_string(),
                    status_label(entry.item).to_string(),
                ]
            })
            .collect();

        write_table(&mut out, &["Time", "#", "Text", "Priority", "Status"], rows)
    }

    #[tracing::instrument(skip_all, fields(rows = entries.len()))]
    pub fn write_week<W: Write>(
        &self,
        mut out: W,
        anchor: NaiveDate,
        entries: &[WeekEntry<'_>],
    ) -> anyhow::Result<()> {
        writeln!(
            out,
            "{} .. {}",
            datetime::format_date(datetime::start_of_week(anchor)),
            datetime::format_date(datetime::end_of_week(anchor))
        )?;

        let rows = entries
            .iter()
            .map(|entry| {
                vec![
                    entry.weekday.to_string(),
                    datetime::format_date(entry.date),
                    entry.time.format(TIME_FORMAT).to_string(),
                    (entry.index + 1).to_string(),
                    entry.item.text.clone(),
                    entry.item.priority.label().to_string(),
                    status_label(entry.item).to_string(),
                ]
            })
            .collect();

        write_table(
            &mut out,
            &["Day", "Date", "Time", "#", "Text", "Priority", "Status"],
            rows,
        )
    }

    pub fn write_stats<W: Write>(&self, mut out: W, stats: Stats) -> anyhow::Result<()> {
        writeln!(out, "{}", summary(stats))?;
        Ok(())
    }

    pub fn print_list(
        &self,
        items: &[Item],
        indices: &[usize],
        stats: Stats,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        self.write_list(io::stdout().lock(), items, indices, stats, today)
    }

    pub fn print_day(&self, date: NaiveDate, entries: &[DayEntry<'_>]) -> anyhow::Result<()> {
        self.write_day(io::stdout().lock(), date, entries)
    }

    pub fn print_week(&self, anchor: NaiveDate, entries: &[WeekEntry<'_>]) -> anyhow::Result<()> {
        self.write_week(io::stdout().lock(), anchor, entries)
    }

    pub fn print_stats(&self, stats: Stats) -> anyhow::Result<()> {
        self.write_stats(io::stdout().lock(), stats)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn done_badge(item: &Item) -> &'static str {
    if item.done { "[x]" } else { "[ ]" }
}

fn status_label(item: &Item) -> &'static str {
    if item.done { "done" } else { "open" }
}

fn summary(stats: Stats) -> String {
    format!("{}/{} done ({}%)", stats.done, stats.total, stats.percent)
}

fn write_table<W: Write>(
    mut writer: W,
    headers: &[&str],
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(*header))
        .collect();

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;
    use crate::item::Priority;
    use crate::query;

    fn at(raw: &str) -> NaiveDateTime {
        datetime::parse_due(raw).expect("valid deadline")
    }

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> anyhow::Result<()>,
    {
        let mut buf = Vec::new();
        f(&mut buf).expect("render");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn list_rows_show_position_badge_and_overdue() {
        let now = at("2024-06-01 08:00");
        let mut items = vec![
            Item::new("late thing", Priority::High, Some(at("2024-06-12 09:00")), now),
            Item::new("café ☕", Priority::Low, None, now),
        ];
        items[1].set_done(true, now);
        let today = NaiveDate::from_ymd_opt(2024, 6, 13).expect("date");

        let out = render(|buf| {
            Renderer::plain().write_list(buf, &items, &[1, 0], query::stats(&items), today)
        });
        let lines: Vec<&str> = out.lines().collect();

        assert!(lines[2].starts_with("2 [x] ↓"));
        assert!(lines[2].contains("café ☕"));
        assert!(lines[3].starts_with("1 [ ] ↑   2024-06-12 09:00 overdue late thing"));
        assert_eq!(lines.last().copied(), Some("1/2 done (50%)"));
    }

    #[test]
    fn week_table_has_a_header_with_bounds() {
        let now = at("2024-06-01 08:00");
        let items = vec![Item::new("standup", Priority::Normal, Some(at("2024-06-14 09:15")), now)];
        let anchor = NaiveDate::from_ymd_opt(2024, 6, 13).expect("date");
        let entries = query::week_projection(&items, anchor);

        let out = render(|buf| Renderer::plain().write_week(buf, anchor, &entries));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "2024-06-10 .. 2024-06-16");
        assert!(lines[3].starts_with("Fri 2024-06-14 09:15 1 standup"));
    }

    #[test]
    fn color_setting_must_be_a_flag() {
        let mut cfg = Config::default();
        cfg.apply_overrides([("color".to_string(), "off".to_string())]);
        assert!(!Renderer::new(&cfg).expect("off").color);

        cfg.apply_overrides([("color".to_string(), "purple".to_string())]);
        let err = Renderer::new(&cfg).expect_err("bad color");
        assert!(err.to_string().contains("invalid color setting: purple"));
    }

    #[test]
    fn ansi_codes_do_not_count_towards_width() {
        assert_eq!(strip_ansi("\x1b[31mred\x1b[0m"), "red");
    }
}
