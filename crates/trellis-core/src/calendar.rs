use std::collections::BTreeMap;

use anyhow::anyhow;
use chrono::{
  Datelike,
  NaiveDate,
  Weekday
};
use trellis_shared::{
  Task,
  TaskPriority
};

use crate::datetime::{
  add_days,
  days_in_month,
  first_day_of_month,
  shift_months,
  start_of_week
};
use crate::filter::is_overdue;

pub const GRID_CELLS: usize = 42;
pub const MAX_CELL_MARKERS: usize = 3;

const MONTH_NAMES: [&str; 12] = [
  "January",
  "February",
  "March",
  "April",
  "May",
  "June",
  "July",
  "August",
  "September",
  "October",
  "November",
  "December"
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarCell {
  pub date:             NaiveDate,
  pub is_current_month: bool,
  pub is_today:         bool
}

/// Six-week grid for `month` (1-based)
/// of `year`, starting on `week_start`.
/// Always exactly 42 cells.
pub fn month_grid(
  year: i32,
  month: u32,
  today: NaiveDate,
  week_start: Weekday
) -> anyhow::Result<Vec<CalendarCell>> {
  let first =
    first_day_of_month(year, month)
      .ok_or_else(|| {
        anyhow!(
          "invalid calendar month \
           {year}-{month}"
        )
      })?;
  let grid_start =
    start_of_week(first, week_start);

  let cells = (0..GRID_CELLS as i64)
    .map(|offset| {
      let date =
        add_days(grid_start, offset);
      CalendarCell {
        date,
        is_current_month: date.year()
          == year
          && date.month() == month,
        is_today: date == today
      }
    })
    .collect::<Vec<_>>();

  tracing::trace!(
    year,
    month,
    days_in_month = ?days_in_month(year, month),
    first_cell = %grid_start,
    "built month grid"
  );
  Ok(cells)
}

pub fn date_key(date: NaiveDate) -> String {
  date.format("%Y-%m-%d").to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DueBuckets<'a> {
  pub by_date:     BTreeMap<NaiveDate, Vec<&'a Task>>,
  pub unscheduled: Vec<&'a Task>
}

impl<'a> DueBuckets<'a> {
  pub fn tasks_on(
    &self,
    date: NaiveDate
  ) -> &[&'a Task] {
    self
      .by_date
      .get(&date)
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }

  /// Buckets keyed the way the host
  /// addresses cells (`YYYY-MM-DD`).
  pub fn keyed(
    &self
  ) -> BTreeMap<String, &[&'a Task]> {
    self
      .by_date
      .iter()
      .map(|(date, tasks)| {
        (date_key(*date), tasks.as_slice())
      })
      .collect()
  }
}

/// Group every task by its due day.
/// Uses the same stored calendar date
/// as the due-date filter categories.
pub fn group_by_due_date(
  tasks: &[Task]
) -> DueBuckets<'_> {
  let mut buckets = DueBuckets::default();
  for task in tasks {
    match task.due_date {
      | Some(due) => {
        buckets
          .by_date
          .entry(due)
          .or_default()
          .push(task);
      }
      | None => {
        buckets.unscheduled.push(task)
      }
    }
  }
  buckets
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellMarker {
  pub task_id:  String,
  pub title:    String,
  pub priority: TaskPriority
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellSummary {
  pub cell:        CalendarCell,
  pub markers:     Vec<CellMarker>,
  /// The "+N" count; zero when every
  /// task has a marker.
  pub overflow:    usize,
  pub task_count:  usize,
  pub overdue:     bool,
  pub interactive: bool
}

pub fn summarize_cell(
  cell: CalendarCell,
  tasks: &[&Task],
  today: NaiveDate
) -> CellSummary {
  let markers = tasks
    .iter()
    .take(MAX_CELL_MARKERS)
    .map(|task| CellMarker {
      task_id:  task.id.clone(),
      title:    task.title.clone(),
      priority: task.priority
    })
    .collect();

  CellSummary {
    cell,
    markers,
    overflow: tasks
      .len()
      .saturating_sub(MAX_CELL_MARKERS),
    task_count: tasks.len(),
    overdue: cell.is_current_month
      && is_overdue(Some(cell.date), today),
    interactive: cell.is_current_month
      || !tasks.is_empty()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthView {
  pub year:        i32,
  pub month:       u32,
  pub title:       String,
  pub cells:       Vec<CellSummary>,
  pub unscheduled: usize
}

pub fn month_view(
  tasks: &[Task],
  year: i32,
  month: u32,
  today: NaiveDate,
  week_start: Weekday
) -> anyhow::Result<MonthView> {
  let grid = month_grid(
    year, month, today, week_start
  )?;
  let buckets = group_by_due_date(tasks);
  let cells = grid
    .into_iter()
    .map(|cell| {
      summarize_cell(
        cell,
        buckets.tasks_on(cell.date),
        today
      )
    })
    .collect();

  Ok(MonthView {
    year,
    month,
    title: format!(
      "{} {year}",
      month_name(month).unwrap_or("?")
    ),
    cells,
    unscheduled: buckets
      .unscheduled
      .len()
  })
}

/// Tasks for the day-detail view; `None`
/// when the cell is not clickable.
pub fn day_detail<'a>(
  buckets: &DueBuckets<'a>,
  cell: CalendarCell
) -> Option<Vec<&'a Task>> {
  let tasks = buckets.tasks_on(cell.date);
  if cell.is_current_month
    || !tasks.is_empty()
  {
    Some(tasks.to_vec())
  } else {
    None
  }
}

pub fn month_name(
  month: u32
) -> Option<&'static str> {
  let idx =
    usize::try_from(month).ok()?;
  MONTH_NAMES.get(idx.checked_sub(1)?).copied()
}

/// Calendar navigation by whole months.
pub fn shift_month(
  year: i32,
  month: u32,
  step: i32
) -> (i32, u32) {
  shift_months(year, month, step)
}
