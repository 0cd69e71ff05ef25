use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{
  Deserialize,
  Serialize
};
use tracing::trace;
use trellis_shared::{
  Task,
  TaskPriority,
  TaskStatus
};

use crate::datetime::add_days;

/// Number of days after today that
/// still count as "due soon".
pub const DUE_SOON_DAYS: i64 = 3;

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
)]
#[serde(rename_all = "camelCase")]
pub enum DueDateCategory {
  Overdue,
  DueSoon,
  NoDueDate
}

/// Day-granularity due-date category.
/// `None` means the task is scheduled
/// beyond the due-soon window.
pub fn categorize(
  due: Option<NaiveDate>,
  today: NaiveDate
) -> Option<DueDateCategory> {
  let Some(due) = due else {
    return Some(
      DueDateCategory::NoDueDate
    );
  };
  if due < today {
    Some(DueDateCategory::Overdue)
  } else if due
    <= add_days(today, DUE_SOON_DAYS)
  {
    Some(DueDateCategory::DueSoon)
  } else {
    None
  }
}

pub fn is_overdue(
  due: Option<NaiveDate>,
  today: NaiveDate
) -> bool {
  categorize(due, today)
    == Some(DueDateCategory::Overdue)
}

#[derive(
  Debug,
  Clone,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
  pub priority: BTreeSet<TaskPriority>,
  pub tags:     BTreeSet<String>,
  pub due_date: BTreeSet<DueDateCategory>
}

impl FilterState {
  pub fn toggle_priority(
    &mut self,
    priority: TaskPriority
  ) {
    if !self.priority.remove(&priority)
    {
      self.priority.insert(priority);
    }
  }

  pub fn toggle_tag(
    &mut self,
    tag: &str
  ) {
    if !self.tags.remove(tag) {
      self.tags.insert(tag.to_string());
    }
  }

  pub fn toggle_due_date(
    &mut self,
    category: DueDateCategory
  ) {
    if !self.due_date.remove(&category)
    {
      self.due_date.insert(category);
    }
  }

  pub fn clear(&mut self) {
    *self = Self::default();
  }

  /// Total selected options across the
  /// three categories.
  pub fn active_count(&self) -> usize {
    self.priority.len()
      + self.tags.len()
      + self.due_date.len()
  }

  pub fn is_empty(&self) -> bool {
    self.active_count() == 0
  }

  pub fn matches(
    &self,
    task: &Task,
    today: NaiveDate
  ) -> bool {
    let priority_ok = self
      .priority
      .is_empty()
      || self
        .priority
        .contains(&task.priority);

    let tags_ok = self.tags.is_empty()
      || task
        .tags
        .iter()
        .any(|tag| self.tags.contains(tag));

    let due_ok = self.due_date.is_empty()
      || categorize(task.due_date, today)
        .is_some_and(|category| {
          self
            .due_date
            .contains(&category)
        });

    trace!(
      id = %task.id,
      priority_ok,
      tags_ok,
      due_ok,
      "structured filter evaluation"
    );
    priority_ok && tags_ok && due_ok
  }
}

/// Case-insensitive substring match on
/// title, description, or any tag.
pub fn matches_search(
  task: &Task,
  query: &str
) -> bool {
  let needle =
    query.trim().to_lowercase();
  if needle.is_empty() {
    return true;
  }
  task
    .title
    .to_lowercase()
    .contains(&needle)
    || task
      .description
      .to_lowercase()
      .contains(&needle)
    || task.tags.iter().any(|tag| {
      tag.to_lowercase().contains(&needle)
    })
}

pub fn search_tasks<'a>(
  tasks: &'a [Task],
  query: &str
) -> Vec<&'a Task> {
  tasks
    .iter()
    .filter(|task| {
      matches_search(task, query)
    })
    .collect()
}

pub fn apply_filters<'a>(
  tasks: impl IntoIterator<Item = &'a Task>,
  filters: &FilterState,
  today: NaiveDate
) -> Vec<&'a Task> {
  tasks
    .into_iter()
    .filter(|task| {
      filters.matches(task, today)
    })
    .collect()
}

/// Search first, then the structured
/// filters. `query` is expected to be
/// the debounced value.
pub fn filter_tasks<'a>(
  tasks: &'a [Task],
  query: &str,
  filters: &FilterState,
  today: NaiveDate
) -> Vec<&'a Task> {
  let searched =
    search_tasks(tasks, query);
  let out = apply_filters(
    searched, filters, today
  );
  tracing::debug!(
    total = tasks.len(),
    visible = out.len(),
    active_filters =
      filters.active_count(),
    "filtered tasks"
  );
  out
}

/// Distinct tags (case-sensitive) in
/// alphabetical order.
pub fn unique_tags(
  tasks: &[Task]
) -> Vec<String> {
  tasks
    .iter()
    .flat_map(|task| task.tags.iter())
    .cloned()
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardColumns<'a> {
  pub todo:           Vec<&'a Task>,
  pub in_progress:    Vec<&'a Task>,
  pub done:           Vec<&'a Task>,
  pub has_no_results: bool
}

impl<'a> BoardColumns<'a> {
  pub fn column(
    &self,
    status: TaskStatus
  ) -> &[&'a Task] {
    match status {
      | TaskStatus::Todo => &self.todo,
      | TaskStatus::InProgress => {
        &self.in_progress
      }
      | TaskStatus::Done => &self.done
    }
  }

  /// (todo, in-progress, done) counts.
  pub fn counts(
    &self
  ) -> (usize, usize, usize) {
    (
      self.todo.len(),
      self.in_progress.len(),
      self.done.len()
    )
  }
}

pub fn board_columns<'a>(
  tasks: &'a [Task],
  query: &str,
  filters: &FilterState,
  today: NaiveDate
) -> BoardColumns<'a> {
  let visible = filter_tasks(
    tasks, query, filters, today
  );
  let pick = |status: TaskStatus| {
    visible
      .iter()
      .copied()
      .filter(|task| task.status == status)
      .collect::<Vec<_>>()
  };
  BoardColumns {
    todo:           pick(TaskStatus::Todo),
    in_progress:    pick(
      TaskStatus::InProgress
    ),
    done:           pick(TaskStatus::Done),
    has_no_results: !tasks.is_empty()
      && visible.is_empty()
  }
}
