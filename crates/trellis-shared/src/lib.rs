use chrono::{
  DateTime,
  NaiveDate,
  Utc
};
use serde::{
  Deserialize,
  Serialize
};

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
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
  Todo,
  InProgress,
  Done
}

impl TaskStatus {
  pub const ALL: [TaskStatus; 3] = [
    TaskStatus::Todo,
    TaskStatus::InProgress,
    TaskStatus::Done
  ];

  pub fn as_key(self) -> &'static str {
    match self {
      | TaskStatus::Todo => "todo",
      | TaskStatus::InProgress => {
        "in-progress"
      }
      | TaskStatus::Done => "done"
    }
  }

  pub fn from_key(
    raw: &str
  ) -> Option<Self> {
    match raw.trim() {
      | "todo" => Some(TaskStatus::Todo),
      | "in-progress" => {
        Some(TaskStatus::InProgress)
      }
      | "done" => Some(TaskStatus::Done),
      | _ => None
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      | TaskStatus::Todo => "To Do",
      | TaskStatus::InProgress => {
        "In Progress"
      }
      | TaskStatus::Done => "Done"
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
  High,
  #[default]
  Medium,
  Low
}

impl TaskPriority {
  pub const ALL: [TaskPriority; 3] = [
    TaskPriority::High,
    TaskPriority::Medium,
    TaskPriority::Low
  ];

  pub fn as_key(self) -> &'static str {
    match self {
      | TaskPriority::High => "high",
      | TaskPriority::Medium => "medium",
      | TaskPriority::Low => "low"
    }
  }

  pub fn from_key(
    raw: &str
  ) -> Option<Self> {
    match raw.trim() {
      | "high" => Some(TaskPriority::High),
      | "medium" => {
        Some(TaskPriority::Medium)
      }
      | "low" => Some(TaskPriority::Low),
      | _ => None
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
  pub id:         String,
  pub text:       String,
  #[serde(default)]
  pub completed:  bool,
  pub created_at: DateTime<Utc>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  pub id:          String,
  pub title:       String,
  #[serde(default)]
  pub description: String,
  pub status:      TaskStatus,
  pub priority:    TaskPriority,
  pub tags:        Vec<String>,
  pub subtasks:    Vec<Subtask>,
  pub due_date:    Option<NaiveDate>,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>
}

impl Task {
  /// Wire form of the task, stamped
  /// with the owning account.
  pub fn to_row(
    &self,
    owner: Option<&str>
  ) -> TaskRow {
    TaskRow {
      id:          self.id.clone(),
      user_id:     owner
        .map(str::to_string),
      title:       self.title.clone(),
      description: Some(
        self.description.clone()
      ),
      status:      Some(self.status),
      priority:    Some(self.priority),
      tags:        Some(
        self.tags.clone()
      ),
      subtasks:    Some(
        self.subtasks.clone()
      ),
      due_date:    self.due_date,
      created_at:  self.created_at,
      updated_at:  Some(
        self.updated_at
      )
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct Note {
  pub id:         String,
  pub content:    String,
  pub created_at: DateTime<Utc>
}

impl Note {
  pub fn to_row(
    &self,
    owner: Option<&str>
  ) -> NoteRow {
    NoteRow {
      id:         self.id.clone(),
      user_id:    owner
        .map(str::to_string),
      content:    self.content.clone(),
      created_at: self.created_at
    }
  }
}

/// Partial task update. `None` leaves
/// a field untouched; `due_date:
/// Some(None)` clears the due date.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
  pub title:       Option<String>,
  pub description: Option<String>,
  pub status:      Option<TaskStatus>,
  pub priority:    Option<TaskPriority>,
  pub tags:        Option<Vec<String>>,
  pub subtasks:    Option<Vec<Subtask>>,
  pub due_date: Option<Option<NaiveDate>>
}

impl TaskPatch {
  pub fn status(
    status: TaskStatus
  ) -> Self {
    Self {
      status: Some(status),
      ..Self::default()
    }
  }

  pub fn is_empty(&self) -> bool {
    self == &Self::default()
  }
}

/// Task record as stored remotely or
/// in the local blob store. Fields
/// added after the first schema are
/// optional so older records still
/// load.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct TaskRow {
  pub id:          String,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub user_id:     Option<String>,
  pub title:       String,
  #[serde(default)]
  pub description: Option<String>,
  /// Unknown or empty keys read as
  /// `None` so the row still loads.
  #[serde(
    default,
    deserialize_with = "lenient_key::status"
  )]
  pub status:      Option<TaskStatus>,
  #[serde(
    default,
    deserialize_with = "lenient_key::priority"
  )]
  pub priority:    Option<TaskPriority>,
  #[serde(default)]
  pub tags:        Option<Vec<String>>,
  #[serde(default)]
  pub subtasks:    Option<Vec<Subtask>>,
  #[serde(
    default,
    alias = "dueDate",
    with = "lenient_day"
  )]
  pub due_date:    Option<NaiveDate>,
  #[serde(alias = "createdAt")]
  pub created_at:  DateTime<Utc>,
  #[serde(default, alias = "updatedAt")]
  pub updated_at:  Option<DateTime<Utc>>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct NoteRow {
  pub id:         String,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub user_id:    Option<String>,
  pub content:    String,
  #[serde(alias = "createdAt")]
  pub created_at: DateTime<Utc>
}

mod lenient_key {
  use serde::{
    Deserialize,
    Deserializer
  };

  use super::{
    TaskPriority,
    TaskStatus
  };

  fn raw_key<'de, D>(
    deserializer: D
  ) -> Result<Option<String>, D::Error>
  where
    D: Deserializer<'de>
  {
    Option::<String>::deserialize(
      deserializer
    )
  }

  pub fn status<'de, D>(
    deserializer: D
  ) -> Result<Option<TaskStatus>, D::Error>
  where
    D: Deserializer<'de>
  {
    Ok(
      raw_key(deserializer)?
        .as_deref()
        .and_then(TaskStatus::from_key)
    )
  }

  pub fn priority<'de, D>(
    deserializer: D
  ) -> Result<
    Option<TaskPriority>,
    D::Error
  >
  where
    D: Deserializer<'de>
  {
    Ok(
      raw_key(deserializer)?
        .as_deref()
        .and_then(TaskPriority::from_key)
    )
  }
}

/// Due dates are written as
/// `YYYY-MM-DD`. Older records carry a
/// full timestamp; only its calendar
/// date part is kept.
pub mod lenient_day {
  use chrono::NaiveDate;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  const DAY_FORMAT: &str = "%Y-%m-%d";

  pub fn serialize<S>(
    value: &Option<NaiveDate>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    match value {
      | Some(day) => {
        serializer.serialize_str(
          &day
            .format(DAY_FORMAT)
            .to_string()
        )
      }
      | None => serializer.serialize_none()
    }
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<Option<NaiveDate>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = Option::<String>::deserialize(
      deserializer
    )?;
    let Some(raw) = raw else {
      return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
      return Ok(None);
    }
    parse_day(trimmed)
      .map(Some)
      .map_err(serde::de::Error::custom)
  }

  pub fn parse_day(
    raw: &str
  ) -> Result<NaiveDate, String> {
    let day_part = raw
      .split(['T', ' '])
      .next()
      .unwrap_or(raw);
    NaiveDate::parse_from_str(
      day_part, DAY_FORMAT
    )
    .map_err(|err| {
      format!(
        "invalid due date '{raw}': \
         {err}"
      )
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_uses_board_column_keys() {
    let json = serde_json::to_string(
      &TaskStatus::InProgress
    )
    .expect("serialize status");
    assert_eq!(json, "\"in-progress\"");
    assert_eq!(
      TaskStatus::from_key("done"),
      Some(TaskStatus::Done)
    );
    assert_eq!(
      TaskStatus::from_key("archived"),
      None
    );
  }

  #[test]
  fn legacy_row_without_new_fields_parses(
  ) {
    let raw = r#"{
      "id": "1700000000000-abc123def",
      "title": "Old task",
      "description": null,
      "status": "todo",
      "due_date": "2026-03-05T00:00:00.000Z",
      "created_at": "2026-03-01T10:00:00Z"
    }"#;
    let row: TaskRow =
      serde_json::from_str(raw)
        .expect("legacy row");
    assert_eq!(row.priority, None);
    assert_eq!(row.tags, None);
    assert_eq!(row.subtasks, None);
    assert_eq!(
      row.due_date,
      NaiveDate::from_ymd_opt(2026, 3, 5)
    );
    assert_eq!(row.updated_at, None);
  }

  #[test]
  fn unknown_status_and_blank_priority_still_parse(
  ) {
    let raw = r#"{
      "id": "t9",
      "title": "Imported",
      "status": "archived",
      "priority": "",
      "created_at": "2026-03-01T10:00:00Z"
    }"#;
    let row: TaskRow =
      serde_json::from_str(raw)
        .expect("lenient row");
    assert_eq!(row.status, None);
    assert_eq!(row.priority, None);

    let row: TaskRow = serde_json::from_str(
      r#"{"id":"t10","title":"x","status":"done","priority":"low","created_at":"2026-03-01T10:00:00Z"}"#
    )
    .expect("known keys");
    assert_eq!(
      row.status,
      Some(TaskStatus::Done)
    );
    assert_eq!(
      row.priority,
      Some(TaskPriority::Low)
    );
  }

  #[test]
  fn due_date_written_as_plain_day() {
    let row = TaskRow {
      id:          "t1".to_string(),
      user_id:     None,
      title:       "x".to_string(),
      description: None,
      status:      Some(TaskStatus::Todo),
      priority:    None,
      tags:        None,
      subtasks:    None,
      due_date:    NaiveDate::from_ymd_opt(
        2026, 12, 31
      ),
      created_at:  DateTime::from_timestamp(
        1_767_225_600,
        0
      )
      .expect("valid timestamp"),
      updated_at:  None
    };
    let value = serde_json::to_value(&row)
      .expect("serialize row");
    assert_eq!(
      value["due_date"],
      "2026-12-31"
    );
    assert!(value.get("user_id").is_none());
  }

  #[test]
  fn camel_case_local_blob_row_parses() {
    let raw = r#"{
      "id": "n1",
      "content": "remember",
      "createdAt": "2026-03-01T10:00:00Z"
    }"#;
    let row: NoteRow =
      serde_json::from_str(raw)
        .expect("camelCase note");
    assert_eq!(row.content, "remember");
    assert_eq!(row.user_id, None);
  }

  #[test]
  fn empty_patch_is_detected() {
    assert!(TaskPatch::default().is_empty());
    assert!(
      !TaskPatch::status(TaskStatus::Done)
        .is_empty()
    );
  }
}
