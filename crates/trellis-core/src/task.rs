use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;
use trellis_shared::{Note, NoteRow, Subtask, Task, TaskPatch, TaskPriority, TaskRow, TaskStatus};
use uuid::Uuid;

use crate::error::ValidationError;

pub const MAX_TAGS: usize = 10;
pub const MAX_TAG_LEN: usize = 20;
pub const MAX_SUBTASKS: usize = 20;
pub const SUBTASK_WARNING_THRESHOLD: usize = 10;

/// A decoded record plus whether schema defaults had to be filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized<T> {
    pub record: T,
    pub migrated: bool,
}

/// Fill the fields older schemas lacked (`priority`, `tags`,
/// `subtasks`) without touching anything that is present. An unreadable
/// status puts the task back in To Do.
pub fn normalize_row(row: TaskRow) -> Normalized<Task> {
    let migrated = row.status.is_none()
        || row.priority.is_none()
        || row.tags.is_none()
        || row.subtasks.is_none();
    let task = Task {
        updated_at: row.updated_at.unwrap_or(row.created_at),
        id: row.id,
        title: row.title,
        description: row.description.unwrap_or_default(),
        status: row.status.unwrap_or(TaskStatus::Todo),
        priority: row.priority.unwrap_or_default(),
        tags: row.tags.unwrap_or_default(),
        subtasks: row.subtasks.unwrap_or_default(),
        due_date: row.due_date,
        created_at: row.created_at,
    };
    Normalized { record: task, migrated }
}

/// Normalize a whole collection; the flag is set if any record needed a
/// default, which is the only case where the result should be persisted.
pub fn normalize_rows(rows: Vec<TaskRow>) -> (Vec<Task>, bool) {
    let mut any_migrated = false;
    let tasks = rows
        .into_iter()
        .map(|row| {
            let normalized = normalize_row(row);
            any_migrated |= normalized.migrated;
            normalized.record
        })
        .collect::<Vec<_>>();
    debug!(count = tasks.len(), migrated = any_migrated, "normalized task rows");
    (tasks, any_migrated)
}

pub fn note_from_row(row: NoteRow) -> Note {
    Note {
        id: row.id,
        content: row.content,
        created_at: row.created_at,
    }
}

pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// User input for a new task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub priority: Option<TaskPriority>,
    pub tags: Vec<String>,
    pub subtasks: Vec<Subtask>,
    pub due_date: Option<NaiveDate>,
}

impl TaskDraft {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

pub fn create_task(draft: TaskDraft, now: DateTime<Utc>) -> Result<Task, ValidationError> {
    let title = validate_title(&draft.title)?;
    validate_tags(&draft.tags)?;
    validate_subtask_count(draft.subtasks.len())?;

    Ok(Task {
        id: new_record_id(),
        title,
        description: draft.description.trim().to_string(),
        status: TaskStatus::Todo,
        priority: draft.priority.unwrap_or_default(),
        tags: draft.tags,
        subtasks: draft.subtasks,
        due_date: draft.due_date,
        created_at: now,
        updated_at: now,
    })
}

pub fn create_note(content: &str, now: DateTime<Utc>) -> Result<Note, ValidationError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ValidationError::EmptyNote);
    }
    Ok(Note {
        id: new_record_id(),
        content: content.to_string(),
        created_at: now,
    })
}

pub fn validate_title(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(trimmed.to_string())
}

/// Checks a complete tag set: count, length, case-insensitive uniqueness.
pub fn validate_tags(tags: &[String]) -> Result<(), ValidationError> {
    if tags.len() > MAX_TAGS {
        return Err(ValidationError::TooManyTags { max: MAX_TAGS });
    }
    for (idx, tag) in tags.iter().enumerate() {
        if tag.trim().is_empty() {
            return Err(ValidationError::EmptyTag);
        }
        if tag.chars().count() > MAX_TAG_LEN {
            return Err(ValidationError::TagTooLong {
                tag: tag.clone(),
                max: MAX_TAG_LEN,
            });
        }
        if tags[..idx].iter().any(|earlier| same_tag(earlier, tag)) {
            return Err(ValidationError::DuplicateTag(tag.clone()));
        }
    }
    Ok(())
}

fn same_tag(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Append a tag typed by the user. The existing set is never modified;
/// on success the new set is returned.
pub fn add_tag(tags: &[String], raw: &str) -> Result<Vec<String>, ValidationError> {
    let tag = raw.trim();
    if tag.is_empty() {
        return Err(ValidationError::EmptyTag);
    }
    if tags.iter().any(|existing| same_tag(existing, tag)) {
        return Err(ValidationError::DuplicateTag(tag.to_string()));
    }
    if tags.len() >= MAX_TAGS {
        return Err(ValidationError::TooManyTags { max: MAX_TAGS });
    }
    if tag.chars().count() > MAX_TAG_LEN {
        return Err(ValidationError::TagTooLong {
            tag: tag.to_string(),
            max: MAX_TAG_LEN,
        });
    }

    let mut out = tags.to_vec();
    out.push(tag.to_string());
    Ok(out)
}

pub fn remove_tag(tags: &[String], tag: &str) -> Vec<String> {
    tags.iter().filter(|existing| existing.as_str() != tag).cloned().collect()
}

pub fn validate_subtask_count(len: usize) -> Result<(), ValidationError> {
    if len > MAX_SUBTASKS {
        return Err(ValidationError::TooManySubtasks { max: MAX_SUBTASKS });
    }
    Ok(())
}

pub fn add_subtask(
    subtasks: &[Subtask],
    text: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Subtask>, ValidationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptySubtask);
    }
    if subtasks.len() >= MAX_SUBTASKS {
        return Err(ValidationError::TooManySubtasks { max: MAX_SUBTASKS });
    }

    let mut out = subtasks.to_vec();
    out.push(Subtask {
        id: format!("subtask-{}", new_record_id()),
        text: text.to_string(),
        completed: false,
        created_at: now,
    });
    Ok(out)
}

pub fn toggle_subtask(subtasks: &[Subtask], id: &str) -> Result<Vec<Subtask>, ValidationError> {
    if !subtasks.iter().any(|st| st.id == id) {
        return Err(ValidationError::UnknownSubtask(id.to_string()));
    }
    Ok(subtasks
        .iter()
        .map(|st| {
            let mut st = st.clone();
            if st.id == id {
                st.completed = !st.completed;
            }
            st
        })
        .collect())
}

pub fn remove_subtask(subtasks: &[Subtask], id: &str) -> Vec<Subtask> {
    subtasks.iter().filter(|st| st.id != id).cloned().collect()
}

/// Whether the "consider splitting this task" hint applies.
pub fn subtask_warning(len: usize) -> bool {
    (SUBTASK_WARNING_THRESHOLD..MAX_SUBTASKS).contains(&len)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtaskProgress {
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
}

pub fn subtask_progress(subtasks: &[Subtask]) -> SubtaskProgress {
    let total = subtasks.len();
    let completed = subtasks.iter().filter(|st| st.completed).count();
    let percent = if total == 0 {
        0
    } else {
        ((completed as f64 / total as f64) * 100.0).round() as u8
    };
    SubtaskProgress { completed, total, percent }
}

pub fn validate_patch(patch: &TaskPatch) -> Result<(), ValidationError> {
    if let Some(title) = patch.title.as_deref() {
        validate_title(title)?;
    }
    if let Some(tags) = patch.tags.as_deref() {
        validate_tags(tags)?;
    }
    if let Some(subtasks) = patch.subtasks.as_deref() {
        validate_subtask_count(subtasks.len())?;
    }
    Ok(())
}

/// Merge a validated patch into `task` and bump `updated_at`.
pub fn apply_patch(task: &mut Task, patch: &TaskPatch, now: DateTime<Utc>) {
    if let Some(title) = patch.title.as_deref() {
        task.title = title.trim().to_string();
    }
    if let Some(description) = patch.description.as_ref() {
        task.description = description.clone();
    }
    if let Some(status) = patch.status {
        task.status = status;
    }
    if let Some(priority) = patch.priority {
        task.priority = priority;
    }
    if let Some(tags) = patch.tags.as_ref() {
        task.tags = tags.clone();
    }
    if let Some(subtasks) = patch.subtasks.as_ref() {
        task.subtasks = subtasks.clone();
    }
    if let Some(due_date) = patch.due_date {
        task.due_date = due_date;
    }
    task.updated_at = now;
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()
    }

    fn legacy_row() -> TaskRow {
        TaskRow {
            id: "1700000000000-k3j2h1g0f".to_string(),
            user_id: None,
            title: "Write changelog".to_string(),
            description: Some("for 1.2".to_string()),
            status: Some(TaskStatus::InProgress),
            priority: None,
            tags: Some(vec!["docs".to_string()]),
            subtasks: None,
            due_date: NaiveDate::from_ymd_opt(2026, 10, 20),
            created_at: now(),
            updated_at: None,
        }
    }

    #[test]
    fn normalize_fills_missing_fields_only() {
        let normalized = normalize_row(legacy_row());
        assert!(normalized.migrated);
        let task = normalized.record;
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(task.tags, vec!["docs".to_string()]);
        assert!(task.subtasks.is_empty());
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.id, "1700000000000-k3j2h1g0f");
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2026, 10, 20));
        assert_eq!(task.created_at, now());
    }

    #[test]
    fn unreadable_status_falls_back_to_todo() {
        let row = TaskRow {
            status: None,
            ..legacy_row()
        };
        let normalized = normalize_row(row);
        assert!(normalized.migrated);
        assert_eq!(normalized.record.status, TaskStatus::Todo);
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_row(legacy_row()).record;
        let twice = normalize_row(once.to_row(Some("owner-1")));
        assert!(!twice.migrated);
        assert_eq!(twice.record, once);
    }

    #[test]
    fn collection_migration_flag_requires_a_default() {
        let complete = normalize_row(legacy_row()).record.to_row(None);
        let (_, migrated) = normalize_rows(vec![complete.clone(), complete.clone()]);
        assert!(!migrated);

        let (tasks, migrated) = normalize_rows(vec![complete, legacy_row()]);
        assert!(migrated);
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn duplicate_tag_is_rejected_case_insensitively() {
        let tags = vec!["Backend".to_string()];
        assert_eq!(
            add_tag(&tags, "  backend "),
            Err(ValidationError::DuplicateTag("backend".to_string()))
        );
        assert_eq!(tags, vec!["Backend".to_string()]);
        assert_eq!(add_tag(&tags, "api").unwrap(), vec!["Backend".to_string(), "api".to_string()]);
    }

    #[test]
    fn remove_tag_drops_only_the_exact_tag() {
        let tags = vec!["api".to_string(), "Api".to_string(), "ui".to_string()];
        assert_eq!(remove_tag(&tags, "api"), vec!["Api".to_string(), "ui".to_string()]);
        assert_eq!(remove_tag(&tags, "missing"), tags);
    }

    #[test]
    fn tag_limits() {
        let full: Vec<String> = (0..MAX_TAGS).map(|i| format!("t{i}")).collect();
        assert_eq!(add_tag(&full, "one-more"), Err(ValidationError::TooManyTags { max: 10 }));
        assert!(matches!(
            add_tag(&[], "abcdefghijklmnopqrstu"),
            Err(ValidationError::TagTooLong { .. })
        ));
        assert!(add_tag(&[], "abcdefghijklmnopqrst").is_ok());
        assert_eq!(add_tag(&[], "   "), Err(ValidationError::EmptyTag));
        assert!(validate_tags(&["a".to_string(), "A".to_string()]).is_err());
    }

    #[test]
    fn twenty_first_subtask_is_rejected() {
        let mut subtasks = Vec::new();
        for i in 0..MAX_SUBTASKS {
            subtasks = add_subtask(&subtasks, &format!("step {i}"), now()).unwrap();
        }
        assert_eq!(subtasks.len(), 20);
        assert_eq!(
            add_subtask(&subtasks, "one too many", now()),
            Err(ValidationError::TooManySubtasks { max: 20 })
        );
        assert_eq!(subtasks.len(), 20);
    }

    #[test]
    fn subtask_toggle_and_progress() {
        let subtasks = add_subtask(&[], "a", now()).unwrap();
        let subtasks = add_subtask(&subtasks, "b", now()).unwrap();
        let subtasks = add_subtask(&subtasks, "c", now()).unwrap();
        let first = subtasks[0].id.clone();
        let toggled = toggle_subtask(&subtasks, &first).unwrap();
        let progress = subtask_progress(&toggled);
        assert_eq!(progress, SubtaskProgress { completed: 1, total: 3, percent: 33 });
        assert!(toggle_subtask(&subtasks, "missing").is_err());
        assert_eq!(remove_subtask(&toggled, &first).len(), 2);
    }

    #[test]
    fn warning_band() {
        assert!(!subtask_warning(9));
        assert!(subtask_warning(10));
        assert!(subtask_warning(19));
        assert!(!subtask_warning(20));
    }

    #[test]
    fn create_task_trims_and_defaults() {
        let task = create_task(TaskDraft::titled("  Ship release "), now()).unwrap();
        assert_eq!(task.title, "Ship release");
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(task.created_at, task.updated_at);
        assert_eq!(create_task(TaskDraft::titled("   "), now()), Err(ValidationError::EmptyTitle));
    }

    #[test]
    fn apply_patch_clears_due_date_and_bumps_updated_at() {
        let mut task = normalize_row(legacy_row()).record;
        let later = now() + chrono::Duration::minutes(5);
        let patch = TaskPatch {
            due_date: Some(None),
            priority: Some(TaskPriority::High),
            ..TaskPatch::default()
        };
        apply_patch(&mut task, &patch, later);
        assert_eq!(task.due_date, None);
        assert_eq!(task.priority, TaskPriority::High);
        assert_eq!(task.updated_at, later);
        assert_eq!(task.title, "Write changelog");
    }

    #[test]
    fn empty_note_is_rejected() {
        assert_eq!(create_note(" \n ", now()), Err(ValidationError::EmptyNote));
        assert_eq!(create_note(" call Sam ", now()).unwrap().content, "call Sam");
    }
}
