//! Application state owned by the host shell: the two sync stores plus
//! everything the views need that is never persisted.

use std::rc::Rc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, Utc, Weekday};
use tokio::time::Instant;
use tracing::{debug, info};
use trellis_shared::{Note, Task, TaskPatch, TaskStatus};

use crate::auth::User;
use crate::calendar::{MonthView, group_by_due_date, month_view, shift_month};
use crate::config::Config;
use crate::debounce::{Debouncer, TimerToken};
use crate::drag::{DragState, MoveRequest};
use crate::error::{SyncError, SyncResult};
use crate::filter::{FilterState, board_columns, unique_tags};
use crate::remote::{EntityKind, RemoteStore};
use crate::sync::{NoteStore, TaskStore};
use crate::task::{TaskDraft, create_note, create_task, toggle_subtask};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewMode {
    #[default]
    Board,
    Calendar,
}

#[derive(Debug, Clone)]
pub struct ViewState {
    pub search: Debouncer<String>,
    pub filters: FilterState,
    pub mode: ViewMode,
    /// Calendar month on screen, `(year, 1-based month)`.
    pub focus: (i32, u32),
    pub week_start: Weekday,
    pub drag: DragState,
}

impl ViewState {
    pub fn new(today: NaiveDate, week_start: Weekday, debounce: Duration) -> Self {
        Self {
            search: Debouncer::new(String::new(), debounce),
            filters: FilterState::default(),
            mode: ViewMode::default(),
            focus: (today.year(), today.month()),
            week_start,
            drag: DragState::default(),
        }
    }

    /// View state opened on the current month in the configured timezone.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(cfg.today(), cfg.week_start()?, cfg.search_debounce()))
    }

    /// The debounced query the board filters on.
    pub fn query(&self) -> &str {
        self.search.stable()
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            ViewMode::Board => ViewMode::Calendar,
            ViewMode::Calendar => ViewMode::Board,
        };
        self.drag.end();
    }

    pub fn next_month(&mut self) {
        self.focus = shift_month(self.focus.0, self.focus.1, 1);
    }

    pub fn previous_month(&mut self) {
        self.focus = shift_month(self.focus.0, self.focus.1, -1);
    }

    pub fn go_to_today(&mut self, today: NaiveDate) {
        self.focus = (today.year(), today.month());
    }

    /// Forget per-user view state on sign-out.
    fn reset(&mut self) {
        self.search.cancel();
        self.filters.clear();
        self.drag.end();
    }
}

/// Board columns after search and filters, detached from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardView {
    pub todo: Vec<Task>,
    pub in_progress: Vec<Task>,
    pub done: Vec<Task>,
    pub has_no_results: bool,
    pub loading: bool,
    /// Every tag in the collection, for the filter panel.
    pub tags: Vec<String>,
    pub active_filters: usize,
}

impl BoardView {
    pub fn column(&self, status: TaskStatus) -> &[Task] {
        match status {
            TaskStatus::Todo => &self.todo,
            TaskStatus::InProgress => &self.in_progress,
            TaskStatus::Done => &self.done,
        }
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        (self.todo.len(), self.in_progress.len(), self.done.len())
    }
}

pub struct Workspace {
    pub tasks: TaskStore,
    pub notes: NoteStore,
    pub view: ViewState,
    user: Option<User>,
}

impl Workspace {
    pub fn new(remote: Rc<dyn RemoteStore>, view: ViewState) -> Self {
        Self {
            tasks: TaskStore::new(Rc::clone(&remote)),
            notes: NoteStore::new(remote),
            view,
            user: None,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Rebind both stores to the new session. Both loads run even if the
    /// first one fails; the first error is returned.
    #[tracing::instrument(skip(self, user), fields(signed_in = user.is_some()))]
    pub async fn on_session_change(&mut self, user: Option<User>) -> SyncResult<()> {
        if user.is_none() {
            self.view.reset();
        }
        let owner = user.as_ref().map(|u| u.id.clone());
        self.user = user;
        info!("session changed");

        let tasks = self.tasks.load(owner.as_deref()).await;
        let notes = self.notes.load(owner.as_deref()).await;
        tasks.and(notes)
    }

    pub fn search_input(&mut self, text: &str, now: Instant) -> TimerToken {
        self.view.search.input(text.to_string(), now)
    }

    /// Debounce timer callback; `true` when the board needs re-rendering.
    pub fn search_timer_fired(&mut self, token: TimerToken, now: Instant) -> bool {
        self.view.search.fire(token, now).is_some()
    }

    pub fn board(&self, today: NaiveDate) -> BoardView {
        let loading = self.tasks.is_loading();
        self.tasks.with_records(|tasks| {
            let columns = board_columns(tasks, self.view.query(), &self.view.filters, today);
            let owned = |column: &[&Task]| -> Vec<Task> { column.iter().map(|t| (*t).clone()).collect() };
            BoardView {
                todo: owned(&columns.todo),
                in_progress: owned(&columns.in_progress),
                done: owned(&columns.done),
                has_no_results: columns.has_no_results,
                loading,
                tags: unique_tags(tasks),
                active_filters: self.view.filters.active_count(),
            }
        })
    }

    /// Month grid for the focused month. Search and filters do not apply
    /// to the calendar.
    pub fn calendar(&self, today: NaiveDate) -> anyhow::Result<MonthView> {
        let (year, month) = self.view.focus;
        self.tasks
            .with_records(|tasks| month_view(tasks, year, month, today, self.view.week_start))
    }

    /// Tasks due on `date`, for the day-detail view.
    pub fn tasks_due_on(&self, date: NaiveDate) -> Vec<Task> {
        self.tasks.with_records(|tasks| {
            group_by_due_date(tasks)
                .tasks_on(date)
                .iter()
                .map(|t| (*t).clone())
                .collect()
        })
    }

    /// Begin dragging `task_id`. Returns `false` if the task is gone.
    pub fn start_drag(&mut self, task_id: &str) -> bool {
        let Some(task) = self.tasks.store().get(task_id).cloned() else {
            return false;
        };
        self.view.drag.start(task);
        true
    }

    /// Drop the dragged card onto `column` and persist the move.
    pub async fn drop_on(&mut self, column: TaskStatus) -> SyncResult<Option<MoveRequest>> {
        let Some(request) = self.view.drag.drop_on(column) else {
            return Ok(None);
        };
        debug!(task_id = %request.task_id, from = request.from.as_key(), to = request.to.as_key(), "committing move");
        self.tasks.update(&request.task_id, request.patch()).await?;
        Ok(Some(request))
    }

    pub async fn add_task(&self, draft: TaskDraft) -> SyncResult<Task> {
        let task = create_task(draft, Utc::now())?;
        self.tasks.create(task.clone()).await?;
        Ok(task)
    }

    pub async fn edit_task(&self, id: &str, patch: TaskPatch) -> SyncResult<()> {
        self.tasks.update(id, patch).await
    }

    pub async fn delete_task(&self, id: &str) -> SyncResult<()> {
        self.tasks.delete(id).await
    }

    pub async fn toggle_subtask(&self, task_id: &str, subtask_id: &str) -> SyncResult<()> {
        let subtasks = {
            let store = self.tasks.store();
            let task = store.get(task_id).ok_or_else(|| SyncError::NotFound {
                kind: EntityKind::Tasks,
                id: task_id.to_string(),
            })?;
            toggle_subtask(&task.subtasks, subtask_id)?
        };
        let patch = TaskPatch {
            subtasks: Some(subtasks),
            ..TaskPatch::default()
        };
        self.tasks.update(task_id, patch).await
    }

    pub async fn add_note(&self, content: &str) -> SyncResult<Note> {
        let note = create_note(content, Utc::now())?;
        self.notes.create(note.clone()).await?;
        Ok(note)
    }

    pub async fn delete_note(&self, id: &str) -> SyncResult<()> {
        self.notes.delete(id).await
    }

    /// Re-fetch whichever collections received change notifications. Both
    /// stores are tried even if the first fails; the first error wins.
    pub async fn sync_changes(&self) -> SyncResult<bool> {
        let tasks = self.tasks.sync_changes().await;
        let notes = self.notes.sync_changes().await;
        let tasks_changed = tasks?;
        Ok(notes? || tasks_changed)
    }
}
