use tracing::debug;
use trellis_shared::{
  Task,
  TaskPatch,
  TaskStatus
};

/// Board drag-and-drop state. Lives in
/// the UI only and is never persisted.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub enum DragState {
  #[default]
  Idle,
  Dragging {
    task: Task
  },
  Hovering {
    task:   Task,
    target: TaskStatus
  }
}

/// A committed move, to be handed to
/// the task store as a status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
  pub task_id: String,
  pub from:    TaskStatus,
  pub to:      TaskStatus
}

impl MoveRequest {
  pub fn patch(&self) -> TaskPatch {
    TaskPatch::status(self.to)
  }
}

impl DragState {
  pub fn start(&mut self, task: Task) {
    debug!(task_id = %task.id, "drag start");
    *self = DragState::Dragging {
      task
    };
  }

  /// Pointer entered a column. Ignored
  /// unless a drag is in progress.
  pub fn drag_over(
    &mut self,
    column: TaskStatus
  ) {
    let current =
      std::mem::take(self);
    *self = match current {
      | DragState::Dragging {
        task
      }
      | DragState::Hovering {
        task,
        ..
      } => {
        DragState::Hovering {
          task,
          target: column
        }
      }
      | DragState::Idle => DragState::Idle
    };
  }

  pub fn drag_leave(&mut self) {
    let current =
      std::mem::take(self);
    *self = match current {
      | DragState::Hovering {
        task,
        ..
      } => DragState::Dragging {
        task
      },
      | other => other
    };
  }

  /// Drop onto `column`. Always returns
  /// to idle; yields a move only when
  /// hovering a column whose status
  /// differs from the task's own.
  pub fn drop_on(
    &mut self,
    column: TaskStatus
  ) -> Option<MoveRequest> {
    let current =
      std::mem::take(self);
    let DragState::Hovering {
      task,
      ..
    } = current
    else {
      return None;
    };

    if task.status == column {
      debug!(
        task_id = %task.id,
        status = column.as_key(),
        "dropped on own column; no move"
      );
      return None;
    }

    Some(MoveRequest {
      task_id: task.id,
      from:    task.status,
      to:      column
    })
  }

  /// Drag finished or was cancelled.
  pub fn end(&mut self) {
    *self = DragState::Idle;
  }

  pub fn dragged_task(
    &self
  ) -> Option<&Task> {
    match self {
      | DragState::Idle => None,
      | DragState::Dragging {
        task
      }
      | DragState::Hovering {
        task,
        ..
      } => Some(task)
    }
  }

  pub fn hovered_column(
    &self
  ) -> Option<TaskStatus> {
    match self {
      | DragState::Hovering {
        target,
        ..
      } => Some(*target),
      | _ => None
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use trellis_shared::TaskPriority;

  use super::*;

  fn task(status: TaskStatus) -> Task {
    let now = Utc::now();
    Task {
      id: "t1".to_string(),
      title: "Ship release".to_string(),
      description: String::new(),
      status,
      priority: TaskPriority::High,
      tags: vec![],
      subtasks: vec![],
      due_date: None,
      created_at: now,
      updated_at: now
    }
  }

  #[test]
  fn drop_on_other_column_commits_move() {
    let mut state = DragState::default();
    state.start(task(TaskStatus::Todo));
    state.drag_over(TaskStatus::Done);
    assert_eq!(
      state.hovered_column(),
      Some(TaskStatus::Done)
    );

    let request =
      state.drop_on(TaskStatus::Done);
    assert_eq!(
      request,
      Some(MoveRequest {
        task_id: "t1".to_string(),
        from:    TaskStatus::Todo,
        to:      TaskStatus::Done
      })
    );
    assert_eq!(state, DragState::Idle);
  }

  #[test]
  fn drop_on_own_column_is_a_no_op() {
    let mut state = DragState::default();
    state.start(task(
      TaskStatus::InProgress
    ));
    state.drag_over(
      TaskStatus::InProgress
    );
    assert_eq!(
      state.drop_on(
        TaskStatus::InProgress
      ),
      None
    );
    assert_eq!(state, DragState::Idle);
  }

  #[test]
  fn cancelled_drag_returns_to_idle() {
    let mut state = DragState::default();
    state.start(task(TaskStatus::Todo));
    state.drag_over(TaskStatus::Done);
    state.end();
    assert_eq!(state, DragState::Idle);
    assert_eq!(
      state.drop_on(TaskStatus::Done),
      None
    );
  }

  #[test]
  fn leaving_a_column_keeps_dragging() {
    let mut state = DragState::default();
    state.drag_over(TaskStatus::Done);
    assert_eq!(state, DragState::Idle);

    state.start(task(TaskStatus::Todo));
    state.drag_over(TaskStatus::Done);
    state.drag_leave();
    assert!(matches!(
      state,
      DragState::Dragging { .. }
    ));
    assert_eq!(
      state.drop_on(TaskStatus::Done),
      None
    );
    assert!(state.dragged_task().is_none());
  }
}
