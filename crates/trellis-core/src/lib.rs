pub mod app;
pub mod auth;
pub mod calendar;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod debounce;
pub mod drag;
pub mod error;
pub mod filter;
pub mod logging;
pub mod remote;
pub mod sync;
pub mod task;

pub use app::{
  BoardView,
  ViewMode,
  ViewState,
  Workspace
};
pub use error::{
  SyncError,
  SyncResult,
  ValidationError
};
pub use remote::{
  EntityKind,
  RemoteError,
  RemoteStore
};
pub use sync::{
  NoteStore,
  SyncHandle,
  TaskStore
};
pub use trellis_shared as shared;
