//! Focus session backend for the StudyFlow planner: the Pomodoro
//! work/break state machine with deadline preemption, task-status
//! synchronization against the planner's REST backend, and the command
//! surface the UI shell drives.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::commands::{
    AppState, FocusSummaryResponse, delete_task_impl, get_focus_state_impl,
    get_focus_summary_impl, list_tasks_in_progress_impl, mark_task_completed_impl,
    pause_focus_impl, reset_focus_impl, resume_focus_impl, sign_in_impl, sign_out_impl,
    start_focus_impl,
};
pub use application::engine::{FocusSessionEngine, FocusStateResponse, RetryPolicy};
pub use application::runner::SessionRunner;
pub use domain::models::{AuthSession, SessionConfig, SessionPhase, TaskRef, TaskStatus};
pub use domain::session::{FocusSession, TickTransition};
pub use infrastructure::error::CoreError;
pub use infrastructure::notifier::{FocusNotification, Notifier};
pub use infrastructure::task_store_client::{TaskStatusUpdate, TaskStoreClient};
