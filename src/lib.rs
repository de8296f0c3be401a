//! Client core for SwampScheduler: the Pomodoro session timer, the award
//! notification queue and optimistic task completion against the REST API.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::boards::BoardService;
pub use application::commands::AppState;
pub use application::notifications::{NotificationQueue, NotificationSink, run_display};
pub use application::pomodoro::{PomodoroService, SessionOutcome};
pub use application::store::{Action, AppSnapshot, AppStore};
pub use application::tasks::{TaskService, ToggleOutcome};
pub use domain::models::{NotificationEvent, Task, TaskDraft, XpState};
pub use domain::pomodoro::{PomodoroSnapshot, PomodoroTimer, RunState};
pub use infrastructure::error::{ErrorKind, InfraError};
