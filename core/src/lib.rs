pub mod app;
pub mod config;
pub mod error;
pub mod model;
pub mod pagination;
pub mod service;
pub mod storage;
pub mod time;
pub mod validation;

pub use app::Taskflow;
pub use config::{Config, RemoteConfig};
pub use error::{Result, TaskflowError};
pub use model::{CreateTaskData, PaginationInfo, Task, TaskFilters, TaskPage, TaskStatus, UpdateTaskData, User};
pub use pagination::TASKS_PER_PAGE;
pub use service::{AuthService, Session, TaskService};
pub use storage::{AuthBackend, BackendKind, TaskBackend};
pub use time::parse_due_date;
