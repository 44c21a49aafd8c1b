pub mod page;
pub mod task;
pub mod user;

pub use page::{PaginationInfo, TaskPage};
pub use task::{CreateTaskData, Task, TaskFilters, TaskStatus, UpdateTaskData};
pub use user::User;
