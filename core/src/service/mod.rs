pub mod auth_service;
pub mod task_service;


pub use auth_service::{AuthService, Session};
pub use task_service::TaskService;
