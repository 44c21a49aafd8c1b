//! Filtering and page slicing shared by every backend that lists tasks
//! in-process.

use crate::model::{PaginationInfo, Task, TaskFilters, TaskPage};

pub const TASKS_PER_PAGE: u32 = 6;

/// Pages are 1-based; anything lower is treated as the first page.
pub fn normalize_page(page: u32) -> u32 {
    page.max(1)
}

/// Offset of the first task on `page`; saturates rather than overflowing.
pub fn page_offset(page: u32) -> usize {
    (normalize_page(page) as usize - 1).saturating_mul(TASKS_PER_PAGE as usize)
}

/// Filters `tasks`, orders them newest-first by `created_at` and returns
/// the requested slice. A page past the end is empty, not an error.
pub fn paginate(tasks: Vec<Task>, filters: &TaskFilters, page: u32) -> TaskPage {
    let page = normalize_page(page);
    let mut matching: Vec<Task> = tasks.into_iter().filter(|t| filters.matches(t)).collect();
    matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let pagination = PaginationInfo::new(page, matching.len() as u64, TASKS_PER_PAGE);
    let tasks = matching
        .into_iter()
        .skip(page_offset(page))
        .take(TASKS_PER_PAGE as usize)
        .collect();

    TaskPage { tasks, pagination }
}
