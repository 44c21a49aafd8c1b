use serde::{Deserialize, Serialize};

use crate::model::task::Task;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_tasks: u64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl PaginationInfo {
    pub fn new(page: u32, total_tasks: u64, page_size: u32) -> Self {
        let total_pages = total_tasks.div_ceil(page_size as u64) as u32;
        Self {
            current_page: page,
            total_pages,
            total_tasks,
            has_next_page: page < total_pages,
            has_prev_page: page > 1,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub pagination: PaginationInfo,
}
