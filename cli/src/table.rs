use chrono::Local;
use tabled::settings::object::Rows;
use tabled::settings::{Color, Modify, Style};
use tabled::{Table, Tabled};
use taskflow_core::{Task, TaskPage};

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Due")]
    due: String,
    #[tabled(rename = "Description")]
    description: String,
}

const DESCRIPTION_WIDTH: usize = 40;

impl From<&Task> for TaskRow {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            status: task.status.to_string(),
            due: task.due_date.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
            description: truncate(&task.description, DESCRIPTION_WIDTH),
        }
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

pub fn render_page(page: &TaskPage) -> String {
    let info = &page.pagination;
    let footer = format!(
        "Page {} of {} ({} tasks)",
        info.current_page,
        info.total_pages.max(1),
        info.total_tasks
    );

    if page.tasks.is_empty() {
        return format!("No tasks found.\n{}", footer);
    }

    let rows: Vec<TaskRow> = page.tasks.iter().map(TaskRow::from).collect();
    let mut table = Table::new(rows);
    table
        .with(Style::modern())
        .with(Modify::new(Rows::first()).with(Color::FG_CYAN));

    let mut out = format!("{}\n{}", table, footer);
    if info.has_prev_page {
        out.push_str(&format!("  prev: --page {}", info.current_page - 1));
    }
    if info.has_next_page {
        out.push_str(&format!("  next: --page {}", info.current_page + 1));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use taskflow_core::{PaginationInfo, TaskStatus};

    fn task(id: &str) -> Task {
        let now = Utc::now();
        Task {
            id: id.to_string(),
            title: "Renew passport".to_string(),
            description: "x".repeat(60),
            status: TaskStatus::InProgress,
            due_date: now,
            created_at: now,
            updated_at: now,
            user_id: "u1".to_string(),
        }
    }

    #[test]
    fn test_render_page_lists_rows_and_footer() {
        let page = TaskPage {
            tasks: vec![task("a1"), task("b2")],
            pagination: PaginationInfo::new(1, 7, 6),
        };
        let out = render_page(&page);
        assert!(out.contains("Renew passport"));
        assert!(out.contains("in-progress"));
        assert!(out.contains("Page 1 of 2 (7 tasks)"));
        assert!(out.contains("next: --page 2"));
        assert!(!out.contains("prev:"));
    }

    #[test]
    fn test_render_empty_page() {
        let page = TaskPage {
            tasks: Vec::new(),
            pagination: PaginationInfo::new(1, 0, 6),
        };
        assert_eq!(render_page(&page), "No tasks found.\nPage 1 of 1 (0 tasks)");
    }

    #[test]
    fn test_truncate_long_descriptions() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijk", 5).chars().count(), 5);
    }
}
