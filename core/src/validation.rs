//! Input rules a caller applies before handing data to the services.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, TaskflowError};
use crate::model::{CreateTaskData, UpdateTaskData};

pub const TITLE_MIN_CHARS: usize = 3;
pub const TITLE_MAX_CHARS: usize = 100;
pub const DESCRIPTION_MAX_CHARS: usize = 500;
pub const PASSWORD_MIN_CHARS: usize = 6;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}$").expect("static email pattern")
});

pub fn validate_title(title: &str) -> Result<()> {
    let len = title.trim().chars().count();
    if len < TITLE_MIN_CHARS {
        return Err(TaskflowError::validation(format!(
            "title must be at least {} characters",
            TITLE_MIN_CHARS
        )));
    }
    if len > TITLE_MAX_CHARS {
        return Err(TaskflowError::validation(format!(
            "title must be at most {} characters",
            TITLE_MAX_CHARS
        )));
    }
    Ok(())
}

pub fn validate_description(description: &str) -> Result<()> {
    if description.chars().count() > DESCRIPTION_MAX_CHARS {
        return Err(TaskflowError::validation(format!(
            "description must be at most {} characters",
            DESCRIPTION_MAX_CHARS
        )));
    }
    Ok(())
}

pub fn validate_new_task(data: &CreateTaskData) -> Result<()> {
    validate_title(&data.title)?;
    validate_description(&data.description)
}

pub fn validate_update(update: &UpdateTaskData) -> Result<()> {
    if update.id.is_empty() {
        return Err(TaskflowError::validation("task id is required"));
    }
    if update.is_empty() {
        return Err(TaskflowError::validation("nothing to update"));
    }
    if let Some(title) = &update.title {
        validate_title(title)?;
    }
    if let Some(description) = &update.description {
        validate_description(description)?;
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<()> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(TaskflowError::validation("please enter a valid email address"))
    }
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < PASSWORD_MIN_CHARS {
        return Err(TaskflowError::validation(format!(
            "password must be at least {} characters",
            PASSWORD_MIN_CHARS
        )));
    }
    Ok(())
}
