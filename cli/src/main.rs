mod logging;
mod table;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use taskflow_core::validation::{
    validate_email, validate_new_task, validate_password, validate_update,
};
use taskflow_core::{
    parse_due_date, BackendKind, Config, CreateTaskData, Session, TaskFilters, TaskStatus,
    Taskflow, UpdateTaskData,
};

#[derive(Parser)]
#[command(name = "taskflow")]
#[command(about = "Personal task tracker with a remote store and an on-device fallback", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.taskflow/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Create an account and sign in
    Signup {
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign in to an existing account
    Login {
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Add a task (due accepts today, tomorrow, +3d, +2w, YYYY-MM-DD or RFC 3339)
    Add {
        title: String,
        #[arg(long, short = 'd', default_value = "")]
        description: String,
        #[arg(long, short = 's', default_value = "pending", value_parser = parse_status)]
        status: TaskStatus,
        #[arg(long, value_parser = parse_due)]
        due: DateTime<Utc>,
    },
    /// List tasks, newest first
    List {
        #[arg(long, short = 's', value_parser = parse_status)]
        status: Option<TaskStatus>,
        /// Only tasks due at or after this date
        #[arg(long, value_parser = parse_due)]
        from: Option<DateTime<Utc>>,
        /// Only tasks due at or before this date
        #[arg(long, value_parser = parse_due)]
        to: Option<DateTime<Utc>>,
        #[arg(long, short = 'p', default_value_t = 1)]
        page: u32,
    },
    /// Change fields of a task
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, short = 'd')]
        description: Option<String>,
        #[arg(long, short = 's', value_parser = parse_status)]
        status: Option<TaskStatus>,
        #[arg(long, value_parser = parse_due)]
        due: Option<DateTime<Utc>>,
    },
    /// Mark a task completed
    Done { id: String },
    /// Delete a task
    Delete { id: String },
}

fn parse_status(raw: &str) -> std::result::Result<TaskStatus, String> {
    raw.parse().map_err(|e: taskflow_core::TaskflowError| e.to_string())
}

fn parse_due(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    parse_due_date(raw).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    logging::init(&config.log_level);

    let app = Taskflow::open(&config)?;

    match cli.command {
        Commands::Signup { email, password } => {
            validate_email(&email)?;
            validate_password(&password)?;
            let session = app.auth.signup(email.trim(), &password).await?;
            println!("Signed up as {} <{}>", session.user.display_name(), session.user.email);
            notice_for_session(&session);
        }
        Commands::Login { email, password } => {
            validate_email(&email)?;
            let session = app.auth.login(email.trim(), &password).await?;
            println!("Welcome back, {}", session.user.display_name());
            notice_for_session(&session);
        }
        Commands::Logout => {
            app.auth.restore_session().await?;
            app.auth.logout().await?;
            println!("Signed out.");
        }
        Commands::Whoami => match app.auth.restore_session().await? {
            Some(session) => {
                println!("{} <{}>", session.user.display_name(), session.user.email);
                println!("uid: {}", session.user.uid);
                println!("data: {}", app.data_dir.display());
                notice_for_session(&session);
            }
            None => println!("Not signed in."),
        },
        Commands::Add {
            title,
            description,
            status,
            due,
        } => {
            let session = require_session(&app).await?;
            let data = CreateTaskData {
                title: title.trim().to_string(),
                description: description.trim().to_string(),
                status,
                due_date: due,
            };
            validate_new_task(&data)?;
            let id = app.tasks.create_task(&data, &session.user.uid).await?;
            println!("Created task {}", id);
            notice_for_tasks(&app);
        }
        Commands::List {
            status,
            from,
            to,
            page,
        } => {
            let session = require_session(&app).await?;
            let filters = TaskFilters {
                status,
                due_date_start: from,
                due_date_end: to,
            };
            let result = app.tasks.list_tasks(&session.user.uid, &filters, page).await?;
            println!("{}", table::render_page(&result));
            notice_for_tasks(&app);
        }
        Commands::Update {
            id,
            title,
            description,
            status,
            due,
        } => {
            require_session(&app).await?;
            let update = UpdateTaskData {
                id,
                title: title.map(|t| t.trim().to_string()),
                description: description.map(|d| d.trim().to_string()),
                status,
                due_date: due,
            };
            if update.is_empty() {
                bail!("nothing to update; pass at least one of --title, --description, --status, --due");
            }
            validate_update(&update)?;
            app.tasks.update_task(&update).await?;
            println!("Updated task {}", update.id);
            notice_for_tasks(&app);
        }
        Commands::Done { id } => {
            require_session(&app).await?;
            let update = UpdateTaskData::new(id).with_status(TaskStatus::Completed);
            app.tasks.update_task(&update).await?;
            println!("Completed task {}", update.id);
            notice_for_tasks(&app);
        }
        Commands::Delete { id } => {
            require_session(&app).await?;
            app.tasks.delete_task(&id).await?;
            println!("Deleted task {}", id);
            notice_for_tasks(&app);
        }
    }

    Ok(())
}

async fn require_session(app: &Taskflow) -> Result<Session> {
    match app.auth.restore_session().await? {
        Some(session) => Ok(session),
        None => bail!("not signed in; run `taskflow login <email> --password <password>` first"),
    }
}

fn notice_for_session(session: &Session) {
    if session.backend == BackendKind::Local {
        eprintln!("Note: signed in on this device only; the remote service is unavailable.");
    }
}

fn notice_for_tasks(app: &Taskflow) {
    if app.tasks.mode() == BackendKind::Local || app.auth.is_using_local() {
        eprintln!("Note: tasks are being kept on this device only.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_list_flags_parse() {
        let cli = Cli::try_parse_from([
            "taskflow", "list", "--status", "in-progress", "--from", "2030-01-01", "--page", "2",
        ])
        .unwrap();
        match cli.command {
            Commands::List {
                status, from, to, page,
            } => {
                assert_eq!(status, Some(TaskStatus::InProgress));
                assert!(from.is_some());
                assert!(to.is_none());
                assert_eq!(page, 2);
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn test_bad_status_is_rejected_by_the_parser() {
        let parsed = Cli::try_parse_from(["taskflow", "add", "Pay rent", "--due", "tomorrow", "--status", "done"]);
        assert!(parsed.is_err());
    }
}
