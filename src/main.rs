use std::{env, sync::Arc};

use clap::{Parser, Subcommand};
use colored::*;
use slug::slugify;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use taskboard_sync::{
    SessionUser, SyncCore, SyncError,
    auth::{AuthTokenSource, EnvTokenSource, FileTokenSource},
    config::{ConfigError, load_user_config},
    models::{NewProject, Project, ProjectFields, ProjectOrder, Role, TaskFields},
    remote::{RemoteError, http::HttpRemoteStore},
    session::Session,
    sync::reorder::ReorderOutcome,
};

mod ui;

const TOKEN_VAR: &str = "TASKBOARD_TOKEN";

#[derive(Parser)]
#[command(name = "tbs", about = "Keep your project boards in sync from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List your projects, pinned first
    Projects,

    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommands),

    /// Show the columns and tasks of a project
    Board {
        /// Project url or name
        project: String,

        /// Also list the members
        #[arg(short, long)]
        members: bool,
    },

    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommands),

    /// Manage board columns
    #[command(subcommand)]
    Column(ColumnCommands),

    /// Manage project members
    #[command(subcommand)]
    Member(MemberCommands),

    /// Look at or accept invitations
    #[command(subcommand)]
    Invite(InviteCommands),
}

#[derive(Debug, Subcommand)]
enum ProjectCommands {
    /// Create a new project
    New {
        name: String,

        /// Short code used for task ids (e.g. LAUN)
        #[arg(short, long)]
        key: String,

        #[arg(short, long)]
        description: Option<String>,

        /// Project type (e.g. "marketing", "software")
        #[arg(long = "type")]
        project_type: Option<String>,

        /// Invite someone by email (can be used multiple times)
        #[arg(short, long, action = clap::ArgAction::Append)]
        invite: Vec<String>,
    },
    /// Rename or re-key a project
    Edit {
        project: String,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        key: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Delete a project
    Delete { project: String },
    /// Pin or unpin a project
    Pin { project: String },
    /// Set the order of unpinned projects, first to last
    Reorder {
        #[arg(required = true)]
        projects: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
enum TaskCommands {
    /// Add a task to a column
    Add {
        project: String,
        column: String,
        name: String,
        #[arg(short, long)]
        notes: Option<String>,
    },
    /// Change a task
    Edit {
        project: String,
        task_id: String,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short = 'N', long)]
        notes: Option<String>,
        #[arg(short, long)]
        status: Option<String>,
        /// Move the task to another column
        #[arg(short, long)]
        column: Option<String>,
    },
    /// Delete a task
    Delete { project: String, task_id: String },
}

#[derive(Debug, Subcommand)]
enum ColumnCommands {
    /// Rename a column
    Rename {
        project: String,
        column: String,
        title: String,
    },
    /// Delete a column and all of its tasks
    Delete { project: String, column: String },
}

#[derive(Debug, Subcommand)]
enum MemberCommands {
    /// Remove a member from a project
    Remove { project: String, user_id: String },
    /// Change a member's role (owner, editor, user)
    Role {
        project: String,
        user_id: String,
        role: Role,
    },
}

#[derive(Debug, Subcommand)]
enum InviteCommands {
    /// Show who invited you and where
    Show { token: String },
    /// Join the project of an invitation
    Accept { token: String },
}

#[derive(Error, Debug)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cannot reach {0}: {1}")]
    Remote(String, RemoteError),

    #[error("No user configured; set user_id in the config file or TASKBOARD_USER")]
    NoUser,

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Column '{0}' not found in this project")]
    ColumnNotFound(String),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TBS_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "taskboard_sync=debug,info"
        } else {
            "taskboard_sync=info,warn"
        })
    });

    let format = env::var("TBS_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        if let AppError::Sync(SyncError::AuthRequired) = e {
            eprintln!("\nSign in with the identity provider helper, or set {TOKEN_VAR}.");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = load_user_config()?;
    let user_id = config.user_id.clone().ok_or(AppError::NoUser)?;

    let tokens: Arc<dyn AuthTokenSource> = if env::var_os(TOKEN_VAR).is_some() {
        Arc::new(EnvTokenSource::new(TOKEN_VAR))
    } else {
        Arc::new(FileTokenSource::new(config.token_file.clone()))
    };
    let remote = HttpRemoteStore::new(&config.api_url, config.request_timeout())
        .map_err(|e| AppError::Remote(config.api_url.clone(), e))?;

    let mut core = SyncCore::new(Arc::new(remote), tokens);
    let session = core.init(SessionUser::new(user_id));

    match cli.command {
        Commands::Projects => {
            session.load_projects().await?;
            let projects = session.projects().ordered();
            if projects.is_empty() {
                println!("No projects yet");
            } else {
                ui::render_view_header("Projects", projects.len(), "project");
                let pinned = projects.iter().filter(|p| p.is_pinned).count();
                for (index, project) in projects.iter().enumerate() {
                    if index == pinned && pinned > 0 {
                        println!();
                    }
                    ui::render_project_line(project);
                }
            }
        }
        Commands::Project(command) => run_project(session, command).await?,
        Commands::Board { project, members } => {
            let project = open(session, &project).await?;
            let Some(detail) = session.detail().current() else {
                return Err(SyncError::ProjectNotFound(project.url).into());
            };
            ui::render_board(&detail);
            if members {
                ui::render_members(&detail.members);
            }
        }
        Commands::Task(command) => run_task(session, command).await?,
        Commands::Column(command) => run_column(session, command).await?,
        Commands::Member(command) => run_member(session, command).await?,
        Commands::Invite(InviteCommands::Show { token }) => {
            let invitation = session.view_invitation(&token).await?;
            ui::render_invitation(&invitation);
        }
        Commands::Invite(InviteCommands::Accept { token }) => {
            let invitation = session.accept_invitation(&token).await?;
            println!(
                "✓ Joined {}",
                invitation
                    .project_url
                    .as_deref()
                    .unwrap_or(&invitation.project_id)
            );
        }
    }

    core.teardown();
    Ok(())
}

/// Finds a project by url, by a name that slugifies to its url, or by name.
fn resolve_project(session: &Session, query: &str) -> Result<Project, SyncError> {
    let projects = session.projects();
    if let Some(project) = projects.get(query) {
        return Ok(project);
    }
    if let Some(project) = projects.get(&slugify(query)) {
        return Ok(project);
    }
    projects
        .snapshot()
        .into_iter()
        .find(|p| p.name.eq_ignore_ascii_case(query))
        .ok_or_else(|| SyncError::ProjectNotFound(query.to_string()))
}

/// Loads the project list and opens `query`.
async fn open(session: &Session, query: &str) -> Result<Project, AppError> {
    session.load_projects().await?;
    let project = resolve_project(session, query).inspect_err(|_| {
        let names: Vec<String> = session.projects().ordered().into_iter().map(|p| p.name).collect();
        if !names.is_empty() {
            eprintln!("Available projects:");
            for name in names {
                eprintln!("  - {}", name);
            }
            eprintln!();
        }
    })?;
    session.open_project(&project.url).await?;
    Ok(project)
}

/// Matches a column by id or, case-insensitively, by title.
fn resolve_column(session: &Session, query: &str) -> Result<String, AppError> {
    let detail = session
        .detail()
        .current()
        .ok_or(SyncError::NoActiveProject)?;
    detail
        .boards
        .iter()
        .find(|b| b.id == query || b.title.eq_ignore_ascii_case(query))
        .map(|b| b.id.clone())
        .ok_or_else(|| AppError::ColumnNotFound(query.to_string()))
}

async fn run_project(session: &Session, command: ProjectCommands) -> Result<(), AppError> {
    match command {
        ProjectCommands::New {
            name,
            key,
            description,
            project_type,
            invite,
        } => {
            session.load_projects().await?;
            let payload = NewProject {
                name,
                key,
                description,
                project_type,
                invite_emails: invite,
                ..NewProject::default()
            };
            let project = session.create_project(payload).await?;
            println!("✓ Project {} created with url {}", project.name, project.url);
        }
        ProjectCommands::Edit {
            project,
            name,
            key,
            description,
        } => {
            session.load_projects().await?;
            let project = resolve_project(session, &project)?;
            let fields = ProjectFields {
                name,
                key,
                description,
            };
            if fields.is_empty() {
                println!("Nothing to change");
                return Ok(());
            }
            let updated = session.update_project(&project.url, fields).await?;
            println!("✓ Project updated: {}", updated.name);
        }
        ProjectCommands::Delete { project } => {
            session.load_projects().await?;
            let project = resolve_project(session, &project)?;
            let removed = session.delete_project(&project.url).await?;
            println!("✓ Project deleted: {}", removed.name);
        }
        ProjectCommands::Pin { project } => {
            session.load_projects().await?;
            let project = resolve_project(session, &project)?;
            let toggled = session.reorder().toggle_pin(&project.url).await?;
            if toggled.is_pinned {
                println!("✓ Pinned {}", toggled.name);
            } else {
                println!("✓ Unpinned {}", toggled.name);
            }
        }
        ProjectCommands::Reorder { projects } => {
            session.load_projects().await?;
            let mut orders = Vec::with_capacity(projects.len());
            for (position, query) in projects.iter().enumerate() {
                let project = resolve_project(session, query)?;
                if project.is_pinned {
                    eprintln!("{} {} is pinned, skipping", "!".yellow(), project.name);
                    continue;
                }
                orders.push(ProjectOrder::new(project.url, position as i64));
            }
            match session.reorder().reorder(orders).await? {
                ReorderOutcome::Applied => println!("✓ Project order saved"),
                ReorderOutcome::Superseded => println!("Order replaced by a newer request"),
            }
        }
    }
    Ok(())
}

async fn run_task(session: &Session, command: TaskCommands) -> Result<(), AppError> {
    match command {
        TaskCommands::Add {
            project,
            column,
            name,
            notes,
        } => {
            open(session, &project).await?;
            let column = resolve_column(session, &column)?;
            let provisional = session.mutator().add_task(&column, &name, notes)?;
            match provisional.confirmed().await? {
                Some(task) => {
                    println!("✓ Task added: {}", task.name);
                    println!("  {}", task.id);
                }
                None => println!("Task was removed before it was saved"),
            }
        }
        TaskCommands::Edit {
            project,
            task_id,
            name,
            notes,
            status,
            column,
        } => {
            open(session, &project).await?;
            let board_id = match column {
                Some(column) => Some(resolve_column(session, &column)?),
                None => None,
            };
            let fields = TaskFields {
                name,
                notes,
                status,
                board_id,
            };
            let task = session.mutator().edit_task(&task_id, fields).await?;
            println!("✓ Task updated: {}", task.name);
        }
        TaskCommands::Delete { project, task_id } => {
            open(session, &project).await?;
            session.mutator().delete_task(&task_id).await?;
            println!("✓ Task deleted: {}", task_id);
        }
    }
    Ok(())
}

async fn run_column(session: &Session, command: ColumnCommands) -> Result<(), AppError> {
    match command {
        ColumnCommands::Rename {
            project,
            column,
            title,
        } => {
            open(session, &project).await?;
            let column = resolve_column(session, &column)?;
            let board = session
                .mutator()
                .update_board(&column, Some(title), None)
                .await?;
            println!("✓ Column renamed: {}", board.title);
        }
        ColumnCommands::Delete { project, column } => {
            open(session, &project).await?;
            let column = resolve_column(session, &column)?;
            let removed = session
                .detail()
                .current()
                .map(|d| d.tasks_in(&column).count())
                .unwrap_or_default();
            session.mutator().delete_board(&column).await?;
            println!("✓ Column deleted: {}", column);
            if removed > 0 {
                println!("  └─ {} task(s) also deleted", removed);
            }
        }
    }
    Ok(())
}

async fn run_member(session: &Session, command: MemberCommands) -> Result<(), AppError> {
    match command {
        MemberCommands::Remove { project, user_id } => {
            open(session, &project).await?;
            session.mutator().remove_member(&user_id).await?;
            println!("✓ Member removed: {}", user_id);
        }
        MemberCommands::Role {
            project,
            user_id,
            role,
        } => {
            open(session, &project).await?;
            session.mutator().update_member_role(&user_id, role).await?;
            println!("✓ {} is now {}", user_id, role);
            if role == Role::Owner {
                println!("  └─ you are now an editor of this project");
            }
        }
    }
    Ok(())
}
