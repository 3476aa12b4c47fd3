use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use synergy::commands;
use synergy::commands::init::{DB_FILE, WORKSPACE_DIR};
use synergy::commands::project::ProjectScope;
use synergy::db::{Database, ProjectUpdate};

#[derive(Parser)]
#[command(name = "synergy")]
#[command(about = "Local-first team collaboration: projects, tasks, comments and notifications")]
#[command(version)]
struct Cli {
    /// Workspace directory holding synergy.db (defaults to the nearest .synergy)
    #[arg(long, global = true, env = "SYNERGY_DIR")]
    dir: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a workspace in the current directory
    Init {
        /// Discard an existing store and start over
        #[arg(short, long)]
        force: bool,
        /// Do not write demo data
        #[arg(long)]
        no_seed: bool,
    },

    /// Create an account and log in
    Register {
        /// Display name
        name: String,
        /// Email address
        email: String,
        #[arg(short, long, env = "SYNERGY_PASSWORD")]
        password: String,
    },

    /// Log in as an existing user
    Login {
        /// Email address
        email: String,
        #[arg(short, long, env = "SYNERGY_PASSWORD")]
        password: String,
    },

    /// Log out
    Logout,

    /// Show the logged-in user
    Whoami,

    /// List all users
    Users,

    /// Project management
    Project {
        #[command(subcommand)]
        action: ProjectCommands,
    },

    /// Task management
    Task {
        #[command(subcommand)]
        action: TaskCommands,
    },

    /// Comment on a task
    Comment {
        /// Task ID
        task: i64,
        /// Comment text
        text: String,
    },

    /// Show notifications
    Notifications {
        #[command(subcommand)]
        action: Option<NotificationCommands>,
        /// Include already-read notifications
        #[arg(short, long)]
        all: bool,
    },

    /// Emit due-soon and overdue notifications
    CheckDue,

    /// Overview of my tasks and projects
    Dashboard,

    /// My profile and per-project progress
    Profile,

    /// Search projects and tasks
    Search {
        /// Text to look for in project names, tags and task titles
        query: String,
    },

    /// Export the store
    Export {
        /// Output format (json, markdown)
        #[arg(short, long, default_value = "json")]
        format: String,
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// Create a project (you become its first member)
    Create {
        /// Project name
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Banner image URL
        #[arg(long)]
        banner: Option<String>,
        #[arg(long)]
        manager_name: Option<String>,
        #[arg(long)]
        manager_contact: Option<String>,
        /// Tag (repeatable, or comma-separated)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    /// List projects (mine by default)
    List {
        /// Every project in the workspace
        #[arg(short, long, conflicts_with = "available")]
        all: bool,
        /// Projects I have not joined
        #[arg(long)]
        available: bool,
    },
    /// Show project details
    Show {
        /// Project ID
        id: i64,
    },
    /// Update a project
    Update {
        /// Project ID
        id: i64,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        banner: Option<String>,
        #[arg(long)]
        manager_name: Option<String>,
        #[arg(long)]
        manager_contact: Option<String>,
        /// Replace the tags (repeatable, or comma-separated)
        #[arg(short, long = "tag")]
        tags: Option<Vec<String>>,
    },
    /// Delete a project with its tasks and comments
    Delete {
        /// Project ID
        id: i64,
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
    /// Join a project
    Join {
        /// Project ID
        id: i64,
    },
    /// Add a user to a project
    AddMember {
        /// Project ID
        id: i64,
        /// User ID
        user: i64,
    },
    /// Remove another user from a project
    RemoveMember {
        /// Project ID
        id: i64,
        /// User ID
        user: i64,
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Create a task in a project
    Create {
        /// Project ID
        project: i64,
        /// Task title
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Assignee user ID
        #[arg(short, long)]
        assignee: Option<i64>,
        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        due: Option<String>,
        /// Status (todo, in-progress, done)
        #[arg(short, long, default_value = "todo")]
        status: String,
        /// Priority (low, medium, high)
        #[arg(short, long)]
        priority: Option<String>,
        #[arg(short, long)]
        role: Option<String>,
        /// Tag (repeatable, or comma-separated)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    /// List tasks
    List {
        /// Only tasks of this project
        #[arg(long)]
        project: Option<i64>,
        /// Only tasks assigned to this user ID
        #[arg(short, long, conflicts_with = "mine")]
        assignee: Option<i64>,
        /// Only tasks assigned to me
        #[arg(short, long)]
        mine: bool,
        /// Filter by status (todo, in-progress, done)
        #[arg(short, long)]
        status: Option<String>,
        /// Only overdue tasks
        #[arg(long)]
        overdue: bool,
    },
    /// Show task details and comments
    Show {
        /// Task ID
        id: i64,
    },
    /// Update a task
    Update {
        /// Task ID
        id: i64,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        /// New assignee user ID
        #[arg(short, long)]
        assignee: Option<i64>,
        /// Remove the assignee
        #[arg(long)]
        unassign: bool,
        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        due: Option<String>,
        /// Remove the due date
        #[arg(long)]
        clear_due: bool,
        #[arg(short, long)]
        status: Option<String>,
        #[arg(short, long)]
        priority: Option<String>,
        #[arg(short, long)]
        role: Option<String>,
        /// Replace the tags (repeatable, or comma-separated)
        #[arg(long = "tag")]
        tags: Option<Vec<String>>,
    },
    /// Delete a task
    Delete {
        /// Task ID
        id: i64,
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum NotificationCommands {
    /// Mark a notification as read
    Read {
        /// Notification ID
        id: i64,
    },
    /// Mark all my notifications as read
    ReadAll,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env("SYNERGY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn find_workspace_dir() -> Result<PathBuf> {
    let mut current = env::current_dir()?;

    loop {
        let candidate = current.join(WORKSPACE_DIR);
        if candidate.is_dir() {
            return Ok(candidate);
        }

        if !current.pop() {
            bail!("Not a synergy workspace (or any parent). Run 'synergy init' first.");
        }
    }
}

fn get_db(dir: Option<&PathBuf>) -> Result<Database> {
    let workspace = match dir {
        Some(d) => d.clone(),
        None => find_workspace_dir()?,
    };
    let db_path = workspace.join(DB_FILE);
    if !db_path.exists() {
        bail!(
            "No store at {}. Run 'synergy init' first.",
            db_path.display()
        );
    }
    tracing::debug!(path = %db_path.display(), "opening store");
    Database::open(&db_path).context("Failed to open database")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    if let Commands::Init { force, no_seed } = cli.command {
        let cwd = env::current_dir()?;
        return commands::init::run(&cwd, force, no_seed);
    }

    let db = get_db(cli.dir.as_ref())?;

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),

        Commands::Register {
            name,
            email,
            password,
        } => commands::auth::register(&db, &name, &email, &password).map(|_| ()),

        Commands::Login { email, password } => commands::auth::login(&db, &email, &password),

        Commands::Logout => commands::auth::logout(&db),

        Commands::Whoami => commands::auth::whoami(&db),

        Commands::Users => commands::auth::list_users(&db),

        Commands::Project { action } => match action {
            ProjectCommands::Create {
                name,
                description,
                banner,
                manager_name,
                manager_contact,
                tags,
            } => commands::project::create(
                &db,
                &commands::project::CreateArgs {
                    name: &name,
                    description: &description,
                    image_banner: banner.as_deref(),
                    manager_name: manager_name.as_deref(),
                    manager_contact: manager_contact.as_deref(),
                    tags: &tags,
                },
            )
            .map(|_| ()),
            ProjectCommands::List { all, available } => {
                let scope = if all {
                    ProjectScope::All
                } else if available {
                    ProjectScope::Available
                } else {
                    ProjectScope::Mine
                };
                commands::project::list(&db, scope)
            }
            ProjectCommands::Show { id } => commands::project::show(&db, id),
            ProjectCommands::Update {
                id,
                name,
                description,
                banner,
                manager_name,
                manager_contact,
                tags,
            } => commands::project::update(
                &db,
                id,
                &ProjectUpdate {
                    name: name.as_deref(),
                    description: description.as_deref(),
                    image_banner: banner.as_deref(),
                    manager_name: manager_name.as_deref(),
                    manager_contact: manager_contact.as_deref(),
                },
                tags.as_deref(),
            ),
            ProjectCommands::Delete { id, force } => commands::project::delete(&db, id, force),
            ProjectCommands::Join { id } => commands::project::join(&db, id),
            ProjectCommands::AddMember { id, user } => commands::project::add_member(&db, id, user),
            ProjectCommands::RemoveMember { id, user, force } => {
                commands::project::remove_member(&db, id, user, force)
            }
        },

        Commands::Task { action } => match action {
            TaskCommands::Create {
                project,
                title,
                description,
                assignee,
                due,
                status,
                priority,
                role,
                tags,
            } => commands::task::create(
                &db,
                &commands::task::CreateArgs {
                    project_id: project,
                    title: &title,
                    description: &description,
                    assignee,
                    due: due.as_deref(),
                    status: &status,
                    priority: priority.as_deref(),
                    role: role.as_deref(),
                    tags: &tags,
                },
            )
            .map(|_| ()),
            TaskCommands::List {
                project,
                assignee,
                mine,
                status,
                overdue,
            } => commands::task::list(
                &db,
                &commands::task::ListArgs {
                    project_id: project,
                    assignee,
                    mine,
                    status: status.as_deref(),
                    overdue,
                },
            ),
            TaskCommands::Show { id } => commands::task::show(&db, id),
            TaskCommands::Update {
                id,
                title,
                description,
                assignee,
                unassign,
                due,
                clear_due,
                status,
                priority,
                role,
                tags,
            } => commands::task::update(
                &db,
                id,
                &commands::task::UpdateArgs {
                    title: title.as_deref(),
                    description: description.as_deref(),
                    assignee,
                    unassign,
                    due: due.as_deref(),
                    clear_due,
                    status: status.as_deref(),
                    priority: priority.as_deref(),
                    role: role.as_deref(),
                    tags: tags.as_deref(),
                },
            ),
            TaskCommands::Delete { id, force } => commands::task::delete(&db, id, force),
        },

        Commands::Comment { task, text } => commands::comment::run(&db, task, &text).map(|_| ()),

        Commands::Notifications { action, all } => match action {
            None => commands::notifications::list(&db, all),
            Some(NotificationCommands::Read { id }) => commands::notifications::mark_read(&db, id),
            Some(NotificationCommands::ReadAll) => commands::notifications::mark_all_read(&db),
        },

        Commands::CheckDue => commands::notifications::check_due(&db),

        Commands::Dashboard => commands::dashboard::run(&db),

        Commands::Profile => commands::dashboard::profile(&db),

        Commands::Search { query } => commands::search::run(&db, &query),

        Commands::Export { format, output } => match format.as_str() {
            "json" => commands::export::run_json(&db, output.as_deref()),
            "markdown" | "md" => commands::export::run_markdown(&db, output.as_deref()),
            other => bail!("Unknown export format '{}'. Use json or markdown", other),
        },
    }
}
