use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tracboard::config::TracboardConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "tracboard")]
#[command(version, about = "Ranked card stacks and project-scoped permissions")]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Database path. Overrides tracboard.toml and TRACBOARD_DB.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Config file. Defaults to .tracboard/tracboard.toml in the project dir.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding .tracboard/. Defaults to the current directory.
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create .tracboard/ with a default config and an empty database
    Init {
        /// Overwrite an existing tracboard.toml
        #[arg(long)]
        force: bool,
    },
    /// Serve the JSON API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
        #[arg(long)]
        host: Option<String>,
        /// Permissive CORS for a local front-end dev server
        #[arg(long)]
        dev: bool,
    },
    /// Add, move, edit and list ranked cards
    Card {
        #[command(subcommand)]
        command: CardCommands,
    },
    /// Manage projects, their flags, members and resource links
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Manage group memberships
    Group {
        #[command(subcommand)]
        command: GroupCommands,
    },
    /// Grant or revoke permission tokens such as CARDS_ADMIN
    Permission {
        #[command(subcommand)]
        command: PermissionCommands,
    },
    /// Show the scope decision for a subject and target
    Check {
        subject: String,
        /// ticket, milestone, component, version or project
        realm: String,
        /// Resource name, or a project id or name when realm is `project`
        name: String,
        /// list or access
        #[arg(long, default_value = "access")]
        action: String,
    },
    /// Show or validate the resolved configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
pub enum CardCommands {
    /// Append a card to a stack
    Add {
        stack: String,
        title: String,
        #[arg(long, default_value = "")]
        color: String,
        /// Expected stack version
        #[arg(long)]
        version: Option<i64>,
    },
    /// Move a card to a rank, optionally in another stack
    Move {
        id: i64,
        stack: String,
        rank: i64,
        /// Expected version of the destination stack
        #[arg(long)]
        version: Option<i64>,
        /// Expected version of the source stack
        #[arg(long)]
        from_version: Option<i64>,
    },
    /// Change a card's title or color
    Edit {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        version: Option<i64>,
    },
    Delete {
        id: i64,
        #[arg(long)]
        version: Option<i64>,
    },
    /// Cards of the given stacks in rank order
    List {
        #[arg(required = true)]
        stacks: Vec<String>,
    },
    /// Current versions of the given stacks
    Stacks {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum ProjectCommands {
    Add {
        name: String,
        #[arg(long, default_value = "")]
        summary: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        restricted: bool,
        #[arg(long)]
        closed: bool,
        #[arg(long)]
        invert_members: bool,
    },
    /// All projects, or only those visible to --subject
    List {
        #[arg(long)]
        subject: Option<String>,
    },
    /// Change visibility flags
    Flags {
        /// Project id or name
        project: String,
        #[arg(long)]
        closed: Option<bool>,
        #[arg(long)]
        restricted: Option<bool>,
        #[arg(long)]
        invert_members: Option<bool>,
    },
    /// Make a subject or group a member
    Grant { project: String, subject: String },
    Revoke { project: String, subject: String },
    /// Associate a resource with the project
    Link {
        project: String,
        realm: String,
        name: String,
    },
    Unlink {
        project: String,
        realm: String,
        name: String,
    },
    Delete { project: String },
}

#[derive(Subcommand)]
pub enum GroupCommands {
    /// Make `subject` a member of `group`
    Add { subject: String, group: String },
    Remove { subject: String, group: String },
    /// Every identity `subject` acts as
    Show { subject: String },
}

#[derive(Subcommand)]
pub enum PermissionCommands {
    Grant { subject: String, action: String },
    Revoke { subject: String, action: String },
    List,
}

#[derive(Subcommand, Clone, Copy)]
pub enum ConfigCommands {
    Show,
    Validate,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let mut config = TracboardConfig::resolve(&project_dir, cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }

    match cli.command {
        Commands::Init { force } => cmd::cmd_init(&project_dir, &config, force)?,
        Commands::Serve { port, host, dev } => cmd::cmd_serve(&config, port, host, dev).await?,
        Commands::Card { command } => cmd::cmd_card(&config, command)?,
        Commands::Project { command } => cmd::cmd_project(&config, command)?,
        Commands::Group { command } => cmd::cmd_group(&config, command)?,
        Commands::Permission { command } => cmd::cmd_permission(&config, command)?,
        Commands::Check {
            subject,
            realm,
            name,
            action,
        } => cmd::cmd_check(&config, &subject, &realm, &name, &action)?,
        Commands::Config { command } => cmd::cmd_config(&config, command)?,
    }

    Ok(())
}
