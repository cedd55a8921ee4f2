use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autoenv::app::{App, Deps};
use autoenv::config::{self, Config};
use autoenv::db::{Database, ProjectRepo, SessionRepo, SettingsRepo, StoreKind};
use autoenv::env::DotenvLoader;
use autoenv::github::GhSecretSyncer;
use autoenv::models::Project;
use autoenv::remote::{self, RemoteClient};
use autoenv::shell::{hook_script, PosixRenderer, Shell};

#[derive(Parser)]
#[command(name = "autoenv", version)]
#[command(about = "Load .env files into your shell when you enter a project, unset them when you leave")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the statements that sync this shell with the current directory
    #[command(hide = true)]
    Export {
        shell: Shell,
    },
    /// Register a directory as a project and activate its .env
    Load {
        /// Project root (default: current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// Shell syntax to print (default: from $SHELL)
        #[arg(long)]
        shell: Option<Shell>,
    },
    /// Unset everything this shell activated
    Clear {
        #[arg(long)]
        shell: Option<Shell>,
    },
    /// List registered projects
    List,
    /// Stop activating a project
    Forget {
        /// Project root (default: current directory)
        dir: Option<PathBuf>,
    },
    /// Print the shell hook, e.g. `eval "$(autoenv hook zsh)"`
    Hook {
        shell: Shell,
    },
    /// Read or change user settings
    Configure {
        #[command(subcommand)]
        command: ConfigureCommand,
    },
    /// Upload the current .env to GitHub secrets, or sync the registry replica
    Sync {
        /// Repository: github.com/owner/repo, owner/repo, or repo
        #[arg(required_unless_present = "db", conflicts_with = "db")]
        target: Option<String>,

        /// Sync the project registry with the remote database
        #[arg(long)]
        db: bool,
    },
}

#[derive(Subcommand)]
enum ConfigureCommand {
    /// Set a value (e.g. github.default_owner)
    Set { key: String, value: String },
    /// Print a value
    Get { key: String },
    /// Print all values
    List,
}

/// Initialize tracing. Always stderr: stdout is eval'd by the shell.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "autoenv=warn".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("autoenv: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // The hook runs from shell startup files; it needs no state
    if let Commands::Hook { shell } = cli.command {
        print!("{}", hook_script(shell));
        return Ok(());
    }

    let config = Config::from_env()?;
    config.ensure_dir()?;
    let stores = Stores::open(&config)?;
    dispatch(cli.command, &config, stores).await
}

async fn dispatch(command: Commands, config: &Config, stores: Stores) -> Result<()> {
    let app = stores.app(config);

    match command {
        Commands::Export { shell } => {
            let shell_id = config::shell_id()?;
            let cwd = current_dir()?;
            print!("{}", app.export(shell, shell_id, &cwd)?);
        }
        Commands::Load { path, name, shell } => {
            let shell = shell.unwrap_or_else(detect_shell);
            let shell_id = config::shell_id()?;
            let dir = match path {
                Some(path) => path,
                None => current_dir()?,
            };
            let outcome = app.load(shell, shell_id, &dir, name)?;
            eprintln!(
                "Registered {} ({})",
                outcome.project.path.display(),
                outcome.project.display_name()
            );
            print!("{}", outcome.script);
        }
        Commands::Clear { shell } => {
            let shell = shell.unwrap_or_else(detect_shell);
            let shell_id = config::shell_id()?;
            print!("{}", app.clear(shell, shell_id)?);
        }
        Commands::List => {
            let projects = app.list_projects()?;
            if projects.is_empty() {
                println!("No projects registered. Run `autoenv load` in a project directory.");
            } else {
                print!("{}", project_table(&projects));
            }
        }
        Commands::Forget { dir } => {
            let dir = match dir {
                Some(dir) => dir,
                None => current_dir()?,
            };
            if !app.forget(&dir)? {
                bail!("{} is not a registered project", dir.display());
            }
            println!("Forgot {}", dir.display());
        }
        Commands::Configure { command } => match command {
            ConfigureCommand::Set { key, value } => {
                let setting = app.set_setting(&key, &value)?;
                println!("{} = {}", setting.key, setting.value);
            }
            ConfigureCommand::Get { key } => match app.get_setting(&key)? {
                Some(value) => println!("{}", value),
                None => bail!("{} is not set", key),
            },
            ConfigureCommand::List => {
                for setting in app.list_settings()? {
                    println!("{} = {}", setting.key, setting.value);
                }
            }
        },
        Commands::Sync { db: true, .. } => {
            let client = match RemoteClient::from_config(config) {
                Some(client) if config.remote_enabled() => client,
                _ => bail!("no remote database configured; set AUTOENV_TURSO_URL"),
            };
            let report =
                remote::sync_registry(&client, &stores.projects, &stores.settings).await?;
            println!(
                "Pulled {} and pushed {} registry rows",
                report.pulled(),
                report.pushed()
            );
        }
        Commands::Sync { target, .. } => {
            let target = target.context("missing repository target")?;
            let upload = app.sync_secrets(&current_dir()?, &target)?;
            println!("Uploaded {} secrets to {}", upload.count, upload.repo);
        }
        Commands::Hook { .. } => unreachable!("hook is handled before the stores open"),
    }

    Ok(())
}

/// Local databases, opened and migrated.
struct Stores {
    projects: ProjectRepo,
    sessions: SessionRepo,
    settings: SettingsRepo,
}

impl Stores {
    fn open(config: &Config) -> Result<Self> {
        let registry = Database::open(&config.projects_db, StoreKind::Registry)?;
        registry.migrate()?;
        let sessions = Database::open(&config.sessions_db, StoreKind::Sessions)?;
        sessions.migrate()?;

        Ok(Self {
            projects: ProjectRepo::new(registry.clone()),
            settings: SettingsRepo::new(registry),
            sessions: SessionRepo::new(sessions),
        })
    }

    fn app(&self, config: &Config) -> App {
        App::new(
            Deps {
                projects: Box::new(self.projects.clone()),
                sessions: Box::new(self.sessions.clone()),
                loader: Box::new(DotenvLoader::new()),
                renderer: Box::new(PosixRenderer::new()),
                secrets: Box::new(GhSecretSyncer::new()),
                settings: Box::new(self.settings.clone()),
            },
            config.mode,
        )
    }
}

fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().context("read current directory")
}

fn detect_shell() -> Shell {
    std::env::var("SHELL")
        .ok()
        .and_then(|path| {
            Path::new(&path)
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.parse().ok())
        })
        .unwrap_or(Shell::Bash)
}

fn project_table(projects: &[Project]) -> String {
    let rows: Vec<(&str, String, String)> = projects
        .iter()
        .map(|p| {
            (
                p.display_name(),
                p.path.display().to_string(),
                p.created_at.format("%Y-%m-%d").to_string(),
            )
        })
        .collect();

    let name_width = rows.iter().map(|r| r.0.len()).max().unwrap_or(0).max(4);
    let path_width = rows.iter().map(|r| r.1.len()).max().unwrap_or(0).max(4);

    let mut out = format!(
        "{:<name_width$}  {:<path_width$}  CREATED\n",
        "NAME", "PATH"
    );
    for (name, path, created) in rows {
        out.push_str(&format!("{:<name_width$}  {:<path_width$}  {}\n", name, path, created));
    }
    out
}
