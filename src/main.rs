use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pipeport::api::{self, AppState};
use pipeport::config::Config;
use pipeport::import::{Format, ImportRequest};
use pipeport::models::{CreateProjectInput, Locale};

#[derive(Parser)]
#[command(name = "pipeport")]
#[command(about = "Validate and import application descriptors into CI/CD projects")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port for HTTP API (defaults to PIPEPORT_PORT, then 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Import an application descriptor file into a project
    Import {
        /// Project key
        project: String,
        /// Descriptor file
        file: PathBuf,
        /// json, yaml or hcl (guessed from the file extension by default)
        #[arg(short, long)]
        format: Option<String>,
        /// Import even if the application already exists
        #[arg(long)]
        force_update: bool,
        /// Language of the reported messages
        #[arg(short, long)]
        lang: Option<String>,
    },
    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },
    /// Manage project environments
    Env {
        #[command(subcommand)]
        command: CatalogCommand,
    },
    /// Manage project pipelines
    Pipeline {
        #[command(subcommand)]
        command: CatalogCommand,
    },
    /// Manage permission groups
    Group {
        #[command(subcommand)]
        command: GroupCommand,
    },
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// Create a project
    Create {
        key: String,
        /// Display name (defaults to the key)
        #[arg(short, long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum CatalogCommand {
    /// Add an entry to a project
    Add { project: String, name: String },
}

#[derive(Subcommand)]
enum GroupCommand {
    /// Create a group
    Add { name: String },
}

/// Initialize tracing with output to stderr (for one-shot commands) or stdout
fn init_tracing(use_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "pipeport=debug,tower_http=debug".into()),
    );

    if use_stderr {
        // Keep stdout for command output
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn serve(config: &Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Starting pipeport server on port {}", port);

    let db = config.open_database()?;
    let state = AppState {
        importer: Arc::new(config.importer(db.clone())),
        db,
        default_locale: config.locale,
    };
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("pipeport server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let use_stderr = !matches!(cli.command, None | Some(Commands::Serve { .. }));
    init_tracing(use_stderr);

    let config = Config::from_env();

    match cli.command {
        Some(Commands::Serve { port }) => {
            serve(&config, port.unwrap_or(config.port)).await?;
        }
        Some(Commands::Import {
            project,
            file,
            format,
            force_update,
            lang,
        }) => {
            let format = match format {
                Some(format) => format,
                None => Format::from_path(&file)
                    .unwrap_or(Format::Yaml)
                    .as_str()
                    .to_string(),
            };
            let locale = match lang {
                Some(lang) => Locale::from_str(&lang)
                    .ok_or_else(|| anyhow::anyhow!("Unsupported language: {}", lang))?,
                None => config.locale,
            };
            let body = std::fs::read(&file)
                .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", file.display(), e))?;

            let db = config.open_database()?;
            let outcome = config
                .importer(db)
                .import(ImportRequest {
                    project_key: project,
                    body,
                    format,
                    force_update,
                    locale,
                })
                .await;

            for message in &outcome.messages {
                println!("{}", message);
            }
            for warning in &outcome.warnings {
                println!("warning: {}", warning.message);
            }
            if let Some(error) = outcome.error {
                anyhow::bail!("import {:?}: {:#}", outcome.status, error);
            }
        }
        Some(Commands::Project {
            command: ProjectCommand::Create { key, name },
        }) => {
            let db = config.open_database()?;
            let project = db.create_project(CreateProjectInput {
                name: name.unwrap_or_else(|| key.clone()),
                key,
            })?;
            println!("Created project {} ({})", project.key, project.id);
        }
        Some(Commands::Env {
            command: CatalogCommand::Add { project, name },
        }) => {
            let db = config.open_database()?;
            let env = db.create_environment(&project, &name)?;
            println!("Added environment {} to {}", env.name, project);
        }
        Some(Commands::Pipeline {
            command: CatalogCommand::Add { project, name },
        }) => {
            let db = config.open_database()?;
            let pipeline = db.create_pipeline(&project, &name)?;
            println!("Added pipeline {} to {}", pipeline.name, project);
        }
        Some(Commands::Group {
            command: GroupCommand::Add { name },
        }) => {
            let db = config.open_database()?;
            let group = db.create_group(&name)?;
            println!("Created group {}", group.name);
        }
        None => {
            // Default: start server
            serve(&config, config.port).await?;
        }
    }

    Ok(())
}
