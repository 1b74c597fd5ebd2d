//! # ragdesk CLI
//!
//! ## Usage
//!
//! ```bash
//! ragdesk --config ./config/ragdesk.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragdesk init` | Create the SQLite database and run schema migrations |
//! | `ragdesk serve` | Start the HTTP server |
//! | `ragdesk ingest <file>` | Chunk, embed and store a text file (`-` for stdin) |
//! | `ragdesk ask "<question>"` | Answer a question from stored context |
//! | `ragdesk user add <name>` | Register an account |
//! | `ragdesk user roles <name> <role>...` | Replace an account's roles |
//! | `ragdesk stats` | Show record and user counts |

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;

use ragdesk::app::{AdminServices, AppServices};
use ragdesk::auth::RoleList;
use ragdesk::store::VectorStore;
use ragdesk::{config, logging, migrate, server};

/// ragdesk: grounded question answering over your own text.
#[derive(Parser)]
#[command(name = "ragdesk", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragdesk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Chunk, embed and store the contents of a text file.
    Ingest {
        /// File to read, or `-` for standard input.
        path: PathBuf,
    },

    /// Answer a question using the stored context.
    Ask {
        question: String,

        /// Also print the chunks that were given to the model.
        #[arg(long)]
        show_context: bool,
    },

    /// Manage accounts.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Show record and user counts.
    Stats,
}

#[derive(Subcommand)]
enum UserAction {
    /// Register an account with the default `user` role.
    Add {
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Replace an account's roles.
    Roles {
        username: String,
        #[arg(required = true)]
        roles: Vec<String>,
    },
}

fn read_input(path: &PathBuf) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest { path } => {
            let text = read_input(&path)?;
            let services = AppServices::from_config(&cfg).await?;
            let added = services.retriever.ingest(&text).await?;
            println!("ok: {} chunks added", added);
        }
        Commands::Ask {
            question,
            show_context,
        } => {
            let services = AppServices::from_config(&cfg).await?;
            let answer = services.answerer.answer(&question).await?;
            if show_context {
                for (i, chunk) in answer.context_used.iter().enumerate() {
                    println!("--- context {} ---\n{}\n", i + 1, chunk);
                }
            }
            println!("{}", answer.answer);
        }
        Commands::User { action } => {
            let admin = AdminServices::from_config(&cfg).await?;
            match action {
                UserAction::Add { username, password } => {
                    let user = admin
                        .users
                        .register(&username, &password, &password)
                        .await?;
                    println!("user {} added with roles {:?}", user.username, user.roles);
                }
                UserAction::Roles { username, roles } => {
                    let roles = RoleList::parse(&roles)?;
                    let roles = admin.users.update_roles(&username, roles).await?;
                    println!("user {} now has roles {:?}", username, roles);
                }
            }
        }
        Commands::Stats => {
            let admin = AdminServices::from_config(&cfg).await?;
            let records = admin.store.count().await?;
            let users = admin.users.count().await?;
            println!("records: {}", records);
            println!("users:   {}", users);
        }
    }

    Ok(())
}
