//! Folio CLI
//!
//! Command-line interface for Folio - folders, documents and access control.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use folio_core::{ConfidentialityLevel, Config, DocumentStatus, FolioError, PermissionLevel, Store};

mod commands;
mod output;

use commands::Caller;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Folio - hierarchical document storage with inherited access control")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Acting user
    #[arg(long, global = true, env = "FOLIO_USER")]
    user: Option<Uuid>,

    /// Department of the acting user
    #[arg(long, global = true, env = "FOLIO_DEPARTMENT")]
    department: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage folders
    Folder {
        #[command(subcommand)]
        command: FolderCommands,
    },
    /// Manage documents
    Doc {
        #[command(subcommand)]
        command: DocCommands,
    },
    /// Manage document categories
    Category {
        #[command(subcommand)]
        command: CategoryCommands,
    },
    /// Grant access to a folder or document
    Grant {
        #[command(subcommand)]
        command: GrantCommands,
    },
    /// Revoke a grant
    Revoke {
        #[command(subcommand)]
        command: RevokeCommands,
    },
    /// Check the acting user's access (exit status 1 when denied)
    Check {
        #[command(subcommand)]
        command: CheckCommands,
    },
    /// Verify paths, counts and version numbers
    CheckIntegrity {
        /// Recompute folder document counts before checking
        #[arg(long)]
        repair: bool,
    },
    /// Show repository totals
    Status,
    /// Show configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum FolderCommands {
    /// Create a folder
    #[command(alias = "add")]
    Create {
        name: String,
        /// Parent folder (UUID or path); omit for a root folder
        #[arg(short, long)]
        parent: Option<String>,
        #[arg(short, long)]
        confidentiality: Option<ConfidentialityLevel>,
        /// Department that owns the folder
        #[arg(long)]
        owning_department: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// List root folders or the children of a folder
    #[command(alias = "ls")]
    List {
        /// Folder (UUID or path)
        #[arg(short, long)]
        parent: Option<String>,
        /// Include every descendant
        #[arg(short, long)]
        recursive: bool,
    },
    /// Show a folder and its grants
    Show {
        /// Folder (UUID or path)
        folder: String,
    },
    /// Move a folder, with its subtree
    #[command(alias = "mv")]
    Move {
        /// Folder (UUID or path)
        folder: String,
        /// New parent (UUID or path); omit to move to the root
        #[arg(long)]
        to: Option<String>,
    },
    /// Rename a folder
    Rename {
        /// Folder (UUID or path)
        folder: String,
        name: String,
    },
    /// Delete an empty folder
    #[command(alias = "rm")]
    Delete {
        /// Folder (UUID or path)
        folder: String,
    },
    /// Restore a deleted folder
    Restore {
        /// Folder UUID
        id: String,
    },
}

#[derive(Subcommand)]
enum DocCommands {
    /// Upload a file as a new document
    #[command(alias = "add")]
    Upload {
        file: PathBuf,
        /// Destination folder (UUID or path)
        #[arg(short, long)]
        folder: String,
        /// Display name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
        #[arg(long)]
        mime_type: Option<String>,
        #[arg(short, long)]
        confidentiality: Option<ConfidentialityLevel>,
        #[arg(short, long)]
        tag: Vec<String>,
    },
    /// Show a document and its grants
    Show { id: String },
    /// List documents
    #[command(alias = "ls")]
    List {
        /// Folder (UUID or path)
        #[arg(short, long)]
        folder: Option<String>,
        /// Category (UUID or name)
        #[arg(long)]
        category: Option<String>,
        /// Substring of the name or original filename
        #[arg(long)]
        search: Option<String>,
        #[arg(short, long)]
        status: Option<DocumentStatus>,
        /// Required tag (repeat to require several)
        #[arg(short, long)]
        tag: Vec<String>,
        #[arg(short, long)]
        confidentiality: Option<ConfidentialityLevel>,
        /// Page size (at most 500)
        #[arg(long, default_value_t = 50)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    /// Confirm that an upload's bytes arrived
    Confirm { id: String },
    /// Mark a document active
    Activate { id: String },
    /// Archive a document
    Archive { id: String },
    /// Store a file as the next version
    Version {
        id: String,
        file: PathBuf,
        /// Change summary
        #[arg(short, long)]
        summary: Option<String>,
    },
    /// List versions
    Versions { id: String },
    /// Write the current version's bytes to a file or stdout
    #[command(alias = "get")]
    Download {
        id: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Move a document to another folder
    #[command(alias = "mv")]
    Move {
        id: String,
        /// Destination folder (UUID or path)
        #[arg(long)]
        to: String,
    },
    /// Update document metadata
    Edit {
        id: String,
        #[arg(short, long)]
        name: Option<String>,
        /// Replace all tags (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
        #[arg(short, long)]
        confidentiality: Option<ConfidentialityLevel>,
    },
    /// Delete a document, keeping its bytes in the holding area
    #[command(alias = "rm")]
    Delete { id: String },
    /// Restore a deleted document
    Restore { id: String },
}

#[derive(Subcommand)]
enum CategoryCommands {
    /// Create a category
    #[command(alias = "add")]
    Create {
        name: String,
        /// Display color, e.g. "#1f6feb"
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        icon: Option<String>,
    },
    /// List categories
    #[command(alias = "ls")]
    List,
    /// File a document under a category
    Assign {
        /// Document ID
        document: String,
        /// Category (UUID or name)
        category: String,
    },
}

#[derive(Subcommand)]
enum GrantCommands {
    /// Grant a user or department access to a folder
    Folder {
        /// Folder (UUID or path)
        folder: String,
        #[arg(long, conflicts_with = "to_department")]
        to_user: Option<Uuid>,
        #[arg(long)]
        to_department: Option<String>,
        #[arg(short, long)]
        level: PermissionLevel,
        /// Apply to every descendant folder
        #[arg(long)]
        inherit: bool,
        /// Expiry (RFC 3339)
        #[arg(long)]
        until: Option<DateTime<Utc>>,
    },
    /// Grant a user access to a single document
    Document {
        id: String,
        #[arg(long)]
        to_user: Uuid,
        #[arg(short, long)]
        level: PermissionLevel,
        /// Expiry (RFC 3339)
        #[arg(long)]
        until: Option<DateTime<Utc>>,
    },
}

#[derive(Subcommand)]
enum RevokeCommands {
    /// Remove a folder grant
    Folder {
        /// Folder (UUID or path)
        folder: String,
        grant: String,
    },
    /// Remove a document grant
    Document { id: String, grant: String },
}

#[derive(Subcommand)]
enum CheckCommands {
    Folder {
        /// Folder (UUID or path)
        folder: String,
        level: PermissionLevel,
    },
    Document {
        id: String,
        level: PermissionLevel,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Print the config file location
    Path,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        if let Some(hint) = recovery_hint(&e) {
            eprintln!("Hint: {}", hint);
        }
        std::process::exit(1);
    }
}

/// Suggestion attached to the first Folio error in the chain
fn recovery_hint(error: &anyhow::Error) -> Option<&'static str> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<FolioError>())
        .and_then(FolioError::recovery_suggestion)
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands work without a store
    if let Commands::Config { command } = &cli.command {
        return match command {
            Some(ConfigCommands::Show) | None => commands::config::show(&output),
            Some(ConfigCommands::Path) => commands::config::path(&output),
        };
    }

    let config = Config::load().context("Failed to load configuration")?;
    init_logging(&config, cli.json);

    let mut store = Store::open_with_config(config).context("Failed to open store")?;
    debug!(database = %store.config().sqlite_path().display(), "Opened store");
    let caller = Caller {
        user_id: cli.user.unwrap_or_else(Uuid::nil),
        department: cli.department,
    };

    let passed = match cli.command {
        Commands::Folder { command } => {
            handle_folder_command(command, &mut store, &caller, &output).map(|_| true)
        }
        Commands::Doc { command } => {
            handle_doc_command(command, &mut store, &caller, &output).map(|_| true)
        }
        Commands::Category { command } => match command {
            CategoryCommands::Create { name, color, icon } => {
                commands::category::create(&mut store, name, color, icon, &output)
            }
            CategoryCommands::List => commands::category::list(&store, &output),
            CategoryCommands::Assign { document, category } => {
                commands::category::assign(&mut store, document, category, &output)
            }
        }
        .map(|_| true),
        Commands::Grant { command } => {
            handle_grant_command(command, &mut store, &caller, &output).map(|_| true)
        }
        Commands::Revoke { command } => match command {
            RevokeCommands::Folder { folder, grant } => {
                commands::grant::revoke_folder(&mut store, folder, grant, &output)
            }
            RevokeCommands::Document { id, grant } => {
                commands::grant::revoke_document(&mut store, id, grant, &output)
            }
        }
        .map(|_| true),
        Commands::Check { command } => match command {
            CheckCommands::Folder { folder, level } => {
                commands::check::folder_access(&store, &caller, folder, level, &output)
            }
            CheckCommands::Document { id, level } => {
                commands::check::document_access(&store, &caller, id, level, &output)
            }
        },
        Commands::CheckIntegrity { repair } => {
            commands::check::integrity(&mut store, repair, &output)
        }
        Commands::Status => commands::check::status(&store, &output).map(|_| true),
        Commands::Config { .. } => Ok(true), // Handled above
    }?;

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}

/// Install the stderr subscriber; `RUST_LOG` wins over the configured level
fn init_logging(config: &Config, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "folio_core={},folio_cli={}",
            config.log_level, config.log_level
        ))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(!json)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_folder_command(
    command: FolderCommands,
    store: &mut Store,
    caller: &Caller,
    output: &Output,
) -> Result<()> {
    use commands::folder;

    match command {
        FolderCommands::Create {
            name,
            parent,
            confidentiality,
            owning_department,
            description,
        } => folder::create(
            store,
            caller,
            folder::CreateArgs {
                name,
                parent,
                confidentiality,
                department: owning_department,
                description,
            },
            output,
        ),
        FolderCommands::List { parent, recursive } => folder::list(store, parent, recursive, output),
        FolderCommands::Show { folder } => folder::show(store, folder, output),
        FolderCommands::Move { folder, to } => folder::move_to(store, folder, to, output),
        FolderCommands::Rename { folder, name } => folder::rename(store, folder, name, output),
        FolderCommands::Delete { folder } => folder::delete(store, folder, output),
        FolderCommands::Restore { id } => folder::restore(store, id, output),
    }
}

fn handle_doc_command(
    command: DocCommands,
    store: &mut Store,
    caller: &Caller,
    output: &Output,
) -> Result<()> {
    use commands::doc;

    match command {
        DocCommands::Upload {
            file,
            folder,
            name,
            mime_type,
            confidentiality,
            tag,
        } => doc::upload(
            store,
            caller,
            doc::UploadArgs {
                file,
                folder,
                name,
                mime_type,
                confidentiality,
                tags: tag,
            },
            output,
        ),
        DocCommands::Show { id } => doc::show(store, id, output),
        DocCommands::List {
            folder,
            category,
            search,
            status,
            tag,
            confidentiality,
            limit,
            offset,
        } => doc::list(
            store,
            doc::ListArgs {
                folder,
                category,
                search,
                status,
                tags: tag,
                confidentiality,
                limit,
                offset,
            },
            output,
        ),
        DocCommands::Confirm { id } => doc::confirm(store, id, output),
        DocCommands::Activate { id } => doc::activate(store, id, output),
        DocCommands::Archive { id } => doc::archive(store, id, output),
        DocCommands::Version { id, file, summary } => {
            doc::version(store, caller, id, file, summary, output)
        }
        DocCommands::Versions { id } => doc::versions(store, id, output),
        DocCommands::Download { id, output: dest } => doc::download(store, id, dest, output),
        DocCommands::Move { id, to } => doc::move_to(store, id, to, output),
        DocCommands::Edit {
            id,
            name,
            tags,
            confidentiality,
        } => doc::update(store, id, name, tags, confidentiality, output),
        DocCommands::Delete { id } => doc::delete(store, id, output),
        DocCommands::Restore { id } => doc::restore(store, id, output),
    }
}

fn handle_grant_command(
    command: GrantCommands,
    store: &mut Store,
    caller: &Caller,
    output: &Output,
) -> Result<()> {
    use commands::grant;

    match command {
        GrantCommands::Folder {
            folder,
            to_user,
            to_department,
            level,
            inherit,
            until,
        } => grant::grant_folder(
            store,
            caller,
            grant::FolderGrantArgs {
                folder,
                user: to_user,
                department: to_department,
                level,
                inherit,
                until,
            },
            output,
        ),
        GrantCommands::Document {
            id,
            to_user,
            level,
            until,
        } => grant::grant_document(store, caller, id, to_user, level, until, output),
    }
}
