//! Terminal front end for the drive client. Listing views and search flags
//! map onto the core's projections; mutations go through `DriveClient`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    load_settings, ApiClient, DriveClient, DriveView, DurableCredentialStore, ErrorCategory,
    FileFilters, ProfileUpdate, SessionManager, ShareLinkOptions, UploadPayload,
};
use shared::domain::{FileId, FileItem, FileKind, Session, SharePermission};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "drive", about = "Terminal client for the file-storage service")]
struct Cli {
    /// Data directory holding the credential vault and client.toml. Shared
    /// with the messenger client so one sign-in covers both.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
enum ViewArg {
    #[default]
    All,
    Starred,
    Recent,
    Shared,
}

impl From<ViewArg> for DriveView {
    fn from(view: ViewArg) -> Self {
        match view {
            ViewArg::All => DriveView::All,
            ViewArg::Starred => DriveView::Starred,
            ViewArg::Recent => DriveView::Recent,
            ViewArg::Shared => DriveView::Shared,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    File,
    Folder,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
enum PermissionArg {
    #[default]
    View,
    Download,
    Edit,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account and sign in.
    Register {
        username: String,
        email: String,
        password: String,
    },
    /// Sign in with an existing account.
    Login { email: String, password: String },
    /// Drop the stored credentials. No request is made.
    Logout,
    /// List the drive under a view, narrowed by search filters.
    Ls {
        #[arg(long, value_enum, default_value_t = ViewArg::All)]
        view: ViewArg,
        #[arg(long, default_value = "")]
        query: String,
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        /// Only starred entries.
        #[arg(long)]
        starred: bool,
        /// Only shared entries.
        #[arg(long)]
        shared: bool,
    },
    /// Upload files to the drive.
    Upload { paths: Vec<PathBuf> },
    /// Flip the star on a file.
    Star { file_id: i64 },
    /// Mint a share link for a file.
    Share {
        file_id: i64,
        #[arg(long, value_enum, default_value_t = PermissionArg::View)]
        permission: PermissionArg,
        #[arg(long)]
        expires_in_days: Option<i64>,
        #[arg(long)]
        password: Option<String>,
        /// Access cap for the link; defaults to 10 uses.
        #[arg(long)]
        max_access: Option<u32>,
    },
    /// Create a folder entry in the listing.
    Mkdir { name: String },
    /// Delete entries from the listing.
    Rm { file_ids: Vec<i64> },
    /// Download a file.
    Download {
        file_id: i64,
        /// Output path; defaults to the file's own name.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show storage usage against the account limit.
    Usage,
    /// Show or change the account settings.
    Settings {
        #[command(subcommand)]
        action: SettingsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    Show,
    Set {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        /// An empty string clears the stored key.
        #[arg(long)]
        ai_api_key: Option<String>,
        #[arg(long)]
        quantum_keys: Option<bool>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let cli = Cli::parse();

    if let Err(error) = run(cli).await {
        let category = ErrorCategory::of(&error);
        eprintln!("error ({}): {error:#}", category.label());
        if category.requires_reauth() {
            eprintln!("sign in again with `drive login <email> <password>`");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let data_dir = resolve_data_dir(cli.data_dir)?;
    let settings = load_settings(&data_dir)?;
    let api = Arc::new(ApiClient::new(&settings.api_base_url, settings.request_log)?);
    let store = DurableCredentialStore::initialize(&settings.vault_database_url()).await?;
    let session = SessionManager::new(api.clone(), store);
    let drive = DriveClient::new(api, session.clone());

    match cli.command {
        Command::Register {
            username,
            email,
            password,
        } => {
            let signed_in = session.register(&username, &email, &password).await?;
            println!(
                "registered and signed in as {} (user_id={})",
                signed_in.username, signed_in.user_id.0
            );
        }
        Command::Login { email, password } => {
            let signed_in = session.login(&email, &password).await?;
            println!(
                "signed in as {} (user_id={})",
                signed_in.username, signed_in.user_id.0
            );
        }
        Command::Logout => {
            session.logout().await?;
            println!("signed out");
        }
        Command::Ls {
            view,
            query,
            kind,
            starred,
            shared,
        } => {
            restore_or_bail(&session).await?;
            drive.set_view(view.into()).await;
            drive
                .set_filters(FileFilters {
                    query,
                    kind: kind.map(|kind| match kind {
                        KindArg::File => FileKind::File,
                        KindArg::Folder => FileKind::Folder,
                    }),
                    starred: starred.then_some(true),
                    shared: shared.then_some(true),
                })
                .await;
            drive.refresh().await?;
            let visible = drive.visible_files().await;
            if visible.is_empty() {
                println!("nothing to show");
            }
            for file in visible {
                print_file(&file);
            }
        }
        Command::Upload { paths } => {
            restore_or_bail(&session).await?;
            if paths.is_empty() {
                bail!("no files given to upload");
            }
            let mut payloads = Vec::with_capacity(paths.len());
            for path in &paths {
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                payloads.push(UploadPayload::new(file_name_of(path)?, bytes));
            }
            let created = drive.upload(payloads).await?;
            println!("uploaded {} file(s)", created.len());
            for file in created {
                print_file(&file);
            }
        }
        Command::Star { file_id } => {
            restore_or_bail(&session).await?;
            drive.refresh().await?;
            let starred = drive.toggle_star(FileId(file_id)).await?;
            println!(
                "file {} is {}",
                file_id,
                if starred { "starred" } else { "unstarred" }
            );
        }
        Command::Share {
            file_id,
            permission,
            expires_in_days,
            password,
            max_access,
        } => {
            restore_or_bail(&session).await?;
            drive.refresh().await?;
            let options = ShareLinkOptions {
                permission: match permission {
                    PermissionArg::View => SharePermission::View,
                    PermissionArg::Download => SharePermission::Download,
                    PermissionArg::Edit => SharePermission::Edit,
                },
                expires_at: expires_in_days.map(|days| Utc::now() + Duration::days(days)),
                password,
                max_access: max_access.or(Some(10)),
            };
            let link = drive.create_share_link(FileId(file_id), options).await?;
            println!("{}", link.url);
            if let Some(expires_at) = link.expires_at {
                println!("expires {}", expires_at.format("%Y-%m-%d %H:%M"));
            }
            if let Some(cap) = link.max_access {
                println!("access cap {cap}");
            }
            if link.password.is_some() {
                println!("password protected");
            }
        }
        Command::Mkdir { name } => {
            restore_or_bail(&session).await?;
            let folder = drive.create_folder(&name).await?;
            println!("created folder {} (id={})", folder.name, folder.file_id.0);
        }
        Command::Rm { file_ids } => {
            restore_or_bail(&session).await?;
            if file_ids.is_empty() {
                bail!("no file ids given to delete");
            }
            drive.refresh().await?;
            let ids: Vec<FileId> = file_ids.into_iter().map(FileId).collect();
            let removed = drive.delete_files(&ids).await?;
            println!("deleted {removed} entr{}", if removed == 1 { "y" } else { "ies" });
        }
        Command::Download { file_id, out } => {
            restore_or_bail(&session).await?;
            let listing = drive.refresh().await?;
            let target = out.unwrap_or_else(|| {
                listing
                    .iter()
                    .find(|file| file.file_id == FileId(file_id))
                    .map(|file| PathBuf::from(&file.name))
                    .unwrap_or_else(|| PathBuf::from(format!("file-{file_id}")))
            });
            let bytes = drive.download(FileId(file_id)).await?;
            tokio::fs::write(&target, &bytes)
                .await
                .with_context(|| format!("failed to write {}", target.display()))?;
            println!("wrote {} ({})", target.display(), human_size(bytes.len() as u64));
        }
        Command::Usage => {
            restore_or_bail(&session).await?;
            drive.refresh().await?;
            let usage = drive.storage_usage().await;
            println!(
                "{} of {} used ({:.1}%)",
                human_size(usage.used_bytes),
                human_size(usage.limit_bytes),
                usage.percent_used()
            );
        }
        Command::Settings { action } => match action {
            SettingsCommand::Show => {
                restore_or_bail(&session).await?;
                let profile = session
                    .profile()
                    .await
                    .ok_or_else(|| anyhow!("no profile is loaded"))?;
                println!("username       {}", profile.username);
                println!("email          {}", profile.email);
                println!(
                    "ai api key     {}",
                    if profile.ai_api_key.is_some() { "set" } else { "not set" }
                );
                println!(
                    "quantum keys   {}",
                    if profile.quantum_keys_enabled { "enabled" } else { "disabled" }
                );
                println!("storage limit  {}", human_size(profile.storage_limit_bytes));
            }
            SettingsCommand::Set {
                username,
                email,
                ai_api_key,
                quantum_keys,
            } => {
                restore_or_bail(&session).await?;
                let profile = session
                    .update_profile(ProfileUpdate {
                        username,
                        email,
                        ai_api_key,
                        quantum_keys_enabled: quantum_keys,
                    })
                    .await?;
                println!("settings saved for {}", profile.username);
            }
        },
    }

    Ok(())
}

fn print_file(file: &FileItem) {
    let marker = match file.kind {
        FileKind::Folder => "d",
        FileKind::File => "-",
    };
    let star = if file.starred { "*" } else { " " };
    let shared = if file.shared { "s" } else { " " };
    println!(
        "{:>8} {marker}{star}{shared} {:>9} {} {}",
        file.file_id.0,
        human_size(file.size_bytes),
        file.modified_at.format("%Y-%m-%d %H:%M"),
        file.name
    );
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("{} has no usable file name", path.display()))
}

async fn restore_or_bail(session: &SessionManager) -> Result<Session> {
    if !session.restore().await? {
        bail!("not signed in; run `drive login <email> <password>` first");
    }
    session.require().await
}

fn resolve_data_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    let base = dirs::data_local_dir()
        .ok_or_else(|| anyhow!("unable to resolve the local app data directory"))?;
    Ok(base.join("quantum_client"))
}
