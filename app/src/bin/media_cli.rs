use api_client::{parse_existing_media, UploadFile};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use store::MediaStore;
use tracing_appender::rolling;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;
use ui::{render, MediaManager, Message, PreviewTile};

#[path = "../config.rs"]
mod config;

#[derive(Parser)]
#[command(
    name = "media_cli",
    author,
    version,
    about = "Media manager command line client"
)]
struct Cli {
    /// Override log level (e.g. info, debug)
    #[arg(long)]
    log_level: Option<String>,
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the upload endpoint
    #[arg(long)]
    upload_url: Option<String>,
    /// Override the reorder endpoint
    #[arg(long)]
    reorder_url: Option<String>,
    /// Override the delete endpoint template (must contain {id})
    #[arg(long)]
    delete_url_template: Option<String>,
    /// Override the anti-forgery token
    #[arg(long)]
    csrf_token: Option<String>,
    /// Override the upload timeout in seconds (0 disables it)
    #[arg(long)]
    upload_timeout_secs: Option<u64>,
    /// JSON file with the media already attached to the entry
    #[arg(long)]
    snapshot: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the media attached to the entry
    List,
    /// Upload files and append them to the entry
    Upload {
        /// Files to upload, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Move the item at one position onto another
    Reorder {
        /// Position of the item to move
        #[arg(long)]
        from: usize,
        /// Position to drop it on
        #[arg(long)]
        to: usize,
    },
    /// Delete the item at a position
    Delete {
        /// Position of the item to delete
        position: usize,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Write the effective configuration to the config file
    SaveConfig,
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}

async fn read_upload(path: &Path) -> Result<UploadFile, Box<dyn std::error::Error>> {
    let payload = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();
    Ok(UploadFile::new(file_name, content_type_for(path), payload))
}

fn print_tiles(tiles: &[PreviewTile]) {
    if tiles.is_empty() {
        println!("No media attached");
        return;
    }
    for tile in tiles {
        println!("{}", tile);
    }
}

fn tile_at(manager: &MediaManager, position: usize) -> Result<PreviewTile, Box<dyn std::error::Error>> {
    manager
        .tiles()
        .into_iter()
        .find(|t| t.position == position)
        .ok_or_else(|| format!("No media at position {}", position).into())
}

/// Print pending notices and turn them into the process result.
fn finish(manager: &MediaManager) -> Result<(), Box<dyn std::error::Error>> {
    print_tiles(&manager.tiles());
    if manager.notice_count() == 0 {
        return Ok(());
    }
    for notice in manager.notices() {
        eprintln!("{}", notice.message());
    }
    Err(format!("{} operation(s) failed", manager.notice_count()).into())
}

#[cfg_attr(feature = "trace-spans", tracing::instrument)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let overrides = config::AppConfigOverrides {
        log_level: cli.log_level.clone(),
        upload_url: cli.upload_url.clone(),
        reorder_url: cli.reorder_url.clone(),
        delete_url_template: cli.delete_url_template.clone(),
        csrf_token: cli.csrf_token.clone(),
        upload_timeout_secs: cli.upload_timeout_secs,
    };
    let cfg = config::AppConfig::load_from(cli.config.clone()).apply_overrides(&overrides);
    std::fs::create_dir_all(&cfg.log_dir)?;
    let file_appender = rolling::daily(&cfg.log_dir, "media_manager.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(cfg.log_level.clone()))
        .with_writer(std::io::stderr.and(file_writer))
        .init();

    let snapshot = match &cli.snapshot {
        Some(path) => Some(std::fs::read_to_string(path)?),
        None => None,
    };

    match cli.command {
        Commands::List => {
            let store = MediaStore::new();
            if let Some(json) = &snapshot {
                match parse_existing_media(json) {
                    Ok(existing) => {
                        store.hydrate(&existing);
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to parse existing media snapshot"),
                }
            }
            print_tiles(&render(&store.snapshot()));
        }
        Commands::SaveConfig => {
            let path = cli.config.clone().unwrap_or_else(config::default_config_path);
            cfg.save_to(Some(path.clone()))?;
            println!("Configuration written to {}", path.display());
        }
        Commands::Upload { files } => {
            let mut manager = MediaManager::connect(&cfg.widget_config(), snapshot.as_deref())?;
            let mut selected = Vec::with_capacity(files.len());
            for path in &files {
                selected.push(read_upload(path).await?);
            }
            manager.dispatch(Message::FilesSelected(selected)).await;
            finish(&manager)?;
        }
        Commands::Reorder { from, to } => {
            let mut manager = MediaManager::connect(&cfg.widget_config(), snapshot.as_deref())?;
            let source = tile_at(&manager, from)?.local_id;
            let target = tile_at(&manager, to)?.local_id;
            manager.dispatch(Message::Dropped { source, target }).await;
            finish(&manager)?;
        }
        Commands::Delete { position, yes } => {
            let mut manager = MediaManager::connect(&cfg.widget_config(), snapshot.as_deref())?;
            let tile = tile_at(&manager, position)?;
            manager.dispatch(Message::DeleteClicked(tile.local_id)).await;
            if manager.deleting().is_none() {
                return finish(&manager);
            }
            if !yes {
                manager.dispatch(Message::CancelDelete).await;
                return Err(format!(
                    "Refusing to delete {} without --yes",
                    tile.display_name
                )
                .into());
            }
            manager.dispatch(Message::ConfirmDelete).await;
            finish(&manager)?;
        }
    }

    Ok(())
}
