use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};

use csphere_client::aggregator::{Aggregator, ListSource, LoadOutcome, ScrollPolicy};
use csphere_client::api::{BookmarkActions, ContentApi, FolderApi, HttpApiClient};
use csphere_client::config::ClientConfig;
use csphere_client::models::Bookmark;
use csphere_client::progress;
use csphere_client::selection::BulkOutcome;
use csphere_client::token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
use csphere_client::views::{FolderCache, FolderView, TagView};

#[derive(Parser)]
#[command(name = "csphere")]
#[command(about = "Command-line client for Csphere bookmarks", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store an API token for later commands
    Login {
        #[arg(short, long)]
        token: String,
    },

    /// Remove the stored token
    Logout,

    /// List saved bookmarks, newest first
    List {
        /// Keep paging until the server has no more results
        #[arg(short, long)]
        all: bool,

        /// Only unread bookmarks
        #[arg(short, long)]
        unread: bool,

        /// Only bookmarks in these categories (matched by id)
        #[arg(short, long, value_delimiter = ',')]
        category: Vec<String>,
    },

    /// Search bookmarks
    Search {
        query: String,

        #[arg(short, long)]
        all: bool,
    },

    /// Recently saved bookmarks
    Recent,

    /// Number of unread bookmarks
    UnreadCount,

    /// Older bookmarks grouped by month
    Rediscover,

    /// Save a url; the server fetches the page itself
    SaveUrl { url: String },

    /// Replace a bookmark's notes
    Notes { id: String, notes: String },

    /// Mark a bookmark as read
    MarkRead { id: String },

    /// Keep a bookmark in the read-later tab
    ReadLater {
        id: String,

        /// Take it out of read-later instead
        #[arg(long)]
        remove: bool,
    },

    /// Print the link to a bookmark's archived copy
    Archive { id: String },

    /// List folders
    Folders,

    /// Show a folder's contents, optionally removing bookmarks from it
    Folder {
        id: String,

        /// Content ids to remove from the folder (comma-separated or repeated)
        #[arg(short, long, value_delimiter = ',')]
        remove: Vec<String>,
    },

    /// Add a bookmark to a folder
    FolderAdd { folder: String, content: String },

    /// Delete a folder
    FolderDelete { id: String },

    /// List tags
    Tags,

    /// Create a tag
    TagCreate { name: String },

    /// Delete tags by id
    TagDelete {
        #[arg(required = true, value_delimiter = ',')]
        ids: Vec<String>,
    },

    /// Show or update the client configuration
    Config {
        /// Set and persist the API base url
        #[arg(long)]
        base_url: Option<String>,
    },
}

fn token_store(config: &ClientConfig) -> Result<Arc<dyn TokenStore>> {
    if let Ok(token) = std::env::var("CSPHERE_TOKEN") {
        if !token.trim().is_empty() {
            return Ok(Arc::new(MemoryTokenStore::with_token(token.trim())));
        }
    }
    Ok(Arc::new(FileTokenStore::new(config.token_path()?)))
}

fn print_bookmarks(bookmarks: &[Bookmark]) {
    let now = chrono::Utc::now();
    for bookmark in bookmarks {
        println!("  🔖 {}", bookmark.display_title());
        println!("     {}  ({})", bookmark.url, bookmark.relative_saved_label(now));
    }
}

/// 加载第一页，`all` 时一直翻到底
async fn collect(aggregator: &Aggregator, query: Option<&str>, all: bool) -> Result<()> {
    let pb = progress::create_page_counter("loading");
    if let Err(e) = aggregator.load_first_page(query).await {
        progress::finish_with_error(&pb, "failed");
        return Err(e.into());
    }
    pb.set_position(aggregator.len() as u64);

    while all && aggregator.has_next() {
        match aggregator.load_next_page().await {
            Ok(LoadOutcome::Loaded { .. }) => pb.set_position(aggregator.len() as u64),
            Ok(_) => break,
            Err(e) => {
                progress::finish_with_error(&pb, "failed");
                return Err(e.into());
            }
        }
    }
    progress::finish_with_success(&pb, "done");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let config = ClientConfig::load()?;
    let tokens = token_store(&config)?;

    match cli.command {
        Commands::Login { token } => {
            tokens.save(token.trim())?;
            info!("🔑 Token saved");
        }

        Commands::Logout => {
            tokens.clear()?;
            info!("👋 Signed out");
        }

        Commands::Config { base_url } => {
            let shown = match base_url {
                Some(url) => {
                    let path = ClientConfig::default_path()?;
                    let mut stored = ClientConfig::load_from(&path)?;
                    stored.api_base_url = url;
                    stored.validate()?;
                    stored.save_to(&path)?;
                    info!("💾 Saved config to {:?}", path);
                    stored
                }
                None => config,
            };
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }

        command => {
            let client = Arc::new(HttpApiClient::new(&config, tokens).context("Failed to build HTTP client")?);
            run_remote(command, client, &config).await?;
        }
    }

    Ok(())
}

async fn run_remote(command: Commands, client: Arc<HttpApiClient>, config: &ClientConfig) -> Result<()> {
    let policy = ScrollPolicy::new(config.scroll_threshold_px);

    match command {
        Commands::List { all, unread, category } => {
            let source = if unread { ListSource::Unread } else { ListSource::Latest };
            let aggregator = Aggregator::new(client, source, policy);
            collect(&aggregator, None, all).await?;

            let visible = aggregator.apply_category_filter(category);
            println!("\n📚 {} bookmarks", visible.len());
            print_bookmarks(&visible);
            for conflict in aggregator.category_conflicts() {
                warn!(
                    "⚠️  Category {} has two names: '{}' kept, '{}' ignored",
                    conflict.category_id, conflict.kept_name, conflict.rejected_name
                );
            }
            if aggregator.has_next() {
                println!("\n   … more available (use --all)");
            }
        }

        Commands::Search { query, all } => {
            let aggregator = Aggregator::new(client, ListSource::Latest, policy);
            collect(&aggregator, Some(&query), all).await?;
            println!("\n🔍 {} results for '{}'", aggregator.len(), query);
            print_bookmarks(&aggregator.visible());
        }

        Commands::Recent => {
            let pb = progress::create_spinner("Fetching recent bookmarks...");
            let (recent, unread) = futures::join!(client.recent_bookmarks(), client.unread_count());
            pb.finish_and_clear();

            let recent = recent?;
            match unread {
                Ok(count) => println!("📬 {} unread", count),
                Err(e) => warn!("⚠️  Could not fetch unread count: {}", e),
            }
            println!("🕒 {} recent bookmarks", recent.len());
            print_bookmarks(&recent);
        }

        Commands::UnreadCount => {
            println!("{}", client.unread_count().await?);
        }

        Commands::Rediscover => {
            let pb = progress::create_spinner("Fetching older bookmarks...");
            let feed = client.rediscover().await;
            pb.finish_and_clear();

            let feed = feed?;
            println!("🗓️  {} bookmarks across {} months", feed.total(), feed.groups.len());
            for group in &feed.groups {
                println!("\n{}", group.month);
                print_bookmarks(&group.bookmarks);
            }
        }

        Commands::SaveUrl { url } => {
            if url.trim().is_empty() {
                anyhow::bail!("url cannot be empty");
            }
            client.save_url(url.trim()).await?;
            info!("✅ Bookmark saved");
        }

        Commands::Notes { id, notes } => {
            client.update_notes(&id, &notes).await?;
            info!("📝 Notes updated");
        }

        Commands::MarkRead { id } => {
            if !client.mark_read(&id).await?.success {
                anyhow::bail!("Server did not mark {} as read", id);
            }
        }

        Commands::ReadLater { id, remove } => {
            client.set_read_later(&id, !remove).await?;
            info!("{}", if remove { "Tab removed" } else { "Tab saved" });
        }

        Commands::Archive { id } => match client.archive_url(&id).await? {
            Some(url) => println!("{}", url),
            None => anyhow::bail!("Archive not found for this item"),
        },

        Commands::Folders => {
            let cache = FolderCache::new(client);
            let folders = cache.get().await?;
            println!("📁 {} folders", folders.len());
            for folder in folders {
                println!("  {}  {} ({} items)", folder.folder_id, folder.folder_name, folder.file_count);
            }
        }

        Commands::FolderAdd { folder, content } => {
            let response = client.add_to_folder(&folder, &content).await?;
            if !response.success {
                anyhow::bail!(
                    "Could not add to folder: {}",
                    response.message.unwrap_or_else(|| "unknown error".to_string())
                );
            }
            info!("✅ Item added to the folder");
        }

        Commands::FolderDelete { id } => {
            let cache = FolderCache::new(client);
            let response = cache.delete(&id).await?;
            if !response.success {
                anyhow::bail!(
                    "Could not delete folder: {}",
                    response.message.unwrap_or_else(|| "unknown error".to_string())
                );
            }
            info!("🗑️  Folder deleted");
        }

        Commands::Folder { id, remove } => {
            let mut view = FolderView::new(client, id).with_status_ttl(config.status_ttl());
            view.load().await?;

            if !remove.is_empty() {
                view.selection.enter();
                for content_id in &remove {
                    view.selection.toggle(content_id);
                }
                match view.remove_selected().await? {
                    BulkOutcome::Applied { removed } => info!("✅ Removed {} bookmarks", removed),
                    BulkOutcome::Rejected => warn!("⚠️  Server refused the removal"),
                }
            }

            if let Ok(metadata) = view.load_metadata().await {
                println!("📁 {}", metadata.name);
            }
            print_bookmarks(view.items());
        }

        Commands::Tags => {
            let mut view = TagView::new(client).with_status_ttl(config.status_ttl());
            view.load().await?;
            println!("🏷️  {} tags", view.tags().len());
            for tag in view.tags() {
                println!("  {}  {}", tag.tag_id, tag.tag_name);
            }
        }

        Commands::TagCreate { name } => {
            let mut view = TagView::new(client).with_status_ttl(config.status_ttl());
            view.load().await?;
            let response = view.create_tag(&name).await?;
            if !response.is_success() {
                anyhow::bail!("Server returned {}", response.status);
            }
        }

        Commands::TagDelete { ids } => {
            let mut view = TagView::new(client).with_status_ttl(config.status_ttl());
            view.load().await?;
            view.selection.enter();
            for id in &ids {
                view.selection.toggle(id);
            }
            if let BulkOutcome::Rejected = view.delete_selected().await? {
                anyhow::bail!("Server refused to delete tags");
            }
        }

        Commands::Login { .. } | Commands::Logout | Commands::Config { .. } => {}
    }

    Ok(())
}
