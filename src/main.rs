use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iptv_catalog::{
    config::Config,
    guide::{build_guide, write_artifact, GuideIndex},
    ingestor::{FeedFetcher, HttpFeedClient},
    service::{CatalogEvent, CatalogService},
    storage::FileStore,
};

#[derive(Parser)]
#[command(name = "iptv-catalog")]
#[command(version)]
#[command(about = "Builds and maintains an IPTV channel catalog from remote playlist feeds")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Data directory (overrides config file)
    #[arg(short = 'd', long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the catalog, reusing the cache unless --force
    Refresh {
        #[arg(long)]
        force: bool,
    },
    /// List channels
    Channels {
        #[arg(long)]
        group: Option<String>,
        /// Print the channels as JSON
        #[arg(long)]
        json: bool,
    },
    /// List channel groups
    Groups,
    /// Manage playlist sources
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },
    /// Delete the cached catalog
    ClearCache,
    /// Refresh periodically and log catalog events until Ctrl-C
    Watch,
    /// Build the guide artifact from XMLTV feeds
    BuildGuide {
        #[arg(long = "url", required = true)]
        urls: Vec<String>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Show the current and next programme for a channel
    Now {
        #[arg(long)]
        tvg_id: String,
        #[arg(long)]
        guide: PathBuf,
    },
}

#[derive(Subcommand)]
enum SourcesAction {
    List,
    Add { url: String },
    Delete { url: String },
    AddDefault { url: String },
    DeleteDefault { url: String },
    ToggleDefault { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("iptv_catalog={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    std::env::set_var("CONFIG_FILE", &cli.config);
    let mut config = Config::load()?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    match cli.command {
        Command::BuildGuide { urls, out } => run_build_guide(&config, &urls, out).await,
        Command::Now { tvg_id, guide } => run_now(&tvg_id, guide).await,
        command => run_catalog_command(&config, command).await,
    }
}

async fn run_catalog_command(config: &Config, command: Command) -> Result<()> {
    info!("Using data directory: {}", config.storage.data_dir.display());
    let store = Arc::new(FileStore::new(config.storage.data_dir.clone()));
    let service = Arc::new(CatalogService::open_http(config, store).await?);

    match command {
        Command::Refresh { force } => {
            let snapshot = service.refresh(force).await;
            println!(
                "{:?}: {} channels in {} groups{}",
                snapshot.status,
                snapshot.channels.len(),
                snapshot.groups.len(),
                if snapshot.from_cache { " (cached)" } else { "" }
            );
            if let Some(message) = snapshot.error {
                anyhow::bail!(message);
            }
        }
        Command::Channels { group, json } => {
            let snapshot = service.refetch().await;
            let channels: Vec<_> = snapshot
                .channels
                .iter()
                .filter(|c| group.as_deref().map_or(true, |g| c.group == g))
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&channels)?);
            } else {
                for channel in channels {
                    println!("{}\t{}\t{}", channel.name, channel.group, channel.url);
                }
            }
        }
        Command::Groups => {
            for group in service.refetch().await.groups {
                println!("{group}");
            }
        }
        Command::Sources { action } => run_sources(&service, action).await?,
        Command::ClearCache => {
            service.clear_cache().await?;
            println!("Cache cleared");
        }
        Command::Watch => run_watch(service).await?,
        Command::BuildGuide { .. } | Command::Now { .. } => {
            unreachable!("guide commands are dispatched before the catalog is opened")
        }
    }

    Ok(())
}

async fn run_sources(service: &CatalogService, action: SourcesAction) -> Result<()> {
    match action {
        SourcesAction::List => {
            for default in service.default_urls().await {
                let marker = if default.enabled { "*" } else { " " };
                println!("default {marker} {}", default.url);
            }
            for url in service.user_urls().await {
                println!("user      {url}");
            }
        }
        SourcesAction::Add { url } => {
            service
                .add_url(&url)
                .await
                .map_err(|e| anyhow::anyhow!("{} ({})", e.user_message(), e))?;
            println!("Added {url}");
        }
        SourcesAction::Delete { url } => {
            service.delete_url(&url).await?;
            println!("Deleted {url}");
        }
        SourcesAction::AddDefault { url } => {
            service.add_default_url(&url).await?;
            println!("Added default {url}");
        }
        SourcesAction::DeleteDefault { url } => {
            service.delete_default_url(&url).await?;
            println!("Deleted default {url}");
        }
        SourcesAction::ToggleDefault { url } => {
            let defaults = service.toggle_default_url(&url).await?;
            let enabled = defaults.iter().any(|d| d.url == url && d.enabled);
            println!("{} default {url}", if enabled { "Enabled" } else { "Disabled" });
        }
    }
    Ok(())
}

async fn run_watch(service: Arc<CatalogService>) -> Result<()> {
    let mut events = service.subscribe();
    let timer = service.spawn_refresh_timer();
    service.refetch().await;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(CatalogEvent::CatalogUpdated { channels, groups, from_cache, .. }) => {
                    info!("Catalog updated: {} channels, {} groups (cached: {})", channels, groups, from_cache);
                }
                Some(CatalogEvent::LoadFailed { message, .. }) => error!("{}", message),
                Some(CatalogEvent::NoSources { .. }) => info!("No sources configured"),
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    timer.cancel();
    Ok(())
}

async fn run_build_guide(config: &Config, urls: &[String], out: PathBuf) -> Result<()> {
    let client = HttpFeedClient::new(&config.fetch.user_agent)?;
    let fetcher = FeedFetcher::new(Arc::new(client), config.fetch.timeout());
    let summary = build_guide(&fetcher, urls).await?;
    write_artifact(&out, &summary.channels).await?;
    println!(
        "Wrote {} guide channels to {}",
        summary.channels.len(),
        out.display()
    );
    Ok(())
}

async fn run_now(tvg_id: &str, guide: PathBuf) -> Result<()> {
    let index = GuideIndex::load(&guide)
        .await
        .with_context(|| format!("Failed to read guide artifact {}", guide.display()))?;
    let now_next = index.now_and_next(tvg_id, Utc::now());
    match now_next.current {
        Some(p) => println!("Now:  {} ({} - {})", p.title, p.start, p.stop),
        None => println!("Now:  -"),
    }
    match now_next.next {
        Some(p) => println!("Next: {} ({} - {})", p.title, p.start, p.stop),
        None => println!("Next: -"),
    }
    Ok(())
}
