//! Tubescope - YouTube channel analytics ingestion CLI

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tubescope_backend::config::Config;
use tubescope_backend::store::{Store, UpsertReport};
use tubescope_backend::youtube::{PlaylistFilter, SearchKind, YouTubeClient};

#[derive(Parser)]
#[command(name = "tubescope", about = "Ingest YouTube channel analytics into SQL")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a channel's metadata row
    Channel { channel_id: String },
    /// Ingest every playlist owned by a channel
    Playlists { channel_id: String },
    /// Ingest all videos of a playlist
    Videos { playlist_id: String },
    /// Ingest a channel's comment threads
    Comments { channel_id: String },
    /// Channel, playlists, uploads videos and comments in one pass
    Sync { channel_id: String },
    /// Search channels, playlists or videos by text
    Search {
        query: String,
        #[arg(long, default_value = "channel")]
        kind: String,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::from_env().context("failed to load configuration")?;
    if config.api_keys.is_empty() {
        bail!("YOUTUBE_API_KEYS is empty; set at least one API key");
    }

    let api = YouTubeClient::new(config.api_keys.clone());
    let store = Store::open(&config.storage).context("failed to open storage backend")?;

    match cli.command {
        Command::Channel { channel_id } => {
            let rows = api.get_channels_table(&channel_id);
            log_report("channels", &store.add_channels(&rows)?);
        }
        Command::Playlists { channel_id } => {
            let rows = api.get_playlists_table(&PlaylistFilter::ForChannel(channel_id));
            log_report("playlists", &store.add_playlists(&rows)?);
        }
        Command::Videos { playlist_id } => {
            let rows = api.get_videos_table(&playlist_id);
            log_report("videos", &store.add_videos(&rows)?);
        }
        Command::Comments { channel_id } => {
            let rows = api.get_comments_table(&channel_id);
            log_report("comments", &store.add_comments(&rows)?);
        }
        Command::Sync { channel_id } => sync_channel(&api, &store, &channel_id)?,
        Command::Search { query, kind } => search(&api, &query, &kind)?,
    }

    Ok(())
}

/// Full ingestion pass for one channel: the channel row, its playlists,
/// the videos of its uploads playlist, and its comment threads.
fn sync_channel(api: &YouTubeClient, store: &Store, channel_id: &str) -> Result<()> {
    let channels = api.get_channels_table(channel_id);
    let Some(channel) = channels.first().cloned() else {
        bail!("channel {channel_id} not found (or every API credential failed)");
    };
    log_report("channels", &store.add_channels(&channels)?);

    let playlists = api.get_playlists_table(&PlaylistFilter::ForChannel(channel_id.to_string()));
    log_report("playlists", &store.add_playlists(&playlists)?);

    // The uploads playlist is not part of the channel's playlist listing;
    // it has to be registered before its videos can reference it.
    let uploads = api.get_playlists_table(&PlaylistFilter::ById(channel.uploads.clone()));
    log_report("uploads playlist", &store.add_playlists(&uploads)?);

    let videos = api.get_videos_table(&channel.uploads);
    log_report("videos", &store.add_videos(&videos)?);

    let comments = api.get_comments_table(channel_id);
    log_report("comments", &store.add_comments(&comments)?);

    Ok(())
}

fn search(api: &YouTubeClient, query: &str, kind: &str) -> Result<()> {
    let kind = match kind {
        "channel" => SearchKind::Channel,
        "playlist" => SearchKind::Playlist,
        "video" => SearchKind::Video,
        other => bail!("unsupported search kind {other:?} (expected channel, playlist or video)"),
    };

    let Some(response) = api.search_list(query, kind) else {
        bail!("search failed on every API credential");
    };
    for item in &response.items {
        println!(
            "{}  {}",
            item.resource_id().unwrap_or("-"),
            item.snippet.title
        );
    }
    Ok(())
}

fn log_report(label: &str, report: &UpsertReport) {
    info!(
        "{label}: {} inserted, {} updated, {} skipped",
        report.inserted,
        report.updated,
        report.skipped.len()
    );
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tubescope=info,tubescope_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
