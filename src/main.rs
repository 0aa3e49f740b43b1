mod categories;
mod client;
mod crawler;
mod download;
mod error;
mod paginate;
mod parser;
mod records;
mod sink;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

use crate::categories::FilterSpec;
use crate::crawler::bilibili::Bilibili;
use crate::crawler::ximalaya::Ximalaya;
use crate::error::Error;
use crate::sink::{CsvSink, Store};

#[derive(Parser)]
#[command(
    name = "media_scraper",
    about = "Paginated fetch/parse/persist crawlers for news search, video and audio platforms"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search-engine news results for one or more keywords
    News {
        #[arg(required = true)]
        words: Vec<String>,
        /// Result pages per keyword
        #[arg(short = 'n', long, default_value = "3")]
        pages: u64,
        /// Logged-in session cookie (the endpoint throttles anonymous clients)
        #[arg(long)]
        cookie: Option<String>,
        #[arg(short, long, default_value = "data/news.csv")]
        out: PathBuf,
    },
    /// Videos uploaded to a channel in the last seven days
    Channel {
        url: String,
        /// Max listing pages (default: all reported)
        #[arg(short = 'n', long)]
        pages: Option<u64>,
        #[arg(short, long, default_value = "data/channel_videos.csv")]
        out: PathBuf,
    },
    /// Video + uploader details for the given bvids
    Videos {
        #[arg(required = true)]
        bvids: Vec<String>,
        #[arg(short, long, default_value = "data/video_details.csv")]
        out: PathBuf,
    },
    /// Every comment page of the given videos (stops on the first empty page)
    Comments {
        #[arg(required = true)]
        bvids: Vec<String>,
        #[arg(short, long, default_value = "data/comments.csv")]
        out: PathBuf,
    },
    /// Bullet-comment feed of the given videos
    Bullets {
        #[arg(required = true)]
        bvids: Vec<String>,
        #[arg(short, long, default_value = "data/bullets.csv")]
        out: PathBuf,
    },
    /// Print the audio platform's category and subcategory codes
    Categories,
    /// Album listing for a category, optionally filtered
    Albums {
        #[arg(short, long)]
        category: String,
        /// Subcategory name or code; repeatable
        #[arg(short, long)]
        subcategory: Vec<String>,
        /// Listing filter as key=value (announcer/finished/paid); repeatable
        #[arg(short, long)]
        filter: Vec<String>,
        /// Max pages per subcategory (platform caps at 50)
        #[arg(short = 'n', long)]
        pages: Option<u64>,
        #[arg(short, long, default_value = "10")]
        workers: usize,
        #[arg(short, long, default_value = "data/album_basic.csv")]
        out: PathBuf,
        /// Also upsert into this SQLite store
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Merged album details for album ids
    AlbumDetails {
        /// Album ids; when omitted, ids come from the store's album_basic table
        #[arg(long)]
        ids: Vec<i64>,
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(short, long, default_value = "10")]
        workers: usize,
        #[arg(short, long, default_value = "data/album_details.csv")]
        out: PathBuf,
    },
    /// Track listings for album ids
    Tracks {
        #[arg(long)]
        ids: Vec<i64>,
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(short, long, default_value = "10")]
        workers: usize,
        #[arg(short, long, default_value = "data/tracks.csv")]
        out: PathBuf,
    },
    /// Album cards from the category browse pages (HTML listing)
    Listing {
        /// Category slug as it appears in the browse URL
        category: String,
        #[arg(short = 'n', long)]
        pages: Option<u64>,
        #[arg(short, long, default_value = "data/listing.csv")]
        out: PathBuf,
    },
    /// Download trial audio for tracks already in the store
    Download {
        #[arg(long)]
        db: PathBuf,
        #[arg(short, long, default_value = "downloads")]
        dir: PathBuf,
        #[arg(short, long, default_value = "10")]
        workers: usize,
    },
    /// Row counts for the relational store
    Stats {
        #[arg(long, default_value = "data/media.sqlite")]
        db: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::News {
            words,
            pages,
            cookie,
            out,
        } => {
            let sink = CsvSink::new(out);
            let rows =
                crawler::baidu::crawl_news(&words, pages, cookie.as_deref(), &sink).await?;
            println!("Saved {} news results to {}", rows.len(), sink.path().display());
            Ok(())
        }
        Commands::Channel { url, pages, out } => {
            let bilibili = Bilibili::new(crawler::bilibili::CHANNEL_DELAY)?;
            let sink = CsvSink::new(out);
            let rows = bilibili.crawl_channel(&url, pages, &sink).await?;
            println!("Saved {} channel videos to {}", rows.len(), sink.path().display());
            Ok(())
        }
        Commands::Videos { bvids, out } => {
            let bilibili = Bilibili::new(crawler::bilibili::VIDEO_DELAY)?;
            let sink = CsvSink::new(out);
            let rows = bilibili.crawl_videos(&bvids, &sink).await?;
            println!("Saved {} video details to {}", rows.len(), sink.path().display());
            Ok(())
        }
        Commands::Comments { bvids, out } => {
            let bilibili = Bilibili::new(crawler::bilibili::VIDEO_DELAY)?;
            let sink = CsvSink::new(out);
            let rows = bilibili.crawl_comments(&bvids, &sink).await?;
            println!("Saved {} comments to {}", rows.len(), sink.path().display());
            Ok(())
        }
        Commands::Bullets { bvids, out } => {
            let bilibili = Bilibili::new(crawler::bilibili::BULLET_DELAY)?;
            let sink = CsvSink::new(out);
            let rows = bilibili.crawl_bullets(&bvids, &sink).await?;
            println!("Saved {} bullet comments to {}", rows.len(), sink.path().display());
            Ok(())
        }
        Commands::Categories => {
            let ximalaya = Ximalaya::new()?;
            ximalaya.print_categories().await
        }
        Commands::Albums {
            category,
            subcategory,
            filter,
            pages,
            workers,
            out,
            db,
        } => {
            // Filter validation happens before any request goes out.
            let filters = FilterSpec::parse(&filter)?;
            let ximalaya = Ximalaya::new()?;
            let sink = CsvSink::new(out);
            let store = db.map(|path| Store::open(&path)).transpose()?;
            let rows = ximalaya
                .crawl_albums(
                    &category,
                    &subcategory,
                    &filters,
                    pages,
                    workers,
                    Some(&sink),
                    store.as_ref(),
                )
                .await?;
            println!("Saved {} albums to {}", rows.len(), sink.path().display());
            Ok(())
        }
        Commands::AlbumDetails {
            ids,
            db,
            workers,
            out,
        } => {
            let ximalaya = Ximalaya::new()?;
            let sink = CsvSink::new(out);
            let store = db.map(|path| Store::open(&path)).transpose()?;
            let ids = resolve_ids(ids, store.as_ref())?;
            let rows = ximalaya
                .crawl_details(ids, workers, Some(&sink), store.as_ref())
                .await?;
            println!("Saved {} album details to {}", rows.len(), sink.path().display());
            Ok(())
        }
        Commands::Tracks {
            ids,
            db,
            workers,
            out,
        } => {
            let ximalaya = Ximalaya::new()?;
            let sink = CsvSink::new(out);
            let store = db.map(|path| Store::open(&path)).transpose()?;
            let ids = resolve_ids(ids, store.as_ref())?;
            let rows = ximalaya
                .crawl_tracks(ids, workers, Some(&sink), store.as_ref())
                .await?;
            println!("Saved {} tracks to {}", rows.len(), sink.path().display());
            Ok(())
        }
        Commands::Listing {
            category,
            pages,
            out,
        } => {
            let ximalaya = Ximalaya::new()?;
            let sink = CsvSink::new(out);
            let rows = ximalaya.crawl_listing(&category, pages, &sink).await?;
            println!("Saved {} album cards to {}", rows.len(), sink.path().display());
            Ok(())
        }
        Commands::Download { db, dir, workers } => {
            let store = Store::open(&db)?;
            let tracks = store.trial_tracks()?;
            if tracks.is_empty() {
                println!("No trial tracks in the store. Run 'tracks' first.");
                return Ok(());
            }
            println!("Downloading {} trial tracks...", tracks.len());
            let ximalaya = Ximalaya::new()?;
            let stats =
                download::download_tracks(ximalaya.http(), tracks, &dir, workers).await?;
            println!(
                "Done: {} of {} downloaded, {} failed.",
                stats.ok, stats.total, stats.errors
            );
            Ok(())
        }
        Commands::Stats { db } => {
            let store = Store::open(&db)?;
            let s = store.stats()?;
            println!("album_basic:  {}", s.album_basic);
            println!("album_detail: {}", s.album_detail);
            println!("album_track:  {}", s.album_track);
            println!("trial audio:  {}", s.trial_tracks);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result.map_err(Into::into)
}

/// Explicit ids win; otherwise the store's listing table feeds the crawl.
fn resolve_ids(ids: Vec<i64>, store: Option<&Store>) -> Result<Vec<i64>, Error> {
    if !ids.is_empty() {
        return Ok(ids);
    }
    let Some(store) = store else {
        return Err(Error::Config(
            "no album ids: pass --ids or --db with a populated album_basic table".into(),
        ));
    };
    let ids = store.album_ids()?;
    if ids.is_empty() {
        return Err(Error::Config(
            "the store's album_basic table is empty; run 'albums' first".into(),
        ));
    }
    Ok(ids)
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
