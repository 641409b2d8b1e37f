use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use newspod::config::{Config, OutputFormat};
use newspod::storage::{Database, Entry, EntryDetail, Feed, FeedDetails, SearchHit, Stats};
use newspod::util::{
    format_date_millis, strip_control_chars, truncate_to_width, MAX_SEARCH_QUERY_LENGTH,
};

/// Column budget for titles in list output.
const TITLE_WIDTH: usize = 60;

#[derive(Parser, Debug)]
#[command(
    name = "newspod",
    version,
    about = "Browse a remote podcast catalog without downloading it"
)]
struct Args {
    /// Catalog URL or local path (overrides the config file)
    #[arg(long, env = "NEWSPOD_DB", value_name = "LOCATOR")]
    db: Option<String>,

    /// Config file (default: ~/.config/newspod/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List feeds, most recently published first
    Feeds {
        /// Only feeds carrying this tag
        #[arg(long)]
        tag: Option<String>,
    },
    /// List the entries of one feed
    Entries { feed_id: i64 },
    /// Show the details of one feed
    Feed { feed_id: i64 },
    /// Full-text search over entry titles and descriptions
    Search { term: String },
    /// Show the description of one entry
    Entry {
        entry_id: i64,
        /// Highlight matches of this search term
        #[arg(long)]
        term: Option<String>,
    },
    /// Most recent entries across all feeds
    Latest {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Catalog counts and size
    Stats,
    /// List tags
    Tags,
    /// Feeds, stats and tags in one go
    Snapshot,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries results; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = args.config.clone().or_else(Config::default_path);
    let config = match &config_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    let locator = args
        .db
        .clone()
        .or_else(|| config.locator.clone())
        .context("No catalog given: pass --db, set NEWSPOD_DB, or set `locator` in the config file")?;

    let output = if args.json {
        OutputFormat::Json
    } else {
        config.output
    };

    let db = Database::open(&locator, config.backend)
        .with_context(|| format!("Invalid catalog locator '{}'", locator))?;

    let result = run(&db, args.command, output).await;
    db.close().await;
    result
}

async fn run(db: &Database, command: Command, output: OutputFormat) -> Result<()> {
    match command {
        Command::Feeds { tag } => {
            let feeds = match tag {
                Some(tag) => db.list_feeds_tagged(&tag).await?,
                None => db.list_feeds().await?,
            };
            emit(output, &feeds, |f| print_feeds(f))
        }
        Command::Entries { feed_id } => {
            let entries = db.list_entries(feed_id).await?;
            emit(output, &entries, |e| print_entries(e))
        }
        Command::Feed { feed_id } => {
            let details = db
                .get_feed_details(feed_id)
                .await?
                .with_context(|| format!("Feed {} not found", feed_id))?;
            emit(output, &details, print_feed_details)
        }
        Command::Search { term } => {
            if term.len() > MAX_SEARCH_QUERY_LENGTH {
                anyhow::bail!(
                    "Search term is longer than {} bytes",
                    MAX_SEARCH_QUERY_LENGTH
                );
            }
            let hits = db.search(&term).await?;
            emit(output, &hits, |h| print_hits(h))
        }
        Command::Entry { entry_id, term } => {
            let detail = db
                .get_entry_detail(entry_id, term.as_deref())
                .await?
                .with_context(|| match &term {
                    Some(t) if !t.is_empty() => {
                        format!("Entry {} not found or does not match '{}'", entry_id, t)
                    }
                    _ => format!("Entry {} not found", entry_id),
                })?;
            emit(output, &detail, print_entry_detail)
        }
        Command::Latest { limit } => {
            let entries = db.latest_entries(limit).await?;
            emit(output, &entries, |e| print_entries(e))
        }
        Command::Stats => {
            let stats = db.get_stats().await?;
            emit(output, &stats, print_stats)
        }
        Command::Tags => {
            let tags: Vec<String> = db.list_tags().await?.into_iter().map(|t| t.name).collect();
            emit(output, &tags, |tags| {
                for tag in tags {
                    println!("{}", strip_control_chars(tag));
                }
            })
        }
        Command::Snapshot => {
            let snapshot = db.snapshot().await?;
            emit(output, &snapshot, |s| {
                print_stats(&s.stats);
                println!("tags: {}", strip_control_chars(&s.tags.join(", ")));
                println!();
                print_feeds(&s.feeds);
            })
        }
    }
}

fn emit<T: Serialize + ?Sized>(output: OutputFormat, value: &T, text: impl FnOnce(&T)) -> Result<()> {
    match output {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value).context("Failed to encode JSON")?;
            println!("{}", json);
        }
        OutputFormat::Text => text(value),
    }
    Ok(())
}

// ============================================================================
// Text Output
// ============================================================================

fn title(raw: &str) -> String {
    truncate_to_width(&strip_control_chars(raw), TITLE_WIDTH).into_owned()
}

fn print_feeds(feeds: &[Feed]) {
    for feed in feeds {
        println!("{:>6}  {:>5}  {}", feed.id, feed.entry_count, title(&feed.title));
    }
}

fn print_entries(entries: &[Entry]) {
    for entry in entries {
        println!(
            "{:>8}  {}  {}",
            entry.id,
            format_date_millis(entry.date_millis),
            title(&entry.title)
        );
    }
}

fn print_hits(hits: &[SearchHit]) {
    for hit in hits {
        println!(
            "{:>8}  feed {:>5}  {}  {}",
            hit.id,
            hit.feed_id,
            format_date_millis(hit.date_millis),
            title(&hit.title)
        );
    }
}

fn print_feed_details(details: &FeedDetails) {
    let field = |name: &str, value: &Option<String>| {
        if let Some(v) = value {
            println!("{:<12} {}", name, strip_control_chars(v));
        }
    };
    println!("{:<12} {}", "url", strip_control_chars(&details.url));
    field("home", &details.home);
    field("author", &details.author);
    field("language", &details.language);
    field("image", &details.image);
    if let Some(description) = &details.description {
        println!();
        println!("{}", strip_control_chars(description));
    }
}

fn print_entry_detail(detail: &EntryDetail) {
    println!("{}", strip_control_chars(detail.content()));
}

fn print_stats(stats: &Stats) {
    println!("podcasts: {}", stats.feed_count);
    println!("entries:  {}", stats.entry_count);
    println!("size:     {} bytes", stats.db_size);
}
