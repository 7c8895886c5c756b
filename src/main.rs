#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
#![warn(clippy::perf)]
#![warn(clippy::complexity)]
#![warn(clippy::style)]
#![allow(clippy::multiple_crate_versions)]

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use catalog::Catalog;
use clap::Parser;
use fetch::HttpFetcher;
use indicatif::{ProgressBar, ProgressStyle};
use listing::fetch_listing;
use playlist::{ensure_writable, entries, write_channel_list};
use reqwest::Url;
use resolver::{ResolverSettings, StreamResolver};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use util::{init_http_client, spawn_ct_watcher, spawn_deadline_watcher, truncate_string};

pub mod catalog;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod listing;
pub mod playlist;
pub mod prioritize;
pub mod resolver;
pub mod structs;
pub mod synth;
pub mod traverse;
pub mod util;
pub mod validate;

/// Builds an M3U channel list of today's live match streams
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Page listing the day's events
    #[arg(
        long,
        env = "SOURCE_LISTING_URL",
        default_value = "https://calcio.beer/streaming-gratis-calcio-1.php"
    )]
    source_listing_url: Url,

    /// Where the channel list is written
    #[arg(short, long, env = "OUTPUT_PATH", default_value = "serie_a.m3u8")]
    output_path: PathBuf,

    /// Only events whose category contains this text are resolved. Empty accepts all.
    #[arg(long, env = "SEARCH_TERM", default_value = "Serie A")]
    search_term: String,

    /// Minimum spacing between two requests to the same host
    #[arg(long, env = "POLITENESS_DELAY_MS", default_value_t = 2000)]
    politeness_delay_ms: u64,

    /// How many levels of nested frames are followed below an event page
    #[arg(long, env = "MAX_FRAME_DEPTH", default_value_t = 3)]
    max_frame_depth: u32,

    /// Events resolved in parallel
    #[arg(short = 'w', long, env = "MAX_WORKERS", default_value_t = 4)]
    max_workers: usize,

    /// Wall-clock budget for the whole run. Unfinished events are dropped once it runs out.
    #[arg(long, env = "RUN_DEADLINE_MS", default_value_t = 300_000)]
    run_deadline_ms: u64,

    /// Timeout of each candidate probe
    #[arg(long, env = "PROBE_TIMEOUT_MS", default_value_t = 5000)]
    probe_timeout_ms: u64,

    /// Timeout of each page fetch
    #[arg(long, env = "FETCH_TIMEOUT_MS", default_value_t = 30_000)]
    fetch_timeout_ms: u64,

    /// JSON file overriding the built-in site catalog
    #[arg(long, env = "CATALOG")]
    catalog: Option<PathBuf>,

    /// Only check reachability, without parsing candidates as playlists
    #[arg(long)]
    skip_manifest_probe: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    ensure_writable(&args.output_path).await?;
    let catalog = Arc::new(match &args.catalog {
        Some(path) => Catalog::load(path).await?,
        None => Catalog::default(),
    });

    let fetch_timeout = Duration::from_millis(args.fetch_timeout_ms);
    let fetcher = Arc::new(HttpFetcher::new(
        init_http_client()?,
        Duration::from_millis(args.politeness_delay_ms),
    ));

    let ct = CancellationToken::new();
    spawn_ct_watcher(ct.clone());
    spawn_deadline_watcher(ct.clone(), Duration::from_millis(args.run_deadline_ms));

    info!("Scanning listing {}", args.source_listing_url);
    let events = fetch_listing(
        fetcher.as_ref(),
        &args.source_listing_url,
        &catalog.listing,
        &args.search_term,
        fetch_timeout,
    )
    .await
    .context("Listing page unavailable")?;
    info!(
        "Found {} events matching `{}`",
        events.len(),
        args.search_term
    );

    let resolver = Arc::new(StreamResolver::new(
        fetcher,
        catalog,
        ResolverSettings {
            max_frame_depth: args.max_frame_depth,
            fetch_timeout,
            probe_timeout: Duration::from_millis(args.probe_timeout_ms),
            probe_manifests: !args.skip_manifest_probe,
            ..ResolverSettings::default()
        },
    )?);

    let progress = ProgressBar::new(events.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} events")
            .context("Building progress bar style")?,
    );

    let results = resolver
        .resolve_all(events, args.max_workers, ct, &progress)
        .await;
    progress.finish_and_clear();

    let (resolved, unresolved): (Vec<_>, Vec<_>) = results.iter().partition(|r| r.is_resolved());
    for r in &resolved {
        if let Some(url) = &r.stream_url {
            info!("{}: {}", r.event.title, truncate_string(url, 120));
        }
    }
    for r in &unresolved {
        if let Some(reason) = r.failure {
            warn!("{}: {reason}", r.event.title);
        }
    }
    info!(
        "Resolved {} of {} events ({} unresolved)",
        resolved.len(),
        results.len(),
        unresolved.len()
    );

    let today = chrono::Local::now().date_naive();
    write_channel_list(&args.output_path, &entries(&results, today)).await?;

    info!("All done!");
    Ok(())
}
