//! CLI entry point for the bookstore client.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use bookstore_core::{BookStore, BookStoreConfig, CancelToken, SourceToggles, sanitize_filename};

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (warn)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    match args.command {
        Command::Search {
            query,
            formats,
            page,
            no_api,
            no_catalog,
            timeout,
        } => {
            let store = BookStore::new();
            let toggles = SourceToggles {
                api: !no_api,
                catalog: !no_catalog,
            };
            let results = store
                .search(
                    &query,
                    &formats,
                    page,
                    toggles,
                    Some(Duration::from_secs(timeout)),
                )
                .await;

            if results.is_empty() {
                println!("No results for '{query}'.");
                return Ok(());
            }

            for (index, record) in results.iter().enumerate() {
                let author = record.author.as_deref().unwrap_or("unknown author");
                let year = record.year.as_deref().unwrap_or("----");
                let size = record.file_size.as_deref().unwrap_or("?");
                println!(
                    "{:>3}. [{}] {} - {} ({year}, {}, {size}) {}",
                    index + 1,
                    record.source,
                    record.display_title(),
                    author,
                    record.extension,
                    if record.content_hash.is_empty() {
                        String::new()
                    } else {
                        format!("#{}", record.content_hash)
                    },
                );
            }
            info!(results = results.len(), "search finished");
        }

        Command::Get { url, output, name } => {
            let config = BookStoreConfig {
                download_dir: output,
                ..BookStoreConfig::default()
            };
            let store = BookStore::with_config(config);

            let file_name = name.unwrap_or_else(|| {
                url.rsplit('/')
                    .next()
                    .filter(|segment| !segment.is_empty())
                    .map_or_else(|| "download".to_string(), |s| sanitize_filename(s))
            });

            let bar = ProgressBar::new(1000);
            bar.set_style(
                ProgressStyle::with_template("{bar:40} {percent:>3}% {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            let bar_for_progress = bar.clone();
            let on_progress = move |fraction: f64| {
                bar_for_progress.set_position((fraction * 1000.0) as u64);
            };

            // Ctrl-C cancels the transfer; the partial file stays for resume.
            let cancel = CancelToken::new();
            let cancel_on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling download");
                    cancel_on_signal.cancel();
                }
            });

            match store
                .download(&url, &file_name, Some(&on_progress), &cancel)
                .await
            {
                Ok(Some(path)) => {
                    bar.finish_with_message("done");
                    println!("Saved to {}", path.display());
                }
                Ok(None) => {
                    bar.abandon_with_message("cancelled");
                    println!("Download cancelled; partial file kept for resume.");
                }
                Err(error) => {
                    bar.abandon_with_message("failed");
                    return Err(error.into());
                }
            }
        }

        Command::Mirrors { reset } => {
            let store = BookStore::new();
            if reset {
                store.reset_mirror_health();
                println!("Mirror health history cleared.");
            }
            for mirror in store.mirror_health_snapshot() {
                let state = if mirror.healthy { "healthy" } else { "unhealthy" };
                let cooldown = if mirror.in_cooldown {
                    format!(" (cooling down, {}m window)", mirror.cooldown_minutes)
                } else {
                    String::new()
                };
                println!(
                    "{:<24} {state:<9} failures={} last_rt={}ms{cooldown}",
                    mirror.endpoint, mirror.consecutive_failures, mirror.response_time_ms,
                );
            }
        }
    }

    Ok(())
}
