//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Search book sources and download results.
///
/// The store client behind a personal e-reader: searches two upstream
/// book-metadata sources, resolves download links, and performs resumable
/// downloads.
#[derive(Parser, Debug)]
#[command(name = "bookstore")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search both sources and print the merged, deduplicated results
    Search {
        /// Free-text query (title, author, ...)
        query: String,

        /// Comma-separated format filter, e.g. "pdf,epub"
        #[arg(long, value_delimiter = ',')]
        formats: Vec<String>,

        /// Result page (pages beyond 1 are served by the api source only)
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Skip the api source
        #[arg(long)]
        no_api: bool,

        /// Skip the catalog source
        #[arg(long)]
        no_catalog: bool,

        /// Per-source timeout in seconds
        #[arg(long, default_value_t = 15, value_parser = clap::value_parser!(u64).range(1..=300))]
        timeout: u64,
    },

    /// Download a resolved URL to disk, resuming any partial file
    Get {
        /// Direct download URL
        url: String,

        /// Output directory
        #[arg(short, long, default_value = "downloads")]
        output: PathBuf,

        /// File name (derived from the URL when omitted)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show catalog mirror health, or clear it
    Mirrors {
        /// Clear all recorded mirror failure history
        #[arg(long)]
        reset: bool,
    },
}
