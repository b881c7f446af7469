//! Resumable HTTP downloads, streamed to disk.
//!
//! # Features
//!
//! - Streaming downloads (memory-efficient for large files)
//! - Byte-range resume from an existing partial file
//! - Per-chunk progress callbacks with a monotonic fraction
//! - Cooperative cancellation that is never retried
//! - Structured error types with full context
//!
//! # Example
//!
//! ```no_run
//! use bookstore_core::download::{CancelToken, Downloader};
//! use std::path::Path;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = Downloader::new();
//! let cancel = CancelToken::new();
//! let path = downloader
//!     .download(
//!         "https://dl.bookcat.is/main/abc",
//!         Path::new("./downloads/dune.epub"),
//!         None,
//!         Duration::from_secs(600),
//!         &cancel,
//!     )
//!     .await?;
//! match path {
//!     Some(path) => println!("Downloaded: {}", path.display()),
//!     None => println!("Cancelled"),
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod filename;

pub use client::{CancelToken, Downloader, ProgressFn};
pub use error::DownloadError;
pub use filename::sanitize_filename;
