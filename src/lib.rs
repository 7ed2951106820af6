//! # fansly-live
//!
//! This crate records Fansly livestreams. It looks up a creator through the
//! Fansly API, resolves the playback URL of their current stream and hands it
//! to `ffmpeg`, which copies the stream into an `.mp4` without re-encoding.
//!
//! ## Usage
//!
//! The `fansly-live` binary wires everything together, but the pieces can be
//! used on their own. The following example records a single stream.
//!
//! ```rust,no_run
//! use clap::Parser;
//! use fansly_live::{api::FanslyClient, config, ffmpeg::Ffmpeg, shutdown::Shutdown, worker};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Flags, .env file and environment, resolved once
//!     let cli = config::Cli::parse_from(["fansly-live", "some_creator", "--token", "..."]);
//!     let config = config::Config::from_cli(cli).unwrap();
//!
//!     // Client for the Fansly API, retries transient HTTP errors on its own
//!     let client = FanslyClient::new(&config).unwrap();
//!
//!     // Record, retrying transient failures of the whole sequence
//!     let shutdown = Shutdown::default();
//!     let recording = worker::run(&client, &Ffmpeg::default(), &config, &shutdown)
//!         .await
//!         .unwrap();
//!     println!("Saved to {}", recording.video.display());
//! }
//! ```
//!
//! Recordings land in `<base>/FanslyDownloader/Fansly/<creator>/`, named after
//! the local start time of the stream. With `--metadata`, the stream record
//! is saved as `<base>/<start>.json`.

#![forbid(unsafe_code)]
#[macro_use]
extern crate log;

pub mod api;
pub mod config;
pub mod ffmpeg;
pub mod metadata;
pub mod retry;
pub mod shutdown;
pub mod stream;
pub mod util;
pub mod worker;
