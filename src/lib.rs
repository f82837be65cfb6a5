//! Spotify Web API client with OAuth token lifecycle and playback watching.
//!
//! The library keeps an OAuth credential fresh without redundant refreshes,
//! watches the user's playback for track changes and camelCases every response
//! payload. A small CLI built on top of it lives in `main.rs`.
//!
//! # Modules
//!
//! - `client` - [`SpotifyClient`], the resource methods and its builder
//! - `token` - OAuth credential lifecycle with single-flight refresh
//! - `watcher` - polling playback state machine and its event streams
//! - `normalize` - snake_case → camelCase key transform
//! - `transport`, `clock`, `timer`, `store` - injectable collaborators
//! - `config` - configuration from the environment and `.env`
//! - `server`, `api` - local OAuth callback server
//! - `cli` - command implementations of the binary
//! - `types`, `utils`, `error` - shared types and helpers
//!
//! # Example
//!
//! ```rust,ignore
//! use spotwatch::{SpotifyClient, types::EventKind};
//!
//! #[tokio::main]
//! async fn main() -> spotwatch::Result<()> {
//!     let client = SpotifyClient::builder()
//!         .client_id("id")
//!         .client_secret("secret")
//!         .refresh_token("refresh")
//!         .listen_for_playback_changes(true)
//!         .build()?;
//!
//!     let mut events = client.playback_events();
//!     while let Ok(event) = events.recv().await {
//!         if event.kind == EventKind::NewTrack {
//!             println!("{:?}", event.snapshot.track_name);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod normalize;
pub mod server;
pub mod store;
pub mod timer;
pub mod token;
pub mod transport;
pub mod types;
pub mod utils;
pub mod watcher;

pub use client::{ClientBuilder, SpotifyClient};
pub use error::{AuthStage, Error, Result};
pub use normalize::normalize;
pub use token::TokenManager;
pub use watcher::PlaybackWatcher;

/// Prints an informational message with a blue bullet point.
///
/// Accepts the same arguments as `println!`.
///
/// ```rust,ignore
/// info!("Watching playback every {} ms", interval);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a success message with a green checkmark.
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints an error message with a red exclamation mark and exits the program
/// with status 1.
///
/// Only for unrecoverable failures in the binary; library code returns
/// [`Error`] instead.
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Prints a warning message with a yellow exclamation mark.
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
