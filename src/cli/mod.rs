//! # CLI Module
//!
//! Command implementations for the `spotwatch` binary. Each command builds a
//! [`SpotifyClient`] from the loaded [`Config`], runs one operation and reports
//! the outcome with the crate's status macros.
//!
//! ## Commands
//!
//! - [`auth`] - authorize the application and store the credential
//! - [`watch`] - print playback changes until interrupted
//! - [`search`] - look up a track, artist, album or playlist
//! - [`playlists`] - list or create playlists
//! - [`recent`] - recently played tracks
//! - [`me`] - profile and current playback of the authorized user
//!
//! Commands terminate the process through [`error!`](crate::error!) on
//! unrecoverable failures, after printing a hint where one exists.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::{SpotifyClient, config::Config, error, error::Error};

mod auth;
mod me;
mod playlists;
mod recent;
mod search;
mod watch;

pub use auth::auth;
pub use me::me;
pub use playlists::{create_playlist, playlists};
pub use recent::recent;
pub use search::search;
pub use watch::watch;

/// Builds a client and seeds it with the stored credential.
async fn connect(config: &Config) -> SpotifyClient {
    let client = match SpotifyClient::from_config(config) {
        Ok(client) => client,
        Err(e) => error!("Cannot create client. Err: {}", e),
    };

    match client.load_stored_credential().await {
        Ok(true) => {}
        Ok(false) if config.refresh_token.is_some() => {}
        Ok(false) => error!("No stored credential. Please run spotwatch auth"),
        Err(e) => error!("Failed to load stored credential. Err: {}", e),
    }

    client
}

/// Prints `e` and exits, pointing at `spotwatch auth` when the refresh token
/// is no longer accepted.
fn fail(context: &str, e: Error) -> ! {
    if e.requires_reauthentication() {
        error!("{}: {}\nPlease run spotwatch auth", context, e);
    }
    error!("{}: {}", context, e)
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb
}
