use tokio::sync::broadcast::error::RecvError;

use crate::{
    config::Config,
    info,
    types::{EventKind, PlaybackSnapshot},
    utils, warning,
};

fn describe(snapshot: &PlaybackSnapshot) -> String {
    let name = snapshot.track_name.as_deref().unwrap_or("<unknown>");
    let artists = snapshot
        .raw
        .get("item")
        .map(utils::artist_names)
        .unwrap_or_default();

    let position = format!(
        "{}/{}",
        utils::format_duration_ms(snapshot.progress_ms),
        utils::format_duration_ms(snapshot.duration_ms)
    );

    if artists.is_empty() {
        format!("{name} [{position}]")
    } else {
        format!("{name} by {artists} [{position}]")
    }
}

/// Prints playback changes until Ctrl-C.
pub async fn watch(config: &Config) {
    let client = super::connect(config).await;

    let mut events = client.playback_events();
    let mut errors = client.playback_errors();
    client.start_watching();
    info!(
        "Watching playback every {} ms, press Ctrl-C to stop",
        config.poll_interval.as_millis()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            event = events.recv() => match event {
                Ok(event) => match event.kind {
                    EventKind::NewTrack => info!("Now playing: {}", describe(&event.snapshot)),
                    EventKind::TrackSkipped => warning!("Skipped: {}", describe(&event.snapshot)),
                },
                Err(RecvError::Lagged(missed)) => warning!("Missed {} playback events", missed),
                Err(RecvError::Closed) => break,
            },

            failure = errors.recv() => match failure {
                Ok(failure) if failure.error.requires_reauthentication() => {
                    client.stop_watching().await;
                    super::fail("Playback poll failed", failure.error);
                }
                Ok(failure) => warning!("Playback poll failed: {}", failure.error),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.stop_watching().await;
    info!("Stopped watching");
}
