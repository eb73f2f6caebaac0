//! # feed_watch
//!
//! Follows a live feed from the terminal: prints each new message once, reports
//! transport changes, and optionally registers views on the given entities.
//!
//! Configuration is layered: built-in defaults, then `feed_watch.json5` (or
//! `--config-path`), then `FEED_*` environment variables (a `.env` file is
//! honored), then command-line flags.

use anyhow::Result;
use lib_livefeed::{FeedController, TransportState};
use std::sync::Arc;
use tokio::signal;

mod watch_logic;
use watch_logic::{config, logger, printer::NewMessages};

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls (wss:// push URLs)
    let _ = rustls::crypto::ring::default_provider().install_default();
    dotenvy::dotenv().ok();

    let settings = config::load_settings()?;
    logger::setup_logging(&settings.log_dir, &settings.log_level)?;
    log::info!(
        "Watching {} (push {}), keeping the newest {} messages.",
        settings.feed.base_url,
        settings.feed.push_url,
        settings.feed.buffer_capacity
    );

    let feed = FeedController::remote(settings.feed.clone())?;

    let printer = Arc::new(NewMessages::default());
    let _messages = feed.subscribe(move |window| printer.print(window));
    let _views = feed.subscribe_views(|views| {
        for (entity, entry) in views.iter() {
            log::debug!("views[{}] = {} (flash {}, confirmed {})", entity, entry.count, entry.flash, entry.confirmed);
        }
    });

    let handle = feed.start()?;

    let mut states = feed.transport_watch();
    let reporter = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            match state {
                TransportState::PushActive => log::info!("Receiving messages over push."),
                TransportState::PollingActive => log::info!("Receiving messages by polling."),
                other => log::debug!("Transport is {:?}", other),
            }
        }
    });

    for entity in &settings.views {
        let pending = feed.request_view_increment(entity);
        println!("{} views (pending)", pending.optimistic());
        tokio::spawn(async move {
            let entity = pending.entity_id().to_string();
            let outcome = pending.settled().await;
            log::info!("View on '{}' settled: {:?}", entity, outcome);
        });
    }

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = terminate() => {
            log::info!("SIGTERM received, initiating shutdown.");
        }
    }

    feed.stop(handle);
    reporter.abort();

    log::info!("Shutdown complete.");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut term_signal) => {
            term_signal.recv().await;
        }
        Err(e) => {
            log::warn!("Cannot listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    // On non-unix platforms, just wait forever.
    std::future::pending::<()>().await;
}
