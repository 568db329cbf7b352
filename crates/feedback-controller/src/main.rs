//! Feedback Controller
//!
//! Stateful server core for anonymized peer-feedback sessions.
//!
//! This binary hosts the actor system on its own: it loads configuration
//! from the environment, initializes tracing, spawns the
//! `SessionControllerActor` and waits for a shutdown signal. Transport
//! frontends (HTTP routing, real-time push) attach to the
//! [`feedback_controller`] library through the controller handle and the
//! event hub; they are separate deployables.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing subscriber
//! 3. Create the event hub and expiration scheduler
//! 4. Spawn the `SessionControllerActor`
//! 5. Wait for SIGTERM/ctrl-c, then drain gracefully

use std::sync::Arc;
use std::time::Duration;

use feedback_controller::actors::{ActorMetrics, SessionControllerActorHandle};
use feedback_controller::config::Config;
use feedback_controller::events::EventHub;
use feedback_controller::scheduler::ExpirationScheduler;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Time allowed for the controller to drain after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feedback_controller=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Feedback Controller");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        fc_id = %config.fc_id,
        free_session_ttl_seconds = config.free_session_ttl_seconds,
        max_sessions = config.max_sessions,
        max_rooms_per_session = config.max_rooms_per_session,
        event_channel_capacity = config.event_channel_capacity,
        "Configuration loaded successfully"
    );

    // Initialize the shared components
    let hub = Arc::new(EventHub::new(config.event_channel_capacity));
    let scheduler = ExpirationScheduler::new();
    let metrics = ActorMetrics::new();

    // Spawn the actor system
    info!("Initializing actor system...");
    let controller = SessionControllerActorHandle::new(
        config,
        Arc::clone(&hub),
        Arc::clone(&scheduler),
        Arc::clone(&metrics),
    );
    info!("Actor system initialized");

    // Wait for shutdown signal
    wait_for_shutdown_signal().await;
    info!("Shutdown signal received, draining...");

    if let Err(err) = controller.shutdown().await {
        error!(error = %err, "Graceful shutdown request failed, cancelling");
        controller.cancel();
    }

    tokio::time::sleep(SHUTDOWN_GRACE).await;

    info!(
        sessions = metrics.session_count(),
        aggregations = metrics.aggregations(),
        "Feedback Controller stopped"
    );

    Ok(())
}

/// Wait for SIGTERM (unix) or ctrl-c.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler, using ctrl-c only");
                let _ = signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}
