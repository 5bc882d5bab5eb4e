//! Webpolls server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webpolls_api::AppState;
use webpolls_common::Config;
use webpolls_core::{BroadcastHub, PollService, UserService};
use webpolls_db::repositories::{
    PollOptionRepository, PollRepository, PollVoteRepository, UserRepository,
};

/// Waits for a shutdown signal (SIGINT or SIGTERM), then stops the
/// broadcast hub so open live streams end and the server can drain.
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal(hub: BroadcastHub) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }

    hub.shutdown();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webpolls=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting webpolls server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = webpolls_db::init(&config).await?;
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    webpolls_db::migrate(&db).await?;
    info!("Migrations completed");

    let db = Arc::new(db);

    // Initialize repositories
    let user_repo = UserRepository::new(Arc::clone(&db));
    let poll_repo = PollRepository::new(Arc::clone(&db));
    let poll_option_repo = PollOptionRepository::new(Arc::clone(&db));
    let poll_vote_repo = PollVoteRepository::new(Arc::clone(&db));

    // Start the broadcast hub
    let hub = BroadcastHub::spawn(config.broadcast.subscriber_buffer);
    info!(
        buffer = config.broadcast.subscriber_buffer,
        "Broadcast hub started"
    );

    // Initialize services
    let user_service = UserService::new(user_repo);
    let poll_service = PollService::new(poll_repo, poll_option_repo, poll_vote_repo, hub.clone());

    let state = AppState::new(user_service, poll_service, &config);

    // Build router
    let app = Router::new()
        .nest("/api", webpolls_api::app(state))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server with graceful shutdown
    let ip: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::from((ip, config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
