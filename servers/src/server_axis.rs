//! # Axis Console Server
//!
//! Serves the operator console: the JSON control API, the Server-Sent Events
//! stream and the static web UI.
//!
//! ## Functionality:
//! - **State Restore**: loads the persisted mode and status overlay at startup.
//! - **Scheduler**: a one-second heartbeat that pushes registry snapshots to
//!   every connected browser while the console is in AUTO mode.
//! - **Workspace Provider**: inventory and identity come from the Google
//!   Workspace REST APIs.
//! - **Graceful Shutdown**: `tokio-graceful` stops the HTTP server and the
//!   scheduler on Ctrl-C / SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use static_init::dynamic;
use tokio::net::TcpListener;
use tokio_graceful::Shutdown;
use tracing::{error, info, warn};

use lib_axis::inventory::{IdentityProvider, WorkspaceService};
use lib_axis::{Console, Dispatcher, Scheduler, UserProfile};

mod axis_logic;
use axis_logic::{config, logger, routes};

// load .env files before anything else
#[dynamic]
static DOTENV_INIT: () = {
    let dotenv_os: &str = if cfg!(target_os = "windows") {
        ".env.windows"
    } else {
        ".env.linux"
    };

    dotenvy::dotenv().ok();
    dotenvy::from_filename(dotenv_os).ok();
};

/// Looks up the operator profile. Failure is not fatal: `/api/user` answers
/// 503 for the lifetime of the process.
async fn resolve_user(identity: &dyn IdentityProvider, email: Option<&str>) -> Option<UserProfile> {
    let Some(email) = email else {
        warn!("No operator email configured. User profile unavailable.");
        return None;
    };
    match identity.get_profile(email).await {
        Ok(profile) => {
            info!("Operator: {} <{}>", profile.name, profile.email);
            Some(profile)
        }
        Err(e) => {
            error!("Unable to retrieve user {}: {}", email, e);
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config();
    let _log_guard = logger::setup_logging(config.log_dir(), config.log_level(), "server_axis")?;
    match serde_json::to_string(&config) {
        Ok(json) => info!("Configuration: {}", json),
        Err(e) => warn!("Unable to render configuration: {}", e),
    }

    let service = Arc::new(WorkspaceService::new(
        &config.endpoints(),
        config.access_token.clone(),
    )?);
    let hub = Dispatcher::new(config.mailbox_capacity(), config.eviction_threshold());
    let console = Console::open(config.state_file(), service.clone(), hub);
    info!("Mode on startup: {}", console.current_mode().await);

    let user = resolve_user(service.as_ref(), config.user_email.as_deref()).await;

    let scheduler = Scheduler::new(Arc::clone(&console), config.scheduler());
    let state = Arc::new(routes::AppState { console, user });
    let app = routes::router(state, config.static_dir.as_deref());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port()));
    let listener = TcpListener::bind(addr).await?;
    info!("Axis server active on {} (SSE enabled)", listener.local_addr()?);

    let shutdown: Shutdown = Shutdown::default();

    shutdown.spawn_task_fn(move |guard| async move {
        scheduler.run(guard.cancelled()).await;
    });

    shutdown.spawn_task_fn(move |guard| async move {
        let signal = async move { guard.cancelled().await };
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(signal).await {
            error!("HTTP server error: {}", e);
        }
    });

    match shutdown.shutdown_with_limit(Duration::from_secs(10)).await {
        Ok(elapsed) => {
            info!(
                "shutdown: gracefully {}s after shutdown signal received",
                elapsed.as_secs_f64()
            );
        }
        Err(e) => {
            warn!("shutdown: forcefully due to timeout: {}", e);
        }
    }

    info!("Bye!");
    Ok(())
}
