/// Aegis Auth - user authentication and session backend
///
/// JWT access tokens over single-use rotating refresh sessions, with an
/// audit trail and an admin surface for user and session management.

mod account;
mod activity;
mod admin;
mod api;
mod auth;
mod config;
mod context;
mod db;
mod error;
mod jobs;
mod server;
mod session;
mod token;

use config::ServerConfig;
use context::AppContext;
use error::AuthResult;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> AuthResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aegis_auth=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    // Load configuration
    let config = ServerConfig::from_env()?;

    // Create application context
    let ctx = AppContext::new(config).await?;
    let ctx = Arc::new(ctx);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    ___             _           ___         __  __
   /   | ___  ____ _(_)____     /   | __  __/ /_/ /_
  / /| |/ _ \/ __ `/ / ___/    / /| |/ / / / __/ __ \
 / ___ /  __/ /_/ / (__  )    / ___ / /_/ / /_/ / / /
/_/  |_\___/\__, /_/____/    /_/  |_\__,_/\__/_/ /_/
           /____/

        User Authentication Service v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
