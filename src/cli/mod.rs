use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::app::{self, AppState};
use crate::auth::{generate_jwt, Claims};
use crate::config;
use crate::database::seed::demo_catalog;
use crate::database::{DatabaseManager, MemoryStore, PgStore, Store};
use crate::types::Role;

#[derive(Parser)]
#[command(name = "cadre-api")]
#[command(about = "Learning progress and quiz API for community health cadre training")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server")]
    Serve {
        #[arg(long, help = "Port to listen on (defaults to API_PORT)")]
        port: Option<u16>,

        #[arg(long, help = "Use an in-memory store seeded with a demo catalog instead of Postgres")]
        memory: bool,
    },

    #[command(about = "Apply pending database migrations")]
    Migrate,

    #[command(about = "Mint a bearer token for local testing")]
    Token {
        #[arg(long)]
        user_id: Uuid,

        #[arg(long, default_value = "pengguna", help = "pengguna, admin or superadmin")]
        role: Role,

        #[arg(long)]
        email: Option<String>,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve { port, memory } => serve(port, memory).await,
        Commands::Migrate => {
            let pool = DatabaseManager::main_pool().await.context("connecting to database")?;
            DatabaseManager::run_migrations(&pool).await?;
            DatabaseManager::close().await;
            Ok(())
        }
        Commands::Token { user_id, role, email } => {
            ensure_secret()?;
            let token = generate_jwt(&Claims::new(user_id, email, role))?;
            println!("{}", token);
            Ok(())
        }
    }
}

fn ensure_secret() -> anyhow::Result<()> {
    let config = config::config();
    if config.security.jwt_secret.is_empty() {
        bail!("JWT_SECRET must be set in {:?}", config.environment);
    }
    Ok(())
}

async fn serve(port: Option<u16>, memory: bool) -> anyhow::Result<()> {
    let config = config::config();
    ensure_secret()?;
    if memory && crate::is_production!() {
        bail!("the in-memory store is not available in production");
    }

    let store: Arc<dyn Store> = if memory {
        let store = MemoryStore::new();
        let demo = demo_catalog(&store).await;
        info!(
            admin_id = %demo.admin_id,
            learner_id = %demo.learner_id,
            module_id = %demo.module_id,
            "Seeded in-memory demo catalog"
        );
        Arc::new(store)
    } else {
        let pool = DatabaseManager::main_pool().await.context("connecting to database")?;
        if config.database.run_migrations {
            DatabaseManager::run_migrations(&pool).await?;
        }
        Arc::new(PgStore::new(pool))
    };

    let router = app::router(AppState::new(store));
    let bind_addr = format!("0.0.0.0:{}", port.unwrap_or(config.api.port));
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    info!("Cadre API listening on http://{} in {:?} mode", bind_addr, config.environment);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    DatabaseManager::close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutting down");
}
