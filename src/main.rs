mod advisor;
mod args;
mod credentials;
mod db;
mod domain;
mod error;
mod handlers;
mod logging;
mod model;
mod openai;
mod session;

use std::{sync::Arc, time::Duration};

use advisor::Advisor;
use args::parse_args;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use credentials::CredentialStore;
use db::{create_pool, migrate};
use handlers::{
    add_transaction, chat, get_summary, get_transactions, health, login, not_found, register,
};
use logging::setup_logging;
use model::Ledger;
use openai::OpenAiProvider;
use session::SessionIssuer;
use sqlx::SqlitePool;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub struct AppState {
    pool: SqlitePool,
    credentials: CredentialStore,
    sessions: SessionIssuer,
    ledger: Ledger,
    advisor: Advisor,
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            HeaderValue::from_str(origin)
                .inspect_err(|err| tracing::error!("Ignoring CORS origin {}: {}", origin, err))
                .ok()
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

pub fn router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route(
            "/api/transactions",
            get(get_transactions).post(add_transaction),
        )
        .route("/api/summary", get(get_summary))
        .route("/api/chat", post(chat))
        .route("/", get(health))
        .fallback(not_found)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!("Failed to listen for SIGTERM: {}", err),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down server...");
}

#[tokio::main]
async fn main() {
    let args = parse_args();

    setup_logging(&args.base_log_dir);

    let pool = create_pool(&args.database_url)
        .await
        .expect("Failed to create SQLite pool");
    migrate(&pool)
        .await
        .expect("Failed to create database schema");
    tracing::info!("Database initialized at {}", &args.database_url);

    let hash_params = argon2::Params::new(
        args.hash_memory_kib,
        args.hash_iterations,
        args.hash_parallelism,
        None,
    )
    .expect("Invalid password hashing parameters");

    let provider = OpenAiProvider::new(
        args.openai_api_key,
        &args.openai_base_url,
        args.openai_model,
        Duration::from_secs(args.provider_timeout_secs),
    )
    .expect("Failed to build completion provider client");
    if !provider.is_configured() {
        tracing::warn!("No completion provider API key configured, chat will serve canned tips");
    }

    let ledger = Ledger::new(pool.clone());
    let app_state = Arc::new(AppState {
        credentials: CredentialStore::new(pool.clone(), hash_params)
            .expect("Failed to prepare password hashing"),
        sessions: SessionIssuer::new(
            args.jwt_secret.as_bytes(),
            chrono::Duration::hours(args.session_ttl_hours),
        ),
        advisor: Advisor::new(
            ledger.clone(),
            Arc::new(provider),
            Duration::from_secs(args.provider_timeout_secs),
        ),
        ledger,
        pool,
    });

    let app = router(app_state.clone(), &args.cors_origins);

    let bind_address = format! {"0.0.0.0:{}", args.port};
    tracing::info!("Server listening on {}...", bind_address);

    let listener = tokio::net::TcpListener::bind(bind_address).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    app_state.pool.close().await;
    tracing::info!("Database closed");
}
