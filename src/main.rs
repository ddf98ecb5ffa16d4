use anyhow::Context;
use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use board_coordinator::audit::{AuditSink, InMemoryAuditSink, PostgresAuditSink};
use board_coordinator::broadcast::Broadcaster;
use board_coordinator::cache::AuthoritativeCache;
use board_coordinator::config::Config;
use board_coordinator::flush::FlushQueue;
use board_coordinator::http::{get_task, health, list_tasks};
use board_coordinator::lock::LockManager;
use board_coordinator::presence::PresenceRegistry;
use board_coordinator::router::EventRouter;
use board_coordinator::service::TaskService;
use board_coordinator::state::AppState;
use board_coordinator::storage::{InMemoryStore, PostgresStore, SharedStore};
use board_coordinator::telemetry;
use board_coordinator::ws::ws_upgrade;

/// Sentinel `DATABASE_URL` value that selects the in-process store instead
/// of connecting to Postgres, for local runs without a database.
const IN_MEMORY_SENTINEL: &str = "memory";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();
    let config = Config::from_env().context("loading configuration from environment")?;

    let (store, audit): (SharedStore, Arc<dyn AuditSink>) = if config.database_url == IN_MEMORY_SENTINEL {
        tracing::warn!("DATABASE_URL=memory: using the in-process store, nothing durable across restarts");
        (Arc::new(InMemoryStore::new()), Arc::new(InMemoryAuditSink::new()))
    } else {
        let pg = PostgresStore::connect(&config.database_url)
            .await
            .context("connecting to durable store")?;
        let audit: Arc<dyn AuditSink> = Arc::new(PostgresAuditSink::new(pg.pool()));
        (Arc::new(pg), audit)
    };

    let cache = Arc::new(AuthoritativeCache::new(store.clone()));
    let flush = FlushQueue::new(cache.clone(), store);
    let service = Arc::new(TaskService::new(cache, flush));
    let locks = Arc::new(LockManager::new());
    let presence = Arc::new(PresenceRegistry::new());
    let broadcaster = Arc::new(Broadcaster::new());
    let router = Arc::new(EventRouter::new(
        service.clone(),
        locks,
        presence.clone(),
        audit,
        broadcaster.clone(),
    ));

    let state = Arc::new(AppState {
        service,
        router,
        broadcaster,
        presence,
    });

    let cors = if config.cors_origin == "*" {
        CorsLayer::new().allow_origin(AllowOrigin::mirror_request())
    } else {
        let origin: HeaderValue = config
            .cors_origin
            .parse()
            .context("parsing CORS_ORIGIN as a header value")?;
        CorsLayer::new().allow_origin(origin)
    };

    let app = Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/tasks", get(list_tasks))
        .route("/tasks/:id", get(get_task))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding to port {}", config.port))?;
    tracing::info!(port = config.port, "board-coordinator listening");
    axum::serve(listener, app).await.context("server exited")?;

    Ok(())
}
