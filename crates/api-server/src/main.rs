mod auth;
mod error;
mod routes;
mod state;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use application::GatewayApp;
use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    info!("🚀 Starting torrent gateway");
    let config = Config::from_env()?;
    info!("💾 Using database: {}", config.sqlite_db_path);

    let app = Arc::new(GatewayApp::open(&config)?);
    let state = AppState {
        app: Arc::clone(&app),
        config: Arc::new(config.clone()),
    };

    let protected = Router::new()
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/me", get(routes::auth::me))
        .route(
            "/auth/api-keys",
            post(routes::auth::create_api_key).get(routes::auth::list_api_keys),
        )
        .route("/auth/api-keys/:prefix", delete(routes::auth::revoke_api_key))
        .route(
            "/servers",
            post(routes::servers::create_server).get(routes::servers::list_servers),
        )
        .route(
            "/servers/:id",
            get(routes::servers::get_server)
                .put(routes::servers::update_server)
                .delete(routes::servers::delete_server),
        )
        .route("/servers/:id/test", post(routes::servers::test_server))
        .route(
            "/servers/:id/stream/*file_path",
            post(routes::servers::start_stream),
        )
        .route(
            "/torrents",
            get(routes::torrents::list_torrents).post(routes::torrents::add_torrent),
        )
        .route("/torrents/upload", post(routes::torrents::upload_torrent))
        .route(
            "/torrents/:hash",
            get(routes::torrents::get_torrent).delete(routes::torrents::delete_torrent),
        )
        .route("/torrents/:hash/start", post(routes::torrents::start_torrent))
        .route("/torrents/:hash/stop", post(routes::torrents::stop_torrent))
        .route("/torrents/:hash/files", get(routes::torrents::torrent_files))
        .route(
            "/torrents/:hash/priority",
            post(routes::torrents::set_priority),
        )
        .route(
            "/torrents/:hash/labels",
            get(routes::torrents::get_labels).put(routes::torrents::set_labels),
        )
        .route(
            "/torrents/:hash/settings",
            get(routes::torrents::list_settings)
                .put(routes::torrents::put_setting)
                .delete(routes::torrents::delete_setting),
        )
        .route(
            "/transfers",
            get(routes::transfers::list_transfers).post(routes::transfers::submit_transfer),
        )
        .route("/transfers/:id", get(routes::transfers::get_transfer))
        .route("/streams/:id", get(routes::streams::stream_info))
        .route("/streams/:id/files/:file", get(routes::streams::stream_file))
        .route(
            "/webhooks",
            get(routes::webhooks::list_webhooks).post(routes::webhooks::create_webhook),
        )
        .route("/webhooks/:id", delete(routes::webhooks::delete_webhook))
        .route("/admin/users", get(routes::admin::list_users))
        .route("/admin/users/:id", delete(routes::admin::delete_user))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    let router = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .merge(protected)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!("🌐 Gateway listening on http://{}", config.bind_address());

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    match Arc::try_unwrap(app) {
        Ok(app) => app.shutdown().await,
        Err(_) => info!("Exiting with outstanding gateway references"),
    }
    Ok(())
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(json!({ "status": "ok" }))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
