use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use redis::Client as RedisClient;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use santa_api::config::Config;
use santa_api::services::{cron, events::EventBroadcaster, locks::GroupLocks};
use santa_api::{db, routes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    let redis_client = RedisClient::open(config.redis_url.as_str())?;
    let redis_conn = redis_client.get_multiplexed_async_connection().await?;
    info!("Redis connected");

    cron::start(pool.clone());

    let state = AppState {
        db: pool,
        redis_client,
        events: EventBroadcaster::new(redis_conn),
        locks: Arc::new(GroupLocks::new()),
        config: config.clone(),
    };

    // CORS: the configured app origin, plus localhost for development.
    let base_url = config.app_base_url.clone();
    let cors_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let Ok(o) = origin.to_str() else {
            return false;
        };
        o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1") || o == base_url
    });
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_origin(cors_origin);

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        // Groups
        .route("/groups", post(routes::groups::create_group))
        .route(
            "/groups/{id}",
            get(routes::groups::get_group).delete(routes::groups::delete_group),
        )
        .route("/groups/{id}/settings", put(routes::groups::update_settings))
        .route("/groups/{id}/toggle-open", post(routes::groups::toggle_open))
        .route("/groups/{id}/join", post(routes::groups::join_group))
        .route("/groups/{id}/leave", post(routes::groups::leave_group))
        .route("/groups/{id}/kick", post(routes::groups::kick_member))
        .route("/groups/{id}/members", get(routes::groups::list_members))
        // Assignments
        .route("/groups/{id}/assign", post(routes::assignments::assign_santa))
        .route("/groups/{id}/unlock", post(routes::assignments::unlock_group))
        .route("/groups/{id}/my-santa", get(routes::assignments::my_santa))
        .route("/groups/{id}/chain", get(routes::assignments::my_chain))
        .route(
            "/groups/{id}/relationships",
            get(routes::assignments::relationships),
        )
        // Messages
        .route(
            "/groups/{id}/messages",
            get(routes::messages::get_message_history).post(routes::messages::send_message),
        )
        .route(
            "/groups/{id}/messages/unread",
            get(routes::messages::get_unread_counts),
        )
        .route(
            "/groups/{id}/messages/read",
            post(routes::messages::mark_messages_read),
        )
        // Realtime + metrics
        .route("/ws", get(routes::websocket::ws_handler))
        .route("/metrics", get(routes::metrics::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("santa API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
