use std::sync::Arc;
use std::time::Duration;

use redis::Client as RedisClient;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opsdesk_api::{
    cache::{RedisCache, TtlCache},
    config::Config,
    db::{self, PgSessionStore, PgUserStore, SessionStore, UserStore},
    routes,
    services::{
        auth::AuthService,
        email::EmailService,
        notifications::{DisabledNotifier, NotificationDispatcher, Notifier},
        session_sweeper,
    },
    state::AppState,
};

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

    let notifier: Arc<dyn Notifier> = match EmailService::new(&config) {
        Some(email) => {
            info!("SMTP email service configured");
            Arc::new(email)
        }
        None => {
            info!("SMTP not configured, account emails are logged only");
            Arc::new(DisabledNotifier)
        }
    };
    let notifications = NotificationDispatcher::start(
        notifier,
        config.notification_queue_capacity,
        Duration::from_secs(config.notification_timeout_seconds),
    );

    let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool.clone()));
    let sessions: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(pool.clone()));
    let cache: Arc<dyn TtlCache> = Arc::new(RedisCache::new(redis_conn));

    session_sweeper::start(
        sessions.clone(),
        Duration::from_secs(config.session_sweep_interval_seconds.max(1)),
    );

    let auth = AuthService::new(&config, users, sessions, cache, notifications);

    let state = AppState {
        auth: Arc::new(auth),
        config: config.clone(),
        db: Some(pool),
    };

    let app = routes::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("opsdesk API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
