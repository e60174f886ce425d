use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::HeaderValue;
use tokio::{signal, sync::mpsc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use vendora_api as api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to the database")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await?;
    }
    let db = Arc::new(db_pool);

    // Redis client construction only; connections are best-effort per use.
    let redis_client = Arc::new(redis::Client::open(cfg.redis_url.clone())?);

    // Background worker for notification/email side effects.
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(
        event_rx,
        Arc::new(api::services::notifications::TracingNotificationSink),
        Arc::new(api::services::notifications::TracingMailer),
    ));

    let external_timeout = Duration::from_secs(cfg.external_timeout_secs);
    let gateway = Arc::new(api::clients::gateway::HostedCheckoutGateway::new(
        cfg.gateway_base_url.clone(),
        cfg.gateway_api_key.clone(),
        external_timeout,
    ));
    let courier = Arc::new(api::clients::courier::HttpCourierClient::new(
        cfg.courier_base_url.clone(),
        external_timeout,
    ));

    let services = api::AppServices::new(
        db.clone(),
        event_sender.clone(),
        redis_client.clone(),
        gateway,
        courier,
        &cfg,
    );

    let auth = Arc::new(api::auth::AuthService::new(
        &cfg.jwt_secret,
        cfg.jwt_expiration,
    ));

    let state = api::AppState {
        db,
        config: cfg.clone(),
        event_sender,
        services,
        auth,
        redis: redis_client,
    };

    let cors_layer = match cfg.cors_allowed_origins.as_deref() {
        Some(raw) => {
            let origins: Vec<HeaderValue> = raw
                .split(',')
                .filter_map(|origin| HeaderValue::from_str(origin.trim()).ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::permissive(),
    };

    let app = api::build_router(state).layer(cors_layer);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    info!("vendora-api listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
