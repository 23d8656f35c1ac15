use hireline::{
    auth::otp::OtpSweeper,
    cache::create_redis_pool,
    create_db_pool, create_router,
    events::EventPublisherBuilder,
    init_tracing, shutdown_telemetry, AppState, Config,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    init_tracing(&config);

    info!(
        service = "hireline",
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        "Booting job board API"
    );

    for issue in config.validate_for_production() {
        warn!(issue = %issue, "Configuration warning");
    }

    info!(
        database_host = %config.database.url.split('@').next_back().unwrap_or("***"),
        pool_max = config.database.max_connections,
        "Opening database pool"
    );
    let db_pool = create_db_pool(&config);

    let redis_pool = create_redis_pool(&config.redis);

    // Two background workers: the outbox publisher and the OTP sweeper.
    // Each gets its own shutdown channel so the drain order is explicit.
    let publisher_shutdown = EventPublisherBuilder::new(db_pool.clone())
        .maybe_redis_pool(redis_pool.clone())
        .spawn();

    let (sweeper_shutdown, sweeper_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(
        OtpSweeper::new(db_pool.clone(), config.otp.cleanup_interval_secs, sweeper_rx).run(),
    );

    let state = AppState::new(db_pool, redis_pool, &config);
    let app = create_router(state, &config);

    let http_addr = config.server_addr();
    let listener = match tokio::net::TcpListener::bind(&http_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, address = %http_addr, "Could not bind listen address");
            std::process::exit(1);
        }
    };

    info!(
        address = %http_addr,
        docs = %format!("http://{}/swagger-ui", http_addr),
        "Listening"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);

    let http_server = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await
        }
    };

    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        info!("Interrupt received, shutting down");
        let _ = shutdown_tx.send(());
    };

    tokio::select! {
        result = http_server => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server exited with error");
            }
        }
        _ = ctrl_c => {}
    }

    drop(shutdown_rx);

    info!("Stopping background workers");
    let _ = publisher_shutdown.send(true);
    let _ = sweeper_shutdown.send(true);
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;

    shutdown_telemetry();
    info!("Shutdown complete");
}
