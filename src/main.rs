use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use chrono::NaiveTime;
use gym_backend::{
    AppState,
    cache::RedisReminderDedupe,
    card::CardService,
    config::Config,
    database::{
        CardRepository, CardTypeRepository, NotificationRepository, PerformanceRepository,
        UserRepository,
    },
    middleware::{RateLimiter, log_errors, rate_limit},
    routes,
    scheduler::{CardExpiryJob, CoachPerformanceJob, Schedule, Scheduler},
    utils::time::{Clock, SystemClock},
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(
        "Business timezone {}, expiry check at {}, reminder days {:?}",
        config.timezone,
        config.expiry_check_time,
        config.expiry_reminder_days
    );

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池，每个连接都带语句超时
    let statement_timeout_ms = config.statement_timeout().as_millis();
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'gym_backend';")
                    .await?;
                conn.execute(
                    format!("SET statement_timeout = {};", statement_timeout_ms).as_str(),
                )
                .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    if config.run_migrations {
        sqlx::migrate!()
            .run(&pool)
            .await
            .expect("Failed to run database migrations");
        tracing::info!("Database migrations applied");
    }
    let pool = Arc::new(pool);

    // 设置 Redis 客户端
    let redis_client = Arc::new(
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client"),
    );

    // 组装存储库与服务
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.timezone));
    let card_store = Arc::new(CardRepository::new(pool.clone()));
    let cards = Arc::new(CardService::new(
        card_store,
        Arc::new(CardTypeRepository::new(pool.clone())),
        Arc::new(UserRepository::new(pool.clone())),
        clock.clone(),
    ));

    // 设置调度器
    let mut expiry_job = CardExpiryJob::new(
        cards.clone(),
        Arc::new(NotificationRepository::new(pool.clone())),
        config.expiry_reminder_days.clone(),
    );
    if config.reminder_dedupe {
        expiry_job = expiry_job.with_dedupe(Arc::new(RedisReminderDedupe::new(
            redis_client.clone(),
        )));
    }
    let expiry_scheduler = Arc::new(
        Scheduler::new(
            expiry_job,
            Schedule::DailyAt(config.expiry_check_time),
            clock.clone(),
        )
        .run_on_start(true),
    );

    let performance_scheduler = Arc::new(Scheduler::new(
        CoachPerformanceJob::new(
            Arc::new(PerformanceRepository::new(pool.clone(), config.timezone)),
            clock.clone(),
        ),
        Schedule::MonthlyAt {
            day: 1,
            time: NaiveTime::MIN,
        },
        clock.clone(),
    ));

    expiry_scheduler.start();
    performance_scheduler.start();

    // 设置应用状态
    let state = AppState {
        config: config.clone(),
        cards,
        expiry_scheduler: expiry_scheduler.clone(),
        performance_scheduler: performance_scheduler.clone(),
    };

    // 设置限流器
    let rate_limiter = Arc::new(RateLimiter::new(redis_client, config.clone()));

    // 添加日志中间件和限流中间件
    let router = routes::router(state.clone())
        .layer(axum::middleware::from_fn(log_errors))
        .layer(axum::middleware::from_fn_with_state(rate_limiter, rate_limit));

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    // 启动服务器
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    // 服务停止后再停调度器，进行中的周期会执行完
    expiry_scheduler.stop().await;
    performance_scheduler.stop().await;
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
