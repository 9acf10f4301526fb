// region:    --- Imports
use crate::bidding::commands::BidEngine;
use crate::config::EngineConfig;
use crate::database::DatabaseManager;
use crate::fanout::{FanoutBus, FanoutConfig, RELAY_TOPIC};
use crate::jobs::handlers::{
    BidNotificationHandler, CacheInvalidationHandler, PriceUpdateHandler, StatsRecomputeHandler,
};
use crate::jobs::worker::{InMemoryJobQueue, KafkaJobQueue};
use crate::jobs::{
    JobExecutor, JobPriority, JobQueue, PgFailedJobStore, JOB_BID_NOTIFICATION,
    JOB_CACHE_INVALIDATION, JOB_PRICE_UPDATE, JOB_STATS_RECOMPUTE,
};
use crate::scheduler::LifecycleClock;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use message_broker::KafkaManager;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
// endregion: --- Imports

// region:    --- Modules
mod auction;
mod bidding;
mod config;
mod database;
mod error;
mod fanout;
mod handlers;
mod jobs;
mod lock;
mod message_broker;
mod pricing;
mod query;
mod scheduler;

// endregion: --- Modules

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    // 설정 로드
    let config = EngineConfig::from_env();

    // DatabaseManager 생성
    let db_manager = match DatabaseManager::new(&config.database_url).await {
        Ok(db_manager) => Arc::new(db_manager),
        Err(e) => {
            error!("{:<12} --> 데이터베이스 연결 실패: {:?}", "Main", e);
            return Err(e.into());
        }
    };

    // 데이터베이스 초기화
    if let Err(e) = db_manager.initialize_database().await {
        error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> 데이터베이스 초기화 성공", "Main");

    // Kafka 구성 시: 크로스 프로세스 릴레이 + 분산 작업 큐
    let kafka_manager = if config.kafka_enabled {
        let manager = Arc::new(KafkaManager::new(&config.kafka_brokers));
        if let Err(e) = manager.initialize().await {
            error!("{:<12} --> Kafka 초기화 실패: {:?}", "Main", e);
            return Err(e.into());
        }
        info!("{:<12} --> Kafka 초기화 성공", "Main");

        // 릴레이 토픽 + 작업 레인 토픽 생성
        manager.create_topic(RELAY_TOPIC, 5, 1).await?;
        for priority in JobPriority::ALL {
            manager.create_topic(priority.lane_topic(), 3, 1).await?;
        }
        Some(manager)
    } else {
        None
    };

    // 팬아웃 버스 생성
    let fanout_config = FanoutConfig {
        batch_window: config.batch_window,
        batch_cap: config.batch_cap,
    };
    let fanout_bus = match &kafka_manager {
        Some(manager) => {
            let bus = Arc::new(FanoutBus::with_relay(fanout_config, manager.get_producer()));
            bus.start_relay(manager.get_consumer());
            bus
        }
        None => Arc::new(FanoutBus::new(fanout_config)),
    };

    // 작업 실행기 생성 및 사이드이펙트 핸들러 등록
    let failed_store = Arc::new(PgFailedJobStore::new(db_manager.get_pool()));
    let mut executor = JobExecutor::new(
        failed_store,
        config.job_max_attempts,
        config.job_backoff_base,
    );
    executor.register(
        JOB_PRICE_UPDATE,
        Arc::new(PriceUpdateHandler::new(
            db_manager.get_pool(),
            Arc::clone(&fanout_bus),
        )),
    );
    executor.register(JOB_CACHE_INVALIDATION, Arc::new(CacheInvalidationHandler));
    executor.register(
        JOB_STATS_RECOMPUTE,
        Arc::new(StatsRecomputeHandler::new(db_manager.get_pool())),
    );
    executor.register(JOB_BID_NOTIFICATION, Arc::new(BidNotificationHandler));
    let executor = Arc::new(executor);

    // 작업 큐 생성 (Kafka 또는 인메모리 백엔드)
    let jobs: Arc<dyn JobQueue> = match &kafka_manager {
        Some(manager) => {
            let queue = Arc::new(KafkaJobQueue::new(manager.get_producer()));
            queue.start_workers(&config.kafka_brokers, Arc::clone(&executor));
            queue
        }
        None => Arc::new(InMemoryJobQueue::start(Arc::clone(&executor))),
    };

    // 입찰 승인 엔진 생성
    let engine = Arc::new(BidEngine::new(
        Arc::clone(&db_manager),
        Arc::clone(&fanout_bus),
        Arc::clone(&jobs),
        &config,
    ));

    // 라이프사이클 클럭 시작
    let clock = LifecycleClock::new(
        db_manager.get_pool(),
        Arc::clone(&fanout_bus),
        Arc::clone(&jobs),
        config.sweep_interval,
    );
    clock.start();

    // 테스트 페이지를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 라우터 설정
    let state = handlers::AppState {
        db: Arc::clone(&db_manager),
        engine,
        fanout: Arc::clone(&fanout_bus),
        jobs: Arc::clone(&jobs),
    };
    let routes_all = Router::new()
        .route(
            "/auctions/:id/bid",
            post(handlers::handle_place_bid).get(handlers::handle_get_auction_bids),
        )
        .route("/auctions/:id", get(handlers::handle_get_auction))
        .route("/admin/lifecycle/sweep", post(handlers::handle_force_sweep))
        .route(
            "/admin/lifecycle/status",
            get(handlers::handle_lifecycle_status),
        )
        .route("/ws", get(fanout::ws::ws_handler))
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 20))
        .with_state(state);

    // 리스너 생성
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    // 서버 실행
    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }

    // 명시적 종료
    clock.stop();
    fanout_bus.stop();
    Ok(())
}
// endregion: --- Main
