// region:    --- Imports
use crate::bidding::commands::{BidEngine, PlaceBidCommand};
use crate::database::DatabaseManager;
use crate::error::BidError;
use crate::fanout::FanoutBus;
use crate::jobs::JobQueue;
use crate::query;
use crate::scheduler::LifecycleClock;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

// endregion: --- Imports

// region:    --- App State

/// 핸들러 공유 상태 (전역이 아닌 라우터 주입)
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseManager>,
    pub engine: Arc<BidEngine>,
    pub fanout: Arc<FanoutBus>,
    pub jobs: Arc<dyn JobQueue>,
}

// endregion: --- App State

// region:    --- Command Handlers

/// 입찰 요청 바디 (경매 id는 경로에서)
#[derive(Debug, Deserialize)]
pub struct PlaceBidRequest {
    pub bidder_id: i64,
    pub amount: i64,
    #[serde(default)]
    pub confirm_high_bid: bool,
    #[serde(default)]
    pub request_ts: Option<i64>,
}

/// 입찰 요청 처리
pub async fn handle_place_bid(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
    Json(body): Json<PlaceBidRequest>,
) -> impl IntoResponse {
    let cmd = PlaceBidCommand {
        auction_id,
        bidder_id: body.bidder_id,
        amount: body.amount,
        confirm_high_bid: body.confirm_high_bid,
        request_ts: body.request_ts,
    };

    match state.engine.place_bid(cmd).await {
        Ok(committed) => (StatusCode::CREATED, Json(committed)).into_response(),
        Err(e) => e.into_response(),
    }
}

// endregion: --- Command Handlers

// region:    --- Query Handlers

/// 경매 상태 조회
pub async fn handle_get_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> impl IntoResponse {
    info!("{:<12} --> 경매 조회 id: {}", "HandlerQuery", auction_id);
    match query::handlers::get_auction(&state.db, auction_id).await {
        Ok(auction) => Json(auction).into_response(),
        Err(sqlx::Error::RowNotFound) => BidError::AuctionNotFound.into_response(),
        Err(e) => BidError::from(e).into_response(),
    }
}

/// 입찰 이력 조회 (금액 내림차순, 최고가 표시)
pub async fn handle_get_auction_bids(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> impl IntoResponse {
    info!(
        "{:<12} --> 입찰 이력 조회 id: {}",
        "HandlerQuery", auction_id
    );
    match query::handlers::get_bid_views(&state.db, auction_id).await {
        Ok(bids) => Json(bids).into_response(),
        Err(e) => BidError::from(e).into_response(),
    }
}

// endregion: --- Query Handlers

// region:    --- Admin Handlers

/// 즉시 스윕 트리거 (멱등)
pub async fn handle_force_sweep(State(state): State<AppState>) -> impl IntoResponse {
    info!("{:<12} --> 수동 스윕 요청", "HandlerAdmin");
    match LifecycleClock::sweep(state.db.pool(), &state.fanout, &state.jobs).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => BidError::from(e).into_response(),
    }
}

/// 라이프사이클 상태 프로브 (읽기 전용)
pub async fn handle_lifecycle_status(State(state): State<AppState>) -> impl IntoResponse {
    match query::handlers::get_status_counts(&state.db).await {
        Ok(counts) => {
            let mut body = serde_json::Map::new();
            for (status, count) in counts {
                body.insert(status, serde_json::json!(count));
            }
            Json(serde_json::Value::Object(body)).into_response()
        }
        Err(e) => BidError::from(e).into_response(),
    }
}

// endregion: --- Admin Handlers
