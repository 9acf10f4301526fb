// region:    --- Imports
use super::queries;
use crate::bidding::model::{Auction, Bid, BidView};
use crate::database::DatabaseManager;
use sqlx::Error as SqlxError;
use sqlx::Row;
use tracing::info;

// endregion: --- Imports

// region:    --- Query Handlers

/// 경매 조회
pub async fn get_auction(db_manager: &DatabaseManager, auction_id: i64) -> Result<Auction, SqlxError> {
    info!("{:<12} --> 경매 조회 id: {}", "Query", auction_id);
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, Auction>(queries::GET_AUCTION)
                    .bind(auction_id)
                    .fetch_one(&mut **tx)
                    .await
            })
        })
        .await
}

/// 경매 입찰 이력 조회 (금액 내림차순)
pub async fn get_auction_bids(
    db_manager: &DatabaseManager,
    auction_id: i64,
) -> Result<Vec<Bid>, SqlxError> {
    info!("{:<12} --> 입찰 이력 조회 id: {}", "Query", auction_id);
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, Bid>(queries::GET_AUCTION_BIDS)
                    .bind(auction_id)
                    .fetch_all(&mut **tx)
                    .await
            })
        })
        .await
}

/// 입찰 이력 조회 + 최고가 표시
/// 관측된 최고 금액과 같은 입찰만 is_winning = true
pub async fn get_bid_views(
    db_manager: &DatabaseManager,
    auction_id: i64,
) -> Result<Vec<BidView>, SqlxError> {
    let bids = get_auction_bids(db_manager, auction_id).await?;
    let highest = bids.iter().map(|b| b.amount).max().unwrap_or(0);
    Ok(bids
        .into_iter()
        .map(|b| BidView {
            is_winning: b.amount == highest,
            id: b.id,
            auction_id: b.auction_id,
            bidder_id: b.bidder_id,
            amount: b.amount,
            created_at: b.created_at,
        })
        .collect())
}

/// 최고 입찰가 조회
pub async fn get_highest_bid(
    db_manager: &DatabaseManager,
    auction_id: i64,
) -> Result<Option<i64>, SqlxError> {
    info!("{:<12} --> 최고 입찰가 조회 id: {}", "Query", auction_id);
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                let result = sqlx::query(queries::GET_HIGHEST_BID)
                    .bind(auction_id)
                    .fetch_one(&mut **tx)
                    .await?;

                Ok(result.get("highest_bid"))
            })
        })
        .await
}

/// 권위 있는 현재가 조회 (잠금 구간 내에서만 호출)
pub async fn get_authoritative_price(
    db_manager: &DatabaseManager,
    auction_id: i64,
) -> Result<i64, SqlxError> {
    info!("{:<12} --> 권위 현재가 조회 id: {}", "Query", auction_id);
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                let result = sqlx::query(queries::GET_AUTHORITATIVE_PRICE)
                    .bind(auction_id)
                    .fetch_one(&mut **tx)
                    .await?;

                Ok(result.get("authoritative_price"))
            })
        })
        .await
}

/// 중복 제출 확인용 기존 입찰 조회
pub async fn find_committed_bid(
    db_manager: &DatabaseManager,
    auction_id: i64,
    bidder_id: i64,
    amount: i64,
) -> Result<Option<Bid>, SqlxError> {
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, Bid>(queries::FIND_COMMITTED_BID)
                    .bind(auction_id)
                    .bind(bidder_id)
                    .bind(amount)
                    .fetch_optional(&mut **tx)
                    .await
            })
        })
        .await
}

/// 상태별 경매 수 조회 (라이프사이클 프로브)
pub async fn get_status_counts(
    db_manager: &DatabaseManager,
) -> Result<Vec<(String, i64)>, SqlxError> {
    info!("{:<12} --> 상태별 경매 수 조회", "Query");
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                let rows = sqlx::query(queries::GET_STATUS_COUNTS)
                    .fetch_all(&mut **tx)
                    .await?;

                Ok(rows
                    .into_iter()
                    .map(|row| (row.get("status"), row.get("count")))
                    .collect())
            })
        })
        .await
}

// endregion: --- Query Handlers
