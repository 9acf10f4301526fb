use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// 경매 상태 값
pub const STATUS_UPCOMING: &str = "UPCOMING";
pub const STATUS_ACTIVE: &str = "ACTIVE";
pub const STATUS_ENDED: &str = "ENDED";
pub const STATUS_SOLD: &str = "SOLD";
pub const STATUS_CANCELLED: &str = "CANCELLED";

// 경매 모델
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Auction {
    pub id: i64,
    pub seller_id: i64,
    pub car_id: i64,
    pub start_price: i64,
    pub current_price: i64,
    pub minimum_increment: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Auction {
    /// 입찰 가능한 상태인지 판정
    /// UI 계층에서 쓰는 동의어 "LIVE"도 허용한다 (대소문자 무시).
    pub fn is_active_status(&self) -> bool {
        let status = self.status.to_ascii_uppercase();
        status == STATUS_ACTIVE || status == "LIVE"
    }
}

// 입찰 모델
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Bid {
    pub id: i64,
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

// 입찰 조회 응답 모델 (최고가 여부 표시)
#[derive(Debug, Serialize, Deserialize)]
pub struct BidView {
    pub id: i64,
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
    pub is_winning: bool,
}
