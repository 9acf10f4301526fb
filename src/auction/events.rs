use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 토픽 키 생성: auction:{id}
pub fn auction_topic(auction_id: i64) -> String {
    format!("auction:{}", auction_id)
}

// 업데이트 이벤트 종류
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    // 입찰 갱신
    Bid,
    // 경매 상태 갱신
    Auction,
    // 경매 종료
    AuctionEnd,
}

/// 팬아웃 버스로 전달되는 일시적 업데이트 이벤트
/// 저장되지 않으며, 배치 윈도우 단위의 at-most-once 전달이면 충분하다.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpdateEvent {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    pub topic: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl UpdateEvent {
    /// 입찰 커밋 이벤트
    pub fn bid_updated(auction_id: i64, current_price: i64, bidder_id: i64) -> Self {
        let timestamp = Utc::now();
        Self {
            kind: UpdateKind::Bid,
            topic: auction_topic(auction_id),
            data: serde_json::json!({
                "auction_id": auction_id,
                "current_price": current_price,
                "bidder_id": bidder_id,
                "timestamp": timestamp,
            }),
            timestamp,
        }
    }

    /// 경매 상태 전이 이벤트
    pub fn auction_status(auction_id: i64, status: &str) -> Self {
        Self {
            kind: UpdateKind::Auction,
            topic: auction_topic(auction_id),
            data: serde_json::json!({
                "auction_id": auction_id,
                "status": status,
            }),
            timestamp: Utc::now(),
        }
    }

    /// 경매 종료 이벤트
    pub fn auction_ended(auction_id: i64) -> Self {
        Self {
            kind: UpdateKind::AuctionEnd,
            topic: auction_topic(auction_id),
            data: serde_json::json!({
                "auction_id": auction_id,
            }),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_event_serializes_kind_as_snake_case() {
        let event = UpdateEvent::auction_ended(7);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "auction_end");
        assert_eq!(value["topic"], "auction:7");
    }

    #[test]
    fn test_update_event_round_trip() {
        // 릴레이 경유 시 JSON 왕복이 보존되어야 한다
        let event = UpdateEvent::bid_updated(3, 15_000, 42);
        let raw = serde_json::to_string(&event).unwrap();
        let back: UpdateEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.kind, UpdateKind::Bid);
        assert_eq!(back.topic, "auction:3");
        assert_eq!(back.data["current_price"], 15_000);
    }
}
