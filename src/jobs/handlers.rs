/// 엔진 사이드이펙트 작업 핸들러
/// 이메일/SMS/이미지 처리 같은 외부 작업 타입은 별도 서비스가
/// 같은 큐 계약으로 처리한다고 가정한다.
// region:    --- Imports
use super::{Job, JobError, JobHandler};
use crate::auction::events::UpdateEvent;
use crate::fanout::FanoutBus;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::info;

// endregion: --- Imports

// region:    --- Payload Helpers

fn payload_i64(job: &Job, key: &str) -> Result<i64, JobError> {
    job.payload
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| JobError::Failed(format!("missing payload field: {}", key)))
}

// endregion: --- Payload Helpers

// region:    --- Handlers

/// 가격 갱신 전파
/// 최신 현재가를 다시 읽어 advisory 갱신 이벤트를 발행한다.
pub struct PriceUpdateHandler {
    pool: Arc<PgPool>,
    fanout: Arc<FanoutBus>,
}

impl PriceUpdateHandler {
    pub fn new(pool: Arc<PgPool>, fanout: Arc<FanoutBus>) -> Self {
        Self { pool, fanout }
    }
}

#[async_trait]
impl JobHandler for PriceUpdateHandler {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        let auction_id = payload_i64(job, "auction_id")?;
        let row = sqlx::query("SELECT status FROM auctions WHERE id = $1")
            .bind(auction_id)
            .fetch_one(&*self.pool)
            .await?;
        let status: String = row.get("status");

        self.fanout
            .publish(UpdateEvent::auction_status(auction_id, &status));
        info!(
            "{:<12} --> 가격 갱신 전파 완료: auction={}",
            "Job", auction_id
        );
        Ok(())
    }
}

/// 캐시 무효화
/// 실제 퍼지는 읽기 캐시 계층(외부 협력자)의 책임이며,
/// 엔진은 무효화 대상 키를 통지하는 데까지만 관여한다.
pub struct CacheInvalidationHandler;

#[async_trait]
impl JobHandler for CacheInvalidationHandler {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        let key = job
            .payload
            .get("key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| JobError::Failed("missing payload field: key".to_string()))?;
        info!("{:<12} --> 캐시 무효화: key={}", "Job", key);
        Ok(())
    }
}

/// 경매 통계 재계산
pub struct StatsRecomputeHandler {
    pool: Arc<PgPool>,
}

impl StatsRecomputeHandler {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobHandler for StatsRecomputeHandler {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        let auction_id = payload_i64(job, "auction_id")?;
        let row = sqlx::query(
            "SELECT COUNT(*) AS bid_count, COALESCE(MAX(amount), 0) AS highest, COUNT(DISTINCT bidder_id) AS bidders
             FROM bids WHERE auction_id = $1",
        )
        .bind(auction_id)
        .fetch_one(&*self.pool)
        .await?;

        let bid_count: i64 = row.get("bid_count");
        let highest: i64 = row.get("highest");
        let bidders: i64 = row.get("bidders");
        info!(
            "{:<12} --> 통계 재계산: auction={}, 입찰={}, 최고가={}, 입찰자={}",
            "Job", auction_id, bid_count, highest, bidders
        );
        Ok(())
    }
}

/// 입찰 알림
/// 알림 발송 자체는 외부 알림 서비스가 담당한다.
pub struct BidNotificationHandler;

#[async_trait]
impl JobHandler for BidNotificationHandler {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        let auction_id = payload_i64(job, "auction_id")?;
        let bidder_id = payload_i64(job, "bidder_id")?;
        let amount = payload_i64(job, "amount")?;
        info!(
            "{:<12} --> 입찰 알림 전달: auction={}, bidder={}, amount={}",
            "Job", auction_id, bidder_id, amount
        );
        Ok(())
    }
}

// endregion: --- Handlers

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobPriority;

    fn job_with_payload(payload: serde_json::Value) -> Job {
        Job {
            id: 1,
            job_type: "cache_invalidation".to_string(),
            payload,
            priority: JobPriority::Medium,
            attempts: 0,
            dedupe_key: None,
        }
    }

    #[tokio::test]
    async fn test_cache_invalidation_requires_key() {
        let handler = CacheInvalidationHandler;
        let ok = handler
            .handle(&job_with_payload(serde_json::json!({"key": "auction:1"})))
            .await;
        assert!(ok.is_ok());

        let missing = handler.handle(&job_with_payload(serde_json::json!({}))).await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_notification_requires_fields() {
        let handler = BidNotificationHandler;
        let ok = handler
            .handle(&job_with_payload(serde_json::json!({
                "auction_id": 1, "bidder_id": 2, "amount": 10_500
            })))
            .await;
        assert!(ok.is_ok());

        let missing = handler
            .handle(&job_with_payload(serde_json::json!({"auction_id": 1})))
            .await;
        assert!(missing.is_err());
    }
}

// endregion: --- Tests
