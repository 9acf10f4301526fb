/// 입찰 승인 파이프라인
/// 요청 단위 진행: 수신 → 검증 → 잠금 → 가격 결정 → 커밋 | 거부
// region:    --- Imports
use crate::auction::events::{auction_topic, UpdateEvent};
use crate::bidding::model::{Auction, Bid, STATUS_ENDED};
use crate::config::EngineConfig;
use crate::database::DatabaseManager;
use crate::error::BidError;
use crate::fanout::FanoutBus;
use crate::jobs::{
    JobPriority, JobQueue, JOB_BID_NOTIFICATION, JOB_CACHE_INVALIDATION, JOB_PRICE_UPDATE,
    JOB_STATS_RECOMPUTE,
};
use crate::lock::AuctionLockTable;
use crate::pricing::{self, PricingPolicy};
use crate::query::{handlers, queries};
use crate::scheduler::LifecycleClock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

// endregion: --- Imports

// region:    --- Commands

/// 입찰 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlaceBidCommand {
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: i64,
    #[serde(default)]
    pub confirm_high_bid: bool,
    /// 클라이언트 제출 타임스탬프 (멱등성 키 구성용)
    #[serde(default)]
    pub request_ts: Option<i64>,
}

impl PlaceBidCommand {
    /// 멱등성 키: (경매, 입찰자, 금액, 클라이언트 타임스탬프)
    pub fn dedupe_key(&self) -> Option<String> {
        self.request_ts.map(|ts| {
            format!(
                "bid:{}:{}:{}:{}",
                self.auction_id, self.bidder_id, self.amount, ts
            )
        })
    }
}

/// 커밋된 입찰
#[derive(Debug, Serialize)]
pub struct CommittedBid {
    pub bid_id: i64,
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: i64,
    pub timestamp: DateTime<Utc>,
}

// endregion: --- Commands

// region:    --- Bid Engine

/// 입찰 승인 엔진
/// current_price는 이 엔진의 잠금 구간을 통해서만 변경된다.
pub struct BidEngine {
    db: Arc<DatabaseManager>,
    locks: AuctionLockTable,
    fanout: Arc<FanoutBus>,
    jobs: Arc<dyn JobQueue>,
    policy: PricingPolicy,
    max_bid_ceiling: i64,
}

impl BidEngine {
    pub fn new(
        db: Arc<DatabaseManager>,
        fanout: Arc<FanoutBus>,
        jobs: Arc<dyn JobQueue>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            db,
            locks: AuctionLockTable::new(config.lock_timeout),
            fanout,
            jobs,
            policy: config.pricing.clone(),
            max_bid_ceiling: config.max_bid_ceiling,
        }
    }

    /// 입찰 처리
    pub async fn place_bid(&self, cmd: PlaceBidCommand) -> Result<CommittedBid, BidError> {
        info!("{:<12} --> 입찰 요청 처리 시작: {:?}", "Command", cmd);

        // "방금 종료" 경합 차단: 검증 직전에 해당 경매의 상태를 먼저 전이
        if let Some(new_status) =
            LifecycleClock::advance_auction_now(self.db.pool(), cmd.auction_id).await?
        {
            self.announce_transition(cmd.auction_id, new_status).await;
        }

        // 빠른 검증 (잠금 없이)
        let auction = match handlers::get_auction(&self.db, cmd.auction_id).await {
            Ok(auction) => auction,
            Err(sqlx::Error::RowNotFound) => return Err(BidError::AuctionNotFound),
            Err(e) => return Err(e.into()),
        };
        let now = Utc::now();
        Self::validate(&auction, &cmd, now, self.max_bid_ceiling)?;

        // 멱등성: 동일 제출 키가 이미 처리되었으면 기존 입찰 반환
        if let Some(key) = cmd.dedupe_key() {
            if self.jobs.is_duplicate(&key) {
                if let Some(existing) = handlers::find_committed_bid(
                    &self.db,
                    cmd.auction_id,
                    cmd.bidder_id,
                    cmd.amount,
                )
                .await?
                {
                    info!(
                        "{:<12} --> 중복 제출 감지, 기존 입찰 반환: bid_id={}",
                        "Command", existing.id
                    );
                    return Ok(CommittedBid {
                        bid_id: existing.id,
                        auction_id: existing.auction_id,
                        bidder_id: existing.bidder_id,
                        amount: existing.amount,
                        timestamp: existing.created_at,
                    });
                }
            }
        }

        // 잠금 구간: 권위 현재가 재독 → 견적 → 원자적 커밋
        // 잠금 해제는 성공/실패 모든 경로에서 보장된다.
        let committed = self
            .locks
            .with_auction_lock(cmd.auction_id, self.commit_under_lock(&cmd, &auction))
            .await??;

        // 커밋 후: 이벤트 발행 + 사이드이펙트 작업 등록
        self.publish_and_enqueue(&cmd, &committed).await;
        Ok(committed)
    }

    /// 빠른 검증: 잠금을 잡기 전에 끝나는 실패들
    fn validate(
        auction: &Auction,
        cmd: &PlaceBidCommand,
        now: DateTime<Utc>,
        max_bid_ceiling: i64,
    ) -> Result<(), BidError> {
        if cmd.amount <= 0 || cmd.amount > max_bid_ceiling {
            return Err(BidError::InvalidAmount);
        }
        if !auction.is_active_status() {
            return Err(BidError::AuctionNotActive);
        }
        // 상태 스윕이 아직 지나가지 않았어도 종료 시각이 지났으면 거부
        if now >= auction.end_date {
            return Err(BidError::AuctionNotActive);
        }
        if cmd.bidder_id == auction.seller_id {
            return Err(BidError::OwnerCannotBid);
        }
        Ok(())
    }

    /// 잠금 구간 내부: 가격 결정과 커밋
    async fn commit_under_lock(
        &self,
        cmd: &PlaceBidCommand,
        auction: &Auction,
    ) -> Result<CommittedBid, BidError> {
        // 잠금 대기 중에 경매가 종료되었을 수 있다
        if Utc::now() >= auction.end_date {
            return Err(BidError::AuctionNotActive);
        }

        // 권위 현재가 재독 (저장가와 입찰 원장 최고가 중 큰 값, 드리프트 방어)
        let current_price = handlers::get_authoritative_price(&self.db, cmd.auction_id).await?;
        let quote = pricing::quote(&self.policy, current_price, auction.minimum_increment);

        if cmd.amount < quote.recommended_min {
            return Err(BidError::BidTooLow {
                recommended_min: quote.recommended_min,
                min_increment: quote.effective_increment,
            });
        }

        if pricing::is_outlier(&self.policy, cmd.amount, current_price, quote)
            && !cmd.confirm_high_bid
        {
            warn!(
                "{:<12} --> 이상치 입찰 감지: auction={}, amount={}, 권장가={}",
                "Command", cmd.auction_id, cmd.amount, quote.recommended_min
            );
            return Err(BidError::HighBidConfirmationRequired {
                recommended_min: quote.recommended_min,
                min_increment: quote.effective_increment,
            });
        }

        // 원자적 커밋: 현재가 갱신과 입찰 기록이 한 트랜잭션에서 성공/실패
        let auction_id = cmd.auction_id;
        let bidder_id = cmd.bidder_id;
        let amount = cmd.amount;
        let now = Utc::now();
        let bid = self
            .db
            .transaction::<_, Bid, BidError>(move |tx| {
                Box::pin(async move {
                    let updated = sqlx::query(queries::UPDATE_CURRENT_PRICE)
                        .bind(amount)
                        .bind(auction_id)
                        .fetch_optional(&mut **tx)
                        .await?;
                    if updated.is_none() {
                        // 직렬화 하에서는 도달하지 않아야 하는 최후 방어선
                        return Err(BidError::CommitConflict);
                    }

                    let bid = sqlx::query_as::<_, Bid>(queries::INSERT_BID)
                        .bind(auction_id)
                        .bind(bidder_id)
                        .bind(amount)
                        .bind(now)
                        .fetch_one(&mut **tx)
                        .await?;
                    Ok(bid)
                })
            })
            .await?;

        info!(
            "{:<12} --> 입찰 커밋 성공: auction={}, bid_id={}, 현재가={}",
            "Command", bid.auction_id, bid.id, bid.amount
        );
        Ok(CommittedBid {
            bid_id: bid.id,
            auction_id: bid.auction_id,
            bidder_id: bid.bidder_id,
            amount: bid.amount,
            timestamp: bid.created_at,
        })
    }

    /// 커밋 후 처리: 팬아웃 발행 + 사이드이펙트 작업 등록
    async fn publish_and_enqueue(&self, cmd: &PlaceBidCommand, committed: &CommittedBid) {
        self.fanout.publish(UpdateEvent::bid_updated(
            committed.auction_id,
            committed.amount,
            committed.bidder_id,
        ));

        // 제출 키 기록 (클라이언트 재시도 멱등 처리)
        let base_key = cmd.dedupe_key();
        if let Some(key) = &base_key {
            self.jobs.mark_seen(key);
        }

        let side_effects: [(&str, serde_json::Value, JobPriority); 4] = [
            (
                JOB_PRICE_UPDATE,
                serde_json::json!({
                    "auction_id": committed.auction_id,
                    "current_price": committed.amount,
                }),
                JobPriority::High,
            ),
            (
                JOB_CACHE_INVALIDATION,
                serde_json::json!({ "key": auction_topic(committed.auction_id) }),
                JobPriority::Medium,
            ),
            (
                JOB_STATS_RECOMPUTE,
                serde_json::json!({ "auction_id": committed.auction_id }),
                JobPriority::Low,
            ),
            (
                JOB_BID_NOTIFICATION,
                serde_json::json!({
                    "auction_id": committed.auction_id,
                    "bidder_id": committed.bidder_id,
                    "amount": committed.amount,
                }),
                JobPriority::Notifications,
            ),
        ];

        // enqueue는 fire-and-forget 계약이므로 실패는 로그로만 남긴다
        for (job_type, payload, priority) in side_effects {
            let dedupe = base_key.as_ref().map(|key| format!("{}:{}", key, job_type));
            if let Err(e) = self.jobs.enqueue(job_type, payload, priority, dedupe).await {
                error!(
                    "{:<12} --> 작업 등록 실패: type={}, {:?}",
                    "Command", job_type, e
                );
            }
        }
    }

    /// 온디맨드 전이 결과를 관찰자에게 통지
    async fn announce_transition(&self, auction_id: i64, new_status: &str) {
        if new_status == STATUS_ENDED {
            self.fanout.publish(UpdateEvent::auction_ended(auction_id));
            if let Err(e) = self
                .jobs
                .enqueue(
                    JOB_STATS_RECOMPUTE,
                    serde_json::json!({ "auction_id": auction_id }),
                    JobPriority::Low,
                    Some(format!("stats:ended:{}", auction_id)),
                )
                .await
            {
                error!("{:<12} --> 통계 작업 등록 실패: {:?}", "Command", e);
            }
        } else {
            self.fanout
                .publish(UpdateEvent::auction_status(auction_id, new_status));
        }
    }
}

// endregion: --- Bid Engine

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bidding::model::STATUS_ACTIVE;
    use chrono::Duration;

    fn auction() -> Auction {
        Auction {
            id: 1,
            seller_id: 10,
            car_id: 20,
            start_price: 10_000,
            current_price: 12_000,
            minimum_increment: 500,
            start_date: Utc::now() - Duration::hours(1),
            end_date: Utc::now() + Duration::hours(1),
            status: STATUS_ACTIVE.to_string(),
            created_at: Utc::now(),
        }
    }

    fn cmd(amount: i64) -> PlaceBidCommand {
        PlaceBidCommand {
            auction_id: 1,
            bidder_id: 2,
            amount,
            confirm_high_bid: false,
            request_ts: None,
        }
    }

    #[test]
    fn test_validate_accepts_normal_bid() {
        assert!(BidEngine::validate(&auction(), &cmd(12_500), Utc::now(), 100_000_000).is_ok());
    }

    #[test]
    fn test_validate_rejects_non_positive_and_ceiling() {
        assert!(matches!(
            BidEngine::validate(&auction(), &cmd(0), Utc::now(), 100_000_000),
            Err(BidError::InvalidAmount)
        ));
        assert!(matches!(
            BidEngine::validate(&auction(), &cmd(-500), Utc::now(), 100_000_000),
            Err(BidError::InvalidAmount)
        ));
        assert!(matches!(
            BidEngine::validate(&auction(), &cmd(200_000_000), Utc::now(), 100_000_000),
            Err(BidError::InvalidAmount)
        ));
    }

    #[test]
    fn test_validate_rejects_inactive_status() {
        let mut ended = auction();
        ended.status = "ENDED".to_string();
        assert!(matches!(
            BidEngine::validate(&ended, &cmd(12_500), Utc::now(), 100_000_000),
            Err(BidError::AuctionNotActive)
        ));
    }

    #[test]
    fn test_validate_accepts_live_synonym() {
        let mut live = auction();
        live.status = "live".to_string();
        assert!(BidEngine::validate(&live, &cmd(12_500), Utc::now(), 100_000_000).is_ok());
    }

    #[test]
    fn test_validate_rejects_after_end_date_even_if_status_active() {
        // 스윕이 아직 ENDED로 바꾸지 않았어도 종료 시각이 지났으면 거부
        let auction = auction();
        let after_end = auction.end_date + Duration::seconds(1);
        assert!(matches!(
            BidEngine::validate(&auction, &cmd(12_500), after_end, 100_000_000),
            Err(BidError::AuctionNotActive)
        ));
    }

    #[test]
    fn test_validate_rejects_self_bid() {
        let mut self_bid = cmd(12_500);
        self_bid.bidder_id = 10;
        assert!(matches!(
            BidEngine::validate(&auction(), &self_bid, Utc::now(), 100_000_000),
            Err(BidError::OwnerCannotBid)
        ));
    }

    #[test]
    fn test_dedupe_key_requires_request_ts() {
        assert_eq!(cmd(12_500).dedupe_key(), None);

        let mut with_ts = cmd(12_500);
        with_ts.request_ts = Some(1_722_000_000);
        assert_eq!(
            with_ts.dedupe_key(),
            Some("bid:1:2:12500:1722000000".to_string())
        );
    }
}

// endregion: --- Tests
