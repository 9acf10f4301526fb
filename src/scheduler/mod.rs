/// 경매 라이프사이클 클럭
/// 시간 기준 상태 전이(UPCOMING→ACTIVE→ENDED)를 주기적으로 수행한다.
/// 전이는 원래 상태를 조건으로 하는 일괄 갱신이므로 중복 실행에 멱등적이며,
/// 수동 취소 같은 전이와 경합해도 종결 상태를 되살리지 못한다.
// region:    --- Imports
use crate::auction::events::UpdateEvent;
use crate::bidding::model::{STATUS_ACTIVE, STATUS_ENDED, STATUS_UPCOMING};
use crate::fanout::FanoutBus;
use crate::jobs::{JobPriority, JobQueue, JOB_STATS_RECOMPUTE};
use chrono::Utc;
use serde::Serialize;
use sqlx::{PgPool, Row};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

// endregion: --- Imports

// region:    --- Sweep Report

/// 스윕 결과 (전이된 경매 수)
#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
    pub activated: u64,
    pub ended: u64,
}

// endregion: --- Sweep Report

// region:    --- Lifecycle Clock

/// 경매 상태 전이 클럭
pub struct LifecycleClock {
    pool: Arc<PgPool>,
    fanout: Arc<FanoutBus>,
    jobs: Arc<dyn JobQueue>,
    period: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl LifecycleClock {
    pub fn new(
        pool: Arc<PgPool>,
        fanout: Arc<FanoutBus>,
        jobs: Arc<dyn JobQueue>,
        period: Duration,
    ) -> Self {
        Self {
            pool,
            fanout,
            jobs,
            period,
            handle: Mutex::new(None),
        }
    }

    /// 주기 스윕 시작
    pub fn start(&self) {
        let pool = Arc::clone(&self.pool);
        let fanout = Arc::clone(&self.fanout);
        let jobs = Arc::clone(&self.jobs);
        let period = self.period;
        let handle = tokio::spawn(async move {
            let mut interval = interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = Self::sweep(&pool, &fanout, &jobs).await {
                    error!(
                        "{:<12} --> 경매 상태 스윕 중 오류 발생: {:?}",
                        "Scheduler", e
                    );
                }
            }
        });
        *self.handle.lock().unwrap() = Some(handle);
        info!(
            "{:<12} --> 라이프사이클 클럭 시작: 주기={:?}",
            "Scheduler", self.period
        );
    }

    /// 명시적 종료
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
        info!("{:<12} --> 라이프사이클 클럭 종료", "Scheduler");
    }

    /// 상태 스윕 (멱등)
    pub async fn sweep(
        pool: &PgPool,
        fanout: &FanoutBus,
        jobs: &Arc<dyn JobQueue>,
    ) -> Result<SweepReport, sqlx::Error> {
        let now = Utc::now();

        // UPCOMING -> ACTIVE (시작 시각 도달, 아직 종료 전)
        let activated = sqlx::query(
            "UPDATE auctions SET status = $1
             WHERE status = $2 AND start_date <= $3 AND end_date > $3
             RETURNING id",
        )
        .bind(STATUS_ACTIVE)
        .bind(STATUS_UPCOMING)
        .bind(now)
        .fetch_all(pool)
        .await?;

        for row in &activated {
            let auction_id: i64 = row.get("id");
            fanout.publish(UpdateEvent::auction_status(auction_id, STATUS_ACTIVE));
        }

        // ACTIVE -> ENDED (종료 시각 도달)
        let ended = sqlx::query(
            "UPDATE auctions SET status = $1
             WHERE status = $2 AND end_date <= $3
             RETURNING id",
        )
        .bind(STATUS_ENDED)
        .bind(STATUS_ACTIVE)
        .bind(now)
        .fetch_all(pool)
        .await?;

        for row in &ended {
            let auction_id: i64 = row.get("id");
            fanout.publish(UpdateEvent::auction_ended(auction_id));
            // 종료된 경매의 통계 재계산 작업 등록
            if let Err(e) = jobs
                .enqueue(
                    JOB_STATS_RECOMPUTE,
                    serde_json::json!({ "auction_id": auction_id }),
                    JobPriority::Low,
                    Some(format!("stats:ended:{}", auction_id)),
                )
                .await
            {
                error!("{:<12} --> 통계 작업 등록 실패: {:?}", "Scheduler", e);
            }
        }

        debug!(
            "{:<12} --> 스윕 완료: 시작={}, 종료={}",
            "Scheduler",
            activated.len(),
            ended.len()
        );

        Ok(SweepReport {
            activated: activated.len() as u64,
            ended: ended.len() as u64,
        })
    }

    /// 단일 경매 온디맨드 전이
    /// 입찰 검증 직전에 호출해 "방금 종료된 경매" 경합 구간을 닫는다.
    /// 전이가 일어났으면 새 상태를 반환한다.
    pub async fn advance_auction_now(
        pool: &PgPool,
        auction_id: i64,
    ) -> Result<Option<&'static str>, sqlx::Error> {
        let now = Utc::now();

        let activated = sqlx::query(
            "UPDATE auctions SET status = $1
             WHERE id = $2 AND status = $3 AND start_date <= $4 AND end_date > $4",
        )
        .bind(STATUS_ACTIVE)
        .bind(auction_id)
        .bind(STATUS_UPCOMING)
        .bind(now)
        .execute(pool)
        .await?;

        let ended = sqlx::query(
            "UPDATE auctions SET status = $1
             WHERE id = $2 AND status = $3 AND end_date <= $4",
        )
        .bind(STATUS_ENDED)
        .bind(auction_id)
        .bind(STATUS_ACTIVE)
        .bind(now)
        .execute(pool)
        .await?;

        if ended.rows_affected() > 0 {
            Ok(Some(STATUS_ENDED))
        } else if activated.rows_affected() > 0 {
            Ok(Some(STATUS_ACTIVE))
        } else {
            Ok(None)
        }
    }
}

// endregion: --- Lifecycle Clock
