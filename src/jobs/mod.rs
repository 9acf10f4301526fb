/// 비동기 작업 큐
/// 1. 우선순위 레인별 제한 동시성 실행
/// 2. 지수 백오프 재시도, 소진 시 failed_jobs 기록
/// 3. 중복 제출 키(dedupe) 관리
// region:    --- Imports
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

pub mod handlers;
pub mod worker;

// endregion: --- Imports

// region:    --- Job Model

// 엔진이 등록하는 사이드이펙트 작업 타입
pub const JOB_PRICE_UPDATE: &str = "price_update_propagation";
pub const JOB_CACHE_INVALIDATION: &str = "cache_invalidation";
pub const JOB_STATS_RECOMPUTE: &str = "stats_recompute";
pub const JOB_BID_NOTIFICATION: &str = "bid_notification";

/// 작업 우선순위 레인
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    High,
    Medium,
    Low,
    /// 알림 전용 레인 (높은 동시성)
    Notifications,
}

impl JobPriority {
    pub const ALL: [JobPriority; 4] = [
        JobPriority::High,
        JobPriority::Medium,
        JobPriority::Low,
        JobPriority::Notifications,
    ];

    /// 레인별 동시 실행 상한
    pub fn concurrency(self) -> usize {
        match self {
            JobPriority::High => 4,
            JobPriority::Medium => 2,
            JobPriority::Low => 1,
            JobPriority::Notifications => 8,
        }
    }

    /// 분산 백엔드용 Kafka 토픽
    pub fn lane_topic(self) -> &'static str {
        match self {
            JobPriority::High => "jobs-high",
            JobPriority::Medium => "jobs-medium",
            JobPriority::Low => "jobs-low",
            JobPriority::Notifications => "jobs-notifications",
        }
    }
}

/// 큐에 저장되는 작업 모델
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Job {
    pub id: u64,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub priority: JobPriority,
    pub attempts: u32,
    pub dedupe_key: Option<String>,
}

/// 작업 처리 오류
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job failed: {0}")]
    Failed(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("broker error: {0}")]
    Broker(String),
}

// endregion: --- Job Model

// region:    --- Job Traits

/// 작업 타입별 처리기
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), JobError>;
}

/// 작업 큐 계약 (인메모리 / 분산 백엔드 교체 가능)
/// enqueue는 호출자 관점에서 fire-and-forget이다.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// 작업 등록. 중복 키가 이미 처리된 경우 no-op으로 0을 반환한다.
    async fn enqueue(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        priority: JobPriority,
        dedupe_key: Option<String>,
    ) -> Result<u64, JobError>;

    /// 중복 제출 키 확인 (입찰 멱등성 검사)
    fn is_duplicate(&self, dedupe_key: &str) -> bool;

    /// 제출 키 기록
    fn mark_seen(&self, dedupe_key: &str);
}

/// 소진된 작업 기록 저장소
/// 실패한 작업은 버려지지 않고 점검 가능한 형태로 남는다.
#[async_trait]
pub trait FailedJobStore: Send + Sync {
    async fn record(&self, job: &Job, last_error: &str);
}

/// Postgres 기반 실패 작업 저장소
pub struct PgFailedJobStore {
    pool: Arc<PgPool>,
}

impl PgFailedJobStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FailedJobStore for PgFailedJobStore {
    async fn record(&self, job: &Job, last_error: &str) {
        let result = sqlx::query(
            "INSERT INTO failed_jobs (job_type, payload, attempts, last_error) VALUES ($1, $2, $3, $4)",
        )
        .bind(&job.job_type)
        .bind(&job.payload)
        .bind(job.attempts as i32)
        .bind(last_error)
        .execute(&*self.pool)
        .await;

        if let Err(e) = result {
            // 기록 실패는 로그로만 남긴다
            error!(
                "{:<12} --> 실패 작업 기록 오류: type={}, {:?}",
                "JobQueue", job.job_type, e
            );
        }
    }
}

// endregion: --- Job Traits

// region:    --- Job Executor

/// 작업 실행기: 타입별 핸들러 디스패치 + 재시도 정책
pub struct JobExecutor {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    failed_store: Arc<dyn FailedJobStore>,
    max_attempts: u32,
    backoff_base: Duration,
}

impl JobExecutor {
    pub fn new(
        failed_store: Arc<dyn FailedJobStore>,
        max_attempts: u32,
        backoff_base: Duration,
    ) -> Self {
        Self {
            handlers: HashMap::new(),
            failed_store,
            max_attempts,
            backoff_base,
        }
    }

    /// 작업 타입 핸들러 등록
    pub fn register(&mut self, job_type: &str, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type.to_string(), handler);
    }

    /// 작업 실행: 실패 시 지수 백오프 재시도, 소진 시 기록
    pub async fn run(&self, mut job: Job) {
        let handler = match self.handlers.get(&job.job_type) {
            Some(handler) => Arc::clone(handler),
            None => {
                warn!(
                    "{:<12} --> 알 수 없는 작업 타입: {}",
                    "JobQueue", job.job_type
                );
                self.failed_store.record(&job, "no handler registered").await;
                return;
            }
        };

        loop {
            job.attempts += 1;
            match handler.handle(&job).await {
                Ok(()) => {
                    info!(
                        "{:<12} --> 작업 처리 성공: type={}, id={}, 시도={}",
                        "JobQueue", job.job_type, job.id, job.attempts
                    );
                    return;
                }
                Err(e) if job.attempts >= self.max_attempts => {
                    error!(
                        "{:<12} --> 작업 최대 시도 횟수 초과: type={}, id={}, {:?}",
                        "JobQueue", job.job_type, job.id, e
                    );
                    self.failed_store.record(&job, &e.to_string()).await;
                    return;
                }
                Err(e) => {
                    // 지수 백오프 후 재시도
                    let backoff = self.backoff_base * 2u32.pow(job.attempts - 1);
                    warn!(
                        "{:<12} --> 작업 실패, 재시도 예정: type={}, 시도={}/{}, backoff={:?}, {:?}",
                        "JobQueue", job.job_type, job.attempts, self.max_attempts, backoff, e
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

// endregion: --- Job Executor

// region:    --- Tests


// endregion: --- Tests
