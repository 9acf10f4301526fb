/// 경매별 직렬화 잠금
/// 같은 경매에 대한 입찰 커밋은 한 번에 하나만 실행되도록 보장한다.
/// 서로 다른 경매는 완전히 병렬로 진행된다.
// region:    --- Imports
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

// endregion: --- Imports

// region:    --- Lock Error

/// 잠금 획득 타임아웃
#[derive(Debug, Error, PartialEq, Eq)]
#[error("lock acquisition timed out")]
pub struct LockTimeout;

// endregion: --- Lock Error

// region:    --- Auction Lock Table

/// 경매 id 별 비동기 뮤텍스 테이블
/// 전역 상태가 아닌 명시적으로 생성되는 서비스 값이다.
pub struct AuctionLockTable {
    locks: DashMap<i64, Arc<Mutex<()>>>,
    timeout: Duration,
}

impl AuctionLockTable {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
        }
    }

    /// 해당 경매의 뮤텍스 핸들
    fn entry(&self, auction_id: i64) -> Arc<Mutex<()>> {
        self.locks
            .entry(auction_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 경매 잠금 하에서 fut 실행
    /// 잠금 해제는 가드 드롭으로 성공/실패 모든 경로에서 보장된다.
    pub async fn with_auction_lock<Fut, T>(
        &self,
        auction_id: i64,
        fut: Fut,
    ) -> Result<T, LockTimeout>
    where
        Fut: Future<Output = T>,
    {
        let lock = self.entry(auction_id);
        let guard = match tokio::time::timeout(self.timeout, lock.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                warn!(
                    "{:<12} --> 잠금 획득 타임아웃: auction_id={}",
                    "Lock", auction_id
                );
                return Err(LockTimeout);
            }
        };
        let result = fut.await;
        drop(guard);
        Ok(result)
    }

    /// 현재 등록된 잠금 수 (관측용)
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

// endregion: --- Auction Lock Table

// region:    --- Tests


// endregion: --- Tests
