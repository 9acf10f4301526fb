/// 엔진 설정
/// 모든 튜닝 값은 환경 변수로 재정의 가능하며, 시작 시 한 번만 읽는다.
// region:    --- Imports
use crate::pricing::PricingPolicy;
use std::time::Duration;
use tracing::info;

// endregion: --- Imports

// region:    --- Env Helpers

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"))
        .unwrap_or(default)
}

/// 가격 구간별 증분 테이블 파싱: "100000:2000,50000:1000"
fn parse_tiers(raw: &str) -> Option<Vec<(i64, i64)>> {
    let mut tiers = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (threshold, increment) = part.split_once(':')?;
        tiers.push((
            threshold.trim().parse::<i64>().ok()?,
            increment.trim().parse::<i64>().ok()?,
        ));
    }
    if tiers.is_empty() {
        return None;
    }
    // 높은 구간이 먼저 평가되도록 내림차순 정렬
    tiers.sort_by(|a, b| b.0.cmp(&a.0));
    Some(tiers)
}

// endregion: --- Env Helpers

// region:    --- Engine Config

/// 엔진 전역 설정
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// HTTP 서버 바인드 주소
    pub bind_addr: String,
    /// 데이터베이스 접속 URL
    pub database_url: String,
    /// Kafka 브로커 주소
    pub kafka_brokers: String,
    /// Kafka 사용 여부 (크로스 프로세스 릴레이 + 분산 작업 큐)
    pub kafka_enabled: bool,
    /// 입찰 상한
    pub max_bid_ceiling: i64,
    /// 경매별 잠금 획득 타임아웃
    pub lock_timeout: Duration,
    /// 팬아웃 배치 윈도우
    pub batch_window: Duration,
    /// 팬아웃 배치 플러시 상한 (이벤트 수)
    pub batch_cap: usize,
    /// 경매 상태 스윕 주기
    pub sweep_interval: Duration,
    /// 작업 최대 시도 횟수
    pub job_max_attempts: u32,
    /// 작업 재시도 백오프 기본값
    pub job_backoff_base: Duration,
    /// 가격 정책 (최소 증분 구간, 이상치 판정 임계값)
    pub pricing: PricingPolicy,
}

impl EngineConfig {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Self {
        let mut pricing = PricingPolicy::default();
        pricing.global_floor = env_i64("BID_GLOBAL_FLOOR", pricing.global_floor);
        if let Ok(raw) = std::env::var("BID_INCREMENT_TIERS") {
            if let Some(tiers) = parse_tiers(&raw) {
                pricing.tiers = tiers;
            }
        }
        pricing.outlier_increment_multiple =
            env_i64("OUTLIER_INCREMENT_MULTIPLE", pricing.outlier_increment_multiple);
        pricing.outlier_price_multiple =
            env_i64("OUTLIER_PRICE_MULTIPLE", pricing.outlier_price_multiple);
        pricing.outlier_round_step = env_i64("OUTLIER_ROUND_STEP", pricing.outlier_round_step);
        pricing.outlier_round_multiple =
            env_i64("OUTLIER_ROUND_MULTIPLE", pricing.outlier_round_multiple);

        let config = Self {
            bind_addr: env_str("BIND_ADDR", "0.0.0.0:3000"),
            database_url: env_str("DATABASE_URL", "postgres://localhost/auction"),
            kafka_brokers: env_str("KAFKA_BROKERS", "localhost:9092"),
            kafka_enabled: env_bool("KAFKA_ENABLED", false),
            max_bid_ceiling: env_i64("BID_MAX_CEILING", 100_000_000),
            lock_timeout: Duration::from_millis(env_u64("LOCK_TIMEOUT_MS", 5_000).clamp(100, 60_000)),
            batch_window: Duration::from_millis(env_u64("BATCH_WINDOW_MS", 1_000).clamp(10, 10_000)),
            batch_cap: env_u64("BATCH_CAP", 100).clamp(1, 10_000) as usize,
            sweep_interval: Duration::from_secs(env_u64("SWEEP_INTERVAL_SECS", 5).clamp(1, 300)),
            job_max_attempts: env_u64("JOB_MAX_ATTEMPTS", 3).clamp(1, 10) as u32,
            job_backoff_base: Duration::from_millis(env_u64("JOB_BACKOFF_BASE_MS", 500).clamp(10, 60_000)),
            pricing,
        };
        info!(
            "{:<12} --> 설정 로드 완료: bind={}, kafka_enabled={}",
            "Config", config.bind_addr, config.kafka_enabled
        );
        config
    }
}

// endregion: --- Engine Config

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tiers() {
        let tiers = parse_tiers("50000:1000, 100000:2000").unwrap();
        // 내림차순 정렬 확인
        assert_eq!(tiers, vec![(100_000, 2_000), (50_000, 1_000)]);
    }

    #[test]
    fn test_parse_tiers_invalid() {
        assert!(parse_tiers("").is_none());
        assert!(parse_tiers("abc").is_none());
        assert!(parse_tiers("100000-2000").is_none());
    }
}

// endregion: --- Tests
