/// 입찰 가격 정책
/// 1. 최소 다음 입찰가 계산 (구간별 증분)
/// 2. 이상치 입찰 판정 (오입력 방지)
// region:    --- Imports
use serde::{Deserialize, Serialize};

// endregion: --- Imports

// region:    --- Pricing Policy

/// 가격 정책 설정값
/// 임계값 튜닝은 제품 결정이므로 상수가 아닌 설정으로 둔다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// 전역 최소 증분
    pub global_floor: i64,
    /// 가격 구간별 증분 테이블 (임계값 내림차순)
    pub tiers: Vec<(i64, i64)>,
    /// 이상치 판정: 권장가 + 증분 × N 이상
    pub outlier_increment_multiple: i64,
    /// 이상치 판정: 현재가 × N 이상
    pub outlier_price_multiple: i64,
    /// 이상치 판정: N의 배수이면서
    pub outlier_round_step: i64,
    /// 권장가 × N 이상
    pub outlier_round_multiple: i64,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            global_floor: 500,
            tiers: vec![(100_000, 2_000), (50_000, 1_000)],
            outlier_increment_multiple: 20,
            outlier_price_multiple: 3,
            outlier_round_step: 1_000,
            outlier_round_multiple: 5,
        }
    }
}

// endregion: --- Pricing Policy

// region:    --- Bid Quote

/// 잠금 구간 안에서 계산되는 입찰 견적
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BidQuote {
    /// 허용되는 최소 다음 입찰가
    pub recommended_min: i64,
    /// 유효 증분
    pub effective_increment: i64,
}

/// 현재가에 해당하는 구간 증분
fn tier_increment(policy: &PricingPolicy, current_price: i64) -> i64 {
    for (threshold, increment) in &policy.tiers {
        if current_price >= *threshold {
            return *increment;
        }
    }
    policy.global_floor
}

/// 유효 증분: max(구간 증분, 경매 설정 증분, 전역 최소 증분)
pub fn effective_increment(
    policy: &PricingPolicy,
    current_price: i64,
    configured_increment: i64,
) -> i64 {
    tier_increment(policy, current_price)
        .max(configured_increment)
        .max(policy.global_floor)
}

/// 최소 다음 입찰가: 현재가 + 유효 증분을 유효 증분의 배수로 올림
pub fn minimum_next_bid(
    policy: &PricingPolicy,
    current_price: i64,
    configured_increment: i64,
) -> i64 {
    let increment = effective_increment(policy, current_price, configured_increment);
    let base = current_price + increment;
    let remainder = base % increment;
    if remainder == 0 {
        base
    } else {
        base - remainder + increment
    }
}

/// 견적 계산 (최소 다음 입찰가 + 유효 증분)
pub fn quote(policy: &PricingPolicy, current_price: i64, configured_increment: i64) -> BidQuote {
    BidQuote {
        recommended_min: minimum_next_bid(policy, current_price, configured_increment),
        effective_increment: effective_increment(policy, current_price, configured_increment),
    }
}

// endregion: --- Bid Quote

// region:    --- Outlier Guard

/// 이상치 입찰 판정
/// 오입력(fat-finger) 방지 목적이며, 확인 플래그로 통과 가능하다.
pub fn is_outlier(
    policy: &PricingPolicy,
    proposed_amount: i64,
    current_price: i64,
    quote: BidQuote,
) -> bool {
    // (a) 권장가에서 증분 × N 이상 점프
    if proposed_amount >= quote.recommended_min + quote.effective_increment * policy.outlier_increment_multiple
    {
        return true;
    }
    // (b) 현재가의 N배 이상
    if current_price > 0 && proposed_amount >= current_price * policy.outlier_price_multiple {
        return true;
    }
    // (c) 라운드 금액이면서 권장가의 N배 이상
    if proposed_amount % policy.outlier_round_step == 0
        && proposed_amount >= quote.recommended_min * policy.outlier_round_multiple
    {
        return true;
    }
    false
}

// endregion: --- Outlier Guard

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PricingPolicy {
        PricingPolicy::default()
    }

    #[test]
    fn test_minimum_next_bid_base_tier() {
        assert_eq!(minimum_next_bid(&policy(), 0, 500), 500);
        assert_eq!(minimum_next_bid(&policy(), 10_000, 500), 10_500);
    }

    #[test]
    fn test_minimum_next_bid_mid_tier() {
        // 50,000 이상 구간은 증분 1,000
        assert_eq!(minimum_next_bid(&policy(), 60_000, 500), 61_000);
    }

    #[test]
    fn test_minimum_next_bid_top_tier() {
        // 100,000 이상 구간은 증분 2,000
        assert_eq!(minimum_next_bid(&policy(), 150_000, 500), 152_000);
    }

    #[test]
    fn test_minimum_next_bid_rounds_up_to_increment_multiple() {
        // 50,300 + 1,000 = 51,300 -> 1,000의 배수로 올림 = 52,000
        assert_eq!(minimum_next_bid(&policy(), 50_300, 500), 52_000);
    }

    #[test]
    fn test_effective_increment_respects_configured_value() {
        assert_eq!(effective_increment(&policy(), 10_000, 3_000), 3_000);
        // 구간 증분이 설정값보다 크면 구간 증분 적용
        assert_eq!(effective_increment(&policy(), 150_000, 700), 2_000);
        // 전역 최소 증분 아래로는 내려가지 않음
        assert_eq!(effective_increment(&policy(), 0, 100), 500);
    }

    #[test]
    fn test_outlier_increment_jump() {
        let q = quote(&policy(), 10_000, 500);
        assert_eq!(q.recommended_min, 10_500);
        // 권장가 + 500 × 20 = 20,500 이상이면 이상치
        assert!(is_outlier(&policy(), 20_500, 10_000, q));
        assert!(!is_outlier(&policy(), 11_500, 10_000, q));
    }

    #[test]
    fn test_outlier_price_multiple() {
        let q = quote(&policy(), 10_000, 500);
        // 현재가의 3배 이상이면 이상치
        assert!(is_outlier(&policy(), 30_000, 10_000, q));
        assert!(!is_outlier(&policy(), 12_500, 10_000, q));
    }

    #[test]
    fn test_outlier_round_amount() {
        let q = quote(&policy(), 1_000, 500);
        assert_eq!(q.recommended_min, 1_500);
        // 1,000의 배수이면서 권장가의 5배 이상
        assert!(is_outlier(&policy(), 8_000, 1_000, q));
        // 배수가 아니면 해당 규칙은 적용되지 않음
        assert!(!is_outlier(&policy(), 2_500, 1_000, q));
    }

    #[test]
    fn test_recommended_min_is_never_outlier() {
        // 권장가 자체는 항상 입찰 가능해야 한다
        for current in [0, 700, 10_000, 49_999, 50_000, 99_999, 100_000, 250_000] {
            let q = quote(&policy(), current, 500);
            assert!(
                !is_outlier(&policy(), q.recommended_min, current, q),
                "current={}",
                current
            );
        }
    }
}

// endregion: --- Tests
