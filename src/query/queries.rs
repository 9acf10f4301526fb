/// 경매 조회
pub const GET_AUCTION: &str =
    "SELECT id, seller_id, car_id, start_price, current_price, minimum_increment, start_date, end_date, status, created_at FROM auctions WHERE id = $1";

/// 경매 입찰 조회 (금액 내림차순)
pub const GET_AUCTION_BIDS: &str = r#"
    SELECT id, auction_id, bidder_id, amount, created_at
    FROM bids
    WHERE auction_id = $1
    ORDER BY amount DESC
"#;

/// 최고 입찰가 조회
pub const GET_HIGHEST_BID: &str = "SELECT MAX(amount) as highest_bid FROM bids WHERE auction_id = $1";

/// 권위 있는 현재가 조회
/// 저장된 current_price와 입찰 원장의 최고가 중 큰 값 (가격 드리프트 방어)
pub const GET_AUTHORITATIVE_PRICE: &str = r#"
    SELECT GREATEST(
        a.current_price,
        COALESCE((SELECT MAX(b.amount) FROM bids b WHERE b.auction_id = a.id), 0)
    ) AS authoritative_price
    FROM auctions a
    WHERE a.id = $1
"#;

/// 중복 제출 확인용 기존 입찰 조회
pub const FIND_COMMITTED_BID: &str = r#"
    SELECT id, auction_id, bidder_id, amount, created_at
    FROM bids
    WHERE auction_id = $1 AND bidder_id = $2 AND amount = $3
    ORDER BY id DESC
    LIMIT 1
"#;

/// 입찰 기록 추가
pub const INSERT_BID: &str = r#"
    INSERT INTO bids (auction_id, bidder_id, amount, created_at)
    VALUES ($1, $2, $3, $4)
    RETURNING id, auction_id, bidder_id, amount, created_at
"#;

/// 현재가 갱신 (조건부: 더 높은 금액만 허용)
pub const UPDATE_CURRENT_PRICE: &str =
    "UPDATE auctions SET current_price = $1 WHERE id = $2 AND current_price < $1 RETURNING current_price";

/// 상태별 경매 수 조회
pub const GET_STATUS_COUNTS: &str =
    "SELECT status, COUNT(*) as count FROM auctions GROUP BY status ORDER BY status";
