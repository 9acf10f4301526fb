//! 엔드투엔드 테스트
//! 실행 중인 서버(localhost:3000)와 Postgres가 필요하므로 기본으로는 제외된다.
//! `cargo test -- --ignored`로 실행한다.

use auction_bid_engine::bidding::model::Auction;
use auction_bid_engine::database::DatabaseManager;
use auction_bid_engine::query;
use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde_json::json;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

const BASE_URL: &str = "http://localhost:3000";

/// 트레이싱 초기화
fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .without_time()
        .with_target(false)
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// 데이터베이스 매니저 설정
async fn setup() -> Arc<DatabaseManager> {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    Arc::new(
        DatabaseManager::new(&database_url)
            .await
            .expect("데이터베이스 연결 실패"),
    )
}

/// 테스트용 경매 생성
async fn create_test_auction(
    db_manager: &DatabaseManager,
    seller_id: i64,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    status: &str,
) -> Auction {
    let status = status.to_string();
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, Auction>(
                    "INSERT INTO auctions (seller_id, car_id, start_price, current_price, minimum_increment, start_date, end_date, status)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                     RETURNING *",
                )
                .bind(seller_id)
                .bind(77)
                .bind(10_000_i64)
                .bind(10_000_i64)
                .bind(500_i64)
                .bind(start_date)
                .bind(end_date)
                .bind(&status)
                .fetch_one(&mut **tx)
                .await
            })
        })
        .await
        .unwrap()
}

async fn active_auction(db_manager: &DatabaseManager) -> Auction {
    create_test_auction(
        db_manager,
        1,
        Utc::now() - Duration::minutes(5),
        Utc::now() + Duration::hours(2),
        "ACTIVE",
    )
    .await
}

/// 입찰 요청 전송
async fn post_bid(client: &Client, auction_id: i64, body: Value) -> (StatusCode, Value) {
    let response = client
        .post(format!("{}/auctions/{}/bid", BASE_URL, auction_id))
        .json(&body)
        .send()
        .await
        .expect("Failed to send request");
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    (StatusCode::from_u16(status.as_u16()).unwrap(), body)
}

/// 입찰 성공 경로 테스트
#[tokio::test]
#[ignore = "실행 중인 서버와 데이터베이스가 필요합니다"]
async fn test_place_bid() {
    let db_manager = setup().await;
    let client = Client::new();
    let auction = active_auction(&db_manager).await;

    // 현재가 10,000 -> 권장 최소 입찰가 10,500
    let (status, body) = post_bid(
        &client,
        auction.id,
        json!({ "bidder_id": 2, "amount": 10_500 }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["amount"], 10_500);
    assert_eq!(body["auction_id"], auction.id);

    let updated = query::handlers::get_auction(&db_manager, auction.id)
        .await
        .unwrap();
    assert_eq!(updated.current_price, 10_500);
}

/// 최소 입찰가 미달 거부 + 힌트로 재시도 성공 테스트
#[tokio::test]
#[ignore = "실행 중인 서버와 데이터베이스가 필요합니다"]
async fn test_bid_too_low_returns_hints() {
    let db_manager = setup().await;
    let client = Client::new();
    let auction = active_auction(&db_manager).await;

    let (status, body) = post_bid(
        &client,
        auction.id,
        json!({ "bidder_id": 2, "amount": 10_100 }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BID_TOO_LOW");
    let recommended_min = body["recommended_min"].as_i64().unwrap();
    assert_eq!(recommended_min, 10_500);

    // 권장가 그대로는 항상 수락되어야 한다 (경계 포함)
    let (status, _) = post_bid(
        &client,
        auction.id,
        json!({ "bidder_id": 2, "amount": recommended_min }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

/// 이상치 입찰 확인 플래그 테스트
#[tokio::test]
#[ignore = "실행 중인 서버와 데이터베이스가 필요합니다"]
async fn test_high_bid_requires_confirmation() {
    let db_manager = setup().await;
    let client = Client::new();
    let auction = active_auction(&db_manager).await;

    // 현재가의 3배는 확인 없이는 거부
    let (status, body) = post_bid(
        &client,
        auction.id,
        json!({ "bidder_id": 2, "amount": 30_000 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "HIGH_BID_CONFIRMATION_REQUIRED");

    // 확인 플래그가 있으면 수락
    let (status, _) = post_bid(
        &client,
        auction.id,
        json!({ "bidder_id": 2, "amount": 30_000, "confirm_high_bid": true }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

/// 판매자 본인 입찰 거부 테스트
#[tokio::test]
#[ignore = "실행 중인 서버와 데이터베이스가 필요합니다"]
async fn test_owner_cannot_bid() {
    let db_manager = setup().await;
    let client = Client::new();
    let auction = active_auction(&db_manager).await;

    let (status, body) = post_bid(
        &client,
        auction.id,
        json!({ "bidder_id": auction.seller_id, "amount": 10_500 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "OWNER_CANNOT_BID");
}

/// 종료 시각 이후 입찰 거부 테스트 (스윕 전이라도)
#[tokio::test]
#[ignore = "실행 중인 서버와 데이터베이스가 필요합니다"]
async fn test_bid_after_end_date_fails() {
    let db_manager = setup().await;
    let client = Client::new();
    // 상태는 ACTIVE지만 종료 시각이 이미 지난 경매
    let auction = create_test_auction(
        &db_manager,
        1,
        Utc::now() - Duration::hours(2),
        Utc::now() - Duration::minutes(1),
        "ACTIVE",
    )
    .await;

    let (status, body) = post_bid(
        &client,
        auction.id,
        json!({ "bidder_id": 2, "amount": 10_500 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "AUCTION_NOT_ACTIVE");
}

/// 입찰 이력 조회: 금액 내림차순 + 최고가 표시
#[tokio::test]
#[ignore = "실행 중인 서버와 데이터베이스가 필요합니다"]
async fn test_bid_listing_marks_winning_bid() {
    let db_manager = setup().await;
    let client = Client::new();
    let auction = active_auction(&db_manager).await;

    for amount in [10_500, 11_000, 11_500] {
        let (status, _) = post_bid(
            &client,
            auction.id,
            json!({ "bidder_id": 2, "amount": amount }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let bids: Value = client
        .get(format!("{}/auctions/{}/bid", BASE_URL, auction.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let list = bids.as_array().unwrap();
    assert_eq!(list.len(), 3);
    assert_eq!(list[0]["amount"], 11_500);
    assert_eq!(list[0]["is_winning"], true);
    assert_eq!(list[1]["is_winning"], false);
    assert_eq!(list[2]["is_winning"], false);
}

/// 동시성 입찰 테스트
/// 같은 경매에 대한 커밋은 전부 직렬화되어 단일 전체 순서를 이룬다.
#[tokio::test]
#[ignore = "실행 중인 서버와 데이터베이스가 필요합니다"]
async fn test_concurrent_bidding() {
    init_tracing();
    let db_manager = setup().await;
    let auction = active_auction(&db_manager).await;

    // 50개의 동시 입찰 생성
    let mut handles = vec![];
    for i in 1..=50_i64 {
        let amount = auction.current_price + i * 1_000;
        let auction_id = auction.id;

        let handle = tokio::spawn(async move {
            let client = Client::new();
            let response = client
                .post(format!("{}/auctions/{}/bid", BASE_URL, auction_id))
                .json(&json!({ "bidder_id": 100 + i, "amount": amount }))
                .send()
                .await
                .unwrap();
            response.status().as_u16()
        });
        handles.push(handle);
    }

    let mut successful_bids = 0;
    let mut rejected_bids = 0;
    for handle in handles {
        match handle.await.unwrap() {
            201 => successful_bids += 1,
            400 | 409 => rejected_bids += 1,
            other => panic!("예상하지 못한 상태 코드: {}", other),
        }
    }
    info!(
        "성공한 입찰 수: {}, 거부된 입찰 수: {}",
        successful_bids, rejected_bids
    );
    assert!(successful_bids >= 1);
    assert_eq!(successful_bids + rejected_bids, 50);

    // 입찰 원장은 생성 순서대로 금액이 단조 증가해야 한다
    let mut bids = query::handlers::get_auction_bids(&db_manager, auction.id)
        .await
        .unwrap();
    bids.sort_by_key(|b| b.id);
    for window in bids.windows(2) {
        assert!(window[0].amount < window[1].amount);
    }

    // 최고 입찰가와 경매 현재가 일치 확인
    let updated = query::handlers::get_auction(&db_manager, auction.id)
        .await
        .unwrap();
    let highest = bids.iter().map(|b| b.amount).max().unwrap();
    assert_eq!(updated.current_price, highest);
}

/// 클라이언트 재시도 멱등성 테스트
#[tokio::test]
#[ignore = "실행 중인 서버와 데이터베이스가 필요합니다"]
async fn test_duplicate_submission_is_idempotent() {
    let db_manager = setup().await;
    let client = Client::new();
    let auction = active_auction(&db_manager).await;

    let body = json!({ "bidder_id": 2, "amount": 10_500, "request_ts": 1_722_000_000 });
    let (status1, first) = post_bid(&client, auction.id, body.clone()).await;
    assert_eq!(status1, StatusCode::CREATED);

    // 같은 제출 키로 재전송하면 기존 입찰이 그대로 반환된다
    let (status2, second) = post_bid(&client, auction.id, body).await;
    assert_eq!(status2, StatusCode::CREATED);
    assert_eq!(first["bid_id"], second["bid_id"]);

    let bids = query::handlers::get_auction_bids(&db_manager, auction.id)
        .await
        .unwrap();
    assert_eq!(bids.len(), 1);
}

/// 라이프사이클 스윕 멱등성 테스트
#[tokio::test]
#[ignore = "실행 중인 서버와 데이터베이스가 필요합니다"]
async fn test_lifecycle_sweep_is_idempotent() {
    let db_manager = setup().await;
    let client = Client::new();
    // 종료 시각이 지난 ACTIVE 경매
    let auction = create_test_auction(
        &db_manager,
        1,
        Utc::now() - Duration::hours(2),
        Utc::now() - Duration::minutes(1),
        "ACTIVE",
    )
    .await;

    let sweep = |client: Client| async move {
        let response = client
            .post(format!("{}/admin/lifecycle/sweep", BASE_URL))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        response.json::<Value>().await.unwrap()
    };

    sweep(client.clone()).await;
    let after_first = query::handlers::get_auction(&db_manager, auction.id)
        .await
        .unwrap();
    assert_eq!(after_first.status, "ENDED");

    // 두 번째 스윕은 같은 경매를 다시 전이시키지 않는다
    let report = sweep(client.clone()).await;
    assert_eq!(report["ended"], 0);
    let after_second = query::handlers::get_auction(&db_manager, auction.id)
        .await
        .unwrap();
    assert_eq!(after_second.status, "ENDED");
}
