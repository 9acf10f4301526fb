/// 엔진 오류 타입
/// 엔진 내부는 구조화된 오류 종류(enum)만 다루고,
/// 사용자 메시지 렌더링은 HTTP 경계(IntoResponse)에서만 수행한다.
// region:    --- Imports
use crate::lock::LockTimeout;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

// endregion: --- Imports

// region:    --- Bid Error

/// 입찰 처리 오류
#[derive(Debug, Error)]
pub enum BidError {
    #[error("auction not found")]
    AuctionNotFound,

    #[error("auction not active")]
    AuctionNotActive,

    #[error("owner cannot bid")]
    OwnerCannotBid,

    #[error("invalid amount")]
    InvalidAmount,

    #[error("bid too low")]
    BidTooLow {
        recommended_min: i64,
        min_increment: i64,
    },

    #[error("high bid confirmation required")]
    HighBidConfirmationRequired {
        recommended_min: i64,
        min_increment: i64,
    },

    #[error("lock timeout")]
    LockTimeout,

    #[error("commit conflict")]
    CommitConflict,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("broker error: {0}")]
    Broker(String),
}

impl BidError {
    /// 기계 판독용 오류 코드
    pub fn code(&self) -> &'static str {
        match self {
            BidError::AuctionNotFound => "AUCTION_NOT_FOUND",
            BidError::AuctionNotActive => "AUCTION_NOT_ACTIVE",
            BidError::OwnerCannotBid => "OWNER_CANNOT_BID",
            BidError::InvalidAmount => "INVALID_AMOUNT",
            BidError::BidTooLow { .. } => "BID_TOO_LOW",
            BidError::HighBidConfirmationRequired { .. } => "HIGH_BID_CONFIRMATION_REQUIRED",
            BidError::LockTimeout => "LOCK_TIMEOUT",
            BidError::CommitConflict => "COMMIT_CONFLICT",
            BidError::Database(_) => "DATABASE_ERROR",
            BidError::Broker(_) => "BROKER_ERROR",
        }
    }

    /// HTTP 상태 코드 매핑
    pub fn status(&self) -> StatusCode {
        match self {
            BidError::AuctionNotFound => StatusCode::NOT_FOUND,
            BidError::AuctionNotActive
            | BidError::OwnerCannotBid
            | BidError::InvalidAmount
            | BidError::BidTooLow { .. }
            | BidError::HighBidConfirmationRequired { .. } => StatusCode::BAD_REQUEST,
            BidError::LockTimeout | BidError::CommitConflict => StatusCode::CONFLICT,
            BidError::Database(_) | BidError::Broker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 사용자 메시지 (표현 계층)
    fn message(&self) -> &'static str {
        match self {
            BidError::AuctionNotFound => "경매를 찾을 수 없습니다.",
            BidError::AuctionNotActive => "진행 중인 경매가 아닙니다.",
            BidError::OwnerCannotBid => "판매자는 자신의 경매에 입찰할 수 없습니다.",
            BidError::InvalidAmount => "입찰 금액이 올바르지 않습니다.",
            BidError::BidTooLow { .. } => "입찰 금액이 최소 입찰가보다 낮습니다.",
            BidError::HighBidConfirmationRequired { .. } => {
                "비정상적으로 높은 입찰입니다. 확인 후 다시 시도하세요."
            }
            BidError::LockTimeout => "입찰 처리 대기 시간이 초과되었습니다. 다시 시도하세요.",
            BidError::CommitConflict => "입찰 처리 충돌이 발생했습니다. 다시 시도하세요.",
            BidError::Database(_) | BidError::Broker(_) => "내부 오류가 발생했습니다.",
        }
    }
}

impl From<LockTimeout> for BidError {
    fn from(_: LockTimeout) -> Self {
        BidError::LockTimeout
    }
}

/// HTTP 경계 렌더링
impl IntoResponse for BidError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({
            "error": self.message(),
            "code": self.code(),
        });
        // 재시도 힌트 첨부
        match &self {
            BidError::BidTooLow {
                recommended_min,
                min_increment,
            }
            | BidError::HighBidConfirmationRequired {
                recommended_min,
                min_increment,
            } => {
                body["recommended_min"] = serde_json::json!(recommended_min);
                body["min_increment"] = serde_json::json!(min_increment);
            }
            _ => {}
        }
        (self.status(), Json(body)).into_response()
    }
}

// endregion: --- Bid Error

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_status() {
        assert_eq!(BidError::AuctionNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(BidError::LockTimeout.status(), StatusCode::CONFLICT);
        assert_eq!(
            BidError::BidTooLow {
                recommended_min: 1000,
                min_increment: 500
            }
            .code(),
            "BID_TOO_LOW"
        );
        assert_eq!(
            BidError::HighBidConfirmationRequired {
                recommended_min: 1000,
                min_increment: 500
            }
            .status(),
            StatusCode::BAD_REQUEST
        );
    }
}

// endregion: --- Tests
