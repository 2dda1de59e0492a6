// region:    --- Imports
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;
// endregion: --- Imports

/// Errors produced by the auction engine and its collaborators.
#[derive(Debug, Clone, Error)]
pub enum AuctionError {
    #[error("Invalid input. {0}")]
    InvalidInput(String),
    #[error("Not found. {0}")]
    NotFound(String),
    #[error("Auction is not active")]
    AuctionNotActive,
    #[error("Bid amount must be higher than current price")]
    BidTooLow { current_price: i64, minimum: i64 },
    #[error("Auction has already been settled")]
    AlreadySettled,
    #[error("Auction can no longer be edited. {0}")]
    NotEditable(String),
    #[error("Too many concurrent bids, please retry")]
    Contention,
    #[error("External dependency failed. {0}")]
    External(String),
    #[error("Internal error. {0}")]
    Internal(String),
}

impl AuctionError {
    /// Stable machine readable code sent alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AuctionNotActive => "AUCTION_NOT_ACTIVE",
            Self::BidTooLow { .. } => "BID_TOO_LOW",
            Self::AlreadySettled => "ALREADY_SETTLED",
            Self::NotEditable(_) => "NOT_EDITABLE",
            Self::Contention => "MAX_RETRIES_EXCEEDED",
            Self::External(_) => "EXTERNAL_FAILURE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AuctionNotActive
            | Self::BidTooLow { .. }
            | Self::AlreadySettled
            | Self::NotEditable(_)
            | Self::Contention => StatusCode::CONFLICT,
            Self::External(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AuctionError {
    fn from(e: sqlx::Error) -> Self {
        Self::Internal(format!("Database error: {e}"))
    }
}

impl From<reqwest::Error> for AuctionError {
    fn from(e: reqwest::Error) -> Self {
        Self::External(e.to_string())
    }
}

impl IntoResponse for AuctionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Self::Internal(detail) => {
                error!("{:<12} --> Internal failure: {}", "Handler", detail);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let mut body = serde_json::json!({
            "error": message,
            "code": self.code(),
        });
        if let Self::BidTooLow {
            current_price,
            minimum,
        } = self
        {
            body["current_price"] = current_price.into();
            body["minimum"] = minimum.into();
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_map_to_409() {
        let err = AuctionError::BidTooLow {
            current_price: 10,
            minimum: 11,
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(AuctionError::Contention.code(), "MAX_RETRIES_EXCEEDED");
        assert_eq!(
            AuctionError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn sqlx_errors_are_internal() {
        let err: AuctionError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
