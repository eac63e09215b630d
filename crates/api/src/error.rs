//! the closed `{code, message, details?}` envelope (spec.md §6/§7). Every
//! handler returns `Result<T, ApiError>`; `RelayError` and `PoolError`
//! convert into it so handlers never hand-roll a status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use relay_executor::error::RelayError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "MISSING_PARAMS")]
    MissingParams,
    #[serde(rename = "PROOF_FORMAT_ERROR")]
    ProofFormatError,
    #[serde(rename = "INVALID_PROOF")]
    InvalidProof,
    #[serde(rename = "NULLIFIER_SPENT")]
    NullifierSpent,
    #[serde(rename = "UNKNOWN_ROOT")]
    UnknownRoot,
    #[serde(rename = "INSUFFICIENT_POOL_LIQUIDITY")]
    InsufficientPoolLiquidity,
    #[serde(rename = "UNSUPPORTED_TOKEN")]
    UnsupportedToken,
    #[serde(rename = "RELAYER_UNAVAILABLE")]
    RelayerUnavailable,
    #[serde(rename = "NETWORK_ERROR")]
    NetworkError,
    #[serde(rename = "RATE_LIMITED")]
    RateLimited,
}

impl ErrorCode {
    fn status(self) -> StatusCode {
        match self {
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::RelayerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::NetworkError => StatusCode::BAD_GATEWAY,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn rate_limited() -> Self {
        Self::new(ErrorCode::RateLimited, "too many requests, slow down")
    }

    pub fn missing_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MissingParams, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MissingParams, message)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status();
        let body = ErrorBody {
            code: self.code,
            message: self.message,
            details: self.details,
        };
        (status, Json(body)).into_response()
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        let message = err.to_string();
        match &err {
            RelayError::RelayerUnavailable(_) => ApiError::new(ErrorCode::RelayerUnavailable, message),
            RelayError::Signing(_) => ApiError::new(ErrorCode::RelayerUnavailable, message),
            RelayError::ProofShape(_)
            | RelayError::MemoTooLarge(_)
            | RelayError::BatchSizeOutOfRange(_)
            | RelayError::ArrayLengthMismatch(_)
            | RelayError::InvalidAmount => ApiError::new(ErrorCode::ProofFormatError, message),
            RelayError::MissingFee | RelayError::FeeOutOfRange { .. } => {
                ApiError::new(ErrorCode::MissingParams, message)
            }
            RelayError::PublicInputsMismatch { .. } | RelayError::PublicInputsShape { .. } => {
                ApiError::new(ErrorCode::InvalidProof, message)
            }
            RelayError::UnknownRoot(_) => ApiError::new(ErrorCode::UnknownRoot, message),
            RelayError::NullifierAlreadySpent(_) => ApiError::new(ErrorCode::NullifierSpent, message),
            RelayError::UnsupportedToken(_) => ApiError::new(ErrorCode::UnsupportedToken, message),
            RelayError::UnknownPool(_) => ApiError::new(ErrorCode::MissingParams, message),
            RelayError::Chain(_) => ApiError::new(ErrorCode::NetworkError, message),
            RelayError::Pool(_) => ApiError::new(ErrorCode::NetworkError, message),
            RelayError::SubmissionFailed(_) => ApiError::new(ErrorCode::NetworkError, message),
            RelayError::SimulationReverted(revert) => {
                let code = match revert.name {
                    Some("InsufficientPoolBalance") => ErrorCode::InsufficientPoolLiquidity,
                    Some("UnsupportedToken") => ErrorCode::UnsupportedToken,
                    Some("NullifierAlreadySpent") => ErrorCode::NullifierSpent,
                    _ => ErrorCode::InvalidProof,
                };
                ApiError::new(code, message)
            }
        }
    }
}

impl From<pool_state::PoolError> for ApiError {
    fn from(err: pool_state::PoolError) -> Self {
        ApiError::new(ErrorCode::NetworkError, err.to_string())
    }
}
