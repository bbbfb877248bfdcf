use thiserror::Error;

use crate::store::StoreError;

/// The error taxonomy the matching core can surface to a caller.
///
/// Every variant here is one a transport can re-label (HTTP status, gRPC
/// code, …) but the *meaning* is fixed: these are the only ways placing,
/// filling, or cancelling an order can fail.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("symbol not registered")]
    BookNotFound,

    #[error("symbol already registered")]
    BookAlreadyExists,

    #[error("order not found in the resting queue at the claimed price/side")]
    OrderNotFound,

    #[error("no price level at the claimed price on the claimed side")]
    LimitNotFound,

    #[error("`{0}` is not a valid decimal")]
    InvalidNumber(String),

    #[error("market order could not be fully filled")]
    InsufficientLiquidity,

    #[error("store failure: {0}")]
    StoreFailure(String),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => EngineError::OrderNotFound,
            other => EngineError::StoreFailure(other.to_string()),
        }
    }
}
