//! Shared application state handed to every axum handler.

use std::path::Path;
use std::sync::Arc;

use crate::errors::EngineError;
use crate::exchange::Exchange;

#[derive(Clone)]
pub struct AppState {
    pub exchange: Arc<Exchange>,
}

impl AppState {
    pub fn new(store_path: impl AsRef<Path>) -> Result<Self, EngineError> {
        Ok(Self {
            exchange: Arc::new(Exchange::open(store_path)?),
        })
    }
}
