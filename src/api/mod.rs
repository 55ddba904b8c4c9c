pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::search::ScanStore;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ScanStore>,
}

impl AppState {
    pub fn new(store: Arc<ScanStore>) -> Self {
        Self { store }
    }
}
