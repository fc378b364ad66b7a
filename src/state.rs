//! Shared application state for all routes.

use crate::config::ResolvedModel;
use crate::store::Backend;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub model: Arc<ResolvedModel>,
    pub backend: Arc<dyn Backend>,
}

impl AppState {
    pub fn new(model: ResolvedModel, backend: impl Backend + 'static) -> Self {
        AppState {
            model: Arc::new(model),
            backend: Arc::new(backend),
        }
    }
}
