use std::sync::Arc;

use crate::{resolver::DownloadResolver, search::SearchService};

/// Shared application state injected into every Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub search: Arc<SearchService>,
    pub resolver: Arc<DownloadResolver>,
}
