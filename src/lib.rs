//! Folio - page tree store and wiki API
//!
//! The page hierarchy lives in a single `meta.json` document next to the
//! Markdown files it points at. [`PageService`] owns every mutation of that
//! document, [`SearchService`] keeps a full-text index over the content files,
//! and the [`middleware`] module guards the HTTP surface per client address.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod logger;
pub mod middleware;
pub mod services;
pub mod tree;
pub mod types;
pub mod utils;

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

pub use config::Config;
pub use errors::WikiError;
pub use logger::Logger;
pub use middleware::{PerimeterGuard, PerimeterPolicy};
pub use services::{ContentStore, MarkdownService, MetaStore, PageService, SearchService};
pub use types::{AppState, MetaDocument, PageNode, SearchResult};

/// Wire the stores and services for `config`
pub fn build_state(config: Config) -> Result<AppState, WikiError> {
    let content = ContentStore::new(config.docs_dir.clone());
    let meta = Arc::new(MetaStore::new(config.meta_path()));
    meta.ensure_exists()?;
    let search = Arc::new(SearchService::new(content.clone()));
    let pages = PageService::new(meta, content, search.clone());
    let guard = Arc::new(PerimeterGuard::from_config(&config));
    Ok(AppState {
        config: Arc::new(config),
        pages,
        search,
        guard,
    })
}

/// The full router: API routes behind the admin check, everything behind
/// the perimeter.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/file-structure",
            get(handlers::file_structure).post(handlers::replace_structure),
        )
        .route("/file-structure/reorder", post(handlers::reorder))
        .route("/create-item", post(handlers::create_item))
        .route(
            "/delete-item",
            post(handlers::delete_item).delete(handlers::delete_item),
        )
        .route("/restore-items", post(handlers::restore_items))
        .route("/update-sort-order", post(handlers::update_sort_order))
        .route("/deleted-items", get(handlers::deleted_items))
        .route("/update-file", post(handlers::update_file))
        .route("/import-markdown", post(handlers::import_markdown))
        .route("/pages/:id", get(handlers::get_page))
        .route("/search", get(handlers::search))
        .route("/search/reindex", post(handlers::reindex))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_admin));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(from_fn_with_state(state.clone(), middleware::perimeter))
        .with_state(state)
}
