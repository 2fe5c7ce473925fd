use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::middleware::PerimeterGuard;
use crate::services::{PageService, SearchService};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pages: PageService,
    pub search: Arc<SearchService>,
    pub guard: Arc<PerimeterGuard>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    1
}

/// One entry in the page hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageNode {
    pub id: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub last_modified: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    #[serde(default)]
    pub children: Vec<PageNode>,
}

/// The whole `meta.json` document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaDocument {
    #[serde(default)]
    pub pages: Vec<PageNode>,
    #[serde(default)]
    pub last_id: u64,
}

/// A soft-deleted node as reported by the trash listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedItem {
    pub id: String,
    pub path: String,
    pub title: String,
    pub parent_id: Option<String>,
}

/// Search result information
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub path: String,
    pub excerpt: String,
    pub relevance: f32,
}

/// Markdown rendering result
#[derive(Debug, Clone, Serialize)]
pub struct MarkdownResult {
    pub html: String,
    pub title: Option<String>,
}

/// Outcome of a multi-item restore
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub restored: Vec<String>,
    pub skipped: Vec<String>,
}

/// A page with its content, for the editor and the reader
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub path: String,
    pub is_public: bool,
    pub last_modified: String,
    pub content: String,
    pub html: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemRequest {
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub parent_path: Option<String>,
    pub name: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteItemRequest {
    pub id: String,
    #[serde(default)]
    pub permanent: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreItemsRequest {
    pub items: Vec<String>,
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSortOrderRequest {
    pub path: String,
    #[serde(default)]
    pub new_sort_order: Option<i64>,
    pub swap_path: String,
    #[serde(default)]
    pub swap_sort_order: Option<i64>,
    #[serde(default)]
    pub parent_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveItemRequest {
    pub source_path: String,
    #[serde(default)]
    pub target_path: Option<String>,
    #[serde(default)]
    pub move_to_root: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFileRequest {
    pub old_path: String,
    pub new_path: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportMarkdownRequest {
    pub file_name: String,
    pub content: String,
    #[serde(default)]
    pub target_location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplaceStructureRequest {
    pub pages: Vec<PageNode>,
}

/// Where a node should be attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Root,
    Under(String),
}

impl Placement {
    /// `None`, empty and `"root"` all mean the top level.
    pub fn from_target(target: Option<&str>) -> Self {
        match target.map(str::trim) {
            None | Some("") | Some("root") => Placement::Root,
            Some(id) => Placement::Under(id.to_string()),
        }
    }
}
