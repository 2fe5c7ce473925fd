use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, RwLock};

use log::{debug, info, warn};

use crate::errors::WikiError;
use crate::services::{ContentStore, MarkdownService};
use crate::types::SearchResult;

const MAX_RESULTS: usize = 50;

#[derive(Debug, Clone)]
struct IndexedPage {
    title: String,
    title_lower: String,
    body: String,
    body_lower: String,
}

/// Full-text index over page titles and bodies.
///
/// Built on the first query by walking the content root, then kept current
/// through [`SearchService::upsert`] and [`SearchService::remove`] from the
/// same code paths that write content files. A build holds `build_lock`
/// from the walk to the swap, and single-page updates wait on it.
pub struct SearchService {
    content: ContentStore,
    markdown: MarkdownService,
    index: RwLock<Option<HashMap<String, IndexedPage>>>,
    build_lock: Mutex<()>,
}

impl SearchService {
    /// Create a new search service
    pub fn new(content: ContentStore) -> Self {
        Self {
            content,
            markdown: MarkdownService::new(),
            index: RwLock::new(None),
            build_lock: Mutex::new(()),
        }
    }

    fn lock_build(&self) -> MutexGuard<'_, ()> {
        self.build_lock.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn index_page(&self, path: &str, raw: &str) -> IndexedPage {
        let title = self
            .markdown
            .extract_title(raw)
            .unwrap_or_else(|| file_stem(path));
        let body = self.markdown.plain_text(raw);
        IndexedPage {
            title_lower: title.to_lowercase(),
            body_lower: body.to_lowercase(),
            title,
            body,
        }
    }

    /// Walk the content root and replace the whole index
    pub fn rebuild(&self) -> Result<usize, WikiError> {
        let _build = self.lock_build();
        self.rebuild_locked()
    }

    /// Caller holds `build_lock`
    fn rebuild_locked(&self) -> Result<usize, WikiError> {
        let start_time = std::time::Instant::now();
        let mut pages = HashMap::new();
        for path in self.content.list_markdown()? {
            match self.content.read(&path) {
                Ok(raw) => {
                    let page = self.index_page(&path, &raw);
                    pages.insert(path, page);
                }
                Err(e) => warn!("Skipping {} while indexing: {}", path, e),
            }
        }
        let count = pages.len();
        *self.index.write().unwrap_or_else(|p| p.into_inner()) = Some(pages);
        info!(
            "Search index built with {} pages in {}ms",
            count,
            start_time.elapsed().as_millis()
        );
        Ok(count)
    }

    fn ensure_built(&self) -> Result<(), WikiError> {
        if self.is_built() {
            return Ok(());
        }
        let _build = self.lock_build();
        // Another query may have finished the build while we waited
        if !self.is_built() {
            debug!("Search index not built yet, building on first query");
            self.rebuild_locked()?;
        }
        Ok(())
    }

    pub fn is_built(&self) -> bool {
        self.index.read().unwrap_or_else(|p| p.into_inner()).is_some()
    }

    /// Refresh one page. A no-op until the index has been built.
    pub fn upsert(&self, path: &str, raw: &str) {
        let page = self.index_page(path, raw);
        let _build = self.lock_build();
        let mut guard = self.index.write().unwrap_or_else(|p| p.into_inner());
        if let Some(pages) = guard.as_mut() {
            debug!("Indexing {}", path);
            pages.insert(path.to_string(), page);
        }
    }

    pub fn remove(&self, path: &str) {
        let _build = self.lock_build();
        let mut guard = self.index.write().unwrap_or_else(|p| p.into_inner());
        if let Some(pages) = guard.as_mut() {
            if pages.remove(path).is_some() {
                debug!("Dropped {} from index", path);
            }
        }
    }

    /// Search titles and bodies, best matches first
    pub fn search(&self, query: &str) -> Result<Vec<SearchResult>, WikiError> {
        let query = query.trim();
        if query.is_empty() {
            debug!("Empty search query received");
            return Ok(Vec::new());
        }
        self.ensure_built()?;

        let query_lower = query.to_lowercase();
        let words: Vec<&str> = query_lower
            .split_whitespace()
            .filter(|w| w.chars().count() > 2)
            .collect();

        let guard = self.index.read().unwrap_or_else(|p| p.into_inner());
        let Some(pages) = guard.as_ref() else {
            return Ok(Vec::new());
        };

        let mut results: Vec<SearchResult> = pages
            .iter()
            .filter_map(|(path, page)| {
                let relevance = calculate_relevance(page, &query_lower, &words);
                (relevance > 0.0).then(|| SearchResult {
                    title: page.title.clone(),
                    path: path.clone(),
                    excerpt: generate_excerpt(&page.body, query),
                    relevance,
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.path.cmp(&b.path))
        });
        results.truncate(MAX_RESULTS);
        info!("Search for '{}' found {} results", query, results.len());
        Ok(results)
    }
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

/// Phrase hits beat word hits; title hits beat body hits
fn calculate_relevance(page: &IndexedPage, query_lower: &str, words: &[&str]) -> f32 {
    let mut score = 0.0;

    if page.body_lower.contains(query_lower) {
        score += 20.0;
    }
    if page.title_lower.contains(query_lower) {
        score += 15.0;
    }
    for word in words {
        if page.body_lower.contains(word) {
            score += 3.0;
        }
        if page.title_lower.contains(word) {
            score += 5.0;
        }
    }

    score
}

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Up to 100 characters either side of the first hit, cut at word boundaries.
///
/// Matching folds one char to one char so hit positions index `body` directly.
fn generate_excerpt(body: &str, query: &str) -> String {
    const CONTEXT: usize = 100;

    let chars: Vec<char> = body.chars().collect();
    let folded: Vec<char> = chars.iter().map(|&c| fold(c)).collect();
    let needle: Vec<char> = query.chars().map(fold).collect();
    let hit = if needle.is_empty() {
        None
    } else {
        folded.windows(needle.len()).position(|w| w == needle.as_slice())
    };

    let total = chars.len();
    let Some(char_pos) = hit else {
        let truncated: String = chars.iter().take(CONTEXT).collect();
        return if total > CONTEXT {
            format!("{}...", truncated.trim_end())
        } else {
            truncated
        };
    };
    let end = (char_pos + needle.len() + CONTEXT).min(total);
    let start = char_pos.saturating_sub(CONTEXT).min(end);

    let mut excerpt: String = chars[start..end].iter().collect();
    if start > 0 {
        if let Some(space) = excerpt.find(' ') {
            excerpt = excerpt[space + 1..].to_string();
        }
    }
    let excerpt = excerpt.trim();
    match (start > 0, end < total) {
        (true, true) => format!("...{}...", excerpt),
        (true, false) => format!("...{}", excerpt),
        (false, true) => format!("{}...", excerpt),
        (false, false) => excerpt.to_string(),
    }
}
