use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::errors::WikiError;
use crate::services::{ContentStore, MarkdownService, MetaStore, SearchService};
use crate::tree;
use crate::types::{
    CreateItemRequest, DeletedItem, ImportMarkdownRequest, MetaDocument, MoveItemRequest,
    PageNode, PageView, Placement, RestoreReport, UpdateFileRequest, UpdateSortOrderRequest,
};
use crate::utils::{ensure_safe_path, now_rfc3339, slugify, title_from_slug};

/// Page tree operations: every mutation is one serialized
/// read-modify-write of `meta.json`, with content files and the search
/// index kept in step.
#[derive(Clone)]
pub struct PageService {
    meta: Arc<MetaStore>,
    content: ContentStore,
    search: Arc<SearchService>,
    markdown: MarkdownService,
}

/// Resolve a parent given by id or by content path
fn resolve_parent(
    doc: &MetaDocument,
    parent_id: Option<&str>,
    parent_path: Option<&str>,
) -> Result<Placement, WikiError> {
    match Placement::from_target(parent_id) {
        Placement::Under(id) => {
            tree::live_parent(&doc.pages, &id)?;
            Ok(Placement::Under(id))
        }
        Placement::Root => match Placement::from_target(parent_path) {
            Placement::Root => Ok(Placement::Root),
            Placement::Under(path) => {
                let parent =
                    tree::find_by_path(&doc.pages, &path).ok_or(WikiError::ParentNotFound)?;
                tree::live_parent(&doc.pages, &parent.id)?;
                Ok(Placement::Under(parent.id.clone()))
            }
        },
    }
}

impl PageService {
    pub fn new(meta: Arc<MetaStore>, content: ContentStore, search: Arc<SearchService>) -> Self {
        Self {
            meta,
            content,
            search,
            markdown: MarkdownService::new(),
        }
    }

    pub fn meta(&self) -> &MetaStore {
        &self.meta
    }

    pub fn content(&self) -> &ContentStore {
        &self.content
    }

    /// Listable forest: no deleted nodes, no nodes without a content file
    pub fn list(&self) -> Result<Vec<PageNode>, WikiError> {
        let doc = self.meta.load()?;
        let listed = tree::visible(&doc.pages, &|n: &PageNode| self.content.exists(&n.path));
        debug!("Listing {} root pages", listed.len());
        Ok(listed)
    }

    pub fn deleted_items(&self) -> Result<Vec<DeletedItem>, WikiError> {
        let doc = self.meta.load()?;
        Ok(tree::collect_deleted(&doc.pages))
    }

    /// Paths of every soft-deleted node
    pub fn deleted_paths(&self) -> Result<Vec<String>, WikiError> {
        Ok(self.deleted_items()?.into_iter().map(|d| d.path).collect())
    }

    pub fn get_page(&self, id: &str) -> Result<PageView, WikiError> {
        let doc = self.meta.load()?;
        let node = tree::find_by_id(&doc.pages, id).ok_or(WikiError::NotFound)?;
        let content = self.content.read(&node.path)?;
        let rendered = self.markdown.render(&content);
        Ok(PageView {
            id: node.id.clone(),
            slug: node.slug.clone(),
            title: node.title.clone(),
            path: node.path.clone(),
            is_public: node.is_public,
            last_modified: node.last_modified.clone(),
            content,
            html: rendered.html,
        })
    }

    pub fn create(&self, req: CreateItemRequest) -> Result<PageNode, WikiError> {
        let name = req.name.trim();
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(WikiError::Validation(
                "Name must contain letters or digits".to_string(),
            ));
        }
        let path = format!("{}.md", slug);
        let content = req.content.unwrap_or_default();

        let node = self.meta.update(|doc| {
            let placement =
                resolve_parent(doc, req.parent_id.as_deref(), req.parent_path.as_deref())?;
            if tree::find_by_path(&doc.pages, &path).is_some() {
                warn!("Page file {} is already used by another page and will be overwritten", path);
            }
            let mut node = PageNode {
                id: tree::allocate_id(doc),
                slug: slug.clone(),
                title: name.to_string(),
                path: path.clone(),
                is_public: true,
                version: 1,
                sort_order: 0,
                last_modified: now_rfc3339(),
                deleted: false,
                children: Vec::new(),
            };
            self.content.write(&path, &content)?;
            let siblings = tree::siblings_mut(&mut doc.pages, &placement)?;
            node.sort_order = tree::next_sort_order(siblings);
            siblings.push(node.clone());
            Ok(node)
        })?;

        self.search.upsert(&node.path, &content);
        info!("Created page {} '{}' at {}", node.id, node.title, node.path);
        Ok(node)
    }

    /// Soft delete marks the subtree; permanent delete detaches it and
    /// removes its content files.
    pub fn delete(&self, id: &str, permanent: bool) -> Result<(), WikiError> {
        if !permanent {
            self.meta.update(|doc| {
                let node = tree::find_mut(&mut doc.pages, &|n: &PageNode| n.id == id)
                    .ok_or(WikiError::NotFound)?;
                tree::set_deleted(node, true);
                Ok(())
            })?;
            info!("Moved page {} to trash", id);
            return Ok(());
        }

        // Paths another page still points at survive the delete
        let orphaned = self.meta.update(|doc| {
            let removed = tree::detach(&mut doc.pages, &|n: &PageNode| n.id == id)
                .ok_or(WikiError::NotFound)?;
            let mut paths = tree::subtree_paths(&removed);
            paths.sort();
            paths.dedup();
            paths.retain(|path| {
                let shared = tree::find_by_path(&doc.pages, path).is_some();
                if shared {
                    warn!("Keeping {}, another page still uses it", path);
                }
                !shared
            });
            Ok(paths)
        })?;

        // The document is already saved, so a file that will not go away is
        // logged rather than failing the request
        let mut failed = 0;
        for path in &orphaned {
            if let Err(e) = self.content.remove(path) {
                error!("Could not remove {} of deleted page {}: {}", path, id, e);
                failed += 1;
            }
            self.search.remove(path);
        }
        info!(
            "Permanently deleted page {} and its descendants ({} files removed, {} failed)",
            id,
            orphaned.len() - failed,
            failed
        );
        Ok(())
    }

    pub fn restore(&self, ids: &[String], target: Option<&str>) -> Result<RestoreReport, WikiError> {
        if ids.is_empty() {
            return Err(WikiError::Validation("Invalid items to restore".to_string()));
        }
        let placement = Placement::from_target(target);
        let report = self.meta.update(|doc| {
            let mut report = RestoreReport::default();
            for id in ids {
                if tree::restore(doc, id, &placement) {
                    report.restored.push(id.clone());
                } else {
                    report.skipped.push(id.clone());
                }
            }
            Ok(report)
        })?;
        info!(
            "Restored {} items, skipped {}",
            report.restored.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    pub fn update_sort_order(&self, req: &UpdateSortOrderRequest) -> Result<(), WikiError> {
        self.meta.update(|doc| {
            let siblings = match Placement::from_target(req.parent_path.as_deref()) {
                Placement::Root => &mut doc.pages,
                Placement::Under(parent_path) => {
                    tree::find_mut(&mut doc.pages, &|n: &PageNode| n.path == parent_path)
                        .map(|parent| &mut parent.children)
                        .ok_or(WikiError::ItemsNotFound)?
                }
            };
            tree::swap_sort_order(
                siblings,
                &req.path,
                &req.swap_path,
                req.new_sort_order,
                req.swap_sort_order,
            )
        })?;
        info!("Swapped sort order of {} and {}", req.path, req.swap_path);
        Ok(())
    }

    /// Reparent a node (drag and drop in the tree view)
    pub fn move_item(&self, req: &MoveItemRequest) -> Result<(), WikiError> {
        self.meta.update(|doc| {
            let target = if req.move_to_root {
                Placement::Root
            } else {
                let target_path = req
                    .target_path
                    .as_deref()
                    .ok_or_else(|| WikiError::Validation("Missing target path".to_string()))?;
                let parent =
                    tree::find_by_path(&doc.pages, target_path).ok_or(WikiError::ParentNotFound)?;
                Placement::Under(parent.id.clone())
            };
            tree::move_node(doc, &req.source_path, &target)
        })?;
        info!("Moved {}", req.source_path);
        Ok(())
    }

    /// Save page content, optionally under a new path
    pub fn update_file(&self, req: &UpdateFileRequest) -> Result<(), WikiError> {
        ensure_safe_path(&req.old_path)?;
        ensure_safe_path(&req.new_path)?;
        let renamed = req.old_path != req.new_path;

        let old_still_used = self.meta.update(|doc| {
            let node = tree::find_mut(&mut doc.pages, &|n: &PageNode| n.path == req.old_path)
                .ok_or(WikiError::NotFound)?;
            node.path = req.new_path.clone();
            node.last_modified = now_rfc3339();
            self.content.write(&req.new_path, &req.content)?;
            Ok(tree::find_by_path(&doc.pages, &req.old_path).is_some())
        })?;

        if renamed && old_still_used {
            warn!("Keeping {}, another page still uses it", req.old_path);
        } else if renamed {
            if let Err(e) = self.content.remove(&req.old_path) {
                warn!("Could not remove old file {}: {}", req.old_path, e);
            }
            self.search.remove(&req.old_path);
        }
        self.search.upsert(&req.new_path, &req.content);
        info!("Updated file {}", req.new_path);
        Ok(())
    }

    /// Add an uploaded Markdown document as a new page
    pub fn import_markdown(&self, req: &ImportMarkdownRequest) -> Result<PageNode, WikiError> {
        let mut file_name = req
            .file_name
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-");
        if !crate::services::file_service::is_markdown(&file_name) {
            file_name.push_str(".md");
        }
        ensure_safe_path(&file_name)?;
        let slug = file_name
            .trim_end_matches(".mdx")
            .trim_end_matches(".md")
            .to_string();
        if slug.is_empty() {
            return Err(WikiError::Validation("No file name provided".to_string()));
        }

        let node = self.meta.update(|doc| {
            let placement = match Placement::from_target(req.target_location.as_deref()) {
                Placement::Root => Placement::Root,
                Placement::Under(id) => {
                    tree::live_parent(&doc.pages, &id)?;
                    Placement::Under(id)
                }
            };
            let mut node = PageNode {
                id: tree::allocate_id(doc),
                title: title_from_slug(&slug),
                slug: slug.clone(),
                path: file_name.clone(),
                is_public: true,
                version: 1,
                sort_order: 0,
                last_modified: now_rfc3339(),
                deleted: false,
                children: Vec::new(),
            };
            self.content.write(&file_name, &req.content)?;
            let siblings = tree::siblings_mut(&mut doc.pages, &placement)?;
            node.sort_order = tree::next_sort_order(siblings);
            siblings.push(node.clone());
            Ok(node)
        })?;

        self.search.upsert(&node.path, &req.content);
        info!("Imported {} as page {}", node.path, node.id);
        Ok(node)
    }

    /// Replace the whole forest, keeping the id counter monotonic
    pub fn replace_structure(&self, pages: Vec<PageNode>) -> Result<usize, WikiError> {
        if let Some(dup) = tree::find_duplicate_id(&pages) {
            return Err(WikiError::Validation(format!("Duplicate page id {}", dup)));
        }
        let count = self.meta.update(|doc| {
            doc.last_id = doc.last_id.max(tree::max_numeric_id(&pages));
            doc.pages = pages;
            Ok(doc.pages.len())
        })?;
        info!("Replaced page structure with {} root pages", count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> (tempfile::TempDir, PageService) {
        let dir = tempfile::tempdir().unwrap();
        let content = ContentStore::new(dir.path().to_path_buf());
        let meta = Arc::new(MetaStore::new(dir.path().join("meta.json")));
        let search = Arc::new(SearchService::new(content.clone()));
        (dir, PageService::new(meta, content, search))
    }

    fn create(pages: &PageService, name: &str, parent_id: Option<&str>) -> PageNode {
        pages
            .create(CreateItemRequest {
                parent_id: parent_id.map(str::to_string),
                parent_path: None,
                name: name.to_string(),
                content: Some(format!("# {}\n", name)),
            })
            .unwrap()
    }

    #[test]
    fn create_intro_at_root() {
        let (_dir, pages) = service();
        let node = create(&pages, "Intro", None);
        assert_eq!(node.slug, "intro");
        assert_eq!(node.sort_order, 1);
        assert_eq!(node.version, 1);
        assert!(!node.deleted);

        let doc = pages.meta().load().unwrap();
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.last_id, 1);
        assert!(pages.content().exists("intro.md"));
    }

    #[test]
    fn create_under_missing_parent_fails() {
        let (_dir, pages) = service();
        let result = pages.create(CreateItemRequest {
            parent_id: None,
            parent_path: Some("nowhere.md".into()),
            name: "Child".into(),
            content: None,
        });
        assert!(matches!(result, Err(WikiError::ParentNotFound)));
        assert!(pages.meta().load().unwrap().pages.is_empty());
        assert!(!pages.content().exists("child.md"));
    }

    #[test]
    fn create_by_parent_path_appends_to_children() {
        let (_dir, pages) = service();
        let parent = create(&pages, "Guide", None);
        let first = pages
            .create(CreateItemRequest {
                parent_id: None,
                parent_path: Some(parent.path.clone()),
                name: "Setup".into(),
                content: None,
            })
            .unwrap();
        let second = create(&pages, "Usage", Some(parent.id.as_str()));
        assert_eq!(first.sort_order, 1);
        assert_eq!(second.sort_order, 2);
        assert_eq!(pages.list().unwrap()[0].children.len(), 2);
    }

    #[test]
    fn permanent_delete_removes_subtree_files_only() {
        let (_dir, pages) = service();
        let parent = create(&pages, "Parent", None);
        create(&pages, "Child", Some(parent.id.as_str()));
        let sibling = create(&pages, "Sibling", None);

        pages.delete(&parent.id, true).unwrap();
        let doc = pages.meta().load().unwrap();
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].id, sibling.id);
        assert_eq!(doc.pages[0].sort_order, 2);
        assert!(!pages.content().exists("parent.md"));
        assert!(!pages.content().exists("child.md"));
        assert!(pages.content().exists("sibling.md"));
        assert!(matches!(pages.delete(&parent.id, true), Err(WikiError::NotFound)));
    }

    #[test]
    fn permanent_delete_keeps_file_shared_with_survivor() {
        let (_dir, pages) = service();
        let upper = create(&pages, "Intro", None);
        let lower = create(&pages, "intro", None);
        assert_eq!(upper.path, lower.path);
        pages.search.rebuild().unwrap();

        pages.delete(&upper.id, true).unwrap();
        assert!(pages.content().exists("intro.md"));
        let listed = pages.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, lower.id);
        assert_eq!(pages.search.search("intro").unwrap().len(), 1);
    }

    #[test]
    fn permanent_delete_survives_unremovable_file() {
        let (dir, pages) = service();
        let node = create(&pages, "Stuck", None);
        std::fs::remove_file(dir.path().join("stuck.md")).unwrap();
        std::fs::create_dir(dir.path().join("stuck.md")).unwrap();

        pages.delete(&node.id, true).unwrap();
        assert!(pages.meta().load().unwrap().pages.is_empty());
        assert!(dir.path().join("stuck.md").is_dir());
    }

    #[test]
    fn deleted_parent_refuses_new_children() {
        let (_dir, pages) = service();
        let parent = create(&pages, "Archive", None);
        pages.delete(&parent.id, false).unwrap();

        let by_id = pages.create(CreateItemRequest {
            parent_id: Some(parent.id.clone()),
            parent_path: None,
            name: "Note".into(),
            content: None,
        });
        assert!(matches!(by_id, Err(WikiError::ParentNotFound)));
        let by_path = pages.create(CreateItemRequest {
            parent_id: None,
            parent_path: Some(parent.path.clone()),
            name: "Note".into(),
            content: None,
        });
        assert!(matches!(by_path, Err(WikiError::ParentNotFound)));
        assert!(!pages.content().exists("note.md"));

        let imported = pages.import_markdown(&ImportMarkdownRequest {
            file_name: "Letter.md".into(),
            content: "hi".into(),
            target_location: Some(parent.id.clone()),
        });
        assert!(matches!(imported, Err(WikiError::ParentNotFound)));
        assert!(!pages.content().exists("letter.md"));

        let loose = create(&pages, "Loose", None);
        let moved = pages.move_item(&MoveItemRequest {
            source_path: loose.path.clone(),
            target_path: Some(parent.path.clone()),
            move_to_root: false,
        });
        assert!(matches!(moved, Err(WikiError::ParentNotFound)));

        let doc = pages.meta().load().unwrap();
        assert_eq!(doc.pages.len(), 2);
        assert!(doc.pages[0].children.is_empty());
    }

    #[test]
    fn restore_into_deleted_target_is_skipped() {
        let (_dir, pages) = service();
        let page = create(&pages, "Page", None);
        let bin = create(&pages, "Bin", None);
        pages.delete(&page.id, false).unwrap();
        pages.delete(&bin.id, false).unwrap();

        let report = pages
            .restore(&[page.id.clone()], Some(bin.id.as_str()))
            .unwrap();
        assert!(report.restored.is_empty());
        assert_eq!(report.skipped, vec![page.id.clone()]);
        assert_eq!(pages.deleted_items().unwrap().len(), 2);
        assert!(pages.meta().load().unwrap().pages[1].children.is_empty());
    }

    #[test]
    fn update_file_keeps_old_path_still_in_use() {
        let (_dir, pages) = service();
        let first = create(&pages, "Notes", None);
        create(&pages, "notes", None);
        pages
            .update_file(&UpdateFileRequest {
                old_path: first.path.clone(),
                new_path: "renamed.md".into(),
                content: "moved".into(),
            })
            .unwrap();
        assert!(pages.content().exists("notes.md"));
        assert!(pages.content().exists("renamed.md"));
        let doc = pages.meta().load().unwrap();
        assert_eq!(doc.pages[0].path, "renamed.md");
        assert_eq!(doc.pages[1].path, "notes.md");
    }

    #[test]
    fn soft_delete_then_restore_elsewhere() {
        let (_dir, pages) = service();
        let parent = create(&pages, "Parent", None);
        let child = create(&pages, "Child", Some(parent.id.as_str()));
        let other = create(&pages, "Other", None);
        create(&pages, "Existing", Some(other.id.as_str()));

        pages.delete(&parent.id, false).unwrap();
        assert_eq!(pages.deleted_items().unwrap().len(), 2);
        assert_eq!(pages.list().unwrap().len(), 1);

        let report = pages
            .restore(&[child.id.clone(), "404".to_string()], Some(other.id.as_str()))
            .unwrap();
        assert_eq!(report.restored, vec![child.id.clone()]);
        assert_eq!(report.skipped, vec!["404".to_string()]);

        let listed = pages.list().unwrap();
        let restored = &listed[0].children[1];
        assert_eq!(restored.id, child.id);
        assert_eq!(restored.sort_order, 2);
        assert_eq!(pages.deleted_items().unwrap()[0].id, parent.id);
    }

    #[test]
    fn update_file_renames_and_reindexes() {
        let (_dir, pages) = service();
        let node = create(&pages, "Draft", None);
        pages
            .update_file(&UpdateFileRequest {
                old_path: node.path.clone(),
                new_path: "final.md".into(),
                content: "# Final\nshipping notes".into(),
            })
            .unwrap();
        assert!(!pages.content().exists("draft.md"));
        assert_eq!(pages.content().read("final.md").unwrap(), "# Final\nshipping notes");
        let doc = pages.meta().load().unwrap();
        assert_eq!(doc.pages[0].path, "final.md");
        assert_eq!(pages.get_page(&node.id).unwrap().title, "Draft");
    }

    #[test]
    fn import_derives_names_from_file() {
        let (_dir, pages) = service();
        let node = pages
            .import_markdown(&ImportMarkdownRequest {
                file_name: "Getting Started.md".into(),
                content: "hello".into(),
                target_location: Some("root".into()),
            })
            .unwrap();
        assert_eq!(node.path, "getting-started.md");
        assert_eq!(node.slug, "getting-started");
        assert_eq!(node.title, "Getting Started");
        assert_eq!(pages.content().read("getting-started.md").unwrap(), "hello");
    }

    #[test]
    fn replace_structure_rejects_duplicates_and_keeps_counter() {
        let (_dir, pages) = service();
        create(&pages, "One", None);
        create(&pages, "Two", None);
        let mut forest = pages.meta().load().unwrap().pages;
        forest.truncate(1);
        pages.replace_structure(forest.clone()).unwrap();
        assert_eq!(pages.meta().load().unwrap().last_id, 2);

        forest.push(forest[0].clone());
        assert!(matches!(
            pages.replace_structure(forest),
            Err(WikiError::Validation(_))
        ));
    }
}
