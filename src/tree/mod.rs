//! Depth-first search and mutation helpers over the page forest.
//!
//! Everything here is pure: callers load a [`MetaDocument`], run one of
//! these transforms, and persist the result. Sibling lists are kept in
//! insertion order; display order comes from `sortOrder` alone.

use std::collections::HashSet;

use log::{debug, warn};

use crate::errors::WikiError;
use crate::types::{DeletedItem, MetaDocument, PageNode, Placement};

pub fn find<'a, F>(nodes: &'a [PageNode], pred: &F) -> Option<&'a PageNode>
where
    F: Fn(&PageNode) -> bool,
{
    for node in nodes {
        if pred(node) {
            return Some(node);
        }
        if let Some(found) = find(&node.children, pred) {
            return Some(found);
        }
    }
    None
}

pub fn find_mut<'a, F>(nodes: &'a mut [PageNode], pred: &F) -> Option<&'a mut PageNode>
where
    F: Fn(&PageNode) -> bool,
{
    for node in nodes.iter_mut() {
        if pred(node) {
            return Some(node);
        }
        if let Some(found) = find_mut(&mut node.children, pred) {
            return Some(found);
        }
    }
    None
}

pub fn find_by_id<'a>(nodes: &'a [PageNode], id: &str) -> Option<&'a PageNode> {
    find(nodes, &|n: &PageNode| n.id == id)
}

pub fn find_by_path<'a>(nodes: &'a [PageNode], path: &str) -> Option<&'a PageNode> {
    find(nodes, &|n: &PageNode| n.path == path)
}

/// Remove the first node matching `pred` (depth-first) from wherever it sits.
pub fn detach<F>(nodes: &mut Vec<PageNode>, pred: &F) -> Option<PageNode>
where
    F: Fn(&PageNode) -> bool,
{
    for i in 0..nodes.len() {
        if pred(&nodes[i]) {
            return Some(nodes.remove(i));
        }
        if let Some(found) = detach(&mut nodes[i].children, pred) {
            return Some(found);
        }
    }
    None
}

/// A parent that can take new children: present and not in the trash.
pub fn live_parent<'a>(nodes: &'a [PageNode], id: &str) -> Result<&'a PageNode, WikiError> {
    match find_by_id(nodes, id) {
        Some(parent) if parent.deleted => {
            warn!("Parent {} is deleted", id);
            Err(WikiError::ParentNotFound)
        }
        Some(parent) => Ok(parent),
        None => Err(WikiError::ParentNotFound),
    }
}

/// The children list a placement refers to. A deleted parent counts as
/// missing.
pub fn siblings_mut<'a>(
    pages: &'a mut Vec<PageNode>,
    placement: &Placement,
) -> Result<&'a mut Vec<PageNode>, WikiError> {
    match placement {
        Placement::Root => Ok(pages),
        Placement::Under(parent_id) => {
            find_mut(pages, &|n: &PageNode| n.id == *parent_id && !n.deleted)
                .map(|parent| &mut parent.children)
                .ok_or(WikiError::ParentNotFound)
        }
    }
}

/// `max(sortOrder) + 1` over a sibling list, starting at 1.
pub fn next_sort_order(siblings: &[PageNode]) -> i64 {
    siblings
        .iter()
        .map(|n| n.sort_order)
        .max()
        .map_or(1, |max| max + 1)
}

pub fn set_deleted(node: &mut PageNode, deleted: bool) {
    node.deleted = deleted;
    for child in &mut node.children {
        set_deleted(child, deleted);
    }
}

/// True when `id` names `node` or one of its descendants.
pub fn subtree_contains(node: &PageNode, id: &str) -> bool {
    node.id == id || node.children.iter().any(|c| subtree_contains(c, id))
}

/// Content paths of a node and all of its descendants.
pub fn subtree_paths(node: &PageNode) -> Vec<String> {
    let mut paths = Vec::new();
    collect_paths(node, &mut paths);
    paths
}

fn collect_paths(node: &PageNode, out: &mut Vec<String>) {
    if !node.path.is_empty() {
        out.push(node.path.clone());
    }
    for child in &node.children {
        collect_paths(child, out);
    }
}

/// Every soft-deleted node, paired with its parent's id.
pub fn collect_deleted(nodes: &[PageNode]) -> Vec<DeletedItem> {
    let mut out = Vec::new();
    collect_deleted_under(nodes, None, &mut out);
    out
}

fn collect_deleted_under(nodes: &[PageNode], parent_id: Option<&str>, out: &mut Vec<DeletedItem>) {
    for node in nodes {
        if node.deleted {
            out.push(DeletedItem {
                id: node.id.clone(),
                path: node.path.clone(),
                title: node.title.clone(),
                parent_id: parent_id.map(str::to_string),
            });
        }
        collect_deleted_under(&node.children, Some(&node.id), out);
    }
}

/// Copy of the forest without deleted or unlisted nodes, siblings sorted by
/// `sortOrder`. A dropped node takes its subtree with it.
pub fn visible<F>(nodes: &[PageNode], listable: &F) -> Vec<PageNode>
where
    F: Fn(&PageNode) -> bool,
{
    let mut out: Vec<PageNode> = nodes
        .iter()
        .filter(|n| !n.deleted && listable(*n))
        .map(|n| PageNode {
            children: visible(&n.children, listable),
            ..n.clone()
        })
        .collect();
    out.sort_by_key(|n| n.sort_order);
    out
}

pub fn max_numeric_id(nodes: &[PageNode]) -> u64 {
    nodes
        .iter()
        .map(|n| {
            let own = n.id.parse::<u64>().unwrap_or(0);
            own.max(max_numeric_id(&n.children))
        })
        .max()
        .unwrap_or(0)
}

/// First id that appears twice, if any.
pub fn find_duplicate_id(nodes: &[PageNode]) -> Option<String> {
    fn walk<'a>(nodes: &'a [PageNode], seen: &mut HashSet<&'a str>) -> Option<String> {
        for node in nodes {
            if !seen.insert(node.id.as_str()) {
                return Some(node.id.clone());
            }
            if let Some(dup) = walk(&node.children, seen) {
                return Some(dup);
            }
        }
        None
    }
    walk(nodes, &mut HashSet::new())
}

/// Allocate the next page id and advance the counter.
pub fn allocate_id(doc: &mut MetaDocument) -> String {
    let next = doc.last_id.max(max_numeric_id(&doc.pages)) + 1;
    doc.last_id = next;
    next.to_string()
}

/// Append a node under `placement` with the next free sort order.
pub fn attach(
    doc: &mut MetaDocument,
    placement: &Placement,
    mut node: PageNode,
) -> Result<(), WikiError> {
    let siblings = siblings_mut(&mut doc.pages, placement)?;
    node.sort_order = next_sort_order(siblings);
    siblings.push(node);
    Ok(())
}

/// Clear `deleted` on the subtree rooted at `id` and move it under `target`.
///
/// Returns `false`, leaving the document untouched, when the item or the
/// target is missing, when the target is deleted, or when the target lies
/// inside the item's own subtree.
pub fn restore(doc: &mut MetaDocument, id: &str, target: &Placement) -> bool {
    let Some(node) = find_by_id(&doc.pages, id) else {
        warn!("Restore skipped: item {} not found", id);
        return false;
    };
    if let Placement::Under(target_id) = target {
        if subtree_contains(node, target_id) {
            warn!("Restore skipped: target {} is inside item {}", target_id, id);
            return false;
        }
        if live_parent(&doc.pages, target_id).is_err() {
            warn!("Restore skipped: target {} missing or deleted for item {}", target_id, id);
            return false;
        }
    }

    let Some(mut node) = detach(&mut doc.pages, &|n: &PageNode| n.id == id) else {
        return false;
    };
    set_deleted(&mut node, false);
    match attach(doc, target, node) {
        Ok(()) => {
            debug!("Restored item {} under {:?}", id, target);
            true
        }
        Err(_) => false,
    }
}

/// Move the node at `source_path` under `target`.
pub fn move_node(
    doc: &mut MetaDocument,
    source_path: &str,
    target: &Placement,
) -> Result<(), WikiError> {
    let source = find_by_path(&doc.pages, source_path).ok_or(WikiError::NotFound)?;
    if let Placement::Under(target_id) = target {
        if subtree_contains(source, target_id) {
            return Err(WikiError::Validation(
                "Cannot move an item into itself".to_string(),
            ));
        }
        live_parent(&doc.pages, target_id)?;
    }
    let node = detach(&mut doc.pages, &|n: &PageNode| n.path == source_path)
        .ok_or(WikiError::NotFound)?;
    attach(doc, target, node)
}

/// Exchange the sort orders of two siblings.
///
/// With no explicit orders the current values are swapped. Explicit orders
/// must differ from each other and from every other sibling.
pub fn swap_sort_order(
    siblings: &mut [PageNode],
    path: &str,
    swap_path: &str,
    new_sort_order: Option<i64>,
    swap_sort_order: Option<i64>,
) -> Result<(), WikiError> {
    let a = siblings.iter().position(|n| n.path == path);
    let b = siblings.iter().position(|n| n.path == swap_path);
    let (Some(a), Some(b)) = (a, b) else {
        return Err(WikiError::ItemsNotFound);
    };
    if a == b {
        return Err(WikiError::Validation(
            "Cannot swap an item with itself".to_string(),
        ));
    }

    let new_a = new_sort_order.unwrap_or(siblings[b].sort_order);
    let new_b = swap_sort_order.unwrap_or(siblings[a].sort_order);
    if new_a == new_b {
        return Err(WikiError::Validation(
            "Swapped items need distinct sort orders".to_string(),
        ));
    }
    let collides = siblings
        .iter()
        .enumerate()
        .any(|(i, n)| i != a && i != b && (n.sort_order == new_a || n.sort_order == new_b));
    if collides {
        return Err(WikiError::Validation(
            "Sort order already used by another sibling".to_string(),
        ));
    }

    siblings[a].sort_order = new_a;
    siblings[b].sort_order = new_b;
    Ok(())
}
