//! Catalog tree building, directory mirroring and fetch planning.
//!
//! The catalog is the nested `ul`/`li` navigation of the root page. It is
//! built once, mirrored onto the output directory, and flattened into one
//! [`FetchTask`] per leaf.

use std::fs;
use std::path::{Path, PathBuf};

use url::Url;

use crate::config::{resolve_link, sanitize_segment};
use crate::error::{HarvesterError, Result};
use crate::markup::ListNode;
use crate::types::{CatalogNode, FetchTask, NodeKind};

/// Build the catalog tree from the top-level navigation list.
///
/// Entries whose name contains a deprecated keyword are dropped together
/// with everything below them. Entries without a usable name, and leaves
/// without a link, are skipped with a warning.
pub fn build_catalog<N: ListNode>(list: &N, deprecated_keywords: &[String]) -> CatalogNode {
    CatalogNode::root(build_entries(list, deprecated_keywords))
}

fn build_entries<N: ListNode>(list: &N, deprecated_keywords: &[String]) -> Vec<CatalogNode> {
    let mut nodes = Vec::new();

    for entry in list.entries() {
        let Some(name) = entry.name() else {
            tracing::warn!("Catalog entry without a name, skipping");
            continue;
        };

        if is_deprecated(&name, deprecated_keywords) {
            tracing::debug!(name = %name, "Skipping deprecated catalog entry");
            continue;
        }

        if let Err(e) = sanitize_segment(&name) {
            tracing::warn!(error = %e, "Catalog entry name unusable as directory, skipping");
            continue;
        }

        if let Some(sublist) = entry.sublist() {
            let children = build_entries(&sublist, deprecated_keywords);
            nodes.push(CatalogNode::category(name, children));
        } else if let Some(link) = entry.link() {
            nodes.push(CatalogNode::leaf(name, link));
        } else {
            tracing::warn!(name = %name, "Catalog leaf without a link, skipping");
        }
    }

    nodes
}

/// Check a name against the deprecated keywords (case-sensitive substring).
#[must_use]
pub fn is_deprecated(name: &str, deprecated_keywords: &[String]) -> bool {
    deprecated_keywords
        .iter()
        .any(|keyword| name.contains(keyword.as_str()))
}

/// Directory of a category node under `base`. The root maps onto `base`.
fn category_dir(node: &CatalogNode, base: &Path) -> Result<PathBuf> {
    if node.is_root() {
        Ok(base.to_path_buf())
    } else {
        Ok(base.join(sanitize_segment(&node.name)?))
    }
}

/// Create a directory unless it already exists.
///
/// Existing directories are left untouched; a directory created
/// concurrently by another worker counts as success.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|e| HarvesterError::storage(path, e))?;
    tracing::debug!(path = %path.display(), "Created directory");
    Ok(())
}

/// Create a directory for every category of the tree under `base`.
pub fn materialize(node: &CatalogNode, base: &Path) -> Result<()> {
    let NodeKind::Category { children } = &node.kind else {
        return Ok(());
    };

    let dir = category_dir(node, base)?;
    ensure_dir(&dir)?;

    for child in children {
        materialize(child, &dir)?;
    }
    Ok(())
}

/// Flatten the tree into fetch tasks, depth-first in document order.
///
/// A leaf's storage directory is its parent category's directory.
pub fn plan(node: &CatalogNode, base: &Path, base_url: &Url) -> Vec<FetchTask> {
    let mut tasks = Vec::new();
    collect_tasks(node, base, base_url, &mut tasks);
    tasks
}

fn collect_tasks(node: &CatalogNode, dir: &Path, base_url: &Url, tasks: &mut Vec<FetchTask>) {
    match &node.kind {
        NodeKind::Category { children } => {
            let dir = match category_dir(node, dir) {
                Ok(dir) => dir,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping category");
                    return;
                }
            };
            for child in children {
                collect_tasks(child, &dir, base_url, tasks);
            }
        }
        NodeKind::Leaf { link } => match resolve_link(base_url, link) {
            Ok(url) => tasks.push(FetchTask {
                url,
                storage_dir: dir.to_path_buf(),
                name: node.name.clone(),
            }),
            Err(e) => {
                tracing::warn!(name = %node.name, error = %e, "Skipping leaf with invalid link");
            }
        },
    }
}
