//! Listing page resolution.
//!
//! A catalog leaf usually points at a table of regulations. Every anchor in
//! that table becomes one document to fetch, filed in the leaf's directory
//! under the anchor's text.

use scraper::Html;
use url::Url;

use crate::config::resolve_link;
use crate::markup::listing_anchors;
use crate::types::{DocumentTask, FetchTask};

/// Derive document tasks from a listing page.
///
/// Anchors without text or without a resolvable link are skipped.
pub fn resolve_listing(task: &FetchTask, doc: &Html, base_url: &Url) -> Vec<DocumentTask> {
    listing_anchors(doc)
        .into_iter()
        .filter_map(|anchor| {
            if anchor.title.is_empty() {
                tracing::debug!(listing = %task.url, "Skipping anchor without text");
                return None;
            }
            let href = anchor.href?;
            match resolve_link(base_url, &href) {
                Ok(url) => Some(DocumentTask {
                    url,
                    storage_dir: task.storage_dir.clone(),
                    regulation_name: anchor.title,
                }),
                Err(e) => {
                    tracing::warn!(
                        listing = %task.url,
                        regulation_name = %anchor.title,
                        error = %e,
                        "Skipping anchor with invalid link"
                    );
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_url, DEFAULT_BASE_URL};
    use crate::markup::parse_page;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn test_resolve_listing() {
        let task = FetchTask {
            url: "https://law.moj.gov.tw/Law/LawClass.aspx?TY=01".to_string(),
            storage_dir: PathBuf::from("out/憲法"),
            name: "憲法".to_string(),
        };
        let doc = parse_page(
            r#"<table>
                 <tr><td>1</td><td><a href="LawAll.aspx?pcode=A0000001">中華民國憲法</a></td></tr>
                 <tr><td>2</td><td><a href="LawAll.aspx?pcode=A0000002">中華民國憲法增修條文</a></td></tr>
                 <tr><td>3</td><td><a href="LawAll.aspx?pcode=A0000003"> </a></td></tr>
                 <tr><td>4</td><td><a>無連結</a></td></tr>
               </table>"#,
        );
        let base = parse_url(DEFAULT_BASE_URL).unwrap();

        let documents = resolve_listing(&task, &doc, &base);

        assert_eq!(
            documents,
            vec![
                DocumentTask {
                    url: "https://law.moj.gov.tw/Law/LawAll.aspx?pcode=A0000001".to_string(),
                    storage_dir: PathBuf::from("out/憲法"),
                    regulation_name: "中華民國憲法".to_string(),
                },
                DocumentTask {
                    url: "https://law.moj.gov.tw/Law/LawAll.aspx?pcode=A0000002".to_string(),
                    storage_dir: PathBuf::from("out/憲法"),
                    regulation_name: "中華民國憲法增修條文".to_string(),
                },
            ]
        );
    }
}
