//! Shared helpers for the harvester integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use regulation_harvester::config::CrawlConfig;
use regulation_harvester::{FetchedPage, Fetcher, HarvesterError, Result};

pub const ROOT_URL: &str = "https://law.moj.gov.tw/Law/LawSearchLaw.aspx";
pub const BASE_URL: &str = "https://law.moj.gov.tw/Law/";

/// Load a page from `tests/fixtures/moj`.
pub fn load_fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("moj")
        .join(name);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to load {}: {}", path.display(), e))
}

/// In-memory fetcher serving fixed pages.
///
/// Unknown URLs answer 404; URLs marked as broken fail like a dropped
/// connection. Every request is recorded.
#[derive(Default)]
pub struct MemoryFetcher {
    pages: HashMap<String, String>,
    broken: HashSet<String>,
    requests: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages.insert(url.into(), body.into());
        self
    }

    pub fn broken(mut self, url: impl Into<String>) -> Self {
        self.broken.insert(url.into());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedPage> {
        self.requests.lock().unwrap().push(url.to_string());
        if self.broken.contains(url) {
            return Err(HarvesterError::RetriesExhausted {
                attempts: 3,
                message: format!("connection reset by peer ({url})"),
            });
        }
        Ok(match self.pages.get(url) {
            Some(body) => FetchedPage {
                url: url.to_string(),
                status: 200,
                body: body.clone(),
            },
            None => FetchedPage {
                url: url.to_string(),
                status: 404,
                body: String::new(),
            },
        })
    }
}

/// Fetcher serving the recorded site fixtures.
pub fn site_fetcher() -> MemoryFetcher {
    MemoryFetcher::new()
        .page(ROOT_URL, load_fixture("LawSearchLaw.html"))
        .page(
            format!("{BASE_URL}LawClass.aspx?TY=04001001"),
            load_fixture("LawClass_04001001.html"),
        )
        .page(
            format!("{BASE_URL}LawClass.aspx?TY=04002001"),
            load_fixture("LawClass_04002001.html"),
        )
        .page(
            format!("{BASE_URL}LawAll.aspx?pcode=A0000001"),
            load_fixture("A0000001.html"),
        )
        .page(
            format!("{BASE_URL}LawAll.aspx?pcode=A0010001"),
            load_fixture("A0010001.html"),
        )
        .page(
            format!("{BASE_URL}LawAll.aspx?pcode=A0010002"),
            load_fixture("A0010002.html"),
        )
        .page(
            format!("{BASE_URL}LawAll.aspx?pcode=A0010020"),
            load_fixture("A0010020.html"),
        )
}

/// Crawl settings pointing at the fixture site.
pub fn fixture_config(output_root: &Path) -> CrawlConfig {
    CrawlConfig::new(output_root)
        .with_root_url(ROOT_URL)
        .with_base_url(BASE_URL)
        .with_concurrency(3)
}

/// A regulation page with the given `(number, text)` articles.
pub fn flat_regulation(articles: &[(&str, &str)]) -> String {
    let rows: String = articles
        .iter()
        .map(|(number, text)| {
            format!(
                r#"<div class="row"><div class="col-no">{number}</div><div class="col-data"><div class="line-0000">{text}</div></div></div>"#
            )
        })
        .collect();
    format!(r#"<html><body><div id="pnLawFla"><div class="law-reg-content">{rows}</div></div></body></html>"#)
}
