//! HTTP fetcher tests against a mock server.
//!
//! The blocking client owns its own runtime, so it is created, used and
//! dropped on the blocking pool.

mod common;

use pretty_assertions::assert_eq;
use regulation_harvester::config::CrawlConfig;
use regulation_harvester::{Crawler, FetchedPage, Fetcher, HarvesterError, HttpFetcher, Result};
use tempfile::tempdir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{flat_regulation, load_fixture};

async fn fetch(url: String) -> Result<FetchedPage> {
    tokio::task::spawn_blocking(move || HttpFetcher::new()?.fetch(&url))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_fetch_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Law/LawAll.aspx"))
        .and(query_param("pcode", "A0000001"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(load_fixture("A0000001.html"), "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let url = format!("{}/Law/LawAll.aspx?pcode=A0000001", server.uri());
    let page = fetch(url.clone()).await.unwrap();

    assert_eq!(page.url, url);
    assert_eq!(page.status, 200);
    assert!(page.body.contains("中華民國基於三民主義"));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let page = fetch(format!("{}/Law/missing", server.uri())).await.unwrap();
    assert_eq!(page.status, 404);
    assert!(matches!(
        page.into_success(),
        Err(HarvesterError::Status { status: 404, .. })
    ));
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = fetch(format!("{}/Law/LawSearchLaw.aspx", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HarvesterError::RetriesExhausted { attempts: 3, .. }
    ));
}

#[tokio::test]
async fn test_crawl_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Law/LawSearchLaw.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r##"<ul id="tree"><li><a href="#">行政</a><ul><li><a href="LawClass.aspx?TY=1">總統府</a></li></ul></li></ul>"##,
            "text/html; charset=utf-8",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Law/LawClass.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<table><tr><td><a href="LawAll.aspx?pcode=B1">總統府組織法</a></td></tr></table>"#,
            "text/html; charset=utf-8",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Law/LawAll.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            flat_regulation(&[("第 1 條", "總統府置秘書長")]),
            "text/html; charset=utf-8",
        ))
        .mount(&server)
        .await;

    let temp = tempdir().unwrap();
    let config = CrawlConfig::new(temp.path())
        .with_root_url(format!("{}/Law/LawSearchLaw.aspx", server.uri()))
        .with_base_url(format!("{}/Law/", server.uri()));

    let fetcher = tokio::task::spawn_blocking(HttpFetcher::new)
        .await
        .unwrap()
        .unwrap();
    let crawler = Crawler::new(config, fetcher);
    let summary = crawler.crawl().await.unwrap();
    tokio::task::spawn_blocking(move || drop(crawler))
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    let content =
        std::fs::read_to_string(temp.path().join("行政").join("總統府組織法.json")).unwrap();
    assert_eq!(content, "{\n    \"第 1 條\": \"總統府置秘書長\"\n}\n");
}
