//! Integration tests for the download-link resolution chain.

use std::sync::Arc;

use async_trait::async_trait;
use bookstore_core::{
    ApiSource, BookRecord, LinkExtractor, LinkResolver, ResolveError, SourceId,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HASH: &str = "d41d8cd98f00b204e9800998ecf8427e";

fn catalog_record(hint: Option<&str>, hash: &str) -> BookRecord {
    let mut record = BookRecord::new(SourceId::Catalog);
    record.title = Some("Dune".to_string());
    record.content_hash = hash.to_string();
    record.download_hint = hint.map(ToString::to_string);
    record
}

fn api_record(hash: &str) -> BookRecord {
    let mut record = BookRecord::new(SourceId::Api);
    record.title = Some("Dune".to_string());
    record.content_hash = hash.to_string();
    record
}

/// Resolver wired to an unreachable api endpoint (api is not under test) with
/// explicit host lists.
fn resolver(direct_hosts: Vec<String>, catalog_hosts: Vec<String>) -> LinkResolver {
    LinkResolver::with_hosts(
        Arc::new(ApiSource::with_base_url("http://127.0.0.1:1")),
        direct_hosts,
        catalog_hosts,
        "https://fallback.test/main/{hash}",
    )
}

struct StubExtractor {
    links: Vec<String>,
}

#[async_trait]
impl LinkExtractor for StubExtractor {
    async fn extract(&self, _page_url: &str) -> Result<Vec<String>, ResolveError> {
        Ok(self.links.clone())
    }
}

// ==================== Catalog Chain ====================

#[tokio::test]
async fn test_direct_hint_returned_verbatim_without_network() {
    let hint = "https://dl.direct.test/main/abc.epub";
    let record = catalog_record(Some(hint), HASH);
    // No catalog hosts registered: any page fetch attempt would fail loudly,
    // so an exact single-link result proves no network was touched.
    let resolver = resolver(vec!["dl.direct.test".to_string()], Vec::new());

    let links = resolver.resolve(&record).await.unwrap();
    assert_eq!(links, vec![hint.to_string()]);
}

#[tokio::test]
async fn test_page_scan_finds_direct_links() {
    let server = MockServer::start().await;
    let page_body = r#"
        <html><body>
          <a href="https://dl.direct.test/main/abc.epub">mirror 1</a>
          <a href="/unrelated">elsewhere</a>
        </body></html>"#;
    Mock::given(method("GET"))
        .and(path("/book/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page_body))
        .mount(&server)
        .await;

    let host = server.address().ip().to_string();
    let record = catalog_record(Some(&format!("{}/book/1", server.uri())), HASH);
    let resolver = resolver(vec!["dl.direct.test".to_string()], vec![host]);

    let links = resolver.resolve(&record).await.unwrap();
    assert_eq!(links, vec!["https://dl.direct.test/main/abc.epub".to_string()]);
}

#[tokio::test]
async fn test_page_scan_download_text_tier() {
    let server = MockServer::start().await;
    let page_body = r#"<a href="/fetch?id=1">Download</a>"#;
    Mock::given(method("GET"))
        .and(path("/book/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page_body))
        .mount(&server)
        .await;

    let host = server.address().ip().to_string();
    let record = catalog_record(Some(&format!("{}/book/1", server.uri())), "");
    let resolver = resolver(vec!["dl.direct.test".to_string()], vec![host]);

    let links = resolver.resolve(&record).await.unwrap();
    assert_eq!(links, vec![format!("{}/fetch?id=1", server.uri())]);
}

#[tokio::test]
async fn test_helper_consulted_when_page_scan_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/book/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>no links here</p>"))
        .mount(&server)
        .await;

    let host = server.address().ip().to_string();
    let record = catalog_record(Some(&format!("{}/book/1", server.uri())), HASH);
    let resolver = resolver(vec!["dl.direct.test".to_string()], vec![host]).with_extractor(
        Arc::new(StubExtractor {
            links: vec!["https://helper.test/found.epub".to_string()],
        }),
    );

    let links = resolver.resolve(&record).await.unwrap();
    assert_eq!(links, vec!["https://helper.test/found.epub".to_string()]);
}

#[tokio::test]
async fn test_hash_fallback_when_page_and_helper_yield_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/book/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>nothing</p>"))
        .mount(&server)
        .await;

    let host = server.address().ip().to_string();
    let record = catalog_record(Some(&format!("{}/book/1", server.uri())), HASH);
    let resolver = resolver(vec!["dl.direct.test".to_string()], vec![host])
        .with_extractor(Arc::new(StubExtractor { links: Vec::new() }));

    let links = resolver.resolve(&record).await.unwrap();
    assert_eq!(links, vec![format!("https://fallback.test/main/{HASH}")]);
}

#[tokio::test]
async fn test_last_resort_returns_hint_verbatim() {
    // Hint on an unknown host, no hash: nothing in the chain applies except
    // the verbatim fallback.
    let record = catalog_record(Some("https://unknown.test/page"), "");
    let resolver = resolver(vec!["dl.direct.test".to_string()], Vec::new());

    let links = resolver.resolve(&record).await.unwrap();
    assert_eq!(links, vec!["https://unknown.test/page".to_string()]);
}

#[tokio::test]
async fn test_no_hint_no_hash_is_no_links_found() {
    let record = catalog_record(None, "");
    let resolver = resolver(Vec::new(), Vec::new());

    let error = resolver.resolve(&record).await.unwrap_err();
    assert!(matches!(error, ResolveError::NoLinksFound { .. }));
}

// ==================== Api Records ====================

#[tokio::test]
async fn test_api_links_placeholders_filtered() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/links"))
        .and(query_param("md5", HASH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "links": [
                "https://example.com/sample.epub",
                "https://cdn.vault.test/real.epub",
                "https://cdn.vault.test/{md5}"
            ]
        })))
        .mount(&server)
        .await;

    let resolver = LinkResolver::with_hosts(
        Arc::new(ApiSource::with_base_url(server.uri())),
        Vec::new(),
        Vec::new(),
        "https://fallback.test/main/{hash}",
    );

    let links = resolver.resolve(&api_record(HASH)).await.unwrap();
    assert_eq!(links, vec!["https://cdn.vault.test/real.epub".to_string()]);
}

#[tokio::test]
async fn test_api_all_links_filtered_is_no_links_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/links"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "links": ["https://example.com/sample.epub"]
        })))
        .mount(&server)
        .await;

    let resolver = LinkResolver::with_hosts(
        Arc::new(ApiSource::with_base_url(server.uri())),
        Vec::new(),
        Vec::new(),
        "https://fallback.test/main/{hash}",
    );

    let error = resolver.resolve(&api_record(HASH)).await.unwrap_err();
    assert!(matches!(error, ResolveError::NoLinksFound { .. }));
}
