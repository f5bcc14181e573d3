use siteprobe_scanner::SitemapError;
use siteprobe_scanner::sitemap::SitemapReader;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SITEMAP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://www.example.com/</loc><lastmod>2026-01-02</lastmod><priority>1.0</priority></url>
  <url><loc>https://www.example.com/pricing</loc><changefreq>weekly</changefreq></url>
</urlset>"#;

fn reader() -> SitemapReader {
    SitemapReader::new(Duration::from_secs(5)).unwrap()
}

async fn serve(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_get_sitemap_urls_in_order() {
    let server = MockServer::start().await;
    serve(&server, ResponseTemplate::new(200).set_body_raw(SITEMAP, "application/xml")).await;

    let urls = reader()
        .get_sitemap_urls(&format!("{}/sitemap.xml", server.uri()))
        .await
        .unwrap();
    assert_eq!(
        urls,
        vec!["https://www.example.com/", "https://www.example.com/pricing"]
    );
}

#[tokio::test]
async fn test_entries_carry_optional_fields() {
    let server = MockServer::start().await;
    serve(
        &server,
        ResponseTemplate::new(200).set_body_raw(SITEMAP, "text/xml; charset=UTF-8"),
    )
    .await;

    let entries = reader()
        .fetch_sitemap_entries(&format!("{}/sitemap.xml", server.uri()))
        .await
        .unwrap();
    assert_eq!(entries[0].last_modified.as_deref(), Some("2026-01-02"));
    assert_eq!(entries[0].priority, Some(1.0));
    assert_eq!(entries[1].change_frequency.as_deref(), Some("weekly"));
}

#[tokio::test]
async fn test_non_success_status_is_fetch_error() {
    let server = MockServer::start().await;
    serve(&server, ResponseTemplate::new(503)).await;

    let err = reader()
        .get_sitemap_urls(&format!("{}/sitemap.xml", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SitemapError::Fetch {
            status: 503,
            reason: "Service Unavailable".to_string()
        }
    );
    assert_eq!(err.to_string(), "Failed to fetch sitemap: 503 Service Unavailable");
}

#[tokio::test]
async fn test_html_response_is_content_type_error() {
    let server = MockServer::start().await;
    serve(
        &server,
        ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"),
    )
    .await;

    let err = reader()
        .get_sitemap_urls(&format!("{}/sitemap.xml", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, SitemapError::ContentType(Some(ref ct)) if ct.starts_with("text/html")));
}

#[tokio::test]
async fn test_sitemap_index_is_format_error() {
    let server = MockServer::start().await;
    serve(
        &server,
        ResponseTemplate::new(200).set_body_raw(
            r#"<?xml version="1.0"?><sitemapindex><sitemap><loc>https://www.example.com/a.xml</loc></sitemap></sitemapindex>"#,
            "application/xml",
        ),
    )
    .await;

    let err = reader()
        .get_sitemap_urls(&format!("{}/sitemap.xml", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, SitemapError::Format(_)));
}

#[tokio::test]
async fn test_transport_failure_is_parse_error() {
    let err = reader()
        .get_sitemap_urls("http://127.0.0.1:1/sitemap.xml")
        .await
        .unwrap_err();
    assert!(matches!(err, SitemapError::Parse(_)));
}

#[tokio::test]
async fn test_validate_sitemap_url() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let reader = reader();
    assert!(reader.validate_sitemap_url(&format!("{}/sitemap.xml", server.uri())).await);
    assert!(!reader.validate_sitemap_url(&format!("{}/missing.xml", server.uri())).await);
    assert!(!reader.validate_sitemap_url("http://127.0.0.1:1/sitemap.xml").await);
}
