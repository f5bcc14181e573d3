//! Tests against a real headless Chromium.
//!
//! Run with: cargo test -p siteprobe-scanner --test browser_page_tests -- --ignored

use siteprobe_scanner::{
    BrowserOptions, BrowserSession, FormTimeouts, LeadForm, Locator, Page, ScanError, WaitUntil,
};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(20);

async fn launch() -> BrowserSession {
    let options = BrowserOptions {
        sandbox: false,
        ..BrowserOptions::default()
    };
    BrowserSession::launch(&options, TIMEOUT)
        .await
        .expect("Chrome or Chromium must be installed")
}

async fn serve(server: &MockServer, route: &str, status: u16, html: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_raw(html.to_string(), "text/html"))
        .mount(server)
        .await;
}

fn fast() -> FormTimeouts {
    FormTimeouts {
        navigation: TIMEOUT,
        ready: Duration::from_secs(2),
        submit: Duration::from_secs(2),
        settle: Duration::from_millis(200),
        poll_interval: Duration::from_millis(50),
    }
}

#[tokio::test]
#[ignore = "requires Chrome or Chromium"]
async fn test_stylesheet_hidden_form_is_not_ready() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/",
        200,
        r#"<html><head><style>.is-hidden { display: none }</style></head><body>
             <form class="is-hidden"><input type="email"><button type="submit">Join</button></form>
           </body></html>"#,
    )
    .await;

    let mut session = launch().await;
    let page = session.new_page().await.unwrap();
    let mut form = LeadForm::with_options(&page, server.uri(), Default::default(), fast());

    assert!(!form.goto().await.unwrap());

    page.close().await.unwrap();
    session.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Chrome or Chromium"]
async fn test_script_rendered_form_is_ready() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/",
        200,
        r#"<html><body><div id="mount"></div>
             <script>
               document.getElementById('mount').innerHTML =
                 '<form><input type="email" name="email"><button type="submit">Join</button></form>';
             </script>
           </body></html>"#,
    )
    .await;

    let mut session = launch().await;
    let page = session.new_page().await.unwrap();
    let mut form = LeadForm::with_options(&page, server.uri(), Default::default(), fast());

    assert!(form.goto().await.unwrap());

    session.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Chrome or Chromium"]
async fn test_native_validity_after_fill() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/",
        200,
        r#"<html><body><form><input type="email" required></form></body></html>"#,
    )
    .await;

    let mut session = launch().await;
    let page = session.new_page().await.unwrap();
    page.goto(&server.uri(), WaitUntil::DomContentLoaded, TIMEOUT)
        .await
        .unwrap();

    let input = page
        .query_first(&Locator::css(r#"input[type="email"]"#))
        .await
        .unwrap()
        .unwrap();

    page.fill(&input, "invalid-email").await.unwrap();
    assert!(!page.check_validity(&input).await.unwrap());

    page.fill(&input, "test.user+label@domain.com").await.unwrap();
    assert!(page.check_validity(&input).await.unwrap());

    page.fill(&input, "").await.unwrap();
    assert!(!page.check_validity(&input).await.unwrap());

    session.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Chrome or Chromium"]
async fn test_navigation_reports_status_and_stales_handles() {
    let server = MockServer::start().await;
    serve(&server, "/", 200, "<html><head><title>Home</title></head><body><a href=\"/gone\">x</a></body></html>").await;
    serve(&server, "/gone", 404, "<html><head><title>Not found</title></head></html>").await;

    let mut session = launch().await;
    let page = session.new_page().await.unwrap();

    let home = page
        .goto(&server.uri(), WaitUntil::DomContentLoaded, TIMEOUT)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(home.status, 200);
    assert_eq!(page.title().await.unwrap().as_deref(), Some("Home"));
    assert_eq!(page.anchor_hrefs().await.unwrap(), vec!["/gone"]);

    let link = page.query_first(&Locator::css("a")).await.unwrap().unwrap();
    let gone = page
        .goto(&format!("{}/gone", server.uri()), WaitUntil::Load, TIMEOUT)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(gone.status, 404);
    assert!(matches!(page.is_visible(&link).await, Err(ScanError::StaleElement)));

    session.close().await.unwrap();
}
