//! Route-level tests for the publish front door, driven through the
//! router with the pipeline's fakes behind it.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use server_core::{build_app, AppState};
use silopub::resolver::{DenyList, UrlResolver};
use silopub::storage::{MemoryStorage, Storage};
use silopub::testutil::{account_on, FakeFetcher, FakeParser, FakeSilo, RecordingNotifier};
use silopub::{Publisher, SiloRegistry};

const ENDPOINT: &str = "http://localhost";
const BACKLINK: &str = "\n<a href=\"http://localhost/publish/fake\"></a>";

struct Harness {
    state: AppState,
    fetcher: Arc<FakeFetcher>,
    parser: Arc<FakeParser>,
    storage: Arc<MemoryStorage>,
}

async fn harness() -> Harness {
    let silo = Arc::new(FakeSilo::new("FakeSilo", "fake", "fa.ke"));
    let registry = Arc::new(SiloRegistry::new(vec![silo]));

    let storage = Arc::new(MemoryStorage::new());
    let fetcher = Arc::new(FakeFetcher::new());
    let parser = Arc::new(FakeParser::new());
    let resolver = Arc::new(UrlResolver::new(
        fetcher.clone(),
        Arc::new(DenyList::new(registry.domains())),
    ));

    let publisher = Publisher::new(
        registry,
        storage.clone(),
        fetcher.clone(),
        parser.clone(),
        resolver,
        Arc::new(RecordingNotifier::new()),
        ENDPOINT,
    );

    storage
        .insert_account(&account_on("fake", "foo.com"))
        .await
        .unwrap();

    Harness {
        state: AppState {
            publisher: Arc::new(publisher),
            endpoint: ENDPOINT.to_string(),
        },
        fetcher,
        parser,
        storage,
    }
}

impl Harness {
    fn serve_post(&self, url: &str, text: &str) {
        self.fetcher
            .page(url, &format!("<article class=\"h-entry\">{}</article>{}", text, BACKLINK));
        self.parser.set_entry(url, text);
    }
}

fn form_body(pairs: &[(&str, &str)]) -> Body {
    let encoded = pairs
        .iter()
        .map(|(name, value)| format!("{}={}", name, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    Body::from(encoded)
}

fn post(uri: &str, pairs: &[(&str, &str)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(form_body(pairs))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let h = harness().await;
    let response = build_app(h.state)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn webmention_returns_the_creation_as_json() {
    let h = harness().await;
    h.serve_post("http://foo.com/bar", "foo");

    let response = build_app(h.state)
        .oneshot(post(
            "/publish/webmention",
            &[
                ("source", "http://foo.com/bar"),
                ("target", "http://localhost/publish/fake"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["content"], "foo - http://foo.com/bar");
    assert_eq!(body["url"], "http://fake/url");
    assert_eq!(body["id"], "fake id");
}

#[tokio::test]
async fn webmention_failures_use_the_error_shape() {
    let h = harness().await;
    // no page served for bar.com, and no account either

    let response = build_app(h.state)
        .oneshot(post(
            "/publish/webmention",
            &[
                ("source", "http://bar.com/post"),
                ("target", "http://localhost/publish/fake"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Could not find FakeSilo account for bar.com"));
}

#[tokio::test]
async fn repeated_webmentions_report_already_published() {
    let h = harness().await;
    h.serve_post("http://foo.com/bar", "foo");

    let app = build_app(h.state);
    let params = [
        ("source", "http://foo.com/bar"),
        ("target", "http://localhost/publish/fake"),
    ];

    let first = app.clone().oneshot(post("/publish/webmention", &params)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(post("/publish/webmention", &params)).await.unwrap();
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let body = body_json(second).await;
    assert!(body["error"].as_str().unwrap().contains("already published"));
}

#[tokio::test]
async fn preview_renders_a_fragment_with_state_echo() {
    let h = harness().await;
    h.serve_post("http://foo.com/bar", "foo");

    let response = build_app(h.state)
        .oneshot(post(
            "/publish/preview",
            &[
                ("source", "http://foo.com/bar"),
                ("target", "http://localhost/publish/fake"),
                ("bridgy_omit_link", "false"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("preview of foo - http://foo.com/bar"));
    assert!(body.contains("&quot;bridgy_omit_link&quot;:false"));
}

#[tokio::test]
async fn omit_link_parameter_is_passed_through() {
    let h = harness().await;
    h.serve_post("http://foo.com/bar", "foo");

    let response = build_app(h.state)
        .oneshot(post(
            "/publish/webmention",
            &[
                ("source", "http://foo.com/bar"),
                ("target", "http://localhost/publish/fake"),
                ("bridgy_omit_link", "true"),
            ],
        ))
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["content"], "foo");
}

#[tokio::test]
async fn interactive_flow_redirects_to_the_account_page() {
    let h = harness().await;
    // interactive mode doesn't require the backlink
    h.fetcher
        .page("http://foo.com/bar", "<article class=\"h-entry\">foo</article>");
    h.parser.set_entry("http://foo.com/bar", "foo");

    let account = h
        .storage
        .accounts_for_domain("fake", "foo.com")
        .await
        .unwrap()
        .remove(0);

    let uri = format!(
        "/publish/fake/finish?source={}&account={}",
        urlencoding::encode("http://foo.com/bar"),
        account.id.0
    );
    let response = build_app(h.state)
        .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(response.status().is_redirection());
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(location.starts_with("http://localhost/fake/foo.com#!"));
    assert!(urlencoding::decode(&location).unwrap().contains("Done!"));
}

#[tokio::test]
async fn interactive_errors_redirect_home_with_the_message() {
    let h = harness().await;

    let uri = format!(
        "/publish/fake/finish?source={}",
        urlencoding::encode("http://nobody.example/post")
    );
    let response = build_app(h.state)
        .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(response.status().is_redirection());
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(location.starts_with("http://localhost#!"));
    assert!(urlencoding::decode(&location)
        .unwrap()
        .contains("Could not find FakeSilo account"));
}
