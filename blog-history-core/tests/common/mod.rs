//! Shared fixtures for integration tests: a fake blogging API on wiremock.
#![allow(dead_code)]

use blog_history_core::cache::NoCache;
use blog_history_core::client::ContentClient;
use blog_history_core::throttle::Throttle;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Wraps a payload the way `http_envelope=1` responses do.
pub fn envelope(body: Value) -> Value {
    json!({ "code": 200, "headers": [], "body": body })
}

pub fn error_envelope(code: u16, error: &str) -> Value {
    json!({ "code": code, "headers": [], "body": { "error": error, "message": error } })
}

pub fn client(server: &MockServer) -> ContentClient {
    ContentClient::new(server.uri(), Throttle::disabled(), Box::new(NoCache))
        .expect("client should build")
}

pub async fn mount_sites(server: &MockServer, sites: Value) {
    Mock::given(method("GET"))
        .and(path("/v1.2/me/sites"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({ "sites": sites }))))
        .mount(server)
        .await;
}

/// Mounts one listing page for a site and post type.
pub async fn mount_page(
    server: &MockServer,
    site_id: i64,
    post_type: &str,
    page: u32,
    found: u64,
    ids: &[i64],
) {
    let posts: Vec<Value> = ids.iter().map(|id| json!({ "ID": id })).collect();
    Mock::given(method("GET"))
        .and(path(format!("/v1.1/sites/{site_id}/posts")))
        .and(query_param("type", post_type))
        .and(query_param("page", page.to_string()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope(json!({ "found": found, "posts": posts }))),
        )
        .expect(1)
        .mount(server)
        .await;
}

pub async fn mount_post(server: &MockServer, site_id: i64, detail: Value) {
    let id = detail["ID"].as_i64().expect("detail needs an ID");
    Mock::given(method("GET"))
        .and(path(format!("/v1.1/sites/{site_id}/posts/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(detail)))
        .expect(1)
        .mount(server)
        .await;
}

pub async fn mount_diffs(server: &MockServer, site_id: i64, post_id: i64, revisions: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/v1.2/sites/{site_id}/post/{post_id}/diffs")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope(json!({ "diffs": [], "revisions": revisions }))),
        )
        .expect(1)
        .mount(server)
        .await;
}

pub async fn mount_file(server: &MockServer, file_path: &str, bytes: &[u8]) {
    Mock::given(method("GET"))
        .and(path(file_path.to_owned()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes.to_vec()))
        .expect(1)
        .mount(server)
        .await;
}

/// Post detail without revisions or attachments.
pub fn plain_post(id: i64, post_type: &str, date: &str) -> Value {
    json!({
        "ID": id,
        "type": post_type,
        "slug": format!("post-{id}"),
        "title": format!("Post {id}"),
        "content": format!("<p>post {id}</p>"),
        "date": date,
        "attachments": {}
    })
}

/// Answers any post detail request by echoing the id from the path.
pub struct EchoPostDetail;

impl Respond for EchoPostDetail {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let id: i64 = request
            .url
            .path_segments()
            .and_then(|segments| segments.last())
            .and_then(|last| last.parse().ok())
            .unwrap_or_default();
        ResponseTemplate::new(200).set_body_json(envelope(plain_post(
            id,
            "post",
            "2020-01-01T00:00:00+00:00",
        )))
    }
}
