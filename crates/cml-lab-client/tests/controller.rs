//! End-to-end tests of the client against an HTTP controller stand-in.
//!
//! These run the real `HttpsTransport` over plain HTTP against a local
//! `wiremock` server.

use cml_lab_client::{Client, ClientConfig};
use cml_lab_core::{LabId, State};
use futures::future::join_all;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LAB: &str = "4a5c6f0e-1d38-4b7e-9a52-3f1a2c7c9d10";
const OWNER: &str = "00000000-0000-4000-a000-000000000001";
const N0: &str = "n0";
const N1: &str = "n1";
const I0: &str = "i0";
const I1: &str = "i1";
const LINK: &str = "l0";

// =============================================================================
// Helpers
// =============================================================================

async fn controller(version: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v0/system_information"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"version": version, "ready": true})),
        )
        .expect(1)
        .mount(&server)
        .await;
    server
}

async fn get(server: &MockServer, api_path: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v0/{api_path}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn node(id: &str, label: &str) -> serde_json::Value {
    json!({
        "id": id,
        "lab_id": LAB,
        "label": label,
        "node_definition": "alpine",
        "x": 0,
        "y": 0,
        "tags": [],
        "state": "DEFINED_ON_CORE",
    })
}

fn interface(id: &str, node: &str, mac: &str) -> serde_json::Value {
    json!({
        "id": id,
        "node": node,
        "label": "eth0",
        "slot": 0,
        "type": "physical",
        "state": "DEFINED_ON_CORE",
        "mac_address": mac,
        "is_connected": true,
    })
}

// =============================================================================
// Version gate
// =============================================================================

#[tokio::test]
async fn newer_controller_is_rejected_before_any_call() {
    let server = controller("2.5.1").await;
    let client = Client::new(ClientConfig::with_token(server.uri(), "tok")).unwrap();

    let err = client.labs().await.unwrap_err();
    assert_eq!(err.label(), "incompatible-controller");
    assert!(err.to_string().contains("2.5.1"));

    // Sticky: no second system_information request, no lab request at all.
    let err = client.labs().await.unwrap_err();
    assert_eq!(err.label(), "incompatible-controller");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.path(), "/api/v0/system_information");
}

// =============================================================================
// Deep read
// =============================================================================

#[tokio::test]
async fn deep_read_assembles_lab() {
    let server = controller("2.4.0").await;
    get(
        &server,
        &format!("labs/{LAB}"),
        json!({
            "id": LAB,
            "state": "DEFINED_ON_CORE",
            "lab_title": "two alpines",
            "lab_description": "",
            "lab_notes": "",
            "owner": OWNER,
            "node_count": 2,
            "link_count": 1,
        }),
    )
    .await;
    get(
        &server,
        &format!("users/{OWNER}"),
        json!({"id": OWNER, "username": "admin", "admin": true}),
    )
    .await;
    get(&server, &format!("labs/{LAB}/nodes"), json!([N0, N1])).await;
    get(&server, &format!("labs/{LAB}/nodes/{N0}"), node(N0, "alpine-0")).await;
    get(&server, &format!("labs/{LAB}/nodes/{N1}"), node(N1, "alpine-1")).await;
    get(&server, &format!("labs/{LAB}/nodes/{N0}/interfaces"), json!([I0])).await;
    get(&server, &format!("labs/{LAB}/nodes/{N1}/interfaces"), json!([I1])).await;
    get(
        &server,
        &format!("labs/{LAB}/interfaces/{I0}"),
        interface(I0, N0, "52:54:00:0c:e0:69"),
    )
    .await;
    get(
        &server,
        &format!("labs/{LAB}/interfaces/{I1}"),
        interface(I1, N1, "52:54:00:0c:e0:70"),
    )
    .await;
    get(&server, &format!("labs/{LAB}/layer3_addresses"), json!({})).await;
    get(&server, &format!("labs/{LAB}/links"), json!([LINK])).await;
    get(
        &server,
        &format!("labs/{LAB}/links/{LINK}"),
        json!({
            "id": LINK,
            "lab_id": LAB,
            "interface_a": I0,
            "interface_b": I1,
            "node_a": N0,
            "node_b": N1,
            "state": "DEFINED_ON_CORE",
        }),
    )
    .await;

    let client = Client::new(ClientConfig::with_token(server.uri(), "tok")).unwrap();
    let lab = client.lab_deep(&LAB.parse::<LabId>().unwrap()).await.unwrap();

    assert_eq!(lab.title, "two alpines");
    assert_eq!(lab.state, State::Defined);
    assert_eq!(lab.owner_user.as_ref().unwrap().username, "admin");
    assert_eq!(lab.nodes.len(), 2);
    assert_eq!(lab.node_count, 2);

    let a = lab.node_by_label("alpine-0").unwrap();
    let b = lab.node_by_label("alpine-1").unwrap();
    let mac = |n: &cml_lab_client::model::Node| {
        n.interfaces.values().next().unwrap().mac_address.clone().unwrap()
    };
    assert_eq!(mac(a), "52:54:00:0c:e0:69");
    assert_eq!(mac(b), "52:54:00:0c:e0:70");
    assert!(a.interfaces.values().all(|i| i.ip4.is_empty()));

    assert_eq!(lab.links.len(), 1);
    assert_eq!(lab.links[0].label, "alpine-0-eth0<->alpine-1-eth0");
    assert_eq!(lab.links[0].src_slot, Some(0));
    assert_eq!(lab.links[0].dst_slot, Some(0));

    for request in server.received_requests().await.unwrap() {
        let auth = request.headers.get("authorization");
        if request.url.path().ends_with("/system_information") {
            assert!(auth.is_none());
        } else {
            assert_eq!(auth.unwrap().to_str().unwrap(), "Bearer tok");
        }
    }
}

// =============================================================================
// Re-authentication
// =============================================================================

#[tokio::test]
async fn concurrent_401s_share_one_login() {
    let server = controller("2.4.0").await;
    Mock::given(method("GET"))
        .and(path("/api/v0/labs"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([LAB])))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v0/labs"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"code": 401, "description": "No authorization token provided."})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v0/authenticate"))
        .and(body_json(json!({"username": "qwe", "password": "qwe"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("secret")))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = ClientConfig::with_credentials(server.uri(), "qwe", "qwe");
    config.token = Some("stale".to_string());
    let client = Client::new(config).unwrap();

    let results = join_all((0..8).map(|_| client.labs())).await;
    for labs in results {
        assert_eq!(labs.unwrap().len(), 1);
    }
    assert_eq!(client.token().as_deref(), Some("secret"));
}

#[tokio::test]
async fn rejected_token_without_credentials() {
    let server = controller("2.4.0").await;
    Mock::given(method("GET"))
        .and(path("/api/v0/labs"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"description": "expired"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(ClientConfig::with_token(server.uri(), "old")).unwrap();
    assert_eq!(
        client.labs().await.unwrap_err().label(),
        "invalid-token-no-credentials"
    );
    assert_eq!(
        client.labs().await.unwrap_err().label(),
        "invalid-token-no-credentials"
    );
}

#[tokio::test]
async fn controller_errors_keep_status_and_message() {
    let server = controller("2.4.0").await;
    Mock::given(method("GET"))
        .and(path(format!("/api/v0/labs/{LAB}")))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"code": 404, "description": format!("Lab not found: {LAB}")})),
        )
        .mount(&server)
        .await;

    let client = Client::new(ClientConfig::with_token(server.uri(), "tok")).unwrap();
    let err = client.lab(&LAB.parse().unwrap()).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.http_status_code(), Some(404));
    assert!(err.to_string().contains("Lab not found"));
}
