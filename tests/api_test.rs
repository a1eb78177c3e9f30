use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use warp::http::StatusCode;

use rusty_fleet::auth::crypto::SigningKey;
use rusty_fleet::auth::system_identity::UnsupportedIdentityFactory;
use rusty_fleet::config::HostConfig;
use rusty_fleet::constants::{ADMIN_NAME, DEFAULT_ADMIN_PASSWORD};
use rusty_fleet::handlers::routes;
use rusty_fleet::services::{HostServices, HostServicesBuilder};
use rusty_fleet::storage::MemoryCredentialStore;

const API: &str = "RustyFleet.Api/1.0.0";
const AGENT: &str = "FleetTests/1.0.0";

async fn services() -> HostServices {
    let mut config = HostConfig::default();
    config.security.argon2_memory_kib = 1024;
    config.security.argon2_iterations = 1;
    config.security.min_auth_duration = Duration::ZERO;

    let services = HostServicesBuilder::new(config, Arc::new(MemoryCredentialStore::new()), SigningKey::generate())
        .with_system_identity_factory(Arc::new(UnsupportedIdentityFactory))
        .build()
        .unwrap();
    services
        .users
        .ensure_admin_user(&CancellationToken::new())
        .await
        .unwrap();
    services
}

fn basic(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}

fn body(response: &warp::http::Response<warp::hyper::body::Bytes>) -> Value {
    serde_json::from_slice(response.body()).unwrap()
}

async fn login(services: &HostServices, username: &str, password: &str) -> String {
    let response = warp::test::request()
        .method("POST")
        .path("/")
        .header("api", API)
        .header("user-agent", AGENT)
        .header("authorization", basic(username, password))
        .reply(&routes(services.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    body(&response)["bearer"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_login_returns_token_with_security_headers() {
    let services = services().await;
    let response = warp::test::request()
        .method("POST")
        .path("/")
        .header("api", API)
        .header("user-agent", AGENT)
        .header("authorization", basic(ADMIN_NAME, DEFAULT_ADMIN_PASSWORD))
        .reply(&routes(services))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["api"], API);
    let token = body(&response);
    assert!(token["bearer"].as_str().is_some());
    assert!(token["expiresAt"].as_str().is_some());
}

#[tokio::test]
async fn test_bad_login_is_unauthorized() {
    let services = services().await;
    let response = warp::test::request()
        .method("POST")
        .path("/")
        .header("api", API)
        .header("user-agent", AGENT)
        .header("authorization", basic(ADMIN_NAME, "wrong"))
        .reply(&routes(services))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_header_contract() {
    let services = services().await;
    let filter = routes(services);

    let missing_api = warp::test::request()
        .method("POST")
        .path("/")
        .header("user-agent", AGENT)
        .header("authorization", basic(ADMIN_NAME, DEFAULT_ADMIN_PASSWORD))
        .reply(&filter)
        .await;
    assert_eq!(missing_api.status(), StatusCode::BAD_REQUEST);

    let wrong_major = warp::test::request()
        .method("POST")
        .path("/")
        .header("api", "RustyFleet.Api/2.0.0")
        .header("user-agent", AGENT)
        .header("authorization", basic(ADMIN_NAME, DEFAULT_ADMIN_PASSWORD))
        .reply(&filter)
        .await;
    assert_eq!(wrong_major.status(), StatusCode::BAD_REQUEST);
    assert!(body(&wrong_major)["message"].as_str().unwrap().contains("Incompatible"));

    let missing_agent = warp::test::request()
        .method("POST")
        .path("/")
        .header("api", API)
        .header("authorization", basic(ADMIN_NAME, DEFAULT_ADMIN_PASSWORD))
        .reply(&filter)
        .await;
    assert_eq!(missing_agent.status(), StatusCode::BAD_REQUEST);

    let browser_agent = warp::test::request()
        .method("POST")
        .path("/")
        .header("api", API)
        .header("user-agent", "Mozilla/5.0 (X11; Linux x86_64)")
        .header("authorization", basic(ADMIN_NAME, DEFAULT_ADMIN_PASSWORD))
        .reply(&filter)
        .await;
    assert_eq!(browser_agent.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_server_information_requires_token() {
    let services = services().await;
    let token = login(&services, ADMIN_NAME, DEFAULT_ADMIN_PASSWORD).await;
    let filter = routes(services);

    let anonymous = warp::test::request()
        .path("/")
        .header("api", API)
        .header("user-agent", AGENT)
        .reply(&filter)
        .await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let response = warp::test::request()
        .path("/")
        .header("api", API)
        .header("user-agent", AGENT)
        .header("authorization", format!("Bearer {}", token))
        .reply(&filter)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(&response)["apiVersion"], API);
    assert_eq!(body(&response)["minimumPasswordLength"], 15);
}

#[tokio::test]
async fn test_user_routes_round_trip() {
    let services = services().await;
    let token = login(&services, ADMIN_NAME, DEFAULT_ADMIN_PASSWORD).await;
    let bearer = format!("Bearer {}", token);
    let filter = routes(services.clone());

    let created = warp::test::request()
        .method("PUT")
        .path("/User")
        .header("api", API)
        .header("user-agent", AGENT)
        .header("authorization", bearer.as_str())
        .json(&json!({
            "name": "Alice",
            "password": "correct horse battery staple",
            "enabled": true,
            "administrationRights": 8
        }))
        .reply(&filter)
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = body(&created);
    assert_eq!(created["name"], "Alice");
    assert_eq!(created["createdBy"]["name"], ADMIN_NAME);
    assert!(created.get("password").is_none());
    let alice_id = created["id"].as_i64().unwrap();

    let duplicate = warp::test::request()
        .method("PUT")
        .path("/User")
        .header("api", API)
        .header("user-agent", AGENT)
        .header("authorization", bearer.as_str())
        .json(&json!({ "name": "ALICE", "password": "correct horse battery staple" }))
        .reply(&filter)
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let fetched = warp::test::request()
        .path(&format!("/User/{}", alice_id))
        .header("api", API)
        .header("user-agent", AGENT)
        .header("authorization", bearer.as_str())
        .reply(&filter)
        .await;
    assert_eq!(fetched.status(), StatusCode::OK);
    assert_eq!(body(&fetched)["administrationRights"], 8);

    let list = warp::test::request()
        .path("/User/List")
        .header("api", API)
        .header("user-agent", AGENT)
        .header("authorization", bearer.as_str())
        .reply(&filter)
        .await;
    assert_eq!(list.status(), StatusCode::OK);
    assert_eq!(body(&list).as_array().map(Vec::len), Some(2));

    // Alice may only change her own password
    let alice_token = login(&services, "Alice", "correct horse battery staple").await;
    let forbidden = warp::test::request()
        .method("POST")
        .path("/User")
        .header("api", API)
        .header("user-agent", AGENT)
        .header("authorization", format!("Bearer {}", alice_token))
        .json(&json!({ "password": "another long passphrase", "enabled": true }))
        .reply(&filter)
        .await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
    assert!(forbidden.body().is_empty());

    let own = warp::test::request()
        .path("/User")
        .header("api", API)
        .header("user-agent", AGENT)
        .header("authorization", format!("Bearer {}", alice_token))
        .reply(&filter)
        .await;
    assert_eq!(own.status(), StatusCode::OK);
    assert_eq!(body(&own)["id"], alice_id);
}

#[tokio::test]
async fn test_error_statuses() {
    let services = services().await;
    let token = login(&services, ADMIN_NAME, DEFAULT_ADMIN_PASSWORD).await;
    let bearer = format!("Bearer {}", token);
    let filter = routes(services);

    let short_password = warp::test::request()
        .method("PUT")
        .path("/User")
        .header("api", API)
        .header("user-agent", AGENT)
        .header("authorization", bearer.as_str())
        .json(&json!({ "name": "Bob", "password": "short" }))
        .reply(&filter)
        .await;
    assert_eq!(short_password.status(), StatusCode::BAD_REQUEST);
    assert!(body(&short_password)["message"].as_str().unwrap().contains("15"));

    let unsupported = warp::test::request()
        .method("PUT")
        .path("/User")
        .header("api", API)
        .header("user-agent", AGENT)
        .header("authorization", bearer.as_str())
        .json(&json!({ "systemIdentifier": "1001" }))
        .reply(&filter)
        .await;
    assert_eq!(unsupported.status(), StatusCode::NOT_IMPLEMENTED);

    let missing = warp::test::request()
        .path("/User/404")
        .header("api", API)
        .header("user-agent", AGENT)
        .header("authorization", bearer.as_str())
        .reply(&filter)
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let malformed = warp::test::request()
        .method("PUT")
        .path("/User")
        .header("api", API)
        .header("user-agent", AGENT)
        .header("authorization", bearer.as_str())
        .header("content-type", "application/json")
        .body("{ not json")
        .reply(&filter)
        .await;
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let services = services().await;
    let token = login(&services, ADMIN_NAME, DEFAULT_ADMIN_PASSWORD).await;
    let filter = routes(services);

    for method in ["PUT", "POST"] {
        let response = warp::test::request()
            .method(method)
            .path("/User")
            .header("api", API)
            .header("user-agent", AGENT)
            .header("authorization", format!("Bearer {}", token))
            .json(&json!({ "name": "A".repeat(32 * 1024), "password": "correct horse battery staple" }))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE, "{}", method);
    }
}
