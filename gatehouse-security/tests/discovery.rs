mod common;

use gatehouse_security::authenticator::Authenticator;
use gatehouse_security::config::{KeySourceConfig, SecurityConfig};
use gatehouse_security::discovery::DiscoveryDocument;
use gatehouse_security::error::{ConfigurationError, VerificationError};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;

const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// A provider publishing its discovery document and an RSA key set at `/certs`.
async fn provider(issuer: Option<&str>) -> MockServer {
    let server = MockServer::start().await;
    let mut document = json!({ "jwks_uri": format!("{}/certs", server.uri()) });
    if let Some(issuer) = issuer {
        document["issuer"] = json!(issuer);
    }
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(document))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(vec![rsa_jwk("rsa-1")])))
        .mount(&server)
        .await;
    server
}

fn discovery_url(server: &MockServer) -> String {
    format!("{}{DISCOVERY_PATH}", server.uri())
}

fn discovery_config(server: &MockServer) -> SecurityConfig {
    SecurityConfig::new(KeySourceConfig::oidc_discovery(discovery_url(server)))
}

#[tokio::test]
async fn fetch_reads_jwks_uri_and_issuer() {
    let server = provider(Some(TEST_ISSUER)).await;
    let document = DiscoveryDocument::fetch(&reqwest::Client::new(), &discovery_url(&server))
        .await
        .unwrap();
    assert_eq!(document.jwks_uri(), Some(format!("{}/certs", server.uri()).as_str()));
    assert_eq!(document.issuer.as_deref(), Some(TEST_ISSUER));
}

#[tokio::test]
async fn discovered_keys_verify_tokens() {
    let server = provider(Some(TEST_ISSUER)).await;
    let auth = Authenticator::from_config(&discovery_config(&server)).await.unwrap();
    assert!(auth.parser().to_string().contains("/certs"));

    let token = rs256_token(&claims_for("user-1", &["admin"]), Some("rsa-1"));
    let decision = auth.authenticate("/api", Some(&token));
    assert_eq!(auth.has_role(&decision, "admin"), Ok(true));
}

#[tokio::test]
async fn discovered_issuer_is_required() {
    let server = provider(Some("https://other-issuer.example.com")).await;
    let auth = Authenticator::from_config(&discovery_config(&server)).await.unwrap();
    assert!(auth
        .parser()
        .to_string()
        .contains("issuer=https://other-issuer.example.com"));

    let token = rs256_token(&claims_for("user-1", &["admin"]), Some("rsa-1"));
    assert_eq!(
        auth.authenticate("/api", Some(&token)).rejection(),
        Some(VerificationError::IssuerMismatch)
    );
}

#[tokio::test]
async fn configured_issuer_takes_precedence() {
    let server = provider(Some("https://other-issuer.example.com")).await;
    let config = discovery_config(&server).with_issuer(TEST_ISSUER);
    let auth = Authenticator::from_config(&config).await.unwrap();

    let token = rs256_token(&claims_for("user-1", &["admin"]), Some("rsa-1"));
    assert!(auth.authenticate("/api", Some(&token)).is_authenticated());
}

#[tokio::test]
async fn document_without_issuer_requires_none() {
    let server = provider(None).await;
    let auth = Authenticator::from_config(&discovery_config(&server)).await.unwrap();
    assert!(!auth.parser().to_string().contains("issuer="));

    let mut claims = claims_for("user-1", &["admin"]);
    claims.as_object_mut().unwrap().remove("iss");
    let token = rs256_token(&claims, Some("rsa-1"));
    assert!(auth.authenticate("/api", Some(&token)).is_authenticated());
}

#[tokio::test]
async fn missing_jwks_uri_is_a_fetch_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "issuer": TEST_ISSUER })))
        .mount(&server)
        .await;

    let err = Authenticator::from_config(&discovery_config(&server))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::KeyFetch(_)), "got: {err:?}");
}

#[tokio::test]
async fn unreachable_discovery_endpoint_is_a_fetch_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = DiscoveryDocument::fetch(&reqwest::Client::new(), &discovery_url(&server))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::KeyFetch(_)), "got: {err:?}");
}

#[tokio::test]
async fn non_standard_discovery_path_still_resolves() {
    let server = provider(Some(TEST_ISSUER)).await;
    Mock::given(method("GET"))
        .and(path("/oidc/config"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "jwks_uri": format!("{}/certs", server.uri()) })),
        )
        .mount(&server)
        .await;

    let document =
        DiscoveryDocument::fetch(&reqwest::Client::new(), &format!("{}/oidc/config", server.uri()))
            .await
            .unwrap();
    assert!(document.jwks_uri().is_some());
    assert_eq!(document.issuer, None);
}
