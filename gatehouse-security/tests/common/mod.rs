//! Shared fixtures for the integration tests: signing keys, token minting and
//! JWKS documents.

#![allow(dead_code)]

use std::sync::OnceLock;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};

pub const TEST_SECRET: &[u8] = b"gatehouse-test-secret-do-not-use-in-production";
pub const TEST_ISSUER: &str = "test-issuer";
pub const TEST_AUDIENCE: &str = "test-audience";

/// Route `tracing` output to the test harness. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An RSA key pair, generated once per test binary.
pub struct RsaFixture {
    pub private_pem: String,
    pub public_pem: String,
    pub n: String,
    pub e: String,
}

pub fn rsa_fixture() -> &'static RsaFixture {
    static FIXTURE: OnceLock<RsaFixture> = OnceLock::new();
    FIXTURE.get_or_init(|| {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public = key.to_public_key();
        RsaFixture {
            private_pem: key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string(),
            public_pem: public.to_public_key_pem(LineEnding::LF).unwrap(),
            n: URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
        }
    })
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Standard claims valid for an hour from now.
pub fn claims_for(sub: &str, roles: &[&str]) -> Value {
    json!({
        "sub": sub,
        "roles": roles,
        "iss": TEST_ISSUER,
        "aud": TEST_AUDIENCE,
        "iat": now(),
        "exp": now() + 3600,
    })
}

pub fn hs256_token(claims: &Value) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(TEST_SECRET),
    )
    .unwrap()
}

pub fn hs256_token_with_kid(claims: &Value, kid: &str, secret: &[u8]) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(kid.to_string());
    encode(&header, claims, &EncodingKey::from_secret(secret)).unwrap()
}

pub fn rs256_token(claims: &Value, kid: Option<&str>) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(String::from);
    let key = EncodingKey::from_rsa_pem(rsa_fixture().private_pem.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

pub fn rsa_jwk(kid: &str) -> Value {
    let fixture = rsa_fixture();
    json!({"kty": "RSA", "kid": kid, "alg": "RS256", "use": "sig", "n": fixture.n, "e": fixture.e})
}

pub fn oct_jwk(kid: &str, secret: &[u8], alg: Option<&str>) -> Value {
    let mut jwk = json!({"kty": "oct", "kid": kid, "k": URL_SAFE_NO_PAD.encode(secret)});
    if let Some(alg) = alg {
        jwk["alg"] = json!(alg);
    }
    jwk
}

pub fn jwks(keys: Vec<Value>) -> Value {
    json!({ "keys": keys })
}
