use std::time::Duration;

use gatehouse::prelude::*;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

const SECRET: &str = "gatehouse-facade-secret-do-not-use-in-production";

#[tokio::test]
async fn prelude_covers_the_request_flow() {
    let config = SecurityConfig::from_yaml_str(&format!(
        "path_exclusions: [/health]\nallowed_algorithms: [HS256]\nkey:\n  type: secret\n  value: {SECRET}\n"
    ))
    .unwrap();
    let auth = Authenticator::from_config(&config).await.unwrap();

    assert!(matches!(auth.authenticate("/health", None), AuthDecision::Excluded));

    let claims = serde_json::json!({
        "sub": "user-1",
        "roles": ["admin"],
        "exp": chrono_free_now() + 60,
    });
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();
    let decision = auth.authenticate("/api", Some(&token));
    assert_eq!(auth.has_role(&decision, "admin"), Ok(true));
}

#[test]
fn bounded_cache_is_reexported() {
    let cache: BoundedCache<&str, u32> = BoundedCache::new(2, Duration::from_secs(60));
    cache.insert("a", 1);
    assert_eq!(cache.get(&"a"), Some(1));
    assert_eq!(gatehouse::gatehouse_cache::BoundedCache::<u8, u8>::disabled().capacity(), 0);
}

fn chrono_free_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}
