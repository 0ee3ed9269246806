use gatehouse_security::source::HeaderSource;

#[test]
fn default_source_is_authorization_bearer() {
    let source = HeaderSource::default();
    assert_eq!(source.header(), "Authorization");
    assert_eq!(source.prefix(), Some("Bearer"));
    assert!(source.reads("AUTHORIZATION"));
}

#[test]
fn custom_prefix_is_case_insensitive() {
    let source = HeaderSource::new("X-Api-Token", Some(" Token ")).unwrap();
    assert_eq!(source.prefix(), Some("Token"));
    assert_eq!(source.raw_token("TOKEN abc"), Some("abc"));
    assert_eq!(source.raw_token("token\tabc"), Some("abc"));
    assert_eq!(source.raw_token("Bearer abc"), None);
}

#[test]
fn blank_prefix_means_no_prefix() {
    let source = HeaderSource::new("X-Api-Token", Some("  ")).unwrap();
    assert_eq!(source.prefix(), None);
    assert_eq!(source.raw_token("abc.def.ghi"), Some("abc.def.ghi"));
}

#[test]
fn token_is_not_split_further() {
    let source = HeaderSource::authorization_bearer();
    assert_eq!(source.raw_token("Bearer a b"), Some("a b"));
}
