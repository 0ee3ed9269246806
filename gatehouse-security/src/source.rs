use crate::error::ConfigurationError;

/// Where a raw bearer token is read from: a header, and an optional scheme
/// prefix stripped from its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSource {
    header: String,
    prefix: Option<String>,
}

impl HeaderSource {
    /// A source reading `header`. The prefix, when given, is matched
    /// case-insensitively; a blank prefix means the whole value is the token.
    pub fn new(header: impl Into<String>, prefix: Option<&str>) -> Result<Self, ConfigurationError> {
        let header = header.into().trim().to_string();
        if header.is_empty() {
            return Err(ConfigurationError::InvalidValue {
                key: "header",
                reason: "header name is blank".into(),
            });
        }
        let prefix = prefix.map(str::trim).filter(|p| !p.is_empty()).map(String::from);
        Ok(Self { header, prefix })
    }

    /// `Authorization: Bearer <token>`.
    pub fn authorization_bearer() -> Self {
        Self {
            header: "Authorization".to_string(),
            prefix: Some("Bearer".to_string()),
        }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Whether this source reads `name`. Header names are case-insensitive.
    pub fn reads(&self, name: &str) -> bool {
        self.header.eq_ignore_ascii_case(name.trim())
    }

    /// Extract the raw token from a header value.
    ///
    /// Returns `None` when the prefix is missing or nothing but whitespace
    /// follows it.
    pub fn raw_token<'a>(&self, value: &'a str) -> Option<&'a str> {
        let value = value.trim();
        let rest = match &self.prefix {
            Some(prefix) => {
                let head = value.get(..prefix.len())?;
                if !head.eq_ignore_ascii_case(prefix) {
                    return None;
                }
                let rest = &value[prefix.len()..];
                // "Bearer" must be followed by whitespace, not run into the token.
                if !rest.starts_with(char::is_whitespace) {
                    return None;
                }
                rest
            }
            None => value,
        };
        let token = rest.trim();
        (!token.is_empty()).then_some(token)
    }
}

impl Default for HeaderSource {
    fn default() -> Self {
        Self::authorization_bearer()
    }
}
