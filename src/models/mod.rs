use serde::{Deserialize, Serialize};

// ── Cookie ────────────────────────────────────────────────────────────────────

/// A cookie held in a session jar.
///
/// Attributes are carried through as received; the session never evaluates
/// domain, path or expiry when attaching cookies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<i64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            expires: None,
            max_age: None,
            secure: false,
            http_only: false,
        }
    }

    /// Parse a single `Set-Cookie` header value.
    /// "id=42; Path=/; HttpOnly" → Cookie { name: "id", value: "42", .. }
    ///
    /// Returns `None` when the leading `name=value` pair is missing or the
    /// name is empty. Unknown attributes are skipped.
    pub fn parse_set_cookie(header: &str) -> Option<Self> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie::new(name, value.trim());

        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (attr.trim(), None),
            };

            match key.to_ascii_lowercase().as_str() {
                "domain" => cookie.domain = non_empty(val),
                "path" => cookie.path = non_empty(val),
                "expires" => cookie.expires = non_empty(val),
                "max-age" => cookie.max_age = val.and_then(|v| v.parse().ok()),
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                _ => {}
            }
        }

        Some(cookie)
    }

    /// The `name=value` pair as sent in a `Cookie` request header.
    pub fn pair(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.filter(|s| !s.is_empty()).map(|s| s.to_string())
}

// ── Device class ──────────────────────────────────────────────────────────────

/// Device family a generated user agent should imitate.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Mobile,
    Desktop,
    Iot,
    #[default]
    All,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_cookie_attributes() {
        let c = Cookie::parse_set_cookie(
            "sid=abc123; Domain=example.com; Path=/; Max-Age=3600; Secure; HttpOnly",
        )
        .unwrap();
        assert_eq!(c.name, "sid");
        assert_eq!(c.value, "abc123");
        assert_eq!(c.domain.as_deref(), Some("example.com"));
        assert_eq!(c.path.as_deref(), Some("/"));
        assert_eq!(c.max_age, Some(3600));
        assert!(c.secure);
        assert!(c.http_only);
    }

    #[test]
    fn test_parse_set_cookie_keeps_equals_in_value() {
        let c = Cookie::parse_set_cookie("token=a=b==; expires=Wed, 21 Oct 2037 07:28:00 GMT")
            .unwrap();
        assert_eq!(c.value, "a=b==");
        assert_eq!(c.expires.as_deref(), Some("Wed, 21 Oct 2037 07:28:00 GMT"));
    }

    #[test]
    fn test_parse_set_cookie_rejects_garbage() {
        assert!(Cookie::parse_set_cookie("").is_none());
        assert!(Cookie::parse_set_cookie("novalue").is_none());
        assert!(Cookie::parse_set_cookie("=orphan").is_none());
    }

    #[test]
    fn test_cookie_json_shape() {
        let json = serde_json::to_string(&Cookie::new("id", "42")).unwrap();
        assert_eq!(json, r#"{"name":"id","value":"42","secure":false,"http_only":false}"#);

        let back: Cookie = serde_json::from_str(r#"{"name":"id","value":"42"}"#).unwrap();
        assert_eq!(back, Cookie::new("id", "42"));
    }
}
