//! Fluent construction of [`RequestDescriptor`]s for use inside request
//! factories.

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use thiserror::Error;
use url::Url;

use crate::models::{Cookie, DeviceClass};
use crate::transport::RequestDescriptor;
use crate::user_agent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Form,
    Json,
    Html,
    JavaScript,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Form => "application/x-www-form-urlencoded",
            ContentType::Json => "application/json",
            ContentType::Html => "text/html",
            ContentType::JavaScript => "text/javascript",
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("request method missing")]
    MissingMethod,

    #[error("request URL missing")]
    MissingUrl,

    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid header {name:?}")]
    InvalidHeader { name: String },
}

/// Collects method, URL, headers, cookies and body, validating on [`build`].
///
/// Header names are case-insensitive; setting the same header twice keeps the
/// last value.
///
/// [`build`]: RequestBuilder::build
#[derive(Debug, Default, Clone)]
pub struct RequestBuilder {
    method: Option<Method>,
    url: Option<String>,
    content_type: Option<ContentType>,
    body: Option<Bytes>,
    headers: Vec<(String, String)>,
    cookies: Vec<Cookie>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn body(mut self, content_type: ContentType, data: impl Into<Bytes>) -> Self {
        self.content_type = Some(content_type);
        self.body = Some(data.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn user_agent(self, ua: impl Into<String>) -> Self {
        self.header(USER_AGENT.as_str(), ua)
    }

    pub fn random_user_agent(self, device: DeviceClass) -> Self {
        self.user_agent(user_agent::random(device))
    }

    pub fn cookies(mut self, cookies: impl IntoIterator<Item = Cookie>) -> Self {
        self.cookies.extend(cookies);
        self
    }

    pub fn build(self) -> Result<RequestDescriptor, BuildError> {
        let method = self.method.ok_or(BuildError::MissingMethod)?;
        let raw_url = self.url.ok_or(BuildError::MissingUrl)?;
        let url = Url::parse(&raw_url).map_err(|source| BuildError::InvalidUrl {
            url: raw_url.clone(),
            source,
        })?;

        let mut headers = HeaderMap::new();
        if let Some(ct) = self.content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct.as_str()));
        }
        for (name, value) in &self.headers {
            let invalid = || BuildError::InvalidHeader { name: name.clone() };
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            headers.insert(header_name, header_value);
        }

        if !self.cookies.is_empty() {
            let line = self
                .cookies
                .iter()
                .map(Cookie::pair)
                .collect::<Vec<_>>()
                .join("; ");
            let value = HeaderValue::from_str(&line).map_err(|_| BuildError::InvalidHeader {
                name: COOKIE.to_string(),
            })?;
            headers.insert(COOKIE, value);
        }

        Ok(RequestDescriptor {
            method,
            url,
            headers,
            body: self.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_requires_method_and_url() {
        assert!(matches!(
            RequestBuilder::new().url("https://example.com").build(),
            Err(BuildError::MissingMethod)
        ));
        assert!(matches!(
            RequestBuilder::new().method(Method::GET).build(),
            Err(BuildError::MissingUrl)
        ));
        assert!(matches!(
            RequestBuilder::new().method(Method::GET).url("not a url").build(),
            Err(BuildError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_build_post_form() {
        let req = RequestBuilder::new()
            .method(Method::POST)
            .url("https://example.com/login")
            .body(ContentType::Form, "user=a&pass=b")
            .header("X-Token", "t1")
            .header("x-token", "t2")
            .cookies([Cookie::new("a", "1"), Cookie::new("b", "2")])
            .build()
            .unwrap();

        assert_eq!(req.method, Method::POST);
        assert_eq!(req.url.as_str(), "https://example.com/login");
        assert_eq!(req.headers[CONTENT_TYPE], "application/x-www-form-urlencoded");
        assert_eq!(req.headers["x-token"], "t2");
        assert_eq!(req.headers[COOKIE], "a=1; b=2");
        assert_eq!(req.body.as_deref(), Some(&b"user=a&pass=b"[..]));
    }

    #[test]
    fn test_random_user_agent_sets_header() {
        let req = RequestBuilder::new()
            .method(Method::GET)
            .url("https://example.com")
            .random_user_agent(DeviceClass::Mobile)
            .build()
            .unwrap();
        let ua = req.headers[USER_AGENT].to_str().unwrap();
        assert!(user_agent::candidates(DeviceClass::Mobile).contains(&ua));
    }

    #[test]
    fn test_invalid_header_rejected() {
        let err = RequestBuilder::new()
            .method(Method::GET)
            .url("https://example.com")
            .header("bad header", "x")
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidHeader { name } if name == "bad header"));
    }
}
