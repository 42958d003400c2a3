//! Transport seam: what a session sends and what comes back.
//!
//! The session never talks to the network directly. It hands a
//! [`RequestDescriptor`] to a [`Transport`] and reads a [`ResponseDescriptor`].
//! [`ReqwestTransport`] is the production implementation; tests plug in stubs.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::TransportError;

// ── Descriptors ───────────────────────────────────────────────────────────────

/// An outgoing request. The body is held as [`Bytes`], so measuring it never
/// consumes what gets sent.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A fully received response. `url` is where the transport ended up after
/// any redirects it followed.
#[derive(Debug, Clone)]
pub struct ResponseDescriptor {
    pub status: StatusCode,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

// ── Transport trait ───────────────────────────────────────────────────────────

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: RequestDescriptor) -> Result<ResponseDescriptor, TransportError>;
}

// ── reqwest ───────────────────────────────────────────────────────────────────

/// Transport backed by a shared [`reqwest::Client`].
///
/// Built with gzip decoding and the cookie store switched off: the session
/// owns both concerns, so the client must hand over bodies and `Set-Cookie`
/// headers untouched.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    inner: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(false)
            .cookie_store(false)
            .build()?;
        Ok(Self { inner })
    }

    /// Wrap an existing client, e.g. one whose connection pool is shared with
    /// other sessions. It should not decode gzip or store cookies itself.
    pub fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: RequestDescriptor) -> Result<ResponseDescriptor, TransportError> {
        let RequestDescriptor {
            method,
            url,
            headers,
            body,
        } = request;

        debug!("{} {}", method, url);

        let mut builder = self.inner.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let url = resp.url().clone();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?;

        debug!("{} {} ({} bytes)", status, url, body.len());

        Ok(ResponseDescriptor {
            status,
            url,
            headers,
            body,
        })
    }
}
