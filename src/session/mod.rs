//! Session client: one browsing identity against a host.
//!
//! ## Request lifecycle (`perform`)
//!
//!   1. Wait on the admission gate (cancellable)
//!   2. Build the request through the caller's factory
//!   3. Fill unset browser headers, attach jar cookies
//!   4. Dispatch through the transport (cancellable)
//!   5. Merge `Set-Cookie` into the jar and remember the final URL as the
//!      next Referer
//!   6. Gunzip if needed and return the body
//!
//! Jar and Referer live behind one mutex that is never held across an await.
//! Concurrent calls are fine; whichever response commits last owns the
//! Referer.

pub mod decode;
pub mod decorate;

use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::SessionError;
use crate::gate::{AdmissionGate, InvalidRate, RateConfig};
use crate::models::{Cookie, DeviceClass};
use crate::transport::{RequestDescriptor, ResponseDescriptor, Transport};
use crate::user_agent;

pub use self::decode::read_body;

// ── Options ───────────────────────────────────────────────────────────────────

/// Everything needed to open a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub host: String,
    pub rate: RateConfig,
    /// Fixed user agent. When unset one is generated for `device`.
    pub user_agent: Option<String>,
    pub device: DeviceClass,
    /// Seed cookies, e.g. exported from an earlier session.
    pub cookies: Vec<Cookie>,
    /// Gate shared with other sessions. `rate` is ignored when set.
    pub gate: Option<AdmissionGate>,
}

impl SessionOptions {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            rate: RateConfig::default(),
            user_agent: None,
            device: DeviceClass::default(),
            cookies: Vec::new(),
            gate: None,
        }
    }

    pub fn rate(mut self, rate: RateConfig) -> Self {
        self.rate = rate;
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    pub fn device(mut self, device: DeviceClass) -> Self {
        self.device = device;
        self
    }

    pub fn cookies(mut self, cookies: impl IntoIterator<Item = Cookie>) -> Self {
        self.cookies.extend(cookies);
        self
    }

    pub fn shared_gate(mut self, gate: AdmissionGate) -> Self {
        self.gate = Some(gate);
        self
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SessionState {
    jar: BTreeMap<String, Cookie>,
    last_url: String,
}

impl SessionState {
    fn merge(&mut self, cookies: impl IntoIterator<Item = Cookie>) -> usize {
        let mut n = 0;
        for cookie in cookies {
            self.jar.insert(cookie.name.clone(), cookie);
            n += 1;
        }
        n
    }
}

pub struct SessionClient {
    host: String,
    user_agent: String,
    gate: AdmissionGate,
    owns_gate: bool,
    transport: Arc<dyn Transport>,
    state: Mutex<SessionState>,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("host", &self.host)
            .field("user_agent", &self.user_agent)
            .field("gate", &self.gate.config())
            .field("owns_gate", &self.owns_gate)
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    /// Open a session. Starts a private admission gate unless one is shared
    /// in through `options`, so this must run inside a tokio runtime.
    pub fn new(
        options: SessionOptions,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, InvalidRate> {
        let (gate, owns_gate) = match options.gate {
            Some(gate) => (gate, false),
            None => (AdmissionGate::new(options.rate)?, true),
        };

        let user_agent = options
            .user_agent
            .unwrap_or_else(|| user_agent::random(options.device));

        let mut state = SessionState {
            jar: BTreeMap::new(),
            last_url: options.host.clone(),
        };
        state.merge(options.cookies);

        info!(
            "Session opened for {:?} ({} per {:?}, {} seeded cookie(s))",
            options.host,
            gate.config().capacity,
            gate.config().window,
            state.jar.len()
        );

        Ok(Self {
            host: options.host,
            user_agent,
            gate,
            owns_gate,
            transport,
            state: Mutex::new(state),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// URL the next request will send as Referer by default.
    pub fn last_url(&self) -> String {
        self.lock().last_url.clone()
    }

    /// Run one request end to end and return the decoded body.
    pub async fn perform<F>(
        &self,
        cancel: &CancellationToken,
        factory: F,
    ) -> Result<Bytes, SessionError>
    where
        F: FnOnce() -> anyhow::Result<RequestDescriptor>,
    {
        let response = self.dispatch(cancel, factory, true).await?;
        read_body(response)
    }

    /// Like [`perform`](Self::perform) but without header defaults or body
    /// decoding: the response comes back exactly as the transport produced it.
    /// Jar cookies are still attached and the session is still updated.
    /// Meant for file downloads; use [`read_body`] to decode later.
    pub async fn fetch<F>(
        &self,
        cancel: &CancellationToken,
        factory: F,
    ) -> Result<ResponseDescriptor, SessionError>
    where
        F: FnOnce() -> anyhow::Result<RequestDescriptor>,
    {
        self.dispatch(cancel, factory, false).await
    }

    async fn dispatch<F>(
        &self,
        cancel: &CancellationToken,
        factory: F,
        fill_defaults: bool,
    ) -> Result<ResponseDescriptor, SessionError>
    where
        F: FnOnce() -> anyhow::Result<RequestDescriptor>,
    {
        self.gate.acquire(cancel).await?;

        let mut request = factory().map_err(SessionError::Factory)?;

        {
            let state = self.lock();
            if fill_defaults {
                decorate::fill_defaults(&mut request, &self.user_agent, &state.last_url);
            }
            decorate::attach_cookies(&mut request.headers, state.jar.values());
        }

        debug!("{} {}", request.method, request.url);

        let response = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("Request canceled in flight");
                return Err(SessionError::Canceled);
            }
            result = self.transport.send(request) => result?,
        };

        self.absorb(&response);
        Ok(response)
    }

    /// Commit cookies and Referer from a response in one critical section.
    fn absorb(&self, response: &ResponseDescriptor) {
        let cookies = decorate::set_cookies(&response.headers);
        let mut state = self.lock();
        let merged = state.merge(cookies);
        state.last_url = response.url.to_string();
        if merged > 0 {
            debug!("{}: {} cookie(s) merged, jar holds {}", response.url, merged, state.jar.len());
        }
    }

    /// Snapshot of the jar, ordered by cookie name.
    pub fn export_cookies(&self) -> Vec<Cookie> {
        self.lock().jar.values().cloned().collect()
    }

    /// Merge cookies into the jar, replacing any with the same name.
    pub fn import_cookies(&self, cookies: impl IntoIterator<Item = Cookie>) {
        let n = self.lock().merge(cookies);
        debug!("Imported {} cookie(s)", n);
    }

    /// Shut down the admission gate if this session created it. A shared gate
    /// is left running for its other users.
    pub fn close(&self) {
        if self.owns_gate {
            self.gate.shutdown();
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
