//! Rate-limited HTTP sessions.
//!
//! A [`SessionClient`] paces requests through an [`AdmissionGate`], carries
//! cookies and Referer from one response to the next, fills browser-like
//! default headers and hands back gunzipped bodies.

pub mod config;
pub mod error;
pub mod gate;
pub mod models;
pub mod request;
pub mod session;
pub mod transport;
pub mod user_agent;
pub mod utils;

pub use error::{SessionError, TransportError};
pub use gate::{AdmissionGate, GateError, InvalidRate, RateConfig};
pub use models::{Cookie, DeviceClass};
pub use request::{BuildError, ContentType, RequestBuilder};
pub use session::{SessionClient, SessionOptions, read_body};
pub use transport::{ReqwestTransport, RequestDescriptor, ResponseDescriptor, Transport};
pub use tokio_util::sync::CancellationToken;
