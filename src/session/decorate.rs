use reqwest::Method;
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONTENT_LENGTH, COOKIE, HeaderMap, HeaderName,
    HeaderValue, REFERER, SET_COOKIE, USER_AGENT,
};
use tracing::warn;

use crate::models::Cookie;
use crate::transport::RequestDescriptor;

pub const DEFAULT_ACCEPT: &str = "*/*";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.5";
pub const DEFAULT_ACCEPT_ENCODING: &str = "gzip";

/// Fill browser-like headers the factory left unset. Values already present
/// are never touched.
pub fn fill_defaults(request: &mut RequestDescriptor, user_agent: &str, referer: &str) {
    let headers = &mut request.headers;

    set_if_absent(headers, USER_AGENT, user_agent);
    set_if_absent(headers, ACCEPT, DEFAULT_ACCEPT);
    set_if_absent(headers, ACCEPT_LANGUAGE, DEFAULT_ACCEPT_LANGUAGE);
    set_if_absent(headers, ACCEPT_ENCODING, DEFAULT_ACCEPT_ENCODING);
    if !referer.is_empty() {
        set_if_absent(headers, REFERER, referer);
    }

    if carries_body(&request.method) {
        if let Some(body) = &request.body {
            if !headers.contains_key(CONTENT_LENGTH) {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
            }
        }
    }
}

fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

fn set_if_absent(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if headers.contains_key(&name) {
        return;
    }
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(name, v);
        }
        Err(_) => warn!("Skipping unrepresentable {} header", name),
    }
}

/// Append every jar cookie to the request's `Cookie` header, after whatever
/// the factory put there.
pub fn attach_cookies<'a>(headers: &mut HeaderMap, cookies: impl IntoIterator<Item = &'a Cookie>) {
    let mut pairs: Vec<String> = headers
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.trim().is_empty())
        .map(|s| vec![s.to_string()])
        .unwrap_or_default();

    pairs.extend(cookies.into_iter().map(Cookie::pair));
    if pairs.is_empty() {
        return;
    }

    match HeaderValue::from_str(&pairs.join("; ")) {
        Ok(v) => {
            headers.insert(COOKIE, v);
        }
        Err(_) => warn!("Cookie header not representable, sending without jar cookies"),
    }
}

/// All cookies a response asked us to store, in header order.
pub fn set_cookies(headers: &HeaderMap) -> Vec<Cookie> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| match v.to_str() {
            Ok(s) => Some(s),
            Err(_) => {
                warn!("Skipping non-UTF-8 Set-Cookie header: {:?}", v);
                None
            }
        })
        .filter_map(Cookie::parse_set_cookie)
        .collect()
}
