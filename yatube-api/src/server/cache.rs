use crate::server::{Result, ServerError};
use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode, header::CONTENT_TYPE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::debug;

/// Upper bound on stored pages, every query string gets its own entry.
const MAX_ENTRIES: usize = 300;

#[derive(Clone, Debug)]
struct CachedPage {
    stored_at: Instant,
    content_type: Option<HeaderValue>,
    body: Bytes,
}

impl IntoResponse for CachedPage {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::OK, self.body).into_response();
        if let Some(content_type) = self.content_type {
            response.headers_mut().insert(CONTENT_TYPE, content_type);
        }
        response
    }
}

/// Rendered pages keyed by request URI, each valid for `ttl` after it was stored.
#[derive(Debug, Default)]
pub struct PageCache {
    ttl: Duration,
    pages: Mutex<HashMap<String, CachedPage>>,
}

impl PageCache {
    /// A zero `ttl` turns the cache off.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pages: Mutex::default(),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    fn get(&self, key: &str, now: Instant) -> Option<CachedPage> {
        let mut pages = self.pages.lock();
        match pages.get(key) {
            Some(page) if now.saturating_duration_since(page.stored_at) < self.ttl => {
                Some(page.clone())
            }
            Some(_) => {
                pages.remove(key);
                None
            }
            None => None,
        }
    }

    fn insert(&self, key: String, page: CachedPage) {
        let now = page.stored_at;
        let mut pages = self.pages.lock();
        pages.retain(|_, cached| now.saturating_duration_since(cached.stored_at) < self.ttl);

        while pages.len() >= MAX_ENTRIES && !pages.contains_key(&key) {
            let Some(oldest) = pages
                .iter()
                .min_by_key(|(_, cached)| cached.stored_at)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            pages.remove(&oldest);
        }

        pages.insert(key, page);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.pages.lock().len()
    }

    /// Drops every stored page, so the next request renders fresh content.
    pub fn clear(&self) {
        let mut pages = self.pages.lock();
        if !pages.is_empty() {
            debug!(pages = pages.len(), "Clearing page cache");
            pages.clear();
        }
    }
}

/// Serves successful `GET` responses from the cache while they are fresh.
pub async fn cache_page(
    State(cache): State<Arc<PageCache>>,
    request: Request,
    next: Next,
) -> Result<Response> {
    if !cache.is_enabled() || request.method() != Method::GET {
        return Ok(next.run(request).await);
    }

    let key = request.uri().to_string();
    if let Some(page) = cache.get(&key, Instant::now()) {
        debug!(key, "Serving page from cache");
        return Ok(page.into_response());
    }

    let response = next.run(request).await;
    if response.status() != StatusCode::OK {
        return Ok(response);
    }

    let (parts, body) = response.into_parts();
    let body = to_bytes(body, usize::MAX)
        .await
        .map_err(ServerError::ResponseBody)?;

    cache.insert(
        key,
        CachedPage {
            stored_at: Instant::now(),
            content_type: parts.headers.get(CONTENT_TYPE).cloned(),
            body: body.clone(),
        },
    );

    Ok(Response::from_parts(parts, Body::from(body)))
}
