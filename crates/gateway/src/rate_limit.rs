//! In-memory sliding-window rate limiting, keyed by caller identity.

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::SharedState;
use crate::chat::{ReplyBody, caller_identity};

/// Paths polled by monitors; never limited.
const EXEMPT_PATHS: &[&str] = &["/", "/health"];

const STALE_SWEEP_THRESHOLD: usize = 10_000;

/// Sliding-window limiter. The mutex is held only for the bookkeeping.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    callers: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            callers: Mutex::new(HashMap::new()),
        }
    }

    /// `per_minute` requests per caller per minute; `None` when 0.
    pub fn per_minute(per_minute: u32) -> Option<Self> {
        (per_minute > 0).then(|| Self::new(per_minute as usize, Duration::from_secs(60)))
    }

    /// Admit one request from `caller`, or return how long until the
    /// oldest request in the window expires.
    pub fn check(&self, caller: &str) -> Result<(), Duration> {
        self.check_at(caller, Instant::now())
    }

    fn check_at(&self, caller: &str, now: Instant) -> Result<(), Duration> {
        let mut callers = self.callers.lock().unwrap_or_else(|e| e.into_inner());

        if callers.len() > STALE_SWEEP_THRESHOLD {
            callers.retain(|_, hits| {
                hits.back()
                    .is_some_and(|t| now.duration_since(*t) < self.window)
            });
        }

        let hits = callers.entry(caller.to_string()).or_default();
        while hits
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            hits.pop_front();
        }

        if hits.len() >= self.max_requests {
            let oldest = hits.front().copied().unwrap_or(now);
            return Err(self.window.saturating_sub(now.duration_since(oldest)));
        }

        hits.push_back(now);
        Ok(())
    }
}

/// Reject callers over their budget with 429 and a generic reply.
pub async fn rate_limit_middleware(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(limiter) = state.rate_limiter.as_ref() else {
        return next.run(req).await;
    };
    if EXEMPT_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }

    let caller = caller_identity(req.headers(), req.extensions(), state.trust_forwarded_for);

    match limiter.check(&caller) {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            warn!(caller = %caller, path = %req.uri().path(), "Rate limit exceeded");
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ReplyBody::failure(
                    "You're sending messages too quickly. Please wait a moment.",
                )),
            )
                .into_response();
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_at("a", now).is_ok());
        assert!(limiter.check_at("a", now).is_ok());
        let wait = limiter.check_at("a", now).unwrap_err();
        assert_eq!(wait, Duration::from_secs(60));
    }

    #[test]
    fn callers_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_at("a", now).is_ok());
        assert!(limiter.check_at("b", now).is_ok());
        assert!(limiter.check_at("a", now).is_err());
    }

    #[test]
    fn window_slides() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();

        assert!(limiter.check_at("a", start).is_ok());
        assert_eq!(
            limiter.check_at("a", start + Duration::from_secs(4)),
            Err(Duration::from_secs(6))
        );
        assert!(limiter.check_at("a", start + Duration::from_secs(10)).is_ok());
    }

    #[test]
    fn zero_disables() {
        assert!(RateLimiter::per_minute(0).is_none());
        assert!(RateLimiter::per_minute(5).is_some());
    }
}
