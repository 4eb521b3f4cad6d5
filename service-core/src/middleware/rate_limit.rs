use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::{DashMap, mapref::entry::Entry};
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};

/// Cooldown limiter shared between requests.
pub type SharedCooldownLimiter = Arc<CooldownLimiter>;

/// Per-client cooldown gate.
///
/// A client may make one request per `cooldown`. Rejected requests leave the
/// recorded timestamp untouched, so hammering the endpoint does not extend the
/// wait. Entries are never evicted; the table grows with the number of
/// distinct client addresses seen by the process.
#[derive(Debug)]
pub struct CooldownLimiter {
    cooldown: Duration,
    trust_forwarded_for: bool,
    last_seen: DashMap<String, Instant>,
}

impl CooldownLimiter {
    /// Limiter keyed on the socket peer address.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            trust_forwarded_for: false,
            last_seen: DashMap::new(),
        }
    }

    /// Key on the first `X-Forwarded-For` hop instead of the peer.
    ///
    /// Only enable behind a proxy that overwrites the header; otherwise
    /// clients can pick their own key.
    pub fn trusting_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn trusts_forwarded_for(&self) -> bool {
        self.trust_forwarded_for
    }

    /// Admit or reject a request from `client` arriving at `now`.
    ///
    /// On rejection returns the time left until the client may retry.
    pub fn check(&self, client: &str, now: Instant) -> Result<(), Duration> {
        match self.last_seen.entry(client.to_string()) {
            Entry::Occupied(mut entry) => {
                let elapsed = now.saturating_duration_since(*entry.get());
                if elapsed >= self.cooldown {
                    entry.insert(now);
                    Ok(())
                } else {
                    Err(self.cooldown - elapsed)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                Ok(())
            }
        }
    }

    /// Returns whether the request is allowed, recording `now` if it is.
    pub fn check_and_record(&self, client: &str, now: Instant) -> bool {
        self.check(client, now).is_ok()
    }

    /// Number of client addresses tracked so far.
    pub fn tracked_clients(&self) -> usize {
        self.last_seen.len()
    }
}

impl Default for CooldownLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// Create a shared cooldown limiter.
pub fn create_cooldown_limiter(
    cooldown: Duration,
    trust_forwarded_for: bool,
) -> SharedCooldownLimiter {
    Arc::new(CooldownLimiter::new(cooldown).trusting_forwarded_for(trust_forwarded_for))
}

fn peer_address(request: &Request) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

fn forwarded_address(request: &Request) -> Option<IpAddr> {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// Resolve the client address.
///
/// The socket peer, unless `trust_forwarded_for` is set, in which case the
/// first `X-Forwarded-For` hop wins when present.
pub fn client_address(request: &Request, trust_forwarded_for: bool) -> Option<IpAddr> {
    if trust_forwarded_for {
        forwarded_address(request).or_else(|| peer_address(request))
    } else {
        peer_address(request)
    }
}

/// Middleware enforcing the per-address cooldown.
pub async fn cooldown_rate_limit_middleware(
    State(limiter): State<SharedCooldownLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(addr) = client_address(&request, limiter.trusts_forwarded_for()) else {
        tracing::warn!("Could not determine client address for rate limiting");
        return Ok(next.run(request).await);
    };

    match limiter.check(&addr.to_string(), Instant::now()) {
        Ok(()) => Ok(next.run(request).await),
        Err(wait) => {
            tracing::debug!(client = %addr, wait_ms = wait.as_millis() as u64, "Request throttled");
            Err(AppError::TooManyRequests(
                "Too many requests. Please wait.".to_string(),
                Some(wait.as_secs_f64().ceil().max(1.0) as u64),
            ))
        }
    }
}
