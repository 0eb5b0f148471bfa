/// Brute-force protection and response hardening
///
/// - Per-IP token bucket consulted by the login route
/// - Client IP resolution that only believes forwarding headers from trusted proxies
/// - Security headers applied to every response

use actix_web::HttpRequest;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::error::AppError;

/// Buckets tracked before idle, fully refilled ones are dropped
const MAX_TRACKED_CLIENTS: usize = 10_000;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Bucket capacity and refill per minute, per client IP
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 10,
        }
    }
}

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    capacity: f64,
    refill_rate: f64, // tokens per second
}

impl TokenBucket {
    fn new(requests_per_minute: u32) -> Self {
        Self {
            tokens: requests_per_minute as f64,
            last_refill: Instant::now(),
            capacity: requests_per_minute as f64,
            refill_rate: requests_per_minute as f64 / 60.0,
        }
    }

    fn refill(&mut self) {
        let elapsed = self.last_refill.elapsed().as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = Instant::now();
    }

    fn try_take_token(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn is_full(&mut self) -> bool {
        self.refill();
        self.tokens >= self.capacity
    }
}

/// Tracks one bucket per client IP
pub struct RateLimiterManager {
    config: RateLimitConfig,
    limiters: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiterManager {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Take one token for `ip`
    ///
    /// # Errors
    /// `RateLimited` once the bucket is empty
    pub fn check_rate_limit(&self, ip: &str) -> Result<(), AppError> {
        let mut limiters = self
            .limiters
            .lock()
            .map_err(|_| AppError::Internal("rate limiter lock poisoned".to_string()))?;

        if limiters.len() >= MAX_TRACKED_CLIENTS && !limiters.contains_key(ip) {
            limiters.retain(|_, bucket| !bucket.is_full());
        }

        let requests_per_minute = self.config.requests_per_minute;
        let limiter = limiters
            .entry(ip.to_string())
            .or_insert_with(|| TokenBucket::new(requests_per_minute));

        if limiter.try_take_token() {
            Ok(())
        } else {
            tracing::warn!(client_ip = %ip, "Login rate limit exceeded");
            Err(AppError::RateLimited(format!(
                "Too many attempts: max {} per minute",
                requests_per_minute
            )))
        }
    }
}

/// Picks the address a rate limit is keyed on
///
/// The socket peer is used unless it is a configured proxy, in which case the
/// `Forwarded` / `X-Forwarded-For` client address is taken instead.
#[derive(Debug, Clone, Default)]
pub struct ClientIpResolver {
    trusted_proxies: Vec<String>,
}

impl ClientIpResolver {
    pub fn new(trusted_proxies: Vec<String>) -> Self {
        Self { trusted_proxies }
    }

    pub fn resolve(&self, req: &HttpRequest) -> String {
        let info = req.connection_info();
        let peer = match info.peer_addr() {
            Some(peer) => peer.to_string(),
            None => return "unknown".to_string(),
        };

        if self.is_trusted_proxy(&peer) {
            if let Some(forwarded) = info.realip_remote_addr() {
                return forwarded.to_string();
            }
        }
        peer
    }

    fn is_trusted_proxy(&self, peer: &str) -> bool {
        self.trusted_proxies.iter().any(|trusted| trusted == peer)
    }
}

/// Security headers for HTTP responses
pub struct SecurityHeaders;

impl SecurityHeaders {
    pub fn get_headers() -> Vec<(&'static str, &'static str)> {
        vec![
            ("X-Content-Type-Options", "nosniff"),
            ("X-Frame-Options", "DENY"),
            ("X-XSS-Protection", "1; mode=block"),
            ("Content-Security-Policy", "default-src 'none'; frame-ancestors 'none'"),
            ("Referrer-Policy", "strict-origin-when-cross-origin"),
            // HTTPS only
            ("Strict-Transport-Security", "max-age=31536000; includeSubDomains"),
        ]
    }
}
