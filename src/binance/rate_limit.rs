// =============================================================================
// Rate-Limit Tracker — monitors Binance API usage to avoid 429s
// =============================================================================
//
// Binance enforces a request-weight budget of 1200 per minute; this engine
// only issues public, low-weight requests (klines) but still tracks the
// `X-MBX-USED-WEIGHT-1M` response header so the REST poller can back off
// before the exchange starts rejecting requests (spec §5: "REST polling
// cadence must not exceed the exchange's public rate limits").
// =============================================================================

use std::sync::atomic::{AtomicU32, Ordering};
use tracing::warn;

/// Hard ceiling at which the poller should pause rather than send more.
const WEIGHT_HARD_LIMIT: u32 = 1000;
/// Soft warning threshold.
const WEIGHT_WARN_THRESHOLD: u32 = 800;

/// Thread-safe rate-limit tracker backed by an atomic counter.
pub struct RateLimitTracker {
    used_weight_1m: AtomicU32,
}

impl RateLimitTracker {
    pub fn new() -> RateLimitTracker {
        RateLimitTracker {
            used_weight_1m: AtomicU32::new(0),
        }
    }

    /// Update the tracked weight from the `X-MBX-USED-WEIGHT-1M` response
    /// header, if present.
    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap) {
        if let Some(val) = headers.get("X-MBX-USED-WEIGHT-1M") {
            if let Ok(s) = val.to_str() {
                if let Ok(w) = s.parse::<u32>() {
                    let prev = self.used_weight_1m.swap(w, Ordering::Relaxed);
                    if w >= WEIGHT_WARN_THRESHOLD && prev < WEIGHT_WARN_THRESHOLD {
                        warn!(used_weight = w, "rate-limit weight crossed warning threshold");
                    }
                }
            }
        }
    }

    /// Return `true` if sending a request of the given `weight` would stay
    /// within the hard limit.
    pub fn can_send_request(&self, weight: u32) -> bool {
        let current = self.used_weight_1m.load(Ordering::Relaxed);
        let allowed = current + weight <= WEIGHT_HARD_LIMIT;
        if !allowed {
            warn!(current_weight = current, "request blocked — would exceed rate-limit");
        }
        allowed
    }

    /// Reset the 1-minute weight counter (call from a periodic timer).
    pub fn reset_1m_weight(&self) {
        self.used_weight_1m.store(0, Ordering::Relaxed);
    }
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_requests_under_limit() {
        let tracker = RateLimitTracker::new();
        assert!(tracker.can_send_request(10));
    }

    #[test]
    fn blocks_requests_over_hard_limit() {
        let tracker = RateLimitTracker::new();
        tracker.used_weight_1m.store(995, Ordering::Relaxed);
        assert!(!tracker.can_send_request(10));
    }

    #[test]
    fn reset_clears_counter() {
        let tracker = RateLimitTracker::new();
        tracker.used_weight_1m.store(999, Ordering::Relaxed);
        tracker.reset_1m_weight();
        assert!(tracker.can_send_request(500));
    }
}
