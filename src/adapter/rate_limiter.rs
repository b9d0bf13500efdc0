//! @ai:module:intent Per-adapter request pacing for provider APIs
//! @ai:module:layer infrastructure
//! @ai:module:public_api RateLimiter, RateLimiterTrait
//! @ai:module:stateless false

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// @ai:intent Trait for rate limiting functionality
pub trait RateLimiterTrait: Send + Sync {
    /// @ai:intent Wait until a request is allowed
    fn wait(&self) -> impl std::future::Future<Output = ()> + Send;
}

/// @ai:intent Token bucket owned by one adapter instance; a run never shares it with another run
pub struct RateLimiter {
    state: Mutex<BucketState>,
    /// `None` disables pacing
    requests_per_minute: Option<u32>,
}

struct BucketState {
    tokens: f64,
    last_update: Instant,
}

impl RateLimiter {
    /// @ai:intent Create a limiter; `0` means unlimited
    /// @ai:effects pure
    pub fn new(requests_per_minute: u32) -> Self {
        let rpm = (requests_per_minute > 0).then_some(requests_per_minute);
        Self {
            state: Mutex::new(BucketState {
                tokens: requests_per_minute as f64,
                last_update: Instant::now(),
            }),
            requests_per_minute: rpm,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    /// @ai:intent Refill tokens based on elapsed time, capped at one minute's worth
    /// @ai:effects state:write
    fn refill(state: &mut BucketState, rpm: u32) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_update);
        let per_second = rpm as f64 / 60.0;
        state.tokens = (state.tokens + elapsed.as_secs_f64() * per_second).min(rpm as f64);
        state.last_update = now;
    }
}

impl RateLimiterTrait for RateLimiter {
    /// @ai:effects state:write, time
    async fn wait(&self) {
        let Some(rpm) = self.requests_per_minute else {
            return;
        };

        loop {
            let sleep_for = {
                let mut state = self.state.lock().await;
                Self::refill(&mut state, rpm);

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }

                Duration::from_secs_f64((1.0 - state.tokens) / (rpm as f64 / 60.0))
            };

            tracing::debug!("rate limited, sleeping {:?}", sleep_for);
            tokio::time::sleep(sleep_for).await;
        }
    }
}
