use crate::middleware::rate_limit::RateLimiter;

pub async fn run(limiter: &RateLimiter) {
    let dropped = limiter.sweep().await;
    let remaining = limiter.tracked_clients().await;
    tracing::debug!(dropped, remaining, "rate_limit_sweep: done");
}
