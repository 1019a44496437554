use rand::Rng;
use std::time::Duration;

/// Calculate exponential backoff delay with jitter
pub fn calculate_backoff_delay(attempt: i32, base_delay_secs: u32) -> Duration {
    let attempt = attempt.max(0) as u32;

    // Cap the exponent to prevent overflow; with a 30s base the ceiling is
    // about 8.5 hours between attempts.
    let capped_attempt = attempt.min(10);

    // Calculate base delay: base * 2^attempt
    let base_delay = base_delay_secs.saturating_mul(2_u32.saturating_pow(capped_attempt));

    // Add jitter: ±30% randomness
    let jitter_factor = rand::thread_rng().gen_range(0.7..1.3);
    let delay_with_jitter = (base_delay as f64 * jitter_factor).round() as u64;

    Duration::from_secs(delay_with_jitter)
}
