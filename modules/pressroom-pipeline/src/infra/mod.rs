pub mod llm;
pub mod malformed;
pub mod rate_limiter;

pub use llm::{select_language_model, RateLimitedModel};
pub use malformed::MalformedOutputLog;
pub use rate_limiter::RateLimiter;
