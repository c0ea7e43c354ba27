pub mod client;
pub mod rate_limit;
pub mod rest_poller;
pub mod ws_client;

pub use client::BinanceClient;
pub use rate_limit::RateLimitTracker;
